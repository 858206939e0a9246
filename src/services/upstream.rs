//! Authenticated JSON POSTs to external services, with response
//! classification shared by every outbound call in the relay.

use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Longest upstream body prefix carried into errors and logs.
pub const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{0}")]
    Configuration(String),
    #[error("{0}")]
    Transport(String),
    #[error("{status} - {body}")]
    UpstreamStatus {
        status: StatusCode,
        /// At most `MAX_ERROR_BODY_CHARS` characters of the response body.
        body: String,
        raw_body: String,
    },
    #[error("{0}")]
    MalformedResponse(String),
}

impl UpstreamError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            UpstreamError::UpstreamStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        UpstreamError::Transport(err.to_string())
    }
}

#[derive(Clone, Copy)]
pub enum Credential<'a> {
    Bearer(&'a SecretString),
    /// Language resource key, sent under both header names the service accepts.
    ApiKey(&'a SecretString),
}

impl<'a> Credential<'a> {
    fn secret(&self) -> &'a SecretString {
        match self {
            Credential::Bearer(secret) | Credential::ApiKey(secret) => *secret,
        }
    }

    fn apply(&self, req: RequestBuilder) -> RequestBuilder {
        match self {
            Credential::Bearer(secret) => req.bearer_auth(secret.expose_secret()),
            Credential::ApiKey(secret) => req
                .header("Ocp-Apim-Subscription-Key", secret.expose_secret())
                .header("api-key", secret.expose_secret()),
        }
    }
}

/// Fully-read 2xx response.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: String,
}

impl UpstreamResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, UpstreamError> {
        serde_json::from_str(&self.body).map_err(|err| {
            UpstreamError::MalformedResponse(format!(
                "could not parse upstream response: {}",
                err
            ))
        })
    }
}

pub fn bounded(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

/// Reads the whole body and splits success from upstream failure.
pub async fn classify(res: Response) -> Result<UpstreamResponse, UpstreamError> {
    let status = res.status();
    let body = res.text().await?;

    if !status.is_success() {
        tracing::warn!(status = %status, body = %bounded(&body), "upstream returned non-success status");
        return Err(UpstreamError::UpstreamStatus {
            status,
            body: bounded(&body),
            raw_body: body,
        });
    }

    Ok(UpstreamResponse { status, body })
}

/// POSTs `body` (or no body) to `url` and returns the classified response.
/// A blank credential fails before anything touches the network.
pub async fn send<B: Serialize + ?Sized>(
    client: &Client,
    url: &Url,
    body: Option<&B>,
    credential: Option<Credential<'_>>,
    headers: &[(&str, &str)],
) -> Result<UpstreamResponse, UpstreamError> {
    let credential = credential.filter(|c| !c.secret().expose_secret().trim().is_empty());
    tracing::info!(url = %url, has_credential = credential.is_some(), "upstream request");

    let credential = credential
        .ok_or_else(|| UpstreamError::Configuration("credential is not configured".to_string()))?;

    let mut req = credential.apply(client.post(url.clone()));
    for (name, value) in headers {
        req = req.header(*name, *value);
    }
    if let Some(body) = body {
        req = req.json(body);
    }

    let res = match req.send().await {
        Ok(r) => r,
        Err(err) => {
            tracing::error!(url = %url, error = %err, "upstream request failed to send");
            return Err(err.into());
        }
    };

    classify(res).await
}

pub async fn post_json<T, B>(
    client: &Client,
    url: &Url,
    body: Option<&B>,
    credential: Option<Credential<'_>>,
    headers: &[(&str, &str)],
) -> Result<T, UpstreamError>
where
    T: DeserializeOwned,
    B: Serialize + ?Sized,
{
    send(client, url, body, credential, headers).await?.json()
}

/// Tries each endpoint in order. Only a 404 from an endpoint that is not the
/// last one moves on; every other outcome is returned as is.
pub async fn post_with_fallback<T, B>(
    client: &Client,
    endpoints: &[Url],
    body: Option<&B>,
    credential: Option<Credential<'_>>,
    headers: &[(&str, &str)],
) -> Result<T, UpstreamError>
where
    T: DeserializeOwned,
    B: Serialize + ?Sized,
{
    let Some((last, earlier)) = endpoints.split_last() else {
        return Err(UpstreamError::Configuration("no endpoint configured".to_string()));
    };

    for url in earlier {
        match post_json(client, url, body, credential, headers).await {
            Err(err) if err.status() == Some(StatusCode::NOT_FOUND) => {
                tracing::warn!(url = %url, "endpoint returned 404, trying next endpoint shape");
            }
            other => return other,
        }
    }

    post_json(client, last, body, credential, headers).await
}
