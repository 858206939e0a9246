//! Validation of the bearer JWT the channel service attaches to every
//! activity it posts to the bot.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::{Client, Url};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::services::upstream::{self, UpstreamError};

pub const CHANNEL_ISSUER: &str = "https://api.botframework.com";
const KEY_REFRESH_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
/// Minimum age of the key set before an unknown `kid` may trigger a refetch.
const UNKNOWN_KEY_REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);
const CLOCK_SKEW_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum ChannelAuthError {
    #[error("missing Authorization header")]
    MissingHeader,
    #[error("Authorization header is not a bearer token")]
    MalformedHeader,
    #[error("token has no usable signing key id")]
    UnknownKey,
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("could not fetch signing keys: {0}")]
    KeyFetch(#[from] UpstreamError),
    #[error("token serviceurl claim does not match activity serviceUrl")]
    ServiceUrlMismatch,
}

#[derive(Deserialize)]
struct OpenIdMetadata {
    jwks_uri: String,
}

#[derive(Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Deserialize)]
struct Jwk {
    kid: Option<String>,
    kty: String,
    n: Option<String>,
    e: Option<String>,
}

#[derive(Deserialize)]
struct ChannelClaims {
    #[serde(default)]
    serviceurl: Option<String>,
}

struct KeyCache {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
}

pub struct ChannelAuthenticator {
    client: Client,
    app_id: String,
    metadata_url: String,
    cache: Mutex<Option<KeyCache>>,
}

impl ChannelAuthenticator {
    pub fn new(client: Client, app_id: String, metadata_url: String) -> Self {
        ChannelAuthenticator { client, app_id, metadata_url, cache: Mutex::new(None) }
    }

    pub async fn authenticate(
        &self,
        authorization: Option<&str>,
        service_url: Option<&str>,
    ) -> Result<(), ChannelAuthError> {
        let token = bearer_token(authorization)?;
        let kid = decode_header(token)?.kid.ok_or(ChannelAuthError::UnknownKey)?;
        let key = self.signing_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[CHANNEL_ISSUER]);
        validation.set_audience(&[self.app_id.as_str()]);
        validation.leeway = CLOCK_SKEW_SECS;

        let claims = decode::<ChannelClaims>(token, &key, &validation)?.claims;
        check_service_url(claims.serviceurl.as_deref(), service_url)
    }

    async fn signing_key(&self, kid: &str) -> Result<DecodingKey, ChannelAuthError> {
        let mut cache = self.cache.lock().await;

        if let Some(current) = cache.as_ref() {
            let age = current.fetched_at.elapsed();
            if age < KEY_REFRESH_INTERVAL {
                if let Some(key) = current.keys.get(kid) {
                    return Ok(key.clone());
                }
                if age < UNKNOWN_KEY_REFRESH_INTERVAL {
                    tracing::debug!(kid, "unknown signing key id, key set refreshed recently");
                    return Err(ChannelAuthError::UnknownKey);
                }
            }
        }

        let keys = self.fetch_keys().await?;
        tracing::info!(count = keys.len(), "refreshed channel signing keys");
        let key = keys.get(kid).cloned();
        *cache = Some(KeyCache { keys, fetched_at: Instant::now() });

        key.ok_or(ChannelAuthError::UnknownKey)
    }

    async fn fetch_keys(&self) -> Result<HashMap<String, DecodingKey>, UpstreamError> {
        let metadata: OpenIdMetadata = self.get_json(&self.metadata_url).await?;
        let set: JwkSet = self.get_json(&metadata.jwks_uri).await?;

        Ok(set
            .keys
            .into_iter()
            .filter(|k| k.kty == "RSA")
            .filter_map(|k| {
                let key = DecodingKey::from_rsa_components(k.n.as_deref()?, k.e.as_deref()?).ok()?;
                Some((k.kid?, key))
            })
            .collect())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, UpstreamError> {
        let url = Url::parse(url)
            .map_err(|err| UpstreamError::Configuration(format!("invalid key discovery url: {}", err)))?;
        let res = self.client.get(url).send().await?;
        upstream::classify(res).await?.json()
    }
}

fn bearer_token(header: Option<&str>) -> Result<&str, ChannelAuthError> {
    let header = header.ok_or(ChannelAuthError::MissingHeader)?;
    let (scheme, token) = header.trim().split_once(' ').ok_or(ChannelAuthError::MalformedHeader)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(ChannelAuthError::MalformedHeader);
    }
    Ok(token)
}

fn check_service_url(claim: Option<&str>, activity: Option<&str>) -> Result<(), ChannelAuthError> {
    match (claim, activity) {
        (Some(claim), Some(activity))
            if claim.trim_end_matches('/') != activity.trim_end_matches('/') =>
        {
            Err(ChannelAuthError::ServiceUrlMismatch)
        }
        _ => Ok(()),
    }
}
