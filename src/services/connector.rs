use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::{AppType, BotConfig};
use crate::models::Activity;
use crate::services::upstream::{self, Credential, UpstreamError};

const CONNECTOR_SCOPE: &str = "https://api.botframework.com/.default";
const MULTI_TENANT: &str = "botframework.com";
/// Tokens are refreshed this many seconds before they expire.
const EXPIRY_MARGIN_SECS: u64 = 300;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Posts reply activities back to the channel's connector service.
#[derive(Clone)]
pub struct ConnectorClient {
    client: Client,
    config: BotConfig,
    access_token: Arc<Mutex<Option<(SecretString, u64)>>>, // (token, expiry_timestamp)
}

impl ConnectorClient {
    pub fn new(client: Client, config: BotConfig) -> Self {
        ConnectorClient {
            client,
            config,
            access_token: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn send_reply(&self, incoming: &Activity, reply: &Activity) -> Result<(), UpstreamError> {
        let url = reply_url(incoming)?;

        match self.config.app_id.as_deref() {
            Some(_) => {
                let token = self.get_access_token().await?;
                upstream::send(&self.client, &url, Some(reply), Some(Credential::Bearer(&token)), &[])
                    .await?;
            }
            None => {
                // Emulator / local mode: the connector expects no credentials.
                tracing::info!(url = %url, has_credential = false, "posting reply without credentials");
                let res = self.client.post(url).json(reply).send().await?;
                upstream::classify(res).await?;
            }
        }

        Ok(())
    }

    async fn get_access_token(&self) -> Result<SecretString, UpstreamError> {
        let mut cached = self.access_token.lock().await;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        if let Some((token, expiry)) = cached.as_ref() {
            if *expiry > now.saturating_add(EXPIRY_MARGIN_SECS) {
                return Ok(token.clone());
            }
        }

        let app_id = self.config.app_id.as_deref().unwrap_or_default();
        let password = self
            .config
            .app_password
            .as_ref()
            .filter(|p| !p.expose_secret().is_empty())
            .ok_or_else(|| {
                UpstreamError::Configuration("MicrosoftAppPassword is not set".to_string())
            })?;

        let tenant = match self.config.app_type {
            AppType::SingleTenant => self.config.tenant_id.as_deref().ok_or_else(|| {
                UpstreamError::Configuration(
                    "MicrosoftAppTenantId is required for SingleTenant apps".to_string(),
                )
            })?,
            AppType::MultiTenant => MULTI_TENANT,
        };
        let token_url = format!("{}/{}/oauth2/v2.0/token", self.config.login_endpoint, tenant);

        tracing::info!(url = %token_url, "requesting connector access token");
        let res = self
            .client
            .post(&token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", app_id),
                ("client_secret", password.expose_secret()),
                ("scope", CONNECTOR_SCOPE),
            ])
            .send()
            .await?;
        let token: TokenResponse = upstream::classify(res).await?.json()?;

        let secret = SecretString::from(token.access_token);
        *cached = Some((secret.clone(), now.saturating_add(token.expires_in)));
        Ok(secret)
    }
}

/// `{serviceUrl}/v3/conversations/{conversation}/activities[/{replyTo}]`
pub fn reply_url(incoming: &Activity) -> Result<Url, UpstreamError> {
    let service_url = incoming.service_url.as_deref().ok_or_else(|| {
        UpstreamError::Configuration("activity has no serviceUrl".to_string())
    })?;
    let conversation = incoming
        .conversation
        .as_ref()
        .map(|c| c.id.as_str())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| UpstreamError::Configuration("activity has no conversation id".to_string()))?;

    let mut url = Url::parse(service_url)
        .map_err(|err| UpstreamError::Configuration(format!("invalid serviceUrl: {}", err)))?;
    {
        let mut segments = url.path_segments_mut().map_err(|_| {
            UpstreamError::Configuration("serviceUrl cannot be a base URL".to_string())
        })?;
        segments
            .pop_if_empty()
            .extend(["v3", "conversations", conversation, "activities"]);
        if let Some(id) = incoming.id.as_deref().filter(|id| !id.is_empty()) {
            segments.push(id);
        }
    }
    Ok(url)
}
