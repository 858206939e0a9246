use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;

use crate::config::DirectLineConfig;
use crate::services::upstream::{self, Credential, UpstreamError};

#[derive(Deserialize)]
struct GenerateTokenResponse {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Clone)]
pub struct DirectLineClient {
    client: Client,
    config: DirectLineConfig,
}

impl DirectLineClient {
    pub fn new(client: Client, config: DirectLineConfig) -> Self {
        DirectLineClient { client, config }
    }

    /// Mints a fresh conversation token. Nothing is cached between calls.
    pub async fn generate_token(&self) -> Result<String, UpstreamError> {
        let secret = self.config.secret.as_ref().ok_or_else(|| {
            UpstreamError::Configuration("Missing DIRECT_LINE_SECRET setting".to_string())
        })?;

        let url = Url::parse(&format!("{}/v3/directline/tokens/generate", self.config.base_url))
            .map_err(|err| {
                UpstreamError::Configuration(format!("invalid DIRECT_LINE_BASE_URL: {}", err))
            })?;

        let body: GenerateTokenResponse = upstream::post_json(
            &self.client,
            &url,
            Some(&json!({})),
            Some(Credential::Bearer(secret)),
            &[],
        )
        .await?;

        body.token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                UpstreamError::MalformedResponse("response did not include a token".to_string())
            })
    }
}
