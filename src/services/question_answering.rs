use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use crate::config::LanguageConfig;
use crate::services::upstream::{self, Credential, UpstreamError};

#[derive(Serialize)]
struct QueryRequest<'a> {
    question: &'a str,
    top: u32,
}

#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub answers: Option<Vec<KnowledgeBaseAnswer>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBaseAnswer {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
}

impl QueryResponse {
    /// Text of the first-ranked answer, if it has any.
    pub fn top_answer(self) -> Option<String> {
        self.answers?
            .into_iter()
            .next()?
            .answer
            .filter(|answer| !answer.is_empty())
    }
}

#[derive(Clone)]
pub struct QuestionAnsweringClient {
    client: Client,
    config: LanguageConfig,
}

impl QuestionAnsweringClient {
    pub fn new(client: Client, config: LanguageConfig) -> Self {
        QuestionAnsweringClient { client, config }
    }

    /// Asks the deployed project for its single best answer. `Ok(None)` means
    /// the service answered but had nothing usable.
    pub async fn top_answer(&self, question: &str) -> Result<Option<String>, UpstreamError> {
        let key = self
            .config
            .key
            .as_ref()
            .ok_or_else(|| UpstreamError::Configuration("LANGUAGE_KEY is not set".to_string()))?;
        let endpoints = self.endpoints()?;

        let response: QueryResponse = upstream::post_with_fallback(
            &self.client,
            &endpoints,
            Some(&QueryRequest { question, top: 1 }),
            Some(Credential::ApiKey(key)),
            &[],
        )
        .await?;

        if let Some(first) = response.answers.as_ref().and_then(|answers| answers.first()) {
            tracing::debug!(confidence = ?first.confidence_score, "knowledge base answered");
        }
        Ok(response.top_answer())
    }

    /// Primary path-addressed endpoint, then the query-string-addressed shape
    /// some deployments still expose.
    pub fn endpoints(&self) -> Result<Vec<Url>, UpstreamError> {
        let endpoint = self.config.endpoint.as_deref().ok_or_else(|| {
            UpstreamError::Configuration("LANGUAGE_ENDPOINT is not set".to_string())
        })?;
        let project = self.config.project.as_deref().ok_or_else(|| {
            UpstreamError::Configuration("CQA_PROJECT_NAME is not set".to_string())
        })?;
        let deployment = self.config.deployment.as_str();

        let mut primary = Url::parse(endpoint).map_err(invalid_endpoint)?;
        primary
            .path_segments_mut()
            .map_err(|_| {
                UpstreamError::Configuration("LANGUAGE_ENDPOINT cannot be a base URL".to_string())
            })?
            .pop_if_empty()
            .extend([
                "language",
                "query-knowledgebases",
                "projects",
                project,
                "deployments",
                deployment,
                "qna",
            ]);
        primary
            .query_pairs_mut()
            .append_pair("api-version", &self.config.api_version);

        let mut alternate =
            Url::parse(&format!("{}/language/:query-knowledgebases", endpoint)).map_err(invalid_endpoint)?;
        alternate
            .query_pairs_mut()
            .append_pair("projectName", project)
            .append_pair("deploymentName", deployment)
            .append_pair("api-version", &self.config.fallback_api_version);

        Ok(vec![primary, alternate])
    }
}

fn invalid_endpoint(err: impl std::fmt::Display) -> UpstreamError {
    UpstreamError::Configuration(format!("invalid LANGUAGE_ENDPOINT: {}", err))
}
