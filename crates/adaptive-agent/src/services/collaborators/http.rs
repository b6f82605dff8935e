use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::provider::{BatchDispatcher, ContextStore, GenerationConfig, GenerationProvider, Summarizer};
use crate::models::chat::ChatMessage;
use crate::services::conversation::SessionContext;

fn build_client(timeout_seconds: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .context("Failed to create HTTP client")
}

/// Endpoints become a URL path segment: ASCII letters, digits, `_` and `-` only.
pub fn validate_endpoint(endpoint: &str) -> Result<()> {
    let valid = !endpoint.is_empty()
        && endpoint
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if !valid {
        return Err(anyhow!("invalid endpoint name: {:?}", endpoint));
    }
    Ok(())
}

async fn ensure_success(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(anyhow!("{} error: {} - {}", what, status, body))
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    messages: &'a [ChatMessage],
    max_tokens: usize,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Client for an OpenAI-compatible `/v1/chat/completions` server.
#[derive(Clone)]
pub struct HttpGenerationClient {
    client: Client,
    base_url: String,
}

impl HttpGenerationClient {
    pub fn new(base_url: impl Into<String>, timeout_seconds: u64) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout_seconds)?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait::async_trait]
impl GenerationProvider for HttpGenerationClient {
    async fn generate(&self, messages: &[ChatMessage], config: &GenerationConfig) -> Result<String> {
        debug!("Starting chat generation with {} messages", messages.len());

        let request = ChatCompletionRequest {
            messages,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request)
            .send()
            .await
            .context("Failed to call generation API")?;
        let response = ensure_success(response, "Generation API").await?;

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse generation response")?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("No choices returned from generation API"))
    }
}

#[derive(Serialize)]
struct SummarizeRequest<'a> {
    conversation: &'a str,
}

#[derive(Deserialize)]
struct SummarizeResponse {
    summary: String,
}

/// `POST {base}/api/summarize` with `{conversation}`, answers `{summary}`.
#[derive(Clone)]
pub struct HttpSummarizer {
    client: Client,
    base_url: String,
}

impl HttpSummarizer {
    pub fn new(base_url: impl Into<String>, timeout_seconds: u64) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout_seconds)?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait::async_trait]
impl Summarizer for HttpSummarizer {
    async fn summarize(&self, transcript: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/api/summarize", self.base_url))
            .json(&SummarizeRequest { conversation: transcript })
            .send()
            .await
            .context("Failed to call summarize API")?;
        let response = ensure_success(response, "Summarize API").await?;

        let body: SummarizeResponse = response
            .json()
            .await
            .context("Failed to parse summarize response")?;
        Ok(body.summary)
    }
}

/// Context persistence over `GET`/`PUT {base}/api/context/{session_id}`.
#[derive(Clone)]
pub struct HttpContextStore {
    client: Client,
    base_url: String,
}

impl HttpContextStore {
    pub fn new(base_url: impl Into<String>, timeout_seconds: u64) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout_seconds)?,
            base_url: base_url.into(),
        })
    }

    fn url(&self, session_id: &str) -> String {
        format!("{}/api/context/{}", self.base_url, session_id)
    }
}

#[async_trait::async_trait]
impl ContextStore for HttpContextStore {
    async fn save(&self, session_id: &str, context: &SessionContext) -> Result<()> {
        let response = self
            .client
            .put(self.url(session_id))
            .json(context)
            .send()
            .await
            .context("Failed to call context API")?;
        ensure_success(response, "Context API").await?;
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionContext>> {
        let response = self
            .client
            .get(self.url(session_id))
            .send()
            .await
            .context("Failed to call context API")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response, "Context API").await?;
        let context = response
            .json()
            .await
            .context("Failed to parse stored context")?;
        Ok(Some(context))
    }
}

#[derive(Serialize)]
struct BatchRequest {
    batch: Vec<Value>,
}

#[derive(Deserialize)]
struct BatchResponse {
    results: Vec<Value>,
}

/// Grouped calls as `POST {base}/api/{endpoint}/batch` with `{batch}`, answers `{results}`.
#[derive(Clone)]
pub struct HttpBatchDispatcher {
    client: Client,
    base_url: String,
}

impl HttpBatchDispatcher {
    pub fn new(base_url: impl Into<String>, timeout_seconds: u64) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout_seconds)?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait::async_trait]
impl BatchDispatcher for HttpBatchDispatcher {
    async fn dispatch(&self, endpoint: &str, params: Vec<Value>) -> Result<Vec<Value>> {
        validate_endpoint(endpoint)?;
        let response = self
            .client
            .post(format!("{}/api/{}/batch", self.base_url, endpoint))
            .json(&BatchRequest { batch: params })
            .send()
            .await
            .with_context(|| format!("Failed to call batch endpoint {}", endpoint))?;
        let response = ensure_success(response, "Batch API").await?;

        let body: BatchResponse = response
            .json()
            .await
            .context("Failed to parse batch response")?;
        Ok(body.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_endpoint_names_are_single_segments() {
        assert!(validate_endpoint("search").is_ok());
        assert!(validate_endpoint("user-profile_v2").is_ok());
        assert!(validate_endpoint("").is_err());
        assert!(validate_endpoint("../admin").is_err());
        assert!(validate_endpoint("search?q=1").is_err());
        assert!(validate_endpoint("a/b").is_err());
        assert!(validate_endpoint("café").is_err());
    }

    #[tokio::test]
    async fn test_dispatch_rejects_path_traversal_before_sending() {
        // Nothing listens here; a request would fail with a connect error
        let dispatcher = HttpBatchDispatcher::new("http://127.0.0.1:9", 1).unwrap();
        let err = dispatcher
            .dispatch("../internal/reset", vec![json!({"q": 1})])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid endpoint name"));
    }
}
