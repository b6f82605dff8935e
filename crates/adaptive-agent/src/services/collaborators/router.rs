use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

use super::provider::{BatchDispatcher, GenerationConfig, GenerationProvider, Summarizer};
use crate::models::chat::ChatMessage;

/// Parameter set accepted by the generation endpoint.
#[derive(Debug, Deserialize)]
struct GenerationParams {
    messages: Vec<ChatMessage>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    max_tokens: Option<usize>,
}

/// Sends the generation endpoint to a `GenerationProvider` and every other
/// endpoint to the fallback dispatcher.
pub struct CollaboratorRouter {
    generation_endpoint: String,
    generator: Arc<dyn GenerationProvider>,
    generation_config: GenerationConfig,
    fallback: Option<Arc<dyn BatchDispatcher>>,
}

impl CollaboratorRouter {
    pub fn new(
        generation_endpoint: impl Into<String>,
        generator: Arc<dyn GenerationProvider>,
        generation_config: GenerationConfig,
    ) -> Self {
        Self {
            generation_endpoint: generation_endpoint.into(),
            generator,
            generation_config,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn BatchDispatcher>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    async fn generate_one(&self, params: Value) -> Result<Value> {
        let params: GenerationParams =
            serde_json::from_value(params).context("Invalid generation parameters")?;
        let config = GenerationConfig {
            temperature: params.temperature.unwrap_or(self.generation_config.temperature),
            max_tokens: params.max_tokens.unwrap_or(self.generation_config.max_tokens),
        };

        let content = self.generator.generate(&params.messages, &config).await?;
        Ok(json!({ "content": content }))
    }
}

#[async_trait::async_trait]
impl BatchDispatcher for CollaboratorRouter {
    async fn dispatch(&self, endpoint: &str, params: Vec<Value>) -> Result<Vec<Value>> {
        if endpoint == self.generation_endpoint {
            let calls = params.into_iter().map(|p| self.generate_one(p));
            return futures::future::join_all(calls).await.into_iter().collect();
        }

        match &self.fallback {
            Some(fallback) => fallback.dispatch(endpoint, params).await,
            None => Err(anyhow!("No collaborator configured for endpoint '{}'", endpoint)),
        }
    }
}

/// Summarization through the generation provider, used when no dedicated
/// summarization service is configured.
pub struct GenerationSummarizer {
    generator: Arc<dyn GenerationProvider>,
    config: GenerationConfig,
}

impl GenerationSummarizer {
    pub fn new(generator: Arc<dyn GenerationProvider>, config: GenerationConfig) -> Self {
        Self { generator, config }
    }
}

#[async_trait::async_trait]
impl Summarizer for GenerationSummarizer {
    async fn summarize(&self, transcript: &str) -> Result<String> {
        let messages = vec![
            ChatMessage::system(
                "Summarize the conversation below in two or three sentences. \
                 Keep names, decisions and open questions.",
            ),
            ChatMessage::user(transcript),
        ];
        self.generator.generate(&messages, &self.config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::collaborators::provider::{MockBatchDispatcher, MockGenerationProvider};

    #[tokio::test]
    async fn test_generation_endpoint_uses_provider_per_item() {
        let mut generator = MockGenerationProvider::new();
        generator
            .expect_generate()
            .times(2)
            .returning(|messages, _| Ok(format!("echo: {}", messages[0].content)));

        let router = CollaboratorRouter::new("generate", Arc::new(generator), GenerationConfig::default());
        let results = router
            .dispatch(
                "generate",
                vec![
                    json!({"messages": [{"role": "user", "content": "one"}]}),
                    json!({"messages": [{"role": "user", "content": "two"}]}),
                ],
            )
            .await
            .unwrap();

        assert_eq!(results, vec![json!({"content": "echo: one"}), json!({"content": "echo: two"})]);
    }

    #[tokio::test]
    async fn test_other_endpoints_go_to_fallback() {
        let mut fallback = MockBatchDispatcher::new();
        fallback
            .expect_dispatch()
            .withf(|endpoint, params| endpoint == "weather" && params.len() == 1)
            .returning(|_, _| Ok(vec![json!({"temp": 21})]));

        let router = CollaboratorRouter::new(
            "generate",
            Arc::new(MockGenerationProvider::new()),
            GenerationConfig::default(),
        )
        .with_fallback(Arc::new(fallback));

        let results = router.dispatch("weather", vec![json!({"city": "Oslo"})]).await.unwrap();
        assert_eq!(results, vec![json!({"temp": 21})]);
    }

    #[tokio::test]
    async fn test_unknown_endpoint_without_fallback_fails() {
        let router = CollaboratorRouter::new(
            "generate",
            Arc::new(MockGenerationProvider::new()),
            GenerationConfig::default(),
        );
        assert!(router.dispatch("weather", vec![json!({})]).await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_generation_params_fail_the_group() {
        let router = CollaboratorRouter::new(
            "generate",
            Arc::new(MockGenerationProvider::new()),
            GenerationConfig::default(),
        );
        assert!(router.dispatch("generate", vec![json!({"prompt": "x"})]).await.is_err());
    }
}
