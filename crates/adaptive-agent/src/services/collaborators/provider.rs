use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::chat::ChatMessage;
use crate::services::conversation::SessionContext;

/// Sampling parameters forwarded to the generation collaborator.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_tokens: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

/// Where each collaborator lives. Unset optional URLs fall back to
/// in-process implementations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CollaboratorsConfig {
    pub generation_base_url: String,
    /// Optimizer endpoint name routed to the generation provider.
    pub generation_endpoint: String,
    pub summarizer_base_url: Option<String>,
    pub context_store_base_url: Option<String>,
    pub dispatch_base_url: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for CollaboratorsConfig {
    fn default() -> Self {
        Self {
            generation_base_url: "http://127.0.0.1:8081".to_string(),
            generation_endpoint: "generate".to_string(),
            summarizer_base_url: None,
            context_store_base_url: None,
            dispatch_base_url: None,
            timeout_seconds: 30,
        }
    }
}

/// Durable storage for session contexts.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ContextStore: Send + Sync {
    async fn save(&self, session_id: &str, context: &SessionContext) -> Result<()>;
    async fn load(&self, session_id: &str) -> Result<Option<SessionContext>>;
}

/// Natural-language generation.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage], config: &GenerationConfig) -> Result<String>;
}

/// Condenses a conversation transcript.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, transcript: &str) -> Result<String>;
}

/// Executes one grouped call: one result per parameter set, in input order.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait BatchDispatcher: Send + Sync {
    async fn dispatch(&self, endpoint: &str, params: Vec<Value>) -> Result<Vec<Value>>;
}
