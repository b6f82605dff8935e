use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::utils::token_estimator::estimate_tokens;

const MAX_SESSION_ID_LEN: usize = 128;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContextError {
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("preferences patch must be a JSON object")]
    InvalidPreferences,
}

/// Non-empty, at most 128 chars, ASCII alphanumerics plus `_` and `-`.
pub fn validate_session_id(session_id: &str) -> Result<(), ContextError> {
    let valid = !session_id.is_empty()
        && session_id.len() <= MAX_SESSION_ID_LEN
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if valid {
        Ok(())
    } else {
        Err(ContextError::InvalidSessionId(session_id.chars().take(MAX_SESSION_ID_LEN).collect()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
}

/// Stored message. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl Message {
    /// Explicit token count if provided, else the length estimate.
    pub fn tokens(&self) -> f64 {
        self.metadata
            .as_ref()
            .and_then(|m| m.tokens)
            .unwrap_or_else(|| estimate_tokens(&self.content))
    }

    pub fn relevance(&self) -> f64 {
        self.metadata
            .as_ref()
            .and_then(|m| m.relevance_score)
            .unwrap_or(0.0)
    }
}

/// Message as submitted by a caller; id and timestamp are assigned on append.
#[derive(Debug, Clone, Deserialize)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub metadata: Option<MessageMetadata>,
}

impl NewMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            metadata: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommunicationStyle {
    Concise,
    #[default]
    Balanced,
    Detailed,
}

impl CommunicationStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommunicationStyle::Concise => "concise",
            CommunicationStyle::Balanced => "balanced",
            CommunicationStyle::Detailed => "detailed",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub communication_style: CommunicationStyle,
    /// Count of user messages per UTC hour of day.
    pub interaction_hours: [u32; 24],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,
    pub messages: Vec<Message>,
    pub preferences: Map<String, Value>,
    pub topics: Vec<String>,
    pub profile: UserProfile,
    pub memory_usage: f64,
    pub last_optimized: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            preferences: Map::new(),
            topics: Vec::new(),
            profile: UserProfile::default(),
            memory_usage: 0.0,
            last_optimized: now,
            summary: None,
        }
    }

    pub fn total_tokens(&self) -> f64 {
        self.messages.iter().map(Message::tokens).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextMetrics {
    pub session_id: String,
    pub message_count: usize,
    pub memory_usage: f64,
    pub total_tokens: f64,
    pub topic_count: usize,
    pub communication_style: CommunicationStyle,
    pub last_optimized: DateTime<Utc>,
    pub has_summary: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ContextConfig {
    pub max_history_length: usize,
    pub memory_threshold: f64,
    pub optimization_interval_secs: u64,
    /// Messages always kept by an optimization pass.
    pub retain_recent: usize,
    /// Older messages scoring above this relevance survive optimization.
    pub relevance_keep_threshold: f64,
    pub max_topic_tags: usize,
    pub topics_per_message: usize,
    pub summary_window: usize,
    pub summary_min_messages: usize,
    pub token_budget: f64,
    /// Sessions held in memory. Creating one past this evicts the least
    /// recently active idle session; it can be restored from the store.
    pub max_sessions: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_history_length: 50,
            memory_threshold: 0.8,
            optimization_interval_secs: 60 * 60,
            retain_recent: 20,
            relevance_keep_threshold: 0.8,
            max_topic_tags: 20,
            topics_per_message: 3,
            summary_window: 10,
            summary_min_messages: 5,
            token_budget: 10_000.0,
            max_sessions: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_validation() {
        assert!(validate_session_id("session_01-A").is_ok());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id("has space").is_err());
        assert!(validate_session_id("../etc").is_err());
        assert!(validate_session_id(&"a".repeat(128)).is_ok());
        assert!(validate_session_id(&"a".repeat(129)).is_err());
    }

    #[test]
    fn test_message_tokens_prefer_metadata() {
        let now = Utc::now();
        let mut msg = Message {
            id: Uuid::new_v4(),
            role: Role::User,
            content: "12345678".to_string(),
            created_at: now,
            metadata: None,
        };
        assert_eq!(msg.tokens(), 2.0);
        assert_eq!(msg.relevance(), 0.0);

        msg.metadata = Some(MessageMetadata {
            tokens: Some(40.0),
            relevance_score: Some(0.9),
            ..Default::default()
        });
        assert_eq!(msg.tokens(), 40.0);
        assert_eq!(msg.relevance(), 0.9);
    }

    #[test]
    fn test_context_round_trips_through_json() {
        let ctx = SessionContext::new("abc", Utc::now());
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["profile"]["communication_style"], "balanced");
        let back: SessionContext = serde_json::from_value(json).unwrap();
        assert_eq!(back, ctx);
    }
}
