use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LearningError {
    #[error("rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackType {
    Excellent,
    Helpful,
    Incomplete,
    Incorrect,
    Unhelpful,
}

impl FeedbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackType::Excellent => "excellent",
            FeedbackType::Helpful => "helpful",
            FeedbackType::Incomplete => "incomplete",
            FeedbackType::Incorrect => "incorrect",
            FeedbackType::Unhelpful => "unhelpful",
        }
    }
}

/// What the user was looking at when rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSnapshot {
    pub query: String,
    pub response: String,
    pub conversation_length: usize,
}

/// Feedback as submitted; id and timestamp are assigned on ingestion.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackInput {
    pub message_id: String,
    pub session_id: String,
    pub rating: u8,
    pub feedback_type: FeedbackType,
    #[serde(default)]
    pub comment: Option<String>,
    pub snapshot: FeedbackSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: Uuid,
    pub message_id: String,
    pub session_id: String,
    pub rating: u8,
    pub feedback_type: FeedbackType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub snapshot: FeedbackSnapshot,
}

impl FeedbackRecord {
    pub fn response_len(&self) -> usize {
        self.snapshot.response.chars().count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LearningMetrics {
    pub average_rating: f64,
    pub total_feedback: usize,
    pub response_patterns: BTreeMap<String, usize>,
    /// Top three areas by count.
    pub improvement_areas: Vec<String>,
    pub successful_patterns: Vec<String>,
    /// Full counts behind the rankings.
    pub improvement_weights: BTreeMap<String, usize>,
    pub success_weights: BTreeMap<String, usize>,
    /// Last ten ratings, oldest first.
    pub satisfaction_trend: Vec<u8>,
}

/// Caller context passed alongside a candidate response.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AdaptationContext {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub conversation_length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdaptiveResponse {
    pub original: String,
    pub adapted: String,
    pub reason: String,
    pub confidence: f64,
    pub adaptations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonalizedInsights {
    pub session_id: String,
    pub preferences: Map<String, Value>,
    pub recommended_improvements: Vec<String>,
    pub satisfaction_score: f64,
    pub feedback_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackSummary {
    pub by_type: BTreeMap<String, usize>,
    pub by_rating: BTreeMap<u8, usize>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportInsights {
    pub top_improvement_areas: Vec<String>,
    pub top_success_patterns: Vec<String>,
    pub satisfaction_trend: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LearningExport {
    pub metrics: LearningMetrics,
    pub summary: FeedbackSummary,
    pub insights: ExportInsights,
}
