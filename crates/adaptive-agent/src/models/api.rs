use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::services::learning::AdaptationContext;
use crate::services::optimizer::{FetchOptions, PreloadRequest};
use crate::services::telemetry::MetricCategory;

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ClearHistoryQuery {
    pub days: u32,
}

#[derive(Debug, Serialize)]
pub struct ClearHistoryResponse {
    pub session_id: String,
    pub removed: usize,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct FeedbackAccepted {
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RecordMetricRequest {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    pub category: MetricCategory,
}

/// Filters for metric reads. `name` wins over `category`; neither returns
/// the latest sample of every metric.
#[derive(Debug, Default, Deserialize)]
pub struct MetricsQuery {
    pub name: Option<String>,
    pub category: Option<MetricCategory>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct InteractionRequest {
    pub kind: String,
    pub duration_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct AdaptRequest {
    pub response: String,
    #[serde(default)]
    pub context: AdaptationContext,
}

#[derive(Debug, Serialize)]
pub struct CacheCleared {
    pub cleared: usize,
}

#[derive(Debug, Deserialize)]
pub struct FetchRequest {
    pub endpoint: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub options: FetchOptions,
}

#[derive(Debug, Serialize)]
pub struct FetchResponse {
    pub endpoint: String,
    pub data: Value,
}

#[derive(Debug, Deserialize)]
pub struct PreloadBody {
    pub requests: Vec<PreloadRequest>,
}
