use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    Json,
};

use crate::models::api::{InteractionRequest, LimitQuery, MetricsQuery, RecordMetricRequest};
use crate::services::telemetry::{Alert, MetricSample, PerformanceSummary};
use crate::services::AdaptiveAgent;
use crate::utils::error::ApiError;

const DEFAULT_ALERT_LIMIT: usize = 10;
const DEFAULT_METRIC_HISTORY: usize = 100;

pub async fn record_metric_handler(
    Extension(agent): Extension<Arc<AdaptiveAgent>>,
    Json(request): Json<RecordMetricRequest>,
) -> Result<(StatusCode, Json<MetricSample>), ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError::BadRequest("metric name must not be empty".to_string()));
    }
    if !request.value.is_finite() {
        return Err(ApiError::BadRequest("metric value must be finite".to_string()));
    }

    let sample = agent.record_metric(&request.name, request.value, &request.unit, request.category);
    Ok((StatusCode::CREATED, Json(sample)))
}

pub async fn summary_handler(Extension(agent): Extension<Arc<AdaptiveAgent>>) -> Json<PerformanceSummary> {
    Json(agent.get_performance_summary())
}

pub async fn alerts_handler(
    Extension(agent): Extension<Arc<AdaptiveAgent>>,
    Query(query): Query<LimitQuery>,
) -> Json<Vec<Alert>> {
    Json(agent.get_alerts(query.limit.unwrap_or(DEFAULT_ALERT_LIMIT)))
}

pub async fn metrics_handler(
    Extension(agent): Extension<Arc<AdaptiveAgent>>,
    Query(query): Query<MetricsQuery>,
) -> Json<Vec<MetricSample>> {
    let samples = match (query.name, query.category) {
        (Some(name), _) => agent.metric_history(&name, query.limit.unwrap_or(DEFAULT_METRIC_HISTORY)),
        (None, Some(category)) => {
            let mut samples = agent.metrics_by_category(category);
            if let Some(limit) = query.limit {
                let skip = samples.len().saturating_sub(limit);
                samples.drain(..skip);
            }
            samples
        }
        (None, None) => agent.latest_metrics(),
    };
    Json(samples)
}

pub async fn track_interaction_handler(
    Extension(agent): Extension<Arc<AdaptiveAgent>>,
    Json(request): Json<InteractionRequest>,
) -> Result<StatusCode, ApiError> {
    if request.kind.trim().is_empty() {
        return Err(ApiError::BadRequest("interaction kind must not be empty".to_string()));
    }

    agent.track_interaction(&request.kind, Duration::from_millis(request.duration_ms));
    Ok(StatusCode::NO_CONTENT)
}
