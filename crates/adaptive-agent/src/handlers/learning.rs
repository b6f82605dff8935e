use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    Json,
};

use crate::models::api::{AdaptRequest, FeedbackAccepted, LimitQuery};
use crate::services::learning::{
    AdaptiveResponse, FeedbackInput, FeedbackRecord, LearningExport, LearningMetrics,
    PersonalizedInsights,
};
use crate::services::AdaptiveAgent;
use crate::utils::error::ApiError;

const DEFAULT_HISTORY_LIMIT: usize = 50;

pub async fn record_feedback_handler(
    Extension(agent): Extension<Arc<AdaptiveAgent>>,
    Json(feedback): Json<FeedbackInput>,
) -> Result<(StatusCode, Json<FeedbackAccepted>), ApiError> {
    let id = agent.record_feedback(feedback)?;
    Ok((StatusCode::CREATED, Json(FeedbackAccepted { id })))
}

pub async fn learning_metrics_handler(
    Extension(agent): Extension<Arc<AdaptiveAgent>>,
) -> Json<LearningMetrics> {
    Json(agent.get_learning_metrics())
}

pub async fn feedback_history_handler(
    Extension(agent): Extension<Arc<AdaptiveAgent>>,
    Query(query): Query<LimitQuery>,
) -> Json<Vec<FeedbackRecord>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Json(agent.get_feedback_history(limit))
}

pub async fn insights_handler(
    Extension(agent): Extension<Arc<AdaptiveAgent>>,
    Path(session_id): Path<String>,
) -> Json<PersonalizedInsights> {
    Json(agent.get_personalized_insights(&session_id))
}

pub async fn export_handler(Extension(agent): Extension<Arc<AdaptiveAgent>>) -> Json<LearningExport> {
    Json(agent.export_learning_data())
}

pub async fn adapt_response_handler(
    Extension(agent): Extension<Arc<AdaptiveAgent>>,
    Json(request): Json<AdaptRequest>,
) -> Result<Json<AdaptiveResponse>, ApiError> {
    if request.response.trim().is_empty() {
        return Err(ApiError::BadRequest("response must not be empty".to_string()));
    }
    Ok(Json(agent.adapt_response(&request.response, &request.context)))
}
