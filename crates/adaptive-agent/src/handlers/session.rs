use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use tracing::info;

use crate::models::api::{ClearHistoryQuery, ClearHistoryResponse, ReplyRequest};
use crate::services::conversation::{ContextMetrics, Message, NewMessage, SessionContext};
use crate::services::{AdaptiveAgent, AgentReply};
use crate::utils::error::ApiError;

pub async fn submit_message_handler(
    Extension(agent): Extension<Arc<AdaptiveAgent>>,
    Path(session_id): Path<String>,
    Json(message): Json<NewMessage>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    if message.content.trim().is_empty() {
        return Err(ApiError::BadRequest("content must not be empty".to_string()));
    }

    let stored = agent.submit_message(&session_id, message).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn reply_handler(
    Extension(agent): Extension<Arc<AdaptiveAgent>>,
    Path(session_id): Path<String>,
    Json(request): Json<ReplyRequest>,
) -> Result<Json<AgentReply>, ApiError> {
    if request.content.trim().is_empty() {
        return Err(ApiError::BadRequest("content must not be empty".to_string()));
    }
    info!("Reply request for session {}", session_id);

    let reply = agent.respond(&session_id, &request.content).await?;
    Ok(Json(reply))
}

pub async fn get_context_handler(
    Extension(agent): Extension<Arc<AdaptiveAgent>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionContext>, ApiError> {
    Ok(Json(agent.get_context(&session_id)?))
}

pub async fn update_preferences_handler(
    Extension(agent): Extension<Arc<AdaptiveAgent>>,
    Path(session_id): Path<String>,
    Json(patch): Json<Value>,
) -> Result<Json<SessionContext>, ApiError> {
    Ok(Json(agent.update_preferences(&session_id, patch)?))
}

pub async fn clear_history_handler(
    Extension(agent): Extension<Arc<AdaptiveAgent>>,
    Path(session_id): Path<String>,
    Query(query): Query<ClearHistoryQuery>,
) -> Result<Json<ClearHistoryResponse>, ApiError> {
    let removed = agent.clear_old_context(&session_id, query.days)?;
    Ok(Json(ClearHistoryResponse { session_id, removed }))
}

pub async fn context_metrics_handler(
    Extension(agent): Extension<Arc<AdaptiveAgent>>,
    Path(session_id): Path<String>,
) -> Result<Json<ContextMetrics>, ApiError> {
    Ok(Json(agent.get_context_metrics(&session_id)?))
}
