use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::services::AdaptiveAgent;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
    cache_entries: usize,
    active_sessions: usize,
}

pub async fn health_check(
    Extension(agent): Extension<Arc<AdaptiveAgent>>,
) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            cache_entries: agent.cache().len(),
            active_sessions: agent.contexts().session_count(),
        }),
    )
}
