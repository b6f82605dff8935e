use std::sync::Arc;

use axum::{extract::Extension, Json};

use crate::models::api::{FetchRequest, FetchResponse, PreloadBody};
use crate::services::collaborators::validate_endpoint;
use crate::services::optimizer::{OptimizerStats, PreloadReport};
use crate::services::AdaptiveAgent;
use crate::utils::error::ApiError;

pub async fn fetch_handler(
    Extension(agent): Extension<Arc<AdaptiveAgent>>,
    Json(request): Json<FetchRequest>,
) -> Result<Json<FetchResponse>, ApiError> {
    validate_endpoint(&request.endpoint).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let data = agent
        .optimized_fetch(&request.endpoint, request.params, request.options)
        .await?;
    Ok(Json(FetchResponse {
        endpoint: request.endpoint,
        data,
    }))
}

pub async fn preload_handler(
    Extension(agent): Extension<Arc<AdaptiveAgent>>,
    Json(body): Json<PreloadBody>,
) -> Json<PreloadReport> {
    Json(agent.preload(body.requests).await)
}

pub async fn stats_handler(Extension(agent): Extension<Arc<AdaptiveAgent>>) -> Json<OptimizerStats> {
    Json(agent.optimizer_stats())
}
