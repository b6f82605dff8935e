use std::sync::Arc;

use axum::{extract::Extension, Json};

use crate::models::api::CacheCleared;
use crate::services::cache::CacheStats;
use crate::services::AdaptiveAgent;

pub async fn stats_handler(Extension(agent): Extension<Arc<AdaptiveAgent>>) -> Json<CacheStats> {
    Json(agent.cache_stats())
}

pub async fn clear_handler(Extension(agent): Extension<Arc<AdaptiveAgent>>) -> Json<CacheCleared> {
    Json(CacheCleared {
        cleared: agent.clear_cache(),
    })
}
