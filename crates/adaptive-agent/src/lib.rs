pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use axum::{
    routing::{delete, get, patch, post},
    Extension, Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use services::AdaptiveAgent;

pub fn build_router(agent: Arc<AdaptiveAgent>) -> Router {
    let session_routes = Router::new()
        .route("/api/sessions/{id}/messages", post(handlers::session::submit_message_handler))
        .route("/api/sessions/{id}/reply", post(handlers::session::reply_handler))
        .route("/api/sessions/{id}/context", get(handlers::session::get_context_handler))
        .route(
            "/api/sessions/{id}/preferences",
            patch(handlers::session::update_preferences_handler),
        )
        .route("/api/sessions/{id}/history", delete(handlers::session::clear_history_handler))
        .route("/api/sessions/{id}/metrics", get(handlers::session::context_metrics_handler));

    let learning_routes = Router::new()
        .route("/api/feedback", post(handlers::learning::record_feedback_handler))
        .route("/api/learning/metrics", get(handlers::learning::learning_metrics_handler))
        .route("/api/learning/history", get(handlers::learning::feedback_history_handler))
        .route("/api/learning/insights/{id}", get(handlers::learning::insights_handler))
        .route("/api/learning/export", get(handlers::learning::export_handler))
        .route(
            "/api/learning/adapt-response",
            post(handlers::learning::adapt_response_handler),
        );

    let performance_routes = Router::new()
        .route(
            "/api/performance/metrics",
            post(handlers::performance::record_metric_handler)
                .get(handlers::performance::metrics_handler),
        )
        .route(
            "/api/performance/interactions",
            post(handlers::performance::track_interaction_handler),
        )
        .route("/api/performance/summary", get(handlers::performance::summary_handler))
        .route("/api/performance/alerts", get(handlers::performance::alerts_handler));

    let optimizer_routes = Router::new()
        .route("/api/optimizer/fetch", post(handlers::optimizer::fetch_handler))
        .route("/api/optimizer/preload", post(handlers::optimizer::preload_handler))
        .route("/api/optimizer/stats", get(handlers::optimizer::stats_handler));

    let cache_routes = Router::new()
        .route("/api/cache", delete(handlers::cache::clear_handler))
        .route("/api/cache/stats", get(handlers::cache::stats_handler));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(session_routes)
        .merge(learning_routes)
        .merge(performance_routes)
        .merge(optimizer_routes)
        .merge(cache_routes)
        .layer(Extension(agent))
        // CORS
        .layer(CorsLayer::permissive())
        // Tracing
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
}
