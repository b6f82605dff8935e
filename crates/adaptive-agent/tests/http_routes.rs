//! Router-level checks: requests go through the full axum stack without a
//! listening socket.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use adaptive_agent::build_router;
use adaptive_agent::config::Settings;
use adaptive_agent::models::ChatMessage;
use adaptive_agent::services::collaborators::{
    GenerationConfig, GenerationProvider, InMemoryContextStore, Summarizer,
};
use adaptive_agent::services::{AdaptiveAgent, Collaborators};
use adaptive_agent::utils::{ManualClock, RetryPolicy};

struct CannedGenerator;

#[async_trait::async_trait]
impl GenerationProvider for CannedGenerator {
    async fn generate(&self, _messages: &[ChatMessage], _config: &GenerationConfig) -> Result<String> {
        Ok("canned".to_string())
    }
}

struct CannedSummarizer;

#[async_trait::async_trait]
impl Summarizer for CannedSummarizer {
    async fn summarize(&self, _transcript: &str) -> Result<String> {
        Ok("summary".to_string())
    }
}

fn app() -> (Arc<AdaptiveAgent>, Router) {
    let settings = Settings {
        retry: RetryPolicy::none(),
        ..Settings::default()
    };
    let collaborators = Collaborators {
        generator: Arc::new(CannedGenerator),
        summarizer: Arc::new(CannedSummarizer),
        store: Arc::new(InMemoryContextStore::new()),
        fallback: None,
    };
    let agent = Arc::new(
        AdaptiveAgent::assemble(&settings, collaborators, Arc::new(ManualClock::default())).unwrap(),
    );
    let router = build_router(agent.clone());
    (agent, router)
}

async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn adapt_response_applies_learned_adaptations() {
    let (_agent, router) = app();

    let (status, _) = call(
        &router,
        "POST",
        "/api/feedback",
        Some(json!({
            "message_id": "m1",
            "session_id": "s1",
            "rating": 2,
            "feedback_type": "incomplete",
            "snapshot": { "query": "q", "response": "too short", "conversation_length": 2 }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(
        &router,
        "POST",
        "/api/learning/adapt-response",
        Some(json!({
            "response": "Use a smaller window.",
            "context": { "session_id": "s1", "conversation_length": 2 }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["original"], "Use a smaller window.");
    assert_eq!(body["adaptations"], json!(["Added more detailed explanation"]));

    // Context is optional
    let (status, body) = call(
        &router,
        "POST",
        "/api/learning/adapt-response",
        Some(json!({ "response": "Plain." })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["original"], "Plain.");

    let (status, _) = call(
        &router,
        "POST",
        "/api/learning/adapt-response",
        Some(json!({ "response": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn metrics_can_be_read_by_name_category_or_latest() {
    let (_agent, router) = app();

    for value in [10.0, 20.0, 30.0] {
        let (status, _) = call(
            &router,
            "POST",
            "/api/performance/metrics",
            Some(json!({ "name": "cpu", "value": value, "unit": "%", "category": "system" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    call(
        &router,
        "POST",
        "/api/performance/metrics",
        Some(json!({ "name": "memory_usage", "value": 0.4, "category": "memory" })),
    )
    .await;

    let (status, body) = call(&router, "GET", "/api/performance/metrics?name=cpu&limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    let values: Vec<f64> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["value"].as_f64().unwrap())
        .collect();
    assert_eq!(values, vec![20.0, 30.0]);

    let (_, body) = call(&router, "GET", "/api/performance/metrics?category=system", None).await;
    assert_eq!(body.as_array().unwrap().len(), 3);

    let (_, body) = call(&router, "GET", "/api/performance/metrics?category=memory", None).await;
    assert_eq!(body[0]["name"], "memory_usage");

    let (_, body) = call(&router, "GET", "/api/performance/metrics", None).await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, _) = call(&router, "GET", "/api/performance/metrics?category=bogus", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn interactions_are_recorded_as_user_experience() {
    let (agent, router) = app();

    let (status, body) = call(
        &router,
        "POST",
        "/api/performance/interactions",
        Some(json!({ "kind": "scroll", "duration_ms": 120 })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let history = agent.metric_history("user_scroll_time", 10);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].value, 120.0);

    let (status, _) = call(
        &router,
        "POST",
        "/api/performance/interactions",
        Some(json!({ "kind": "", "duration_ms": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cache_stats_and_clear() {
    let (agent, router) = app();
    agent.cache().set("a", json!(1), None);
    agent.cache().set("b", json!(2), None);
    agent.cache().get("a");

    let (status, body) = call(&router, "GET", "/api/cache/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["size"], 2);
    assert_eq!(body["hits"], 1);

    let (status, body) = call(&router, "DELETE", "/api/cache", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], 2);

    let (_, body) = call(&router, "GET", "/api/cache/stats", None).await;
    assert_eq!(body["size"], 0);
}

#[tokio::test]
async fn fetch_rejects_endpoints_that_are_not_a_single_segment() {
    let (_agent, router) = app();

    for endpoint in ["", "../admin", "search/extra"] {
        let (status, body) = call(
            &router,
            "POST",
            "/api/optimizer/fetch",
            Some(json!({ "endpoint": endpoint, "params": {} })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "BadRequest");
    }
}
