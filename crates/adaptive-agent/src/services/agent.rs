use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::models::chat::ChatMessage;
use crate::services::cache::{CacheStats, CacheStore};
use crate::services::collaborators::{
    BatchDispatcher, CollaboratorRouter, CollaboratorsConfig, ContextStore, GenerationConfig,
    GenerationProvider, GenerationSummarizer, HttpBatchDispatcher, HttpContextStore,
    HttpGenerationClient, HttpSummarizer, InMemoryContextStore, Summarizer,
};
use crate::services::conversation::{
    ContextError, ContextManager, ContextMetrics, HeuristicSignals, Message, MessageMetadata,
    NewMessage, PersistenceWriter, SessionContext,
};
use crate::services::learning::{
    AdaptationContext, AdaptiveResponse, FeedbackInput, FeedbackRecord, LearningEngine, LearningError,
    LearningExport, LearningMetrics, PersonalizedInsights,
};
use crate::services::optimizer::{
    FetchOptions, OptimizerError, OptimizerStats, PreloadReport, PreloadRequest, RequestOptimizer,
};
use crate::services::telemetry::{
    Alert, MetricCategory, MetricSample, PerformanceMonitor, PerformanceSummary,
};
use crate::utils::token_estimator::estimate_tokens;
use crate::utils::{Clock, ScheduledTask, SystemClock};

const FALLBACK_REPLY: &str =
    "I'm having trouble generating a response right now. Please try again in a moment.";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    pub system_prompt: String,
    /// Most recent messages sent along with each generation request
    pub history_window: usize,
    pub reply_deadline_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are a helpful assistant. Answer clearly and adapt to the user's \
                            preferred level of detail."
                .to_string(),
            history_window: 10,
            reply_deadline_ms: 30_000,
        }
    }
}

/// External systems the agent talks to.
pub struct Collaborators {
    pub generator: Arc<dyn GenerationProvider>,
    pub summarizer: Arc<dyn Summarizer>,
    pub store: Arc<dyn ContextStore>,
    /// Receives every optimizer endpoint other than generation.
    pub fallback: Option<Arc<dyn BatchDispatcher>>,
}

impl Collaborators {
    /// HTTP clients for every configured URL; in-process stand-ins otherwise.
    pub fn from_config(config: &CollaboratorsConfig, generation: &GenerationConfig) -> Result<Self> {
        let generator: Arc<dyn GenerationProvider> = Arc::new(HttpGenerationClient::new(
            config.generation_base_url.clone(),
            config.timeout_seconds,
        )?);

        let summarizer: Arc<dyn Summarizer> = match &config.summarizer_base_url {
            Some(url) => Arc::new(HttpSummarizer::new(url.clone(), config.timeout_seconds)?),
            None => Arc::new(GenerationSummarizer::new(generator.clone(), generation.clone())),
        };

        let store: Arc<dyn ContextStore> = match &config.context_store_base_url {
            Some(url) => Arc::new(HttpContextStore::new(url.clone(), config.timeout_seconds)?),
            None => Arc::new(InMemoryContextStore::new()),
        };

        let fallback = match &config.dispatch_base_url {
            Some(url) => Some(Arc::new(HttpBatchDispatcher::new(url.clone(), config.timeout_seconds)?)
                as Arc<dyn BatchDispatcher>),
            None => None,
        };

        info!(
            generation = %config.generation_base_url,
            external_summarizer = config.summarizer_base_url.is_some(),
            external_store = config.context_store_base_url.is_some(),
            external_dispatch = config.dispatch_base_url.is_some(),
            "Collaborators configured"
        );

        Ok(Self {
            generator,
            summarizer,
            store,
            fallback,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentReply {
    pub message: Message,
    /// True when generation failed and `message` holds the fallback text.
    pub degraded: bool,
    pub adaptations: Vec<String>,
    pub confidence: f64,
    pub response_time_ms: u64,
}

/// Facade over every service. Built explicitly; `start` launches the
/// background tasks and `shutdown` stops them.
pub struct AdaptiveAgent {
    config: AgentConfig,
    generation_endpoint: String,
    cache: Arc<CacheStore>,
    monitor: Arc<PerformanceMonitor>,
    contexts: Arc<ContextManager>,
    persistence: Arc<PersistenceWriter>,
    optimizer: Arc<RequestOptimizer>,
    learning: Arc<LearningEngine>,
    tasks: Mutex<Vec<ScheduledTask>>,
}

impl AdaptiveAgent {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let collaborators = Collaborators::from_config(&settings.collaborators, &settings.generation)?;
        Self::assemble(settings, collaborators, Arc::new(SystemClock))
    }

    pub fn assemble(
        settings: &Settings,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let monitor = Arc::new(PerformanceMonitor::new(settings.telemetry.clone()));
        let cache = Arc::new(CacheStore::new(settings.cache.clone()));

        let persistence = Arc::new(PersistenceWriter::new(
            collaborators.store,
            monitor.clone(),
            settings.retry.clone(),
            settings.persistence.clone(),
        ));

        let contexts = Arc::new(ContextManager::new(
            settings.context.clone(),
            Arc::new(HeuristicSignals::new()?),
            collaborators.summarizer,
            persistence.clone(),
            monitor.clone(),
            settings.retry.clone(),
            clock.clone(),
        ));

        let mut router = CollaboratorRouter::new(
            settings.collaborators.generation_endpoint.clone(),
            collaborators.generator,
            settings.generation.clone(),
        );
        if let Some(fallback) = collaborators.fallback {
            router = router.with_fallback(fallback);
        }

        let optimizer = Arc::new(RequestOptimizer::new(
            settings.optimizer.clone(),
            cache.clone(),
            Arc::new(router),
            monitor.clone(),
        ));

        Ok(Self {
            config: settings.agent.clone(),
            generation_endpoint: settings.collaborators.generation_endpoint.clone(),
            cache,
            monitor,
            contexts,
            persistence,
            optimizer,
            learning: Arc::new(LearningEngine::new(clock)),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Launch the cache sweeper, alert evaluator and persistence writer.
    /// Calling it again while running is a no-op.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }
        self.persistence.start();
        tasks.push(self.cache.spawn_sweeper());
        tasks.push(self.monitor.spawn_evaluator());
        info!(tasks = tasks.len(), "Adaptive agent started");
    }

    /// Wait for in-flight optimizations, stop the scheduled tasks and drain
    /// the persistence queue.
    pub async fn shutdown(&self) {
        self.contexts.wait_all_idle().await;

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            task.stop().await;
        }

        self.persistence.stop().await;
        info!("Adaptive agent stopped");
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn contexts(&self) -> &Arc<ContextManager> {
        &self.contexts
    }

    // ---- Session context ----

    /// Append a message, restoring the session from the context store first
    /// if it is not in memory.
    pub async fn submit_message(
        &self,
        session_id: &str,
        message: NewMessage,
    ) -> Result<Message, ContextError> {
        self.contexts.restore(session_id).await?;
        self.contexts.add_message(session_id, message)
    }

    pub fn get_context(&self, session_id: &str) -> Result<SessionContext, ContextError> {
        self.contexts.get_context(session_id)
    }

    pub fn update_preferences(
        &self,
        session_id: &str,
        patch: Value,
    ) -> Result<SessionContext, ContextError> {
        self.contexts.update_preferences(session_id, patch)
    }

    pub fn clear_old_context(&self, session_id: &str, days: u32) -> Result<usize, ContextError> {
        self.contexts.clear_older_than(session_id, days)
    }

    pub fn get_context_metrics(&self, session_id: &str) -> Result<ContextMetrics, ContextError> {
        self.contexts.get_metrics(session_id)
    }

    /// Store the user's message, generate a reply through the optimizer,
    /// adapt it and store it. A failing generation collaborator yields the
    /// fallback reply with `degraded` set.
    pub async fn respond(&self, session_id: &str, content: &str) -> Result<AgentReply, ContextError> {
        let started = Instant::now();
        self.submit_message(session_id, NewMessage::user(content)).await?;

        let preamble = self.contexts.relevant_context(session_id)?;
        let ctx = self.contexts.get_context(session_id)?;

        let mut messages = vec![ChatMessage::system(format!(
            "{}\n\n{}",
            self.config.system_prompt, preamble
        ))];
        let skip = ctx.messages.len().saturating_sub(self.config.history_window);
        messages.extend(ctx.messages[skip..].iter().map(ChatMessage::from));

        let options = FetchOptions::no_cache()
            .with_deadline(Duration::from_millis(self.config.reply_deadline_ms));
        let fetch = self
            .optimizer
            .fetch(&self.generation_endpoint, json!({ "messages": messages }), options);
        let generated = self
            .monitor
            .measure("generation_time", fetch)
            .await
            .and_then(|value| match value.get("content").and_then(Value::as_str) {
                Some(text) => Ok(text.to_string()),
                None => Err(OptimizerError::Dispatch {
                    endpoint: self.generation_endpoint.clone(),
                    message: "result has no 'content' field".to_string(),
                }),
            });

        let (text, degraded, adaptations, confidence) = match generated {
            Ok(text) => {
                let adapted = self.learning.adapt_response(
                    &text,
                    &AdaptationContext {
                        session_id: Some(session_id.to_string()),
                        conversation_length: ctx.messages.len(),
                    },
                );
                (adapted.adapted, false, adapted.adaptations, adapted.confidence)
            }
            Err(e) => {
                warn!(session_id, "Generation failed, replying with fallback: {}", e);
                self.monitor
                    .record("degraded_replies", 1.0, "count", MetricCategory::System);
                (FALLBACK_REPLY.to_string(), true, Vec::new(), 0.0)
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let metadata = MessageMetadata {
            tokens: Some(estimate_tokens(&text)),
            response_time_ms: Some(elapsed_ms),
            relevance_score: None,
        };
        let message = self
            .contexts
            .add_message(session_id, NewMessage::assistant(text).with_metadata(metadata))?;

        self.monitor.record(
            "response_time",
            elapsed_ms as f64,
            "ms",
            MetricCategory::ResponseTime,
        );
        self.monitor.track_user_interaction("reply", started.elapsed());

        Ok(AgentReply {
            message,
            degraded,
            adaptations,
            confidence,
            response_time_ms: elapsed_ms,
        })
    }

    // ---- Learning ----

    /// Ingest feedback and publish the running average as `user_satisfaction`.
    pub fn record_feedback(&self, feedback: FeedbackInput) -> Result<Uuid, LearningError> {
        let id = self.learning.add_feedback(feedback)?;
        let metrics = self.learning.metrics();
        self.monitor.record(
            "user_satisfaction",
            metrics.average_rating,
            "rating",
            MetricCategory::UserExperience,
        );
        Ok(id)
    }

    pub fn get_learning_metrics(&self) -> LearningMetrics {
        self.learning.metrics()
    }

    pub fn get_feedback_history(&self, limit: usize) -> Vec<FeedbackRecord> {
        self.learning.history(limit)
    }

    pub fn get_personalized_insights(&self, session_id: &str) -> PersonalizedInsights {
        self.learning.personalized_insights(session_id)
    }

    pub fn export_learning_data(&self) -> LearningExport {
        self.learning.export_all()
    }

    pub fn adapt_response(&self, candidate: &str, context: &AdaptationContext) -> AdaptiveResponse {
        self.learning.adapt_response(candidate, context)
    }

    // ---- Telemetry ----

    pub fn record_metric(
        &self,
        name: &str,
        value: f64,
        unit: &str,
        category: MetricCategory,
    ) -> MetricSample {
        self.monitor.record(name, value, unit, category)
    }

    pub fn get_performance_summary(&self) -> PerformanceSummary {
        self.monitor.summary()
    }

    pub fn get_alerts(&self, limit: usize) -> Vec<Alert> {
        self.monitor.alerts(limit)
    }

    pub fn latest_metrics(&self) -> Vec<MetricSample> {
        self.monitor.latest().into_values().collect()
    }

    pub fn metric_history(&self, name: &str, limit: usize) -> Vec<MetricSample> {
        self.monitor.history(name, limit)
    }

    pub fn metrics_by_category(&self, category: MetricCategory) -> Vec<MetricSample> {
        self.monitor.by_category(category)
    }

    /// Record how long a client-side interaction of `kind` took.
    pub fn track_interaction(&self, kind: &str, duration: Duration) {
        self.monitor.track_user_interaction(kind, duration);
    }

    // ---- Cache ----

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop every cached response. Returns how many entries were held.
    pub fn clear_cache(&self) -> usize {
        let entries = self.cache.len();
        self.cache.clear();
        info!(entries, "Cleared response cache");
        entries
    }

    // ---- Request optimization ----

    pub async fn optimized_fetch(
        &self,
        endpoint: &str,
        params: Value,
        options: FetchOptions,
    ) -> Result<Value, OptimizerError> {
        self.optimizer.fetch(endpoint, params, options).await
    }

    pub async fn preload(&self, requests: Vec<PreloadRequest>) -> PreloadReport {
        self.optimizer.preload(requests).await
    }

    pub fn optimizer_stats(&self) -> OptimizerStats {
        self.optimizer.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::collaborators::{MockGenerationProvider, MockSummarizer};
    use crate::services::learning::{FeedbackSnapshot, FeedbackType};
    use crate::utils::{ManualClock, RetryPolicy};
    use anyhow::anyhow;

    fn agent_with(generator: MockGenerationProvider) -> AdaptiveAgent {
        let mut summarizer = MockSummarizer::new();
        summarizer
            .expect_summarize()
            .returning(|_| Ok("summary".to_string()));

        let mut settings = Settings::default();
        settings.retry = RetryPolicy::none();

        let collaborators = Collaborators {
            generator: Arc::new(generator),
            summarizer: Arc::new(summarizer),
            store: Arc::new(InMemoryContextStore::new()),
            fallback: None,
        };
        AdaptiveAgent::assemble(&settings, collaborators, Arc::new(ManualClock::default())).unwrap()
    }

    fn feedback(rating: u8) -> FeedbackInput {
        FeedbackInput {
            message_id: "m1".to_string(),
            session_id: "s1".to_string(),
            rating,
            feedback_type: FeedbackType::Helpful,
            comment: None,
            snapshot: FeedbackSnapshot {
                query: "q".to_string(),
                response: "r".to_string(),
                conversation_length: 2,
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_respond_stores_both_turns_with_metadata() {
        let mut generator = MockGenerationProvider::new();
        generator
            .expect_generate()
            .withf(|messages, _| {
                messages[0].role == "system"
                    && messages.last().map(|m| m.content.as_str()) == Some("What is a batch window?")
            })
            .times(1)
            .returning(|_, _| Ok("A short interval that groups calls.".to_string()));
        let agent = agent_with(generator);
        agent.start();

        let reply = agent.respond("s1", "What is a batch window?").await.unwrap();
        assert!(!reply.degraded);
        assert_eq!(reply.message.content, "A short interval that groups calls.");
        assert_eq!(reply.confidence, 0.7);

        let ctx = agent.get_context("s1").unwrap();
        assert_eq!(ctx.messages.len(), 2);
        let metadata = ctx.messages[1].metadata.clone().unwrap();
        assert!(metadata.tokens.unwrap() > 0.0);
        assert_eq!(metadata.response_time_ms, Some(reply.response_time_ms));
        let latest = agent.monitor().latest();
        assert!(latest.contains_key("response_time"));
        assert!(latest.contains_key("generation_time"));
        assert!(latest.contains_key("user_reply_time"));

        agent.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_respond_degrades_when_generation_fails() {
        let mut generator = MockGenerationProvider::new();
        generator
            .expect_generate()
            .returning(|_, _| Err(anyhow!("model offline")));
        let agent = agent_with(generator);

        let reply = agent.respond("s1", "hello there").await.unwrap();
        assert!(reply.degraded);
        assert_eq!(reply.message.content, FALLBACK_REPLY);
        assert_eq!(agent.get_context("s1").unwrap().messages.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_respond_rejects_invalid_session() {
        let agent = agent_with(MockGenerationProvider::new());
        let err = agent.respond("no spaces", "hello").await.unwrap_err();
        assert!(matches!(err, ContextError::InvalidSessionId(_)));
    }

    #[tokio::test]
    async fn test_feedback_updates_user_satisfaction() {
        let agent = agent_with(MockGenerationProvider::new());
        agent.record_feedback(feedback(5)).unwrap();
        agent.record_feedback(feedback(2)).unwrap();

        let latest = agent.monitor().latest();
        assert_eq!(latest["user_satisfaction"].value, 3.5);
        assert!(agent.record_feedback(feedback(9)).is_err());
        assert_eq!(agent.get_feedback_history(10).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent_and_shutdown_stops_tasks() {
        let agent = agent_with(MockGenerationProvider::new());
        agent.start();
        agent.start();
        assert_eq!(agent.tasks.lock().len(), 2);

        agent.shutdown().await;
        assert!(agent.tasks.lock().is_empty());
    }
}
