use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::persistence::PersistenceWriter;
use super::signals::SignalExtractor;
use super::types::{
    validate_session_id, ContextConfig, ContextError, ContextMetrics, Message, NewMessage, Role,
    SessionContext,
};
use crate::services::collaborators::Summarizer;
use crate::services::telemetry::{MetricCategory, PerformanceMonitor};
use crate::utils::token_estimator::memory_fraction;
use crate::utils::{Clock, RetryPolicy};

const RELEVANT_TOPICS: usize = 5;
const EVICTION_ATTEMPTS: usize = 8;

/// Per-session state. The mutex is the single writer; `optimizing` is true
/// while a deferred optimization pass is in flight.
struct SessionSlot {
    context: Mutex<SessionContext>,
    optimizing: watch::Sender<bool>,
    /// Bumped on every append; lets a finishing pass see new traffic.
    revision: AtomicU64,
    /// Millisecond timestamp of the last write.
    last_active: AtomicI64,
    /// Set under the context lock once the slot leaves the session map.
    retired: AtomicBool,
}

impl SessionSlot {
    fn new(context: SessionContext, now: DateTime<Utc>) -> Self {
        let (optimizing, _) = watch::channel(false);
        Self {
            context: Mutex::new(context),
            optimizing,
            revision: AtomicU64::new(0),
            last_active: AtomicI64::new(now.timestamp_millis()),
            retired: AtomicBool::new(false),
        }
    }

    fn touch(&self, now: DateTime<Utc>) {
        self.last_active.store(now.timestamp_millis(), Ordering::Relaxed);
    }
}

/// Owns every session context: bounded history, topics, profile and the
/// summarization lifecycle.
pub struct ContextManager {
    sessions: DashMap<String, Arc<SessionSlot>>,
    config: ContextConfig,
    signals: Arc<dyn SignalExtractor>,
    summarizer: Arc<dyn Summarizer>,
    persistence: Arc<PersistenceWriter>,
    monitor: Arc<PerformanceMonitor>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl ContextManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ContextConfig,
        signals: Arc<dyn SignalExtractor>,
        summarizer: Arc<dyn Summarizer>,
        persistence: Arc<PersistenceWriter>,
        monitor: Arc<PerformanceMonitor>,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        info!(
            max_history = config.max_history_length,
            memory_threshold = config.memory_threshold,
            "Initializing context manager"
        );
        Self {
            sessions: DashMap::new(),
            config,
            signals,
            summarizer,
            persistence,
            monitor,
            retry,
            clock,
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn slot(&self, session_id: &str) -> Result<Arc<SessionSlot>, ContextError> {
        validate_session_id(session_id)?;
        self.sessions
            .get(session_id)
            .map(|s| s.value().clone())
            .ok_or_else(|| ContextError::SessionNotFound(session_id.to_string()))
    }

    fn slot_or_create(&self, session_id: &str) -> Result<Arc<SessionSlot>, ContextError> {
        validate_session_id(session_id)?;
        if !self.sessions.contains_key(session_id) {
            self.make_room();
        }
        let slot = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!(session_id, "Creating session context");
                let now = self.clock.now();
                Arc::new(SessionSlot::new(SessionContext::new(session_id, now), now))
            })
            .value()
            .clone();
        Ok(slot)
    }

    /// Evict least recently active idle sessions until a new one fits.
    fn make_room(&self) {
        let mut attempts = 0;
        while self.sessions.len() >= self.config.max_sessions && attempts < EVICTION_ATTEMPTS {
            attempts += 1;
            let victim = self
                .sessions
                .iter()
                .filter(|e| !*e.value().optimizing.borrow())
                .min_by_key(|e| e.value().last_active.load(Ordering::Relaxed))
                .map(|e| (e.key().clone(), e.value().clone()));
            let Some((session_id, slot)) = victim else {
                warn!(sessions = self.sessions.len(), "Session limit reached but every session is busy");
                return;
            };
            if self.retire_if(&session_id, &slot, |_| true) {
                info!(session_id = %session_id, "Evicted least recently active session");
            }
        }
    }

    /// Drop `slot` from the map when it is still the live slot for the
    /// session, no pass is in flight and `releasable` holds for its context.
    fn retire_if(
        &self,
        session_id: &str,
        slot: &Arc<SessionSlot>,
        releasable: impl Fn(&SessionContext) -> bool,
    ) -> bool {
        self.sessions
            .remove_if(session_id, |_, current| {
                if !Arc::ptr_eq(current, slot) {
                    return false;
                }
                let ctx = slot.context.lock();
                if *slot.optimizing.borrow() || !releasable(&ctx) {
                    return false;
                }
                slot.retired.store(true, Ordering::SeqCst);
                true
            })
            .is_some()
    }

    fn recompute_memory(&self, ctx: &mut SessionContext) {
        ctx.memory_usage = memory_fraction(ctx.total_tokens(), self.config.token_budget);
    }

    fn needs_optimization(&self, ctx: &SessionContext, now: DateTime<Utc>) -> bool {
        let interval = ChronoDuration::seconds(self.config.optimization_interval_secs as i64);
        ctx.memory_usage > self.config.memory_threshold
            || ctx.messages.len() > self.config.max_history_length
            || now - ctx.last_optimized > interval
    }

    fn persist(&self, session_id: &str, ctx: SessionContext) {
        self.monitor
            .record("memory_usage", ctx.memory_usage, "fraction", MetricCategory::Memory);
        self.persistence.enqueue(session_id, ctx);
    }

    /// Append a message. Returns as soon as the message is stored; any
    /// optimization it triggers runs in the background.
    pub fn add_message(
        self: &Arc<Self>,
        session_id: &str,
        message: NewMessage,
    ) -> Result<Message, ContextError> {
        let now = self.clock.now();

        let stored = Message {
            id: Uuid::new_v4(),
            role: message.role,
            content: message.content,
            created_at: now,
            metadata: message.metadata,
        };

        let (slot, snapshot, spawn_pass) = loop {
            let slot = self.slot_or_create(session_id)?;
            let mut ctx = slot.context.lock();
            if slot.retired.load(Ordering::SeqCst) {
                continue;
            }
            slot.touch(now);
            ctx.messages.push(stored.clone());
            self.recompute_memory(&mut ctx);

            let topics = self.signals.topics(&stored.content, self.config.topics_per_message);
            for topic in topics {
                if !ctx.topics.contains(&topic) {
                    ctx.topics.push(topic);
                }
            }
            let overflow = ctx.topics.len().saturating_sub(self.config.max_topic_tags);
            ctx.topics.drain(..overflow);

            if stored.role == Role::User {
                ctx.profile.interaction_hours[now.hour() as usize] += 1;
                ctx.profile.communication_style = self.signals.style(&stored.content);
            }

            slot.revision.fetch_add(1, Ordering::SeqCst);

            let spawn_pass = self.needs_optimization(&ctx, now) && !*slot.optimizing.borrow();
            if spawn_pass {
                slot.optimizing.send_replace(true);
            }
            let snapshot = ctx.clone();
            drop(ctx);
            break (slot, snapshot, spawn_pass);
        };

        self.persist(session_id, snapshot);

        if spawn_pass {
            let manager = Arc::clone(self);
            let session_id = session_id.to_string();
            tokio::spawn(async move {
                manager.run_optimization(session_id, slot).await;
            });
        }

        Ok(stored)
    }

    /// Optimization passes until the trigger no longer holds for traffic
    /// that arrived during the previous pass.
    async fn run_optimization(self: Arc<Self>, session_id: String, slot: Arc<SessionSlot>) {
        loop {
            let started_revision = slot.revision.load(Ordering::SeqCst);
            let transcript = {
                let mut ctx = slot.context.lock();
                self.compact(&mut ctx)
            };

            if let Some(transcript) = transcript {
                let result = self
                    .retry
                    .run("summarize conversation", || self.summarizer.summarize(&transcript))
                    .await;

                match result {
                    Ok(summary) => {
                        slot.context.lock().summary = Some(summary);
                    }
                    Err(e) => {
                        warn!(session_id = %session_id, "Summarization failed, keeping prior summary: {:#}", e);
                        self.monitor
                            .record("summarization_failures", 1.0, "count", MetricCategory::System);
                    }
                }
            }

            let snapshot = slot.context.lock().clone();
            self.persist(&session_id, snapshot);

            // Decide and clear the flag under the context lock so a concurrent
            // append either sees the flag cleared or is picked up here.
            let again = {
                let ctx = slot.context.lock();
                let changed = slot.revision.load(Ordering::SeqCst) != started_revision;
                let again = changed && self.needs_optimization(&ctx, self.clock.now());
                if !again {
                    slot.optimizing.send_replace(false);
                }
                again
            };

            if !again {
                break;
            }
            debug!(session_id = %session_id, "Trigger still holds, running another optimization pass");
        }
    }

    /// Trim history, stamp `last_optimized` and return the transcript to
    /// summarize, if the history is long enough to warrant one.
    fn compact(&self, ctx: &mut SessionContext) -> Option<String> {
        let before = ctx.messages.len();
        let retain = self.config.retain_recent.min(self.config.max_history_length);

        if before > retain {
            let split = before - retain;
            let recent = ctx.messages.split_off(split);
            let mut relevant: Vec<Message> = std::mem::take(&mut ctx.messages)
                .into_iter()
                .filter(|m| m.relevance() > self.config.relevance_keep_threshold)
                .collect();

            let room = self.config.max_history_length - retain;
            let excess = relevant.len().saturating_sub(room);
            relevant.drain(..excess);

            relevant.extend(recent);
            ctx.messages = relevant;
        }

        ctx.last_optimized = self.clock.now();
        self.recompute_memory(ctx);

        info!(
            session_id = %ctx.session_id,
            before,
            after = ctx.messages.len(),
            memory_usage = ctx.memory_usage,
            "Context optimized"
        );

        if ctx.messages.len() < self.config.summary_min_messages {
            return None;
        }
        let skip = ctx.messages.len().saturating_sub(self.config.summary_window);
        let transcript = ctx.messages[skip..]
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content))
            .collect::<Vec<_>>()
            .join("\n");
        Some(transcript)
    }

    pub fn get_context(&self, session_id: &str) -> Result<SessionContext, ContextError> {
        let slot = self.slot(session_id)?;
        let ctx = slot.context.lock().clone();
        Ok(ctx)
    }

    /// Shallow-merge a JSON object into the session's preferences.
    pub fn update_preferences(
        &self,
        session_id: &str,
        patch: Value,
    ) -> Result<SessionContext, ContextError> {
        let Value::Object(patch) = patch else {
            return Err(ContextError::InvalidPreferences);
        };
        let snapshot = loop {
            let slot = self.slot_or_create(session_id)?;
            let mut ctx = slot.context.lock();
            if slot.retired.load(Ordering::SeqCst) {
                continue;
            }
            slot.touch(self.clock.now());
            for (key, value) in &patch {
                ctx.preferences.insert(key.clone(), value.clone());
            }
            break ctx.clone();
        };

        self.persist(session_id, snapshot.clone());
        Ok(snapshot)
    }

    /// Drop messages older than `days`. Returns how many were removed. A
    /// session left with no messages and no preferences is released.
    pub fn clear_older_than(&self, session_id: &str, days: u32) -> Result<usize, ContextError> {
        let slot = self.slot(session_id)?;
        // Past chrono's range nothing can be older than the cutoff.
        let cutoff = ChronoDuration::try_days(days as i64)
            .and_then(|age| self.clock.now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let (removed, snapshot) = {
            let mut ctx = slot.context.lock();
            let before = ctx.messages.len();
            ctx.messages.retain(|m| m.created_at >= cutoff);
            self.recompute_memory(&mut ctx);
            (before - ctx.messages.len(), ctx.clone())
        };

        if removed > 0 {
            info!(session_id, removed, days, "Cleared old messages");
        }
        self.persist(session_id, snapshot);

        if self.retire_if(session_id, &slot, |ctx| {
            ctx.messages.is_empty() && ctx.preferences.is_empty()
        }) {
            debug!(session_id, "Released empty session");
        }
        Ok(removed)
    }

    pub fn get_metrics(&self, session_id: &str) -> Result<ContextMetrics, ContextError> {
        let slot = self.slot(session_id)?;
        let ctx = slot.context.lock();

        Ok(ContextMetrics {
            session_id: ctx.session_id.clone(),
            message_count: ctx.messages.len(),
            memory_usage: ctx.memory_usage,
            total_tokens: ctx.total_tokens(),
            topic_count: ctx.topics.len(),
            communication_style: ctx.profile.communication_style,
            last_optimized: ctx.last_optimized,
            has_summary: ctx.summary.is_some(),
        })
    }

    /// Prompt preamble: summary, style, recent topics and preferences.
    pub fn relevant_context(&self, session_id: &str) -> Result<String, ContextError> {
        let slot = self.slot(session_id)?;
        let ctx = slot.context.lock();
        let mut parts = Vec::new();

        if let Some(summary) = &ctx.summary {
            parts.push(format!("Previous conversation summary: {}", summary));
        }
        parts.push(format!(
            "User prefers {} responses",
            ctx.profile.communication_style.as_str()
        ));
        if !ctx.topics.is_empty() {
            let skip = ctx.topics.len().saturating_sub(RELEVANT_TOPICS);
            parts.push(format!("Recent topics: {}", ctx.topics[skip..].join(", ")));
        }
        if !ctx.preferences.is_empty() {
            parts.push(format!(
                "User preferences: {}",
                Value::Object(ctx.preferences.clone())
            ));
        }

        Ok(parts.join("\n"))
    }

    /// Load a session from the context store if it is not in memory yet.
    /// Returns true when a stored context was restored.
    pub async fn restore(&self, session_id: &str) -> Result<bool, ContextError> {
        validate_session_id(session_id)?;
        if self.sessions.contains_key(session_id) {
            return Ok(false);
        }

        let store = self.persistence.store().clone();
        let loaded = self
            .retry
            .run("load context", || store.load(session_id))
            .await;

        match loaded {
            Ok(Some(mut ctx)) => {
                ctx.session_id = session_id.to_string();
                self.make_room();
                let now = self.clock.now();
                let mut restored = false;
                self.sessions.entry(session_id.to_string()).or_insert_with(|| {
                    restored = true;
                    Arc::new(SessionSlot::new(ctx, now))
                });
                if restored {
                    info!(session_id, "Restored session context from store");
                }
                Ok(restored)
            }
            Ok(None) => Ok(false),
            Err(e) => {
                warn!(session_id, "Failed to restore session context: {:#}", e);
                Ok(false)
            }
        }
    }

    /// Wait for any in-flight optimization of the session to finish.
    pub async fn wait_idle(&self, session_id: &str) {
        let Some(slot) = self.sessions.get(session_id).map(|s| s.value().clone()) else {
            return;
        };
        let mut rx = slot.optimizing.subscribe();
        let _ = rx.wait_for(|busy| !*busy).await;
    }

    /// Wait until no session has an optimization in flight.
    pub async fn wait_all_idle(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.wait_idle(&id).await;
        }
    }
}
