use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::types::{
    cache_key, FetchOptions, OptimizerConfig, OptimizerError, OptimizerStats, PreloadReport,
    PreloadRequest,
};
use crate::services::cache::CacheStore;
use crate::services::collaborators::BatchDispatcher;
use crate::services::telemetry::{MetricCategory, PerformanceMonitor};

type Responder = oneshot::Sender<Result<Value, OptimizerError>>;

struct Pending {
    endpoint: String,
    params: Value,
    key: String,
    cache: bool,
    ttl: Duration,
    deadline: Option<Instant>,
    responder: Responder,
}

impl Pending {
    /// Whether a successful result should still be cached for this caller.
    fn wants_cache_write(&self, now: Instant) -> bool {
        self.cache && !self.responder.is_closed() && self.deadline.map_or(true, |d| now < d)
    }
}

#[derive(Default)]
struct Queue {
    items: Vec<Pending>,
    /// Bumped on every flush; a timer armed for an older window does nothing.
    generation: u64,
}

#[derive(Default)]
struct DispatchCounters {
    batches: AtomicU64,
    dispatches: AtomicU64,
    failures: AtomicU64,
}

/// Cache-first, time-windowed batching of outbound calls.
pub struct RequestOptimizer {
    queue: Mutex<Queue>,
    cache: Arc<CacheStore>,
    dispatcher: Arc<dyn BatchDispatcher>,
    monitor: Arc<PerformanceMonitor>,
    counters: DispatchCounters,
    config: OptimizerConfig,
}

impl RequestOptimizer {
    pub fn new(
        config: OptimizerConfig,
        cache: Arc<CacheStore>,
        dispatcher: Arc<dyn BatchDispatcher>,
        monitor: Arc<PerformanceMonitor>,
    ) -> Self {
        info!(
            "Initializing request optimizer: batch={}, delay={}ms",
            config.max_batch_size, config.batch_delay_ms
        );
        Self {
            queue: Mutex::new(Queue::default()),
            cache,
            dispatcher,
            monitor,
            counters: DispatchCounters::default(),
            config,
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub async fn fetch(
        self: &Arc<Self>,
        endpoint: &str,
        params: Value,
        options: FetchOptions,
    ) -> Result<Value, OptimizerError> {
        let key = cache_key(endpoint, &params);

        if options.cache {
            if let Some(hit) = self.cache.get(&key) {
                self.monitor
                    .record("cache_hit", 1.0, "count", MetricCategory::ApiCalls);
                debug!(endpoint, "Serving request from cache");
                return Ok(hit);
            }
        }

        let (tx, rx) = oneshot::channel();
        let deadline = options
            .deadline_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));

        self.enqueue(Pending {
            endpoint: endpoint.to_string(),
            params,
            key,
            cache: options.cache,
            ttl: Duration::from_millis(options.ttl_ms.unwrap_or(self.config.default_ttl_ms)),
            deadline,
            responder: tx,
        });

        match deadline {
            Some(at) => match tokio::time::timeout_at(at, rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(OptimizerError::Cancelled),
                Err(_) => Err(OptimizerError::DeadlineExceeded {
                    endpoint: endpoint.to_string(),
                    deadline_ms: options.deadline_ms.unwrap_or_default(),
                }),
            },
            None => rx.await.unwrap_or(Err(OptimizerError::Cancelled)),
        }
    }

    fn enqueue(self: &Arc<Self>, pending: Pending) {
        let mut queue = self.queue.lock();
        queue.items.push(pending);

        if queue.items.len() >= self.config.max_batch_size {
            let batch = std::mem::take(&mut queue.items);
            queue.generation += 1;
            drop(queue);
            self.spawn_batch(batch);
            return;
        }

        if queue.items.len() == 1 {
            let generation = queue.generation;
            let delay = Duration::from_millis(self.config.batch_delay_ms);
            let optimizer = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                optimizer.flush_window(generation);
            });
        }
    }

    /// Timer flush for the window opened at `generation`.
    fn flush_window(self: &Arc<Self>, generation: u64) {
        let batch = {
            let mut queue = self.queue.lock();
            if queue.generation != generation || queue.items.is_empty() {
                return;
            }
            queue.generation += 1;
            std::mem::take(&mut queue.items)
        };
        self.spawn_batch(batch);
    }

    fn spawn_batch(self: &Arc<Self>, batch: Vec<Pending>) {
        let optimizer = Arc::clone(self);
        tokio::spawn(async move {
            optimizer.process_batch(batch).await;
        });
    }

    async fn process_batch(&self, batch: Vec<Pending>) {
        let start = Instant::now();
        let size = batch.len();
        self.counters.batches.fetch_add(1, Ordering::Relaxed);

        let mut groups: Vec<(String, Vec<Pending>)> = Vec::new();
        for pending in batch {
            match groups.iter_mut().find(|(endpoint, _)| *endpoint == pending.endpoint) {
                Some((_, items)) => items.push(pending),
                None => groups.push((pending.endpoint.clone(), vec![pending])),
            }
        }

        debug!("Processing batch of {} requests in {} groups", size, groups.len());

        let dispatches = groups
            .into_iter()
            .map(|(endpoint, items)| self.dispatch_group(endpoint, items));
        futures::future::join_all(dispatches).await;

        self.monitor.record(
            "batch_processing_time",
            start.elapsed().as_secs_f64() * 1000.0,
            "ms",
            MetricCategory::ApiCalls,
        );
        self.monitor
            .record("batch_size", size as f64, "count", MetricCategory::ApiCalls);
    }

    async fn dispatch_group(&self, endpoint: String, items: Vec<Pending>) {
        let params: Vec<Value> = items.iter().map(|p| p.params.clone()).collect();
        let start = Instant::now();
        let result = self.dispatcher.dispatch(&endpoint, params).await;
        let elapsed = start.elapsed();

        let outcome = match result {
            Ok(results) if results.len() == items.len() => Ok(results),
            Ok(results) => Err(OptimizerError::ResultCountMismatch {
                endpoint: endpoint.clone(),
                expected: items.len(),
                actual: results.len(),
            }),
            Err(e) => Err(OptimizerError::Dispatch {
                endpoint: endpoint.clone(),
                message: format!("{:#}", e),
            }),
        };

        self.counters.dispatches.fetch_add(1, Ordering::Relaxed);
        self.monitor.track_api_call(&endpoint, elapsed, outcome.is_ok());

        match outcome {
            Ok(results) => {
                let now = Instant::now();
                for (pending, value) in items.into_iter().zip(results) {
                    if pending.wants_cache_write(now) {
                        self.cache.set(pending.key, value.clone(), Some(pending.ttl));
                    }
                    let _ = pending.responder.send(Ok(value));
                }
            }
            Err(err) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!(endpoint = %endpoint, requests = items.len(), "Batch dispatch failed: {}", err);
                for pending in items {
                    let _ = pending.responder.send(Err(err.clone()));
                }
            }
        }

        self.monitor
            .record("api_error_rate", self.error_rate(), "ratio", MetricCategory::ApiCalls);
    }

    fn error_rate(&self) -> f64 {
        let total = self.counters.dispatches.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.counters.failures.load(Ordering::Relaxed) as f64 / total as f64
    }

    /// Prime the cache. Failures are only counted, never returned.
    pub async fn preload(self: &Arc<Self>, requests: Vec<PreloadRequest>) -> PreloadReport {
        let ttl = Duration::from_millis(self.config.preload_ttl_ms);
        let fetches = requests.iter().map(|req| {
            self.fetch(
                &req.endpoint,
                req.params.clone(),
                FetchOptions::default().with_ttl(ttl),
            )
        });
        let results = futures::future::join_all(fetches).await;

        let mut report = PreloadReport {
            requested: results.len(),
            ..PreloadReport::default()
        };
        for (req, result) in requests.iter().zip(results) {
            match result {
                Ok(_) => {
                    report.succeeded += 1;
                    self.monitor
                        .record("preload_success", 1.0, "count", MetricCategory::ApiCalls);
                }
                Err(e) => {
                    report.failed += 1;
                    debug!(endpoint = %req.endpoint, "Preload failed: {}", e);
                    self.monitor
                        .record("preload_error", 1.0, "count", MetricCategory::ApiCalls);
                }
            }
        }

        info!(
            requested = report.requested,
            succeeded = report.succeeded,
            failed = report.failed,
            "Preload finished"
        );
        report
    }

    pub fn stats(&self) -> OptimizerStats {
        OptimizerStats {
            queue_size: self.queue.lock().items.len(),
            cache: self.cache.stats(),
            batches: self.counters.batches.load(Ordering::Relaxed),
            dispatches: self.counters.dispatches.load(Ordering::Relaxed),
            failed_dispatches: self.counters.failures.load(Ordering::Relaxed),
            error_rate: self.error_rate(),
        }
    }
}
