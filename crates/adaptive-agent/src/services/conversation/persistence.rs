use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use flume::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::types::SessionContext;
use crate::services::collaborators::ContextStore;
use crate::services::telemetry::{MetricCategory, PerformanceMonitor};
use crate::utils::RetryPolicy;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Queue capacity (snapshots held before new ones are dropped), split
    /// evenly across workers
    pub queue_capacity: usize,

    /// Number of parallel writer tasks. Each session always maps to the
    /// same worker, so its snapshots are saved in order.
    pub worker_count: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1_000,
            worker_count: 1,
        }
    }
}

struct SaveJob {
    session_id: String,
    context: SessionContext,
}

/// Fire-and-forget context writer. Snapshots queue up until `start` spawns
/// the workers; `stop` closes the queues and waits for them to drain.
pub struct PersistenceWriter {
    /// One lane per worker; empty once closed.
    senders: Mutex<Vec<Sender<SaveJob>>>,
    receivers: Mutex<Vec<Receiver<SaveJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    store: Arc<dyn ContextStore>,
    monitor: Arc<PerformanceMonitor>,
    retry: RetryPolicy,
    config: PersistenceConfig,
}

impl PersistenceWriter {
    pub fn new(
        store: Arc<dyn ContextStore>,
        monitor: Arc<PerformanceMonitor>,
        retry: RetryPolicy,
        config: PersistenceConfig,
    ) -> Self {
        let lanes = config.worker_count.max(1);
        let lane_capacity = config.queue_capacity.div_ceil(lanes).max(1);
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..lanes).map(|_| bounded(lane_capacity)).unzip();
        Self {
            senders: Mutex::new(senders),
            receivers: Mutex::new(receivers),
            workers: Mutex::new(Vec::new()),
            store,
            monitor,
            retry,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn ContextStore> {
        &self.store
    }

    /// Spawn writer tasks. Calling twice is a no-op.
    pub fn start(&self) {
        let receivers = std::mem::take(&mut *self.receivers.lock());
        if receivers.is_empty() {
            return;
        }

        info!(
            "Starting persistence writer: queue={}, workers={}",
            self.config.queue_capacity, self.config.worker_count
        );

        let mut workers = self.workers.lock();
        for (worker_id, receiver) in receivers.into_iter().enumerate() {
            let store = self.store.clone();
            let monitor = self.monitor.clone();
            let retry = self.retry.clone();

            workers.push(tokio::spawn(async move {
                Self::worker_loop(worker_id, receiver, store, monitor, retry).await;
            }));
        }
    }

    /// Queue a snapshot (non-blocking). A full or closed queue drops it.
    pub fn enqueue(&self, session_id: &str, context: SessionContext) {
        let senders = self.senders.lock();
        if senders.is_empty() {
            debug!(session_id, "Persistence closed, snapshot dropped");
            return;
        }
        let sender = &senders[lane_for(session_id, senders.len())];

        if let Err(e) = sender.try_send(SaveJob {
            session_id: session_id.to_string(),
            context,
        }) {
            warn!(session_id, "Failed to enqueue context snapshot (queue full?): {}", e);
            self.monitor
                .record("persistence_dropped", 1.0, "count", MetricCategory::System);
        }
    }

    pub fn pending(&self) -> usize {
        self.senders.lock().iter().map(|s| s.len()).sum()
    }

    /// Close the queues and wait for workers to write what is left.
    pub async fn stop(&self) {
        self.senders.lock().clear();
        // Never started: nothing will drain the queues.
        self.receivers.lock().clear();

        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if let Err(e) = handle.await {
                warn!("Persistence worker ended abnormally: {}", e);
            }
        }
    }

    async fn worker_loop(
        worker_id: usize,
        receiver: Receiver<SaveJob>,
        store: Arc<dyn ContextStore>,
        monitor: Arc<PerformanceMonitor>,
        retry: RetryPolicy,
    ) {
        debug!("Persistence worker {} started", worker_id);

        while let Ok(job) = receiver.recv_async().await {
            let result = retry
                .run("persist context", || store.save(&job.session_id, &job.context))
                .await;

            match result {
                Ok(()) => debug!(
                    session_id = %job.session_id,
                    messages = job.context.messages.len(),
                    "Context persisted"
                ),
                Err(e) => {
                    warn!(session_id = %job.session_id, "Context persistence failed: {:#}", e);
                    monitor.record("persistence_failures", 1.0, "count", MetricCategory::System);
                }
            }
        }

        info!("Persistence worker {} shutting down (channel closed)", worker_id);
    }
}

fn lane_for(session_id: &str, lanes: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    session_id.hash(&mut hasher);
    (hasher.finish() % lanes as u64) as usize
}
