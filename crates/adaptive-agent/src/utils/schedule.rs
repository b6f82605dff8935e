use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// A named periodic background job (ticker + cancellation).
///
/// The first tick fires one full `period` after spawning. `stop` wakes the
/// loop immediately and waits for it to exit.
pub struct ScheduledTask {
    name: &'static str,
    shutdown: Arc<Notify>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    pub fn spawn<F>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let shutdown = Arc::new(Notify::new());
        let running = Arc::new(AtomicBool::new(true));
        // tokio::time::interval panics on a zero period
        let period = period.max(Duration::from_millis(1));

        let handle = {
            let shutdown = shutdown.clone();
            let running = running.clone();
            tokio::spawn(async move {
                let mut interval =
                    tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                info!(task = name, period_ms = period.as_millis() as u64, "Scheduled task started");

                loop {
                    tokio::select! {
                        biased;

                        _ = shutdown.notified() => break,

                        _ = interval.tick() => {
                            if !running.load(Ordering::Relaxed) {
                                break;
                            }
                            tick();
                        }
                    }
                }

                running.store(false, Ordering::SeqCst);
                debug!(task = name, "Scheduled task stopped");
            })
        };

        Self {
            name,
            shutdown,
            running,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn stop(mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(task = self.name, "Scheduled task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_on_period_and_stops() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let task = ScheduledTask::spawn("test", Duration::from_secs(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(26)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        assert!(task.is_running());
        task.stop().await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }
}
