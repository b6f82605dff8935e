use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::types::{
    Alert, AlertSeverity, MetricCategory, MetricSample, PerformanceSummary, SummaryTotals,
    TelemetryConfig, ThresholdDirection,
};
use crate::utils::ScheduledTask;

const SUMMARY_ALERTS: usize = 10;
const ACTIVE_ALERT_WINDOW: Duration = Duration::from_secs(60 * 60);

struct FiredAlert {
    alert: Alert,
    fired_at: Instant,
}

#[derive(Default)]
struct State {
    metrics: HashMap<String, VecDeque<MetricSample>>,
    alerts: VecDeque<FiredAlert>,
    last_alert: HashMap<String, Instant>,
    rejected_names: u64,
}

/// Metric ring buffers plus threshold alerting. Recording never fails.
pub struct PerformanceMonitor {
    state: Mutex<State>,
    config: TelemetryConfig,
}

impl PerformanceMonitor {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            state: Mutex::new(State::default()),
            config,
        }
    }

    pub fn record(
        &self,
        name: &str,
        value: f64,
        unit: &str,
        category: MetricCategory,
    ) -> MetricSample {
        let sample = MetricSample {
            id: Uuid::new_v4(),
            name: name.to_string(),
            value,
            unit: unit.to_string(),
            category,
            timestamp: Utc::now(),
        };

        let mut state = self.state.lock();
        if !state.metrics.contains_key(name)
            && state.metrics.len() >= self.config.max_metric_names
            && !self.is_thresholded(name)
        {
            state.rejected_names += 1;
            debug!(metric = %name, "Metric name limit reached, sample not retained");
            return sample;
        }
        let ring = state.metrics.entry(name.to_string()).or_default();
        ring.push_back(sample.clone());
        while ring.len() > self.config.history_capacity {
            ring.pop_front();
        }

        sample
    }

    fn is_thresholded(&self, name: &str) -> bool {
        self.config.thresholds.iter().any(|rule| rule.metric == name)
    }

    /// Samples dropped because their name would exceed `max_metric_names`.
    pub fn rejected_names(&self) -> u64 {
        self.state.lock().rejected_names
    }

    /// Latest sample of every metric, keyed by name.
    pub fn latest(&self) -> BTreeMap<String, MetricSample> {
        let state = self.state.lock();
        state
            .metrics
            .iter()
            .filter_map(|(name, ring)| ring.back().map(|s| (name.clone(), s.clone())))
            .collect()
    }

    /// Up to `limit` most recent samples of `name`, oldest first.
    pub fn history(&self, name: &str, limit: usize) -> Vec<MetricSample> {
        let state = self.state.lock();
        match state.metrics.get(name) {
            Some(ring) => {
                let skip = ring.len().saturating_sub(limit);
                ring.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    pub fn by_category(&self, category: MetricCategory) -> Vec<MetricSample> {
        let state = self.state.lock();
        let mut samples: Vec<MetricSample> = state
            .metrics
            .values()
            .flat_map(|ring| ring.iter().filter(|s| s.category == category).cloned())
            .collect();
        samples.sort_by_key(|s| s.timestamp);
        samples
    }

    /// Most recent alerts first.
    pub fn alerts(&self, limit: usize) -> Vec<Alert> {
        let state = self.state.lock();
        state
            .alerts
            .iter()
            .rev()
            .take(limit)
            .map(|f| f.alert.clone())
            .collect()
    }

    /// Compare the latest sample of each thresholded metric and fire alerts
    /// outside the per-metric cooldown. Returns the newly fired alerts.
    pub fn evaluate(&self) -> Vec<Alert> {
        let now = Instant::now();
        let cooldown = Duration::from_secs(self.config.alert_cooldown_secs);
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mut fired = Vec::new();

        for rule in &self.config.thresholds {
            let Some(sample) = state.metrics.get(&rule.metric).and_then(|r| r.back()) else {
                continue;
            };
            let Some(severity) = rule.classify(sample.value) else {
                continue;
            };

            if let Some(last) = state.last_alert.get(&rule.metric) {
                if now.saturating_duration_since(*last) < cooldown {
                    continue;
                }
            }

            let relation = match rule.direction {
                ThresholdDirection::Above => "above",
                ThresholdDirection::Below => "below",
            };
            let alert = Alert {
                id: Uuid::new_v4(),
                severity,
                message: format!(
                    "{} is {} threshold: {}{} (threshold {})",
                    rule.metric, relation, sample.value, sample.unit, rule.warning
                ),
                metric_name: rule.metric.clone(),
                threshold: rule.warning,
                observed_value: sample.value,
                timestamp: Utc::now(),
            };

            match severity {
                AlertSeverity::Error => error!(metric = %rule.metric, value = sample.value, "{}", alert.message),
                _ => warn!(metric = %rule.metric, value = sample.value, "{}", alert.message),
            }

            state.last_alert.insert(rule.metric.clone(), now);
            state.alerts.push_back(FiredAlert {
                alert: alert.clone(),
                fired_at: now,
            });
            fired.push(alert);
        }

        while state.alerts.len() > self.config.alert_capacity {
            state.alerts.pop_front();
        }

        fired
    }

    pub fn summary(&self) -> PerformanceSummary {
        let metrics = self.latest();
        let alerts = self.alerts(SUMMARY_ALERTS);

        let now = Instant::now();
        let active_alerts = {
            let state = self.state.lock();
            state
                .alerts
                .iter()
                .filter(|f| now.saturating_duration_since(f.fired_at) < ACTIVE_ALERT_WINDOW)
                .count()
        };
        let latest_value = |name: &str| metrics.get(name).map(|s| s.value).unwrap_or(0.0);

        let totals = SummaryTotals {
            metric_count: metrics.len(),
            active_alerts,
            response_time: latest_value("response_time"),
            memory_usage: latest_value("memory_usage"),
            user_satisfaction: latest_value("user_satisfaction"),
        };

        PerformanceSummary {
            metrics,
            alerts,
            totals,
        }
    }

    pub fn track_api_call(&self, endpoint: &str, duration: Duration, success: bool) {
        self.record(
            &format!("api_{}_response_time", endpoint),
            duration.as_secs_f64() * 1000.0,
            "ms",
            MetricCategory::ApiCalls,
        );
        self.record(
            &format!("api_{}_success_rate", endpoint),
            if success { 1.0 } else { 0.0 },
            "ratio",
            MetricCategory::ApiCalls,
        );
    }

    pub fn track_user_interaction(&self, kind: &str, duration: Duration) {
        self.record(
            &format!("user_{}_time", kind),
            duration.as_secs_f64() * 1000.0,
            "ms",
            MetricCategory::UserExperience,
        );
    }

    /// Await `fut` and record its wall time under `name`.
    pub async fn measure<F, T>(&self, name: &str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let start = Instant::now();
        let out = fut.await;
        self.record(
            name,
            start.elapsed().as_secs_f64() * 1000.0,
            "ms",
            MetricCategory::ResponseTime,
        );
        out
    }

    pub fn spawn_evaluator(self: &Arc<Self>) -> ScheduledTask {
        let monitor = Arc::clone(self);
        ScheduledTask::spawn(
            "alert-evaluator",
            Duration::from_secs(self.config.evaluation_interval_secs),
            move || {
                let fired = monitor.evaluate();
                if !fired.is_empty() {
                    debug!(count = fired.len(), "Alert evaluation fired alerts");
                }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> PerformanceMonitor {
        PerformanceMonitor::new(TelemetryConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_is_bounded_and_chronological() {
        let monitor = PerformanceMonitor::new(TelemetryConfig {
            history_capacity: 3,
            ..TelemetryConfig::default()
        });
        for v in 1..=5 {
            monitor.record("cpu", v as f64, "%", MetricCategory::System);
        }

        let values: Vec<f64> = monitor.history("cpu", 10).iter().map(|s| s.value).collect();
        assert_eq!(values, vec![3.0, 4.0, 5.0]);

        let last_two: Vec<f64> = monitor.history("cpu", 2).iter().map(|s| s.value).collect();
        assert_eq!(last_two, vec![4.0, 5.0]);
        assert!(monitor.history("unknown", 5).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_and_by_category() {
        let monitor = monitor();
        monitor.record("response_time", 100.0, "ms", MetricCategory::ResponseTime);
        monitor.record("response_time", 200.0, "ms", MetricCategory::ResponseTime);
        monitor.record("memory_usage", 0.3, "fraction", MetricCategory::Memory);

        let latest = monitor.latest();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest["response_time"].value, 200.0);

        assert_eq!(monitor.by_category(MetricCategory::ResponseTime).len(), 2);
        assert_eq!(monitor.by_category(MetricCategory::Memory).len(), 1);
        assert!(monitor.by_category(MetricCategory::System).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_suppressed_within_cooldown() {
        let monitor = monitor();
        monitor.record("response_time", 4000.0, "ms", MetricCategory::ResponseTime);
        assert_eq!(monitor.evaluate().len(), 1);

        tokio::time::sleep(Duration::from_secs(1)).await;
        monitor.record("response_time", 4000.0, "ms", MetricCategory::ResponseTime);
        assert!(monitor.evaluate().is_empty());

        let alerts = monitor.alerts(20);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Warning);
        assert_eq!(alerts[0].threshold, 3000.0);
        assert_eq!(alerts[0].observed_value, 4000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_fires_again_after_cooldown() {
        let monitor = monitor();
        monitor.record("response_time", 4000.0, "ms", MetricCategory::ResponseTime);
        monitor.evaluate();

        tokio::time::sleep(Duration::from_secs(301)).await;
        monitor.record("response_time", 5000.0, "ms", MetricCategory::ResponseTime);
        monitor.evaluate();

        let alerts = monitor.alerts(20);
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].severity, AlertSeverity::Error);
        assert_eq!(alerts[1].severity, AlertSeverity::Warning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_satisfaction_alerts_below_threshold() {
        let monitor = monitor();
        monitor.record("user_satisfaction", 2.5, "rating", MetricCategory::UserExperience);
        let fired = monitor.evaluate();

        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].severity, AlertSeverity::Error);
        assert_eq!(fired[0].metric_name, "user_satisfaction");
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_samples_no_alerts() {
        let monitor = monitor();
        assert!(monitor.evaluate().is_empty());
        monitor.record("memory_usage", 0.5, "fraction", MetricCategory::Memory);
        assert!(monitor.evaluate().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retained_alerts_are_bounded() {
        let monitor = PerformanceMonitor::new(TelemetryConfig {
            alert_capacity: 2,
            alert_cooldown_secs: 0,
            ..TelemetryConfig::default()
        });
        for v in [4000.0, 4100.0, 4200.0] {
            monitor.record("response_time", v, "ms", MetricCategory::ResponseTime);
            monitor.evaluate();
        }

        let observed: Vec<f64> = monitor.alerts(10).iter().map(|a| a.observed_value).collect();
        assert_eq!(observed, vec![4200.0, 4100.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_summary_counts_recent_alerts_only() {
        let monitor = monitor();
        monitor.record("memory_usage", 0.95, "fraction", MetricCategory::Memory);
        monitor.evaluate();

        let summary = monitor.summary();
        assert_eq!(summary.totals.active_alerts, 1);
        assert_eq!(summary.totals.memory_usage, 0.95);
        assert_eq!(summary.totals.response_time, 0.0);
        assert_eq!(summary.totals.metric_count, 1);

        tokio::time::sleep(Duration::from_secs(2 * 60 * 60)).await;
        let summary = monitor.summary();
        assert_eq!(summary.totals.active_alerts, 0);
        assert_eq!(summary.alerts.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_metric_names_are_capped() {
        let monitor = PerformanceMonitor::new(TelemetryConfig {
            max_metric_names: 4,
            ..TelemetryConfig::default()
        });
        for i in 0..100 {
            monitor.track_api_call(&format!("endpoint{i}"), Duration::from_millis(5), true);
        }
        monitor.record("api_endpoint0_response_time", 9.0, "ms", MetricCategory::ApiCalls);
        monitor.record("response_time", 4000.0, "ms", MetricCategory::ResponseTime);

        let latest = monitor.latest();
        assert_eq!(latest.len(), 5);
        assert_eq!(latest["api_endpoint0_response_time"].value, 9.0);
        assert!(latest.contains_key("response_time"));
        assert!(!latest.contains_key("api_endpoint2_response_time"));
        assert_eq!(monitor.rejected_names(), 196);
        assert_eq!(monitor.evaluate().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_api_call_records_pair() {
        let monitor = monitor();
        monitor.track_api_call("chat", Duration::from_millis(250), false);

        let latest = monitor.latest();
        assert_eq!(latest["api_chat_response_time"].value, 250.0);
        assert_eq!(latest["api_chat_success_rate"].value, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_measure_records_elapsed() {
        let monitor = monitor();
        let out = monitor
            .measure("slow_op", async {
                tokio::time::sleep(Duration::from_millis(40)).await;
                7
            })
            .await;

        assert_eq!(out, 7);
        assert!((monitor.latest()["slow_op"].value - 40.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluator_task_fires_on_schedule() {
        let monitor = Arc::new(monitor());
        monitor.record("api_error_rate", 0.15, "ratio", MetricCategory::ApiCalls);

        let evaluator = monitor.spawn_evaluator();
        tokio::time::sleep(Duration::from_secs(11)).await;

        assert_eq!(monitor.alerts(5).len(), 1);
        evaluator.stop().await;
    }
}
