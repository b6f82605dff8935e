use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    ResponseTime,
    Memory,
    ApiCalls,
    UserExperience,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub id: Uuid,
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub category: MetricCategory,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub severity: AlertSeverity,
    pub message: String,
    pub metric_name: String,
    pub threshold: f64,
    pub observed_value: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdDirection {
    Above,
    Below,
}

/// Alert rule for one metric: `warning` is the threshold proper, `critical`
/// escalates the alert to `error` severity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub metric: String,
    pub direction: ThresholdDirection,
    pub warning: f64,
    pub critical: f64,
}

impl ThresholdRule {
    pub fn new(metric: &str, direction: ThresholdDirection, warning: f64, critical: f64) -> Self {
        Self {
            metric: metric.to_string(),
            direction,
            warning,
            critical,
        }
    }

    /// Severity for an observed value, `None` when within bounds.
    pub fn classify(&self, value: f64) -> Option<AlertSeverity> {
        match self.direction {
            ThresholdDirection::Above if value > self.critical => Some(AlertSeverity::Error),
            ThresholdDirection::Above if value > self.warning => Some(AlertSeverity::Warning),
            ThresholdDirection::Below if value < self.critical => Some(AlertSeverity::Error),
            ThresholdDirection::Below if value < self.warning => Some(AlertSeverity::Warning),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub history_capacity: usize,
    /// Distinct metric names kept. Thresholded metrics are always admitted.
    pub max_metric_names: usize,
    pub alert_capacity: usize,
    pub evaluation_interval_secs: u64,
    pub alert_cooldown_secs: u64,
    pub thresholds: Vec<ThresholdRule>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            max_metric_names: 256,
            alert_capacity: 50,
            evaluation_interval_secs: 10,
            alert_cooldown_secs: 300,
            thresholds: vec![
                ThresholdRule::new("response_time", ThresholdDirection::Above, 3000.0, 4500.0),
                ThresholdRule::new("memory_usage", ThresholdDirection::Above, 0.8, 0.9),
                ThresholdRule::new("api_error_rate", ThresholdDirection::Above, 0.1, 0.2),
                ThresholdRule::new("user_satisfaction", ThresholdDirection::Below, 3.5, 3.0),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryTotals {
    pub metric_count: usize,
    pub active_alerts: usize,
    pub response_time: f64,
    pub memory_usage: f64,
    pub user_satisfaction: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSummary {
    pub metrics: BTreeMap<String, MetricSample>,
    pub alerts: Vec<Alert>,
    pub totals: SummaryTotals,
}
