pub mod monitor;
pub mod types;

pub use monitor::PerformanceMonitor;
pub use types::{
    Alert, AlertSeverity, MetricCategory, MetricSample, PerformanceSummary, SummaryTotals,
    TelemetryConfig, ThresholdDirection, ThresholdRule,
};
