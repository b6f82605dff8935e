use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::services::cache::CacheStats;

/// Delivered to every caller of a failed group, hence `Clone`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizerError {
    #[error("dispatch to '{endpoint}' failed: {message}")]
    Dispatch { endpoint: String, message: String },

    #[error("'{endpoint}' returned {actual} results for {expected} requests")]
    ResultCountMismatch {
        endpoint: String,
        expected: usize,
        actual: usize,
    },

    #[error("request to '{endpoint}' exceeded its {deadline_ms}ms deadline")]
    DeadlineExceeded { endpoint: String, deadline_ms: u64 },

    #[error("request was dropped before completion")]
    Cancelled,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub max_batch_size: usize,
    pub batch_delay_ms: u64,
    pub default_ttl_ms: u64,
    pub preload_ttl_ms: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 10,
            batch_delay_ms: 100,
            default_ttl_ms: 5 * 60 * 1000,
            preload_ttl_ms: 10 * 60 * 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchOptions {
    /// Read from and write to the cache.
    pub cache: bool,
    pub ttl_ms: Option<u64>,
    pub deadline_ms: Option<u64>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            cache: true,
            ttl_ms: None,
            deadline_ms: None,
        }
    }
}

impl FetchOptions {
    pub fn no_cache() -> Self {
        Self {
            cache: false,
            ..Self::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = Some(ttl.as_millis() as u64);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = Some(deadline.as_millis() as u64);
        self
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PreloadRequest {
    pub endpoint: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PreloadReport {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizerStats {
    pub queue_size: usize,
    pub cache: CacheStats,
    pub batches: u64,
    pub dispatches: u64,
    pub failed_dispatches: u64,
    pub error_rate: f64,
}

/// Cache key for one call. `Value` maps serialize with sorted keys.
pub fn cache_key(endpoint: &str, params: &Value) -> String {
    format!("{}_{}", endpoint, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_key_ignores_field_order() {
        let a = cache_key("weather", &json!({"city": "Oslo", "units": "metric"}));
        let b = cache_key("weather", &json!({"units": "metric", "city": "Oslo"}));
        assert_eq!(a, b);
        assert_eq!(a, r#"weather_{"city":"Oslo","units":"metric"}"#);
    }

    #[test]
    fn test_fetch_options_defaults() {
        let opts: FetchOptions = serde_json::from_value(json!({})).unwrap();
        assert!(opts.cache);
        assert_eq!(opts.ttl_ms, None);
        assert_eq!(FetchOptions::default().with_deadline(Duration::from_secs(2)).deadline_ms, Some(2000));
    }
}
