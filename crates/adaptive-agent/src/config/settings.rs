use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::services::agent::AgentConfig;
use crate::services::cache::CacheConfig;
use crate::services::collaborators::{CollaboratorsConfig, GenerationConfig};
use crate::services::conversation::{ContextConfig, PersistenceConfig};
use crate::services::optimizer::OptimizerConfig;
use crate::services::telemetry::TelemetryConfig;
use crate::utils::RetryPolicy;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub telemetry: TelemetryConfig,
    pub context: ContextConfig,
    pub optimizer: OptimizerConfig,
    pub generation: GenerationConfig,
    pub agent: AgentConfig,
    pub collaborators: CollaboratorsConfig,
    pub retry: RetryPolicy,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Settings {
    /// Load `config/settings.toml` (optional) overlaid with `APP__SECTION__KEY`
    /// environment variables. Missing keys fall back to built-in defaults.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(false))
            // Example: APP__OPTIMIZER__MAX_BATCH_SIZE=20
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.cache.capacity == 0 {
            anyhow::bail!("cache.capacity must be greater than zero");
        }
        if self.optimizer.max_batch_size == 0 {
            anyhow::bail!("optimizer.max_batch_size must be greater than zero");
        }
        if self.context.retain_recent == 0 || self.context.retain_recent > self.context.max_history_length {
            anyhow::bail!(
                "context.retain_recent must be between 1 and context.max_history_length ({})",
                self.context.max_history_length
            );
        }
        if !(0.0..=1.0).contains(&self.context.memory_threshold) {
            anyhow::bail!("context.memory_threshold must be within [0, 1]");
        }
        if self.telemetry.history_capacity == 0 || self.telemetry.alert_capacity == 0 {
            anyhow::bail!("telemetry capacities must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.cache.capacity, 1000);
        assert_eq!(settings.context.max_history_length, 50);
        assert_eq!(settings.optimizer.max_batch_size, 10);
        assert_eq!(settings.telemetry.alert_cooldown_secs, 300);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::builder()
            .add_source(config::File::from_str(
                "[optimizer]\nmax_batch_size = 25\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let settings: Settings = config.try_deserialize().unwrap();

        assert_eq!(settings.optimizer.max_batch_size, 25);
        assert_eq!(settings.optimizer.batch_delay_ms, 100);
        assert_eq!(settings.cache.sweep_interval_secs, 60);
    }

    #[test]
    fn test_rejects_retain_above_max() {
        let mut settings = Settings::default();
        settings.context.retain_recent = 80;
        assert!(settings.validate().is_err());
    }
}
