use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

const DEFAULT_FILTER: &str = "info,adaptive_agent=debug";
const DEFAULT_DIRECTORY: &str = "logs";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl LogFormat {
    /// Unknown names fall back to `Pretty`.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

/// Where and how the agent logs, read from `RUST_LOG`, `LOG_FORMAT` and
/// `LOG_DIR`.
#[derive(Debug, Clone)]
pub struct LogSettings {
    pub filter: String,
    pub format: LogFormat,
    pub directory: PathBuf,
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            filter: lookup("RUST_LOG").unwrap_or_else(|| DEFAULT_FILTER.to_string()),
            format: lookup("LOG_FORMAT")
                .map(|name| LogFormat::parse(&name))
                .unwrap_or(LogFormat::Pretty),
            directory: lookup("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DIRECTORY)),
        }
    }
}

fn console_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Json => fmt::layer().json().with_thread_ids(true).boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
    }
}

// Files never get ANSI colors.
fn file_layer(format: LogFormat, writer: NonBlocking) -> BoxedLayer {
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_thread_ids(true)
            .with_writer(writer)
            .boxed(),
        LogFormat::Compact | LogFormat::Pretty => {
            fmt::layer().with_ansi(false).with_writer(writer).boxed()
        }
    }
}

/// Install the global subscriber: console plus a daily rolling file. Keep
/// the returned guard alive or buffered file lines are lost on exit.
pub fn init_logger() -> Result<WorkerGuard> {
    let settings = LogSettings::from_env();

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("adaptive-agent")
        .filename_suffix("log")
        .build(&settings.directory)
        .with_context(|| format!("Failed to open log directory {}", settings.directory.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_new(&settings.filter)
        .with_context(|| format!("Invalid log filter {:?}", settings.filter))?;

    tracing_subscriber::registry()
        .with(vec![console_layer(settings.format), file_layer(settings.format, writer)])
        .with(filter)
        .try_init()
        .context("Global tracing subscriber already installed")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_names() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::parse("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("xml"), LogFormat::Pretty);
    }

    #[test]
    fn test_settings_defaults_and_overrides() {
        let defaults = LogSettings::from_lookup(|_| None);
        assert_eq!(defaults.filter, DEFAULT_FILTER);
        assert_eq!(defaults.format, LogFormat::Pretty);
        assert_eq!(defaults.directory, PathBuf::from("logs"));

        let custom = LogSettings::from_lookup(|key| match key {
            "RUST_LOG" => Some("warn".to_string()),
            "LOG_FORMAT" => Some("json".to_string()),
            "LOG_DIR" => Some("/var/log/agent".to_string()),
            _ => None,
        });
        assert_eq!(custom.filter, "warn");
        assert_eq!(custom.format, LogFormat::Json);
        assert_eq!(custom.directory, PathBuf::from("/var/log/agent"));
    }
}
