//! Tracing configuration.

use std::env;
use std::str::FromStr;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Multi-line human-readable output.
    Pretty,
    /// Single-line output.
    #[default]
    Compact,
}

impl FromStr for LogFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "pretty" => Self::Pretty,
            _ => Self::Compact,
        })
    }
}

/// How [`init_tracing`](super::init_tracing) sets up the subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    log_format: LogFormat,
    log_filter: String,
    include_location: bool,
    include_thread_names: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            log_filter: "info".to_string(),
            include_location: false,
            include_thread_names: false,
        }
    }
}

impl TracingConfig {
    /// Start from the defaults.
    pub fn builder() -> TracingConfigBuilder {
        TracingConfigBuilder::default()
    }

    /// Create configuration from environment variables.
    ///
    /// - `TASKHAL_LOG_FORMAT`: "json", "pretty" or "compact"
    /// - `TASKHAL_LOG_LEVEL` or `RUST_LOG`: filter directives
    /// - `TASKHAL_LOG_LOCATION`: "true" to include file and line
    /// - `TASKHAL_LOG_THREAD_NAMES`: "true" to include worker thread names
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_format: env::var("TASKHAL_LOG_FORMAT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.log_format),
            log_filter: env::var("TASKHAL_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or(defaults.log_filter),
            include_location: env_flag("TASKHAL_LOG_LOCATION"),
            include_thread_names: env_flag("TASKHAL_LOG_THREAD_NAMES"),
        }
    }

    /// Output format.
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Filter directives, e.g. `"info,taskhal_executor=trace"`.
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Whether events carry file and line.
    pub fn include_location(&self) -> bool {
        self.include_location
    }

    /// Whether events carry the thread name.
    pub fn include_thread_names(&self) -> bool {
        self.include_thread_names
    }
}

/// Builder for [`TracingConfig`].
#[derive(Debug, Clone, Default)]
pub struct TracingConfigBuilder {
    config: TracingConfig,
}

impl TracingConfigBuilder {
    /// Set the output format.
    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.config.log_format = format;
        self
    }

    /// Set the filter directives.
    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.config.log_filter = filter.into();
        self
    }

    /// Include file and line.
    pub fn include_location(mut self, include: bool) -> Self {
        self.config.include_location = include;
        self
    }

    /// Include thread names. Executor threads are named after
    /// `ExecutorConfig::thread_name`.
    pub fn include_thread_names(mut self, include: bool) -> Self {
        self.config.include_thread_names = include;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> TracingConfig {
        self.config
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name).is_ok_and(|s| s == "1" || s.eq_ignore_ascii_case("true"))
}
