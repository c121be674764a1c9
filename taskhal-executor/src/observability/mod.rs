//! Tracing setup for processes embedding a device.
//!
//! Every component logs through `tracing` with `queue_id`, `fragment_id` and
//! `semaphore_id` fields. This module installs a subscriber for them:
//!
//! - `TASKHAL_LOG_FORMAT` - `json`, `pretty` or `compact` (default)
//! - `TASKHAL_LOG_LEVEL` / `RUST_LOG` - filter directives (default `info`)
//!
//! ```ignore
//! use taskhal_executor::observability::{LogFormat, TracingConfig, init_tracing};
//!
//! let config = TracingConfig::builder()
//!     .log_format(LogFormat::Json)
//!     .log_filter("info,taskhal_executor=debug")
//!     .build();
//! let _guard = init_tracing(config)?;
//! ```

mod config;
mod tracing_setup;

pub use config::{LogFormat, TracingConfig, TracingConfigBuilder};
pub use tracing_setup::{TracingGuard, init_tracing};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_formats_leniently() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("bogus".parse::<LogFormat>().unwrap(), LogFormat::Compact);
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = TracingConfig::builder()
            .log_format(LogFormat::Json)
            .log_filter("debug")
            .include_location(true)
            .build();
        assert_eq!(config.log_format(), LogFormat::Json);
        assert_eq!(config.log_filter(), "debug");
        assert!(config.include_location());
        assert!(!config.include_thread_names());
    }

    #[test]
    fn second_init_fails() {
        // The first call may also fail if another test installed one.
        let _first = init_tracing(TracingConfig::default());
        assert!(init_tracing(TracingConfig::default()).is_err());
    }
}
