//! Task-graph execution.

mod config;
mod executor;

pub use config::ExecutorConfig;
pub use executor::TaskExecutor;
