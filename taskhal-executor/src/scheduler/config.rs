//! Executor configuration.

use serde::{Deserialize, Serialize};
use taskhal_core::config::env_usize;

/// Configuration for the task executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Async worker threads driving the dispatcher.
    pub worker_count: usize,
    /// Maximum task bodies running at once.
    ///
    /// This is also the size of the blocking pool task bodies run on. Set to
    /// 1 for strictly sequential execution (debugging).
    pub max_concurrent_tasks: usize,
    /// Name prefix of executor threads.
    pub thread_name: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            worker_count: parallelism.min(4),
            max_concurrent_tasks: parallelism,
            thread_name: "taskhal-worker".to_string(),
        }
    }
}

impl ExecutorConfig {
    /// Create configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `TASKHAL_WORKER_COUNT`: Async worker threads
    /// - `TASKHAL_MAX_CONCURRENT_TASKS`: Maximum concurrently running tasks
    ///
    /// # Example
    ///
    /// ```bash
    /// export TASKHAL_WORKER_COUNT=2
    /// export TASKHAL_MAX_CONCURRENT_TASKS=16
    /// ```
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            worker_count: env_usize("TASKHAL_WORKER_COUNT").unwrap_or(defaults.worker_count),
            max_concurrent_tasks: env_usize("TASKHAL_MAX_CONCURRENT_TASKS")
                .unwrap_or(defaults.max_concurrent_tasks),
            thread_name: defaults.thread_name,
        }
    }

    /// Small, deterministic configuration for tests.
    ///
    /// Four concurrent tasks are enough to prove two chains overlap.
    pub fn for_testing() -> Self {
        Self {
            worker_count: 1,
            max_concurrent_tasks: 4,
            thread_name: "taskhal-test".to_string(),
        }
    }

    /// Set the number of async worker threads (at least 1).
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count.max(1);
        self
    }

    /// Set the maximum number of concurrently running tasks (at least 1).
    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max.max(1);
        self
    }

    /// Set the thread name prefix.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}
