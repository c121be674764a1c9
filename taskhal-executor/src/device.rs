//! The device facade.
//!
//! A [`TaskDevice`] owns every shared service: the executor, the arena block
//! pool, the event pool, the log collector and the metrics registry. Nothing
//! is a process-wide singleton, so tests construct isolated devices.

use crate::command_buffer::{CommandBuffer, CommandBufferMode};
use crate::metrics::Metrics;
use crate::queue::{SubmissionBatch, SubmissionHandle, TaskQueue};
use crate::scheduler::{ExecutorConfig, TaskExecutor};
use crate::semaphore::{SemaphoreList, TimelineSemaphore, WaitMode, multi_wait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use taskhal_core::config::env_usize;
use taskhal_core::logging::{BufferedCollector, LogCategory, LogCollector, LogEvent};
use taskhal_core::{BlockPool, Deadline, EventPool, HalError, PoolConfig, QueueId, Result};

/// Default number of queues.
pub const DEFAULT_QUEUE_COUNT: usize = 2;

/// Default number of workgroups run by one dispatch task.
pub const DEFAULT_WORKGROUPS_PER_TASK: usize = 64;

/// Configuration for a [`TaskDevice`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Executor settings.
    pub executor: ExecutorConfig,
    /// Arena and event pool settings.
    pub pools: PoolConfig,
    /// Number of queues.
    pub queue_count: usize,
    /// Workgroups batched into one dispatch task.
    pub workgroups_per_task: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::default(),
            pools: PoolConfig::default(),
            queue_count: DEFAULT_QUEUE_COUNT,
            workgroups_per_task: DEFAULT_WORKGROUPS_PER_TASK,
        }
    }
}

impl DeviceConfig {
    /// Create configuration from environment variables.
    ///
    /// Reads `TASKHAL_QUEUE_COUNT` and `TASKHAL_WORKGROUPS_PER_TASK`, plus the
    /// executor and pool variables.
    pub fn from_env() -> Self {
        Self {
            executor: ExecutorConfig::from_env(),
            pools: PoolConfig::from_env(),
            queue_count: env_usize("TASKHAL_QUEUE_COUNT")
                .filter(|&n| n > 0)
                .unwrap_or(DEFAULT_QUEUE_COUNT),
            workgroups_per_task: env_usize("TASKHAL_WORKGROUPS_PER_TASK")
                .filter(|&n| n > 0)
                .unwrap_or(DEFAULT_WORKGROUPS_PER_TASK),
        }
    }

    /// Small configuration for tests.
    pub fn for_testing() -> Self {
        Self {
            executor: ExecutorConfig::for_testing(),
            pools: PoolConfig::for_testing(),
            queue_count: DEFAULT_QUEUE_COUNT,
            workgroups_per_task: 4,
        }
    }

    /// Set the executor configuration.
    pub fn with_executor(mut self, executor: ExecutorConfig) -> Self {
        self.executor = executor;
        self
    }

    /// Set the pool configuration.
    pub fn with_pools(mut self, pools: PoolConfig) -> Self {
        self.pools = pools;
        self
    }

    /// Set the number of queues (at least 1).
    pub fn with_queue_count(mut self, count: usize) -> Self {
        self.queue_count = count.max(1);
        self
    }

    /// Set how many workgroups one dispatch task runs (at least 1).
    pub fn with_workgroups_per_task(mut self, count: usize) -> Self {
        self.workgroups_per_task = count.max(1);
        self
    }
}

/// A local CPU device.
pub struct TaskDevice {
    config: DeviceConfig,
    executor: TaskExecutor,
    block_pool: Arc<BlockPool>,
    event_pool: Arc<EventPool>,
    queues: Vec<TaskQueue>,
    logs: Arc<BufferedCollector>,
    metrics: Arc<Metrics>,
}

impl TaskDevice {
    /// Create a device and start its executor.
    pub fn new(config: DeviceConfig) -> Result<Self> {
        let metrics = Arc::new(Metrics::new().map_err(HalError::internal)?);
        let logs = Arc::new(BufferedCollector::with_default_capacity());
        let executor = TaskExecutor::new(
            config.executor.clone(),
            Arc::clone(&metrics),
            Arc::clone(&logs) as Arc<dyn LogCollector>,
        )?;
        let block_pool = Arc::new(BlockPool::from_config(&config.pools));
        let event_pool = EventPool::new(config.pools.event_capacity);

        let queues = (0..config.queue_count.max(1))
            .map(|index| {
                TaskQueue::new(
                    QueueId::new(index as u32),
                    executor.submitter().clone(),
                    Arc::clone(&block_pool),
                    Arc::clone(&logs) as Arc<dyn LogCollector>,
                    Arc::clone(&metrics),
                    config.workgroups_per_task.max(1) as u64,
                )
            })
            .collect::<Vec<_>>();

        tracing::info!(
            queues = queues.len(),
            block_size = config.pools.block_size,
            max_blocks = config.pools.max_blocks,
            event_capacity = config.pools.event_capacity,
            "Task device created"
        );
        logs.collect(
            LogEvent::info(LogCategory::System, "Task device created")
                .with_field_u64("queues", queues.len() as u64),
        );

        Ok(Self {
            config,
            executor,
            block_pool,
            event_pool,
            queues,
            logs,
            metrics,
        })
    }

    /// Device configuration.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Create a timeline semaphore.
    pub fn create_semaphore(&self, initial_value: u64) -> Arc<TimelineSemaphore> {
        let semaphore = TimelineSemaphore::new(initial_value);
        tracing::trace!(semaphore_id = %semaphore.id(), initial_value, "Semaphore created");
        semaphore
    }

    /// Start recording a command buffer.
    pub fn create_command_buffer(&self, mode: CommandBufferMode) -> Arc<CommandBuffer> {
        Arc::new(CommandBuffer::new(mode))
    }

    /// Queue `index`.
    pub fn queue(&self, index: usize) -> Result<&TaskQueue> {
        self.queues.get(index).ok_or(HalError::QueueNotFound {
            index,
            count: self.queues.len(),
        })
    }

    /// Number of queues.
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// Submit `batch` to queue `index`.
    pub fn queue_submit(&self, index: usize, batch: SubmissionBatch) -> Result<SubmissionHandle> {
        self.queue(index)?.submit(batch)
    }

    /// Block the calling thread until `semaphores` satisfy `mode`.
    ///
    /// The only blocking wait of the device; never call it from a kernel.
    #[tracing::instrument(
        level = "debug",
        skip(self, semaphores),
        fields(count = semaphores.len())
    )]
    pub fn wait_semaphores(
        &self,
        mode: WaitMode,
        semaphores: &SemaphoreList,
        deadline: Deadline,
    ) -> Result<()> {
        let result = multi_wait(mode, semaphores, deadline, &self.event_pool);
        let outcome = match &result {
            Ok(()) => "satisfied",
            Err(HalError::DeadlineExceeded { .. }) => "timed_out",
            Err(err) if err.is_retriable() => {
                self.logs.collect(
                    LogEvent::warn(LogCategory::Pool, "Host wait deferred")
                        .with_field("error", err.to_string()),
                );
                "exhausted"
            }
            Err(_) => "failed",
        };
        self.metrics.record_host_wait(mode.as_str(), outcome);
        result
    }

    /// Block until every queue is idle.
    pub fn wait_idle(&self, deadline: Deadline) -> Result<()> {
        self.queues
            .iter()
            .try_for_each(|queue| queue.wait_idle(deadline))
    }

    /// The arena block pool.
    pub fn block_pool(&self) -> &Arc<BlockPool> {
        &self.block_pool
    }

    /// The event pool backing host waits.
    pub fn event_pool(&self) -> &Arc<EventPool> {
        &self.event_pool
    }

    /// Correlated device log events.
    pub fn logs(&self) -> &Arc<BufferedCollector> {
        &self.logs
    }

    /// Device metrics.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Stop the executor, giving running tasks up to `timeout`.
    pub fn shutdown(self, timeout: Duration) {
        tracing::info!("Task device shutting down");
        self.executor.shutdown(timeout);
    }
}

impl std::fmt::Debug for TaskDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDevice")
            .field("queues", &self.queues.len())
            .field("executor", &self.executor)
            .field("block_pool", &self.block_pool)
            .finish()
    }
}
