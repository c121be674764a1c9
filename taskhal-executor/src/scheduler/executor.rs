//! Task executor.
//!
//! Runs task-graph nodes as their dependencies are satisfied.
//!
//! ## Architecture
//!
//! The executor owns a dedicated multi-thread tokio runtime. A single
//! dispatcher loop drains the ready channel fed by [`Submitter`]s:
//! 1. Receive a ready [`TaskRef`]
//! 2. Acquire a permit (at most `max_concurrent_tasks` bodies run at once)
//! 3. Run the body on the blocking pool
//! 4. Release every dependent; dependents that become ready are sent back
//!    through the channel
//!
//! Task bodies never wait on semaphores, so a small fixed pool services any
//! number of in-flight cross-queue dependencies. Once a fragment has failed,
//! its remaining bodies are skipped but still complete so the retire task
//! runs and poisons the fragment's signal semaphores.

use super::config::ExecutorConfig;
use crate::metrics::{Metrics, TaskOutcome};
use crate::task::{Submitter, TaskRef, TaskSubmission};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;
use taskhal_core::logging::{LogCategory, LogCollector, LogEvent};
use taskhal_core::{HalError, Result};
use tokio::runtime::Runtime;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;

/// Executes submitted task-graph fragments on a bounded thread pool.
pub struct TaskExecutor {
    config: ExecutorConfig,
    runtime: Option<Runtime>,
    submitter: Submitter,
}

impl TaskExecutor {
    /// Start the executor. Task failures are reported to `collector`.
    pub fn new(
        config: ExecutorConfig,
        metrics: Arc<Metrics>,
        collector: Arc<dyn LogCollector>,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_count.max(1))
            .max_blocking_threads(config.max_concurrent_tasks.max(1))
            .thread_name(config.thread_name.clone())
            .build()
            .map_err(|err| HalError::ExecutorStart {
                cause: err.to_string(),
            })?;

        let (submitter, ready) = Submitter::channel();
        let permits = Arc::new(Semaphore::new(config.max_concurrent_tasks.max(1)));
        runtime.spawn(dispatch_loop(
            ready,
            submitter.clone(),
            permits,
            metrics,
            collector,
        ));

        tracing::info!(
            worker_count = config.worker_count,
            max_concurrent_tasks = config.max_concurrent_tasks,
            "Task executor started"
        );

        Ok(Self {
            config,
            runtime: Some(runtime),
            submitter,
        })
    }

    /// A cloneable handle for submitting ready tasks.
    pub fn submitter(&self) -> &Submitter {
        &self.submitter
    }

    /// Submit a batch of ready tasks.
    pub fn submit(&self, submission: TaskSubmission) -> Result<()> {
        self.submitter.submit_all(submission)
    }

    /// The executor configuration.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Stop the executor, giving running task bodies up to `timeout` to
    /// finish. Tasks not yet started are dropped.
    pub fn shutdown(mut self, timeout: Duration) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(timeout);
        }
    }
}

impl Drop for TaskExecutor {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("config", &self.config)
            .field("running", &self.runtime.is_some())
            .finish()
    }
}

async fn dispatch_loop(
    mut ready: mpsc::UnboundedReceiver<TaskRef>,
    submitter: Submitter,
    permits: Arc<Semaphore>,
    metrics: Arc<Metrics>,
    collector: Arc<dyn LogCollector>,
) {
    let mut running: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            task = ready.recv() => {
                let Some(task) = task else { break };
                // Backpressure: wait for a free slot before taking the task.
                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    break;
                };
                let submitter = submitter.clone();
                let metrics = Arc::clone(&metrics);
                let collector = Arc::clone(&collector);
                running.spawn_blocking(move || {
                    run_task(task, &submitter, &metrics, collector.as_ref());
                    drop(permit);
                });
            }
            Some(joined) = running.join_next(), if !running.is_empty() => {
                if let Err(err) = joined {
                    tracing::error!(error = %err, "Task body did not complete");
                }
            }
        }
    }

    while running.join_next().await.is_some() {}
}

/// Run one node and release its dependents.
fn run_task(
    task: TaskRef,
    submitter: &Submitter,
    metrics: &Metrics,
    collector: &dyn LogCollector,
) {
    let fragment = task.fragment();
    let node = fragment.node(task.index());
    let kind = node.payload.kind();

    let outcome = if fragment.is_failed() && !node.payload.is_retire() {
        TaskOutcome::Skipped
    } else {
        match catch_unwind(AssertUnwindSafe(|| node.payload.run(fragment))) {
            Ok(Ok(())) => TaskOutcome::Succeeded,
            Ok(Err(err)) => {
                tracing::warn!(
                    fragment_id = %fragment.id(),
                    task = kind,
                    error = %err,
                    "Task failed"
                );
                collector.collect(
                    LogEvent::warn(LogCategory::Dispatch, "Task failed")
                        .with_queue_id(fragment.queue_id())
                        .with_fragment_id(fragment.id())
                        .with_field("task", kind)
                        .with_field("error", err.to_string()),
                );
                fragment.fail(err);
                TaskOutcome::Failed
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(
                    fragment_id = %fragment.id(),
                    task = kind,
                    message = %message,
                    "Task panicked"
                );
                let err = HalError::TaskPanicked {
                    fragment_id: fragment.id(),
                    task: kind.to_string(),
                    message,
                };
                collector.collect(
                    LogEvent::error(LogCategory::Dispatch, "Task panicked")
                        .with_queue_id(fragment.queue_id())
                        .with_fragment_id(fragment.id())
                        .with_field("task", kind)
                        .with_field("error", err.to_string()),
                );
                fragment.fail(err);
                TaskOutcome::Panicked
            }
        }
    };
    metrics.record_task(kind, outcome);

    for &dependent in &node.dependents {
        let next = TaskRef::new(Arc::clone(fragment), dependent);
        if let Err(err) = next.release(submitter) {
            tracing::warn!(error = %err, "Dropping ready task");
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
