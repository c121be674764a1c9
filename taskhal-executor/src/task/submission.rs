//! Handing ready tasks to the executor.
//!
//! Nothing in the issue or signal path calls into the executor directly.
//! Ready tasks are sent as messages through a [`Submitter`], so a semaphore
//! signal that readies a thousand waiters costs a thousand channel sends, not
//! a thousand nested callbacks.

use super::fragment::TaskRef;
use taskhal_core::{HalError, Result};
use tokio::sync::mpsc;

/// A batch of ready tasks submitted together.
#[derive(Debug, Default)]
pub struct TaskSubmission {
    ready: Vec<TaskRef>,
}

impl TaskSubmission {
    /// Create an empty submission.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a ready task.
    pub fn push(&mut self, task: TaskRef) {
        self.ready.push(task);
    }

    /// Number of ready tasks.
    pub fn len(&self) -> usize {
        self.ready.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }
}

impl IntoIterator for TaskSubmission {
    type Item = TaskRef;
    type IntoIter = std::vec::IntoIter<TaskRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.ready.into_iter()
    }
}

/// Sending side of the executor's ready queue.
#[derive(Debug, Clone)]
pub struct Submitter {
    tx: mpsc::UnboundedSender<TaskRef>,
}

impl Submitter {
    /// Create a submitter and the receiver an executor drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TaskRef>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Submit one ready task.
    pub fn submit(&self, task: TaskRef) -> Result<()> {
        self.tx.send(task).map_err(|_| HalError::ExecutorShutdown)
    }

    /// Submit a whole batch.
    pub fn submit_all(&self, submission: TaskSubmission) -> Result<()> {
        for task in submission {
            self.submit(task)?;
        }
        Ok(())
    }

    /// Whether the executor stopped receiving.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
