//! taskhal executor - synchronization and command issuance for a local CPU
//! device.
//!
//! This crate turns recorded command buffers into task graphs and runs them
//! on a bounded worker pool:
//! - Timeline semaphores whose waits are graph edges, not blocked threads
//! - `multi_wait`, the one blocking host wait, backed by the event pool
//! - A per-queue state tracker that elides waits already known reached
//! - The command-buffer issuer: dispatch batching, barriers, fill and copy
//! - The local executable invoker and a closure-backed kernel library
//! - Failure propagation by semaphore poisoning
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use taskhal_executor::prelude::*;
//!
//! let device = TaskDevice::new(DeviceConfig::for_testing())?;
//! let output = Buffer::new(16);
//! let kernel: Arc<dyn LocalExecutable> = Arc::new(
//!     KernelLibrary::new("example").with_entry_point("store", [1, 1, 1], |call| {
//!         let index = call.linear_workgroup_id() as usize;
//!         let value = call.push_constant(0).unwrap_or(0);
//!         if let Some(binding) = call.binding(0) {
//!             binding.store_u32(index, value);
//!         }
//!         Ok(())
//!     }),
//! );
//!
//! let cb = device.create_command_buffer(CommandBufferMode::OneShot);
//! cb.dispatch(Arc::clone(&kernel), 0, [4, 1, 1], &[7], &[output.bind()])?;
//! cb.end()?;
//!
//! let done = device.create_semaphore(0);
//! device.queue_submit(0, SubmissionBatch::new().command_buffer(&cb).signal(&done, 1))?;
//! device.wait_semaphores(
//!     WaitMode::All,
//!     &SemaphoreList::new().with(&done, 1),
//!     Deadline::Infinite,
//! )?;
//! assert_eq!(output.to_u32s(), vec![7, 7, 7, 7]);
//! # Ok::<(), taskhal_core::HalError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod command_buffer;
pub mod device;
pub mod executable;
pub mod metrics;
pub mod observability;
pub mod queue;
pub mod queue_state;
pub mod scheduler;
pub mod semaphore;
pub mod task;

pub use buffer::{Buffer, BufferBinding};
pub use command_buffer::{BarrierScope, CommandBuffer, CommandBufferMode, ExecutionStage};
pub use device::{DeviceConfig, TaskDevice};
pub use executable::{ExecutableCall, KernelLibrary, LocalExecutable, issue_call};
pub use metrics::Metrics;
pub use queue::{SubmissionBatch, SubmissionHandle, TaskQueue};
pub use queue_state::QueueState;
pub use scheduler::{ExecutorConfig, TaskExecutor};
pub use semaphore::{SemaphoreList, TimelineSemaphore, WaitMode, multi_wait};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::buffer::{Buffer, BufferBinding};
    pub use crate::command_buffer::{CommandBuffer, CommandBufferMode, ExecutionStage};
    pub use crate::device::{DeviceConfig, TaskDevice};
    pub use crate::executable::{ExecutableCall, KernelLibrary, LocalExecutable};
    pub use crate::queue::{SubmissionBatch, SubmissionHandle, TaskQueue};
    pub use crate::semaphore::{SemaphoreList, TimelineSemaphore, WaitMode};
    pub use taskhal_core::{Deadline, HalError, PoolConfig, Result};
}
