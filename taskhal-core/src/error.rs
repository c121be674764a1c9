//! Error types for taskhal.
//!
//! Every failure in the runtime is a [`HalError`]. Variants carry the
//! identifiers needed to find the offending semaphore, queue or fragment, a
//! stable code (`E001`, ...) and a [`StatusCode`] that places the error in the
//! runtime-wide status taxonomy.
//!
//! Errors are `Clone`: a poisoned semaphore keeps the original failure and
//! hands a copy of it to every waiter that observes the poison.

use crate::types::{FragmentId, QueueId, SemaphoreId};
use std::fmt;
use thiserror::Error;

/// Status taxonomy shared by every surface of the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// A bounded pool ran dry. Transient: retry after in-flight work retires.
    ResourceExhausted,
    /// A value moved in a forbidden direction (non-monotonic signal).
    OutOfRange,
    /// A blocking wait did not complete before its deadline.
    DeadlineExceeded,
    /// Malformed input such as a bad command-buffer recording.
    InvalidArgument,
    /// The object is not in a state that permits the operation.
    FailedPrecondition,
    /// The operation was abandoned because its owner went away.
    Aborted,
    /// A task failed while executing; propagated through semaphores.
    Internal,
}

impl StatusCode {
    /// Get the canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::Aborted => "ABORTED",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The main error type for taskhal operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HalError {
    // =========================================================================
    // Pool Errors (E001-E099)
    // =========================================================================
    /// Every block of the shared block pool is loaned to a live arena.
    #[error("E001: Block pool exhausted: {in_use}/{capacity} blocks in use")]
    BlockPoolExhausted {
        /// Blocks currently owned by arenas.
        in_use: usize,
        /// Maximum number of blocks the pool may hand out.
        capacity: usize,
    },

    /// Every event of the event pool is loaned to a waiter.
    #[error("E002: Event pool exhausted: all {capacity} events are loaned")]
    EventPoolExhausted {
        /// Fixed size of the pool.
        capacity: usize,
    },

    /// A single arena allocation cannot fit in one block.
    #[error("E003: Arena allocation of {requested} bytes exceeds block size {block_size}")]
    ArenaAllocationTooLarge {
        /// Number of bytes requested.
        requested: usize,
        /// Usable bytes per block.
        block_size: usize,
    },

    /// An arena pointer outlived the arena generation that produced it.
    #[error("E004: Stale arena pointer from generation {pointer_generation} (arena is at {arena_generation})")]
    ArenaStalePointer {
        /// Generation recorded in the pointer.
        pointer_generation: u32,
        /// Current generation of the arena.
        arena_generation: u32,
    },

    /// An arena pointer does not address memory owned by the arena.
    #[error("E005: Invalid arena pointer: block {block}, offset {offset}, length {len}")]
    ArenaInvalidPointer {
        /// Block index.
        block: u32,
        /// Byte offset inside the block.
        offset: u32,
        /// Length in bytes.
        len: u32,
    },

    // =========================================================================
    // Semaphore Errors (E100-E199)
    // =========================================================================
    /// Signal value did not strictly increase the timeline.
    #[error("E101: Semaphore {semaphore_id} signal to {requested} is not above current value {current}")]
    NonMonotonicSignal {
        /// The semaphore that rejected the signal.
        semaphore_id: SemaphoreId,
        /// Value at the time of the call.
        current: u64,
        /// Value the caller tried to signal.
        requested: u64,
    },

    /// A host wait did not complete before its deadline.
    #[error("E102: Wait on {pending} semaphore condition(s) exceeded its deadline")]
    DeadlineExceeded {
        /// Number of conditions still unsatisfied.
        pending: usize,
    },

    /// The semaphore was destroyed while timepoints were still pending.
    #[error("E103: Semaphore {semaphore_id} destroyed with pending timepoints")]
    SemaphoreDestroyed {
        /// The destroyed semaphore.
        semaphore_id: SemaphoreId,
    },

    // =========================================================================
    // Execution Errors (E200-E299)
    // =========================================================================
    /// A compiled entry point reported a failure for one workgroup.
    #[error("E201: Dispatch of '{executable}'[{ordinal}] failed at workgroup {workgroup:?}: {cause}")]
    DispatchFailed {
        /// Name of the executable.
        executable: String,
        /// Entry point ordinal.
        ordinal: usize,
        /// Workgroup coordinates that failed.
        workgroup: [u32; 3],
        /// Reason reported by the kernel.
        cause: String,
    },

    /// A task body panicked.
    #[error("E202: Task '{task}' in fragment {fragment_id} panicked: {message}")]
    TaskPanicked {
        /// The fragment that owned the task.
        fragment_id: FragmentId,
        /// Task kind label.
        task: String,
        /// The panic payload, if printable.
        message: String,
    },

    /// The task executor is shut down and can no longer accept work.
    #[error("E203: Task executor is shut down")]
    ExecutorShutdown,

    /// The task executor could not be started.
    #[error("E204: Failed to start task executor: {cause}")]
    ExecutorStart {
        /// Reason for the failure.
        cause: String,
    },

    // =========================================================================
    // Recording Errors (E300-E399)
    // =========================================================================
    /// A command-buffer recording is malformed.
    #[error("E301: Invalid command buffer recording: {cause}")]
    InvalidRecording {
        /// Description of the problem.
        cause: String,
    },

    /// A dispatch names an entry point the executable does not have.
    #[error("E302: Entry point {ordinal} out of range for '{executable}' ({count} entry points)")]
    InvalidEntryPoint {
        /// Name of the executable.
        executable: String,
        /// Requested ordinal.
        ordinal: usize,
        /// Number of entry points.
        count: usize,
    },

    /// A buffer range lies outside its buffer.
    #[error("E303: Buffer range [{offset}, {offset}+{length}) outside buffer of {size} bytes")]
    BufferRange {
        /// Range start.
        offset: usize,
        /// Range length.
        length: usize,
        /// Buffer size.
        size: usize,
    },

    /// A fill pattern is not 1, 2 or 4 bytes, or does not tile the range.
    #[error("E304: Invalid fill pattern of {pattern_length} bytes for range of {length} bytes")]
    InvalidFillPattern {
        /// Pattern length in bytes.
        pattern_length: usize,
        /// Fill range length.
        length: usize,
    },

    /// The command buffer is in the wrong state for the operation.
    #[error("E305: Command buffer is {actual}, expected {expected}")]
    CommandBufferState {
        /// State required by the operation.
        expected: String,
        /// State the command buffer is in.
        actual: String,
    },

    // =========================================================================
    // Queue/Device Errors (E400-E499)
    // =========================================================================
    /// A queue index does not exist on the device.
    #[error("E401: Queue {index} does not exist ({count} queues)")]
    QueueNotFound {
        /// Requested index.
        index: usize,
        /// Number of queues.
        count: usize,
    },

    /// A queue did not drain before its deadline.
    #[error("E402: Queue {queue_id} still has {in_flight} fragment(s) in flight")]
    QueueBusy {
        /// The queue being drained.
        queue_id: QueueId,
        /// Fragments not yet retired.
        in_flight: usize,
    },

    /// Catch-all for invariant violations inside the runtime.
    #[error("E499: Internal error: {cause}")]
    Internal {
        /// Description of the violation.
        cause: String,
    },
}

impl HalError {
    /// Get the error code (e.g., "E001").
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::BlockPoolExhausted { .. } => "E001",
            Self::EventPoolExhausted { .. } => "E002",
            Self::ArenaAllocationTooLarge { .. } => "E003",
            Self::ArenaStalePointer { .. } => "E004",
            Self::ArenaInvalidPointer { .. } => "E005",
            Self::NonMonotonicSignal { .. } => "E101",
            Self::DeadlineExceeded { .. } => "E102",
            Self::SemaphoreDestroyed { .. } => "E103",
            Self::DispatchFailed { .. } => "E201",
            Self::TaskPanicked { .. } => "E202",
            Self::ExecutorShutdown => "E203",
            Self::ExecutorStart { .. } => "E204",
            Self::InvalidRecording { .. } => "E301",
            Self::InvalidEntryPoint { .. } => "E302",
            Self::BufferRange { .. } => "E303",
            Self::InvalidFillPattern { .. } => "E304",
            Self::CommandBufferState { .. } => "E305",
            Self::QueueNotFound { .. } => "E401",
            Self::QueueBusy { .. } => "E402",
            Self::Internal { .. } => "E499",
        }
    }

    /// Map this error onto the status taxonomy.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BlockPoolExhausted { .. } | Self::EventPoolExhausted { .. } => {
                StatusCode::ResourceExhausted
            }
            Self::NonMonotonicSignal { .. } => StatusCode::OutOfRange,
            Self::DeadlineExceeded { .. } | Self::QueueBusy { .. } => StatusCode::DeadlineExceeded,
            Self::ArenaAllocationTooLarge { .. }
            | Self::ArenaInvalidPointer { .. }
            | Self::InvalidRecording { .. }
            | Self::InvalidEntryPoint { .. }
            | Self::BufferRange { .. }
            | Self::InvalidFillPattern { .. }
            | Self::QueueNotFound { .. } => StatusCode::InvalidArgument,
            Self::ArenaStalePointer { .. } | Self::CommandBufferState { .. } => {
                StatusCode::FailedPrecondition
            }
            Self::SemaphoreDestroyed { .. } | Self::ExecutorShutdown => StatusCode::Aborted,
            Self::DispatchFailed { .. }
            | Self::TaskPanicked { .. }
            | Self::ExecutorStart { .. }
            | Self::Internal { .. } => StatusCode::Internal,
        }
    }

    /// Check if this error is retriable.
    ///
    /// Only pool exhaustion is: the caller is expected to try again once an
    /// in-flight arena or event has been released.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        self.status_code() == StatusCode::ResourceExhausted
    }

    /// Check if this error is caused by a malformed recording or argument.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        self.status_code() == StatusCode::InvalidArgument
    }

    /// Build an [`HalError::Internal`] from anything printable.
    pub fn internal(cause: impl fmt::Display) -> Self {
        Self::Internal {
            cause: cause.to_string(),
        }
    }
}

/// Result type alias using `HalError`.
pub type Result<T> = std::result::Result<T, HalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_correct() {
        let err = HalError::BlockPoolExhausted {
            in_use: 4,
            capacity: 4,
        };
        assert_eq!(err.code(), "E001");

        let err = HalError::NonMonotonicSignal {
            semaphore_id: SemaphoreId::new(3),
            current: 5,
            requested: 5,
        };
        assert_eq!(err.code(), "E101");
        assert_eq!(err.status_code(), StatusCode::OutOfRange);
    }

    #[test]
    fn error_display() {
        let err = HalError::NonMonotonicSignal {
            semaphore_id: SemaphoreId::new(7),
            current: 10,
            requested: 9,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("E101"));
        assert!(msg.contains("semaphore_7"));
        assert!(msg.contains("current value 10"));
    }

    #[test]
    fn only_exhaustion_is_retriable() {
        assert!(HalError::EventPoolExhausted { capacity: 2 }.is_retriable());
        assert!(
            HalError::BlockPoolExhausted {
                in_use: 1,
                capacity: 1
            }
            .is_retriable()
        );
        assert!(!HalError::DeadlineExceeded { pending: 1 }.is_retriable());
        assert!(
            !HalError::InvalidRecording {
                cause: "bad".to_string()
            }
            .is_retriable()
        );
    }

    #[test]
    fn taxonomy_mapping() {
        assert_eq!(
            HalError::DeadlineExceeded { pending: 2 }.status_code(),
            StatusCode::DeadlineExceeded
        );
        assert_eq!(
            HalError::InvalidFillPattern {
                pattern_length: 3,
                length: 9
            }
            .status_code(),
            StatusCode::InvalidArgument
        );
        assert_eq!(
            HalError::DispatchFailed {
                executable: "k".to_string(),
                ordinal: 0,
                workgroup: [0, 0, 0],
                cause: "oob".to_string(),
            }
            .status_code(),
            StatusCode::Internal
        );
        assert_eq!(StatusCode::ResourceExhausted.to_string(), "RESOURCE_EXHAUSTED");
    }

    #[test]
    fn errors_clone_equal() {
        let err = HalError::internal("boom");
        assert_eq!(err.clone(), err);
    }
}
