//! Command-buffer recording.
//!
//! A [`CommandBuffer`] is an ordered list of commands recorded by the host and
//! frozen by [`end`](CommandBuffer::end). Recording validates every argument,
//! so a frozen buffer only needs its structure checked when it is issued.
//! Issuing translates the commands into task-graph nodes (see [`issue`]).

pub(crate) mod issue;

use crate::buffer::BufferBinding;
use crate::executable::LocalExecutable;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use taskhal_core::{HalError, Result};

/// How often a command buffer may be issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandBufferMode {
    /// Issued at most once.
    #[default]
    OneShot,
    /// Issued any number of times.
    Reusable,
}

/// Pipeline stage named by a barrier scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStage {
    /// Command issue.
    CommandIssue,
    /// Command processing.
    CommandProcess,
    /// Kernel dispatch.
    Dispatch,
    /// Fill and copy.
    Transfer,
    /// Command retirement.
    CommandRetire,
    /// Host access.
    Host,
}

/// The ordering scope a barrier declares: work of `source` before work of
/// `target`.
///
/// Every recorded barrier is issued as a full complete-before edge; the
/// scope is kept for logs and debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierScope {
    /// Stage that must complete.
    pub source: ExecutionStage,
    /// Stage that waits.
    pub target: ExecutionStage,
}

/// One recorded command.
pub(crate) enum Command {
    Dispatch {
        executable: Arc<dyn LocalExecutable>,
        ordinal: usize,
        workgroup_count: [u32; 3],
        push_constants: Vec<u32>,
        bindings: Arc<[BufferBinding]>,
    },
    Barrier(BarrierScope),
    Fill {
        target: BufferBinding,
        pattern: Vec<u8>,
    },
    Copy {
        source: BufferBinding,
        target: BufferBinding,
    },
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dispatch {
                executable,
                ordinal,
                workgroup_count,
                ..
            } => f
                .debug_struct("Dispatch")
                .field("executable", &executable.name())
                .field("ordinal", ordinal)
                .field("workgroup_count", workgroup_count)
                .finish(),
            Self::Barrier(scope) => f.debug_tuple("Barrier").field(scope).finish(),
            Self::Fill { target, pattern } => f
                .debug_struct("Fill")
                .field("target", target)
                .field("pattern", pattern)
                .finish(),
            Self::Copy { source, target } => f
                .debug_struct("Copy")
                .field("source", source)
                .field("target", target)
                .finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordingState {
    Recording,
    Executable,
}

impl RecordingState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Recording => "recording",
            Self::Executable => "executable",
        }
    }
}

#[derive(Debug)]
struct Recording {
    state: RecordingState,
    commands: Vec<Command>,
}

/// An ordered, validated command recording.
#[derive(Debug)]
pub struct CommandBuffer {
    mode: CommandBufferMode,
    recording: Mutex<Recording>,
    issued: AtomicBool,
}

impl CommandBuffer {
    /// Start recording.
    pub fn new(mode: CommandBufferMode) -> Self {
        Self {
            mode,
            recording: Mutex::new(Recording {
                state: RecordingState::Recording,
                commands: Vec::new(),
            }),
            issued: AtomicBool::new(false),
        }
    }

    /// Issue mode.
    pub fn mode(&self) -> CommandBufferMode {
        self.mode
    }

    /// Number of recorded commands.
    pub fn len(&self) -> usize {
        self.recording.lock().commands.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.recording.lock().commands.is_empty()
    }

    /// Whether [`end`](Self::end) was called.
    pub fn is_executable(&self) -> bool {
        self.recording.lock().state == RecordingState::Executable
    }

    /// Record a dispatch of `workgroup_count` workgroups of entry point
    /// `ordinal`.
    pub fn dispatch(
        &self,
        executable: Arc<dyn LocalExecutable>,
        ordinal: usize,
        workgroup_count: [u32; 3],
        push_constants: &[u32],
        bindings: &[BufferBinding],
    ) -> Result<()> {
        let count = executable.entry_point_count();
        if ordinal >= count {
            return Err(HalError::InvalidEntryPoint {
                executable: executable.name().to_string(),
                ordinal,
                count,
            });
        }
        if workgroup_total(workgroup_count).is_none() {
            return Err(workgroup_overflow(workgroup_count));
        }
        self.record(Command::Dispatch {
            executable,
            ordinal,
            workgroup_count,
            push_constants: push_constants.to_vec(),
            bindings: Arc::from(bindings),
        })
    }

    /// Record an execution barrier: everything before completes before
    /// anything after starts.
    pub fn execution_barrier(&self, source: ExecutionStage, target: ExecutionStage) -> Result<()> {
        self.record(Command::Barrier(BarrierScope { source, target }))
    }

    /// Record a memory barrier. Host-visible memory is coherent, so it orders
    /// work exactly like an execution barrier.
    pub fn memory_barrier(&self, source: ExecutionStage, target: ExecutionStage) -> Result<()> {
        self.record(Command::Barrier(BarrierScope { source, target }))
    }

    /// Record a fill of `target` with a 1, 2 or 4 byte `pattern`.
    pub fn fill_buffer(&self, target: BufferBinding, pattern: &[u8]) -> Result<()> {
        let pattern_length = pattern.len();
        if !matches!(pattern_length, 1 | 2 | 4) || target.len() % pattern_length != 0 {
            return Err(HalError::InvalidFillPattern {
                pattern_length,
                length: target.len(),
            });
        }
        self.record(Command::Fill {
            target,
            pattern: pattern.to_vec(),
        })
    }

    /// Record a copy of `source` into `target`. Lengths must match.
    pub fn copy_buffer(&self, source: BufferBinding, target: BufferBinding) -> Result<()> {
        if source.len() != target.len() {
            return Err(HalError::InvalidRecording {
                cause: format!(
                    "copy source is {} bytes but target is {} bytes",
                    source.len(),
                    target.len()
                ),
            });
        }
        self.record(Command::Copy { source, target })
    }

    /// Finish recording. The buffer becomes issuable and immutable.
    pub fn end(&self) -> Result<()> {
        let mut recording = self.recording.lock();
        check_state(&recording, RecordingState::Recording)?;
        recording.state = RecordingState::Executable;
        Ok(())
    }

    fn record(&self, command: Command) -> Result<()> {
        let mut recording = self.recording.lock();
        check_state(&recording, RecordingState::Recording)?;
        recording.commands.push(command);
        Ok(())
    }

    /// Fail unless the buffer can be issued.
    pub(crate) fn check_issuable(&self) -> Result<()> {
        if self.recording.lock().state != RecordingState::Executable {
            return Err(HalError::InvalidRecording {
                cause: "command buffer was not ended".to_string(),
            });
        }
        if self.mode == CommandBufferMode::OneShot && self.issued.load(Ordering::Acquire) {
            return Err(one_shot_reissued());
        }
        Ok(())
    }

    /// Mark the buffer issued. A one-shot buffer can be marked once.
    pub(crate) fn mark_issued(&self) -> Result<()> {
        let first = !self.issued.swap(true, Ordering::AcqRel);
        if self.mode == CommandBufferMode::OneShot && !first {
            return Err(one_shot_reissued());
        }
        Ok(())
    }

    /// Whether the buffer was issued at least once.
    pub fn is_issued(&self) -> bool {
        self.issued.load(Ordering::Acquire)
    }

    /// Run `f` over the frozen command list.
    pub(crate) fn with_commands<R>(&self, f: impl FnOnce(&[Command]) -> R) -> R {
        f(&self.recording.lock().commands)
    }
}

/// Total workgroups of a dispatch, or `None` if it does not fit in 64 bits.
pub(crate) fn workgroup_total(workgroup_count: [u32; 3]) -> Option<u64> {
    workgroup_count
        .iter()
        .try_fold(1u64, |total, &count| total.checked_mul(u64::from(count)))
}

pub(crate) fn workgroup_overflow(workgroup_count: [u32; 3]) -> HalError {
    HalError::InvalidRecording {
        cause: format!("workgroup count {:?} overflows a 64-bit total", workgroup_count),
    }
}

fn check_state(recording: &Recording, expected: RecordingState) -> Result<()> {
    if recording.state != expected {
        return Err(HalError::CommandBufferState {
            expected: expected.as_str().to_string(),
            actual: recording.state.as_str().to_string(),
        });
    }
    Ok(())
}

fn one_shot_reissued() -> HalError {
    HalError::CommandBufferState {
        expected: "not yet issued".to_string(),
        actual: "issued".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;
    use crate::executable::KernelLibrary;

    fn library() -> Arc<dyn LocalExecutable> {
        Arc::new(KernelLibrary::new("noop").with_entry_point("noop", [1, 1, 1], |_| Ok(())))
    }

    #[test]
    fn records_until_ended() {
        let cb = CommandBuffer::new(CommandBufferMode::OneShot);
        cb.dispatch(library(), 0, [4, 1, 1], &[1, 2], &[]).unwrap();
        cb.execution_barrier(ExecutionStage::Dispatch, ExecutionStage::Dispatch)
            .unwrap();
        assert_eq!(cb.len(), 2);
        assert!(cb.check_issuable().is_err());

        cb.end().unwrap();
        assert!(cb.is_executable());
        let err = cb
            .memory_barrier(ExecutionStage::Dispatch, ExecutionStage::Host)
            .unwrap_err();
        assert_eq!(err.code(), "E305");
        assert!(cb.end().is_err());
    }

    #[test]
    fn validates_arguments() {
        let cb = CommandBuffer::new(CommandBufferMode::OneShot);
        let err = cb.dispatch(library(), 3, [1, 1, 1], &[], &[]).unwrap_err();
        assert!(err.is_invalid_argument());

        let buffer = Buffer::new(6);
        assert!(cb.fill_buffer(buffer.bind(), &[1, 2, 3]).is_err());
        assert!(cb.fill_buffer(buffer.bind(), &[1, 2, 3, 4]).is_err());
        cb.fill_buffer(buffer.bind(), &[1, 2]).unwrap();

        let small = Buffer::new(2);
        let err = cb.copy_buffer(small.bind(), buffer.bind()).unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(cb.len(), 1);
    }

    #[test]
    fn oversized_workgroup_counts_are_rejected() {
        let cb = CommandBuffer::new(CommandBufferMode::OneShot);
        let err = cb
            .dispatch(library(), 0, [u32::MAX; 3], &[], &[])
            .unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains("overflows"));
        assert!(cb.is_empty());

        cb.dispatch(library(), 0, [u32::MAX, u32::MAX, 1], &[], &[])
            .unwrap();
        assert_eq!(workgroup_total([u32::MAX, 2, 0]), Some(0));
        assert_eq!(workgroup_total([u32::MAX, u32::MAX, 2]), None);
    }

    #[test]
    fn one_shot_issues_once() {
        let cb = CommandBuffer::new(CommandBufferMode::OneShot);
        cb.end().unwrap();
        cb.check_issuable().unwrap();
        cb.mark_issued().unwrap();
        assert!(cb.check_issuable().is_err());
        assert!(cb.mark_issued().is_err());

        let reusable = CommandBuffer::new(CommandBufferMode::Reusable);
        reusable.end().unwrap();
        reusable.mark_issued().unwrap();
        reusable.mark_issued().unwrap();
        reusable.check_issuable().unwrap();
    }
}
