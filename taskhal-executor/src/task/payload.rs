//! Task payloads: what a task-graph node does when it runs.

use super::fragment::Fragment;
use crate::buffer::{BufferBinding, bytes_to_u32s};
use crate::command_buffer::BarrierScope;
use crate::executable::{self, LocalExecutable};
use crate::queue::RetireCall;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use taskhal_core::{ArenaPtr, Result};

/// Work carried by one task-graph node.
pub enum TaskPayload {
    /// A range of workgroups of one dispatch.
    Dispatch(DispatchCall),
    /// A synchronization-only node.
    Barrier(BarrierCall),
    /// Tile a pattern over a buffer range.
    Fill(FillCall),
    /// Copy one buffer range into another.
    Copy(CopyCall),
    /// The fragment sink.
    Retire(RetireCall),
}

impl TaskPayload {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Dispatch(_) => "dispatch",
            Self::Barrier(_) => "barrier",
            Self::Fill(_) => "fill",
            Self::Copy(_) => "copy",
            Self::Retire(_) => "retire",
        }
    }

    /// Whether this is the retire task.
    pub fn is_retire(&self) -> bool {
        matches!(self, Self::Retire(_))
    }

    /// Run the payload against its fragment.
    pub(crate) fn run(&self, fragment: &Fragment) -> Result<()> {
        match self {
            Self::Dispatch(call) => call.run(fragment),
            Self::Barrier(_) => Ok(()),
            Self::Fill(call) => call.run(fragment),
            Self::Copy(call) => {
                call.target.copy_from(&call.source);
                Ok(())
            }
            Self::Retire(call) => {
                call.retire(fragment);
                Ok(())
            }
        }
    }
}

impl fmt::Debug for TaskPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dispatch(call) => f
                .debug_struct("Dispatch")
                .field("executable", &call.executable.name())
                .field("ordinal", &call.ordinal)
                .field("workgroups", &call.workgroups)
                .finish(),
            Self::Barrier(call) => f.debug_tuple("Barrier").field(call).finish(),
            Self::Fill(call) => f.debug_tuple("Fill").field(call).finish(),
            Self::Copy(call) => f.debug_tuple("Copy").field(call).finish(),
            Self::Retire(_) => f.write_str("Retire"),
        }
    }
}

/// A contiguous range of workgroups of one dispatch.
///
/// Workgroups are numbered row-major over `workgroup_count`; the range is a
/// slice of that linear index space.
pub struct DispatchCall {
    pub(crate) executable: Arc<dyn LocalExecutable>,
    pub(crate) ordinal: usize,
    pub(crate) workgroup_count: [u32; 3],
    pub(crate) workgroups: Range<u64>,
    pub(crate) push_constants: Option<ArenaPtr>,
    pub(crate) bindings: Arc<[BufferBinding]>,
}

impl DispatchCall {
    fn run(&self, fragment: &Fragment) -> Result<()> {
        let push_constants = match self.push_constants {
            Some(ptr) => bytes_to_u32s(fragment.arena().read().get(ptr)?),
            None => Vec::new(),
        };
        for linear in self.workgroups.clone() {
            executable::issue_call(
                self.executable.as_ref(),
                self.ordinal,
                delinearize(linear, self.workgroup_count),
                self.workgroup_count,
                &self.bindings,
                &push_constants,
            )?;
        }
        Ok(())
    }
}

/// Why a barrier node exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierCall {
    /// Root of a fragment, released once every wait semaphore is reached.
    Wait,
    /// A recorded execution or memory barrier.
    Recorded(BarrierScope),
}

/// Tile a pattern stored in the fragment arena over a buffer range.
#[derive(Debug)]
pub struct FillCall {
    pub(crate) target: BufferBinding,
    pub(crate) pattern: ArenaPtr,
}

impl FillCall {
    fn run(&self, fragment: &Fragment) -> Result<()> {
        let arena = fragment.arena().read();
        let pattern = arena.get(self.pattern)?;
        self.target.fill(pattern);
        Ok(())
    }
}

/// Copy `source` into `target`. Lengths were checked when recording.
#[derive(Debug)]
pub struct CopyCall {
    pub(crate) source: BufferBinding,
    pub(crate) target: BufferBinding,
}

/// Row-major linear workgroup index to coordinates.
pub(crate) fn delinearize(linear: u64, count: [u32; 3]) -> [u32; 3] {
    let [cx, cy, _] = count.map(u64::from);
    let x = linear % cx;
    let y = (linear / cx) % cy;
    let z = linear / (cx * cy);
    [x as u32, y as u32, z as u32]
}
