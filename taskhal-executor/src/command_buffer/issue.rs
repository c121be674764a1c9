//! Translating a command recording into task-graph nodes.
//!
//! The issuer walks the commands in order, tracking the last barrier node
//! and the set of nodes issued since it ("open" work):
//! - a dispatch becomes `ceil(N / workgroups_per_task)` range tasks
//! - a fill or copy becomes one task
//! - work depends only on the last barrier, so independent dispatch chains
//!   between two barriers run in parallel
//! - a barrier depends on every open node and becomes the new last barrier;
//!   a barrier with no open work collapses into the previous one
//!
//! Transient data (push constants, fill patterns) is copied into the fragment
//! arena, so the recording can be reused or dropped while the work runs.

use super::{Command, CommandBuffer, workgroup_overflow, workgroup_total};
use crate::task::{
    BarrierCall, CopyCall, DispatchCall, FillCall, FragmentBuilder, TaskPayload,
};
use std::sync::Arc;
use taskhal_core::Result;

/// Issues recordings into one fragment.
pub(crate) struct Issuer<'a> {
    builder: &'a mut FragmentBuilder,
    workgroups_per_task: u64,
    barrier: Option<usize>,
    open: Vec<usize>,
}

impl<'a> Issuer<'a> {
    /// Issue after `root` (the fragment's wait node), if any.
    pub(crate) fn new(
        builder: &'a mut FragmentBuilder,
        root: Option<usize>,
        workgroups_per_task: u64,
    ) -> Self {
        Self {
            builder,
            workgroups_per_task: workgroups_per_task.max(1),
            barrier: root,
            open: Vec::new(),
        }
    }

    /// Issue every command of `command_buffer`.
    pub(crate) fn issue(&mut self, command_buffer: &CommandBuffer) -> Result<()> {
        command_buffer.with_commands(|commands| {
            commands
                .iter()
                .try_for_each(|command| self.issue_command(command))
        })
    }

    /// Nodes nothing issued so far depends on.
    pub(crate) fn leaves(self) -> Vec<usize> {
        if self.open.is_empty() {
            self.barrier.into_iter().collect()
        } else {
            self.open
        }
    }

    fn issue_command(&mut self, command: &Command) -> Result<()> {
        match command {
            Command::Dispatch {
                executable,
                ordinal,
                workgroup_count,
                push_constants,
                bindings,
            } => {
                let total = workgroup_total(*workgroup_count)
                    .ok_or_else(|| workgroup_overflow(*workgroup_count))?;
                if total == 0 {
                    return Ok(());
                }
                let push_constants = if push_constants.is_empty() {
                    None
                } else {
                    Some(self.builder.arena_mut().write_u32s(push_constants)?)
                };
                let mut start = 0;
                while start < total {
                    let end = total.min(start.saturating_add(self.workgroups_per_task));
                    self.add_work(TaskPayload::Dispatch(DispatchCall {
                        executable: Arc::clone(executable),
                        ordinal: *ordinal,
                        workgroup_count: *workgroup_count,
                        workgroups: start..end,
                        push_constants,
                        bindings: Arc::clone(bindings),
                    }));
                    start = end;
                }
            }
            Command::Barrier(scope) => {
                if !self.open.is_empty() {
                    let open = std::mem::take(&mut self.open);
                    let node = self
                        .builder
                        .add(TaskPayload::Barrier(BarrierCall::Recorded(*scope)), &open);
                    self.barrier = Some(node);
                }
            }
            Command::Fill { target, pattern } => {
                let pattern = self.builder.arena_mut().write(pattern)?;
                self.add_work(TaskPayload::Fill(FillCall {
                    target: target.clone(),
                    pattern,
                }));
            }
            Command::Copy { source, target } => {
                self.add_work(TaskPayload::Copy(CopyCall {
                    source: source.clone(),
                    target: target.clone(),
                }));
            }
        }
        Ok(())
    }

    fn add_work(&mut self, payload: TaskPayload) {
        let node = self.builder.add(payload, self.barrier.as_slice());
        self.open.push(node);
    }
}
