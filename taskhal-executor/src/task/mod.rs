//! Task graphs handed to the executor.
//!
//! - [`TaskPayload`] - tagged union of everything a node can do
//! - [`FragmentBuilder`] / [`Fragment`] - the DAG of one submission
//! - [`TaskRef`] - handle to one node, released as dependencies finish
//! - [`Submitter`] / [`TaskSubmission`] - message-passing path to the executor

mod fragment;
mod payload;
mod submission;

pub use fragment::{Fragment, FragmentBuilder, TaskRef};
pub use payload::{BarrierCall, CopyCall, DispatchCall, FillCall, TaskPayload};
pub use submission::{Submitter, TaskSubmission};

