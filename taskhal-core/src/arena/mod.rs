//! Arena allocation for transient issue-time structures.
//!
//! Everything created while issuing a command buffer (push-constant copies,
//! timepoint records, fill patterns) lives in one [`Arena`] whose lifetime is
//! tied to the task-graph fragment it backs. The arena draws fixed-size blocks
//! from a [`BlockPool`] shared by the whole device and returns them in bulk
//! when the fragment retires.
//!
//! # Layout
//!
//! ```text
//! BlockPool (shared, bounded)
//! ┌────────┬────────┬────────┬────────┐
//! │ free   │ free   │ loaned │ loaned │ ...
//! └────────┴────────┴───┬────┴───┬────┘
//!                       │        │
//! Arena (one fragment)  ▼        ▼
//! ┌──────────────────────────────────────────┐
//! │ block 0: [alloc][alloc][alloc]...        │
//! │ block 1: [alloc][alloc]  <- head         │
//! └──────────────────────────────────────────┘
//! ```

mod allocator;
mod block_pool;

pub use allocator::{ARENA_ALIGNMENT, Arena, ArenaPtr};
pub use block_pool::{Block, BlockPool};
