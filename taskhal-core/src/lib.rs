//! taskhal core library
//!
//! Leaf primitives of the taskhal CPU execution engine. Nothing in this crate
//! knows about task graphs; it provides the resources the executor crate
//! builds on.
//!
//! # Key Components
//!
//! - **Error**: [`HalError`] and the [`StatusCode`] taxonomy
//! - **Arena**: bump allocation over a bounded, shared [`BlockPool`]
//! - **Event pool**: reusable wait/signal [`Event`]s loaned to blocking waiters
//! - **Types**: strongly-typed identifiers and [`Deadline`]s
//! - **Logging**: correlated, queryable log events
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use taskhal_core::{Arena, BlockPool};
//!
//! let pool = Arc::new(BlockPool::new(4096, 4));
//! let mut arena = Arena::new(Arc::clone(&pool));
//! let ptr = arena.write_u32s(&[1, 2, 3]).unwrap();
//! assert_eq!(arena.read_u32s(ptr).unwrap(), vec![1, 2, 3]);
//!
//! arena.reset();
//! assert_eq!(pool.in_use(), 0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arena;
pub mod config;
pub mod error;
pub mod event_pool;
pub mod logging;
pub mod types;

pub use arena::{Arena, ArenaPtr, BlockPool};
pub use config::PoolConfig;
pub use error::{HalError, Result, StatusCode};
pub use event_pool::{Event, EventPool, EventToken, EventWait, PooledEvent};
pub use types::{Deadline, FragmentId, QueueId, SemaphoreId};
