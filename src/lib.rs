//! Bunched background task execution with handle-based polling.
//!
//! Callers submit small groups ("bunches") of independent work items,
//! receive a [`GroupHandle`] immediately, and later poll that handle for
//! whichever results are ready. Each bunch runs sequentially on its own
//! background worker; a [`GroupRegistry`] enforces size and capacity limits
//! at admission and drops a bunch once every result has been harvested.
//!
//! # Overview
//!
//! ```text
//! submit(items) -> handle          poll(handle) -> {index: result, ...}
//!        |                                  |
//!   GroupRegistry --owns--> TaskGroup --owns--> WorkUnit (write-once cell)
//!        |                      ^
//!        +--spawns worker-------+  (units computed in index order)
//! ```
//!
//! # Module Organization
//!
//! - [`dispatcher`] - The [`Dispatcher`] facade: submit, poll, fast path, collection
//! - [`registry`] - Handle-keyed group ownership and admission control
//! - [`group`] - [`TaskGroup`] execution, harvesting and [`GroupStatus`]
//! - [`unit`] - [`WorkUnit`] single-assignment result cells
//! - [`solver`] - The [`Solver`] computation trait and [`SumSolver`]
//! - [`batching`] - [`BatchSizePolicy`] strategies for splitting task lists
//! - [`retry`] - [`RetryPolicy`] backoff for polling loops
//! - [`config`] - [`BunchConfig`] limits and delays
//! - [`error`] - [`BunchError`] taxonomy
//! - [`input`] - Task pair parsing and result output
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use taskbunch::{BunchConfig, BunchError, Dispatcher, GroupHandle, SumSolver};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> taskbunch::Result<()> {
//! let dispatcher = Dispatcher::new(
//!     SumSolver,
//!     BunchConfig::default().with_bunch_delay(Duration::from_millis(1)),
//! )?;
//!
//! let err = dispatcher.submit(vec![(1, 1); 5]).unwrap_err();
//! assert_eq!(err, BunchError::OversizedGroup { size: 5, max: 4 });
//!
//! let err = dispatcher.poll(GroupHandle::from(12345)).unwrap_err();
//! assert!(matches!(err, BunchError::UnknownHandle { .. }));
//! # Ok(())
//! # }
//! ```

pub mod batching;
pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod error;
pub mod group;
pub mod handle;
pub mod input;
#[cfg(feature = "logging")]
pub mod logging;
pub mod registry;
pub mod retry;
pub mod solver;
pub mod unit;

// Re-exports for ergonomic access
pub use batching::{BalancedBatches, BatchSizePolicy, FixedBatches};
pub use config::BunchConfig;
pub use dispatcher::Dispatcher;
pub use error::{BunchError, Result};
pub use group::{GroupStatus, TaskGroup};
pub use handle::GroupHandle;
pub use registry::{GroupRegistry, GroupSnapshot, Harvest};
pub use retry::{Backoff, RetryPolicy};
pub use solver::{Solver, SumSolver};
pub use unit::WorkUnit;
