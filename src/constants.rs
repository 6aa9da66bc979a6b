//! Default limits and simulated latencies.
//!
//! These are the values [`BunchConfig::default`](crate::config::BunchConfig)
//! starts from. Override them per dispatcher through the config instead of
//! editing the constants.

/// Simulated latency of the single-unit fast path, in milliseconds.
pub const DEFAULT_UNIT_DELAY_MS: u64 = 2_000;

/// Simulated latency paid before each unit of a group, in milliseconds.
pub const DEFAULT_BUNCH_DELAY_MS: u64 = 1_000;

/// Smallest batch accepted by [`submit`](crate::Dispatcher::submit).
pub const DEFAULT_MIN_BUNCH_SIZE: usize = 2;

/// Largest batch accepted by [`submit`](crate::Dispatcher::submit).
pub const DEFAULT_MAX_BUNCH_SIZE: usize = 4;

/// Number of groups `solve_all` keeps in flight.
pub const DEFAULT_MIN_CONCURRENT_GROUPS: usize = 2;

/// Registry capacity: groups registered at the same time.
pub const DEFAULT_MAX_CONCURRENT_GROUPS: usize = 4;
