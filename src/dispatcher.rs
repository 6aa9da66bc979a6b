//! The public submit/poll facade.
//!
//! [`Dispatcher`] owns a [`GroupRegistry`] and a [`Solver`]. It is an
//! explicitly constructed service: create as many independent instances as
//! needed and call [`shutdown`](Dispatcher::shutdown) when done.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use taskbunch::{BunchConfig, Dispatcher, RetryPolicy, SumSolver};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> taskbunch::Result<()> {
//! let config = BunchConfig::default()
//!     .with_unit_delay(Duration::from_millis(1))
//!     .with_bunch_delay(Duration::from_millis(1));
//! let dispatcher = Dispatcher::new(SumSolver, config)?;
//!
//! let handle = dispatcher.submit(vec![(2, 3), (10, 20)])?;
//! let results = dispatcher.collect(handle, &RetryPolicy::default()).await?;
//! assert_eq!(results.into_values().collect::<Vec<_>>(), vec![5, 30]);
//!
//! assert_eq!(dispatcher.solve_one((7, 8)).await?, 15);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::batching::BatchSizePolicy;
use crate::config::BunchConfig;
use crate::error::{BunchError, Result};
use crate::handle::GroupHandle;
use crate::registry::{GroupRegistry, GroupSnapshot};
use crate::retry::{retry, RetryPolicy};
use crate::solver::Solver;
use crate::unit::WorkUnit;

/// Submits bunches, hands out handles and harvests results.
pub struct Dispatcher<S: Solver> {
    registry: GroupRegistry<S>,
    solver: Arc<S>,
}

impl<S: Solver> Dispatcher<S> {
    /// Create a dispatcher with its own empty registry.
    ///
    /// # Errors
    ///
    /// Returns [`BunchError::InvalidConfig`] if `config` fails validation.
    pub fn new(solver: S, config: BunchConfig) -> Result<Self> {
        let solver = Arc::new(solver);
        let registry = GroupRegistry::new(Arc::clone(&solver), config)?;
        Ok(Self { registry, solver })
    }

    /// The limits in effect.
    pub fn config(&self) -> &BunchConfig {
        self.registry.config()
    }

    /// The underlying registry.
    pub fn registry(&self) -> &GroupRegistry<S> {
        &self.registry
    }

    /// Start a bunch in the background and return its handle immediately.
    ///
    /// # Errors
    ///
    /// [`BunchError::OversizedGroup`], [`BunchError::UseSingleUnitPath`],
    /// [`BunchError::CapacityExceeded`] or, outside a Tokio runtime,
    /// [`BunchError::NoRuntime`]; nothing is registered in that case.
    pub fn submit(&self, inputs: Vec<S::Input>) -> Result<GroupHandle> {
        self.registry.admit(inputs)
    }

    /// [`submit`](Self::submit), retrying with backoff while the registry is
    /// at capacity.
    ///
    /// # Errors
    ///
    /// Non-retryable admission errors immediately;
    /// [`BunchError::RetriesExhausted`] once `policy` gives up.
    pub async fn submit_with_retry(
        &self,
        inputs: Vec<S::Input>,
        policy: &RetryPolicy,
    ) -> Result<GroupHandle>
    where
        S::Input: Clone,
    {
        let inputs = &inputs;
        retry(policy, move || async move { self.submit(inputs.clone()) }).await
    }

    /// Harvest whatever results of the bunch are ready, without waiting.
    ///
    /// An empty map means nothing new is ready yet. Once every result has
    /// been handed out the handle becomes unknown.
    ///
    /// # Errors
    ///
    /// [`BunchError::UnknownHandle`], [`BunchError::GroupFailed`] or
    /// [`BunchError::GroupCancelled`]; see [`GroupRegistry::harvest`].
    pub fn poll(&self, handle: GroupHandle) -> Result<BTreeMap<usize, S::Output>> {
        self.registry.harvest(handle)
    }

    /// Progress of a registered bunch.
    ///
    /// # Errors
    ///
    /// Returns [`BunchError::UnknownHandle`] for unregistered handles.
    pub fn status(&self, handle: GroupHandle) -> Result<GroupSnapshot> {
        self.registry.status(handle)
    }

    /// Stop a bunch and release its capacity slot.
    ///
    /// # Errors
    ///
    /// Returns [`BunchError::UnknownHandle`] for unregistered handles.
    pub fn cancel(&self, handle: GroupHandle) -> Result<()> {
        self.registry.cancel(handle)
    }

    /// Solve a single item without a handle or registry entry.
    ///
    /// The computation runs on its own background task and costs
    /// `unit_delay`; the caller waits for it.
    ///
    /// # Errors
    ///
    /// The solver's error, or [`BunchError::WorkerLost`] if the background
    /// task panicked.
    pub async fn solve_one(&self, input: S::Input) -> Result<S::Output> {
        let unit = Arc::new(WorkUnit::new(0, input));
        let worker = {
            let unit = Arc::clone(&unit);
            let solver = Arc::clone(&self.solver);
            let delay = self.config().unit_delay;
            tokio::spawn(async move {
                let computed = unit.compute(solver.as_ref()).await;
                tokio::time::sleep(delay).await;
                computed
            })
        };

        worker.await.map_err(|e| BunchError::WorkerLost {
            reason: e.to_string(),
        })??;
        Ok(unit.get().await)
    }

    /// Poll `handle` until every result has been harvested.
    ///
    /// Sleeps between empty polls according to `policy`; the backoff resets
    /// whenever new results arrive.
    ///
    /// # Errors
    ///
    /// - Any error from [`poll`](Self::poll), returned as soon as it occurs.
    /// - [`BunchError::Stalled`] if `policy` runs out of attempts without
    ///   progress. The group stays registered in that case.
    pub async fn collect(
        &self,
        handle: GroupHandle,
        policy: &RetryPolicy,
    ) -> Result<BTreeMap<usize, S::Output>> {
        let mut collected = BTreeMap::new();
        let mut backoff = policy.start();
        loop {
            let harvest = self.registry.take_ready(handle)?;
            let progressed = !harvest.results.is_empty();
            collected.extend(harvest.results);
            if harvest.drained {
                return Ok(collected);
            }

            if progressed {
                backoff.reset();
                continue;
            }
            match backoff.next_delay() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => {
                    return Err(BunchError::Stalled {
                        handle,
                        attempts: backoff.failures(),
                    });
                },
            }
        }
    }

    /// Solve an arbitrary list, returning results in input order.
    ///
    /// `batches` decides how the list is split. Batches below
    /// `min_bunch_size` are solved one item at a time through
    /// [`solve_one`](Self::solve_one); the others run as bunches, with at
    /// most `min_concurrent_groups` in flight. Bunches started here are
    /// cancelled if the call fails or is dropped.
    ///
    /// # Errors
    ///
    /// The first error from any batch, e.g. [`BunchError::OversizedGroup`]
    /// if `batches` plans batches above `max_bunch_size`.
    pub async fn solve_all(
        &self,
        inputs: Vec<S::Input>,
        batches: &dyn BatchSizePolicy,
        policy: &RetryPolicy,
    ) -> Result<Vec<S::Output>>
    where
        S::Input: Clone,
    {
        let mut items = inputs.into_iter();
        let mut planned = Vec::new();
        let mut offset = 0;
        for size in batches.plan(items.len()) {
            let batch: Vec<S::Input> = items.by_ref().take(size).collect();
            planned.push((offset, batch));
            offset += size;
        }
        tracing::debug!(items = offset, batches = planned.len(), "solving task list");

        let width = self.config().min_concurrent_groups;
        let mut running = stream::iter(planned)
            .map(move |(offset, batch)| self.solve_batch(offset, batch, policy))
            .buffer_unordered(width);

        let mut solved = BTreeMap::new();
        while let Some(outcome) = running.next().await {
            let (offset, outputs) = outcome?;
            solved.insert(offset, outputs);
        }
        Ok(solved.into_values().flatten().collect())
    }

    /// Cancel every bunch and wait for the workers to stop.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }

    async fn solve_batch(
        &self,
        offset: usize,
        batch: Vec<S::Input>,
        policy: &RetryPolicy,
    ) -> Result<(usize, Vec<S::Output>)>
    where
        S::Input: Clone,
    {
        if batch.len() < self.config().min_bunch_size {
            let mut outputs = Vec::with_capacity(batch.len());
            for input in batch {
                outputs.push(self.solve_one(input).await?);
            }
            return Ok((offset, outputs));
        }

        let handle = self.submit_with_retry(batch, policy).await?;
        let _guard = CancelOnDrop {
            registry: &self.registry,
            handle,
        };
        let results = self.collect(handle, policy).await?;
        Ok((offset, results.into_values().collect()))
    }
}

impl<S: Solver> fmt::Debug for Dispatcher<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .finish()
    }
}

/// Cancels a bunch when dropped. A drained handle is already unknown, so
/// the cancel is a no-op after a successful collect.
struct CancelOnDrop<'a, S: Solver> {
    registry: &'a GroupRegistry<S>,
    handle: GroupHandle,
}

impl<S: Solver> Drop for CancelOnDrop<'_, S> {
    fn drop(&mut self) {
        if self.registry.cancel(self.handle).is_ok() {
            tracing::debug!(handle = %self.handle, "abandoned bunch cancelled");
        }
    }
}
