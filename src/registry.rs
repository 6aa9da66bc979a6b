//! Handle-keyed registry of running groups.
//!
//! [`GroupRegistry`] is the sole owner of every [`TaskGroup`]. Callers only
//! ever hold [`GroupHandle`]s. One mutex serializes admission checks,
//! insertion, lookup and removal, so a capacity check and the insert it
//! guards can never interleave with another submit.
//!
//! # Lifecycle
//!
//! - `admit` checks limits, registers the group and spawns its worker.
//! - `harvest` hands out ready results and prunes the group once it is
//!   drained (or once a failed group has nothing left to give).
//! - `cancel` stops a group and frees its slot immediately.
//! - With a `group_ttl`, groups nobody polls are evicted on the next admit.
//! - `shutdown` cancels everything and waits for the workers.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::BunchConfig;
use crate::error::{BunchError, Result};
use crate::group::{GroupStatus, TaskGroup};
use crate::handle::{GroupHandle, HandleAllocator};
use crate::solver::Solver;

/// Point-in-time view of a registered group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSnapshot {
    /// The group's handle.
    pub handle: GroupHandle,
    /// Worker status.
    pub status: GroupStatus,
    /// Units the group was created with.
    pub size: usize,
    /// Units not yet harvested.
    pub remaining: usize,
    /// Failure reason for [`GroupStatus::Failed`] groups.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Results handed out by one [`GroupRegistry::take_ready`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Harvest<O> {
    /// Newly ready results by unit index.
    pub results: BTreeMap<usize, O>,
    /// `true` if this call removed the group's last units; the handle is
    /// unknown from now on.
    pub drained: bool,
}

struct Entry<S: Solver> {
    group: Arc<TaskGroup<S>>,
    worker: JoinHandle<()>,
    touched: Instant,
}

struct RegistryInner<S: Solver> {
    groups: HashMap<GroupHandle, Entry<S>>,
    handles: HandleAllocator,
}

/// Concurrent mapping from handle to group with capacity enforcement.
///
/// Workers are spawned on the ambient Tokio runtime; [`admit`](Self::admit)
/// fails with [`BunchError::NoRuntime`] outside one.
pub struct GroupRegistry<S: Solver> {
    inner: Mutex<RegistryInner<S>>,
    solver: Arc<S>,
    config: BunchConfig,
}

impl<S: Solver> GroupRegistry<S> {
    /// Create an empty registry.
    ///
    /// # Errors
    ///
    /// Returns [`BunchError::InvalidConfig`] if `config` fails validation.
    pub fn new(solver: Arc<S>, config: BunchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Mutex::new(RegistryInner {
                groups: HashMap::new(),
                handles: HandleAllocator::new(),
            }),
            solver,
            config,
        })
    }

    /// The limits this registry enforces.
    pub fn config(&self) -> &BunchConfig {
        &self.config
    }

    /// Number of registered groups.
    pub fn len(&self) -> usize {
        self.inner.lock().groups.len()
    }

    /// `true` if no group is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().groups.is_empty()
    }

    /// `true` if `handle` refers to a registered group.
    pub fn contains(&self, handle: GroupHandle) -> bool {
        self.inner.lock().groups.contains_key(&handle)
    }

    /// Handles of every registered group, ascending.
    pub fn handles(&self) -> Vec<GroupHandle> {
        let mut handles: Vec<GroupHandle> = self.inner.lock().groups.keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    /// Register a group for `inputs` and start its worker.
    ///
    /// # Errors
    ///
    /// - [`BunchError::OversizedGroup`] if there are more than `max_bunch_size` inputs.
    /// - [`BunchError::UseSingleUnitPath`] if there are fewer than `min_bunch_size`.
    /// - [`BunchError::CapacityExceeded`] if `max_concurrent_groups` groups are
    ///   already registered.
    /// - [`BunchError::NoRuntime`] if called outside a Tokio runtime.
    ///
    /// Nothing is registered when an error is returned.
    pub fn admit(&self, inputs: Vec<S::Input>) -> Result<GroupHandle> {
        let size = inputs.len();
        let mut inner = self.inner.lock();

        if size > self.config.max_bunch_size {
            tracing::debug!(size, max = self.config.max_bunch_size, "bunch rejected: oversized");
            return Err(BunchError::OversizedGroup {
                size,
                max: self.config.max_bunch_size,
            });
        }
        if size < self.config.min_bunch_size {
            tracing::debug!(size, min = self.config.min_bunch_size, "bunch rejected: undersized");
            return Err(BunchError::UseSingleUnitPath {
                size,
                min: self.config.min_bunch_size,
            });
        }

        self.evict_expired_locked(&mut inner, Instant::now());

        let active = inner.groups.len();
        if active >= self.config.max_concurrent_groups {
            tracing::debug!(active, "bunch rejected: capacity exceeded");
            return Err(BunchError::CapacityExceeded {
                active,
                max: self.config.max_concurrent_groups,
            });
        }

        let runtime = Handle::try_current().map_err(|_| BunchError::NoRuntime)?;
        let handle = inner
            .handles
            .allocate()
            .ok_or(BunchError::HandlesExhausted)?;
        let group = Arc::new(TaskGroup::new(inputs));
        let worker = self.spawn_worker(&runtime, handle, Arc::clone(&group));
        inner.groups.insert(
            handle,
            Entry {
                group,
                worker,
                touched: Instant::now(),
            },
        );
        tracing::info!(%handle, size, active = active + 1, "bunch admitted");
        Ok(handle)
    }

    /// Remove and return the group's ready results.
    ///
    /// An empty map means nothing new is ready. The group is removed once
    /// every unit has been handed out, after which the handle is unknown.
    ///
    /// # Errors
    ///
    /// - [`BunchError::UnknownHandle`] if no group is registered under `handle`.
    /// - [`BunchError::GroupFailed`] if the worker failed and no ready results
    ///   are left; the group is removed.
    /// - [`BunchError::GroupCancelled`] likewise for a cancelled worker.
    pub fn harvest(&self, handle: GroupHandle) -> Result<BTreeMap<usize, S::Output>> {
        self.take_ready(handle).map(|harvest| harvest.results)
    }

    /// Like [`harvest`](Self::harvest), but also reports whether this call
    /// drained the group.
    ///
    /// # Errors
    ///
    /// Same as [`harvest`](Self::harvest).
    pub fn take_ready(&self, handle: GroupHandle) -> Result<Harvest<S::Output>> {
        let mut inner = self.inner.lock();
        let entry = inner
            .groups
            .get_mut(&handle)
            .ok_or(BunchError::UnknownHandle { handle })?;
        entry.touched = Instant::now();

        let group = Arc::clone(&entry.group);
        let results = group.harvest();
        if !results.is_empty() {
            tracing::debug!(%handle, count = results.len(), "bunch results harvested");
        }

        if group.is_empty() {
            inner.groups.remove(&handle);
            tracing::info!(%handle, "bunch drained");
            return Ok(Harvest {
                results,
                drained: true,
            });
        }

        if results.is_empty() {
            match group.status() {
                GroupStatus::Failed => {
                    inner.groups.remove(&handle);
                    let reason = group
                        .failure()
                        .unwrap_or_else(|| "unknown failure".to_string());
                    tracing::warn!(%handle, reason = %reason, "failed bunch pruned");
                    return Err(BunchError::GroupFailed { handle, reason });
                },
                GroupStatus::Cancelled => {
                    inner.groups.remove(&handle);
                    return Err(BunchError::GroupCancelled { handle });
                },
                GroupStatus::Running | GroupStatus::Completed => {},
            }
        }

        Ok(Harvest {
            results,
            drained: false,
        })
    }

    /// Snapshot of the group's progress.
    ///
    /// # Errors
    ///
    /// Returns [`BunchError::UnknownHandle`] if no group is registered under `handle`.
    pub fn status(&self, handle: GroupHandle) -> Result<GroupSnapshot> {
        let inner = self.inner.lock();
        let entry = inner
            .groups
            .get(&handle)
            .ok_or(BunchError::UnknownHandle { handle })?;
        Ok(GroupSnapshot {
            handle,
            status: entry.group.status(),
            size: entry.group.size(),
            remaining: entry.group.remaining(),
            failure: entry.group.failure(),
        })
    }

    /// Cancel the group and release its capacity slot.
    ///
    /// Units already computed but not yet harvested are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`BunchError::UnknownHandle`] if no group is registered under `handle`.
    pub fn cancel(&self, handle: GroupHandle) -> Result<()> {
        let entry = self
            .inner
            .lock()
            .groups
            .remove(&handle)
            .ok_or(BunchError::UnknownHandle { handle })?;
        entry.group.cancel();
        tracing::info!(%handle, "bunch cancelled");
        Ok(())
    }

    /// Evict groups idle for longer than the configured TTL.
    ///
    /// Returns the number of evicted groups; always 0 without a TTL.
    pub fn evict_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        self.evict_expired_locked(&mut inner, Instant::now())
    }

    /// Cancel every group and wait for all workers to stop.
    ///
    /// The registry is empty afterwards and accepts new groups again.
    pub async fn shutdown(&self) {
        let entries: Vec<(GroupHandle, Entry<S>)> = self.inner.lock().groups.drain().collect();
        for (_, entry) in &entries {
            entry.group.cancel();
        }

        let count = entries.len();
        for (handle, entry) in entries {
            if let Err(err) = entry.worker.await {
                tracing::warn!(%handle, error = %err, "bunch worker did not stop cleanly");
            }
        }
        tracing::info!(count, "bunch registry shut down");
    }

    fn evict_expired_locked(&self, inner: &mut RegistryInner<S>, now: Instant) -> usize {
        let Some(ttl) = self.config.group_ttl else {
            return 0;
        };

        let expired: Vec<GroupHandle> = inner
            .groups
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.touched) > ttl)
            .map(|(handle, _)| *handle)
            .collect();

        for handle in &expired {
            if let Some(entry) = inner.groups.remove(handle) {
                entry.group.cancel();
                tracing::warn!(%handle, remaining = entry.group.remaining(), "idle bunch evicted");
            }
        }
        expired.len()
    }

    fn spawn_worker(
        &self,
        runtime: &Handle,
        handle: GroupHandle,
        group: Arc<TaskGroup<S>>,
    ) -> JoinHandle<()> {
        let solver = Arc::clone(&self.solver);
        let delay = self.config.bunch_delay;
        runtime.spawn(async move {
            let outcome = AssertUnwindSafe(group.run(solver.as_ref(), delay))
                .catch_unwind()
                .await;
            if let Err(panic) = outcome {
                let reason = panic_message(panic.as_ref());
                tracing::error!(%handle, reason = %reason, "bunch worker panicked");
                group.fail(format!("worker panicked: {reason}"));
            }
            tracing::debug!(%handle, status = %group.status(), "bunch worker finished");
        })
    }
}

impl<S: Solver> Drop for GroupRegistry<S> {
    fn drop(&mut self) {
        for entry in self.inner.get_mut().groups.values() {
            entry.group.cancel();
        }
    }
}

impl<S: Solver> fmt::Debug for GroupRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupRegistry")
            .field("groups", &self.len())
            .field("config", &self.config)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
