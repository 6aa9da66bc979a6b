//! Bunches of work units executed together.
//!
//! A [`TaskGroup`] owns the units created from one submitted batch. Its
//! worker computes them strictly in index order; callers harvest whatever
//! has finished without waiting for the rest.
//!
//! # State Machine
//!
//! ```text
//! Running -> Completed, Failed, Cancelled
//! Completed -> (terminal)
//! Failed -> (terminal)
//! Cancelled -> (terminal)
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::solver::Solver;
use crate::unit::WorkUnit;

/// Lifecycle status of a group's worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    /// The worker is still computing units.
    Running,
    /// Every unit has been computed (terminal).
    Completed,
    /// The worker stopped on an error; remaining units never become ready (terminal).
    Failed,
    /// The worker was cancelled (terminal).
    Cancelled,
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl GroupStatus {
    /// Returns `true` if no further transitions are allowed.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Returns `true` if moving from `self` to `to` is a valid transition.
    pub fn can_transition_to(&self, to: &Self) -> bool {
        matches!(self, Self::Running) && !matches!(to, Self::Running)
    }
}

#[derive(Debug)]
struct GroupState {
    status: GroupStatus,
    failure: Option<String>,
}

type UnitMap<S> = BTreeMap<usize, Arc<WorkUnit<<S as Solver>::Input, <S as Solver>::Output>>>;

/// An ordered set of work units created from one batch.
///
/// The unit map is guarded by its own lock; result cells are not, since
/// each is independently write-once. No lock is held across an await.
pub struct TaskGroup<S: Solver> {
    units: Mutex<UnitMap<S>>,
    size: usize,
    state: Mutex<GroupState>,
    started: AtomicBool,
    cancel: CancellationToken,
}

impl<S: Solver> TaskGroup<S> {
    /// Build a group with one pending unit per input, indexed from 0.
    pub fn new(inputs: Vec<S::Input>) -> Self {
        let size = inputs.len();
        let units = inputs
            .into_iter()
            .enumerate()
            .map(|(index, input)| (index, Arc::new(WorkUnit::new(index, input))))
            .collect();
        Self {
            units: Mutex::new(units),
            size,
            state: Mutex::new(GroupState {
                status: GroupStatus::Running,
                failure: None,
            }),
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// Number of units the group was created with.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of units not yet harvested.
    pub fn remaining(&self) -> usize {
        self.units.lock().len()
    }

    /// `true` once every unit has been harvested.
    pub fn is_empty(&self) -> bool {
        self.units.lock().is_empty()
    }

    /// Current worker status.
    pub fn status(&self) -> GroupStatus {
        self.state.lock().status
    }

    /// Why the worker failed, if it did.
    pub fn failure(&self) -> Option<String> {
        self.state.lock().failure.clone()
    }

    /// Compute every unit in index order, sleeping `delay` before each.
    ///
    /// Runs at most once per group; later calls return immediately. Stops
    /// at the first failing unit and marks the group [`GroupStatus::Failed`].
    /// Stops between units once the group is cancelled.
    pub async fn run(&self, solver: &S, delay: Duration) {
        if self.started.swap(true, Ordering::AcqRel) {
            tracing::warn!("bunch worker started twice; ignoring");
            return;
        }

        let indices: Vec<usize> = self.units.lock().keys().copied().collect();
        for index in indices {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    self.transition(GroupStatus::Cancelled, None);
                    return;
                }
                () = tokio::time::sleep(delay) => {}
            }

            let unit = self.units.lock().get(&index).cloned();
            let Some(unit) = unit else {
                continue;
            };
            if let Err(err) = unit.compute(solver).await {
                tracing::warn!(index, error = %err, "bunch task failed");
                self.fail(err.to_string());
                return;
            }
        }

        self.transition(GroupStatus::Completed, None);
    }

    /// Remove and return every unit whose result is ready.
    ///
    /// Pending units stay for a later call. An empty map means nothing new
    /// has finished.
    pub fn harvest(&self) -> BTreeMap<usize, S::Output> {
        let mut harvested = BTreeMap::new();
        self.units.lock().retain(|index, unit| match unit.try_get() {
            Some(value) => {
                harvested.insert(*index, value);
                false
            },
            None => true,
        });
        harvested
    }

    /// Mark the group failed. No-op if it already reached a terminal state.
    pub fn fail(&self, reason: impl Into<String>) {
        self.transition(GroupStatus::Failed, Some(reason.into()));
    }

    /// Stop the worker before its next unit.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.transition(GroupStatus::Cancelled, None);
    }

    fn transition(&self, to: GroupStatus, failure: Option<String>) -> bool {
        let mut state = self.state.lock();
        if !state.status.can_transition_to(&to) {
            return false;
        }
        state.status = to;
        state.failure = failure;
        true
    }
}

impl<S: Solver> fmt::Debug for TaskGroup<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskGroup")
            .field("size", &self.size)
            .field("remaining", &self.remaining())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::SumSolver;
    use pretty_assertions::assert_eq;

    const DELAY: Duration = Duration::from_secs(1);

    fn group(inputs: Vec<(i64, i64)>) -> Arc<TaskGroup<SumSolver>> {
        Arc::new(TaskGroup::new(inputs))
    }

    fn spawn_run(group: &Arc<TaskGroup<SumSolver>>) -> tokio::task::JoinHandle<()> {
        let group = Arc::clone(group);
        tokio::spawn(async move { group.run(&SumSolver, DELAY).await })
    }

    #[test]
    fn status_transitions() {
        assert!(GroupStatus::Running.can_transition_to(&GroupStatus::Completed));
        assert!(GroupStatus::Running.can_transition_to(&GroupStatus::Failed));
        assert!(!GroupStatus::Running.can_transition_to(&GroupStatus::Running));
        assert!(!GroupStatus::Completed.can_transition_to(&GroupStatus::Failed));
        assert!(GroupStatus::Cancelled.is_terminal());
        assert_eq!(GroupStatus::Failed.to_string(), "failed");
    }

    #[tokio::test]
    async fn new_group_is_pending() {
        let group = group(vec![(1, 2), (3, 4), (5, 6)]);
        assert_eq!(group.size(), 3);
        assert_eq!(group.remaining(), 3);
        assert!(!group.is_empty());
        assert_eq!(group.status(), GroupStatus::Running);
        assert!(group.harvest().is_empty());
        assert_eq!(group.remaining(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn units_complete_in_index_order() {
        let group = group(vec![(1, 1), (2, 2), (3, 3)]);
        let worker = spawn_run(&group);

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(group.harvest(), BTreeMap::from([(0, 2)]));
        assert!(group.harvest().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(group.harvest(), BTreeMap::from([(1, 4), (2, 6)]));

        worker.await.unwrap();
        assert!(group.is_empty());
        assert_eq!(group.status(), GroupStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn solver_error_fails_the_group() {
        let group = group(vec![(1, 1), (i64::MAX, 1), (2, 2)]);
        spawn_run(&group).await.unwrap();

        assert_eq!(group.status(), GroupStatus::Failed);
        assert!(group.failure().unwrap().contains("overflows"));
        assert_eq!(group.harvest(), BTreeMap::from([(0, 2)]));
        assert_eq!(group.remaining(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_between_units() {
        let group = group(vec![(1, 1), (2, 2), (3, 3)]);
        let worker = spawn_run(&group);

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        group.cancel();
        worker.await.unwrap();

        assert_eq!(group.status(), GroupStatus::Cancelled);
        assert_eq!(group.harvest(), BTreeMap::from([(0, 2)]));
        assert_eq!(group.remaining(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn second_run_is_ignored() {
        let group = group(vec![(1, 1), (2, 2)]);
        spawn_run(&group).await.unwrap();
        spawn_run(&group).await.unwrap();
        assert_eq!(group.status(), GroupStatus::Completed);
        assert_eq!(group.harvest().len(), 2);
    }

    #[tokio::test]
    async fn fail_after_completion_is_ignored() {
        let group = group(vec![(1, 1), (2, 2)]);
        group.run(&SumSolver, Duration::ZERO).await;
        group.fail("late");
        assert_eq!(group.status(), GroupStatus::Completed);
        assert_eq!(group.failure(), None);
    }
}
