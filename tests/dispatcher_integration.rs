//! Integration tests for the submit/poll lifecycle.
//!
//! All tests run on a paused Tokio clock so the simulated 1s/2s delays
//! elapse instantly. Organized into module blocks per concern.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use taskbunch::{
    BunchConfig, BunchError, Dispatcher, GroupHandle, GroupStatus, RetryPolicy, SumSolver,
};

fn dispatcher() -> Dispatcher<SumSolver> {
    Dispatcher::new(SumSolver, BunchConfig::default()).unwrap()
}

/// Polls until the handle disappears, advancing the clock between polls.
async fn drain(dispatcher: &Dispatcher<SumSolver>, handle: GroupHandle) -> BTreeMap<usize, i64> {
    let mut all = BTreeMap::new();
    loop {
        match dispatcher.poll(handle) {
            Ok(batch) => {
                for (index, value) in batch {
                    assert!(all.insert(index, value).is_none(), "index {index} reported twice");
                }
            },
            Err(BunchError::UnknownHandle { .. }) => return all,
            Err(other) => panic!("unexpected poll error: {other}"),
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

// ─── End-to-end ─────────────────────────────────────────────────────────────

mod end_to_end {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test(start_paused = true)]
    async fn pair_bunch_harvests_both_sums() {
        let dispatcher = dispatcher();
        let handle = dispatcher.submit(vec![(2, 3), (10, 20)]).unwrap();
        assert_eq!(drain(&dispatcher, handle).await, BTreeMap::from([(0, 5), (1, 30)]));
    }

    #[tokio::test(start_paused = true)]
    async fn single_pair_uses_fast_path() {
        let dispatcher = dispatcher();
        assert_eq!(dispatcher.solve_one((7, 8)).await.unwrap(), 15);
        assert!(dispatcher.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_handle_is_reported() {
        let err = dispatcher().poll(GroupHandle::from(12345)).unwrap_err();
        assert_eq!(
            err,
            BunchError::UnknownHandle {
                handle: GroupHandle::from(12345)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn poll_after_full_harvest_is_unknown() {
        let dispatcher = dispatcher();
        let handle = dispatcher.submit(vec![(1, 1), (2, 2), (3, 3)]).unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(dispatcher.poll(handle).unwrap().len(), 3);
        assert!(matches!(
            dispatcher.poll(handle),
            Err(BunchError::UnknownHandle { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn submit_returns_before_any_unit_is_computed() {
        let dispatcher = dispatcher();
        let handle = dispatcher.submit(vec![(1, 1), (2, 2)]).unwrap();
        assert!(dispatcher.poll(handle).unwrap().is_empty());
        assert_eq!(dispatcher.status(handle).unwrap().remaining, 2);
    }
}

// ─── Admission control ──────────────────────────────────────────────────────

mod admission {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, BunchError::UseSingleUnitPath { size: 0, min: 2 })]
    #[case(1, BunchError::UseSingleUnitPath { size: 1, min: 2 })]
    #[case(5, BunchError::OversizedGroup { size: 5, max: 4 })]
    #[case(40, BunchError::OversizedGroup { size: 40, max: 4 })]
    #[tokio::test(start_paused = true)]
    async fn size_limits_reject_without_registering(
        #[case] size: usize,
        #[case] expected: BunchError,
    ) {
        let dispatcher = dispatcher();
        let err = dispatcher.submit(vec![(1, 1); size]).unwrap_err();
        assert_eq!(err, expected);
        assert!(dispatcher.registry().is_empty());
    }

    #[rstest]
    #[case(2)]
    #[case(3)]
    #[case(4)]
    #[tokio::test(start_paused = true)]
    async fn sizes_within_limits_are_admitted(#[case] size: usize) {
        let dispatcher = dispatcher();
        let handle = dispatcher.submit(vec![(1, 1); size]).unwrap();
        assert_eq!(drain(&dispatcher, handle).await.len(), size);
    }

    #[tokio::test(start_paused = true)]
    async fn full_registry_rejects_new_groups() {
        let dispatcher = dispatcher();
        let handles: Vec<GroupHandle> = (0..4)
            .map(|_| dispatcher.submit(vec![(1, 1), (2, 2)]).unwrap())
            .collect();

        let err = dispatcher.submit(vec![(3, 3), (4, 4)]).unwrap_err();
        assert_eq!(err, BunchError::CapacityExceeded { active: 4, max: 4 });
        assert_eq!(dispatcher.registry().handles(), handles);
    }

    #[tokio::test(start_paused = true)]
    async fn draining_a_group_frees_its_slot() {
        let dispatcher = dispatcher();
        let first = dispatcher.submit(vec![(1, 1), (2, 2)]).unwrap();
        for _ in 0..3 {
            dispatcher.submit(vec![(1, 1), (2, 2)]).unwrap();
        }
        assert!(dispatcher.submit(vec![(1, 1), (2, 2)]).is_err());

        drain(&dispatcher, first).await;
        assert!(dispatcher.submit(vec![(1, 1), (2, 2)]).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn submit_with_retry_waits_for_capacity() {
        let dispatcher = Arc::new(
            Dispatcher::new(
                SumSolver,
                BunchConfig::default().with_max_concurrent_groups(2),
            )
            .unwrap(),
        );
        let first = dispatcher.submit(vec![(1, 1), (2, 2)]).unwrap();
        dispatcher.submit(vec![(1, 1), (2, 2)]).unwrap();

        let poller = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                dispatcher
                    .collect(first, &RetryPolicy::default())
                    .await
                    .unwrap()
            })
        };

        let third = dispatcher
            .submit_with_retry(vec![(5, 5), (6, 6)], &RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(poller.await.unwrap().len(), 2);
        assert!(dispatcher.registry().contains(third));
    }

    #[tokio::test(start_paused = true)]
    async fn submit_with_retry_does_not_retry_size_errors() {
        let err = dispatcher()
            .submit_with_retry(vec![(1, 1)], &RetryPolicy::default())
            .await
            .unwrap_err();
        assert_eq!(err, BunchError::UseSingleUnitPath { size: 1, min: 2 });
    }
}

// ─── Harvest semantics ──────────────────────────────────────────────────────

mod harvest {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test(start_paused = true)]
    async fn empty_polls_leave_the_group_registered() {
        let dispatcher = dispatcher();
        let handle = dispatcher.submit(vec![(1, 1), (2, 2)]).unwrap();
        for _ in 0..5 {
            assert!(dispatcher.poll(handle).unwrap().is_empty());
        }
        assert!(dispatcher.registry().contains(handle));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_indices_always_form_a_prefix() {
        let dispatcher = dispatcher();
        let handle = dispatcher
            .submit(vec![(1, 1), (2, 2), (3, 3), (4, 4)])
            .unwrap();

        let mut seen: Vec<usize> = Vec::new();
        loop {
            match dispatcher.poll(handle) {
                Ok(batch) => seen.extend(batch.into_keys()),
                Err(BunchError::UnknownHandle { .. }) => break,
                Err(other) => panic!("unexpected poll error: {other}"),
            }
            let expected: Vec<usize> = (0..seen.len()).collect();
            assert_eq!(seen, expected);
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_pollers_split_results_disjointly() {
        let dispatcher = Arc::new(dispatcher());
        let handle = dispatcher
            .submit(vec![(1, 1), (2, 2), (3, 3), (4, 4)])
            .unwrap();

        let pollers: Vec<_> = (0..3)
            .map(|_| {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    let mut mine = BTreeMap::new();
                    loop {
                        match dispatcher.poll(handle) {
                            Ok(batch) => mine.extend(batch),
                            Err(BunchError::UnknownHandle { .. }) => return mine,
                            Err(other) => panic!("unexpected poll error: {other}"),
                        }
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                })
            })
            .collect();

        let mut merged = BTreeMap::new();
        let mut total = 0;
        for poller in pollers {
            let mine = poller.await.unwrap();
            total += mine.len();
            merged.extend(mine);
        }
        assert_eq!(total, 4);
        assert_eq!(merged, BTreeMap::from([(0, 2), (1, 4), (2, 6), (3, 8)]));
    }

    #[tokio::test(start_paused = true)]
    async fn groups_progress_independently() {
        let dispatcher = dispatcher();
        let a = dispatcher.submit(vec![(1, 0), (2, 0)]).unwrap();
        let b = dispatcher.submit(vec![(10, 0), (20, 0), (30, 0)]).unwrap();

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(dispatcher.poll(a).unwrap(), BTreeMap::from([(0, 1)]));
        assert_eq!(dispatcher.poll(b).unwrap(), BTreeMap::from([(0, 10)]));

        assert_eq!(drain(&dispatcher, b).await, BTreeMap::from([(1, 20), (2, 30)]));
        assert_eq!(drain(&dispatcher, a).await, BTreeMap::from([(1, 2)]));
    }
}

// ─── Failure and lifecycle ──────────────────────────────────────────────────

mod lifecycle {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn failed_group_surfaces_instead_of_stalling() {
        let dispatcher = dispatcher();
        let handle = dispatcher
            .submit(vec![(1, 1), (i64::MAX, 1), (2, 2)])
            .unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        let snapshot = dispatcher.status(handle).unwrap();
        assert_eq!(snapshot.status, GroupStatus::Failed);

        let err = dispatcher
            .collect(handle, &RetryPolicy::default())
            .await
            .unwrap_err();
        match err {
            BunchError::GroupFailed { handle: failed, reason } => {
                assert_eq!(failed, handle);
                assert!(reason.contains("overflows"));
            },
            other => panic!("expected GroupFailed, got: {other}"),
        }
        assert!(!dispatcher.registry().contains(handle));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_group_is_forgotten() {
        let dispatcher = dispatcher();
        let handle = dispatcher.submit(vec![(1, 1), (2, 2)]).unwrap();
        dispatcher.cancel(handle).unwrap();
        assert!(matches!(
            dispatcher.poll(handle),
            Err(BunchError::UnknownHandle { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn dispatchers_do_not_share_state() {
        let first = dispatcher();
        let second = dispatcher();
        for _ in 0..4 {
            first.submit(vec![(1, 1), (2, 2)]).unwrap();
        }
        assert!(first.submit(vec![(1, 1), (2, 2)]).is_err());
        assert!(second.submit(vec![(1, 1), (2, 2)]).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_every_worker() {
        let dispatcher = dispatcher();
        let handles: BTreeSet<GroupHandle> = (0..3)
            .map(|_| dispatcher.submit(vec![(1, 1), (2, 2), (3, 3)]).unwrap())
            .collect();
        dispatcher.shutdown().await;

        assert!(dispatcher.registry().is_empty());
        for handle in handles {
            assert!(dispatcher.poll(handle).is_err());
        }
    }
}
