//! Reader/writer latch behaviour across threads

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Barrier};
use std::thread;
use std::time::Duration;

use proptest::prelude::*;

use spintrace_core::latch::{EXCLUSIVE, SHARE_CAPACITY};
use spintrace_core::{
    verify_latch_word, ErrorCategory, LatchState, ReaderWriterLatch, SpinConfig, SpinError,
};

/// Spin until `latch` shows at least one reservation
fn wait_for_reservation(latch: &ReaderWriterLatch) {
    while latch.word().reserve_count() == 0 {
        thread::yield_now();
    }
}

#[test]
fn test_exclusive_blocks_attempt_shared() {
    let latch = ReaderWriterLatch::new();
    let held = Barrier::new(2);
    let checked = Barrier::new(2);
    let released = Barrier::new(2);

    thread::scope(|s| {
        s.spawn(|| {
            latch.obtain_exclusive().unwrap();
            assert_eq!(latch.state(), LatchState::Exclusive { reserve: 1 });
            held.wait();
            checked.wait();
            latch.release_exclusive().unwrap();
            released.wait();
        });

        s.spawn(|| {
            held.wait();
            assert!(!latch.attempt_shared());
            checked.wait();
            released.wait();
            assert!(latch.attempt_shared());
            latch.release_shared().unwrap();
        });
    });

    assert!(latch.word().is_unheld());
}

#[test]
fn test_exclusive_waits_for_every_sharer() {
    let latch = ReaderWriterLatch::new();
    let all_shared = Barrier::new(4);
    let acquired = AtomicBool::new(false);

    thread::scope(|s| {
        let mut release = Vec::new();
        for _ in 0..3 {
            let (tx, rx) = mpsc::channel::<()>();
            release.push(tx);
            let (latch, all_shared) = (&latch, &all_shared);
            s.spawn(move || {
                latch.obtain_shared().unwrap();
                all_shared.wait();
                rx.recv().unwrap();
                latch.release_shared().unwrap();
            });
        }

        all_shared.wait();
        assert_eq!(latch.state(), LatchState::Shared { holders: 3 });

        let writer = s.spawn(|| {
            latch.obtain_exclusive().unwrap();
            acquired.store(true, Ordering::SeqCst);
            latch.release_exclusive().unwrap();
        });

        wait_for_reservation(&latch);
        assert_eq!(
            latch.state(),
            LatchState::Draining {
                reserve: 1,
                holders: 3
            }
        );

        for (released, tx) in release.iter().enumerate() {
            assert!(!acquired.load(Ordering::SeqCst));
            tx.send(()).unwrap();
            // Give the writer a chance to jump the queue if it could.
            if released < 2 {
                while latch.word().share_count() as usize != 2 - released {
                    thread::yield_now();
                }
                thread::sleep(Duration::from_millis(5));
            }
        }

        writer.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    });

    assert!(latch.word().is_unheld());
}

#[test]
fn test_upgrade_excludes_other_sharers() {
    let latch = ReaderWriterLatch::new();
    let upgraded = Barrier::new(2);
    let checked = Barrier::new(2);

    thread::scope(|s| {
        s.spawn(|| {
            latch.obtain_shared().unwrap();
            assert_eq!(latch.word().share_count(), 1);
            assert!(latch.modify_to_exclusive());
            upgraded.wait();
            checked.wait();
            latch.release_exclusive().unwrap();
        });

        s.spawn(|| {
            upgraded.wait();
            assert!(latch.is_held_exclusive());
            assert!(!latch.attempt_shared());
            assert!(!latch.attempt_exclusive());
            checked.wait();
        });
    });

    assert!(latch.word().is_unheld());
}

#[test]
fn test_no_new_sharers_after_reservation() {
    let latch = ReaderWriterLatch::new();
    latch.obtain_shared().unwrap();

    thread::scope(|s| {
        let writer = s.spawn(|| {
            latch.obtain_exclusive().unwrap();
            latch.release_exclusive().unwrap();
        });

        wait_for_reservation(&latch);
        for _ in 0..1_000 {
            assert!(!latch.attempt_shared());
        }

        latch.release_shared().unwrap();
        writer.join().unwrap();
    });

    assert!(latch.attempt_shared());
    latch.release_shared().unwrap();
}

#[test]
fn test_round_trip_restores_unheld() {
    let latch = ReaderWriterLatch::new();
    let start = latch.word();

    latch.obtain_shared().unwrap();
    assert!(latch.modify_to_exclusive());
    assert_eq!(latch.state(), LatchState::Exclusive { reserve: 1 });
    latch.modify_to_shared().unwrap();
    assert_eq!(latch.state(), LatchState::Shared { holders: 1 });
    latch.release_shared().unwrap();

    assert_eq!(latch.word(), start);
    assert!(latch.word().is_unheld());
}

#[test]
fn test_guards_round_trip() {
    let latch = ReaderWriterLatch::new();
    {
        let shared = latch.shared().unwrap();
        let exclusive = shared.upgrade().unwrap();
        assert!(latch.is_held_exclusive());
        let _shared = exclusive.downgrade().unwrap();
        assert_eq!(latch.state(), LatchState::Shared { holders: 1 });
    }
    assert!(latch.word().is_unheld());
}

#[test]
fn test_mutual_exclusion_under_load() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 2_000;

    let latch = ReaderWriterLatch::new();
    let readers = AtomicUsize::new(0);
    let writers = AtomicUsize::new(0);

    thread::scope(|s| {
        for id in 0..THREADS {
            let (latch, readers, writers) = (&latch, &readers, &writers);
            s.spawn(move || {
                for round in 0..ROUNDS {
                    if (id + round) % 4 == 0 {
                        latch.obtain_exclusive().unwrap();
                        assert_eq!(writers.fetch_add(1, Ordering::SeqCst), 0);
                        assert_eq!(readers.load(Ordering::SeqCst), 0);
                        assert!(latch.is_held_exclusive());
                        writers.fetch_sub(1, Ordering::SeqCst);
                        latch.release_exclusive().unwrap();
                    } else {
                        latch.obtain_shared().unwrap();
                        readers.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(writers.load(Ordering::SeqCst), 0);
                        assert!(verify_latch_word(latch.word()).is_empty());
                        readers.fetch_sub(1, Ordering::SeqCst);
                        latch.release_shared().unwrap();
                    }
                }
            });
        }
    });

    assert!(latch.word().is_unheld());
}

#[test]
fn test_share_capacity_is_fatal() {
    let latch = ReaderWriterLatch::new();
    for _ in 0..SHARE_CAPACITY {
        assert!(latch.attempt_shared());
    }
    assert_eq!(latch.word().share_count(), SHARE_CAPACITY);

    // The non-blocking path just reports failure.
    assert!(!latch.attempt_shared());

    let err = latch.obtain_shared().unwrap_err();
    assert!(matches!(err, SpinError::LatchCapacity { counter: "share", .. }));
    assert_eq!(err.category(), ErrorCategory::Capacity);
    assert!(err.is_fatal());
    assert_eq!(latch.word().share_count(), SHARE_CAPACITY);
}

#[test]
fn test_usage_errors_leave_word_untouched() {
    let latch = ReaderWriterLatch::new();

    let err = latch.release_shared().unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Usage);
    assert!(err.to_string().contains("release_shared"));
    assert!(latch.release_exclusive().is_err());
    assert!(latch.modify_to_shared().is_err());
    assert!(latch.word().is_unheld());

    latch.obtain_shared().unwrap();
    assert!(matches!(
        latch.release_exclusive(),
        Err(SpinError::LatchUsage { operation: "release_exclusive", .. })
    ));
    assert_eq!(latch.word().share_count(), 1);

    latch.release_shared().unwrap();
    latch.obtain_exclusive().unwrap();
    assert!(latch.release_shared().is_err());
    assert_eq!(latch.word().share_count(), EXCLUSIVE);
    latch.release_exclusive().unwrap();
}

#[test]
fn test_diagnostic_timeout_withdraws_reservation() {
    let latch = ReaderWriterLatch::new();
    latch.obtain_shared().unwrap();

    let spin = SpinConfig::DEFAULT.timeout_spins(64).sleep_every(16);
    let err = latch.obtain_exclusive_with(&spin).unwrap_err();
    assert!(matches!(err, SpinError::SpinTimeout { operation: "obtain_exclusive", .. }));

    // Sharers are admitted again once the reservation is gone.
    assert_eq!(latch.state(), LatchState::Shared { holders: 1 });
    assert!(latch.attempt_shared());
}

// ============================================================================
// Single-threaded model
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Op {
    AttemptShared,
    AttemptExclusive,
    ReleaseShared,
    ReleaseExclusive,
    Upgrade,
    Downgrade,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::AttemptShared),
        Just(Op::AttemptExclusive),
        Just(Op::ReleaseShared),
        Just(Op::ReleaseExclusive),
        Just(Op::Upgrade),
        Just(Op::Downgrade),
    ]
}

proptest! {
    #[test]
    fn prop_latch_matches_model(ops in prop::collection::vec(op(), 1..200)) {
        let latch = ReaderWriterLatch::new();
        let (mut reserve, mut share) = (0u16, 0u16);

        for op in ops {
            match op {
                Op::AttemptShared => {
                    let expect = reserve == 0 && share < SHARE_CAPACITY;
                    prop_assert_eq!(latch.attempt_shared(), expect);
                    if expect {
                        share += 1;
                    }
                }
                Op::AttemptExclusive => {
                    let expect = reserve == 0 && share == 0;
                    prop_assert_eq!(latch.attempt_exclusive(), expect);
                    if expect {
                        (reserve, share) = (1, EXCLUSIVE);
                    }
                }
                Op::ReleaseShared => {
                    let expect = share != 0 && share != EXCLUSIVE;
                    prop_assert_eq!(latch.release_shared().is_ok(), expect);
                    if expect {
                        share -= 1;
                    }
                }
                Op::ReleaseExclusive => {
                    let expect = share == EXCLUSIVE && reserve > 0;
                    prop_assert_eq!(latch.release_exclusive().is_ok(), expect);
                    if expect {
                        (reserve, share) = (reserve - 1, 0);
                    }
                }
                Op::Upgrade => {
                    let expect = share == 1;
                    prop_assert_eq!(latch.modify_to_exclusive(), expect);
                    if expect {
                        (reserve, share) = (reserve + 1, EXCLUSIVE);
                    }
                }
                Op::Downgrade => {
                    let expect = share == EXCLUSIVE && reserve > 0;
                    prop_assert_eq!(latch.modify_to_shared().is_ok(), expect);
                    if expect {
                        (reserve, share) = (reserve - 1, 1);
                    }
                }
            }

            let word = latch.word();
            prop_assert_eq!((word.reserve_count(), word.share_count()), (reserve, share));
            prop_assert!(verify_latch_word(word).is_empty());
        }
    }
}
