//! Tests for AsyncOperation
//!
//! These tests verify:
//! - Pending → succeeded / failed transitions
//! - Continuations registered before and after completion
//! - Single-assignment (second completion rejected)
//! - Blocking waits
//! - Panicking continuations are contained

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use strata::{AsyncOperation, OperationState, StrataError};

type Op = AsyncOperation<u32, String>;

// =============================================================================
// State Transition Tests
// =============================================================================

#[test]
fn test_new_operation_is_pending() {
    let op = Op::new();
    assert_eq!(op.state(), OperationState::Pending);
    assert!(!op.is_done());
}

#[test]
fn test_complete_fires_success_only() {
    let op = Op::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let s = Arc::clone(&seen);
    op.on_success(move |v| s.lock().push(format!("ok:{}", v)));
    let s = Arc::clone(&seen);
    op.on_failure(move |e| s.lock().push(format!("err:{}", e)));

    op.complete(7).unwrap();

    assert_eq!(op.state(), OperationState::Succeeded);
    assert_eq!(*seen.lock(), vec!["ok:7".to_string()]);
}

#[test]
fn test_fail_fires_failure_only() {
    let op = Op::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let s = Arc::clone(&seen);
    op.on_success(move |v| s.lock().push(format!("ok:{}", v)));
    let s = Arc::clone(&seen);
    op.on_failure(move |e| s.lock().push(format!("err:{}", e)));

    op.fail("boom".to_string()).unwrap();

    assert_eq!(op.state(), OperationState::Failed);
    assert_eq!(*seen.lock(), vec!["err:boom".to_string()]);
}

#[test]
fn test_continuation_after_completion_runs_immediately() {
    let op = Op::new();
    op.complete(1).unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    op.on_success(move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });

    // No waiting: ran on this thread before on_success returned
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let h = Arc::clone(&hits);
    op.on_failure(move |_| {
        h.fetch_add(100, Ordering::SeqCst);
    });
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_continuations_run_in_registration_order() {
    let op = Op::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    for i in 0..5 {
        let o = Arc::clone(&order);
        op.on_complete(move |_| o.lock().push(i));
    }

    op.complete(0).unwrap();
    assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
}

// =============================================================================
// Single-Assignment Tests
// =============================================================================

#[test]
fn test_second_complete_rejected() {
    let op = Op::new();
    op.complete(1).unwrap();

    let result = op.complete(2);
    assert!(matches!(result, Err(StrataError::AlreadyCompleted)));
    assert_eq!(op.wait(), Ok(1));
}

#[test]
fn test_fail_after_complete_rejected() {
    let op = Op::new();
    op.complete(1).unwrap();

    assert!(matches!(op.fail("late".to_string()), Err(StrataError::AlreadyCompleted)));
    assert_eq!(op.state(), OperationState::Succeeded);
}

#[test]
fn test_continuations_fire_once_despite_second_completion() {
    let op = Op::new();
    let hits = Arc::new(AtomicUsize::new(0));

    let h = Arc::clone(&hits);
    op.on_complete(move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });

    op.complete(1).unwrap();
    let _ = op.fail("again".to_string());
    let _ = op.complete(3);

    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_completion_exactly_one_wins() {
    let op = Op::new();
    let barrier = Arc::new(Barrier::new(8));
    let wins = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let op = op.clone();
            let barrier = Arc::clone(&barrier);
            let wins = Arc::clone(&wins);
            thread::spawn(move || {
                barrier.wait();
                if op.complete(i).is_ok() {
                    wins.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(wins.load(Ordering::SeqCst), 1);
    assert!(op.is_done());
}

// =============================================================================
// Waiting Tests
// =============================================================================

#[test]
fn test_wait_blocks_until_completed_elsewhere() {
    let op = Op::new();
    let completer = op.clone();

    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        completer.complete(42).unwrap();
    });

    assert_eq!(op.wait(), Ok(42));
    handle.join().unwrap();
}

#[test]
fn test_wait_timeout_on_pending_returns_none() {
    let op = Op::new();
    assert_eq!(op.wait_timeout(Duration::from_millis(20)), None);
}

#[test]
fn test_wait_timeout_returns_failure() {
    let op = Op::new();
    op.fail("nope".to_string()).unwrap();
    assert_eq!(op.wait_timeout(Duration::from_millis(20)), Some(Err("nope".to_string())));
}

#[test]
fn test_prebuilt_operations() {
    assert_eq!(Op::succeeded(5).state(), OperationState::Succeeded);
    assert_eq!(Op::failed("x".to_string()).state(), OperationState::Failed);
}

// =============================================================================
// Handle / Robustness Tests
// =============================================================================

#[test]
fn test_clones_share_state() {
    let op = Op::new();
    let other = op.clone();

    assert!(op.same_as(&other));
    assert!(!op.same_as(&Op::new()));

    other.complete(9).unwrap();
    assert_eq!(op.state(), OperationState::Succeeded);
}

#[test]
fn test_panicking_continuation_does_not_block_others() {
    let op = Op::new();
    let hits = Arc::new(AtomicUsize::new(0));

    op.on_success(|_| panic!("continuation failure"));
    let h = Arc::clone(&hits);
    op.on_success(move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });

    op.complete(1).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_continuation_may_register_another() {
    let op = Op::new();
    let hits = Arc::new(AtomicUsize::new(0));

    let inner_op = op.clone();
    let h = Arc::clone(&hits);
    op.on_success(move |_| {
        // Already settled: runs inline, must not deadlock
        let h = Arc::clone(&h);
        inner_op.on_success(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
    });

    op.complete(1).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
