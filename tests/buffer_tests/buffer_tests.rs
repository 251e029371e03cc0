//! Tests for MutationBuffer
//!
//! These tests verify:
//! - Size-triggered and delay-triggered flushes
//! - Batch-wide success and failure outcomes
//! - Flush boundaries and ordering across batches
//! - At most one flush in flight, with coalesced requests
//! - Close draining and rejecting later enqueues
//! - Flush timeouts and submitter panics

#[path = "../common/mod.rs"]
mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::{put, settings, RecordingSubmitter};
use strata::buffer::{BufferSettings, MutationBuffer};
use strata::executor::TaskExecutor;
use strata::{FlushError, OperationState, StrataError, SubmitError, TableName};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_buffer(settings: BufferSettings) -> (Arc<RecordingSubmitter>, Arc<MutationBuffer>) {
    let submitter = RecordingSubmitter::new();
    let executor = Arc::new(TaskExecutor::new(2).unwrap());
    let buffer = MutationBuffer::new(
        TableName::from("events"),
        settings,
        submitter.clone(),
        executor,
    );
    (submitter, buffer)
}

const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Flush Trigger Tests
// =============================================================================

#[test]
fn test_size_threshold_flushes_immediately() {
    let (submitter, buffer) = setup_buffer(settings(3, 10_000));

    let ops: Vec<_> = (0..3).map(|i| buffer.enqueue(put(format!("r{}", i))).unwrap()).collect();

    assert!(submitter.wait_for_batches(1, Duration::from_secs(2)));
    let batches = submitter.batches();
    assert_eq!(batches[0].rows, vec!["r0", "r1", "r2"]);

    for op in &ops {
        let ack = op.wait_timeout(WAIT).unwrap().unwrap();
        assert_eq!(ack.batch_id, 1);
        assert_eq!(ack.batch_size, 3);
        assert_eq!(ack.table.as_str(), "events");
    }
}

#[test]
fn test_below_threshold_waits_for_delay() {
    let (submitter, buffer) = setup_buffer(settings(100, 100));

    let start = Instant::now();
    let op = buffer.enqueue(put("only")).unwrap();

    thread::sleep(Duration::from_millis(40));
    assert_eq!(submitter.batch_count(), 0);
    assert_eq!(op.state(), OperationState::Pending);

    assert!(op.wait_timeout(WAIT).unwrap().is_ok());
    let batches = submitter.batches();
    assert_eq!(batches.len(), 1);
    assert!(batches[0].applied_at.duration_since(start) >= Duration::from_millis(95));
}

#[test]
fn test_explicit_flush_does_not_wait_for_delay() {
    let (submitter, buffer) = setup_buffer(settings(100, 10_000));

    let op = buffer.enqueue(put("r")).unwrap();
    buffer.flush();

    assert!(op.wait_timeout(Duration::from_secs(2)).unwrap().is_ok());
    assert_eq!(submitter.batch_count(), 1);
}

#[test]
fn test_flush_on_empty_buffer_is_noop() {
    let (submitter, buffer) = setup_buffer(settings(10, 50));

    buffer.flush();
    thread::sleep(Duration::from_millis(100));

    assert_eq!(submitter.batch_count(), 0);
    assert_eq!(buffer.stats().batches_flushed, 0);
}

#[test]
fn test_stale_timer_does_not_flush_early() {
    let (submitter, buffer) = setup_buffer(settings(2, 200));

    // First timer armed here, then made stale by the size flush
    let start = Instant::now();
    buffer.enqueue(put("a")).unwrap();
    buffer.enqueue(put("b")).unwrap();
    assert!(submitter.wait_for_batches(1, Duration::from_secs(2)));

    thread::sleep(Duration::from_millis(120));
    let enqueued_c = Instant::now();
    let op = buffer.enqueue(put("c")).unwrap();

    assert!(op.wait_timeout(WAIT).unwrap().is_ok());
    let batches = submitter.batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1].rows, vec!["c"]);
    assert!(batches[1].applied_at.duration_since(enqueued_c) >= Duration::from_millis(190));
    assert!(batches[1].applied_at.duration_since(start) >= Duration::from_millis(300));
}

// =============================================================================
// Outcome Tests
// =============================================================================

#[test]
fn test_submit_failure_fails_whole_batch() {
    let (submitter, buffer) = setup_buffer(settings(4, 10_000));
    submitter.fail_with(SubmitError::Conflict("row locked".to_string()));

    let succeeded = Arc::new(AtomicUsize::new(0));
    let ops: Vec<_> = (0..4)
        .map(|i| {
            let op = buffer.enqueue(put(format!("r{}", i))).unwrap();
            let s = Arc::clone(&succeeded);
            op.on_success(move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            });
            op
        })
        .collect();

    let expected = FlushError::Submit(SubmitError::Conflict("row locked".to_string()));
    for op in &ops {
        assert_eq!(op.wait_timeout(WAIT).unwrap(), Err(expected.clone()));
    }

    assert_eq!(succeeded.load(Ordering::SeqCst), 0);
    let stats = buffer.stats();
    assert_eq!(stats.mutations_failed, 4);
    assert_eq!(stats.mutations_succeeded, 0);
}

#[test]
fn test_submitter_panic_fails_batch() {
    let (submitter, buffer) = setup_buffer(settings(1, 10_000));
    submitter.panic_with("driver exploded");

    let op = buffer.enqueue(put("r")).unwrap();

    match op.wait_timeout(WAIT).unwrap() {
        Err(FlushError::SubmitterPanicked(message)) => assert!(message.contains("driver exploded")),
        other => panic!("unexpected outcome: {:?}", other),
    }

    // Buffer keeps working after the panic
    buffer.close();
    assert!(!buffer.stats().flush_in_progress);
}

#[test]
fn test_flush_timeout_fails_batch() {
    let (submitter, buffer) = setup_buffer(BufferSettings {
        max_buffered_count: 1,
        max_buffer_delay: Duration::from_secs(10),
        flush_timeout: Some(Duration::from_millis(50)),
    });
    submitter.block();

    let op = buffer.enqueue(put("slow")).unwrap();

    assert_eq!(
        op.wait_timeout(WAIT).unwrap(),
        Err(FlushError::TimedOut { timeout_ms: 50 })
    );

    // Still in flight until the submitter returns
    assert!(buffer.stats().flush_in_progress);

    submitter.release();
    buffer.close();

    // Late success must not overwrite the timeout
    assert_eq!(op.state(), OperationState::Failed);
    assert_eq!(buffer.stats().mutations_failed, 1);
    assert_eq!(buffer.stats().mutations_succeeded, 0);
}

#[test]
fn test_flush_timeout_fires_with_every_worker_blocked() {
    let submitter = RecordingSubmitter::new();
    let executor = Arc::new(TaskExecutor::new(1).unwrap());
    let settings = BufferSettings {
        max_buffered_count: 1,
        max_buffer_delay: Duration::from_secs(10),
        flush_timeout: Some(Duration::from_millis(50)),
    };
    let a = MutationBuffer::new(
        TableName::from("a"),
        settings.clone(),
        submitter.clone(),
        Arc::clone(&executor),
    );
    let b = MutationBuffer::new(TableName::from("b"), settings, submitter.clone(), executor);
    submitter.block();

    // The single worker is stuck in the first batch; the second one queues
    let op_a = a.enqueue(put("a1")).unwrap();
    let op_b = b.enqueue(put("b1")).unwrap();

    assert_eq!(
        op_a.wait_timeout(WAIT),
        Some(Err(FlushError::TimedOut { timeout_ms: 50 }))
    );
    assert_eq!(submitter.in_flight(), 1);

    submitter.release();
    a.close();
    b.close();

    assert_eq!(op_a.state(), OperationState::Failed);
    assert!(op_b.is_done());
}

#[test]
fn test_settled_watchdogs_do_not_pile_up() {
    let submitter = RecordingSubmitter::new();
    let executor = Arc::new(TaskExecutor::new(2).unwrap());
    let buffer = MutationBuffer::new(
        TableName::from("events"),
        BufferSettings {
            max_buffered_count: 1,
            max_buffer_delay: Duration::from_secs(10),
            flush_timeout: Some(Duration::from_secs(30)),
        },
        submitter.clone(),
        Arc::clone(&executor),
    );

    for i in 0..300 {
        buffer.enqueue(put(format!("r{}", i))).unwrap();
    }
    buffer.close();

    assert_eq!(submitter.batch_count(), 300);
    assert!(
        common::wait_until(Duration::from_secs(2), || executor.scheduled() <= 4),
        "timer still holds {} entries",
        executor.scheduled()
    );
}

#[test]
fn test_invalid_mutation_rejected_synchronously() {
    let (_submitter, buffer) = setup_buffer(settings(10, 10_000));

    let result = buffer.enqueue(strata::Mutation::put("no-columns"));

    assert!(matches!(result, Err(StrataError::InvalidMutation(_))));
    assert_eq!(buffer.pending_count(), 0);
    assert_eq!(buffer.stats().enqueued, 0);
}

// =============================================================================
// Flush Boundary / Concurrency Tests
// =============================================================================

#[test]
fn test_enqueues_during_flush_go_to_next_batch() {
    let (submitter, buffer) = setup_buffer(settings(2, 10_000));
    submitter.block();

    buffer.enqueue(put("a")).unwrap();
    buffer.enqueue(put("b")).unwrap(); // swap: [a, b] in flight

    let late: Vec<_> = ["c", "d", "e"]
        .iter()
        .map(|row| buffer.enqueue(put(*row)).unwrap())
        .collect();

    assert_eq!(buffer.pending_count(), 3);
    submitter.release();

    for op in &late {
        assert!(op.wait_timeout(WAIT).unwrap().is_ok());
    }

    let batches = submitter.batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].rows, vec!["a", "b"]);
    assert_eq!(batches[1].rows, vec!["c", "d", "e"]);
    assert_eq!(submitter.max_in_flight(), 1);
}

#[test]
fn test_flush_requests_coalesce_while_in_flight() {
    let (submitter, buffer) = setup_buffer(settings(100, 10_000));
    submitter.block();

    buffer.enqueue(put("a")).unwrap();
    buffer.flush();
    assert!(common::wait_until(Duration::from_secs(2), || submitter.in_flight() == 1));

    let op = buffer.enqueue(put("b")).unwrap();
    for _ in 0..10 {
        buffer.flush();
    }
    assert_eq!(buffer.pending_count(), 1);

    submitter.release();
    assert!(op.wait_timeout(WAIT).unwrap().is_ok());

    assert_eq!(submitter.batch_count(), 2);
    assert_eq!(submitter.max_in_flight(), 1);
}

#[test]
fn test_batches_preserve_enqueue_order() {
    let (submitter, buffer) = setup_buffer(settings(7, 5));
    submitter.set_delay(Duration::from_millis(2));

    for i in 0..200 {
        buffer.enqueue(put(format!("{:05}", i))).unwrap();
    }
    buffer.close();

    let rows: Vec<String> = submitter
        .batches()
        .into_iter()
        .flat_map(|b| b.rows)
        .collect();
    let expected: Vec<String> = (0..200).map(|i| format!("{:05}", i)).collect();
    assert_eq!(rows, expected);

    let ids: Vec<u64> = submitter.batches().iter().map(|b| b.id).collect();
    assert!(ids.windows(2).all(|w| w[1] == w[0] + 1));
}

#[test]
fn test_concurrent_enqueue_every_operation_completes_once() {
    let (submitter, buffer) = setup_buffer(settings(16, 5));
    let completions = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let buffer = Arc::clone(&buffer);
            let completions = Arc::clone(&completions);
            thread::spawn(move || {
                let mut ops = Vec::new();
                for i in 0..250 {
                    let op = buffer.enqueue(put(format!("t{}-{}", t, i))).unwrap();
                    let c = Arc::clone(&completions);
                    op.on_complete(move |_| {
                        c.fetch_add(1, Ordering::SeqCst);
                    });
                    ops.push(op);
                }
                ops
            })
        })
        .collect();

    let ops: Vec<_> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    buffer.close();

    assert!(ops.iter().all(|op| op.state() == OperationState::Succeeded));
    assert_eq!(completions.load(Ordering::SeqCst), 2000);

    let flushed: usize = submitter.batches().iter().map(|b| b.rows.len()).sum();
    assert_eq!(flushed, 2000);
    assert_eq!(submitter.max_in_flight(), 1);

    let stats = buffer.stats();
    assert_eq!(stats.enqueued, 2000);
    assert_eq!(stats.mutations_succeeded, 2000);
    assert_eq!(stats.pending, 0);
}

// =============================================================================
// Close Tests
// =============================================================================

#[test]
fn test_close_drains_pending() {
    let (submitter, buffer) = setup_buffer(settings(100, 10_000));

    let ops: Vec<_> = (0..5).map(|i| buffer.enqueue(put(format!("r{}", i))).unwrap()).collect();
    buffer.close();

    assert!(ops.iter().all(|op| op.is_done()));
    assert_eq!(submitter.batch_count(), 1);
    assert!(buffer.is_closed());
}

#[test]
fn test_close_waits_for_in_flight_flush() {
    let (submitter, buffer) = setup_buffer(settings(1, 10_000));
    submitter.set_delay(Duration::from_millis(150));

    let first = buffer.enqueue(put("a")).unwrap();
    let second = buffer.enqueue(put("b")).unwrap();

    let start = Instant::now();
    buffer.close();

    assert!(start.elapsed() >= Duration::from_millis(100));
    assert_eq!(first.state(), OperationState::Succeeded);
    assert_eq!(second.state(), OperationState::Succeeded);
}

#[test]
fn test_enqueue_after_close_fails() {
    let (_submitter, buffer) = setup_buffer(settings(10, 10_000));
    buffer.close();

    let result = buffer.enqueue(put("late"));
    assert!(matches!(result, Err(StrataError::BufferClosed { table }) if table == "events"));
}

#[test]
fn test_close_twice_is_harmless() {
    let (submitter, buffer) = setup_buffer(settings(10, 10_000));
    buffer.enqueue(put("a")).unwrap();

    buffer.close();
    buffer.close();

    assert_eq!(submitter.batch_count(), 1);
}
