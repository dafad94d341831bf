mod support;

use cdc_orchestrator_core::memory::ScriptedJobRunner;
use cdc_orchestrator_core::{JobRunStatus, Outcome, SkipReason, TrackerError};
use support::{at, base_config, partition, Harness, TRACKER_KEY};

#[test]
fn racing_ticks_on_same_snapshot_submit_once_with_guarded_runner() {
    let harness = Harness::new();
    harness.put_stream_object("2023-08-01-00-03", "a.json");
    let tracker = harness.tracker();
    let snapshot_a = tracker.read_or_initialize().expect("read should pass");
    let snapshot_b = tracker.read_or_initialize().expect("read should pass");

    let first = tracker
        .advance_from(snapshot_a, at(0, 10, 0))
        .expect("first tick should pass");
    let second = tracker
        .advance_from(snapshot_b, at(0, 10, 0))
        .expect("second tick should pass");

    assert_eq!(first.started_run_id(), Some("jr_0001"));
    assert_eq!(
        second,
        Outcome::Skipped {
            reason: SkipReason::ConcurrencyLimit
        }
    );
    assert_eq!(harness.runner.submitted().len(), 1);
    assert_eq!(harness.runner.active_runs(), 1);
    assert_eq!(harness.state().last_job_run_id.as_deref(), Some("jr_0001"));
}

#[test]
fn stale_write_rejects_the_losing_submission() {
    let harness = Harness::with_runner(base_config(), ScriptedJobRunner::unguarded());
    harness.put_stream_object("2023-08-01-00-03", "a.json");
    let tracker = harness.tracker();
    let snapshot_a = tracker.read_or_initialize().expect("read should pass");
    let snapshot_b = tracker.read_or_initialize().expect("read should pass");

    tracker
        .advance_from(snapshot_a, at(0, 10, 0))
        .expect("first tick should pass");
    let error = tracker
        .advance_from(snapshot_b, at(0, 10, 0))
        .expect_err("second tick should observe a stale write");

    assert!(error.is_stale_state());
    assert!(matches!(error, TrackerError::StaleState { ref key, .. } if key == TRACKER_KEY));

    // Without a runner-side guard both ticks reach the runner; the losing
    // run is surfaced instead of silently dropped.
    let submitted: Vec<String> = harness
        .runner
        .submitted()
        .into_iter()
        .map(|run| run.run_id)
        .collect();
    assert_eq!(submitted, vec!["jr_0001", "jr_0002"]);
    assert_eq!(error.orphaned_run_id(), Some("jr_0002"));

    let state = harness.state();
    assert_eq!(state.last_job_run_id.as_deref(), Some("jr_0001"));
    assert!(!state.ready_to_run_next_job);

    // The loser re-reads and decides again.
    let retried = tracker.advance(at(0, 10, 1)).expect("retry should pass");
    assert_eq!(retried.label(), "still_running");
}

#[test]
fn racing_reconciliations_advance_the_watermark_once() {
    let harness = Harness::new();
    harness.put_stream_object("2023-08-01-00-03", "a.json");
    let tracker = harness.tracker();
    tracker.advance(at(0, 10, 0)).expect("first tick should pass");
    harness.runner.finish_latest(JobRunStatus::Succeeded);

    let snapshot_a = tracker.read_or_initialize().expect("read should pass");
    let snapshot_b = tracker.read_or_initialize().expect("read should pass");

    let first = tracker
        .advance_from(snapshot_a, at(0, 20, 0))
        .expect("first reconciliation should pass");
    let second = tracker.advance_from(snapshot_b, at(0, 20, 0));

    assert_eq!(first.label(), "reconciled_no_op");
    let error = second.expect_err("second reconciliation should be stale");
    assert!(error.is_stale_state());
    assert_eq!(error.orphaned_run_id(), None);
    assert_eq!(
        harness.state().last_processed_partition,
        partition("2023-08-01-00-18")
    );
}

#[test]
fn external_overwrite_between_read_and_write_is_detected() {
    let harness = Harness::new();
    let tracker = harness.tracker();
    let snapshot = tracker.read_or_initialize().expect("read should pass");
    let body = harness.store.body(TRACKER_KEY).expect("tracker should exist");
    harness.store.put_raw(TRACKER_KEY, &body);

    let error = tracker
        .advance_from(snapshot, at(1, 0, 0))
        .expect_err("stale snapshot should be rejected");

    assert!(error.is_stale_state());
    assert_eq!(harness.state().last_processed_partition, partition("2023-08-01-00-00"));
}
