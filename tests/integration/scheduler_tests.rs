//! Scheduler property tests on a paused tokio clock.
//!
//! Covers queue de-duplication, collision avoidance, transport-level
//! retries, deferred body evaluation, timeout handling, and the
//! handler-owned retry bound.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use channel_pilot::events::Event;
use channel_pilot::models::{Command, CommandBody};

use super::support::{advance, recording_registry, TestEnv};

// ── No double-send: same-type scheduling replaces the timer ─

#[tokio::test(start_paused = true)]
async fn rescheduling_a_type_keeps_one_timer_and_the_newer_time() {
    let (registry, _handler) = recording_registry(0);
    let env = TestEnv::new(registry);
    let (instance, session) = env.start_instance("acct-1").await;
    let t0 = tokio::time::Instant::now();

    instance.schedule_command_delayed(Command::new("alpha_a", "alpha-a"), Duration::from_millis(5000));
    instance.schedule_command_delayed(Command::new("alpha_a", "alpha-a"), Duration::from_millis(1000));
    advance(Duration::from_millis(8000)).await;

    let sends = session.sends();
    assert_eq!(sends.len(), 1, "only the replacement may fire");
    let elapsed = sends[0].1 - t0;
    assert!(elapsed >= Duration::from_millis(1000));
    assert!(elapsed < Duration::from_millis(5000));
}

// ── Collision avoidance: ≥1000 ms between queued fire times ─

#[tokio::test(start_paused = true)]
async fn same_instant_commands_are_spaced_by_the_collision_window() {
    let (registry, _handler) = recording_registry(0);
    let env = TestEnv::new(registry);
    let (instance, session) = env.start_instance("acct-1").await;

    instance.schedule_command(Command::new("alpha_a", "alpha-a"));
    instance.schedule_command(Command::new("alpha_b", "alpha-b"));
    advance(Duration::from_millis(3000)).await;

    let sends = session.sends();
    assert_eq!(sends.len(), 2);
    let gap = sends[1].1 - sends[0].1;
    assert!(
        gap >= Duration::from_millis(1000),
        "second send fired {gap:?} after the first"
    );
}

#[tokio::test(start_paused = true)]
async fn three_way_collision_spreads_across_successive_windows() {
    let (registry, _handler) = recording_registry(0);
    let env = TestEnv::new(registry);
    let (instance, session) = env.start_instance("acct-1").await;

    instance.schedule_command(Command::new("alpha_a", "alpha-a"));
    instance.schedule_command(Command::new("alpha_b", "alpha-b"));
    instance.schedule_command(Command::new("alpha_probe", "alpha-probe"));
    advance(Duration::from_millis(4000)).await;

    let sends = session.sends();
    assert_eq!(sends.len(), 3);
    for pair in sends.windows(2) {
        assert!(pair[1].1 - pair[0].1 >= Duration::from_millis(1000));
    }
}

// ── Transport failures retry silently below the handler ─────

#[tokio::test(start_paused = true)]
async fn transport_failures_are_retried_without_involving_the_handler() {
    let (registry, handler) = recording_registry(3);
    let env = TestEnv::new(registry);
    let (instance, session) = env.start_instance("acct-1").await;
    session.fail_next_sends(2);

    instance.schedule_command(Command::new("alpha_a", "alpha-a"));
    advance(Duration::from_millis(5000)).await;

    assert_eq!(session.attempts(), 3, "two failures then one success");
    assert_eq!(session.sends().len(), 1);
    assert!(
        handler.errors().is_empty(),
        "transport retries must stay invisible to the handler"
    );
}

// ── Deferred bodies resolve exactly once at send time ───────

#[tokio::test(start_paused = true)]
async fn deferred_body_is_evaluated_once_and_transmitted() {
    let (registry, _handler) = recording_registry(0);
    let env = TestEnv::new(registry);
    let (instance, session) = env.start_instance("acct-1").await;

    let evaluations = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&evaluations);
    instance.schedule_command(Command::new(
        "alpha_a",
        CommandBody::deferred(move |_instance| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(String::from("deferred text"))
            }
        }),
    ));
    advance(Duration::from_millis(2000)).await;

    assert_eq!(evaluations.load(Ordering::SeqCst), 1);
    assert_eq!(session.sends()[0].0, "deferred text");
}

// ── Timeout: rejection reaches the handler exactly once ─────

#[tokio::test(start_paused = true)]
async fn unanswered_command_times_out_into_handle_error() {
    let (registry, handler) = recording_registry(3);
    let env = TestEnv::new(registry);
    let (instance, session) = env.start_instance("acct-1").await;

    instance.schedule_command(Command::new("alpha_a", "alpha-a"));
    advance(Duration::from_millis(16_000)).await;

    let errors = handler.errors();
    assert_eq!(errors.len(), 1, "one timeout, one handle_error call");
    assert_eq!(errors[0].0, "alpha_a");
    assert_eq!(errors[0].1, 0, "first failure carries the original counter");
    assert!(errors[0].2.contains("timeout"));
    // The replacement with retries=1 was rescheduled immediately and is
    // already in flight by now.
    assert_eq!(session.sends().len(), 2);
    assert!(instance.scheduler().is_pending());
}

// ── Retry bound is enforced by the handler, not the core ────

#[tokio::test(start_paused = true)]
async fn retries_stop_at_the_handler_cap() {
    let (registry, handler) = recording_registry(3);
    let env = TestEnv::new(registry);
    let (instance, session) = env.start_instance("acct-1").await;

    instance.schedule_command(Command::new("alpha_a", "alpha-a"));
    // Three send/timeout cycles at 15 s each, then abandonment.
    advance(Duration::from_secs(60)).await;

    assert_eq!(session.sends().len(), 3);
    let recorded: Vec<u32> = handler.errors().iter().map(|(_, retries, _)| *retries).collect();
    assert_eq!(recorded, vec![0, 1, 2]);
    assert!(!instance.scheduler().is_scheduled());
    assert!(!instance.scheduler().is_pending());
}

// ── Observability: scheduling publishes an event ────────────

#[tokio::test(start_paused = true)]
async fn scheduling_emits_a_command_scheduled_event() {
    let (registry, _handler) = recording_registry(0);
    let env = TestEnv::new(registry);
    let (instance, _session) = env.start_instance("acct-1").await;
    let mut rx = env.events.subscribe();

    instance.schedule_command(Command::new("alpha_a", "alpha-a"));

    let mut saw_scheduled = false;
    while let Ok(event) = rx.try_recv() {
        if let Event::CommandScheduled { account_id, kind, .. } = event {
            assert_eq!(account_id, "acct-1");
            assert_eq!(kind, "alpha_a");
            saw_scheduled = true;
        }
    }
    assert!(saw_scheduled);
}

// ── Snapshot reflects both collections ──────────────────────

#[tokio::test(start_paused = true)]
async fn snapshot_tracks_queued_and_in_flight_commands() {
    let (registry, _handler) = recording_registry(0);
    let env = TestEnv::new(registry);
    let (instance, _session) = env.start_instance("acct-1").await;

    instance.schedule_command_delayed(Command::new("alpha_b", "alpha-b"), Duration::from_secs(120));
    instance.schedule_command(Command::new("alpha_a", "alpha-a"));
    advance(Duration::from_millis(500)).await;

    let snapshot = instance.scheduler().snapshot();
    assert_eq!(snapshot.in_flight.len(), 1);
    assert_eq!(snapshot.in_flight[0].kind, "alpha_a");
    assert_eq!(snapshot.scheduled.len(), 1);
    assert_eq!(snapshot.scheduled[0].kind, "alpha_b");

    let next = instance
        .scheduler()
        .next_scheduled_command()
        .expect("queued command");
    assert_eq!(next.kind, "alpha_b");
}
