//! Response-attribution tests: FIFO claiming, single resolution, and
//! timeout independence.

use std::time::Duration;

use channel_pilot::models::Command;

use super::support::{advance, recording_registry, TestEnv};

// ── FIFO attribution among matchable in-flight commands ─────

#[tokio::test(start_paused = true)]
async fn earliest_sent_command_claims_the_matching_text() {
    let (registry, handler) = recording_registry(0);
    let env = TestEnv::new(registry);
    let (instance, session) = env.start_instance("acct-1").await;

    instance.schedule_command(Command::new("alpha_a", "alpha-a"));
    instance.schedule_command(Command::new("alpha_b", "alpha-b"));
    advance(Duration::from_millis(1500)).await;
    assert_eq!(session.sends().len(), 2, "both must be in flight");

    instance.scheduler().process_response("RESULT first");
    advance(Duration::from_millis(50)).await;

    let handled = handler.handled();
    assert_eq!(handled, vec![("alpha_a".to_owned(), "RESULT first".to_owned())]);

    instance.scheduler().process_response("RESULT second");
    advance(Duration::from_millis(50)).await;

    let handled = handler.handled();
    assert_eq!(handled.len(), 2);
    assert_eq!(handled[1], ("alpha_b".to_owned(), "RESULT second".to_owned()));
}

// ── A resolved command leaves the in-flight set ─────────────

#[tokio::test(start_paused = true)]
async fn resolved_text_fed_again_is_ignored() {
    let (registry, handler) = recording_registry(0);
    let env = TestEnv::new(registry);
    let (instance, _session) = env.start_instance("acct-1").await;

    instance.schedule_command(Command::new("alpha_a", "alpha-a"));
    advance(Duration::from_millis(500)).await;

    instance.scheduler().process_response("RESULT done");
    advance(Duration::from_millis(50)).await;
    assert_eq!(handler.handled().len(), 1);
    assert!(!instance.scheduler().is_pending());

    instance.scheduler().process_response("RESULT done");
    advance(Duration::from_millis(50)).await;
    assert_eq!(handler.handled().len(), 1, "no in-flight command may match");
}

// ── Unattributable chatter is discarded ─────────────────────

#[tokio::test(start_paused = true)]
async fn non_matching_text_resolves_nothing() {
    let (registry, handler) = recording_registry(0);
    let env = TestEnv::new(registry);
    let (instance, _session) = env.start_instance("acct-1").await;

    instance.schedule_command(Command::new("alpha_a", "alpha-a"));
    advance(Duration::from_millis(500)).await;

    instance.scheduler().process_response("随机频道闲聊");
    advance(Duration::from_millis(50)).await;

    assert!(handler.handled().is_empty());
    assert!(instance.scheduler().is_pending(), "command stays in flight");
}

// ── Resolution cancels the timeout ──────────────────────────

#[tokio::test(start_paused = true)]
async fn resolved_command_never_times_out_afterwards() {
    let (registry, handler) = recording_registry(3);
    let env = TestEnv::new(registry);
    let (instance, _session) = env.start_instance("acct-1").await;

    instance.schedule_command(Command::new("alpha_a", "alpha-a"));
    advance(Duration::from_millis(500)).await;
    instance.scheduler().process_response("RESULT quick");
    advance(Duration::from_secs(20)).await;

    assert_eq!(handler.handled().len(), 1);
    assert!(
        handler.errors().is_empty(),
        "the losing timeout side must be ignored"
    );
}

// ── Late text after a timeout finds nothing to claim ────────

#[tokio::test(start_paused = true)]
async fn text_arriving_after_the_timeout_is_discarded() {
    let (registry, handler) = recording_registry(0);
    let env = TestEnv::new(registry);
    let (instance, _session) = env.start_instance("acct-1").await;

    instance.schedule_command(Command::new("alpha_a", "alpha-a"));
    // Cap 0: the timeout abandons the command without a replacement.
    advance(Duration::from_secs(16)).await;
    assert_eq!(handler.errors().len(), 1);

    instance.scheduler().process_response("RESULT late");
    advance(Duration::from_millis(50)).await;

    assert!(handler.handled().is_empty());
}
