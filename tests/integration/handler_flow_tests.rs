//! End-to-end flows through the real handler registry: send a probe,
//! feed a game response, and watch status merges and follow-up
//! scheduling.

use std::time::Duration;

use channel_pilot::handlers::build_registry;
use channel_pilot::models::Command;
use serde_json::json;

use super::support::{advance, TestEnv};

fn real_env() -> TestEnv {
    TestEnv::new(build_registry().expect("build registry"))
}

// ── Profile: level publication ──────────────────────────────

#[tokio::test(start_paused = true)]
async fn profile_response_publishes_the_level() {
    let env = real_env();
    let (instance, session) = env.start_instance("acct-1").await;

    instance.schedule_command(Command::new("profile", "我的境界"));
    advance(Duration::from_millis(500)).await;
    assert_eq!(session.sends()[0].0, "我的境界");

    instance.scheduler().process_response("你的修仙境界:境界LV57");
    advance(Duration::from_millis(50)).await;

    let account = env.accounts.get("acct-1").expect("account");
    assert_eq!(account.status.personal_info.level, Some(57));
}

#[tokio::test(start_paused = true)]
async fn wait_for_level_update_unblocks_on_the_readout() {
    let env = real_env();
    let (instance, session) = env.start_instance("acct-1").await;

    let waiter = {
        let instance = instance.clone();
        tokio::spawn(async move { instance.wait_for_level_update().await })
    };
    advance(Duration::from_millis(1000)).await;
    assert_eq!(session.sends().len(), 1, "the probe was sent");
    assert!(!waiter.is_finished());

    instance.scheduler().process_response("你的修仙境界:境界LV36");
    advance(Duration::from_millis(500)).await;

    let level = waiter.await.expect("join").expect("level");
    assert_eq!(level, 36);
}

// ── Garden: growth schedules the harvest ────────────────────

#[tokio::test(start_paused = true)]
async fn growing_garden_schedules_a_harvest_at_finish_time() {
    let env = real_env();
    let (instance, _session) = env.start_instance("acct-1").await;

    instance.schedule_command(Command::new("garden", "药园"));
    advance(Duration::from_millis(500)).await;
    instance
        .scheduler()
        .process_response("目前药园种植情况:区域1:仙露草 30分钟成熟");
    advance(Duration::from_millis(50)).await;

    let account = env.accounts.get("acct-1").expect("account");
    assert!(account.status.garden.in_progress);
    assert!(account.status.garden.finish_time.is_some());

    let next = instance
        .scheduler()
        .next_scheduled_command()
        .expect("harvest queued");
    assert_eq!(next.kind, "garden");
}

#[tokio::test(start_paused = true)]
async fn empty_garden_plants_the_configured_seed() {
    let env = real_env();
    env.accounts.create("acct-1").expect("create");
    env.accounts
        .patch_config("acct-1", &json!({ "garden": { "enabled": true } }))
        .expect("config");
    let (instance, session) = env.start_instance("acct-1").await;

    // register_scheduler queues the probe immediately for an idle garden.
    advance(Duration::from_millis(500)).await;
    assert_eq!(session.sends()[0].0, "药园");

    instance.scheduler().process_response("暂无种植的区域");
    advance(Duration::from_millis(1500)).await;

    let sends = session.sends();
    assert_eq!(sends[1].0, "一键种植 仙露草种子");
}

// ── Bounty: board probe accepts a preferred bounty ──────────

#[tokio::test(start_paused = true)]
async fn bounty_board_accepts_the_first_preferred_entry() {
    let env = real_env();
    env.accounts.create("acct-1").expect("create");
    env.accounts
        .patch_config("acct-1", &json!({ "bounty": { "enabled": true } }))
        .expect("config");
    let (instance, _session) = env.start_instance("acct-1").await;

    advance(Duration::from_millis(500)).await;
    instance.scheduler().process_response(
        "已领任务1/5\n2:铲除妖兽 奖励灵石\n完成需要时间120分钟",
    );
    advance(Duration::from_millis(50)).await;

    let account = env.accounts.get("acct-1").expect("account");
    assert_eq!(account.status.bounty.accepted, Some(1));
    assert_eq!(account.status.bounty.limit, Some(5));
    assert!(account.status.bounty.update_time.is_some());

    let snapshot = instance.scheduler().snapshot();
    let kinds: Vec<&str> = snapshot.scheduled.iter().map(|c| c.kind.as_str()).collect();
    assert!(kinds.contains(&"bounty_accept"), "queued kinds: {kinds:?}");
    assert!(kinds.contains(&"bounty"), "the recurring probe re-arms");
}

// ── Meditation: an idle round schedules the next sit ────────

#[tokio::test(start_paused = true)]
async fn idle_meditation_schedules_the_next_round() {
    let env = real_env();
    env.accounts.create("acct-1").expect("create");
    env.accounts
        .patch_config(
            "acct-1",
            &json!({ "meditation": { "enabled": true, "count": 10 } }),
        )
        .expect("config");
    let (instance, session) = env.start_instance("acct-1").await;

    // The seeded probe fires immediately (config time is already past).
    advance(Duration::from_millis(500)).await;
    assert_eq!(session.sends()[0].0, "吸收灵力");

    instance.scheduler().process_response("吸收灵力成功，获得灵力1000");
    advance(Duration::from_millis(1500)).await;

    let sends = session.sends();
    assert_eq!(sends[1].0, "打坐 10");

    let account = env.accounts.get("acct-1").expect("account");
    assert!(!account.status.meditation.in_progress);
    assert!(!account.status.meditation.exhausted);
}

// ── Fishing: a bite report schedules the cast ───────────────

#[tokio::test(start_paused = true)]
async fn fishing_bite_report_schedules_the_cast() {
    let env = real_env();
    let (instance, session) = env.start_instance("acct-1").await;

    instance.schedule_command(Command::new("fishing", "进入鱼塘 5"));
    advance(Duration::from_millis(500)).await;
    instance.scheduler().process_response("位置3:鱼情好");
    advance(Duration::from_millis(1500)).await;

    let account = env.accounts.get("acct-1").expect("account");
    assert!(account.status.fishing.in_progress);
    assert_eq!(account.status.fishing.position, Some(3));
    assert_eq!(session.sends()[1].0, "甩杆 3");
}

// ── Parse failure routes through handle_error ───────────────

#[tokio::test(start_paused = true)]
async fn malformed_profile_response_triggers_the_recovery_probe() {
    let env = real_env();
    let (instance, session) = env.start_instance("acct-1").await;

    instance.schedule_command(Command::new("profile", "我的境界"));
    advance(Duration::from_millis(500)).await;
    // Attribution matches, but the level detail is missing.
    instance.scheduler().process_response("你的修仙境界似乎出了一点问题");
    advance(Duration::from_millis(1500)).await;

    // handle_error re-issues the same probe with retries=1.
    assert_eq!(session.sends().len(), 2);
    let account = env.accounts.get("acct-1").expect("account");
    assert_eq!(account.status.personal_info.level, None);
}
