//! Account manager behavior: CRUD, merge patches, validation.

use channel_pilot::events::{Event, EventBus};
use channel_pilot::manager::{AccountManager, AccountStore};
use channel_pilot::AppError;
use serde_json::json;

fn manager() -> (AccountManager, EventBus, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = AccountStore::open(tmp.path().join("accounts.json"));
    let events = EventBus::new();
    (AccountManager::load(store, events.clone()), events, tmp)
}

#[tokio::test]
async fn create_get_remove_round_trip() {
    let (accounts, _events, _tmp) = manager();

    let created = accounts.create("acct-1").expect("create");
    assert_eq!(created.id, "acct-1");
    assert!(!created.online);

    let fetched = accounts.get("acct-1").expect("get");
    assert_eq!(fetched, created);

    accounts.remove("acct-1").expect("remove");
    assert!(matches!(accounts.get("acct-1"), Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn duplicate_create_is_rejected() {
    let (accounts, _events, _tmp) = manager();
    accounts.create("acct-1").expect("create");
    assert!(accounts.create("acct-1").is_err());
}

#[tokio::test]
async fn status_patch_deep_merges_and_stamps_the_update_time() {
    let (accounts, _events, _tmp) = manager();
    accounts.create("acct-1").expect("create");

    accounts
        .patch_status("acct-1", &json!({ "garden": { "in_progress": true } }))
        .expect("first patch");
    let updated = accounts
        .patch_status("acct-1", &json!({ "garden": { "no_seeds": true } }))
        .expect("second patch");

    assert!(updated.status.garden.in_progress, "sibling key survives");
    assert!(updated.status.garden.no_seeds);
    assert!(updated.metadata.last_update.is_some());
}

#[tokio::test]
async fn status_patch_with_null_clears_the_field() {
    let (accounts, _events, _tmp) = manager();
    accounts.create("acct-1").expect("create");
    accounts
        .patch_status("acct-1", &json!({ "personal_info": { "level": 42 } }))
        .expect("set");
    let updated = accounts
        .patch_status("acct-1", &json!({ "personal_info": { "level": null } }))
        .expect("clear");

    assert_eq!(updated.status.personal_info.level, None);
}

#[tokio::test]
async fn config_patch_rejects_a_shape_violation() {
    let (accounts, _events, _tmp) = manager();
    accounts.create("acct-1").expect("create");

    let err = accounts
        .patch_config("acct-1", &json!({ "meditation": { "count": "ten" } }))
        .expect_err("string count must fail validation");
    assert!(matches!(err, AppError::Storage(_)));

    // The record is untouched after the rejected patch.
    let account = accounts.get("acct-1").expect("get");
    assert_eq!(account.config.meditation.count, 1);
}

#[tokio::test]
async fn config_patch_merges_nested_sections() {
    let (accounts, _events, _tmp) = manager();
    accounts.create("acct-1").expect("create");
    let updated = accounts
        .patch_config(
            "acct-1",
            &json!({ "meditation": { "tantric": { "enabled": true } } }),
        )
        .expect("patch");

    assert!(updated.config.meditation.tantric.enabled);
    assert_eq!(updated.config.meditation.count, 1, "siblings keep defaults");
}

#[tokio::test]
async fn patches_emit_events() {
    let (accounts, events, _tmp) = manager();
    accounts.create("acct-1").expect("create");
    let mut rx = events.subscribe();

    accounts
        .patch_status("acct-1", &json!({ "garden": { "in_progress": true } }))
        .expect("status patch");
    accounts
        .patch_config("acct-1", &json!({ "garden": { "enabled": true } }))
        .expect("config patch");

    let mut saw_status = false;
    let mut saw_config = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            Event::StatusUpdated { account_id } => saw_status = account_id == "acct-1",
            Event::ConfigUpdated { account_id } => saw_config = account_id == "acct-1",
            _ => {}
        }
    }
    assert!(saw_status);
    assert!(saw_config);
}

#[tokio::test]
async fn entity_ref_lookup_finds_the_owner() {
    let (accounts, _events, _tmp) = manager();
    accounts.create("acct-1").expect("create");
    accounts.create("acct-2").expect("create");
    accounts
        .patch_status(
            "acct-2",
            &json!({ "personal_info": { "entity_ref": "REF-2" } }),
        )
        .expect("seed");

    assert_eq!(accounts.find_by_entity_ref("REF-2"), Some("acct-2".to_owned()));
    assert_eq!(accounts.find_by_entity_ref("REF-9"), None);
}
