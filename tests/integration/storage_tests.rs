//! Persistence tests: the single-writer queue and atomic document
//! replacement, against a real filesystem.

use std::time::Duration;

use channel_pilot::manager::AccountStore;
use channel_pilot::models::Account;

async fn wait_for_file(path: &std::path::Path) {
    for _ in 0..50 {
        if path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("document never appeared at {}", path.display());
}

#[tokio::test]
async fn enqueued_snapshot_lands_on_disk_and_reloads() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("accounts.json");
    let store = AccountStore::open(&path);

    let mut account = Account::new("acct-1");
    account.online = true;
    store.enqueue(vec![account]);
    wait_for_file(&path).await;

    let reloaded = AccountStore::open(&path).load();
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded[0].id, "acct-1");
    assert!(!reloaded[0].online, "records always load offline");
}

#[tokio::test]
async fn later_snapshots_replace_earlier_ones() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("accounts.json");
    let store = AccountStore::open(&path);

    store.enqueue(vec![Account::new("acct-1")]);
    store.enqueue(vec![Account::new("acct-1"), Account::new("acct-2")]);
    wait_for_file(&path).await;

    // Writes are serialized; poll until the final snapshot is visible.
    for _ in 0..50 {
        if AccountStore::open(&path).load().len() == 2 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("final snapshot never became visible");
}

#[tokio::test]
async fn missing_document_loads_as_empty() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = AccountStore::open(tmp.path().join("missing.json"));
    assert!(store.load().is_empty());
}

#[tokio::test]
async fn corrupt_document_loads_as_empty() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("accounts.json");
    std::fs::write(&path, "not json at all {{{").expect("write junk");

    let store = AccountStore::open(&path);
    assert!(store.load().is_empty());
}

#[tokio::test]
async fn document_is_complete_json_after_every_write() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("accounts.json");
    let store = AccountStore::open(&path);

    for round in 0..5 {
        let accounts: Vec<Account> = (0..=round).map(|i| Account::new(format!("acct-{i}"))).collect();
        store.enqueue(accounts);
    }
    wait_for_file(&path).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Rename-based replacement never exposes a torn document.
    let text = std::fs::read_to_string(&path).expect("read");
    let parsed: Vec<Account> = serde_json::from_str(&text).expect("parse");
    assert!(!parsed.is_empty());
}
