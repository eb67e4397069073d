//! Account persistence: one JSON document, atomically replaced.
//!
//! Every write goes through a single background writer task fed by a
//! queue, so concurrent patches can never interleave on disk. The
//! document is written to a temp file in the same directory and
//! renamed over the target.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::models::Account;
use crate::{AppError, Result};

/// Handle to the account document and its single-writer queue.
#[derive(Debug)]
pub struct AccountStore {
    path: PathBuf,
    tx: mpsc::UnboundedSender<Vec<Account>>,
}

impl AccountStore {
    /// Open the store and spawn its writer task.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<Account>>();
        let writer_path = path.clone();
        tokio::spawn(async move {
            while let Some(mut snapshot) = rx.recv().await {
                // Only the newest queued snapshot matters.
                while let Ok(newer) = rx.try_recv() {
                    snapshot = newer;
                }
                let target = writer_path.clone();
                let outcome =
                    tokio::task::spawn_blocking(move || write_document(&target, &snapshot)).await;
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => error!(%err, "account store write failed"),
                    Err(err) => error!(%err, "account store writer panicked"),
                }
            }
        });
        Self { path, tx }
    }

    /// Load the account list from disk.
    ///
    /// A missing or unreadable document yields an empty list; loaded
    /// records always come back offline.
    #[must_use]
    pub fn load(&self) -> Vec<Account> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                warn!(%err, path = %self.path.display(), "account store read failed");
                return Vec::new();
            }
        };
        match serde_json::from_str::<Vec<Account>>(&data) {
            Ok(mut accounts) => {
                for account in &mut accounts {
                    account.online = false;
                }
                accounts
            }
            Err(err) => {
                warn!(%err, path = %self.path.display(), "account store parse failed");
                Vec::new()
            }
        }
    }

    /// Queue a snapshot for the writer task.
    pub fn enqueue(&self, snapshot: Vec<Account>) {
        if self.tx.send(snapshot).is_err() {
            error!("account store writer gone; snapshot dropped");
        }
    }
}

fn write_document(path: &Path, accounts: &[Account]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|err| AppError::Storage(format!("temp file: {err}")))?;
    let data = serde_json::to_vec(accounts)?;
    temp.write_all(&data)
        .map_err(|err| AppError::Storage(format!("write: {err}")))?;
    temp.persist(path)
        .map_err(|err| AppError::Storage(format!("rename: {err}")))?;
    Ok(())
}
