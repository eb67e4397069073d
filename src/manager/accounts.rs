//! Account records and the merge operations over them.
//!
//! Status and config are mutated exclusively through the deep-merge
//! patch operations here; every mutation enqueues a persistence
//! snapshot and publishes an event.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde_json::Value;

use crate::events::{Event, EventBus};
use crate::manager::storage::AccountStore;
use crate::merge::deep_merge;
use crate::models::{Account, AccountConfig, AccountStatus, SessionParams};
use crate::{AppError, Result};

/// The account set and its persistence trigger.
pub struct AccountManager {
    accounts: RwLock<Vec<Account>>,
    store: AccountStore,
    events: EventBus,
}

impl AccountManager {
    /// Load the persisted account set.
    #[must_use]
    pub fn load(store: AccountStore, events: EventBus) -> Self {
        let accounts = store.load();
        Self {
            accounts: RwLock::new(accounts),
            store,
            events,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Account>> {
        self.accounts
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Account>> {
        self.accounts
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Clone of every account record.
    #[must_use]
    pub fn list(&self) -> Vec<Account> {
        self.read().clone()
    }

    /// Clone of one account record.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] for an unknown id.
    pub fn get(&self, id: &str) -> Result<Account> {
        self.read()
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("account {id}")))
    }

    /// Create a fresh account record.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Storage`] when the id is already taken.
    pub fn create(&self, id: &str) -> Result<Account> {
        let account = {
            let mut accounts = self.write();
            if accounts.iter().any(|a| a.id == id) {
                return Err(AppError::Storage(format!("account {id} already exists")));
            }
            let account = Account::new(id);
            accounts.push(account.clone());
            account
        };
        self.persist();
        Ok(account)
    }

    /// Remove an account record.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] for an unknown id.
    pub fn remove(&self, id: &str) -> Result<()> {
        {
            let mut accounts = self.write();
            let before = accounts.len();
            accounts.retain(|a| a.id != id);
            if accounts.len() == before {
                return Err(AppError::NotFound(format!("account {id}")));
            }
        }
        self.persist();
        Ok(())
    }

    /// Deep-merge a status patch, stamp the update time, persist.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] for an unknown id, or
    /// [`AppError::Storage`] when the patched document no longer
    /// deserializes as a status tree.
    pub fn patch_status(&self, id: &str, patch: &Value) -> Result<Account> {
        let updated = {
            let mut accounts = self.write();
            let account = accounts
                .iter_mut()
                .find(|a| a.id == id)
                .ok_or_else(|| AppError::NotFound(format!("account {id}")))?;
            let mut doc = serde_json::to_value(&account.status)?;
            deep_merge(&mut doc, patch);
            account.status = serde_json::from_value::<AccountStatus>(doc)?;
            account.metadata.last_update = Some(Utc::now());
            account.clone()
        };
        self.persist();
        self.events.emit(Event::StatusUpdated {
            account_id: id.to_owned(),
        });
        Ok(updated)
    }

    /// Deep-merge a config patch, persist.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] for an unknown id, or
    /// [`AppError::Storage`] when the patched document no longer
    /// deserializes as a config tree.
    pub fn patch_config(&self, id: &str, patch: &Value) -> Result<Account> {
        let updated = {
            let mut accounts = self.write();
            let account = accounts
                .iter_mut()
                .find(|a| a.id == id)
                .ok_or_else(|| AppError::NotFound(format!("account {id}")))?;
            let mut doc = serde_json::to_value(&account.config)?;
            deep_merge(&mut doc, patch);
            account.config = serde_json::from_value::<AccountConfig>(doc)?;
            account.clone()
        };
        self.persist();
        self.events.emit(Event::ConfigUpdated {
            account_id: id.to_owned(),
        });
        Ok(updated)
    }

    /// Flip the online marker.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] for an unknown id.
    pub fn set_online(&self, id: &str, online: bool) -> Result<()> {
        {
            let mut accounts = self.write();
            let account = accounts
                .iter_mut()
                .find(|a| a.id == id)
                .ok_or_else(|| AppError::NotFound(format!("account {id}")))?;
            account.online = online;
        }
        self.persist();
        Ok(())
    }

    /// Replace the captured session material.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] for an unknown id.
    pub fn set_session(&self, id: &str, session: SessionParams) -> Result<()> {
        {
            let mut accounts = self.write();
            let account = accounts
                .iter_mut()
                .find(|a| a.id == id)
                .ok_or_else(|| AppError::NotFound(format!("account {id}")))?;
            account.session = Some(session);
        }
        self.persist();
        Ok(())
    }

    /// Account whose published entity reference matches, if any.
    #[must_use]
    pub fn find_by_entity_ref(&self, entity_ref: &str) -> Option<String> {
        self.read()
            .iter()
            .find(|a| {
                a.status
                    .personal_info
                    .entity_ref
                    .as_deref()
                    .is_some_and(|r| r == entity_ref)
            })
            .map(|a| a.id.clone())
    }

    /// Queue the current set for the persistence writer.
    pub fn persist(&self) {
        let snapshot = self.read().clone();
        self.store.enqueue(snapshot);
    }
}
