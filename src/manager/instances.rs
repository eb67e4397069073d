//! Live instance directory and cross-account handles.
//!
//! The directory is the only sanctioned path between accounts: a
//! feature coordinating two accounts looks the peer up here and gets
//! an [`InstanceHandle`] whose surface is just `schedule_command` and
//! `update_status` — remote mutation rides the same merge contract as
//! local mutation, never direct field access.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::instance::{GameInstance, InstanceDeps};
use crate::models::{Command, MessageToken};
use crate::scheduler::CommandRegistry;
use crate::session::GameSession;
use crate::timeutil;
use crate::{AppError, Result};

/// Restricted cross-account surface over a live instance.
#[derive(Clone)]
pub struct InstanceHandle {
    instance: Arc<GameInstance>,
}

impl InstanceHandle {
    /// The handled account's id.
    #[must_use]
    pub fn account_id(&self) -> &str {
        self.instance.account_id()
    }

    /// Queue a command on the handled account's scheduler.
    pub fn schedule_command(&self, command: Command) {
        self.instance.schedule_command(command);
    }

    /// Merge a status patch into the handled account.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Storage`] when the patch fails to apply.
    pub fn update_status(&self, patch: serde_json::Value) -> Result<()> {
        self.instance.update_status(patch)
    }
}

/// Registry of live per-account instances.
#[derive(Default)]
pub struct InstanceDirectory {
    instances: RwLock<HashMap<String, Arc<GameInstance>>>,
}

impl InstanceDirectory {
    /// Empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<GameInstance>>> {
        self.instances
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<GameInstance>>> {
        self.instances
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Full instance access for the owning application layer.
    #[must_use]
    pub fn get(&self, account_id: &str) -> Option<Arc<GameInstance>> {
        self.read().get(account_id).cloned()
    }

    /// Restricted handle for cross-account features.
    #[must_use]
    pub fn lookup(&self, account_id: &str) -> Option<InstanceHandle> {
        self.get(account_id).map(|instance| InstanceHandle { instance })
    }

    /// Handle to the live instance whose account publishes the given
    /// entity reference.
    #[must_use]
    pub fn find_by_entity_ref(&self, entity_ref: &str) -> Option<InstanceHandle> {
        let instances = self.read();
        instances
            .values()
            .find(|instance| {
                instance.account().is_ok_and(|account| {
                    account
                        .status
                        .personal_info
                        .entity_ref
                        .as_deref()
                        .is_some_and(|r| r == entity_ref)
                })
            })
            .map(|instance| InstanceHandle {
                instance: Arc::clone(instance),
            })
    }

    /// Start (or restart) an account's instance.
    ///
    /// # Errors
    ///
    /// Propagates registration failure; the half-started instance is
    /// closed and removed first.
    pub async fn start(
        &self,
        account_id: &str,
        session: Arc<dyn GameSession>,
        deps: InstanceDeps,
    ) -> Result<()> {
        if let Some(existing) = self.get(account_id) {
            info!(account_id, "closing existing instance before restart");
            existing.close().await;
            self.write().remove(account_id);
        }
        let instance = GameInstance::new(account_id, session, deps);
        self.write()
            .insert(account_id.to_owned(), Arc::clone(&instance));
        if let Err(err) = instance.register().await {
            instance.close().await;
            self.write().remove(account_id);
            return Err(err);
        }
        Ok(())
    }

    /// Stop an account's instance.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] when no instance is live.
    pub async fn stop(&self, account_id: &str) -> Result<()> {
        let instance = self
            .write()
            .remove(account_id)
            .ok_or_else(|| AppError::NotFound(format!("instance {account_id}")))?;
        instance.close().await;
        Ok(())
    }

    /// Stop every live instance (process shutdown).
    pub async fn close_all(&self) {
        let instances: Vec<_> = self.write().drain().map(|(_, v)| v).collect();
        for instance in instances {
            instance.close().await;
        }
    }

    /// Route operator free text: keyword-dispatched through the
    /// registry when recognized, raw transmission otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] when no instance is live, or the
    /// transport error of a raw send.
    pub async fn send_free_text(
        &self,
        registry: &CommandRegistry,
        account_id: &str,
        text: &str,
    ) -> Result<()> {
        let instance = self
            .get(account_id)
            .ok_or_else(|| AppError::NotFound(format!("instance {account_id}")))?;
        match registry.command_type_of(text) {
            Some(kind) => {
                instance.schedule_command(Command::new(kind, text));
                Ok(())
            }
            None => instance.transmit(&[MessageToken::plain(text)]).await,
        }
    }

    /// Background task resetting daily progress at each local midnight.
    pub fn spawn_midnight_reset(self: &Arc<Self>) -> JoinHandle<()> {
        let directory = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let until = (timeutil::next_local_midnight() - chrono::Utc::now())
                    .to_std()
                    .unwrap_or_default();
                sleep(until).await;
                let Some(directory) = directory.upgrade() else {
                    return;
                };
                let instances: Vec<_> = directory.read().values().cloned().collect();
                for instance in instances {
                    if let Err(err) = instance.reset_status() {
                        warn!(account_id = instance.account_id(), %err, "daily reset failed");
                    }
                }
            }
        })
    }
}
