//! Per-account instance: couples one account's scheduler to its
//! captured session.
//!
//! Owns the response-fetch timing: while commands are pending or
//! imminent the receive feed is polled every second; when the next
//! queued command is far away the feed is rewound and the poll sleeps
//! until shortly before the fire time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::events::{Event, EventBus};
use crate::manager::accounts::AccountManager;
use crate::manager::instances::InstanceDirectory;
use crate::models::{Account, Command, MessageToken};
use crate::scheduler::{CommandRegistry, CommandScheduler};
use crate::session::GameSession;
use crate::timeutil;
use crate::{AppError, Result};

/// Baseline receive-poll interval while work is pending.
const FETCH_INTERVAL: Duration = Duration::from_secs(1);
/// Idle threshold: queued commands further out than this pause polling.
const FETCH_THRESHOLD: Duration = Duration::from_secs(5);
/// Hours before credential expiry at which a refresh is requested.
const SESSION_EXPIRY_MARGIN_HOURS: i64 = 12;
/// Poll interval for short state waits.
const STATE_POLL: Duration = Duration::from_millis(100);

/// Shared collaborators threaded into every instance.
#[derive(Clone)]
pub struct InstanceDeps {
    /// Account records and the merge operations over them.
    pub accounts: Arc<AccountManager>,
    /// Cross-account lookup service.
    pub directory: Arc<InstanceDirectory>,
    /// Dispatch table.
    pub registry: Arc<CommandRegistry>,
    /// Observability bus.
    pub events: EventBus,
}

struct FetchState {
    timer: Option<JoinHandle<()>>,
    fetching: bool,
    last_seq: u64,
}

/// One account's live automation instance.
pub struct GameInstance {
    account_id: String,
    deps: InstanceDeps,
    session: Arc<dyn GameSession>,
    scheduler: CommandScheduler,
    self_ref: Weak<GameInstance>,
    fetch: Mutex<FetchState>,
    online: AtomicBool,
    shutdown: CancellationToken,
}

impl GameInstance {
    /// Build the instance; no timers start until [`register`](Self::register).
    #[must_use]
    pub fn new(
        account_id: impl Into<String>,
        session: Arc<dyn GameSession>,
        deps: InstanceDeps,
    ) -> Arc<Self> {
        let account_id = account_id.into();
        Arc::new_cyclic(|weak: &Weak<Self>| Self {
            scheduler: CommandScheduler::new(
                account_id.clone(),
                weak.clone(),
                Arc::clone(&deps.registry),
                deps.events.clone(),
            ),
            account_id,
            deps,
            session,
            self_ref: weak.clone(),
            fetch: Mutex::new(FetchState {
                timer: None,
                fetching: false,
                last_seq: 0,
            }),
            online: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        })
    }

    /// Owning account id.
    #[must_use]
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// The scheduling core.
    #[must_use]
    pub fn scheduler(&self) -> &CommandScheduler {
        &self.scheduler
    }

    /// Cross-account lookup service.
    #[must_use]
    pub fn directory(&self) -> &Arc<InstanceDirectory> {
        &self.deps.directory
    }

    /// Account records service.
    #[must_use]
    pub fn accounts(&self) -> &Arc<AccountManager> {
        &self.deps.accounts
    }

    /// Snapshot of the owning account record.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] when the record was removed.
    pub fn account(&self) -> Result<Account> {
        self.deps.accounts.get(&self.account_id)
    }

    /// Start the instance: daily reset check, session expiry watch,
    /// handler seeding, first fetch arm.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Session`] when the stored session is already
    /// past its refresh point (a `SessionRefreshRequested` event is
    /// emitted for the external capture flow).
    pub async fn register(self: &Arc<Self>) -> Result<()> {
        let account = self.account()?;
        let fresh_today = account
            .metadata
            .last_update
            .is_some_and(|at| timeutil::same_local_day(at, Utc::now()));
        if !fresh_today {
            self.reset_status()?;
        }

        if let Some(expires) = self.session.expires_at() {
            let refresh_at = expires - chrono::Duration::hours(SESSION_EXPIRY_MARGIN_HOURS);
            if refresh_at <= Utc::now() {
                self.deps.events.emit(Event::SessionRefreshRequested {
                    account_id: self.account_id.clone(),
                });
                return Err(AppError::Session(format!(
                    "session for account {} needs refresh",
                    self.account_id
                )));
            }
            self.spawn_expiry_watch(refresh_at);
        }

        self.online.store(true, Ordering::SeqCst);
        self.deps.accounts.set_online(&self.account_id, true)?;
        info!(account_id = self.account_id, "instance registered");

        self.deps.registry.register_schedulers(self).await;
        self.schedule_fetch();
        Ok(())
    }

    /// Stop the instance: waits for scheduler quiescence, then cancels
    /// every timer.
    pub async fn close(&self) {
        self.shutdown.cancel();
        if let Some(timer) = self.fetch_state().timer.take() {
            timer.abort();
        }
        self.scheduler.destroy().await;
        self.online.store(false, Ordering::SeqCst);
        if let Err(err) = self.deps.accounts.set_online(&self.account_id, false) {
            warn!(account_id = self.account_id, %err, "offline mark failed");
        }
        info!(account_id = self.account_id, "instance closed");
    }

    /// Queue a command for immediate scheduling.
    pub fn schedule_command(&self, command: Command) {
        self.scheduler.schedule_command(command, Duration::ZERO);
    }

    /// Queue a command with an extra delay.
    pub fn schedule_command_delayed(&self, command: Command, delay: Duration) {
        self.scheduler.schedule_command(command, delay);
    }

    /// Merge a partial status patch for the owning account.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Storage`] when the patched document no
    /// longer deserializes.
    pub fn update_status(&self, patch: Value) -> Result<()> {
        self.deps
            .accounts
            .patch_status(&self.account_id, &patch)
            .map(|_| ())
    }

    /// Transmit a framed message, waiting for the instance to be online
    /// and the receive window primed.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Session`] when the instance shuts down while
    /// waiting, or the transport's own error on send failure.
    pub async fn transmit(&self, tokens: &[MessageToken]) -> Result<()> {
        loop {
            if self.shutdown.is_cancelled() {
                return Err(AppError::Session(format!(
                    "instance {} closed",
                    self.account_id
                )));
            }
            if self.online.load(Ordering::SeqCst) && self.session.primed() {
                break;
            }
            sleep(STATE_POLL).await;
        }
        self.session.send(tokens).await
    }

    /// Re-arm the receive poll based on scheduler state.
    ///
    /// Called by the scheduler after every schedule/send/settle so the
    /// poll cadence always reflects the queue.
    pub fn schedule_fetch(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let now = Instant::now();
        let mut wake_at = now + FETCH_INTERVAL;
        if !self.scheduler.is_pending() && self.scheduler.is_scheduled() {
            if let Some(next) = self.scheduler.next_fire_instant() {
                if next.saturating_duration_since(now) > FETCH_THRESHOLD {
                    self.session.rewind();
                    wake_at = next - FETCH_THRESHOLD;
                }
            }
        }

        let mut fetch = self.fetch_state();
        if let Some(timer) = fetch.timer.take() {
            timer.abort();
        }
        let weak = self.self_ref.clone();
        fetch.timer = Some(tokio::spawn(async move {
            sleep_until(wake_at).await;
            if let Some(instance) = weak.upgrade() {
                instance.fetch_responses().await;
            }
        }));
        drop(fetch);

        let wall = Utc::now()
            + chrono::Duration::from_std(wake_at - now).unwrap_or_else(|_| chrono::Duration::zero());
        self.deps.events.emit(Event::FetchScheduled {
            account_id: self.account_id.clone(),
            at: wall,
        });
    }

    /// Poll the receive feed once and attribute any new game text.
    pub async fn fetch_responses(&self) {
        {
            let mut fetch = self.fetch_state();
            if fetch.fetching {
                return;
            }
            fetch.fetching = true;
        }

        match self.session.fetch().await {
            Ok(batch) => {
                let mut last_seq = self.fetch_state().last_seq;
                for (seq, content) in batch.messages {
                    if seq <= last_seq {
                        continue;
                    }
                    if let Some(text) = self.extract_response(&content) {
                        self.scheduler.process_response(&text);
                        last_seq = seq;
                    }
                }
                self.fetch_state().last_seq = last_seq;
            }
            Err(err) => {
                warn!(account_id = self.account_id, %err, "response fetch failed");
                self.session.rewind();
            }
        }

        self.fetch_state().fetching = false;
        self.schedule_fetch();
    }

    /// Clear the cached level, probe for it, and poll until a handler
    /// publishes the fresh readout.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Session`] when the instance shuts down while
    /// waiting.
    pub async fn wait_for_level_update(&self) -> Result<u32> {
        self.update_status(json!({ "personal_info": { "level": null } }))?;
        self.schedule_command(Command::new("profile", "我的境界"));
        loop {
            if self.shutdown.is_cancelled() {
                return Err(AppError::Session(format!(
                    "instance {} closed",
                    self.account_id
                )));
            }
            if let Some(level) = self.account()?.status.personal_info.level {
                return Ok(level);
            }
            sleep(STATE_POLL).await;
        }
    }

    /// Reset per-day progress to its day-start values.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Storage`] when the patch fails to apply.
    pub fn reset_status(&self) -> Result<()> {
        self.update_status(json!({
            "meditation": { "exhausted": false },
            "garden": { "ripen": { "ripe_count": 30 } },
            "bounty": { "refresh_count": 0 },
            "secret_realm": { "in_progress": false, "is_finished": false },
            "zoo": { "in_progress": false, "is_finished": false, "escape_count": 0 },
            "fishing": { "in_progress": false, "finished_count": 0 },
        }))
    }

    fn fetch_state(&self) -> MutexGuard<'_, FetchState> {
        self.fetch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Game text quotes the addressed participant as `<id>)` before the
    // reply body; anything without our marker is channel chatter.
    fn extract_response(&self, content: &str) -> Option<String> {
        let marker = format!("{})", self.session.participant_id());
        content
            .find(&marker)
            .map(|index| content[index + marker.len()..].to_owned())
    }

    fn spawn_expiry_watch(&self, refresh_at: chrono::DateTime<Utc>) {
        let delay = (refresh_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let weak = self.self_ref.clone();
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = sleep(delay) => {
                    if let Some(instance) = weak.upgrade() {
                        instance.online.store(false, Ordering::SeqCst);
                        instance.deps.events.emit(Event::SessionRefreshRequested {
                            account_id: instance.account_id.clone(),
                        });
                    }
                }
            }
        });
    }
}
