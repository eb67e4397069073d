//! Per-account command scheduling and response-correlation core.
//!
//! Owns two collections: the timed queue (not yet sent, timer armed)
//! and the in-flight set (sent, awaiting a correlated response or
//! timeout). A command lives in exactly one of the two, except
//! instantaneously during the send transition. All timers run on the
//! tokio clock so paused-clock tests are deterministic; calendar
//! anchors are converted to a deadline at scheduling time.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::events::{Event, EventBus};
use crate::instance::GameInstance;
use crate::models::{Command, CommandBody, MessageToken};
use crate::scheduler::registry::CommandRegistry;
use crate::{AppError, Result};

/// Minimum spacing between any two queued fire times.
pub const COLLISION_WINDOW: Duration = Duration::from_millis(1000);
/// How long a sent command waits for a correlated response.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(15);
/// Queued commands firing beyond this horizon do not block shutdown.
pub const DESTROY_HORIZON: Duration = Duration::from_secs(60);

const QUIESCENCE_POLL: Duration = Duration::from_secs(1);
const TRANSPORT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// A queued command awaiting its fire time.
struct QueuedEntry {
    id: Uuid,
    command: Command,
    fire_at: Instant,
    wall_at: DateTime<Utc>,
    timer: JoinHandle<()>,
}

/// A sent command awaiting attribution.
///
/// `resolve` is taken when incoming text claims the command; the entry
/// itself leaves the set only when the send race settles, and a claimed
/// entry is skipped by later attribution passes.
struct InFlightEntry {
    id: Uuid,
    kind: String,
    resolve: Option<oneshot::Sender<String>>,
}

#[derive(Default)]
struct QueueState {
    scheduled: Vec<QueuedEntry>,
    in_flight: Vec<InFlightEntry>,
}

/// Public view of one queued command.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledInfo {
    /// Command-type tag.
    pub kind: String,
    /// Scheduled fire time.
    pub at: DateTime<Utc>,
    /// Handler retry counter.
    pub retries: u32,
}

/// Public view of one in-flight command.
#[derive(Debug, Clone, Serialize)]
pub struct InFlightInfo {
    /// Command-type tag.
    pub kind: String,
}

/// Serializable snapshot of both collections.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    /// Timed-queue contents.
    pub scheduled: Vec<ScheduledInfo>,
    /// In-flight contents, in send order.
    pub in_flight: Vec<InFlightInfo>,
}

/// One account's scheduling core.
pub struct CommandScheduler {
    account_id: String,
    instance: Weak<GameInstance>,
    registry: Arc<CommandRegistry>,
    events: EventBus,
    state: Mutex<QueueState>,
}

impl CommandScheduler {
    /// Build the scheduler for one account.
    ///
    /// `instance` is the owning instance, still under construction when
    /// this runs (`Arc::new_cyclic`).
    #[must_use]
    pub fn new(
        account_id: impl Into<String>,
        instance: Weak<GameInstance>,
        registry: Arc<CommandRegistry>,
        events: EventBus,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            instance,
            registry,
            events,
            state: Mutex::new(QueueState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether any command is in flight.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        !self.state().in_flight.is_empty()
    }

    /// Whether any command is queued.
    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        !self.state().scheduled.is_empty()
    }

    /// Earliest queued command, when one exists.
    #[must_use]
    pub fn next_scheduled_command(&self) -> Option<ScheduledInfo> {
        let state = self.state();
        state
            .scheduled
            .iter()
            .min_by_key(|e| e.fire_at)
            .map(|e| ScheduledInfo {
                kind: e.command.kind.clone(),
                at: e.wall_at,
                retries: e.command.retries,
            })
    }

    pub(crate) fn next_fire_instant(&self) -> Option<Instant> {
        self.state().scheduled.iter().map(|e| e.fire_at).min()
    }

    /// Snapshot of both collections for observers.
    #[must_use]
    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.state();
        QueueSnapshot {
            scheduled: state
                .scheduled
                .iter()
                .map(|e| ScheduledInfo {
                    kind: e.command.kind.clone(),
                    at: e.wall_at,
                    retries: e.command.retries,
                })
                .collect(),
            in_flight: state
                .in_flight
                .iter()
                .map(|e| InFlightInfo {
                    kind: e.kind.clone(),
                })
                .collect(),
        }
    }

    /// Place a command on the timed queue.
    ///
    /// Replaces any queued command of the same kind (cancelling its
    /// timer in the same critical section), then advances the target
    /// past the collision window of every other queued fire time.
    pub fn schedule_command(&self, command: Command, delay: Duration) {
        let now_instant = Instant::now();
        let now_wall = Utc::now();
        let anchor = command
            .date
            .map_or(Duration::ZERO, |date| {
                (date - now_wall).to_std().unwrap_or(Duration::ZERO)
            });
        let id = Uuid::new_v4();

        let (kind, wall_at) = {
            let mut state = self.state();
            if let Some(pos) = state
                .scheduled
                .iter()
                .position(|e| e.command.kind == command.kind)
            {
                let old = state.scheduled.remove(pos);
                old.timer.abort();
                debug!(
                    account_id = self.account_id,
                    kind = command.kind,
                    "replaced queued command of same kind"
                );
            }

            let mut target = now_instant + anchor + delay;
            while state
                .scheduled
                .iter()
                .any(|e| instant_gap(e.fire_at, target) < COLLISION_WINDOW)
            {
                target += COLLISION_WINDOW;
            }

            let wall_at = now_wall
                + chrono::Duration::from_std(target - now_instant)
                    .unwrap_or_else(|_| chrono::Duration::zero());
            let instance = self.instance.clone();
            let timer = tokio::spawn(async move {
                sleep_until(target).await;
                if let Some(instance) = instance.upgrade() {
                    instance.scheduler().process_command(id).await;
                }
            });
            let kind = command.kind.clone();
            state.scheduled.push(QueuedEntry {
                id,
                command,
                fire_at: target,
                wall_at,
                timer,
            });
            (kind, wall_at)
        };

        self.events.emit(Event::CommandScheduled {
            account_id: self.account_id.clone(),
            kind,
            at: wall_at,
        });
        if let Some(instance) = self.instance.upgrade() {
            instance.schedule_fetch();
        }
    }

    /// Timer entry point: send the command and run its handler.
    pub(crate) async fn process_command(&self, id: Uuid) {
        // Clock drift guard: never send before the scheduled time.
        loop {
            let fire_at = {
                let state = self.state();
                match state.scheduled.iter().find(|e| e.id == id) {
                    Some(entry) => entry.fire_at,
                    None => return,
                }
            };
            if Instant::now() >= fire_at {
                break;
            }
            sleep_until(fire_at).await;
        }

        let command = {
            let state = self.state();
            match state.scheduled.iter().find(|e| e.id == id) {
                Some(entry) => entry.command.clone(),
                None => return,
            }
        };
        let Some(instance) = self.instance.upgrade() else {
            return;
        };
        let Some(handler) = self.registry.handler_for(&command.kind).cloned() else {
            self.drop_scheduled(id);
            self.events.emit(Event::CommandAbandoned {
                account_id: self.account_id.clone(),
                kind: command.kind.clone(),
                error: format!("no handler for command type {}", command.kind),
            });
            return;
        };

        let outcome = match self.send_command(id, command.clone(), &instance).await {
            Ok(Some(response)) => handler.handle_response(&command, &response, &instance).await,
            // Replaced by a newer command of the same kind while the
            // transport was retrying; the newer command owns the slot.
            Ok(None) => return,
            Err(err) => Err(err),
        };

        if let Err(err) = outcome {
            self.drop_scheduled(id);
            self.events.emit(Event::CommandFailed {
                account_id: self.account_id.clone(),
                kind: command.kind.clone(),
                error: err.to_string(),
            });
            match handler.handle_error(&command, &err, &instance).await {
                Some(replacement) => instance.schedule_command(replacement),
                None => self.events.emit(Event::CommandAbandoned {
                    account_id: self.account_id.clone(),
                    kind: command.kind.clone(),
                    error: err.to_string(),
                }),
            }
        }
    }

    /// Transmit a command and await its correlated response.
    ///
    /// Deferred bodies are evaluated exactly once here; transport
    /// failures retry the same send indefinitely. After transmission
    /// the command moves to the in-flight set and races the response
    /// match against [`RESPONSE_TIMEOUT`]; the losing side of the race
    /// is ignored and the entry is removed exactly once either way.
    async fn send_command(
        &self,
        id: Uuid,
        command: Command,
        instance: &Arc<GameInstance>,
    ) -> Result<Option<String>> {
        let tokens = match command.body {
            CommandBody::Text(text) => vec![MessageToken::plain(text)],
            CommandBody::Tokens(tokens) => tokens,
            CommandBody::Deferred(producer) => {
                let text = producer(Arc::clone(instance)).await?;
                vec![MessageToken::plain(text)]
            }
        };

        loop {
            match instance.transmit(&tokens).await {
                Ok(()) => break,
                Err(AppError::Transport(message)) => {
                    warn!(
                        account_id = self.account_id,
                        kind = command.kind,
                        error = message,
                        "command transmission failed; retrying"
                    );
                    sleep(TRANSPORT_RETRY_DELAY).await;
                }
                Err(err) => return Err(err),
            }
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state();
            let Some(pos) = state.scheduled.iter().position(|e| e.id == id) else {
                return Ok(None);
            };
            state.scheduled.remove(pos);
            state.in_flight.push(InFlightEntry {
                id,
                kind: command.kind.clone(),
                resolve: Some(tx),
            });
        }
        self.events.emit(Event::CommandSent {
            account_id: self.account_id.clone(),
            kind: command.kind.clone(),
        });
        instance.schedule_fetch();

        let outcome = tokio::select! {
            response = rx => response.map_err(|_| {
                AppError::Session(format!("command {} dropped during shutdown", command.kind))
            }),
            () = sleep(RESPONSE_TIMEOUT) => Err(AppError::Timeout(format!(
                "command {} timed out after {}s",
                command.kind,
                RESPONSE_TIMEOUT.as_secs()
            ))),
        };

        self.state().in_flight.retain(|e| e.id != id);
        self.events.emit(Event::CommandProcessed {
            account_id: self.account_id.clone(),
            kind: command.kind.clone(),
        });
        instance.schedule_fetch();
        outcome.map(Some)
    }

    /// Attribute incoming game text to the oldest matching in-flight
    /// command; unattributable text is discarded.
    pub fn process_response(&self, text: &str) {
        self.events.emit(Event::ResponseReceived {
            account_id: self.account_id.clone(),
            text: text.to_owned(),
        });
        let resolved_kind = {
            let mut state = self.state();
            let entry = state.in_flight.iter_mut().find(|e| {
                e.resolve.is_some() && self.registry.match_response(&e.kind, text)
            });
            entry.and_then(|entry| {
                entry.resolve.take().map(|tx| {
                    let _ = tx.send(text.to_owned());
                    entry.kind.clone()
                })
            })
        };
        if let Some(kind) = resolved_kind {
            self.events.emit(Event::CommandResolved {
                account_id: self.account_id.clone(),
                kind,
            });
        }
    }

    /// Wait for quiescence, then cancel every timer and clear both
    /// collections.
    ///
    /// One queued command whose fire time is beyond
    /// [`DESTROY_HORIZON`] does not block shutdown.
    pub async fn destroy(&self) {
        loop {
            let blocking = {
                let state = self.state();
                let imminent = state
                    .scheduled
                    .iter()
                    .map(|e| e.fire_at)
                    .min()
                    .is_some_and(|next| next.saturating_duration_since(Instant::now()) < DESTROY_HORIZON);
                !state.in_flight.is_empty() || imminent
            };
            if !blocking {
                break;
            }
            sleep(QUIESCENCE_POLL).await;
        }
        let mut state = self.state();
        for entry in state.scheduled.drain(..) {
            entry.timer.abort();
        }
        state.in_flight.clear();
    }

    fn drop_scheduled(&self, id: Uuid) {
        self.state().scheduled.retain(|e| e.id != id);
    }
}

fn instant_gap(a: Instant, b: Instant) -> Duration {
    if a > b {
        a - b
    } else {
        b - a
    }
}
