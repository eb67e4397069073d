//! Observability event bus.
//!
//! Every scheduling decision, send, resolution, and failure is published
//! here. Events are informational only — nothing in the scheduling core
//! depends on a subscriber being present. The bus is a cheap clone
//! handle over a `tokio::sync::broadcast` channel so the HTTP surface,
//! the log subscriber, and tests can all watch the same stream.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const BUS_CAPACITY: usize = 256;

/// Bus event payloads, one variant per observable transition.
#[derive(Debug, Clone)]
pub enum Event {
    /// A command entered the timed queue.
    CommandScheduled {
        /// Owning account.
        account_id: String,
        /// Command-type tag.
        kind: String,
        /// Scheduled fire time.
        at: DateTime<Utc>,
    },
    /// A command was transmitted and is now awaiting its response.
    CommandSent {
        /// Owning account.
        account_id: String,
        /// Command-type tag.
        kind: String,
    },
    /// A command's send/response race settled (either way).
    CommandProcessed {
        /// Owning account.
        account_id: String,
        /// Command-type tag.
        kind: String,
    },
    /// Incoming text was attributed to an in-flight command.
    CommandResolved {
        /// Owning account.
        account_id: String,
        /// Command-type tag.
        kind: String,
    },
    /// A command failed (timeout or handler error) and was handed to
    /// its handler for recovery.
    CommandFailed {
        /// Owning account.
        account_id: String,
        /// Command-type tag.
        kind: String,
        /// Failure description.
        error: String,
    },
    /// A handler declined to retry; the command was dropped.
    CommandAbandoned {
        /// Owning account.
        account_id: String,
        /// Command-type tag.
        kind: String,
        /// Final failure description.
        error: String,
    },
    /// New game text arrived for an account.
    ResponseReceived {
        /// Owning account.
        account_id: String,
        /// Decoded game text.
        text: String,
    },
    /// An account's status snapshot was patched.
    StatusUpdated {
        /// Owning account.
        account_id: String,
    },
    /// An account's config was patched.
    ConfigUpdated {
        /// Owning account.
        account_id: String,
    },
    /// The response-fetch timer was re-armed.
    FetchScheduled {
        /// Owning account.
        account_id: String,
        /// Next fetch time.
        at: DateTime<Utc>,
    },
    /// The stored session is near expiry and needs external re-capture.
    SessionRefreshRequested {
        /// Owning account.
        account_id: String,
    },
}

/// Clone-able publish/subscribe handle.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with the default buffer capacity.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Publish an event; silently dropped when nobody listens.
    pub fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    /// Open a new subscription starting at the current stream position.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

/// Spawn the standing subscriber that renders events through `tracing`.
pub fn spawn_log_subscriber(bus: &EventBus) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event log subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    })
}

fn log_event(event: &Event) {
    match event {
        Event::CommandScheduled { account_id, kind, at } => {
            info!(account_id, kind, at = %at, "command scheduled");
        }
        Event::CommandSent { account_id, kind } => {
            info!(account_id, kind, "command sent");
        }
        Event::CommandProcessed { account_id, kind } => {
            info!(account_id, kind, "command processed");
        }
        Event::CommandResolved { account_id, kind } => {
            info!(account_id, kind, "command resolved");
        }
        Event::CommandFailed { account_id, kind, error } => {
            info!(account_id, kind, error, "command failed");
        }
        Event::CommandAbandoned { account_id, kind, error } => {
            error!(account_id, kind, error, "command abandoned");
        }
        Event::StatusUpdated { account_id } => {
            info!(account_id, "status updated");
        }
        Event::ConfigUpdated { account_id } => {
            info!(account_id, "config updated");
        }
        Event::FetchScheduled { account_id, at } => {
            info!(account_id, at = %at, "fetch scheduled");
        }
        Event::SessionRefreshRequested { account_id } => {
            warn!(account_id, "session refresh requested");
        }
        Event::ResponseReceived { .. } => {}
    }
}
