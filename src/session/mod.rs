//! Session/transport boundary.
//!
//! The scheduler only ever sees this trait: one send operation and one
//! pollable receive feed. The browser-driven login flow that captures
//! the underlying call templates is an external collaborator; it hands
//! over a [`SessionParams`](crate::models::SessionParams) record and
//! this module replays it.

pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::MessageToken;
use crate::Result;

/// New game messages from one receive poll, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct FetchBatch {
    /// `(sequence, decoded text)` pairs; sequence numbers are the
    /// channel's own monotonic message counter.
    pub messages: Vec<(u64, String)>,
}

/// Transport for one account's captured session.
#[async_trait]
pub trait GameSession: Send + Sync {
    /// Transmit a token sequence as one chat message.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`](crate::AppError::Transport) on
    /// network-level failure; the scheduler retries those indefinitely.
    async fn send(&self, tokens: &[MessageToken]) -> Result<()>;

    /// Poll the receive feed for new messages.
    ///
    /// An unprimed session first re-establishes its sequence window
    /// from the server; the batch may be empty in that case.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`](crate::AppError::Transport) or
    /// [`AppError::Response`](crate::AppError::Response) on failure;
    /// the caller rewinds and re-polls.
    async fn fetch(&self) -> Result<FetchBatch>;

    /// Drop the sequence window; the next fetch re-primes it.
    fn rewind(&self);

    /// Whether a sequence window is established (sends wait until it is).
    fn primed(&self) -> bool;

    /// Stable participant identifier inside the channel.
    fn participant_id(&self) -> &str;

    /// When the captured credentials expire, if known.
    fn expires_at(&self) -> Option<DateTime<Utc>>;
}
