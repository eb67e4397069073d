//! Command unit: the schedulable, sendable piece of work.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::instance::GameInstance;
use crate::Result;

/// One element of the game's rich-text message form.
///
/// Plain text tokens carry only `text`; tokens that mention another
/// participant additionally carry the opaque `entity_ref` the game uses
/// to address them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageToken {
    /// Visible token text.
    pub text: String,
    /// Opaque participant reference for mention tokens.
    #[serde(default)]
    pub entity_ref: Option<String>,
}

impl MessageToken {
    /// A plain text token.
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            entity_ref: None,
        }
    }

    /// A mention token addressing another participant.
    #[must_use]
    pub fn mention(text: impl Into<String>, entity_ref: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            entity_ref: Some(entity_ref.into()),
        }
    }
}

/// Closure form of a command body, evaluated exactly once at send time.
pub type DeferredBody =
    Arc<dyn Fn(Arc<GameInstance>) -> BoxFuture<'static, Result<String>> + Send + Sync>;

/// Command body variants.
///
/// Most commands are literal text; token bodies address other
/// participants; deferred bodies depend on live state (for example a
/// level readout) and are resolved by the scheduler just before
/// transmission.
#[derive(Clone)]
pub enum CommandBody {
    /// Literal command text, tokenized at send time.
    Text(String),
    /// Pre-built token sequence.
    Tokens(Vec<MessageToken>),
    /// Deferred producer evaluated at send time.
    Deferred(DeferredBody),
}

impl CommandBody {
    /// Wrap an async producer as a deferred body.
    pub fn deferred<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<GameInstance>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        Self::Deferred(Arc::new(move |instance| Box::pin(f(instance))))
    }

    /// Human-readable form for logs and retry heuristics; deferred
    /// bodies have no text until evaluated.
    #[must_use]
    pub fn display_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Tokens(tokens) => tokens
                .iter()
                .map(|t| t.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
            Self::Deferred(_) => String::from("<deferred>"),
        }
    }
}

impl fmt::Debug for CommandBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Tokens(tokens) => f.debug_tuple("Tokens").field(tokens).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<&str> for CommandBody {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for CommandBody {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<MessageToken>> for CommandBody {
    fn from(tokens: Vec<MessageToken>) -> Self {
        Self::Tokens(tokens)
    }
}

/// A unit of scripted work.
///
/// Identity for queue de-duplication is `kind`: at most one queued
/// command per kind. `date` anchors the earliest send time; `retries`
/// is owned by the handler's recovery logic.
#[derive(Debug, Clone)]
pub struct Command {
    /// Command-type tag, namespaced `<category>_<subtype>`.
    pub kind: String,
    /// Body transmitted to the game.
    pub body: CommandBody,
    /// Handler-managed retry counter.
    pub retries: u32,
    /// Earliest send time; `None` means "now".
    pub date: Option<DateTime<Utc>>,
}

impl Command {
    /// Build a command sent as soon as its turn comes.
    #[must_use]
    pub fn new(kind: impl Into<String>, body: impl Into<CommandBody>) -> Self {
        Self {
            kind: kind.into(),
            body: body.into(),
            retries: 0,
            date: None,
        }
    }

    /// Anchor the command to an earliest send time.
    #[must_use]
    pub fn at(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Set the retry counter (used by handler recovery).
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}
