//! Handler protocol: the pluggable per-feature unit.
//!
//! One handler instance per feature category, shared across every
//! account's scheduler. Handlers own the feature's response patterns,
//! the parse → status-merge → follow-up-scheduling logic, and the
//! bounded retry policy. They must be idempotent per resolved command
//! and must never block — any wait on other async state is expressed
//! as a short poll (see [`GameInstance::wait_for_level_update`]).
//!
//! [`GameInstance::wait_for_level_update`]: crate::instance::GameInstance::wait_for_level_update

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use crate::instance::GameInstance;
use crate::models::Command;
use crate::{AppError, Result};

/// Response-attribution pattern set for a category.
///
/// A category either recognizes all of its responses with one shared
/// pattern or carries one pattern per command-type. Pattern sets cover
/// both success and known failure phrasings — matching only attributes
/// the text, it does not imply success.
#[derive(Debug)]
pub enum ResponsePattern {
    /// One pattern shared by every command-type in the category.
    Shared(Regex),
    /// One pattern per command-type.
    PerType(Vec<(String, Regex)>),
}

impl ResponsePattern {
    /// Build a per-type table from `(kind, pattern)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] when a pattern fails to compile.
    pub fn per_type(pairs: &[(&str, &str)]) -> Result<Self> {
        let mut table = Vec::with_capacity(pairs.len());
        for (kind, pattern) in pairs {
            table.push(((*kind).to_owned(), Regex::new(pattern)?));
        }
        Ok(Self::PerType(table))
    }

    /// Build a shared pattern.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] when the pattern fails to compile.
    pub fn shared(pattern: &str) -> Result<Self> {
        Ok(Self::Shared(Regex::new(pattern)?))
    }

    /// Whether `text` is recognized as a response to a command of `kind`.
    #[must_use]
    pub fn matches(&self, kind: &str, text: &str) -> bool {
        match self {
            Self::Shared(pattern) => pattern.is_match(text),
            Self::PerType(table) => table
                .iter()
                .find(|(k, _)| k == kind)
                .is_some_and(|(_, pattern)| pattern.is_match(text)),
        }
    }
}

/// Per-category feature handler.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Category namespace; the prefix of every owned command-type.
    fn category(&self) -> &'static str;

    /// Free-text trigger keyword → command-type table.
    fn keyword_table(&self) -> &[(&'static str, &'static str)];

    /// Response-attribution patterns for the category.
    fn response_pattern(&self) -> &ResponsePattern;

    /// Parse a resolved response, merge derived facts into account
    /// status, and schedule zero or more follow-up commands.
    ///
    /// # Errors
    ///
    /// A parse failure routes the command through [`Self::handle_error`]
    /// exactly like an attribution timeout.
    async fn handle_response(
        &self,
        command: &Command,
        response: &str,
        instance: &Arc<GameInstance>,
    ) -> Result<()>;

    /// Decide recovery for a failed command.
    ///
    /// Returns a replacement command (typically a recovery probe with
    /// `retries` incremented) while the retry budget lasts, or `None`
    /// to abandon; the recurring scheduler re-arms the feature on its
    /// next natural cycle.
    async fn handle_error(
        &self,
        command: &Command,
        error: &AppError,
        instance: &Arc<GameInstance>,
    ) -> Option<Command>;

    /// Seed the timed queue with the feature's initial recurring probe,
    /// computed from persisted status. Called once per account at
    /// instance registration.
    async fn register_scheduler(&self, instance: &Arc<GameInstance>) {
        let _ = instance;
    }
}
