//! Pattern-dispatch table.
//!
//! Stateless lookup structure built once at startup from an explicit
//! list of handler registrations — no runtime discovery, no process
//! globals; tests construct as many registries as they need.

use std::collections::HashMap;
use std::sync::Arc;

use crate::instance::GameInstance;
use crate::scheduler::handler::CommandHandler;
use crate::{AppError, Result};

/// Dispatch table over the registered handlers.
#[derive(Default)]
pub struct CommandRegistry {
    handlers: Vec<Arc<dyn CommandHandler>>,
    by_category: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for its category.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] when the category or one of the
    /// handler's command-types is already claimed — both must be
    /// globally unique.
    pub fn register(&mut self, handler: Arc<dyn CommandHandler>) -> Result<()> {
        let category = handler.category();
        if self.by_category.contains_key(category) {
            return Err(AppError::Config(format!(
                "handler category {category} registered twice"
            )));
        }
        for (_, kind) in handler.keyword_table() {
            if Self::category_of(kind) != category {
                return Err(AppError::Config(format!(
                    "command type {kind} does not belong to category {category}"
                )));
            }
            if self
                .handlers
                .iter()
                .any(|h| h.keyword_table().iter().any(|(_, k)| k == kind))
            {
                return Err(AppError::Config(format!(
                    "command type {kind} registered twice"
                )));
            }
        }
        self.by_category
            .insert(category.to_owned(), Arc::clone(&handler));
        self.handlers.push(handler);
        Ok(())
    }

    /// Map free text to a command-type by its leading keyword.
    ///
    /// First registered handler that recognizes the keyword wins.
    #[must_use]
    pub fn command_type_of(&self, text: &str) -> Option<&'static str> {
        let keyword = text.split_whitespace().next()?;
        self.handlers.iter().find_map(|handler| {
            handler
                .keyword_table()
                .iter()
                .find(|(trigger, _)| *trigger == keyword)
                .map(|(_, kind)| *kind)
        })
    }

    /// Category prefix of a command-type (text before the first `_`,
    /// or the whole tag when there is none).
    #[must_use]
    pub fn category_of(kind: &str) -> &str {
        kind.split('_').next().unwrap_or(kind)
    }

    /// Handler owning a command-type's category.
    #[must_use]
    pub fn handler_for(&self, kind: &str) -> Option<&Arc<dyn CommandHandler>> {
        self.by_category.get(Self::category_of(kind))
    }

    /// Whether `text` is recognized as a response to a command of `kind`.
    #[must_use]
    pub fn match_response(&self, kind: &str, text: &str) -> bool {
        self.handler_for(kind)
            .is_some_and(|handler| handler.response_pattern().matches(kind, text))
    }

    /// Seed every handler's recurring probe for one account.
    pub async fn register_schedulers(&self, instance: &Arc<GameInstance>) {
        for handler in &self.handlers {
            handler.register_scheduler(instance).await;
        }
    }
}
