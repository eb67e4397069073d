//! Character profile probe.
//!
//! Publishes the level readout other features' deferred bodies wait on.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use crate::handlers::named_u32;
use crate::instance::GameInstance;
use crate::models::Command;
use crate::scheduler::{CommandHandler, ResponsePattern};
use crate::{AppError, Result};

const MAX_RETRIES: u32 = 3;

/// Handler for the level readout probe.
pub struct ProfileHandler {
    pattern: ResponsePattern,
    level: Regex,
}

impl ProfileHandler {
    /// Compile the handler's patterns.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] when a pattern fails to compile.
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: ResponsePattern::shared("你的修仙境界")?,
            level: Regex::new(r"境界LV(?<level>\d+)")?,
        })
    }
}

#[async_trait]
impl CommandHandler for ProfileHandler {
    fn category(&self) -> &'static str {
        "profile"
    }

    fn keyword_table(&self) -> &[(&'static str, &'static str)] {
        &[("我的境界", "profile")]
    }

    fn response_pattern(&self) -> &ResponsePattern {
        &self.pattern
    }

    async fn handle_response(
        &self,
        _command: &Command,
        response: &str,
        instance: &Arc<GameInstance>,
    ) -> Result<()> {
        let level = self
            .level
            .captures(response)
            .and_then(|caps| named_u32(&caps, "level"))
            .ok_or_else(|| AppError::Response("level readout missing".into()))?;
        instance.update_status(json!({ "personal_info": { "level": level } }))
    }

    async fn handle_error(
        &self,
        command: &Command,
        _error: &AppError,
        _instance: &Arc<GameInstance>,
    ) -> Option<Command> {
        let retries = command.retries + 1;
        (retries < MAX_RETRIES).then(|| command.clone().with_retries(retries))
    }
}
