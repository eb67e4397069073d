//! Beast-garden run: enter, then pick a tactic per wave until cleared.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use crate::handlers::named_u32;
use crate::instance::GameInstance;
use crate::models::{Command, CommandBody};
use crate::scheduler::{CommandHandler, ResponsePattern};
use crate::timeutil;
use crate::{AppError, Result};

const MAX_RETRIES: u32 = 3;
// Repeated escapes against the same boss wave stop paying off.
const ESCAPE_THRESHOLD: u32 = 5;
const STEP_DELAY: Duration = Duration::from_millis(1000);

/// Handler for the beast-garden run.
pub struct ZooHandler {
    pattern: ResponsePattern,
    remaining: Regex,
    entered: Regex,
    vertical: Regex,
    horizontal: Regex,
}

impl ZooHandler {
    /// Compile the handler's patterns.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] when a pattern fails to compile.
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: ResponsePattern::shared(
                "剩余妖兽|仅可进入妖兽园1次|妖兽已过期|被消灭了|已进入妖兽园",
            )?,
            remaining: Regex::new(r"剩余妖兽(?<remaining>\d+)")?,
            entered: Regex::new("已进入妖兽园")?,
            vertical: Regex::new(
                r"#(?<m1>[^\(你]+)\((\d+)\)\n(?<m2>[^\(你]+)\((\d+)\)(\n(?<m3>[^\(你]+)\((\d+)\))?",
            )?,
            horizontal: Regex::new(
                r"#(?<m1>[^\(你]+)\((\d+)\)((?<m2>[^\(你]+)\((\d+)\))?((?<m3>[^\(你]+)\((\d+)\))?",
            )?,
        })
    }
}

#[async_trait]
impl CommandHandler for ZooHandler {
    fn category(&self) -> &'static str {
        "zoo"
    }

    fn keyword_table(&self) -> &[(&'static str, &'static str)] {
        &[
            ("进入妖兽园", "zoo"),
            ("横扫", "zoo"),
            ("力劈", "zoo"),
            ("逃跑", "zoo"),
        ]
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
        let account = instance.account()?;
        let config = account.config.zoo;

        if let Some(caps) = self.remaining.captures(response) {
            let remaining = named_u32(&caps, "remaining")
                .ok_or_else(|| AppError::Response("beast count missing".into()))?;
            let mut choice: Option<&str> = None;
            let mut escape_count = account.status.zoo.escape_count;
            if remaining > 0 {
                let vertical = self.vertical.captures(response);
                let horizontal = self.horizontal.captures(response);
                choice = Some(if vertical.is_some() { "力劈" } else { "横扫" });
                let boss_wave = horizontal
                    .as_ref()
                    .and_then(|caps| caps.name("m1"))
                    .is_some_and(|m| m.as_str().contains('王'));
                let full_rank = vertical
                    .as_ref()
                    .and_then(|caps| caps.name("m3"))
                    .is_some()
                    || horizontal
                        .as_ref()
                        .and_then(|caps| caps.name("m3"))
                        .is_some();
                if config.auto_escape
                    && escape_count < ESCAPE_THRESHOLD
                    && remaining > 3
                    && boss_wave
                    && full_rank
                {
                    choice = Some("逃跑");
                }
                if choice == Some("逃跑") {
                    escape_count += 1;
                } else {
                    escape_count = 0;
                }
            }
            instance.update_status(json!({
                "zoo": {
                    "in_progress": remaining > 0,
                    "is_finished": remaining == 0,
                    "remaining": remaining,
                    "choice": choice,
                    "escape_count": escape_count,
                }
            }))?;
            if let Some(choice) = choice {
                instance.schedule_command_delayed(Command::new("zoo", choice), STEP_DELAY);
            }
        } else if self.entered.is_match(response) {
            instance.update_status(json!({
                "zoo": {
                    "in_progress": true,
                    "is_finished": false,
                    "remaining": null,
                    "choice": "逃跑",
                }
            }))?;
            instance.schedule_command_delayed(Command::new("zoo", "逃跑"), STEP_DELAY);
        } else {
            instance.update_status(json!({
                "zoo": {
                    "in_progress": false,
                    "is_finished": true,
                    "remaining": 0,
                    "choice": null,
                }
            }))?;
            self.register_scheduler(instance).await;
        }
        Ok(())
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

    async fn register_scheduler(&self, instance: &Arc<GameInstance>) {
        let Ok(account) = instance.account() else {
            return;
        };
        let config = account.config.zoo;
        if !config.enabled {
            return;
        }
        let day_offset = i64::from(account.status.zoo.is_finished);
        instance.schedule_command(
            Command::new(
                "zoo",
                CommandBody::deferred(|instance: Arc<GameInstance>| async move {
                    let level = instance.wait_for_level_update().await?;
                    Ok(format!("进入妖兽园 {}", level.saturating_sub(10) / 9))
                }),
            )
            .at(timeutil::at_clock(&config.time, Some(day_offset))),
        );
    }
}
