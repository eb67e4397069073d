//! Fishing cycle: enter a pond, cast, pull on time, leave, repeat
//! across the configured pond levels.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use crate::handlers::named_u32;
use crate::instance::GameInstance;
use crate::models::Command;
use crate::scheduler::{CommandHandler, ResponsePattern};
use crate::timeutil;
use crate::{AppError, Result};

const MAX_RETRIES: u32 = 3;

/// Handler for the fishing cycle.
pub struct FishingHandler {
    pattern: ResponsePattern,
    position: Regex,
    pull_time: Regex,
    leave: Regex,
    finished: Regex,
    bait: Regex,
}

impl FishingHandler {
    /// Compile the handler's patterns.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] when a pattern fails to compile.
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: ResponsePattern::shared("无法进入鱼塘|预计[上咬]钩时间|鱼情好|离开鱼塘")?,
            position: Regex::new(r"位置(?<position>\d+):鱼情好")?,
            pull_time: Regex::new(r"(?<hours>\d+)时(?<minutes>\d+)分(?<seconds>\d+)秒")?,
            leave: Regex::new("发送指令:离开鱼塘")?,
            finished: Regex::new("已离开鱼塘")?,
            bait: Regex::new(r"饵料:-1\((?<bait>\d+)")?,
        })
    }
}

#[async_trait]
impl CommandHandler for FishingHandler {
    fn category(&self) -> &'static str {
        "fishing"
    }

    fn keyword_table(&self) -> &[(&'static str, &'static str)] {
        &[
            ("进入鱼塘", "fishing"),
            ("重新进入鱼塘", "fishing"),
            ("甩杆", "fishing"),
            ("拉杆", "fishing"),
            ("离开鱼塘", "fishing"),
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
        let status = instance.account()?.status.fishing;

        if let Some(caps) = self.position.captures(response) {
            let position = named_u32(&caps, "position")
                .ok_or_else(|| AppError::Response("cast position missing".into()))?;
            instance.update_status(json!({
                "fishing": { "in_progress": true, "position": position, "pull_time": null }
            }))?;
            instance.schedule_command(Command::new("fishing", format!("甩杆 {position}")));
        } else if let Some(pull_time) = timeutil::parse_clock(response, &self.pull_time) {
            let bait = self
                .bait
                .captures(response)
                .and_then(|caps| named_u32(&caps, "bait"));
            let mut patch = json!({
                "fishing": { "in_progress": true, "position": null, "pull_time": pull_time }
            });
            if let Some(bait) = bait {
                patch["fishing"]["bait"] = Value::from(bait);
            }
            instance.update_status(patch)?;
            instance.schedule_command(Command::new("fishing", "拉杆").at(pull_time));
        } else if self.leave.is_match(response) {
            instance.update_status(json!({
                "fishing": { "in_progress": true, "bait": 0, "position": null, "pull_time": null }
            }))?;
            instance.schedule_command(Command::new("fishing", "离开鱼塘"));
        } else if self.finished.is_match(response) {
            instance.update_status(json!({
                "fishing": {
                    "in_progress": false,
                    "finished_count": status.finished_count + 1,
                    "bait": null,
                    "position": null,
                    "pull_time": null,
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
        instance: &Arc<GameInstance>,
    ) -> Option<Command> {
        let retries = command.retries + 1;
        if retries >= MAX_RETRIES {
            return None;
        }
        // Mid-pond the cast/pull pair recovers each other; outside a
        // pond the original command is simply retried.
        let body_text = command.body.display_text();
        let in_progress = instance
            .account()
            .map(|account| account.status.fishing.in_progress)
            .unwrap_or(false);
        let body = if in_progress || body_text.contains("进入鱼塘") {
            if body_text == "拉杆" {
                "甩杆".to_owned()
            } else {
                "拉杆".to_owned()
            }
        } else {
            body_text
        };
        Some(Command::new("fishing", body).with_retries(retries))
    }

    async fn register_scheduler(&self, instance: &Arc<GameInstance>) {
        let Ok(account) = instance.account() else {
            return;
        };
        let config = account.config.fishing;
        if !config.enabled {
            return;
        }
        let status = account.status.fishing;
        let first_level = config.levels.first().copied().unwrap_or(1);
        if status.in_progress {
            if let Some(pull_time) = status.pull_time {
                instance.schedule_command(Command::new("fishing", "拉杆").at(pull_time));
            } else {
                instance.schedule_command(Command::new("fishing", "甩杆"));
            }
        } else if status.finished_count == 0 {
            instance.schedule_command(
                Command::new("fishing", format!("进入鱼塘 {first_level}"))
                    .at(timeutil::at_clock(&config.time, Some(0))),
            );
        } else if status.finished_count == 1 && config.levels.len() >= 2 {
            let second_level = config.levels[1];
            instance.schedule_command(
                Command::new("fishing", format!("重新进入鱼塘 {second_level}"))
                    .at(timeutil::at_clock(&config.time, Some(0))),
            );
        } else {
            instance.schedule_command(
                Command::new("fishing", format!("进入鱼塘 {first_level}"))
                    .at(timeutil::at_clock(&config.time, Some(1))),
            );
        }
    }
}
