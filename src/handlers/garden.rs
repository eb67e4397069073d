//! Garden plant/harvest/ripen loop.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use serde_json::json;

use crate::handlers::named_u32;
use crate::instance::GameInstance;
use crate::models::Command;
use crate::scheduler::{CommandHandler, ResponsePattern};
use crate::timeutil;
use crate::{AppError, Result};

const MAX_RETRIES: u32 = 3;

/// Handler for the garden loop.
pub struct GardenHandler {
    pattern: ResponsePattern,
    time_left: Regex,
    ripe_count: Regex,
    finish_time: Regex,
    finished: Regex,
    no_seeds: Regex,
}

impl GardenHandler {
    /// Compile the handler's patterns.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] when a pattern fails to compile.
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: ResponsePattern::per_type(&[
                (
                    "garden",
                    "目前药园种植情况|一键种植成功|请先购买种子|区域1|分钟后可来收获|暂无种植的区域",
                ),
                ("garden_ripe", "催熟符不足|一键催熟成功|每人每天可催熟30次"),
            ])?,
            time_left: Regex::new(r"(?<minutes>\d+)分钟成熟")?,
            ripe_count: Regex::new(r"催熟次数-1/(?<count>\d+)")?,
            finish_time: Regex::new(r"预计成熟.*?(?<hours>\d+):(?<minutes>\d+):(?<seconds>\d+)")?,
            finished: Regex::new("已成熟")?,
            no_seeds: Regex::new("请先购买种子")?,
        })
    }

    async fn handle_ripen(&self, response: &str, instance: &Arc<GameInstance>) -> Result<()> {
        let config = instance.account()?.config.garden;
        let ripe_count = self
            .ripe_count
            .captures(response)
            .and_then(|caps| named_u32(&caps, "count"))
            .unwrap_or(0);
        instance.update_status(json!({ "garden": { "ripen": { "ripe_count": ripe_count } } }))?;
        let seed = if ripe_count > 0 {
            config.ripen.seed_type
        } else {
            config.seed_type
        };
        instance.schedule_command(Command::new("garden", format!("一键种植 {seed}")));
        Ok(())
    }

    async fn handle_plot(&self, response: &str, instance: &Arc<GameInstance>) -> Result<()> {
        let account = instance.account()?;
        let config = account.config.garden;
        let status = account.status.garden;

        if self.finished.is_match(response) {
            instance.update_status(
                json!({ "garden": { "in_progress": true, "finish_time": Utc::now() } }),
            )?;
            instance.schedule_command(Command::new("garden", "收获"));
            return Ok(());
        }

        let finish = timeutil::parse_clock(response, &self.finish_time)
            .or_else(|| timeutil::parse_clock(response, &self.time_left));
        let in_progress = finish.is_some();
        let no_seeds = self.no_seeds.is_match(response);

        let ripen_available = status.ripen.ripe_count.is_none_or(|count| count > 0);
        if config.ripen.enabled && ripen_available && in_progress {
            instance.update_status(json!({
                "garden": {
                    "in_progress": in_progress,
                    "finish_time": finish,
                    "ripen": { "no_seeds": no_seeds },
                }
            }))?;
            instance.schedule_command(Command::new("garden_ripe", "一键催熟"));
            return Ok(());
        }

        instance.update_status(json!({
            "garden": {
                "in_progress": in_progress,
                "finish_time": finish,
                "no_seeds": no_seeds,
            }
        }))?;
        if !in_progress && !no_seeds {
            instance.schedule_command(Command::new(
                "garden",
                format!("一键种植 {}", config.seed_type),
            ));
        }
        if let Some(finish) = finish {
            instance.schedule_command(Command::new("garden", "收获").at(finish));
        }
        Ok(())
    }
}

#[async_trait]
impl CommandHandler for GardenHandler {
    fn category(&self) -> &'static str {
        "garden"
    }

    fn keyword_table(&self) -> &[(&'static str, &'static str)] {
        &[
            ("药园", "garden"),
            ("一键种植", "garden"),
            ("收获", "garden"),
            ("一键催熟", "garden_ripe"),
        ]
    }

    fn response_pattern(&self) -> &ResponsePattern {
        &self.pattern
    }

    async fn handle_response(
        &self,
        command: &Command,
        response: &str,
        instance: &Arc<GameInstance>,
    ) -> Result<()> {
        if command.kind == "garden_ripe" {
            self.handle_ripen(response, instance).await
        } else {
            self.handle_plot(response, instance).await
        }
    }

    async fn handle_error(
        &self,
        command: &Command,
        _error: &AppError,
        _instance: &Arc<GameInstance>,
    ) -> Option<Command> {
        let retries = command.retries + 1;
        (retries < MAX_RETRIES).then(|| Command::new("garden", "药园").with_retries(retries))
    }

    async fn register_scheduler(&self, instance: &Arc<GameInstance>) {
        let Ok(account) = instance.account() else {
            return;
        };
        if !account.config.garden.enabled {
            return;
        }
        if let Some(finish) = account.status.garden.finish_time {
            instance.schedule_command(Command::new("garden", "收获").at(finish));
        } else {
            instance.schedule_command(Command::new("garden", "药园"));
        }
    }
}
