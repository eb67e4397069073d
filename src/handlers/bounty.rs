//! Sect bounty board: accept preferred bounties, refresh or accelerate
//! when the board stalls, claim finished rewards on time.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::json;

use crate::handlers::named_u32;
use crate::instance::GameInstance;
use crate::models::Command;
use crate::scheduler::{CommandHandler, ResponsePattern};
use crate::timeutil;
use crate::{AppError, Result};

const MAX_RETRIES: u32 = 3;
/// The board holds at most this many running bounties.
const BOARD_SLOTS: i64 = 3;

/// Handler for the bounty board.
pub struct BountyHandler {
    pattern: ResponsePattern,
    counters: Regex,
    update_time: Regex,
    time_left: Regex,
    claimable: Regex,
}

impl BountyHandler {
    /// Compile the handler's patterns.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] when a pattern fails to compile.
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: ResponsePattern::per_type(&[
                ("bounty", "已领任务"),
                ("bounty_claim", "领宗门悬赏成功"),
                ("bounty_accept", "接收悬赏成功"),
                ("bounty_refresh", "刷新成功"),
                ("bounty_accelerate", "已完成加速"),
            ])?,
            counters: Regex::new(r"(?<accepted>\d+)/(?<limit>\d+)")?,
            update_time: Regex::new(
                r"下次自动刷新时间:.*?(?<hours>\d+):(?<minutes>\d+):(?<seconds>\d+)",
            )?,
            time_left: Regex::new(r"剩余(?<minutes>\d+)分钟")?,
            claimable: Regex::new("待领奖励")?,
        })
    }

    async fn handle_board(&self, response: &str, instance: &Arc<GameInstance>) -> Result<()> {
        let account = instance.account()?;
        let config = account.config.bounty;

        let caps = self
            .counters
            .captures(response)
            .ok_or_else(|| AppError::Response("bounty counters missing".into()))?;
        let accepted = named_u32(&caps, "accepted")
            .ok_or_else(|| AppError::Response("bounty counters missing".into()))?;
        let limit = named_u32(&caps, "limit")
            .ok_or_else(|| AppError::Response("bounty counters missing".into()))?;
        let finished = accepted == limit;

        let tomorrow = timeutil::at_clock(&config.time, Some(1));
        let update_time = if finished {
            tomorrow
        } else {
            timeutil::parse_clock(response, &self.update_time)
                .map_or(tomorrow, |board| timeutil::min_date(board, tomorrow))
        };

        let mut claim_times: Vec<DateTime<Utc>> = Vec::new();
        for _ in self.claimable.find_iter(response) {
            claim_times.push(Utc::now());
        }
        for found in self.time_left.find_iter(response) {
            if let Some(at) = timeutil::parse_clock(found.as_str(), &self.time_left) {
                claim_times.push(at);
            }
        }
        let running = i64::try_from(claim_times.len()).unwrap_or(BOARD_SLOTS);
        let claim_time = claim_times.iter().min().copied();

        // The acceptable-bounty pattern depends on operator config, so
        // it is built per response rather than at startup.
        let accept_pattern = Regex::new(&format!(
            r"(?<next>\d+):({}).*\n+.*需要时间",
            config.bounty_types.join("|")
        ))
        .map_err(|err| AppError::Response(format!("bounty accept pattern: {err}")))?;
        let next = accept_pattern
            .captures(response)
            .and_then(|caps| caps.name("next").map(|m| m.as_str().to_owned()));

        instance.update_status(json!({
            "bounty": {
                "accepted": accepted,
                "limit": limit,
                "update_time": update_time,
                "claim_times": claim_times,
            }
        }))?;

        let refreshes_today = timeutil::same_local_day(update_time, Utc::now());
        if !finished && !refreshes_today {
            let remaining = i64::from(limit) - i64::from(accepted);
            if BOARD_SLOTS - running < remaining && remaining <= BOARD_SLOTS {
                instance.schedule_command(Command::new("bounty_accelerate", "加速完成宗门悬赏"));
            } else if let Some(next) = next {
                instance.schedule_command(Command::new("bounty_accept", format!("接宗门悬赏 {next}")));
            } else if account.status.bounty.refresh_count < config.refresh_limit {
                instance.schedule_command(Command::new("bounty_refresh", "刷新宗门悬赏"));
            }
        } else if !finished && running < BOARD_SLOTS {
            if let Some(next) = next {
                instance.schedule_command(Command::new("bounty_accept", format!("接宗门悬赏 {next}")));
            }
        }
        if let Some(claim_time) = claim_time {
            instance.schedule_command(Command::new("bounty_claim", "领宗门悬赏").at(claim_time));
        }
        Ok(())
    }
}

#[async_trait]
impl CommandHandler for BountyHandler {
    fn category(&self) -> &'static str {
        "bounty"
    }

    fn keyword_table(&self) -> &[(&'static str, &'static str)] {
        &[
            ("查看宗门悬赏", "bounty"),
            ("领宗门悬赏", "bounty_claim"),
            ("接宗门悬赏", "bounty_accept"),
            ("刷新宗门悬赏", "bounty_refresh"),
            ("加速完成宗门悬赏", "bounty_accelerate"),
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
        match command.kind.as_str() {
            "bounty" => self.handle_board(response, instance).await?,
            "bounty_refresh" => {
                let refresh_count = instance.account()?.status.bounty.refresh_count + 1;
                instance.update_status(json!({
                    "bounty": { "refresh_count": refresh_count, "update_time": null }
                }))?;
            }
            _ => {
                instance.update_status(json!({ "bounty": { "update_time": null } }))?;
            }
        }
        self.register_scheduler(instance).await;
        Ok(())
    }

    async fn handle_error(
        &self,
        command: &Command,
        _error: &AppError,
        _instance: &Arc<GameInstance>,
    ) -> Option<Command> {
        let retries = command.retries + 1;
        (retries < MAX_RETRIES).then(|| Command::new("bounty", "查看宗门悬赏").with_retries(retries))
    }

    async fn register_scheduler(&self, instance: &Arc<GameInstance>) {
        let Ok(account) = instance.account() else {
            return;
        };
        if !account.config.bounty.enabled {
            return;
        }
        let mut probe = Command::new("bounty", "查看宗门悬赏");
        probe.date = account.status.bounty.update_time;
        instance.schedule_command(probe);
    }
}
