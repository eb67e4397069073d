//! Meditation loop, including the reciprocal paired flow.
//!
//! Pairing coordinates two accounts: the requester asks a partner,
//! the partner accepts, both absorb when the round finishes. The
//! partner side is reached exclusively through the instance directory's
//! restricted handle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use crate::instance::GameInstance;
use crate::models::{Command, CommandBody, MessageToken};
use crate::scheduler::{CommandHandler, ResponsePattern};
use crate::timeutil;
use crate::{AppError, Result};

const MAX_RETRIES: u32 = 3;
const STEP_DELAY: Duration = Duration::from_millis(1000);

/// Handler for solo and paired meditation.
pub struct MeditationHandler {
    pattern: ResponsePattern,
    finish: Regex,
    request_absorb: Regex,
    exhausted: Regex,
}

impl MeditationHandler {
    /// Compile the handler's patterns.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] when a pattern fails to compile.
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: ResponsePattern::per_type(&[
                (
                    "meditation",
                    "请等待(打坐|双修|双休)完成|吸收灵力成功|你还没有打坐|需要消耗次数",
                ),
                (
                    "meditation_tantric",
                    "想和你一起双休|已经发起一个双休请求|请对方先吸收|需要消耗次数",
                ),
                (
                    "meditation_tantric_accept",
                    "一起双休中|没找到你要同意的双休请求",
                ),
            ])?,
            finish: Regex::new(r"(?<hours>\d+)时(?<minutes>\d+)分(?<seconds>\d+)秒")?,
            request_absorb: Regex::new("请对方先吸收")?,
            exhausted: Regex::new("需要消耗次数")?,
        })
    }

    async fn handle_pair_request(
        &self,
        command: &Command,
        response: &str,
        instance: &Arc<GameInstance>,
    ) -> Result<()> {
        let account = instance.account()?;
        let exhausted = self.exhausted.is_match(response);
        instance.update_status(json!({ "meditation": { "exhausted": exhausted } }))?;
        if exhausted {
            self.register_scheduler(instance).await;
            return Ok(());
        }

        let target = account
            .status
            .meditation
            .target
            .ok_or_else(|| AppError::Response("no pairing target recorded".into()))?;
        let partner = instance
            .directory()
            .find_by_entity_ref(&target.entity_ref)
            .ok_or_else(|| AppError::Response("pairing partner not online".into()))?;

        if self.request_absorb.is_match(response) {
            // Partner must absorb its previous round first, then we
            // re-issue the request.
            partner.schedule_command(Command::new("meditation", "吸收灵力"));
            instance.schedule_command_delayed(command.clone(), STEP_DELAY);
        } else {
            let me = account.status.personal_info;
            partner.update_status(json!({
                "meditation": {
                    "target": {
                        "name": me.name.unwrap_or_default(),
                        "entity_ref": me.entity_ref.unwrap_or_default(),
                    }
                }
            }))?;
            partner.schedule_command(Command::new("meditation_tantric_accept", "同意双休"));
        }
        Ok(())
    }

    async fn handle_pair_accept(
        &self,
        response: &str,
        instance: &Arc<GameInstance>,
    ) -> Result<()> {
        let Some(finish) = timeutil::parse_clock(response, &self.finish) else {
            return Ok(());
        };
        let account = instance.account()?;
        let progress = json!({
            "meditation": { "in_progress": true, "finish_time": finish, "exhausted": false }
        });
        instance.update_status(progress.clone())?;
        instance.schedule_command(Command::new("meditation", "吸收灵力").at(finish));
        let requester = account
            .status
            .meditation
            .target
            .and_then(|t| instance.directory().find_by_entity_ref(&t.entity_ref));
        if let Some(requester) = requester {
            requester.update_status(progress)?;
            requester.schedule_command(Command::new("meditation", "吸收灵力").at(finish));
        }
        Ok(())
    }

    async fn handle_round(
        &self,
        response: &str,
        instance: &Arc<GameInstance>,
    ) -> Result<()> {
        let account = instance.account()?;
        let config = account.config.meditation.clone();
        let finish = timeutil::parse_clock(response, &self.finish);
        let in_progress = finish.is_some();
        let exhausted = self.exhausted.is_match(response);
        instance.update_status(json!({
            "meditation": {
                "in_progress": in_progress,
                "finish_time": finish,
                "exhausted": exhausted,
            }
        }))?;

        if config.enabled && !in_progress && !exhausted {
            instance.update_status(json!({ "meditation": { "target": null } }))?;
            if config.tantric.enabled {
                if let Some((name, entity_ref)) = self.pick_partner(instance, &config.tantric.targets) {
                    instance.update_status(json!({
                        "meditation": {
                            "target": { "name": name.clone(), "entity_ref": entity_ref.clone() }
                        }
                    }))?;
                    instance.schedule_command(Command::new(
                        "meditation_tantric",
                        CommandBody::Tokens(vec![
                            MessageToken::plain("双休"),
                            MessageToken::mention(name, entity_ref),
                            MessageToken::plain(config.count.to_string()),
                        ]),
                    ));
                } else if config.tantric.auto_meditation {
                    instance
                        .schedule_command(Command::new("meditation", format!("打坐 {}", config.count)));
                }
            } else {
                instance
                    .schedule_command(Command::new("meditation", format!("打坐 {}", config.count)));
            }
        }

        if let Some(finish) = finish {
            instance.schedule_command(Command::new("meditation", "吸收灵力").at(finish));
            let partner = account
                .status
                .meditation
                .target
                .and_then(|t| instance.directory().find_by_entity_ref(&t.entity_ref));
            if let Some(partner) = partner {
                partner.update_status(json!({
                    "meditation": { "in_progress": true, "finish_time": finish, "exhausted": false }
                }))?;
                partner.schedule_command(Command::new("meditation", "吸收灵力").at(finish));
            }
        }

        if exhausted {
            self.register_scheduler(instance).await;
        }
        Ok(())
    }

    // First configured partner that is online and not exhausted.
    fn pick_partner(
        &self,
        instance: &Arc<GameInstance>,
        targets: &[String],
    ) -> Option<(String, String)> {
        for entity_ref in targets {
            let Some(handle) = instance.directory().find_by_entity_ref(entity_ref) else {
                continue;
            };
            let Ok(peer) = instance.accounts().get(handle.account_id()) else {
                continue;
            };
            if peer.status.meditation.exhausted {
                continue;
            }
            let info = peer.status.personal_info;
            return Some((
                info.name.unwrap_or_default(),
                info.entity_ref.unwrap_or_else(|| entity_ref.clone()),
            ));
        }
        None
    }
}

#[async_trait]
impl CommandHandler for MeditationHandler {
    fn category(&self) -> &'static str {
        "meditation"
    }

    fn keyword_table(&self) -> &[(&'static str, &'static str)] {
        &[
            ("打坐", "meditation"),
            ("吸收灵力", "meditation"),
            ("双休", "meditation_tantric"),
            ("同意双休", "meditation_tantric_accept"),
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
            "meditation_tantric" => self.handle_pair_request(command, response, instance).await,
            "meditation_tantric_accept" => self.handle_pair_accept(response, instance).await,
            _ => self.handle_round(response, instance).await,
        }
    }

    async fn handle_error(
        &self,
        command: &Command,
        _error: &AppError,
        _instance: &Arc<GameInstance>,
    ) -> Option<Command> {
        let retries = command.retries + 1;
        (retries < MAX_RETRIES)
            .then(|| Command::new("meditation", "吸收灵力").with_retries(retries))
    }

    async fn register_scheduler(&self, instance: &Arc<GameInstance>) {
        let Ok(account) = instance.account() else {
            return;
        };
        let config = &account.config.meditation;
        if let Some(finish) = account.status.meditation.finish_time {
            instance.schedule_command(Command::new("meditation", "吸收灵力").at(finish));
        } else if config.enabled {
            let day_offset = i64::from(account.status.meditation.exhausted);
            instance.schedule_command(
                Command::new("meditation", "吸收灵力")
                    .at(timeutil::at_clock(&config.time, Some(day_offset))),
            );
        }
    }
}
