//! Secret-realm run: enter, then pick a skill per floor until cleared.
//!
//! Entry depth depends on the live level readout, so the enter command
//! carries a deferred body resolved at send time.

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
// Floor selection has a long prompt chain; the game tolerates many
// re-selects before the run expires.
const MAX_SELECT_RETRIES: u32 = 20;
const STEP_DELAY: Duration = Duration::from_millis(1000);

/// Handler for the secret-realm run.
pub struct SecretRealmHandler {
    pattern: ResponsePattern,
    monster: Regex,
    entered: Regex,
    skill: Regex,
}

impl SecretRealmHandler {
    /// Compile the handler's patterns.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] when a pattern fails to compile.
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: ResponsePattern::shared(
                "注意选择合适的技能|仅可进入秘境1次|可以选择以下技能|今日本层秘境魔物已全部清除|秘境选择已过期|已进入秘境",
            )?,
            monster: Regex::new("魔物境界:(?<level>.*)")?,
            entered: Regex::new("已进入秘境")?,
            skill: Regex::new(
                r"(?<index>\d+):(?<name>[^\(]*)\((?<kind>[^\+]*)\+(?<strength>\d+)[%次]\)",
            )?,
        })
    }
}

#[async_trait]
impl CommandHandler for SecretRealmHandler {
    fn category(&self) -> &'static str {
        "realm"
    }

    fn keyword_table(&self) -> &[(&'static str, &'static str)] {
        &[("进入秘境", "realm_enter"), ("秘境选择", "realm_select")]
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
        let config = instance.account()?.config.secret_realm;

        if let Some(caps) = self.monster.captures(response) {
            let monster_level = caps
                .name("level")
                .map(|m| m.as_str().trim().to_owned())
                .unwrap_or_default();
            let skills: Vec<_> = self
                .skill
                .captures_iter(response)
                .filter_map(|caps| {
                    Some((
                        named_u32(&caps, "index")?,
                        caps.name("name")?.as_str().trim().to_owned(),
                        caps.name("kind")?.as_str().trim().to_owned(),
                        named_u32(&caps, "strength")?,
                    ))
                })
                .collect();
            let (index, name, kind, strength) = config
                .skill_type_priority
                .iter()
                .find_map(|wanted| skills.iter().find(|(_, _, kind, _)| kind == wanted))
                .cloned()
                .ok_or_else(|| AppError::Response("no selectable skill offered".into()))?;
            instance.update_status(json!({
                "secret_realm": {
                    "in_progress": true,
                    "is_finished": false,
                    "monster_level": monster_level,
                    "skill": { "index": index, "name": name, "kind": kind, "strength": strength },
                }
            }))?;
            instance.schedule_command_delayed(
                Command::new("realm_select", format!("秘境选择 {index}")),
                STEP_DELAY,
            );
        } else if self.entered.is_match(response) {
            instance.update_status(json!({
                "secret_realm": {
                    "in_progress": true,
                    "is_finished": false,
                    "monster_level": null,
                    "skill": null,
                }
            }))?;
            instance.schedule_command_delayed(
                Command::new("realm_select", "秘境选择 1"),
                STEP_DELAY,
            );
        } else {
            instance.update_status(json!({
                "secret_realm": {
                    "in_progress": false,
                    "is_finished": true,
                    "monster_level": null,
                    "skill": null,
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
        let cap = if command.kind == "realm_select" {
            MAX_SELECT_RETRIES
        } else {
            MAX_RETRIES
        };
        (retries < cap).then(|| command.clone().with_retries(retries))
    }

    async fn register_scheduler(&self, instance: &Arc<GameInstance>) {
        let Ok(account) = instance.account() else {
            return;
        };
        let config = account.config.secret_realm;
        if !config.enabled {
            return;
        }
        let day_offset = i64::from(account.status.secret_realm.is_finished);
        instance.schedule_command(
            Command::new(
                "realm_enter",
                CommandBody::deferred(|instance: Arc<GameInstance>| async move {
                    let level = instance.wait_for_level_update().await?;
                    Ok(format!("进入秘境 {}", level.saturating_sub(28) / 18))
                }),
            )
            .at(timeutil::at_clock(&config.time, Some(day_offset))),
        );
    }
}
