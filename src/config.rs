//! Global configuration parsing and validation.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::models::MessageToken;
use crate::{AppError, Result};

fn default_http_port() -> u16 {
    3000
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("accounts.json")
}

fn default_mention_text() -> String {
    "@唐诗修仙".to_owned()
}

fn default_mention_ref() -> Option<String> {
    Some("GAIovIWNpPKAgIAC".to_owned())
}

/// Head token addressing the game bot, prefixed to every send.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct MentionConfig {
    /// Visible mention text.
    pub text: String,
    /// Opaque mention reference captured from the channel.
    pub entity_ref: Option<String>,
}

impl Default for MentionConfig {
    fn default() -> Self {
        Self {
            text: default_mention_text(),
            entity_ref: default_mention_ref(),
        }
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct GlobalConfig {
    /// Port for the operator HTTP API.
    pub http_port: u16,
    /// Path of the persisted account document.
    pub storage_path: PathBuf,
    /// Game bot mention settings.
    pub mention: MentionConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            storage_path: default_storage_path(),
            mention: MentionConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Parse from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] on parse or validation failure.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file; a missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] when the file exists but cannot be
    /// read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("cannot read config: {err}")))?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<()> {
        if self.mention.text.is_empty() {
            return Err(AppError::Config("mention.text must not be empty".into()));
        }
        Ok(())
    }

    /// The mention head token in message form.
    #[must_use]
    pub fn mention_token(&self) -> MessageToken {
        MessageToken {
            text: self.mention.text.clone(),
            entity_ref: self.mention.entity_ref.clone(),
        }
    }
}
