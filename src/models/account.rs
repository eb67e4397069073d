//! Account record: the unit of persistence.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::config::AccountConfig;
use crate::models::status::AccountStatus;

/// One captured HTTP call shape (url, method, headers, body template).
///
/// Produced by the external session-capture flow; replayed verbatim by
/// the transport with only the sequence window / message payload
/// substituted into the body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallTemplate {
    /// Request URL.
    pub url: String,
    /// HTTP method.
    pub method: String,
    /// Headers to replay.
    pub headers: HashMap<String, String>,
    /// JSON body template.
    pub body: Option<String>,
}

/// Captured session material for one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionParams {
    /// Template for the "send message" call.
    pub send: CallTemplate,
    /// Template for the "receive messages" poll call.
    pub receive: CallTemplate,
    /// Stable participant identifier inside the channel.
    pub participant_id: String,
    /// When the captured credentials expire.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Bookkeeping outside status/config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountMetadata {
    /// Last status mutation time, drives the daily reset check.
    pub last_update: Option<DateTime<Utc>>,
}

/// Persisted account record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Account {
    /// Stable account identifier.
    pub id: String,
    /// Feature progress snapshot.
    pub status: AccountStatus,
    /// Automation parameters.
    pub config: AccountConfig,
    /// Captured session material, when present.
    pub session: Option<SessionParams>,
    /// Bookkeeping.
    pub metadata: AccountMetadata,
    /// Whether a live instance is attached (never persisted as true).
    pub online: bool,
}

impl Account {
    /// Fresh record with default status and config.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}
