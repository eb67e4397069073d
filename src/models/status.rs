//! Per-account feature progress snapshots.
//!
//! Handlers publish derived facts here through the deep-merge
//! `update_status` contract; every field therefore tolerates being
//! absent, partially patched, or cleared with `null`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reference to another participant as the game addresses them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerRef {
    /// Display name.
    pub name: String,
    /// Opaque mention reference.
    pub entity_ref: String,
}

/// Character identity and level readout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalInfo {
    /// Last parsed character level.
    pub level: Option<u32>,
    /// Own display name.
    pub name: Option<String>,
    /// Own mention reference (used for cross-account lookup).
    pub entity_ref: Option<String>,
}

/// Meditation / paired-meditation progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeditationStatus {
    /// A meditation round is running.
    pub in_progress: bool,
    /// When the running round completes.
    pub finish_time: Option<DateTime<Utc>>,
    /// Daily attempts are used up.
    pub exhausted: bool,
    /// Current pairing partner, while a paired round is being set up.
    pub target: Option<PeerRef>,
}

/// Ripening sub-state of the garden.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RipenStatus {
    /// Remaining ripen charges today.
    pub ripe_count: Option<u32>,
    /// Out of ripen-grade seeds.
    pub no_seeds: bool,
}

/// Garden planting progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GardenStatus {
    /// A crop is growing.
    pub in_progress: bool,
    /// Estimated harvest time.
    pub finish_time: Option<DateTime<Utc>>,
    /// Out of seeds.
    pub no_seeds: bool,
    /// Ripening sub-state.
    pub ripen: RipenStatus,
}

/// Sect bounty board progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BountyStatus {
    /// Bounties accepted today.
    pub accepted: Option<u32>,
    /// Daily acceptance limit.
    pub limit: Option<u32>,
    /// Next board auto-refresh time.
    pub update_time: Option<DateTime<Utc>>,
    /// When accepted bounties become claimable.
    pub claim_times: Vec<DateTime<Utc>>,
    /// Manual refreshes spent today.
    pub refresh_count: u32,
}

/// Chosen realm skill, parsed from the selection prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillChoice {
    /// Option index offered by the game (1-3).
    pub index: u32,
    /// Skill name.
    pub name: String,
    /// Skill bonus type.
    pub kind: String,
    /// Bonus magnitude.
    pub strength: u32,
}

/// Secret-realm run progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretRealmStatus {
    /// A run is underway.
    pub in_progress: bool,
    /// Today's run is complete.
    pub is_finished: bool,
    /// Last reported monster tier.
    pub monster_level: Option<String>,
    /// Last skill selection.
    pub skill: Option<SkillChoice>,
}

/// Beast-garden run progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZooStatus {
    /// A run is underway.
    pub in_progress: bool,
    /// Today's run is complete.
    pub is_finished: bool,
    /// Beasts left in the current wave.
    pub remaining: Option<u32>,
    /// Last tactical choice sent.
    pub choice: Option<String>,
    /// Consecutive escapes this run (caps the escape tactic).
    pub escape_count: u32,
}

/// Fishing session progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FishingStatus {
    /// Currently inside a pond.
    pub in_progress: bool,
    /// Ponds completed today.
    pub finished_count: u32,
    /// Remaining bait.
    pub bait: Option<u32>,
    /// Spot with active bites, when one was reported.
    pub position: Option<u32>,
    /// When to pull the rod.
    pub pull_time: Option<DateTime<Utc>>,
}

/// Full per-account status tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountStatus {
    /// Character identity and level.
    pub personal_info: PersonalInfo,
    /// Meditation progress.
    pub meditation: MeditationStatus,
    /// Garden progress.
    pub garden: GardenStatus,
    /// Bounty board progress.
    pub bounty: BountyStatus,
    /// Secret-realm progress.
    pub secret_realm: SecretRealmStatus,
    /// Beast-garden progress.
    pub zoo: ZooStatus,
    /// Fishing progress.
    pub fishing: FishingStatus,
}
