//! Operator-supplied per-account automation parameters.
//!
//! Read-only from the scheduler's perspective at dispatch time; mutated
//! only through the config-patch operation, which deep-merges and then
//! round-trips through these types for validation.

use serde::{Deserialize, Serialize};

/// A local clock time of day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockTime {
    /// Hour, 0-23.
    pub hours: u32,
    /// Minute, 0-59.
    pub minutes: u32,
    /// Second, 0-59.
    pub seconds: u32,
}

impl ClockTime {
    /// Build a clock time.
    #[must_use]
    pub fn new(hours: u32, minutes: u32, seconds: u32) -> Self {
        Self {
            hours,
            minutes,
            seconds,
        }
    }
}

fn clock_noon() -> ClockTime {
    ClockTime::new(12, 0, 0)
}

fn clock_evening() -> ClockTime {
    ClockTime::new(20, 0, 0)
}

/// Paired-meditation settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TantricConfig {
    /// Attempt paired meditation before meditating alone.
    pub enabled: bool,
    /// Partner entity references, in preference order.
    pub targets: Vec<String>,
    /// Fall back to solo meditation when every partner is exhausted.
    pub auto_meditation: bool,
}

/// Meditation automation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeditationConfig {
    /// Run the meditation loop.
    pub enabled: bool,
    /// Daily start time.
    pub time: ClockTime,
    /// Rounds per meditation command.
    pub count: u32,
    /// Paired-meditation settings.
    pub tantric: TantricConfig,
}

impl Default for MeditationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            time: ClockTime::default(),
            count: 1,
            tantric: TantricConfig::default(),
        }
    }
}

fn default_seed() -> String {
    "仙露草种子".to_owned()
}

fn default_ripen_seed() -> String {
    "灵芝种子".to_owned()
}

/// Ripening settings of the garden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RipenConfig {
    /// Spend ripen charges while any remain.
    pub enabled: bool,
    /// Seed planted while ripen charges remain.
    pub seed_type: String,
}

impl Default for RipenConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            seed_type: default_ripen_seed(),
        }
    }
}

/// Garden automation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GardenConfig {
    /// Run the plant/harvest loop.
    pub enabled: bool,
    /// Seed planted outside ripening.
    pub seed_type: String,
    /// Ripening settings.
    pub ripen: RipenConfig,
}

impl Default for GardenConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            seed_type: default_seed(),
            ripen: RipenConfig::default(),
        }
    }
}

fn default_bounty_types() -> Vec<String> {
    [
        "帮扶凡间疾苦",
        "保护我方大殿",
        "保护我方药园",
        "解救被困修士",
        "铲除山贼保护城镇",
        "度化恶灵",
        "铲除妖兽",
        "保护我方岩矿",
        "抵御外族入侵",
        "铲除邪修",
        "寻找空间节点",
        "游历古战场",
        "游历仙灵谷",
        "游历五龙池",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

/// Bounty automation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BountyConfig {
    /// Work the bounty board.
    pub enabled: bool,
    /// Daily start time.
    pub time: ClockTime,
    /// Bounty titles worth accepting, in board order of preference.
    pub bounty_types: Vec<String>,
    /// Manual board refreshes allowed per day.
    pub refresh_limit: u32,
}

impl Default for BountyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            time: ClockTime::default(),
            bounty_types: default_bounty_types(),
            refresh_limit: 0,
        }
    }
}

fn default_skill_priority() -> Vec<String> {
    ["防御", "血量", "攻击", "免伤"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

/// Secret-realm automation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretRealmConfig {
    /// Run the daily realm.
    pub enabled: bool,
    /// Daily entry time.
    pub time: ClockTime,
    /// Skill bonus types in pick order.
    pub skill_type_priority: Vec<String>,
}

impl Default for SecretRealmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            time: clock_evening(),
            skill_type_priority: default_skill_priority(),
        }
    }
}

/// Beast-garden automation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZooConfig {
    /// Run the daily beast garden.
    pub enabled: bool,
    /// Daily entry time.
    pub time: ClockTime,
    /// Allow the escape tactic against boss waves.
    pub auto_escape: bool,
}

impl Default for ZooConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            time: clock_evening(),
            auto_escape: true,
        }
    }
}

fn default_pond_levels() -> Vec<u32> {
    vec![5, 1]
}

/// Fishing automation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FishingConfig {
    /// Run the daily ponds.
    pub enabled: bool,
    /// Daily entry time.
    pub time: ClockTime,
    /// Pond levels to fish, in order.
    pub levels: Vec<u32>,
}

impl Default for FishingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            time: clock_noon(),
            levels: default_pond_levels(),
        }
    }
}

/// Full per-account automation config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Meditation settings.
    pub meditation: MeditationConfig,
    /// Garden settings.
    pub garden: GardenConfig,
    /// Bounty settings.
    pub bounty: BountyConfig,
    /// Secret-realm settings.
    pub secret_realm: SecretRealmConfig,
    /// Beast-garden settings.
    pub zoo: ZooConfig,
    /// Fishing settings.
    pub fishing: FishingConfig,
}
