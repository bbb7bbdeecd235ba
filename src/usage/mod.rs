//! Usage data model shared by the sync engine and the display layer

pub mod parser;
pub mod status;
pub mod time_math;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use parser::{parse_usage_body, UsagePayload};
pub use status::{ConnectionStatus, SyncError};
pub use time_math::{CountdownPolicy, CountdownScale, DisplayZone, ResetStyle};

/// Label shown before the first fetch completes
pub const LOADING_LABEL: &str = "Loading...";
/// Reset label for the sonnet card when the plan has no per-model limit
pub const NO_SEPARATE_LIMIT: &str = "No separate limit";

/// One usage card: percentage used plus a formatted reset label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetric {
    pub used: u8,
    pub reset_time: String,
}

impl Default for UsageMetric {
    fn default() -> Self {
        Self {
            used: 0,
            reset_time: LOADING_LABEL.to_string(),
        }
    }
}

/// Subscription tier read from the credential store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Pro,
    Max,
}

impl SubscriptionTier {
    /// Map a `subscriptionType` hint; anything unrecognised is `Free`.
    pub fn from_hint(hint: Option<&str>) -> Self {
        match hint.map(|h| h.trim().to_ascii_lowercase()).as_deref() {
            Some("max") => SubscriptionTier::Max,
            Some("pro") => SubscriptionTier::Pro,
            _ => SubscriptionTier::Free,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "Free",
            SubscriptionTier::Pro => "Pro",
            SubscriptionTier::Max => "Max",
        }
    }

    pub fn has_opus_access(&self) -> bool {
        matches!(self, SubscriptionTier::Pro | SubscriptionTier::Max)
    }

    /// Only Max plans carry separate weekly limits per model
    pub fn has_separate_model_limits(&self) -> bool {
        matches!(self, SubscriptionTier::Max)
    }

    /// Model assumed when neither settings nor override file name one
    pub fn default_model(&self) -> ActiveModel {
        match self {
            SubscriptionTier::Free | SubscriptionTier::Pro => ActiveModel::Sonnet,
            SubscriptionTier::Max => ActiveModel::Opus,
        }
    }
}

/// Model the user is currently working with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveModel {
    Opus,
    #[default]
    Sonnet,
    Haiku,
}

impl ActiveModel {
    /// Parse a full model name as found in `settings.json`
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "opus" => Some(ActiveModel::Opus),
            "sonnet" => Some(ActiveModel::Sonnet),
            "haiku" => Some(ActiveModel::Haiku),
            _ => None,
        }
    }

    /// Parse the override file, which also accepts single letters
    pub fn from_override(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "opus" | "o" => Some(ActiveModel::Opus),
            "sonnet" | "s" => Some(ActiveModel::Sonnet),
            "haiku" | "h" => Some(ActiveModel::Haiku),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ActiveModel::Opus => "Ⓞ",
            ActiveModel::Sonnet => "Ⓢ",
            ActiveModel::Haiku => "Ⓗ",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ActiveModel::Opus => "Opus",
            ActiveModel::Sonnet => "Sonnet",
            ActiveModel::Haiku => "Haiku",
        }
    }
}

/// Bearer token plus its expiry, held only for the duration of one fetch
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    /// Epoch seconds
    pub expires_at: i64,
}

impl Credentials {
    /// Build from the store's millisecond expiry
    pub fn from_millis(access_token: String, expires_at_ms: i64) -> Self {
        Self {
            access_token,
            expires_at: expires_at_ms / 1000,
        }
    }

    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.expires_at < now.timestamp()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Pay-per-use spending beyond the plan limits
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overage {
    pub enabled: bool,
    pub amount_usd: f64,
    pub percent: u8,
}

/// Everything the display layer reads. Created once with loading values and
/// mutated in place by fetch cycles and UI ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub session: UsageMetric,
    pub week_all: UsageMetric,
    pub week_sonnet: UsageMetric,
    pub opus_usage: u8,
    pub haiku_usage: u8,
    pub overage: Overage,
    /// Raw `resets_at` values, kept so countdowns can be recomputed each tick
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_resets_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly_resets_at: Option<String>,
    /// Short countdowns for the menu bar ("<3h", ">2d")
    pub session_countdown: String,
    pub weekly_countdown: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub status: ConnectionStatus,
    pub active_model: ActiveModel,
    pub subscription_tier: SubscriptionTier,
}

impl Default for UsageSnapshot {
    fn default() -> Self {
        Self {
            session: UsageMetric::default(),
            week_all: UsageMetric::default(),
            week_sonnet: UsageMetric::default(),
            opus_usage: 0,
            haiku_usage: 0,
            overage: Overage::default(),
            session_resets_at: None,
            weekly_resets_at: None,
            session_countdown: time_math::UNKNOWN_COUNTDOWN.to_string(),
            weekly_countdown: time_math::UNKNOWN_COUNTDOWN.to_string(),
            last_updated: None,
            last_error: None,
            status: ConnectionStatus::Connecting,
            active_model: ActiveModel::default(),
            subscription_tier: SubscriptionTier::default(),
        }
    }
}

impl UsageSnapshot {
    /// Recompute both countdowns from the stored raw timestamps
    pub fn refresh_countdowns(&mut self, now: chrono::DateTime<chrono::Utc>, policy: CountdownPolicy) {
        self.session_countdown = time_math::countdown_label(
            self.session_resets_at.as_deref(),
            now,
            CountdownScale::Session,
            policy,
        );
        self.weekly_countdown = time_math::countdown_label(
            self.weekly_resets_at.as_deref(),
            now,
            CountdownScale::Weekly,
            policy,
        );
    }

    /// Highest percentage across the tracked cards
    pub fn max_usage(&self) -> u8 {
        self.session
            .used
            .max(self.week_all.used)
            .max(self.week_sonnet.used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn separate_model_limits_only_for_max() {
        assert!(!SubscriptionTier::Free.has_separate_model_limits());
        assert!(!SubscriptionTier::Pro.has_separate_model_limits());
        assert!(SubscriptionTier::Max.has_separate_model_limits());
    }

    #[test]
    fn opus_access_for_paid_tiers() {
        assert!(!SubscriptionTier::Free.has_opus_access());
        assert!(SubscriptionTier::Pro.has_opus_access());
        assert!(SubscriptionTier::Max.has_opus_access());
    }

    #[test]
    fn tier_hint_defaults_to_free() {
        assert_eq!(SubscriptionTier::from_hint(Some("MAX")), SubscriptionTier::Max);
        assert_eq!(SubscriptionTier::from_hint(Some("pro")), SubscriptionTier::Pro);
        assert_eq!(SubscriptionTier::from_hint(Some("team")), SubscriptionTier::Free);
        assert_eq!(SubscriptionTier::from_hint(None), SubscriptionTier::Free);
    }

    #[test]
    fn override_accepts_single_letters() {
        assert_eq!(ActiveModel::from_override(" O\n"), Some(ActiveModel::Opus));
        assert_eq!(ActiveModel::from_override("s"), Some(ActiveModel::Sonnet));
        assert_eq!(ActiveModel::from_override("Haiku"), Some(ActiveModel::Haiku));
        assert_eq!(ActiveModel::from_override("gpt"), None);
        // settings.json only takes full names
        assert_eq!(ActiveModel::from_name("o"), None);
    }

    #[test]
    fn credentials_expiry_uses_seconds() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let past = Credentials::from_millis("t".into(), (now.timestamp() - 1) * 1000);
        let future = Credentials::from_millis("t".into(), (now.timestamp() + 60) * 1000);
        assert!(past.is_expired(now));
        assert!(!future.is_expired(now));
    }

    #[test]
    fn credentials_debug_hides_token() {
        let creds = Credentials::from_millis("sk-secret".into(), 0);
        assert!(!format!("{:?}", creds).contains("sk-secret"));
    }

    #[test]
    fn default_snapshot_is_loading() {
        let snapshot = UsageSnapshot::default();
        assert_eq!(snapshot.status, ConnectionStatus::Connecting);
        assert_eq!(snapshot.session.reset_time, LOADING_LABEL);
        assert_eq!(snapshot.session_countdown, "--");
    }
}
