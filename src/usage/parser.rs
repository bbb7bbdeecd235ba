//! Decoder for the `/api/oauth/usage` payload
//!
//! The body is decoded into an explicit schema where every field tolerates
//! being absent, null, or the wrong type. A bad field only loses itself;
//! only a body that is not a JSON object fails the parse.

use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use thiserror::Error;

use super::time_math::{format_absolute_reset, DisplayZone, ResetStyle};
use super::{UsageSnapshot, NO_SEPARATE_LIMIT};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("usage body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("usage body is not a JSON object")]
    NotAnObject,
}

/// Decoded usage response
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UsagePayload {
    #[serde(default, deserialize_with = "lenient")]
    pub five_hour: Option<UsageWindow>,
    #[serde(default, deserialize_with = "lenient")]
    pub seven_day: Option<UsageWindow>,
    #[serde(default, deserialize_with = "lenient")]
    pub seven_day_sonnet: Option<UsageWindow>,
    #[serde(default, deserialize_with = "lenient")]
    pub seven_day_opus: Option<UsageWindow>,
    #[serde(default, deserialize_with = "lenient")]
    pub seven_day_haiku: Option<UsageWindow>,
    #[serde(default, deserialize_with = "lenient")]
    pub extra_usage: Option<ExtraUsage>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UsageWindow {
    #[serde(default, deserialize_with = "lenient")]
    pub utilization: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub resets_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExtraUsage {
    #[serde(default, deserialize_with = "lenient")]
    pub is_enabled: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    pub amount_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub utilization: Option<f64>,
}

/// Treat a value of the wrong shape as absent instead of failing the parent
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

pub fn parse_usage_body(body: &[u8]) -> Result<UsagePayload, ParseError> {
    let value: serde_json::Value = serde_json::from_slice(body)?;
    if !value.is_object() {
        return Err(ParseError::NotAnObject);
    }
    serde_json::from_value(value).map_err(|_| ParseError::NotAnObject)
}

/// Utilization percentages arrive as floats and are truncated
fn percent(utilization: f64) -> u8 {
    utilization.clamp(0.0, 100.0) as u8
}

impl UsagePayload {
    /// Write this payload into the snapshot.
    ///
    /// Session and weekly cards keep their previous percentage when the window
    /// is present without a utilization; a missing window leaves them alone.
    /// Opus/haiku percentages and overage fields fall back to zero values.
    pub fn apply_to(&self, snapshot: &mut UsageSnapshot, zone: DisplayZone) {
        if let Some(window) = &self.five_hour {
            if let Some(utilization) = window.utilization {
                snapshot.session.used = percent(utilization);
            }
            snapshot.session_resets_at = window.resets_at.clone();
            snapshot.session.reset_time =
                format_absolute_reset(window.resets_at.as_deref(), ResetStyle::Time, zone);
        }

        if let Some(window) = &self.seven_day {
            if let Some(utilization) = window.utilization {
                snapshot.week_all.used = percent(utilization);
            }
            snapshot.weekly_resets_at = window.resets_at.clone();
            snapshot.week_all.reset_time =
                format_absolute_reset(window.resets_at.as_deref(), ResetStyle::DateTime, zone);
        }

        match &self.seven_day_sonnet {
            Some(window) => {
                if let Some(utilization) = window.utilization {
                    snapshot.week_sonnet.used = percent(utilization);
                }
                snapshot.week_sonnet.reset_time =
                    format_absolute_reset(window.resets_at.as_deref(), ResetStyle::DateTime, zone);
            }
            None => {
                snapshot.week_sonnet.used = 0;
                snapshot.week_sonnet.reset_time = NO_SEPARATE_LIMIT.to_string();
            }
        }

        snapshot.opus_usage = bare_percent(self.seven_day_opus.as_ref());
        snapshot.haiku_usage = bare_percent(self.seven_day_haiku.as_ref());

        let extra = self.extra_usage.clone().unwrap_or_default();
        snapshot.overage.enabled = extra.is_enabled.unwrap_or(false);
        snapshot.overage.amount_usd = extra.amount_usd.unwrap_or(0.0);
        snapshot.overage.percent = extra.utilization.map(percent).unwrap_or(0);
    }
}

fn bare_percent(window: Option<&UsageWindow>) -> u8 {
    window
        .and_then(|w| w.utilization)
        .map(percent)
        .unwrap_or(0)
}
