//! Countdown and reset-time formatting
//!
//! Everything here is pure: callers pass `now` explicitly so the UI tick can
//! recompute labels every second without touching the network.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Countdown shown when no reset timestamp is known
pub const UNKNOWN_COUNTDOWN: &str = "--";
/// Absolute reset label when the timestamp is missing or unparsable
pub const UNKNOWN_RESET: &str = "Unknown";

const SECS_PER_MINUTE: i64 = 60;
const SECS_PER_HOUR: i64 = 3_600;
const SECS_PER_DAY: i64 = 86_400;

/// Which window a countdown belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownScale {
    /// 5-hour window: hours and minutes
    Session,
    /// 7-day window: days, hours, minutes
    Weekly,
}

/// How countdowns are rendered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountdownPolicy {
    /// Whole units with `>` / `<` markers: `"3h"`, `">3h"`, `"<4h"`
    #[default]
    Tiered,
    /// One decimal place: `"3.5h"`, `"2.5d"`
    Decimal,
}

/// Absolute reset label flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetStyle {
    /// `Resets 14:30 (Zone)`
    Time,
    /// `Resets Jan 5, 14:30 (Zone)`
    DateTime,
}

/// Zone used for absolute times shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayZone {
    Named(Tz),
    Local,
}

impl DisplayZone {
    /// Resolve the configured zone, then `TZ`, then the system zone, then
    /// the system offset
    pub fn resolve(configured: Option<&str>) -> Self {
        Self::resolve_from(
            configured,
            std::env::var("TZ").ok(),
            iana_time_zone::get_timezone().ok(),
        )
    }

    fn resolve_from(configured: Option<&str>, env_tz: Option<String>, system: Option<String>) -> Self {
        if let Some(name) = configured {
            match name.trim().parse::<Tz>() {
                Ok(tz) => return DisplayZone::Named(tz),
                Err(err) => tracing::warn!("Ignoring unknown timezone {:?}: {}", name, err),
            }
        }

        let candidates = [env_tz, system];
        for name in candidates.iter().flatten() {
            if let Ok(tz) = name.trim().trim_start_matches(':').parse::<Tz>() {
                return DisplayZone::Named(tz);
            }
        }

        tracing::debug!("No named system timezone, showing UTC offsets");
        DisplayZone::Local
    }

    /// Zone name for display; the local fallback has no IANA name so its
    /// UTC offset at `at` is used instead
    pub fn name(&self, at: DateTime<Utc>) -> String {
        match self {
            DisplayZone::Named(tz) => tz.name().to_string(),
            DisplayZone::Local => at.with_timezone(&chrono::Local).format("UTC%:z").to_string(),
        }
    }

    pub fn format(&self, instant: DateTime<Utc>, pattern: &str) -> String {
        match self {
            DisplayZone::Named(tz) => instant.with_timezone(tz).format(pattern).to_string(),
            DisplayZone::Local => instant.with_timezone(&chrono::Local).format(pattern).to_string(),
        }
    }
}

/// Parse an ISO-8601 instant, with or without fractional seconds
pub fn parse_instant(timestamp: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(timestamp.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Time left until `reset`; `None` when the timestamp is absent or invalid
pub fn remaining(reset: Option<&str>, now: DateTime<Utc>) -> Option<Duration> {
    let reset = parse_instant(reset?)?;
    Some(reset.signed_duration_since(now))
}

pub fn format_countdown(duration: Duration, scale: CountdownScale, policy: CountdownPolicy) -> String {
    if duration <= Duration::zero() {
        return "0m".to_string();
    }

    match policy {
        CountdownPolicy::Tiered => tiered_countdown(duration.num_seconds(), scale),
        CountdownPolicy::Decimal => decimal_countdown(duration, scale),
    }
}

fn tiered_countdown(secs: i64, scale: CountdownScale) -> String {
    let days = secs / SECS_PER_DAY;
    let hours = match scale {
        CountdownScale::Session => secs / SECS_PER_HOUR,
        CountdownScale::Weekly => (secs % SECS_PER_DAY) / SECS_PER_HOUR,
    };
    let minutes = (secs % SECS_PER_HOUR) / SECS_PER_MINUTE;
    let seconds = secs % SECS_PER_MINUTE;

    if scale == CountdownScale::Weekly && days >= 1 {
        return tier(days, hours, 12, "d");
    }

    if hours >= 1 {
        return tier(hours, minutes, 30, "h");
    }

    match scale {
        CountdownScale::Session => format!("{}m", minutes),
        CountdownScale::Weekly => tier(minutes, seconds, 30, "m"),
    }
}

/// `"{n}{unit}"` on the mark, `">"` just past it, `"<"` approaching the next
fn tier(whole: i64, remainder: i64, half: i64, unit: &str) -> String {
    if remainder == 0 {
        format!("{}{}", whole, unit)
    } else if remainder < half {
        format!(">{}{}", whole, unit)
    } else {
        format!("<{}{}", whole + 1, unit)
    }
}

fn decimal_countdown(duration: Duration, scale: CountdownScale) -> String {
    let secs = duration.num_milliseconds() as f64 / 1000.0;
    let days = secs / SECS_PER_DAY as f64;
    let hours = secs / SECS_PER_HOUR as f64;

    if scale == CountdownScale::Weekly && days >= 1.0 {
        format!("{:.1}d", days)
    } else if hours >= 1.0 {
        format!("{:.1}h", hours)
    } else {
        format!("{}m", duration.num_seconds() / SECS_PER_MINUTE)
    }
}

/// Countdown for a raw timestamp, `"--"` when it cannot be computed
pub fn countdown_label(
    reset: Option<&str>,
    now: DateTime<Utc>,
    scale: CountdownScale,
    policy: CountdownPolicy,
) -> String {
    match remaining(reset, now) {
        Some(duration) => format_countdown(duration, scale, policy),
        None => UNKNOWN_COUNTDOWN.to_string(),
    }
}

pub fn format_absolute_reset(reset: Option<&str>, style: ResetStyle, zone: DisplayZone) -> String {
    let Some(instant) = reset.and_then(parse_instant) else {
        return UNKNOWN_RESET.to_string();
    };

    let pattern = match style {
        ResetStyle::Time => "%H:%M",
        ResetStyle::DateTime => "%b %-d, %H:%M",
    };

    format!("Resets {} ({})", zone.format(instant, pattern), zone.name(instant))
}

/// Wall-clock stamp used for `lastUpdated`
pub fn clock_label(now: DateTime<Utc>, zone: DisplayZone) -> String {
    zone.format(now, "%H:%M:%S")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn tiered(secs: i64, scale: CountdownScale) -> String {
        format_countdown(Duration::seconds(secs), scale, CountdownPolicy::Tiered)
    }

    fn decimal(secs: i64, scale: CountdownScale) -> String {
        format_countdown(Duration::seconds(secs), scale, CountdownPolicy::Decimal)
    }

    #[test]
    fn past_reset_is_zero() {
        let duration = remaining(Some("2024-12-31T23:00:00Z"), now()).unwrap();
        assert!(duration <= Duration::zero());
        assert_eq!(format_countdown(duration, CountdownScale::Session, CountdownPolicy::Tiered), "0m");
        assert_eq!(format_countdown(duration, CountdownScale::Weekly, CountdownPolicy::Decimal), "0m");
        assert_eq!(tiered(0, CountdownScale::Weekly), "0m");
    }

    #[test]
    fn remaining_accepts_fractional_seconds() {
        let duration = remaining(Some("2025-01-01T01:00:00.512345+00:00"), now()).unwrap();
        assert_eq!(duration.num_seconds(), 3600);
        let duration = remaining(Some("2025-01-01T03:00:00+02:00"), now()).unwrap();
        assert_eq!(duration.num_seconds(), 3600);
    }

    #[test]
    fn remaining_rejects_missing_or_garbage() {
        assert!(remaining(None, now()).is_none());
        assert!(remaining(Some("tomorrow"), now()).is_none());
        assert!(remaining(Some(""), now()).is_none());
        assert_eq!(
            countdown_label(Some("nope"), now(), CountdownScale::Session, CountdownPolicy::Tiered),
            "--"
        );
    }

    #[test]
    fn session_tiers() {
        assert_eq!(tiered(3 * 3600, CountdownScale::Session), "3h");
        assert_eq!(tiered(3 * 3600 + 10 * 60, CountdownScale::Session), ">3h");
        assert_eq!(tiered(3 * 3600 + 29 * 60 + 59, CountdownScale::Session), ">3h");
        assert_eq!(tiered(3 * 3600 + 30 * 60, CountdownScale::Session), "<4h");
        assert_eq!(tiered(45 * 60, CountdownScale::Session), "45m");
        assert_eq!(tiered(59, CountdownScale::Session), "0m");
    }

    #[test]
    fn weekly_tiers() {
        assert_eq!(tiered(2 * 86400, CountdownScale::Weekly), "2d");
        assert_eq!(tiered(2 * 86400 + 11 * 3600, CountdownScale::Weekly), ">2d");
        assert_eq!(tiered(2 * 86400 + 12 * 3600, CountdownScale::Weekly), "<3d");
        assert_eq!(tiered(5 * 3600 + 40 * 60, CountdownScale::Weekly), "<6h");
        assert_eq!(tiered(5 * 3600, CountdownScale::Weekly), "5h");
        assert_eq!(tiered(12 * 60, CountdownScale::Weekly), "12m");
        assert_eq!(tiered(12 * 60 + 10, CountdownScale::Weekly), ">12m");
        assert_eq!(tiered(12 * 60 + 45, CountdownScale::Weekly), "<13m");
    }

    #[test]
    fn decimal_policy() {
        assert_eq!(decimal(3 * 3600 + 30 * 60, CountdownScale::Session), "3.5h");
        assert_eq!(decimal(30 * 3600, CountdownScale::Session), "30.0h");
        assert_eq!(decimal(25 * 60, CountdownScale::Session), "25m");
        assert_eq!(decimal(2 * 86400 + 12 * 3600, CountdownScale::Weekly), "2.5d");
        assert_eq!(decimal(18 * 3600 + 30 * 60, CountdownScale::Weekly), "18.5h");
    }

    /// Sweep `span_secs` down to zero and check the largest remaining time a
    /// label can stand for never grows
    fn assert_monotonic(scale: CountdownScale, policy: CountdownPolicy, span_secs: i64, step: usize) {
        let reset = (now() + Duration::seconds(span_secs)).to_rfc3339();
        let mut previous = f64::INFINITY;
        for elapsed in (0..=span_secs).step_by(step) {
            let at = now() + Duration::seconds(elapsed);
            let label = countdown_label(Some(&reset), at, scale, policy);
            let upper = upper_bound_secs(&label);
            assert!(upper <= previous, "{} at +{}s after {}s", label, elapsed, previous);
            previous = upper;
        }
    }

    /// Largest remaining time a label can stand for
    fn upper_bound_secs(label: &str) -> f64 {
        let trimmed = label.trim_start_matches(|c| c == '<' || c == '>');
        let (value, unit) = trimmed.split_at(trimmed.len() - 1);
        let value: f64 = value.parse().unwrap();
        let unit_secs = match unit {
            "d" => 86_400.0,
            "h" => 3_600.0,
            _ => 60.0,
        };

        if trimmed.contains('.') {
            (value + 0.05) * unit_secs
        } else if label.starts_with('>') {
            value * unit_secs + unit_secs / 2.0
        } else if label.starts_with('<') {
            value * unit_secs
        } else if unit == "m" {
            (value + 1.0) * unit_secs
        } else {
            value * unit_secs
        }
    }

    #[test]
    fn tiered_urgency_never_goes_back_up() {
        assert_monotonic(CountdownScale::Session, CountdownPolicy::Tiered, 5 * 3600, 60);
        assert_monotonic(CountdownScale::Session, CountdownPolicy::Tiered, 5 * 3600 - 17, 60);
        assert_monotonic(CountdownScale::Weekly, CountdownPolicy::Tiered, 7 * 86_400, 30);
        assert_monotonic(CountdownScale::Weekly, CountdownPolicy::Tiered, 7 * 86_400 - 7, 30);
    }

    #[test]
    fn decimal_countdown_never_goes_back_up() {
        assert_monotonic(CountdownScale::Session, CountdownPolicy::Decimal, 5 * 3600, 30);
        assert_monotonic(CountdownScale::Weekly, CountdownPolicy::Decimal, 7 * 86_400, 30);
        assert_monotonic(CountdownScale::Weekly, CountdownPolicy::Decimal, 7 * 86_400 - 7, 30);
    }

    #[test]
    fn absolute_reset_in_named_zone() {
        let zone = DisplayZone::Named(chrono_tz::Europe::Bucharest);
        assert_eq!(
            format_absolute_reset(Some("2025-01-01T12:30:00Z"), ResetStyle::Time, zone),
            "Resets 14:30 (Europe/Bucharest)"
        );
        assert_eq!(
            format_absolute_reset(Some("2025-01-05T12:30:00.250Z"), ResetStyle::DateTime, zone),
            "Resets Jan 5, 14:30 (Europe/Bucharest)"
        );
    }

    #[test]
    fn absolute_reset_unknown() {
        let zone = DisplayZone::Named(chrono_tz::UTC);
        assert_eq!(format_absolute_reset(None, ResetStyle::Time, zone), "Unknown");
        assert_eq!(format_absolute_reset(Some("soon"), ResetStyle::DateTime, zone), "Unknown");
    }

    #[test]
    fn resolve_prefers_configured_zone() {
        assert_eq!(
            DisplayZone::resolve(Some("Asia/Tokyo")),
            DisplayZone::Named(chrono_tz::Asia::Tokyo)
        );
        assert_eq!(
            DisplayZone::resolve_from(
                Some("Asia/Tokyo"),
                Some("Europe/Paris".into()),
                Some("America/New_York".into())
            ),
            DisplayZone::Named(chrono_tz::Asia::Tokyo)
        );
    }

    #[test]
    fn resolve_falls_back_to_tz_then_system_zone() {
        assert_eq!(
            DisplayZone::resolve_from(None, Some(":Europe/Paris".into()), Some("America/New_York".into())),
            DisplayZone::Named(chrono_tz::Europe::Paris)
        );

        let zone = DisplayZone::resolve_from(Some("Mars/Olympus"), None, Some("America/New_York".into()));
        assert_eq!(zone, DisplayZone::Named(chrono_tz::America::New_York));
        assert_eq!(
            format_absolute_reset(Some("2025-01-01T17:30:00Z"), ResetStyle::Time, zone),
            "Resets 12:30 (America/New_York)"
        );

        assert_eq!(
            DisplayZone::resolve_from(None, Some("garbage".into()), None),
            DisplayZone::Local
        );
    }

    #[test]
    fn clock_label_is_hms() {
        let zone = DisplayZone::Named(chrono_tz::UTC);
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 9, 5, 7).unwrap();
        assert_eq!(clock_label(at, zone), "09:05:07");
    }
}
