//! Display collaborator contract and the headless menu bar text

use crate::usage::time_math::UNKNOWN_COUNTDOWN;
use crate::usage::{ActiveModel, ConnectionStatus, UsageSnapshot};

const DISCONNECTED_SYMBOL: &str = "⊗";

/// Receives a redraw after every snapshot change. Called from the engine's
/// writer task, so implementations must not block.
pub trait DisplaySink: Send + Sync {
    fn redraw(&self, snapshot: &UsageSnapshot);
}

/// Sink for headless use; the snapshot is still observable through the engine
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl DisplaySink for NoopSink {
    fn redraw(&self, _snapshot: &UsageSnapshot) {}
}

impl<F> DisplaySink for F
where
    F: Fn(&UsageSnapshot) + Send + Sync,
{
    fn redraw(&self, snapshot: &UsageSnapshot) {
        self(snapshot)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineOptions {
    pub show_model_limits: bool,
}

impl Default for LineOptions {
    fn default() -> Self {
        Self {
            show_model_limits: true,
        }
    }
}

/// Usage level indicator based on the highest tracked percentage
pub fn status_glyph(snapshot: &UsageSnapshot) -> &'static str {
    match snapshot.status {
        ConnectionStatus::Connecting => return "◌",
        ConnectionStatus::Connected => {}
        _ => return "◍",
    }

    match snapshot.max_usage() {
        0..=24 => "○",
        25..=49 => "◔",
        50..=69 => "◑",
        70..=89 => "◕",
        _ => "◉",
    }
}

/// Menu bar text, e.g. `Ⓢ 42% ~ <3h | 18% ~ >4d`
pub fn status_line(snapshot: &UsageSnapshot, options: LineOptions) -> String {
    let symbol = if snapshot.status.is_connected() {
        snapshot.active_model.symbol()
    } else {
        DISCONNECTED_SYMBOL
    };
    let placeholders = snapshot.status.shows_placeholders();

    let mut line = format!(
        "{} {} ~ {} | {} ~ {}",
        symbol,
        percent_label(snapshot.session.used, placeholders),
        &snapshot.session_countdown,
        percent_label(snapshot.week_all.used, placeholders),
        &snapshot.weekly_countdown,
    );

    if options.show_model_limits
        && snapshot.subscription_tier.has_separate_model_limits()
        && snapshot.active_model == ActiveModel::Sonnet
    {
        line.push_str(&format!(
            " | {} ~ {}",
            percent_label(snapshot.week_sonnet.used, placeholders),
            &snapshot.weekly_countdown,
        ));
    }

    line
}

fn percent_label(used: u8, placeholder: bool) -> String {
    if placeholder {
        UNKNOWN_COUNTDOWN.to_string()
    } else {
        format!("{}%", used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::SubscriptionTier;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn connected(session: u8, week: u8) -> UsageSnapshot {
        let mut snapshot = UsageSnapshot::default();
        snapshot.status = ConnectionStatus::Connected;
        snapshot.session.used = session;
        snapshot.week_all.used = week;
        snapshot.session_countdown = "<3h".into();
        snapshot.weekly_countdown = ">4d".into();
        snapshot
    }

    #[test]
    fn glyph_follows_highest_usage() {
        assert_eq!(status_glyph(&connected(10, 5)), "○");
        assert_eq!(status_glyph(&connected(10, 25)), "◔");
        assert_eq!(status_glyph(&connected(69, 0)), "◑");
        assert_eq!(status_glyph(&connected(0, 70)), "◕");

        let mut snapshot = connected(0, 0);
        snapshot.week_sonnet.used = 90;
        assert_eq!(status_glyph(&snapshot), "◉");
    }

    #[test]
    fn glyph_for_non_connected_states() {
        assert_eq!(status_glyph(&UsageSnapshot::default()), "◌");

        let mut snapshot = connected(95, 0);
        snapshot.status = ConnectionStatus::ApiError;
        assert_eq!(status_glyph(&snapshot), "◍");
        snapshot.status = ConnectionStatus::NoAuth;
        assert_eq!(status_glyph(&snapshot), "◍");
    }

    #[test]
    fn line_for_connected_pro() {
        let mut snapshot = connected(42, 18);
        snapshot.subscription_tier = SubscriptionTier::Pro;
        assert_eq!(
            status_line(&snapshot, LineOptions::default()),
            "Ⓢ 42% ~ <3h | 18% ~ >4d"
        );
    }

    #[test]
    fn sonnet_segment_only_on_max_with_sonnet() {
        let mut snapshot = connected(42, 18);
        snapshot.subscription_tier = SubscriptionTier::Max;
        snapshot.week_sonnet.used = 7;
        assert_eq!(
            status_line(&snapshot, LineOptions::default()),
            "Ⓢ 42% ~ <3h | 18% ~ >4d | 7% ~ >4d"
        );

        let hidden = LineOptions {
            show_model_limits: false,
        };
        assert_eq!(status_line(&snapshot, hidden), "Ⓢ 42% ~ <3h | 18% ~ >4d");

        snapshot.active_model = ActiveModel::Opus;
        assert_eq!(
            status_line(&snapshot, LineOptions::default()),
            "Ⓞ 42% ~ <3h | 18% ~ >4d"
        );
    }

    #[test]
    fn placeholders_hide_stale_percentages() {
        let mut snapshot = connected(42, 18);
        snapshot.status = ConnectionStatus::TokenExpired;
        assert_eq!(
            status_line(&snapshot, LineOptions::default()),
            "⊗ -- ~ <3h | -- ~ >4d"
        );

        // api errors keep the last known numbers
        snapshot.status = ConnectionStatus::ApiError;
        assert_eq!(
            status_line(&snapshot, LineOptions::default()),
            "⊗ 42% ~ <3h | 18% ~ >4d"
        );
    }

    #[test]
    fn loading_line() {
        assert_eq!(
            status_line(&UsageSnapshot::default(), LineOptions::default()),
            "⊗ -- ~ -- | -- ~ --"
        );
    }

    #[test]
    fn closures_are_sinks() {
        let calls = AtomicUsize::new(0);
        let sink = |_: &UsageSnapshot| {
            calls.fetch_add(1, Ordering::SeqCst);
        };
        sink.redraw(&UsageSnapshot::default());
        NoopSink.redraw(&UsageSnapshot::default());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
