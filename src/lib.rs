//! UsageBar - Claude usage tracker
//!
//! Polls the Anthropic OAuth usage endpoint with the Claude Code
//! credentials and keeps a single observable usage snapshot that a menu
//! bar or terminal can render.

pub mod config;
pub mod debug_settings;
pub mod detector;
pub mod display;
pub mod engine;
pub mod providers;
pub mod storage;
pub mod usage;

pub use config::EngineConfig;
pub use display::DisplaySink;
pub use engine::{EngineParts, UsageSyncEngine};
pub use usage::{ConnectionStatus, UsageSnapshot};

use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging: stderr always, plus the debug file when enabled.
/// `RUST_LOG` overrides the default level.
pub fn init_logging(verbose: bool, file_logging: bool) {
    debug_settings::set_file_logging(file_logging);

    let default_directive = if verbose {
        "usagebar_lib=debug,usagebar=debug"
    } else {
        "usagebar_lib=info,usagebar=info"
    };
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .parse_lossy(
            std::env::var(EnvFilter::DEFAULT_ENV)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default_directive.to_string()),
        );

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(debug_settings::file_writer()),
        )
        .try_init();
}
