use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use usagebar_lib::display::{status_glyph, status_line, LineOptions, NoopSink};
use usagebar_lib::engine::{fetch_snapshot_once, EngineParts};
use usagebar_lib::storage::snapshot_file::write_snapshot;
use usagebar_lib::{init_logging, EngineConfig, UsageSnapshot, UsageSyncEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug)]
struct CliArgs {
    command: String,
    format: OutputFormat,
    pretty: bool,
    config: Option<PathBuf>,
    verbose: bool,
    log_file: bool,
}

#[tokio::main]
async fn main() {
    let args = parse_args(std::env::args().skip(1).collect());
    if args.command == "--help" || args.command == "-h" {
        print_help();
        return;
    }
    if args.command == "--version" || args.command == "-V" {
        println!("usagebar {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let config = match EngineConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };
    init_logging(args.verbose, args.log_file || config.file_logging);

    let result = match args.command.as_str() {
        "once" => run_once(&args, &config).await,
        "watch" => run_watch(&args, &config).await,
        _ => Err(format!(
            "Unknown command: {}. Use --help for usage.",
            args.command
        )),
    };

    if let Err(message) = result {
        eprintln!("{message}");
        std::process::exit(1);
    }
}

fn parse_args(mut argv: Vec<String>) -> CliArgs {
    let mut format = OutputFormat::Text;
    let mut pretty = false;
    let mut config = None;
    let mut verbose = false;
    let mut log_file = false;
    let mut command = String::new();

    if let Some(first) = argv.first() {
        if !first.starts_with('-') {
            command = argv.remove(0);
        }
    }

    if command.is_empty() {
        command = "once".to_string();
    }

    let mut iter = argv.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--format" => {
                if let Some(value) = iter.next() {
                    if value == "json" {
                        format = OutputFormat::Json;
                    } else if value == "text" {
                        format = OutputFormat::Text;
                    }
                }
            }
            "--json" => format = OutputFormat::Json,
            "--pretty" => pretty = true,
            "--config" => config = iter.next().map(PathBuf::from),
            "--verbose" | "-v" => verbose = true,
            "--log-file" => log_file = true,
            "--help" | "-h" | "--version" | "-V" => {
                command = arg;
                break;
            }
            _ => {}
        }
    }

    CliArgs {
        command,
        format,
        pretty,
        config,
        verbose,
        log_file,
    }
}

async fn run_once(args: &CliArgs, config: &EngineConfig) -> Result<(), String> {
    let parts = EngineParts::from_config(config, Arc::new(NoopSink));
    let snapshot = fetch_snapshot_once(&parts).await;

    if let Some(path) = config.snapshot_export_path.as_ref() {
        write_snapshot(path, &snapshot).map_err(|err| format!("{err:#}"))?;
    }

    match args.format {
        OutputFormat::Text => println!("{}", render_text(&snapshot, config)),
        OutputFormat::Json => print_json(&snapshot, args.pretty)?,
    }
    Ok(())
}

async fn run_watch(args: &CliArgs, config: &EngineConfig) -> Result<(), String> {
    let format = args.format;
    let pretty = args.pretty;
    let options = LineOptions {
        show_model_limits: config.show_model_limits,
    };
    let last_printed = Mutex::new(String::new());

    // Ticks redraw every second; only print when the output changes
    let sink = move |snapshot: &UsageSnapshot| {
        let output = match format {
            OutputFormat::Text => format!("{} {}", status_glyph(snapshot), status_line(snapshot, options)),
            OutputFormat::Json => match to_json(snapshot, pretty) {
                Ok(output) => output,
                Err(err) => {
                    tracing::warn!("Failed to encode snapshot: {}", err);
                    return;
                }
            },
        };

        if let Ok(mut last) = last_printed.lock() {
            if *last != output {
                println!("{output}");
                *last = output;
            }
        }
    };

    let engine = UsageSyncEngine::from_config(config, Arc::new(sink));
    tokio::signal::ctrl_c()
        .await
        .map_err(|err| format!("Failed to listen for Ctrl-C: {err}"))?;
    engine.shutdown().await;
    Ok(())
}

fn render_text(snapshot: &UsageSnapshot, config: &EngineConfig) -> String {
    let options = LineOptions {
        show_model_limits: config.show_model_limits,
    };
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        status_glyph(snapshot),
        status_line(snapshot, options)
    ));
    lines.push(format!(
        "Status: {} · {} ({})",
        snapshot.status.label(),
        snapshot.active_model.display_name(),
        snapshot.subscription_tier.display_name()
    ));
    if let Some(error) = snapshot.last_error.as_ref() {
        lines.push(format!("Error: {error}"));
    }
    if !snapshot.status.shows_placeholders() {
        lines.push(format!(
            "Session: {}% · resets {}",
            snapshot.session.used, snapshot.session.reset_time
        ));
        lines.push(format!(
            "Weekly: {}% · resets {}",
            snapshot.week_all.used, snapshot.week_all.reset_time
        ));
        if snapshot.subscription_tier.has_separate_model_limits() {
            lines.push(format!(
                "Sonnet weekly: {}% · {}",
                snapshot.week_sonnet.used, snapshot.week_sonnet.reset_time
            ));
        }
        if snapshot.overage.enabled {
            lines.push(format!(
                "Extra usage: ${:.2} ({}%)",
                snapshot.overage.amount_usd, snapshot.overage.percent
            ));
        }
    }
    if let Some(updated) = snapshot.last_updated.as_ref() {
        lines.push(format!("Updated: {updated}"));
    }
    lines.join("\n")
}

fn to_json<T: Serialize>(payload: &T, pretty: bool) -> Result<String, String> {
    if pretty {
        serde_json::to_string_pretty(payload)
    } else {
        serde_json::to_string(payload)
    }
    .map_err(|err| err.to_string())
}

fn print_json<T: Serialize>(payload: &T, pretty: bool) -> Result<(), String> {
    let output = to_json(payload, pretty)?;
    println!("{output}");
    Ok(())
}

fn print_help() {
    println!(
        "usagebar {}\n\nUsage:\n  usagebar once [--json] [--pretty] [--config <path>]\n  usagebar watch [--json] [--pretty] [--config <path>]\n\nCommands:\n  once   Fetch Claude usage once and print it\n  watch  Keep polling and print the status line whenever it changes\n\nFlags:\n  --format <text|json>  Output format\n  --json               Shortcut for --format json\n  --pretty             Pretty-print JSON output\n  --config <path>      Settings file (default: <config dir>/UsageBar/settings.json)\n  -v, --verbose        Debug logging on stderr\n  --log-file           Also write logs to the debug log file\n  -h, --help           Show help\n  -V, --version        Show version",
        env!("CARGO_PKG_VERSION")
    );
}
