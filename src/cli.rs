//! CLI interface for geoprobe.
//!
//! Every command runs the harness against a simulated device described by
//! the config's `[device]` table. Arguments in, history out.
//!
//! - `geoprobe query` issues queries and prints the history once they settle.
//! - `geoprobe status` prints capability, permission and network readings.
//! - `geoprobe session` replays the device timeline and prints each change.

mod format;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use jiff::tz::TimeZone;
use serde_json::json;
use tokio::task::LocalSet;
use tokio::time::{Instant, Interval};

use crate::config::Config;
use crate::form::OptionsForm;
use crate::harness::{Change, Harness, HarnessSnapshot};
use crate::model::PositionOptions;
use crate::platform::simulated::SimulatedPlatform;

use format::{format_change, format_change_counts, format_history, format_status};

/// geoprobe: exercise geolocation, permission and connectivity APIs.
#[derive(Debug, Parser)]
#[command(name = "geoprobe", after_long_help = USAGE_HELP)]
pub struct Cli {
    /// Config file (default: `~/.geoprobe/config.toml`).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

const USAGE_HELP: &str = r#"Examples:
  geoprobe query --timeout 5000
  geoprobe query --count 3 --interval-ms 100 --high-accuracy true --json
  geoprobe status
  geoprobe --config device.toml session --duration-ms 3000 --every-ms 500

Option values follow the form fields: an empty value leaves the option
unset, so `--timeout ""` clears a timeout set in the config."#;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Issue queries and print the history once every one has finished.
    Query {
        #[command(flatten)]
        options: OptionArgs,

        /// Number of queries to issue.
        #[arg(long, default_value_t = 1)]
        count: u32,

        /// Pause between consecutive queries.
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,

        /// Print the full snapshot as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print location availability, permission and network.
    ///
    /// Waits for the permission query to resolve first.
    Status {
        /// Print the readings as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Replay the device timeline and print one line per change.
    Session {
        #[command(flatten)]
        options: OptionArgs,

        /// How long to watch.
        #[arg(long, default_value_t = 5_000)]
        duration_ms: u64,

        /// Issue a query on this period. No queries when omitted.
        #[arg(long)]
        every_ms: Option<u64>,

        /// Print one JSON object per line.
        #[arg(long)]
        json: bool,
    },
}

/// Overrides for the configured query options, as raw form input.
#[derive(Debug, Args)]
pub struct OptionArgs {
    /// `enableHighAccuracy`: "true", anything else for false, "" to unset.
    #[arg(long, value_name = "BOOL")]
    high_accuracy: Option<String>,

    /// `maximumAge` in milliseconds, "" to unset.
    #[arg(long, value_name = "MS", allow_hyphen_values = true)]
    maximum_age: Option<String>,

    /// `timeout` in milliseconds, "" to unset.
    #[arg(long, value_name = "MS", allow_hyphen_values = true)]
    timeout: Option<String>,
}

impl OptionArgs {
    fn to_form(&self, defaults: PositionOptions) -> Result<OptionsForm, String> {
        let form = OptionsForm::new(defaults);
        let fields = [
            (OptionsForm::ENABLE_HIGH_ACCURACY, &self.high_accuracy),
            (OptionsForm::MAXIMUM_AGE, &self.maximum_age),
            (OptionsForm::TIMEOUT, &self.timeout),
        ];
        form.apply(
            fields
                .iter()
                .filter_map(|(name, raw)| raw.as_deref().map(|raw| (*name, raw))),
        )
        .map_err(|e| e.to_string())?;
        Ok(form)
    }
}

/// Run the CLI, returning an error message on failure.
pub fn run(cli: Cli, config: &Config) -> Result<(), String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| format!("failed to start runtime: {e}"))?;
    let local = LocalSet::new();

    local.block_on(&runtime, async {
        match cli.command {
            Command::Query {
                options,
                count,
                interval_ms,
                json,
            } => cmd_query(config, &options, count, interval_ms, json).await,
            Command::Status { json } => cmd_status(config, json).await,
            Command::Session {
                options,
                duration_ms,
                every_ms,
                json,
            } => cmd_session(config, &options, duration_ms, every_ms, json).await,
        }
    })
}

async fn cmd_query(
    config: &Config,
    options: &OptionArgs,
    count: u32,
    interval_ms: u64,
    json: bool,
) -> Result<(), String> {
    let form = options.to_form(config.query)?;
    let device = SimulatedPlatform::from_profile(&config.device);
    let harness = Harness::mount(&device.platform());

    for i in 0..count {
        if i > 0 && interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        }
        harness.trigger(&form).map_err(|e| e.to_string())?;
    }
    harness.tracker().settled().await;
    harness.permission_resolved().await;

    let snapshot = harness.snapshot();
    harness.unmount();

    if json {
        println!("{}", to_json(&snapshot)?);
    } else {
        println!("{}", format_history(&snapshot.history, &TimeZone::system()));
    }
    Ok(())
}

async fn cmd_status(config: &Config, json: bool) -> Result<(), String> {
    let device = SimulatedPlatform::from_profile(&config.device);
    let harness = Harness::mount(&device.platform());
    harness.permission_resolved().await;

    let snapshot = harness.snapshot();
    harness.unmount();

    if json {
        let status = json!({
            "locationAvailable": snapshot.location_available,
            "permission": snapshot.permission,
            "network": snapshot.network,
            "permissionChanges": snapshot.permission_changes,
            "networkChanges": snapshot.network_changes,
        });
        println!("{}", to_json(&status)?);
    } else {
        println!("{}", format_status(&snapshot));
        println!("{}", format_change_counts(&snapshot));
    }
    Ok(())
}

async fn cmd_session(
    config: &Config,
    options: &OptionArgs,
    duration_ms: u64,
    every_ms: Option<u64>,
    json: bool,
) -> Result<(), String> {
    let form = options.to_form(config.query)?;
    let device = SimulatedPlatform::from_profile(&config.device);
    let harness = Harness::mount(&device.platform());
    let mut changes = harness.changes();

    let started = Instant::now();
    let timeline = device.play_timeline();
    let deadline = tokio::time::sleep(Duration::from_millis(duration_ms));
    tokio::pin!(deadline);
    let mut ticker = every_ms
        .filter(|ms| *ms > 0)
        .map(|ms| tokio::time::interval(Duration::from_millis(ms)));

    if !json {
        println!("{}", format_status(&harness.snapshot()));
    }

    loop {
        tokio::select! {
            () = &mut deadline => break,
            () = tick(ticker.as_mut()) => {
                harness.trigger(&form).map_err(|e| e.to_string())?;
            }
            change = changes.next() => {
                let Some(change) = change else { break };
                let snapshot = harness.snapshot();
                let at_ms = started.elapsed().as_millis();
                if json {
                    println!("{}", change_json(&change, &snapshot, at_ms));
                } else {
                    println!("[{at_ms:>6}ms] {}", format_change(&change, &snapshot));
                }
            }
        }
    }

    timeline.abort();
    harness.unmount();

    let snapshot = harness.snapshot();
    if json {
        println!("{}", serde_json::to_string(&snapshot).map_err(|e| e.to_string())?);
    } else {
        println!("{}", format_change_counts(&snapshot));
        println!("{}", format_history(&snapshot.history, &TimeZone::system()));
    }
    Ok(())
}

/// Wait for the next tick, or forever without a ticker.
async fn tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn change_json(
    change: &Change,
    snapshot: &HarnessSnapshot,
    at_ms: u128,
) -> serde_json::Value {
    let at_ms = u64::try_from(at_ms).unwrap_or(u64::MAX);
    match change {
        Change::History => json!({
            "atMs": at_ms,
            "change": "history",
            "queries": snapshot.history.len(),
            "inFlight": snapshot.history.iter().filter(|r| r.is_pending()).count(),
        }),
        Change::Permission(reading) => json!({
            "atMs": at_ms,
            "change": "permission",
            "value": reading,
        }),
        Change::Network(reading) => json!({
            "atMs": at_ms,
            "change": "network",
            "value": reading,
        }),
    }
}

fn to_json(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("failed to serialize output: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    use crate::form::OptionsProvider;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn option_args_override_configured_defaults() {
        let cli = Cli::parse_from([
            "geoprobe",
            "query",
            "--high-accuracy",
            "true",
            "--timeout",
            "-1",
        ]);
        let Command::Query { options, .. } = cli.command else {
            panic!("expected query");
        };
        let defaults = PositionOptions {
            maximum_age: Some(30_000),
            timeout: Some(5_000),
            ..PositionOptions::default()
        };

        let form = options.to_form(defaults).unwrap();
        let snapshot = form.snapshot();
        assert_eq!(snapshot.enable_high_accuracy, Some(true));
        assert_eq!(snapshot.maximum_age, Some(30_000));
        assert_eq!(snapshot.timeout, Some(-1));
    }

    #[test]
    fn empty_value_clears_configured_option() {
        let cli = Cli::parse_from(["geoprobe", "session", "--timeout", ""]);
        let Command::Session { options, .. } = cli.command else {
            panic!("expected session");
        };
        let defaults = PositionOptions {
            timeout: Some(5_000),
            ..PositionOptions::default()
        };

        let form = options.to_form(defaults).unwrap();
        assert_eq!(form.snapshot().timeout, None);
    }

    #[test]
    fn bad_integer_is_reported() {
        let cli = Cli::parse_from(["geoprobe", "query", "--maximum-age", "soon"]);
        let Command::Query { options, .. } = cli.command else {
            panic!("expected query");
        };
        let err = options.to_form(PositionOptions::default()).unwrap_err();
        assert!(err.contains("maximumAge"));
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli = Cli::parse_from(["geoprobe", "status", "--config", "/tmp/device.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/device.toml")));
    }
}
