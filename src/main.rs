pub mod cache;
pub mod client;
pub mod config;
pub mod models {
    pub mod history;
    pub mod telemetry;
}
pub mod rules;
pub mod services {
    pub mod monitor;
    pub mod retention;
}
pub mod tracker;

use crate::client::StoreClient;
use crate::config::Config;
use crate::services::monitor::{self, ShutdownToken};
use log::{error, info, warn};
use std::thread;
use std::time::Duration;

/// Refresh cadence of `--watch`; intentionally faster than the detection
/// poll so operators see new controller writes as they land.
const WATCH_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
pub struct CliOptions {
    pub watch: bool,
}

fn parse_cli() -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    let mut args = std::env::args_os();
    args.next(); // skip program name

    for arg in args {
        match arg.to_str() {
            Some("--watch") => options.watch = true,
            Some("--") => break,
            Some(other) => return Err(format!("unrecognised argument: {}", other)),
            None => return Err("argument contains invalid UTF-8".to_string()),
        }
    }

    Ok(options)
}

pub fn run(options: &CliOptions) -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (store_url={}, poll_interval={}s, sweep_interval={}s, retention_days={}, request_timeout={}s)",
        cfg.store_url,
        cfg.poll_interval.as_secs(),
        cfg.sweep_interval.as_secs(),
        cfg.retention_days,
        cfg.request_timeout.as_secs()
    );

    // 2) Init store client
    let client = StoreClient::new(cfg.store_url.clone(), cfg.request_timeout);

    if options.watch {
        return watch_live(&client);
    }

    // 3) Run the monitoring worker on this thread. The token is never
    // cancelled here; embedders use `Monitor::spawn` to get a stoppable
    // background worker instead.
    let token = ShutdownToken::new();
    monitor::run_loop(&client, &cfg, &token);
    Ok(())
}

/// Poll the live topic and pretty-print each new record as it arrives,
/// deduplicated by server-assigned key. Diagnostics aid; runs until the
/// process is killed.
fn watch_live(client: &StoreClient) -> Result<(), String> {
    info!("Watching live telemetry (every {}s); stop with Ctrl+C", WATCH_INTERVAL.as_secs());
    let mut last_key: Option<String> = None;

    loop {
        match client.latest_snapshot_entry() {
            Ok(Some((key, value))) => {
                if last_key.as_deref() != Some(key.as_str()) {
                    let rendered = serde_json::to_string_pretty(&value)
                        .map_err(|e| format!("rendering live record failed: {}", e))?;
                    info!("New live record {}:\n{}", key, rendered);
                    last_key = Some(key);
                }
            }
            Ok(None) => info!("No data at live topic yet"),
            Err(e) => warn!("Live fetch failed: {}", e),
        }

        thread::sleep(WATCH_INTERVAL);
    }
}

fn main() {
    // Load .env before the logger so RUST_LOG from .env is respected.
    dotenvy::dotenv().ok();

    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    let options = match parse_cli() {
        Ok(v) => v,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    info!(
        "pumpwatch {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );

    if let Err(e) = run(&options) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
