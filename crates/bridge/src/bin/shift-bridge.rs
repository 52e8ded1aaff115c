//! shift-bridge: drives the shift device from telemetry deliveries.
//!
//! Reads one JSON delivery per line on stdin, runs each through the rule
//! pipeline, and pushes bitmap changes to the hardware link. The rules file
//! is reloaded when it changes on disk.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tracing::{debug, info, warn};

use shift_bridge::{load_dotenv, Bridge, BridgeConfig};
use shift_core::Delivery;
use shift_link::{BitmapSink, LinkClient, ShiftBitmap};
use shift_rules::RuleLoader;

// ── CLI ─────────────────────────────────────────────────────────────

/// Rule-driven shift bitmap bridge.
#[derive(Parser, Debug)]
#[command(name = "shift-bridge", version, about)]
struct Cli {
    /// Path to shift-bridge.toml config file.
    #[arg(long, env = "SHIFT_CONFIG", default_value = "config/shift-bridge.toml")]
    config: String,

    /// Evaluate rules and log bitmaps without opening the hardware link.
    #[arg(long, env = "SHIFT_DRY_RUN")]
    dry_run: bool,

    /// How often to check for rule file changes while stdin is idle, in seconds.
    #[arg(long, env = "SHIFT_RELOAD_INTERVAL", default_value_t = 1)]
    reload_interval: u64,
}

/// Logs bitmaps instead of sending them.
struct DryRun;

impl BitmapSink for DryRun {
    fn send_bitmap(&self, bitmap: ShiftBitmap) -> shift_link::Result<()> {
        info!(bitmap = %bitmap, "dry run: bitmap not sent");
        Ok(())
    }
}

// ── Reload ──────────────────────────────────────────────────────────

struct Reloader {
    loader: RuleLoader,
    seen: u64,
}

impl Reloader {
    fn new(config: &BridgeConfig) -> Self {
        let mut loader = RuleLoader::new(config.rules.path.clone());
        if config.rules.watch {
            if let Err(e) = loader.watch() {
                warn!(error = %e, path = %config.rules.path.display(), "rules hot-reload disabled");
            }
        }
        let seen = loader.generation();
        Self { loader, seen }
    }

    fn check(&mut self, bridge: &mut Bridge) {
        let current = self.loader.generation();
        if current == self.seen {
            return;
        }
        self.seen = current;
        // Failures are logged inside and the previous rules stay active.
        if let Ok(count) = bridge.reload_from(&self.loader) {
            info!(rules = count, generation = current, "rules reloaded");
        }
    }
}

// ── Run loop ────────────────────────────────────────────────────────

fn handle_line(bridge: &mut Bridge, sink: &dyn BitmapSink, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    let delivery = match Delivery::from_json_line(line) {
        Ok(d) => d,
        Err(e) => {
            warn!(error = %e, "malformed delivery line skipped");
            return;
        }
    };

    match bridge.deliver(delivery, sink) {
        Ok(outcome) => debug!(
            firings = outcome.firings.len(),
            actions = outcome.action_count(),
            changed = outcome.report.changed,
            sent = outcome.sent,
            bitmap = %outcome.bitmap,
            "delivery processed"
        ),
        Err(e) => warn!(error = %e, "delivery rejected"),
    }
}

async fn run(bridge: &mut Bridge, reloader: &mut Reloader, sink: &dyn BitmapSink, reload_every: Duration) -> anyhow::Result<()> {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut reload_tick = tokio::time::interval(reload_every);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("failed to read stdin")? {
                    Some(line) => {
                        reloader.check(bridge);
                        handle_line(bridge, sink, &line);
                    }
                    None => {
                        info!("stdin closed");
                        break;
                    }
                }
            }
            _ = reload_tick.tick() => reloader.check(bridge),
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                break;
            }
        }
    }
    Ok(())
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match BridgeConfig::from_file(&cli.config) {
        Ok(cfg) => {
            info!(path = %cli.config, "loaded bridge config");
            cfg
        }
        Err(e) => {
            warn!(
                error = %e,
                path = %cli.config,
                "failed to load config, using defaults"
            );
            BridgeConfig::from_env().context("invalid environment configuration")?
        }
    };

    let mut bridge = Bridge::from_config(&config).context("failed to load catalog and rules")?;
    let mut reloader = Reloader::new(&config);
    let reload_every = Duration::from_secs(cli.reload_interval.max(1));

    if cli.dry_run {
        info!("dry run, hardware link disabled");
        return run(&mut bridge, &mut reloader, &DryRun, reload_every).await;
    }

    let mut link = LinkClient::new(config.link.clone());
    link.start().context("failed to start link worker")?;
    info!(address = %config.link.address(), "link worker started");

    let result = run(&mut bridge, &mut reloader, &link, reload_every).await;

    let status = link.status();
    info!(
        state = %status.state,
        failures = status.consecutive_failures,
        bitmap = %bridge.bitmap(),
        "stopping link"
    );
    link.disconnect();
    result
}
