//! RigSleuth: best-effort hardware diagnostics for repair benches.
//!
//! Thin binary entry point. All probing and inference lives in the
//! `rigsleuth-core` crate; this file parses flags, runs one gather, and
//! prints or saves the result.

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use rigsleuth_core::report::{self, ReportContext};
use rigsleuth_core::snapshot::{InfoUpdate, InfoValue};
use rigsleuth_core::{Engine, EngineConfig};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "rigsleuth", version, about = "Hardware diagnostics that degrade gracefully without root")]
struct Cli {
    /// Ignore any cached result and probe again.
    #[arg(long)]
    refresh: bool,

    /// Give up waiting for slow categories after this many seconds.
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    wait: u64,

    /// Print the flat key/value snapshot as JSON instead of the text report.
    #[arg(long)]
    json: bool,

    /// Print every field as it arrives.
    #[arg(long)]
    watch: bool,

    /// Also save the report bundle (.txt, .json, _drives.csv) here.
    #[arg(long, value_name = "DIR")]
    report_dir: Option<PathBuf>,

    #[arg(long, value_name = "ID")]
    ticket: Option<String>,

    #[arg(long, value_name = "NAME")]
    customer: Option<String>,

    #[arg(long, value_name = "NAME", env = "RIGSLEUTH_TECHNICIAN", default_value = "Unknown")]
    technician: String,

    /// Read /sys, /proc and /etc under this directory instead of `/`.
    #[arg(long, value_name = "PATH")]
    sys_root: Option<PathBuf>,

    /// Cache lifetime in seconds.
    #[arg(long, value_name = "SECS")]
    cache_ttl: Option<u64>,

    /// Log filter, e.g. `debug` or `rigsleuth_core=trace`. Overrides RUST_LOG.
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for the report or JSON.
    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid --log-level {level:?}"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("RigSleuth {} starting", env!("CARGO_PKG_VERSION"));

    let mut config = EngineConfig::from_env();
    if let Some(root) = &cli.sys_root {
        config.sys_root = root.clone();
    }
    if let Some(secs) = cli.cache_ttl {
        config.cache_ttl = Duration::from_secs(secs);
    }
    let engine = Engine::new(config);

    let updates = cli.watch.then(|| engine.observers().subscribe_channel());
    let handle = engine.gather(cli.refresh);
    let deadline = Instant::now() + Duration::from_secs(cli.wait);

    if let Some((token, rx)) = updates {
        while !handle.store.is_complete() && Instant::now() < deadline {
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(update) => print_update(&update, cli.json),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        engine.observers().unsubscribe_token(token);
    }

    if !handle.wait(deadline.saturating_duration_since(Instant::now())) {
        warn!("Not every category finished within {}s; reporting what is known", cli.wait);
    }
    let snapshot = handle.snapshot();

    let mut ctx = ReportContext::new(cli.technician);
    ctx.ticket_id = cli.ticket;
    ctx.customer = cli.customer;

    if cli.json {
        let json = serde_json::to_string_pretty(&serde_json::Value::Object(snapshot.to_flat_map()))
            .context("failed to encode snapshot")?;
        println!("{json}");
    } else {
        print!("{}", report::format_report(&snapshot, &ctx));
    }

    if let Some(dir) = &cli.report_dir {
        let paths = report::save_report(dir, &snapshot, &ctx)
            .with_context(|| format!("failed to save report to {}", dir.display()))?;
        for path in paths {
            eprintln!("Saved {}", path.display());
        }
    }

    Ok(())
}

/// One progressive update. Goes to stderr when stdout carries JSON.
fn print_update(update: &InfoUpdate, json: bool) {
    let value = match &update.value {
        InfoValue::Text(s) => s.clone(),
        InfoValue::Count(n) => n.to_string(),
        InfoValue::Flag(b) => b.to_string(),
        InfoValue::Drives(d) => format!("{} drive(s)", d.len()),
        other => serde_json::to_string(other).unwrap_or_default(),
    };
    let line = format!("[{}] {}: {value}", update.generation, update.key.as_str());
    if json {
        eprintln!("{line}");
    } else {
        println!("{line}");
    }
}
