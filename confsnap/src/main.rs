//! confsnap - back up the running configuration of every device in an
//! inventory.
//!
//! # Usage
//!
//! ```bash
//! confsnap devices.json
//! confsnap devices.csv -o backups -j 8 --catalog extra_types.json
//! RUST_LOG=confsnap=trace confsnap devices.json --host-key-verification strict
//! ```
//!
//! Fatal start-up errors (unreadable inventory or catalog) exit with status 1.
//! Per-device failures are written to the error log and never stop the run.
//! If the error log cannot be written, the summary is still printed and the
//! exit status is 1.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use tokio::sync::watch;

use confsnap::{
    ArtifactWriter, BackupOrchestrator, CommandCatalog, ErrorLog, HostKeyVerification, RunConfig,
    RunSummary, SessionClient, SshConnector, SshOptions, load_inventory,
};

#[derive(Parser, Debug)]
#[command(name = "confsnap")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Back up running configurations of network devices over SSH", long_about = None)]
struct Cli {
    /// Device inventory file (.json or .csv)
    inventory: PathBuf,

    /// Directory for configuration files
    #[arg(short, long, env = "CONFSNAP_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// File that failures are appended to
    #[arg(long, env = "CONFSNAP_ERROR_LOG", default_value = "error.log")]
    error_log: PathBuf,

    /// Number of devices processed at once
    #[arg(short = 'j', long, default_value_t = 4)]
    concurrency: usize,

    /// Connect and command timeout in seconds (per-record `timeout` overrides)
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Upper bound for one device's whole session, in seconds
    #[arg(long, default_value_t = 120, value_parser = clap::value_parser!(u64).range(1..))]
    device_timeout: u64,

    /// Stop starting new devices after this many seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    run_timeout: Option<u64>,

    /// JSON file with additional device types
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Host key checking mode
    #[arg(long, value_enum, default_value_t = HostKeyMode::AcceptNew)]
    host_key_verification: HostKeyMode,

    /// Alternate known_hosts file
    #[arg(long)]
    known_hosts: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum HostKeyMode {
    Strict,
    AcceptNew,
    Disabled,
}

impl From<HostKeyMode> for HostKeyVerification {
    fn from(mode: HostKeyMode) -> Self {
        match mode {
            HostKeyMode::Strict => HostKeyVerification::Strict,
            HostKeyMode::AcceptNew => HostKeyVerification::AcceptNew,
            HostKeyMode::Disabled => HostKeyVerification::Disabled,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let mut catalog = CommandCatalog::builtin();
    if let Some(path) = &cli.catalog {
        let added = catalog
            .extend_from_file(path)
            .with_context(|| format!("failed to load catalog {}", path.display()))?;
        info!("loaded {} device types from {}", added, path.display());
    }

    let devices = load_inventory(&cli.inventory)
        .with_context(|| format!("failed to load inventory {}", cli.inventory.display()))?;
    info!("loaded {} devices, starting backup", devices.len());

    let mut options = SshOptions::default()
        .with_timeout(Duration::from_secs(cli.timeout))
        .with_host_key_verification(cli.host_key_verification.into());
    if let Some(path) = &cli.known_hosts {
        options = options.with_known_hosts(path);
    }

    let client = SessionClient::new(Arc::new(catalog), SshConnector::new(options))
        .with_device_timeout(Duration::from_secs(cli.device_timeout));

    let mut config = RunConfig::default().with_concurrency(cli.concurrency);
    if let Some(secs) = cli.run_timeout {
        config = config.with_run_timeout(Duration::from_secs(secs));
    }

    let (reporter, error_log) = ErrorLog::spawn(&cli.error_log);
    let orchestrator =
        BackupOrchestrator::new(client, ArtifactWriter::new(&cli.output_dir), reporter)
            .with_config(config);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing devices already in progress");
            let _ = cancel_tx.send(true);
        }
    });

    let summary = orchestrator.run_with_cancel(devices, cancel_rx).await;
    drop(orchestrator);

    finish_run(&summary, error_log, cli.json, &mut std::io::stdout().lock()).await
}

/// Print the summary, then flush the error log.
///
/// The summary is always printed; a log that could not be written turns
/// into an error afterwards.
async fn finish_run(
    summary: &RunSummary,
    error_log: ErrorLog,
    json: bool,
    out: &mut impl Write,
) -> Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(summary)?)?;
    } else {
        writeln!(out, "all devices processed: {}", summary)?;
    }
    out.flush()?;

    let logged = error_log
        .finish()
        .await
        .context("failed to write error log")?;
    if logged > 0 {
        info!("{} failures recorded in error log", logged);
    }

    Ok(())
}
