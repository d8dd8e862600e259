// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! pr - profile-run orchestrator CLI front-end.
//!
//! A thin call-site over `pr-runner`: parses a profile name and engine
//! command, loads the small TOML configuration (`config` module), wires
//! up OS signal forwarding, and drives `pr_runner::run_profile`. Argument
//! parsing, configuration schema, and process exit-code mapping are this
//! crate's concern, not the orchestrator core's (spec.md §1, §7).

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pr_core::arg_builder::VecArgBuilder;
use pr_core::{ProfileCommand, ProgressReceiver, SystemClock, Summary};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Parser)]
#[command(
    name = "pr",
    version,
    about = "Orchestrates a named backup profile against an external backup engine"
)]
struct Cli {
    /// Path to the TOML profile configuration.
    #[arg(short = 'c', long = "config", default_value = "profiles.toml")]
    config: PathBuf,

    /// Name of the profile to run.
    profile: String,

    #[command(subcommand)]
    command: Command,

    /// Skip the filesystem lock entirely.
    #[arg(long)]
    no_lock: bool,

    /// How long to wait for the lock / remote-lock retries, in seconds.
    #[arg(long = "lock-wait")]
    lock_wait_secs: Option<u64>,

    /// Log the engine invocation without actually spawning it.
    #[arg(long)]
    dry_run: bool,

    /// Extra arguments forwarded verbatim to the engine.
    #[arg(long = "extra-arg")]
    extra_args: Vec<String>,

    /// Path to the engine binary.
    #[arg(long, default_value = "restic")]
    engine: String,
}

#[derive(Subcommand)]
enum Command {
    /// Run a backup.
    Backup,
    /// Verify repository consistency.
    Check,
    /// Initialize the repository.
    Init,
    /// Copy snapshots to a secondary repository.
    Copy,
    /// Apply retention policy (the engine's `forget` subcommand).
    Forget,
    /// List snapshots.
    Snapshots,
    /// Any other engine subcommand, passed through unchanged.
    Run { subcommand: String },
}

impl Command {
    fn into_profile_command(self) -> ProfileCommand {
        match self {
            Command::Backup => ProfileCommand::Backup,
            Command::Check => ProfileCommand::Check,
            Command::Init => ProfileCommand::Init,
            Command::Copy => ProfileCommand::Copy,
            Command::Forget => ProfileCommand::Other("forget".to_string()),
            Command::Snapshots => ProfileCommand::Other("snapshots".to_string()),
            Command::Run { subcommand } => ProfileCommand::Other(subcommand),
        }
    }
}

/// Logs one line per engine invocation via `tracing` (spec.md §6 progress
/// receivers); this is the CLI's stand-in for a richer renderer, which
/// spec.md §1 explicitly leaves to the caller.
struct LoggingProgressReceiver;

impl ProgressReceiver for LoggingProgressReceiver {
    fn summary(&self, command: &str, summary: &Summary, stderr: &str, succeeded: bool) {
        if succeeded {
            tracing::info!(
                command,
                elapsed_ms = summary.duration.as_millis() as u64,
                "invocation succeeded"
            );
        } else {
            tracing::warn!(
                command,
                elapsed_ms = summary.duration.as_millis() as u64,
                stderr,
                "invocation failed"
            );
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(err) = run().await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config_file = config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let profile = config_file.profile(&cli.profile)?;
    let global = config_file.global;

    let (signal_tx, _keep_alive_rx) = broadcast::channel(8);
    spawn_signal_forwarder(signal_tx.clone());

    let ctx = pr_runner::RunContext {
        profile,
        global,
        command: cli.command.into_profile_command(),
        engine_program: cli.engine,
        extra_args: cli.extra_args,
        arg_builder: Box::new(VecArgBuilder::new(Vec::new())),
        dry_run: cli.dry_run,
        holder: pr_runner::default_holder(),
        signal_tx,
        progress: vec![Arc::new(LoggingProgressReceiver) as Arc<dyn ProgressReceiver>],
        no_lock: cli.no_lock,
        lock_wait: cli.lock_wait_secs.map(Duration::from_secs),
        clock: Arc::new(SystemClock),
    };

    pr_runner::run_profile(ctx).await?;
    Ok(())
}

/// Multiplexes SIGINT/SIGTERM into the broadcast channel every process
/// runner invocation subscribes to (spec.md §5 "Signal channel").
fn spawn_signal_forwarder(tx: broadcast::Sender<pr_core::Signal>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut terminate = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sig) => sig,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to install SIGTERM handler");
                    return;
                }
            };
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        let _ = tx.send(pr_core::Signal::Interrupt);
                    }
                    _ = terminate.recv() => {
                        let _ = tx.send(pr_core::Signal::Terminate);
                    }
                }
            }
        }
        #[cfg(not(unix))]
        {
            loop {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = tx.send(pr_core::Signal::Interrupt);
                }
            }
        }
    });
}
