//! Gamify daemon: entry point for running the ledger engine.

use anyhow::Context;
use clap::Parser;
use gamify_engine::{
    init_logging, Engine, EngineConfig, LogFormat, ShutdownController, StoreBackend,
};
use gamify_types::{EventId, LedgerTransaction};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "gamify-daemon", about = "Idempotent ledger and batch processing engine")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base;
    /// CLI flags and env vars override them.
    #[arg(long, env = "GAMIFY_CONFIG")]
    config: Option<PathBuf>,

    /// Storage backend: "memory" or "lmdb".
    #[arg(long, env = "GAMIFY_BACKEND")]
    backend: Option<String>,

    /// Data directory for the LMDB store.
    #[arg(long, env = "GAMIFY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log format: "human" or "json".
    #[arg(long, env = "GAMIFY_LOG_FORMAT")]
    log_format: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "GAMIFY_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the period-closure schedule until SIGINT or SIGTERM.
    Run,
    /// Run one closure pass and print its report.
    ClosePeriods,
    /// Apply a JSON array of ledger transactions.
    ApplyBatch {
        /// File holding the transactions.
        #[arg(long)]
        file: PathBuf,
        /// Caller identity used for admission.
        #[arg(long, default_value = "daemon")]
        caller: String,
    },
    /// Conclude a voting event and print the winner.
    ConcludeVoting {
        #[arg(long)]
        event: String,
        #[arg(long, default_value = "daemon")]
        caller: String,
    },
    /// Print the effective configuration as TOML.
    PrintConfig,
}

fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_toml_file(&path.to_string_lossy())
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(backend) = cli.backend.as_deref() {
        config.store.backend = match backend.to_ascii_lowercase().as_str() {
            "memory" => StoreBackend::Memory,
            "lmdb" => StoreBackend::Lmdb,
            other => anyhow::bail!("unknown backend {other:?}, expected \"memory\" or \"lmdb\""),
        };
    }
    if let Some(dir) = &cli.data_dir {
        config.store.data_dir = dir.clone();
    }
    if let Some(format) = &cli.log_format {
        config.log_format = format.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let format: LogFormat = config.log_format.parse()?;
    init_logging(format, &config.log_level)?;
    if let Some(path) = &cli.config {
        tracing::info!(path = %path.display(), "loaded config");
    }

    if let Command::PrintConfig = cli.command {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let engine = Engine::open(config)?;

    match cli.command {
        Command::Run => {
            let interval = engine.config().closure.interval_secs;
            tracing::info!(
                backend = ?engine.config().store.backend,
                interval_secs = interval,
                "starting closure schedule"
            );
            let shutdown = Arc::new(ShutdownController::new());
            let signal = shutdown.signal();
            let signals = shutdown.clone();
            tokio::spawn(async move { signals.wait_for_signal().await });

            let runs = engine.scheduler().run(signal).await;
            tracing::info!(runs, "gamify daemon exited cleanly");
        }
        Command::ClosePeriods => {
            let report = engine.run_closure().await?;
            println!(
                "closed {} period(s), {} remaining, {} standing(s) written, {} successor(s) created{}",
                report.periods_closed,
                report.periods_remaining,
                report.standings_written,
                report.successors_created,
                if report.timed_out { " (time budget reached)" } else { "" },
            );
        }
        Command::ApplyBatch { file, caller } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let batch: Vec<LedgerTransaction> = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", file.display()))?;
            let total = batch.len();
            let results = engine.apply_batch(&caller, batch).await?;

            let mut failed = 0usize;
            for (index, result) in results.iter().enumerate() {
                match result {
                    Ok(receipt) => println!(
                        "{index}: {} score={} duplicate={} badges={}",
                        receipt.state.participant_id,
                        receipt.state.total_score,
                        receipt.already_applied,
                        receipt.badges_granted,
                    ),
                    Err(err) => {
                        failed += 1;
                        println!("{index}: error: {err}");
                    }
                }
            }
            tracing::info!(total, failed, "batch finished");
            if failed > 0 {
                anyhow::bail!("{failed} of {total} transaction(s) failed");
            }
        }
        Command::ConcludeVoting { event, caller } => {
            let outcome = engine.conclude_voting(&caller, &EventId::new(event)).await?;
            match &outcome.winner {
                Some(winner) => println!(
                    "winner {winner} with {} of {} vote(s)",
                    outcome.winning_votes, outcome.total_votes
                ),
                None => println!("no winner ({} vote(s))", outcome.total_votes),
            }
        }
        Command::PrintConfig => {}
    }

    Ok(())
}
