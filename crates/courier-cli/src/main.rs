//! courier - outbox delivery command-line interface.

mod commands;
mod telemetry;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use courier_core::CourierConfig;
use courier_core::app::CourierBuilder;

use crate::telemetry::LogFormat;

#[derive(Parser)]
#[command(name = "courier")]
#[command(about = "Durable outbox delivery for finished-match exports")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON config file
    #[arg(short, long, env = "COURIER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact, global = true)]
    log_format: LogFormat,

    /// Directory holding the outbox files; overrides the config file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Outbox {
    Document,
    Http,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SweepTarget {
    Document,
    Http,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Queue (or re-queue) an artifact for delivery
    Enqueue {
        #[arg(value_enum)]
        outbox: Outbox,
        /// Subject (match) id
        #[arg(long)]
        subject: String,
        /// Season or other partition of the subject
        #[arg(long)]
        partition: Option<String>,
        /// Artifact file name inside the export directory
        #[arg(long)]
        file: String,
        /// Id the artifact was exported under, if not the subject id
        #[arg(long = "override")]
        override_id: Option<String>,
    },
    /// Run one sweep now and print what it did
    Sweep {
        #[arg(value_enum, default_value_t = SweepTarget::All)]
        target: SweepTarget,
    },
    /// Show outbox counts and items
    Status {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Keep both outboxes drained until interrupted
    Run {
        /// Seconds between scheduled sweeps
        #[arg(long, default_value_t = 300)]
        interval_secs: u64,
    },
    /// Delete delivered items older than the given age
    Prune {
        #[arg(long)]
        older_than_days: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = CourierConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    telemetry::init(&config.log_level, cli.log_format)?;

    let courier = CourierBuilder::new(config).build().context("wiring courier")?;

    match cli.command {
        Command::Enqueue {
            outbox,
            subject,
            partition,
            file,
            override_id,
        } => commands::enqueue(&courier, outbox, subject, partition, file, override_id).await,
        Command::Sweep { target } => commands::sweep(&courier, target).await,
        Command::Status { format } => commands::status(&courier, format).await,
        Command::Run { interval_secs } => commands::run(&courier, interval_secs).await,
        Command::Prune { older_than_days } => commands::prune(&courier, older_than_days).await,
    }
}
