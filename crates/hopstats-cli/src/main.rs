//! CLI for hop statistics aggregation.

mod runner;

use clap::{Parser, Subcommand};
use hopstats_core::SchedulerConfig;
use std::path::PathBuf;
use std::process::ExitCode;

/// Hopstats - continuous traceroute hop statistics.
#[derive(Parser, Debug)]
#[command(name = "hopstats")]
#[command(version)]
#[command(about = "Aggregates traceroute probe records into per-hop statistics")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long = "log-level", global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream newline-delimited probe records and emit rate-limited snapshots.
    Live {
        /// Read records from this file instead of stdin.
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Minimum time between two emitted snapshots, in milliseconds.
        #[arg(long = "min-interval-ms", default_value = "100")]
        min_interval_ms: u64,

        /// Emit snapshots as indented JSON.
        #[arg(long)]
        pretty: bool,
    },
    /// Group a finished single trace by hop and responder identity.
    Group {
        /// Read records from this file instead of stdin.
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Print per-group statistics instead of the grouped attempts.
        #[arg(long)]
        summary: bool,
    },
}

impl Args {
    fn log_filter(&self) -> &'static str {
        if self.verbose {
            return "debug";
        }
        match self.log_level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => "info",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Logs go to stderr; stdout carries only JSON.
    tracing_subscriber::fmt()
        .with_env_filter(args.log_filter())
        .with_writer(std::io::stderr)
        .init();

    let result = match args.command {
        Command::Live {
            input,
            min_interval_ms,
            pretty,
        } => {
            let config = SchedulerConfig::new(min_interval_ms);
            runner::run_live(input.as_deref(), config, pretty).await
        }
        Command::Group { input, summary } => runner::run_group(input.as_deref(), summary).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
