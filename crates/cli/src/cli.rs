//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Ingest Gateway - named brokers in front of sync and batched sinks
#[derive(Parser, Debug)]
#[command(
    name = "ingest-gateway",
    author,
    version,
    about = "Ingestion gateway with sync and batched async brokers",
    long_about = "Routes byte payloads to named brokers.\n\n\
                  Sync brokers deliver each payload before acknowledging it; async \n\
                  brokers queue, batch and deliver in the background. `run` reads \n\
                  one payload per line from stdin."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "INGEST_GATEWAY_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "INGEST_GATEWAY_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the gateway, reading payloads from stdin
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "gateway.toml",
        env = "INGEST_GATEWAY_CONFIG"
    )]
    pub config: PathBuf,

    /// Broker that receives stdin lines (required with more than one broker)
    #[arg(short, long, env = "INGEST_GATEWAY_BROKER")]
    pub broker: Option<String>,

    /// Restart every async broker after this many lines (0 = never)
    #[arg(long, default_value = "0", env = "INGEST_GATEWAY_RESTART_AFTER_LINES")]
    pub restart_after_lines: u64,

    /// Keep the trailing newline of each line in the payload
    #[arg(long)]
    pub keep_newlines: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "INGEST_GATEWAY_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "gateway.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "gateway.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
