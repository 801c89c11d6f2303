//! # Ingest Gateway CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 配置加载与验证
//! - Broker group 编排与生命周期管理
//! - 优雅关闭处理

mod cli;
mod commands;
mod error;
mod gateway;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_gateway, run_info, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    init_logging(&cli)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Ingest Gateway CLI starting"
    );

    let result = match &cli.command {
        Commands::Run(args) => run_gateway(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Initialize logging based on CLI options
///
/// The Prometheus exporter is installed later by `run`, only when asked for.
fn init_logging(cli: &Cli) -> Result<()> {
    let mut config = ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port: None,
        ..Default::default()
    };
    config = if cli.quiet {
        config.quiet()
    } else {
        config.with_verbosity(cli.verbose)
    };

    observability::init_with_config(config)
}
