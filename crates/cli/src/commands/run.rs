//! `run` command implementation.

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::gateway::{Gateway, GatewayConfig};

/// Execute the `run` command
pub async fn run_gateway(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    info!(
        brokers = blueprint.brokers.len(),
        async_brokers = blueprint.async_broker_ids().count(),
        "Configuration loaded"
    );

    let gateway = Gateway::new(GatewayConfig {
        blueprint,
        broker: args.broker.clone(),
        restart_after_lines: (args.restart_after_lines > 0).then_some(args.restart_after_lines),
        keep_newlines: args.keep_newlines,
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    });

    info!("Reading payloads from stdin...");
    let input = BufReader::new(tokio::io::stdin());
    let stats = gateway
        .run(input, shutdown_signal())
        .await
        .context("Gateway execution failed")?;

    info!(
        accepted = stats.accepted,
        overloaded = stats.overloaded,
        failed = stats.failed,
        throughput = format!("{:.2}", stats.throughput()),
        "Gateway completed"
    );
    stats.print_summary();

    info!("Ingest Gateway finished");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
///
/// A handler that can not be installed never fires; the other one still does.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
