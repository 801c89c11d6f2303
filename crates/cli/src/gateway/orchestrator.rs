//! Gateway orchestrator - feeds input lines into a broker group.

use std::future::Future;
use std::time::Instant;

use anyhow::{Context, Result};
use broker::{BrokerError, Group};
use contracts::GatewayBlueprint;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use super::GatewayStats;
use crate::error::CliError;

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Broker definitions
    pub blueprint: GatewayBlueprint,

    /// Broker receiving the input (None = the only configured broker)
    pub broker: Option<String>,

    /// Restart every async broker after this many lines (None = never)
    pub restart_after_lines: Option<u64>,

    /// Keep the trailing newline in each payload
    pub keep_newlines: bool,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Builds the broker group and pumps input into it
pub struct Gateway {
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    /// Run until the input ends or `shutdown` resolves
    ///
    /// Every async broker is stopped (and so drained) before returning, also
    /// when reading the input failed.
    pub async fn run<R, F>(self, input: R, shutdown: F) -> Result<GatewayStats>
    where
        R: AsyncBufRead + Unpin,
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let group = broker::build_group(&self.config.blueprint)
            .await
            .context("Failed to build broker group")?;
        let target = self.resolve_target(&group).await?;

        let started = group.start_all().await;
        info!(target = %target, drain_loops = started, "Gateway running");

        let mut stats = GatewayStats::default();
        let pumped = self
            .pump(&group, &target, input, shutdown, &mut stats)
            .await;

        info!("Shutting down gateway...");
        group.stop_all().await;

        stats.duration = start_time.elapsed();
        stats.brokers = group.metrics().await;
        info!(
            lines = stats.lines_read,
            accepted = stats.accepted,
            duration_secs = stats.duration.as_secs_f64(),
            "Gateway shutdown complete"
        );

        pumped.map(|()| stats)
    }

    async fn resolve_target(&self, group: &Group) -> Result<String> {
        let ids = group.ids().await;
        match &self.config.broker {
            Some(id) if ids.contains(id) => Ok(id.clone()),
            Some(id) => Err(CliError::unknown_broker(id, &ids).into()),
            None if ids.len() == 1 => Ok(ids[0].clone()),
            None => Err(CliError::BrokerRequired { count: ids.len() }.into()),
        }
    }

    async fn pump<R, F>(
        &self,
        group: &Group,
        target: &str,
        input: R,
        shutdown: F,
        stats: &mut GatewayStats,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        F: Future<Output = ()>,
    {
        let broker = group.lookup(target).await?;
        let mut lines = input.lines();
        tokio::pin!(shutdown);

        loop {
            let line = tokio::select! {
                line = lines.next_line() => line.context("Failed to read input")?,
                () = &mut shutdown => {
                    warn!("Received shutdown signal, stopping gateway...");
                    return Ok(());
                }
            };
            let Some(mut line) = line else {
                info!(lines = stats.lines_read, "Input closed");
                return Ok(());
            };

            stats.lines_read += 1;
            if self.config.keep_newlines {
                line.push('\n');
            }

            match broker.enqueue(line).await {
                Ok(()) => stats.accepted += 1,
                Err(BrokerError::Overloaded { .. }) => stats.overloaded += 1,
                Err(e) => {
                    warn!(broker = %target, error = %e, "Enqueue failed");
                    stats.failed += 1;
                }
            }

            if let Some(every) = self.config.restart_after_lines {
                if stats.lines_read.is_multiple_of(every) {
                    debug!(lines = stats.lines_read, "Restarting brokers");
                    group.restart_all().await;
                    stats.restarts += 1;
                }
            }
        }
    }
}
