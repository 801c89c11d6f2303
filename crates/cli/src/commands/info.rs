//! `info` command implementation.

use std::collections::HashMap;

use anyhow::{Context, Result};
use contracts::{BatchConfig, BrokerConfig, BrokerMode, DrainConfig, GatewayBlueprint};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::CliError;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    brokers: Vec<BrokerInfo>,
}

#[derive(Serialize)]
struct BrokerInfo {
    id: String,
    mode: BrokerMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    queue_capacity: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    drain: Option<DrainConfig>,
    sink: SinkInfo,
}

#[derive(Serialize)]
struct SinkInfo {
    sink_type: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    params: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    batch: Option<BatchConfig>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint);
    }

    Ok(())
}

fn build_broker_info(broker: &BrokerConfig) -> BrokerInfo {
    let is_async = broker.mode == BrokerMode::Async;
    BrokerInfo {
        id: broker.id.clone(),
        mode: broker.mode,
        queue_capacity: is_async.then_some(broker.queue_capacity),
        drain: is_async.then_some(broker.drain),
        sink: SinkInfo {
            sink_type: format!("{:?}", broker.sink.sink_type),
            params: broker.sink.params.clone(),
            batch: broker
                .sink
                .sink_type
                .is_store_backed()
                .then_some(broker.sink.batch),
        },
    }
}

fn build_config_info(blueprint: &GatewayBlueprint) -> ConfigInfo {
    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        brokers: blueprint.brokers.iter().map(build_broker_info).collect(),
    }
}

fn print_config_info(blueprint: &GatewayBlueprint) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Ingest Gateway Configuration                   ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📍 Version: {:?}", blueprint.version);

    println!("\n📤 Brokers ({})", blueprint.brokers.len());
    for (i, broker) in blueprint.brokers.iter().enumerate() {
        let is_last = i == blueprint.brokers.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };

        println!("   {} {} ({:?})", prefix, broker.id, broker.mode);
        println!(
            "   {}  ├─ Sink: {:?}",
            child_prefix, broker.sink.sink_type
        );

        let mut params: Vec<_> = broker.sink.params.iter().collect();
        params.sort();
        for (key, value) in params {
            println!("   {}  │    {} = {}", child_prefix, key, value);
        }

        if broker.sink.sink_type.is_store_backed() {
            println!(
                "   {}  ├─ Sub-batch: {} bytes, {} in flight",
                child_prefix, broker.sink.batch.max_batch_bytes, broker.sink.batch.max_in_flight
            );
        }

        if broker.mode == BrokerMode::Async {
            println!(
                "   {}  └─ Queue: {} records, drain every {}ms ({}ms after arrival)",
                child_prefix,
                broker.queue_capacity,
                broker.drain.default_interval_ms,
                broker.drain.short_interval_ms
            );
        } else {
            println!("   {}  └─ Delivered inline", child_prefix);
        }
    }

    println!();
}
