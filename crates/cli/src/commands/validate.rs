//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{BatchConfig, BrokerMode, DrainConfig, GatewayBlueprint, DEFAULT_QUEUE_CAPACITY};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    broker_count: usize,
    sync_count: usize,
    async_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            let async_count = blueprint.async_broker_ids().count();

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    broker_count: blueprint.brokers.len(),
                    sync_count: blueprint.brokers.len() - async_count,
                    async_count,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (settings that have no effect)
fn collect_warnings(blueprint: &GatewayBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    for broker in &blueprint.brokers {
        if broker.mode == BrokerMode::Sync {
            if broker.queue_capacity != DEFAULT_QUEUE_CAPACITY {
                warnings.push(format!(
                    "Broker '{}' is sync - queue_capacity is ignored",
                    broker.id
                ));
            }
            if broker.drain != DrainConfig::default() {
                warnings.push(format!(
                    "Broker '{}' is sync - drain settings are ignored",
                    broker.id
                ));
            }
        }

        if !broker.sink.sink_type.is_store_backed() && broker.sink.batch != BatchConfig::default() {
            warnings.push(format!(
                "Broker '{}' uses a {:?} sink - batch settings are ignored",
                broker.id, broker.sink.sink_type
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Brokers: {}", summary.broker_count);
            println!("  Sync: {}", summary.sync_count);
            println!("  Async: {}", summary.async_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
