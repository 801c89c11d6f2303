//! Factory - turns a GatewayBlueprint into a registered Group

use std::sync::Arc;

use tracing::{info, instrument};

use contracts::{
    BrokerConfig, BrokerMode, DeliverBatch, DeliverOne, GatewayBlueprint, SinkConfig, SinkType,
};

use crate::broker::{Broker, BrokerBuilder};
use crate::error::BrokerError;
use crate::group::Group;
use crate::sinks::{FileSink, LogSink, MemoryStore, SegmentStore, StoreSink};

/// Build every broker of the blueprint and register it
///
/// Drain loops are not started; call [`Group::start_all`].
#[instrument(
    name = "factory_build_group",
    skip(blueprint),
    fields(broker_count = blueprint.brokers.len())
)]
pub async fn build_group(blueprint: &GatewayBlueprint) -> Result<Group, BrokerError> {
    let group = Group::new();
    for config in &blueprint.brokers {
        group.add(broker_builder(config)?).await?;
    }
    info!(brokers = group.len().await, "Group built");
    Ok(group)
}

/// Create the builder for one broker, including its sink
#[instrument(
    name = "factory_broker_builder",
    skip(config),
    fields(broker = %config.id, sink_type = ?config.sink.sink_type)
)]
pub fn broker_builder(config: &BrokerConfig) -> Result<BrokerBuilder, BrokerError> {
    let builder = match config.sink.sink_type {
        SinkType::Log => attach(config, Arc::new(LogSink::new(&config.id))),
        SinkType::File => {
            let sink = FileSink::from_params(&config.id, &config.sink.params)
                .map_err(|e| sink_creation(config, e))?;
            attach(config, Arc::new(sink))
        }
        SinkType::Memory => {
            let store = MemoryStore::new(&config.id);
            attach(config, Arc::new(store_sink(&config.id, store, &config.sink)))
        }
        SinkType::Segment => {
            let store = SegmentStore::from_params(&config.id, &config.sink.params)
                .map_err(|e| sink_creation(config, e))?;
            attach(config, Arc::new(store_sink(&config.id, store, &config.sink)))
        }
    };
    Ok(builder)
}

fn store_sink<S>(name: &str, store: S, sink: &SinkConfig) -> StoreSink<S>
where
    S: contracts::BatchStore + Sync + 'static,
{
    StoreSink::new(name, store, sink.batch)
}

/// Wire a sink that supports both strategies according to the broker mode
fn attach<S>(config: &BrokerConfig, sink: Arc<S>) -> BrokerBuilder
where
    S: DeliverOne + DeliverBatch + 'static,
{
    match config.mode {
        BrokerMode::Sync => Broker::sync(&config.id, sink),
        BrokerMode::Async => Broker::asynchronous(&config.id, config.queue_capacity, sink)
            .drain(config.drain),
    }
}

fn sink_creation(config: &BrokerConfig, e: contracts::ContractError) -> BrokerError {
    BrokerError::config(format!("broker '{}' sink creation failed: {e}", config.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{BatchConfig, ConfigVersion, DrainConfig};
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn broker_config(id: &str, mode: BrokerMode, sink_type: SinkType) -> BrokerConfig {
        BrokerConfig {
            id: id.to_string(),
            mode,
            queue_capacity: 16,
            drain: DrainConfig::default(),
            sink: SinkConfig {
                sink_type,
                params: HashMap::new(),
                batch: BatchConfig::default(),
            },
        }
    }

    #[tokio::test]
    async fn test_build_group_from_blueprint() {
        let dir = tempdir().unwrap();
        let mut file = broker_config("fs-sync", BrokerMode::Sync, SinkType::File);
        file.sink.params.insert(
            "path".to_string(),
            dir.path().join("fs-sync").display().to_string(),
        );

        let blueprint = GatewayBlueprint {
            version: ConfigVersion::V1,
            brokers: vec![
                file,
                broker_config("log-async", BrokerMode::Async, SinkType::Log),
                broker_config("mem-async", BrokerMode::Async, SinkType::Memory),
            ],
        };

        let group = build_group(&blueprint).await.unwrap();
        assert_eq!(group.ids().await, vec!["fs-sync", "log-async", "mem-async"]);

        let mem = group.lookup("mem-async").await.unwrap();
        assert!(mem.is_async());
        assert_eq!(mem.queue_capacity(), Some(16));

        group.enqueue("fs-sync", "hello").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("fs-sync")).unwrap(),
            "hello"
        );
    }

    #[tokio::test]
    async fn test_duplicate_ids_fail() {
        let blueprint = GatewayBlueprint {
            version: ConfigVersion::V1,
            brokers: vec![
                broker_config("dup", BrokerMode::Sync, SinkType::Log),
                broker_config("dup", BrokerMode::Async, SinkType::Log),
            ],
        };
        assert!(matches!(
            build_group(&blueprint).await,
            Err(BrokerError::Config { .. })
        ));
    }

    #[test]
    fn test_file_sink_without_path_fails() {
        let config = broker_config("fs", BrokerMode::Async, SinkType::File);
        assert!(matches!(
            broker_builder(&config),
            Err(BrokerError::Config { .. })
        ));
    }
}
