//! GatewayBlueprint - Config Loader output
//!
//! Describes every broker of the gateway: its delivery mode, queue, drain
//! timing and the sink it forwards to.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Broker definitions
    pub brokers: Vec<BrokerConfig>,
}

/// One named destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Unique identifier, used by producers to pick the broker
    pub id: String,

    /// Delivery mode
    pub mode: BrokerMode,

    /// Queue capacity in records (async only)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Drain loop timing (async only)
    #[serde(default)]
    pub drain: DrainConfig,

    /// Downstream sink
    pub sink: SinkConfig,
}

/// Default queue capacity for async brokers
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

/// Delivery mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerMode {
    /// Deliver each payload before acknowledging the producer
    Sync,
    /// Queue, batch and deliver later
    Async,
}

/// Drain loop timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainConfig {
    /// Deadline between flushes while idle (ms)
    #[serde(default = "default_interval_ms")]
    pub default_interval_ms: u64,

    /// Deadline after the first arrival since the last flush (ms)
    #[serde(default = "default_short_interval_ms")]
    pub short_interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    500
}

fn default_short_interval_ms() -> u64 {
    50
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: default_interval_ms(),
            short_interval_ms: default_short_interval_ms(),
        }
    }
}

impl DrainConfig {
    /// Default deadline as a `Duration`
    pub fn default_interval(&self) -> Duration {
        Duration::from_millis(self.default_interval_ms)
    }

    /// Shortened deadline as a `Duration`
    pub fn short_interval(&self) -> Duration {
        Duration::from_millis(self.short_interval_ms)
    }
}

/// Sub-batch limits for store-backed sinks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Estimated byte size at which a sub-batch is closed
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: usize,

    /// Maximum number of sub-batches in flight
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

fn default_max_batch_bytes() -> usize {
    10 * 1024
}

fn default_max_in_flight() -> usize {
    100
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_bytes: default_max_batch_bytes(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

/// Sink output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink type
    pub sink_type: SinkType,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,

    /// Sub-batch limits (store-backed sinks only)
    #[serde(default)]
    pub batch: BatchConfig,
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Tracing output
    Log,
    /// Append to a single file
    File,
    /// In-process store
    Memory,
    /// One segment file per sub-batch
    Segment,
}

impl SinkType {
    /// Whether the sink splits flushes into parallel sub-batches
    pub fn is_store_backed(&self) -> bool {
        matches!(self, Self::Memory | Self::Segment)
    }
}

impl GatewayBlueprint {
    /// Find a broker definition by id
    pub fn broker(&self, id: &str) -> Option<&BrokerConfig> {
        self.brokers.iter().find(|b| b.id == id)
    }

    /// Ids of every async broker
    pub fn async_broker_ids(&self) -> impl Iterator<Item = &str> {
        self.brokers
            .iter()
            .filter(|b| b.mode == BrokerMode::Async)
            .map(|b| b.id.as_str())
    }
}
