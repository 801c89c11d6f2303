//! # Broker
//!
//! 数据接入核心模块。
//!
//! 负责：
//! - 按名称接收 payload，同步直送或异步入队
//! - 异步 broker 的 drain loop：攒批、flush、失败剩余重试
//! - Group 注册表与批量 start/stop/restart
//! - 并发受限的 sub-batch 写入与部分失败恢复

pub mod batch;
pub mod broker;
mod drain;
pub mod error;
pub mod factory;
pub mod group;
pub mod metrics;
pub mod sinks;

pub use batch::BatchExecutor;
pub use broker::{Broker, BrokerBuilder};
pub use contracts::{BatchFailure, BatchStore, DeliverBatch, DeliverOne, Payload};
pub use error::BrokerError;
pub use factory::{broker_builder, build_group};
pub use group::Group;
pub use metrics::{BrokerMetrics, MetricsSnapshot};
pub use sinks::{FileSink, FileSinkConfig, LogSink, MemoryStore, SegmentStore, StoreSink};
