//! Gateway orchestration module.

mod orchestrator;
mod stats;

pub use orchestrator::{Gateway, GatewayConfig};
pub use stats::GatewayStats;
