//! # Contracts
//!
//! Frozen interface contracts shared by every gateway crate: the payload type,
//! the two sink strategies and the configuration blueprint.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Payloads carry the wall-clock instant (`chrono::Utc`) they were enqueued at
//! - Drain timing uses the tokio monotonic clock

mod blueprint;
mod error;
mod payload;
mod sink;

pub use blueprint::*;
pub use error::*;
pub use payload::*;
pub use sink::*;
