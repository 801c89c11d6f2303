//! Payload - the unit of data moved through a broker
//!
//! Bytes are opaque to the gateway; only their length is ever inspected.

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Fixed per-item overhead used when estimating the size of a stored row:
/// a 16 byte row id plus a 16 byte timestamp.
pub const PAYLOAD_OVERHEAD_BYTES: usize = 16 + 16;

/// One producer payload plus the instant it entered the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// Assigned at enqueue time
    pub timestamp: DateTime<Utc>,

    /// Opaque content
    pub bytes: Bytes,
}

impl Payload {
    /// Create a payload stamped with the current time
    pub fn now(bytes: impl Into<Bytes>) -> Self {
        Self {
            timestamp: Utc::now(),
            bytes: bytes.into(),
        }
    }

    /// Create a payload with an explicit timestamp
    pub fn with_timestamp(bytes: impl Into<Bytes>, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            bytes: bytes.into(),
        }
    }

    /// Content length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when the content is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Estimated stored size: fixed overhead plus content length
    pub fn size_hint(&self) -> usize {
        PAYLOAD_OVERHEAD_BYTES + self.bytes.len()
    }
}
