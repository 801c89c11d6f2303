//! Sink contracts - broker output interfaces
//!
//! A broker delivers either one payload at a time (`DeliverOne`) or whole
//! batches (`DeliverBatch`). Both are object safe so a group can hold brokers
//! backed by different sinks.

use async_trait::async_trait;

use crate::{ContractError, Payload};

/// Deliver a single payload now
#[async_trait]
pub trait DeliverOne: Send + Sync {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Store or side-effect the payload once
    ///
    /// # Errors
    /// Returned verbatim to the producer by a sync broker
    async fn deliver(&self, payload: Payload) -> Result<(), ContractError>;
}

/// Deliver a batch now, reporting what could not be committed
#[async_trait]
pub trait DeliverBatch: Send + Sync {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Commit as many payloads as possible
    ///
    /// # Errors
    /// On partial or total failure, returns the payloads that were not
    /// durably committed, in their original relative order.
    async fn deliver_batch(&self, batch: Vec<Payload>) -> Result<(), BatchFailure>;
}

/// Outcome of a failed batch delivery
#[derive(Debug)]
pub struct BatchFailure {
    /// Payloads to retry
    pub remainder: Vec<Payload>,

    /// Representative error
    pub error: ContractError,
}

impl BatchFailure {
    /// Create a batch failure
    pub fn new(remainder: Vec<Payload>, error: ContractError) -> Self {
        Self { remainder, error }
    }
}

/// Backend that commits one sub-batch atomically
///
/// Used by store-backed sinks that split a flush into parallel sub-batches.
/// A single handle is shared by every in-flight sub-batch.
#[trait_variant::make(BatchStore: Send)]
pub trait LocalBatchStore {
    /// Backend name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Commit every payload of the sub-batch, or none of them
    async fn execute(&self, batch: &[Payload]) -> Result<(), ContractError>;
}
