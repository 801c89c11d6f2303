//! LogSink - logs payload summaries via tracing

use async_trait::async_trait;
use tracing::{info, instrument};

use contracts::{BatchFailure, ContractError, DeliverBatch, DeliverOne, Payload};

/// Sink that logs what it receives and never fails
pub struct LogSink {
    name: String,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl DeliverOne for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "log_sink_deliver", skip(self, payload), fields(sink = %self.name))]
    async fn deliver(&self, payload: Payload) -> Result<(), ContractError> {
        info!(
            sink = %self.name,
            timestamp = %payload.timestamp,
            len = payload.len(),
            "Payload received"
        );
        Ok(())
    }
}

#[async_trait]
impl DeliverBatch for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "log_sink_deliver_batch", skip(self, batch), fields(sink = %self.name))]
    async fn deliver_batch(&self, batch: Vec<Payload>) -> Result<(), BatchFailure> {
        let bytes: usize = batch.iter().map(Payload::len).sum();
        info!(
            sink = %self.name,
            items = batch.len(),
            bytes,
            first = ?batch.first().map(|p| p.timestamp),
            last = ?batch.last().map(|p| p.timestamp),
            "Batch received"
        );
        Ok(())
    }
}
