//! DrainWorker - moves queued payloads into a cache and flushes it
//!
//! One worker per async broker. The worker owns the queue receiver and the
//! cache; nothing else touches either while the loop runs.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use contracts::{BatchFailure, DeliverBatch, DrainConfig, Payload};

use crate::metrics::BrokerMetrics;

const INITIAL_CACHE_CAPACITY: usize = 80;

/// Wake-up reasons of the drain loop
#[derive(Debug)]
enum DrainEvent {
    /// A payload was pulled off the queue
    Item(Payload),
    /// The flush deadline elapsed
    Deadline,
    /// Shutdown was requested (or the requester went away)
    Shutdown,
    /// Every queue sender was dropped
    QueueClosed,
}

/// Worker state of one async broker
pub(crate) struct DrainWorker {
    broker: String,
    sink: Arc<dyn DeliverBatch>,
    rx: mpsc::Receiver<Payload>,
    cache: Vec<Payload>,
    config: DrainConfig,
    metrics: Arc<BrokerMetrics>,
}

impl DrainWorker {
    pub(crate) fn new(
        broker: impl Into<String>,
        sink: Arc<dyn DeliverBatch>,
        rx: mpsc::Receiver<Payload>,
        config: DrainConfig,
        metrics: Arc<BrokerMetrics>,
    ) -> Self {
        Self {
            broker: broker.into(),
            sink,
            rx,
            cache: Vec::with_capacity(INITIAL_CACHE_CAPACITY),
            config,
            metrics,
        }
    }

    /// Payloads waiting for delivery
    #[cfg(test)]
    pub(crate) fn cache(&self) -> &[Payload] {
        &self.cache
    }

    fn absorb(&mut self, payload: Payload) {
        self.cache.push(payload);
        self.update_cache_len();
    }

    /// Move whatever is queued right now into the cache
    fn absorb_queued(&mut self) {
        while let Ok(payload) = self.rx.try_recv() {
            self.cache.push(payload);
        }
        self.update_cache_len();
    }

    fn update_cache_len(&self) {
        self.metrics.set_cache_len(self.cache.len());
        observability::record_cache_depth(&self.broker, self.cache.len());
    }

    /// Hand the whole cache to the sink
    ///
    /// On failure the cache becomes the remainder reported by the sink.
    /// Returns true when everything was delivered.
    pub(crate) async fn flush(&mut self) -> bool {
        if self.cache.is_empty() {
            return true;
        }

        let batch = std::mem::take(&mut self.cache);
        let attempted = batch.len();

        let success = match self.sink.deliver_batch(batch).await {
            Ok(()) => {
                self.metrics.add_delivered(attempted as u64);
                observability::record_flush(&self.broker, attempted, true);
                debug!(broker = %self.broker, items = attempted, "Batch delivered");
                true
            }
            Err(BatchFailure { remainder, error }) => {
                let delivered = attempted.saturating_sub(remainder.len());
                self.metrics.add_delivered(delivered as u64);
                self.metrics.inc_failures();
                observability::record_flush(&self.broker, delivered, false);
                warn!(
                    broker = %self.broker,
                    sink = self.sink.name(),
                    attempted,
                    remaining = remainder.len(),
                    transient = error.is_transient(),
                    error = %error,
                    "Failed to send batch"
                );
                self.cache = remainder;
                false
            }
        };

        self.update_cache_len();
        success
    }

    /// Run until shutdown is requested and the cache is empty
    ///
    /// Returns the worker so the receiver (and any cache) survive a restart.
    pub(crate) async fn run(mut self, mut shutdown: oneshot::Receiver<()>) -> Self {
        let default_interval = self.config.default_interval();
        let short_interval = self.config.short_interval();

        let deadline = time::sleep(default_interval);
        tokio::pin!(deadline);

        let mut reduced_deadline = false;
        let mut shutdown_requested = false;
        let mut queue_closed = false;

        debug!(broker = %self.broker, "Drain loop started");

        loop {
            let event = tokio::select! {
                item = self.rx.recv(), if !queue_closed => match item {
                    Some(payload) => DrainEvent::Item(payload),
                    None => DrainEvent::QueueClosed,
                },
                () = &mut deadline => DrainEvent::Deadline,
                _ = &mut shutdown, if !shutdown_requested => DrainEvent::Shutdown,
            };

            match event {
                DrainEvent::Item(payload) => {
                    self.absorb(payload);
                    if !reduced_deadline {
                        deadline.as_mut().reset(Instant::now() + short_interval);
                        reduced_deadline = true;
                    }
                }
                DrainEvent::Deadline => {
                    if shutdown_requested {
                        self.absorb_queued();
                        if self.cache.is_empty() {
                            break;
                        }
                    }
                    self.flush().await;
                    reduced_deadline = false;
                    deadline.as_mut().reset(Instant::now() + default_interval);
                }
                DrainEvent::Shutdown => {
                    debug!(
                        broker = %self.broker,
                        pending = self.cache.len(),
                        "Shutdown requested, draining cache"
                    );
                    shutdown_requested = true;
                }
                DrainEvent::QueueClosed => {
                    debug!(broker = %self.broker, "Queue closed, draining cache");
                    queue_closed = true;
                    shutdown_requested = true;
                }
            }
        }

        self.metrics.inc_shutdowns();
        info!(broker = %self.broker, "Drain loop exited");
        self
    }
}
