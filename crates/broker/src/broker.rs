//! Broker - one named destination, sync or async

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info_span, instrument, warn, Instrument};

use contracts::{DeliverBatch, DeliverOne, DrainConfig, Payload, DEFAULT_QUEUE_CAPACITY};

use crate::drain::DrainWorker;
use crate::error::BrokerError;
use crate::metrics::BrokerMetrics;

/// A named destination that either delivers inline or queues for a drain loop
pub struct Broker {
    id: String,
    mode: Mode,
    metrics: Arc<BrokerMetrics>,
}

enum Mode {
    Sync { sink: Arc<dyn DeliverOne> },
    Async(AsyncLane),
}

struct AsyncLane {
    tx: mpsc::Sender<Payload>,
    capacity: usize,
    sink_name: String,
    slot: Mutex<WorkerSlot>,
}

/// Where the queue consumer currently lives
enum WorkerSlot {
    /// Parked between runs; owns the receiver and cache
    Idle(DrainWorker),
    /// Moved into a spawned drain loop
    Running {
        shutdown: oneshot::Sender<()>,
        handle: JoinHandle<DrainWorker>,
    },
    /// The drain task panicked and took the receiver with it
    Lost,
}

impl Broker {
    /// Start a sync broker definition
    pub fn sync(id: impl Into<String>, sink: Arc<dyn DeliverOne>) -> BrokerBuilder {
        BrokerBuilder::new(id).deliver_one(sink)
    }

    /// Start an async broker definition
    ///
    /// `queue_capacity` is counted in records, not bytes.
    pub fn asynchronous(
        id: impl Into<String>,
        queue_capacity: usize,
        sink: Arc<dyn DeliverBatch>,
    ) -> BrokerBuilder {
        BrokerBuilder::new(id)
            .deliver_batch(sink)
            .queue_capacity(queue_capacity)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_async(&self) -> bool {
        matches!(self.mode, Mode::Async(_))
    }

    /// Name of the sink this broker delivers to
    pub fn sink_name(&self) -> &str {
        match &self.mode {
            Mode::Sync { sink } => sink.name(),
            Mode::Async(lane) => &lane.sink_name,
        }
    }

    pub fn metrics(&self) -> &Arc<BrokerMetrics> {
        &self.metrics
    }

    /// Queue capacity (async only)
    pub fn queue_capacity(&self) -> Option<usize> {
        match &self.mode {
            Mode::Sync { .. } => None,
            Mode::Async(lane) => Some(lane.capacity),
        }
    }

    /// Payloads waiting in the queue (async only)
    pub fn queue_len(&self) -> usize {
        match &self.mode {
            Mode::Sync { .. } => 0,
            Mode::Async(lane) => lane.capacity - lane.tx.capacity(),
        }
    }

    /// Process one payload
    ///
    /// A sync broker delivers it now and returns the sink's result. An async
    /// broker queues it without waiting; a full queue drops the payload and
    /// returns [`BrokerError::Overloaded`].
    pub async fn enqueue(&self, bytes: impl Into<Bytes>) -> Result<(), BrokerError> {
        let payload = Payload::now(bytes);

        match &self.mode {
            Mode::Sync { sink } => {
                self.metrics.inc_enqueued();
                match sink.deliver(payload).await {
                    Ok(()) => {
                        self.metrics.add_delivered(1);
                        Ok(())
                    }
                    Err(e) => {
                        self.metrics.inc_failures();
                        Err(BrokerError::Sink(e))
                    }
                }
            }
            Mode::Async(lane) => match lane.tx.try_send(payload) {
                Ok(()) => {
                    self.metrics.inc_enqueued();
                    observability::record_enqueued(&self.id);
                    Ok(())
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.metrics.inc_overloaded();
                    observability::record_overloaded(&self.id);
                    warn!(broker = %self.id, capacity = lane.capacity, "Queue full, payload dropped");
                    Err(BrokerError::overloaded(&self.id))
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    error!(broker = %self.id, "Drain worker gone, payload dropped");
                    Err(BrokerError::Unavailable {
                        broker: self.id.clone(),
                    })
                }
            },
        }
    }

    /// Whether a drain loop is currently running
    pub async fn is_running(&self) -> bool {
        match &self.mode {
            Mode::Sync { .. } => false,
            Mode::Async(lane) => matches!(*lane.slot.lock().await, WorkerSlot::Running { .. }),
        }
    }

    /// Spawn the drain loop
    ///
    /// Returns false for sync brokers and for loops that are already running.
    #[instrument(name = "broker_start", skip(self), fields(broker = %self.id))]
    pub(crate) async fn start(&self) -> bool {
        let Mode::Async(lane) = &self.mode else {
            return false;
        };

        let mut slot = lane.slot.lock().await;
        match std::mem::replace(&mut *slot, WorkerSlot::Lost) {
            WorkerSlot::Idle(worker) => {
                let (shutdown, shutdown_rx) = oneshot::channel();
                let span = info_span!("drain_loop", broker = %self.id);
                let handle = tokio::spawn(worker.run(shutdown_rx).instrument(span));
                *slot = WorkerSlot::Running { shutdown, handle };
                debug!(broker = %self.id, "Drain loop spawned");
                true
            }
            running @ WorkerSlot::Running { .. } => {
                warn!(broker = %self.id, "Drain loop already running, start ignored");
                *slot = running;
                false
            }
            WorkerSlot::Lost => {
                error!(broker = %self.id, "Drain worker was lost, broker can not be restarted");
                false
            }
        }
    }

    /// Request shutdown and wait until the drain loop acknowledges it
    ///
    /// The loop only exits once its cache is empty, so this waits for as long
    /// as the sink keeps failing.
    #[instrument(name = "broker_stop", skip(self), fields(broker = %self.id))]
    pub(crate) async fn stop(&self) {
        let Mode::Async(lane) = &self.mode else {
            return;
        };

        let mut slot = lane.slot.lock().await;
        match std::mem::replace(&mut *slot, WorkerSlot::Lost) {
            WorkerSlot::Running { shutdown, handle } => {
                debug!(broker = %self.id, "Sent shutdown");
                // The loop may have exited on its own; its handle still resolves
                let _ = shutdown.send(());
                match handle.await {
                    Ok(worker) => {
                        debug!(broker = %self.id, "Broker exited");
                        *slot = WorkerSlot::Idle(worker);
                    }
                    Err(e) => {
                        error!(broker = %self.id, error = ?e, "Drain task panicked");
                    }
                }
            }
            other => *slot = other,
        }
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("id", &self.id)
            .field("async", &self.is_async())
            .field("sink", &self.sink_name())
            .finish()
    }
}

/// Definition of a broker before it is registered
///
/// Exactly one of `deliver_one` / `deliver_batch` must be set.
#[derive(Default)]
pub struct BrokerBuilder {
    id: String,
    deliver_one: Option<Arc<dyn DeliverOne>>,
    deliver_batch: Option<Arc<dyn DeliverBatch>>,
    queue_capacity: Option<usize>,
    drain: Option<DrainConfig>,
}

impl BrokerBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Deliver each payload inline
    pub fn deliver_one(mut self, sink: Arc<dyn DeliverOne>) -> Self {
        self.deliver_one = Some(sink);
        self
    }

    /// Queue payloads and deliver them in batches
    pub fn deliver_batch(mut self, sink: Arc<dyn DeliverBatch>) -> Self {
        self.deliver_batch = Some(sink);
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn drain(mut self, config: DrainConfig) -> Self {
        self.drain = Some(config);
        self
    }

    /// Validate the definition and create the broker
    ///
    /// Unset async fields fall back to defaults.
    pub fn build(self) -> Result<Broker, BrokerError> {
        if self.id.is_empty() {
            return Err(BrokerError::config("broker id must not be empty"));
        }

        let metrics = Arc::new(BrokerMetrics::new());

        let mode = match (self.deliver_one, self.deliver_batch) {
            (Some(_), Some(_)) | (None, None) => {
                return Err(BrokerError::config(format!(
                    "broker '{}' must provide either deliver_one or deliver_batch",
                    self.id
                )));
            }
            (Some(sink), None) => Mode::Sync { sink },
            (None, Some(sink)) => {
                let capacity = self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY);
                if capacity == 0 {
                    return Err(BrokerError::config(format!(
                        "broker '{}' queue capacity must be > 0",
                        self.id
                    )));
                }

                let drain = self.drain.unwrap_or_default();
                if drain.short_interval_ms == 0 || drain.default_interval_ms == 0 {
                    return Err(BrokerError::config(format!(
                        "broker '{}' drain intervals must be > 0",
                        self.id
                    )));
                }

                let sink_name = sink.name().to_string();
                let (tx, rx) = mpsc::channel(capacity);
                let worker = DrainWorker::new(&self.id, sink, rx, drain, Arc::clone(&metrics));

                Mode::Async(AsyncLane {
                    tx,
                    capacity,
                    sink_name,
                    slot: Mutex::new(WorkerSlot::Idle(worker)),
                })
            }
        };

        Ok(Broker {
            id: self.id,
            mode,
            metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use contracts::{BatchFailure, ContractError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sink that records every payload and can be told to fail
    #[derive(Default)]
    struct RecordingSink {
        received: std::sync::Mutex<Vec<Bytes>>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl RecordingSink {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn received(&self) -> Vec<Bytes> {
            self.received.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeliverOne for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn deliver(&self, payload: Payload) -> Result<(), ContractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ContractError::sink_write("recording", "mock failure"));
            }
            self.received.lock().unwrap().push(payload.bytes);
            Ok(())
        }
    }

    #[async_trait]
    impl DeliverBatch for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn deliver_batch(&self, batch: Vec<Payload>) -> Result<(), BatchFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.received
                .lock()
                .unwrap()
                .extend(batch.into_iter().map(|p| p.bytes));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sync_enqueue_delivers_once() {
        let sink = Arc::new(RecordingSink::default());
        let broker = Broker::sync("fs-sync", sink.clone()).build().unwrap();

        broker.enqueue("hello").await.unwrap();

        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.received(), vec![Bytes::from("hello")]);
        assert!(!broker.is_async());
        assert_eq!(broker.metrics().delivered(), 1);
    }

    #[tokio::test]
    async fn test_sync_enqueue_returns_sink_error() {
        let sink = Arc::new(RecordingSink::failing());
        let broker = Broker::sync("fs-sync", sink.clone()).build().unwrap();

        let err = broker.enqueue("hello").await.unwrap_err();

        assert!(matches!(err, BrokerError::Sink(ContractError::SinkWrite { .. })));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert_eq!(broker.metrics().failures(), 1);
    }

    #[tokio::test]
    async fn test_async_enqueue_fails_fast_when_full() {
        let sink = Arc::new(RecordingSink::default());
        let broker = Broker::asynchronous("fs-async", 3, sink.clone())
            .build()
            .unwrap();

        for msg in ["foo", "bar", "foobar"] {
            broker.enqueue(msg).await.unwrap();
        }
        assert_eq!(broker.queue_len(), 3);

        let err = broker.enqueue("overflow").await.unwrap_err();
        assert!(matches!(err, BrokerError::Overloaded { .. }));
        assert!(err.is_retryable());
        assert_eq!(broker.metrics().enqueued(), 3);
        assert_eq!(broker.metrics().overloaded(), 1);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_drains_queue_and_start_resumes() {
        let sink = Arc::new(RecordingSink::default());
        let broker = Broker::asynchronous("fs-async", 10, sink.clone())
            .build()
            .unwrap();

        broker.enqueue("foo").await.unwrap();
        broker.enqueue("bar").await.unwrap();

        assert!(broker.start().await);
        assert!(broker.is_running().await);
        broker.stop().await;
        assert!(!broker.is_running().await);
        assert_eq!(sink.received(), vec![Bytes::from("foo"), Bytes::from("bar")]);

        // Same queue is consumed again after a restart
        broker.enqueue("foobar").await.unwrap();
        assert!(broker.start().await);
        broker.stop().await;
        assert_eq!(sink.received().len(), 3);
        assert_eq!(broker.metrics().shutdowns(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_ignored() {
        let sink = Arc::new(RecordingSink::default());
        let broker = Broker::asynchronous("fs-async", 10, sink).build().unwrap();

        assert!(broker.start().await);
        assert!(!broker.start().await);
        broker.stop().await;
        assert_eq!(broker.metrics().shutdowns(), 1);
    }

    struct CrashingSink;

    #[async_trait]
    impl DeliverBatch for CrashingSink {
        fn name(&self) -> &str {
            "crashing"
        }

        async fn deliver_batch(&self, _batch: Vec<Payload>) -> Result<(), BatchFailure> {
            panic!("sink crashed");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_drain_worker_makes_broker_unavailable() {
        let broker = Broker::asynchronous("fs-async", 10, Arc::new(CrashingSink))
            .build()
            .unwrap();

        broker.enqueue("boom").await.unwrap();
        assert!(broker.start().await);
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;

        let err = broker.enqueue("after").await.unwrap_err();
        assert!(matches!(err, BrokerError::Unavailable { .. }));
        assert!(!err.is_retryable());

        broker.stop().await;
        assert!(!broker.start().await);
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let sink = Arc::new(RecordingSink::default());
        let broker = Broker::asynchronous("fs-async", 10, sink).build().unwrap();
        broker.stop().await;
        assert!(!broker.is_running().await);
    }

    #[test]
    fn test_builder_rejects_both_strategies() {
        let sink = Arc::new(RecordingSink::default());
        let result = BrokerBuilder::new("both")
            .deliver_one(sink.clone())
            .deliver_batch(sink)
            .build();
        assert!(matches!(result, Err(BrokerError::Config { .. })));
    }

    #[test]
    fn test_builder_rejects_neither_strategy() {
        let result = BrokerBuilder::new("neither").build();
        assert!(matches!(result, Err(BrokerError::Config { .. })));
    }

    #[test]
    fn test_builder_rejects_empty_id_and_zero_capacity() {
        let sink = Arc::new(RecordingSink::default());
        assert!(matches!(
            Broker::sync("", sink.clone()).build(),
            Err(BrokerError::Config { .. })
        ));
        assert!(matches!(
            Broker::asynchronous("zero", 0, sink).build(),
            Err(BrokerError::Config { .. })
        ));
    }

    #[tokio::test]
    async fn test_builder_fills_async_defaults() {
        let sink = Arc::new(RecordingSink::default());
        let broker = BrokerBuilder::new("defaults")
            .deliver_batch(sink)
            .build()
            .unwrap();
        assert_eq!(broker.queue_capacity(), Some(DEFAULT_QUEUE_CAPACITY));
        assert_eq!(broker.sink_name(), "recording");
    }
}
