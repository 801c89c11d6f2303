//! Broker metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Metrics for a single broker
#[derive(Debug, Default)]
pub struct BrokerMetrics {
    /// Payloads accepted by `enqueue`
    enqueued: AtomicU64,
    /// Payloads rejected because the queue was full
    overloaded: AtomicU64,
    /// Payloads confirmed delivered by the sink
    delivered: AtomicU64,
    /// Deliveries that returned an error
    failures: AtomicU64,
    /// Current drain cache length
    cache_len: AtomicUsize,
    /// Completed drain loop shutdowns
    shutdowns: AtomicU64,
}

impl BrokerMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn inc_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn overloaded(&self) -> u64 {
        self.overloaded.load(Ordering::Relaxed)
    }

    pub fn inc_overloaded(&self) {
        self.overloaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn add_delivered(&self, count: u64) {
        self.delivered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn inc_failures(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_len(&self) -> usize {
        self.cache_len.load(Ordering::Relaxed)
    }

    pub fn set_cache_len(&self, len: usize) {
        self.cache_len.store(len, Ordering::Relaxed);
    }

    pub fn shutdowns(&self) -> u64 {
        self.shutdowns.load(Ordering::Relaxed)
    }

    pub fn inc_shutdowns(&self) {
        self.shutdowns.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            enqueued: self.enqueued(),
            overloaded: self.overloaded(),
            delivered: self.delivered(),
            failures: self.failures(),
            cache_len: self.cache_len(),
            shutdowns: self.shutdowns(),
        }
    }
}

/// Snapshot of broker metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub enqueued: u64,
    pub overloaded: u64,
    pub delivered: u64,
    pub failures: u64,
    pub cache_len: usize,
    pub shutdowns: u64,
}
