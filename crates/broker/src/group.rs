//! Group - registry of brokers keyed by id
//!
//! Structural changes take the write lock and lookups the read lock. Lifecycle
//! sweeps copy the broker handles out and release the lock before waiting on
//! any drain loop. A broker removed while its drain loop runs is dropped once
//! the last handle to it goes away; its queue contents are not drained.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::broker::{Broker, BrokerBuilder};
use crate::error::BrokerError;
use crate::metrics::MetricsSnapshot;

/// A set of brokers with bulk start/stop/restart
#[derive(Debug, Default)]
pub struct Group {
    brokers: RwLock<HashMap<String, Arc<Broker>>>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and register a broker
    ///
    /// # Errors
    /// [`BrokerError::Config`] for an invalid definition or a duplicate id.
    #[instrument(name = "group_add", skip(self, builder), fields(broker = %builder.id()))]
    pub async fn add(&self, builder: BrokerBuilder) -> Result<Arc<Broker>, BrokerError> {
        let broker = Arc::new(builder.build()?);
        let mut brokers = self.brokers.write().await;

        if brokers.contains_key(broker.id()) {
            return Err(BrokerError::config(format!(
                "broker '{}' already exists",
                broker.id()
            )));
        }

        brokers.insert(broker.id().to_string(), Arc::clone(&broker));
        info!(broker = %broker.id(), async_mode = broker.is_async(), "Broker added");
        Ok(broker)
    }

    /// [`Group::add`] for fixed startup configuration
    ///
    /// # Panics
    /// If the broker can not be added.
    pub async fn must_add(&self, builder: BrokerBuilder) -> Arc<Broker> {
        match self.add(builder).await {
            Ok(broker) => broker,
            Err(e) => panic!("failed to add broker: {e}"),
        }
    }

    /// Unregister a broker without stopping or draining it
    ///
    /// # Errors
    /// [`BrokerError::NotFound`] if no broker has this id.
    #[instrument(name = "group_remove", skip(self))]
    pub async fn remove(&self, id: &str) -> Result<Arc<Broker>, BrokerError> {
        let removed = self
            .brokers
            .write()
            .await
            .remove(id)
            .ok_or_else(|| BrokerError::not_found(id))?;
        info!(broker = %id, "Broker removed");
        Ok(removed)
    }

    /// [`Group::remove`] for fixed startup configuration
    ///
    /// # Panics
    /// If no broker has this id.
    pub async fn must_remove(&self, id: &str) -> Arc<Broker> {
        match self.remove(id).await {
            Ok(broker) => broker,
            Err(e) => panic!("failed to remove broker: {e}"),
        }
    }

    /// Shared handle to a registered broker
    pub async fn lookup(&self, id: &str) -> Result<Arc<Broker>, BrokerError> {
        self.brokers
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| BrokerError::not_found(id))
    }

    /// Look up `id` and enqueue one payload on it
    pub async fn enqueue(&self, id: &str, bytes: impl Into<Bytes>) -> Result<(), BrokerError> {
        self.lookup(id).await?.enqueue(bytes).await
    }

    /// Spawn the drain loop of every async broker
    ///
    /// Returns how many loops were started. Already running loops are skipped.
    #[instrument(name = "group_start_all", skip(self))]
    pub async fn start_all(&self) -> usize {
        let brokers = self.snapshot().await;
        let mut started = 0;
        for broker in &brokers {
            if broker.start().await {
                started += 1;
            }
        }
        info!(started, total = brokers.len(), "Brokers started");
        started
    }

    /// Stop every async broker, one at a time
    ///
    /// Each broker is asked to shut down and then awaited until its cache is
    /// empty before the next one is signalled. The registry is not locked
    /// while waiting, so producers and structural changes proceed meanwhile.
    #[instrument(name = "group_stop_all", skip(self))]
    pub async fn stop_all(&self) {
        let brokers = self.snapshot().await;
        for broker in &brokers {
            broker.stop().await;
        }
        info!(total = brokers.len(), "Brokers stopped");
    }

    /// Stop then start every async broker
    pub async fn restart_all(&self) -> usize {
        self.stop_all().await;
        self.start_all().await
    }

    /// Registered ids, sorted
    pub async fn ids(&self) -> Vec<String> {
        sorted_ids(&*self.brokers.read().await)
    }

    pub async fn len(&self) -> usize {
        self.brokers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.brokers.read().await.is_empty()
    }

    /// Metrics snapshot of every broker, sorted by id
    pub async fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        let brokers = self.brokers.read().await;
        sorted_ids(&brokers)
            .into_iter()
            .map(|id| {
                let snapshot = brokers[&id].metrics().snapshot();
                (id, snapshot)
            })
            .collect()
    }

    /// Registered brokers sorted by id, taken under a short read lock
    async fn snapshot(&self) -> Vec<Arc<Broker>> {
        let brokers = self.brokers.read().await;
        sorted_ids(&brokers)
            .into_iter()
            .filter_map(|id| brokers.get(&id).cloned())
            .collect()
    }
}

fn sorted_ids(brokers: &HashMap<String, Arc<Broker>>) -> Vec<String> {
    let mut ids: Vec<_> = brokers.keys().cloned().collect();
    ids.sort();
    ids
}
