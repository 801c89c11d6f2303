//! Store-backed sinks
//!
//! `StoreSink` splits each flush into parallel sub-batches through the
//! [`BatchExecutor`]. The backend only has to commit one sub-batch at a time.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use contracts::{
    BatchConfig, BatchFailure, BatchStore, ContractError, DeliverBatch, DeliverOne, Payload,
};

use crate::batch::BatchExecutor;

/// Batched sink over a shared [`BatchStore`]
pub struct StoreSink<S> {
    name: String,
    store: Arc<S>,
    executor: BatchExecutor,
}

impl<S> StoreSink<S>
where
    S: BatchStore + Sync + 'static,
{
    pub fn new(name: impl Into<String>, store: S, config: BatchConfig) -> Self {
        Self::with_shared(name, Arc::new(store), config)
    }

    /// Share a store that the caller keeps a handle to
    pub fn with_shared(name: impl Into<String>, store: Arc<S>, config: BatchConfig) -> Self {
        Self {
            name: name.into(),
            store,
            executor: BatchExecutor::new(config),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn batch_config(&self) -> &BatchConfig {
        self.executor.config()
    }
}

#[async_trait]
impl<S> DeliverBatch for StoreSink<S>
where
    S: BatchStore + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver_batch(&self, batch: Vec<Payload>) -> Result<(), BatchFailure> {
        self.executor.execute(&self.store, batch).await
    }
}

#[async_trait]
impl<S> DeliverOne for StoreSink<S>
where
    S: BatchStore + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, payload: Payload) -> Result<(), ContractError> {
        self.store.execute(std::slice::from_ref(&payload)).await
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-process store that keeps every committed sub-batch
///
/// Failures can be scripted: `fail_next(n)` fails the next n commits, and a
/// sub-batch containing a poisoned payload fails until `heal()` is called.
#[derive(Default)]
pub struct MemoryStore {
    name: String,
    batches: Mutex<Vec<Vec<Payload>>>,
    poisoned: Mutex<HashSet<Bytes>>,
    fail_next: AtomicUsize,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Hold every commit for `latency` before applying it
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next `count` commits
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Reject any sub-batch that contains `bytes`
    pub fn poison(&self, bytes: impl Into<Bytes>) {
        self.lock_poisoned().insert(bytes.into());
    }

    pub fn heal(&self) {
        self.lock_poisoned().clear();
    }

    /// Committed sub-batches, in commit order
    pub fn batches(&self) -> Vec<Vec<Payload>> {
        self.lock_batches().clone()
    }

    /// Every committed payload, flattened in commit order
    pub fn committed(&self) -> Vec<Payload> {
        self.lock_batches().iter().flatten().cloned().collect()
    }

    /// Highest number of commits observed running at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    // A panicking test holder must not wedge the store
    fn lock_batches(&self) -> std::sync::MutexGuard<'_, Vec<Vec<Payload>>> {
        self.batches.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_poisoned(&self) -> std::sync::MutexGuard<'_, HashSet<Bytes>> {
        self.poisoned.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn commit(&self, batch: &[Payload]) -> Result<(), ContractError> {
        let scripted = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted {
            return Err(ContractError::sink_write(&self.name, "scripted failure"));
        }

        {
            let poisoned = self.lock_poisoned();
            if batch.iter().any(|p| poisoned.contains(&p.bytes)) {
                return Err(ContractError::sink_write(
                    &self.name,
                    "sub-batch contains a rejected payload",
                ));
            }
        }

        self.lock_batches().push(batch.to_vec());
        Ok(())
    }
}

impl BatchStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, batch: &[Payload]) -> Result<(), ContractError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let result = self.commit(batch);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

// ============================================================================
// SegmentStore
// ============================================================================

const SEGMENT_EXTENSION: &str = "seg";
const RECORD_HEADER_BYTES: usize = 8 + 4;

/// Store that commits each sub-batch as one immutable segment file
///
/// Segment layout, per record: timestamp millis (i64 LE), length (u32 LE),
/// content. A segment is written to a temporary name and renamed into place,
/// so readers never see a partial sub-batch.
pub struct SegmentStore {
    name: String,
    dir: PathBuf,
    seq: AtomicU64,
}

impl SegmentStore {
    /// Create the store, creating `dir` if needed
    pub fn create(name: impl Into<String>, dir: impl Into<PathBuf>) -> Result<Self, ContractError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            name: name.into(),
            dir,
            seq: AtomicU64::new(0),
        })
    }

    /// Create from params map (for factory); `dir` is required
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let dir = params.get("dir").filter(|d| !d.is_empty()).ok_or_else(|| {
            ContractError::config_validation("sink.params.dir", "segment sink requires a dir")
        })?;
        Self::create(name, dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Serialize a sub-batch into one segment body
    pub fn encode(batch: &[Payload]) -> Result<Bytes, ContractError> {
        let size = batch.iter().map(|p| RECORD_HEADER_BYTES + p.len()).sum();
        let mut buf = BytesMut::with_capacity(size);
        for payload in batch {
            let len = u32::try_from(payload.len()).map_err(|_| {
                ContractError::segment(format!("payload of {} bytes exceeds record limit", payload.len()))
            })?;
            buf.put_i64_le(payload.timestamp.timestamp_millis());
            buf.put_u32_le(len);
            buf.put_slice(&payload.bytes);
        }
        Ok(buf.freeze())
    }

    /// Parse a segment body
    pub fn decode(mut data: Bytes) -> Result<Vec<Payload>, ContractError> {
        let mut payloads = Vec::new();
        while data.has_remaining() {
            if data.remaining() < RECORD_HEADER_BYTES {
                return Err(ContractError::segment("truncated record header"));
            }
            let millis = data.get_i64_le();
            let len = data.get_u32_le() as usize;
            if data.remaining() < len {
                return Err(ContractError::segment("truncated record body"));
            }
            let timestamp: DateTime<Utc> = DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| ContractError::segment(format!("invalid timestamp {millis}")))?;
            payloads.push(Payload::with_timestamp(data.split_to(len), timestamp));
        }
        Ok(payloads)
    }

    /// Read back every committed payload, oldest segment first
    pub async fn read_all(&self) -> Result<Vec<Payload>, ContractError> {
        let mut segments = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == SEGMENT_EXTENSION) {
                segments.push(path);
            }
        }
        segments.sort();

        let mut payloads = Vec::new();
        for path in segments {
            let data = tokio::fs::read(&path).await?;
            payloads.extend(Self::decode(Bytes::from(data))?);
        }
        Ok(payloads)
    }

    fn segment_path(&self) -> PathBuf {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let millis = Utc::now().timestamp_millis();
        self.dir
            .join(format!("{millis:013}-{seq:08}.{SEGMENT_EXTENSION}"))
    }
}

impl BatchStore for SegmentStore {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "segment_store_execute",
        skip(self, batch),
        fields(store = %self.name, items = batch.len())
    )]
    async fn execute(&self, batch: &[Payload]) -> Result<(), ContractError> {
        let body = Self::encode(batch)?;
        let path = self.segment_path();
        let tmp = path.with_extension("tmp");

        let written = async {
            tokio::fs::write(&tmp, &body).await?;
            tokio::fs::rename(&tmp, &path).await
        }
        .await;

        if let Err(e) = written {
            // Best effort; a stray .tmp is never read back
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(ContractError::sink_write(&self.name, e.to_string()));
        }

        debug!(store = %self.name, path = %path.display(), bytes = body.len(), "Segment committed");
        Ok(())
    }
}
