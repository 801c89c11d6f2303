//! BatchExecutor - bounded-parallel sub-batch writes with partial-failure recovery
//!
//! A flush is split into sub-batches by estimated byte size. Each sub-batch is
//! committed as its own task; a semaphore limits how many run at once. Failed
//! sub-batches are handed back whole, so the remainder is sub-batch granular.
//! A sub-batch whose task panics counts as failed and is handed back as well.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{debug, error, instrument};

use contracts::{BatchConfig, BatchFailure, BatchStore, ContractError, Payload};

/// Contiguous slice of the original batch, owned by one task
#[derive(Debug, Clone)]
struct SubBatch {
    start: usize,
    end: usize,
    payloads: Vec<Payload>,
}

/// A sub-batch that did not commit
#[derive(Debug)]
struct SubBatchFailure {
    start: usize,
    end: usize,
    payloads: Vec<Payload>,
    error: ContractError,
}

/// Split, dispatch and reassemble batches against a [`BatchStore`]
#[derive(Debug, Clone, Copy)]
pub struct BatchExecutor {
    config: BatchConfig,
}

impl BatchExecutor {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Commit `batch` through `store`
    ///
    /// # Errors
    /// Returns the payloads of every failed sub-batch, in original order, and
    /// the error of the first failure observed.
    #[instrument(
        name = "batch_execute",
        skip(self, store, batch),
        fields(store = store.name(), items = batch.len())
    )]
    pub async fn execute<S>(&self, store: &Arc<S>, batch: Vec<Payload>) -> Result<(), BatchFailure>
    where
        S: BatchStore + Sync + 'static,
    {
        if batch.is_empty() {
            return Ok(());
        }

        let sub_batches = partition(batch, self.config.max_batch_bytes);
        let total = sub_batches.len();

        let gate = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let mut tasks = JoinSet::new();
        // Copies of what each task owns, so a task that dies keeps its payloads
        let mut spawned: HashMap<task::Id, SubBatch> = HashMap::with_capacity(total);
        let mut failures: Vec<SubBatchFailure> = Vec::new();

        for sub in sub_batches {
            // Blocks while max_in_flight sub-batches are running
            let permit = match Arc::clone(&gate).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    failures.push(SubBatchFailure {
                        start: sub.start,
                        end: sub.end,
                        payloads: sub.payloads,
                        error: ContractError::Other(format!("admission gate closed: {e}")),
                    });
                    continue;
                }
            };

            let kept = sub.clone();
            let store = Arc::clone(store);
            let handle = tasks.spawn(async move {
                let result = store.execute(&sub.payloads).await;
                drop(permit);
                match result {
                    Ok(()) => Ok(sub.payloads.len()),
                    Err(error) => Err(SubBatchFailure {
                        start: sub.start,
                        end: sub.end,
                        payloads: sub.payloads,
                        error,
                    }),
                }
            });
            spawned.insert(handle.id(), kept);
        }

        let mut committed = 0usize;
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, Ok(count))) => {
                    spawned.remove(&id);
                    committed += count;
                    observability::record_sub_batch(store.name(), true);
                }
                Ok((id, Err(failure))) => {
                    spawned.remove(&id);
                    observability::record_sub_batch(store.name(), false);
                    debug!(
                        store = store.name(),
                        start = failure.start,
                        end = failure.end,
                        error = %failure.error,
                        "Sub-batch failed"
                    );
                    failures.push(failure);
                }
                Err(e) => {
                    observability::record_sub_batch(store.name(), false);
                    let Some(sub) = spawned.remove(&e.id()) else {
                        error!(store = store.name(), error = ?e, "Unknown sub-batch task aborted");
                        continue;
                    };
                    error!(
                        store = store.name(),
                        start = sub.start,
                        end = sub.end,
                        error = ?e,
                        "Sub-batch task aborted"
                    );
                    failures.push(SubBatchFailure {
                        start: sub.start,
                        end: sub.end,
                        error: ContractError::sub_batch_aborted(
                            store.name(),
                            sub.start,
                            sub.end,
                            e.to_string(),
                        ),
                        payloads: sub.payloads,
                    });
                }
            }
        }

        debug!(
            store = store.name(),
            sub_batches = total,
            committed,
            failed = failures.len(),
            "Batch executed"
        );

        if failures.is_empty() {
            return Ok(());
        }
        Err(assemble_remainder(failures))
    }
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new(BatchConfig::default())
    }
}

/// Close a sub-batch once its estimated size reaches `max_batch_bytes`
///
/// The payload that crosses the threshold belongs to the sub-batch it closes.
fn partition(batch: Vec<Payload>, max_batch_bytes: usize) -> Vec<SubBatch> {
    let len = batch.len();
    let mut sub_batches = Vec::new();
    let mut current = Vec::new();
    let mut current_size = 0usize;
    let mut start = 0usize;

    for (i, payload) in batch.into_iter().enumerate() {
        current_size += payload.size_hint();
        current.push(payload);

        if current_size >= max_batch_bytes || i == len - 1 {
            sub_batches.push(SubBatch {
                start,
                end: i + 1,
                payloads: std::mem::take(&mut current),
            });
            start = i + 1;
            current_size = 0;
        }
    }

    sub_batches
}

/// Concatenate failed sub-batches in original order
///
/// Reports the error of the first failure recorded, not the lowest range.
fn assemble_remainder(failures: Vec<SubBatchFailure>) -> BatchFailure {
    let mut first_error: Option<ContractError> = None;
    let mut ranges = Vec::with_capacity(failures.len());
    for failure in failures {
        if first_error.is_none() {
            first_error = Some(failure.error);
        }
        ranges.push((failure.start, failure.payloads));
    }
    ranges.sort_by_key(|(start, _)| *start);

    let remainder = ranges.into_iter().flat_map(|(_, payloads)| payloads).collect();
    BatchFailure::new(
        remainder,
        first_error.unwrap_or_else(|| ContractError::Other("sub-batch failed".into())),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::MemoryStore;
    use bytes::Bytes;
    use std::time::Duration;

    /// Payloads whose size_hint is exactly `size` bytes
    fn sized_payloads(count: usize, size: usize) -> Vec<Payload> {
        (0..count)
            .map(|i| {
                let mut content = format!("{i:04}").into_bytes();
                content.resize(size - contracts::PAYLOAD_OVERHEAD_BYTES, b'x');
                Payload::now(content)
            })
            .collect()
    }

    fn contents(payloads: &[Payload]) -> Vec<Bytes> {
        payloads.iter().map(|p| p.bytes.clone()).collect()
    }

    #[test]
    fn test_partition_closes_on_threshold() {
        // 100 bytes each, threshold 250: the third item crosses and closes
        let batch = sized_payloads(7, 100);
        let subs = partition(batch, 250);

        let ranges: Vec<_> = subs.iter().map(|s| (s.start, s.end)).collect();
        assert_eq!(ranges, vec![(0, 3), (3, 6), (6, 7)]);
        assert_eq!(subs.iter().map(|s| s.payloads.len()).sum::<usize>(), 7);
    }

    #[test]
    fn test_partition_oversized_item_is_its_own_sub_batch() {
        let mut batch = sized_payloads(1, 100);
        batch.extend(sized_payloads(1, 5000));
        batch.extend(sized_payloads(1, 100));

        let subs = partition(batch, 1000);
        let ranges: Vec<_> = subs.iter().map(|s| (s.start, s.end)).collect();
        assert_eq!(ranges, vec![(0, 2), (2, 3)]);
    }

    #[tokio::test]
    async fn test_execute_success_commits_everything() {
        let store = Arc::new(MemoryStore::new("mem"));
        let executor = BatchExecutor::new(BatchConfig {
            max_batch_bytes: 250,
            max_in_flight: 4,
        });

        let batch = sized_payloads(10, 100);
        let expected = contents(&batch);
        executor.execute(&store, batch).await.unwrap();

        assert_eq!(store.batches().len(), 4);
        let mut committed = contents(&store.committed());
        committed.sort();
        assert_eq!(committed, expected);
    }

    #[tokio::test]
    async fn test_execute_returns_failed_sub_batches_in_order() {
        let store = Arc::new(MemoryStore::new("mem"));
        let executor = BatchExecutor::new(BatchConfig {
            max_batch_bytes: 250,
            max_in_flight: 2,
        });

        // Sub-batches: [0..3), [3..6), [6..9), [9..10)
        let batch = sized_payloads(10, 100);
        store.poison(batch[1].bytes.clone());
        store.poison(batch[7].bytes.clone());
        let expected: Vec<_> = contents(&batch[0..3])
            .into_iter()
            .chain(contents(&batch[6..9]))
            .collect();

        let failure = executor.execute(&store, batch).await.unwrap_err();

        assert_eq!(contents(&failure.remainder), expected);
        assert!(matches!(failure.error, ContractError::SinkWrite { .. }));
        assert_eq!(store.committed().len(), 4);
    }

    #[tokio::test]
    async fn test_execute_respects_in_flight_limit() {
        let store = Arc::new(MemoryStore::new("mem").with_latency(Duration::from_millis(20)));
        let executor = BatchExecutor::new(BatchConfig {
            max_batch_bytes: 100,
            max_in_flight: 3,
        });

        executor
            .execute(&store, sized_payloads(12, 100))
            .await
            .unwrap();

        assert_eq!(store.batches().len(), 12);
        assert!(store.peak_in_flight() <= 3);
        assert!(store.peak_in_flight() >= 2);
    }

    /// Store whose commit task panics on any sub-batch holding "boom"
    struct PanickingStore;

    impl BatchStore for PanickingStore {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn execute(&self, batch: &[Payload]) -> Result<(), ContractError> {
            if batch.iter().any(|p| p.bytes.as_ref() == b"boom") {
                panic!("store crashed mid-commit");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_panicked_sub_batch_stays_in_remainder() {
        let store = Arc::new(PanickingStore);
        let executor = BatchExecutor::new(BatchConfig {
            max_batch_bytes: 1,
            max_in_flight: 2,
        });

        let batch: Vec<_> = ["a", "boom", "c"].into_iter().map(Payload::now).collect();
        let failure = executor.execute(&store, batch).await.unwrap_err();

        assert_eq!(contents(&failure.remainder), vec![Bytes::from("boom")]);
        assert!(matches!(
            failure.error,
            ContractError::SubBatchAborted {
                start: 1,
                end: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_execute_empty_batch_is_noop() {
        let store = Arc::new(MemoryStore::new("mem"));
        BatchExecutor::default()
            .execute(&store, Vec::new())
            .await
            .unwrap();
        assert!(store.batches().is_empty());
    }
}
