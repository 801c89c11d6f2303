//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 配置 -> factory -> group -> sink 的 e2e 测试
//! - 并发 producer 与 restart 场景

#[cfg(test)]
mod contract_tests {
    use contracts::{BatchConfig, DrainConfig, DEFAULT_QUEUE_CAPACITY};

    #[test]
    fn test_contract_defaults() {
        assert_eq!(DEFAULT_QUEUE_CAPACITY, 1000);

        let drain = DrainConfig::default();
        assert_eq!(drain.default_interval_ms, 500);
        assert_eq!(drain.short_interval_ms, 50);

        let batch = BatchConfig::default();
        assert_eq!(batch.max_batch_bytes, 10 * 1024);
        assert_eq!(batch.max_in_flight, 100);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use broker::{build_group, Broker, BrokerError, Group, MemoryStore, StoreSink};
    use bytes::Bytes;
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::BatchConfig;
    use tempfile::tempdir;

    fn gateway_toml(dir: &std::path::Path) -> String {
        format!(
            r#"
[[brokers]]
id = "fs-sync"
mode = "sync"
[brokers.sink]
sink_type = "file"
[brokers.sink.params]
path = "{root}/fs-sync"

[[brokers]]
id = "fs-async"
mode = "async"
queue_capacity = 1000000
[brokers.sink]
sink_type = "file"
[brokers.sink.params]
path = "{root}/fs-async"

[[brokers]]
id = "segment-async"
mode = "async"
[brokers.drain]
default_interval_ms = 100
short_interval_ms = 10
[brokers.sink]
sink_type = "segment"
[brokers.sink.params]
dir = "{root}/segments"
[brokers.sink.batch]
max_batch_bytes = 64
max_in_flight = 4
"#,
            root = dir.display()
        )
    }

    /// Config -> Group -> async file broker -> restart -> file content
    #[tokio::test]
    async fn test_e2e_async_file_broker_restart() {
        observability::init_test_tracing();
        let dir = tempdir().unwrap();
        let blueprint =
            ConfigLoader::load_from_str(&gateway_toml(dir.path()), ConfigFormat::Toml).unwrap();

        let group = build_group(&blueprint).await.unwrap();
        assert_eq!(group.start_all().await, 2);

        for msg in ["foo", "bar", "foobar"] {
            group.enqueue("fs-async", msg).await.unwrap();
        }

        // stop + start drains the cache before the loop exits
        assert_eq!(group.restart_all().await, 2);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("fs-async")).unwrap(),
            "foobarfoobar"
        );

        group.stop_all().await;
    }

    #[tokio::test]
    async fn test_e2e_sync_broker_delivers_before_ack() {
        let dir = tempdir().unwrap();
        let blueprint =
            ConfigLoader::load_from_str(&gateway_toml(dir.path()), ConfigFormat::Toml).unwrap();
        let group = build_group(&blueprint).await.unwrap();

        group.enqueue("fs-sync", "hello ").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("fs-sync")).unwrap(),
            "hello "
        );
        group.enqueue("fs-sync", "world").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("fs-sync")).unwrap(),
            "hello world"
        );
    }

    #[tokio::test]
    async fn test_e2e_segment_broker_splits_into_sub_batches() {
        let dir = tempdir().unwrap();
        let blueprint =
            ConfigLoader::load_from_str(&gateway_toml(dir.path()), ConfigFormat::Toml).unwrap();
        let group = build_group(&blueprint).await.unwrap();
        group.start_all().await;

        let sent: Vec<Bytes> = (0..20).map(|i| Bytes::from(format!("record-{i:02}"))).collect();
        for payload in &sent {
            group.enqueue("segment-async", payload.clone()).await.unwrap();
        }
        group.stop_all().await;

        let store = broker::SegmentStore::create("reader", dir.path().join("segments")).unwrap();
        let mut read: Vec<Bytes> = store
            .read_all()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.bytes)
            .collect();
        read.sort();
        assert_eq!(read, sent);

        // 41 bytes per record with a 64 byte budget: two records per segment
        let segments = std::fs::read_dir(dir.path().join("segments"))
            .unwrap()
            .count();
        assert!(segments >= 10, "expected sub-batches, got {segments} segments");
    }

    #[tokio::test]
    async fn test_e2e_unknown_broker() {
        let dir = tempdir().unwrap();
        let blueprint =
            ConfigLoader::load_from_str(&gateway_toml(dir.path()), ConfigFormat::Toml).unwrap();
        let group = build_group(&blueprint).await.unwrap();

        assert!(matches!(
            group.enqueue("nope", "x").await,
            Err(BrokerError::NotFound { .. })
        ));
        group.remove("fs-sync").await.unwrap();
        assert!(matches!(
            group.enqueue("fs-sync", "x").await,
            Err(BrokerError::NotFound { .. })
        ));
    }

    /// Concurrent producers, a store that fails now and then, and restarts in
    /// between: every accepted payload is committed at least once.
    #[tokio::test]
    async fn test_e2e_concurrent_producers_at_least_once() {
        let store = Arc::new(MemoryStore::new("mem"));
        let sink = Arc::new(StoreSink::with_shared(
            "mem",
            Arc::clone(&store),
            BatchConfig {
                max_batch_bytes: 128,
                max_in_flight: 3,
            },
        ));

        let group = Arc::new(Group::new());
        group
            .add(Broker::asynchronous("mem-async", 10_000, sink))
            .await
            .unwrap();
        group.start_all().await;

        let mut producers = Vec::new();
        for p in 0..4 {
            let group = Arc::clone(&group);
            producers.push(tokio::spawn(async move {
                for i in 0..250 {
                    group
                        .enqueue("mem-async", format!("p{p}-{i:03}"))
                        .await
                        .unwrap();
                    if i % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }

        store.fail_next(5);
        tokio::time::sleep(Duration::from_millis(120)).await;
        group.restart_all().await;

        for producer in producers {
            producer.await.unwrap();
        }
        group.stop_all().await;

        let mut committed: Vec<Bytes> = store.committed().into_iter().map(|p| p.bytes).collect();
        committed.sort();
        committed.dedup();
        assert_eq!(committed.len(), 1000);

        let metrics = group.metrics().await;
        assert_eq!(metrics[0].1.enqueued, 1000);
        assert_eq!(metrics[0].1.cache_len, 0);
    }

    #[tokio::test]
    async fn test_e2e_overload_is_reported_to_producer() {
        let store = Arc::new(MemoryStore::new("mem"));
        let sink = Arc::new(StoreSink::with_shared(
            "mem",
            Arc::clone(&store),
            BatchConfig::default(),
        ));

        let group = Group::new();
        group
            .add(Broker::asynchronous("tiny", 2, sink))
            .await
            .unwrap();

        group.enqueue("tiny", "a").await.unwrap();
        group.enqueue("tiny", "b").await.unwrap();
        let err = group.enqueue("tiny", "c").await.unwrap_err();
        assert!(err.is_retryable());

        group.start_all().await;
        group.stop_all().await;
        assert_eq!(store.committed().len(), 2);

        // Room again once drained
        group.enqueue("tiny", "c").await.unwrap();
    }
}
