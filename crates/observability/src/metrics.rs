//! Broker 指标收集模块
//!
//! 通过 `metrics` facade 记录 broker 与 sink 的运行指标。
//! 未安装 recorder 时所有调用均为空操作。

use metrics::{counter, gauge};

/// 记录 payload 入队成功
pub fn record_enqueued(broker: &str) {
    counter!(
        "ingest_gateway_enqueued_total",
        "broker" => broker.to_string()
    )
    .increment(1);
}

/// 记录队列已满导致的拒绝
pub fn record_overloaded(broker: &str) {
    counter!(
        "ingest_gateway_overloaded_total",
        "broker" => broker.to_string()
    )
    .increment(1);
}

/// 记录一次 cache flush
///
/// `delivered` 为本次确认写入的 payload 数量。
pub fn record_flush(broker: &str, delivered: usize, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "ingest_gateway_flushes_total",
        "broker" => broker.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if delivered > 0 {
        counter!(
            "ingest_gateway_delivered_total",
            "broker" => broker.to_string()
        )
        .increment(delivered as u64);
    }
}

/// 记录 drain cache 深度
pub fn record_cache_depth(broker: &str, depth: usize) {
    gauge!(
        "ingest_gateway_cache_depth",
        "broker" => broker.to_string()
    )
    .set(depth as f64);
}

/// 记录单个 sub-batch 的执行结果
pub fn record_sub_batch(sink: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "ingest_gateway_sub_batches_total",
        "sink" => sink.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
