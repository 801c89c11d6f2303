//! # Observability
//!
//! 可观测性模块：Tracing + Prometheus 指标。
//!
//! ## 功能
//!
//! - Tracing 初始化 (JSON/Pretty/Compact 格式)
//! - Prometheus 指标导出
//! - Broker 入队、flush、sub-batch 指标记录
//!
//! ## 使用示例
//!
//! ```ignore
//! use observability::{init_with_config, metrics, ObservabilityConfig};
//!
//! // 初始化
//! init_with_config(ObservabilityConfig::default().with_verbosity(1))?;
//!
//! // 记录 flush 结果
//! metrics::record_flush("fs-async", delivered, true);
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

// Re-exports
pub use crate::metrics::{
    record_cache_depth, record_enqueued, record_flush, record_overloaded, record_sub_batch,
};

/// 可观测性配置
///
/// 默认：JSON 日志，支持 RUST_LOG 环境变量；Prometheus 监听 0.0.0.0:9100
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// 日志格式
    pub log_format: LogFormat,
    /// Prometheus 端口 (None = 禁用)
    pub metrics_port: Option<u16>,
    /// 默认日志级别 (RUST_LOG 未设置时生效)
    pub default_log_level: String,
    /// 忽略 RUST_LOG，强制使用 default_log_level
    pub force_level: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            metrics_port: Some(9100),
            default_log_level: "info".to_string(),
            force_level: false,
        }
    }
}

impl ObservabilityConfig {
    /// 根据 `-v` 次数选择默认级别
    pub fn with_verbosity(mut self, verbose: u8) -> Self {
        self.default_log_level = match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
        .to_string();
        self
    }

    /// 仅输出 warn 及以上
    pub fn quiet(mut self) -> Self {
        self.default_log_level = "warn".to_string();
        self.force_level = true;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        if self.force_level {
            return EnvFilter::new(&self.default_log_level);
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_log_level))
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON 结构化日志
    #[default]
    Json,
    /// 人类可读格式
    Pretty,
    /// 紧凑单行格式
    Compact,
}

fn fmt_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    }
}

/// 使用自定义配置初始化
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    // 1. Initialize Tracing
    tracing_subscriber::registry()
        .with(fmt_layer(config.log_format))
        .with(config.env_filter())
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    // 2. Initialize Prometheus Exporter (if enabled)
    if let Some(port) = config.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::info!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );

    Ok(())
}

/// 仅初始化 Prometheus 指标（不初始化 Tracing）
///
/// 用于 Tracing 已由其他模块初始化的场景。
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port = port, "Prometheus metrics endpoint initialized");
    Ok(())
}

/// 测试用 tracing 初始化：输出到 test writer，重复调用无副作用
pub fn init_test_tracing() {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().compact().with_test_writer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .try_init();
}
