//! 配置校验模块
//!
//! 校验规则：
//! - 至少一个 broker
//! - broker id 非空且唯一
//! - queue_capacity > 0
//! - 0 < short_interval_ms <= default_interval_ms
//! - max_batch_bytes > 0, max_in_flight > 0
//! - sink 必填参数齐全 (file: path, segment: dir)

use std::collections::HashSet;

use contracts::{BrokerConfig, ContractError, GatewayBlueprint, SinkType};

/// 校验 GatewayBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &GatewayBlueprint) -> Result<(), ContractError> {
    if blueprint.brokers.is_empty() {
        return Err(ContractError::config_validation(
            "brokers",
            "at least one broker is required",
        ));
    }

    validate_broker_ids(blueprint)?;
    for broker in &blueprint.brokers {
        validate_queue(broker)?;
        validate_drain(broker)?;
        validate_sink(broker)?;
    }
    Ok(())
}

/// 校验 broker id 非空且唯一
fn validate_broker_ids(blueprint: &GatewayBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, broker) in blueprint.brokers.iter().enumerate() {
        if broker.id.is_empty() {
            return Err(ContractError::config_validation(
                format!("brokers[{idx}].id"),
                "broker id cannot be empty",
            ));
        }
        if !seen.insert(&broker.id) {
            return Err(ContractError::config_validation(
                format!("brokers[id={}]", broker.id),
                "duplicate broker id",
            ));
        }
    }
    Ok(())
}

fn validate_queue(broker: &BrokerConfig) -> Result<(), ContractError> {
    if broker.queue_capacity == 0 {
        return Err(ContractError::config_validation(
            format!("brokers[{}].queue_capacity", broker.id),
            "queue_capacity must be > 0",
        ));
    }
    Ok(())
}

/// 校验 drain 时间间隔
fn validate_drain(broker: &BrokerConfig) -> Result<(), ContractError> {
    let drain = &broker.drain;
    if drain.short_interval_ms == 0 {
        return Err(ContractError::config_validation(
            format!("brokers[{}].drain.short_interval_ms", broker.id),
            "short_interval_ms must be > 0",
        ));
    }
    if drain.short_interval_ms > drain.default_interval_ms {
        return Err(ContractError::config_validation(
            format!("brokers[{}].drain", broker.id),
            format!(
                "short_interval_ms ({}) must be <= default_interval_ms ({})",
                drain.short_interval_ms, drain.default_interval_ms
            ),
        ));
    }
    Ok(())
}

/// 校验 sink 参数与 sub-batch 限制
fn validate_sink(broker: &BrokerConfig) -> Result<(), ContractError> {
    let sink = &broker.sink;

    let required = match sink.sink_type {
        SinkType::File => Some("path"),
        SinkType::Segment => Some("dir"),
        SinkType::Log | SinkType::Memory => None,
    };
    if let Some(param) = required {
        if sink.params.get(param).is_none_or(|v| v.is_empty()) {
            return Err(ContractError::config_validation(
                format!("brokers[{}].sink.params.{param}", broker.id),
                format!("{:?} sink requires '{param}'", sink.sink_type),
            ));
        }
    }

    if sink.batch.max_batch_bytes == 0 {
        return Err(ContractError::config_validation(
            format!("brokers[{}].sink.batch.max_batch_bytes", broker.id),
            "max_batch_bytes must be > 0",
        ));
    }
    if sink.batch.max_in_flight == 0 {
        return Err(ContractError::config_validation(
            format!("brokers[{}].sink.batch.max_in_flight", broker.id),
            "max_in_flight must be > 0",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{BatchConfig, BrokerMode, ConfigVersion, DrainConfig, SinkConfig};
    use std::collections::HashMap;

    fn broker(id: &str, sink_type: SinkType) -> BrokerConfig {
        BrokerConfig {
            id: id.into(),
            mode: BrokerMode::Async,
            queue_capacity: 1000,
            drain: DrainConfig::default(),
            sink: SinkConfig {
                sink_type,
                params: HashMap::new(),
                batch: BatchConfig::default(),
            },
        }
    }

    fn blueprint(brokers: Vec<BrokerConfig>) -> GatewayBlueprint {
        GatewayBlueprint {
            version: ConfigVersion::V1,
            brokers,
        }
    }

    fn failing_field(bp: &GatewayBlueprint) -> String {
        match validate(bp) {
            Err(ContractError::ConfigValidation { field, .. }) => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_blueprint() {
        let mut fs = broker("fs-async", SinkType::File);
        fs.sink.params.insert("path".into(), "fs-async".into());
        assert!(validate(&blueprint(vec![fs, broker("log", SinkType::Log)])).is_ok());
    }

    #[test]
    fn test_empty_brokers() {
        assert_eq!(failing_field(&blueprint(vec![])), "brokers");
    }

    #[test]
    fn test_empty_and_duplicate_ids() {
        let bp = blueprint(vec![broker("", SinkType::Log)]);
        assert_eq!(failing_field(&bp), "brokers[0].id");

        let bp = blueprint(vec![broker("a", SinkType::Log), broker("a", SinkType::Memory)]);
        assert_eq!(failing_field(&bp), "brokers[id=a]");
    }

    #[test]
    fn test_zero_capacity() {
        let mut b = broker("a", SinkType::Log);
        b.queue_capacity = 0;
        assert_eq!(failing_field(&blueprint(vec![b])), "brokers[a].queue_capacity");
    }

    #[test]
    fn test_drain_intervals() {
        let mut b = broker("a", SinkType::Log);
        b.drain.short_interval_ms = 0;
        assert_eq!(
            failing_field(&blueprint(vec![b.clone()])),
            "brokers[a].drain.short_interval_ms"
        );

        b.drain.short_interval_ms = 600;
        assert_eq!(failing_field(&blueprint(vec![b])), "brokers[a].drain");
    }

    #[test]
    fn test_required_sink_params() {
        assert_eq!(
            failing_field(&blueprint(vec![broker("a", SinkType::File)])),
            "brokers[a].sink.params.path"
        );
        assert_eq!(
            failing_field(&blueprint(vec![broker("b", SinkType::Segment)])),
            "brokers[b].sink.params.dir"
        );
    }

    #[test]
    fn test_batch_limits() {
        let mut b = broker("a", SinkType::Memory);
        b.sink.batch.max_in_flight = 0;
        assert_eq!(
            failing_field(&blueprint(vec![b.clone()])),
            "brokers[a].sink.batch.max_in_flight"
        );

        b.sink.batch.max_in_flight = 1;
        b.sink.batch.max_batch_bytes = 0;
        assert_eq!(
            failing_field(&blueprint(vec![b])),
            "brokers[a].sink.batch.max_batch_bytes"
        );
    }
}
