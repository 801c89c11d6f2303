//! Gateway error definitions
//!
//! Config errors surface at startup. Sink and segment errors are reported by
//! delivery strategies and end up in a [`crate::BatchFailure`] or a sync
//! producer's result.

use thiserror::Error;

/// Error returned by config loading and by sinks
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Sink Errors =====
    /// The sink rejected or failed to persist a write
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    /// A sub-batch commit task died before reporting a result
    ///
    /// `start..end` is the sub-batch's range in the flushed batch.
    #[error("sink '{sink_name}' sub-batch {start}..{end} aborted: {message}")]
    SubBatchAborted {
        sink_name: String,
        start: usize,
        end: usize,
        message: String,
    },

    /// Segment body that can not be encoded or read back
    #[error("malformed segment: {message}")]
    Segment { message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    pub fn sub_batch_aborted(
        sink_name: impl Into<String>,
        start: usize,
        end: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::SubBatchAborted {
            sink_name: sink_name.into(),
            start,
            end,
            message: message.into(),
        }
    }

    pub fn segment(message: impl Into<String>) -> Self {
        Self::Segment {
            message: message.into(),
        }
    }

    /// Whether the failed payloads are worth handing to the sink again
    ///
    /// Config and segment-format errors repeat on every attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::SinkWrite { .. } | Self::SubBatchAborted { .. } | Self::Io(_) | Self::Other(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_batch_aborted_names_the_range() {
        let err = ContractError::sub_batch_aborted("store", 3, 6, "task panicked");
        assert_eq!(
            err.to_string(),
            "sink 'store' sub-batch 3..6 aborted: task panicked"
        );
        assert!(err.is_transient());
    }

    #[test]
    fn test_format_errors_are_not_transient() {
        assert!(!ContractError::segment("truncated record").is_transient());
        assert!(!ContractError::config_validation("brokers", "empty").is_transient());
        assert!(ContractError::sink_write("fs", "disk full").is_transient());
    }
}
