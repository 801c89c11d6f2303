//! Broker error types

use thiserror::Error;

/// Broker-specific errors
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Malformed broker definition or duplicate id
    #[error("invalid broker configuration: {message}")]
    Config { message: String },

    /// No broker registered under this id
    #[error("broker '{id}' not found")]
    NotFound { id: String },

    /// Queue at capacity - payload dropped
    #[error("broker '{broker}' can't handle more requests")]
    Overloaded { broker: String },

    /// Drain worker is gone and nothing consumes the queue
    #[error("broker '{broker}' is unavailable")]
    Unavailable { broker: String },

    /// Sink delivery error (sync brokers only)
    #[error("sink error: {0}")]
    Sink(#[from] contracts::ContractError),
}

impl BrokerError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create an overloaded error
    pub fn overloaded(broker: impl Into<String>) -> Self {
        Self::Overloaded {
            broker: broker.into(),
        }
    }

    /// Whether the producer may retry the same payload later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Overloaded { .. })
    }
}
