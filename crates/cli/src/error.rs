//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// `--broker` names a broker that is not configured
    #[error("Unknown broker '{id}', configured brokers: {known}")]
    UnknownBroker { id: String, known: String },

    /// More than one broker is configured and none was picked
    #[error("{count} brokers configured, pick one with --broker")]
    BrokerRequired { count: usize },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn unknown_broker(id: impl Into<String>, known: &[String]) -> Self {
        Self::UnknownBroker {
            id: id.into(),
            known: known.join(", "),
        }
    }
}
