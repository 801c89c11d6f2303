//! FileSink - appends raw payload bytes to a single file

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, instrument};

use contracts::{BatchFailure, ContractError, DeliverBatch, DeliverOne, Payload};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Target file, created on first write
    pub path: PathBuf,
}

impl FileSinkConfig {
    /// Create config from params map
    ///
    /// # Errors
    /// `path` is required.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ContractError> {
        let path = params
            .get("path")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| {
                ContractError::config_validation("sink.params.path", "file sink requires a path")
            })?;

        Ok(Self { path })
    }
}

/// Sink that appends every payload to one file, without separators
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    // Serializes appends so batches are not interleaved
    lock: Mutex<()>,
}

impl FileSink {
    /// Create a new FileSink
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> Self {
        Self {
            name: name.into(),
            config,
            lock: Mutex::new(()),
        }
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let config = FileSinkConfig::from_params(params)?;
        Ok(Self::new(name, config))
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    async fn open(&self) -> std::io::Result<File> {
        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        options.mode(0o600);
        options.open(&self.config.path).await
    }

    fn write_error(&self, e: &std::io::Error) -> ContractError {
        error!(sink = %self.name, path = %self.config.path.display(), error = %e, "Write failed");
        ContractError::sink_write(&self.name, e.to_string())
    }
}

#[async_trait]
impl DeliverOne for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_deliver",
        skip(self, payload),
        fields(sink = %self.name, len = payload.len())
    )]
    async fn deliver(&self, payload: Payload) -> Result<(), ContractError> {
        let _guard = self.lock.lock().await;
        let mut file = self.open().await.map_err(|e| self.write_error(&e))?;
        file.write_all(&payload.bytes)
            .await
            .map_err(|e| self.write_error(&e))?;
        file.flush().await.map_err(|e| self.write_error(&e))?;
        Ok(())
    }
}

#[async_trait]
impl DeliverBatch for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_deliver_batch",
        skip(self, batch),
        fields(sink = %self.name, items = batch.len())
    )]
    async fn deliver_batch(&self, mut batch: Vec<Payload>) -> Result<(), BatchFailure> {
        let _guard = self.lock.lock().await;

        let mut file = match self.open().await {
            Ok(file) => file,
            Err(e) => {
                let error = self.write_error(&e);
                return Err(BatchFailure::new(batch, error));
            }
        };

        let mut failed_at = None;
        for (i, payload) in batch.iter().enumerate() {
            if let Err(e) = file.write_all(&payload.bytes).await {
                failed_at = Some((i, e));
                break;
            }
        }
        if let Some((i, e)) = failed_at {
            let error = self.write_error(&e);
            let remainder = batch.split_off(i);
            return Err(BatchFailure::new(remainder, error));
        }

        if let Err(e) = file.flush().await {
            // Nothing is known to be on disk
            let error = self.write_error(&e);
            return Err(BatchFailure::new(batch, error));
        }

        debug!(sink = %self.name, items = batch.len(), "Batch appended");
        Ok(())
    }
}
