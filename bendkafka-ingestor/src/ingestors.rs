use std::path::PathBuf;

use async_trait::async_trait;

use crate::{config::Config, message::MessageBatch, Result};

pub mod batch_file;
pub mod databend_ingestor;

/// Shared ingestion capability invoked by every worker
#[async_trait]
pub trait BatchIngestor: Send + Sync {
    /// Idempotently create the fixed envelope table
    async fn create_target_table(&self) -> Result<()>;

    /// Load one batch. An empty batch is a successful no-op.
    async fn ingest(&self, batch: &MessageBatch) -> Result<()>;
}

/// The slice of configuration the ingestor needs
#[derive(Debug, Clone)]
pub struct IngestProps {
    pub table: String,
    pub raw_to_envelope: bool,
    pub copy_purge: bool,
    pub copy_force: bool,
    pub disable_variant_check: bool,
    pub tmp_dir: PathBuf,
}

impl IngestProps {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            raw_to_envelope: false,
            copy_purge: false,
            copy_force: false,
            disable_variant_check: false,
            tmp_dir: std::env::temp_dir(),
        }
    }

    pub fn with_raw_to_envelope(mut self, raw_to_envelope: bool) -> Self {
        self.raw_to_envelope = raw_to_envelope;
        self
    }

    pub fn with_tmp_dir(mut self, tmp_dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = tmp_dir.into();
        self
    }
}

impl From<&Config> for IngestProps {
    fn from(config: &Config) -> Self {
        Self {
            table: config.databend_table.clone(),
            raw_to_envelope: config.raw_to_envelope,
            copy_purge: config.copy_purge,
            copy_force: config.copy_force,
            disable_variant_check: config.disable_variant_check,
            tmp_dir: config.tmp_dir(),
        }
    }
}
