use std::{fmt, path::Path};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

mod databend;

pub use databend::DatabendClient;

#[derive(Error, Debug)]
pub enum WarehouseError {
    #[error("Http Error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Databend Error {code}: {message}")]
    Server { code: i64, message: String },

    #[error("Unexpected Response {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid DSN: {0}")]
    Dsn(String),
}

/// Where a batch file lands in the store's transient storage,
/// rendered as `@name/path` inside SQL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StageLocation {
    pub name: String,
    pub path: String,
}

impl StageLocation {
    /// User stage path unique per temp file: `batch/<unix secs>-<file name>`
    pub fn for_batch_file(file: &Path, now: DateTime<Utc>) -> Self {
        let base = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            name: "~".to_owned(),
            path: format!("batch/{}-{}", now.timestamp(), base),
        }
    }

    pub fn dir(&self) -> &str {
        self.path.rsplit_once('/').map_or("", |(dir, _)| dir)
    }

    pub fn file_name(&self) -> &str {
        self.path
            .rsplit_once('/')
            .map_or(self.path.as_str(), |(_, name)| name)
    }
}

impl fmt::Display for StageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}/{}", self.name, self.path)
    }
}

/// The analytical store as seen by the ingestion pipeline
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Run a statement to completion
    async fn exec(&self, sql: &str) -> Result<(), WarehouseError>;

    /// Stream a local file into a stage without buffering it in memory
    async fn upload_to_stage(
        &self,
        stage: &StageLocation,
        file: &Path,
        size: u64,
    ) -> Result<(), WarehouseError>;
}
