use rdkafka::error::KafkaError;
use thiserror::Error;

use crate::warehouse::WarehouseError;

#[derive(Error, Debug)]
pub enum BendIngestError {
    #[error("Config Error: {0}")]
    Config(String),

    #[error("Create table failed, sql `{sql}`: {source}")]
    Ddl {
        sql: String,
        #[source]
        source: WarehouseError,
    },

    #[error("Kafka Error: {0}")]
    Broker(#[from] KafkaError),

    #[error("Transform Error at partition {partition} offset {offset}: {reason}")]
    Transform {
        partition: i32,
        offset: i64,
        reason: String,
    },

    #[error("Batch File Error: {0}")]
    FileIo(#[from] std::io::Error),

    #[error("Upload to stage {stage} failed: {source}")]
    Upload {
        stage: String,
        #[source]
        source: WarehouseError,
    },

    #[error("Copy into failed, sql `{sql}`: {source}")]
    Load {
        sql: String,
        #[source]
        source: WarehouseError,
    },

    #[error("{worker} gave up on batch after {attempts} attempts: {source}")]
    WorkerUnhealthy {
        worker: String,
        attempts: u32,
        #[source]
        source: Box<BendIngestError>,
    },
}

impl BendIngestError {
    /// Name of the pipeline stage that produced the error, used as a log field
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Ddl { .. } => "create_table",
            Self::Broker(_) => "broker",
            Self::Transform { .. } => "transform",
            Self::FileIo(_) => "generate_file",
            Self::Upload { .. } => "upload_to_stage",
            Self::Load { .. } => "copy_into",
            Self::WorkerUnhealthy { .. } => "worker",
        }
    }

    /// Startup errors must stop the process before any worker consumes
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Ddl { .. })
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_errors_are_fatal() {
        let ddl = BendIngestError::Ddl {
            sql: "CREATE TABLE t".to_owned(),
            source: WarehouseError::Server {
                code: 1105,
                message: "boom".to_owned(),
            },
        };
        assert!(ddl.is_fatal_at_startup());
        assert!(BendIngestError::config("no topic").is_fatal_at_startup());

        let io = BendIngestError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(!io.is_fatal_at_startup());
        assert_eq!("generate_file", io.stage());
    }

    #[test]
    fn load_errors_carry_the_statement() {
        let err = BendIngestError::Load {
            sql: "COPY INTO t FROM @~/batch/1-a.ndjson".to_owned(),
            source: WarehouseError::Server {
                code: 1046,
                message: "bad file".to_owned(),
            },
        };
        let rendered = err.to_string();
        assert!(rendered.contains("COPY INTO t FROM @~/batch/1-a.ndjson"));
        assert!(rendered.contains("bad file"));
        assert_eq!("copy_into", err.stage());
    }
}
