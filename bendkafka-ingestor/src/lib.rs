pub mod accumulator;
pub mod config;
pub mod errors;
pub mod ingestors;
pub mod message;
pub mod source;
pub mod stats;
pub mod transform;
pub mod warehouse;
pub mod worker;

pub use accumulator::BatchAccumulator;
pub use config::Config;
pub use errors::BendIngestError;
pub use ingestors::{databend_ingestor::DatabendIngestor, BatchIngestor, IngestProps};
pub use message::{Message, MessageBatch, PartitionOffsets};
pub use source::{kafka::KafkaSource, mock::MockSource, MessageSource};
pub use stats::{IngestStats, StatsRecorder, Throughput};
pub use warehouse::{DatabendClient, StageLocation, Warehouse, WarehouseError};
pub use worker::{ConsumeWorker, RetryPolicy};

pub type Result<T> = core::result::Result<T, errors::BendIngestError>;
