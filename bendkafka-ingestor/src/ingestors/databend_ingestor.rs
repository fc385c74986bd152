use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::task::block_in_place;
use tracing::{error, info, warn};

use super::{batch_file::BatchFile, BatchIngestor, IngestProps};
use crate::{
    errors::BendIngestError,
    message::MessageBatch,
    stats::{IngestStats, StatsRecorder},
    transform::to_envelope_lines,
    warehouse::{StageLocation, Warehouse},
    Result,
};

/// Loads batches into a Databend table: NDJSON temp file, user stage upload,
/// then `COPY INTO`. Holds no per-batch state so workers can share it.
pub struct DatabendIngestor {
    props: IngestProps,
    warehouse: Arc<dyn Warehouse>,
    stats: Arc<StatsRecorder>,
}

impl DatabendIngestor {
    pub fn new(props: IngestProps, warehouse: Arc<dyn Warehouse>) -> Self {
        Self {
            props,
            warehouse,
            stats: Arc::new(StatsRecorder::new()),
        }
    }

    pub fn stats(&self) -> Arc<StatsRecorder> {
        self.stats.clone()
    }

    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (uuid String, raw_data json, record_metadata json, add_time timestamp)",
            self.props.table
        )
    }

    pub fn copy_into_sql(&self, stage: &StageLocation) -> String {
        format!(
            "COPY INTO {} FROM {} FILE_FORMAT = (type = NDJSON missing_field_as = FIELD_DEFAULT COMPRESSION = AUTO) \
             PURGE = {} FORCE = {} DISABLE_VARIANT_CHECK = {}",
            self.props.table,
            stage,
            self.props.copy_purge,
            self.props.copy_force,
            self.props.disable_variant_check
        )
    }

    fn generate_file(&self, lines: &[String]) -> Result<BatchFile> {
        block_in_place(|| BatchFile::write_lines(&self.props.tmp_dir, lines))
    }

    /// Consumes the batch file: it is deleted whether or not the upload worked
    async fn upload_to_stage(&self, file: BatchFile) -> Result<StageLocation> {
        let stage = StageLocation::for_batch_file(file.path(), Utc::now());
        let uploaded = self
            .warehouse
            .upload_to_stage(&stage, file.path(), file.bytes())
            .await;

        if let Err(err) = file.close() {
            warn!("delete batch insert file failed: {err}");
        }

        uploaded.map_err(|source| {
            error!(%stage, "upload batch file failed: {source}");
            BendIngestError::Upload {
                stage: stage.to_string(),
                source,
            }
        })?;

        Ok(stage)
    }

    async fn copy_into(&self, stage: &StageLocation) -> Result<()> {
        let sql = self.copy_into_sql(stage);
        self.warehouse.exec(&sql).await.map_err(|source| {
            error!("exec '{sql}' failed, err: {source}");
            BendIngestError::Load { sql, source }
        })
    }
}

#[async_trait]
impl BatchIngestor for DatabendIngestor {
    async fn create_target_table(&self) -> Result<()> {
        let sql = self.create_table_sql();
        self.warehouse.exec(&sql).await.map_err(|source| {
            error!("exec '{sql}' failed, err: {source}");
            BendIngestError::Ddl { sql, source }
        })?;

        info!(table = %self.props.table, "target table ready");
        Ok(())
    }

    async fn ingest(&self, batch: &MessageBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let start = Instant::now();

        let lines = to_envelope_lines(batch, self.props.raw_to_envelope)?;
        let file = self.generate_file(&lines)?;
        let flushed = IngestStats {
            rows: file.rows(),
            bytes: file.bytes(),
        };

        let stage = self.upload_to_stage(file).await?;
        self.copy_into(&stage).await?;

        let totals = self.stats.record_metric(flushed.bytes, flushed.rows);
        let rate = flushed.throughput(start.elapsed());
        let session = self.stats.session_throughput();
        info!(
            total_rows = totals.rows,
            total_bytes = totals.bytes,
            session_rows_per_sec = session.rows_per_second,
            "ingest {} rows ({:.2} rows/s), {} bytes ({:.2} bytes/s)",
            flushed.rows,
            rate.rows_per_second,
            flushed.bytes,
            rate.bytes_per_second
        );

        Ok(())
    }
}
