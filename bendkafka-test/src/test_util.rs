use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use bendkafka_ingestor::{Config, IngestProps, Message, StageLocation, Warehouse, WarehouseError};

/// One file received by [`FakeWarehouse::upload_to_stage`]
#[derive(Debug, Clone)]
pub struct StagedUpload {
    pub stage: StageLocation,
    pub local_path: PathBuf,
    pub size: u64,
    pub contents: String,
}

#[derive(Debug, Default)]
struct WarehouseState {
    statements: Vec<String>,
    uploads: Vec<StagedUpload>,
    staged: HashMap<String, String>,
    tables: HashSet<String>,
    loaded_lines: Vec<String>,
    failing_uploads: u32,
    failing_copies: u32,
    statement_delay: Duration,
}

/// In-memory stand-in for Databend. Understands just enough SQL to track
/// created tables and which staged files were copied into them.
#[derive(Debug, Default)]
pub struct FakeWarehouse {
    state: Mutex<WarehouseState>,
}

impl FakeWarehouse {
    /// The next `n` uploads fail with a server error
    pub fn fail_uploads(&self, n: u32) {
        self.state().failing_uploads = n;
    }

    /// The next `n` COPY INTO statements fail
    pub fn fail_copies(&self, n: u32) {
        self.state().failing_copies = n;
    }

    /// Every statement takes this long before it is applied
    pub fn delay_statements(&self, delay: Duration) {
        self.state().statement_delay = delay;
    }

    pub fn statements(&self) -> Vec<String> {
        self.state().statements.clone()
    }

    pub fn copy_statements(&self) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|sql| sql.starts_with("COPY INTO "))
            .collect()
    }

    pub fn uploads(&self) -> Vec<StagedUpload> {
        self.state().uploads.clone()
    }

    pub fn tables(&self) -> HashSet<String> {
        self.state().tables.clone()
    }

    /// NDJSON lines of every successfully copied file, in load order
    pub fn loaded_lines(&self) -> Vec<String> {
        self.state().loaded_lines.clone()
    }

    pub fn loaded_json(&self) -> Result<Vec<serde_json::Value>> {
        self.loaded_lines()
            .iter()
            .map(|line| Ok(serde_json::from_str(line)?))
            .collect()
    }

    fn state(&self) -> MutexGuard<'_, WarehouseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn copy_source(sql: &str) -> Option<&str> {
    let (_, rest) = sql.split_once(" FROM ")?;
    rest.split_whitespace().next()
}

#[async_trait]
impl Warehouse for FakeWarehouse {
    async fn exec(&self, sql: &str) -> Result<(), WarehouseError> {
        let delay = self.state().statement_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        state.statements.push(sql.to_owned());

        if let Some(rest) = sql.strip_prefix("CREATE TABLE IF NOT EXISTS ") {
            let table = rest.split_whitespace().next().unwrap_or_default();
            state.tables.insert(table.to_owned());
            return Ok(());
        }

        if sql.starts_with("COPY INTO ") {
            if state.failing_copies > 0 {
                state.failing_copies -= 1;
                return Err(WarehouseError::Server {
                    code: 1046,
                    message: "injected copy failure".to_owned(),
                });
            }

            let source = copy_source(sql).unwrap_or_default();
            let Some(contents) = state.staged.get(source).cloned() else {
                return Err(WarehouseError::Server {
                    code: 1006,
                    message: format!("no file staged at {source}"),
                });
            };
            state.loaded_lines.extend(contents.lines().map(str::to_owned));
        }

        Ok(())
    }

    async fn upload_to_stage(
        &self,
        stage: &StageLocation,
        file: &Path,
        size: u64,
    ) -> Result<(), WarehouseError> {
        {
            let mut state = self.state();
            if state.failing_uploads > 0 {
                state.failing_uploads -= 1;
                return Err(WarehouseError::Status {
                    status: 503,
                    body: "injected upload failure".to_owned(),
                });
            }
        }

        let contents = tokio::fs::read_to_string(file).await?;

        let mut state = self.state();
        state.staged.insert(stage.to_string(), contents.clone());
        state.uploads.push(StagedUpload {
            stage: stage.clone(),
            local_path: file.to_owned(),
            size,
            contents,
        });
        Ok(())
    }
}

pub fn json_message(topic: &str, partition: i32, offset: i64) -> Message {
    let payload = serde_json::json!({
        "id": offset,
        "partition": partition,
        "event": format!("event-{offset}"),
    });

    Message {
        topic: topic.to_owned(),
        partition,
        offset,
        key: Some(format!("key-{offset}").into_bytes()),
        payload: payload.to_string().into_bytes(),
        create_time: Utc
            .timestamp_millis_opt(1_700_000_000_000 + offset)
            .single()
            .unwrap_or_default(),
    }
}

pub fn json_messages(topic: &str, partition: i32, offsets: std::ops::Range<i64>) -> Vec<Message> {
    offsets
        .map(|offset| json_message(topic, partition, offset))
        .collect()
}

pub fn envelope_props(table: &str, tmp_dir: &Path) -> IngestProps {
    IngestProps::new(table)
        .with_raw_to_envelope(true)
        .with_tmp_dir(tmp_dir)
}

/// Worker settings with a short poll so tests observe flushes quickly
pub fn worker_config(batch_size: usize, batch_max_interval: u64) -> Config {
    Config {
        batch_size,
        batch_max_interval,
        poll_timeout_ms: 10,
        ..Default::default()
    }
}

pub fn file_count(dir: &Path) -> Result<usize> {
    Ok(std::fs::read_dir(dir)?.count())
}

/// Polls `done` until it holds or `timeout` passes
pub async fn wait_for(timeout: Duration, mut done: impl FnMut() -> bool) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while !done() {
        if Instant::now() >= deadline {
            bail!("condition not reached within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}
