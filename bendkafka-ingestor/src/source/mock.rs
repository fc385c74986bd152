use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::MessageSource;
use crate::{
    message::{Message, PartitionOffsets},
    Result,
};

/// Commits seen by a [`MockSource`], readable after the source moved into a worker
#[derive(Debug, Clone, Default)]
pub struct CommitLog(Arc<Mutex<Vec<PartitionOffsets>>>);

impl CommitLog {
    pub fn commits(&self) -> Vec<PartitionOffsets> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn push(&self, offsets: PartitionOffsets) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(offsets);
    }
}

/// In-memory source serving a fixed set of messages, then idling like an
/// empty partition
#[derive(Debug)]
pub struct MockSource {
    pending: VecDeque<Message>,
    log: CommitLog,
}

impl MockSource {
    pub fn from_messages(messages: impl IntoIterator<Item = Message>) -> Self {
        Self {
            pending: messages.into_iter().collect(),
            log: CommitLog::default(),
        }
    }

    /// `count` synthetic JSON records on partition 0 of `topic`
    pub fn generate(topic: &str, count: usize) -> Self {
        Self::from_messages((0..count).map(|i| {
            let now = Utc::now();
            let payload = json!({
                "id": i,
                "name": format!("mock-{i}"),
                "request_id": Uuid::new_v4().to_string(),
                "amount": (i % 100) as f64 * 1.5,
                "created_at": now.to_rfc3339(),
            });

            Message {
                topic: topic.to_owned(),
                partition: 0,
                offset: i as i64,
                key: Some(format!("key-{i}").into_bytes()),
                payload: payload.to_string().into_bytes(),
                create_time: now,
            }
        }))
    }

    pub fn commit_log(&self) -> CommitLog {
        self.log.clone()
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl MessageSource for MockSource {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<Message>> {
        match self.pending.pop_front() {
            Some(msg) => Ok(Some(msg)),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
        }
    }

    async fn commit(&mut self, offsets: &PartitionOffsets) -> Result<()> {
        self.log.push(offsets.clone());
        Ok(())
    }
}
