use std::{borrow::Cow, collections::BTreeMap};

use chrono::{DateTime, Utc};

/// A record read from the queue, owned so it can outlive the consumer's borrow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    pub create_time: DateTime<Utc>,
}

impl Message {
    /// Key as text, empty when the record carries no key
    pub fn key_str(&self) -> Cow<'_, str> {
        match &self.key {
            Some(key) => String::from_utf8_lossy(key),
            None => Cow::Borrowed(""),
        }
    }
}

/// Highest offset seen per (topic, partition)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionOffsets(BTreeMap<(String, i32), i64>);

impl PartitionOffsets {
    pub fn observe(&mut self, topic: &str, partition: i32, offset: i64) {
        match self.0.get_mut(&(topic.to_owned(), partition)) {
            Some(max) if *max >= offset => {}
            Some(max) => *max = offset,
            None => {
                self.0.insert((topic.to_owned(), partition), offset);
            }
        }
    }

    pub fn get(&self, topic: &str, partition: i32) -> Option<i64> {
        self.0.get(&(topic.to_owned(), partition)).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i32, i64)> {
        self.0
            .iter()
            .map(|((topic, partition), offset)| (topic.as_str(), *partition, *offset))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An ordered run of messages handed to ingestion as one unit.
#[derive(Debug, Clone, Default)]
pub struct MessageBatch {
    messages: Vec<Message>,
    offsets: PartitionOffsets,
}

impl MessageBatch {
    pub fn new(messages: Vec<Message>) -> Self {
        let mut offsets = PartitionOffsets::default();
        for msg in &messages {
            offsets.observe(&msg.topic, msg.partition, msg.offset);
        }

        Self { messages, offsets }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Offsets to commit once this batch is loaded
    pub fn offsets(&self) -> &PartitionOffsets {
        &self.offsets
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(topic: &str, partition: i32, offset: i64) -> Message {
        Message {
            topic: topic.to_owned(),
            partition,
            offset,
            key: None,
            payload: b"{}".to_vec(),
            create_time: Utc::now(),
        }
    }

    #[test]
    fn batch_tracks_max_offset_per_partition() {
        let batch = MessageBatch::new(vec![
            msg("orders", 0, 7),
            msg("orders", 1, 3),
            msg("orders", 0, 9),
            msg("orders", 1, 2), // redelivered, lower than what we have
        ]);

        assert_eq!(4, batch.len());
        assert_eq!(2, batch.offsets().len());
        assert_eq!(Some(9), batch.offsets().get("orders", 0));
        assert_eq!(Some(3), batch.offsets().get("orders", 1));
        assert_eq!(None, batch.offsets().get("orders", 2));
    }

    #[test]
    fn missing_key_renders_empty() {
        let mut m = msg("orders", 0, 0);
        assert_eq!("", m.key_str());
        m.key = Some(b"user-42".to_vec());
        assert_eq!("user-42", m.key_str());
    }
}
