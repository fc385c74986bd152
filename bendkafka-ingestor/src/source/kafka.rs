use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rdkafka::{
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
    message::BorrowedMessage,
    Message as _, Offset, TopicPartitionList,
};
use tokio::task::block_in_place;
use tracing::{debug, info};

use super::MessageSource;
use crate::{
    config::Config,
    message::{Message, PartitionOffsets},
    Result,
};

/// Consumer group member reading the configured topic. Auto commit is off,
/// offsets only move through `commit`.
pub struct KafkaSource {
    consumer: StreamConsumer,
}

impl KafkaSource {
    pub fn subscribe(config: &Config, client_id: &str) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", config.kafka_brokers().join(","))
            .set("group.id", &config.kafka_consumer_group)
            .set("client.id", client_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()?;

        consumer.subscribe(&[config.kafka_topic.as_str()])?;
        info!(
            topic = %config.kafka_topic,
            group = %config.kafka_consumer_group,
            client_id,
            "subscribed"
        );

        Ok(Self { consumer })
    }
}

fn create_time(msg: &BorrowedMessage<'_>) -> DateTime<Utc> {
    msg.timestamp()
        .to_millis()
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
        .unwrap_or_default()
}

fn to_owned_message(msg: &BorrowedMessage<'_>) -> Message {
    Message {
        topic: msg.topic().to_owned(),
        partition: msg.partition(),
        offset: msg.offset(),
        key: msg.key().map(<[u8]>::to_vec),
        payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        create_time: create_time(msg),
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<Message>> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_elapsed) => Ok(None),
            Ok(received) => Ok(Some(to_owned_message(&received?))),
        }
    }

    /// Kafka's committed position is the next offset to read
    async fn commit(&mut self, offsets: &PartitionOffsets) -> Result<()> {
        if offsets.is_empty() {
            return Ok(());
        }

        let mut tpl = TopicPartitionList::with_capacity(offsets.len());
        for (topic, partition, offset) in offsets.iter() {
            tpl.add_partition_offset(topic, partition, Offset::Offset(offset + 1))?;
        }

        block_in_place(|| self.consumer.commit(&tpl, CommitMode::Sync))?;
        debug!(?offsets, "committed");
        Ok(())
    }
}
