use std::time::Duration;

use async_trait::async_trait;

use crate::{
    message::{Message, PartitionOffsets},
    Result,
};

pub mod kafka;
pub mod mock;

/// A subscription owned by exactly one worker
#[async_trait]
pub trait MessageSource: Send {
    /// Wait up to `timeout` for the next message
    async fn poll(&mut self, timeout: Duration) -> Result<Option<Message>>;

    /// Acknowledge everything up to and including the given offsets
    async fn commit(&mut self, offsets: &PartitionOffsets) -> Result<()>;
}
