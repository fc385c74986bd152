use std::time::{Duration, Instant};

use crate::message::{Message, MessageBatch};

/// Upper bound on the up-front reservation; larger batches grow on demand
const PREALLOC_LIMIT: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    Size,
    Interval,
}

/// Per-worker buffer of polled messages.
/// Flushes once it holds `max_batch_size` messages or its first message is
/// `max_batch_interval` old, checked in that order. Never flushes empty.
#[derive(Debug)]
pub struct BatchAccumulator {
    max_batch_size: usize,
    max_batch_interval: Duration,
    first_at: Option<Instant>,
    messages: Vec<Message>,
}

impl BatchAccumulator {
    pub fn new(max_batch_size: usize, max_batch_interval: Duration) -> Self {
        Self {
            max_batch_size,
            max_batch_interval,
            first_at: None,
            messages: Vec::with_capacity(max_batch_size.min(PREALLOC_LIMIT)),
        }
    }

    pub fn append(&mut self, msg: Message, now: Instant) {
        self.first_at.get_or_insert(now);
        self.messages.push(msg);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn age_since_first(&self, now: Instant) -> Option<Duration> {
        self.first_at
            .map(|first_at| now.saturating_duration_since(first_at))
    }

    pub fn flush_reason(&self, now: Instant) -> Option<FlushReason> {
        if self.is_empty() {
            return None;
        }

        if self.len() >= self.max_batch_size {
            Some(FlushReason::Size)
        } else if self
            .age_since_first(now)
            .is_some_and(|age| age >= self.max_batch_interval)
        {
            Some(FlushReason::Interval)
        } else {
            None
        }
    }

    pub fn drain_and_reset(&mut self) -> MessageBatch {
        self.first_at = None;
        let messages = std::mem::replace(
            &mut self.messages,
            Vec::with_capacity(self.max_batch_size.min(PREALLOC_LIMIT)),
        );
        MessageBatch::new(messages)
    }
}
