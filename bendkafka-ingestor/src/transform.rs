//! Turns a batch of queue payloads into NDJSON lines.
//!
//! With wrapping enabled every payload becomes one envelope object carrying its
//! provenance next to the original data. Otherwise payloads are assumed to
//! already be NDJSON and pass through untouched.

use std::borrow::Cow;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::value::RawValue;
use uuid::Uuid;

use crate::{
    errors::BendIngestError,
    message::{Message, MessageBatch},
    Result,
};

#[derive(Debug, Serialize)]
pub struct EnvelopeRecord<'a> {
    pub uuid: String,
    pub record_metadata: RecordMetadata<'a>,
    pub add_time: String,
    pub raw_data: RawData<'a>,
}

/// Partition and offset are strings on the wire, matching the table's json column
#[derive(Debug, Serialize)]
pub struct RecordMetadata<'a> {
    pub topic: &'a str,
    pub partition: String,
    pub offset: String,
    pub key: Cow<'a, str>,
    pub create_time: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RawData<'a> {
    Json(&'a RawValue),
    Compacted(Box<RawValue>),
    Text(&'a str),
}

pub fn rfc3339_nanos(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Produce one NDJSON line per message, in batch order
pub fn to_envelope_lines(batch: &MessageBatch, needs_transform: bool) -> Result<Vec<String>> {
    batch
        .messages()
        .iter()
        .map(|msg| {
            if needs_transform {
                envelope_line(msg, Utc::now())
            } else {
                passthrough_line(msg)
            }
        })
        .collect()
}

pub fn envelope_line(msg: &Message, add_time: DateTime<Utc>) -> Result<String> {
    let text = payload_text(msg)?;

    let record = EnvelopeRecord {
        uuid: Uuid::new_v4().to_string(),
        record_metadata: RecordMetadata {
            topic: &msg.topic,
            partition: msg.partition.to_string(),
            offset: msg.offset.to_string(),
            key: msg.key_str(),
            create_time: rfc3339_nanos(msg.create_time),
        },
        add_time: rfc3339_nanos(add_time),
        raw_data: raw_data(msg, text)?,
    };

    serde_json::to_string(&record).map_err(|err| transform_error(msg, err.to_string()))
}

fn passthrough_line(msg: &Message) -> Result<String> {
    let text = payload_text(msg)?;
    Ok(text.trim_end_matches(['\r', '\n']).to_owned())
}

fn payload_text(msg: &Message) -> Result<&str> {
    std::str::from_utf8(&msg.payload).map_err(|err| transform_error(msg, err.to_string()))
}

/// JSON payloads are embedded as-is; anything else is kept as a JSON string
fn raw_data<'a>(msg: &Message, text: &'a str) -> Result<RawData<'a>> {
    let raw = match serde_json::from_str::<&RawValue>(text) {
        Ok(raw) => raw,
        Err(_) => return Ok(RawData::Text(text)),
    };

    // a pretty-printed payload would split the line
    if raw.get().contains(['\n', '\r']) {
        let value: serde_json::Value =
            serde_json::from_str(raw.get()).map_err(|err| transform_error(msg, err.to_string()))?;
        let compact = serde_json::value::to_raw_value(&value)
            .map_err(|err| transform_error(msg, err.to_string()))?;
        return Ok(RawData::Compacted(compact));
    }

    Ok(RawData::Json(raw))
}

fn transform_error(msg: &Message, reason: String) -> BendIngestError {
    BendIngestError::Transform {
        partition: msg.partition,
        offset: msg.offset,
        reason,
    }
}
