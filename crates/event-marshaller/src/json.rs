//! Human-readable JSON encoding.

use crate::{EventMarshaller, MarshallResult};
use event_model::Event;

pub const JSON_MEDIA_TYPE: &str = "application/json";

/// One JSON object per record; envelopes are JSON arrays.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMarshaller;

impl EventMarshaller for JsonMarshaller {
    fn media_type(&self) -> &'static str {
        JSON_MEDIA_TYPE
    }

    fn marshall_one(&self, event: &Event) -> MarshallResult<Vec<u8>> {
        Ok(serde_json::to_vec(event)?)
    }

    fn unmarshall_one(&self, record: &[u8]) -> MarshallResult<Event> {
        Ok(serde_json::from_slice(record)?)
    }

    /// Records are already valid JSON objects; they are spliced in as-is.
    fn wrap(&self, records: &[&[u8]]) -> Vec<u8> {
        let body: usize = records.iter().map(|record| record.len() + 1).sum();
        let mut envelope = Vec::with_capacity(body + 2);
        envelope.push(b'[');
        for (index, record) in records.iter().enumerate() {
            if index > 0 {
                envelope.push(b',');
            }
            envelope.extend_from_slice(record);
        }
        envelope.push(b']');
        envelope
    }

    fn unwrap(&self, envelope: &[u8]) -> MarshallResult<Vec<Vec<u8>>> {
        let records: Vec<Box<serde_json::value::RawValue>> = serde_json::from_slice(envelope)?;
        Ok(records
            .into_iter()
            .map(|raw| raw.get().as_bytes().to_vec())
            .collect())
    }
}
