//! Compact binary encoding.
//!
//! All integers are little-endian.
//!
//! Record:
//! ```text
//! [1: type=0x01][1: version][2: field_count] then field_count fields:
//! [1: tag][4: value_len][N: value]
//! ```
//!
//! Envelope:
//! ```text
//! [1: type=0x02][1: version][2: reserved][4: record_count] then per record:
//! [4: record_len][N: record]
//! ```
//!
//! Unknown field tags are skipped so newer writers stay readable.

use crate::{EventMarshaller, MarshallError, MarshallResult};
use event_model::{Event, SendPolicy};
use std::collections::BTreeMap;

pub const BINARY_MEDIA_TYPE: &str = "application/x-tracker-binary";

/// Frame type of a single record.
pub const FRAME_TYPE_RECORD: u8 = 0x01;

/// Frame type of an envelope.
pub const FRAME_TYPE_ENVELOPE: u8 = 0x02;

/// Encoding version written by this crate.
pub const VERSION: u8 = 0x01;

pub const TAG_EVENT_TYPE: u8 = 0x01;
pub const TAG_EVENT_NAME: u8 = 0x02;
pub const TAG_SEND_POLICY: u8 = 0x03;
pub const TAG_TIMESTAMP: u8 = 0x04;
pub const TAG_GLOBAL_SEQUENCE_ID: u8 = 0x05;
pub const TAG_EVENT_SEQUENCE_ID: u8 = 0x06;
/// Value: `[4: key_len][key][value]`; one field per attribute.
pub const TAG_ATTRIBUTE: u8 = 0x07;

const RECORD_HEADER_SIZE: usize = 1 + 1 + 2;
const ENVELOPE_HEADER_SIZE: usize = 1 + 1 + 2 + 4;

/// Tagged binary records in a length-prefixed envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryMarshaller;

impl EventMarshaller for BinaryMarshaller {
    fn media_type(&self) -> &'static str {
        BINARY_MEDIA_TYPE
    }

    fn marshall_one(&self, event: &Event) -> MarshallResult<Vec<u8>> {
        encode_record(event)
    }

    fn unmarshall_one(&self, record: &[u8]) -> MarshallResult<Event> {
        decode_record(record)
    }

    fn wrap(&self, records: &[&[u8]]) -> Vec<u8> {
        encode_envelope(records)
    }

    fn unwrap(&self, envelope: &[u8]) -> MarshallResult<Vec<Vec<u8>>> {
        decode_envelope(envelope)
    }
}

/// Encode one event as a record.
pub fn encode_record(event: &Event) -> MarshallResult<Vec<u8>> {
    let mut fields: Vec<(u8, Vec<u8>)> = Vec::with_capacity(6 + event.attributes.len());

    fields.push((TAG_EVENT_TYPE, event.event_type.as_bytes().to_vec()));
    if let Some(name) = &event.event_name {
        fields.push((TAG_EVENT_NAME, name.as_bytes().to_vec()));
    }
    fields.push((TAG_SEND_POLICY, vec![event.send_policy.code() as u8]));
    fields.push((TAG_TIMESTAMP, event.timestamp.to_le_bytes().to_vec()));
    fields.push((
        TAG_GLOBAL_SEQUENCE_ID,
        event.global_sequence_id.to_le_bytes().to_vec(),
    ));
    fields.push((
        TAG_EVENT_SEQUENCE_ID,
        event.event_sequence_id.to_le_bytes().to_vec(),
    ));
    for (key, value) in &event.attributes {
        let mut entry = Vec::with_capacity(4 + key.len() + value.len());
        entry.extend_from_slice(&len_u32(key.len())?.to_le_bytes());
        entry.extend_from_slice(key.as_bytes());
        entry.extend_from_slice(value.as_bytes());
        fields.push((TAG_ATTRIBUTE, entry));
    }

    let field_count = u16::try_from(fields.len()).map_err(|_| {
        MarshallError::Protocol(format!("too many fields: {}", fields.len()))
    })?;

    let body: usize = fields.iter().map(|(_, value)| 1 + 4 + value.len()).sum();
    let mut buf = Vec::with_capacity(RECORD_HEADER_SIZE + body);
    buf.push(FRAME_TYPE_RECORD);
    buf.push(VERSION);
    buf.extend_from_slice(&field_count.to_le_bytes());
    for (tag, value) in fields {
        buf.push(tag);
        buf.extend_from_slice(&len_u32(value.len())?.to_le_bytes());
        buf.extend_from_slice(&value);
    }
    Ok(buf)
}

/// Decode one record.
pub fn decode_record(data: &[u8]) -> MarshallResult<Event> {
    let mut reader = Reader::new(data);

    let frame_type = reader.u8()?;
    if frame_type != FRAME_TYPE_RECORD {
        return Err(MarshallError::Protocol(format!(
            "Expected record type {:#04x}, got {:#04x}",
            FRAME_TYPE_RECORD, frame_type
        )));
    }
    let version = reader.u8()?;
    if version != VERSION {
        return Err(MarshallError::Protocol(format!(
            "Unsupported record version {}",
            version
        )));
    }
    let field_count = reader.u16()?;

    let mut event_type = None;
    let mut event_name = None;
    let mut send_policy = None;
    let mut timestamp = None;
    let mut global_sequence_id = 0;
    let mut event_sequence_id = 0;
    let mut attributes = BTreeMap::new();

    for _ in 0..field_count {
        let tag = reader.u8()?;
        let len = reader.u32()? as usize;
        let value = reader.take(len)?;

        match tag {
            TAG_EVENT_TYPE => event_type = Some(utf8(value, "eventType")?),
            TAG_EVENT_NAME => event_name = Some(utf8(value, "eventName")?),
            TAG_SEND_POLICY => {
                let code = *value
                    .first()
                    .filter(|_| value.len() == 1)
                    .ok_or_else(|| MarshallError::Protocol("Invalid sendPolicy".to_string()))?;
                send_policy = Some(SendPolicy::from_code(code as i64)?);
            }
            TAG_TIMESTAMP => timestamp = Some(fixed_i64(value, "timestamp")?),
            TAG_GLOBAL_SEQUENCE_ID => global_sequence_id = fixed_i64(value, "globalSequenceId")?,
            TAG_EVENT_SEQUENCE_ID => event_sequence_id = fixed_i64(value, "eventSequenceId")?,
            TAG_ATTRIBUTE => {
                let mut entry = Reader::new(value);
                let key_len = entry.u32()? as usize;
                let key = utf8(entry.take(key_len)?, "attribute key")?;
                let value = utf8(entry.rest(), "attribute value")?;
                attributes.insert(key, value);
            }
            _ => {}
        }
    }

    if !reader.rest().is_empty() {
        return Err(MarshallError::Protocol(format!(
            "Record has {} trailing bytes",
            reader.rest().len()
        )));
    }

    let missing = |field: &str| MarshallError::Protocol(format!("Record missing {}", field));
    Ok(Event {
        event_type: event_type.ok_or_else(|| missing("eventType"))?,
        event_name,
        send_policy: send_policy.ok_or_else(|| missing("sendPolicy"))?,
        timestamp: timestamp.ok_or_else(|| missing("timestamp"))?,
        global_sequence_id,
        event_sequence_id,
        attributes,
    })
}

/// Wrap records into an envelope. Records are copied verbatim.
pub fn encode_envelope(records: &[&[u8]]) -> Vec<u8> {
    let body: usize = records.iter().map(|record| 4 + record.len()).sum();
    let mut buf = Vec::with_capacity(ENVELOPE_HEADER_SIZE + body);
    buf.push(FRAME_TYPE_ENVELOPE);
    buf.push(VERSION);
    buf.extend_from_slice(&[0u8, 0u8]);
    buf.extend_from_slice(&(records.len() as u32).to_le_bytes());
    for record in records {
        buf.extend_from_slice(&(record.len() as u32).to_le_bytes());
        buf.extend_from_slice(record);
    }
    buf
}

/// Split an envelope into its records.
pub fn decode_envelope(data: &[u8]) -> MarshallResult<Vec<Vec<u8>>> {
    if data.len() < ENVELOPE_HEADER_SIZE {
        return Err(MarshallError::Protocol(format!(
            "Envelope too short: {} bytes, need at least {}",
            data.len(),
            ENVELOPE_HEADER_SIZE
        )));
    }

    let mut reader = Reader::new(data);
    let frame_type = reader.u8()?;
    if frame_type != FRAME_TYPE_ENVELOPE {
        return Err(MarshallError::Protocol(format!(
            "Expected envelope type {:#04x}, got {:#04x}",
            FRAME_TYPE_ENVELOPE, frame_type
        )));
    }
    let _version = reader.u8()?;
    let _reserved = reader.take(2)?;
    let count = reader.u32()? as usize;

    let mut records = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let len = reader.u32()? as usize;
        records.push(reader.take(len)?.to_vec());
    }

    if !reader.rest().is_empty() {
        return Err(MarshallError::Protocol(format!(
            "Envelope has {} trailing bytes",
            reader.rest().len()
        )));
    }
    Ok(records)
}

fn len_u32(len: usize) -> MarshallResult<u32> {
    u32::try_from(len).map_err(|_| MarshallError::Protocol(format!("field too long: {}", len)))
}

fn utf8(bytes: &[u8], field: &str) -> MarshallResult<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| MarshallError::Protocol(format!("Invalid UTF-8 in {}", field)))
}

fn fixed_i64(bytes: &[u8], field: &str) -> MarshallResult<i64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| MarshallError::Protocol(format!("Invalid {} length: {}", field, bytes.len())))?;
    Ok(i64::from_le_bytes(raw))
}

/// Bounds-checked cursor over a byte slice.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> MarshallResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                MarshallError::Protocol(format!(
                    "Truncated data: need {} bytes at offset {}, have {}",
                    len,
                    self.pos,
                    self.data.len() - self.pos
                ))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    fn u8(&mut self) -> MarshallResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> MarshallResult<u16> {
        let raw: [u8; 2] = self
            .take(2)?
            .try_into()
            .map_err(|_| MarshallError::Protocol("Invalid u16".to_string()))?;
        Ok(u16::from_le_bytes(raw))
    }

    fn u32(&mut self) -> MarshallResult<u32> {
        let raw: [u8; 4] = self
            .take(4)?
            .try_into()
            .map_err(|_| MarshallError::Protocol("Invalid u32".to_string()))?;
        Ok(u32::from_le_bytes(raw))
    }
}
