//! Wire encodings for events.
//!
//! Two interchangeable marshallers:
//!
//! - [`JsonMarshaller`]: `application/json`, records are JSON objects and
//!   the envelope is a JSON array
//! - [`BinaryMarshaller`]: a compact tagged little-endian encoding with a
//!   length-prefixed envelope
//!
//! Both skip records that fail validation when building an envelope.
//! The marshaller chosen for a pipeline is installed into the component
//! registry as the `(EventFormatData, EventByteArray)` formatter.

pub mod binary;
mod error;
mod json;
mod module;

pub use binary::{BinaryMarshaller, BINARY_MEDIA_TYPE};
pub use error::{MarshallError, MarshallResult};
pub use json::{JsonMarshaller, JSON_MEDIA_TYPE};
pub use module::{BinaryMarshallerModule, FormatLoader, JsonMarshallerModule};

use event_model::{Event, EventByteArray};
use tracing::warn;

/// Converts events to and from one wire encoding.
pub trait EventMarshaller: Send + Sync {
    /// Content type of envelopes produced by this marshaller.
    fn media_type(&self) -> &'static str;

    /// Serialize one event as a single record.
    fn marshall_one(&self, event: &Event) -> MarshallResult<Vec<u8>>;

    /// Decode one record.
    fn unmarshall_one(&self, record: &[u8]) -> MarshallResult<Event>;

    /// Wrap already-serialized records into one envelope.
    fn wrap(&self, records: &[&[u8]]) -> Vec<u8>;

    /// Split an envelope back into its records.
    fn unwrap(&self, envelope: &[u8]) -> MarshallResult<Vec<Vec<u8>>>;

    /// Merge serialized records into one envelope, dropping any record that
    /// does not decode into a valid event.
    fn merge(&self, records: &[Vec<u8>]) -> EventByteArray {
        let valid: Vec<&[u8]> = records
            .iter()
            .enumerate()
            .filter_map(|(index, record)| {
                match self
                    .unmarshall_one(record)
                    .and_then(|event| event.validate().map_err(MarshallError::from))
                {
                    Ok(()) => Some(record.as_slice()),
                    Err(e) => {
                        warn!(index, error = %e, "dropping malformed record");
                        None
                    }
                }
            })
            .collect();

        EventByteArray {
            data: self.wrap(&valid),
            media_type: self.media_type().to_string(),
            count: valid.len(),
        }
    }

    /// Serialize events into one envelope, skipping events that fail
    /// validation or serialization.
    fn marshall_many(&self, events: &[Event]) -> EventByteArray {
        let records: Vec<Vec<u8>> = events
            .iter()
            .filter_map(|event| {
                match event
                    .validate()
                    .map_err(MarshallError::from)
                    .and_then(|()| self.marshall_one(event))
                {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!(event_type = %event.event_type, error = %e, "skipping event");
                        None
                    }
                }
            })
            .collect();
        let refs: Vec<&[u8]> = records.iter().map(Vec::as_slice).collect();

        EventByteArray {
            data: self.wrap(&refs),
            media_type: self.media_type().to_string(),
            count: refs.len(),
        }
    }

    /// Decode every record of an envelope.
    fn unmarshall(&self, envelope: &[u8]) -> MarshallResult<Vec<Event>> {
        self.unwrap(envelope)?
            .iter()
            .map(|record| self.unmarshall_one(record))
            .collect()
    }
}
