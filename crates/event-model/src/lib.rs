//! Value types shared by every stage of the event pipeline.
//!
//! - [`Event`]: the opaque record producers hand to the pipeline
//! - [`SendPolicy`], [`EventCategory`]: how an event is batched
//! - [`SequenceId`]: cross-process monotonic identity
//! - `stage`: the model/data pairs the component registry routes
//!   (storage, formatting, transport, encoding)

mod error;
mod event;
mod policy;
mod sequence;
pub mod stage;

pub use error::{ModelError, ModelResult};
pub use event::{event_types, Event};
pub use policy::{EventCategory, SendPolicy};
pub use sequence::{SequenceId, TYPE_GLOBAL};
pub use stage::{
    EventByteArray, EventDatabase, EventDbResult, EventEncoder, EventFormatData, EventResponse,
    EventUrl, StoredEventRow,
};

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
