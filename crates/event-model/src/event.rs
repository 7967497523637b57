//! The event record handed to the pipeline by producers.

use crate::{EventCategory, ModelError, ModelResult, SendPolicy, SequenceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known event types.
pub mod event_types {
    pub const VISIT: &str = "VISIT";
    pub const ACTIVATE: &str = "ACTIVATE";
    pub const REENGAGE: &str = "REENGAGE";
    pub const PAGE: &str = "PAGE";
    pub const PAGE_ATTRIBUTES: &str = "PAGE_ATTRIBUTES";
    pub const VIEW_CLICK: &str = "VIEW_CLICK";
    pub const VIEW_CHANGE: &str = "VIEW_CHANGE";
    pub const CUSTOM: &str = "CUSTOM";
    pub const VISITOR_ATTRIBUTES: &str = "VISITOR_ATTRIBUTES";
    pub const LOGIN_USER_ATTRIBUTES: &str = "LOGIN_USER_ATTRIBUTES";
    pub const CONVERSION_VARIABLES: &str = "CONVERSION_VARIABLES";
    pub const APP_CLOSED: &str = "APP_CLOSED";
}

/// An opaque, typed record destined for durable storage and delivery.
///
/// The pipeline never looks inside `attributes`; it only routes on
/// `event_type` and `send_policy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    pub send_policy: SendPolicy,
    pub timestamp: i64,
    #[serde(default)]
    pub global_sequence_id: i64,
    #[serde(default)]
    pub event_sequence_id: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(event_type: impl Into<String>, send_policy: SendPolicy) -> Self {
        Self {
            event_type: event_type.into(),
            event_name: None,
            send_policy,
            timestamp: crate::now_millis(),
            global_sequence_id: 0,
            event_sequence_id: 0,
            attributes: BTreeMap::new(),
        }
    }

    /// A `CUSTOM` event with the given name, sent with the next batch.
    pub fn custom(name: impl Into<String>) -> Self {
        Self::new(event_types::CUSTOM, SendPolicy::Batch).with_name(name)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.event_name = Some(name.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_attributes(mut self, attributes: BTreeMap<String, String>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    /// Stamp the identity issued by the sequencer.
    pub fn with_sequence_id(mut self, id: SequenceId) -> Self {
        self.global_sequence_id = id.global_id;
        self.event_sequence_id = id.per_type_id;
        self
    }

    pub fn sequence_id(&self) -> SequenceId {
        SequenceId {
            global_id: self.global_sequence_id,
            per_type_id: self.event_sequence_id,
        }
    }

    pub fn category(&self) -> EventCategory {
        EventCategory::for_event_type(&self.event_type)
    }

    /// Structural check applied before an event is stored or merged.
    pub fn validate(&self) -> ModelResult<()> {
        if self.event_type.trim().is_empty() {
            return Err(ModelError::InvalidEvent("eventType is empty".to_string()));
        }
        if self.timestamp < 0 {
            return Err(ModelError::InvalidEvent(format!(
                "negative timestamp {}",
                self.timestamp
            )));
        }
        Ok(())
    }
}
