//! Send policy and storage category of an event.

use crate::{event_types, ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether an event bypasses batching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendPolicy {
    /// Stored, then sent immediately.
    Instant,
    /// Stored and sent with the next batch.
    Batch,
}

impl SendPolicy {
    /// Every policy, in the order a full send pass drains them.
    pub const ALL: [SendPolicy; 2] = [SendPolicy::Instant, SendPolicy::Batch];

    /// Integer code stored in the database.
    pub fn code(self) -> i64 {
        match self {
            SendPolicy::Instant => 1,
            SendPolicy::Batch => 2,
        }
    }

    pub fn from_code(code: i64) -> ModelResult<Self> {
        match code {
            1 => Ok(SendPolicy::Instant),
            2 => Ok(SendPolicy::Batch),
            other => Err(ModelError::UnknownSendPolicy(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SendPolicy::Instant => "INSTANT",
            SendPolicy::Batch => "BATCH",
        }
    }
}

impl fmt::Display for SendPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SendPolicy {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INSTANT" => Ok(SendPolicy::Instant),
            "BATCH" => Ok(SendPolicy::Batch),
            _ => Err(ModelError::UnknownSendPolicy(s.to_string())),
        }
    }
}

/// Storage category grouping event types into batches.
///
/// A delivered batch never mixes categories, so the server receives
/// session events, auto-tracked events and custom events in separate
/// requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventCategory {
    Instant,
    Autotrack,
    Track,
    Other,
}

impl EventCategory {
    /// Category an event type is stored under.
    pub fn for_event_type(event_type: &str) -> Self {
        match event_type {
            event_types::VISIT | event_types::ACTIVATE | event_types::REENGAGE => {
                EventCategory::Instant
            }
            event_types::PAGE
            | event_types::PAGE_ATTRIBUTES
            | event_types::VIEW_CLICK
            | event_types::VIEW_CHANGE => EventCategory::Autotrack,
            event_types::CUSTOM
            | event_types::VISITOR_ATTRIBUTES
            | event_types::LOGIN_USER_ATTRIBUTES
            | event_types::CONVERSION_VARIABLES => EventCategory::Track,
            _ => EventCategory::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventCategory::Instant => "INSTANT",
            EventCategory::Autotrack => "AUTOTRACK",
            EventCategory::Track => "TRACK",
            EventCategory::Other => "OTHER",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventCategory {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSTANT" => Ok(EventCategory::Instant),
            "AUTOTRACK" => Ok(EventCategory::Autotrack),
            "TRACK" => Ok(EventCategory::Track),
            "OTHER" => Ok(EventCategory::Other),
            _ => Err(ModelError::UnknownCategory(s.to_string())),
        }
    }
}
