//! IPC protocol definitions.
//!
//! Uses a JSON-RPC-like protocol over Unix domain sockets, one JSON object
//! per line. Binary payloads travel base64-encoded.

use crate::error::{IpcError, IpcResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use event_model::{Event, EventCategory, EventDbResult, SendPolicy, StoredEventRow};
use serde::{Deserialize, Serialize};

/// IPC method types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Health,

    #[serde(rename = "events.insert")]
    EventsInsert,
    #[serde(rename = "events.query")]
    EventsQuery,
    #[serde(rename = "events.query_and_delete")]
    EventsQueryAndDelete,
    #[serde(rename = "events.delete")]
    EventsDelete,
    #[serde(rename = "events.remove_overdue")]
    EventsRemoveOverdue,
    #[serde(rename = "events.clear")]
    EventsClear,
}

impl Method {
    pub const ALL: [Method; 7] = [
        Method::Health,
        Method::EventsInsert,
        Method::EventsQuery,
        Method::EventsQueryAndDelete,
        Method::EventsDelete,
        Method::EventsRemoveOverdue,
        Method::EventsClear,
    ];
}

/// IPC request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation.
    pub id: String,
    /// Method to invoke.
    pub method: Method,
    /// Method parameters (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Request {
    /// Create a new request with auto-generated ID.
    pub fn new(method: Method) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            method,
            params: None,
        }
    }

    /// Create a new request with parameters.
    pub fn with_params(method: Method, params: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            method,
            params: Some(params),
        }
    }

    /// Deserialize the parameters into `T`.
    pub fn parse_params<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let params = self.params.clone().unwrap_or(serde_json::Value::Null);
        serde_json::from_value(params)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// IPC response message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Request ID for correlation.
    pub id: String,
    /// Result data (if successful).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error information (if failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// Error information in a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Response {
    /// Create a successful response.
    pub fn success(id: &str, result: serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: &str, code: i32, message: &str) -> Self {
        Self {
            id: id.to_string(),
            result: None,
            error: Some(ErrorInfo {
                code,
                message: message.to_string(),
                data: None,
            }),
        }
    }

    /// Create an error response with additional data.
    pub fn error_with_data(id: &str, code: i32, message: &str, data: serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            result: None,
            error: Some(ErrorInfo {
                code,
                message: message.to_string(),
                data: Some(data),
            }),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Turn the response into its result value, or the server's error.
    pub fn into_result(self) -> IpcResult<serde_json::Value> {
        match self.error {
            Some(error) => Err(IpcError::Remote {
                code: error.code,
                message: error.message,
            }),
            None => Ok(self.result.unwrap_or(serde_json::Value::Null)),
        }
    }
}

/// Standard JSON-RPC error codes, plus a store-specific one.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    /// No storage component is registered, or the pipeline has stopped.
    pub const STORE_UNAVAILABLE: i32 = -32010;
}

/// Parameters of `events.insert`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertParams {
    pub event: Event,
}

/// Parameters of `events.query` and `events.query_and_delete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchParams {
    pub policy: SendPolicy,
    pub limit: usize,
}

/// Parameters of `events.delete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteParams {
    pub last_id: i64,
    pub policy: SendPolicy,
    pub category: EventCategory,
}

/// A stored row on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRow {
    pub row_id: i64,
    pub category: EventCategory,
    pub send_policy: SendPolicy,
    pub payload: String,
    pub inserted_at_ms: i64,
}

/// A storage result on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireDbResult {
    pub success: bool,
    pub sum: usize,
    pub last_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<EventCategory>,
    #[serde(default)]
    pub rows: Vec<WireRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl From<&EventDbResult> for WireDbResult {
    fn from(result: &EventDbResult) -> Self {
        Self {
            success: result.success,
            sum: result.sum,
            last_id: result.last_id,
            category: result.category,
            rows: result
                .rows
                .iter()
                .map(|row| WireRow {
                    row_id: row.row_id,
                    category: row.category,
                    send_policy: row.send_policy,
                    payload: BASE64.encode(&row.payload),
                    inserted_at_ms: row.inserted_at_ms,
                })
                .collect(),
            data: result.data.as_ref().map(|data| BASE64.encode(data)),
            media_type: result.media_type.clone(),
        }
    }
}

impl WireDbResult {
    /// Decode back into a storage result.
    pub fn into_db_result(self) -> IpcResult<EventDbResult> {
        let rows = self
            .rows
            .into_iter()
            .map(|row| {
                Ok(StoredEventRow {
                    row_id: row.row_id,
                    category: row.category,
                    send_policy: row.send_policy,
                    payload: decode_base64(&row.payload)?,
                    inserted_at_ms: row.inserted_at_ms,
                })
            })
            .collect::<IpcResult<Vec<_>>>()?;
        let data = self.data.as_deref().map(decode_base64).transpose()?;

        Ok(EventDbResult {
            success: self.success,
            sum: self.sum,
            last_id: self.last_id,
            category: self.category,
            rows,
            data,
            media_type: self.media_type,
        })
    }
}

fn decode_base64(encoded: &str) -> IpcResult<Vec<u8>> {
    BASE64
        .decode(encoded)
        .map_err(|e| IpcError::Protocol(format!("invalid base64 payload: {e}")))
}
