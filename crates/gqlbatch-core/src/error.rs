//! Error types surfaced to callers of a batch.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::key::GraphQLRequest;
use crate::transport::TransportError;

/// Stage of a batch that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The upstream call could not be completed.
    Transport,
    /// The combined response was not a sequence matching the batch.
    Shape,
    /// An item failed, or the status was not successful, and the failure
    /// was escalated to every caller of the batch.
    PartialBatch,
    /// A single item failed under the per-item policy.
    Item,
    /// A successful value could not be decoded into the caller's type.
    Decode,
    /// The batch was abandoned before it settled.
    Dropped,
}

impl FailureKind {
    /// Label used for metrics and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transport => "transport",
            FailureKind::Shape => "shape",
            FailureKind::PartialBatch => "partial_batch",
            FailureKind::Item => "item",
            FailureKind::Decode => "decode",
            FailureKind::Dropped => "dropped",
        }
    }
}

/// Source location attached to a GraphQL error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

/// One entry of a response's `errors` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    /// Human-readable description.
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<Location>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

/// Error delivered to a caller whose request did not resolve to data.
///
/// Carries the raw response-derived detail, the status of the combined
/// call, and (when it can be attributed) the request that failed.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ClientError {
    kind: FailureKind,
    message: String,
    detail: Value,
    status: Option<u16>,
    request: Option<GraphQLRequest>,
}

impl ClientError {
    /// Creates an error with a plain message and no response detail.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind,
            detail: json!({ "message": message }),
            message,
            status: None,
            request: None,
        }
    }

    /// Creates an error from a response-derived detail object.
    ///
    /// The message is the first entry of `errors`, or a dump of the whole
    /// detail when there is none.
    pub fn from_detail(kind: FailureKind, detail: Value, status: Option<u16>) -> Self {
        Self {
            kind,
            message: extract_message(&detail),
            detail,
            status,
            request: None,
        }
    }

    /// Error for a combined response that was not a JSON document.
    pub fn invalid_response(text: &str, status: u16) -> Self {
        Self::new(FailureKind::Shape, format!("Invalid response: {text}")).with_status(status)
    }

    /// Error for a batch whose settlement channel closed without a result.
    pub fn dropped() -> Self {
        Self::new(FailureKind::Dropped, "batch was dropped before it settled")
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attaches the request the failure was attributed to.
    pub fn with_request(mut self, request: GraphQLRequest) -> Self {
        self.request = Some(request);
        self
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The raw error detail as received (or synthesized) for the batch.
    pub fn detail(&self) -> &Value {
        &self.detail
    }

    /// Status code of the combined upstream call, if one completed.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn request(&self) -> Option<&GraphQLRequest> {
        self.request.as_ref()
    }

    /// Well-formed entries of the detail's `errors` list, in order.
    pub fn errors(&self) -> Vec<GraphQLError> {
        self.detail
            .get("errors")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        ClientError::new(FailureKind::Transport, err.to_string())
    }
}

fn extract_message(detail: &Value) -> String {
    let first_error = detail
        .get("errors")
        .and_then(|errors| errors.get(0))
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str);
    if let Some(message) = first_error {
        return message.to_string();
    }

    let dump = serde_json::to_string_pretty(detail).unwrap_or_else(|_| detail.to_string());
    format!("GraphQL Error: {dump}")
}

/// Result of one request within a batch.
pub type Outcome<V = Value> = Result<V, ClientError>;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
