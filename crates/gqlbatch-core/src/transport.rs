//! Transport seam used by the dispatcher.
//!
//! The engine never builds HTTP semantics itself. It hands a combined
//! payload to a [`Transport`] and needs back only the status code, whether
//! the body was declared as structured JSON, and the raw body bytes.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// How the upstream declared the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// JSON content; the body is parsed before interpretation.
    Structured,
    /// Anything else; the body is treated as text.
    Opaque,
}

impl ContentKind {
    /// Classifies a `Content-Type` header value.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            Some(value) if value.trim_start().starts_with("application/json") => {
                ContentKind::Structured
            }
            _ => ContentKind::Opaque,
        }
    }
}

/// Raw response of one combined upstream call.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub content_kind: ContentKind,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: u16, content_kind: ContentKind, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_kind,
            body: body.into(),
        }
    }

    /// A JSON response carrying `body`.
    pub fn structured(status: u16, body: &Value) -> Self {
        Self::new(status, ContentKind::Structured, body.to_string())
    }

    /// A non-JSON response carrying `text`.
    pub fn opaque(status: u16, text: impl Into<String>) -> Self {
        Self::new(status, ContentKind::Opaque, text.into())
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure to complete the upstream call.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be sent or no response arrived.
    #[error("transport request failed: {message}")]
    Request { message: String },

    /// The response body could not be read.
    #[error("failed to read response body: {message}")]
    Body { message: String },
}

/// Performs the single upstream call for a batch.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a combined payload and returns the raw response.
    async fn send(&self, payload: Vec<u8>) -> Result<TransportResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_kind_from_content_type() {
        assert_eq!(
            ContentKind::from_content_type(Some("application/json")),
            ContentKind::Structured
        );
        assert_eq!(
            ContentKind::from_content_type(Some("application/json; charset=utf-8")),
            ContentKind::Structured
        );
        assert_eq!(
            ContentKind::from_content_type(Some("text/html")),
            ContentKind::Opaque
        );
        assert_eq!(ContentKind::from_content_type(None), ContentKind::Opaque);
    }

    #[test]
    fn test_success_range() {
        assert!(TransportResponse::opaque(200, "").is_success());
        assert!(TransportResponse::opaque(204, "").is_success());
        assert!(!TransportResponse::opaque(302, "").is_success());
        assert!(!TransportResponse::opaque(500, "").is_success());
    }
}
