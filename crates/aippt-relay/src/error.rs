//! Relay error taxonomy.
//!
//! Every failure a caller can observe is one of these variants. Each maps to a
//! fixed HTTP status and a JSON error envelope; nothing is retried and nothing
//! is swallowed.

use actix_web::http::StatusCode;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("Invalid request: {0}")]
    MalformedRequest(String),

    #[error("API Key required")]
    MissingCredential,

    #[error("Not found")]
    NotFound,

    #[error("Method not allowed")]
    MethodNotSupported,

    #[error("Request body exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    #[error("{0}")]
    BackendUnavailable(String),

    /// The backend answered, but with a failure: a nonzero exit code or a
    /// non-2xx upstream status.
    #[error("{message}")]
    BackendRejected {
        status: Option<u16>,
        message: String,
        kind: Option<String>,
    },

    #[error("Backend did not respond within {0} seconds")]
    BackendTimeout(u64),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            Self::MissingCredential => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotSupported => StatusCode::METHOD_NOT_ALLOWED,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BackendUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendRejected { status, .. } => status
                .and_then(|s| StatusCode::from_u16(s).ok())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::BackendTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Anthropic-style `error.type`, when one applies.
    pub fn kind(&self) -> Option<&str> {
        match self {
            Self::MalformedRequest(_) => Some("invalid_request_error"),
            Self::MissingCredential => Some("authentication_error"),
            Self::PayloadTooLarge { .. } => Some("request_too_large"),
            Self::BackendTimeout(_) => Some("timeout_error"),
            Self::BackendRejected { kind, .. } => kind.as_deref(),
            Self::NotFound | Self::MethodNotSupported | Self::BackendUnavailable(_) => None,
        }
    }

    /// JSON body sent to the caller.
    ///
    /// Routing errors keep the flat `{"error": "..."}` shape browsers of the
    /// relay already expect; everything else uses `{"error": {"message", "type"}}`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::NotFound | Self::MethodNotSupported => json!({ "error": self.to_string() }),
            _ => {
                let mut error = json!({ "message": self.to_string() });
                if let Some(kind) = self.kind() {
                    error["type"] = Value::String(kind.to_string());
                }
                json!({ "error": error })
            }
        }
    }
}
