//! Backend adapters.
//!
//! A backend receives one parsed request and produces one [`BackendResult`].
//! Exactly one adapter is selected from [`GatewayConfig`] at start-up and
//! shared, read-only, by every request.

pub mod http;
pub mod subprocess;

use crate::config::{BackendKind, GatewayConfig};
use crate::error::RelayError;
use crate::types::ChatRequest;
use actix_web::web::Bytes;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub use http::HttpBackend;
pub use subprocess::SubprocessBackend;

/// Everything a backend may need from the inbound request.
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub chat: ChatRequest,
    /// The body exactly as received, for byte-for-byte forwarding.
    pub raw_body: Bytes,
    /// API key supplied by the caller, if any.
    pub credential: Option<String>,
}

/// Outcome of one backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendResult {
    /// Completion text, to be wrapped in the relay's envelope.
    Success {
        text: String,
        stop_reason: String,
        model: Option<String>,
    },
    /// Upstream status and body, returned verbatim.
    Passthrough { status: u16, body: Bytes },
    Failure(RelayError),
}

impl From<RelayError> for BackendResult {
    fn from(err: RelayError) -> Self {
        Self::Failure(err)
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Human-readable target for logs and `/health`.
    fn target(&self) -> Option<String> {
        None
    }

    async fn complete(&self, request: &RelayRequest) -> BackendResult;
}

pub fn from_config(config: &GatewayConfig) -> Result<Arc<dyn Backend>> {
    Ok(match config.backend {
        BackendKind::Subprocess => Arc::new(SubprocessBackend::from_config(config)),
        BackendKind::Http => Arc::new(HttpBackend::from_config(config)?),
    })
}
