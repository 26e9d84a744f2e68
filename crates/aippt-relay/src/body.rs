//! Request body collection.
//!
//! The inbound body arrives as a stream of chunks; it is complete only at end
//! of stream. Chunks are concatenated into one buffer bounded by the configured
//! limit, then parsed as a [`ChatRequest`].

use crate::error::RelayError;
use crate::types::ChatRequest;
use actix_web::web::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::fmt::Display;

/// Drain `stream` into a single buffer of at most `limit` bytes.
///
/// Reading stops at the first chunk that would exceed the limit.
pub async fn collect_body<S, E>(mut stream: S, limit: usize) -> Result<Bytes, RelayError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            RelayError::MalformedRequest(format!("failed to read request body: {e}"))
        })?;
        if buf.len() + chunk.len() > limit {
            return Err(RelayError::PayloadTooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

/// Reject early when a declared `Content-Length` is already over the limit.
pub fn check_declared_length(content_length: Option<&str>, limit: usize) -> Result<(), RelayError> {
    match content_length.and_then(|v| v.trim().parse::<u64>().ok()) {
        Some(len) if len > limit as u64 => Err(RelayError::PayloadTooLarge { limit }),
        _ => Ok(()),
    }
}

pub fn parse_chat_request(body: &[u8]) -> Result<ChatRequest, RelayError> {
    let req: ChatRequest = serde_json::from_slice(body)
        .map_err(|e| RelayError::MalformedRequest(e.to_string()))?;
    req.validate()?;
    Ok(req)
}
