//! AIPPT Relay - local relay for Anthropic-style chat completions.
//!
//! Browsers cannot call the completion API directly (CORS, and the upstream
//! only serves clients that look like the official SDK). This crate exposes a
//! permissive `/v1/messages` endpoint on localhost and forwards each request
//! to one configured backend:
//! - a CLI subprocess that reads the prompt on stdin and prints the answer, or
//! - an upstream HTTP API, called with the official client's header fingerprint.
//!
//! Each request is an independent transaction: collect the body, call the
//! backend once, translate the result. Nothing is retried, queued or cached.

pub mod backend;
pub mod body;
pub mod config;
pub mod error;
pub mod server;
pub mod translation;
pub mod types;

pub use backend::{Backend, BackendResult, RelayRequest};
pub use config::{BackendKind, GatewayConfig, HttpMode, RelayArgs};
pub use error::RelayError;
pub use server::{configure, cors_headers, serve, AppState};
