//! Upstream HTTP backend.
//!
//! Forwards each request to `{upstream}/v1/messages`. The upstream is known to
//! treat requests differently depending on which client it thinks it is
//! talking to, so every call carries [`CLIENT_FINGERPRINT`], the header set of
//! the official TypeScript SDK as shipped with the Claude Code CLI.

use super::{Backend, BackendResult, RelayRequest};
use crate::config::{BackendKind, GatewayConfig, HttpMode};
use crate::error::RelayError;
use crate::types::DEFAULT_STOP_REASON;
use actix_web::http::header::HeaderMap;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::{debug, warn};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Header set sent on every upstream call. Part of the upstream contract;
/// changing any value changes upstream behavior.
pub const CLIENT_FINGERPRINT: &[(&str, &str)] = &[
    ("accept", "application/json"),
    ("anthropic-version", ANTHROPIC_VERSION),
    ("user-agent", "anthropic-typescript/0.39.0"),
    ("x-stainless-lang", "js"),
    ("x-stainless-package-version", "0.39.0"),
    ("x-stainless-os", "MacOS"),
    ("x-stainless-arch", "arm64"),
    ("x-stainless-runtime", "node"),
    ("x-stainless-runtime-version", "v22.12.0"),
    (
        "anthropic-beta",
        "prompt-caching-2024-07-31,interleaved-thinking-2025-05-14",
    ),
];

fn fingerprint_headers() -> reqwest::header::HeaderMap {
    let mut headers = reqwest::header::HeaderMap::new();
    for &(name, value) in CLIENT_FINGERPRINT {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    headers
}

/// API key supplied by the caller: `x-api-key`, else `Authorization: Bearer`.
pub fn credential_from_headers(headers: &HeaderMap) -> Option<String> {
    fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    header(headers, "x-api-key")
        .or_else(|| {
            header(headers, "authorization").map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim())
        })
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// The caller's key wins over the configured one.
pub fn resolve_api_key<'a>(
    request_key: Option<&'a str>,
    configured_key: Option<&'a str>,
) -> Option<&'a str> {
    request_key.or(configured_key)
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    url: String,
    mode: HttpMode,
    api_key: Option<String>,
    default_model: String,
    default_max_tokens: u32,
    timeout_secs: u64,
}

impl HttpBackend {
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().default_headers(fingerprint_headers());
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("failed to build reqwest client")?;

        Ok(Self {
            client,
            url: config.upstream_messages_url(),
            mode: config.http_mode,
            api_key: config.api_key.clone(),
            default_model: config.default_model.clone(),
            default_max_tokens: config.default_max_tokens,
            timeout_secs: config.request_timeout_secs,
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> RelayError {
        if err.is_timeout() {
            RelayError::BackendTimeout(self.timeout_secs)
        } else {
            RelayError::BackendUnavailable(err.to_string())
        }
    }

    async fn passthrough(
        &self,
        builder: reqwest::RequestBuilder,
        request: &RelayRequest,
    ) -> Result<BackendResult, RelayError> {
        let upstream = builder
            .body(request.raw_body.clone())
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = upstream.status().as_u16();
        let body = upstream
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;

        debug!(status, bytes = body.len(), "upstream responded");
        Ok(BackendResult::Passthrough { status, body })
    }

    async fn envelope(
        &self,
        builder: reqwest::RequestBuilder,
        request: &RelayRequest,
    ) -> Result<BackendResult, RelayError> {
        let payload = self.normalized_body(request);
        let upstream = builder
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = upstream.status();
        let body = upstream
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            return Err(rejection(status.as_u16(), &body));
        }

        let v: Value = serde_json::from_slice(&body).map_err(|e| RelayError::BackendRejected {
            status: Some(502),
            message: format!("upstream returned invalid JSON: {e}"),
            kind: Some("api_error".to_string()),
        })?;

        Ok(BackendResult::Success {
            text: extract_text(&v),
            stop_reason: v
                .get("stop_reason")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_STOP_REASON)
                .to_string(),
            model: v
                .get("model")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| request.chat.model.clone()),
        })
    }

    /// `{model, max_tokens, messages}` with configured defaults filled in.
    ///
    /// Messages are taken from the raw body so content blocks the relay does
    /// not model (images, tool results) survive untouched.
    fn normalized_body(&self, request: &RelayRequest) -> Value {
        let messages = serde_json::from_slice::<Value>(&request.raw_body)
            .ok()
            .and_then(|mut v| v.get_mut("messages").map(Value::take))
            .unwrap_or_else(|| serde_json::to_value(&request.chat.messages).unwrap_or_default());

        json!({
            "model": request.chat.model.as_deref().unwrap_or(&self.default_model),
            "max_tokens": request
                .chat
                .max_tokens
                .clone()
                .unwrap_or_else(|| self.default_max_tokens.into()),
            "messages": messages,
        })
    }
}

/// Concatenated text of every `text` block in an upstream message.
fn extract_text(v: &Value) -> String {
    v.get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

/// Map a non-2xx upstream answer to an error that keeps its status.
fn rejection(status: u16, body: &[u8]) -> RelayError {
    let parsed: Option<Value> = serde_json::from_slice(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));

    let message = error
        .and_then(|e| e.get("message").and_then(Value::as_str).or_else(|| e.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| {
            let text = String::from_utf8_lossy(body);
            let text = text.trim();
            if text.is_empty() {
                format!("upstream returned status {status}")
            } else {
                text.to_string()
            }
        });
    let kind = error
        .and_then(|e| e.get("type"))
        .and_then(Value::as_str)
        .map(str::to_string);

    RelayError::BackendRejected {
        status: Some(status),
        message,
        kind,
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Http
    }

    fn target(&self) -> Option<String> {
        Some(self.url.clone())
    }

    async fn complete(&self, request: &RelayRequest) -> BackendResult {
        let Some(api_key) = resolve_api_key(request.credential.as_deref(), self.api_key.as_deref())
        else {
            warn!("no API key in request or configuration");
            return RelayError::MissingCredential.into();
        };

        let builder = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header("x-api-key", api_key);

        let result = match self.mode {
            HttpMode::Passthrough => self.passthrough(builder, request).await,
            HttpMode::Envelope => self.envelope(builder, request).await,
        };
        result.unwrap_or_else(BackendResult::Failure)
    }
}
