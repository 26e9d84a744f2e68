//! Gateway configuration.
//!
//! Configuration is resolved exactly once, by [`RelayArgs`], from command-line
//! flags with environment-variable fallbacks:
//!
//! - `RELAY_HOST` / `PORT`: bind address (default: 0.0.0.0:3456)
//! - `RELAY_BACKEND`: `http` or `subprocess` (default: http)
//! - `RELAY_HTTP_MODE`: `passthrough` or `envelope` (default: passthrough)
//! - `ANTHROPIC_BASE_URL`: upstream base URL (default: https://api.anthropic.com)
//! - `ANTHROPIC_AUTH_TOKEN`: fallback API key used when a request carries none
//! - `RELAY_CLI_PROGRAM` / `RELAY_CLI_ARGS`: the completion CLI and its flags
//! - `REQUEST_TIMEOUT_SECS`: backend timeout, `0` to wait forever (default: 120)
//!
//! The resulting [`GatewayConfig`] is immutable and handed to the server and the
//! selected backend by value; nothing else reads the environment.

use anyhow::{ensure, Result};
use clap::{Parser, ValueEnum};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3456;
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250514";
pub const DEFAULT_MAX_TOKENS: u32 = 8192;
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CLI_PROGRAM: &str = "claude";
pub const DEFAULT_CLI_ARGS: &str = "-p --model sonnet --output-format text";

/// Fixed completion path on the upstream.
pub const MESSAGES_PATH: &str = "/v1/messages";

/// Which backend answers completions. Chosen once at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Pipe the prompt into a local CLI process.
    Subprocess,
    /// Forward to an upstream `/v1/messages` endpoint.
    Http,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subprocess => "subprocess",
            Self::Http => "http",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the HTTP backend shapes traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HttpMode {
    /// Forward the inbound body byte-for-byte and return the upstream status
    /// and body verbatim.
    Passthrough,
    /// Send a normalized `{model, max_tokens, messages}` body and rebuild the
    /// upstream answer into the relay's text envelope.
    Envelope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub backend: BackendKind,
    pub http_mode: HttpMode,
    pub upstream_base_url: String,
    pub api_key: Option<String>,
    pub cli_program: String,
    pub cli_args: Vec<String>,
    pub default_model: String,
    pub default_max_tokens: u32,
    pub max_body_bytes: usize,
    pub request_timeout_secs: u64,
    pub accept_any_path: bool,
    pub workers: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            backend: BackendKind::Http,
            http_mode: HttpMode::Passthrough,
            upstream_base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            api_key: None,
            cli_program: DEFAULT_CLI_PROGRAM.to_string(),
            cli_args: split_args(DEFAULT_CLI_ARGS),
            default_model: DEFAULT_MODEL.to_string(),
            default_max_tokens: DEFAULT_MAX_TOKENS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            accept_any_path: false,
            workers: 1,
        }
    }
}

impl GatewayConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn upstream_base_url_trimmed(&self) -> &str {
        self.upstream_base_url.trim_end_matches('/')
    }

    pub fn upstream_messages_url(&self) -> String {
        format!("{}{}", self.upstream_base_url_trimmed(), MESSAGES_PATH)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

fn split_args(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Command-line surface of the `aippt-relay` binary.
#[derive(Parser, Debug)]
#[command(name = "aippt-relay")]
#[command(author, version, about, long_about = None)]
pub struct RelayArgs {
    /// Interface to bind
    #[arg(long, env = "RELAY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Backend that answers completions
    #[arg(long, env = "RELAY_BACKEND", value_enum, default_value_t = BackendKind::Http)]
    pub backend: BackendKind,

    /// Traffic shaping for the HTTP backend
    #[arg(long, env = "RELAY_HTTP_MODE", value_enum, default_value_t = HttpMode::Passthrough)]
    pub http_mode: HttpMode,

    /// Upstream base URL; `/v1/messages` is appended
    #[arg(long, env = "ANTHROPIC_BASE_URL", default_value = DEFAULT_UPSTREAM_BASE_URL)]
    pub upstream_base_url: String,

    /// Fallback API key for requests that carry none
    #[arg(long, env = "ANTHROPIC_AUTH_TOKEN", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Completion CLI executable
    #[arg(long, env = "RELAY_CLI_PROGRAM", default_value = DEFAULT_CLI_PROGRAM)]
    pub cli_program: String,

    /// Whitespace-separated flags passed to the completion CLI
    #[arg(long, env = "RELAY_CLI_ARGS", default_value = DEFAULT_CLI_ARGS, allow_hyphen_values = true)]
    pub cli_args: String,

    /// Model used when a request names none (envelope mode)
    #[arg(long, env = "RELAY_DEFAULT_MODEL", default_value = DEFAULT_MODEL)]
    pub default_model: String,

    /// `max_tokens` used when a request sets none (envelope mode)
    #[arg(long, env = "RELAY_DEFAULT_MAX_TOKENS", default_value_t = DEFAULT_MAX_TOKENS)]
    pub default_max_tokens: u32,

    /// Largest accepted request body, in bytes
    #[arg(long, env = "RELAY_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// Backend timeout in seconds (0 waits forever)
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Relay POSTs on any path instead of only `/v1/messages`
    #[arg(long, env = "RELAY_ACCEPT_ANY_PATH")]
    pub accept_any_path: bool,

    /// Number of worker event loops
    #[arg(long, env = "RELAY_WORKERS", default_value_t = 1)]
    pub workers: usize,
}

impl RelayArgs {
    pub fn into_config(self) -> Result<GatewayConfig> {
        ensure!(
            !self.upstream_base_url.trim().is_empty(),
            "upstream base URL must not be empty"
        );
        ensure!(
            !self.cli_program.trim().is_empty(),
            "CLI program must not be empty"
        );
        ensure!(self.workers > 0, "at least one worker is required");
        ensure!(self.max_body_bytes > 0, "body limit must be positive");

        Ok(GatewayConfig {
            host: self.host,
            port: self.port,
            backend: self.backend,
            http_mode: self.http_mode,
            upstream_base_url: self.upstream_base_url.trim().to_string(),
            api_key: self.api_key.filter(|k| !k.trim().is_empty()),
            cli_program: self.cli_program,
            cli_args: split_args(&self.cli_args),
            default_model: self.default_model,
            default_max_tokens: self.default_max_tokens,
            max_body_bytes: self.max_body_bytes,
            request_timeout_secs: self.timeout_secs,
            accept_any_path: self.accept_any_path,
            workers: self.workers,
        })
    }
}
