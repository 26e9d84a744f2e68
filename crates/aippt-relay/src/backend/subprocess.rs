//! CLI subprocess backend.
//!
//! One process per request. The prompt goes in on stdin (never argv, which
//! has length limits), stdout is the completion, stderr is the diagnostic.

use super::{Backend, BackendResult, RelayRequest};
use crate::config::{BackendKind, GatewayConfig};
use crate::error::RelayError;
use crate::types::{ChatMessage, DEFAULT_STOP_REASON};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct SubprocessBackend {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl SubprocessBackend {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.cli_program.clone(), config.cli_args.clone())
            .with_timeout(config.request_timeout())
    }

    async fn run(&self, prompt: &str) -> Result<String, RelayError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                warn!(program = %self.program, error = %e, "failed to start CLI");
                RelayError::BackendUnavailable(e.to_string())
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            RelayError::BackendUnavailable("CLI process has no stdin".to_string())
        })?;
        let input = prompt.as_bytes().to_vec();
        let feed = async move {
            let written = stdin.write_all(&input).await;
            drop(stdin);
            written
        };

        // stdin is fed while stdout/stderr drain, so a chatty child never
        // blocks on a full pipe.
        let run = async move { tokio::join!(feed, child.wait_with_output()) };
        let (written, output) = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| RelayError::BackendTimeout(limit.as_secs()))?,
            None => run.await,
        };

        if let Err(e) = written {
            if e.kind() != ErrorKind::BrokenPipe {
                warn!(error = %e, "failed to write prompt to CLI stdin");
            }
        }

        let output = output.map_err(|e| {
            RelayError::BackendUnavailable(format!("failed to wait for `{}`: {e}", self.program))
        })?;
        into_completion(output)
    }
}

fn into_completion(output: Output) -> Result<String, RelayError> {
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim_end();
    let message = if stderr.trim().is_empty() {
        match output.status.code() {
            Some(code) => format!("CLI process exited with status {code}"),
            None => "CLI process was terminated by a signal".to_string(),
        }
    } else {
        stderr.to_string()
    };

    Err(RelayError::BackendRejected {
        status: None,
        message,
        kind: None,
    })
}

/// Flatten a conversation into the single prompt the CLI reads.
///
/// A lone message is passed as-is; a longer history is labelled by role.
pub fn render_prompt(messages: &[ChatMessage]) -> String {
    match messages {
        [only] => only.content.to_plaintext(),
        _ => messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content.to_plaintext()))
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

#[async_trait]
impl Backend for SubprocessBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Subprocess
    }

    fn target(&self) -> Option<String> {
        Some(self.program.clone())
    }

    async fn complete(&self, request: &RelayRequest) -> BackendResult {
        let prompt = render_prompt(&request.chat.messages);
        debug!(program = %self.program, prompt_chars = prompt.chars().count(), "spawning CLI");

        match self.run(&prompt).await {
            Ok(text) => BackendResult::Success {
                text,
                stop_reason: DEFAULT_STOP_REASON.to_string(),
                model: request.chat.model.clone(),
            },
            Err(e) => BackendResult::Failure(e),
        }
    }
}
