//! Cursor bridge: spawns the external `cursor-agent` binary, with
//! retrying blocking execution and cancellable streaming execution.
//!
//! Process group handling uses `process-wrap`'s `ChildWrapper` so a
//! SIGTERM tears down the whole subprocess tree instead of leaving
//! orphans. Retry/backoff and tolerant regex parsing over CLI output
//! round out the failure-handling surface.

mod child;

use std::path::Path;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::error::{AgentError, Result};

pub use child::BridgeChild;

/// Outcome of a blocking `executeCommand` bridge invocation.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub cwd: Option<std::path::PathBuf>,
    pub timeout: Duration,
    pub retries: u32,
}

/// Thin wrapper over the `cursor-agent` executable path.
#[derive(Debug, Clone)]
pub struct CursorBridge {
    binary: String,
}

impl CursorBridge {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    fn backoff_delay(attempt: u32) -> Duration {
        let ms = 1000u64.saturating_mul(1u64 << attempt.saturating_sub(1).min(62));
        Duration::from_millis(ms.min(5000))
    }

    /// Up to `1 + retries` attempts with exponential backoff; never
    /// retries on explicit cancellation.
    #[tracing::instrument(skip(self, args, opts))]
    pub async fn execute_command(&self, args: &[String], opts: &ExecuteOptions) -> Result<CommandResult> {
        let attempts = 1 + opts.retries;
        let mut last_err = None;

        for attempt in 1..=attempts {
            match self.attempt_once(args, opts).await {
                Ok(result) => return Ok(result),
                Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "cursor-agent attempt failed");
                    last_err = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(Self::backoff_delay(attempt)).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| AgentError::cursor_cli("exhausted retries")))
    }

    async fn attempt_once(&self, args: &[String], opts: &ExecuteOptions) -> Result<CommandResult> {
        let mut command = tokio::process::Command::new(&self.binary);
        command
            .args(args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        if let Some(cwd) = &opts.cwd {
            command.current_dir(cwd);
        }

        let mut child = child::spawn_grouped(command).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AgentError::CliNotInstalled,
            _ => AgentError::cursor_cli(e.to_string()),
        })?;

        let (stdout, stderr, status) = match tokio::time::timeout(opts.timeout, child.wait_with_output()).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => return Err(AgentError::cursor_cli(e.to_string())),
            Err(_) => {
                let _ = child.kill().await;
                return Err(AgentError::Timeout(opts.timeout.as_millis() as u64));
            }
        };

        let exit_code = status.code();
        let success = status.success();
        Ok(CommandResult {
            success,
            stdout,
            stderr: stderr.clone(),
            exit_code,
            error: if success { None } else { Some(stderr) },
        })
    }

    /// Blocking prompt invocation; parses the first of
    /// `result | response | content | message` from the JSON stdout.
    #[tracing::instrument(skip(self, serialized, cwd))]
    pub async fn send_prompt(
        &self,
        session_id: &str,
        serialized: &str,
        cwd: &Path,
        retries: u32,
        timeout: Duration,
    ) -> Result<String> {
        let args = vec![
            "--resume".to_string(),
            session_id.to_string(),
            "--print".to_string(),
            "--output-format".to_string(),
            "json".to_string(),
            "--force".to_string(),
            serialized.to_string(),
        ];
        let opts = ExecuteOptions {
            cwd: Some(cwd.to_path_buf()),
            timeout,
            retries,
        };
        let result = self.execute_command(&args, &opts).await?;
        if !result.success {
            return Err(AgentError::cursor_cli(
                result.error.unwrap_or_else(|| "cursor-agent exited non-zero".to_string()),
            ));
        }
        Ok(extract_response_text(&result.stdout))
    }

    /// Streaming prompt invocation: each stdout chunk is forwarded to
    /// `on_chunk`; cancellation kills the child with SIGTERM and returns
    /// `true` (aborted).
    #[tracing::instrument(skip(self, serialized, cwd, on_chunk, cancel))]
    pub async fn send_streaming_prompt(
        &self,
        session_id: &str,
        serialized: &str,
        cwd: &Path,
        mut on_chunk: impl FnMut(String) + Send,
        mut cancel: mpsc::Receiver<()>,
    ) -> Result<bool> {
        let mut command = tokio::process::Command::new(&self.binary);
        command
            .args([
                "--resume",
                session_id,
                "--print",
                "--output-format",
                "stream-json",
                "--stream-partial-output",
                "--force",
                serialized,
            ])
            .current_dir(cwd)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = child::spawn_grouped(command).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AgentError::CliNotInstalled,
            _ => AgentError::cursor_cli(e.to_string()),
        })?;

        let stdout = child.take_stdout().ok_or_else(|| AgentError::internal("missing stdout pipe"))?;
        let mut lines = BufReader::new(stdout).lines();

        loop {
            tokio::select! {
                biased;
                _ = cancel.recv() => {
                    let _ = child.kill().await;
                    return Ok(true);
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(chunk)) => on_chunk(chunk),
                        Ok(None) => break,
                        Err(e) => return Err(AgentError::cursor_cli(e.to_string())),
                    }
                }
            }
        }

        let _ = child.wait().await;
        Ok(false)
    }

    /// Tolerant regex match over `status` output.
    #[tracing::instrument(skip(self))]
    pub async fn check_authentication(&self) -> Result<bool> {
        static AUTH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)logged in as|authenticated").unwrap());
        let result = self
            .execute_command(
                &["status".to_string()],
                &ExecuteOptions {
                    cwd: None,
                    timeout: Duration::from_millis(10_000),
                    retries: 0,
                },
            )
            .await?;
        Ok(AUTH_RE.is_match(&result.stdout))
    }

    /// Tolerant regex match over `--version` output.
    #[tracing::instrument(skip(self))]
    pub async fn get_version(&self) -> Result<String> {
        static VERSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+\.\d+\.\d+)").unwrap());
        let result = self
            .execute_command(
                &["--version".to_string()],
                &ExecuteOptions {
                    cwd: None,
                    timeout: Duration::from_millis(10_000),
                    retries: 0,
                },
            )
            .await?;
        VERSION_RE
            .captures(&result.stdout)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| AgentError::cursor_cli("could not parse cursor-agent version"))
    }
}

fn extract_response_text(stdout: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(stdout) else {
        return stdout.to_string();
    };
    for key in ["result", "response", "content", "message"] {
        if let Some(v) = value.get(key) {
            if let Some(s) = v.as_str() {
                return s.to_string();
            }
            return v.to_string();
        }
    }
    stdout.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps_at_5s() {
        assert_eq!(CursorBridge::backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(CursorBridge::backoff_delay(2), Duration::from_millis(2000));
        assert_eq!(CursorBridge::backoff_delay(3), Duration::from_millis(4000));
        assert_eq!(CursorBridge::backoff_delay(4), Duration::from_millis(5000));
        assert_eq!(CursorBridge::backoff_delay(10), Duration::from_millis(5000));
    }

    #[test]
    fn extracts_first_present_response_key() {
        assert_eq!(extract_response_text(r#"{"result":"hi"}"#), "hi");
        assert_eq!(extract_response_text(r#"{"response":"there"}"#), "there");
        assert_eq!(extract_response_text("not json"), "not json");
    }

    #[test]
    fn extracts_content_over_message_when_both_absent_result_response() {
        assert_eq!(extract_response_text(r#"{"content":"c","message":"m"}"#), "c");
    }

    #[test]
    fn version_regex_extracts_semver() {
        static VERSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+\.\d+\.\d+)").unwrap());
        let caps = VERSION_RE.captures("cursor-agent version 1.4.2 (build abc)").unwrap();
        assert_eq!(&caps[1], "1.4.2");
    }
}
