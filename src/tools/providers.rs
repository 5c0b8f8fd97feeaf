//! Concrete tool providers: the Cursor provider shells out to
//! `cursor-agent` subcommands, the filesystem provider forwards reads/writes
//! to the client over the transport instead of touching disk directly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::bridge::CursorBridge;
use crate::error::{AgentError, Result};
use crate::transport::Transport;

use super::provider::{validate_required, ToolContext, ToolProvider, ToolResult};
use super::types::ToolKind;

/// One `cursor-agent <subcommand>` invocation exposed as a tool.
pub struct CursorTool {
    name: &'static str,
    description: &'static str,
    subcommand: &'static str,
    kind: ToolKind,
    required: &'static [&'static str],
    bridge: Arc<CursorBridge>,
}

impl CursorTool {
    fn new(
        name: &'static str,
        description: &'static str,
        subcommand: &'static str,
        kind: ToolKind,
        required: &'static [&'static str],
        bridge: Arc<CursorBridge>,
    ) -> Self {
        Self {
            name,
            description,
            subcommand,
            kind,
            required,
            bridge,
        }
    }

    /// All six Cursor-backed tools: code search, analyze, apply, run
    /// tests, info, explain.
    pub fn catalog(bridge: Arc<CursorBridge>) -> Vec<Arc<dyn ToolProvider>> {
        vec![
            Arc::new(Self::new(
                "code_search",
                "Search the codebase for a query",
                "search",
                ToolKind::Search,
                &["query"],
                Arc::clone(&bridge),
            )),
            Arc::new(Self::new(
                "analyze",
                "Analyze a file or the project",
                "analyze",
                ToolKind::Think,
                &["target"],
                Arc::clone(&bridge),
            )),
            Arc::new(Self::new(
                "apply",
                "Apply a proposed patch",
                "apply",
                ToolKind::Edit,
                &["patch"],
                Arc::clone(&bridge),
            )),
            Arc::new(Self::new(
                "run_tests",
                "Run the project's test suite",
                "test",
                ToolKind::Execute,
                &[],
                Arc::clone(&bridge),
            )),
            Arc::new(Self::new(
                "info",
                "Report cursor-agent environment info",
                "info",
                ToolKind::Other,
                &[],
                Arc::clone(&bridge),
            )),
            Arc::new(Self::new(
                "explain",
                "Explain a piece of code in human terms",
                "explain",
                ToolKind::Think,
                &["target"],
                bridge,
            )),
        ]
    }

    fn build_args(&self, input: &Value) -> Vec<String> {
        let mut args = vec![self.subcommand.to_string()];
        if let Some(obj) = input.as_object() {
            for (key, value) in obj {
                args.push(format!("--{key}"));
                args.push(match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                });
            }
        }
        args
    }
}

#[async_trait]
impl ToolProvider for CursorTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": self.required,
        })
    }

    fn kind(&self) -> ToolKind {
        self.kind
    }

    fn required_params(&self) -> &[&str] {
        self.required
    }

    #[tracing::instrument(skip(self, input, ctx))]
    async fn call(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult> {
        validate_required(&input, self.required)?;
        let args = self.build_args(&input);
        let result = self
            .bridge
            .execute_command(
                &args,
                &crate::bridge::ExecuteOptions {
                    cwd: Some(ctx.cwd.clone()),
                    timeout: Duration::from_secs(60),
                    retries: 0,
                },
            )
            .await?;
        if result.success {
            Ok(ToolResult::success(result.stdout))
        } else {
            Ok(ToolResult::error(result.error.unwrap_or_else(|| "cursor-agent command failed".into())))
        }
    }
}

/// Reads/writes routed through the client's declared `fs.readTextFile` /
/// `fs.writeTextFile` capabilities, never touching disk locally.
pub struct FilesystemTool {
    name: &'static str,
    kind: ToolKind,
    transport: Arc<Transport>,
}

const TRANSIENT_RETRIES: u32 = 3;

impl FilesystemTool {
    pub fn read(transport: Arc<Transport>) -> Arc<dyn ToolProvider> {
        Arc::new(Self {
            name: "read_file",
            kind: ToolKind::Read,
            transport,
        })
    }

    pub fn write(transport: Arc<Transport>) -> Arc<dyn ToolProvider> {
        Arc::new(Self {
            name: "write_file",
            kind: ToolKind::Edit,
            transport,
        })
    }

    fn validate_positive(input: &Value, field: &str) -> Result<()> {
        match input.get(field) {
            None | Some(Value::Null) => Ok(()),
            Some(Value::Number(n)) if n.as_i64().is_some_and(|v| v > 0) => Ok(()),
            _ => Err(AgentError::invalid_params(format!("{field} must be a positive integer"))),
        }
    }

    async fn retry_transient<F, Fut>(mut op: F) -> Result<Value>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<Value>>,
    {
        let mut last_err = None;
        for attempt in 1..=TRANSIENT_RETRIES {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if is_transient(&e) => {
                    last_err = Some(e);
                    tokio::time::sleep(Duration::from_secs(u64::from(attempt))).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| AgentError::internal("exhausted filesystem retries")))
    }
}

/// Count of lines in `text`, per the convention that an empty file is one
/// (empty) line rather than zero.
fn line_count(text: &str) -> usize {
    if text.is_empty() {
        1
    } else {
        text.lines().count().max(1)
    }
}

fn with_fs_meta(mut result: Value, acp_method: &str, session_id: &str, line_count: usize) -> Value {
    let meta = json!({
        "lineCount": line_count,
        "acpMethod": acp_method,
        "includesUnsavedChanges": true,
        "sessionId": session_id,
    });
    if let Value::Object(ref mut map) = result {
        map.insert("_meta".to_string(), meta);
        result
    } else {
        json!({"value": result, "_meta": meta})
    }
}

fn is_transient(err: &AgentError) -> bool {
    !matches!(
        err,
        AgentError::InvalidParams(_) | AgentError::ContentInvalid(_) | AgentError::AuthenticationRequired
    )
}

#[async_trait]
impl ToolProvider for FilesystemTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        if self.name == "read_file" {
            "Read a text file via the client"
        } else {
            "Write a text file via the client"
        }
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "required": ["path"]})
    }

    fn kind(&self) -> ToolKind {
        self.kind
    }

    fn required_params(&self) -> &[&str] {
        &["path"]
    }

    #[tracing::instrument(skip(self, input, ctx))]
    async fn call(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let path = input
            .get("path")
            .and_then(|v| v.as_str())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AgentError::invalid_params("path must be a non-empty string"))?
            .to_string();

        if self.name == "read_file" {
            if !ctx.fs_read_capability {
                return Err(AgentError::invalid_params("client did not declare fs.readTextFile capability"));
            }
            Self::validate_positive(&input, "line")?;
            Self::validate_positive(&input, "limit")?;
            let line = input.get("line").cloned();
            let limit = input.get("limit").cloned();
            let method = "fs/read_text_file";
            let params = json!({"sessionId": ctx.session_id, "path": path, "line": line, "limit": limit});
            let result = Self::retry_transient(|| {
                let transport = Arc::clone(&self.transport);
                let params = params.clone();
                async move { transport.call(method, Some(params)).await }
            })
            .await?;
            let read_text = result.get("content").and_then(|v| v.as_str()).unwrap_or("");
            let count = line_count(read_text);
            Ok(ToolResult::success(with_fs_meta(result, method, &ctx.session_id, count)))
        } else {
            if !ctx.fs_write_capability {
                return Err(AgentError::invalid_params("client did not declare fs.writeTextFile capability"));
            }
            let content = match input.get("content") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => {
                    return Err(AgentError::ContentInvalid(
                        "Content is required. To create an empty file, pass an empty string.".to_string(),
                    ))
                }
                Some(other) => other.to_string(),
            };
            let method = "fs/write_text_file";
            let params = json!({"sessionId": ctx.session_id, "path": path, "content": content});
            let result = Self::retry_transient(|| {
                let transport = Arc::clone(&self.transport);
                let params = params.clone();
                async move { transport.call(method, Some(params)).await }
            })
            .await?;
            let count = line_count(&content);
            Ok(ToolResult::success(with_fs_meta(result, method, &ctx.session_id, count)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_validation_rejects_zero_and_negative() {
        assert!(FilesystemTool::validate_positive(&json!({"line": 0}), "line").is_err());
        assert!(FilesystemTool::validate_positive(&json!({"line": -1}), "line").is_err());
        assert!(FilesystemTool::validate_positive(&json!({"line": 3}), "line").is_ok());
        assert!(FilesystemTool::validate_positive(&json!({}), "line").is_ok());
    }

    #[test]
    fn transient_classifies_validation_and_auth_errors_as_non_retryable() {
        assert!(!is_transient(&AgentError::invalid_params("x")));
        assert!(!is_transient(&AgentError::AuthenticationRequired));
        assert!(is_transient(&AgentError::cursor_cli("flaky")));
    }

    #[test]
    fn cursor_tool_catalog_has_six_entries() {
        let bridge = Arc::new(CursorBridge::new("cursor-agent"));
        assert_eq!(CursorTool::catalog(bridge).len(), 6);
    }

    #[test]
    fn empty_file_read_reports_line_count_of_one() {
        assert_eq!(line_count(""), 1);
        assert_eq!(line_count("one line, no trailing newline"), 1);
        assert_eq!(line_count("a\nb\n"), 2);
    }

    #[test]
    fn fs_meta_is_attached_without_a_top_level_metadata_field() {
        let result = with_fs_meta(json!({"content": ""}), "fs/read_text_file", "sess-1", 1);
        assert_eq!(result["_meta"]["lineCount"], 1);
        assert_eq!(result["_meta"]["acpMethod"], "fs/read_text_file");
        assert_eq!(result["_meta"]["includesUnsavedChanges"], true);
        assert_eq!(result["_meta"]["sessionId"], "sess-1");
        assert!(result.get("metadata").is_none());
    }
}
