//! Tool provider trait and invocation context.
//!
//! An `async_trait` object with a `name`/`description`/`input_schema`
//! surface and a single `call` entry point, since there's only one
//! caller (the tool-call manager) rather than a full server loop
//! dispatching to it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

use super::types::ToolKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,
    pub content: Value,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<Value>) -> Self {
        Self {
            status: ToolStatus::Success,
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            content: Value::String(message.into()),
            is_error: true,
        }
    }
}

/// Invocation context threaded through every provider call.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub session_id: String,
    pub cwd: std::path::PathBuf,
    pub fs_read_capability: bool,
    pub fs_write_capability: bool,
}

impl ToolContext {
    pub fn new(session_id: impl Into<String>, cwd: impl Into<std::path::PathBuf>) -> Self {
        Self {
            session_id: session_id.into(),
            cwd: cwd.into(),
            fs_read_capability: false,
            fs_write_capability: false,
        }
    }

    pub fn with_fs_capabilities(mut self, read: bool, write: bool) -> Self {
        self.fs_read_capability = read;
        self.fs_write_capability = write;
        self
    }
}

#[async_trait]
pub trait ToolProvider: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    fn kind(&self) -> ToolKind;
    /// Names that must be present in the call's `input` object. Validated
    /// against the tool's declared required list before any handler runs.
    fn required_params(&self) -> &[&str] {
        &[]
    }
    async fn call(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult>;
}

/// Validate `input` carries every name in `required`, producing a
/// consistent "missing parameter" error shape.
pub fn validate_required(input: &Value, required: &[&str]) -> Result<()> {
    let obj = input.as_object();
    for name in required {
        let present = obj.and_then(|o| o.get(*name)).is_some_and(|v| !v.is_null());
        if !present {
            return Err(crate::error::AgentError::invalid_params(format!(
                "missing required parameter: {name}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_required_reports_missing_name() {
        let input = serde_json::json!({"path": "/tmp/x"});
        let err = validate_required(&input, &["path", "content"]).unwrap_err();
        assert!(err.to_string().contains("content"));
    }

    #[test]
    fn validate_required_passes_when_all_present() {
        let input = serde_json::json!({"path": "/tmp/x", "content": ""});
        assert!(validate_required(&input, &["path", "content"]).is_ok());
    }
}
