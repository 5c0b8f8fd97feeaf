//! Crate-wide error type and the JSON-RPC error code taxonomy.

use thiserror::Error;

/// JSON-RPC 2.0 / ACP error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON was received on the transport.
    ParseError = -32700,
    /// The decoded value was not a valid JSON-RPC request/notification/response.
    InvalidRequest = -32600,
    /// No handler is registered for the method name.
    MethodNotFound = -32601,
    /// Request parameters failed validation.
    InvalidParams = -32602,
    /// Unclassified internal failure.
    InternalError = -32603,
    /// The referenced session id does not exist.
    SessionNotFound = -32001,
    /// `cursor-agent` requires authentication before it can run.
    AuthenticationRequired = -32002,
    /// The `cursor-agent` subprocess failed.
    CursorCliError = -32003,
}

impl ErrorCode {
    /// Numeric code as carried on the wire.
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session already exists: {0}")]
    SessionAlreadyExists(String),

    #[error("too many live sessions (max {0})")]
    TooManySessions(usize),

    #[error("invalid mode: {0}")]
    InvalidMode(String),

    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("extension name must start with '_': {0}")]
    InvalidExtensionName(String),

    #[error("authentication required")]
    AuthenticationRequired,

    #[error("cursor-agent CLI not installed or not available in PATH")]
    CliNotInstalled,

    #[error("cursor-agent CLI error: {0}")]
    CursorCli(String),

    #[error("cursor-agent timed out after {0}ms")]
    Timeout(u64),

    #[error("operation cancelled")]
    Cancelled,

    #[error("content validation failed: {0}")]
    ContentInvalid(String),

    #[error("tool call not found: {0}")]
    ToolCallNotFound(String),

    #[error("tool call {0} is already terminal")]
    ToolCallTerminal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Map this error onto the JSON-RPC error taxonomy.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AgentError::InvalidParams(_)
            | AgentError::InvalidMode(_)
            | AgentError::InvalidModel(_)
            | AgentError::InvalidExtensionName(_)
            | AgentError::ContentInvalid(_) => ErrorCode::InvalidParams,
            AgentError::SessionNotFound(_) => ErrorCode::SessionNotFound,
            AgentError::SessionAlreadyExists(_) | AgentError::TooManySessions(_) => {
                ErrorCode::InternalError
            }
            AgentError::MethodNotFound(_) => ErrorCode::MethodNotFound,
            AgentError::AuthenticationRequired => ErrorCode::AuthenticationRequired,
            AgentError::CliNotInstalled
            | AgentError::CursorCli(_)
            | AgentError::Timeout(_)
            | AgentError::ToolCallNotFound(_)
            | AgentError::ToolCallTerminal(_) => ErrorCode::CursorCliError,
            AgentError::Cancelled => ErrorCode::InternalError,
            AgentError::Io(_) | AgentError::Internal(_) => ErrorCode::InternalError,
            AgentError::Json(_) => ErrorCode::ParseError,
        }
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        AgentError::InvalidParams(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AgentError::Internal(msg.into())
    }

    pub fn session_not_found(id: impl Into<String>) -> Self {
        AgentError::SessionNotFound(id.into())
    }

    pub fn invalid_mode(mode: impl Into<String>) -> Self {
        AgentError::InvalidMode(mode.into())
    }

    pub fn invalid_model(model: impl Into<String>) -> Self {
        AgentError::InvalidModel(model.into())
    }

    pub fn cursor_cli(msg: impl Into<String>) -> Self {
        AgentError::CursorCli(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_map_to_json_rpc_taxonomy() {
        assert_eq!(
            AgentError::session_not_found("s1").error_code().code(),
            -32001
        );
        assert_eq!(
            AgentError::AuthenticationRequired.error_code().code(),
            -32002
        );
        assert_eq!(
            AgentError::CursorCli("boom".into()).error_code().code(),
            -32003
        );
        assert_eq!(
            AgentError::invalid_params("bad").error_code().code(),
            -32602
        );
    }

    #[test]
    fn display_messages_are_precise() {
        let err = AgentError::invalid_mode("unknown");
        assert_eq!(err.to_string(), "invalid mode: unknown");
    }
}
