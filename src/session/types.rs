//! Session data model.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::content::ContentBlock;
use crate::error::{AgentError, Result};

pub const AVAILABLE_MODES: &[&str] = &["ask", "architect", "code"];
pub const AVAILABLE_MODELS: &[&str] = &["auto", "composer-1", "sonnet-4.5", "gpt-5", "grok"];

pub const DEFAULT_MODE: &str = "ask";
pub const DEFAULT_MODEL: &str = "auto";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionBehavior {
    Strict,
}

/// Closed-set policy bound to a mode id.
#[derive(Debug, Clone)]
pub struct ModeConfig {
    pub permission_behavior: PermissionBehavior,
    pub available_tools: &'static [&'static str],
}

pub fn mode_config(mode_id: &str) -> Option<ModeConfig> {
    match mode_id {
        "ask" => Some(ModeConfig {
            permission_behavior: PermissionBehavior::Strict,
            available_tools: &[],
        }),
        "architect" => Some(ModeConfig {
            permission_behavior: PermissionBehavior::Strict,
            available_tools: &["filesystem"],
        }),
        "code" => Some(ModeConfig {
            permission_behavior: PermissionBehavior::Strict,
            available_tools: &["filesystem", "terminal"],
        }),
        _ => None,
    }
}

pub fn validate_mode(mode_id: &str) -> Result<()> {
    if AVAILABLE_MODES.contains(&mode_id) {
        Ok(())
    } else {
        Err(AgentError::invalid_mode(mode_id))
    }
}

pub fn validate_model(model_id: &str) -> Result<()> {
    if AVAILABLE_MODELS.contains(&model_id) {
        Ok(())
    } else {
        Err(AgentError::invalid_model(model_id))
    }
}

/// `cwd` must be absolute: no `./`/`../` prefix, and either a unix `/...` root
/// or a drive-letter root such as `C:\`.
pub fn validate_cwd(cwd: &Path) -> Result<()> {
    let s = cwd.to_string_lossy();
    if s.starts_with("./") || s.starts_with("../") || s == "." || s == ".." {
        return Err(AgentError::invalid_params("cwd must be an absolute path"));
    }
    let is_unix_absolute = s.starts_with('/');
    let is_drive_absolute = s.len() >= 3
        && s.as_bytes()[0].is_ascii_alphabetic()
        && s.as_bytes()[1] == b':'
        && (s.as_bytes()[2] == b'\\' || s.as_bytes()[2] == b'/');
    if is_unix_absolute || is_drive_absolute {
        Ok(())
    } else {
        Err(AgentError::invalid_params("cwd must be an absolute path"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub role: Role,
    pub content: Vec<ContentBlock>,
    pub timestamp: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Caller-supplied metadata for `session/new`. Deliberately excludes `cwd`
/// and `mcpServers`, since those are create() parameters and must not be
/// overridable through metadata.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSessionMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Non-reserved fields accepted by `session/update`'s shallow merge.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionMetadataUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub cwd: PathBuf,
    #[serde(default, rename = "mcpServers")]
    pub mcp_servers: Vec<serde_json::Value>,
    #[serde(rename = "currentModelId")]
    pub current_model_id: String,
    #[serde(rename = "currentModeId")]
    pub current_mode_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(rename = "lastActivity")]
    pub last_activity: String,
    #[serde(rename = "messageCount")]
    pub message_count: usize,
    #[serde(rename = "currentModeId")]
    pub current_mode_id: String,
    #[serde(default)]
    pub processing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
    pub metadata: SessionMetadata,
    #[serde(default)]
    pub conversation: Vec<ConversationMessage>,
    pub state: SessionState,
}

impl Session {
    pub fn new(
        id: String,
        cwd: PathBuf,
        mcp_servers: Vec<serde_json::Value>,
        meta: Option<NewSessionMeta>,
        now: &str,
    ) -> Result<Self> {
        validate_cwd(&cwd)?;
        let meta = meta.unwrap_or_default();
        Ok(Self {
            id,
            created_at: now.to_string(),
            updated_at: now.to_string(),
            metadata: SessionMetadata {
                name: meta.name,
                description: meta.description,
                tags: meta.tags,
                cwd,
                mcp_servers,
                current_model_id: DEFAULT_MODEL.to_string(),
                current_mode_id: DEFAULT_MODE.to_string(),
            },
            conversation: Vec::new(),
            state: SessionState {
                last_activity: now.to_string(),
                message_count: 0,
                current_mode_id: DEFAULT_MODE.to_string(),
                processing: false,
            },
        })
    }

    /// Invariant (e): message count equals conversation length.
    pub fn message_count_matches(&self) -> bool {
        self.state.message_count == self.conversation.len()
    }
}
