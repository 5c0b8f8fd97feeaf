//! Session lifecycle, persistence, and mode/model state.

mod manager;
mod types;

pub use manager::{ListFilters, ModeSwitch, SessionManager};
pub use types::{
    mode_config, validate_cwd, validate_mode, validate_model, ConversationMessage, ModeConfig,
    NewSessionMeta, PermissionBehavior, Role, Session, SessionMetadata, SessionMetadataUpdate,
    SessionState, AVAILABLE_MODELS, AVAILABLE_MODES, DEFAULT_MODE, DEFAULT_MODEL,
};
