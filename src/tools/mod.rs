mod manager;
mod provider;
mod providers;
mod registry;
mod types;

pub use manager::{PermissionOption, PermissionOutcome, ToolCallManager, ToolCallUpdateFields};
pub use provider::{validate_required, ToolContext, ToolProvider, ToolResult, ToolStatus};
pub use providers::{CursorTool, FilesystemTool};
pub use registry::ToolRegistry;
pub use types::{derive_kind, derive_title, ToolCallRecord, ToolCallStatus, ToolKind};
