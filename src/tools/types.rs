//! Tool-call records and kind/title derivation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ToolCallStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ToolCallStatus::Completed | ToolCallStatus::Failed)
    }
}

/// Tool categories advertised to the client, derived from the tool name
/// via a fixed lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Read,
    Edit,
    Delete,
    Move,
    Search,
    Execute,
    Fetch,
    Think,
    SwitchMode,
    Other,
}

pub fn derive_kind(tool_name: &str) -> ToolKind {
    match tool_name {
        "read_file" | "read_text_file" | "cat" => ToolKind::Read,
        "write_file" | "write_text_file" | "edit_file" | "apply" => ToolKind::Edit,
        "delete_file" | "rm" => ToolKind::Delete,
        "move_file" | "rename" => ToolKind::Move,
        "search" | "grep" | "code_search" => ToolKind::Search,
        "run_tests" | "execute" | "run_command" => ToolKind::Execute,
        "fetch" | "web_fetch" => ToolKind::Fetch,
        "think" | "analyze" | "explain" => ToolKind::Think,
        "switch_mode" | "set_mode" => ToolKind::SwitchMode,
        _ => ToolKind::Other,
    }
}

pub fn derive_title(tool_name: &str, input: &serde_json::Value) -> String {
    let path = input.get("path").and_then(|v| v.as_str());
    match (tool_name, path) {
        ("read_file" | "read_text_file", Some(p)) => format!("Reading file: {p}"),
        ("write_file" | "write_text_file", Some(p)) => format!("Writing file: {p}"),
        ("delete_file", Some(p)) => format!("Deleting file: {p}"),
        ("search" | "grep" | "code_search", _) => {
            let query = input.get("query").and_then(|v| v.as_str()).unwrap_or("");
            format!("Searching: {query}")
        }
        ("run_tests", _) => "Running tests".to_string(),
        _ => format!("Executing tool: {tool_name}"),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub session_id: String,
    pub tool_name: String,
    pub status: ToolCallStatus,
    pub start_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    pub raw_input: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_lookup_matches_known_tools() {
        assert_eq!(derive_kind("read_file"), ToolKind::Read);
        assert_eq!(derive_kind("write_text_file"), ToolKind::Edit);
        assert_eq!(derive_kind("grep"), ToolKind::Search);
        assert_eq!(derive_kind("mystery_tool"), ToolKind::Other);
    }

    #[test]
    fn title_falls_back_to_generic_executing() {
        assert_eq!(derive_title("mystery_tool", &serde_json::json!({})), "Executing tool: mystery_tool");
    }

    #[test]
    fn title_uses_path_for_read() {
        assert_eq!(
            derive_title("read_file", &serde_json::json!({"path": "/tmp/x.txt"})),
            "Reading file: /tmp/x.txt"
        );
    }
}
