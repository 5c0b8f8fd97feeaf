//! Capability negotiation for `initialize`.

use serde_json::{json, Value};

/// Capabilities the connecting client declared during `initialize`.
/// Gates whether the filesystem tool provider is usable: it is only
/// enabled once the client's initialization declared `fs.readTextFile` /
/// `fs.writeTextFile` capabilities.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientCapabilities {
    pub fs_read_text_file: bool,
    pub fs_write_text_file: bool,
}

impl ClientCapabilities {
    pub fn from_params(params: &Value) -> Self {
        let fs = params.pointer("/clientCapabilities/fs");
        Self {
            fs_read_text_file: fs.and_then(|f| f.get("readTextFile")).and_then(Value::as_bool).unwrap_or(false),
            fs_write_text_file: fs.and_then(|f| f.get("writeTextFile")).and_then(Value::as_bool).unwrap_or(false),
        }
    }
}

/// This agent's advertised capabilities: always streaming and tool-calling,
/// and it always wants to call back into the client's fs/terminal surface.
pub fn agent_capabilities(extension_namespaces: Value) -> Value {
    json!({
        "streaming": true,
        "toolCalling": true,
        "fs": true,
        "terminal": true,
        "_meta": {"extensions": extension_namespaces},
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_declared_fs_capabilities() {
        let params = json!({"clientCapabilities": {"fs": {"readTextFile": true, "writeTextFile": false}}});
        let caps = ClientCapabilities::from_params(&params);
        assert!(caps.fs_read_text_file);
        assert!(!caps.fs_write_text_file);
    }

    #[test]
    fn missing_capabilities_default_to_false() {
        let caps = ClientCapabilities::from_params(&json!({}));
        assert!(!caps.fs_read_text_file);
        assert!(!caps.fs_write_text_file);
    }
}
