//! Method dispatch table and the `initialize` handshake.
//!
//! Each handler validates its params, mutates session/tool state, and
//! notifies the client as needed, sitting directly on the hand-rolled
//! [`Transport`] rather than a generated RPC connection type. New-session
//! and loaded-session handlers schedule `available_commands_update` a
//! tick after the response goes out via a deferred `tokio::spawn`.

mod capabilities;
mod extension;

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde_json::{json, Value};
use tokio::sync::mpsc;

pub use capabilities::{agent_capabilities, ClientCapabilities};
pub use extension::{ExtensionHandler, ExtensionRegistry};

use crate::content::ContentBlock;
use crate::error::{AgentError, Result};
use crate::prompt::PromptHandler;
use crate::session::{
    ListFilters, NewSessionMeta, Session, SessionManager, SessionMetadataUpdate, AVAILABLE_MODELS,
    AVAILABLE_MODES,
};
use crate::slash::SlashRegistry;
use crate::tools::{ToolCallManager, ToolContext, ToolRegistry};
use crate::transport::{Incoming, JsonRpcErrorObj, RequestId, Transport};

/// Ties every component together behind the method table. One instance
/// lives for the whole process; `run` owns the read loop.
pub struct Dispatcher {
    sessions: Arc<SessionManager>,
    transport: Arc<Transport>,
    slash: Arc<SlashRegistry>,
    tools: Arc<ToolRegistry>,
    tool_calls: Arc<ToolCallManager>,
    prompts: Arc<PromptHandler>,
    extensions: ExtensionRegistry,
    client_caps: RwLock<ClientCapabilities>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("client_caps", &self.client_caps.read().unwrap())
            .finish()
    }
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: Arc<SessionManager>,
        transport: Arc<Transport>,
        slash: Arc<SlashRegistry>,
        tools: Arc<ToolRegistry>,
        tool_calls: Arc<ToolCallManager>,
        prompts: Arc<PromptHandler>,
        extensions: ExtensionRegistry,
    ) -> Self {
        Self {
            sessions,
            transport,
            slash,
            tools,
            tool_calls,
            prompts,
            extensions,
            client_caps: RwLock::new(ClientCapabilities::default()),
        }
    }

    /// Drain incoming frames, handling each on its own task so a slow
    /// prompt on one session never blocks a request on another.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<Incoming>) {
        while let Some(incoming) = rx.recv().await {
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                match incoming {
                    Incoming::Request { id, method, params } => {
                        this.dispatch_request(id, method, params).await;
                    }
                    Incoming::Notification { method, params } => {
                        this.dispatch_notification(method, params).await;
                    }
                }
            });
        }
    }

    async fn dispatch_request(&self, id: RequestId, method: String, params: Option<Value>) {
        let outcome = self.handle_request(&id, &method, params).await.map_err(|e| {
            tracing::warn!(method = %method, error = %e, "request failed");
            JsonRpcErrorObj::from(&e)
        });
        if let Err(e) = self.transport.respond(id, outcome).await {
            tracing::error!(error = %e, method = %method, "failed to send response");
        }
    }

    async fn dispatch_notification(&self, method: String, params: Option<Value>) {
        match method.as_str() {
            "session/cancel" => self.handle_cancel(&params.unwrap_or(Value::Null)).await,
            other => tracing::debug!(method = %other, "unhandled notification"),
        }
    }

    async fn handle_request(&self, id: &RequestId, method: &str, params: Option<Value>) -> Result<Value> {
        match method {
            "initialize" => Ok(self.handle_initialize(params)),
            "session/new" => self.handle_session_new(params).await,
            "session/load" => self.handle_session_load(params).await,
            "session/list" => Ok(self.handle_session_list(params)),
            "session/update" => self.handle_session_update(params).await,
            "session/delete" => self.handle_session_delete(params).await,
            "session/set_mode" => self.handle_set_mode(params).await,
            "session/set_model" => self.handle_set_model(params).await,
            "session/prompt" => self.handle_prompt(id, params).await,
            "session/cancel" => {
                self.handle_cancel(&params.unwrap_or(Value::Null)).await;
                Ok(json!({}))
            }
            // session/request_permission is an outbound call the agent makes
            // on the client (ToolCallManager::request_tool_permission); it is
            // listed in the method table as documentation of the full
            // surface, not as something this side receives.
            "session/request_permission" => Err(AgentError::MethodNotFound(
                "session/request_permission is invoked by the agent, not handled by it".to_string(),
            )),
            "tools/list" => Ok(self.handle_tools_list()),
            "tools/call" => self.handle_tools_call(params).await,
            other if other.starts_with('_') => self.extensions.dispatch(other, params),
            other => Err(AgentError::MethodNotFound(other.to_string())),
        }
    }

    fn handle_initialize(&self, params: Option<Value>) -> Value {
        let params = params.unwrap_or(Value::Null);
        let caps = ClientCapabilities::from_params(&params);
        *self.client_caps.write().unwrap() = caps;
        let namespaces = self.extensions.namespace_meta();
        json!({
            "protocolVersion": "1",
            "agentCapabilities": agent_capabilities(namespaces),
        })
    }

    async fn handle_session_new(&self, params: Option<Value>) -> Result<Value> {
        let params = require_params(params, "session/new")?;
        let cwd = field_str(&params, "cwd")?;
        let mcp_servers = params.get("mcpServers").and_then(Value::as_array).cloned().unwrap_or_default();
        let meta: NewSessionMeta = serde_json::from_value(params.clone())?;
        let session = self.sessions.create(PathBuf::from(cwd), mcp_servers, Some(meta)).await?;
        self.schedule_available_commands_update(session.id.clone());
        Ok(session_response(&session))
    }

    async fn handle_session_load(&self, params: Option<Value>) -> Result<Value> {
        let params = require_params(params, "session/load")?;
        let session_id = field_str(&params, "sessionId")?;
        let session = self.sessions.load(&session_id).await?;
        self.schedule_available_commands_update(session.id.clone());
        Ok(session_response(&session))
    }

    fn handle_session_list(&self, params: Option<Value>) -> Value {
        let params = params.unwrap_or(Value::Null);
        let limit = params.get("limit").and_then(Value::as_u64).unwrap_or(50) as usize;
        let offset = params.get("offset").and_then(Value::as_u64).unwrap_or(0) as usize;
        let filters = ListFilters {
            name: params.get("name").and_then(Value::as_str).map(str::to_string),
            tag: params.get("tag").and_then(Value::as_str).map(str::to_string),
        };
        let sessions = self.sessions.list(limit, offset, &filters);
        json!({"sessions": sessions})
    }

    async fn handle_session_update(&self, params: Option<Value>) -> Result<Value> {
        let params = require_params(params, "session/update")?;
        let session_id = field_str(&params, "sessionId")?;
        let update: SessionMetadataUpdate = serde_json::from_value(params.clone())?;
        let session = self.sessions.update(&session_id, update).await?;
        Ok(serde_json::to_value(&session.metadata)?)
    }

    async fn handle_session_delete(&self, params: Option<Value>) -> Result<Value> {
        let params = require_params(params, "session/delete")?;
        let session_id = field_str(&params, "sessionId")?;
        self.sessions.delete(&session_id).await?;
        Ok(json!({}))
    }

    async fn handle_set_mode(&self, params: Option<Value>) -> Result<Value> {
        let params = require_params(params, "session/set_mode")?;
        let session_id = field_str(&params, "sessionId")?;
        let mode_id = field_str(&params, "modeId")?;
        let switch = self.sessions.set_mode(&session_id, &mode_id).await?;
        let changed_at = chrono::Utc::now().to_rfc3339();
        let notify_params = json!({
            "sessionId": session_id,
            "sessionUpdate": "current_mode_update",
            "currentModeId": switch.new,
        });
        self.transport.notify("session/update", Some(notify_params)).await?;
        Ok(json!({"_meta": {"previousMode": switch.previous, "newMode": switch.new, "changedAt": changed_at}}))
    }

    async fn handle_set_model(&self, params: Option<Value>) -> Result<Value> {
        let params = require_params(params, "session/set_model")?;
        let session_id = field_str(&params, "sessionId")?;
        let model_id = field_str(&params, "modelId")?;
        let previous = self.sessions.set_model(&session_id, &model_id).await?;
        let changed_at = chrono::Utc::now().to_rfc3339();
        let notify_params = json!({
            "sessionId": session_id,
            "sessionUpdate": "current_model_update",
            "currentModelId": model_id,
        });
        self.transport.notify("session/update", Some(notify_params)).await?;
        Ok(json!({"_meta": {"previousModel": previous, "newModel": model_id, "changedAt": changed_at}}))
    }

    async fn handle_prompt(&self, request_id: &RequestId, params: Option<Value>) -> Result<Value> {
        let params = require_params(params, "session/prompt")?;
        let session_id = field_str(&params, "sessionId")?;
        let blocks: Vec<ContentBlock> = serde_json::from_value(params.get("prompt").cloned().unwrap_or(Value::Null))
            .map_err(|e| AgentError::invalid_params(format!("invalid prompt content: {e}")))?;
        let stream = params.get("stream").and_then(Value::as_bool).unwrap_or(false);
        let outcome = self.prompts.process(&session_id, &request_id.to_string(), blocks, stream).await?;
        Ok(json!({"stopReason": outcome.stop_reason, "meta": outcome.meta}))
    }

    /// `session/cancel` is most naturally a notification (ACP clients fire
    /// it without waiting on a reply); tolerate the rare request-shaped
    /// arrival too rather than rejecting it.
    async fn handle_cancel(&self, params: &Value) {
        let session_id = params.get("sessionId").and_then(Value::as_str);
        let request_id = params.get("requestId").and_then(Value::as_str);
        match (session_id, request_id) {
            (Some(sid), Some(rid)) => self.prompts.cancel_stream(&format!("{sid}:{rid}")),
            (Some(sid), None) => {
                self.prompts.cancel_session(sid);
                if let Err(e) = self.tool_calls.cancel_session_tool_calls(sid).await {
                    tracing::warn!(session_id = sid, error = %e, "failed to cancel in-flight tool calls");
                }
            }
            _ => tracing::warn!("session/cancel received without sessionId"),
        }
    }

    fn handle_tools_list(&self) -> Value {
        let tools: Vec<Value> = self
            .tools
            .list()
            .iter()
            .map(|t| {
                json!({
                    "name": t.name(),
                    "description": t.description(),
                    "inputSchema": t.input_schema(),
                    "kind": t.kind(),
                })
            })
            .collect();
        json!({"tools": tools})
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value> {
        let params = require_params(params, "tools/call")?;
        let name = field_str(&params, "name")?;
        let input = params.get("input").cloned().unwrap_or_else(|| json!({}));
        let session_id = params.get("sessionId").and_then(Value::as_str).unwrap_or_default();
        let cwd = self.resolve_cwd(session_id);
        let caps = *self.client_caps.read().unwrap();
        let ctx = ToolContext::new(session_id, cwd)
            .with_fs_capabilities(caps.fs_read_text_file, caps.fs_write_text_file);
        let result = self.tools.call(&name, input, &ctx).await?;
        Ok(serde_json::to_value(result)?)
    }

    fn resolve_cwd(&self, session_id: &str) -> PathBuf {
        if !session_id.is_empty() {
            if let Some(session) = self.sessions.get(session_id) {
                return session.metadata.cwd;
            }
        }
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    /// Fire `available_commands_update` a tick after the response is sent,
    /// so the client sees the session id before the command list.
    fn schedule_available_commands_update(&self, session_id: String) {
        if self.slash.is_empty() {
            return;
        }
        let transport = Arc::clone(&self.transport);
        let slash = Arc::clone(&self.slash);
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            let params = json!({
                "sessionId": session_id,
                "sessionUpdate": "available_commands_update",
                "availableCommands": slash.snapshot(),
            });
            let _ = transport.notify("session/update", Some(params)).await;
        });
    }
}

fn session_response(session: &Session) -> Value {
    json!({
        "sessionId": session.id,
        "modes": {
            "currentModeId": session.metadata.current_mode_id,
            "availableModes": AVAILABLE_MODES,
        },
        "models": {
            "currentModelId": session.metadata.current_model_id,
            "availableModels": AVAILABLE_MODELS,
        },
    })
}

fn require_params(params: Option<Value>, method: &str) -> Result<Value> {
    params.ok_or_else(|| AgentError::invalid_params(format!("{method} requires params")))
}

fn field_str(params: &Value, field: &str) -> Result<String> {
    params
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AgentError::invalid_params(format!("{field} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::CursorBridge;
    use std::time::Duration;

    fn dispatcher() -> Arc<Dispatcher> {
        let (transport, _rx) = Transport::spawn();
        let sessions = Arc::new(SessionManager::new(
            std::env::temp_dir().join(format!("dispatch-test-{}", uuid::Uuid::new_v4())),
            16,
            Duration::from_secs(3600),
        ));
        let slash = Arc::new(SlashRegistry::new());
        let tools = Arc::new(ToolRegistry::new());
        let tool_calls = Arc::new(ToolCallManager::new(Arc::clone(&transport)));
        let bridge = Arc::new(CursorBridge::new("cursor-agent"));
        let prompts = Arc::new(PromptHandler::new(
            Arc::clone(&sessions),
            bridge,
            Arc::clone(&transport),
            Arc::clone(&slash),
            Duration::from_secs(120),
            2,
        ));
        Arc::new(Dispatcher::new(sessions, transport, slash, tools, tool_calls, prompts, ExtensionRegistry::new()))
    }

    #[tokio::test]
    async fn rejects_relative_cwd_on_session_new() {
        let dispatcher = dispatcher();
        let err = dispatcher
            .handle_session_new(Some(json!({"cwd": "./x", "mcpServers": []})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cwd must be an absolute path"));
    }

    #[tokio::test]
    async fn mode_switch_response_matches_expected_shape() {
        let dispatcher = dispatcher();
        let session = dispatcher
            .handle_session_new(Some(json!({"cwd": "/tmp", "mcpServers": []})))
            .await
            .unwrap();
        let session_id = session["sessionId"].as_str().unwrap().to_string();
        let result = dispatcher
            .handle_set_mode(Some(json!({"sessionId": session_id, "modeId": "code"})))
            .await
            .unwrap();
        assert_eq!(result["_meta"]["previousMode"], json!("ask"));
        assert_eq!(result["_meta"]["newMode"], json!("code"));
        assert!(result["_meta"]["changedAt"].is_string());
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let dispatcher = dispatcher();
        let err = dispatcher
            .handle_request(&RequestId::Number(1), "bogus/method", None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("method not found"));
    }

    #[tokio::test]
    async fn extension_method_with_non_object_params_is_rejected() {
        let dispatcher = dispatcher();
        let err = dispatcher
            .handle_request(&RequestId::Number(1), "_telemetry/ping", Some(json!([1])))
            .await
            .unwrap_err();
        assert_eq!(err.error_code().code(), -32602);
    }

    #[tokio::test]
    async fn inbound_request_permission_is_rejected() {
        let dispatcher = dispatcher();
        let err = dispatcher
            .handle_request(&RequestId::Number(1), "session/request_permission", None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("method not found"));
    }
}
