//! Tool-call coordinator: a `DashMap` + entry API record store, with a
//! fire-and-forget eviction task that reaps completed records 30s after
//! they terminate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Value};

use crate::error::Result;
use crate::transport::Transport;

use super::types::{derive_kind, derive_title, ToolCallRecord, ToolCallStatus};

fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}

#[derive(Debug, Clone)]
pub struct PermissionOption {
    pub option_id: String,
    pub kind: String,
}

#[derive(Debug, Clone)]
pub struct PermissionOutcome {
    pub outcome: &'static str,
    pub option_id: Option<String>,
}

/// Fields a caller may supply to `update_tool_call`; omitted fields are
/// left untouched, and the resulting `tool_call_update` notification only
/// carries the fields supplied.
#[derive(Debug, Clone, Default)]
pub struct ToolCallUpdateFields {
    pub status: Option<ToolCallStatus>,
    pub content: Option<Value>,
    pub locations: Option<Vec<Value>>,
}

pub struct ToolCallManager {
    records: DashMap<String, ToolCallRecord>,
    counter: AtomicU64,
    notification_sequence: AtomicU64,
    transport: Arc<Transport>,
}

impl std::fmt::Debug for ToolCallManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCallManager").field("records", &self.records.len()).finish()
    }
}

impl ToolCallManager {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self {
            records: DashMap::new(),
            counter: AtomicU64::new(0),
            notification_sequence: AtomicU64::new(0),
            transport,
        }
    }

    fn generate_id(&self, tool_name: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let unix_nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        format!("tool_{tool_name}_{unix_nanos}_{n}")
    }

    fn next_sequence(&self) -> u64 {
        self.notification_sequence.fetch_add(1, Ordering::SeqCst)
    }

    #[tracing::instrument(skip(self, raw_input, locations))]
    pub async fn report_tool_call(
        &self,
        session_id: &str,
        tool_name: &str,
        raw_input: Value,
        locations: Option<Vec<Value>>,
        source: &str,
    ) -> Result<String> {
        let id = self.generate_id(tool_name);
        let start_time = now_iso8601();
        let record = ToolCallRecord {
            id: id.clone(),
            session_id: session_id.to_string(),
            tool_name: tool_name.to_string(),
            status: ToolCallStatus::InProgress,
            start_time: start_time.clone(),
            end_time: None,
            raw_input: raw_input.clone(),
            locations: locations.clone(),
            content: None,
        };
        self.records.insert(id.clone(), record);

        let params = json!({
            "sessionId": session_id,
            "sessionUpdate": "tool_call",
            "toolCallId": id,
            "title": derive_title(tool_name, &raw_input),
            "kind": derive_kind(tool_name),
            "status": ToolCallStatus::InProgress,
            "rawInput": raw_input,
            "locations": locations,
            "_meta": {
                "toolName": tool_name,
                "source": source,
                "startTime": start_time,
            },
            "notificationSequence": self.next_sequence(),
        });
        self.transport.notify("session/update", Some(params)).await?;
        Ok(id)
    }

    #[tracing::instrument(skip(self, fields))]
    pub async fn update_tool_call(&self, tool_call_id: &str, fields: ToolCallUpdateFields) -> Result<()> {
        let mut update = json!({
            "sessionUpdate": "tool_call_update",
            "toolCallId": tool_call_id,
            "notificationSequence": self.next_sequence(),
        });

        let session_id = {
            let mut record = self
                .records
                .get_mut(tool_call_id)
                .ok_or_else(|| crate::error::AgentError::ToolCallNotFound(tool_call_id.to_string()))?;
            if record.status.is_terminal() {
                return Err(crate::error::AgentError::ToolCallTerminal(tool_call_id.to_string()));
            }
            if let Some(status) = fields.status {
                record.status = status;
                update["status"] = json!(status);
                if status.is_terminal() {
                    let end_time = now_iso8601();
                    record.end_time = Some(end_time.clone());
                    update["endTime"] = json!(end_time);
                }
            }
            if let Some(content) = fields.content {
                record.content = Some(content.clone());
                update["content"] = content;
            }
            if let Some(locations) = fields.locations {
                record.locations = Some(locations.clone());
                update["locations"] = json!(locations);
            }
            record.session_id.clone()
        };
        update["sessionId"] = json!(session_id);

        self.transport.notify("session/update", Some(update)).await
    }

    pub async fn complete_tool_call(self: &Arc<Self>, tool_call_id: &str, content: Option<Value>) -> Result<()> {
        self.update_tool_call(
            tool_call_id,
            ToolCallUpdateFields {
                status: Some(ToolCallStatus::Completed),
                content,
                locations: None,
            },
        )
        .await?;
        self.schedule_eviction(tool_call_id);
        Ok(())
    }

    pub async fn fail_tool_call(&self, tool_call_id: &str, error_content: Value) -> Result<()> {
        self.update_tool_call(
            tool_call_id,
            ToolCallUpdateFields {
                status: Some(ToolCallStatus::Failed),
                content: Some(error_content),
                locations: None,
            },
        )
        .await
    }

    fn schedule_eviction(self: &Arc<Self>, tool_call_id: &str) {
        let manager = Arc::clone(self);
        let id = tool_call_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            manager.records.remove(&id);
        });
    }

    /// Fallback when the client doesn't answer: default to `allow_once`
    /// when present, else `reject_once`, tie-broken by list order.
    #[tracing::instrument(skip(self, options))]
    pub async fn request_tool_permission(
        &self,
        session_id: &str,
        tool_call_id: &str,
        options: &[PermissionOption],
    ) -> PermissionOutcome {
        let params = json!({
            "sessionId": session_id,
            "toolCallId": tool_call_id,
            "options": options.iter().map(|o| json!({"optionId": o.option_id, "kind": o.kind})).collect::<Vec<_>>(),
        });

        match self.transport.call("session/request_permission", Some(params)).await {
            Ok(value) => {
                if let Some(option_id) = value.get("optionId").and_then(|v| v.as_str()) {
                    return PermissionOutcome {
                        outcome: "selected",
                        option_id: Some(option_id.to_string()),
                    };
                }
                tracing::warn!(tool_call_id, "permission response missing optionId; falling back");
                self.fallback_permission(options)
            }
            Err(e) => {
                tracing::error!(tool_call_id, error = %e, "permission request failed; falling back");
                self.fallback_permission(options)
            }
        }
    }

    fn fallback_permission(&self, options: &[PermissionOption]) -> PermissionOutcome {
        options
            .iter()
            .find(|o| o.kind == "allow_once")
            .or_else(|| options.iter().find(|o| o.kind == "reject_once"))
            .map(|o| PermissionOutcome {
                outcome: "selected",
                option_id: Some(o.option_id.clone()),
            })
            .unwrap_or(PermissionOutcome {
                outcome: "selected",
                option_id: None,
            })
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel_session_tool_calls(&self, session_id: &str) -> Result<()> {
        let ids: Vec<String> = self
            .records
            .iter()
            .filter(|e| e.session_id == session_id && !e.status.is_terminal())
            .map(|e| e.key().clone())
            .collect();
        for id in ids {
            let update = json!({
                "sessionId": session_id,
                "sessionUpdate": "tool_call_update",
                "toolCallId": id,
                "status": "cancelled",
                "notificationSequence": self.next_sequence(),
            });
            self.transport.notify("session/update", Some(update)).await?;
            self.records.remove(&id);
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<ToolCallRecord> {
        self.records.get(id).map(|r| r.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> Arc<ToolCallManager> {
        let (transport, _rx) = Transport::spawn();
        Arc::new(ToolCallManager::new(transport))
    }

    #[tokio::test]
    async fn generated_ids_follow_the_expected_shape() {
        let mgr = manager();
        let id = mgr.generate_id("read_file");
        assert!(id.starts_with("tool_read_file_"));
        let parts: Vec<&str> = id.split('_').collect();
        assert!(parts.len() >= 4);
    }

    #[tokio::test]
    async fn fallback_prefers_allow_once() {
        let mgr = manager();
        let options = vec![
            PermissionOption { option_id: "reject-once".into(), kind: "reject_once".into() },
            PermissionOption { option_id: "allow-once".into(), kind: "allow_once".into() },
        ];
        let outcome = mgr.fallback_permission(&options);
        assert_eq!(outcome.option_id.as_deref(), Some("allow-once"));
    }

    #[tokio::test]
    async fn fallback_uses_reject_once_when_no_allow_once() {
        let mgr = manager();
        let options = vec![PermissionOption { option_id: "reject-once".into(), kind: "reject_once".into() }];
        let outcome = mgr.fallback_permission(&options);
        assert_eq!(outcome.option_id.as_deref(), Some("reject-once"));
    }
}
