//! Prompt handler: per-session FIFO processing, heartbeats, slash
//! interception, bridge orchestration, and stop-reason classification.

mod heartbeat;
mod stop_reason;

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;

use crate::bridge::CursorBridge;
use crate::content::{self, Annotations, Audience, ContentBlock, StreamTokenizer};
use crate::error::{AgentError, Result};
use crate::session::{Role, SessionManager};
use crate::slash::SlashRegistry;
use crate::transport::Transport;

pub use stop_reason::{classify, human_explanation, RefusalReason, ResponseMeta, StopReason};

/// Hard-coded per-handler processing defaults.
const ECHO_USER_MESSAGES: bool = true;
const SEND_PLAN: bool = false;
const COLLECT_DETAILED_METRICS: bool = true;
const ANNOTATE_CONTENT: bool = true;
const MARK_INTERNAL_AUDIENCE: bool = false;

const HEARTBEAT_PERIOD: Duration = Duration::from_secs(12);

#[derive(Debug, Clone)]
pub struct PromptOutcome {
    pub stop_reason: &'static str,
    pub meta: Value,
}

pub struct PromptHandler {
    sessions: Arc<SessionManager>,
    bridge: Arc<CursorBridge>,
    transport: Arc<Transport>,
    slash: Arc<SlashRegistry>,
    session_locks: DashMap<String, Arc<AsyncMutex<()>>>,
    session_cancel: DashMap<String, CancellationToken>,
    stream_cancel: DashMap<String, mpsc::Sender<()>>,
    cursor_timeout: Duration,
    cursor_retries: u32,
}

impl std::fmt::Debug for PromptHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptHandler").field("active_locks", &self.session_locks.len()).finish()
    }
}

impl PromptHandler {
    pub fn new(
        sessions: Arc<SessionManager>,
        bridge: Arc<CursorBridge>,
        transport: Arc<Transport>,
        slash: Arc<SlashRegistry>,
        cursor_timeout: Duration,
        cursor_retries: u32,
    ) -> Self {
        Self {
            sessions,
            bridge,
            transport,
            slash,
            session_locks: DashMap::new(),
            session_cancel: DashMap::new(),
            stream_cancel: DashMap::new(),
            cursor_timeout,
            cursor_retries,
        }
    }

    fn session_lock(&self, session_id: &str) -> Arc<AsyncMutex<()>> {
        self.session_locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Cancel the specific in-flight stream for `request_id`, if any.
    pub fn cancel_stream(&self, request_id: &str) {
        if let Some((_, sender)) = self.stream_cancel.remove(request_id) {
            let _ = sender.try_send(());
        }
    }

    /// Cancel the active prompt and all streams for `session_id`.
    pub fn cancel_session(&self, session_id: &str) {
        if let Some(token) = self.session_cancel.get(session_id) {
            token.cancel();
        }
        let stream_ids: Vec<String> = self
            .stream_cancel
            .iter()
            .filter(|e| e.key().starts_with(&format!("{session_id}:")))
            .map(|e| e.key().clone())
            .collect();
        for id in stream_ids {
            self.cancel_stream(&id);
        }
    }

    #[tracing::instrument(skip(self, blocks))]
    pub async fn process(
        &self,
        session_id: &str,
        request_id: &str,
        blocks: Vec<ContentBlock>,
        stream: bool,
    ) -> Result<PromptOutcome> {
        if session_id.is_empty() {
            return Err(AgentError::invalid_params("sessionId is required"));
        }
        if blocks.is_empty() {
            return Err(AgentError::invalid_params("prompt must contain at least one content block"));
        }
        let errors = content::validate_blocks(&blocks);
        if let Some(first) = errors.into_iter().next() {
            return Err(AgentError::invalid_params(first));
        }

        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let session = self.sessions.load(session_id).await?;
        self.sessions.mark_processing(session_id)?;

        let token = CancellationToken::new();
        self.session_cancel.insert(session_id.to_string(), token.clone());
        let stream_key = format!("{session_id}:{request_id}");
        let (stream_tx, stream_rx) = mpsc::channel(1);
        self.stream_cancel.insert(stream_key.clone(), stream_tx);

        let started = Instant::now();
        let heartbeat_handle = self.spawn_heartbeat(session_id.to_string(), token.clone());

        let outcome = self
            .run(&session.id, &session.metadata.cwd, blocks, stream, token.clone(), stream_rx)
            .await;

        heartbeat_handle.abort();
        self.sessions.unmark_processing(session_id);
        self.session_cancel.remove(session_id);
        self.stream_cancel.remove(&stream_key);

        let (stop_reason, mut meta, response_blocks) = outcome?;
        if !response_blocks.is_empty() {
            self.sessions
                .add_message(session_id, Role::Assistant, response_blocks, meta.clone())
                .await?;
        }

        if COLLECT_DETAILED_METRICS {
            if let Value::Object(ref mut map) = meta {
                map.insert("elapsedMs".to_string(), json!(started.elapsed().as_millis() as u64));
            }
        }

        Ok(PromptOutcome { stop_reason, meta })
    }

    fn spawn_heartbeat(&self, session_id: String, token: CancellationToken) -> tokio::task::JoinHandle<()> {
        let transport = Arc::clone(&self.transport);
        let sessions = Arc::clone(&self.sessions);
        tokio::spawn(async move {
            let phrase = heartbeat::select_phrase(&session_id);
            let started = Instant::now();
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(HEARTBEAT_PERIOD) => {}
                }
                if !sessions.exists(&session_id) {
                    break;
                }
                sessions.touch(&session_id);
                let text = heartbeat::format_tick(phrase, started.elapsed().as_secs());
                let params = json!({
                    "sessionId": session_id,
                    "sessionUpdate": "agent_thought_chunk",
                    "content": {"type": "text", "text": text, "_meta": {"heartbeat": true}},
                });
                let _ = transport.notify("session/update", Some(params)).await;
            }
        })
    }

    async fn run(
        &self,
        session_id: &str,
        cwd: &std::path::Path,
        blocks: Vec<ContentBlock>,
        stream: bool,
        cancel: CancellationToken,
        mut stream_cancel_rx: mpsc::Receiver<()>,
    ) -> Result<(&'static str, Value, Vec<ContentBlock>)> {
        if !stream {
            if let Some(ContentBlock::Text(first)) = blocks.first() {
                if let Some(rest) = first.text.strip_prefix('/') {
                    if let Some((command, args)) = split_slash_command(rest) {
                        if command == "model" {
                            if let Some(reply) = self.handle_model_command(session_id, args).await? {
                                return Ok(("end_turn", json!({"slashCommand": "model"}), vec![ContentBlock::text(reply)]));
                            }
                        } else if let Some(registered) = self.slash.get(&command) {
                            tracing::debug!(command = %registered.name, "registered slash command has no built-in handler; passing through as literal text");
                        }
                    }
                }
            }
        }

        if ECHO_USER_MESSAGES {
            let echo_annotations = Annotations::for_audience(&[Audience::User, Audience::Assistant]);
            for block in &blocks {
                let annotated = match block {
                    ContentBlock::Text(t) => ContentBlock::text_with_annotations(t.text.clone(), echo_annotations.clone()),
                    other => other.clone(),
                };
                let params = json!({
                    "sessionId": session_id,
                    "sessionUpdate": "user_message_chunk",
                    "content": serde_json::to_value(&annotated)?,
                    "category": annotated.kind(),
                });
                self.transport.notify("session/update", Some(params)).await?;
            }
        }

        let serialized = content::serialize_blocks(&blocks).map_err(AgentError::ContentInvalid)?;

        let mut response_blocks = Vec::new();
        let mut cancelled = false;
        let mut response_meta = ResponseMeta::default();

        if stream {
            let tokenizer = Arc::new(AsyncMutex::new(StreamTokenizer::new()));
            let transport = Arc::clone(&self.transport);
            let session_id_owned = session_id.to_string();
            let collected: Arc<AsyncMutex<Vec<ContentBlock>>> = Arc::new(AsyncMutex::new(Vec::new()));
            let collected_for_chunk = Arc::clone(&collected);
            let tokenizer_for_chunk = Arc::clone(&tokenizer);

            let (cancel_tx, cancel_rx) = mpsc::channel(1);
            let cancel_forward = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel_forward.cancelled() => { let _ = cancel_tx.send(()).await; }
                    _ = stream_cancel_rx.recv() => { let _ = cancel_tx.send(()).await; }
                }
            });

            let on_chunk = move |chunk: String| {
                let transport = Arc::clone(&transport);
                let session_id = session_id_owned.clone();
                let tokenizer = Arc::clone(&tokenizer_for_chunk);
                let collected = Arc::clone(&collected_for_chunk);
                tokio::spawn(async move {
                    let mut tok = tokenizer.lock().await;
                    let emitted = tok.push(&chunk);
                    drop(tok);
                    let mut store = collected.lock().await;
                    for block in emitted {
                        let annotations = if ANNOTATE_CONTENT {
                            Some(crate::content::Annotations::for_audience(&[crate::content::Audience::User]))
                        } else {
                            None
                        };
                        let annotated = match (&block, annotations) {
                            (ContentBlock::Text(t), Some(a)) => ContentBlock::text_with_annotations(t.text.clone(), a),
                            _ => block.clone(),
                        };
                        let params = json!({
                            "sessionId": session_id,
                            "sessionUpdate": "agent_message_chunk",
                            "content": serde_json::to_value(&annotated).unwrap_or(Value::Null),
                        });
                        let _ = transport.notify("session/update", Some(params)).await;
                        store.push(annotated);
                    }
                });
            };

            let aborted = self
                .bridge
                .send_streaming_prompt(session_id, &serialized.prompt, cwd, on_chunk, cancel_rx)
                .await?;
            cancelled = aborted;

            let mut tok_guard = tokenizer.lock().await;
            let tokenizer_owned = std::mem::replace(&mut *tok_guard, StreamTokenizer::new());
            drop(tok_guard);
            let remainder = tokenizer_owned.finish();
            if !remainder.is_empty() {
                for block in &remainder {
                    let params = json!({
                        "sessionId": session_id,
                        "sessionUpdate": "agent_message_chunk",
                        "content": serde_json::to_value(block)?,
                    });
                    self.transport.notify("session/update", Some(params)).await?;
                }
            }
            let mut final_blocks = collected.lock().await.clone();
            final_blocks.extend(remainder);
            response_blocks = final_blocks;
        } else {
            let call =
                self.bridge.send_prompt(session_id, &serialized.prompt, cwd, self.cursor_retries, self.cursor_timeout);
            tokio::select! {
                _ = cancel.cancelled() => {
                    cancelled = true;
                }
                result = call => {
                    match result {
                        Ok(text) => {
                            let block = ContentBlock::text(text);
                            let params = json!({
                                "sessionId": session_id,
                                "sessionUpdate": "agent_message_chunk",
                                "content": serde_json::to_value(&block)?,
                            });
                            self.transport.notify("session/update", Some(params)).await?;
                            response_blocks.push(block);
                        }
                        Err(e) => {
                            response_meta.error = Some(e.to_string());
                        }
                    }
                }
            }
        }

        // SEND_PLAN and MARK_INTERNAL_AUDIENCE are off in this handler's
        // hard-coded config; they exist as named toggles rather than dead
        // flags so a future config surface can flip them without a new field.
        debug_assert!(!SEND_PLAN);
        debug_assert!(!MARK_INTERNAL_AUDIENCE);

        let classified = classify(cancelled, &response_meta);
        let (wire_reason, mut meta) = match classified {
            StopReason::Refusal(reason) => {
                let explanation = human_explanation(reason);
                let block = ContentBlock::text(explanation);
                let params = json!({
                    "sessionId": session_id,
                    "sessionUpdate": "agent_message_chunk",
                    "content": serde_json::to_value(&block)?,
                });
                self.transport.notify("session/update", Some(params)).await?;
                response_blocks.push(block);
                ("end_turn", json!({"originalStopReason": "refusal", "refusalReason": reason}))
            }
            StopReason::Cancelled => {
                ("cancelled", json!({"cancelledAt": chrono::Utc::now().to_rfc3339(), "cancelMethod": "session/cancel"}))
            }
            other => (other.wire_name(), json!({})),
        };

        if let Value::Object(ref mut map) = meta {
            map.insert("blockCount".to_string(), json!(response_blocks.len()));
        }

        Ok((wire_reason, meta, response_blocks))
    }

    async fn handle_model_command(&self, session_id: &str, args: &str) -> Result<Option<String>> {
        let model_id = args.trim();
        if model_id.is_empty() {
            return Ok(Some(format!(
                "Usage: /model <id>. Valid ids: {}",
                crate::session::AVAILABLE_MODELS.join(", ")
            )));
        }
        match self.sessions.set_model(session_id, model_id).await {
            Ok(previous) => Ok(Some(format!("Switched model from {previous} to {model_id}."))),
            Err(AgentError::InvalidModel(_)) => Ok(Some(format!(
                "Unknown model '{model_id}'. Valid ids: {}",
                crate::session::AVAILABLE_MODELS.join(", ")
            ))),
            Err(e) => Err(e),
        }
    }
}

fn split_slash_command(rest: &str) -> Option<(String, &str)> {
    let mut parts = rest.splitn(2, char::is_whitespace);
    let command = parts.next()?;
    if command.is_empty() {
        return None;
    }
    let args = parts.next().unwrap_or("");
    Some((command.to_string(), args))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_command_and_args() {
        assert_eq!(split_slash_command("model sonnet-4.5"), Some(("model".to_string(), "sonnet-4.5")));
        assert_eq!(split_slash_command("model"), Some(("model".to_string(), "")));
        assert_eq!(split_slash_command(""), None);
    }
}
