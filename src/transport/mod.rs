//! Duplex JSON-RPC 2.0 transport over stdio.
//!
//! Stdin/stdout are wrapped once and never touched elsewhere: stdout
//! ownership is a single `tokio::sync::Mutex`-guarded handle, and the
//! pending-request table is a `DashMap`, the same concurrent-map idiom
//! used for session storage.

mod message;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};

pub use message::{Incoming, JsonRpcErrorObj, RequestId};
use message::{OutgoingNotification, OutgoingRequest, OutgoingResponse, RawMessage};

use crate::error::{AgentError, Result};

type PendingResult = std::result::Result<Value, JsonRpcErrorObj>;

/// Owns stdout and the outgoing pending-request table. The read loop is
/// spawned separately via [`Transport::spawn`] and feeds classified
/// [`Incoming`] frames to the dispatcher over an unbounded channel.
pub struct Transport {
    writer: Mutex<tokio::io::Stdout>,
    pending: DashMap<RequestId, oneshot::Sender<PendingResult>>,
    next_id: AtomicI64,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl Transport {
    /// Spawn the stdin read loop and return the transport handle plus the
    /// channel of incoming requests/notifications.
    pub fn spawn() -> (Arc<Self>, mpsc::UnboundedReceiver<Incoming>) {
        let transport = Arc::new(Self {
            writer: Mutex::new(tokio::io::stdout()),
            pending: DashMap::new(),
            next_id: AtomicI64::new(1),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let reader_transport = Arc::clone(&transport);
        tokio::spawn(async move {
            reader_transport.run_read_loop(tx).await;
        });
        (transport, rx)
    }

    async fn run_read_loop(self: Arc<Self>, tx: mpsc::UnboundedSender<Incoming>) {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    self.handle_line(line, &tx);
                }
                Ok(None) => {
                    tracing::info!("stdin closed, shutting transport down");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "transport read error");
                    break;
                }
            }
        }
        self.reject_all_pending(AgentError::Cancelled);
    }

    fn handle_line(&self, line: &str, tx: &mpsc::UnboundedSender<Incoming>) {
        let raw: RawMessage = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse incoming JSON-RPC frame");
                return;
            }
        };

        match (raw.id, raw.method, raw.result, raw.error) {
            (Some(id), Some(method), _, _) => {
                let _ = tx.send(Incoming::Request {
                    id,
                    method,
                    params: raw.params,
                });
            }
            (None, Some(method), _, _) => {
                let _ = tx.send(Incoming::Notification {
                    method,
                    params: raw.params,
                });
            }
            (Some(id), None, result, error) => {
                if let Some((_, sender)) = self.pending.remove(&id) {
                    let resolved = match error {
                        Some(e) => Err(e),
                        None => Ok(result.unwrap_or(Value::Null)),
                    };
                    let _ = sender.send(resolved);
                } else {
                    tracing::warn!(id = %id, "response for unknown pending request");
                }
            }
            _ => {
                tracing::warn!("malformed JSON-RPC frame: neither request, notification, nor response");
            }
        }
    }

    fn reject_all_pending(&self, err: AgentError) {
        let pending: Vec<_> = self.pending.iter().map(|e| e.key().clone()).collect();
        for id in pending {
            if let Some((_, sender)) = self.pending.remove(&id) {
                let _ = sender.send(Err(JsonRpcErrorObj::from(&err)));
            }
        }
    }

    async fn write_line(&self, line: String) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    /// Issue a server-initiated request to the client and await the response.
    #[tracing::instrument(skip(self, params))]
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.clone(), tx);

        let payload = OutgoingRequest {
            jsonrpc: "2.0",
            id: &id,
            method,
            params,
        };
        let line = serde_json::to_string(&payload)?;
        if let Err(e) = self.write_line(line).await {
            self.pending.remove(&id);
            return Err(e);
        }

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(rpc_err)) => Err(AgentError::cursor_cli(rpc_err.message)),
            Err(_) => Err(AgentError::Cancelled),
        }
    }

    /// Send a one-way notification (no response expected).
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let payload = OutgoingNotification {
            jsonrpc: "2.0",
            method,
            params,
        };
        let line = serde_json::to_string(&payload)?;
        self.write_line(line).await
    }

    /// Respond to an incoming request with either a result or an error.
    pub async fn respond(&self, id: RequestId, outcome: PendingResult) -> Result<()> {
        let (result, error) = match outcome {
            Ok(v) => (Some(v), None),
            Err(e) => (None, Some(e)),
        };
        let payload = OutgoingResponse {
            jsonrpc: "2.0",
            id: &id,
            result,
            error,
        };
        let line = serde_json::to_string(&payload)?;
        self.write_line(line).await
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_request_vs_notification_vs_response() {
        let request: RawMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
                .unwrap();
        assert!(request.id.is_some() && request.method.is_some());

        let notification: RawMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"session/update","params":{}}"#)
                .unwrap();
        assert!(notification.id.is_none() && notification.method.is_some());

        let response: RawMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#).unwrap();
        assert!(response.id.is_some() && response.method.is_none() && response.result.is_some());
    }

    #[test]
    fn request_id_round_trips_number_and_string() {
        let n: RequestId = serde_json::from_str("42").unwrap();
        assert_eq!(n, RequestId::Number(42));
        let s: RequestId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(s, RequestId::String("abc".to_string()));
    }

    #[tokio::test]
    async fn call_rejects_when_pending_dropped() {
        let transport = Transport {
            writer: Mutex::new(tokio::io::stdout()),
            pending: DashMap::new(),
            next_id: AtomicI64::new(1),
        };
        let id = RequestId::Number(1);
        let (tx, _rx) = oneshot::channel::<PendingResult>();
        transport.pending.insert(id.clone(), tx);
        drop(transport.pending.remove(&id));
        assert_eq!(transport.pending_count(), 0);
    }

    #[test]
    fn serialized_frames_have_no_embedded_newline() {
        let payload = OutgoingNotification {
            jsonrpc: "2.0",
            method: "session/update",
            params: Some(serde_json::json!({"text": "line one\nline two"})),
        };
        let line = serde_json::to_string(&payload).unwrap();
        assert!(!line.contains('\n'));
        assert!(!line.contains('\r'));
    }
}
