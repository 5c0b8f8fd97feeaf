//! Session manager: lifecycle, persistence, mode/model state, expiry
//! sweep. A `DashMap`-backed in-memory cache with its entry API, extended
//! with file-per-session persistence and a background sweep task.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::content::ContentBlock;
use crate::error::{AgentError, Result};

use super::types::{
    validate_cwd, validate_mode, validate_model, ConversationMessage, NewSessionMeta, Role,
    Session, SessionMetadataUpdate, AVAILABLE_MODES,
};

fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}

#[derive(Debug, Clone, Default)]
pub struct ListFilters {
    pub name: Option<String>,
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ModeSwitch {
    pub previous: &'static str,
    #[allow(dead_code)]
    pub new: &'static str,
}

pub struct SessionManager {
    sessions: DashMap<String, Session>,
    session_dir: PathBuf,
    max_sessions: usize,
    session_timeout: Duration,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("live_sessions", &self.sessions.len())
            .field("session_dir", &self.session_dir)
            .finish()
    }
}

impl SessionManager {
    pub fn new(session_dir: PathBuf, max_sessions: usize, session_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            session_dir,
            max_sessions,
            session_timeout,
            write_lock: Mutex::new(()),
        }
    }

    fn session_path(&self, id: &str) -> PathBuf {
        self.session_dir.join(format!("{id}.json"))
    }

    #[tracing::instrument(skip(self), fields(session_id = %session.id))]
    async fn persist(&self, session: &Session) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.session_dir).await?;
        let path = self.session_path(&session.id);
        let bytes = serde_json::to_vec_pretty(session)?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    async fn delete_file(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.session_path(id);
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_from_disk(&self, id: &str) -> Option<Session> {
        let path = self.session_path(id);
        let bytes = tokio::fs::read(path).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Run the expiry sweep once, synchronously, before enforcing the
    /// live-session cap: reject new sessions when the live count reaches
    /// the configured maximum only after first running this sweep.
    pub fn sweep_expired(&self) -> Vec<String> {
        let cutoff = Utc::now() - chrono::Duration::from_std(self.session_timeout).unwrap_or_default();
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter_map(|entry| {
                let last_activity = chrono::DateTime::parse_from_rfc3339(&entry.state.last_activity).ok()?;
                if last_activity < cutoff {
                    Some(entry.key().clone())
                } else {
                    None
                }
            })
            .collect();
        for id in &expired {
            self.sessions.remove(id);
            tracing::info!(session_id = %id, "evicted expired session");
        }
        expired
    }

    /// Spawn the background sweep task; ticks every 60s.
    pub fn spawn_sweep_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                let expired = manager.sweep_expired();
                for id in expired {
                    if let Err(e) = manager.delete_file(&id).await {
                        tracing::warn!(session_id = %id, error = %e, "failed to remove expired session file");
                    }
                }
            }
        })
    }

    #[tracing::instrument(skip(self, mcp_servers, meta))]
    pub async fn create(
        &self,
        cwd: PathBuf,
        mcp_servers: Vec<serde_json::Value>,
        meta: Option<NewSessionMeta>,
    ) -> Result<Session> {
        validate_cwd(&cwd)?;
        self.sweep_expired();
        if self.sessions.len() >= self.max_sessions {
            return Err(AgentError::TooManySessions(self.max_sessions));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = now_iso8601();
        let session = Session::new(id.clone(), cwd, mcp_servers, meta, &now)?;
        self.sessions.insert(id, session.clone());
        self.persist(&session).await?;
        Ok(session)
    }

    #[tracing::instrument(skip(self))]
    pub async fn load(&self, id: &str) -> Result<Session> {
        if let Some(mut entry) = self.sessions.get_mut(id) {
            entry.state.last_activity = now_iso8601();
            return Ok(entry.clone());
        }
        if let Some(mut session) = self.read_from_disk(id).await {
            session.state.last_activity = now_iso8601();
            self.sessions.insert(id.to_string(), session.clone());
            return Ok(session);
        }
        Err(AgentError::session_not_found(id))
    }

    pub fn list(&self, limit: usize, offset: usize, filters: &ListFilters) -> Vec<Session> {
        let mut all: Vec<Session> = self
            .sessions
            .iter()
            .map(|e| e.value().clone())
            .filter(|s| {
                filters
                    .name
                    .as_ref()
                    .is_none_or(|n| s.metadata.name.as_deref() == Some(n.as_str()))
            })
            .filter(|s| {
                filters
                    .tag
                    .as_ref()
                    .is_none_or(|t| s.metadata.tags.iter().any(|tag| tag == t))
            })
            .collect();
        all.sort_by(|a, b| b.state.last_activity.cmp(&a.state.last_activity));
        all.into_iter().skip(offset).take(limit).collect()
    }

    #[tracing::instrument(skip(self, update))]
    pub async fn update(&self, id: &str, update: SessionMetadataUpdate) -> Result<Session> {
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| AgentError::session_not_found(id))?;
        if let Some(name) = update.name {
            entry.metadata.name = Some(name);
        }
        if let Some(description) = update.description {
            entry.metadata.description = Some(description);
        }
        if let Some(tags) = update.tags {
            entry.metadata.tags = tags;
        }
        let now = now_iso8601();
        entry.updated_at = now.clone();
        entry.state.last_activity = now;
        let snapshot = entry.clone();
        drop(entry);
        self.persist(&snapshot).await?;
        Ok(snapshot)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.sessions.remove(id);
        self.delete_file(id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_mode(&self, id: &str, mode_id: &str) -> Result<ModeSwitch> {
        validate_mode(mode_id)?;
        let mode_id_static = AVAILABLE_MODES.iter().find(|m| **m == mode_id).copied().unwrap();
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| AgentError::session_not_found(id))?;
        let previous = AVAILABLE_MODES
            .iter()
            .find(|m| **m == entry.metadata.current_mode_id)
            .copied()
            .unwrap_or("ask");
        entry.metadata.current_mode_id = mode_id_static.to_string();
        entry.state.current_mode_id = mode_id_static.to_string();
        let now = now_iso8601();
        entry.updated_at = now.clone();
        entry.state.last_activity = now;
        let snapshot = entry.clone();
        drop(entry);
        self.persist(&snapshot).await?;
        Ok(ModeSwitch {
            previous,
            new: mode_id_static,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_model(&self, id: &str, model_id: &str) -> Result<String> {
        validate_model(model_id)?;
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| AgentError::session_not_found(id))?;
        let previous = entry.metadata.current_model_id.clone();
        entry.metadata.current_model_id = model_id.to_string();
        let now = now_iso8601();
        entry.updated_at = now.clone();
        entry.state.last_activity = now;
        let snapshot = entry.clone();
        drop(entry);
        self.persist(&snapshot).await?;
        Ok(previous)
    }

    #[tracing::instrument(skip(self, content, metadata))]
    pub async fn add_message(
        &self,
        id: &str,
        role: Role,
        content: Vec<ContentBlock>,
        metadata: serde_json::Value,
    ) -> Result<()> {
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| AgentError::session_not_found(id))?;
        let now = now_iso8601();
        entry.conversation.push(ConversationMessage {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
            timestamp: now.clone(),
            metadata,
        });
        entry.state.message_count = entry.conversation.len();
        entry.updated_at = now.clone();
        entry.state.last_activity = now;
        let snapshot = entry.clone();
        drop(entry);
        self.persist(&snapshot).await
    }

    pub fn mark_processing(&self, id: &str) -> Result<()> {
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| AgentError::session_not_found(id))?;
        entry.state.processing = true;
        Ok(())
    }

    pub fn unmark_processing(&self, id: &str) {
        if let Some(mut entry) = self.sessions.get_mut(id) {
            entry.state.processing = false;
        }
    }

    pub fn touch(&self, id: &str) {
        if let Some(mut entry) = self.sessions.get_mut(id) {
            entry.state.last_activity = now_iso8601();
        }
    }

    pub fn exists(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.get(id).map(|e| e.clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn manager(dir: &Path) -> SessionManager {
        SessionManager::new(dir.to_path_buf(), 256, Duration::from_secs(86_400))
    }

    #[tokio::test]
    async fn create_rejects_relative_cwd() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        let err = mgr.create(PathBuf::from("./x"), vec![], None).await.unwrap_err();
        assert!(err.to_string().contains("cwd must be an absolute path"));
    }

    #[tokio::test]
    async fn create_defaults_mode_and_model() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        let session = mgr.create(PathBuf::from("/tmp/proj"), vec![], None).await.unwrap();
        assert_eq!(session.metadata.current_mode_id, "ask");
        assert_eq!(session.metadata.current_model_id, "auto");
        assert!(mgr.exists(&session.id));
    }

    #[tokio::test]
    async fn set_mode_round_trip() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        let session = mgr.create(PathBuf::from("/tmp/proj"), vec![], None).await.unwrap();
        let switch = mgr.set_mode(&session.id, "code").await.unwrap();
        assert_eq!(switch.previous, "ask");
        let reloaded = mgr.get(&session.id).unwrap();
        assert_eq!(reloaded.metadata.current_mode_id, "code");
        assert_eq!(reloaded.state.current_mode_id, "code");
    }

    #[tokio::test]
    async fn set_mode_rejects_unknown() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        let session = mgr.create(PathBuf::from("/tmp/proj"), vec![], None).await.unwrap();
        let err = mgr.set_mode(&session.id, "bogus").await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidMode(_)));
    }

    #[tokio::test]
    async fn message_count_matches_conversation_length() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        let session = mgr.create(PathBuf::from("/tmp/proj"), vec![], None).await.unwrap();
        mgr.add_message(&session.id, Role::User, vec![ContentBlock::text("hi")], serde_json::json!({}))
            .await
            .unwrap();
        let reloaded = mgr.get(&session.id).unwrap();
        assert!(reloaded.message_count_matches());
        assert_eq!(reloaded.state.message_count, 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        let session = mgr.create(PathBuf::from("/tmp/proj"), vec![], None).await.unwrap();
        mgr.delete(&session.id).await.unwrap();
        mgr.delete(&session.id).await.unwrap();
        assert!(!mgr.exists(&session.id));
    }

    #[tokio::test]
    async fn load_rehydrates_from_disk_after_eviction() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        let session = mgr.create(PathBuf::from("/tmp/proj"), vec![], None).await.unwrap();
        mgr.sessions.remove(&session.id);
        let reloaded = mgr.load(&session.id).await.unwrap();
        assert_eq!(reloaded.id, session.id);
    }

    #[tokio::test]
    async fn load_missing_session_errors() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        let err = mgr.load("nonexistent").await.unwrap_err();
        assert!(matches!(err, AgentError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn max_sessions_enforced_after_sweep() {
        let dir = tempdir().unwrap();
        let mgr = SessionManager::new(dir.path().to_path_buf(), 1, Duration::from_secs(86_400));
        mgr.create(PathBuf::from("/tmp/a"), vec![], None).await.unwrap();
        let err = mgr.create(PathBuf::from("/tmp/b"), vec![], None).await.unwrap_err();
        assert!(matches!(err, AgentError::TooManySessions(1)));
    }
}
