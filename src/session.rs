//! Persisted conversation snapshots, listed and fetched over the realtime
//! transport and addressable from the CLI.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{error, warn};

use crate::error::{HiveError, Result};
use crate::message::Envelope;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: String,
    pub agent_id: String,
    pub chat: Vec<Envelope>,
    pub datetime: DateTime<Utc>,
}

/// An active session an interactive run snapshots into after each exchange.
pub struct SessionBinding {
    pub store: SessionStore,
    pub id: String,
}

/// Flat JSON array store, same degrade-to-empty policy as the agent store.
#[derive(Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read_sessions(&self) -> Result<Vec<Session>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(HiveError::Storage(format!(
                    "failed to read sessions file `{}`: {err}",
                    self.path.display()
                )))
            }
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).map_err(|err| {
            HiveError::Storage(format!(
                "invalid sessions file `{}`: {err}",
                self.path.display()
            ))
        })
    }

    async fn write_sessions(&self, sessions: &[Session]) -> Result<()> {
        let serialized = serde_json::to_string_pretty(sessions)?;
        fs::write(&self.path, serialized).await.map_err(|err| {
            HiveError::Storage(format!(
                "failed to write sessions file `{}`: {err}",
                self.path.display()
            ))
        })
    }

    pub async fn list(&self) -> Vec<Session> {
        match self.read_sessions().await {
            Ok(sessions) => sessions,
            Err(err) => {
                warn!(error = %err, "listing sessions failed");
                Vec::new()
            }
        }
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        self.list().await.into_iter().find(|session| session.id == id)
    }

    /// The most recent session belonging to an agent.
    pub async fn for_agent(&self, agent_id: &str) -> Option<Session> {
        self.list()
            .await
            .into_iter()
            .filter(|session| session.agent_id == agent_id)
            .max_by_key(|session| session.datetime)
    }

    /// Upsert by session id. Returns whether the write landed.
    pub async fn save(&self, session: Session) -> bool {
        let result = async {
            let mut sessions = self.read_sessions().await?;
            match sessions.iter_mut().find(|existing| existing.id == session.id) {
                Some(existing) => *existing = session,
                None => sessions.push(session),
            }
            self.write_sessions(&sessions).await
        }
        .await;
        match result {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, "failed to persist session");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn session(id: &str, agent_id: &str) -> Session {
        Session {
            id: id.into(),
            agent_id: agent_id.into(),
            chat: vec![Envelope::text("User", "hi")],
            datetime: Utc::now(),
        }
    }

    #[tokio::test]
    async fn missing_file_lists_nothing() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("sessions.json"));
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn save_and_get_round_trip() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("sessions.json"));

        assert!(store.save(session("s1", "a1")).await);
        let loaded = store.get("s1").await.unwrap();
        assert_eq!(loaded.agent_id, "a1");
        assert_eq!(loaded.chat.len(), 1);
    }

    #[tokio::test]
    async fn save_upserts_by_id() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("sessions.json"));

        store.save(session("s1", "a1")).await;
        let mut updated = session("s1", "a1");
        updated.chat.push(Envelope::text("Avatar", "hello"));
        store.save(updated).await;

        assert_eq!(store.list().await.len(), 1);
        assert_eq!(store.get("s1").await.unwrap().chat.len(), 2);
    }

    #[tokio::test]
    async fn for_agent_finds_latest_session() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("sessions.json"));

        store.save(session("s1", "a1")).await;
        store.save(session("s2", "other")).await;

        assert_eq!(store.for_agent("a1").await.unwrap().id, "s1");
        assert!(store.for_agent("missing").await.is_none());
    }
}
