use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Logged-in state for one client, created at login and dropped at logout.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// In-memory session table keyed by token. Lost on restart.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open(&self, username: &str) -> Session {
        let session = Session {
            id: Uuid::new_v4(),
            username: username.to_string(),
            created_at: Utc::now(),
        };
        self.sessions.write().await.insert(session.id, session.clone());
        debug!("Opened session for {}", username);
        session
    }

    pub async fn get(&self, id: Uuid) -> Option<Session> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Follows a username change in every session of that user.
    pub async fn rename(&self, old_username: &str, new_username: &str) {
        let mut sessions = self.sessions.write().await;
        for session in sessions.values_mut().filter(|s| s.username == old_username) {
            session.username = new_username.to_string();
        }
    }

    pub async fn close(&self, id: Uuid) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_lifecycle() {
        let registry = SessionRegistry::new();
        let session = registry.open("alice").await;

        assert_eq!(registry.get(session.id).await.unwrap().username, "alice");
        assert_eq!(registry.len().await, 1);

        assert!(registry.close(session.id).await);
        assert!(registry.get(session.id).await.is_none());
        assert!(!registry.close(session.id).await);
    }

    #[tokio::test]
    async fn test_rename_updates_open_sessions() {
        let registry = SessionRegistry::new();
        let a = registry.open("alice").await;
        let b = registry.open("bob").await;

        registry.rename("alice", "carol").await;

        assert_eq!(registry.get(a.id).await.unwrap().username, "carol");
        assert_eq!(registry.get(b.id).await.unwrap().username, "bob");
    }
}
