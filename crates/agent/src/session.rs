//! `InMemorySessionStore` (C9) — spec §4.1.
//!
//! Grounded in the teacher's `SessionManager` dual-map discipline (primary
//! map plus a secondary `user_id -> session ids` index kept in sync inside
//! one write-lock critical section) and its `start_cleanup_task`
//! `tokio::select!`-against-`tokio::time::interval` sweep pattern.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use medrag_core::{Session, SessionError, SessionStore};
use parking_lot::RwLock;
use uuid::Uuid;

struct StoredSession {
    session: Session,
    last_touched: Instant,
}

pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<Uuid, StoredSession>>,
    by_user: RwLock<HashMap<String, HashSet<Uuid>>>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            by_user: RwLock::new(HashMap::new()),
            ttl,
        })
    }

    /// Spawn the background TTL sweep. `shutdown` fires once to stop the
    /// loop, matching the teacher's `SessionManager::start_cleanup_task`.
    pub fn start_cleanup_task(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => store.sweep_expired(),
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    fn sweep_expired(&self) {
        let mut sessions = self.sessions.write();
        let mut by_user = self.by_user.write();
        let expired: Vec<Uuid> = sessions
            .iter()
            .filter(|(_, stored)| stored.last_touched.elapsed() > self.ttl)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            if let Some(stored) = sessions.remove(&id) {
                if let Some(ids) = by_user.get_mut(&stored.session.user_id) {
                    ids.remove(&id);
                    if ids.is_empty() {
                        by_user.remove(&stored.session.user_id);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: Uuid) -> Result<Session, SessionError> {
        let sessions = self.sessions.read();
        let stored = sessions.get(&id).ok_or(SessionError::Missing)?;
        if stored.last_touched.elapsed() > self.ttl {
            return Err(SessionError::Expired);
        }
        Ok(stored.session.clone())
    }

    async fn create(&self, user_id: String) -> Session {
        let session = Session::new(user_id.clone());
        let id = session.id;

        self.sessions.write().insert(
            id,
            StoredSession { session: session.clone(), last_touched: Instant::now() },
        );
        self.by_user.write().entry(user_id).or_default().insert(id);

        session
    }

    async fn save(&self, session: Session) -> Result<(), SessionError> {
        let id = session.id;
        let mut sessions = self.sessions.write();
        let mut by_user = self.by_user.write();

        by_user.entry(session.user_id.clone()).or_default().insert(id);
        sessions.insert(id, StoredSession { session, last_touched: Instant::now() });
        Ok(())
    }

    async fn delete(&self, id: Uuid) {
        let mut sessions = self.sessions.write();
        if let Some(stored) = sessions.remove(&id) {
            let mut by_user = self.by_user.write();
            if let Some(ids) = by_user.get_mut(&stored.session.user_id) {
                ids.remove(&id);
                if ids.is_empty() {
                    by_user.remove(&stored.session.user_id);
                }
            }
        }
    }

    async fn list_by_user(&self, user_id: &str) -> Vec<Session> {
        let by_user = self.by_user.read();
        let sessions = self.sessions.read();
        let Some(ids) = by_user.get(user_id) else { return Vec::new(); };

        let mut result: Vec<Session> = ids
            .iter()
            .filter_map(|id| sessions.get(id).map(|s| s.session.clone()))
            .collect();
        result.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = InMemorySessionStore::new(Duration::from_secs(3600));
        let session = store.create("user-1".to_string()).await;
        let fetched = store.get(session.id).await.unwrap();
        assert_eq!(fetched.user_id, "user-1");
    }

    #[tokio::test]
    async fn get_missing_session_errors() {
        let store = InMemorySessionStore::new(Duration::from_secs(3600));
        let result = store.get(Uuid::new_v4()).await;
        assert!(matches!(result, Err(SessionError::Missing)));
    }

    #[tokio::test]
    async fn expired_session_is_reported_without_removal() {
        let store = InMemorySessionStore::new(Duration::from_millis(1));
        let session = store.create("user-1".to_string()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(store.get(session.id).await, Err(SessionError::Expired)));
        // still present in the secondary index until the sweep runs
        assert_eq!(store.list_by_user("user-1").await.len(), 1);
    }

    #[tokio::test]
    async fn list_by_user_orders_by_updated_at_desc() {
        let store = InMemorySessionStore::new(Duration::from_secs(3600));
        let mut first = store.create("user-1".to_string()).await;
        let second = store.create("user-1".to_string()).await;

        first.push_message(medrag_core::Message::user("hi"));
        store.save(first.clone()).await.unwrap();

        let listed = store.list_by_user("user-1").await;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first.id);
        assert_ne!(listed[0].id, second.id);
    }

    #[tokio::test]
    async fn delete_prunes_secondary_index() {
        let store = InMemorySessionStore::new(Duration::from_secs(3600));
        let session = store.create("user-1".to_string()).await;
        store.delete(session.id).await;
        assert!(store.list_by_user("user-1").await.is_empty());
        assert!(matches!(store.get(session.id).await, Err(SessionError::Missing)));
    }
}
