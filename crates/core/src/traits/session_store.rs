//! SessionStore trait (C9) — spec §4.1.

use async_trait::async_trait;
use uuid::Uuid;

use crate::Session;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not found")]
    Missing,
    #[error("session expired")]
    Expired,
    #[error("session ownership violation")]
    OwnershipViolation,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a session. `Expired` is returned (not silently treated as
    /// `Missing`) so callers can distinguish "never existed" from "idled
    /// out", though both map to the same 404 at the HTTP layer.
    async fn get(&self, id: Uuid) -> Result<Session, SessionError>;

    /// Create a fresh session for `user_id`, recording `now()` as both
    /// `created_at` and `updated_at`.
    async fn create(&self, user_id: String) -> Session;

    /// Idempotent upsert; refreshes the TTL clock. Reads never extend TTL —
    /// only `save` does.
    async fn save(&self, session: Session) -> Result<(), SessionError>;

    async fn delete(&self, id: Uuid);

    /// Sessions for `user_id`, ordered by `updated_at` descending.
    async fn list_by_user(&self, user_id: &str) -> Vec<Session>;
}

/// Verify `session.user_id == user_id` before the orchestrator uses a
/// fetched session. A mismatch is a 403-class error, never a 404 (spec
/// §4.1).
pub fn check_ownership(session: &Session, user_id: &str) -> Result<(), SessionError> {
    if session.user_id == user_id {
        Ok(())
    } else {
        Err(SessionError::OwnershipViolation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Session;

    #[test]
    fn check_ownership_passes_for_owner() {
        let session = Session::new("user-1");
        assert!(check_ownership(&session, "user-1").is_ok());
    }

    #[test]
    fn check_ownership_fails_for_non_owner() {
        let session = Session::new("user-1");
        assert!(matches!(
            check_ownership(&session, "user-2"),
            Err(SessionError::OwnershipViolation)
        ));
    }
}
