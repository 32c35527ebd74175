//! In-memory session registry.
//!
//! One persistent conversational context per (stage, session-id) pair, so
//! that retries continue the same dialogue rather than restarting it. The
//! store is an explicit injected object rather than process-global state,
//! and is safe against concurrent insertion of the same key.

use std::collections::HashMap;
use std::sync::Arc;

use augur_core::session::Session;
use augur_core::stage::StageKind;
use tokio::sync::{Mutex, RwLock};

/// Registry of sessions keyed by (stage, session id).
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<(StageKind, String), Arc<Mutex<Session>>>>,
}

impl SessionStore {
    /// Creates a new empty SessionStore.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session for the key, creating it on first use.
    ///
    /// The system instruction is fixed at first creation; later calls with
    /// the same key return the existing session and ignore the instruction
    /// argument.
    pub async fn get_or_create(
        &self,
        stage: StageKind,
        session_id: &str,
        system_instruction: &str,
    ) -> Arc<Mutex<Session>> {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry((stage, session_id.to_string()))
            .or_insert_with(|| {
                Arc::new(Mutex::new(Session::new(
                    stage,
                    session_id,
                    system_instruction,
                )))
            })
            .clone()
    }

    /// Gets an existing session, if any.
    pub async fn get(&self, stage: StageKind, session_id: &str) -> Option<Arc<Mutex<Session>>> {
        let sessions = self.sessions.read().await;
        sessions.get(&(stage, session_id.to_string())).cloned()
    }

    /// Removes a session from the store.
    pub async fn remove(&self, stage: StageKind, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(&(stage, session_id.to_string()));
    }

    /// Clears all sessions.
    pub async fn clear(&self) {
        let mut sessions = self.sessions.write().await;
        sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let store = SessionStore::new();

        let first = store
            .get_or_create(StageKind::Collection, "run-1", "original instruction")
            .await;
        let second = store
            .get_or_create(StageKind::Collection, "run-1", "different instruction")
            .await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            second.lock().await.system_instruction(),
            "original instruction"
        );
    }

    #[tokio::test]
    async fn test_stages_are_separate_keys() {
        let store = SessionStore::new();

        let collection = store
            .get_or_create(StageKind::Collection, "run-1", "collect")
            .await;
        let analysis = store
            .get_or_create(StageKind::Analysis, "run-1", "analyze")
            .await;

        assert!(!Arc::ptr_eq(&collection, &analysis));
    }

    #[tokio::test]
    async fn test_clear_empties_store() {
        let store = SessionStore::new();

        store
            .get_or_create(StageKind::Collection, "run-1", "instruction")
            .await;
        store
            .get_or_create(StageKind::Analysis, "run-2", "instruction")
            .await;
        store.clear().await;

        assert!(store.get(StageKind::Collection, "run-1").await.is_none());
        assert!(store.get(StageKind::Analysis, "run-2").await.is_none());
    }

    #[tokio::test]
    async fn test_remove_evicts_session() {
        let store = SessionStore::new();

        store
            .get_or_create(StageKind::Collection, "run-1", "instruction")
            .await;
        store.remove(StageKind::Collection, "run-1").await;

        assert!(store.get(StageKind::Collection, "run-1").await.is_none());
    }
}
