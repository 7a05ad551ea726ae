//! In-memory index of active sessions.
//!
//! Reads are lock-free in the fast-path sense (shared read lock, no
//! allocation); inserts are compare-and-swap — a concurrent second
//! redemption gets the existing handle back instead of replacing it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::handle::SessionHandle;

/// Minutes past `valid_until` before a non-terminal session is swept.
const GC_GRACE_MIN: i64 = 30;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<SessionHandle>> {
        self.sessions.read().get(id).cloned()
    }

    /// Insert unless a session with this id already exists. Returns the
    /// handle that is actually registered (the existing one on races).
    pub fn insert_if_absent(&self, handle: Arc<SessionHandle>) -> Arc<SessionHandle> {
        let mut sessions = self.sessions.write();
        sessions.entry(handle.id).or_insert(handle).clone()
    }

    pub fn remove(&self, id: &Uuid) -> Option<Arc<SessionHandle>> {
        self.sessions.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn list(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions.read().values().cloned().collect()
    }

    /// Sweep terminal sessions and sessions long past their window.
    /// Returns the removed handles so the caller can snapshot them.
    pub fn gc(&self, now: DateTime<Utc>) -> Vec<Arc<SessionHandle>> {
        let mut removed = Vec::new();
        let mut sessions = self.sessions.write();
        sessions.retain(|_, handle| {
            let expired = now - handle.valid_until > Duration::minutes(GC_GRACE_MIN);
            if handle.is_terminal() || expired {
                tracing::debug!(session_id = %handle.id, expired, "session swept");
                removed.push(handle.clone());
                false
            } else {
                true
            }
        });
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::JobContext;
    use candor_domain::session::TerminalKind;
    use candor_domain::slot::{AiType, Difficulty};

    fn handle(valid_until: DateTime<Utc>) -> Arc<SessionHandle> {
        SessionHandle::new(
            Uuid::new_v4(),
            JobContext {
                candidate_name: "Jane".into(),
                company: "acme".into(),
                role: "backend".into(),
                job_description: String::new(),
                candidate_resume: String::new(),
                ai_type: AiType::Technical,
                difficulty: Difficulty::Medium,
                language: "en".into(),
            },
            6,
            10,
            Utc::now(),
            valid_until,
        )
    }

    #[test]
    fn insert_if_absent_returns_existing_on_race() {
        let registry = SessionRegistry::new();
        let a = handle(Utc::now());
        let registered = registry.insert_if_absent(a.clone());
        assert_eq!(registered.id, a.id);

        // A second insert with the same id yields the first handle.
        let again = registry.insert_if_absent(a.clone());
        assert!(Arc::ptr_eq(&again, &registered));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn gc_sweeps_terminal_and_expired() {
        let registry = SessionRegistry::new();
        let now = Utc::now();

        let live = handle(now + Duration::minutes(10));
        let stale = handle(now - Duration::minutes(45));
        let done = handle(now + Duration::minutes(10));
        {
            let mut state = done.state.lock().await;
            done.mark_terminal(&mut state, TerminalKind::Completed);
        }

        registry.insert_if_absent(live.clone());
        registry.insert_if_absent(stale.clone());
        registry.insert_if_absent(done.clone());

        let removed = registry.gc(now);
        assert_eq!(removed.len(), 2);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&live.id).is_some());
        assert!(registry.get(&stale.id).is_none());
        assert!(registry.get(&done.id).is_none());
    }
}
