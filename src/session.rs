//! In-memory document sessions with a time-to-live measured from creation.
//!
//! The map lock is only held for lookups. Each session has its own lock, so a
//! long chat turn on one document never blocks another.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::sections::SectionSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct DocumentSession {
    pub id: String,
    pub topic: String,
    pub subject: String,
    pub sections: SectionSet,
    pub template_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub chat_history: Vec<ChatTurn>,
}

impl DocumentSession {
    pub fn push_turn(&mut self, role: Role, text: impl Into<String>, at: DateTime<Utc>) {
        self.chat_history.push(ChatTurn {
            role,
            text: text.into(),
            timestamp: at,
        });
    }
}

pub type SessionHandle = Arc<Mutex<DocumentSession>>;

struct Entry {
    created_at: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
    session: SessionHandle,
}

impl Entry {
    fn expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now >= self.created_at + ttl
    }
}

/// Locks a session, recovering the data if a previous holder panicked.
pub fn lock_session(handle: &SessionHandle) -> MutexGuard<'_, DocumentSession> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SessionStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create(
        &self,
        topic: &str,
        subject: &str,
        sections: SectionSet,
        template_path: PathBuf,
    ) -> String {
        self.create_at(topic, subject, sections, template_path, Utc::now())
    }

    pub fn create_at(
        &self,
        topic: &str,
        subject: &str,
        sections: SectionSet,
        template_path: PathBuf,
        now: DateTime<Utc>,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        let session = DocumentSession {
            id: id.clone(),
            topic: topic.to_string(),
            subject: subject.to_string(),
            sections,
            template_path,
            created_at: now,
            chat_history: Vec::new(),
        };
        self.entries().insert(
            id.clone(),
            Entry {
                created_at: now,
                last_accessed: now,
                session: Arc::new(Mutex::new(session)),
            },
        );
        info!(session = %id, "session created");
        id
    }

    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.get_at(id, Utc::now())
    }

    /// Expired sessions are removed and reported as absent. A hit refreshes the
    /// last-accessed time.
    pub fn get_at(&self, id: &str, now: DateTime<Utc>) -> Option<SessionHandle> {
        let mut entries = self.entries();
        let expired = entries.get(id)?.expired(now, self.ttl);
        if expired {
            entries.remove(id);
            debug!(session = %id, "session expired on access");
            return None;
        }
        let entry = entries.get_mut(id)?;
        entry.last_accessed = now;
        Some(entry.session.clone())
    }

    pub fn last_accessed(&self, id: &str) -> Option<DateTime<Utc>> {
        self.entries().get(id).map(|e| e.last_accessed)
    }

    /// Writes the given sections into the session, replacing same-named ones.
    pub fn update_sections(&self, id: &str, changes: &SectionSet) -> bool {
        let Some(handle) = self.get(id) else {
            return false;
        };
        let mut session = lock_session(&handle);
        for (name, content) in changes.iter() {
            session.sections.insert(name, content);
        }
        true
    }

    pub fn append_chat_turn(&self, id: &str, role: Role, text: &str) -> bool {
        let Some(handle) = self.get(id) else {
            return false;
        };
        lock_session(&handle).push_turn(role, text, Utc::now());
        true
    }

    /// Removes the session, returning its final state.
    pub fn delete(&self, id: &str) -> Option<DocumentSession> {
        let entry = self.entries().remove(id)?;
        info!(session = %id, "session deleted");
        let session = lock_session(&entry.session).clone();
        Some(session)
    }

    pub fn purge_expired(&self) -> Vec<DocumentSession> {
        self.purge_expired_at(Utc::now())
    }

    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> Vec<DocumentSession> {
        let removed: Vec<Entry> = {
            let mut entries = self.entries();
            let ids: Vec<String> = entries
                .iter()
                .filter(|(_, e)| e.expired(now, self.ttl))
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| entries.remove(id)).collect()
        };
        if !removed.is_empty() {
            info!(count = removed.len(), "expired sessions purged");
        }
        removed
            .iter()
            .map(|e| lock_session(&e.session).clone())
            .collect()
    }

    /// Drops every session, returning them. Used on shutdown.
    pub fn drain(&self) -> Vec<DocumentSession> {
        let removed: Vec<Entry> = self.entries().drain().map(|(_, e)| e).collect();
        removed
            .iter()
            .map(|e| lock_session(&e.session).clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use crate::sections::SectionSet;

    use super::{lock_session, Role, SessionStore};

    fn sections() -> SectionSet {
        [("Objective", "Text"), ("References", "1. A")]
            .into_iter()
            .collect()
    }

    #[test]
    fn session_expires_after_ttl_from_creation() {
        let store = SessionStore::new(Duration::hours(24));
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).single().expect("time");
        let id = store.create_at("Topic", "Subject", sections(), PathBuf::from("t.docx"), t0);

        let before = t0 + Duration::hours(24) - Duration::seconds(1);
        assert!(store.get_at(&id, before).is_some());
        assert_eq!(store.last_accessed(&id), Some(before));

        // Access does not extend the lifetime.
        let after = t0 + Duration::hours(24) + Duration::seconds(1);
        assert!(store.get_at(&id, after).is_none());
        assert_eq!(store.len(), 0);
        assert!(store.get_at(&id, before).is_none());
    }

    #[test]
    fn purge_removes_only_expired() {
        let store = SessionStore::new(Duration::minutes(10));
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).single().expect("time");
        let old = store.create_at("A", "S", sections(), PathBuf::from("a.docx"), t0);
        let fresh = store.create_at(
            "B",
            "S",
            sections(),
            PathBuf::from("b.docx"),
            t0 + Duration::minutes(8),
        );
        let purged = store.purge_expired_at(t0 + Duration::minutes(11));
        assert_eq!(purged.len(), 1);
        assert_eq!(purged[0].id, old);
        assert_eq!(purged[0].template_path, PathBuf::from("a.docx"));
        assert!(store.get_at(&fresh, t0 + Duration::minutes(11)).is_some());
    }

    #[test]
    fn updates_and_chat_turns_land_in_the_session() {
        let store = SessionStore::new(Duration::hours(1));
        let id = store.create("Topic", "Subject", sections(), PathBuf::from("t.docx"));
        let changes: SectionSet = [("Objective", "New text")].into_iter().collect();
        assert!(store.update_sections(&id, &changes));
        assert!(store.append_chat_turn(&id, Role::User, "shorter please"));
        assert!(store.append_chat_turn(&id, Role::Assistant, "done"));

        let handle = store.get(&id).expect("session");
        let session = lock_session(&handle);
        assert_eq!(session.sections.get("Objective"), Some("New text"));
        assert_eq!(session.sections.names(), vec!["Objective", "References"]);
        let roles: Vec<Role> = session.chat_history.iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let store = SessionStore::new(Duration::hours(1));
        assert!(store.get("missing").is_none());
        assert!(!store.update_sections("missing", &SectionSet::new()));
        assert!(store.delete("missing").is_none());
    }

    #[test]
    fn delete_returns_final_state() {
        let store = SessionStore::new(Duration::hours(1));
        let id = store.create("Topic", "Subject", sections(), PathBuf::from("t.docx"));
        let session = store.delete(&id).expect("deleted");
        assert_eq!(session.topic, "Topic");
        assert!(store.is_empty());
    }
}
