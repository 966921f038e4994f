use std::sync::Arc;

use tokio::sync::Mutex;

use crate::session::ChatSession;

/// Registry shared between the controller, the message store and the
/// reveal animator. Locked only for synchronous mutation; guards are
/// never held across await points.
pub type SharedRegistry = Arc<Mutex<SessionRegistry>>;

/// Owns every session and the active-session invariant: the active id
/// always names a session present in the list, or is `None`.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Vec<ChatSession>,
    active_id: Option<String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRegistry {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn active_session(&self) -> Option<&ChatSession> {
        let id = self.active_id.as_deref()?;
        self.get(id)
    }

    pub fn get(&self, id: &str) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ChatSession> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Inserts at the front of the list. The most recently created
    /// session always leads the sidebar ordering.
    pub fn insert_front(&mut self, session: ChatSession) {
        self.sessions.insert(0, session);
    }

    /// Wholesale replacement with an authoritative list. The active id
    /// survives if the new list still contains it; otherwise it is
    /// cleared and the caller decides what becomes active.
    pub fn replace_all(&mut self, sessions: Vec<ChatSession>) {
        self.sessions = sessions;
        if let Some(active) = self.active_id.clone() {
            if !self.contains(&active) {
                self.active_id = None;
            }
        }
    }

    /// Sets the active session. Unknown ids are rejected so the active
    /// pointer can never dangle.
    pub fn select(&mut self, id: &str) -> bool {
        if self.contains(id) {
            self.active_id = Some(id.to_string());
            true
        } else {
            false
        }
    }

    /// In-place title mutation, used when the server returns a generated
    /// title alongside a message response. Missing id is a no-op.
    pub fn rename(&mut self, id: &str, title: impl Into<String>) {
        if let Some(session) = self.get_mut(id) {
            session.title = title.into();
        }
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
        self.active_id = None;
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionMode;

    fn session(id: &str) -> ChatSession {
        ChatSession::new(id, format!("title-{}", id), SessionMode::General)
    }

    #[test]
    fn insert_front_keeps_newest_first() {
        let mut registry = SessionRegistry::new();
        registry.insert_front(session("a"));
        registry.insert_front(session("b"));
        let ids: Vec<_> = registry.sessions().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn select_rejects_unknown_id() {
        let mut registry = SessionRegistry::new();
        registry.insert_front(session("a"));
        assert!(!registry.select("missing"));
        assert_eq!(registry.active_id(), None);
        assert!(registry.select("a"));
        assert_eq!(registry.active_id(), Some("a"));
    }

    #[test]
    fn replace_all_preserves_surviving_active_id() {
        let mut registry = SessionRegistry::new();
        registry.insert_front(session("a"));
        registry.insert_front(session("b"));
        registry.select("a");

        registry.replace_all(vec![session("a"), session("c")]);
        assert_eq!(registry.active_id(), Some("a"));

        registry.replace_all(vec![session("c")]);
        assert_eq!(registry.active_id(), None);
    }

    #[test]
    fn rename_mutates_in_place_and_ignores_missing() {
        let mut registry = SessionRegistry::new();
        registry.insert_front(session("a"));
        registry.rename("a", "Consulta de Juan");
        registry.rename("missing", "ignored");
        assert_eq!(registry.get("a").map(|s| s.title.as_str()), Some("Consulta de Juan"));
    }

    #[test]
    fn clear_drops_sessions_and_active_id() {
        let mut registry = SessionRegistry::new();
        registry.insert_front(session("a"));
        registry.select("a");
        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.active_id(), None);
    }
}
