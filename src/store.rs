use crate::chat::{ChatMessage, MessageDelta};
use crate::registry::SharedRegistry;

/// Cheap-to-clone handle for appending and patching messages through the
/// shared registry. Stale targets (a session or message that no longer
/// exists) are silent no-ops so late timers and responses can never fail.
#[derive(Clone)]
pub struct MessageStore {
    registry: SharedRegistry,
}

impl MessageStore {
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry }
    }

    /// Appends at the end of the session's message sequence. Messages are
    /// never reordered or deduplicated; id uniqueness within a session is
    /// the caller's responsibility.
    pub async fn append_message(&self, session_id: &str, message: ChatMessage) {
        let mut registry = self.registry.lock().await;
        if let Some(session) = registry.get_mut(session_id) {
            session.messages.push(message);
        }
    }

    /// Merges the delta into the first message with a matching id.
    pub async fn patch_message(&self, session_id: &str, message_id: &str, delta: MessageDelta) {
        let mut registry = self.registry.lock().await;
        if let Some(session) = registry.get_mut(session_id) {
            if let Some(message) = session.messages.iter_mut().find(|m| m.id == message_id) {
                delta.apply_to(message);
            }
        }
    }

    pub async fn message_count(&self, session_id: &str) -> usize {
        let registry = self.registry.lock().await;
        registry.get(session_id).map(|s| s.messages.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SessionRegistry;
    use crate::session::{ChatSession, SessionMode};

    async fn store_with_session(id: &str) -> MessageStore {
        let registry = SessionRegistry::shared();
        registry
            .lock()
            .await
            .insert_front(ChatSession::new(id, "t", SessionMode::General));
        MessageStore::new(registry)
    }

    #[tokio::test]
    async fn append_to_missing_session_is_noop() {
        let store = store_with_session("s1").await;
        store.append_message("gone", ChatMessage::user("m1", "hola")).await;
        assert_eq!(store.message_count("gone").await, 0);
        assert_eq!(store.message_count("s1").await, 0);
    }

    #[tokio::test]
    async fn patch_missing_message_is_noop() {
        let store = store_with_session("s1").await;
        store.append_message("s1", ChatMessage::user("m1", "hola")).await;
        store
            .patch_message("s1", "nope", MessageDelta::resolved("x"))
            .await;
        store
            .patch_message("gone", "m1", MessageDelta::resolved("x"))
            .await;
        assert_eq!(store.message_count("s1").await, 1);
    }
}
