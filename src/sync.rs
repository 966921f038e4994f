use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{RemoteStore, SessionContext};
use crate::attachments::OutgoingAttachment;
use crate::chat::{ChatMessage, MessageDelta};
use crate::config::TimingConfig;
use crate::logger;
use crate::notify::{Notice, Notifier};
use crate::registry::SharedRegistry;
use crate::reveal::{RevealAnimator, RevealConfig};
use crate::session::ChatSession;
use crate::store::MessageStore;

const SEND_FAILED_TEXT: &str = "No se pudo obtener una respuesta. Inténtalo de nuevo.";

/// Orchestrates the local session view against the authoritative remote
/// store: bulk loads, optimistic creation, the single delayed
/// reconciliation merge, and the message send lifecycle.
///
/// One controller per mounted chat view. Background work is tied to the
/// controller's cancellation token; `delete_all_sessions` (and drop of
/// the token by teardown) stops pending timers, and any late results land
/// as silent no-ops through the message store.
pub struct SyncController {
    registry: SharedRegistry,
    store: MessageStore,
    animator: RevealAnimator,
    client: Arc<dyn RemoteStore>,
    notifier: Arc<dyn Notifier>,
    context: SessionContext,
    reconcile_delay: Duration,
    reconciled: AtomicBool,
    background: CancellationToken,
    next_local_id: AtomicU64,
}

impl SyncController {
    pub fn new(
        registry: SharedRegistry,
        client: Arc<dyn RemoteStore>,
        notifier: Arc<dyn Notifier>,
        context: SessionContext,
        timing: &TimingConfig,
    ) -> Self {
        let store = MessageStore::new(registry.clone());
        let animator = RevealAnimator::new(store.clone(), RevealConfig::from(timing));
        Self {
            registry,
            store,
            animator,
            client,
            notifier,
            context,
            reconcile_delay: timing.reconcile_delay(),
            reconciled: AtomicBool::new(false),
            background: CancellationToken::new(),
            next_local_id: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn store(&self) -> MessageStore {
        self.store.clone()
    }

    fn local_id(&self, prefix: &str) -> String {
        let n = self.next_local_id.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", prefix, n)
    }

    /// Fetches the authoritative list and replaces the registry wholesale.
    /// On failure the registry keeps its previous state and a transient
    /// notice is raised.
    pub async fn load_sessions(&self) -> Result<()> {
        let raws = match self.client.fetch_sessions(&self.context).await {
            Ok(raws) => raws,
            Err(e) => {
                logger::error(&format!("session load failed: {}", e));
                self.notifier
                    .notify(Notice::error("No se pudieron cargar las conversaciones."));
                return Err(e.into());
            }
        };

        let sessions: Vec<ChatSession> = raws
            .into_iter()
            .map(|raw| raw.into_session(self.context.mode))
            .collect();

        let mut registry = self.registry.lock().await;
        registry.replace_all(sessions);
        Ok(())
    }

    /// Creates a session on the server first, then inserts it at the
    /// front and activates it. The server-confirmed id is what makes this
    /// "optimistic" rather than local-only: the record exists remotely
    /// even before the next list fetch shows it.
    pub async fn create_session_optimistic(&self, seed_title: &str) -> Result<String> {
        let id = match self.client.create_session(&self.context, seed_title).await {
            Ok(id) => id,
            Err(e) => {
                logger::error(&format!("session create failed: {}", e));
                self.notifier
                    .notify(Notice::error("No se pudo crear la conversación."));
                return Err(e.into());
            }
        };

        let session = ChatSession::new(id.clone(), seed_title, self.context.mode);
        let mut registry = self.registry.lock().await;
        registry.insert_front(session);
        registry.select(&id);
        Ok(id)
    }

    /// Called when navigation names a session id not present locally.
    /// Synthesizes a stand-in immediately, then — once per controller —
    /// schedules a single delayed re-fetch to merge local-only and remote
    /// state. The merge never drops the named session.
    pub async fn adopt_session(&self, route_id: &str) {
        {
            let mut registry = self.registry.lock().await;
            if registry.select(route_id) {
                return;
            }
            registry.insert_front(ChatSession::synthetic(route_id, self.context.mode));
            registry.select(route_id);
        }

        if self.reconciled.swap(true, Ordering::SeqCst) {
            return;
        }

        let registry = self.registry.clone();
        let client = self.client.clone();
        let context = self.context.clone();
        let delay = self.reconcile_delay;
        let token = self.background.clone();
        let route_id = route_id.to_string();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let raws = match client.fetch_sessions(&context).await {
                Ok(raws) => raws,
                Err(e) => {
                    // Silent beyond the initial load notice; the synthetic
                    // session stays usable.
                    logger::warn(&format!("reconcile re-fetch failed: {}", e));
                    return;
                }
            };

            if token.is_cancelled() {
                return;
            }

            let server_has_it = raws.iter().any(|raw| raw.session_id == route_id);
            let sessions: Vec<ChatSession> = raws
                .into_iter()
                .map(|raw| raw.into_session(context.mode))
                .collect();

            let mut registry = registry.lock().await;
            if server_has_it {
                // Server wins wholesale; it has the authoritative
                // messages and title for the adopted session.
                registry.replace_all(sessions);
                registry.select(&route_id);
            } else {
                // Keep the synthetic session (with whatever was typed
                // into it meanwhile) at the front of the merged list.
                let local = match registry.get(&route_id) {
                    Some(session) => session.clone(),
                    // Deleted while we were waiting; drop the result.
                    None => return,
                };
                let mut merged = vec![local];
                merged.extend(sessions.into_iter().filter(|s| s.id != route_id));
                registry.replace_all(merged);
                registry.select(&route_id);
            }
        });
    }

    /// Renames a session in place; used when a response carries a
    /// server-generated title.
    pub async fn rename_session(&self, id: &str, title: &str) {
        self.registry.lock().await.rename(id, title);
    }

    /// Activates a known session. No fetch.
    pub async fn select_session(&self, id: &str) -> bool {
        self.registry.lock().await.select(id)
    }

    /// Clears everything and cancels in-flight timers. The caller is
    /// expected to follow up with a fresh optimistic create so the UI is
    /// not left without sessions for long.
    pub async fn delete_all_sessions(&self) {
        self.background.cancel();
        self.animator.cancel_all().await;
        self.registry.lock().await.clear();
    }

    /// Full send lifecycle: user message appended resolved, bot
    /// placeholder appended loading, then the placeholder is patched in
    /// place from the response. If the session disappears mid-flight
    /// every patch is a silent no-op.
    pub async fn send_message(
        &self,
        session_id: &str,
        text: &str,
        attachment: Option<OutgoingAttachment>,
    ) -> Result<()> {
        let user_id = self.local_id("local-user");
        let mut user_message = ChatMessage::user(user_id, text);
        user_message.timestamp = Some(Utc::now());
        if let Some(outgoing) = &attachment {
            user_message.attachment = Some(outgoing.meta.clone());
        }
        self.store.append_message(session_id, user_message).await;

        let placeholder_id = self.local_id("local-bot");
        self.store
            .append_message(session_id, ChatMessage::bot_placeholder(&placeholder_id))
            .await;

        let response = match self
            .client
            .send_message(session_id, text, &self.context.user, attachment.as_ref())
            .await
        {
            Ok(response) => response,
            Err(e) => {
                logger::error(&format!("send failed for {}: {}", session_id, e));
                self.notifier
                    .notify(Notice::error("No se pudo enviar el mensaje."));
                self.store
                    .patch_message(session_id, &placeholder_id, MessageDelta::resolved(SEND_FAILED_TEXT))
                    .await;
                return Err(e.into());
            }
        };

        // The last element of the response is the bot's reply.
        match response.messages.into_iter().last() {
            Some(reply) => {
                let delta = MessageDelta {
                    content: Some(reply.text.unwrap_or_default()),
                    is_loading: Some(false),
                    is_reasoning_complete: Some(true),
                    attachment: Some(reply.attachment.map(|a| a.into_meta())),
                    timestamp: reply.timestamp,
                    ..MessageDelta::default()
                };
                self.store
                    .patch_message(session_id, &placeholder_id, delta)
                    .await;
            }
            None => {
                logger::warn(&format!("empty reply for session {}", session_id));
                self.store
                    .patch_message(session_id, &placeholder_id, MessageDelta::resolved(""))
                    .await;
            }
        }

        if let Some(title) = response.title {
            self.registry.lock().await.rename(session_id, &title);
        }
        Ok(())
    }

    /// Appends a bot placeholder and drives it through the staged
    /// reasoning reveal. Returns the message id and the animator task.
    pub async fn simulate_reply(
        &self,
        session_id: &str,
        reasoning: String,
        answer: String,
    ) -> (String, JoinHandle<()>) {
        let message_id = self.local_id("local-bot");
        self.store
            .append_message(session_id, ChatMessage::bot_placeholder(&message_id))
            .await;
        let handle = self
            .animator
            .start(session_id, &message_id, reasoning, answer)
            .await;
        (message_id, handle)
    }

    /// Uploads a document and, on success, re-queries the document list,
    /// refreshing the session's pending files.
    pub async fn upload_document(
        &self,
        session_id: &str,
        file: &OutgoingAttachment,
    ) -> Result<Vec<crate::session::PendingFile>> {
        if let Err(e) = self.client.upload_document(session_id, file).await {
            logger::error(&format!("upload failed for {}: {}", session_id, e));
            self.notifier
                .notify(Notice::error("No se pudo subir el documento."));
            return Err(e.into());
        }

        let documents = self.client.list_documents(session_id).await?;
        let mut registry = self.registry.lock().await;
        if let Some(session) = registry.get_mut(session_id) {
            session.pending_files = documents.clone();
        }
        Ok(documents)
    }

    /// Opaque pass-through to the follow-up suggestion collaborator.
    pub async fn suggest_follow_ups(
        &self,
        topic: &str,
        previous_response: &str,
    ) -> Result<Vec<String>> {
        let questions = self
            .client
            .suggest_follow_ups(topic, previous_response)
            .await?;
        Ok(questions)
    }
}
