use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::chat::MessageDelta;
use crate::config::TimingConfig;
use crate::store::MessageStore;

#[derive(Debug, Clone)]
pub struct RevealConfig {
    /// Window for the randomized latency before any output appears.
    pub initial_delay_min: Duration,
    pub initial_delay_max: Duration,
    pub tick: Duration,
    pub chars_per_tick: usize,
}

impl From<&TimingConfig> for RevealConfig {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            initial_delay_min: Duration::from_millis(timing.reveal_initial_delay_min_ms),
            initial_delay_max: Duration::from_millis(timing.reveal_initial_delay_max_ms),
            tick: timing.reveal_tick(),
            chars_per_tick: timing.reveal_chars_per_tick.max(1),
        }
    }
}

impl RevealConfig {
    /// No initial latency, useful for tests and instant replays.
    pub fn immediate(tick: Duration, chars_per_tick: usize) -> Self {
        Self {
            initial_delay_min: Duration::ZERO,
            initial_delay_max: Duration::ZERO,
            tick,
            chars_per_tick: chars_per_tick.max(1),
        }
    }
}

/// Simulates a model thinking then answering: reveals the reasoning text
/// in cumulative character runs on a fixed tick, then one final patch
/// marks the reasoning complete and swaps in the answer.
///
/// At most one run is active per message id; starting a new run for the
/// same id cancels the previous one before its next mutation, so a
/// superseded run never writes again.
pub struct RevealAnimator {
    store: MessageStore,
    config: RevealConfig,
    active: Arc<Mutex<HashMap<String, ActiveRun>>>,
    next_run: Arc<Mutex<u64>>,
}

struct ActiveRun {
    run_id: u64,
    token: CancellationToken,
}

impl RevealAnimator {
    pub fn new(store: MessageStore, config: RevealConfig) -> Self {
        Self {
            store,
            config,
            active: Arc::new(Mutex::new(HashMap::new())),
            next_run: Arc::new(Mutex::new(0)),
        }
    }

    pub async fn start(
        &self,
        session_id: &str,
        message_id: &str,
        reasoning: String,
        answer: String,
    ) -> JoinHandle<()> {
        let token = CancellationToken::new();
        let run_id = {
            let mut next = self.next_run.lock().await;
            *next += 1;
            *next
        };

        {
            let mut active = self.active.lock().await;
            if let Some(previous) = active.insert(
                message_id.to_string(),
                ActiveRun {
                    run_id,
                    token: token.clone(),
                },
            ) {
                previous.token.cancel();
            }
        }

        let store = self.store.clone();
        let config = self.config.clone();
        let active = self.active.clone();
        let session_id = session_id.to_string();
        let message_id = message_id.to_string();

        tokio::spawn(async move {
            run_reveal(&store, &config, &token, &session_id, &message_id, reasoning, answer).await;

            // Drop the bookkeeping entry unless a newer run replaced it.
            let mut map = active.lock().await;
            if map.get(&message_id).map(|run| run.run_id) == Some(run_id) {
                map.remove(&message_id);
            }
        })
    }

    pub async fn cancel(&self, message_id: &str) {
        let mut active = self.active.lock().await;
        if let Some(run) = active.remove(message_id) {
            run.token.cancel();
        }
    }

    /// Cancels every in-flight run; used when sessions are deleted or the
    /// owning view is torn down.
    pub async fn cancel_all(&self) {
        let mut active = self.active.lock().await;
        for (_, run) in active.drain() {
            run.token.cancel();
        }
    }
}

async fn run_reveal(
    store: &MessageStore,
    config: &RevealConfig,
    token: &CancellationToken,
    session_id: &str,
    message_id: &str,
    reasoning: String,
    answer: String,
) {
    let initial = initial_delay(config);
    tokio::select! {
        _ = token.cancelled() => return,
        _ = tokio::time::sleep(initial) => {}
    }

    // Cumulative prefixes on character boundaries; byte slicing would
    // split multi-byte text.
    let boundaries: Vec<usize> = reasoning
        .char_indices()
        .map(|(i, _)| i)
        .skip(config.chars_per_tick)
        .step_by(config.chars_per_tick)
        .chain(std::iter::once(reasoning.len()))
        .collect();

    for end in boundaries {
        // The cancellation flag is observed before each mutation, with no
        // suspension between the check and the patch.
        if token.is_cancelled() {
            return;
        }
        store
            .patch_message(
                session_id,
                message_id,
                MessageDelta {
                    reasoning: Some(reasoning[..end].to_string()),
                    ..MessageDelta::default()
                },
            )
            .await;

        if end == reasoning.len() {
            break;
        }
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(config.tick) => {}
        }
    }

    if token.is_cancelled() {
        return;
    }
    store
        .patch_message(
            session_id,
            message_id,
            MessageDelta {
                content: Some(answer),
                is_reasoning_complete: Some(true),
                is_loading: Some(false),
                ..MessageDelta::default()
            },
        )
        .await;
}

fn initial_delay(config: &RevealConfig) -> Duration {
    let min = config.initial_delay_min.as_millis() as u64;
    let max = config.initial_delay_max.as_millis() as u64;
    if max <= min {
        return Duration::from_millis(min);
    }
    Duration::from_millis(fastrand::u64(min..=max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatMessage;
    use crate::registry::SessionRegistry;
    use crate::session::{ChatSession, SessionMode};

    async fn setup() -> (crate::registry::SharedRegistry, MessageStore) {
        let registry = SessionRegistry::shared();
        {
            let mut guard = registry.lock().await;
            let mut session = ChatSession::new("s1", "t", SessionMode::General);
            session.messages.push(ChatMessage::bot_placeholder("m1"));
            guard.insert_front(session);
        }
        let store = MessageStore::new(registry.clone());
        (registry, store)
    }

    async fn message(registry: &crate::registry::SharedRegistry) -> ChatMessage {
        registry.lock().await.get("s1").unwrap().messages[0].clone()
    }

    #[tokio::test(start_paused = true)]
    async fn reveals_then_completes() {
        let (registry, store) = setup().await;
        let animator = RevealAnimator::new(
            store,
            RevealConfig::immediate(Duration::from_millis(80), 1),
        );

        let handle = animator
            .start("s1", "m1", "abc".to_string(), "la respuesta".to_string())
            .await;
        handle.await.unwrap();

        let final_message = message(&registry).await;
        assert_eq!(final_message.reasoning.as_deref(), Some("abc"));
        assert!(final_message.is_reasoning_complete);
        assert!(!final_message.is_loading);
        assert_eq!(final_message.content, "la respuesta");
    }

    #[tokio::test(start_paused = true)]
    async fn reveals_cumulative_prefixes_tick_by_tick() {
        let (registry, store) = setup().await;
        let animator = RevealAnimator::new(
            store,
            RevealConfig::immediate(Duration::from_millis(80), 1),
        );

        let handle = animator
            .start("s1", "m1", "abc".to_string(), "fin".to_string())
            .await;

        let mut seen: Vec<String> = Vec::new();
        for _ in 0..8 {
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
            let current = message(&registry).await;
            if let Some(reasoning) = current.reasoning {
                if seen.last() != Some(&reasoning) {
                    seen.push(reasoning);
                }
            }
            if current.is_reasoning_complete {
                break;
            }
            tokio::time::sleep(Duration::from_millis(80)).await;
        }
        handle.await.unwrap();

        assert_eq!(seen, vec!["a", "ab", "abc"]);
        let final_message = message(&registry).await;
        assert_eq!(final_message.content, "fin");
        assert!(final_message.is_reasoning_complete);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_supersedes_previous_run() {
        let (registry, store) = setup().await;
        let animator = RevealAnimator::new(
            store,
            RevealConfig::immediate(Duration::from_millis(80), 1),
        );

        let first = animator
            .start("s1", "m1", "XXXXXXXXXXXXXXXXXXXX".to_string(), "first".to_string())
            .await;
        // Let the first run get a few ticks in.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let second = animator
            .start("s1", "m1", "abc".to_string(), "second".to_string())
            .await;
        first.await.unwrap();
        second.await.unwrap();

        let final_message = message(&registry).await;
        // Only the second run's writes are observable at the end.
        assert_eq!(final_message.reasoning.as_deref(), Some("abc"));
        assert_eq!(final_message.content, "second");
        assert!(final_message.is_reasoning_complete);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_stops_pending_ticks() {
        let (registry, store) = setup().await;
        let animator = RevealAnimator::new(
            store,
            RevealConfig::immediate(Duration::from_millis(80), 1),
        );

        let handle = animator
            .start("s1", "m1", "abcdefghij".to_string(), "never".to_string())
            .await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        animator.cancel_all().await;
        handle.await.unwrap();

        let final_message = message(&registry).await;
        assert!(!final_message.is_reasoning_complete);
        assert!(final_message.is_loading);
        assert_ne!(final_message.content, "never");
    }

    #[tokio::test(start_paused = true)]
    async fn stale_session_reveal_is_silent() {
        let (registry, store) = setup().await;
        registry.lock().await.clear();
        let animator = RevealAnimator::new(
            store,
            RevealConfig::immediate(Duration::from_millis(80), 1),
        );

        let handle = animator
            .start("s1", "m1", "abc".to_string(), "x".to_string())
            .await;
        handle.await.unwrap();
        assert!(registry.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn multibyte_reasoning_stays_on_char_boundaries() {
        let (registry, store) = setup().await;
        let animator = RevealAnimator::new(
            store,
            RevealConfig::immediate(Duration::from_millis(80), 2),
        );

        let handle = animator
            .start("s1", "m1", "señal médica".to_string(), "ok".to_string())
            .await;
        handle.await.unwrap();

        let final_message = message(&registry).await;
        assert_eq!(final_message.reasoning.as_deref(), Some("señal médica"));
        assert_eq!(final_message.content, "ok");
    }
}
