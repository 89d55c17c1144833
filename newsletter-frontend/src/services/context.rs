//! Per-browser client contexts.
//!
//! Each browser session owns one [`ClientContext`]: its own session manager, the
//! access gate subscribed to it, and a newsletter client bound to it. Contexts
//! live in a [`ContextRegistry`] keyed by an id stored in the browser session.

use crate::models::PersistedSession;
use crate::services::access_gate::AccessGate;
use crate::services::backend_client::BackendClient;
use crate::services::identity_client::IdentityProvider;
use crate::services::metrics::set_active_contexts;
use crate::services::newsletter_client::NewsletterClient;
use crate::services::session_manager::SessionManager;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use uuid::Uuid;

pub struct ClientContext {
    pub id: Uuid,
    pub sessions: Arc<SessionManager>,
    pub gate: Arc<AccessGate>,
    pub newsletters: NewsletterClient,
    last_seen: Mutex<Instant>,
}

impl ClientContext {
    pub fn touch(&self) {
        *self.last_seen_slot() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen_slot().elapsed()
    }

    fn last_seen_slot(&self) -> std::sync::MutexGuard<'_, Instant> {
        self.last_seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct ContextRegistry {
    contexts: DashMap<Uuid, Arc<ClientContext>>,
    provider: Arc<dyn IdentityProvider>,
    backend: Arc<BackendClient>,
    refresh_margin: chrono::Duration,
}

impl ContextRegistry {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        backend: Arc<BackendClient>,
        refresh_margin: chrono::Duration,
    ) -> Self {
        Self {
            contexts: DashMap::new(),
            provider,
            backend,
            refresh_margin,
        }
    }

    /// Look up the context for `id`, creating one when there is none.
    ///
    /// A new context starts restoring `persisted` in the background; its gate
    /// reads `Loading` until that resolves.
    pub fn get_or_create(
        &self,
        id: Option<Uuid>,
        persisted: Option<PersistedSession>,
    ) -> Arc<ClientContext> {
        if let Some(context) = id.and_then(|id| self.get(id)) {
            context.touch();
            return context;
        }

        let id = id.unwrap_or_else(Uuid::new_v4);
        let context = self
            .contexts
            .entry(id)
            .or_insert_with(|| {
                tracing::debug!(
                    context_id = %id,
                    restoring = persisted.is_some(),
                    "Creating client context"
                );
                let context = self.build(id);
                let sessions = Arc::clone(&context.sessions);
                tokio::spawn(async move {
                    sessions.initialize(persisted).await;
                });
                context
            })
            .clone();

        set_active_contexts(self.contexts.len());
        context.touch();
        context
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<ClientContext>> {
        self.contexts.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Drop every context idle for longer than `max_idle`. Returns how many went.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let before = self.contexts.len();
        self.contexts.retain(|_, context| context.idle_for() <= max_idle);
        let evicted = before.saturating_sub(self.contexts.len());

        if evicted > 0 {
            tracing::info!(
                evicted,
                remaining = self.contexts.len(),
                "Evicted idle client contexts"
            );
        }
        set_active_contexts(self.contexts.len());
        evicted
    }

    pub fn spawn_sweeper(self: Arc<Self>, every: Duration, max_idle: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.evict_idle(max_idle);
            }
        })
    }

    fn build(&self, id: Uuid) -> Arc<ClientContext> {
        let sessions = SessionManager::new(Arc::clone(&self.provider), self.refresh_margin);
        let gate = AccessGate::new(Arc::clone(&sessions), self.backend.clone());
        let newsletters = NewsletterClient::new(Arc::clone(&self.backend), Arc::clone(&sessions));

        Arc::new(ClientContext {
            id,
            sessions,
            gate,
            newsletters,
            last_seen: Mutex::new(Instant::now()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendSettings;
    use crate::services::access_gate::AccessLevel;
    use crate::services::testing::FakeProvider;

    fn registry() -> ContextRegistry {
        let backend = BackendClient::new(&BackendSettings {
            base_url: "http://127.0.0.1:9".to_string(),
        });
        ContextRegistry::new(
            Arc::new(FakeProvider::default()),
            Arc::new(backend),
            chrono::Duration::seconds(60),
        )
    }

    #[tokio::test]
    async fn known_id_returns_the_same_context() {
        let registry = registry();
        let first = registry.get_or_create(None, None);

        let again = registry.get_or_create(Some(first.id), None);

        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn new_context_resolves_startup_in_the_background() {
        let registry = registry();
        let context = registry.get_or_create(None, None);

        let level = context.gate.settled(Duration::from_secs(2)).await;

        assert_eq!(level, AccessLevel::Unauthenticated);
    }

    #[tokio::test]
    async fn idle_contexts_are_evicted_and_release_their_gate() {
        let registry = registry();
        let context = registry.get_or_create(None, None);
        let gate = Arc::downgrade(&context.gate);
        drop(context);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let evicted = registry.evict_idle(Duration::from_millis(5));

        assert_eq!(evicted, 1);
        assert!(registry.is_empty());
        assert!(gate.upgrade().is_none());
    }

    #[tokio::test]
    async fn active_contexts_survive_the_sweep() {
        let registry = registry();
        let context = registry.get_or_create(None, None);

        let evicted = registry.evict_idle(Duration::from_secs(60));

        assert_eq!(evicted, 0);
        assert!(registry.get(context.id).is_some());
    }
}
