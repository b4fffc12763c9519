//! In-memory registry of live authentication contexts.

use std::sync::Arc;

use ca_core::SessionConfig;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::context::AuthenticationContext;

/// A context shared between request handlers.
///
/// The mutex gives one flow at a time exclusive access to its context.
pub type SharedContext = Arc<Mutex<AuthenticationContext>>;

#[derive(Debug)]
struct Entry {
    context: SharedContext,
    cancel: CancellationToken,
}

/// Live contexts keyed by session ID.
#[derive(Debug, Default)]
pub struct ContextRegistry {
    contexts: DashMap<Uuid, Entry>,
    session: SessionConfig,
}

impl ContextRegistry {
    /// Creates an empty registry expiring contexts per `session`.
    #[must_use]
    pub fn new(session: SessionConfig) -> Self {
        Self {
            contexts: DashMap::new(),
            session,
        }
    }

    /// Registers a context and returns its shared handle.
    pub fn insert(&self, context: AuthenticationContext) -> SharedContext {
        let id = context.id();
        let cancel = context.cancellation_token();
        let shared = Arc::new(Mutex::new(context));
        self.contexts.insert(
            id,
            Entry {
                context: Arc::clone(&shared),
                cancel,
            },
        );
        tracing::debug!(session_id = %id, "authentication context registered");
        shared
    }

    /// Gets a context by session ID.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<SharedContext> {
        self.contexts.get(&id).map(|entry| Arc::clone(&entry.context))
    }

    /// Removes a context without cancelling it.
    pub fn remove(&self, id: Uuid) -> Option<SharedContext> {
        self.contexts.remove(&id).map(|(_, entry)| entry.context)
    }

    /// Cancels a context's running flow and removes it.
    ///
    /// Returns `false` if no context has this ID.
    pub fn invalidate(&self, id: Uuid) -> bool {
        let Some((_, entry)) = self.contexts.remove(&id) else {
            return false;
        };
        entry.cancel.cancel();
        tracing::info!(session_id = %id, "authentication context invalidated");
        true
    }

    /// Removes finished and expired contexts. Contexts whose flow is
    /// currently running are left alone.
    ///
    /// Returns the number of contexts removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.contexts.len();
        self.contexts.retain(|_, entry| match entry.context.try_lock() {
            Ok(ctx) => !(ctx.is_finished() || ctx.is_expired(&self.session, now)),
            Err(_) => true,
        });
        let removed = before.saturating_sub(self.contexts.len());
        if removed > 0 {
            tracing::debug!(removed, "purged authentication contexts");
        }
        removed
    }

    /// Number of live contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Checks if no context is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::definition::FlowDefinition;

    fn context() -> AuthenticationContext {
        let flow = FlowDefinition::new("browser").with_step("basic", "LOCAL");
        AuthenticationContext::new(Arc::new(flow), None, Utc::now())
    }

    #[test]
    fn insert_and_get() {
        let registry = ContextRegistry::default();
        let ctx = context();
        let id = ctx.id();
        registry.insert(ctx);

        assert_eq!(registry.len(), 1);
        assert!(registry.get(id).is_some());
        assert!(registry.get(Uuid::now_v7()).is_none());
        assert!(registry.remove(id).is_some());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn invalidate_cancels_flow() {
        let registry = ContextRegistry::default();
        let ctx = context();
        let id = ctx.id();
        let shared = registry.insert(ctx);

        assert!(registry.invalidate(id));
        assert!(!registry.invalidate(id));
        assert!(shared.lock().await.cancellation_token().is_cancelled());
    }

    #[tokio::test]
    async fn purge_skips_busy_contexts() {
        let registry = ContextRegistry::new(SessionConfig {
            idle_timeout_secs: 60,
            max_lifespan_secs: 600,
        });
        registry.insert(context());
        registry.insert(context());
        let busy = registry.insert(context());
        let later = Utc::now() + Duration::seconds(120);

        assert_eq!(registry.purge_expired(Utc::now()), 0);

        let guard = busy.lock().await;
        assert_eq!(registry.purge_expired(later), 2);
        assert_eq!(registry.len(), 1);
        drop(guard);

        assert_eq!(registry.purge_expired(later), 1);
        assert!(registry.is_empty());
    }
}
