//! Read-through cache contract for resolved idempotency keys.
//!
//! The cache only shortcuts lookups of keys that are already bound in the
//! store. It is never the record of a binding: a miss always falls back to
//! the `idempotency_keys` table, never to re-applying.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use tokio::{sync::RwLock, time::Instant};

use crate::{IngestOutcome, ResultEngine};

#[async_trait]
pub trait OutcomeCache: Send + Sync {
    async fn get(&self, key: &str) -> ResultEngine<Option<IngestOutcome>>;

    async fn set(&self, key: &str, outcome: &IngestOutcome, ttl: Duration) -> ResultEngine<()>;
}

#[derive(Debug)]
struct CachedOutcome {
    outcome: IngestOutcome,
    expires_at: Instant,
}

/// Process-local cache with per-entry expiry.
///
/// Expired entries are dropped lazily on `get` and swept on `set`.
#[derive(Debug, Default)]
pub struct InMemoryOutcomeCache {
    entries: RwLock<HashMap<String, CachedOutcome>>,
}

impl InMemoryOutcomeCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl OutcomeCache for InMemoryOutcomeCache {
    async fn get(&self, key: &str) -> ResultEngine<Option<IngestOutcome>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(cached) if cached.expires_at > now => {
                    return Ok(Some(cached.outcome.clone()));
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }
        let mut entries = self.entries.write().await;
        if entries
            .get(key)
            .is_some_and(|cached| cached.expires_at <= now)
        {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, outcome: &IngestOutcome, ttl: Duration) -> ResultEngine<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, cached| cached.expires_at > now);
        entries.insert(
            key.to_string(),
            CachedOutcome {
                outcome: outcome.clone(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }
}
