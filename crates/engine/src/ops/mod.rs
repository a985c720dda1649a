use std::{fmt, sync::Arc, time::Duration};

use sea_orm::DatabaseConnection;

use crate::{EngineError, NoopEvents, OutcomeCache, ReconciliationEvents, ResultEngine};

mod balances;
mod idempotency;
mod reconciliation;
mod transactions;

pub use balances::EntryPage;

/// Default lifetime of a cached ingest outcome.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

/// Handle to the ledger. Cheap to clone: clones share the connection pool,
/// cache and event sink.
#[derive(Clone)]
pub struct Engine {
    database: DatabaseConnection,
    cache: Option<Arc<dyn OutcomeCache>>,
    cache_ttl: Duration,
    events: Arc<dyn ReconciliationEvents>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("database", &self.database)
            .field("cache", &self.cache.is_some())
            .field("cache_ttl", &self.cache_ttl)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }
}

/// The builder for `Engine`
pub struct EngineBuilder {
    database: Option<DatabaseConnection>,
    cache: Option<Arc<dyn OutcomeCache>>,
    cache_ttl: Duration,
    events: Arc<dyn ReconciliationEvents>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            database: None,
            cache: None,
            cache_ttl: DEFAULT_CACHE_TTL,
            events: Arc::new(NoopEvents),
        }
    }
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = Some(db);
        self
    }

    /// Read-through cache for resolved idempotency keys. Without one every
    /// lookup goes to the store.
    pub fn cache(mut self, cache: Arc<dyn OutcomeCache>) -> EngineBuilder {
        self.cache = Some(cache);
        self
    }

    /// Lifetime of cached outcomes. `Duration::ZERO` disables caching.
    pub fn cache_ttl(mut self, ttl: Duration) -> EngineBuilder {
        self.cache_ttl = ttl;
        self
    }

    /// Sink for reconciliation progress and completion events.
    pub fn events(mut self, events: Arc<dyn ReconciliationEvents>) -> EngineBuilder {
        self.events = events;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        let database = self
            .database
            .ok_or_else(|| EngineError::Unavailable("database connection is required".to_string()))?;
        let cache = self.cache.filter(|_| !self.cache_ttl.is_zero());
        Ok(Engine {
            database,
            cache,
            cache_ttl: self.cache_ttl,
            events: self.events,
        })
    }
}
