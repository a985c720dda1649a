use std::{sync::Arc, time::Duration};

use engine::{
    ChannelQueue, Engine, InMemoryOutcomeCache, IngestWorker, ReconciliationScheduler,
    TracingEvents,
};
use migration::{Migrator, MigratorTrait};
use server::ServerState;

mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;
    let mut tasks = tokio::task::JoinSet::new();

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "ledgerd={level},server={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    let db = connect_database(&settings.database).await?;
    let mut builder = Engine::builder()
        .database(db)
        .events(Arc::new(TracingEvents))
        .cache_ttl(Duration::from_secs(settings.cache.ttl_secs));
    if settings.cache.ttl_secs > 0 {
        builder = builder.cache(Arc::new(InMemoryOutcomeCache::new()));
    }
    let engine = builder.build().await?;

    if let Some(reconciliation) = settings.reconciliation {
        tracing::info!(
            accounts = reconciliation.accounts.len(),
            interval_secs = reconciliation.interval_secs,
            "Found reconciliation settings..."
        );
        let scheduler = ReconciliationScheduler::new(
            engine.clone(),
            reconciliation.accounts,
            Duration::from_secs(reconciliation.interval_secs),
        );
        tasks.spawn(scheduler.run());
    }

    if let Some(server) = settings.server {
        tracing::info!("Found server settings...");
        let (queue, receiver) = ChannelQueue::new(settings.ingest.queue_capacity);
        let worker = IngestWorker::new(engine.clone(), receiver).workers(settings.ingest.workers);
        tasks.spawn(worker.run());

        let state = ServerState {
            engine: Arc::new(engine),
            queue: Some(Arc::new(queue)),
        };
        let bind = server.bind.unwrap_or_else(|| "127.0.0.1".to_string());
        let addr = format!("{}:{}", bind, server.port);
        tasks.spawn(async move { server::run(state, &addr).await });
    }

    if tasks.is_empty() {
        tracing::warn!("neither server nor reconciliation configured, nothing to do");
    }

    while tasks.join_next().await.is_some() {
        tasks.shutdown().await;
    }

    Ok(())
}

async fn connect_database(
    config: &settings::Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let database = sea_orm::Database::connect(config.url.as_str()).await?;
    Migrator::up(&database, None).await?;
    tracing::info!("database ready");
    Ok(database)
}
