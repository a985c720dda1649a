use std::{sync::Arc, time::Duration};

use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};

use engine::{
    ChannelQueue, Engine, EngineError, InMemoryOutcomeCache, IngestQueue, IngestRequest,
    IngestWorker, Money, Outcome, OutcomeCache, TransferRequest,
};
use migration::MigratorTrait;

async fn connect() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    db
}

async fn engine_with_db() -> (Engine, DatabaseConnection) {
    let db = connect().await;
    let engine = Engine::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();
    (engine, db)
}

async fn count_rows(db: &DatabaseConnection, table: &str) -> i64 {
    let row = db
        .query_one(Statement::from_string(
            db.get_database_backend(),
            format!("SELECT COUNT(*) AS n FROM {table}"),
        ))
        .await
        .unwrap()
        .unwrap();
    row.try_get::<i64>("", "n").unwrap()
}

fn request(key: &str, amount: &str) -> IngestRequest {
    IngestRequest {
        transaction: TransferRequest {
            source_account_id: "A".to_string(),
            destination_account_id: "B".to_string(),
            amount: amount.parse().unwrap(),
            metadata: Default::default(),
        },
        idempotency_key: key.to_string(),
    }
}

#[tokio::test]
async fn repeated_submissions_apply_once() {
    let (engine, db) = engine_with_db().await;

    let first = engine.submit(request("req-1", "100.00")).await.unwrap();
    assert_eq!(first.outcome, Outcome::New);
    assert_eq!(first.entries.len(), 2);

    for _ in 0..4 {
        let again = engine.submit(request("req-1", "100.00")).await.unwrap();
        assert_eq!(again.outcome, Outcome::Duplicate);
        assert_eq!(again.transaction_id, first.transaction_id);
        assert_eq!(again.entries, first.entries);
    }

    assert_eq!(count_rows(&db, "transactions").await, 1);
    assert_eq!(count_rows(&db, "ledger_entries").await, 2);
    assert_eq!(count_rows(&db, "idempotency_keys").await, 1);
    assert_eq!(
        engine.balance_of("A").await.unwrap(),
        "-100.00".parse::<Money>().unwrap()
    );

    let record = engine.idempotency_record("req-1").await.unwrap().unwrap();
    assert_eq!(record.transaction_id, first.transaction_id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_yield_a_single_new_outcome() {
    let (engine, db) = engine_with_db().await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.submit(request("race-key", "12.34")).await
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap().unwrap());
    }

    let new_count = outcomes
        .iter()
        .filter(|o| o.outcome == Outcome::New)
        .count();
    assert_eq!(new_count, 1);
    let id = outcomes[0].transaction_id;
    assert!(outcomes.iter().all(|o| o.transaction_id == id));

    assert_eq!(count_rows(&db, "transactions").await, 1);
    assert_eq!(count_rows(&db, "ledger_entries").await, 2);
}

#[tokio::test]
async fn reused_key_with_other_payload_returns_first_transaction() {
    let (engine, db) = engine_with_db().await;
    let first = engine.submit(request("req-9", "1.00")).await.unwrap();
    let other = engine.submit(request("req-9", "999.00")).await.unwrap();

    assert_eq!(other.outcome, Outcome::Duplicate);
    assert_eq!(other.transaction_id, first.transaction_id);
    assert_eq!(count_rows(&db, "transactions").await, 1);
    assert_eq!(
        engine.balance_of("B").await.unwrap(),
        "1.00".parse::<Money>().unwrap()
    );
}

#[tokio::test]
async fn invalid_keys_and_payloads_write_nothing() {
    let (engine, db) = engine_with_db().await;

    let err = engine.submit(request("   ", "1.00")).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidKey(_)));

    let long_key = "k".repeat(256);
    let err = engine.submit(request(&long_key, "1.00")).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidKey(_)));

    let err = engine.submit(request("req-0", "0.00")).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount(_)));

    assert_eq!(count_rows(&db, "transactions").await, 0);
    assert_eq!(count_rows(&db, "idempotency_keys").await, 0);

    // The key of a rejected request stays free.
    let accepted = engine.submit(request("req-0", "0.01")).await.unwrap();
    assert_eq!(accepted.outcome, Outcome::New);
}

#[tokio::test]
async fn padded_key_is_not_an_alias() {
    let (engine, db) = engine_with_db().await;
    engine.submit(request("req-7", "1.00")).await.unwrap();

    for key in [" req-7", "req-7 "] {
        let err = engine.submit(request(key, "1.00")).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidKey(_)));
    }
    assert_eq!(count_rows(&db, "transactions").await, 1);
    assert_eq!(count_rows(&db, "idempotency_keys").await, 1);
}

#[tokio::test]
async fn cache_serves_resolved_keys() {
    let db = connect().await;
    let cache = Arc::new(InMemoryOutcomeCache::new());
    let engine = Engine::builder()
        .database(db.clone())
        .cache(cache.clone())
        .cache_ttl(Duration::from_secs(60))
        .build()
        .await
        .unwrap();

    let first = engine.submit(request("cached", "3.00")).await.unwrap();
    assert_eq!(first.outcome, Outcome::New);
    let cached = cache.get("cached").await.unwrap().unwrap();
    assert_eq!(cached.transaction_id, first.transaction_id);

    let again = engine.submit(request("cached", "3.00")).await.unwrap();
    assert_eq!(again.outcome, Outcome::Duplicate);
    assert_eq!(again.transaction_id, first.transaction_id);
    assert_eq!(count_rows(&db, "transactions").await, 1);
}

#[tokio::test]
async fn store_binding_wins_over_an_empty_cache() {
    let db = connect().await;
    let plain = Engine::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();
    let first = plain.submit(request("cold", "2.00")).await.unwrap();

    // A fresh cache knows nothing about the key; the store still does.
    let cached = Engine::builder()
        .database(db.clone())
        .cache(Arc::new(InMemoryOutcomeCache::new()))
        .build()
        .await
        .unwrap();
    let again = cached.submit(request("cold", "2.00")).await.unwrap();
    assert_eq!(again.outcome, Outcome::Duplicate);
    assert_eq!(again.transaction_id, first.transaction_id);
    assert_eq!(count_rows(&db, "transactions").await, 1);
}

#[tokio::test]
async fn queue_worker_drains_and_deduplicates() {
    let (engine, db) = engine_with_db().await;
    let (queue, receiver) = ChannelQueue::new(16);
    let worker = IngestWorker::new(engine.clone(), receiver)
        .workers(3)
        .retry(2, Duration::from_millis(1));
    let running = tokio::spawn(worker.run());

    queue.publish(request("q-1", "1.00")).await.unwrap();
    queue.publish(request("q-2", "2.00")).await.unwrap();
    queue.publish(request("q-1", "1.00")).await.unwrap();
    queue.publish(request("q-3", "3.00")).await.unwrap();

    let err = queue.publish(request("", "1.00")).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidKey(_)));

    drop(queue);
    running.await.unwrap();

    assert_eq!(count_rows(&db, "transactions").await, 3);
    assert_eq!(
        engine.balance_of("B").await.unwrap(),
        "6.00".parse::<Money>().unwrap()
    );
}

#[tokio::test]
async fn closed_queue_is_unavailable() {
    let (queue, receiver) = ChannelQueue::new(1);
    drop(receiver);
    let err = queue.publish(request("q-1", "1.00")).await.unwrap_err();
    assert!(matches!(err, EngineError::Unavailable(_)));
    assert!(err.is_retryable());
}
