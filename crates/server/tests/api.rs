use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use sea_orm::Database;
use serde_json::{Value, json};
use tower::ServiceExt;

use engine::{ChannelQueue, Engine};
use migration::MigratorTrait;
use server::{ServerState, router};

async fn app() -> Router {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder().database(db).build().await.unwrap();
    router(ServerState {
        engine: Arc::new(engine),
        queue: None,
    })
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn ingest_body(key: &str, amount: &str) -> Value {
    json!({
        "transaction": {
            "sourceAccountId": "A",
            "destinationAccountId": "B",
            "amount": amount,
            "metadata": { "orderId": "o-1" }
        },
        "idempotencyKey": key
    })
}

#[tokio::test]
async fn ingest_returns_created_then_ok_for_duplicates() {
    let app = app().await;

    let (status, first) = send(&app, "POST", "/transactions", Some(ingest_body("k-1", "100.00"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["outcome"], "NEW");
    assert_eq!(first["entries"].as_array().unwrap().len(), 2);

    let (status, second) =
        send(&app, "POST", "/transactions", Some(ingest_body("k-1", "100.00"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["outcome"], "DUPLICATE");
    assert_eq!(second["transactionId"], first["transactionId"]);

    let (status, balance) = send(&app, "GET", "/accounts/A/balance", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance["balance"], "-100.00");
    assert_eq!(balance["accountId"], "A");
}

#[tokio::test]
async fn validation_failures_map_to_422() {
    let app = app().await;

    let (status, body) = send(&app, "POST", "/transactions", Some(ingest_body("k-2", "0.00"))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("amount"));

    let (status, _) = send(&app, "POST", "/transactions", Some(ingest_body("", "1.00"))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(&app, "GET", "/transactions/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn transaction_lifecycle_over_http() {
    let app = app().await;
    let (_, created) = send(&app, "POST", "/transactions", Some(ingest_body("k-3", "50.00"))).await;
    let id = created["transactionId"].as_str().unwrap().to_string();

    let (status, fetched) = send(&app, "GET", &format!("/transactions/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["transaction"]["status"], "COMPLETED");
    assert_eq!(fetched["transaction"]["metadata"]["orderId"], "o-1");

    let (status, report) = send(&app, "GET", &format!("/transactions/{id}/verify"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["balanced"], true);

    let (status, settled) = send(
        &app,
        "POST",
        &format!("/transactions/{id}/settlements"),
        Some(json!({ "paid": "20.00" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settled["status"], "PARTIAL");
    assert_eq!(settled["outstanding"], "30.00");

    let (status, _) = send(
        &app,
        "POST",
        &format!("/transactions/{id}/settlements"),
        Some(json!({ "paid": "31.00" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(
        &app,
        "GET",
        &format!("/transactions/{}", uuid::Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn refund_over_http() {
    let app = app().await;
    let (_, created) = send(&app, "POST", "/transactions", Some(ingest_body("k-4", "10.00"))).await;
    let id = created["transactionId"].as_str().unwrap().to_string();

    let (status, refund) = send(
        &app,
        "POST",
        &format!("/transactions/{id}/refund"),
        Some(json!({ "amount": "10.00", "reason": "returned" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(refund["transaction"]["parentTransactionId"], id.as_str());
    let refund_id = refund["transaction"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "POST",
        &format!("/transactions/{refund_id}/refund"),
        Some(json!({ "amount": "1.00" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, balance) = send(&app, "GET", "/accounts/B/balance", None).await;
    assert_eq!(balance["balance"], "0.00");
}

#[tokio::test]
async fn entries_and_reconciliation_over_http() {
    let app = app().await;
    for key in ["e-1", "e-2", "e-3"] {
        send(&app, "POST", "/transactions", Some(ingest_body(key, "1.00"))).await;
    }

    let (status, page) = send(&app, "GET", "/accounts/B/entries?limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["entries"].as_array().unwrap().len(), 2);
    let cursor = page["nextCursor"].as_str().unwrap().to_string();

    let (_, rest) = send(
        &app,
        "GET",
        &format!("/accounts/B/entries?limit=2&cursor={cursor}"),
        None,
    )
    .await;
    assert_eq!(rest["entries"].as_array().unwrap().len(), 1);
    assert!(rest["nextCursor"].is_null());

    let window = json!({ "start": "2000-01-01T00:00:00Z", "end": "2999-01-01T00:00:00Z" });
    let (status, report) = send(&app, "POST", "/accounts/B/reconciliations", Some(window)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(report["balanced"], true);
    assert_eq!(report["transactionCount"], 3);
    assert_eq!(report["actualBalance"], "3.00");

    let (status, reports) = send(&app, "GET", "/accounts/B/reconciliations", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reports.as_array().unwrap().len(), 1);

    let (status, difference) = send(
        &app,
        "GET",
        "/accounts/B/difference?start=2000-01-01T00:00:00Z&end=2999-01-01T00:00:00Z",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(difference["difference"], "0.00");

    let bad = json!({ "start": "2999-01-01T00:00:00Z", "end": "2000-01-01T00:00:00Z" });
    let (status, _) = send(&app, "POST", "/accounts/B/reconciliations", Some(bad)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn enqueue_requires_a_queue() {
    let app = app().await;
    let (status, _) = send(
        &app,
        "POST",
        "/transactions/enqueue",
        Some(ingest_body("q-1", "1.00")),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder().database(db).build().await.unwrap();
    let (queue, mut receiver) = ChannelQueue::new(4);
    let app = router(ServerState {
        engine: Arc::new(engine),
        queue: Some(Arc::new(queue)),
    });

    let (status, _) = send(
        &app,
        "POST",
        "/transactions/enqueue",
        Some(ingest_body("q-1", "1.00")),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let queued = receiver.recv().await.unwrap();
    assert_eq!(queued.idempotency_key, "q-1");
}
