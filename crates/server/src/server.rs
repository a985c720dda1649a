use axum::{
    Router,
    routing::{get, post},
};

use std::sync::Arc;

use crate::{accounts, transactions};
use engine::{Engine, IngestQueue};

#[derive(Clone)]
pub struct ServerState {
    pub engine: Arc<Engine>,
    /// Target of `POST /transactions/enqueue`; `None` disables the route.
    pub queue: Option<Arc<dyn IngestQueue>>,
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/transactions", post(transactions::ingest))
        .route("/transactions/enqueue", post(transactions::enqueue))
        .route("/transactions/{id}", get(transactions::get))
        .route("/transactions/{id}/refund", post(transactions::refund))
        .route("/transactions/{id}/settlements", post(transactions::settle))
        .route("/transactions/{id}/verify", get(transactions::verify))
        .route("/accounts/{id}/balance", get(accounts::balance))
        .route("/accounts/{id}/entries", get(accounts::entries))
        .route(
            "/accounts/{id}/reconciliations",
            post(accounts::reconcile).get(accounts::reconciliations),
        )
        .route("/accounts/{id}/difference", get(accounts::difference))
        .with_state(state)
}

pub async fn run(state: ServerState, addr: &str) {
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("failed to bind server listener on {addr}: {err}");
            return;
        }
    };
    if let Err(err) = run_with_listener(state, listener).await {
        tracing::error!("server failed: {err}");
    }
}

pub async fn run_with_listener(
    state: ServerState,
    listener: tokio::net::TcpListener,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router(state)).await
}

pub fn spawn_with_listener(
    state: ServerState,
    listener: tokio::net::TcpListener,
) -> Result<std::net::SocketAddr, std::io::Error> {
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(err) = run_with_listener(state, listener).await {
            tracing::error!("server failed: {err}");
        }
    });

    Ok(addr)
}
