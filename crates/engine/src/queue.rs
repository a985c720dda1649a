//! Asynchronous ingest path.
//!
//! Producers publish [`IngestRequest`]s; an [`IngestWorker`] pool drains them
//! through [`Engine::submit`]. Redelivery is harmless: the worker goes
//! through the same idempotency gate as the synchronous path, so a request
//! seen twice is applied once.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinSet,
};

use crate::util::validate_idempotency_key;
use crate::{Engine, EngineError, IngestRequest, ResultEngine};

#[async_trait]
pub trait IngestQueue: Send + Sync {
    async fn publish(&self, request: IngestRequest) -> ResultEngine<()>;
}

/// In-process queue backed by a bounded tokio channel.
#[derive(Clone, Debug)]
pub struct ChannelQueue {
    sender: mpsc::Sender<IngestRequest>,
}

impl ChannelQueue {
    /// Creates the queue and the receiving end to hand to an
    /// [`IngestWorker`].
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<IngestRequest>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl IngestQueue for ChannelQueue {
    async fn publish(&self, request: IngestRequest) -> ResultEngine<()> {
        validate_idempotency_key(&request.idempotency_key)?;
        self.sender
            .send(request)
            .await
            .map_err(|_| EngineError::Unavailable("ingest queue is closed".to_string()))
    }
}

pub struct IngestWorker {
    engine: Engine,
    receiver: Arc<Mutex<mpsc::Receiver<IngestRequest>>>,
    workers: usize,
    max_attempts: u32,
    backoff: Duration,
}

impl IngestWorker {
    pub fn new(engine: Engine, receiver: mpsc::Receiver<IngestRequest>) -> Self {
        Self {
            engine,
            receiver: Arc::new(Mutex::new(receiver)),
            workers: 1,
            max_attempts: 5,
            backoff: Duration::from_millis(100),
        }
    }

    /// Number of concurrent consumers.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Attempts per request for retryable failures, and the base delay
    /// (doubled on each attempt).
    #[must_use]
    pub fn retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Consumes requests until every producer is dropped and the queue is
    /// drained.
    pub async fn run(self) {
        let mut set = JoinSet::new();
        for worker in 0..self.workers {
            let engine = self.engine.clone();
            let receiver = Arc::clone(&self.receiver);
            let max_attempts = self.max_attempts;
            let backoff = self.backoff;
            set.spawn(async move {
                loop {
                    let next = receiver.lock().await.recv().await;
                    let Some(request) = next else {
                        break;
                    };
                    process(&engine, request, max_attempts, backoff).await;
                }
                tracing::debug!(worker, "ingest worker stopped");
            });
        }
        while let Some(joined) = set.join_next().await {
            if let Err(err) = joined {
                tracing::error!("ingest worker panicked: {err}");
            }
        }
    }
}

async fn process(engine: &Engine, request: IngestRequest, max_attempts: u32, backoff: Duration) {
    let mut delay = backoff;
    for attempt in 1..=max_attempts {
        match engine.submit(request.clone()).await {
            Ok(outcome) => {
                tracing::debug!(
                    key = %request.idempotency_key,
                    outcome = ?outcome.outcome,
                    transaction_id = %outcome.transaction_id,
                    "queued request processed"
                );
                return;
            }
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                tracing::warn!(
                    key = %request.idempotency_key,
                    attempt,
                    "queued request failed, retrying: {err}"
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(err) => {
                tracing::error!(
                    key = %request.idempotency_key,
                    attempt,
                    "queued request dropped: {err}"
                );
                return;
            }
        }
    }
}
