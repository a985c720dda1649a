//! Transactions API endpoints

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use engine::{
    AppliedTransaction, EngineError, IngestOutcome, IngestRequest, Money, Outcome, RefundCmd,
    Transaction, VerifyReport,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ServerError, server::ServerState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundBody {
    pub amount: Money,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementBody {
    pub paid: Money,
}

pub(crate) fn parse_id(raw: &str) -> Result<Uuid, ServerError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| EngineError::InvalidId(format!("invalid transaction id: {raw}")).into())
}

/// 201 for a newly applied transfer, 200 for a duplicate submission.
pub async fn ingest(
    State(state): State<ServerState>,
    Json(payload): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestOutcome>), ServerError> {
    let outcome = state.engine.submit(payload).await?;
    let status = match outcome.outcome {
        Outcome::New => StatusCode::CREATED,
        Outcome::Duplicate => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

pub async fn enqueue(
    State(state): State<ServerState>,
    Json(payload): Json<IngestRequest>,
) -> Result<StatusCode, ServerError> {
    let Some(queue) = state.queue.as_ref() else {
        return Err(EngineError::Unavailable("ingest queue is not configured".to_string()).into());
    };
    queue.publish(payload).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn get(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<Json<AppliedTransaction>, ServerError> {
    let id = parse_id(&id)?;
    Ok(Json(state.engine.transaction(id).await?))
}

pub async fn refund(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(payload): Json<RefundBody>,
) -> Result<(StatusCode, Json<AppliedTransaction>), ServerError> {
    let id = parse_id(&id)?;
    let mut cmd = RefundCmd::new(id, payload.amount);
    if let Some(reason) = payload.reason {
        cmd = cmd.reason(reason);
    }
    let applied = state.engine.refund(cmd).await?;
    Ok((StatusCode::CREATED, Json(applied)))
}

pub async fn settle(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(payload): Json<SettlementBody>,
) -> Result<Json<Transaction>, ServerError> {
    let id = parse_id(&id)?;
    Ok(Json(state.engine.partial_settle(id, payload.paid).await?))
}

pub async fn verify(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<Json<VerifyReport>, ServerError> {
    let id = parse_id(&id)?;
    Ok(Json(state.engine.verify(id).await?))
}
