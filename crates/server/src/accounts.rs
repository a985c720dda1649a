//! Account balance, history and reconciliation endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use engine::{BalanceDifference, EntryPage, EntryWindow, Money, ReconciliationReport};
use serde::{Deserialize, Serialize};

use crate::{ServerError, server::ServerState};

const DEFAULT_ENTRIES_LIMIT: u64 = 50;
const DEFAULT_REPORTS_LIMIT: u64 = 20;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceView {
    pub account_id: String,
    pub balance: Money,
}

#[derive(Debug, Deserialize)]
pub struct EntriesQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
    pub cursor: Option<String>,
}

/// Reconciliation window, used both as body and as query string.
#[derive(Debug, Deserialize)]
pub struct WindowParams {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ReportsQuery {
    pub limit: Option<u64>,
}

pub async fn balance(
    State(state): State<ServerState>,
    Path(account_id): Path<String>,
) -> Result<Json<BalanceView>, ServerError> {
    let balance = state.engine.balance_of(&account_id).await?;
    Ok(Json(BalanceView {
        account_id: account_id.trim().to_string(),
        balance,
    }))
}

pub async fn entries(
    State(state): State<ServerState>,
    Path(account_id): Path<String>,
    Query(query): Query<EntriesQuery>,
) -> Result<Json<EntryPage>, ServerError> {
    let window = EntryWindow {
        from: query.from,
        to: query.to,
    };
    let page = state
        .engine
        .history_of(
            &account_id,
            window,
            query.limit.unwrap_or(DEFAULT_ENTRIES_LIMIT),
            query.cursor.as_deref(),
        )
        .await?;
    Ok(Json(page))
}

pub async fn reconcile(
    State(state): State<ServerState>,
    Path(account_id): Path<String>,
    Json(window): Json<WindowParams>,
) -> Result<(StatusCode, Json<ReconciliationReport>), ServerError> {
    let report = state
        .engine
        .reconcile(&account_id, window.start, window.end)
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

pub async fn reconciliations(
    State(state): State<ServerState>,
    Path(account_id): Path<String>,
    Query(query): Query<ReportsQuery>,
) -> Result<Json<Vec<ReconciliationReport>>, ServerError> {
    let reports = state
        .engine
        .reconciliation_history(&account_id, query.limit.unwrap_or(DEFAULT_REPORTS_LIMIT))
        .await?;
    Ok(Json(reports))
}

pub async fn difference(
    State(state): State<ServerState>,
    Path(account_id): Path<String>,
    Query(window): Query<WindowParams>,
) -> Result<Json<BalanceDifference>, ServerError> {
    let difference = state
        .engine
        .difference_of(&account_id, window.start, window.end)
        .await?;
    Ok(Json(difference))
}
