//! Reconciliation reports.
//!
//! A report is the append-only outcome of cross-checking, for one account and
//! one window, the balance derived from ledger entries against the balance
//! derived from the transaction log. Discrepancies are stored as a JSON array
//! in the same row so the report is written in a single insert.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::parse_uuid;
use crate::{EngineError, LedgerEntry, Money, Transaction};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscrepancyKind {
    MissingLedgerEntry,
    AmountMismatch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    High,
    Critical,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discrepancy {
    pub kind: DiscrepancyKind,
    pub transaction_id: Uuid,
    pub severity: Severity,
    /// Signed amount the transaction log says the account should carry.
    pub expected: Money,
    /// Signed amount found in the ledger, `None` when no entry exists.
    pub actual: Option<Money>,
}

/// Compares one transaction against the entries found for `account_id`.
///
/// `entries` must already be restricted to that account.
pub fn classify(tx: &Transaction, account_id: &str, entries: &[LedgerEntry]) -> Vec<Discrepancy> {
    let Some(expected) = tx.signed_amount_for(account_id) else {
        return Vec::new();
    };

    if entries.is_empty() {
        return vec![Discrepancy {
            kind: DiscrepancyKind::MissingLedgerEntry,
            transaction_id: tx.id,
            severity: Severity::High,
            expected,
            actual: None,
        }];
    }

    entries
        .iter()
        .filter(|entry| entry.amount != expected)
        .map(|entry| Discrepancy {
            kind: DiscrepancyKind::AmountMismatch,
            transaction_id: tx.id,
            severity: Severity::Critical,
            expected,
            actual: Some(entry.amount),
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub id: Uuid,
    pub account_id: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub transaction_count: u64,
    pub discrepancy_count: u64,
    /// Baseline plus the signed sum of in-window transactions.
    pub expected_balance: Money,
    /// Sum of the account's ledger entries up to `window_end`.
    pub actual_balance: Money,
    pub balanced: bool,
    pub discrepancies: Vec<Discrepancy>,
    pub created_at: DateTime<Utc>,
}

/// Ledger-derived vs. transaction-derived balance for a window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceDifference {
    pub ledger_balance: Money,
    pub transaction_balance: Money,
    /// `ledger_balance - transaction_balance`.
    pub difference: Money,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "reconciliation_reports")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub account_id: String,
    pub window_start: DateTimeUtc,
    pub window_end: DateTimeUtc,
    pub transaction_count: i64,
    pub discrepancy_count: i64,
    pub expected_balance_minor: i64,
    pub actual_balance_minor: i64,
    pub balanced: bool,
    pub discrepancies: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<&ReconciliationReport> for ActiveModel {
    type Error = EngineError;

    fn try_from(report: &ReconciliationReport) -> Result<Self, Self::Error> {
        let discrepancies = serde_json::to_string(&report.discrepancies)
            .map_err(|err| EngineError::Corrupted(format!("invalid discrepancies: {err}")))?;
        Ok(Self {
            id: ActiveValue::Set(report.id.to_string()),
            account_id: ActiveValue::Set(report.account_id.clone()),
            window_start: ActiveValue::Set(report.window_start),
            window_end: ActiveValue::Set(report.window_end),
            transaction_count: ActiveValue::Set(report.transaction_count as i64),
            discrepancy_count: ActiveValue::Set(report.discrepancy_count as i64),
            expected_balance_minor: ActiveValue::Set(report.expected_balance.minor()),
            actual_balance_minor: ActiveValue::Set(report.actual_balance.minor()),
            balanced: ActiveValue::Set(report.balanced),
            discrepancies: ActiveValue::Set(discrepancies),
            created_at: ActiveValue::Set(report.created_at),
        })
    }
}

impl TryFrom<Model> for ReconciliationReport {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let discrepancies: Vec<Discrepancy> = serde_json::from_str(&model.discrepancies)
            .map_err(|err| {
                EngineError::Corrupted(format!("invalid stored discrepancies: {err}"))
            })?;
        Ok(Self {
            id: parse_uuid(&model.id, "reconciliation report")?,
            account_id: model.account_id,
            window_start: model.window_start,
            window_end: model.window_end,
            transaction_count: u64::try_from(model.transaction_count)
                .map_err(|_| EngineError::Corrupted("negative transaction count".to_string()))?,
            discrepancy_count: u64::try_from(model.discrepancy_count)
                .map_err(|_| EngineError::Corrupted("negative discrepancy count".to_string()))?,
            expected_balance: Money::new(model.expected_balance_minor),
            actual_balance: Money::new(model.actual_balance_minor),
            balanced: model.balanced,
            discrepancies,
            created_at: model.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EntryKind, Metadata};

    fn transfer(amount: i64) -> Transaction {
        Transaction::new(
            "A".to_string(),
            "B".to_string(),
            Money::new(amount),
            Metadata::new(),
            None,
            Utc::now(),
        )
        .unwrap()
    }

    fn entry_for(tx: &Transaction, account_id: &str, amount: i64) -> LedgerEntry {
        LedgerEntry {
            id: Uuid::new_v4(),
            transaction_id: tx.id,
            account_id: account_id.to_string(),
            amount: Money::new(amount),
            kind: if amount < 0 {
                EntryKind::Debit
            } else {
                EntryKind::Credit
            },
            balance_after: None,
            created_at: tx.created_at,
        }
    }

    #[test]
    fn matching_entry_has_no_discrepancy() {
        let tx = transfer(500);
        let entries = [entry_for(&tx, "A", -500)];
        assert!(classify(&tx, "A", &entries).is_empty());
    }

    #[test]
    fn missing_entry_is_high_severity() {
        let tx = transfer(500);
        let found = classify(&tx, "B", &[]);
        assert_eq!(
            found,
            vec![Discrepancy {
                kind: DiscrepancyKind::MissingLedgerEntry,
                transaction_id: tx.id,
                severity: Severity::High,
                expected: Money::new(500),
                actual: None,
            }]
        );
    }

    #[test]
    fn wrong_amount_is_critical() {
        let tx = transfer(500);
        let entries = [entry_for(&tx, "B", 499)];
        let found = classify(&tx, "B", &entries);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, DiscrepancyKind::AmountMismatch);
        assert_eq!(found[0].severity, Severity::Critical);
        assert_eq!(found[0].actual, Some(Money::new(499)));
    }

    #[test]
    fn unrelated_account_is_ignored() {
        let tx = transfer(500);
        assert!(classify(&tx, "C", &[]).is_empty());
    }
}
