use chrono::{DateTime, Utc};
use uuid::Uuid;

use sea_orm::{
    Condition, DatabaseTransaction, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
    prelude::*,
};

use crate::util::{normalize_account_id, validate_window};
use crate::{
    BalanceDifference, Discrepancy, EngineError, LedgerEntry, Money, ReconciliationEvent,
    ReconciliationReport, ResultEngine, Transaction, classify, ledger_entries,
    reconciliation_reports, transactions,
};

use super::balances::{EntryBound, sum_entries};
use super::{Engine, with_tx};

/// Largest page `reconciliation_history` returns.
pub const MAX_REPORT_LIMIT: u64 = 100;

/// Totals gathered while scanning one account over one window.
struct WindowScan {
    transaction_count: u64,
    expected_balance: Money,
    actual_balance: Money,
    discrepancies: Vec<Discrepancy>,
}

impl Engine {
    /// Cross-checks an account over `[start, end]` and persists the report.
    ///
    /// The expected balance is the entry balance before `start` plus the
    /// signed amounts of every transaction touching the account inside the
    /// window; the actual balance is the entry balance up to `end`. The run
    /// emits `Progress` per scanned transaction and finishes with exactly one
    /// `Complete` or `Error` event.
    pub async fn reconcile(
        &self,
        account_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ResultEngine<ReconciliationReport> {
        let account_id = normalize_account_id(account_id, "reconciled")?;
        validate_window(start, end)?;
        let run_id = Uuid::new_v4();

        tracing::debug!(%run_id, account_id, %start, %end, "reconciliation started");
        match self.run_reconciliation(run_id, &account_id, start, end).await {
            Ok(report) => {
                self.events.emit(ReconciliationEvent::Complete {
                    run_id,
                    account_id,
                    report_id: report.id,
                    balanced: report.balanced,
                    discrepancy_count: report.discrepancy_count,
                });
                Ok(report)
            }
            Err(err) => {
                self.events.emit(ReconciliationEvent::Error {
                    run_id,
                    account_id,
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Ledger-derived vs. transaction-derived balance for the window,
    /// without persisting a report or emitting events.
    pub async fn difference_of(
        &self,
        account_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ResultEngine<BalanceDifference> {
        let account_id = normalize_account_id(account_id, "reconciled")?;
        validate_window(start, end)?;

        let scan = with_tx!(self, |db_tx| {
            self.scan_window(&db_tx, None, &account_id, start, end)
                .await
        })?;
        let difference = scan
            .actual_balance
            .checked_sub(scan.expected_balance)
            .ok_or_else(|| EngineError::InvalidAmount("balance difference overflow".to_string()))?;
        Ok(BalanceDifference {
            ledger_balance: scan.actual_balance,
            transaction_balance: scan.expected_balance,
            difference,
        })
    }

    /// Stored reports for an account, newest first. `limit` is clamped to
    /// `1..=100`.
    pub async fn reconciliation_history(
        &self,
        account_id: &str,
        limit: u64,
    ) -> ResultEngine<Vec<ReconciliationReport>> {
        let account_id = normalize_account_id(account_id, "reconciled")?;
        let limit = limit.clamp(1, MAX_REPORT_LIMIT);
        reconciliation_reports::Entity::find()
            .filter(reconciliation_reports::Column::AccountId.eq(account_id))
            .order_by_desc(reconciliation_reports::Column::CreatedAt)
            .order_by_desc(reconciliation_reports::Column::Id)
            .limit(limit)
            .all(&self.database)
            .await?
            .into_iter()
            .map(ReconciliationReport::try_from)
            .collect()
    }

    async fn run_reconciliation(
        &self,
        run_id: Uuid,
        account_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ResultEngine<ReconciliationReport> {
        with_tx!(self, |db_tx| {
            let scan = self
                .scan_window(&db_tx, Some(run_id), account_id, start, end)
                .await?;

            let report = ReconciliationReport {
                id: Uuid::new_v4(),
                account_id: account_id.to_string(),
                window_start: start,
                window_end: end,
                transaction_count: scan.transaction_count,
                discrepancy_count: scan.discrepancies.len() as u64,
                expected_balance: scan.expected_balance,
                actual_balance: scan.actual_balance,
                balanced: scan.expected_balance == scan.actual_balance,
                discrepancies: scan.discrepancies,
                created_at: Utc::now(),
            };
            reconciliation_reports::ActiveModel::try_from(&report)?
                .insert(&db_tx)
                .await?;

            if !report.balanced {
                tracing::warn!(
                    %run_id,
                    account_id,
                    expected = %report.expected_balance,
                    actual = %report.actual_balance,
                    discrepancies = report.discrepancy_count,
                    "account does not reconcile"
                );
            }
            Ok(report)
        })
    }

    /// Reads baseline, in-window transactions and their entries through one
    /// unit so all figures come from the same snapshot.
    async fn scan_window(
        &self,
        db_tx: &DatabaseTransaction,
        run_id: Option<Uuid>,
        account_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ResultEngine<WindowScan> {
        let baseline = sum_entries(db_tx, account_id, EntryBound::Before(start)).await?;

        let window_txs = transactions::Entity::find()
            .filter(
                Condition::any()
                    .add(transactions::Column::SourceAccountId.eq(account_id.to_string()))
                    .add(transactions::Column::DestinationAccountId.eq(account_id.to_string())),
            )
            .filter(transactions::Column::CreatedAt.gte(start))
            .filter(transactions::Column::CreatedAt.lte(end))
            .order_by_asc(transactions::Column::CreatedAt)
            .order_by_asc(transactions::Column::Id)
            .all(db_tx)
            .await?
            .into_iter()
            .map(Transaction::try_from)
            .collect::<ResultEngine<Vec<_>>>()?;

        let total = window_txs.len() as u64;
        let mut expected = baseline;
        let mut discrepancies = Vec::new();
        for (index, tx) in window_txs.iter().enumerate() {
            let Some(signed) = tx.signed_amount_for(account_id) else {
                continue;
            };
            expected = expected.checked_add(signed).ok_or_else(|| {
                EngineError::InvalidAmount("expected balance overflow".to_string())
            })?;

            let entries = ledger_entries::Entity::find()
                .filter(ledger_entries::Column::TransactionId.eq(tx.id.to_string()))
                .filter(ledger_entries::Column::AccountId.eq(account_id.to_string()))
                .all(db_tx)
                .await?
                .into_iter()
                .map(LedgerEntry::try_from)
                .collect::<ResultEngine<Vec<_>>>()?;
            discrepancies.extend(classify(tx, account_id, &entries));

            if let Some(run_id) = run_id {
                self.events.emit(ReconciliationEvent::Progress {
                    run_id,
                    account_id: account_id.to_string(),
                    processed: index as u64 + 1,
                    total,
                });
            }
        }

        let actual = sum_entries(db_tx, account_id, EntryBound::UpTo(end)).await?;

        Ok(WindowScan {
            transaction_count: total,
            expected_balance: expected,
            actual_balance: actual,
            discrepancies,
        })
    }
}
