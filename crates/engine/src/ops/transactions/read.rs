use uuid::Uuid;

use sea_orm::{QueryFilter, QueryOrder, TransactionTrait, prelude::*};

use crate::{
    AppliedTransaction, EngineError, EntryKind, LedgerEntry, Money, ResultEngine, VerifyReport,
    ledger_entries,
};

use super::super::{Engine, with_tx};
use super::write::require_transaction;

pub(in crate::ops) async fn entries_of<C: ConnectionTrait>(
    conn: &C,
    transaction_id: Uuid,
) -> ResultEngine<Vec<LedgerEntry>> {
    ledger_entries::Entity::find()
        .filter(ledger_entries::Column::TransactionId.eq(transaction_id.to_string()))
        .order_by_asc(ledger_entries::Column::CreatedAt)
        .order_by_asc(ledger_entries::Column::Id)
        .all(conn)
        .await?
        .into_iter()
        .map(LedgerEntry::try_from)
        .collect()
}

impl Engine {
    /// Returns a transaction with its ledger entries.
    pub async fn transaction(&self, transaction_id: Uuid) -> ResultEngine<AppliedTransaction> {
        with_tx!(self, |db_tx| {
            let transaction = require_transaction(&db_tx, transaction_id).await?;
            let entries = entries_of(&db_tx, transaction_id).await?;
            Ok(AppliedTransaction {
                transaction,
                entries,
            })
        })
    }

    /// Checks the double-entry invariant of one transaction.
    ///
    /// Balanced means exactly one debit, exactly one credit, and a signed sum
    /// of zero. A failed check is reported, not raised.
    pub async fn verify(&self, transaction_id: Uuid) -> ResultEngine<VerifyReport> {
        let applied = self.transaction(transaction_id).await?;
        let entries = &applied.entries;

        let debits: Vec<Money> = entries
            .iter()
            .filter(|e| e.kind == EntryKind::Debit)
            .map(|e| e.amount)
            .collect();
        let credits: Vec<Money> = entries
            .iter()
            .filter(|e| e.kind == EntryKind::Credit)
            .map(|e| e.amount)
            .collect();
        let debit_total = Money::try_sum(debits.iter().copied())?;
        let credit_total = Money::try_sum(credits.iter().copied())?;
        let net = debit_total
            .checked_add(credit_total)
            .ok_or_else(|| EngineError::Corrupted("entry sum overflow".to_string()))?;

        let balanced = debits.len() == 1 && credits.len() == 1 && net.is_zero();
        if !balanced {
            tracing::warn!(
                %transaction_id,
                entries = entries.len(),
                net = %net,
                "transaction entries are unbalanced"
            );
        }

        Ok(VerifyReport {
            transaction_id,
            balanced,
            debit_total: debit_total.abs(),
            credit_total: credit_total.abs(),
            entry_count: entries.len() as u64,
        })
    }
}
