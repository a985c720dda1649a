use chrono::{DateTime, Utc};
use uuid::Uuid;

use sea_orm::{
    ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
    prelude::*,
};

use crate::util::{is_unique_violation, normalize_account_id, normalize_optional_text};
use crate::{
    AppliedTransaction, EngineError, IdempotencyRecord, LedgerEntry, Metadata, Money, RefundCmd,
    ResultEngine, Transaction, TransactionStatus, TransferCmd, idempotency_keys, ledger_entries,
    transactions,
};

use super::super::balances::{EntryBound, sum_entries};
use super::super::{Engine, with_tx};

/// Validates a transfer command and builds the `Pending` transaction it
/// describes.
pub(in crate::ops) fn build_transfer(cmd: &TransferCmd) -> ResultEngine<Transaction> {
    let source = normalize_account_id(&cmd.source_account_id, "source")?;
    let destination = normalize_account_id(&cmd.destination_account_id, "destination")?;
    Transaction::new(
        source,
        destination,
        cmd.amount,
        cmd.metadata.clone(),
        None,
        cmd.requested_at.unwrap_or_else(Utc::now),
    )
}

impl Engine {
    /// Applies a transfer: one transaction row plus its debit and credit
    /// entries, committed together or not at all.
    ///
    /// When the command carries an idempotency key it is bound inside the
    /// same unit. If the key is already bound, nothing is written and
    /// [`EngineError::ExistingKey`] is returned.
    pub async fn apply(&self, cmd: TransferCmd) -> ResultEngine<AppliedTransaction> {
        let tx = build_transfer(&cmd)?;
        let key = cmd.idempotency_key.as_deref();
        let pinned = cmd.requested_at.is_some();
        with_tx!(self, |db_tx| self.post_transaction(&db_tx, tx, key, pinned).await)
    }

    /// Refunds (part of) a `Completed` transaction.
    ///
    /// The refund is a new transaction in the opposite direction, linked to
    /// the original through `parent_transaction_id`, with its own balanced
    /// entries. Refunds accumulate up to the original amount; once fully
    /// refunded the original is marked `Refunded`.
    pub async fn refund(&self, cmd: RefundCmd) -> ResultEngine<AppliedTransaction> {
        if !cmd.amount.is_positive() {
            return Err(EngineError::InvalidAmount(
                "refund amount must be > 0".to_string(),
            ));
        }
        let reason = normalize_optional_text(cmd.reason.as_deref());

        with_tx!(self, |db_tx| {
            let original = require_transaction(&db_tx, cmd.transaction_id).await?;
            if original.parent_transaction_id.is_some() {
                return Err(EngineError::InvalidState(
                    "a refund cannot be refunded".to_string(),
                ));
            }
            if original.status != TransactionStatus::Completed {
                return Err(EngineError::KeyNotFound("transaction not exists".to_string()));
            }

            let already_refunded = refunded_total(&db_tx, original.id).await?;
            let remaining = original
                .amount
                .checked_sub(already_refunded)
                .ok_or_else(|| EngineError::Corrupted("refund total overflow".to_string()))?;
            if cmd.amount > remaining {
                return Err(EngineError::InvalidAmount(format!(
                    "refund exceeds remaining refundable amount {remaining}"
                )));
            }

            let mut metadata = Metadata::new();
            if let Some(reason) = reason {
                metadata.insert("reason".to_string(), serde_json::Value::String(reason));
            }
            let refund = Transaction::new(
                original.destination_account_id.clone(),
                original.source_account_id.clone(),
                cmd.amount,
                metadata,
                Some(original.id),
                cmd.requested_at.unwrap_or_else(Utc::now),
            )?;
            let applied = self
                .post_transaction(&db_tx, refund, None, cmd.requested_at.is_some())
                .await?;

            if cmd.amount == remaining {
                transactions::ActiveModel {
                    id: ActiveValue::Set(original.id.to_string()),
                    status: ActiveValue::Set(TransactionStatus::Refunded.as_str().to_string()),
                    updated_at: ActiveValue::Set(Utc::now()),
                    ..Default::default()
                }
                .update(&db_tx)
                .await?;
                tracing::info!(transaction_id = %original.id, "transaction fully refunded");
            }

            Ok(applied)
        })
    }

    /// Records a partial payment against a transaction's outstanding amount.
    ///
    /// Only the status and `outstanding` change; no ledger entries are
    /// posted. Paying more than what is outstanding is rejected.
    pub async fn partial_settle(
        &self,
        transaction_id: Uuid,
        paid: Money,
    ) -> ResultEngine<Transaction> {
        if !paid.is_positive() {
            return Err(EngineError::InvalidAmount(
                "paid amount must be > 0".to_string(),
            ));
        }

        with_tx!(self, |db_tx| {
            let mut tx = require_transaction(&db_tx, transaction_id).await?;
            if !tx.status.accepts_settlement() {
                return Err(EngineError::InvalidState(format!(
                    "cannot settle a {} transaction",
                    tx.status.as_str()
                )));
            }
            if paid > tx.outstanding {
                return Err(EngineError::InvalidAmount(format!(
                    "paid amount exceeds outstanding {}",
                    tx.outstanding
                )));
            }

            tx.outstanding = tx.outstanding - paid;
            tx.status = if tx.outstanding.is_zero() {
                TransactionStatus::Completed
            } else {
                TransactionStatus::Partial
            };
            tx.updated_at = Utc::now();

            transactions::ActiveModel {
                id: ActiveValue::Set(tx.id.to_string()),
                outstanding_minor: ActiveValue::Set(tx.outstanding.minor()),
                status: ActiveValue::Set(tx.status.as_str().to_string()),
                updated_at: ActiveValue::Set(tx.updated_at),
                ..Default::default()
            }
            .update(&db_tx)
            .await?;
            tracing::info!(
                transaction_id = %tx.id,
                status = tx.status.as_str(),
                outstanding = %tx.outstanding,
                "settlement recorded"
            );

            Ok(tx)
        })
    }

    /// Writes a transaction and its entry pair inside an open unit.
    ///
    /// The row goes in as `Pending` and is flipped to `Completed` only after
    /// both entries are stored, so no committed transaction is ever observed
    /// without its postings.
    ///
    /// Postings on an account are strictly ordered by `created_at`, which is
    /// what keeps each `balance_after` true in history order. A `pinned`
    /// time at or before the latest entry of either account is rejected;
    /// an unpinned one is moved just past it.
    pub(in crate::ops) async fn post_transaction(
        &self,
        db_tx: &DatabaseTransaction,
        mut tx: Transaction,
        idempotency_key: Option<&str>,
        pinned: bool,
    ) -> ResultEngine<AppliedTransaction> {
        if let Some(latest) = latest_entry_at(db_tx, &tx)
            .await?
            .filter(|latest| tx.created_at <= *latest)
        {
            if pinned {
                return Err(EngineError::InvalidState(format!(
                    "posting time {} is not after the latest entry at {latest}",
                    tx.created_at
                )));
            }
            tx.created_at = latest + chrono::Duration::microseconds(1);
            tx.updated_at = tx.created_at;
        }

        transactions::ActiveModel::try_from(&tx)?
            .insert(db_tx)
            .await?;

        if let Some(key) = idempotency_key {
            let record = IdempotencyRecord {
                key: key.to_string(),
                transaction_id: tx.id,
                created_at: tx.created_at,
            };
            if let Err(err) = idempotency_keys::ActiveModel::from(&record)
                .insert(db_tx)
                .await
            {
                if is_unique_violation(&err) {
                    return Err(EngineError::ExistingKey(key.to_string()));
                }
                return Err(err.into());
            }
        }

        let (mut debit, mut credit) = LedgerEntry::pair_for(&tx);
        for entry in [&mut debit, &mut credit] {
            let current =
                sum_entries(db_tx, &entry.account_id, EntryBound::UpTo(tx.created_at)).await?;
            let after = current.checked_add(entry.amount).ok_or_else(|| {
                EngineError::InvalidAmount(format!(
                    "balance of account {} would overflow",
                    entry.account_id
                ))
            })?;
            entry.balance_after = Some(after);
            ledger_entries::ActiveModel::from(&*entry)
                .insert(db_tx)
                .await?;
        }

        tx.status = TransactionStatus::Completed;
        tx.updated_at = Utc::now().max(tx.created_at);
        transactions::ActiveModel {
            id: ActiveValue::Set(tx.id.to_string()),
            status: ActiveValue::Set(tx.status.as_str().to_string()),
            updated_at: ActiveValue::Set(tx.updated_at),
            ..Default::default()
        }
        .update(db_tx)
        .await?;

        tracing::debug!(
            transaction_id = %tx.id,
            source = %tx.source_account_id,
            destination = %tx.destination_account_id,
            amount = %tx.amount,
            "transaction applied"
        );

        Ok(AppliedTransaction {
            transaction: tx,
            entries: vec![debit, credit],
        })
    }
}

pub(in crate::ops) async fn require_transaction<C: ConnectionTrait>(
    conn: &C,
    transaction_id: Uuid,
) -> ResultEngine<Transaction> {
    let model = transactions::Entity::find_by_id(transaction_id.to_string())
        .one(conn)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound("transaction not exists".to_string()))?;
    Transaction::try_from(model)
}

/// Newest entry time across both accounts of `tx`.
async fn latest_entry_at(
    db_tx: &DatabaseTransaction,
    tx: &Transaction,
) -> ResultEngine<Option<DateTime<Utc>>> {
    let latest = ledger_entries::Entity::find()
        .filter(ledger_entries::Column::AccountId.is_in([
            tx.source_account_id.clone(),
            tx.destination_account_id.clone(),
        ]))
        .order_by_desc(ledger_entries::Column::CreatedAt)
        .one(db_tx)
        .await?;
    Ok(latest.map(|entry| entry.created_at))
}

async fn refunded_total<C: ConnectionTrait>(conn: &C, original_id: Uuid) -> ResultEngine<Money> {
    let amounts: Vec<i64> = transactions::Entity::find()
        .select_only()
        .column(transactions::Column::AmountMinor)
        .filter(transactions::Column::ParentTransactionId.eq(original_id.to_string()))
        .into_tuple()
        .all(conn)
        .await?;
    Money::try_sum(amounts.into_iter().map(Money::new))
}
