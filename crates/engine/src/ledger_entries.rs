//! Ledger entries.
//!
//! A [`LedgerEntry`] is a single signed posting against one account, created
//! as a side effect of exactly one [`Transaction`](crate::Transaction).
//!
//! Amounts are signed integer **minor units**:
//! - the `Debit` posting hits the source account with a negative amount
//! - the `Credit` posting hits the destination account with the same
//!   magnitude, positive
//!
//! Entries are written once and never updated. An account balance is always
//! the sum of its entries.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::parse_uuid;
use crate::{EngineError, Money, Transaction};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    Debit,
    Credit,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debit => "DEBIT",
            Self::Credit => "CREDIT",
        }
    }
}

impl TryFrom<&str> for EntryKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "DEBIT" => Ok(Self::Debit),
            "CREDIT" => Ok(Self::Credit),
            other => Err(EngineError::Corrupted(format!(
                "invalid entry kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub account_id: String,
    pub amount: Money,
    pub kind: EntryKind,
    /// Account balance right after this posting, when known. Postings on an
    /// account have strictly increasing `created_at`, so this agrees with
    /// history order.
    pub balance_after: Option<Money>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Builds the balanced `(debit, credit)` pair for a transaction.
    pub fn pair_for(tx: &Transaction) -> (LedgerEntry, LedgerEntry) {
        let debit = LedgerEntry {
            id: Uuid::new_v4(),
            transaction_id: tx.id,
            account_id: tx.source_account_id.clone(),
            amount: -tx.amount,
            kind: EntryKind::Debit,
            balance_after: None,
            created_at: tx.created_at,
        };
        let credit = LedgerEntry {
            id: Uuid::new_v4(),
            transaction_id: tx.id,
            account_id: tx.destination_account_id.clone(),
            amount: tx.amount,
            kind: EntryKind::Credit,
            balance_after: None,
            created_at: tx.created_at,
        };
        (debit, credit)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "ledger_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub transaction_id: String,
    pub account_id: String,
    pub amount_minor: i64,
    pub kind: String,
    pub balance_after_minor: Option<i64>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::transactions::Entity",
        from = "Column::TransactionId",
        to = "super::transactions::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Transactions,
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&LedgerEntry> for ActiveModel {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            id: ActiveValue::Set(entry.id.to_string()),
            transaction_id: ActiveValue::Set(entry.transaction_id.to_string()),
            account_id: ActiveValue::Set(entry.account_id.clone()),
            amount_minor: ActiveValue::Set(entry.amount.minor()),
            kind: ActiveValue::Set(entry.kind.as_str().to_string()),
            balance_after_minor: ActiveValue::Set(entry.balance_after.map(Money::minor)),
            created_at: ActiveValue::Set(entry.created_at),
        }
    }
}

impl TryFrom<Model> for LedgerEntry {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "ledger entry")?,
            transaction_id: parse_uuid(&model.transaction_id, "transaction")?,
            account_id: model.account_id,
            amount: Money::new(model.amount_minor),
            kind: EntryKind::try_from(model.kind.as_str())?,
            balance_after: model.balance_after_minor.map(Money::new),
            created_at: model.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Metadata;

    #[test]
    fn pair_is_balanced_and_sided() {
        let tx = Transaction::new(
            "A".to_string(),
            "B".to_string(),
            Money::new(10_000),
            Metadata::new(),
            None,
            Utc::now(),
        )
        .unwrap();
        let (debit, credit) = LedgerEntry::pair_for(&tx);

        assert_eq!(debit.kind, EntryKind::Debit);
        assert_eq!(debit.account_id, "A");
        assert_eq!(debit.amount, Money::new(-10_000));
        assert_eq!(credit.kind, EntryKind::Credit);
        assert_eq!(credit.account_id, "B");
        assert_eq!(credit.amount, Money::new(10_000));
        assert!((debit.amount + credit.amount).is_zero());
        assert_ne!(debit.id, credit.id);
    }
}
