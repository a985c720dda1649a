//! Transaction primitives.
//!
//! A `Transaction` is a requested movement of a positive [`Money`] amount
//! from a source account to a destination account. Balances only ever change
//! through the two [`LedgerEntry`](crate::LedgerEntry) postings each
//! transaction owns.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::{decode_metadata, encode_metadata, parse_uuid};
use crate::{EngineError, Metadata, Money, ResultEngine};

/// Lifecycle of a transaction.
///
/// `Pending` only exists inside the atomic unit that applies the transaction;
/// readers never observe it for a committed transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Partial,
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Partial => "PARTIAL",
            Self::Refunded => "REFUNDED",
        }
    }

    /// Whether a partial settlement may still be recorded.
    pub fn accepts_settlement(self) -> bool {
        matches!(self, Self::Pending | Self::Completed | Self::Partial)
    }
}

impl TryFrom<&str> for TransactionStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "COMPLETED" => Ok(Self::Completed),
            "PARTIAL" => Ok(Self::Partial),
            "REFUNDED" => Ok(Self::Refunded),
            other => Err(EngineError::Corrupted(format!(
                "invalid transaction status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub source_account_id: String,
    pub destination_account_id: String,
    pub amount: Money,
    /// Amount still to be settled; starts equal to `amount`.
    pub outstanding: Money,
    pub status: TransactionStatus,
    pub parent_transaction_id: Option<Uuid>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Builds a new `Pending` transaction.
    ///
    /// Account ids must already be normalized; this enforces the model
    /// invariants (distinct accounts, positive amount).
    pub fn new(
        source_account_id: String,
        destination_account_id: String,
        amount: Money,
        metadata: Metadata,
        parent_transaction_id: Option<Uuid>,
        created_at: DateTime<Utc>,
    ) -> ResultEngine<Self> {
        if !amount.is_positive() {
            return Err(EngineError::InvalidAmount(
                "amount must be > 0".to_string(),
            ));
        }
        if source_account_id == destination_account_id {
            return Err(EngineError::InvalidAccount(
                "source and destination accounts must differ".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            source_account_id,
            destination_account_id,
            amount,
            outstanding: amount,
            status: TransactionStatus::Pending,
            parent_transaction_id,
            metadata,
            created_at,
            updated_at: created_at,
        })
    }

    /// Signed amount this transaction is expected to post on `account_id`:
    /// `-amount` on the source side, `+amount` on the destination side,
    /// `None` if the account is not involved.
    pub fn signed_amount_for(&self, account_id: &str) -> Option<Money> {
        if self.source_account_id == account_id {
            Some(-self.amount)
        } else if self.destination_account_id == account_id {
            Some(self.amount)
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub source_account_id: String,
    pub destination_account_id: String,
    pub amount_minor: i64,
    pub outstanding_minor: i64,
    pub status: String,
    pub parent_transaction_id: Option<String>,
    pub metadata: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::ledger_entries::Entity")]
    LedgerEntries,
    #[sea_orm(has_many = "super::idempotency_keys::Entity")]
    IdempotencyKeys,
}

impl Related<super::ledger_entries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LedgerEntries.def()
    }
}

impl Related<super::idempotency_keys::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::IdempotencyKeys.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<&Transaction> for ActiveModel {
    type Error = EngineError;

    fn try_from(tx: &Transaction) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ActiveValue::Set(tx.id.to_string()),
            source_account_id: ActiveValue::Set(tx.source_account_id.clone()),
            destination_account_id: ActiveValue::Set(tx.destination_account_id.clone()),
            amount_minor: ActiveValue::Set(tx.amount.minor()),
            outstanding_minor: ActiveValue::Set(tx.outstanding.minor()),
            status: ActiveValue::Set(tx.status.as_str().to_string()),
            parent_transaction_id: ActiveValue::Set(
                tx.parent_transaction_id.map(|id| id.to_string()),
            ),
            metadata: ActiveValue::Set(encode_metadata(&tx.metadata)?),
            created_at: ActiveValue::Set(tx.created_at),
            updated_at: ActiveValue::Set(tx.updated_at),
        })
    }
}

impl TryFrom<Model> for Transaction {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "transaction")?,
            source_account_id: model.source_account_id,
            destination_account_id: model.destination_account_id,
            amount: Money::new(model.amount_minor),
            outstanding: Money::new(model.outstanding_minor),
            status: TransactionStatus::try_from(model.status.as_str())?,
            parent_transaction_id: model
                .parent_transaction_id
                .as_deref()
                .map(|raw| parse_uuid(raw, "parent transaction"))
                .transpose()?,
            metadata: decode_metadata(&model.metadata)?,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(amount: i64) -> ResultEngine<Transaction> {
        Transaction::new(
            "A".to_string(),
            "B".to_string(),
            Money::new(amount),
            Metadata::new(),
            None,
            Utc::now(),
        )
    }

    #[test]
    fn new_transaction_is_pending_with_full_outstanding() {
        let tx = tx(10_000).unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.outstanding, Money::new(10_000));
    }

    #[test]
    fn rejects_non_positive_amounts() {
        assert!(matches!(tx(0), Err(EngineError::InvalidAmount(_))));
        assert!(matches!(tx(-5), Err(EngineError::InvalidAmount(_))));
    }

    #[test]
    fn rejects_same_account_on_both_sides() {
        let err = Transaction::new(
            "A".to_string(),
            "A".to_string(),
            Money::new(100),
            Metadata::new(),
            None,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidAccount(_)));
    }

    #[test]
    fn signed_amount_depends_on_account_side() {
        let tx = tx(250).unwrap();
        assert_eq!(tx.signed_amount_for("A"), Some(Money::new(-250)));
        assert_eq!(tx.signed_amount_for("B"), Some(Money::new(250)));
        assert_eq!(tx.signed_amount_for("C"), None);
    }

    #[test]
    fn status_strings_match_storage_format() {
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Completed,
            TransactionStatus::Partial,
            TransactionStatus::Refunded,
        ] {
            assert_eq!(TransactionStatus::try_from(status.as_str()).unwrap(), status);
        }
        assert!(TransactionStatus::try_from("VOIDED").is_err());
    }
}
