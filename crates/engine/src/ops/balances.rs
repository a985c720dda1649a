use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sea_orm::{Condition, QueryFilter, QueryOrder, QuerySelect, TransactionTrait, prelude::*};

use crate::util::normalize_account_id;
use crate::{EngineError, EntryWindow, LedgerEntry, Money, ResultEngine, ledger_entries};

use super::{Engine, with_tx};

/// Largest page `history_of` returns.
pub const MAX_HISTORY_LIMIT: u64 = 500;

/// Which entries of an account to sum.
#[derive(Clone, Copy, Debug)]
pub(crate) enum EntryBound {
    All,
    /// `created_at < t`
    Before(DateTime<Utc>),
    /// `created_at <= t`
    UpTo(DateTime<Utc>),
}

/// Signed sum of an account's entries, read through `conn` so it can run
/// inside an open unit.
pub(crate) async fn sum_entries<C: ConnectionTrait>(
    conn: &C,
    account_id: &str,
    bound: EntryBound,
) -> ResultEngine<Money> {
    let mut query = ledger_entries::Entity::find()
        .select_only()
        .column(ledger_entries::Column::AmountMinor)
        .filter(ledger_entries::Column::AccountId.eq(account_id.to_string()));
    query = match bound {
        EntryBound::All => query,
        EntryBound::Before(at) => query.filter(ledger_entries::Column::CreatedAt.lt(at)),
        EntryBound::UpTo(at) => query.filter(ledger_entries::Column::CreatedAt.lte(at)),
    };
    let amounts: Vec<i64> = query.into_tuple().all(conn).await?;
    Money::try_sum(amounts.into_iter().map(Money::new))
}

/// One page of an account's ledger history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPage {
    pub entries: Vec<LedgerEntry>,
    /// Opaque cursor for the next page, `None` on the last one.
    pub next_cursor: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct EntriesCursor {
    created_at: DateTime<Utc>,
    entry_id: String,
}

impl EntriesCursor {
    fn encode(&self) -> ResultEngine<String> {
        let bytes = serde_json::to_vec(self)
            .map_err(|_| EngineError::InvalidCursor("invalid entries cursor".to_string()))?;
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    fn decode(input: &str) -> ResultEngine<Self> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(input.as_bytes())
            .map_err(|_| EngineError::InvalidCursor("invalid entries cursor".to_string()))?;
        serde_json::from_slice::<Self>(&bytes)
            .map_err(|_| EngineError::InvalidCursor("invalid entries cursor".to_string()))
    }
}

impl Engine {
    /// Current balance of an account: the signed sum of all its entries.
    ///
    /// Unknown accounts have a zero balance.
    pub async fn balance_of(&self, account_id: &str) -> ResultEngine<Money> {
        let account_id = normalize_account_id(account_id, "requested")?;
        sum_entries(&self.database, &account_id, EntryBound::All).await
    }

    /// Ledger history of an account, oldest first, with cursor-based
    /// pagination.
    ///
    /// Ordering is `(created_at ASC, entry_id ASC)`. `limit` is clamped to
    /// `1..=500`.
    pub async fn history_of(
        &self,
        account_id: &str,
        window: EntryWindow,
        limit: u64,
        cursor: Option<&str>,
    ) -> ResultEngine<EntryPage> {
        let account_id = normalize_account_id(account_id, "requested")?;
        if let (Some(from), Some(to)) = (window.from, window.to)
            && from >= to
        {
            return Err(EngineError::InvalidWindow(
                "from must be before to".to_string(),
            ));
        }
        let cursor = cursor.map(EntriesCursor::decode).transpose()?;
        let limit = limit.clamp(1, MAX_HISTORY_LIMIT);

        with_tx!(self, |db_tx| {
            let mut query = ledger_entries::Entity::find()
                .filter(ledger_entries::Column::AccountId.eq(account_id.clone()))
                .order_by_asc(ledger_entries::Column::CreatedAt)
                .order_by_asc(ledger_entries::Column::Id)
                .limit(limit.saturating_add(1));
            if let Some(from) = window.from {
                query = query.filter(ledger_entries::Column::CreatedAt.gte(from));
            }
            if let Some(to) = window.to {
                query = query.filter(ledger_entries::Column::CreatedAt.lt(to));
            }
            if let Some(cursor) = cursor {
                query = query.filter(
                    Condition::any()
                        .add(ledger_entries::Column::CreatedAt.gt(cursor.created_at))
                        .add(
                            Condition::all()
                                .add(ledger_entries::Column::CreatedAt.eq(cursor.created_at))
                                .add(ledger_entries::Column::Id.gt(cursor.entry_id)),
                        ),
                );
            }

            let models = query.all(&db_tx).await?;
            let has_more = models.len() > limit as usize;
            let entries = models
                .into_iter()
                .take(limit as usize)
                .map(LedgerEntry::try_from)
                .collect::<ResultEngine<Vec<_>>>()?;

            let next_cursor = if has_more {
                entries
                    .last()
                    .map(|entry| EntriesCursor {
                        created_at: entry.created_at,
                        entry_id: entry.id.to_string(),
                    })
                    .map(|c| c.encode())
                    .transpose()?
            } else {
                None
            };

            Ok(EntryPage {
                entries,
                next_cursor,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_round_trips_and_rejects_garbage() {
        let cursor = EntriesCursor {
            created_at: Utc::now(),
            entry_id: "e-1".to_string(),
        };
        let encoded = cursor.encode().unwrap();
        let decoded = EntriesCursor::decode(&encoded).unwrap();
        assert_eq!(decoded.entry_id, "e-1");
        assert_eq!(decoded.created_at, cursor.created_at);

        assert!(matches!(
            EntriesCursor::decode("%%%"),
            Err(EngineError::InvalidCursor(_))
        ));
    }
}
