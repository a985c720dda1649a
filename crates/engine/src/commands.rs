//! Command and request structs for engine operations.
//!
//! `*Cmd` types group parameters for write operations, keeping call sites
//! readable and avoiding long argument lists. `IngestRequest` and
//! `IngestOutcome` are the wire shapes of the ingest contract shared with
//! the transport and queue layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{LedgerEntry, Metadata, Money, Transaction};

/// Apply a transfer from one account to another.
#[derive(Clone, Debug)]
pub struct TransferCmd {
    pub source_account_id: String,
    pub destination_account_id: String,
    pub amount: Money,
    pub metadata: Metadata,
    /// Bound to the transaction inside the same atomic unit when present.
    pub idempotency_key: Option<String>,
    /// Pinned posting time. `None` stamps the posting when it is written.
    pub requested_at: Option<DateTime<Utc>>,
}

impl TransferCmd {
    #[must_use]
    pub fn new(
        source_account_id: impl Into<String>,
        destination_account_id: impl Into<String>,
        amount: Money,
    ) -> Self {
        Self {
            source_account_id: source_account_id.into(),
            destination_account_id: destination_account_id.into(),
            amount,
            metadata: Metadata::new(),
            idempotency_key: None,
            requested_at: None,
        }
    }

    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Pins the posting time. It must be later than every entry already
    /// posted on either account.
    #[must_use]
    pub fn requested_at(mut self, at: DateTime<Utc>) -> Self {
        self.requested_at = Some(at);
        self
    }
}

/// Refund (part of) a completed transaction.
#[derive(Clone, Debug)]
pub struct RefundCmd {
    pub transaction_id: Uuid,
    pub amount: Money,
    pub reason: Option<String>,
    /// Pinned posting time. `None` stamps the refund when it is written.
    pub requested_at: Option<DateTime<Utc>>,
}

impl RefundCmd {
    #[must_use]
    pub fn new(transaction_id: Uuid, amount: Money) -> Self {
        Self {
            transaction_id,
            amount,
            reason: None,
            requested_at: None,
        }
    }

    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[must_use]
    pub fn requested_at(mut self, at: DateTime<Utc>) -> Self {
        self.requested_at = Some(at);
        self
    }
}

/// Transfer payload of an ingest request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub source_account_id: String,
    pub destination_account_id: String,
    pub amount: Money,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Ingest contract: the transfer plus the caller's idempotency key. This is
/// also the exact payload carried by the ingest queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub transaction: TransferRequest,
    pub idempotency_key: String,
}

impl IngestRequest {
    pub(crate) fn to_cmd(&self, key: String) -> TransferCmd {
        TransferCmd {
            source_account_id: self.transaction.source_account_id.clone(),
            destination_account_id: self.transaction.destination_account_id.clone(),
            amount: self.transaction.amount,
            metadata: self.transaction.metadata.clone(),
            idempotency_key: Some(key),
            requested_at: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    New,
    Duplicate,
}

/// Result of the ingest pipeline. The transport layer picks its status code
/// from `outcome`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub outcome: Outcome,
    pub transaction_id: Uuid,
    pub entries: Vec<LedgerEntry>,
}

impl IngestOutcome {
    pub(crate) fn new(applied: AppliedTransaction, outcome: Outcome) -> Self {
        Self {
            outcome,
            transaction_id: applied.transaction.id,
            entries: applied.entries,
        }
    }

    /// The same outcome, seen by a later caller.
    #[must_use]
    pub fn into_duplicate(self) -> Self {
        Self {
            outcome: Outcome::Duplicate,
            ..self
        }
    }
}

/// A transaction together with its ledger entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedTransaction {
    pub transaction: Transaction,
    pub entries: Vec<LedgerEntry>,
}

/// Per-transaction double-entry check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    pub transaction_id: Uuid,
    pub balanced: bool,
    /// Magnitude of the debit postings.
    pub debit_total: Money,
    /// Magnitude of the credit postings.
    pub credit_total: Money,
    pub entry_count: u64,
}

/// Optional bounds for ledger history: `from` inclusive, `to` exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntryWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}
