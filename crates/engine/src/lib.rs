//! Transactional ledger core.
//!
//! Transfers are recorded as a [`Transaction`] plus two balanced
//! [`LedgerEntry`] postings written in one atomic unit. Account balances are
//! always derived from entries. Duplicate submissions are collapsed through
//! caller-supplied idempotency keys, and reconciliation cross-checks the
//! entry-derived balance of an account against its transaction log.

use std::collections::BTreeMap;

pub use cache::{InMemoryOutcomeCache, OutcomeCache};
pub use commands::{
    AppliedTransaction, EntryWindow, IngestOutcome, IngestRequest, Outcome, RefundCmd,
    TransferCmd, TransferRequest, VerifyReport,
};
pub use error::EngineError;
pub use events::{NoopEvents, ReconciliationEvent, ReconciliationEvents, TracingEvents};
pub use idempotency_keys::IdempotencyRecord;
pub use ledger_entries::{EntryKind, LedgerEntry};
pub use money::Money;
pub use ops::{Engine, EngineBuilder, EntryPage};
pub use queue::{ChannelQueue, IngestQueue, IngestWorker};
pub use reconciliation_reports::{
    BalanceDifference, Discrepancy, DiscrepancyKind, ReconciliationReport, Severity, classify,
};
pub use scheduler::ReconciliationScheduler;
pub use transactions::{Transaction, TransactionStatus};

mod cache;
mod commands;
mod error;
mod events;
mod idempotency_keys;
mod ledger_entries;
mod money;
mod ops;
mod queue;
mod reconciliation_reports;
mod scheduler;
mod transactions;
mod util;

type ResultEngine<T> = Result<T, EngineError>;

/// Free-form transaction attributes, stored as a JSON object.
pub type Metadata = BTreeMap<String, serde_json::Value>;
