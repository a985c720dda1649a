//! The module contains the errors the engine can throw.
//!
//! Variants group into four families:
//!
//! - validation: [`InvalidAmount`], [`InvalidAccount`], [`InvalidWindow`],
//!   [`InvalidCursor`], [`InvalidId`], [`InvalidKey`]. Never retried.
//! - conflict: [`ExistingKey`], raised when an idempotency key loses the
//!   insert race. The ingest pipeline resolves it as a duplicate.
//! - lookup: [`KeyNotFound`] and [`InvalidState`].
//! - infrastructure: [`Database`], [`Unavailable`], [`Corrupted`]. Callers
//!   retry with backoff.
//!
//! Integrity findings (unbalanced entries, reconciliation discrepancies) are
//! not errors; they are reported as values.
//!
//!  [`InvalidAmount`]: EngineError::InvalidAmount
//!  [`InvalidAccount`]: EngineError::InvalidAccount
//!  [`InvalidWindow`]: EngineError::InvalidWindow
//!  [`InvalidCursor`]: EngineError::InvalidCursor
//!  [`InvalidId`]: EngineError::InvalidId
//!  [`InvalidKey`]: EngineError::InvalidKey
//!  [`ExistingKey`]: EngineError::ExistingKey
//!  [`KeyNotFound`]: EngineError::KeyNotFound
//!  [`InvalidState`]: EngineError::InvalidState
//!  [`Database`]: EngineError::Database
//!  [`Unavailable`]: EngineError::Unavailable
//!  [`Corrupted`]: EngineError::Corrupted
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid account: {0}")]
    InvalidAccount(String),
    #[error("Invalid window: {0}")]
    InvalidWindow(String),
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("Invalid id: {0}")]
    InvalidId(String),
    #[error("Invalid idempotency key: {0}")]
    InvalidKey(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Corrupted record: {0}")]
    Corrupted(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl EngineError {
    /// Returns `true` for malformed or semantically invalid input.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount(_)
                | Self::InvalidAccount(_)
                | Self::InvalidWindow(_)
                | Self::InvalidCursor(_)
                | Self::InvalidId(_)
                | Self::InvalidKey(_)
        )
    }

    /// Returns `true` when the failure comes from the store or another
    /// collaborator and the same request may succeed later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Unavailable(_))
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidAccount(a), Self::InvalidAccount(b)) => a == b,
            (Self::InvalidWindow(a), Self::InvalidWindow(b)) => a == b,
            (Self::InvalidCursor(a), Self::InvalidCursor(b)) => a == b,
            (Self::InvalidId(a), Self::InvalidId(b)) => a == b,
            (Self::InvalidKey(a), Self::InvalidKey(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::InvalidState(a), Self::InvalidState(b)) => a == b,
            (Self::Unavailable(a), Self::Unavailable(b)) => a == b,
            (Self::Corrupted(a), Self::Corrupted(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
