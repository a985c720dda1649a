//! Internal helpers for input validation and model conversion.
//!
//! These utilities are **not** part of the public API. They centralize
//! validation and mapping logic so the engine enforces consistent invariants.

use chrono::{DateTime, Utc};
use sea_orm::{DbErr, SqlErr};
use uuid::Uuid;

use crate::{EngineError, Metadata, ResultEngine};

/// Longest accepted idempotency key, in bytes.
pub(crate) const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Parse a UUID from storage and return a labeled error on failure.
pub(crate) fn parse_uuid(value: &str, label: &str) -> ResultEngine<Uuid> {
    Uuid::parse_str(value).map_err(|_| EngineError::Corrupted(format!("invalid {label} id: {value}")))
}

/// Trim an account id and reject empty values.
pub(crate) fn normalize_account_id(value: &str, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidAccount(format!(
            "{label} account id must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

/// Validate a caller-supplied idempotency key. Keys are opaque and bound
/// byte for byte, so padded keys are rejected rather than rewritten.
pub(crate) fn validate_idempotency_key(value: &str) -> ResultEngine<String> {
    if value.trim().is_empty() {
        return Err(EngineError::InvalidKey("key must not be empty".to_string()));
    }
    if value.trim() != value {
        return Err(EngineError::InvalidKey(
            "key must not have leading or trailing whitespace".to_string(),
        ));
    }
    if value.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(EngineError::InvalidKey(format!(
            "key must be at most {MAX_IDEMPOTENCY_KEY_LEN} bytes"
        )));
    }
    Ok(value.to_string())
}

pub(crate) fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Reject empty or inverted windows (`start` must be strictly before `end`).
pub(crate) fn validate_window(start: DateTime<Utc>, end: DateTime<Utc>) -> ResultEngine<()> {
    if start >= end {
        return Err(EngineError::InvalidWindow(
            "start must be before end".to_string(),
        ));
    }
    Ok(())
}

/// `true` when the store rejected a write because of a unique/primary key
/// constraint.
pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        return true;
    }
    // Older SQLite builds report primary key violations without the extended
    // error code sea-orm keys on.
    err.to_string().contains("UNIQUE constraint failed")
}

pub(crate) fn encode_metadata(metadata: &Metadata) -> ResultEngine<String> {
    serde_json::to_string(metadata)
        .map_err(|err| EngineError::Corrupted(format!("unencodable metadata: {err}")))
}

pub(crate) fn decode_metadata(raw: &str) -> ResultEngine<Metadata> {
    if raw.is_empty() {
        return Ok(Metadata::new());
    }
    serde_json::from_str(raw)
        .map_err(|err| EngineError::Corrupted(format!("invalid stored metadata: {err}")))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn account_ids_are_trimmed_and_required() {
        assert_eq!(normalize_account_id("  acc-1 ", "source").unwrap(), "acc-1");
        assert_eq!(
            normalize_account_id("   ", "source"),
            Err(EngineError::InvalidAccount(
                "source account id must not be empty".to_string()
            ))
        );
    }

    #[test]
    fn idempotency_keys_are_bounded() {
        assert!(validate_idempotency_key("").is_err());
        assert!(validate_idempotency_key(&"k".repeat(MAX_IDEMPOTENCY_KEY_LEN + 1)).is_err());
        assert_eq!(validate_idempotency_key("key-1").unwrap(), "key-1");
    }

    #[test]
    fn padded_idempotency_keys_are_rejected() {
        for key in [" key-1", "key-1 ", "\tkey-1\n"] {
            assert!(matches!(
                validate_idempotency_key(key),
                Err(EngineError::InvalidKey(_))
            ));
        }
        assert_eq!(validate_idempotency_key("key 1").unwrap(), "key 1");
    }

    #[test]
    fn window_requires_start_before_end() {
        let now = Utc::now();
        assert!(validate_window(now, now).is_err());
        assert!(validate_window(now, now - Duration::seconds(1)).is_err());
        assert!(validate_window(now - Duration::seconds(1), now).is_ok());
    }

    #[test]
    fn metadata_round_trips_through_storage_text() {
        let mut metadata = Metadata::new();
        metadata.insert("invoice".to_string(), serde_json::json!("INV-7"));
        let raw = encode_metadata(&metadata).unwrap();
        assert_eq!(decode_metadata(&raw).unwrap(), metadata);
        assert!(decode_metadata("").unwrap().is_empty());
        assert!(matches!(
            decode_metadata("not json"),
            Err(EngineError::Corrupted(_))
        ));
    }
}
