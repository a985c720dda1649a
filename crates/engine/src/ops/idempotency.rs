use sea_orm::prelude::*;

use crate::util::validate_idempotency_key;
use crate::{
    EngineError, IdempotencyRecord, IngestOutcome, IngestRequest, Outcome, ResultEngine,
    idempotency_keys,
};

use super::Engine;

/// How many times a submission that lost the key race re-reads the binding
/// before giving up.
const MAX_CLAIM_ATTEMPTS: usize = 3;

enum Claim {
    /// The key is already bound; holds the earlier outcome.
    Bound(IngestOutcome),
    /// The key is free as of the lookup; the caller may try to apply.
    Free,
}

impl Engine {
    /// Ingests a transfer under an idempotency key.
    ///
    /// The first accepted submission for a key applies the transfer and
    /// returns [`Outcome::New`]. Every later submission with the same key,
    /// including ones racing the first, returns [`Outcome::Duplicate`] with
    /// the original transaction and entries, without writing anything.
    ///
    /// The binding itself lives in the store; the optional cache only
    /// shortcuts lookups of keys already bound.
    pub async fn submit(&self, request: IngestRequest) -> ResultEngine<IngestOutcome> {
        let key = validate_idempotency_key(&request.idempotency_key)?;

        if let Some(cached) = self.cached_outcome(&key).await {
            tracing::debug!(key, "idempotency cache hit");
            return Ok(cached.into_duplicate());
        }

        for attempt in 1..=MAX_CLAIM_ATTEMPTS {
            if let Claim::Bound(outcome) = self.claim(&key).await? {
                log_payload_mismatch(&key, &request, &outcome);
                self.remember(&key, &outcome).await;
                return Ok(outcome);
            }

            match self.apply(request.to_cmd(key.clone())).await {
                Ok(applied) => {
                    let outcome = IngestOutcome::new(applied, Outcome::New);
                    tracing::info!(
                        key,
                        transaction_id = %outcome.transaction_id,
                        "transaction ingested"
                    );
                    self.remember(&key, &outcome).await;
                    return Ok(outcome);
                }
                Err(EngineError::ExistingKey(_)) => {
                    tracing::debug!(key, attempt, "lost idempotency race, re-reading binding");
                }
                Err(err) => return Err(err),
            }
        }

        Err(EngineError::ExistingKey(key))
    }

    /// Looks up the binding of an idempotency key in the store.
    pub async fn idempotency_record(&self, key: &str) -> ResultEngine<Option<IdempotencyRecord>> {
        let key = validate_idempotency_key(key)?;
        idempotency_keys::Entity::find_by_id(key)
            .one(&self.database)
            .await?
            .map(IdempotencyRecord::try_from)
            .transpose()
    }

    async fn claim(&self, key: &str) -> ResultEngine<Claim> {
        let Some(record) = self.idempotency_record(key).await? else {
            return Ok(Claim::Free);
        };
        let applied = self.transaction(record.transaction_id).await?;
        Ok(Claim::Bound(IngestOutcome::new(applied, Outcome::Duplicate)))
    }

    async fn cached_outcome(&self, key: &str) -> Option<IngestOutcome> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(key, "idempotency cache read failed: {err}");
                None
            }
        }
    }

    async fn remember(&self, key: &str, outcome: &IngestOutcome) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        if let Err(err) = cache.set(key, outcome, self.cache_ttl).await {
            tracing::warn!(key, "idempotency cache write failed: {err}");
        }
    }
}

/// A reused key with a different payload still resolves to the first
/// transaction; the mismatch is only logged.
fn log_payload_mismatch(key: &str, request: &IngestRequest, outcome: &IngestOutcome) {
    let Some(entry) = outcome.entries.iter().find(|e| e.amount.is_positive()) else {
        return;
    };
    let requested = &request.transaction;
    if entry.amount != requested.amount
        || entry.account_id.trim() != requested.destination_account_id.trim()
    {
        tracing::debug!(
            key,
            transaction_id = %outcome.transaction_id,
            "idempotency key reused with a different payload"
        );
    }
}
