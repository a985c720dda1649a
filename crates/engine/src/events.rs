//! Outbound reconciliation events.
//!
//! Each reconciliation run emits `Progress` events while scanning, then
//! exactly one `Complete` or `Error`. The engine only pushes into an injected
//! [`ReconciliationEvents`] sink; subscribers live outside the core.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReconciliationEvent {
    #[serde(rename_all = "camelCase")]
    Progress {
        run_id: Uuid,
        account_id: String,
        processed: u64,
        total: u64,
    },
    #[serde(rename_all = "camelCase")]
    Complete {
        run_id: Uuid,
        account_id: String,
        report_id: Uuid,
        balanced: bool,
        discrepancy_count: u64,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        run_id: Uuid,
        account_id: String,
        message: String,
    },
}

impl ReconciliationEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            Self::Progress { run_id, .. }
            | Self::Complete { run_id, .. }
            | Self::Error { run_id, .. } => *run_id,
        }
    }
}

/// Sink for reconciliation events. Implementations must not block: `emit`
/// may be called while a read transaction is open.
pub trait ReconciliationEvents: Send + Sync {
    fn emit(&self, event: ReconciliationEvent);
}

/// Drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEvents;

impl ReconciliationEvents for NoopEvents {
    fn emit(&self, _event: ReconciliationEvent) {}
}

/// Writes events to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEvents;

impl ReconciliationEvents for TracingEvents {
    fn emit(&self, event: ReconciliationEvent) {
        match &event {
            ReconciliationEvent::Progress {
                run_id,
                processed,
                total,
                ..
            } => tracing::trace!(%run_id, processed, total, "reconciliation progress"),
            ReconciliationEvent::Complete {
                run_id,
                account_id,
                balanced,
                discrepancy_count,
                ..
            } => tracing::info!(
                %run_id,
                account_id,
                balanced,
                discrepancy_count,
                "reconciliation complete"
            ),
            ReconciliationEvent::Error {
                run_id,
                account_id,
                message,
            } => tracing::error!(%run_id, account_id, "reconciliation failed: {message}"),
        }
    }
}

/// Forwards events to an unbounded channel; a closed receiver is ignored.
impl ReconciliationEvents for mpsc::UnboundedSender<ReconciliationEvent> {
    fn emit(&self, event: ReconciliationEvent) {
        if self.send(event).is_err() {
            tracing::trace!("reconciliation event receiver dropped");
        }
    }
}
