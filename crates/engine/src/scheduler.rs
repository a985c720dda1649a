//! Periodic reconciliation.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::{Engine, ReconciliationReport};

/// Reconciles a fixed set of accounts on an interval.
///
/// Each tick covers the window since the previous tick, so consecutive
/// reports tile the timeline without sharing an instant. The first window
/// reaches back one interval.
pub struct ReconciliationScheduler {
    engine: Engine,
    accounts: Vec<String>,
    interval: Duration,
}

impl ReconciliationScheduler {
    pub fn new(engine: Engine, accounts: Vec<String>, interval: Duration) -> Self {
        Self {
            engine,
            accounts,
            interval,
        }
    }

    /// Runs forever. A failed account does not stop the others.
    pub async fn run(self) {
        if self.accounts.is_empty() || self.interval.is_zero() {
            tracing::info!("reconciliation scheduler disabled");
            return;
        }
        let step = chrono::Duration::from_std(self.interval).unwrap_or(chrono::Duration::hours(1));
        let mut ticker = tokio::time::interval(self.interval);
        let mut previous_end = None;
        loop {
            ticker.tick().await;
            let Some((start, end)) = tick_window(previous_end, Utc::now(), step) else {
                continue;
            };
            self.run_once(start, end).await;
            previous_end = Some(end);
        }
    }

    /// Reconciles every configured account over `[start, end]` and returns
    /// the reports that were written.
    pub async fn run_once(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<ReconciliationReport> {
        let mut reports = Vec::with_capacity(self.accounts.len());
        for account_id in &self.accounts {
            match self.engine.reconcile(account_id, start, end).await {
                Ok(report) => reports.push(report),
                Err(err) => {
                    tracing::error!(account_id, "scheduled reconciliation failed: {err}");
                }
            }
        }
        reports
    }
}

/// Closed window reconciled by a tick at `now`. Reconciliation windows
/// include both bounds, so each window starts one nanosecond after the
/// previous end.
fn tick_window(
    previous_end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    step: chrono::Duration,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = match previous_end {
        Some(end) => end + chrono::Duration::nanoseconds(1),
        None => now - step,
    };
    (start < now).then_some((start, now))
}
