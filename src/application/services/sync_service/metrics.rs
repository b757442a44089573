use super::SyncResult;
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncPassOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetricsSnapshot {
    pub total_success: u64,
    pub total_failure: u64,
    pub consecutive_failure: u64,
    pub full_sync_runs: u64,
    pub last_success_ms: Option<u64>,
    pub last_failure_ms: Option<u64>,
    pub last_outcome: Option<SyncPassOutcome>,
    pub last_synced_count: Option<u32>,
    pub last_failed_count: Option<u32>,
    pub last_pending_count: Option<u32>,
}

#[derive(Default)]
struct LastPass {
    outcome: Option<SyncPassOutcome>,
    result: Option<SyncResult>,
}

/// Per-engine counters for push passes and pulls.
#[derive(Default)]
pub(crate) struct SyncMetrics {
    total_success: AtomicU64,
    total_failure: AtomicU64,
    consecutive_failure: AtomicU64,
    full_sync_runs: AtomicU64,
    last_success_ms: AtomicU64,
    last_failure_ms: AtomicU64,
    last: Mutex<LastPass>,
}

impl SyncMetrics {
    /// A pass with any failed record counts as a failure.
    pub(crate) fn record_push(&self, result: SyncResult) {
        let outcome = if result.failed_count == 0 {
            SyncPassOutcome::Success
        } else {
            SyncPassOutcome::Failure
        };
        self.record_outcome(outcome);
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        last.result = Some(result);
    }

    pub(crate) fn record_pull(&self, succeeded: bool) {
        self.record_outcome(if succeeded {
            SyncPassOutcome::Success
        } else {
            SyncPassOutcome::Failure
        });
    }

    pub(crate) fn record_full_sync(&self) {
        self.full_sync_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> SyncMetricsSnapshot {
        let last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        SyncMetricsSnapshot {
            total_success: self.total_success.load(Ordering::Relaxed),
            total_failure: self.total_failure.load(Ordering::Relaxed),
            consecutive_failure: self.consecutive_failure.load(Ordering::Relaxed),
            full_sync_runs: self.full_sync_runs.load(Ordering::Relaxed),
            last_success_ms: load_timestamp(&self.last_success_ms),
            last_failure_ms: load_timestamp(&self.last_failure_ms),
            last_outcome: last.outcome,
            last_synced_count: last.result.map(|result| result.synced_count),
            last_failed_count: last.result.map(|result| result.failed_count),
            last_pending_count: last.result.map(|result| result.pending_count),
        }
    }

    fn record_outcome(&self, outcome: SyncPassOutcome) {
        let now = current_millis();
        match outcome {
            SyncPassOutcome::Success => {
                self.total_success.fetch_add(1, Ordering::Relaxed);
                self.consecutive_failure.store(0, Ordering::Relaxed);
                self.last_success_ms.store(now, Ordering::Relaxed);
            }
            SyncPassOutcome::Failure => {
                self.total_failure.fetch_add(1, Ordering::Relaxed);
                self.consecutive_failure.fetch_add(1, Ordering::Relaxed);
                self.last_failure_ms.store(now, Ordering::Relaxed);
            }
        }
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        last.outcome = Some(outcome);
    }
}

fn current_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
}

fn load_timestamp(value: &AtomicU64) -> Option<u64> {
    match value.load(Ordering::Relaxed) {
        0 => None,
        ms => Some(ms),
    }
}
