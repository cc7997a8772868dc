//! One pass of the order expiry sweep.
//!
//! The scheduled loop lives in the API crate; this module only knows how to
//! run a single cycle, which is also what the manual cleanup endpoint calls.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use crate::lock::{Lock, LockError, LockManager};
use crate::pending::PendingCheckoutStore;
use crate::types::{HolderId, Timestamp};

/// Outcome of one sweep cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub locks_released: usize,
    pub orders_removed: usize,
    pub released: Vec<Lock>,
    /// Per-entry failures. A failing entry never stops the rest of the sweep.
    pub errors: Vec<String>,
    pub swept_at: Timestamp,
}

/// Reclaims locks and pending checkouts left behind by abandoned checkouts.
pub struct OrderSweeper {
    locks: Arc<LockManager>,
    pending: Arc<PendingCheckoutStore>,
}

impl OrderSweeper {
    pub fn new(locks: Arc<LockManager>, pending: Arc<PendingCheckoutStore>) -> Self {
        Self { locks, pending }
    }

    /// Run one sweep.
    ///
    /// 1. Snapshot expired locks and compare-and-remove each one. An entry
    ///    released or re-acquired by its holder in the meantime is skipped.
    /// 2. Drop the pending checkout of every holder left with no locks.
    /// 3. Drop pending checkouts older than the TTL and release whatever
    ///    their holder still has.
    ///
    /// Only a failure to read the lock table fails the whole cycle.
    pub fn run_cycle(&self) -> Result<SweepReport, LockError> {
        let now = self.locks.now();
        let expired = self.locks.expired_locks()?;

        let mut released = Vec::with_capacity(expired.len());
        let mut errors = Vec::new();
        let mut holders: BTreeSet<HolderId> = BTreeSet::new();

        for lock in expired {
            let key = lock.key();
            match self.locks.release_expired(&key) {
                Ok(Some(removed)) => {
                    holders.insert(removed.holder_id.clone());
                    released.push(removed);
                }
                Ok(None) => {
                    tracing::debug!(%key, "Sweep: lock already released or renewed");
                }
                Err(e) => {
                    tracing::error!(%key, error = %e, "Sweep: failed to release expired lock");
                    errors.push(format!("{key}: {e}"));
                }
            }
        }

        let mut orders_removed = 0;
        for holder_id in &holders {
            match self.drop_orphaned_checkout(holder_id) {
                Ok(n) => orders_removed += n,
                Err(e) => {
                    tracing::error!(holder_id = %holder_id, error = %e, "Sweep: failed to drop pending checkout");
                    errors.push(format!("{holder_id}: {e}"));
                }
            }
        }

        let cutoff = now - chrono::Duration::seconds(self.locks.config().ttl_secs);
        match self.pending.remove_older_than(cutoff) {
            Ok(stale) => {
                for record in &stale {
                    match self.locks.release_locks(&record.holder_id) {
                        Ok(extra) => released.extend(extra),
                        Err(e) => {
                            tracing::error!(
                                holder_id = %record.holder_id,
                                error = %e,
                                "Sweep: failed to release locks of stale checkout"
                            );
                            errors.push(format!("{}: {e}", record.holder_id));
                        }
                    }
                }
                orders_removed += stale.len();
            }
            Err(e) => {
                tracing::error!(error = %e, "Sweep: failed to purge stale pending checkouts");
                errors.push(format!("pending checkouts: {e}"));
            }
        }

        let report = SweepReport {
            locks_released: released.len(),
            orders_removed,
            released,
            errors,
            swept_at: now,
        };

        if report.locks_released > 0 || report.orders_removed > 0 {
            tracing::info!(
                locks_released = report.locks_released,
                orders_removed = report.orders_removed,
                errors = report.errors.len(),
                "Sweep: reclaimed abandoned checkouts"
            );
        } else {
            tracing::debug!("Sweep: nothing to reclaim");
        }

        Ok(report)
    }

    fn drop_orphaned_checkout(&self, holder_id: &str) -> Result<usize, LockError> {
        if !self.locks.locks_held_by(holder_id)?.is_empty() {
            return Ok(0);
        }
        self.pending.remove_by_holder(holder_id)
    }
}
