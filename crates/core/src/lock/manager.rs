//! Acquire/release protocol over the lock table.
//!
//! [`LockManager`] is the only way application code touches locks. Checkout
//! flows use [`acquire_locks`](LockManager::acquire_locks) and
//! [`release_locks`](LockManager::release_locks); the sweeper and the admin
//! surface use the override operations further down, which skip the
//! holder-match check.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::lock::stats::{
    self, ClearReport, DetailedLockStats, ForceReleaseReport, LockStatistics,
};
use crate::lock::store::{LockStore, LockTable};
use crate::lock::{ItemSpec, Lock, LockConfig, LockError, LockKey};
use crate::types::{ItemId, Timestamp};

/// Policy layer over [`LockStore`]. Share it behind an `Arc`.
pub struct LockManager {
    store: LockStore,
    clock: Arc<dyn Clock>,
    config: LockConfig,
}

impl LockManager {
    pub fn new(config: LockConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: LockStore::new(),
            clock,
            config,
        }
    }

    /// Manager reading wall-clock time.
    pub fn with_system_clock(config: LockConfig) -> Self {
        Self::new(config, Arc::new(SystemClock))
    }

    pub fn config(&self) -> LockConfig {
        self.config
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // -----------------------------------------------------------------------
    // Checkout protocol
    // -----------------------------------------------------------------------

    /// Lock every item in `items` for `holder_id`, or none of them.
    ///
    /// Items are taken in ascending `(vendor, item)` order. If any item is
    /// held live by another holder, everything placed by this call is undone
    /// and [`LockError::ItemLocked`] names the contended item. Locks this
    /// holder already had keep their original expiry.
    pub fn acquire_locks(
        &self,
        holder_id: &str,
        vendor_id: &str,
        items: &[ItemSpec],
    ) -> Result<Vec<Lock>, LockError> {
        let wanted = normalize_request(holder_id, vendor_id, items)?;
        let now = self.clock.now();
        let ttl = chrono::Duration::seconds(self.config.ttl_secs);

        let result = self.store.with_table(|table| {
            let mut placed: Vec<(LockKey, Option<Lock>)> = Vec::with_capacity(wanted.len());
            let mut granted = Vec::with_capacity(wanted.len());

            for (item_id, quantity) in &wanted {
                let key = LockKey::new(vendor_id, item_id.clone());
                let (acquired_at, expires_at) = match table.get_live(&key, now) {
                    Some(existing) if existing.holder_id == holder_id => {
                        (existing.acquired_at, existing.expires_at)
                    }
                    _ => (now, now + ttl),
                };
                let lock = Lock {
                    vendor_id: vendor_id.to_string(),
                    item_id: item_id.clone(),
                    holder_id: holder_id.to_string(),
                    quantity: *quantity,
                    acquired_at,
                    expires_at,
                };

                match table.try_put(lock.clone(), now) {
                    Ok(previous) => {
                        placed.push((key, previous));
                        granted.push(lock);
                    }
                    Err(err) => {
                        roll_back(table, placed, now);
                        return Err(err);
                    }
                }
            }

            Ok(granted)
        })?;

        match &result {
            Ok(granted) => tracing::debug!(
                holder_id,
                vendor_id,
                items = granted.len(),
                "Item locks acquired"
            ),
            Err(LockError::ItemLocked {
                item_id,
                holder_id: owner,
                ..
            }) => tracing::debug!(
                holder_id,
                vendor_id,
                %item_id,
                owner = %owner,
                "Item lock contended, request rolled back"
            ),
            Err(_) => {}
        }

        result
    }

    /// Release every lock held by `holder_id`.
    ///
    /// Idempotent: releasing a holder with nothing locked returns an empty list.
    pub fn release_locks(&self, holder_id: &str) -> Result<Vec<Lock>, LockError> {
        let released = self.release_all(holder_id)?;
        if !released.is_empty() {
            tracing::debug!(holder_id, released = released.len(), "Item locks released");
        }
        Ok(released)
    }

    /// Release one lock. Fails with [`LockError::NotHolder`] if another
    /// holder owns it; releasing an unlocked item is a no-op.
    pub fn release_lock(
        &self,
        holder_id: &str,
        vendor_id: &str,
        item_id: &str,
    ) -> Result<Option<Lock>, LockError> {
        let key = LockKey::new(vendor_id, item_id);
        match self.store.remove(&key, holder_id) {
            Err(err @ LockError::NotHolder { .. }) => {
                tracing::warn!(holder_id, %key, error = %err, "Release by non-holder rejected");
                Err(err)
            }
            other => other,
        }
    }

    /// Whether a live lock exists on `(vendor_id, item_id)`.
    pub fn is_locked(&self, vendor_id: &str, item_id: &str) -> Result<bool, LockError> {
        Ok(self.get_lock(vendor_id, item_id)?.is_some())
    }

    /// The live lock on `(vendor_id, item_id)`, if any.
    pub fn get_lock(&self, vendor_id: &str, item_id: &str) -> Result<Option<Lock>, LockError> {
        self.store
            .get(&LockKey::new(vendor_id, item_id), self.clock.now())
    }

    pub fn locks_held_by(&self, holder_id: &str) -> Result<Vec<Lock>, LockError> {
        self.store.list_by_holder(holder_id)
    }

    // -----------------------------------------------------------------------
    // Administrative path
    // -----------------------------------------------------------------------

    /// Release every lock of `order_id` without any holder negotiation.
    pub fn force_release_order_locks(&self, order_id: &str) -> Result<ForceReleaseReport, LockError> {
        let released = self.release_all(order_id)?;
        if released.is_empty() {
            tracing::info!(order_id, "Force release: order held no locks");
        } else {
            tracing::warn!(order_id, released = released.len(), "Force released order locks");
        }
        Ok(ForceReleaseReport {
            order_id: order_id.to_string(),
            released_count: released.len(),
            released,
        })
    }

    /// Wipe the whole lock table.
    pub fn clear_all_locks(&self) -> Result<ClearReport, LockError> {
        let cleared = self.store.clear()?;
        tracing::warn!(cleared, "Cleared all item locks");
        Ok(ClearReport {
            cleared,
            cleared_at: self.clock.now(),
        })
    }

    /// Locks referencing `item_id`, across all vendors unless `vendor_id` is
    /// given. Expired entries not yet swept are included.
    pub fn get_locks_for_item(
        &self,
        item_id: &str,
        vendor_id: Option<&str>,
    ) -> Result<Vec<Lock>, LockError> {
        let mut locks = self.store.list_by_item(item_id)?;
        if let Some(vendor_id) = vendor_id {
            locks.retain(|l| l.vendor_id == vendor_id);
        }
        Ok(locks)
    }

    /// Physically present locks whose expiry has passed.
    pub fn expired_locks(&self) -> Result<Vec<Lock>, LockError> {
        let now = self.clock.now();
        let mut expired: Vec<_> = self
            .store
            .snapshot()?
            .into_iter()
            .filter(|l| l.is_expired(now))
            .collect();
        expired.sort_by(|a, b| a.expires_at.cmp(&b.expires_at));
        Ok(expired)
    }

    /// Remove the lock at `key` if it is still expired. Used by the sweeper;
    /// a lock that was released and re-acquired meanwhile is left alone.
    pub fn release_expired(&self, key: &LockKey) -> Result<Option<Lock>, LockError> {
        self.store.remove_expired(key, self.clock.now())
    }

    pub fn lock_statistics(&self) -> Result<LockStatistics, LockError> {
        let now = self.clock.now();
        self.store.with_table(|table| {
            stats::summarize(
                table.locks(),
                table.holder_count(),
                now,
                self.config.ttl_secs,
                self.config.nearing_expiry_secs,
            )
        })
    }

    pub fn detailed_stats(&self) -> Result<DetailedLockStats, LockError> {
        let now = self.clock.now();
        self.store.with_table(|table| {
            let summary = stats::summarize(
                table.locks(),
                table.holder_count(),
                now,
                self.config.ttl_secs,
                self.config.nearing_expiry_secs,
            );
            let mut locks: Vec<_> = table.locks().map(|l| stats::detail(l, now)).collect();
            locks.sort_by(|a, b| {
                a.lock
                    .acquired_at
                    .cmp(&b.lock.acquired_at)
                    .then_with(|| a.lock.key().cmp(&b.lock.key()))
            });
            let holders = stats::holder_summaries(table.locks());
            DetailedLockStats {
                summary,
                locks,
                holders,
            }
        })
    }

    /// Number of physical entries, expired or not.
    pub fn lock_count(&self) -> Result<usize, LockError> {
        self.store.len()
    }

    fn release_all(&self, holder_id: &str) -> Result<Vec<Lock>, LockError> {
        self.store.with_table(|table| {
            table
                .keys_held_by(holder_id)
                .iter()
                .filter_map(|key| table.take(key))
                .collect()
        })
    }
}

/// Undo placements in reverse order. A displaced live lock can only have
/// been this holder's own, so it is restored; anything else is dropped.
fn roll_back(table: &mut LockTable, placed: Vec<(LockKey, Option<Lock>)>, now: Timestamp) {
    for (key, previous) in placed.into_iter().rev() {
        match previous {
            Some(prev) if !prev.is_expired(now) => {
                table.insert(prev);
            }
            _ => {
                table.take(&key);
            }
        }
    }
}

/// Validate a request and merge duplicate items into sorted `(item, qty)`.
fn normalize_request(
    holder_id: &str,
    vendor_id: &str,
    items: &[ItemSpec],
) -> Result<BTreeMap<ItemId, u32>, LockError> {
    if holder_id.trim().is_empty() {
        return Err(LockError::InvalidRequest("holder id must not be empty".into()));
    }
    if vendor_id.trim().is_empty() {
        return Err(LockError::InvalidRequest("vendor id must not be empty".into()));
    }
    if items.is_empty() {
        return Err(LockError::InvalidRequest("at least one item is required".into()));
    }

    let mut wanted: BTreeMap<ItemId, u32> = BTreeMap::new();
    for (i, spec) in items.iter().enumerate() {
        if spec.item_id.trim().is_empty() {
            return Err(LockError::InvalidRequest(format!(
                "item at index {i} has an empty id"
            )));
        }
        if spec.quantity == 0 {
            return Err(LockError::InvalidRequest(format!(
                "item {} must have a positive quantity",
                spec.item_id
            )));
        }
        let total = wanted.entry(spec.item_id.clone()).or_insert(0);
        *total = total.checked_add(spec.quantity).ok_or_else(|| {
            LockError::InvalidRequest(format!("quantity overflow for item {}", spec.item_id))
        })?;
    }
    Ok(wanted)
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;

    use super::*;
    use crate::clock::ManualClock;
    use assert_matches::assert_matches;
    use chrono::Utc;

    fn manager() -> (LockManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let manager = LockManager::new(
            LockConfig {
                ttl_secs: 1800,
                nearing_expiry_secs: 300,
            },
            clock.clone(),
        );
        (manager, clock)
    }

    fn items(ids: &[&str]) -> Vec<ItemSpec> {
        ids.iter().map(|id| ItemSpec::new(*id, 1)).collect()
    }

    fn assert_consistent(manager: &LockManager) {
        manager.store.with_table(|t| t.assert_consistent()).unwrap();
    }

    // -- acquire_locks --------------------------------------------------------

    #[test]
    fn acquire_returns_locks_in_item_order() {
        let (manager, _) = manager();
        let granted = manager
            .acquire_locks("h1", "v1", &items(&["i3", "i1", "i2"]))
            .unwrap();

        let ids: Vec<_> = granted.iter().map(|l| l.item_id.as_str()).collect();
        assert_eq!(ids, vec!["i1", "i2", "i3"]);
        assert!(granted.iter().all(|l| l.holder_id == "h1"));
    }

    #[test]
    fn acquire_sets_ttl_from_config() {
        let (manager, clock) = manager();
        let granted = manager.acquire_locks("h1", "v1", &items(&["i1"])).unwrap();
        assert_eq!(granted[0].acquired_at, clock.now());
        assert_eq!(
            granted[0].expires_at,
            clock.now() + chrono::Duration::seconds(1800)
        );
    }

    #[test]
    fn contended_item_is_rejected_with_owner() {
        let (manager, _) = manager();
        manager.acquire_locks("h1", "v1", &items(&["i1"])).unwrap();

        let err = manager.acquire_locks("h2", "v1", &items(&["i1"])).unwrap_err();
        assert_matches!(
            err,
            LockError::ItemLocked { ref item_id, ref holder_id, .. }
                if item_id == "i1" && holder_id == "h1"
        );
    }

    #[test]
    fn partial_cart_is_rolled_back() {
        let (manager, _) = manager();
        manager.acquire_locks("other", "v1", &items(&["I2"])).unwrap();

        let err = manager
            .acquire_locks("h1", "v1", &items(&["I1", "I2"]))
            .unwrap_err();

        assert_matches!(err, LockError::ItemLocked { ref item_id, .. } if item_id == "I2");
        assert!(!manager.is_locked("v1", "I1").unwrap());
        assert!(manager.locks_held_by("h1").unwrap().is_empty());
        assert_consistent(&manager);
    }

    #[test]
    fn rollback_restores_holders_existing_lock() {
        let (manager, clock) = manager();
        manager.acquire_locks("h1", "v1", &[ItemSpec::new("a", 1)]).unwrap();
        let original = manager.get_lock("v1", "a").unwrap().unwrap();
        manager.acquire_locks("h2", "v1", &items(&["b"])).unwrap();

        clock.advance_secs(5);
        let err = manager
            .acquire_locks("h1", "v1", &[ItemSpec::new("a", 3), ItemSpec::new("b", 1)])
            .unwrap_err();
        assert_matches!(err, LockError::ItemLocked { .. });

        assert_eq!(manager.get_lock("v1", "a").unwrap(), Some(original));
        assert_consistent(&manager);
    }

    #[test]
    fn reacquire_by_same_holder_keeps_expiry() {
        let (manager, clock) = manager();
        let first = manager.acquire_locks("h1", "v1", &items(&["i1"])).unwrap();

        clock.advance_secs(600);
        let second = manager
            .acquire_locks("h1", "v1", &[ItemSpec::new("i1", 4)])
            .unwrap();

        assert_eq!(second[0].quantity, 4);
        assert_eq!(second[0].expires_at, first[0].expires_at);
        assert_eq!(second[0].acquired_at, first[0].acquired_at);
    }

    #[test]
    fn duplicate_items_are_merged() {
        let (manager, _) = manager();
        let granted = manager
            .acquire_locks(
                "h1",
                "v1",
                &[ItemSpec::new("i1", 2), ItemSpec::new("i1", 3)],
            )
            .unwrap();
        assert_eq!(granted.len(), 1);
        assert_eq!(granted[0].quantity, 5);
    }

    #[test]
    fn invalid_requests_do_not_touch_store() {
        let (manager, _) = manager();
        assert_matches!(
            manager.acquire_locks("h1", "v1", &[]),
            Err(LockError::InvalidRequest(_))
        );
        assert_matches!(
            manager.acquire_locks("h1", "v1", &[ItemSpec::new("i1", 0)]),
            Err(LockError::InvalidRequest(_))
        );
        assert_matches!(
            manager.acquire_locks("", "v1", &items(&["i1"])),
            Err(LockError::InvalidRequest(_))
        );
        assert_matches!(
            manager.acquire_locks("h1", " ", &items(&["i1"])),
            Err(LockError::InvalidRequest(_))
        );
        assert_eq!(manager.lock_count().unwrap(), 0);
    }

    #[test]
    fn expired_lock_is_free_before_sweep() {
        let (manager, clock) = manager();
        manager.acquire_locks("h1", "v1", &items(&["i1"])).unwrap();

        clock.advance_secs(1800);
        assert!(!manager.is_locked("v1", "i1").unwrap());

        let granted = manager.acquire_locks("h2", "v1", &items(&["i1"])).unwrap();
        assert_eq!(granted[0].holder_id, "h2");
        assert!(manager.locks_held_by("h1").unwrap().is_empty());
        assert_consistent(&manager);
    }

    // -- release --------------------------------------------------------------

    #[test]
    fn release_twice_is_noop_second_time() {
        let (manager, _) = manager();
        manager.acquire_locks("h1", "v1", &items(&["i1", "i2"])).unwrap();

        assert_eq!(manager.release_locks("h1").unwrap().len(), 2);
        assert!(manager.release_locks("h1").unwrap().is_empty());
        assert!(manager.release_locks("never-held").unwrap().is_empty());
    }

    #[test]
    fn release_leaves_other_holders_alone() {
        let (manager, _) = manager();
        manager.acquire_locks("h1", "v1", &items(&["i1"])).unwrap();
        manager.acquire_locks("h2", "v1", &items(&["i2"])).unwrap();

        manager.release_locks("h1").unwrap();
        assert!(manager.is_locked("v1", "i2").unwrap());
    }

    #[test]
    fn single_release_by_non_holder_is_rejected() {
        let (manager, _) = manager();
        manager.acquire_locks("h1", "v1", &items(&["i1"])).unwrap();

        assert_matches!(
            manager.release_lock("h2", "v1", "i1"),
            Err(LockError::NotHolder { .. })
        );
        assert!(manager.release_lock("h1", "v1", "i1").unwrap().is_some());
        assert_eq!(manager.release_lock("h1", "v1", "i1").unwrap(), None);
    }

    // -- admin ----------------------------------------------------------------

    #[test]
    fn force_release_reports_what_was_removed() {
        let (manager, _) = manager();
        manager.acquire_locks("order-1", "v1", &items(&["i1", "i2"])).unwrap();

        let report = manager.force_release_order_locks("order-1").unwrap();
        assert_eq!(report.released_count, 2);
        assert_eq!(report.released.len(), 2);

        let again = manager.force_release_order_locks("order-1").unwrap();
        assert_eq!(again.released_count, 0);
        assert!(again.released.is_empty());
    }

    #[test]
    fn clear_all_returns_count() {
        let (manager, _) = manager();
        manager.acquire_locks("h1", "v1", &items(&["i1", "i2"])).unwrap();
        manager.acquire_locks("h2", "v2", &items(&["i1"])).unwrap();

        assert_eq!(manager.clear_all_locks().unwrap().cleared, 3);
        assert_eq!(manager.lock_count().unwrap(), 0);
        assert_eq!(manager.clear_all_locks().unwrap().cleared, 0);
    }

    #[test]
    fn locks_for_item_can_be_scoped_to_vendor() {
        let (manager, _) = manager();
        manager.acquire_locks("h1", "v1", &items(&["i1"])).unwrap();
        manager.acquire_locks("h2", "v2", &items(&["i1"])).unwrap();

        assert_eq!(manager.get_locks_for_item("i1", None).unwrap().len(), 2);
        let scoped = manager.get_locks_for_item("i1", Some("v2")).unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].holder_id, "h2");
        assert!(manager.get_locks_for_item("nope", None).unwrap().is_empty());
    }

    #[test]
    fn statistics_count_expired_until_swept() {
        let (manager, clock) = manager();
        manager.acquire_locks("h1", "v1", &items(&["i1"])).unwrap();
        clock.advance_secs(1600);
        manager.acquire_locks("h2", "v2", &items(&["i2"])).unwrap();
        clock.advance_secs(250);

        let stats = manager.lock_statistics().unwrap();
        assert_eq!(stats.total_active_locks, 2);
        assert_eq!(stats.expired_awaiting_sweep, 1);
        assert_eq!(stats.active_holders, 2);
        assert_eq!(stats.oldest_lock_age_secs, Some(1850));

        let expired = manager.expired_locks().unwrap();
        assert_eq!(expired.len(), 1);
        assert!(manager.release_expired(&expired[0].key()).unwrap().is_some());
        assert_eq!(manager.lock_statistics().unwrap().total_active_locks, 1);
    }

    #[test]
    fn detailed_stats_lists_every_lock() {
        let (manager, clock) = manager();
        manager.acquire_locks("h1", "v1", &items(&["i1", "i2"])).unwrap();
        clock.advance_secs(10);

        let detailed = manager.detailed_stats().unwrap();
        assert_eq!(detailed.locks.len(), 2);
        assert_eq!(detailed.locks[0].age_secs, 10);
        assert_eq!(detailed.locks[0].remaining_secs, 1790);
        assert!(!detailed.locks[0].expired);
        assert_eq!(detailed.holders.len(), 1);
        assert_eq!(detailed.summary.total_active_locks, 2);
    }

    // -- concurrency ----------------------------------------------------------

    #[test]
    fn concurrent_acquire_grants_exactly_one() {
        const CALLERS: usize = 32;
        let manager = LockManager::with_system_clock(LockConfig::default());
        let barrier = Barrier::new(CALLERS);

        let outcomes: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..CALLERS)
                .map(|n| {
                    let manager = &manager;
                    let barrier = &barrier;
                    s.spawn(move || {
                        barrier.wait();
                        manager.acquire_locks(&format!("h{n}"), "v1", &items(&["hot"]))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let wins = outcomes.iter().filter(|o| o.is_ok()).count();
        assert_eq!(wins, 1);
        assert!(outcomes
            .iter()
            .filter_map(|o| o.as_ref().err())
            .all(|e| matches!(e, LockError::ItemLocked { .. })));
    }

    #[test]
    fn concurrent_overlapping_carts_never_share_an_item() {
        const CALLERS: usize = 24;
        let manager = LockManager::with_system_clock(LockConfig::default());
        let barrier = Barrier::new(CALLERS);
        let catalog = ["a", "b", "c", "d", "e", "f"];

        let winners: Vec<(String, Vec<Lock>)> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..CALLERS)
                .map(|n| {
                    let manager = &manager;
                    let barrier = &barrier;
                    // Each cart spans three neighbouring items, listed in reverse
                    // for odd callers to exercise the ordering.
                    let mut cart: Vec<&str> = (0..3).map(|k| catalog[(n + k) % catalog.len()]).collect();
                    if n % 2 == 1 {
                        cart.reverse();
                    }
                    s.spawn(move || {
                        barrier.wait();
                        let holder = format!("h{n}");
                        manager
                            .acquire_locks(&holder, "v1", &items(&cart))
                            .ok()
                            .map(|locks| (holder, locks))
                    })
                })
                .collect();
            handles.into_iter().filter_map(|h| h.join().unwrap()).collect()
        });

        assert!(!winners.is_empty());
        let mut seen = std::collections::HashSet::new();
        for (holder, locks) in &winners {
            assert_eq!(locks.len(), 3);
            for lock in locks {
                assert!(seen.insert(lock.item_id.clone()), "item granted twice");
                assert_eq!(&manager.get_lock("v1", &lock.item_id).unwrap().unwrap().holder_id, holder);
            }
        }
        assert_eq!(manager.lock_count().unwrap(), seen.len());
        assert_consistent(&manager);
    }
}
