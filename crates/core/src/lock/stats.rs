//! Introspection payloads for the admin control surface.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::lock::Lock;
use crate::types::{HolderId, ItemId, Timestamp, VendorId};

/// Aggregate lock counts.
///
/// Expired locks that the sweeper has not removed yet are still counted in
/// `total_active_locks`; `expired_awaiting_sweep` says how many of those
/// there are.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LockStatistics {
    pub total_active_locks: usize,
    pub expired_awaiting_sweep: usize,
    pub locks_nearing_expiry: usize,
    pub active_holders: usize,
    pub locks_per_vendor: BTreeMap<VendorId, usize>,
    pub oldest_lock_age_secs: Option<i64>,
    pub ttl_secs: i64,
    pub generated_at: Timestamp,
}

/// One lock as shown to operators, with derived timing fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LockDetail {
    #[serde(flatten)]
    pub lock: Lock,
    pub age_secs: i64,
    pub remaining_secs: i64,
    pub expired: bool,
}

/// Everything one holder currently has locked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HolderSummary {
    pub holder_id: HolderId,
    pub vendor_ids: Vec<VendorId>,
    pub item_ids: Vec<ItemId>,
    pub total_quantity: u64,
    pub oldest_acquired_at: Timestamp,
}

/// Full enumeration for debugging. Not meant for high-frequency polling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedLockStats {
    pub summary: LockStatistics,
    pub locks: Vec<LockDetail>,
    pub holders: Vec<HolderSummary>,
}

/// Result of an administrative force release.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForceReleaseReport {
    pub order_id: HolderId,
    pub released_count: usize,
    pub released: Vec<Lock>,
}

/// Result of wiping the lock table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClearReport {
    pub cleared: usize,
    pub cleared_at: Timestamp,
}

pub(crate) fn summarize<'a>(
    locks: impl Iterator<Item = &'a Lock>,
    active_holders: usize,
    now: Timestamp,
    ttl_secs: i64,
    nearing_expiry_secs: i64,
) -> LockStatistics {
    let mut stats = LockStatistics {
        total_active_locks: 0,
        expired_awaiting_sweep: 0,
        locks_nearing_expiry: 0,
        active_holders,
        locks_per_vendor: BTreeMap::new(),
        oldest_lock_age_secs: None,
        ttl_secs,
        generated_at: now,
    };

    for lock in locks {
        stats.total_active_locks += 1;
        *stats.locks_per_vendor.entry(lock.vendor_id.clone()).or_insert(0) += 1;

        if lock.is_expired(now) {
            stats.expired_awaiting_sweep += 1;
        } else if lock.remaining_secs(now) <= nearing_expiry_secs {
            stats.locks_nearing_expiry += 1;
        }

        let age = lock.age_secs(now);
        stats.oldest_lock_age_secs = Some(stats.oldest_lock_age_secs.map_or(age, |o| o.max(age)));
    }

    stats
}

pub(crate) fn detail(lock: &Lock, now: Timestamp) -> LockDetail {
    LockDetail {
        lock: lock.clone(),
        age_secs: lock.age_secs(now),
        remaining_secs: lock.remaining_secs(now),
        expired: lock.is_expired(now),
    }
}

pub(crate) fn holder_summaries<'a>(locks: impl Iterator<Item = &'a Lock>) -> Vec<HolderSummary> {
    let mut by_holder: HashMap<&str, HolderSummary> = HashMap::new();

    for lock in locks {
        let entry = by_holder
            .entry(lock.holder_id.as_str())
            .or_insert_with(|| HolderSummary {
                holder_id: lock.holder_id.clone(),
                vendor_ids: Vec::new(),
                item_ids: Vec::new(),
                total_quantity: 0,
                oldest_acquired_at: lock.acquired_at,
            });
        if !entry.vendor_ids.contains(&lock.vendor_id) {
            entry.vendor_ids.push(lock.vendor_id.clone());
        }
        entry.item_ids.push(lock.item_id.clone());
        entry.total_quantity += u64::from(lock.quantity);
        entry.oldest_acquired_at = entry.oldest_acquired_at.min(lock.acquired_at);
    }

    let mut holders: Vec<_> = by_holder
        .into_values()
        .map(|mut h| {
            h.vendor_ids.sort();
            h.item_ids.sort();
            h
        })
        .collect();
    holders.sort_by(|a, b| a.holder_id.cmp(&b.holder_id));
    holders
}
