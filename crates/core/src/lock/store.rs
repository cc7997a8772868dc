//! The lock table: `(vendor, item) -> Lock` plus holder and item indices.
//!
//! [`LockStore`] is pure storage with compare-and-set semantics. It holds
//! no policy beyond "a live lock can only be replaced by its own holder".
//! All three maps are updated inside one critical section so the indices
//! can never disagree with the primary map.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::lock::{Lock, LockError, LockKey};
use crate::types::{HolderId, ItemId, Timestamp};

/// Unsynchronized lock table. Only reachable through [`LockStore`].
#[derive(Debug, Default)]
pub(crate) struct LockTable {
    locks: HashMap<LockKey, Lock>,
    by_holder: HashMap<HolderId, BTreeSet<LockKey>>,
    by_item: HashMap<ItemId, BTreeSet<LockKey>>,
}

impl LockTable {
    /// Insert `lock`, displacing whatever occupied its key.
    pub(crate) fn insert(&mut self, lock: Lock) -> Option<Lock> {
        let key = lock.key();
        let previous = self.take(&key);
        self.by_holder
            .entry(lock.holder_id.clone())
            .or_default()
            .insert(key.clone());
        self.by_item
            .entry(lock.item_id.clone())
            .or_default()
            .insert(key.clone());
        self.locks.insert(key, lock);
        previous
    }

    /// Remove the entry for `key` unconditionally, keeping indices in step.
    pub(crate) fn take(&mut self, key: &LockKey) -> Option<Lock> {
        let lock = self.locks.remove(key)?;
        if let Some(keys) = self.by_holder.get_mut(&lock.holder_id) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_holder.remove(&lock.holder_id);
            }
        }
        if let Some(keys) = self.by_item.get_mut(&lock.item_id) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_item.remove(&lock.item_id);
            }
        }
        Some(lock)
    }

    /// Compare-and-set insert.
    ///
    /// Succeeds when the key is free, holds an expired lock, or holds a live
    /// lock of the same holder. Returns the displaced entry, if any.
    pub(crate) fn try_put(&mut self, lock: Lock, now: Timestamp) -> Result<Option<Lock>, LockError> {
        if let Some(existing) = self.locks.get(&lock.key()) {
            if !existing.is_expired(now) && existing.holder_id != lock.holder_id {
                return Err(LockError::ItemLocked {
                    vendor_id: existing.vendor_id.clone(),
                    item_id: existing.item_id.clone(),
                    holder_id: existing.holder_id.clone(),
                    expires_at: existing.expires_at,
                });
            }
        }
        Ok(self.insert(lock))
    }

    pub(crate) fn peek(&self, key: &LockKey) -> Option<&Lock> {
        self.locks.get(key)
    }

    pub(crate) fn get_live(&self, key: &LockKey, now: Timestamp) -> Option<&Lock> {
        self.locks.get(key).filter(|l| !l.is_expired(now))
    }

    pub(crate) fn keys_held_by(&self, holder_id: &str) -> Vec<LockKey> {
        self.by_holder
            .get(holder_id)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn locks_for_item(&self, item_id: &str) -> Vec<Lock> {
        self.by_item
            .get(item_id)
            .map(|keys| keys.iter().filter_map(|k| self.locks.get(k).cloned()).collect())
            .unwrap_or_default()
    }

    pub(crate) fn locks(&self) -> impl Iterator<Item = &Lock> {
        self.locks.values()
    }

    pub(crate) fn holder_count(&self) -> usize {
        self.by_holder.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }

    pub(crate) fn clear(&mut self) -> usize {
        let removed = self.locks.len();
        self.locks.clear();
        self.by_holder.clear();
        self.by_item.clear();
        removed
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        for (key, lock) in &self.locks {
            assert_eq!(key, &lock.key());
            assert!(self.by_holder[&lock.holder_id].contains(key));
            assert!(self.by_item[&lock.item_id].contains(key));
        }
        for (holder, keys) in &self.by_holder {
            assert!(!keys.is_empty());
            for key in keys {
                assert_eq!(&self.locks[key].holder_id, holder);
            }
        }
        for (item, keys) in &self.by_item {
            assert!(!keys.is_empty());
            for key in keys {
                assert_eq!(&self.locks[key].item_id, item);
            }
        }
    }
}

/// Concurrency-safe wrapper around the lock table.
///
/// One mutex guards the whole table. No I/O ever happens while it is held,
/// and a poisoned mutex is reported as [`LockError::StoreUnavailable`] so
/// callers fail closed instead of granting unsafe access.
#[derive(Debug, Default)]
pub struct LockStore {
    table: Mutex<LockTable>,
}

impl LockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> Result<MutexGuard<'_, LockTable>, LockError> {
        self.table
            .lock()
            .map_err(|_| LockError::StoreUnavailable("lock table mutex poisoned".into()))
    }

    /// Run `f` with exclusive access to the table. Used by the manager for
    /// multi-key operations that must be atomic as a whole.
    pub(crate) fn with_table<R>(&self, f: impl FnOnce(&mut LockTable) -> R) -> Result<R, LockError> {
        let mut table = self.table()?;
        Ok(f(&mut table))
    }

    /// Insert `lock` unless a live lock of another holder occupies its key.
    pub fn try_put(&self, lock: Lock, now: Timestamp) -> Result<Lock, LockError> {
        let mut table = self.table()?;
        table.try_put(lock.clone(), now)?;
        Ok(lock)
    }

    /// The live lock for `key`. Expired entries read as absent.
    pub fn get(&self, key: &LockKey, now: Timestamp) -> Result<Option<Lock>, LockError> {
        Ok(self.table()?.get_live(key, now).cloned())
    }

    /// The physical entry for `key`, expired or not.
    pub fn peek(&self, key: &LockKey) -> Result<Option<Lock>, LockError> {
        Ok(self.table()?.peek(key).cloned())
    }

    /// Remove the lock for `key` if `holder_id` holds it.
    ///
    /// Removing an absent key is `Ok(None)`.
    pub fn remove(&self, key: &LockKey, holder_id: &str) -> Result<Option<Lock>, LockError> {
        let mut table = self.table()?;
        match table.peek(key) {
            None => Ok(None),
            Some(lock) if lock.holder_id == holder_id => Ok(table.take(key)),
            Some(lock) => Err(LockError::NotHolder {
                item_id: key.item_id.clone(),
                holder_id: holder_id.to_string(),
                actual_holder: lock.holder_id.clone(),
            }),
        }
    }

    /// Remove the lock for `key` regardless of holder (administrative path).
    pub fn force_remove(&self, key: &LockKey) -> Result<Option<Lock>, LockError> {
        Ok(self.table()?.take(key))
    }

    /// Remove the lock for `key` only if it is still expired at `now`.
    ///
    /// A lock released and re-acquired since the caller looked is left alone.
    pub fn remove_expired(&self, key: &LockKey, now: Timestamp) -> Result<Option<Lock>, LockError> {
        let mut table = self.table()?;
        match table.peek(key) {
            Some(lock) if lock.is_expired(now) => Ok(table.take(key)),
            _ => Ok(None),
        }
    }

    pub fn list_by_holder(&self, holder_id: &str) -> Result<Vec<Lock>, LockError> {
        let table = self.table()?;
        Ok(table
            .keys_held_by(holder_id)
            .iter()
            .filter_map(|k| table.peek(k).cloned())
            .collect())
    }

    /// Every lock on `item_id` across all vendors, ordered by vendor.
    pub fn list_by_item(&self, item_id: &str) -> Result<Vec<Lock>, LockError> {
        Ok(self.table()?.locks_for_item(item_id))
    }

    /// Every physical entry, including expired ones not yet swept.
    pub fn snapshot(&self) -> Result<Vec<Lock>, LockError> {
        Ok(self.table()?.locks().cloned().collect())
    }

    /// Drop every lock. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, LockError> {
        Ok(self.table()?.clear())
    }

    pub fn len(&self) -> Result<usize, LockError> {
        Ok(self.table()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, LockError> {
        Ok(self.len()? == 0)
    }
}
