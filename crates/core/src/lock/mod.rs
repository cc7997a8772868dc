//! Item-level order locks.
//!
//! A lock is an exclusive hold on one `(vendor, item)` pair for one in-flight
//! checkout. Locks live only in process memory; a restart drops them all.
//!
//! - [`store::LockStore`] owns the lock table and its secondary indices.
//! - [`manager::LockManager`] implements the acquire/release protocol and the
//!   administrative overrides on top of the store.
//! - [`stats`] holds the introspection payloads returned to operators.

pub mod manager;
pub mod stats;
pub mod store;

use serde::{Deserialize, Serialize};

use crate::types::{HolderId, ItemId, Timestamp, VendorId};

pub use manager::LockManager;
pub use store::LockStore;

/// Default time a lock is held before it becomes eligible for sweeping.
/// Matches the 30 minute retention of pending payment sessions.
pub const DEFAULT_LOCK_TTL_SECS: i64 = 30 * 60;

/// Locks with less than this many seconds left are reported as nearing expiry.
pub const DEFAULT_NEARING_EXPIRY_SECS: i64 = 5 * 60;

/// Domain errors for the lock subsystem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    #[error("Item {item_id} of vendor {vendor_id} is locked by {holder_id} until {expires_at}")]
    ItemLocked {
        vendor_id: VendorId,
        item_id: ItemId,
        holder_id: HolderId,
        expires_at: Timestamp,
    },

    #[error("Lock on item {item_id} is held by {actual_holder}, not {holder_id}")]
    NotHolder {
        item_id: ItemId,
        holder_id: HolderId,
        actual_holder: HolderId,
    },

    #[error("Lock store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid lock request: {0}")]
    InvalidRequest(String),
}

/// Primary key of the lock table.
///
/// Ordering is by vendor then item, which is the global acquisition order
/// used by [`LockManager::acquire_locks`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LockKey {
    pub vendor_id: VendorId,
    pub item_id: ItemId,
}

impl LockKey {
    pub fn new(vendor_id: impl Into<VendorId>, item_id: impl Into<ItemId>) -> Self {
        Self {
            vendor_id: vendor_id.into(),
            item_id: item_id.into(),
        }
    }
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.vendor_id, self.item_id)
    }
}

/// An exclusive hold on one item for one checkout attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lock {
    pub vendor_id: VendorId,
    pub item_id: ItemId,
    pub holder_id: HolderId,
    pub quantity: u32,
    pub acquired_at: Timestamp,
    pub expires_at: Timestamp,
}

impl Lock {
    pub fn key(&self) -> LockKey {
        LockKey::new(self.vendor_id.clone(), self.item_id.clone())
    }

    /// A lock is expired once `now` reaches `expires_at`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// Seconds since acquisition.
    pub fn age_secs(&self, now: Timestamp) -> i64 {
        (now - self.acquired_at).num_seconds().max(0)
    }

    /// Seconds until expiry, zero once expired.
    pub fn remaining_secs(&self, now: Timestamp) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

/// One line of a lock request: which item and how much of it to reserve.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ItemSpec {
    pub item_id: ItemId,
    pub quantity: u32,
}

impl ItemSpec {
    pub fn new(item_id: impl Into<ItemId>, quantity: u32) -> Self {
        Self {
            item_id: item_id.into(),
            quantity,
        }
    }
}

/// Tunables for the lock manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    /// Fixed lifetime of every lock, in seconds. Locks are never renewed.
    pub ttl_secs: i64,
    /// Threshold for the "nearing expiry" statistic.
    pub nearing_expiry_secs: i64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_LOCK_TTL_SECS,
            nearing_expiry_secs: DEFAULT_NEARING_EXPIRY_SECS,
        }
    }
}
