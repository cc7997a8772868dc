//! Pending checkout records.
//!
//! A record holds the business payload of a checkout between opening a
//! payment session and verifying it. It is keyed by the payment session id,
//! consumed exactly once on verification or abandonment, and swept once it
//! outlives the lock TTL.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::lock::{ItemSpec, LockError};
use crate::types::{HolderId, ItemId, Timestamp, VendorId};

/// Longest collector name accepted.
const MAX_COLLECTOR_NAME_LEN: usize = 100;

/// How the order will be collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Dinein,
    Takeaway,
}

impl OrderType {
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "dinein" => Ok(Self::Dinein),
            "takeaway" => Ok(Self::Takeaway),
            _ => Err(CoreError::Validation(
                "orderType must be either 'dinein' or 'takeaway'".to_string(),
            )),
        }
    }
}

/// One cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutItem {
    pub item_id: ItemId,
    /// Catalog kind of the item (e.g. "Retail", "Produce").
    pub kind: String,
    pub quantity: u32,
}

impl From<&CheckoutItem> for ItemSpec {
    fn from(item: &CheckoutItem) -> Self {
        ItemSpec::new(item.item_id.clone(), item.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingCheckout {
    pub session_id: String,
    /// Lock holder id for this checkout's item locks.
    pub holder_id: HolderId,
    pub vendor_id: VendorId,
    pub items: Vec<CheckoutItem>,
    /// Order total in minor currency units (paise).
    pub total_minor: i64,
    pub collector_name: String,
    pub collector_phone: String,
    pub order_type: OrderType,
    pub created_at: Timestamp,
}

/// Convert a decimal amount into minor units, rejecting non-positive totals.
pub fn to_minor_units(total: f64) -> Result<i64, CoreError> {
    if !total.is_finite() {
        return Err(CoreError::Validation("Invalid amount.".to_string()));
    }
    let minor = (total * 100.0).round();
    if minor <= 0.0 || minor > i64::MAX as f64 {
        return Err(CoreError::Validation("Invalid amount.".to_string()));
    }
    Ok(minor as i64)
}

/// Validate the collector contact fields and cart.
pub fn validate_checkout_fields(
    vendor_id: &str,
    items: &[CheckoutItem],
    collector_name: &str,
    collector_phone: &str,
) -> Result<(), CoreError> {
    if vendor_id.trim().is_empty()
        || collector_name.trim().is_empty()
        || collector_phone.trim().is_empty()
    {
        return Err(CoreError::Validation(
            "vendorId, items, total, collectorName, collectorPhone, and orderType are required."
                .to_string(),
        ));
    }
    if items.is_empty() {
        return Err(CoreError::Validation(
            "Items array must not be empty.".to_string(),
        ));
    }
    if collector_name.chars().count() > MAX_COLLECTOR_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "collectorName must not exceed {MAX_COLLECTOR_NAME_LEN} characters"
        )));
    }
    if !collector_phone
        .chars()
        .all(|c| c.is_ascii_digit() || c == '+' || c == ' ' || c == '-')
    {
        return Err(CoreError::Validation(
            "collectorPhone may only contain digits, spaces, '+' or '-'".to_string(),
        ));
    }
    for (i, item) in items.iter().enumerate() {
        if item.item_id.trim().is_empty() {
            return Err(CoreError::Validation(format!(
                "Item at index {i} is missing itemId"
            )));
        }
        if item.quantity == 0 {
            return Err(CoreError::Validation(format!(
                "Item {} must have a positive quantity",
                item.item_id
            )));
        }
    }
    Ok(())
}

/// In-memory map of session id to pending checkout.
#[derive(Debug, Default)]
pub struct PendingCheckoutStore {
    records: Mutex<HashMap<String, PendingCheckout>>,
}

impl PendingCheckoutStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> Result<MutexGuard<'_, HashMap<String, PendingCheckout>>, LockError> {
        self.records
            .lock()
            .map_err(|_| LockError::StoreUnavailable("pending checkout mutex poisoned".into()))
    }

    pub fn insert(&self, record: PendingCheckout) -> Result<(), LockError> {
        self.records()?.insert(record.session_id.clone(), record);
        Ok(())
    }

    pub fn get(&self, session_id: &str) -> Result<Option<PendingCheckout>, LockError> {
        Ok(self.records()?.get(session_id).cloned())
    }

    /// Remove and return the record. A second call for the same session
    /// returns `None`, which is how "consumed exactly once" is enforced.
    pub fn take(&self, session_id: &str) -> Result<Option<PendingCheckout>, LockError> {
        Ok(self.records()?.remove(session_id))
    }

    /// Drop every record belonging to `holder_id`. Returns how many went.
    pub fn remove_by_holder(&self, holder_id: &str) -> Result<usize, LockError> {
        let mut records = self.records()?;
        let before = records.len();
        records.retain(|_, r| r.holder_id != holder_id);
        Ok(before - records.len())
    }

    /// Drop records created strictly before `cutoff`.
    pub fn remove_older_than(&self, cutoff: Timestamp) -> Result<Vec<PendingCheckout>, LockError> {
        let mut records = self.records()?;
        let stale: Vec<String> = records
            .iter()
            .filter(|(_, r)| r.created_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        Ok(stale.iter().filter_map(|id| records.remove(id)).collect())
    }

    pub fn len(&self) -> Result<usize, LockError> {
        Ok(self.records()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, LockError> {
        Ok(self.len()? == 0)
    }

    /// Poison the records mutex so every later call fails.
    #[cfg(test)]
    pub(crate) fn poison(&self) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _records = self.records.lock();
            panic!("pending checkout store poisoned for test");
        }));
    }
}
