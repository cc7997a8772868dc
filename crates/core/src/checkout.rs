//! Guest checkout flow built on the lock manager.
//!
//! A checkout runs in two steps:
//!
//! 1. [`CheckoutService::open_session`] locks every cart item for a new
//!    payment session and stores the pending checkout record.
//! 2. [`CheckoutService::verify_payment`] checks the gateway signature,
//!    consumes the record and records the order.
//!
//! Once the signature checks out, whatever happens in step 2 (success, an
//! expired reservation, recorder failure, or the future being dropped), the
//! session's locks are released by a drop guard. A bad signature leaves the
//! session as it was. [`CheckoutService::abandon`] releases them explicitly.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use uuid::Uuid;

use crate::error::CoreError;
use crate::lock::{ItemSpec, Lock, LockManager};
use crate::pending::{
    to_minor_units, validate_checkout_fields, CheckoutItem, OrderType, PendingCheckout,
    PendingCheckoutStore,
};
use crate::types::{HolderId, Timestamp, VendorId};

/// Currency of every payment session.
pub const CURRENCY: &str = "INR";

/// Input for opening a checkout session.
#[derive(Debug, Clone)]
pub struct OpenCheckout {
    pub vendor_id: VendorId,
    pub items: Vec<CheckoutItem>,
    /// Order total in major units (rupees).
    pub total: f64,
    pub collector_name: String,
    pub collector_phone: String,
    pub order_type: String,
}

/// A payment session waiting for verification.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub amount_minor: i64,
    pub currency: &'static str,
    pub receipt: String,
    pub expires_at: Timestamp,
    pub locks: Vec<Lock>,
}

/// Identifiers assigned by the order recorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedOrder {
    pub order_id: String,
    pub order_number: String,
}

/// A verified, recorded order.
#[derive(Debug, Clone, Serialize)]
pub struct CompletedCheckout {
    pub order_id: String,
    pub order_number: String,
    pub session_id: String,
    pub payment_id: String,
    pub vendor_id: VendorId,
    pub items: Vec<CheckoutItem>,
    pub total_minor: i64,
    pub collector_name: String,
    pub collector_phone: String,
    pub order_type: OrderType,
    pub completed_at: Timestamp,
}

/// What an abandon call cleaned up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbandonReport {
    pub session_id: String,
    pub released_locks: usize,
    pub record_removed: bool,
}

/// Persists completed orders. Implemented by the order service; the
/// checkout flow only needs an id and a human-facing order number back.
#[async_trait]
pub trait OrderRecorder: Send + Sync {
    async fn record_order(
        &self,
        checkout: &PendingCheckout,
        payment_id: &str,
    ) -> Result<RecordedOrder, CoreError>;
}

/// Process-local order recorder. Issues sequential order numbers per process.
#[derive(Debug, Default)]
pub struct InMemoryOrderLedger {
    orders: Mutex<Vec<RecordedOrder>>,
}

impl InMemoryOrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn orders(&self) -> Vec<RecordedOrder> {
        self.orders
            .lock()
            .map(|o| o.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl OrderRecorder for InMemoryOrderLedger {
    async fn record_order(
        &self,
        checkout: &PendingCheckout,
        _payment_id: &str,
    ) -> Result<RecordedOrder, CoreError> {
        let mut orders = self
            .orders
            .lock()
            .map_err(|_| CoreError::Internal("order ledger mutex poisoned".into()))?;
        let order = RecordedOrder {
            order_id: Uuid::new_v4().to_string(),
            order_number: format!(
                "ORD-{}-{:06}",
                vendor_suffix(&checkout.vendor_id).to_uppercase(),
                orders.len() + 1
            ),
        };
        orders.push(order.clone());
        Ok(order)
    }
}

/// Releases a holder's locks when dropped, unless disarmed.
struct ReleaseGuard<'a> {
    locks: &'a LockManager,
    holder_id: HolderId,
    armed: bool,
}

impl<'a> ReleaseGuard<'a> {
    fn new(locks: &'a LockManager, holder_id: &str) -> Self {
        Self {
            locks,
            holder_id: holder_id.to_string(),
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.locks.release_locks(&self.holder_id) {
            tracing::error!(holder_id = %self.holder_id, error = %e, "Failed to release checkout locks");
        }
    }
}

pub struct CheckoutService {
    locks: Arc<LockManager>,
    pending: Arc<PendingCheckoutStore>,
    recorder: Arc<dyn OrderRecorder>,
    signing_secret: String,
}

impl CheckoutService {
    pub fn new(
        locks: Arc<LockManager>,
        pending: Arc<PendingCheckoutStore>,
        recorder: Arc<dyn OrderRecorder>,
        signing_secret: impl Into<String>,
    ) -> Self {
        Self {
            locks,
            pending,
            recorder,
            signing_secret: signing_secret.into(),
        }
    }

    /// Lock the cart and open a payment session.
    ///
    /// Contention surfaces as `CoreError::Lock(LockError::ItemLocked)`; the
    /// caller decides whether and when to retry.
    pub fn open_session(&self, request: OpenCheckout) -> Result<CheckoutSession, CoreError> {
        validate_checkout_fields(
            &request.vendor_id,
            &request.items,
            &request.collector_name,
            &request.collector_phone,
        )?;
        let order_type = OrderType::parse(&request.order_type)?;
        let amount_minor = to_minor_units(request.total)?;

        let session_id = format!("order_{}", Uuid::new_v4().simple());
        let specs: Vec<ItemSpec> = request.items.iter().map(ItemSpec::from).collect();

        let locks = self
            .locks
            .acquire_locks(&session_id, &request.vendor_id, &specs)?;
        let guard = ReleaseGuard::new(&self.locks, &session_id);

        let now = self.locks.now();
        let expires_at = locks
            .iter()
            .map(|l| l.expires_at)
            .min()
            .unwrap_or(now);
        let receipt = format!(
            "vendor-{}-{}",
            now.timestamp_millis(),
            vendor_suffix(&request.vendor_id)
        );

        self.pending.insert(PendingCheckout {
            session_id: session_id.clone(),
            holder_id: session_id.clone(),
            vendor_id: request.vendor_id.clone(),
            items: request.items,
            total_minor: amount_minor,
            collector_name: request.collector_name,
            collector_phone: request.collector_phone,
            order_type,
            created_at: now,
        })?;
        guard.disarm();

        tracing::info!(
            session_id = %session_id,
            vendor_id = %request.vendor_id,
            amount_minor,
            items = locks.len(),
            "Checkout session opened"
        );

        Ok(CheckoutSession {
            session_id,
            amount_minor,
            currency: CURRENCY,
            receipt,
            expires_at,
            locks,
        })
    }

    /// Verify the gateway signature and turn the session into an order.
    ///
    /// A bad signature leaves the session untouched so the buyer can retry.
    /// Past that check, the session's locks are released on every path out
    /// of this function, and the order is only recorded while the session
    /// still holds a live lock on every cart item.
    pub async fn verify_payment(
        &self,
        session_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<CompletedCheckout, CoreError> {
        if !verify_signature(&self.signing_secret, session_id, payment_id, signature) {
            tracing::warn!(session_id, "Payment signature verification failed");
            return Err(CoreError::Unauthorized(
                "Payment signature verification failed.".to_string(),
            ));
        }

        let _release = ReleaseGuard::new(&self.locks, session_id);

        let record = self
            .pending
            .take(session_id)?
            .ok_or_else(|| CoreError::NotFound {
                entity: "PendingCheckout",
                id: session_id.to_string(),
            })?;

        self.ensure_items_reserved(&record)?;

        let order = self.recorder.record_order(&record, payment_id).await?;

        tracing::info!(
            session_id,
            order_id = %order.order_id,
            order_number = %order.order_number,
            "Payment verified and order recorded"
        );

        Ok(CompletedCheckout {
            order_id: order.order_id,
            order_number: order.order_number,
            session_id: record.session_id,
            payment_id: payment_id.to_string(),
            vendor_id: record.vendor_id,
            items: record.items,
            total_minor: record.total_minor,
            collector_name: record.collector_name,
            collector_phone: record.collector_phone,
            order_type: record.order_type,
            completed_at: self.locks.now(),
        })
    }

    /// Fail with `Conflict` unless `record`'s holder has a live lock on each
    /// of its items.
    fn ensure_items_reserved(&self, record: &PendingCheckout) -> Result<(), CoreError> {
        let now = self.locks.now();
        let held = self.locks.locks_held_by(&record.holder_id)?;
        let lost: Vec<&str> = record
            .items
            .iter()
            .filter(|item| {
                !held.iter().any(|l| {
                    l.vendor_id == record.vendor_id
                        && l.item_id == item.item_id
                        && !l.is_expired(now)
                })
            })
            .map(|item| item.item_id.as_str())
            .collect();

        if lost.is_empty() {
            return Ok(());
        }
        tracing::warn!(
            session_id = %record.session_id,
            lost = ?lost,
            "Checkout reservation expired before payment was verified"
        );
        Err(CoreError::Conflict(format!(
            "Checkout session expired; items {} are no longer reserved",
            lost.join(", ")
        )))
    }

    /// Give up on a session. Safe to call any number of times.
    pub fn abandon(&self, session_id: &str) -> Result<AbandonReport, CoreError> {
        let released = self.locks.release_locks(session_id)?;
        let record_removed = self.pending.take(session_id)?.is_some();
        if record_removed || !released.is_empty() {
            tracing::info!(session_id, released = released.len(), "Checkout session abandoned");
        }
        Ok(AbandonReport {
            session_id: session_id.to_string(),
            released_locks: released.len(),
            record_removed,
        })
    }
}

/// Last six characters of a vendor id, as used in receipts and order numbers.
fn vendor_suffix(vendor_id: &str) -> &str {
    let start = vendor_id
        .char_indices()
        .rev()
        .nth(5)
        .map_or(0, |(i, _)| i);
    &vendor_id[start..]
}

// ---------------------------------------------------------------------------
// Gateway signature
// ---------------------------------------------------------------------------

type HmacSha256 = Hmac<Sha256>;

fn payment_mac(secret: &str, session_id: &str, payment_id: &str) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(session_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    mac
}

/// Hex HMAC-SHA256 over `"{session_id}|{payment_id}"`, as the gateway signs it.
pub fn sign_payment(secret: &str, session_id: &str, payment_id: &str) -> String {
    hex::encode(payment_mac(secret, session_id, payment_id).finalize().into_bytes())
}

/// Constant-time check of a hex signature.
pub fn verify_signature(secret: &str, session_id: &str, payment_id: &str, signature: &str) -> bool {
    match hex::decode(signature) {
        Some(bytes) => payment_mac(secret, session_id, payment_id)
            .verify_slice(&bytes)
            .is_ok(),
        None => false,
    }
}

mod hex {
    /// Encode bytes as a lowercase hex string.
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Decode a hex string; `None` on odd length or a non-hex digit.
    pub fn decode(s: &str) -> Option<Vec<u8>> {
        if s.len() % 2 != 0 {
            return None;
        }
        s.as_bytes()
            .chunks(2)
            .map(|pair| {
                let hi = (pair[0] as char).to_digit(16)?;
                let lo = (pair[1] as char).to_digit(16)?;
                Some((hi * 16 + lo) as u8)
            })
            .collect()
    }
}
