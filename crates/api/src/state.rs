use std::sync::Arc;

use bites_core::checkout::{CheckoutService, OrderRecorder};
use bites_core::clock::Clock;
use bites_core::lock::LockManager;
use bites_core::pending::PendingCheckoutStore;
use bites_core::sweeper::OrderSweeper;
use bites_core::types::Timestamp;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Item lock manager shared by checkout flows, the sweeper and admin routes.
    pub locks: Arc<LockManager>,
    /// Pending checkout records keyed by payment session id.
    pub pending: Arc<PendingCheckoutStore>,
    /// Expiry sweep, run on a schedule and on demand.
    pub sweeper: Arc<OrderSweeper>,
    /// Guest checkout flow.
    pub checkout: Arc<CheckoutService>,
    /// When the process started, for the health endpoint.
    pub started_at: Timestamp,
}

impl AppState {
    /// Wire the lock subsystem together around one shared lock manager.
    pub fn build(
        config: ServerConfig,
        clock: Arc<dyn Clock>,
        recorder: Arc<dyn OrderRecorder>,
    ) -> Self {
        let started_at = clock.now();
        let locks = Arc::new(LockManager::new(config.locks, clock));
        let pending = Arc::new(PendingCheckoutStore::new());
        let sweeper = Arc::new(OrderSweeper::new(Arc::clone(&locks), Arc::clone(&pending)));
        let checkout = Arc::new(CheckoutService::new(
            Arc::clone(&locks),
            Arc::clone(&pending),
            recorder,
            config.payment_signing_secret.clone(),
        ));

        Self {
            config: Arc::new(config),
            locks,
            pending,
            sweeper,
            checkout,
            started_at,
        }
    }
}
