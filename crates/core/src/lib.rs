//! Domain logic for the vendor ordering platform's order-lock subsystem.
//!
//! Everything here is runtime-agnostic: no HTTP, no spawned tasks. The API
//! crate wires these types into axum handlers and the scheduled sweeper.

pub mod checkout;
pub mod clock;
pub mod error;
pub mod lock;
pub mod pending;
pub mod sweeper;
pub mod types;
