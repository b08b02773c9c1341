//! Reconciliation with the chat service.

pub mod threads;

pub use threads::{StatusDelivery, StatusOutcome, ThreadOutcome, ThreadReconciler};
