//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `OrderReconciler`: Folds stream events and API responses into the order ledger

mod order_reconciler;

pub use order_reconciler::{DEFAULT_PENDING_TTL, LedgerSnapshot, OrderReconciler};
