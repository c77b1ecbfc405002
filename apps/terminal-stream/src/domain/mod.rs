//! Domain Layer - Order model and payload types.
//!
//! Pure types and state machines with no I/O. Everything here can be
//! exercised synchronously in unit tests.

/// Order records, requests and the reconciliation ledger.
pub mod order;

/// Typed classification of stream payloads.
pub mod payload;
