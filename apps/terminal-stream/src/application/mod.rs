//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for sockets, topic handlers and the order API.
pub mod ports;

/// Application services for order reconciliation.
pub mod services;
