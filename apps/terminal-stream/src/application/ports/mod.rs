//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `Transport`: Opens a bidirectional text socket to a URL
//! - `OrderGateway`: Request/response calls against the order API
//!
//! ## Driver Ports (Inbound)
//!
//! - `TopicHandler`: Receives decoded payloads for one subscribed topic

mod gateway;
mod handler;
mod transport;

pub use gateway::{GatewayError, OrderGateway};
#[cfg(test)]
pub use gateway::MockOrderGateway;
pub use handler::TopicHandler;
pub use transport::{InboundStream, Socket, SocketWriter, Transport, TransportError};
