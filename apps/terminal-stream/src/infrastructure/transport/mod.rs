//! Socket transports implementing the `Transport` port.

mod memory;
mod websocket;

pub use memory::{MemoryPeer, MemoryTransport};
pub use websocket::WebSocketTransport;
