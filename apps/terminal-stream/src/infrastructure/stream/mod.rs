//! Streaming Connections
//!
//! The framed/raw wire pipeline: codec, per-connection routing, the registry
//! that owns connection lifecycles, and the opt-in reconnect policy.

pub mod codec;
pub mod reconnect;
pub mod registry;
pub mod router;

pub use codec::{Decoded, Frame, FrameCodec, FrameError, InboundMessage};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use registry::{ConnectionRegistry, ConnectionState, Protocol, RegistryError};
pub use router::{DispatchOutcome, SubscriptionRouter};
