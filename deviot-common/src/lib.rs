//! DevIoT Common Types
//!
//! Shared types describing things and the gateway's cloud-facing protocol.

pub mod protocol;
pub mod thing;
pub mod topics;

pub use protocol::{GatewayRegistration, TransportMode};
pub use thing::{Action, Property, PropertyType, ThingModel};
pub use topics::Topics;
