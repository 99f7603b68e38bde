//! DevIoT Gateway - exposes local things to the cloud.
//!
//! The gateway announces its things to a registration endpoint over HTTP and
//! keeps a publish/subscribe connection open to receive remote actions, which
//! it routes to the target thing's handler.

pub mod config;
pub mod connector;
pub mod demo;
pub mod error;
pub mod gateway;
pub mod registry;
pub mod test_util;
pub mod thing;
pub mod transition;

pub use config::Config;
pub use connector::{ActionDispatcher, BackoffPolicy, Broker, ConnectionState, Connector, MqttBroker};
pub use error::{Error, HandlerError, Result};
pub use gateway::{Gateway, GatewaySettings, RegistrationClient};
pub use registry::ThingRegistry;
pub use thing::{ActionHandler, Thing};
