//! fleetman-bus: Publish/subscribe transport
//!
//! A thin `Transport` abstraction over the broker connection used for the
//! command and status protocol, with an MQTT implementation and an
//! in-process broker for tests and single-host setups.

pub mod error;
pub mod memory;
pub mod mqtt;
pub mod traits;

pub use error::BusError;
pub use memory::{MemoryBroker, MemoryTransport, topic_matches};
pub use mqtt::{LastWill, MqttSettings, MqttTransport};
pub use traits::{InboundMessage, MessageHandler, Transport};
