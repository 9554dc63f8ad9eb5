//! Transport trait

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BusError;

/// A message delivered by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retained: bool,
}

/// Callback invoked for each inbound message
///
/// Runs on the transport's own task, concurrently with everything else, so
/// it must not block.
pub type MessageHandler = Arc<dyn Fn(InboundMessage) + Send + Sync>;

/// Connection to a publish/subscribe broker
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish `payload` to `topic`, optionally retained
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), BusError>;

    /// Subscribe to a topic filter; kept across reconnects
    async fn subscribe(&self, filter: &str) -> Result<(), BusError>;

    /// Whether the broker connection is currently up
    fn is_connected(&self) -> bool;

    /// Ask the transport to re-establish the connection and wait for it
    async fn reconnect(&self) -> Result<(), BusError>;
}
