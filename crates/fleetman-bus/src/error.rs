//! Error types for fleetman-bus

use thiserror::Error;

/// Errors raised by a transport
#[derive(Error, Debug, Clone)]
pub enum BusError {
    /// Not connected to the broker
    #[error("not connected to broker")]
    NotConnected,

    /// Broker connection failed
    #[error("broker connection failed: {0}")]
    Connection(String),

    /// Publishing failed
    #[error("publish to {topic} failed: {message}")]
    Publish {
        /// Target topic
        topic: String,
        /// Failure detail
        message: String,
    },

    /// Subscribing failed
    #[error("subscribe to {topic} failed: {message}")]
    Subscribe {
        /// Topic filter
        topic: String,
        /// Failure detail
        message: String,
    },

    /// Reconnect did not complete in time
    #[error("reconnect timed out")]
    ReconnectTimeout,
}
