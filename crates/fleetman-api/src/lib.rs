//! fleetman-api: Shared wire and API types
//!
//! Contains the command/status envelopes exchanged over the broker, the
//! batch request/response types of the coordinator HTTP boundary, the
//! agent configuration shared between coordinator and device, and the
//! topic naming scheme.

pub mod agent;
pub mod batch;
pub mod command;
pub mod requests;
pub mod responses;
pub mod status;
pub mod topics;

pub use agent::{AgentConfig, BrokerConfig};
pub use batch::BatchPhase;
pub use command::{
    ApplyScenarioPayload, Command, CommandKind, EmptyPayload, IdentifyPayload, UpdateRepoPayload,
    WireError,
};
pub use status::{JobStatus, StatusMessage};
