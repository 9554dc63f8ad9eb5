//! fleetman-agent: Device-side fleet agent
//!
//! A fixed-rate behavior tree keeps the device reachable, publishes its
//! status and turns broker commands into jobs.

pub mod agent;
pub mod behavior;
pub mod blackboard;
pub mod config;
pub mod dedup;
pub mod duties;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod intake;
pub mod job;
pub mod registry;
pub mod tasks;

pub use agent::{Agent, device_tree, mqtt_settings, subscribe_commands};
pub use behavior::{BehaviorNode, Duty, Status, TickContext};
pub use blackboard::{Blackboard, Key, keys};
pub use duties::{AddressSource, UdpAddressSource};
pub use engine::Engine;
pub use error::AgentError;
pub use handlers::HandlerContext;
pub use intake::{CommandIntake, IntakeReceiver, Offer};
pub use job::{Job, JobManager};
pub use registry::{CommandRegistry, DispatchError};
pub use tasks::BackgroundTasks;
