//! fleetman-core: Coordinator-side fleet orchestration
//!
//! Drives provisioning batches across devices, queues commands onto the
//! broker, and keeps the liveness cache fed from device heartbeats. Storage
//! and artifact lookup are injected through traits.

pub mod artifacts;
pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod liveness;
pub mod orchestrator;
pub mod state;
pub mod store;

pub use artifacts::{ArtifactSource, DirArtifactSource};
pub use config::BatchConfig;
pub use credentials::resolve_host_spec;
pub use dispatch::{CommandDispatcher, CommandQueue};
pub use error::CoreError;
pub use liveness::{LivenessCache, StatusIngest};
pub use orchestrator::{BatchHandle, BatchOrchestrator};
pub use state::BatchCoordinator;
pub use store::{Device, DeviceStore, InstallCredentials, JobRecord, MemoryStore};
