//! fleetman coordinator daemon
//!
//! HTTP surface over the batch orchestrator and command dispatcher, plus
//! status ingestion from the broker.

pub mod api;
pub mod config;
pub mod ingest;
pub mod router;
pub mod state;

pub use config::Config;
pub use router::{ApiDoc, create_router};
pub use state::AppState;
