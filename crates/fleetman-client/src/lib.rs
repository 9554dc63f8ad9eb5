//! fleetman-client: HTTP client library
//!
//! Talks to the fleetman daemon: starts provisioning batches and polls
//! their progress, queues device commands and reads device liveness.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use fleetman_client::HttpClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new("http://localhost:8080")?;
//!
//! client.batch().device("robot-1").reset_logs().send().await?;
//! let status = client
//!     .wait_for_batch(Duration::from_secs(1), Duration::from_secs(600), |_| {})
//!     .await?;
//! println!("{} of {} done", status.completed, status.total);
//!
//! let job_id = client
//!     .queue_command("robot-1", "identify", serde_json::json!({"duration_secs": 3}))
//!     .await?;
//! println!("queued {job_id}");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod http;

pub use error::{ClientError, Result};
pub use http::{BatchBuilder, HttpClient};
