//! fleetman-exec: Local and remote execution, remote provisioning
//!
//! Provides the executor trait with local and SSH implementations, the
//! per-call `HostSpec`, and the `Provisioner` that installs the device agent
//! over SSH.

pub mod error;
pub mod host;
pub mod keys;
pub mod local;
pub mod provision;
pub mod result;
pub mod ssh;
pub mod traits;

pub use error::ExecError;
pub use host::HostSpec;
pub use keys::KeySource;
pub use local::LocalExecutor;
pub use provision::{InstallLayout, Provisioner, normalize_arch, shell_quote};
pub use result::CommandResult;
pub use ssh::{SshConnector, SshExecutor};
pub use traits::{Provision, RemoteExecutor, SessionConnector};
