//! Agent executable lookup by architecture

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::error::CoreError;

/// Source of agent executables
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Executable bytes for `arch` (`amd64`, `arm64`, ...)
    async fn executable(&self, arch: &str) -> Result<Vec<u8>, CoreError>;
}

/// Executables stored as `<dir>/fleetman-agent-linux-<arch>`
#[derive(Debug, Clone)]
pub struct DirArtifactSource {
    dir: PathBuf,
}

impl DirArtifactSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn path_for(&self, arch: &str) -> PathBuf {
        self.dir.join(format!("fleetman-agent-linux-{arch}"))
    }
}

#[async_trait]
impl ArtifactSource for DirArtifactSource {
    async fn executable(&self, arch: &str) -> Result<Vec<u8>, CoreError> {
        let path = self.path_for(arch);
        debug!(path = %path.display(), "loading agent executable");
        tokio::fs::read(&path)
            .await
            .map_err(|_| CoreError::MissingArtifact {
                arch: arch.to_string(),
                path: path.display().to_string(),
            })
    }
}
