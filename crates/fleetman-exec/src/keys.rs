//! SSH key material resolution

use std::path::{Path, PathBuf};

use russh::keys::{PrivateKey, decode_secret_key, load_secret_key};
use tracing::debug;

const PEM_MARKER: &str = "-----BEGIN";

/// Where private key material comes from
#[derive(Clone)]
pub enum KeySource {
    /// Explicit path to key file
    Path(PathBuf),
    /// PEM/OpenSSH text held in memory
    Inline(String),
    /// Base64-encoded PEM, as stored by the credential store
    Base64(String),
}

impl std::fmt::Debug for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Path(p) => f.debug_tuple("Path").field(p).finish(),
            KeySource::Inline(_) => f.write_str("Inline(<redacted>)"),
            KeySource::Base64(_) => f.write_str("Base64(<redacted>)"),
        }
    }
}

impl KeySource {
    /// Classify stored key material
    ///
    /// PEM text is used inline, an existing file path is loaded from disk,
    /// anything else is treated as base64-encoded PEM.
    #[must_use]
    pub fn from_material(material: &str) -> Self {
        let trimmed = material.trim();
        if trimmed.starts_with(PEM_MARKER) {
            KeySource::Inline(trimmed.to_string())
        } else if Path::new(trimmed).is_file() {
            KeySource::Path(PathBuf::from(trimmed))
        } else {
            KeySource::Base64(trimmed.to_string())
        }
    }

    /// Resolve to a decoded private key
    ///
    /// # Errors
    /// Returns `KeyError` if the file is unreadable or too permissive, or the
    /// material is not a valid key
    pub fn resolve(&self) -> Result<PrivateKey, KeyError> {
        match self {
            KeySource::Path(path) => {
                validate_key_permissions(path)?;
                debug!(path = %path.display(), "loading SSH key from file");
                load_secret_key(path, None).map_err(|e| KeyError::Invalid(e.to_string()))
            }
            KeySource::Inline(pem) => {
                decode_secret_key(pem, None).map_err(|e| KeyError::Invalid(e.to_string()))
            }
            KeySource::Base64(encoded) => {
                let bytes = base64_decode(encoded).map_err(|_| KeyError::InvalidBase64)?;
                let pem = String::from_utf8(bytes).map_err(|_| KeyError::InvalidBase64)?;
                decode_secret_key(&pem, None).map_err(|e| KeyError::Invalid(e.to_string()))
            }
        }
    }
}

/// Render the public half of a key as an `authorized_keys` line
///
/// # Errors
/// Returns `KeyError::Invalid` if the key cannot be encoded
pub fn public_key_line(key: &PrivateKey) -> Result<String, KeyError> {
    key.public_key()
        .to_openssh()
        .map_err(|e| KeyError::Invalid(e.to_string()))
}

/// Key resolution errors
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid base64 encoding")]
    InvalidBase64,

    #[error("invalid private key: {0}")]
    Invalid(String),

    #[error("key file permissions too open: {0} (should be 600)")]
    BadPermissions(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn base64_decode(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(input.trim())
}

fn validate_key_permissions(path: &Path) -> Result<(), KeyError> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)?.permissions().mode();

    // group/other bits must be clear
    if mode & 0o77 != 0 {
        return Err(KeyError::BadPermissions(path.display().to_string()));
    }

    Ok(())
}
