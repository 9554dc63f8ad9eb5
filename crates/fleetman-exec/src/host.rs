//! Target host description for one provisioning call

use crate::error::ExecError;

/// Default SSH port
pub const DEFAULT_PORT: u16 = 22;

/// Address and credentials of a provisioning target
///
/// Built per call from stored install credentials; never persisted here.
#[derive(Clone, Default)]
pub struct HostSpec {
    /// Host address
    pub address: String,
    /// SSH port
    pub port: u16,
    /// Login user
    pub user: String,
    /// Private key material (PEM, base64 PEM, or a path)
    pub private_key: Option<String>,
    /// Login password
    pub password: Option<String>,
    /// Run privileged steps through `sudo`
    pub use_sudo: bool,
    /// Password piped to `sudo -S`
    pub sudo_password: Option<String>,
}

impl HostSpec {
    /// Describe a host with no credentials yet
    pub fn new(address: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: DEFAULT_PORT,
            user: user.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_private_key(mut self, key: impl Into<String>) -> Self {
        self.private_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_sudo(mut self, sudo_password: Option<String>) -> Self {
        self.use_sudo = true;
        self.sudo_password = sudo_password;
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Check that address, user and at least one credential are present
    ///
    /// # Errors
    /// Returns `ExecError::ConfigError` naming the missing field
    pub fn validate(&self) -> Result<(), ExecError> {
        if self.address.trim().is_empty() {
            return Err(ExecError::ConfigError("missing host address".to_string()));
        }
        if self.user.trim().is_empty() {
            return Err(ExecError::ConfigError("missing SSH user".to_string()));
        }
        let has_key = self.private_key.as_deref().is_some_and(|k| !k.is_empty());
        let has_password = self.password.as_deref().is_some_and(|p| !p.is_empty());
        if !has_key && !has_password {
            return Err(ExecError::ConfigError(
                "either a private key or a password is required".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for HostSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostSpec")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("use_sudo", &self.use_sudo)
            .field(
                "sudo_password",
                &self.sudo_password.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_a_credential() {
        let spec = HostSpec::new("10.0.0.2", "robot");
        assert!(matches!(spec.validate(), Err(ExecError::ConfigError(_))));

        let spec = spec.with_password("pw");
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_address_and_user() {
        let spec = HostSpec::new("", "robot").with_password("pw");
        assert!(spec.validate().is_err());

        let spec = HostSpec::new("10.0.0.2", " ").with_password("pw");
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let spec = HostSpec::new("10.0.0.2", "robot")
            .with_password("pw-secret")
            .with_sudo(Some("sudo-secret".to_string()));
        let out = format!("{spec:?}");
        assert!(!out.contains("pw-secret"));
        assert!(!out.contains("sudo-secret"));
    }
}
