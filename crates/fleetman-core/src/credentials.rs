//! Install credential resolution
//!
//! Each field falls back independently: device-specific credentials, then
//! the system default, and for the address finally the device's last
//! reported IP.

use fleetman_exec::HostSpec;
use fleetman_exec::host::DEFAULT_PORT;

use crate::store::{Device, InstallCredentials};

fn pick<T: Clone>(
    specific: Option<&InstallCredentials>,
    default: Option<&InstallCredentials>,
    field: impl Fn(&InstallCredentials) -> Option<T>,
) -> Option<T> {
    specific
        .and_then(&field)
        .or_else(|| default.and_then(&field))
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).cloned()
}

/// Build a `HostSpec` for `device`, or `None` if address, user or a
/// credential cannot be resolved
#[must_use]
pub fn resolve_host_spec(
    device: &Device,
    specific: Option<&InstallCredentials>,
    default: Option<&InstallCredentials>,
) -> Option<HostSpec> {
    let address = pick(specific, default, |c| non_empty(c.address.as_ref()))
        .or_else(|| non_empty(device.last_ip.as_ref()))?;
    let user = pick(specific, default, |c| non_empty(c.user.as_ref()))?;
    let private_key = pick(specific, default, |c| non_empty(c.private_key.as_ref()));
    let password = pick(specific, default, |c| non_empty(c.password.as_ref()));

    if private_key.is_none() && password.is_none() {
        return None;
    }

    // escalation settings come from whichever record supplied credentials
    let escalation = specific
        .filter(|c| c.private_key.is_some() || c.password.is_some())
        .or(default);

    Some(HostSpec {
        address,
        port: pick(specific, default, |c| c.port).unwrap_or(DEFAULT_PORT),
        user,
        private_key,
        password,
        use_sudo: escalation.is_some_and(|c| c.use_sudo),
        sudo_password: escalation.and_then(|c| non_empty(c.sudo_password.as_ref())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(ip: Option<&str>) -> Device {
        let mut d = Device::new("r1", "Robot 1");
        d.last_ip = ip.map(str::to_string);
        d
    }

    fn creds(address: Option<&str>, user: Option<&str>, password: Option<&str>) -> InstallCredentials {
        InstallCredentials {
            address: address.map(str::to_string),
            user: user.map(str::to_string),
            password: password.map(str::to_string),
            ..InstallCredentials::default()
        }
    }

    #[test]
    fn test_device_specific_wins() {
        let specific = creds(Some("10.0.0.2"), Some("robot"), Some("a"));
        let default = creds(Some("10.0.0.99"), Some("admin"), Some("b"));

        let spec = resolve_host_spec(&device(None), Some(&specific), Some(&default)).unwrap();
        assert_eq!(spec.address, "10.0.0.2");
        assert_eq!(spec.user, "robot");
        assert_eq!(spec.password.as_deref(), Some("a"));
    }

    #[test]
    fn test_default_fills_missing_fields() {
        let specific = creds(Some("10.0.0.2"), None, None);
        let default = creds(None, Some("admin"), Some("b"));

        let spec = resolve_host_spec(&device(None), Some(&specific), Some(&default)).unwrap();
        assert_eq!(spec.address, "10.0.0.2");
        assert_eq!(spec.user, "admin");
        assert_eq!(spec.password.as_deref(), Some("b"));
        assert_eq!(spec.port, DEFAULT_PORT);
    }

    #[test]
    fn test_address_falls_back_to_last_ip() {
        let default = creds(None, Some("admin"), Some("b"));

        let spec = resolve_host_spec(&device(Some("192.168.1.7")), None, Some(&default)).unwrap();
        assert_eq!(spec.address, "192.168.1.7");
    }

    #[test]
    fn test_unresolved_without_credential() {
        let default = creds(Some("10.0.0.2"), Some("admin"), None);
        assert!(resolve_host_spec(&device(None), None, Some(&default)).is_none());
    }

    #[test]
    fn test_unresolved_without_address() {
        let default = creds(None, Some("admin"), Some("pw"));
        assert!(resolve_host_spec(&device(None), None, Some(&default)).is_none());
    }

    #[test]
    fn test_escalation_follows_credential_source() {
        let mut default = creds(None, Some("admin"), Some("pw"));
        default.use_sudo = true;
        default.sudo_password = Some("s".to_string());

        let spec = resolve_host_spec(&device(Some("10.0.0.3")), None, Some(&default)).unwrap();
        assert!(spec.use_sudo);
        assert_eq!(spec.sudo_password.as_deref(), Some("s"));
    }
}
