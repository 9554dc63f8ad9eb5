//! Broker topic naming

/// Broadcast command topic every device subscribes to
pub const BROADCAST_COMMANDS: &str = "fleet/commands/all";

/// Wildcard filter matching every device's status topic
pub const STATUS_WILDCARD: &str = "fleet/status/+";

const STATUS_PREFIX: &str = "fleet/status/";

/// Targeted command topic for one device
#[must_use]
pub fn command_topic(device_id: &str) -> String {
    format!("fleet/commands/{device_id}")
}

/// Retained status topic for one device
#[must_use]
pub fn status_topic(device_id: &str) -> String {
    format!("{STATUS_PREFIX}{device_id}")
}

/// Extract the device id from a status topic
#[must_use]
pub fn device_from_status_topic(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(STATUS_PREFIX)
        .filter(|id| !id.is_empty() && !id.contains('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_layout() {
        assert_eq!(command_topic("r1"), "fleet/commands/r1");
        assert_eq!(status_topic("r1"), "fleet/status/r1");
    }

    #[test]
    fn test_device_from_status_topic() {
        assert_eq!(device_from_status_topic("fleet/status/r1"), Some("r1"));
        assert_eq!(device_from_status_topic("fleet/status/"), None);
        assert_eq!(device_from_status_topic("fleet/status/a/b"), None);
        assert_eq!(device_from_status_topic("fleet/commands/r1"), None);
    }
}
