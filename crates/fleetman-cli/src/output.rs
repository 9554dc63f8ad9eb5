//! Human-readable rendering of API responses

use std::fmt::Write as _;

use fleetman_api::BatchPhase;
use fleetman_api::responses::{BatchStatus, DeviceLiveness, DeviceStatus};

/// One line per device, sorted by id, with errors inline
pub fn batch_status(status: &BatchStatus) -> String {
    let state = if status.active { "active" } else { "idle" };
    let mut out = format!("batch {state}: {}/{} done\n", status.completed, status.total);

    let mut ids: Vec<&String> = status.robots.keys().collect();
    ids.sort();
    for id in ids {
        let phase = status.robots[id];
        let _ = write!(out, "  {id:<20} {phase}");
        if phase == BatchPhase::Error
            && let Some(error) = status.errors.get(id)
        {
            let _ = write!(out, "  {error}");
        }
        out.push('\n');
    }
    out
}

/// Short progress line used while waiting
pub fn progress(status: &BatchStatus) -> String {
    let failed = status.errors.len();
    format!(
        "{}/{} done, {failed} failed",
        status.completed, status.total
    )
}

fn heartbeat_line(h: &DeviceLiveness) -> String {
    let mut line = format!(
        "{} at {} from {}",
        h.status,
        h.last_heartbeat.format("%Y-%m-%d %H:%M:%S UTC"),
        if h.ip.is_empty() { "-" } else { &h.ip }
    );
    if let (Some(id), Some(status)) = (&h.job_id, h.job_status) {
        let _ = write!(line, ", job {id} {status}");
        if let Some(error) = &h.job_error {
            let _ = write!(line, " ({error})");
        }
    }
    line
}

pub fn device_status(device: &DeviceStatus) -> String {
    let mut out = format!("{} ({}, {})\n", device.device_id, device.name, device.device_type);
    let _ = writeln!(
        out,
        "  address:   {}",
        device.last_ip.as_deref().unwrap_or("-")
    );
    let _ = writeln!(
        out,
        "  last seen: {}",
        device
            .last_seen
            .map_or_else(|| "never".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
    );
    let _ = writeln!(
        out,
        "  heartbeat: {}",
        device
            .heartbeat
            .as_ref()
            .map_or_else(|| "none".to_string(), heartbeat_line)
    );
    out
}

pub fn fleet(devices: &[DeviceLiveness]) -> String {
    if devices.is_empty() {
        return "no heartbeats received\n".to_string();
    }
    let mut out = String::new();
    for device in devices {
        let _ = writeln!(out, "{:<20} {}", device.device_id, heartbeat_line(device));
    }
    out
}
