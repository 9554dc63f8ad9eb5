//! Leaf duties of the device tree

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use fleetman_api::{StatusMessage, topics};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::behavior::{Duty, Status, TickContext};
use crate::blackboard::{Blackboard, keys};
use crate::intake::IntakeReceiver;
use crate::registry::CommandRegistry;

/// Source of the device's current address
pub trait AddressSource: Send + Sync {
    fn local_ip(&self) -> Option<String>;
}

/// Address of the interface that routes to `target`
///
/// Connecting a UDP socket only selects a route; nothing is sent.
#[derive(Debug, Clone)]
pub struct UdpAddressSource {
    target: SocketAddr,
}

impl Default for UdpAddressSource {
    fn default() -> Self {
        Self {
            target: SocketAddr::from(([8, 8, 8, 8], 80)),
        }
    }
}

impl AddressSource for UdpAddressSource {
    fn local_ip(&self) -> Option<String> {
        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect(self.target).ok()?;
        let ip = socket.local_addr().ok()?.ip();
        (!ip.is_unspecified() && !ip.is_loopback()).then(|| ip.to_string())
    }
}

/// Keeps `LOCAL_IP` current
pub struct CheckNetwork {
    addresses: Arc<dyn AddressSource>,
}

impl CheckNetwork {
    pub fn new(addresses: Arc<dyn AddressSource>) -> Self {
        Self { addresses }
    }
}

impl Duty for CheckNetwork {
    fn name(&self) -> &str {
        "check-network"
    }

    fn tick(&mut self, _ctx: &TickContext, bb: &Blackboard) -> Status {
        let known = bb.get(keys::LOCAL_IP);
        match self.addresses.local_ip() {
            Some(ip) => {
                if known.as_deref() != Some(ip.as_str()) {
                    info!(from = ?known, to = %ip, "local address changed");
                    bb.set(keys::LOCAL_IP, ip);
                }
                Status::Success
            }
            None => {
                if known.is_some() {
                    warn!("local address lost");
                    bb.remove(keys::LOCAL_IP);
                }
                Status::Failure
            }
        }
    }
}

/// Requests a reconnect while the transport is down, at most once per
/// cooldown window
pub struct MaintainConnection {
    cooldown: Duration,
    last_attempt: Option<Instant>,
    in_flight: Arc<AtomicBool>,
    was_connected: bool,
}

impl MaintainConnection {
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_attempt: None,
            in_flight: Arc::new(AtomicBool::new(false)),
            was_connected: false,
        }
    }
}

impl Duty for MaintainConnection {
    fn name(&self) -> &str {
        "maintain-connection"
    }

    fn tick(&mut self, ctx: &TickContext, bb: &Blackboard) -> Status {
        let Some(transport) = bb.get(keys::TRANSPORT) else {
            return Status::Failure;
        };

        if transport.is_connected() {
            if !self.was_connected {
                info!("broker connection up");
                self.was_connected = true;
            }
            return Status::Success;
        }
        if self.was_connected {
            warn!("broker connection down");
            self.was_connected = false;
        }

        let cooling = self
            .last_attempt
            .is_some_and(|at| ctx.now.duration_since(at) < self.cooldown);
        if cooling || self.in_flight.load(Ordering::SeqCst) {
            return Status::Failure;
        }
        let Some(tasks) = bb.get(keys::TASKS) else {
            return Status::Failure;
        };

        self.last_attempt = Some(ctx.now);
        self.in_flight.store(true, Ordering::SeqCst);
        let in_flight = self.in_flight.clone();

        debug!("requesting reconnect");
        tasks.spawn("reconnect", async move {
            match transport.reconnect().await {
                Ok(()) => info!("reconnected to broker"),
                Err(e) => warn!(error = %e, "reconnect failed"),
            }
            in_flight.store(false, Ordering::SeqCst);
        });

        Status::Failure
    }
}

/// Starts a job for at most one queued command per tick
pub struct ProcessCommands {
    intake: IntakeReceiver,
    registry: CommandRegistry,
    last_job_id: i64,
}

impl ProcessCommands {
    pub fn new(intake: IntakeReceiver, registry: CommandRegistry) -> Self {
        Self {
            intake,
            registry,
            last_job_id: 0,
        }
    }

    /// Wall-clock nanoseconds, bumped to stay unique within the process
    fn next_job_id(&mut self, ctx: &TickContext) -> String {
        let nanos = ctx
            .wall
            .timestamp_nanos_opt()
            .unwrap_or(self.last_job_id + 1);
        self.last_job_id = nanos.max(self.last_job_id + 1);
        self.last_job_id.to_string()
    }
}

impl Duty for ProcessCommands {
    fn name(&self) -> &str {
        "process-commands"
    }

    fn tick(&mut self, ctx: &TickContext, bb: &Blackboard) -> Status {
        let Some(command) = self.intake.try_next() else {
            return Status::Success;
        };

        let job = match self.registry.prepare(&command) {
            Ok(job) => job,
            Err(e) => {
                warn!(id = %command.id, kind = %command.kind, error = %e, "dropping command");
                return Status::Success;
            }
        };
        let Some(jobs) = bb.get(keys::JOBS) else {
            return Status::Failure;
        };

        let job_id = self.next_job_id(ctx);
        info!(
            command_id = %command.id,
            job_id = %job_id,
            kind = %command.kind,
            "accepted command"
        );
        // the job runs detached; shutdown lets it finish
        drop(jobs.start_job(job_id, command.kind, job));
        Status::Success
    }
}

/// Publishes the retained status message every `interval`
pub struct SendHeartbeat {
    interval: Duration,
    last_sent: Option<Instant>,
}

impl SendHeartbeat {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: None,
        }
    }
}

impl Duty for SendHeartbeat {
    fn name(&self) -> &str {
        "send-heartbeat"
    }

    fn tick(&mut self, ctx: &TickContext, bb: &Blackboard) -> Status {
        if self
            .last_sent
            .is_some_and(|at| ctx.now.duration_since(at) < self.interval)
        {
            return Status::Success;
        }

        let (Some(transport), Some(config), Some(tasks)) = (
            bb.get(keys::TRANSPORT),
            bb.get_ref(keys::CONFIG),
            bb.get(keys::TASKS),
        ) else {
            return Status::Failure;
        };
        if !transport.is_connected() {
            // sent as soon as the connection is back
            return Status::Success;
        }

        let job = bb.get(keys::JOBS).and_then(|jobs| jobs.get_current_job());
        let status = StatusMessage {
            status: StatusMessage::OK.to_string(),
            ts: ctx.wall,
            ip: bb.get(keys::LOCAL_IP).unwrap_or_default(),
            device_type: config.device_type.clone(),
            name: config.name.clone(),
            job_id: job.as_ref().map(|j| j.id.clone()),
            job_status: job.as_ref().map(|j| j.status),
            job_error: job.and_then(|j| j.error),
        };
        let payload = match serde_json::to_vec(&status) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "cannot encode status");
                return Status::Failure;
            }
        };

        self.last_sent = Some(ctx.now);
        let topic = topics::status_topic(&config.device_id);
        tasks.spawn("heartbeat", async move {
            if let Err(e) = transport.publish(&topic, payload, true).await {
                warn!(error = %e, "heartbeat not published");
            }
        });
        Status::Success
    }
}
