//! Bounded, lossy command intake
//!
//! Filled from the transport callback, drained one command per tick.
//! When the queue is full new commands are dropped: a stale fleet command
//! is not worth delivering late.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use fleetman_api::Command;
use fleetman_bus::{InboundMessage, MessageHandler};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::dedup::RecentIds;

/// What happened to an offered message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    /// Same command id seen recently
    Duplicate,
    /// Queue full
    Dropped,
    /// Not a command
    Malformed,
    /// Consumer is gone
    Closed,
}

/// Producer side of the intake queue
#[derive(Clone)]
pub struct CommandIntake {
    tx: mpsc::Sender<Command>,
    recent: Arc<Mutex<RecentIds>>,
}

/// Consumer side of the intake queue
pub struct IntakeReceiver {
    rx: mpsc::Receiver<Command>,
}

impl CommandIntake {
    /// Queue holding at most `capacity` commands, suppressing repeated ids
    /// for `dedup_ttl`
    #[must_use]
    pub fn new(capacity: usize, dedup_ttl: Duration) -> (Self, IntakeReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                recent: Arc::new(Mutex::new(RecentIds::new(dedup_ttl))),
            },
            IntakeReceiver { rx },
        )
    }

    /// Decode and enqueue without waiting
    pub fn offer(&self, payload: &[u8]) -> Offer {
        let command = match Command::decode(payload) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "dropping malformed command");
                return Offer::Malformed;
            }
        };

        let fresh = self
            .recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(&command.id, Instant::now());
        if !fresh {
            debug!(id = %command.id, kind = %command.kind, "dropping duplicate command");
            return Offer::Duplicate;
        }

        match self.tx.try_send(command) {
            Ok(()) => Offer::Accepted,
            Err(TrySendError::Full(command)) => {
                warn!(id = %command.id, kind = %command.kind, "intake full, dropping command");
                // never executed, so a redelivery may go through
                self.recent
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&command.id);
                Offer::Dropped
            }
            Err(TrySendError::Closed(_)) => Offer::Closed,
        }
    }

    /// Transport callback feeding this intake
    #[must_use]
    pub fn handler(&self) -> MessageHandler {
        let intake = self.clone();
        Arc::new(move |message: InboundMessage| {
            if message.payload.is_empty() {
                return;
            }
            intake.offer(&message.payload);
        })
    }
}

impl IntakeReceiver {
    /// Next queued command, if any
    pub fn try_next(&mut self) -> Option<Command> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(id: &str) -> Vec<u8> {
        format!(r#"{{"id":"{id}","type":"self_test","data":{{}}}}"#).into_bytes()
    }

    #[test]
    fn test_overflow_drops_newest_and_keeps_order() {
        let (intake, mut rx) = CommandIntake::new(10, Duration::from_secs(300));

        let offers: Vec<Offer> = (0..11).map(|i| intake.offer(&command(&i.to_string()))).collect();
        assert!(offers[..10].iter().all(|o| *o == Offer::Accepted));
        assert_eq!(offers[10], Offer::Dropped);

        let drained: Vec<String> = std::iter::from_fn(|| rx.try_next()).map(|c| c.id).collect();
        let expected: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        assert_eq!(drained, expected);
    }

    #[test]
    fn test_duplicate_id_is_suppressed() {
        let (intake, mut rx) = CommandIntake::new(10, Duration::from_secs(300));

        assert_eq!(intake.offer(&command("7")), Offer::Accepted);
        assert_eq!(intake.offer(&command("7")), Offer::Duplicate);
        assert_eq!(rx.try_next().unwrap().id, "7");
        assert!(rx.try_next().is_none());
    }

    #[test]
    fn test_malformed_is_rejected() {
        let (intake, _rx) = CommandIntake::new(10, Duration::from_secs(300));
        assert_eq!(intake.offer(b"{}"), Offer::Malformed);
        assert_eq!(intake.offer(br#"{"id":"1","type":""}"#), Offer::Malformed);
    }
}
