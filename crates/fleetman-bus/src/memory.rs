//! In-process broker
//!
//! Implements the subset of MQTT semantics the fleet protocol relies on:
//! `+`/`#` topic filters, retained messages (replayed on subscribe, cleared
//! by an empty payload) and per-client connection state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::error::BusError;
use crate::traits::{InboundMessage, MessageHandler, Transport};

/// Check whether an MQTT topic filter matches a concrete topic
#[must_use]
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

struct Client {
    id: usize,
    filters: Vec<String>,
    handler: MessageHandler,
    connected: Arc<AtomicBool>,
}

#[derive(Default)]
struct BrokerState {
    clients: Vec<Client>,
    retained: HashMap<String, Vec<u8>>,
}

/// Shared in-process broker. Clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    next_id: Arc<AtomicUsize>,
}

impl MemoryBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a new client whose inbound messages go to `handler`
    #[must_use]
    pub fn connect(&self, handler: MessageHandler) -> MemoryTransport {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let connected = Arc::new(AtomicBool::new(true));

        self.lock().clients.push(Client {
            id,
            filters: Vec::new(),
            handler,
            connected: connected.clone(),
        });

        debug!(client = id, "memory client connected");

        MemoryTransport {
            broker: self.clone(),
            id,
            connected,
        }
    }

    /// Last retained payload on `topic`
    #[must_use]
    pub fn retained(&self, topic: &str) -> Option<Vec<u8>> {
        self.lock().retained.get(topic).cloned()
    }

    fn deliver(&self, topic: &str, payload: &[u8]) -> usize {
        // collect first so handlers run without the broker lock held
        let targets: Vec<MessageHandler> = self
            .lock()
            .clients
            .iter()
            .filter(|c| c.connected.load(Ordering::SeqCst))
            .filter(|c| c.filters.iter().any(|f| topic_matches(f, topic)))
            .map(|c| c.handler.clone())
            .collect();

        for handler in &targets {
            handler(InboundMessage {
                topic: topic.to_string(),
                payload: payload.to_vec(),
                retained: false,
            });
        }
        targets.len()
    }
}

/// One client attached to a `MemoryBroker`
pub struct MemoryTransport {
    broker: MemoryBroker,
    id: usize,
    connected: Arc<AtomicBool>,
}

impl MemoryTransport {
    /// Simulate a connection drop or recovery
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), BusError> {
        if !self.is_connected() {
            return Err(BusError::NotConnected);
        }

        if retain {
            let mut state = self.broker.lock();
            if payload.is_empty() {
                state.retained.remove(topic);
            } else {
                state.retained.insert(topic.to_string(), payload.clone());
            }
        }

        let receivers = self.broker.deliver(topic, &payload);
        trace!(client = self.id, topic, receivers, "published");
        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> Result<(), BusError> {
        let (handler, replay) = {
            let mut state = self.broker.lock();
            let replay: Vec<(String, Vec<u8>)> = state
                .retained
                .iter()
                .filter(|(topic, _)| topic_matches(filter, topic))
                .map(|(t, p)| (t.clone(), p.clone()))
                .collect();

            let client = state
                .clients
                .iter_mut()
                .find(|c| c.id == self.id)
                .ok_or_else(|| BusError::Subscribe {
                    topic: filter.to_string(),
                    message: "client detached".to_string(),
                })?;
            if !client.filters.iter().any(|f| f == filter) {
                client.filters.push(filter.to_string());
            }
            (client.handler.clone(), replay)
        };

        for (topic, payload) in replay {
            handler(InboundMessage {
                topic,
                payload,
                retained: true,
            });
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn reconnect(&self) -> Result<(), BusError> {
        self.set_connected(true);
        Ok(())
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.broker.lock().clients.retain(|c| c.id != self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector() -> (MessageHandler, Arc<Mutex<Vec<InboundMessage>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: MessageHandler = Arc::new(move |msg: InboundMessage| sink.lock().unwrap().push(msg));
        (handler, seen)
    }

    #[test]
    fn test_topic_matches() {
        assert!(topic_matches("fleet/status/+", "fleet/status/r1"));
        assert!(!topic_matches("fleet/status/+", "fleet/status/r1/extra"));
        assert!(topic_matches("fleet/#", "fleet/commands/all"));
        assert!(topic_matches("fleet/commands/all", "fleet/commands/all"));
        assert!(!topic_matches("fleet/commands/all", "fleet/commands/r1"));
        assert!(!topic_matches("fleet/status", "fleet/status/r1"));
    }

    #[tokio::test]
    async fn test_publish_reaches_matching_subscribers() {
        let broker = MemoryBroker::new();
        let (handler, seen) = collector();
        let sub = broker.connect(handler);
        sub.subscribe("fleet/commands/r1").await.unwrap();
        sub.subscribe("fleet/commands/all").await.unwrap();

        let publisher = broker.connect(Arc::new(|_: InboundMessage| {}));
        publisher
            .publish("fleet/commands/r1", b"a".to_vec(), false)
            .await
            .unwrap();
        publisher
            .publish("fleet/commands/r2", b"b".to_vec(), false)
            .await
            .unwrap();
        publisher
            .publish("fleet/commands/all", b"c".to_vec(), false)
            .await
            .unwrap();

        let payloads: Vec<Vec<u8>> = seen.lock().unwrap().iter().map(|m| m.payload.clone()).collect();
        assert_eq!(payloads, vec![b"a".to_vec(), b"c".to_vec()]);
    }

    #[tokio::test]
    async fn test_retained_is_replayed_to_late_subscriber() {
        let broker = MemoryBroker::new();
        let device = broker.connect(Arc::new(|_: InboundMessage| {}));
        device
            .publish("fleet/status/r1", b"ok".to_vec(), true)
            .await
            .unwrap();

        let (handler, seen) = collector();
        let coordinator = broker.connect(handler);
        coordinator.subscribe("fleet/status/+").await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].retained);
        assert_eq!(seen[0].topic, "fleet/status/r1");
    }

    #[tokio::test]
    async fn test_disconnected_client_cannot_publish() {
        let broker = MemoryBroker::new();
        let client = broker.connect(Arc::new(|_: InboundMessage| {}));
        client.set_connected(false);

        let err = client.publish("t", b"x".to_vec(), false).await.unwrap_err();
        assert!(matches!(err, BusError::NotConnected));

        client.reconnect().await.unwrap();
        assert!(client.is_connected());
    }
}
