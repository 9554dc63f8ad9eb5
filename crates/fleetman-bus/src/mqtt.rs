//! MQTT transport using rumqttc

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::BusError;
use crate::traits::{InboundMessage, MessageHandler, Transport};

/// How long `reconnect` waits for the broker to acknowledge
pub const RECONNECT_WAIT: Duration = Duration::from_secs(10);

const REQUEST_CAPACITY: usize = 64;

/// Message the broker publishes on our behalf if we vanish
#[derive(Debug, Clone)]
pub struct LastWill {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

/// Broker connection settings
#[derive(Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
    pub last_will: Option<LastWill>,
    /// Retry on our own after a drop; `None` waits for `reconnect()`
    pub auto_reconnect: Option<Duration>,
}

impl std::fmt::Debug for MqttSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("keep_alive", &self.keep_alive)
            .field("auto_reconnect", &self.auto_reconnect)
            .finish_non_exhaustive()
    }
}

impl MqttSettings {
    pub fn new(host: impl Into<String>, port: u16, client_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: client_id.into(),
            username: None,
            password: None,
            keep_alive: Duration::from_secs(30),
            last_will: None,
            auto_reconnect: None,
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.username = username;
        self.password = password;
        self
    }

    #[must_use]
    pub fn with_last_will(mut self, will: LastWill) -> Self {
        self.last_will = Some(will);
        self
    }

    #[must_use]
    pub fn with_auto_reconnect(mut self, every: Duration) -> Self {
        self.auto_reconnect = Some(every);
        self
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        if let Some(user) = &self.username {
            options.set_credentials(user, self.password.clone().unwrap_or_default());
        }
        if let Some(will) = &self.last_will {
            options.set_last_will(rumqttc::LastWill::new(
                &will.topic,
                will.payload.clone(),
                QoS::AtLeastOnce,
                will.retain,
            ));
        }
        options
    }
}

/// Broker connection driven by a background event-loop task
///
/// Subscriptions are remembered and re-issued on every connection
/// acknowledgement, since sessions are clean.
pub struct MqttTransport {
    client: AsyncClient,
    state: watch::Receiver<bool>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    retry: Arc<Notify>,
    task: JoinHandle<()>,
}

impl MqttTransport {
    /// Start the event loop; inbound publishes go to `handler`
    ///
    /// Returns immediately; the first connection attempt happens in the
    /// background.
    #[must_use]
    pub fn connect(settings: &MqttSettings, handler: MessageHandler) -> Self {
        let (client, eventloop) = AsyncClient::new(settings.options(), REQUEST_CAPACITY);
        let (state_tx, state) = watch::channel(false);
        let subscriptions = Arc::new(Mutex::new(Vec::new()));
        let retry = Arc::new(Notify::new());

        info!(
            host = %settings.host,
            port = settings.port,
            client_id = %settings.client_id,
            "starting broker connection"
        );

        let task = tokio::spawn(drive(
            eventloop,
            client.clone(),
            handler,
            state_tx,
            subscriptions.clone(),
            retry.clone(),
            settings.auto_reconnect,
        ));

        Self {
            client,
            state,
            subscriptions,
            retry,
            task,
        }
    }
}

async fn drive(
    mut eventloop: EventLoop,
    client: AsyncClient,
    handler: MessageHandler,
    state: watch::Sender<bool>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    retry: Arc<Notify>,
    auto_reconnect: Option<Duration>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                state.send_replace(true);
                info!("connected to broker");

                let filters = subscriptions
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                for filter in filters {
                    if let Err(e) = client.try_subscribe(&filter, QoS::AtLeastOnce) {
                        warn!(filter = %filter, error = %e, "resubscribe failed");
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                handler(InboundMessage {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                    retained: publish.retain,
                });
            }
            Ok(_) => {}
            Err(e) => {
                if state.send_replace(false) {
                    warn!(error = %e, "broker connection lost");
                } else {
                    debug!(error = %e, "broker still unreachable");
                }

                wait_for_retry(&retry, auto_reconnect).await;
            }
        }
    }
}

/// Back off after a failed poll until `auto_reconnect` elapses or a
/// retry is requested
async fn wait_for_retry(retry: &Notify, auto_reconnect: Option<Duration>) {
    match auto_reconnect {
        Some(every) => {
            tokio::select! {
                () = retry.notified() => {}
                () = sleep(every) => {}
            }
        }
        None => retry.notified().await,
    }
}

/// Wake the event loop if it is backing off
///
/// A request made while the loop is busy is not stored, so it cannot cut
/// a later back-off short.
fn request_retry(retry: &Notify) {
    retry.notify_waiters();
}

#[async_trait]
impl Transport for MqttTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), BusError> {
        if !self.is_connected() {
            return Err(BusError::NotConnected);
        }

        // never wait on a full request queue
        self.client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload)
            .map_err(|e| BusError::Publish {
                topic: topic.to_string(),
                message: e.to_string(),
            })
    }

    async fn subscribe(&self, filter: &str) -> Result<(), BusError> {
        {
            let mut subs = self
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !subs.iter().any(|f| f == filter) {
                subs.push(filter.to_string());
            }
        }

        // otherwise the next ConnAck subscribes
        if self.is_connected() {
            self.client
                .subscribe(filter, QoS::AtLeastOnce)
                .await
                .map_err(|e| BusError::Subscribe {
                    topic: filter.to_string(),
                    message: e.to_string(),
                })?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        *self.state.borrow()
    }

    async fn reconnect(&self) -> Result<(), BusError> {
        request_retry(&self.retry);

        let mut state = self.state.clone();
        match timeout(RECONNECT_WAIT, state.wait_for(|connected| *connected)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(BusError::Connection("event loop stopped".to_string())),
            Err(_) => Err(BusError::ReconnectTimeout),
        }
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.task.abort();
    }
}
