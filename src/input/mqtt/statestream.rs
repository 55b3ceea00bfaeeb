//! Mirror of upstream entity states from an MQTT statestream.
//!
//! The upstream home-automation install publishes every entity's state as
//! a plain string on `{prefix}/{domain}/{object_id}/state`. Each message is
//! applied to the local [`Host`], which notifies the derived sensors.

use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::client::{MqttClient, MqttEvent, subscribe};
use crate::host::Host;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Entity id carried by a statestream state topic, if `topic` is one.
pub fn parse_state_topic(prefix: &str, topic: &str) -> Option<String> {
    let rest = topic.strip_prefix(prefix)?.strip_prefix('/')?;
    let mut parts = rest.split('/');

    let (Some(domain), Some(object_id), Some("state"), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    if domain.is_empty() || object_id.is_empty() {
        return None;
    }

    Some(format!("{domain}.{object_id}"))
}

/// Applies statestream messages to a [`Host`].
pub struct StatestreamInput {
    prefix: String,
    host: Arc<Host>,
}

impl StatestreamInput {
    pub fn new(prefix: impl Into<String>, host: Arc<Host>) -> Self {
        Self {
            prefix: prefix.into(),
            host,
        }
    }

    /// Wildcard subscription covering every state topic.
    pub fn subscribe_topic(&self) -> String {
        format!("{}/+/+/state", self.prefix)
    }

    /// Apply one message. Returns true if it was a state topic.
    pub fn process_message(&self, topic: &str, payload: &str) -> bool {
        let Some(entity_id) = parse_state_topic(&self.prefix, topic) else {
            return false;
        };

        let state = payload.trim();
        // Statestream may JSON-quote string states.
        let state = state
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(state);

        if state.is_empty() {
            // Empty retained payload clears the topic: the entity is gone.
            self.host.remove_state(&entity_id);
        } else {
            self.host.set_state(&entity_id, state);
        }
        true
    }

    /// Apply one client event. Returns true when the wildcard has to be
    /// subscribed, which is after every (re)connect.
    pub fn handle_event(&self, event: MqttEvent) -> bool {
        match event {
            MqttEvent::Connected => true,
            MqttEvent::Message(msg) => {
                self.process_message(&msg.topic, &msg.payload);
                false
            }
        }
    }

    /// Connect, subscribe and keep applying messages in a background task.
    ///
    /// The returned receiver fires once the first subscription is in place,
    /// so the caller can wait for retained states before setting up sensors.
    /// It is dropped without firing if the broker is not reached within ten
    /// seconds.
    pub fn start(self, client: MqttClient) -> (JoinHandle<()>, oneshot::Receiver<()>) {
        let (ready_tx, ready_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            self.run(client, ready_tx).await;
        });
        (handle, ready_rx)
    }

    async fn run(self, client: MqttClient, ready: oneshot::Sender<()>) {
        let requests = client.client();
        let (event_tx, mut event_rx) = mpsc::channel::<MqttEvent>(256);
        let mqtt_loop = tokio::spawn(client.run(event_tx));

        let topic = self.subscribe_topic();
        let mut ready = Some(ready);
        let connect_timeout = tokio::time::sleep(CONNECT_TIMEOUT);
        tokio::pin!(connect_timeout);

        loop {
            let event = tokio::select! {
                event = event_rx.recv() => event,
                _ = &mut connect_timeout, if ready.is_some() => {
                    warn!("[MQTT] No connection after {:?}", CONNECT_TIMEOUT);
                    break;
                }
            };
            let Some(event) = event else {
                break;
            };
            if !self.handle_event(event) {
                continue;
            }

            if let Err(e) = subscribe(&requests, &topic).await {
                warn!("[MQTT] Failed to subscribe to {}: {}", topic, e);
                continue;
            }
            match ready.take() {
                Some(ready) => {
                    let _ = ready.send(());
                    info!("[MQTT] Mirroring states from {}", topic);
                }
                None => info!("[MQTT] Resubscribed to {} after reconnect", topic),
            }
        }

        mqtt_loop.abort();
    }
}
