//! MQTT client wrapper for statestream input and state publishing.

use crate::config::MqttConfig;
use log::{debug, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Publish received from the broker.
#[derive(Debug, Clone)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: String,
}

/// What the event loop reports to its consumer.
#[derive(Debug, Clone)]
pub enum MqttEvent {
    /// A ConnAck arrived. The session is clean, so any subscription has to
    /// be made again.
    Connected,
    Message(MqttMessage),
}

/// Connection to the broker: a cloneable [`AsyncClient`] for requests and
/// the [`EventLoop`] that drives them.
pub struct MqttClient {
    client: AsyncClient,
    event_loop: EventLoop,
}

impl MqttClient {
    pub fn new(config: &MqttConfig) -> Self {
        let (client, event_loop) = AsyncClient::new(options(config), 100);
        Self { client, event_loop }
    }

    /// Request handle for subscribing and publishing from other tasks.
    pub fn client(&self) -> AsyncClient {
        self.client.clone()
    }

    /// Drive the connection until `tx` is closed.
    ///
    /// Every (re)connect is reported as [`MqttEvent::Connected`] and every
    /// UTF-8 publish as [`MqttEvent::Message`]. Poll errors are retried
    /// after five seconds.
    pub async fn run(mut self, tx: mpsc::Sender<MqttEvent>) {
        debug!("[MQTT] Event loop started");

        loop {
            let event = match self.event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!("[MQTT] Connected ({:?})", ack.code);
                    MqttEvent::Connected
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    match String::from_utf8(publish.payload.to_vec()) {
                        Ok(payload) => {
                            debug!("[MQTT] {} <- {}", publish.topic, payload);
                            MqttEvent::Message(MqttMessage {
                                topic: publish.topic,
                                payload,
                            })
                        }
                        Err(e) => {
                            warn!("[MQTT] Dropping non-UTF-8 payload on {}: {}", publish.topic, e);
                            continue;
                        }
                    }
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!(
                        "[MQTT] Connection lost ({}), retrying in {:?}",
                        e, RECONNECT_DELAY
                    );
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }
            };

            if tx.send(event).await.is_err() {
                debug!("[MQTT] Event receiver gone, stopping event loop");
                break;
            }
        }
    }
}

fn options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
    options.set_keep_alive(KEEP_ALIVE);
    options.set_clean_session(true);
    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username, password);
    }
    options
}

/// Subscribe with at-most-once delivery.
pub async fn subscribe(client: &AsyncClient, topic: &str) -> Result<(), rumqttc::ClientError> {
    info!("[MQTT] Subscribing to {}", topic);
    client.subscribe(topic, QoS::AtMostOnce).await
}
