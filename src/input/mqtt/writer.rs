//! Publishes derived sensor states to MQTT.

use async_trait::async_trait;
use log::debug;
use rumqttc::{AsyncClient, QoS};

use crate::error::Result;
use crate::host::StateWriter;
use crate::sensor::PublishedState;

/// [`StateWriter`] that publishes each state as retained JSON on
/// `{prefix}/{entity_id}/state`.
pub struct MqttStateWriter {
    client: AsyncClient,
    prefix: String,
}

impl MqttStateWriter {
    pub fn new(client: AsyncClient, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
        }
    }

    pub fn state_topic(&self, entity_id: &str) -> String {
        format!("{}/{}/state", self.prefix, entity_id)
    }
}

/// JSON payload for a published state: the state string plus every
/// attribute, flat.
pub fn state_payload(state: &PublishedState) -> Result<Vec<u8>> {
    let mut body = state.state_attributes();
    body.insert("entity_id".into(), state.entity_id.clone().into());
    body.insert("unique_id".into(), state.unique_id.clone().into());
    body.insert("state".into(), state.state().into());
    Ok(serde_json::to_vec(&body)?)
}

#[async_trait]
impl StateWriter for MqttStateWriter {
    async fn write_state(&self, state: &PublishedState) -> Result<()> {
        let topic = self.state_topic(&state.entity_id);
        let payload = state_payload(state)?;
        debug!("[MQTT] {} -> {}", topic, state.state());
        self.client
            .publish(topic, QoS::AtLeastOnce, true, payload)
            .await?;
        Ok(())
    }
}
