//! MQTT bridge to an upstream home-automation install.
//!
//! Upstream entity states arrive through a statestream topic tree and are
//! mirrored into the local [`Host`](crate::host::Host); derived states are
//! published back as retained JSON.

mod client;
mod statestream;
mod writer;

pub use client::{MqttClient, MqttEvent, MqttMessage};
pub use statestream::{StatestreamInput, parse_state_topic};
pub use writer::{MqttStateWriter, state_payload};
