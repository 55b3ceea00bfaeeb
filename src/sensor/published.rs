//! State record handed to a [`StateWriter`](crate::host::StateWriter).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::STATE_UNAVAILABLE;
use crate::entity::{DeviceClass, StateClass};

/// Diagnostic attributes exposed next to the dew point value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DewPointAttributes {
    pub temperature_sensor: String,
    pub humidity_sensor: String,
    pub temperature_value: Option<f64>,
    pub humidity_value: Option<f64>,
}

/// Snapshot of the derived sensor as published to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedState {
    pub entity_id: String,
    pub unique_id: String,
    pub name: String,
    pub native_value: Option<f64>,
    pub unit_of_measurement: String,
    pub device_class: DeviceClass,
    pub state_class: StateClass,
    pub attributes: DewPointAttributes,
}

impl PublishedState {
    pub fn available(&self) -> bool {
        self.native_value.is_some()
    }

    /// State string: the value with one decimal, or `unavailable`.
    pub fn state(&self) -> String {
        match self.native_value {
            Some(value) => format!("{value:.1}"),
            None => STATE_UNAVAILABLE.to_string(),
        }
    }

    /// Attributes as stored in a host state table: the entity's metadata
    /// plus the diagnostic attributes.
    pub fn state_attributes(&self) -> Map<String, Value> {
        let mut attributes = match serde_json::to_value(&self.attributes) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        attributes.insert(
            "unit_of_measurement".into(),
            Value::String(self.unit_of_measurement.clone()),
        );
        attributes.insert(
            "device_class".into(),
            Value::String(self.device_class.to_string()),
        );
        attributes.insert(
            "state_class".into(),
            Value::String(self.state_class.to_string()),
        );
        attributes.insert("friendly_name".into(), Value::String(self.name.clone()));
        attributes
    }
}
