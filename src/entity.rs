//! Host-side entity model: states, state-change events and classifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumString};

use crate::constants::{STATE_UNAVAILABLE, STATE_UNKNOWN};

/// Returns true for the reserved states that carry no usable reading.
pub fn is_sentinel(state: &str) -> bool {
    state == STATE_UNKNOWN || state == STATE_UNAVAILABLE
}

/// Current state of one entity as held in the host state table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    pub last_changed: DateTime<Utc>,
}

impl EntityState {
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: Map::new(),
            last_changed: Utc::now(),
        }
    }

    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Domain part of the entity id (`sensor` for `sensor.kitchen`).
    pub fn domain(&self) -> &str {
        split_entity_id(&self.entity_id).map_or("", |(domain, _)| domain)
    }

    pub fn is_sentinel(&self) -> bool {
        is_sentinel(&self.state)
    }
}

/// Split `domain.object_id` into its two halves.
pub fn split_entity_id(entity_id: &str) -> Option<(&str, &str)> {
    let (domain, object_id) = entity_id.split_once('.')?;
    if domain.is_empty() || object_id.is_empty() {
        return None;
    }
    Some((domain, object_id))
}

/// Notification fired on the state bus whenever an entity's state changes.
///
/// `new_state` is `None` when the entity was removed from the state table.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChangedEvent {
    pub entity_id: String,
    pub old_state: Option<EntityState>,
    pub new_state: Option<EntityState>,
}

/// Sensor device classes understood by the entity selectors.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Temperature,
    Humidity,
}

/// How a sensor's values should be interpreted over time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    Measurement,
}

/// Turn a display name into an object id: lowercase ASCII alphanumerics,
/// with every other run of characters collapsed to a single `_`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_separator = false;

    for ch in text.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(ch);
        } else {
            pending_separator = true;
        }
    }

    slug
}
