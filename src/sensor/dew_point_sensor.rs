//! Dew point sensor state and update handling.
//!
//! The sensor is push-driven: it reads both source entities once when it is
//! attached, then reacts to state-change events for exactly those two
//! entities. Each valid reading replaces the channel's last value and the
//! dew point is recomputed from the pair.

use log::{error, warn};

use super::published::{DewPointAttributes, PublishedState};
use crate::constants::{SENSOR_DOMAIN, UNIT_CELSIUS};
use crate::dew_point::dew_point;
use crate::entity::{DeviceClass, EntityState, StateChangedEvent, StateClass, slugify};
use crate::host::{ConfigEntry, StateBus, StateLookup, Subscription};

/// Virtual temperature sensor reporting the dew point of two source sensors.
#[derive(Debug, Clone)]
pub struct DewPointSensor {
    entity_id: String,
    unique_id: String,
    name: String,
    temperature_sensor: String,
    humidity_sensor: String,
    temperature_value: Option<f64>,
    humidity_value: Option<f64>,
    native_value: Option<f64>,
}

impl DewPointSensor {
    pub const DEVICE_CLASS: DeviceClass = DeviceClass::Temperature;
    pub const STATE_CLASS: StateClass = StateClass::Measurement;

    /// Create a sensor with no readings and no value.
    ///
    /// The entity id is derived from the name; the host may hand out a
    /// different one (see [`DewPointSensor::with_entity_id`]).
    pub fn new(
        temperature_sensor: impl Into<String>,
        humidity_sensor: impl Into<String>,
        name: impl Into<String>,
        entry_id: &str,
    ) -> Self {
        let name = name.into();
        let object_id = match slugify(&name) {
            slug if slug.is_empty() => "dew_point".to_string(),
            slug => slug,
        };

        Self {
            entity_id: format!("{SENSOR_DOMAIN}.{object_id}"),
            unique_id: Self::unique_id_for(entry_id),
            name,
            temperature_sensor: temperature_sensor.into(),
            humidity_sensor: humidity_sensor.into(),
            temperature_value: None,
            humidity_value: None,
            native_value: None,
        }
    }

    /// Unique id of the sensor belonging to config entry `entry_id`.
    pub fn unique_id_for(entry_id: &str) -> String {
        format!("{entry_id}_dew_point")
    }

    pub fn from_entry(entry: &ConfigEntry) -> Self {
        Self::new(
            &entry.data.temperature_sensor,
            &entry.data.humidity_sensor,
            &entry.data.dew_point_name,
            &entry.entry_id,
        )
    }

    /// Publish under `entity_id` instead of the name-derived id.
    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = entity_id.into();
        self
    }

    pub fn temperature_sensor(&self) -> &str {
        &self.temperature_sensor
    }

    pub fn humidity_sensor(&self) -> &str {
        &self.humidity_sensor
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn temperature_value(&self) -> Option<f64> {
        self.temperature_value
    }

    pub fn humidity_value(&self) -> Option<f64> {
        self.humidity_value
    }

    pub fn native_value(&self) -> Option<f64> {
        self.native_value
    }

    /// Available exactly when a dew point could be computed.
    pub fn available(&self) -> bool {
        self.native_value.is_some()
    }

    /// Attach to the host: subscribe to both sources, seed the channels
    /// from their current states and compute the first value.
    ///
    /// The subscription is registered before the table is read so that no
    /// change in between is lost; a change that is both read here and
    /// queued on the subscription just recomputes the same value.
    pub fn attach(&mut self, states: &dyn StateLookup, bus: &StateBus) -> Subscription {
        let subscription = bus.track([
            self.temperature_sensor.clone(),
            self.humidity_sensor.clone(),
        ]);

        self.temperature_value = states
            .get(&self.temperature_sensor)
            .as_ref()
            .and_then(initial_reading);
        self.humidity_value = states
            .get(&self.humidity_sensor)
            .as_ref()
            .and_then(initial_reading);

        self.calculate();
        subscription
    }

    /// Apply a state-change event.
    ///
    /// Returns true when the event was accepted and the state should be
    /// written. Absent or sentinel states are ignored, as are values that do
    /// not parse as a number (logged as a warning); in both cases the stored
    /// channel values stay as they were.
    pub fn handle_state_change(&mut self, event: &StateChangedEvent) -> bool {
        let Some(new_state) = event.new_state.as_ref() else {
            return false;
        };
        if new_state.is_sentinel() {
            return false;
        }

        let channel = if event.entity_id == self.temperature_sensor {
            &mut self.temperature_value
        } else if event.entity_id == self.humidity_sensor {
            &mut self.humidity_value
        } else {
            return false;
        };

        match parse_reading(&new_state.state) {
            Ok(value) => *channel = Some(value),
            Err(e) => {
                warn!(
                    "[DewPoint] Unable to update sensor {}: {} reported {:?} ({})",
                    self.entity_id, event.entity_id, new_state.state, e
                );
                return false;
            }
        }

        self.calculate();
        true
    }

    /// Recompute the dew point from the current channel values.
    pub fn calculate(&mut self) {
        let (Some(temperature), Some(humidity)) = (self.temperature_value, self.humidity_value)
        else {
            self.native_value = None;
            return;
        };

        self.native_value = match dew_point(temperature, humidity) {
            Ok(value) => Some(value),
            Err(e) => {
                error!(
                    "[DewPoint] Error calculating dew point for {} (T={}, RH={}): {}",
                    self.entity_id, temperature, humidity, e
                );
                None
            }
        };
    }

    pub fn extra_state_attributes(&self) -> DewPointAttributes {
        DewPointAttributes {
            temperature_sensor: self.temperature_sensor.clone(),
            humidity_sensor: self.humidity_sensor.clone(),
            temperature_value: self.temperature_value,
            humidity_value: self.humidity_value,
        }
    }

    pub fn published_state(&self) -> PublishedState {
        PublishedState {
            entity_id: self.entity_id.clone(),
            unique_id: self.unique_id.clone(),
            name: self.name.clone(),
            native_value: self.native_value,
            unit_of_measurement: UNIT_CELSIUS.to_string(),
            device_class: Self::DEVICE_CLASS,
            state_class: Self::STATE_CLASS,
            attributes: self.extra_state_attributes(),
        }
    }
}

fn parse_reading(state: &str) -> Result<f64, std::num::ParseFloatError> {
    state.trim().parse::<f64>()
}

/// Seed value from a source's current state. Unparsable states are skipped
/// quietly here; only live updates warn.
fn initial_reading(state: &EntityState) -> Option<f64> {
    if state.is_sentinel() {
        return None;
    }
    parse_reading(&state.state).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Host;

    const T: &str = "sensor.cellar_temperature";
    const H: &str = "sensor.cellar_humidity";

    fn sensor() -> DewPointSensor {
        DewPointSensor::new(T, H, "Cellar Dew Point", "0123abcd")
    }

    fn changed(entity_id: &str, state: &str) -> StateChangedEvent {
        StateChangedEvent {
            entity_id: entity_id.to_string(),
            old_state: None,
            new_state: Some(EntityState::new(entity_id, state)),
        }
    }

    #[test]
    fn test_new_has_no_value() {
        let sensor = sensor();
        assert_eq!(sensor.entity_id(), "sensor.cellar_dew_point");
        assert_eq!(sensor.unique_id(), "0123abcd_dew_point");
        assert_eq!(sensor.name(), "Cellar Dew Point");
        assert_eq!(sensor.native_value(), None);
        assert!(!sensor.available());
    }

    #[test]
    fn test_unnamed_sensor_falls_back_to_dew_point_object_id() {
        let sensor = DewPointSensor::new(T, H, "???", "e1");
        assert_eq!(sensor.entity_id(), "sensor.dew_point");
    }

    #[test]
    fn test_with_entity_id_overrides_published_id() {
        let sensor = sensor().with_entity_id("sensor.cellar_dew_point_2");
        assert_eq!(sensor.entity_id(), "sensor.cellar_dew_point_2");
        assert_eq!(sensor.published_state().entity_id, "sensor.cellar_dew_point_2");
        assert_eq!(sensor.unique_id(), "0123abcd_dew_point");
    }

    #[test]
    fn test_attach_seeds_from_current_states() {
        let host = Host::new();
        host.set_state(T, "25.0");
        host.set_state(H, "60");

        let mut sensor = sensor();
        let _sub = sensor.attach(&host, host.bus());

        assert_eq!(sensor.temperature_value(), Some(25.0));
        assert_eq!(sensor.humidity_value(), Some(60.0));
        assert_eq!(sensor.native_value(), Some(16.7));
        assert!(sensor.available());
        assert_eq!(host.bus().listener_count(), 1);
    }

    #[test]
    fn test_attach_skips_sentinel_and_garbage() {
        let host = Host::new();
        host.set_state(T, "unavailable");
        host.set_state(H, "wet");

        let mut sensor = sensor();
        let _sub = sensor.attach(&host, host.bus());

        assert_eq!(sensor.temperature_value(), None);
        assert_eq!(sensor.humidity_value(), None);
        assert!(!sensor.available());
    }

    #[test]
    fn test_attach_with_missing_sources() {
        let host = Host::new();
        let mut sensor = sensor();
        let _sub = sensor.attach(&host, host.bus());
        assert!(!sensor.available());
    }

    #[test]
    fn test_update_recomputes() {
        let mut sensor = sensor();
        assert!(sensor.handle_state_change(&changed(T, "25.0")));
        assert_eq!(sensor.native_value(), None);

        assert!(sensor.handle_state_change(&changed(H, "60.0")));
        assert_eq!(sensor.native_value(), Some(16.7));

        assert!(sensor.handle_state_change(&changed(H, "100")));
        assert_eq!(sensor.native_value(), Some(25.0));
    }

    #[test]
    fn test_sentinel_update_keeps_channel() {
        let mut sensor = sensor();
        sensor.handle_state_change(&changed(T, "25.0"));
        sensor.handle_state_change(&changed(H, "60.0"));

        assert!(!sensor.handle_state_change(&changed(T, "unavailable")));
        assert!(!sensor.handle_state_change(&changed(H, "unknown")));
        assert_eq!(sensor.temperature_value(), Some(25.0));
        assert_eq!(sensor.humidity_value(), Some(60.0));
        assert_eq!(sensor.native_value(), Some(16.7));
    }

    #[test]
    fn test_removed_source_is_ignored() {
        let mut sensor = sensor();
        sensor.handle_state_change(&changed(T, "25.0"));
        let removed = StateChangedEvent {
            entity_id: T.to_string(),
            old_state: Some(EntityState::new(T, "25.0")),
            new_state: None,
        };
        assert!(!sensor.handle_state_change(&removed));
        assert_eq!(sensor.temperature_value(), Some(25.0));
    }

    #[test]
    fn test_unparsable_update_keeps_previous_values() {
        let mut sensor = sensor();
        sensor.handle_state_change(&changed(T, "25.0"));
        sensor.handle_state_change(&changed(H, "60.0"));

        assert!(!sensor.handle_state_change(&changed(T, "warm")));
        assert_eq!(sensor.temperature_value(), Some(25.0));
        assert_eq!(sensor.native_value(), Some(16.7));
    }

    #[test]
    fn test_unrelated_entity_is_ignored() {
        let mut sensor = sensor();
        assert!(!sensor.handle_state_change(&changed("sensor.other", "12")));
        assert_eq!(sensor.temperature_value(), None);
    }

    #[test]
    fn test_zero_humidity_clears_value() {
        let mut sensor = sensor();
        sensor.handle_state_change(&changed(T, "25.0"));
        sensor.handle_state_change(&changed(H, "60.0"));
        assert!(sensor.available());

        assert!(sensor.handle_state_change(&changed(H, "0")));
        assert_eq!(sensor.humidity_value(), Some(0.0));
        assert_eq!(sensor.native_value(), None);
        assert!(!sensor.available());

        assert!(sensor.handle_state_change(&changed(H, "-4.5")));
        assert!(!sensor.available());
    }

    #[test]
    fn test_same_event_twice_is_idempotent() {
        let mut sensor = sensor();
        sensor.handle_state_change(&changed(T, "21.3"));
        let event = changed(H, "48.2");

        assert!(sensor.handle_state_change(&event));
        let first = sensor.published_state();
        assert!(sensor.handle_state_change(&event));
        assert_eq!(sensor.published_state(), first);
    }

    #[test]
    fn test_published_state() {
        let mut sensor = sensor();
        sensor.handle_state_change(&changed(T, " 25.0 "));
        sensor.handle_state_change(&changed(H, "60"));

        let published = sensor.published_state();
        assert_eq!(published.entity_id, "sensor.cellar_dew_point");
        assert_eq!(published.state(), "16.7");
        assert_eq!(published.unit_of_measurement, "°C");
        assert_eq!(published.device_class, DeviceClass::Temperature);
        assert_eq!(published.state_class, StateClass::Measurement);
        assert_eq!(
            published.attributes,
            DewPointAttributes {
                temperature_sensor: T.into(),
                humidity_sensor: H.into(),
                temperature_value: Some(25.0),
                humidity_value: Some(60.0),
            }
        );
    }
}
