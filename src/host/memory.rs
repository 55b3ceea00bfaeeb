//! In-process host: entity-state table plus state bus.

use async_trait::async_trait;
use log::{debug, info};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::{StateBus, StateLookup, StateWriter};
use crate::entity::{EntityState, StateChangedEvent};
use crate::error::Result;
use crate::sensor::PublishedState;

/// Thread-safe entity-state table that fires a [`StateChangedEvent`] on
/// every change.
///
/// Upstream states are fed in with [`Host::set_state`] (for example from the
/// MQTT statestream input). Derived sensors read it through [`StateLookup`]
/// and publish back into it through [`StateWriter`], under an entity id
/// handed out by [`Host::register_entity`].
#[derive(Default)]
pub struct Host {
    states: RwLock<HashMap<String, EntityState>>,
    /// entity_id -> unique_id of every derived entity.
    registry: RwLock<HashMap<String, String>>,
    bus: StateBus,
}

impl Host {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bus(&self) -> &StateBus {
        &self.bus
    }

    /// Set an entity's state without attributes.
    pub fn set_state(&self, entity_id: &str, state: &str) -> bool {
        self.set_state_with_attributes(entity_id, state, Map::new())
    }

    /// Store a new state and notify listeners.
    ///
    /// Returns false (and fires nothing) if neither the state string nor
    /// the attributes changed.
    pub fn set_state_with_attributes(
        &self,
        entity_id: &str,
        state: &str,
        attributes: Map<String, Value>,
    ) -> bool {
        let new_state = EntityState::new(entity_id, state).with_attributes(attributes);

        let old_state = {
            let mut states = self.states.write();
            if let Some(existing) = states.get(entity_id)
                && existing.state == new_state.state
                && existing.attributes == new_state.attributes
            {
                return false;
            }
            states.insert(entity_id.to_string(), new_state.clone())
        };

        let delivered = self.bus.fire(&StateChangedEvent {
            entity_id: entity_id.to_string(),
            old_state,
            new_state: Some(new_state),
        });
        debug!("[Host] {} -> {} ({} listener(s))", entity_id, state, delivered);
        true
    }

    /// Remove an entity from the state table, firing an event with no new state.
    pub fn remove_state(&self, entity_id: &str) -> bool {
        let Some(old_state) = self.states.write().remove(entity_id) else {
            return false;
        };

        self.bus.fire(&StateChangedEvent {
            entity_id: entity_id.to_string(),
            old_state: Some(old_state),
            new_state: None,
        });
        true
    }

    /// Reserve an entity id for the derived entity `unique_id`.
    ///
    /// An entity already registered under `unique_id` keeps its id. Otherwise
    /// `suggested` is taken unless it names an existing state, another
    /// registered entity or one of `exclude`; then `_2`, `_3`, ... are
    /// appended until the id is free.
    pub fn register_entity(&self, suggested: &str, unique_id: &str, exclude: &[&str]) -> String {
        let mut registry = self.registry.write();
        if let Some((entity_id, _)) = registry.iter().find(|(_, owner)| *owner == unique_id) {
            return entity_id.clone();
        }

        let entity_id = {
            let states = self.states.read();
            let taken = |id: &str| {
                registry.contains_key(id)
                    || states.contains_key(id)
                    || exclude.iter().any(|excluded| *excluded == id)
            };
            let mut candidate = suggested.to_string();
            let mut suffix = 2;
            while taken(candidate.as_str()) {
                candidate = format!("{suggested}_{suffix}");
                suffix += 1;
            }
            candidate
        };

        if entity_id != suggested {
            info!("[Host] {} is taken, registered {} instead", suggested, entity_id);
        }
        registry.insert(entity_id.clone(), unique_id.to_string());
        entity_id
    }

    /// Release a derived entity id and drop its state.
    pub fn unregister_entity(&self, entity_id: &str) -> bool {
        if self.registry.write().remove(entity_id).is_none() {
            return false;
        }
        self.remove_state(entity_id);
        true
    }

    /// Entity id registered for `unique_id`, if any.
    pub fn registered_entity(&self, unique_id: &str) -> Option<String> {
        self.registry
            .read()
            .iter()
            .find(|(_, owner)| *owner == unique_id)
            .map(|(entity_id, _)| entity_id.clone())
    }

    /// All known entity ids, sorted.
    pub fn entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.states.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl StateLookup for Host {
    fn get(&self, entity_id: &str) -> Option<EntityState> {
        self.states.read().get(entity_id).cloned()
    }
}

#[async_trait]
impl StateWriter for Host {
    async fn write_state(&self, state: &PublishedState) -> Result<()> {
        self.set_state_with_attributes(&state.entity_id, &state.state(), state.state_attributes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let host = Host::new();
        assert!(host.get("sensor.t").is_none());

        assert!(host.set_state("sensor.t", "21.5"));
        assert_eq!(host.get("sensor.t").unwrap().state, "21.5");
        assert_eq!(host.entity_ids(), vec!["sensor.t".to_string()]);
    }

    #[test]
    fn test_change_fires_event_with_old_state() {
        let host = Host::new();
        let mut sub = host.bus().track(["sensor.t"]);

        host.set_state("sensor.t", "20");
        host.set_state("sensor.t", "21");

        let first = sub.try_recv().unwrap();
        assert!(first.old_state.is_none());
        let second = sub.try_recv().unwrap();
        assert_eq!(second.old_state.unwrap().state, "20");
        assert_eq!(second.new_state.unwrap().state, "21");
    }

    #[test]
    fn test_unchanged_state_fires_nothing() {
        let host = Host::new();
        let mut sub = host.bus().track(["sensor.t"]);

        assert!(host.set_state("sensor.t", "20"));
        assert!(!host.set_state("sensor.t", "20"));

        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_remove_state() {
        let host = Host::new();
        host.set_state("sensor.t", "20");
        let mut sub = host.bus().track(["sensor.t"]);

        assert!(host.remove_state("sensor.t"));
        assert!(!host.remove_state("sensor.t"));
        assert!(host.get("sensor.t").is_none());

        let event = sub.try_recv().unwrap();
        assert!(event.new_state.is_none());
        assert_eq!(event.old_state.unwrap().state, "20");
    }

    #[test]
    fn test_register_entity_appends_suffix_on_collision() {
        let host = Host::new();
        let register = |unique_id| host.register_entity("sensor.dew_point", unique_id, &[]);
        assert_eq!(register("a_dew_point"), "sensor.dew_point");
        assert_eq!(register("b_dew_point"), "sensor.dew_point_2");
        assert_eq!(register("c_dew_point"), "sensor.dew_point_3");
    }

    #[test]
    fn test_register_entity_keeps_id_for_same_owner() {
        let host = Host::new();
        let first = host.register_entity("sensor.dew_point", "a_dew_point", &[]);
        host.set_state(&first, "16.7");

        assert_eq!(host.register_entity("sensor.dew_point", "a_dew_point", &[]), first);
        assert_eq!(host.registered_entity("a_dew_point"), Some(first));
    }

    #[test]
    fn test_register_entity_skips_existing_and_excluded_ids() {
        let host = Host::new();
        host.set_state("sensor.bath_temperature", "25.0");

        assert_eq!(
            host.register_entity("sensor.bath_temperature", "a_dew_point", &[]),
            "sensor.bath_temperature_2"
        );
        // Not in the table yet, but one of the sensor's own sources.
        let source = "sensor.cellar_humidity";
        assert_eq!(
            host.register_entity(source, "b_dew_point", &[source]),
            "sensor.cellar_humidity_2"
        );
    }

    #[test]
    fn test_unregister_entity_frees_id_and_state() {
        let host = Host::new();
        let id = host.register_entity("sensor.dew_point", "a_dew_point", &[]);
        host.set_state(&id, "16.7");

        assert!(host.unregister_entity(&id));
        assert!(!host.unregister_entity(&id));
        assert!(host.get(&id).is_none());
        assert_eq!(host.registered_entity("a_dew_point"), None);
        assert_eq!(
            host.register_entity("sensor.dew_point", "b_dew_point", &[]),
            "sensor.dew_point"
        );
    }
}
