//! Config entry lifecycle: one running sensor per stored entry.

use log::info;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config_flow::DewPointConfigFlow;
use crate::error::{DewPointError, Result};
use crate::host::{ConfigEntry, EntryStore, Host, StateWriter};
use crate::sensor::{DewPointSensor, SensorHandle, setup_entry};

/// Owns the running sensors for every config entry in an [`EntryStore`].
pub struct Integration {
    host: Arc<Host>,
    store: Arc<EntryStore>,
    writer: Arc<dyn StateWriter>,
    sensors: HashMap<String, SensorHandle>,
}

impl Integration {
    pub fn new(host: Arc<Host>, store: Arc<EntryStore>, writer: Arc<dyn StateWriter>) -> Self {
        Self {
            host,
            store,
            writer,
            sensors: HashMap::new(),
        }
    }

    /// Start a setup wizard against this integration's host and store.
    pub fn config_flow(&self) -> DewPointConfigFlow<'_> {
        DewPointConfigFlow::new(self.host.as_ref(), self.store.as_ref())
    }

    /// Set up a sensor for every stored entry that is not running yet.
    /// Returns the number of sensors started.
    pub async fn setup_all(&mut self) -> usize {
        let mut started = 0;
        for entry in self.store.entries() {
            if self.sensors.contains_key(&entry.entry_id) {
                continue;
            }
            self.setup(&entry).await;
            started += 1;
        }
        info!("[DewPoint] {} sensor(s) running", self.sensors.len());
        started
    }

    /// Set up (or restart) the sensor for one entry.
    pub async fn setup(&mut self, entry: &ConfigEntry) {
        if let Some(previous) = self.sensors.remove(&entry.entry_id) {
            previous.remove().await;
        }
        let handle = setup_entry(entry, &self.host, self.writer.clone()).await;
        self.sensors.insert(entry.entry_id.clone(), handle);
    }

    /// Stop the entry's sensor, delete the entry from the store and release
    /// the sensor's entity id.
    pub async fn remove_entry(&mut self, entry_id: &str) -> Result<ConfigEntry> {
        if self.store.get(entry_id).is_none() {
            return Err(DewPointError::EntryNotFound(entry_id.to_string()));
        }
        if let Some(handle) = self.sensors.remove(entry_id) {
            handle.remove().await;
        }
        let removed = self.store.remove(entry_id)?;

        let unique_id = DewPointSensor::unique_id_for(entry_id);
        if let Some(entity_id) = self.host.registered_entity(&unique_id) {
            self.host.unregister_entity(&entity_id);
        }
        Ok(removed)
    }

    /// Stop every sensor. Entries stay in the store.
    pub async fn shutdown(&mut self) {
        for (_, handle) in self.sensors.drain() {
            handle.remove().await;
        }
    }

    pub fn sensor(&self, entry_id: &str) -> Option<&SensorHandle> {
        self.sensors.get(entry_id)
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }
}
