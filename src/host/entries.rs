//! Config entry persistence.
//!
//! Entries are created once by the setup wizard and read back on every
//! start to set up their sensors. They are kept in a single JSON file:
//!
//! ```json
//! { "entries": [ { "entry_id": "…", "unique_id": "sensor.t_sensor.h", … } ] }
//! ```

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::EntryRegistry;
use crate::constants::{DEFAULT_NAME, DOMAIN};
use crate::error::{DewPointError, Result};

/// Uniqueness key for a pair of source entities. Order-sensitive.
pub fn fingerprint(temperature_sensor: &str, humidity_sensor: &str) -> String {
    format!("{temperature_sensor}_{humidity_sensor}")
}

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

/// What the user configured: the two source entities and a display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRecord {
    pub temperature_sensor: String,
    pub humidity_sensor: String,
    #[serde(default = "default_name")]
    pub dew_point_name: String,
}

impl ConfigRecord {
    pub fn new(
        temperature_sensor: impl Into<String>,
        humidity_sensor: impl Into<String>,
        dew_point_name: impl Into<String>,
    ) -> Self {
        Self {
            temperature_sensor: temperature_sensor.into(),
            humidity_sensor: humidity_sensor.into(),
            dew_point_name: dew_point_name.into(),
        }
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.temperature_sensor, &self.humidity_sensor)
    }
}

/// A persisted integration instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub entry_id: String,
    pub domain: String,
    pub unique_id: String,
    pub title: String,
    pub version: u32,
    pub data: ConfigRecord,
    pub created_at: DateTime<Utc>,
}

impl ConfigEntry {
    pub const VERSION: u32 = 1;

    /// New entry with a fresh random id, keyed by the record's fingerprint.
    pub fn new(title: impl Into<String>, data: ConfigRecord) -> Self {
        Self {
            entry_id: Uuid::new_v4().simple().to_string(),
            domain: DOMAIN.to_string(),
            unique_id: data.fingerprint(),
            title: title.into(),
            version: Self::VERSION,
            data,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct PersistedEntries {
    entries: Vec<ConfigEntry>,
}

impl PersistedEntries {
    fn load(path: &Path) -> Self {
        match fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<PersistedEntries>(&bytes) {
                Ok(state) => {
                    info!(
                        "[Store] Loaded {} config entries from {:?}",
                        state.entries.len(),
                        path
                    );
                    state
                }
                Err(e) => {
                    warn!("[Store] Failed to parse entries file {:?}: {}", path, e);
                    let backup = backup_path(path);
                    match fs::rename(path, &backup) {
                        Ok(()) => warn!("[Store] Moved unreadable entries file to {:?}", backup),
                        Err(e) => error!("[Store] Failed to back up {:?}: {}", path, e),
                    }
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("[Store] No config entries found (first run)");
                Self::default()
            }
            Err(e) => {
                error!("[Store] Failed to read entries file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(path, data)?;
        info!(
            "[Store] Saved {} config entries to {:?}",
            self.entries.len(),
            path
        );
        Ok(())
    }
}

/// `entries.json` -> `entries.json.bak`
fn backup_path(path: &Path) -> PathBuf {
    let mut backup = path.as_os_str().to_owned();
    backup.push(".bak");
    PathBuf::from(backup)
}

/// Config entries, written through to a JSON file when a path is set.
///
/// Changes are saved before they become visible: a failed save leaves the
/// store as it was.
pub struct EntryStore {
    path: Option<PathBuf>,
    state: RwLock<PersistedEntries>,
}

impl EntryStore {
    /// Open (or start) the store backed by `path`.
    pub fn open(path: PathBuf) -> Self {
        let state = PersistedEntries::load(&path);
        Self {
            path: Some(path),
            state: RwLock::new(state),
        }
    }

    /// Store that keeps entries in memory only.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(PersistedEntries::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn entries(&self) -> Vec<ConfigEntry> {
        self.state.read().entries.clone()
    }

    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.state
            .read()
            .entries
            .iter()
            .find(|e| e.entry_id == entry_id)
            .cloned()
    }

    pub fn add(&self, entry: ConfigEntry) -> Result<()> {
        let mut state = self.state.write();
        if state.entries.iter().any(|e| e.unique_id == entry.unique_id) {
            return Err(DewPointError::DuplicateEntry(entry.unique_id));
        }
        let mut next = state.clone();
        next.entries.push(entry);
        self.persist(&next)?;
        *state = next;
        Ok(())
    }

    /// Delete an entry. Returns the removed entry.
    pub fn remove(&self, entry_id: &str) -> Result<ConfigEntry> {
        let mut state = self.state.write();
        let index = state
            .entries
            .iter()
            .position(|e| e.entry_id == entry_id)
            .ok_or_else(|| DewPointError::EntryNotFound(entry_id.to_string()))?;
        let mut next = state.clone();
        let removed = next.entries.remove(index);
        self.persist(&next)?;
        *state = next;
        Ok(removed)
    }

    fn persist(&self, state: &PersistedEntries) -> Result<()> {
        match &self.path {
            Some(path) => state.save(path),
            None => Ok(()),
        }
    }
}

impl EntryRegistry for EntryStore {
    fn is_configured(&self, unique_id: &str) -> bool {
        self.state
            .read()
            .entries
            .iter()
            .any(|e| e.unique_id == unique_id)
    }

    fn create_entry(&self, entry: ConfigEntry) -> Result<()> {
        self.add(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("dew-point-bridge-test-{}", Uuid::new_v4().simple()))
            .join("entries.json")
    }

    fn record() -> ConfigRecord {
        ConfigRecord::new("sensor.t", "sensor.h", "Cellar Dew Point")
    }

    #[test]
    fn test_fingerprint_is_order_sensitive() {
        assert_eq!(fingerprint("sensor.t", "sensor.h"), "sensor.t_sensor.h");
        assert_ne!(
            fingerprint("sensor.t", "sensor.h"),
            fingerprint("sensor.h", "sensor.t")
        );
    }

    #[test]
    fn test_new_entry() {
        let entry = ConfigEntry::new("Cellar Dew Point", record());
        assert_eq!(entry.unique_id, "sensor.t_sensor.h");
        assert_eq!(entry.domain, DOMAIN);
        assert_eq!(entry.version, 1);
        assert_eq!(entry.entry_id.len(), 32);
        assert_ne!(entry.entry_id, ConfigEntry::new("x", record()).entry_id);
    }

    #[test]
    fn test_record_name_defaults_when_missing() {
        let record: ConfigRecord = serde_json::from_str(
            r#"{"temperature_sensor":"sensor.t","humidity_sensor":"sensor.h"}"#,
        )
        .unwrap();
        assert_eq!(record.dew_point_name, DEFAULT_NAME);
    }

    #[test]
    fn test_add_rejects_duplicate_fingerprint() {
        let store = EntryStore::in_memory();
        store.add(ConfigEntry::new("a", record())).unwrap();
        assert!(store.is_configured("sensor.t_sensor.h"));

        let err = store.add(ConfigEntry::new("b", record())).unwrap_err();
        assert!(matches!(err, DewPointError::DuplicateEntry(_)));
        assert_eq!(store.entries().len(), 1);
    }

    #[test]
    fn test_remove() {
        let store = EntryStore::in_memory();
        let entry = ConfigEntry::new("a", record());
        store.add(entry.clone()).unwrap();

        assert_eq!(store.remove(&entry.entry_id).unwrap(), entry);
        assert!(!store.is_configured(&entry.unique_id));
        assert!(matches!(
            store.remove(&entry.entry_id),
            Err(DewPointError::EntryNotFound(_))
        ));
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let path = temp_store_path();
        let entry = ConfigEntry::new("Cellar Dew Point", record());
        {
            let store = EntryStore::open(path.clone());
            assert!(store.entries().is_empty());
            store.add(entry.clone()).unwrap();
        }

        let reopened = EntryStore::open(path.clone());
        assert_eq!(reopened.entries(), vec![entry.clone()]);
        assert_eq!(reopened.get(&entry.entry_id), Some(entry.clone()));

        reopened.remove(&entry.entry_id).unwrap();
        assert!(EntryStore::open(path.clone()).entries().is_empty());

        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_corrupt_file_loads_empty_and_is_kept_as_backup() {
        let path = temp_store_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"not json").unwrap();

        let store = EntryStore::open(path.clone());
        assert!(store.entries().is_empty());
        assert!(!path.exists());
        assert_eq!(fs::read(backup_path(&path)).unwrap(), b"not json");

        // Saving afterwards leaves the backup alone.
        store.add(ConfigEntry::new("a", record())).unwrap();
        assert_eq!(fs::read(backup_path(&path)).unwrap(), b"not json");
        assert_eq!(EntryStore::open(path.clone()).entries().len(), 1);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_failed_save_does_not_add_entry() {
        let dir = temp_store_path().parent().unwrap().to_path_buf();
        fs::create_dir_all(&dir).unwrap();
        let blocker = dir.join("not-a-dir");
        fs::write(&blocker, b"").unwrap();

        let store = EntryStore::open(blocker.join("entries.json"));
        let entry = ConfigEntry::new("a", record());

        assert!(store.create_entry(entry.clone()).is_err());
        assert!(!store.is_configured(&entry.unique_id));
        assert!(store.entries().is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_failed_save_does_not_remove_entry() {
        let path = temp_store_path();
        let dir = path.parent().unwrap().to_path_buf();
        let store = EntryStore::open(path.clone());
        let entry = ConfigEntry::new("a", record());
        store.add(entry.clone()).unwrap();

        // Replace the store's directory with a plain file.
        fs::remove_dir_all(&dir).unwrap();
        fs::write(&dir, b"").unwrap();

        assert!(store.remove(&entry.entry_id).is_err());
        assert_eq!(store.get(&entry.entry_id), Some(entry.clone()));
        assert!(store.is_configured(&entry.unique_id));

        let _ = fs::remove_file(&dir);
    }

    #[test]
    fn test_backup_path() {
        assert_eq!(
            backup_path(Path::new("/data/entries.json")),
            PathBuf::from("/data/entries.json.bak")
        );
    }
}
