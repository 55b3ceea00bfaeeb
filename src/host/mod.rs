//! Host collaborators injected into the wizard and the derived sensor.
//!
//! The wizard and the sensor never talk to a concrete home-automation
//! platform. They see three narrow interfaces:
//!
//! - [`StateLookup`]: read the current state of an entity
//! - [`EntryRegistry`]: duplicate detection and config entry persistence
//! - [`StateWriter`]: publish the derived sensor's state
//!
//! [`Host`] is the in-process implementation used by the service and by
//! tests: a state table plus a [`StateBus`] for change notifications.
//! [`EntryStore`] persists config entries as JSON.

pub mod bus;
pub mod entries;
pub mod memory;

pub use bus::{StateBus, Subscription};
pub use entries::{ConfigEntry, ConfigRecord, EntryStore, fingerprint};
pub use memory::Host;

use async_trait::async_trait;

use crate::entity::EntityState;
use crate::error::Result;
use crate::sensor::PublishedState;

/// Read access to the host's entity-state table.
pub trait StateLookup {
    /// Current state of `entity_id`, or `None` if the entity does not exist.
    fn get(&self, entity_id: &str) -> Option<EntityState>;
}

/// Config entry persistence as seen by the setup wizard.
pub trait EntryRegistry {
    /// True if an entry with this fingerprint already exists.
    fn is_configured(&self, unique_id: &str) -> bool;

    /// Persist a newly created entry.
    fn create_entry(&self, entry: ConfigEntry) -> Result<()>;
}

/// Destination for derived sensor states.
#[async_trait]
pub trait StateWriter: Send + Sync {
    async fn write_state(&self, state: &PublishedState) -> Result<()>;
}
