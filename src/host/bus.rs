//! State-change bus with per-entity subscriptions.
//!
//! Listeners register for a set of entity ids and receive matching
//! [`StateChangedEvent`]s in firing order through an unbounded channel.
//! Dropping the returned [`Subscription`] unregisters the listener.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

use crate::entity::StateChangedEvent;

struct Listener {
    id: u64,
    entity_ids: HashSet<String>,
    tx: mpsc::UnboundedSender<StateChangedEvent>,
}

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    entries: RwLock<Vec<Listener>>,
}

impl Listeners {
    fn remove(&self, id: u64) {
        self.entries.write().retain(|l| l.id != id);
    }
}

/// Fan-out of state changes to the listeners tracking each entity.
#[derive(Clone, Default)]
pub struct StateBus {
    inner: Arc<Listeners>,
}

impl StateBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track state changes for the given entity ids.
    pub fn track<I, S>(&self, entity_ids: I) -> Subscription
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let entity_ids: HashSet<String> = entity_ids.into_iter().map(Into::into).collect();
        let (tx, rx) = mpsc::unbounded_channel();

        self.inner.entries.write().push(Listener {
            id,
            entity_ids,
            tx,
        });

        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver an event to every listener tracking its entity.
    /// Returns the number of listeners it was delivered to.
    pub fn fire(&self, event: &StateChangedEvent) -> usize {
        let entries = self.inner.entries.read();
        entries
            .iter()
            .filter(|l| l.entity_ids.contains(&event.entity_id))
            .filter(|l| l.tx.send(event.clone()).is_ok())
            .count()
    }

    /// Number of live subscriptions.
    pub fn listener_count(&self) -> usize {
        self.inner.entries.read().len()
    }
}

/// Registration on a [`StateBus`]. Unregisters itself when dropped.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<StateChangedEvent>,
    bus: Weak<Listeners>,
}

impl Subscription {
    /// Wait for the next matching event. Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<StateChangedEvent> {
        self.rx.recv().await
    }

    /// Take the next already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<StateChangedEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.bus.upgrade() {
            listeners.remove(self.id);
        }
    }
}
