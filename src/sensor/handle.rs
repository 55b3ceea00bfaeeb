//! Entry setup and teardown for a dew point sensor.

use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::DewPointSensor;
use crate::host::{ConfigEntry, Host, StateWriter, Subscription};

/// Running sensor for one config entry.
///
/// Dropping the handle (or calling [`SensorHandle::remove`]) stops the
/// update task, which releases its state bus subscription.
pub struct SensorHandle {
    entry_id: String,
    entity_id: String,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SensorHandle {
    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop the sensor and wait for its update task to exit.
    pub async fn remove(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!("[DewPoint] Update task for {} ended abnormally: {}", self.entity_id, e);
        }
        info!("[DewPoint] Removed {}", self.entity_id);
    }
}

impl Drop for SensorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Create the dew point sensor for `entry`, attach it to `host` and start
/// feeding it state changes. The initial state is written before returning.
///
/// The sensor publishes under an entity id registered with `host`: never an
/// existing entity, another derived sensor or one of its own sources.
///
/// Must be called from within a tokio runtime.
pub async fn setup_entry(
    entry: &ConfigEntry,
    host: &Host,
    writer: Arc<dyn StateWriter>,
) -> SensorHandle {
    let sensor = DewPointSensor::from_entry(entry);
    let entity_id = host.register_entity(
        sensor.entity_id(),
        sensor.unique_id(),
        &[sensor.temperature_sensor(), sensor.humidity_sensor()],
    );
    let mut sensor = sensor.with_entity_id(entity_id);
    let subscription = sensor.attach(host, host.bus());

    info!(
        "[DewPoint] Set up {} from {} and {} (initial value: {:?})",
        sensor.entity_id(),
        entry.data.temperature_sensor,
        entry.data.humidity_sensor,
        sensor.native_value()
    );

    if let Err(e) = writer.write_state(&sensor.published_state()).await {
        error!("[DewPoint] Failed to write initial state: {}", e);
    }

    let cancel = CancellationToken::new();
    let entity_id = sensor.entity_id().to_string();
    let task = tokio::spawn(run_updates(sensor, subscription, writer, cancel.clone()));

    SensorHandle {
        entry_id: entry.entry_id.clone(),
        entity_id,
        cancel,
        task: Some(task),
    }
}

async fn run_updates(
    mut sensor: DewPointSensor,
    mut subscription: Subscription,
    writer: Arc<dyn StateWriter>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = subscription.recv() => event,
        };
        let Some(event) = event else {
            debug!("[DewPoint] State bus closed for {}", sensor.entity_id());
            break;
        };

        if !sensor.handle_state_change(&event) {
            continue;
        }
        if let Err(e) = writer.write_state(&sensor.published_state()).await {
            error!("[DewPoint] Failed to write state: {}", e);
        }
    }
}
