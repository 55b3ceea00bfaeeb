use dew_point_bridge::config::{Config, load_dotenv};
use dew_point_bridge::config_flow::{FlowResult, UserInput};
use dew_point_bridge::host::{EntryStore, Host, StateWriter};
use dew_point_bridge::input::mqtt::{MqttClient, MqttStateWriter, StatestreamInput};
use dew_point_bridge::integration::Integration;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

/// Submit the wizard once with the configured sensors and report the result.
fn run_wizard(integration: &Integration, input: UserInput) {
    let requested = format!("{} + {}", input.temperature_sensor, input.humidity_sensor);
    match integration.config_flow().step_user(Some(input)) {
        Ok(FlowResult::CreateEntry { title, entry }) => {
            info!("Configured \"{}\" ({})", title, entry.entry_id);
        }
        Ok(FlowResult::Abort { reason }) => {
            info!("Wizard aborted for {}: {}", requested, reason);
        }
        Ok(FlowResult::ShowForm { errors, .. }) => {
            for (field, err) in errors {
                warn!("Wizard rejected {}: {}", field.key(), err);
            }
        }
        Err(e) => error!("Failed to save config entry: {}", e),
    }
}

#[tokio::main]
async fn main() {
    load_dotenv();
    init_logger();
    info!("Starting Dew Point Bridge");

    let config = Config::from_env();
    info!("Configuration loaded:");
    info!(
        "  MQTT broker: {}:{}",
        config.mqtt.broker_host, config.mqtt.broker_port
    );
    info!("  Statestream prefix: {}", config.statestream.state_prefix);
    info!("  Publish prefix: {}", config.statestream.publish_prefix);
    info!("  Entry store: {:?}", config.store.entries_path);

    let host = Arc::new(Host::new());
    let store = Arc::new(EntryStore::open(config.store.entries_path.clone()));

    let mqtt_client = MqttClient::new(&config.mqtt);
    let writer: Arc<dyn StateWriter> = Arc::new(MqttStateWriter::new(
        mqtt_client.client(),
        config.statestream.publish_prefix.clone(),
    ));

    let input = StatestreamInput::new(config.statestream.state_prefix.clone(), host.clone());
    let (input_task, ready) = input.start(mqtt_client);

    if ready.await.is_err() {
        error!("MQTT input failed to start");
        std::process::exit(1);
    }

    // Retained states arrive right after subscribing.
    tokio::time::sleep(Duration::from_secs(config.statestream.settle_secs)).await;
    info!("Mirroring {} upstream entities", host.entity_ids().len());

    let mut integration = Integration::new(host.clone(), store, writer);

    if let Some(input) = config.wizard.clone() {
        run_wizard(&integration, input);
    }

    let started = integration.setup_all().await;
    if started == 0 {
        warn!("No dew point sensors configured");
    }

    info!("Dew Point Bridge is running");
    info!("  - Press Ctrl+C to exit");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal");
        }
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    integration.shutdown().await;
    input_task.abort();

    info!("Dew Point Bridge stopped");
}
