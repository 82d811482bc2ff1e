use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use taika_ring_bridge::config::{AppConfig, CONFIG_FILE_NAME};
use taika_ring_bridge::core::bluetooth::{BluestTransport, event_channel};
use taika_ring_bridge::core::events::RingEvent;
use taika_ring_bridge::logging::RingLogger;
use taika_ring_bridge::platform::{AlwaysGranted, HostName};
use taika_ring_bridge::storage::JsonFileStore;
use taika_ring_bridge::AppState;

const CONFIG_DIR_ENV: &str = "TAIKA_BRIDGE_CONFIG_DIR";
const DEFAULT_CONFIG_DIR: &str = ".taika-ring-bridge";

fn config_dir() -> PathBuf {
    std::env::var_os(CONFIG_DIR_ENV)
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME").map(|home| PathBuf::from(home).join(DEFAULT_CONFIG_DIR))
        })
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR))
}

fn log_events(state: &AppState) {
    for name in [
        RingEvent::CONNECTED,
        RingEvent::DISCONNECTED,
        RingEvent::MODE_ACTION,
        RingEvent::LOW_BATTERY,
        RingEvent::DEVICE_CONFIRMATION_NEEDED,
        RingEvent::RING_ERROR,
        RingEvent::BONDING_LIST_CHANGED,
        RingEvent::BECAME_PRIMARY,
        RingEvent::CLAIM_REJECTED,
    ] {
        state.bus.subscribe(name, |event| match serde_json::to_string(event) {
            Ok(json) => info!("{}", json),
            Err(e) => warn!("Unserializable {} event: {}", event.name(), e),
        });
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_dir = config_dir();
    // Loaded before the logger exists, so a missing-file warning goes nowhere.
    let config = AppConfig::load_config(&config_dir).await?;

    if RingLogger::init(config.logging).is_err() {
        env_logger::builder()
            .filter_level(log::LevelFilter::Info)
            .init();
    }
    info!("Using config directory {:?}", config_dir);
    if !config_dir.join(CONFIG_FILE_NAME).exists() {
        config.save_config(&config_dir).await?;
    }

    let store = Arc::new(JsonFileStore::open(config.storage_path(&config_dir)).await?);
    let (events_tx, events_rx) = event_channel();
    let transport = Arc::new(BluestTransport::new(events_tx).await?);

    let mut state =
        AppState::new(config, transport, store, Arc::new(AlwaysGranted), &HostName).await?;
    log_events(&state);

    let shutdown = CancellationToken::new();
    let mut connection = state.spawn_connection(events_rx, shutdown.clone())?;

    let mut states = state.connection_state();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *states.borrow_and_update();
                info!("Connection state: {}", current);
            }
            result = &mut connection => {
                if let Err(e) = result {
                    error!("Connection task failed: {}", e);
                }
                return Ok(());
            }
        }
    }

    shutdown.cancel();
    if let Err(e) = connection.await {
        error!("Connection task failed: {}", e);
    }
    Ok(())
}
