//! Application state management
//! `AppState` builds and owns every long-lived service of the bridge.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use log::info;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::bluetooth::{
    CharacteristicGateway, ConnectionState, ConnectionStateMachine, DeviceFilter, RingManager,
    RingTransport, SharedLink, TransportEventReceiver, load_paired_ring, new_shared_link,
};
use crate::core::events::EventBus;
use crate::platform::{DeviceNameLookup, PermissionGateway};
use crate::storage::PersistenceGateway;

pub struct AppState {
    pub config: AppConfig,
    pub bus: Arc<EventBus>,
    pub store: Arc<dyn PersistenceGateway>,
    pub link: SharedLink,
    pub manager: Arc<RingManager>,
    machine: Option<ConnectionStateMachine>,
    connection_state: watch::Receiver<ConnectionState>,
    registry_sync: JoinHandle<()>,
}

impl AppState {
    /// Wires the transport, store and platform collaborators together.
    /// Nothing touches the adapter until [`AppState::spawn_connection`].
    pub async fn new(
        config: AppConfig,
        transport: Arc<dyn RingTransport>,
        store: Arc<dyn PersistenceGateway>,
        permissions: Arc<dyn PermissionGateway>,
        names: &dyn DeviceNameLookup,
    ) -> Result<Self> {
        let bus = EventBus::new();
        let link = new_shared_link();
        let settings = &config.connection;

        let paired = load_paired_ring(store.as_ref()).await;
        if paired.is_unset() {
            info!("No paired ring, looking for a new one");
        } else {
            info!("Paired ring {} ({})", paired.name, paired.id);
        }
        let filter = DeviceFilter::new(paired, settings.product_name.clone(), settings.signal_floor)
            .with_services(vec![settings.scan_service_filter]);

        info!("Initializing RingManager...");
        let manager = Arc::new(
            RingManager::new(
                CharacteristicGateway::new(transport.clone(), link.clone()),
                bus.clone(),
                store.clone(),
                names.device_name(),
                settings,
            )
            .await?,
        );
        let registry_sync = manager.spawn_registry_sync();

        let mut machine = ConnectionStateMachine::new(
            transport,
            link.clone(),
            bus.clone(),
            store.clone(),
            permissions,
            filter,
            settings.backoff(),
        );
        machine.add_ready_callback(manager.clone());
        let connection_state = machine.subscribe_state();

        Ok(Self {
            config,
            bus,
            store,
            link,
            manager,
            machine: Some(machine),
            connection_state,
            registry_sync,
        })
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection_state.clone()
    }

    /// Starts the connection state machine on its own task. Can only be done once.
    pub fn spawn_connection(
        &mut self,
        events: TransportEventReceiver,
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<()>> {
        let machine = self
            .machine
            .take()
            .ok_or_else(|| anyhow!("connection state machine already running"))?;
        Ok(tokio::spawn(machine.run(events, shutdown)))
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        self.registry_sync.abort();
    }
}
