//! [`RingTransport`] over the `bluest` cross-platform BLE stack.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use bluest::error::ErrorKind;
use bluest::{Adapter, AdapterEvent, Characteristic, ConnectionEvent, Device};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::transport::{
    AdapterState, Advertisement, DiscoveredCharacteristic, RingTransport, TransportEvent,
    TransportEventSender,
};
use crate::error::TransportError;

/// The peer we are currently linked to.
struct LinkedPeer {
    id: String,
    device: Device,
    characteristics: HashMap<Uuid, Characteristic>,
    watch_task: JoinHandle<()>,
}

pub struct BluestTransport {
    adapter: Adapter,
    events: TransportEventSender,
    /// Devices seen during the current scan, by id
    devices: Arc<Mutex<HashMap<String, Device>>>,
    linked: Mutex<Option<LinkedPeer>>,
    scan_task: Mutex<Option<JoinHandle<()>>>,
}

impl BluestTransport {
    /// Opens the default adapter.
    pub async fn new(events: TransportEventSender) -> anyhow::Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| anyhow::anyhow!("No Bluetooth adapter found"))?;
        Ok(Self {
            adapter,
            events,
            devices: Arc::new(Mutex::new(HashMap::new())),
            linked: Mutex::new(None),
            scan_task: Mutex::new(None),
        })
    }

    fn emit(events: &TransportEventSender, event: TransportEvent) {
        if events.send(event).is_err() {
            debug!("Transport event dropped, receiver closed");
        }
    }

    async fn characteristic(&self, uuid: Uuid) -> Result<Characteristic, TransportError> {
        let linked = self.linked.lock().await;
        let peer = linked.as_ref().ok_or(TransportError::Disconnected)?;
        peer.characteristics
            .get(&uuid)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(uuid.to_string()))
    }

    async fn scan_task(
        adapter: Adapter,
        services: Vec<Uuid>,
        scan: u64,
        devices: Arc<Mutex<HashMap<String, Device>>>,
        events: TransportEventSender,
        cancel_token: CancellationToken,
    ) {
        let mut scan_stream = match adapter.scan(&services).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to start bluetooth scan: {}", e);
                Self::emit(&events, TransportEvent::ScanFailed(map_error(e)));
                return;
            }
        };
        info!("Bluetooth scan started");

        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    match result {
                        Some(discovered) => {
                            let id = discovered.device.id().to_string();
                            let name = discovered
                                .adv_data
                                .local_name
                                .clone()
                                .or_else(|| discovered.device.name().ok());
                            debug!(
                                "Found device - ID: {}, Name: {:?}, RSSI: {:?}",
                                id, name, discovered.rssi
                            );
                            devices.lock().await.insert(id.clone(), discovered.device);
                            let advertisement = Advertisement {
                                id,
                                name,
                                rssi: discovered.rssi,
                                scan,
                            };
                            Self::emit(&events, TransportEvent::Advertisement(advertisement));
                        }
                        None => {
                            warn!("Bluetooth scan stream has ended.");
                            Self::emit(
                                &events,
                                TransportEvent::ScanFailed(TransportError::Other(
                                    "scan stream ended".into(),
                                )),
                            );
                            break;
                        }
                    }
                }
                _ = cancel_token.cancelled() => {
                    debug!("Scan cancelled");
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl RingTransport for BluestTransport {
    async fn watch_adapter(&self) -> Result<(), TransportError> {
        let adapter = self.adapter.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            if let Err(e) = adapter.wait_available().await {
                error!("Adapter never became available: {}", e);
                Self::emit(&events, TransportEvent::AdapterStateChanged(adapter_state_for(&e)));
                return;
            }
            Self::emit(&events, TransportEvent::AdapterStateChanged(AdapterState::PoweredOn));

            let mut stream = match adapter.events().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Adapter events unavailable, power changes will not be tracked: {}", e);
                    return;
                }
            };
            while let Some(event) = stream.next().await {
                let state = match event {
                    Ok(AdapterEvent::Available) => AdapterState::PoweredOn,
                    Ok(AdapterEvent::Unavailable) => AdapterState::PoweredOff,
                    Err(e) => {
                        error!("Adapter event error: {}", e);
                        AdapterState::Unknown
                    }
                };
                Self::emit(&events, TransportEvent::AdapterStateChanged(state));
            }
        });
        Ok(())
    }

    async fn start_scan(
        &self,
        services: &[Uuid],
        scan: u64,
        cancel: CancellationToken,
    ) -> Result<(), TransportError> {
        self.devices.lock().await.clear();
        let handle = tokio::spawn(Self::scan_task(
            self.adapter.clone(),
            services.to_vec(),
            scan,
            self.devices.clone(),
            self.events.clone(),
            cancel,
        ));
        if let Some(previous) = self.scan_task.lock().await.replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    async fn stop_scan(&self) {
        if let Some(handle) = self.scan_task.lock().await.take() {
            handle.abort();
            info!("Bluetooth scan stopped");
        }
    }

    async fn connect(&self, peer: &str) -> Result<(), TransportError> {
        let device = self
            .devices
            .lock()
            .await
            .get(peer)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(peer.to_string()))?;

        if !device.is_connected().await {
            info!("Initiating connection to {}...", peer);
            self.adapter.connect_device(&device).await.map_err(map_error)?;
        }

        let adapter = self.adapter.clone();
        let events = self.events.clone();
        let watched = device.clone();
        let peer_id = peer.to_string();
        let watch_task = tokio::spawn(async move {
            let mut stream = match adapter.device_connection_events(&watched).await {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Cannot watch connection of {}: {}", peer_id, e);
                    return;
                }
            };
            while let Some(event) = stream.next().await {
                if let ConnectionEvent::Disconnected = event {
                    info!("Device {} disconnected", peer_id);
                    Self::emit(&events, TransportEvent::LinkLost { peer: peer_id.clone() });
                    break;
                }
            }
        });

        let previous = self.linked.lock().await.replace(LinkedPeer {
            id: peer.to_string(),
            device,
            characteristics: HashMap::new(),
            watch_task,
        });
        if let Some(previous) = previous {
            previous.watch_task.abort();
        }
        Ok(())
    }

    async fn discover(&self) -> Result<Vec<DiscoveredCharacteristic>, TransportError> {
        let device = {
            let linked = self.linked.lock().await;
            linked.as_ref().ok_or(TransportError::Disconnected)?.device.clone()
        };

        let mut found = Vec::new();
        let mut handles = HashMap::new();
        for service in device.discover_services().await.map_err(map_error)? {
            debug!("Service: {}", service.uuid());
            for characteristic in service.discover_characteristics().await.map_err(map_error)? {
                let properties = characteristic.properties().await.map_err(map_error)?;
                found.push(DiscoveredCharacteristic {
                    service: service.uuid(),
                    uuid: characteristic.uuid(),
                    notifiable: properties.notify || properties.indicate,
                    readable: properties.read,
                    writable: properties.write || properties.write_without_response,
                });
                handles.insert(characteristic.uuid(), characteristic);
            }
        }

        if let Some(peer) = self.linked.lock().await.as_mut() {
            peer.characteristics = handles;
        }
        info!("Discovered {} characteristics", found.len());
        Ok(found)
    }

    async fn monitor(
        &self,
        characteristic: Uuid,
        transaction_id: &str,
        cancel: CancellationToken,
    ) -> Result<(), TransportError> {
        let handle = self.characteristic(characteristic).await?;
        let events = self.events.clone();
        let transaction_id = transaction_id.to_string();
        let (established_tx, established_rx) = oneshot::channel();

        tokio::spawn(async move {
            let subscribed = tokio::select! {
                result = handle.notify() => result.map_err(map_error),
                _ = cancel.cancelled() => Err(TransportError::Cancelled),
            };
            let mut stream = match subscribed {
                Ok(stream) => {
                    let _ = established_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = established_tx.send(Err(e));
                    return;
                }
            };
            loop {
                tokio::select! {
                    item = stream.next() => match item {
                        Some(Ok(value)) => Self::emit(&events, TransportEvent::Notification {
                            characteristic,
                            transaction_id: transaction_id.clone(),
                            value: BASE64_STANDARD.encode(&value),
                        }),
                        Some(Err(e)) => Self::emit(&events, TransportEvent::NotificationFailed {
                            transaction_id: transaction_id.clone(),
                            error: map_error(e),
                        }),
                        None => break,
                    },
                    _ = cancel.cancelled() => {
                        Self::emit(&events, TransportEvent::NotificationFailed {
                            transaction_id: transaction_id.clone(),
                            error: TransportError::Cancelled,
                        });
                        break;
                    }
                }
            }
        });

        established_rx
            .await
            .unwrap_or_else(|_| {
                Err(TransportError::Other(
                    "notification task ended before subscribing".into(),
                ))
            })
    }

    async fn read(&self, characteristic: Uuid) -> Result<String, TransportError> {
        let handle = self.characteristic(characteristic).await?;
        let value = handle.read().await.map_err(map_error)?;
        Ok(BASE64_STANDARD.encode(&value))
    }

    async fn write(
        &self,
        characteristic: Uuid,
        value: String,
        with_response: bool,
    ) -> Result<(), TransportError> {
        let handle = self.characteristic(characteristic).await?;
        let bytes = BASE64_STANDARD
            .decode(value.as_bytes())
            .map_err(|e| TransportError::Encoding(e.to_string()))?;
        if with_response {
            handle.write(&bytes).await.map_err(map_error)
        } else {
            handle.write_without_response(&bytes).await.map_err(map_error)
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(peer) = self.linked.lock().await.take() else {
            return Ok(());
        };
        peer.watch_task.abort();
        if peer.device.is_connected().await {
            info!("Disconnecting from device {}", peer.id);
            self.adapter.disconnect_device(&peer.device).await.map_err(map_error)?;
        }
        Ok(())
    }

    async fn rssi(&self) -> Option<i16> {
        let device = self.linked.lock().await.as_ref()?.device.clone();
        device.rssi().await.ok()
    }
}

fn map_error(e: bluest::Error) -> TransportError {
    match e.kind() {
        ErrorKind::NotConnected => TransportError::Disconnected,
        ErrorKind::AdapterUnavailable => TransportError::AdapterUnavailable,
        ErrorKind::NotFound => TransportError::NotFound(e.to_string()),
        _ => TransportError::Other(e.to_string()),
    }
}

fn adapter_state_for(e: &bluest::Error) -> AdapterState {
    match e.kind() {
        ErrorKind::NotAuthorized => AdapterState::Unauthorized,
        ErrorKind::AdapterUnavailable => AdapterState::PoweredOff,
        _ => AdapterState::Unknown,
    }
}
