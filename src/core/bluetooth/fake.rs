//! Scripted in-memory transport for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::constants::CharacteristicId;
use crate::core::bluetooth::transport::{
    AdapterState, Advertisement, DiscoveredCharacteristic, RingTransport, TransportEvent,
    TransportEventSender, monitor_transaction_id,
};
use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    WatchAdapter,
    StartScan,
    StopScan,
    Connect(String),
    Discover,
    Monitor(Uuid),
    Read(Uuid),
    Write { characteristic: Uuid, bytes: Vec<u8>, with_response: bool },
    Disconnect,
}

#[derive(Default)]
struct Script {
    connect_results: VecDeque<Result<(), TransportError>>,
    discover_result: Option<Result<Vec<DiscoveredCharacteristic>, TransportError>>,
    reads: HashMap<Uuid, VecDeque<Vec<u8>>>,
    write_error: Option<TransportError>,
    monitor_errors: HashMap<Uuid, TransportError>,
    monitors: HashMap<String, CancellationToken>,
    scan: u64,
}

pub struct FakeTransport {
    pub events: TransportEventSender,
    calls: Mutex<Vec<Call>>,
    script: Mutex<Script>,
}

impl FakeTransport {
    pub fn new(events: TransportEventSender) -> Arc<Self> {
        Arc::new(Self {
            events,
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(Script::default()),
        })
    }

    /// Characteristics a real ring exposes; notifiable ones flagged as such.
    pub fn ring_characteristics() -> Vec<DiscoveredCharacteristic> {
        CharacteristicId::ALL
            .into_iter()
            .map(|id| {
                let dir = id.directionality();
                DiscoveredCharacteristic {
                    service: id.service(),
                    uuid: id.uuid(),
                    notifiable: dir.notify,
                    readable: dir.read,
                    writable: dir.write || dir.write_without_response,
                }
            })
            .collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn count(&self, wanted: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| wanted(c)).count()
    }

    pub fn writes_to(&self, characteristic: Uuid) -> Vec<Vec<u8>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                Call::Write {
                    characteristic: c,
                    bytes,
                    ..
                } if *c == characteristic => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn push_connect_result(&self, result: Result<(), TransportError>) {
        self.script.lock().unwrap().connect_results.push_back(result);
    }

    pub fn set_discover_result(
        &self,
        result: Result<Vec<DiscoveredCharacteristic>, TransportError>,
    ) {
        self.script.lock().unwrap().discover_result = Some(result);
    }

    pub fn push_read(&self, characteristic: Uuid, bytes: Vec<u8>) {
        self.script
            .lock()
            .unwrap()
            .reads
            .entry(characteristic)
            .or_default()
            .push_back(bytes);
    }

    pub fn fail_writes(&self, error: TransportError) {
        self.script.lock().unwrap().write_error = Some(error);
    }

    /// Makes the subscription of `characteristic` fail once the peer answers.
    pub fn fail_monitor(&self, characteristic: Uuid, error: TransportError) {
        self.script
            .lock()
            .unwrap()
            .monitor_errors
            .insert(characteristic, error);
    }

    /// Id of the most recent scan.
    pub fn last_scan(&self) -> u64 {
        self.script.lock().unwrap().scan
    }

    /// An advertisement reported by the most recent scan.
    pub fn advertisement(&self, id: &str, name: Option<&str>, rssi: Option<i16>) -> TransportEvent {
        TransportEvent::Advertisement(Advertisement {
            id: id.into(),
            name: name.map(str::to_string),
            rssi,
            scan: self.last_scan(),
        })
    }

    /// Monitor tokens that are still live.
    pub fn active_monitors(&self) -> usize {
        self.script
            .lock()
            .unwrap()
            .monitors
            .values()
            .filter(|token| !token.is_cancelled())
            .count()
    }

    pub fn monitor_token(&self, characteristic: Uuid) -> Option<CancellationToken> {
        self.script
            .lock()
            .unwrap()
            .monitors
            .get(&monitor_transaction_id(characteristic))
            .cloned()
    }

    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    pub fn notification(characteristic: Uuid, bytes: &[u8]) -> TransportEvent {
        TransportEvent::Notification {
            characteristic,
            transaction_id: monitor_transaction_id(characteristic),
            value: BASE64_STANDARD.encode(bytes),
        }
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RingTransport for FakeTransport {
    async fn watch_adapter(&self) -> Result<(), TransportError> {
        self.record(Call::WatchAdapter);
        self.emit(TransportEvent::AdapterStateChanged(AdapterState::PoweredOn));
        Ok(())
    }

    async fn start_scan(
        &self,
        _services: &[Uuid],
        scan: u64,
        _cancel: CancellationToken,
    ) -> Result<(), TransportError> {
        self.record(Call::StartScan);
        self.script.lock().unwrap().scan = scan;
        Ok(())
    }

    async fn stop_scan(&self) {
        self.record(Call::StopScan);
    }

    async fn connect(&self, peer: &str) -> Result<(), TransportError> {
        self.record(Call::Connect(peer.to_string()));
        self.script
            .lock()
            .unwrap()
            .connect_results
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn discover(&self) -> Result<Vec<DiscoveredCharacteristic>, TransportError> {
        self.record(Call::Discover);
        self.script
            .lock()
            .unwrap()
            .discover_result
            .clone()
            .unwrap_or_else(|| Ok(Self::ring_characteristics()))
    }

    async fn monitor(
        &self,
        characteristic: Uuid,
        transaction_id: &str,
        cancel: CancellationToken,
    ) -> Result<(), TransportError> {
        self.record(Call::Monitor(characteristic));
        let failure = {
            let mut script = self.script.lock().unwrap();
            script.monitors.insert(transaction_id.to_string(), cancel);
            script.monitor_errors.get(&characteristic).cloned()
        };
        let Some(error) = failure else {
            return Ok(());
        };

        // The peer rejects the subscription from another task, like a real stack.
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            let _ = tx.send(error);
        });
        match rx.await {
            Ok(error) => Err(error),
            Err(_) => Err(TransportError::Cancelled),
        }
    }

    async fn read(&self, characteristic: Uuid) -> Result<String, TransportError> {
        self.record(Call::Read(characteristic));
        let value = self
            .script
            .lock()
            .unwrap()
            .reads
            .get_mut(&characteristic)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| TransportError::NotFound(characteristic.to_string()))?;
        Ok(BASE64_STANDARD.encode(value))
    }

    async fn write(
        &self,
        characteristic: Uuid,
        value: String,
        with_response: bool,
    ) -> Result<(), TransportError> {
        let bytes = BASE64_STANDARD
            .decode(value)
            .map_err(|e| TransportError::Encoding(e.to_string()))?;
        self.record(Call::Write { characteristic, bytes, with_response });
        match self.script.lock().unwrap().write_error.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.record(Call::Disconnect);
        Ok(())
    }

    async fn rssi(&self) -> Option<i16> {
        Some(-50)
    }
}
