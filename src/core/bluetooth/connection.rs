//! Bluetooth connection handling for the Taika ring
//! This module drives the link from adapter power-up to a ready, fully subscribed ring,
//! and back to scanning whenever the link drops.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::constants::{RETRY_BACKOFF_INITIAL_MS, RETRY_BACKOFF_MAX_MS};
use crate::core::bluetooth::gateway::decode_value;
use crate::core::bluetooth::notification::NotificationRouter;
use crate::core::bluetooth::scanner::{BluetoothScanner, DeviceFilter};
use crate::core::bluetooth::transport::{
    AdapterState, Advertisement, DiscoveredCharacteristic, RingTransport, TransportEvent,
    TransportEventReceiver, monitor_transaction_id,
};
use crate::core::bluetooth::types::{ConnectedRing, ConnectionState, LinkState, SharedLink};
use crate::core::events::{EventBus, RingEvent};
use crate::error::TransportError;
use crate::platform::PermissionGateway;
use crate::ring::{DEFAULT_RING_NAME, DeviceIdentity};
use crate::storage::{KeyCondition, PersistenceGateway, TableKind, load_row, save_row};

/// Row id of the single paired-ring record.
const PAIRED_RING_ROW: u32 = 1;

/// Work to run once the ring is ready for reads and writes.
#[async_trait]
pub trait RingReadyCallback: Send + Sync {
    async fn on_ring_ready(&self, ring: &DeviceIdentity);
}

/// Persisted form of the paired ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PairedRingRow {
    sql_identifier: u32,
    id: String,
    name: String,
}

/// Loads the ring paired in a previous session, or the unset identity.
pub async fn load_paired_ring(store: &dyn PersistenceGateway) -> DeviceIdentity {
    let key = KeyCondition::eq("sql_identifier", PAIRED_RING_ROW);
    match load_row::<PairedRingRow>(store, TableKind::RingBleInfo, &key).await {
        Ok(Some(row)) => DeviceIdentity::new(row.id, row.name),
        Ok(None) => DeviceIdentity::unset(),
        Err(e) => {
            warn!("Failed to load paired ring, scanning for new rings: {}", e);
            DeviceIdentity::unset()
        }
    }
}

/// Resets the persisted pairing so the next scan looks for any ring.
pub async fn forget_paired_ring(store: &dyn PersistenceGateway) -> anyhow::Result<()> {
    let unset = DeviceIdentity::unset();
    let row = PairedRingRow {
        sql_identifier: PAIRED_RING_ROW,
        id: unset.id,
        name: unset.name,
    };
    let key = KeyCondition::eq("sql_identifier", PAIRED_RING_ROW);
    save_row(store, TableKind::RingBleInfo, &row, &key).await
}

/// Capped exponential delay between scan and connect retries.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay for the next retry, doubling up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.max);
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(RETRY_BACKOFF_INITIAL_MS),
            Duration::from_millis(RETRY_BACKOFF_MAX_MS),
        )
    }
}

/// What to do once a backoff delay runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryAction {
    Scan,
    WatchAdapter,
}

#[derive(Debug, Clone, Copy)]
struct PendingRetry {
    at: Instant,
    action: RetryAction,
}

/// Resolves when `retry` is due, never if nothing is scheduled.
async fn retry_due(retry: Option<PendingRetry>) {
    match retry {
        Some(retry) => tokio::time::sleep_until(retry.at).await,
        None => std::future::pending().await,
    }
}

/// Owns the link lifecycle. The only writer of the shared link state.
pub struct ConnectionStateMachine {
    transport: Arc<dyn RingTransport>,
    link: SharedLink,
    router: NotificationRouter,
    bus: Arc<EventBus>,
    scanner: BluetoothScanner,
    store: Arc<dyn PersistenceGateway>,
    permissions: Arc<dyn PermissionGateway>,
    ready_callbacks: Vec<Arc<dyn RingReadyCallback>>,
    /// Live notification subscriptions by transaction id.
    active_notifications: HashMap<String, CancellationToken>,
    state_tx: watch::Sender<ConnectionState>,
    backoff: Backoff,
    /// Retry waiting out its backoff. Events keep flowing meanwhile.
    pending_retry: Option<PendingRetry>,
}

impl ConnectionStateMachine {
    pub fn new(
        transport: Arc<dyn RingTransport>,
        link: SharedLink,
        bus: Arc<EventBus>,
        store: Arc<dyn PersistenceGateway>,
        permissions: Arc<dyn PermissionGateway>,
        filter: DeviceFilter,
        backoff: Backoff,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::AdapterOff);
        Self {
            scanner: BluetoothScanner::new(transport.clone(), filter),
            router: NotificationRouter::new(bus.clone()),
            transport,
            link,
            bus,
            store,
            permissions,
            ready_callbacks: Vec::new(),
            active_notifications: HashMap::new(),
            state_tx,
            backoff,
            pending_retry: None,
        }
    }

    pub fn add_ready_callback(&mut self, callback: Arc<dyn RingReadyCallback>) {
        self.ready_callbacks.push(callback);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Starts listening to the adapter; the first power report drives everything else.
    pub async fn start(&self) -> Result<(), TransportError> {
        info!("Waiting for Bluetooth adapter");
        self.transport.watch_adapter().await
    }

    /// Processes transport events in order until `shutdown` fires or the transport goes away.
    pub async fn run(mut self, mut events: TransportEventReceiver, shutdown: CancellationToken) {
        if let Err(e) = self.start().await {
            error!("Failed to watch Bluetooth adapter: {}", e);
            return;
        }
        loop {
            let retry = self.pending_retry;
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = retry_due(retry) => {
                    self.run_due_retry().await;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        warn!("Transport event channel closed");
                        break;
                    }
                },
            }
        }
        self.shutdown().await;
    }

    pub async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::AdapterStateChanged(state) => self.on_adapter_state(state).await,
            TransportEvent::Advertisement(candidate) => self.on_advertisement(candidate).await,
            TransportEvent::ScanFailed(error) => self.on_scan_failed(error).await,
            TransportEvent::LinkLost { peer } => self.on_link_lost(&peer).await,
            TransportEvent::Notification {
                characteristic,
                transaction_id,
                value,
            } => self.on_notification(characteristic, &transaction_id, &value).await,
            TransportEvent::NotificationFailed {
                transaction_id,
                error,
            } => {
                if error.is_expected_teardown() {
                    debug!("Notification {} ended: {}", transaction_id, error);
                } else {
                    error!("Notification {} error: {}", transaction_id, error);
                }
            }
        }
    }

    /// Runs the scheduled retry if its backoff has elapsed. Returns whether one ran.
    pub async fn run_due_retry(&mut self) -> bool {
        let Some(retry) = self.pending_retry.filter(|retry| retry.at <= Instant::now()) else {
            return false;
        };
        self.pending_retry = None;
        match retry.action {
            RetryAction::Scan => self.begin_scan().await,
            RetryAction::WatchAdapter => {
                if let Err(e) = self.transport.watch_adapter().await {
                    error!("Failed to watch Bluetooth adapter: {}", e);
                }
            }
        }
        true
    }

    fn schedule_retry(&mut self, action: RetryAction) {
        let delay = self.backoff.next_delay();
        info!("Retrying {:?} in {:?}", action, delay);
        self.pending_retry = Some(PendingRetry {
            at: Instant::now() + delay,
            action,
        });
    }

    /// Drops the link and stops scanning.
    pub async fn shutdown(&mut self) {
        self.pending_retry = None;
        self.scanner.stop_scan().await;
        if self.link.lock().await.ring().is_some() {
            if let Err(e) = self.transport.disconnect().await {
                warn!("Disconnect during shutdown failed: {}", e);
            }
            self.teardown().await;
            self.bus.publish(&RingEvent::Disconnected);
        }
        self.set_state(ConnectionState::Disconnected);
        info!("Connection state machine stopped");
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("Connection state {} -> {}", previous, state);
        }
    }

    async fn on_adapter_state(&mut self, state: AdapterState) {
        info!("Bluetooth adapter state: {:?}", state);
        match state {
            AdapterState::PoweredOn => {
                if matches!(
                    self.state(),
                    ConnectionState::AdapterOff | ConnectionState::AdapterUnauthorized
                ) {
                    self.set_state(ConnectionState::AdapterReady);
                    self.begin_scan().await;
                }
            }
            AdapterState::PoweredOff => {
                self.pending_retry = None;
                self.scanner.stop_scan().await;
                if self.link.lock().await.ring().is_some() {
                    self.teardown().await;
                    self.bus.publish(&RingEvent::Disconnected);
                }
                self.set_state(ConnectionState::AdapterOff);
            }
            AdapterState::Unauthorized => {
                self.set_state(ConnectionState::AdapterUnauthorized);
                if !self.permissions.request_transport_permission().await {
                    warn!("Bluetooth permission denied");
                    return;
                }
                self.schedule_retry(RetryAction::WatchAdapter);
            }
            AdapterState::Unknown => {}
        }
    }

    async fn begin_scan(&mut self) {
        match self.scanner.start_scan().await {
            Ok(_) => self.set_state(ConnectionState::Scanning),
            Err(TransportError::AdapterUnavailable) => {
                warn!("Adapter went away before scanning could start");
                self.set_state(ConnectionState::AdapterOff);
            }
            Err(e) => {
                self.scanner.scan_failed(&e);
                self.set_state(ConnectionState::Scanning);
                self.schedule_retry(RetryAction::Scan);
            }
        }
    }

    async fn on_scan_failed(&mut self, error: TransportError) {
        self.scanner.scan_failed(&error);
        if self.state() == ConnectionState::Scanning {
            self.schedule_retry(RetryAction::Scan);
        }
    }

    async fn on_advertisement(&mut self, candidate: Advertisement) {
        if self.state() != ConnectionState::Scanning {
            return;
        }
        if let Some(ring) = self.scanner.evaluate(&candidate).await {
            self.connect(ring).await;
        }
    }

    async fn connect(&mut self, candidate: Advertisement) {
        self.set_state(ConnectionState::Connecting);
        let peer = DeviceIdentity::new(
            candidate.id,
            candidate.name.unwrap_or_else(|| DEFAULT_RING_NAME.to_string()),
        );
        info!("Connecting to {} ({})", peer.name, peer.id);

        if let Err(e) = self.transport.connect(&peer.id).await {
            warn!("Connection to {} failed: {}", peer.id, e);
            self.set_state(ConnectionState::Disconnected);
            self.schedule_retry(RetryAction::Scan);
            return;
        }
        *self.link.lock().await = LinkState::Linked(ConnectedRing::new(peer.clone()));

        self.set_state(ConnectionState::DiscoveringServices);
        let characteristics = match self.transport.discover().await {
            Ok(characteristics) => characteristics,
            Err(e) => {
                error!("Service discovery on {} failed: {}", peer.id, e);
                self.abandon_link().await;
                return;
            }
        };
        info!("Discovered {} characteristics", characteristics.len());
        if let Some(ring) = self.link.lock().await.ring_mut() {
            ring.characteristics = characteristics
                .iter()
                .map(|c| (c.uuid, c.clone()))
                .collect();
        }

        self.set_state(ConnectionState::SubscribingNotifications);
        if let Err(e) = self.subscribe_all(&characteristics).await {
            error!("Subscribing to notifications on {} failed: {}", peer.id, e);
            self.abandon_link().await;
            return;
        }

        self.on_ready(peer).await;
    }

    /// Subscribes every notifiable characteristic concurrently.
    async fn subscribe_all(
        &mut self,
        characteristics: &[DiscoveredCharacteristic],
    ) -> Result<(), TransportError> {
        let targets: Vec<(Uuid, String, CancellationToken)> = characteristics
            .iter()
            .filter(|c| c.notifiable)
            .map(|c| (c.uuid, monitor_transaction_id(c.uuid), CancellationToken::new()))
            .collect();
        for (_, transaction_id, token) in &targets {
            self.active_notifications
                .insert(transaction_id.clone(), token.clone());
        }

        let transport = &self.transport;
        let results = join_all(
            targets
                .iter()
                .map(|(uuid, transaction_id, token)| {
                    transport.monitor(*uuid, transaction_id, token.clone())
                }),
        )
        .await;
        debug!("Subscribed to {} characteristics", results.len());
        results.into_iter().collect()
    }

    async fn on_ready(&mut self, peer: DeviceIdentity) {
        if let Some(ring) = self.link.lock().await.ring_mut() {
            ring.ready = true;
        }
        self.backoff.reset();
        self.set_state(ConnectionState::Ready);
        info!("Ring {} ready", peer.id);

        let row = PairedRingRow {
            sql_identifier: PAIRED_RING_ROW,
            id: peer.id.clone(),
            name: peer.name.clone(),
        };
        let key = KeyCondition::eq("sql_identifier", PAIRED_RING_ROW);
        if let Err(e) = save_row(self.store.as_ref(), TableKind::RingBleInfo, &row, &key).await {
            error!("Failed to persist paired ring: {}", e);
        }
        self.scanner.set_target(peer.clone());

        join_all(self.ready_callbacks.iter().map(|cb| cb.on_ring_ready(&peer))).await;
        self.bus.publish(&RingEvent::Connected(peer));
    }

    async fn on_link_lost(&mut self, peer: &str) {
        let is_current = self
            .link
            .lock()
            .await
            .ring()
            .is_some_and(|ring| ring.peer.id == peer);
        if !is_current {
            debug!("Ignoring link loss for {}", peer);
            return;
        }
        info!("Ring {} disconnected", peer);
        self.teardown().await;
        self.set_state(ConnectionState::Disconnected);
        self.bus.publish(&RingEvent::Disconnected);
        self.begin_scan().await;
    }

    /// Drops a link that never became ready and goes back to scanning.
    async fn abandon_link(&mut self) {
        if let Err(e) = self.transport.disconnect().await {
            debug!("Disconnect after failed setup: {}", e);
        }
        self.teardown().await;
        self.set_state(ConnectionState::Disconnected);
        self.schedule_retry(RetryAction::Scan);
    }

    /// Cancels every subscription before forgetting them, then clears the link.
    async fn teardown(&mut self) {
        for (transaction_id, token) in self.active_notifications.drain() {
            debug!("Cancelling {}", transaction_id);
            token.cancel();
        }
        *self.link.lock().await = LinkState::Unlinked;
    }

    async fn on_notification(&mut self, characteristic: Uuid, transaction_id: &str, value: &str) {
        if !self.active_notifications.contains_key(transaction_id) {
            debug!("Dropping notification for untracked {}", transaction_id);
            return;
        }
        if self.link.lock().await.ring().is_none() {
            return;
        }
        match decode_value(value) {
            Ok(bytes) => {
                self.router.route(characteristic, &bytes);
            }
            Err(e) => warn!("Undecodable notification on {}: {}", characteristic, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::core::bluetooth::constants::CharacteristicId;
    use crate::core::bluetooth::fake::{Call, FakeTransport};
    use crate::core::bluetooth::transport::event_channel;
    use crate::core::bluetooth::types::new_shared_link;
    use crate::storage::MemoryStore;

    const RING_ID: &str = "F1:E2:D3:C4:B5:A6";

    struct CountingPermissions(AtomicUsize);

    #[async_trait]
    impl PermissionGateway for CountingPermissions {
        async fn request_transport_permission(&self) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[derive(Default)]
    struct ReadyRecorder(Mutex<Vec<String>>);

    #[async_trait]
    impl RingReadyCallback for ReadyRecorder {
        async fn on_ring_ready(&self, ring: &DeviceIdentity) {
            self.0.lock().unwrap().push(ring.id.clone());
        }
    }

    struct Harness {
        machine: ConnectionStateMachine,
        rx: TransportEventReceiver,
        fake: Arc<FakeTransport>,
        link: SharedLink,
        bus: Arc<EventBus>,
        store: Arc<MemoryStore>,
        permissions: Arc<CountingPermissions>,
        ready: Arc<ReadyRecorder>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_backoff(Backoff::new(Duration::ZERO, Duration::ZERO))
        }

        fn with_backoff(backoff: Backoff) -> Self {
            let (tx, rx) = event_channel();
            let fake = FakeTransport::new(tx);
            let link = new_shared_link();
            let bus = EventBus::new();
            let store = Arc::new(MemoryStore::new());
            let permissions = Arc::new(CountingPermissions(AtomicUsize::new(0)));
            let ready = Arc::new(ReadyRecorder::default());
            let mut machine = ConnectionStateMachine::new(
                fake.clone(),
                link.clone(),
                bus.clone(),
                store.clone(),
                permissions.clone(),
                DeviceFilter::default(),
                backoff,
            );
            machine.add_ready_callback(ready.clone());
            Self {
                machine,
                rx,
                fake,
                link,
                bus,
                store,
                permissions,
                ready,
            }
        }

        /// Handles every queued event and every retry whose backoff has run out.
        async fn drain(&mut self) {
            loop {
                while let Ok(event) = self.rx.try_recv() {
                    self.machine.handle_event(event).await;
                }
                if !self.machine.run_due_retry().await {
                    break;
                }
            }
        }

        async fn send(&mut self, event: TransportEvent) {
            self.fake.emit(event);
            self.drain().await;
        }

        fn ring_advertisement(&self) -> TransportEvent {
            self.fake.advertisement(RING_ID, Some("Taika Ring"), Some(-42))
        }

        async fn to_ready(&mut self) {
            self.machine.start().await.unwrap();
            self.drain().await;
            self.send(self.ring_advertisement()).await;
            assert_eq!(self.machine.state(), ConnectionState::Ready);
        }

        fn counter(&self, name: &str) -> Arc<AtomicUsize> {
            let count = Arc::new(AtomicUsize::new(0));
            let seen = count.clone();
            self.bus.subscribe(name, move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            });
            count
        }
    }

    fn notifiable_count() -> usize {
        FakeTransport::ring_characteristics()
            .iter()
            .filter(|c| c.notifiable)
            .count()
    }

    #[tokio::test]
    async fn adapter_power_on_starts_scanning() {
        let mut h = Harness::new();
        let mut states = h.machine.subscribe_state();
        h.machine.start().await.unwrap();
        h.drain().await;

        assert_eq!(h.machine.state(), ConnectionState::Scanning);
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), ConnectionState::Scanning);
        assert_eq!(h.fake.count(|c| *c == Call::StartScan), 1);
    }

    #[tokio::test]
    async fn accepted_ring_goes_all_the_way_to_ready() {
        let mut h = Harness::new();
        let connected = h.counter(RingEvent::CONNECTED);
        h.to_ready().await;

        assert_eq!(h.fake.count(|c| *c == Call::Connect(RING_ID.into())), 1);
        assert_eq!(h.fake.count(|c| matches!(c, Call::Monitor(_))), notifiable_count());
        assert_eq!(h.fake.active_monitors(), notifiable_count());
        assert!(h.link.lock().await.is_ready());
        assert_eq!(*h.ready.0.lock().unwrap(), vec![RING_ID.to_string()]);
        assert_eq!(connected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ready_ring_is_remembered() {
        let mut h = Harness::new();
        h.to_ready().await;

        let paired = load_paired_ring(h.store.as_ref()).await;
        assert_eq!(paired, DeviceIdentity::new(RING_ID, "Taika Ring"));
        assert_eq!(h.machine.scanner.filter().target().id, RING_ID);
    }

    #[tokio::test]
    async fn disconnect_from_ready_rescans_exactly_once() {
        let mut h = Harness::new();
        let disconnected = h.counter(RingEvent::DISCONNECTED);
        h.to_ready().await;
        h.fake.clear_calls();

        h.send(TransportEvent::LinkLost { peer: RING_ID.into() }).await;

        assert_eq!(h.fake.count(|c| *c == Call::StartScan), 1);
        assert_eq!(h.fake.active_monitors(), 0);
        assert!(h.machine.active_notifications.is_empty());
        assert!(h.link.lock().await.ring().is_none());
        assert_eq!(h.machine.state(), ConnectionState::Scanning);
        assert_eq!(disconnected.load(Ordering::SeqCst), 1);

        // A second report of the same loss must not start another scan.
        h.send(TransportEvent::LinkLost { peer: RING_ID.into() }).await;
        assert_eq!(h.fake.count(|c| *c == Call::StartScan), 1);
        assert_eq!(disconnected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn link_loss_for_another_peer_is_ignored() {
        let mut h = Harness::new();
        h.to_ready().await;
        h.send(TransportEvent::LinkLost { peer: "00:00:00:00:00:01".into() }).await;

        assert_eq!(h.machine.state(), ConnectionState::Ready);
        assert!(h.link.lock().await.is_ready());
    }

    #[tokio::test]
    async fn connect_failure_returns_to_scanning() {
        let mut h = Harness::new();
        h.fake.push_connect_result(Err(TransportError::Other("gatt 133".into())));
        h.machine.start().await.unwrap();
        h.drain().await;
        h.send(h.ring_advertisement()).await;

        assert_eq!(h.machine.state(), ConnectionState::Scanning);
        assert_eq!(h.fake.count(|c| *c == Call::StartScan), 2);
        assert!(h.link.lock().await.ring().is_none());

        h.send(h.ring_advertisement()).await;
        assert_eq!(h.machine.state(), ConnectionState::Ready);
    }

    #[tokio::test]
    async fn discovery_failure_is_treated_as_disconnect() {
        let mut h = Harness::new();
        h.fake.set_discover_result(Err(TransportError::Other("services changed".into())));
        h.machine.start().await.unwrap();
        h.drain().await;
        h.send(h.ring_advertisement()).await;

        assert_eq!(h.fake.count(|c| *c == Call::Disconnect), 1);
        assert_eq!(h.fake.count(|c| *c == Call::StartScan), 2);
        assert_eq!(h.machine.state(), ConnectionState::Scanning);
        assert!(h.link.lock().await.ring().is_none());
    }

    #[tokio::test]
    async fn failed_subscription_abandons_the_link() {
        let mut h = Harness::new();
        let connected = h.counter(RingEvent::CONNECTED);
        h.fake.fail_monitor(
            CharacteristicId::ImuData.uuid(),
            TransportError::Other("cccd write rejected".into()),
        );
        h.machine.start().await.unwrap();
        h.drain().await;
        h.send(h.ring_advertisement()).await;

        assert_eq!(h.fake.count(|c| *c == Call::Disconnect), 1);
        assert_eq!(h.fake.count(|c| *c == Call::StartScan), 2);
        assert_eq!(h.fake.active_monitors(), 0);
        assert!(h.machine.active_notifications.is_empty());
        assert!(h.link.lock().await.ring().is_none());
        assert_eq!(h.machine.state(), ConnectionState::Scanning);
        assert!(h.ready.0.lock().unwrap().is_empty());
        assert_eq!(connected.load(Ordering::SeqCst), 0);
        assert!(h.fake.writes_to(CharacteristicId::ClaimPrimary.uuid()).is_empty());
    }

    #[tokio::test]
    async fn queued_advertisements_from_a_failed_scan_are_dropped() {
        let mut h = Harness::new();
        h.fake.push_connect_result(Err(TransportError::Other("gatt 133".into())));
        h.machine.start().await.unwrap();
        h.drain().await;

        // Both were reported by the first scan before the connect attempt failed.
        h.fake.emit(h.ring_advertisement());
        h.fake.emit(h.ring_advertisement());
        h.drain().await;

        assert_eq!(h.fake.count(|c| matches!(c, Call::Connect(_))), 1);
        assert_eq!(h.fake.count(|c| *c == Call::StartScan), 2);
        assert_eq!(h.machine.state(), ConnectionState::Scanning);

        h.send(h.ring_advertisement()).await;
        assert_eq!(h.machine.state(), ConnectionState::Ready);
    }

    async fn wait_for(states: &mut watch::Receiver<ConnectionState>, wanted: ConnectionState) {
        tokio::time::timeout(Duration::from_secs(1), states.wait_for(|state| *state == wanted))
            .await
            .expect("state not reached")
            .unwrap();
    }

    #[tokio::test]
    async fn shutdown_is_not_held_up_by_backoff() {
        let minute = Duration::from_secs(60);
        let h = Harness::with_backoff(Backoff::new(minute, minute));
        h.fake.push_connect_result(Err(TransportError::Other("gatt 133".into())));
        let mut states = h.machine.subscribe_state();
        let shutdown = CancellationToken::new();
        let fake = h.fake.clone();
        let task = tokio::spawn(h.machine.run(h.rx, shutdown.clone()));

        wait_for(&mut states, ConnectionState::Scanning).await;
        fake.emit(fake.advertisement(RING_ID, Some("Taika Ring"), Some(-42)));
        wait_for(&mut states, ConnectionState::Disconnected).await;

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("run did not stop during backoff")
            .unwrap();
        assert_eq!(fake.count(|c| *c == Call::StartScan), 1);
    }

    #[tokio::test]
    async fn power_off_cancels_a_pending_retry() {
        let minute = Duration::from_secs(60);
        let h = Harness::with_backoff(Backoff::new(minute, minute));
        h.fake.push_connect_result(Err(TransportError::Other("gatt 133".into())));
        let mut states = h.machine.subscribe_state();
        let shutdown = CancellationToken::new();
        let fake = h.fake.clone();
        let task = tokio::spawn(h.machine.run(h.rx, shutdown.clone()));

        wait_for(&mut states, ConnectionState::Scanning).await;
        fake.emit(fake.advertisement(RING_ID, Some("Taika Ring"), Some(-42)));
        wait_for(&mut states, ConnectionState::Disconnected).await;

        fake.emit(TransportEvent::AdapterStateChanged(AdapterState::PoweredOff));
        wait_for(&mut states, ConnectionState::AdapterOff).await;
        fake.emit(TransportEvent::AdapterStateChanged(AdapterState::PoweredOn));
        wait_for(&mut states, ConnectionState::Scanning).await;
        assert_eq!(fake.count(|c| *c == Call::StartScan), 2);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn scan_errors_restart_the_scan() {
        let mut h = Harness::new();
        h.machine.start().await.unwrap();
        h.drain().await;
        h.send(TransportEvent::ScanFailed(TransportError::Other("scan throttled".into()))).await;

        assert_eq!(h.fake.count(|c| *c == Call::StartScan), 2);
        assert_eq!(h.machine.state(), ConnectionState::Scanning);
    }

    #[tokio::test]
    async fn notifications_are_routed_only_while_tracked() {
        let mut h = Harness::new();
        let touches = h.counter(RingEvent::TOUCH);
        h.to_ready().await;

        let uuid = CharacteristicId::CombinedUpdate.uuid();
        h.send(FakeTransport::notification(uuid, &[0u8; 19])).await;
        assert_eq!(touches.load(Ordering::SeqCst), 1);

        h.send(TransportEvent::Notification {
            characteristic: uuid,
            transaction_id: "stale".into(),
            value: "AAAA".into(),
        })
        .await;
        assert_eq!(touches.load(Ordering::SeqCst), 1);

        h.send(TransportEvent::LinkLost { peer: RING_ID.into() }).await;
        h.send(FakeTransport::notification(uuid, &[0u8; 19])).await;
        assert_eq!(touches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn notification_errors_keep_the_link() {
        let mut h = Harness::new();
        h.to_ready().await;
        let transaction_id = monitor_transaction_id(CharacteristicId::ImuData.uuid());

        h.send(TransportEvent::NotificationFailed {
            transaction_id: transaction_id.clone(),
            error: TransportError::Other("att error 0x0e".into()),
        })
        .await;
        h.send(TransportEvent::NotificationFailed {
            transaction_id,
            error: TransportError::Cancelled,
        })
        .await;

        assert_eq!(h.machine.state(), ConnectionState::Ready);
        assert!(h.link.lock().await.is_ready());
    }

    #[tokio::test]
    async fn unauthorized_adapter_requests_permission() {
        let mut h = Harness::new();
        h.send(TransportEvent::AdapterStateChanged(AdapterState::Unauthorized)).await;

        assert_eq!(h.permissions.0.load(Ordering::SeqCst), 1);
        assert_eq!(h.fake.count(|c| *c == Call::WatchAdapter), 1);
        assert_eq!(h.machine.state(), ConnectionState::Scanning);
    }

    #[tokio::test]
    async fn power_off_tears_down_without_rescanning() {
        let mut h = Harness::new();
        h.to_ready().await;
        h.fake.clear_calls();
        h.send(TransportEvent::AdapterStateChanged(AdapterState::PoweredOff)).await;

        assert_eq!(h.machine.state(), ConnectionState::AdapterOff);
        assert_eq!(h.fake.count(|c| *c == Call::StartScan), 0);
        assert_eq!(h.fake.active_monitors(), 0);

        h.send(TransportEvent::AdapterStateChanged(AdapterState::PoweredOn)).await;
        assert_eq!(h.machine.state(), ConnectionState::Scanning);
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let mut backoff = Backoff::default();
        let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_millis() as u64).collect();
        assert_eq!(delays, vec![250, 500, 1000, 2000, 4000, 8000, 8000]);
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(250));
    }
}
