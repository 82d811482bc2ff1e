use std::sync::Arc;

use log::{debug, error, info};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::constants::{DEFAULT_SIGNAL_FLOOR, RING_PRODUCT_NAME, UUID_DATA_SERVICE};
use crate::core::bluetooth::transport::{Advertisement, RingTransport};
use crate::error::TransportError;
use crate::ring::DeviceIdentity;

/// Decides which advertising peer is our ring.
#[derive(Debug, Clone)]
pub struct DeviceFilter {
    target: DeviceIdentity,
    product_name: String,
    signal_floor: i16,
    /// Advertised services a scan asks the adapter for.
    services: Vec<Uuid>,
}

impl DeviceFilter {
    pub fn new(target: DeviceIdentity, product_name: impl Into<String>, signal_floor: i16) -> Self {
        Self {
            target,
            product_name: product_name.into(),
            signal_floor,
            services: vec![UUID_DATA_SERVICE],
        }
    }

    pub fn with_services(mut self, services: Vec<Uuid>) -> Self {
        self.services = services;
        self
    }

    pub fn services(&self) -> &[Uuid] {
        &self.services
    }

    pub fn target(&self) -> &DeviceIdentity {
        &self.target
    }

    pub fn set_target(&mut self, target: DeviceIdentity) {
        self.target = target;
    }

    /// A paired ring is matched by address only. An unpaired ring must carry the
    /// product name and be close, with RSSI strictly inside `(signal_floor, 0)`.
    pub fn accepts(&self, candidate: &Advertisement) -> bool {
        if !self.target.is_unset() {
            return candidate.id == self.target.id;
        }

        let name_matches = candidate
            .name
            .as_ref()
            .map(|name| name.to_lowercase().contains(&self.product_name.to_lowercase()))
            .unwrap_or(false);
        let close_enough = candidate
            .rssi
            .map(|rssi| rssi > self.signal_floor && rssi < 0)
            .unwrap_or(false);
        name_matches && close_enough
    }
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self::new(DeviceIdentity::unset(), RING_PRODUCT_NAME, DEFAULT_SIGNAL_FLOOR)
    }
}

/// Runs scans on the transport and picks the ring out of the advertisements.
pub struct BluetoothScanner {
    transport: Arc<dyn RingTransport>,
    filter: DeviceFilter,
    cancel_token: CancellationToken,
    scanning: bool,
    /// Id of the latest scan; advertisements from earlier scans are stale.
    generation: u64,
}

impl BluetoothScanner {
    pub fn new(transport: Arc<dyn RingTransport>, filter: DeviceFilter) -> Self {
        Self {
            transport,
            filter,
            cancel_token: CancellationToken::new(),
            scanning: false,
            generation: 0,
        }
    }

    pub fn filter(&self) -> &DeviceFilter {
        &self.filter
    }

    pub fn set_target(&mut self, target: DeviceIdentity) {
        info!("Scanner target set to {} ({})", target.name, target.id);
        self.filter.set_target(target);
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Starts a scan unless one is already running. Returns whether a scan was started.
    pub async fn start_scan(&mut self) -> Result<bool, TransportError> {
        if self.scanning {
            debug!("Scan already in progress");
            return Ok(false);
        }
        self.cancel_token = CancellationToken::new();
        self.generation += 1;
        self.transport
            .start_scan(self.filter.services(), self.generation, self.cancel_token.clone())
            .await?;
        self.scanning = true;
        info!("Device scan started.");
        Ok(true)
    }

    pub async fn stop_scan(&mut self) {
        if !self.scanning {
            return;
        }
        info!("Stopping Bluetooth scan.");
        self.cancel_token.cancel();
        self.transport.stop_scan().await;
        self.scanning = false;
    }

    /// Marks the running scan as dead after a transport scan error.
    pub fn scan_failed(&mut self, error: &TransportError) {
        error!("Scan error: {}", error);
        self.cancel_token.cancel();
        self.scanning = false;
    }

    /// Stops scanning and returns the candidate if it is our ring.
    pub async fn evaluate(&mut self, candidate: &Advertisement) -> Option<Advertisement> {
        if candidate.scan != self.generation {
            debug!("Dropping {} from earlier scan {}", candidate.id, candidate.scan);
            return None;
        }
        if !self.scanning || !self.filter.accepts(candidate) {
            return None;
        }
        info!(
            "Found ring: ID: {}, Name: {:?}, RSSI: {:?}",
            candidate.id, candidate.name, candidate.rssi
        );
        self.stop_scan().await;
        Some(candidate.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::fake::{Call, FakeTransport};
    use crate::core::bluetooth::transport::event_channel;

    fn ad(id: &str, name: Option<&str>, rssi: Option<i16>) -> Advertisement {
        Advertisement {
            id: id.into(),
            name: name.map(str::to_string),
            rssi,
            scan: 1,
        }
    }

    #[test]
    fn unpaired_filter_uses_name_and_signal_window() {
        let filter = DeviceFilter::default();
        assert!(filter.accepts(&ad("a", Some("Taika Ring"), Some(-59))));
        assert!(filter.accepts(&ad("a", Some("my TAIKA ring 2"), Some(-1))));
        assert!(!filter.accepts(&ad("a", Some("Taika Ring"), Some(0))));
        assert!(!filter.accepts(&ad("a", Some("Taika Ring"), Some(-60))));
        assert!(!filter.accepts(&ad("a", Some("Taika Ring"), Some(-75))));
        assert!(!filter.accepts(&ad("a", Some("Taika Ring"), None)));
        assert!(!filter.accepts(&ad("a", Some("Headphones"), Some(-30))));
        assert!(!filter.accepts(&ad("a", None, Some(-30))));
    }

    #[test]
    fn paired_filter_matches_address_only() {
        let target = DeviceIdentity::new("AA:BB:CC", "Taika Ring");
        let filter = DeviceFilter::new(target, RING_PRODUCT_NAME, -60);
        assert!(filter.accepts(&ad("AA:BB:CC", None, Some(-95))));
        assert!(filter.accepts(&ad("AA:BB:CC", Some("Other"), Some(0))));
        assert!(!filter.accepts(&ad("DD:EE:FF", Some("Taika Ring"), Some(-40))));
    }

    #[tokio::test]
    async fn accepted_candidate_stops_the_scan() {
        let (tx, _rx) = event_channel();
        let fake = FakeTransport::new(tx);
        let mut scanner = BluetoothScanner::new(fake.clone(), DeviceFilter::default());

        assert!(scanner.start_scan().await.unwrap());
        assert!(!scanner.start_scan().await.unwrap());
        assert!(scanner.evaluate(&ad("x", Some("Lamp"), Some(-20))).await.is_none());

        let picked = scanner.evaluate(&ad("r", Some("Taika Ring"), Some(-20))).await;
        assert_eq!(picked.map(|a| a.id), Some("r".to_string()));
        assert!(!scanner.is_scanning());
        assert_eq!(fake.count(|c| *c == Call::StartScan), 1);
        assert_eq!(fake.count(|c| *c == Call::StopScan), 1);
    }

    #[tokio::test]
    async fn advertisements_from_an_earlier_scan_are_ignored() {
        let (tx, _rx) = event_channel();
        let fake = FakeTransport::new(tx);
        let mut scanner = BluetoothScanner::new(fake.clone(), DeviceFilter::default());

        scanner.start_scan().await.unwrap();
        scanner.scan_failed(&TransportError::Other("gatt 133".into()));
        scanner.start_scan().await.unwrap();
        assert_eq!(scanner.generation(), 2);
        assert_eq!(fake.last_scan(), 2);

        let stale = ad("r", Some("Taika Ring"), Some(-20));
        assert!(scanner.evaluate(&stale).await.is_none());
        assert!(scanner.is_scanning());

        let fresh = Advertisement { scan: 2, ..stale };
        assert!(scanner.evaluate(&fresh).await.is_some());
    }
}
