//! Seam between the connection layer and the radio stack.
//!
//! Commands go through [`RingTransport`]; everything the radio reports
//! asynchronously arrives as [`TransportEvent`]s on the single channel given
//! to the transport at construction, in the order the radio produced them.
//! Characteristic values cross this seam as base64 text.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::TransportError;

pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Creates the channel a transport reports into.
pub fn event_channel() -> (TransportEventSender, TransportEventReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    PoweredOn,
    PoweredOff,
    Unauthorized,
    Unknown,
}

/// A peer seen while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub id: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    /// Id of the scan that reported it, as passed to [`RingTransport::start_scan`].
    pub scan: u64,
}

/// A characteristic found during service discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredCharacteristic {
    pub service: Uuid,
    pub uuid: Uuid,
    pub notifiable: bool,
    pub readable: bool,
    pub writable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    AdapterStateChanged(AdapterState),
    Advertisement(Advertisement),
    ScanFailed(TransportError),
    /// The link to `peer` dropped, whoever initiated it.
    LinkLost { peer: String },
    Notification {
        characteristic: Uuid,
        transaction_id: String,
        value: String,
    },
    NotificationFailed {
        transaction_id: String,
        error: TransportError,
    },
}

#[async_trait]
pub trait RingTransport: Send + Sync {
    /// Starts reporting adapter power changes, beginning with the current state.
    async fn watch_adapter(&self) -> Result<(), TransportError>;

    /// Starts a scan limited to `services`. Runs until `cancel` fires. Every
    /// advertisement it reports carries `scan`.
    async fn start_scan(
        &self,
        services: &[Uuid],
        scan: u64,
        cancel: CancellationToken,
    ) -> Result<(), TransportError>;

    async fn stop_scan(&self);

    async fn connect(&self, peer: &str) -> Result<(), TransportError>;

    /// Enumerates every service and characteristic of the connected peer.
    async fn discover(&self) -> Result<Vec<DiscoveredCharacteristic>, TransportError>;

    /// Subscribes to notifications of `characteristic` until `cancel` fires.
    /// Returns once the subscription is live on the peer, or with the reason it is not.
    async fn monitor(
        &self,
        characteristic: Uuid,
        transaction_id: &str,
        cancel: CancellationToken,
    ) -> Result<(), TransportError>;

    async fn read(&self, characteristic: Uuid) -> Result<String, TransportError>;

    async fn write(
        &self,
        characteristic: Uuid,
        value: String,
        with_response: bool,
    ) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;

    async fn rssi(&self) -> Option<i16>;
}

/// Transaction id used for the notification subscription of `characteristic`.
pub fn monitor_transaction_id(characteristic: Uuid) -> String {
    format!("monitor_{}", characteristic)
}
