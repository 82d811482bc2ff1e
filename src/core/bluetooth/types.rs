//! Defines shared data structures for the Bluetooth module.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::core::bluetooth::transport::DiscoveredCharacteristic;
use crate::ring::DeviceIdentity;

/// Lifecycle of the link to the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    AdapterOff,
    AdapterUnauthorized,
    AdapterReady,
    Scanning,
    Connecting,
    DiscoveringServices,
    SubscribingNotifications,
    Ready,
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Represents the state of a successfully connected ring.
#[derive(Debug, Clone)]
pub struct ConnectedRing {
    /// Identity of the linked peer, also the connection handle.
    pub peer: DeviceIdentity,
    /// Characteristics discovered on the peer, by UUID.
    pub characteristics: HashMap<Uuid, DiscoveredCharacteristic>,
    /// Set once every notifiable characteristic is subscribed.
    pub ready: bool,
}

impl ConnectedRing {
    pub fn new(peer: DeviceIdentity) -> Self {
        Self {
            peer,
            characteristics: HashMap::new(),
            ready: false,
        }
    }
}

/// Link state shared between the connection state machine, which alone
/// mutates it, and everyone who reads through the gateway.
#[derive(Debug, Clone, Default)]
pub enum LinkState {
    #[default]
    Unlinked,
    Linked(ConnectedRing),
}

impl LinkState {
    pub fn ring(&self) -> Option<&ConnectedRing> {
        match self {
            LinkState::Linked(ring) => Some(ring),
            LinkState::Unlinked => None,
        }
    }

    pub fn ring_mut(&mut self) -> Option<&mut ConnectedRing> {
        match self {
            LinkState::Linked(ring) => Some(ring),
            LinkState::Unlinked => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ring().is_some_and(|ring| ring.ready)
    }
}

pub type SharedLink = Arc<Mutex<LinkState>>;

pub fn new_shared_link() -> SharedLink {
    Arc::new(Mutex::new(LinkState::Unlinked))
}
