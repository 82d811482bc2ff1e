//! In-process publish/subscribe for ring events.
//! Handlers run synchronously on the publishing task, in registration order.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, error};
use serde::Serialize;

use crate::core::codec::{ModeActionEvent, MotionSample, TouchSample};
use crate::ring::{ConnectionType, DeviceIdentity};

/// Everything the driver announces to the rest of the application.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum RingEvent {
    Connected(DeviceIdentity),
    Disconnected,
    Touch(TouchSample),
    Motion(MotionSample),
    ModeAction(ModeActionEvent),
    LowBattery(u8),
    DeviceConfirmationNeeded {
        bonding: u8,
        connection_type: ConnectionType,
    },
    /// Raw error report bytes following the command id.
    RingError(Vec<u8>),
    BondingListChanged(Vec<u8>),
    BecamePrimary {
        bonding: u8,
    },
    ClaimRejected,
}

impl RingEvent {
    pub const CONNECTED: &'static str = "connected";
    pub const DISCONNECTED: &'static str = "disconnected";
    pub const TOUCH: &'static str = "touchEvent";
    pub const MOTION: &'static str = "motionEvent";
    pub const MODE_ACTION: &'static str = "modeActionEvent";
    pub const LOW_BATTERY: &'static str = "lowBattery";
    pub const DEVICE_CONFIRMATION_NEEDED: &'static str = "deviceConfirmationNeeded";
    pub const RING_ERROR: &'static str = "ringError";
    pub const BONDING_LIST_CHANGED: &'static str = "bondingListChanged";
    pub const BECAME_PRIMARY: &'static str = "becamePrimary";
    pub const CLAIM_REJECTED: &'static str = "claimRejected";

    /// Name subscribers register under.
    pub fn name(&self) -> &'static str {
        match self {
            RingEvent::Connected(_) => Self::CONNECTED,
            RingEvent::Disconnected => Self::DISCONNECTED,
            RingEvent::Touch(_) => Self::TOUCH,
            RingEvent::Motion(_) => Self::MOTION,
            RingEvent::ModeAction(_) => Self::MODE_ACTION,
            RingEvent::LowBattery(_) => Self::LOW_BATTERY,
            RingEvent::DeviceConfirmationNeeded { .. } => Self::DEVICE_CONFIRMATION_NEEDED,
            RingEvent::RingError(_) => Self::RING_ERROR,
            RingEvent::BondingListChanged(_) => Self::BONDING_LIST_CHANGED,
            RingEvent::BecamePrimary { .. } => Self::BECAME_PRIMARY,
            RingEvent::ClaimRejected => Self::CLAIM_REJECTED,
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&RingEvent) + Send + Sync>;

/// Token returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<HashMap<String, Vec<(SubscriptionId, EventHandler)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscribe<F>(&self, name: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&RingEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        debug!("Subscribed {:?} to {}", id, name);
        id
    }

    /// Returns false if `id` was not registered under `name`.
    pub fn unsubscribe(&self, name: &str, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = handlers.get_mut(name) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(name);
        }
        removed
    }

    /// Delivers `event` to every handler registered under its name.
    ///
    /// A panicking handler is logged and skipped; the rest still run.
    pub fn publish(&self, event: &RingEvent) {
        let name = event.name();
        let snapshot: Vec<(SubscriptionId, EventHandler)> = {
            let handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
            match handlers.get(name) {
                Some(list) => list.clone(),
                None => return,
            }
        };

        for (id, handler) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!("Handler {:?} for {} panicked", id, name);
            }
        }
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map_or(0, Vec::len)
    }
}
