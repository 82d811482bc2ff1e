//! Characteristic reads and writes against the connected ring.
//! Requests are refused until the link is ready and only reach
//! characteristics that were discovered on the ring.

use std::sync::Arc;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use log::{debug, warn};

use crate::core::bluetooth::constants::CharacteristicId;
use crate::core::bluetooth::transport::RingTransport;
use crate::core::bluetooth::types::{LinkState, SharedLink};
use crate::error::{GatewayError, TransportError};

/// Encodes bytes for the transport.
pub fn encode_value(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(bytes)
}

/// Decodes a transport value into bytes.
pub fn decode_value(value: &str) -> Result<Vec<u8>, TransportError> {
    BASE64_STANDARD
        .decode(value.as_bytes())
        .map_err(|e| TransportError::Encoding(e.to_string()))
}

#[derive(Clone)]
pub struct CharacteristicGateway {
    transport: Arc<dyn RingTransport>,
    link: SharedLink,
}

impl CharacteristicGateway {
    pub fn new(transport: Arc<dyn RingTransport>, link: SharedLink) -> Self {
        Self { transport, link }
    }

    pub async fn is_ready(&self) -> bool {
        self.link.lock().await.is_ready()
    }

    async fn check(&self, id: CharacteristicId) -> Result<(), GatewayError> {
        match &*self.link.lock().await {
            LinkState::Unlinked => Err(GatewayError::NotConnected),
            LinkState::Linked(ring) if !ring.ready => Err(GatewayError::NotReady),
            LinkState::Linked(ring) if !ring.characteristics.contains_key(&id.uuid()) => {
                Err(GatewayError::UnknownCharacteristic(id))
            }
            LinkState::Linked(_) => Ok(()),
        }
    }

    pub async fn try_write(&self, id: CharacteristicId, bytes: &[u8]) -> Result<(), GatewayError> {
        self.check(id).await?;
        let with_response = !id.directionality().write_without_response;
        debug!("Writing {:02x?} to {:?}", bytes, id);
        self.transport
            .write(id.uuid(), encode_value(bytes), with_response)
            .await?;
        Ok(())
    }

    pub async fn try_read(&self, id: CharacteristicId) -> Result<Vec<u8>, GatewayError> {
        self.check(id).await?;
        let value = self.transport.read(id.uuid()).await?;
        Ok(decode_value(&value)?)
    }

    /// Soft-failing write: logs the reason and returns false on any failure.
    pub async fn write(&self, id: CharacteristicId, bytes: &[u8]) -> bool {
        match self.try_write(id, bytes).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Write to {:?} failed: {}", id, e);
                false
            }
        }
    }

    /// Soft-failing read: logs the reason and returns `None` on any failure.
    pub async fn read(&self, id: CharacteristicId) -> Option<Vec<u8>> {
        match self.try_read(id).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("Read of {:?} failed: {}", id, e);
                None
            }
        }
    }

    pub async fn rssi(&self) -> Option<i16> {
        if !self.is_ready().await {
            return None;
        }
        self.transport.rssi().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::fake::{Call, FakeTransport};
    use crate::core::bluetooth::transport::event_channel;
    use crate::core::bluetooth::types::{ConnectedRing, new_shared_link};
    use crate::ring::DeviceIdentity;

    async fn linked(
        ready: bool,
        with_battery: bool,
    ) -> (Arc<FakeTransport>, CharacteristicGateway) {
        let (tx, _rx) = event_channel();
        let fake = FakeTransport::new(tx);
        let link = new_shared_link();
        let mut ring = ConnectedRing::new(DeviceIdentity::new("AA", "Taika Ring"));
        for c in FakeTransport::ring_characteristics() {
            if with_battery || c.uuid != CharacteristicId::BatteryLevel.uuid() {
                ring.characteristics.insert(c.uuid, c);
            }
        }
        ring.ready = ready;
        *link.lock().await = LinkState::Linked(ring);
        (fake.clone(), CharacteristicGateway::new(fake, link))
    }

    #[tokio::test]
    async fn refuses_without_connection() {
        let (tx, _rx) = event_channel();
        let fake = FakeTransport::new(tx);
        let gateway = CharacteristicGateway::new(fake.clone(), new_shared_link());

        assert_eq!(
            gateway.try_write(CharacteristicId::ClaimPrimary, &[1]).await,
            Err(GatewayError::NotConnected)
        );
        assert!(!gateway.write(CharacteristicId::ClaimPrimary, &[1]).await);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn refuses_before_ready() {
        let (fake, gateway) = linked(false, true).await;
        assert_eq!(
            gateway.try_read(CharacteristicId::BatteryLevel).await,
            Err(GatewayError::NotReady)
        );
        assert!(gateway.read(CharacteristicId::BatteryLevel).await.is_none());
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn refuses_undiscovered_characteristic() {
        let (fake, gateway) = linked(true, false).await;
        assert_eq!(
            gateway.try_read(CharacteristicId::BatteryLevel).await,
            Err(GatewayError::UnknownCharacteristic(CharacteristicId::BatteryLevel))
        );
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn transcodes_at_the_boundary() {
        let (fake, gateway) = linked(true, true).await;
        fake.push_read(CharacteristicId::BatteryLevel.uuid(), vec![87]);

        assert_eq!(gateway.read(CharacteristicId::BatteryLevel).await, Some(vec![87]));
        assert!(gateway.write(CharacteristicId::ControlToServer, &[0x15, 1]).await);
        assert!(gateway.write(CharacteristicId::OtaData, &[0xAA]).await);

        let calls = fake.calls();
        assert!(calls.contains(&Call::Write {
            characteristic: CharacteristicId::ControlToServer.uuid(),
            bytes: vec![0x15, 1],
            with_response: true,
        }));
        assert!(calls.contains(&Call::Write {
            characteristic: CharacteristicId::OtaData.uuid(),
            bytes: vec![0xAA],
            with_response: false,
        }));
    }

    #[tokio::test]
    async fn transport_failures_are_soft() {
        let (fake, gateway) = linked(true, true).await;
        fake.fail_writes(TransportError::Disconnected);
        assert!(!gateway.write(CharacteristicId::ModeUpdate, &[0; 42]).await);
        assert!(gateway.read(CharacteristicId::FirmwareRevision).await.is_none());
    }

    #[test]
    fn base64_values() {
        assert_eq!(encode_value(&[1, 2, 3]), "AQID");
        assert_eq!(decode_value("AQID"), Ok(vec![1, 2, 3]));
        assert!(matches!(decode_value("!!"), Err(TransportError::Encoding(_))));
    }
}
