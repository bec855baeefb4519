//! BLE GATT transport, using Zephyr's SMP service and characteristic.
//!
//! Outbound datagrams are chunked to the negotiated ATT MTU and written with
//! response; inbound datagrams are reassembled from GATT notifications using
//! the SMP header's length field, the same way the serial transport
//! reassembles base64 lines.

use std::pin::Pin;
use std::time::Duration;

use btleplug::api::{Characteristic, Peripheral, WriteType};
use btleplug::platform::Peripheral as PlatformPeripheral;
use futures::{Stream, StreamExt};
use uuid::Uuid;

use super::{Reassembler, ReceiveError, SendError, Transport};

/// The SMP GATT service UUID advertised by Zephyr's MCUmgr BLE transport.
pub const SMP_SERVICE_UUID: Uuid = Uuid::from_u128(0x8D53DC1D_1DB7_4CD3_868B_8A527460AA84);
/// The SMP GATT characteristic UUID used for both writes and notifications.
pub const SMP_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0xDA2E7828_FBCE_4E01_AE9E_261174997C48);

/// Conservative default ATT MTU assumed until a caller reports a negotiated
/// value via [`BleTransport::with_mtu`]. Most modern BLE stacks negotiate
/// higher than the legacy 23-byte minimum; this is deliberately well under
/// typical negotiated values rather than a literal protocol floor.
pub const DEFAULT_MTU: usize = 256;
/// Bytes of ATT protocol overhead on every GATT write, which must be
/// subtracted from the negotiated MTU to get the usable payload size.
const ATT_WRITE_HEADER_SIZE: usize = 3;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(40);

/// A BLE GATT SMP transport over an already-connected peripheral.
pub struct BleTransport {
    peripheral: PlatformPeripheral,
    characteristic: Characteristic,
    notifications: Pin<Box<dyn Stream<Item = btleplug::api::ValueNotification> + Send>>,
    reassembler: Reassembler,
    mtu: usize,
}

impl BleTransport {
    /// Discovers the SMP service/characteristic on `peripheral`, subscribes
    /// to notifications, and returns a ready-to-use transport.
    pub async fn new(peripheral: PlatformPeripheral) -> Result<Self, btleplug::Error> {
        peripheral.discover_services().await?;

        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == SMP_CHARACTERISTIC_UUID)
            .ok_or(btleplug::Error::NotSupported(
                "SMP characteristic not found".into(),
            ))?;

        peripheral.subscribe(&characteristic).await?;
        let notifications = peripheral.notifications().await?;

        Ok(Self {
            peripheral,
            characteristic,
            notifications,
            reassembler: Reassembler::new(),
            mtu: DEFAULT_MTU,
        })
    }

    /// Overrides the negotiated ATT MTU used to size outbound writes. Pass
    /// the full negotiated MTU, not the usable payload; the ATT write
    /// header is accounted for separately.
    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Usable bytes per GATT write after the ATT header is subtracted.
    fn usable_chunk_size(&self) -> usize {
        self.mtu.saturating_sub(ATT_WRITE_HEADER_SIZE).max(1)
    }
}

#[async_trait::async_trait]
impl Transport for BleTransport {
    async fn send(&mut self, datagram: &[u8]) -> Result<(), SendError> {
        for chunk in datagram.chunks(self.usable_chunk_size()) {
            self.peripheral
                .write(&self.characteristic, chunk, WriteType::WithResponse)
                .await
                .map_err(|e| SendError::Io(std::io::Error::other(e)))?;
        }
        Ok(())
    }

    async fn receive(&mut self) -> Result<Vec<u8>, ReceiveError> {
        loop {
            let notification = self.notifications.next().await.ok_or(ReceiveError::Closed)?;
            if let Some(datagram) = self.reassembler.push(&notification.value)? {
                return Ok(datagram);
            }
        }
    }

    fn max_unencoded_size(&self) -> usize {
        self.usable_chunk_size()
    }

    fn default_request_timeout(&self) -> Duration {
        DEFAULT_REQUEST_TIMEOUT
    }
}
