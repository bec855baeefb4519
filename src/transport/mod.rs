//! Transport-agnostic framing on top of concrete byte-pipe implementations.
//!
//! A [`Transport`] moves complete SMP datagrams (header + CBOR payload) to and
//! from a device. Each implementation owns its own on-wire framing: serial's
//! base64/CRC line envelope, BLE's MTU-sized GATT writes and notifications, or
//! UDP's one-datagram-per-message model. The [`crate::connection`] engine is
//! the only consumer that understands SMP headers; transports deal purely in
//! bytes.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

pub mod ble;
pub mod serial;
pub mod udp;

pub use ble::BleTransport;
pub use serial::SerialTransport;
pub use udp::UdpTransport;

/// Largest SMP datagram this crate will attempt to send or reassemble.
pub const SMP_TRANSFER_BUFFER_SIZE: usize = u16::MAX as usize;

/// Errors raised while writing a datagram to a transport.
#[derive(Error, Debug, Diagnostic)]
pub enum SendError {
    /// The underlying I/O resource returned an error.
    #[error("transport I/O error")]
    #[diagnostic(code(smp_client::transport::send::io))]
    Io(#[from] io::Error),
    /// The datagram exceeds what this transport can carry in one exchange.
    #[error("datagram of {0} bytes exceeds the transport's maximum size")]
    #[diagnostic(code(smp_client::transport::send::too_big))]
    DatagramTooBig(usize),
    /// The transport is not connected to a device.
    #[error("transport is not connected")]
    #[diagnostic(code(smp_client::transport::send::not_connected))]
    NotConnected,
}

/// Errors raised while reading a datagram from a transport.
#[derive(Error, Debug, Diagnostic)]
pub enum ReceiveError {
    /// The underlying I/O resource returned an error.
    #[error("transport I/O error")]
    #[diagnostic(code(smp_client::transport::recv::io))]
    Io(#[from] io::Error),
    /// A received frame failed the transport's own integrity check.
    #[error("received frame failed integrity check")]
    #[diagnostic(code(smp_client::transport::recv::corrupt))]
    Corrupt,
    /// A reassembled datagram exceeds [`SMP_TRANSFER_BUFFER_SIZE`].
    #[error("received datagram exceeds the maximum transfer size")]
    #[diagnostic(code(smp_client::transport::recv::too_big))]
    FrameTooBig,
    /// The transport's underlying channel closed.
    #[error("transport channel closed")]
    #[diagnostic(code(smp_client::transport::recv::closed))]
    Closed,
}

/// A byte pipe capable of carrying whole SMP datagrams to and from a device.
///
/// Implementations are not required to be cheaply cloneable; [`crate::connection::Connection`]
/// takes ownership and multiplexes requests over a single transport instance
/// from a background task.
#[async_trait]
pub trait Transport: Send {
    /// Sends one complete SMP datagram (header followed by CBOR payload).
    async fn send(&mut self, datagram: &[u8]) -> Result<(), SendError>;

    /// Waits for and returns the next complete SMP datagram.
    ///
    /// Implementations reassemble their own on-wire fragmentation and return
    /// only once a full datagram (as declared by the SMP header's length
    /// field) is available.
    async fn receive(&mut self) -> Result<Vec<u8>, ReceiveError>;

    /// The largest unencoded datagram this transport can carry in one
    /// exchange, used by the upload chunk-size calculators.
    fn max_unencoded_size(&self) -> usize;

    /// The default time [`crate::connection::Connection::request`] waits for
    /// a reply before failing with a timeout, tuned to this transport's
    /// typical round-trip latency.
    fn default_request_timeout(&self) -> Duration;
}

/// Accumulates datagram bytes across partial reads until a full SMP header
/// and payload have arrived, used by transports whose underlying channel
/// delivers arbitrarily sized chunks (BLE notifications, raw byte streams).
#[derive(Debug, Default)]
pub(crate) struct Reassembler {
    buffer: Vec<u8>,
}

impl Reassembler {
    pub(crate) fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Feeds newly received bytes in. Returns the complete datagram once the
    /// header's declared length has been fully accumulated, consuming
    /// exactly that many bytes and leaving any trailing bytes buffered for
    /// the next datagram.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Result<Option<Vec<u8>>, ReceiveError> {
        self.buffer.extend_from_slice(chunk);

        let Some(header) = crate::header::SmpHeader::from_bytes(&self.buffer) else {
            return Ok(None);
        };

        let total_len = crate::header::SMP_HEADER_SIZE + header.length as usize;
        if total_len > SMP_TRANSFER_BUFFER_SIZE {
            return Err(ReceiveError::FrameTooBig);
        }
        if self.buffer.len() < total_len {
            return Ok(None);
        }

        let datagram = self.buffer.drain(..total_len).collect();
        Ok(Some(datagram))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassembler_waits_for_full_datagram() {
        let mut r = Reassembler::new();
        let header = crate::header::SmpHeader::for_request(false, 0, 0, 0, 3);
        let full = crate::header::encode_datagram(header, &[1, 2, 3]);

        assert!(r.push(&full[..4]).unwrap().is_none());
        let result = r.push(&full[4..]).unwrap();
        assert_eq!(result, Some(full));
    }

    #[test]
    fn reassembler_keeps_trailing_bytes_for_next_datagram() {
        let mut r = Reassembler::new();
        let header = crate::header::SmpHeader::for_request(false, 0, 0, 0, 1);
        let first = crate::header::encode_datagram(header, &[9]);
        let second = crate::header::encode_datagram(header, &[8]);

        let mut combined = first.clone();
        combined.extend_from_slice(&second);

        let result = r.push(&combined).unwrap();
        assert_eq!(result, Some(first));

        let result = r.push(&[]).unwrap();
        assert_eq!(result, Some(second));
    }
}
