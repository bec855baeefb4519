//! Serial transport: base64-encoded, CRC-guarded, line-framed datagrams.
//!
//! Wire format for one line:
//! `<marker><base64(length_be_u16 || datagram || crc16_xmodem(datagram))>\n`
//! where `marker` is `0x06 0x09` for the first chunk of a datagram and
//! `0x04 0x14` for a continuation chunk, and lines are wrapped at
//! `line_length` base64 characters.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crc::{Crc, CRC_16_XMODEM};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_serial::SerialPortBuilderExt;

use super::{Reassembler, ReceiveError, SendError, Transport};

const FIRST_CHUNK_MARKER: [u8; 2] = [0x06, 0x09];
const CONTINUATION_MARKER: [u8; 2] = [0x04, 0x14];
/// Bytes of per-line overhead outside the base64 payload: a 2-byte marker
/// plus the trailing newline.
const LINE_OVERHEAD: usize = 3;
const DEFAULT_LINE_LENGTH: usize = 128;
const CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// A serial-port SMP transport using Zephyr's console framing.
pub struct SerialTransport<P> {
    port: P,
    line_length: usize,
    reassembler: Reassembler,
    read_buf: Vec<u8>,
}

impl<P> SerialTransport<P>
where
    P: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an already-open serial port, using the default line length.
    pub fn new(port: P) -> Self {
        Self::with_line_length(port, DEFAULT_LINE_LENGTH)
    }

    /// Wraps an already-open serial port with a caller-chosen line length.
    pub fn with_line_length(port: P, line_length: usize) -> Self {
        Self {
            port,
            line_length,
            reassembler: Reassembler::new(),
            read_buf: Vec::new(),
        }
    }

    async fn write_datagram(&mut self, datagram: &[u8]) -> Result<(), SendError> {
        let mut body = Vec::with_capacity(2 + datagram.len() + 2);
        body.extend_from_slice(&(datagram.len() as u16).to_be_bytes());
        body.extend_from_slice(datagram);
        let crc = CRC.checksum(datagram);
        body.extend_from_slice(&crc.to_be_bytes());

        let encoded = BASE64.encode(&body);
        let mut remaining = encoded.as_bytes();
        let mut first = true;

        // Budget the marker and newline out of line_length so each emitted
        // wire line is at most line_length bytes, not line_length + 3.
        // Rounded down to a multiple of 4 so every non-final chunk is a
        // complete base64 block (only the last chunk may carry padding).
        let payload_budget = (self.line_length.saturating_sub(LINE_OVERHEAD) / 4 * 4).max(4);

        while !remaining.is_empty() {
            let marker = if first { FIRST_CHUNK_MARKER } else { CONTINUATION_MARKER };
            let take = remaining.len().min(payload_budget);
            let (chunk, rest) = remaining.split_at(take);

            self.port.write_all(&marker).await?;
            self.port.write_all(chunk).await?;
            self.port.write_all(b"\n").await?;

            remaining = rest;
            first = false;
        }

        Ok(())
    }

    async fn read_line(&mut self) -> Result<Vec<u8>, ReceiveError> {
        let mut line = Vec::new();
        loop {
            if let Some(pos) = self.read_buf.iter().position(|&b| b == b'\n') {
                line = self.read_buf.drain(..=pos).collect();
                line.pop();
                return Ok(line);
            }

            let mut chunk = [0u8; 256];
            let n = self.port.read(&mut chunk).await?;
            if n == 0 {
                return Err(ReceiveError::Closed);
            }
            self.read_buf.extend_from_slice(&chunk[..n]);
        }
    }
}

#[async_trait::async_trait]
impl<P> Transport for SerialTransport<P>
where
    P: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, datagram: &[u8]) -> Result<(), SendError> {
        self.write_datagram(datagram).await
    }

    async fn receive(&mut self) -> Result<Vec<u8>, ReceiveError> {
        let mut decoded_body = Vec::new();
        // Total body bytes to expect (length prefix + datagram + CRC), known
        // only once the length prefix itself has been decoded. A chunk-size
        // heuristic here would hang forever whenever the base64 body's
        // length happens to be an exact multiple of the line length.
        let mut declared_total: Option<usize> = None;

        loop {
            let line = self.read_line().await?;
            if line.len() < 2 {
                continue;
            }
            let (marker, payload) = line.split_at(2);
            let is_first = marker == FIRST_CHUNK_MARKER;
            let is_continuation = marker == CONTINUATION_MARKER;
            if !is_first && !is_continuation {
                continue;
            }
            if is_first {
                decoded_body.clear();
                declared_total = None;
            }

            let mut buf = vec![0u8; payload.len()];
            let written = BASE64
                .decode_slice(payload, &mut buf)
                .map_err(|_| ReceiveError::Corrupt)?;
            decoded_body.extend_from_slice(&buf[..written]);

            if declared_total.is_none() && decoded_body.len() >= 2 {
                let declared_len = u16::from_be_bytes([decoded_body[0], decoded_body[1]]) as usize;
                declared_total = Some(2 + declared_len + 2);
            }
            if let Some(total) = declared_total {
                if decoded_body.len() >= total {
                    break;
                }
            }
        }

        if decoded_body.len() < 4 {
            return Err(ReceiveError::Corrupt);
        }
        let (len_bytes, rest) = decoded_body.split_at(2);
        let declared_len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
        if rest.len() < declared_len + 2 {
            return Err(ReceiveError::Corrupt);
        }
        let (datagram, crc_bytes) = rest.split_at(declared_len);
        let expected_crc = u16::from_be_bytes([crc_bytes[0], crc_bytes[1]]);
        if CRC.checksum(datagram) != expected_crc {
            return Err(ReceiveError::Corrupt);
        }

        match self.reassembler.push(datagram)? {
            Some(full) => Ok(full),
            None => self.receive().await,
        }
    }

    fn max_unencoded_size(&self) -> usize {
        super::SMP_TRANSFER_BUFFER_SIZE
    }

    fn default_request_timeout(&self) -> Duration {
        DEFAULT_REQUEST_TIMEOUT
    }
}

/// Convenience constructor building a [`SerialTransport`] over a
/// `tokio-serial` port opened at `path` and `baud_rate`.
pub async fn connect(path: &str, baud_rate: u32) -> Result<SerialTransport<tokio_serial::SerialStream>, std::io::Error> {
    let port = tokio_serial::new(path, baud_rate).open_native_async()?;
    Ok(SerialTransport::new(port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn round_trips_a_short_datagram() {
        let (client_io, mut device_io) = duplex(4096);
        let mut client = SerialTransport::new(client_io);

        let header = crate::header::SmpHeader::for_request(false, 0, 1, 2, 3);
        let datagram = crate::header::encode_datagram(header, &[1, 2, 3]);
        client.send(&datagram).await.unwrap();

        let mut echoed = Vec::new();
        tokio::time::timeout(std::time::Duration::from_millis(200), async {
            let mut buf = [0u8; 4096];
            let n = device_io.read(&mut buf).await.unwrap();
            echoed.extend_from_slice(&buf[..n]);
        })
        .await
        .unwrap();

        device_io.write_all(&echoed).await.unwrap();
        let received = client.receive().await.unwrap();
        assert_eq!(received, datagram);
    }

    #[tokio::test]
    async fn rejects_crc_mismatch() {
        let (client_io, mut device_io) = duplex(4096);
        let mut client = SerialTransport::new(client_io);

        let mut body = Vec::new();
        body.extend_from_slice(&3u16.to_be_bytes());
        body.extend_from_slice(&[1, 2, 3]);
        body.extend_from_slice(&0xFFFFu16.to_be_bytes());
        let encoded = BASE64.encode(&body);

        device_io.write_all(&FIRST_CHUNK_MARKER).await.unwrap();
        device_io.write_all(encoded.as_bytes()).await.unwrap();
        device_io.write_all(b"\n").await.unwrap();

        let result = client.receive().await;
        assert!(matches!(result, Err(ReceiveError::Corrupt)));
    }
}
