//! UDP transport: one SMP datagram per UDP datagram, no fragmentation.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{ToSocketAddrs, UdpSocket};

use super::{ReceiveError, SendError, Transport};

/// Default maximum unencoded SMP datagram size over UDP, chosen to stay
/// under the common internet path MTU of 1500 bytes minus IP/UDP headers.
pub const DEFAULT_MAX_UNENCODED_SIZE: usize = 1472;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(2500);

/// A connected UDP socket carrying one SMP datagram per UDP packet.
pub struct UdpTransport {
    socket: UdpSocket,
    max_unencoded_size: usize,
}

impl UdpTransport {
    /// Connects a UDP socket to `addr`, binding an ephemeral local port.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, std::io::Error> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(addr).await?;
        Ok(Self {
            socket,
            max_unencoded_size: DEFAULT_MAX_UNENCODED_SIZE,
        })
    }

    /// Overrides the default maximum datagram size, e.g. when the path MTU
    /// to the device is known to be smaller or larger than 1472 bytes.
    pub fn with_max_unencoded_size(mut self, max_unencoded_size: usize) -> Self {
        self.max_unencoded_size = max_unencoded_size;
        self
    }

    /// The peer address this transport is connected to.
    pub fn peer_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.socket.peer_addr()
    }
}

#[async_trait::async_trait]
impl Transport for UdpTransport {
    async fn send(&mut self, datagram: &[u8]) -> Result<(), SendError> {
        if datagram.len() > self.max_unencoded_size {
            return Err(SendError::DatagramTooBig(datagram.len()));
        }
        self.socket.send(datagram).await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Vec<u8>, ReceiveError> {
        let mut buf = vec![0u8; super::SMP_TRANSFER_BUFFER_SIZE];
        let n = self.socket.recv(&mut buf).await?;
        buf.truncate(n);
        Ok(buf)
    }

    fn max_unencoded_size(&self) -> usize {
        self.max_unencoded_size
    }

    fn default_request_timeout(&self) -> Duration {
        DEFAULT_REQUEST_TIMEOUT
    }
}
