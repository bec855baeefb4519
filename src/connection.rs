//! Async request/response engine multiplexing typed SMP commands over a single transport.
//!
//! A [`Connection`] owns one [`Transport`] from a background task and exposes
//! a cheaply cloneable handle. Callers issue [`Connection::request`] from as
//! many places as they like; the background task assigns each one a sequence
//! number, serializes it, writes it to the transport, and wakes the matching
//! caller once a reply with that sequence arrives.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};

use crate::commands::{ErrResponse, ErrResponseV2, SmpRequest};
use crate::header::{self, SmpHeader};
use crate::smp_errors::DeviceError;
use crate::transport::{ReceiveError, SendError, Transport};

/// How many requests may be queued for the background task before it gets a
/// chance to drain them. This is just a smoothing buffer; the actual bound
/// on outstanding requests is [`MAX_IN_FLIGHT`], enforced by a semaphore the
/// caller waits on, not by this channel filling up.
const OUTGOING_QUEUE_DEPTH: usize = 32;

/// SMP sequence numbers are one byte, so at most this many requests can be
/// outstanding at once.
const MAX_IN_FLIGHT: usize = u8::MAX as usize + 1;

/// Errors that can happen while executing an SMP command end-to-end.
///
/// More information on the error shapes can be found [here](https://docs.zephyrproject.org/latest/services/device_mgmt/smp_protocol.html#minimal-response-smp-data).
#[derive(Error, Debug, Diagnostic)]
pub enum ExecuteError {
    /// An error happened on SMP transport level while sending a request.
    #[error("sending failed")]
    #[diagnostic(code(smp_client::connection::send))]
    SendFailed(#[from] SendError),
    /// An error happened on SMP transport level while receiving a response.
    #[error("receiving failed")]
    #[diagnostic(code(smp_client::connection::receive))]
    ReceiveFailed(#[from] ReceiveError),
    /// An error happened while CBOR encoding the request payload.
    #[error("cbor encoding failed")]
    #[diagnostic(code(smp_client::connection::encode))]
    EncodeFailed,
    /// An error happened while CBOR decoding the response payload.
    #[error("cbor decoding failed")]
    #[diagnostic(code(smp_client::connection::decode))]
    DecodeFailed,
    /// The response's sequence number did not match the request's.
    #[error("response sequence {got} does not match request sequence {expected}")]
    #[diagnostic(code(smp_client::connection::bad_sequence))]
    BadSequence {
        /// sequence the request was sent with
        expected: u8,
        /// sequence the response carried
        got: u8,
    },
    /// The response's group id did not match the request's.
    #[error("response group {got} does not match request group {expected}")]
    #[diagnostic(code(smp_client::connection::bad_group))]
    BadGroup {
        /// group the request was addressed to
        expected: u16,
        /// group the response carried
        got: u16,
    },
    /// The response's command id did not match the request's.
    #[error("response command {got} does not match request command {expected}")]
    #[diagnostic(code(smp_client::connection::bad_command))]
    BadCommand {
        /// command the request was addressed to
        expected: u8,
        /// command the response carried
        got: u8,
    },
    /// The response's op code was not the expected reply to the request's op.
    #[error("response op {got} is not the expected reply to op {expected}")]
    #[diagnostic(code(smp_client::connection::bad_op))]
    BadOp {
        /// op code the response should have carried
        expected: u8,
        /// op code the response actually carried
        got: u8,
    },
    /// The device reported an SMP-level error for the request.
    #[error("device returned error: {0}")]
    #[diagnostic(code(smp_client::connection::device_error))]
    DeviceError(DeviceError),
    /// No response arrived for the request within its timeout.
    #[error("request timed out waiting for a response")]
    #[diagnostic(code(smp_client::connection::timeout))]
    Timeout,
    /// The connection's background task has shut down, so no further
    /// requests can be serviced.
    #[error("connection is closed")]
    #[diagnostic(code(smp_client::connection::closed))]
    ConnectionClosed,
}

struct OutgoingRequest {
    write_operation: bool,
    group: u16,
    command: u8,
    payload: Vec<u8>,
    reply: oneshot::Sender<Result<Vec<u8>, ExecuteError>>,
    /// Tells the caller which sequence number the actor assigned, so a
    /// timed-out caller can ask for that slot to be evicted.
    seq_tx: oneshot::Sender<u8>,
    /// Held for as long as this request occupies a sequence slot; dropping
    /// it (on response delivery or eviction) frees the slot for reuse.
    permit: OwnedSemaphorePermit,
}

/// An SMP protocol-layer connection to a device.
///
/// In most cases this type is not used directly, but indirectly through
/// [`SmpClient`](crate::SmpClient). Cloning a `Connection` is cheap; every
/// clone shares the same background task and transport.
#[derive(Clone)]
pub struct Connection {
    outgoing: mpsc::Sender<OutgoingRequest>,
    /// Evicts a sequence number from the actor's in-flight map, used when a
    /// caller stops waiting (timeout) before a response arrives.
    cancel: mpsc::UnboundedSender<u8>,
    /// Bounds the number of requests awaiting a response to at most
    /// [`MAX_IN_FLIGHT`], the size of the sequence number space. Acquired by
    /// the caller before a request is even handed to the actor, so the
    /// actor's own select loop never has to wait for a slot to free up.
    in_flight: Arc<Semaphore>,
    default_timeout: Duration,
    max_unencoded_size: usize,
}

impl Connection {
    /// Takes ownership of `transport` and spawns the background task that
    /// multiplexes requests across it.
    pub fn new<T: Transport + Send + 'static>(transport: T) -> Self {
        let default_timeout = transport.default_request_timeout();
        let max_unencoded_size = transport.max_unencoded_size();
        let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTGOING_QUEUE_DEPTH);
        let (cancel_tx, cancel_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_actor(Box::new(transport), outgoing_rx, cancel_rx));
        Self {
            outgoing: outgoing_tx,
            cancel: cancel_tx,
            in_flight: Arc::new(Semaphore::new(MAX_IN_FLIGHT)),
            default_timeout,
            max_unencoded_size,
        }
    }

    /// Overrides the default per-request timeout inherited from the transport.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// The largest unencoded SMP datagram the underlying transport can
    /// carry, used by the upload chunk-size calculators.
    pub fn max_unencoded_size(&self) -> usize {
        self.max_unencoded_size
    }

    /// Executes `request`, waiting up to this connection's default timeout
    /// for a matching response.
    pub async fn request<R: SmpRequest>(&self, request: &R) -> Result<R::Response, ExecuteError> {
        self.request_with_timeout(request, self.default_timeout)
            .await
    }

    /// Executes `request`, waiting up to `timeout` for a matching response.
    pub async fn request_with_timeout<R: SmpRequest>(
        &self,
        request: &R,
        timeout: Duration,
    ) -> Result<R::Response, ExecuteError> {
        // Waiting here, rather than inside the actor, is what lets the
        // actor's select loop stay lock-step: it never has to suspend
        // mid-iteration waiting for a slot only its own other branch can
        // free.
        let permit = self
            .in_flight
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ExecuteError::ConnectionClosed)?;

        let mut payload = Vec::new();
        ciborium::into_writer(request, &mut payload).map_err(|_| ExecuteError::EncodeFailed)?;

        log::debug!(
            "TX group={} command={} write={}: {} byte payload",
            R::GROUP_ID,
            R::COMMAND_ID,
            R::WRITE_OPERATION,
            payload.len(),
        );

        let (reply_tx, reply_rx) = oneshot::channel();
        let (seq_tx, seq_rx) = oneshot::channel();
        self.outgoing
            .send(OutgoingRequest {
                write_operation: R::WRITE_OPERATION,
                group: R::GROUP_ID,
                command: R::COMMAND_ID,
                payload,
                reply: reply_tx,
                seq_tx,
                permit,
            })
            .await
            .map_err(|_| ExecuteError::ConnectionClosed)?;

        let datagram = match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => return Err(ExecuteError::ConnectionClosed),
            Err(_) => {
                // The actor may not have assigned a sequence yet if it's
                // still working through a backlog; wait for it so the slot
                // is evicted instead of leaking once it is assigned.
                if let Ok(sequence) = seq_rx.await {
                    let _ = self.cancel.send(sequence);
                }
                return Err(ExecuteError::Timeout);
            }
        };

        let header = SmpHeader::from_bytes(&datagram).ok_or(ExecuteError::DecodeFailed)?;
        let body = &datagram[header::SMP_HEADER_SIZE..];

        log::debug!(
            "RX group={} command={} op={}: {} byte payload",
            header.group,
            header.command,
            header.op,
            body.len(),
        );

        if header.group != R::GROUP_ID {
            return Err(ExecuteError::BadGroup {
                expected: R::GROUP_ID,
                got: header.group,
            });
        }
        if header.command != R::COMMAND_ID {
            return Err(ExecuteError::BadCommand {
                expected: R::COMMAND_ID,
                got: header.command,
            });
        }
        let expected_op = if R::WRITE_OPERATION {
            header::op::WRITE_RSP
        } else {
            header::op::READ_RSP
        };
        if header.op != expected_op {
            return Err(ExecuteError::BadOp {
                expected: expected_op,
                got: header.op,
            });
        }

        let err: ErrResponse =
            ciborium::from_reader(body).map_err(|_| ExecuteError::DecodeFailed)?;
        if let Some(ErrResponseV2 { group, rc }) = err.err {
            return Err(ExecuteError::DeviceError(DeviceError::V2 { group, rc }));
        }
        if let Some(rc) = err.rc {
            if rc != 0 {
                return Err(ExecuteError::DeviceError(DeviceError::V1 { rc }));
            }
        }

        ciborium::from_reader(body).map_err(|_| ExecuteError::DecodeFailed)
    }

    /// Issues a pipelined sequence of requests where each subsequent request
    /// is derived from the previous response, stopping once `next` returns
    /// `None`. Used to drive chunked uploads without holding the whole
    /// transfer in memory at once.
    pub async fn request_all<R, F>(
        &self,
        first: R,
        mut next: F,
    ) -> Result<R::Response, ExecuteError>
    where
        R: SmpRequest,
        F: FnMut(&R::Response) -> Option<R>,
    {
        let mut response = self.request(&first).await?;
        while let Some(request) = next(&response) {
            response = self.request(&request).await?;
        }
        Ok(response)
    }
}

/// Owns the transport exclusively and services outgoing requests, inbound
/// responses, and cancellations from a single cooperative loop, so a
/// `Box<dyn Transport>` never needs to be shared behind a lock.
///
/// None of these branches ever waits for something only another branch can
/// produce: by the time a request reaches `outgoing`, its caller has already
/// secured a permit from [`Connection::in_flight`], so a free sequence
/// number is always available and this loop never suspends mid-iteration.
async fn run_actor(
    mut transport: Box<dyn Transport + Send>,
    mut outgoing: mpsc::Receiver<OutgoingRequest>,
    mut cancel: mpsc::UnboundedReceiver<u8>,
) {
    let mut next_seq: u8 = rand::random();
    let mut in_flight: HashMap<u8, (oneshot::Sender<Result<Vec<u8>, ExecuteError>>, OwnedSemaphorePermit)> =
        HashMap::new();

    loop {
        tokio::select! {
            maybe_request = outgoing.recv() => {
                let Some(request) = maybe_request else {
                    break;
                };

                while in_flight.contains_key(&next_seq) {
                    next_seq = next_seq.wrapping_add(1);
                }
                let sequence = next_seq;
                next_seq = next_seq.wrapping_add(1);
                let _ = request.seq_tx.send(sequence);

                let header = SmpHeader::for_request(
                    request.write_operation,
                    request.group,
                    sequence,
                    request.command,
                    request.payload.len() as u16,
                );
                let datagram = header::encode_datagram(header, &request.payload);

                match transport.send(&datagram).await {
                    Ok(()) => {
                        in_flight.insert(sequence, (request.reply, request.permit));
                    }
                    Err(err) => {
                        let _ = request.reply.send(Err(ExecuteError::SendFailed(err)));
                    }
                }
            }

            Some(sequence) = cancel.recv() => {
                // No-op if the response arrived in the race between the
                // caller timing out and this message being processed; the
                // caller has already moved on either way.
                in_flight.remove(&sequence);
            }

            received = transport.receive() => {
                match received {
                    Ok(datagram) => {
                        let Some(header) = SmpHeader::from_bytes(&datagram) else {
                            log::warn!("dropping datagram too short to contain an SMP header");
                            continue;
                        };
                        match in_flight.remove(&header.sequence) {
                            Some((reply, _permit)) => {
                                let _ = reply.send(Ok(datagram));
                            }
                            None => {
                                log::warn!(
                                    "dropping response for sequence {}, no matching in-flight request (late or duplicate?)",
                                    header.sequence,
                                );
                            }
                        }
                    }
                    Err(ReceiveError::Corrupt) | Err(ReceiveError::FrameTooBig) => {
                        log::warn!("dropping malformed datagram from transport");
                    }
                    Err(fatal) => {
                        log::error!("transport closed, failing {} in-flight request(s): {fatal}", in_flight.len());
                        for (_, (reply, _permit)) in in_flight.drain() {
                            let _ = reply.send(Err(ExecuteError::ConnectionClosed));
                        }
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::os::Echo;
    use ciborium::cbor;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    /// A bare length-prefixed transport over an in-memory duplex pipe, used
    /// to exercise [`Connection`]'s multiplexing logic independently of any
    /// particular on-wire framing.
    struct RawDuplexTransport {
        io: DuplexStream,
    }

    #[async_trait::async_trait]
    impl Transport for RawDuplexTransport {
        async fn send(&mut self, datagram: &[u8]) -> Result<(), SendError> {
            self.io.write_all(&(datagram.len() as u32).to_be_bytes()).await?;
            self.io.write_all(datagram).await?;
            Ok(())
        }

        async fn receive(&mut self) -> Result<Vec<u8>, ReceiveError> {
            let mut len_bytes = [0u8; 4];
            self.io
                .read_exact(&mut len_bytes)
                .await
                .map_err(|_| ReceiveError::Closed)?;
            let mut buf = vec![0u8; u32::from_be_bytes(len_bytes) as usize];
            self.io
                .read_exact(&mut buf)
                .await
                .map_err(|_| ReceiveError::Closed)?;
            Ok(buf)
        }

        fn max_unencoded_size(&self) -> usize {
            crate::transport::SMP_TRANSFER_BUFFER_SIZE
        }

        fn default_request_timeout(&self) -> Duration {
            Duration::from_secs(5)
        }
    }

    async fn read_request(device_io: &mut DuplexStream) -> (SmpHeader, Vec<u8>) {
        let mut len_bytes = [0u8; 4];
        device_io.read_exact(&mut len_bytes).await.unwrap();
        let mut buf = vec![0u8; u32::from_be_bytes(len_bytes) as usize];
        device_io.read_exact(&mut buf).await.unwrap();
        let header = SmpHeader::from_bytes(&buf).unwrap();
        (header, buf)
    }

    async fn write_response(device_io: &mut DuplexStream, header: SmpHeader, payload: &[u8]) {
        let header = SmpHeader {
            op: header.op + 1,
            length: payload.len() as u16,
            ..header
        };
        let datagram = header::encode_datagram(header, payload);
        device_io.write_all(&(datagram.len() as u32).to_be_bytes()).await.unwrap();
        device_io.write_all(&datagram).await.unwrap();
    }

    #[tokio::test]
    async fn round_trips_a_request() {
        let (client_io, mut device_io) = duplex(4096);
        let connection = Connection::new(RawDuplexTransport { io: client_io });

        let client = tokio::spawn(async move {
            connection
                .request(&Echo { d: "Hello World!" })
                .await
                .unwrap()
        });

        let (header, _) = read_request(&mut device_io).await;
        let mut payload = Vec::new();
        ciborium::into_writer(&ciborium::cbor!({"r" => "Hello World!"}).unwrap(), &mut payload)
            .unwrap();
        write_response(&mut device_io, header, &payload).await;

        let response = client.await.unwrap();
        assert_eq!(response.r, "Hello World!");
    }

    #[tokio::test]
    async fn times_out_without_a_response() {
        let (client_io, _device_io) = duplex(4096);
        let connection = Connection::new(RawDuplexTransport { io: client_io })
            .with_default_timeout(Duration::from_millis(50));

        let result = connection.request(&Echo { d: "hi" }).await;
        assert!(matches!(result, Err(ExecuteError::Timeout)));
    }

    #[tokio::test]
    async fn rejects_mismatched_group_in_response() {
        let (client_io, mut device_io) = duplex(4096);
        let connection = Connection::new(RawDuplexTransport { io: client_io })
            .with_default_timeout(Duration::from_secs(1));

        let client = tokio::spawn(async move { connection.request(&Echo { d: "hi" }).await });

        let (header, _) = read_request(&mut device_io).await;
        let mismatched_group_header = SmpHeader {
            group: header.group + 1,
            ..header
        };
        let mut payload = Vec::new();
        ciborium::into_writer(&ciborium::cbor!({"r" => "hi"}).unwrap(), &mut payload).unwrap();
        write_response(&mut device_io, mismatched_group_header, &payload).await;

        let result = client.await.unwrap();
        assert!(matches!(result, Err(ExecuteError::BadGroup { .. })));
    }

    #[tokio::test]
    async fn evicts_timed_out_requests_and_keeps_serving_the_connection() {
        let (client_io, mut device_io) = duplex(4096);
        let connection = Connection::new(RawDuplexTransport { io: client_io })
            .with_default_timeout(Duration::from_millis(50));

        // This request never gets a response and must time out; if the
        // in-flight slot it held were never evicted, nothing past it could
        // ever be served once enough such requests piled up.
        let timed_out = connection.request(&Echo { d: "first" }).await;
        assert!(matches!(timed_out, Err(ExecuteError::Timeout)));

        let connection = connection.with_default_timeout(Duration::from_secs(1));
        let client = tokio::spawn(async move { connection.request(&Echo { d: "second" }).await });

        let (header, _) = read_request(&mut device_io).await;
        let mut payload = Vec::new();
        ciborium::into_writer(&ciborium::cbor!({"r" => "second"}).unwrap(), &mut payload).unwrap();
        write_response(&mut device_io, header, &payload).await;

        let result = tokio::time::timeout(Duration::from_secs(1), client)
            .await
            .expect("connection should still be responsive after a timed-out request")
            .unwrap();
        assert_eq!(result.unwrap().r, "second");
    }

    #[tokio::test]
    async fn reports_device_errors() {
        let (client_io, mut device_io) = duplex(4096);
        let connection = Connection::new(RawDuplexTransport { io: client_io })
            .with_default_timeout(Duration::from_secs(1));

        let client = tokio::spawn(async move { connection.request(&Echo { d: "hi" }).await });

        let (header, _) = read_request(&mut device_io).await;
        let mut payload = Vec::new();
        ciborium::into_writer(&ciborium::cbor!({"rc" => 6}).unwrap(), &mut payload).unwrap();
        write_response(&mut device_io, header, &payload).await;

        let result = client.await.unwrap();
        assert!(matches!(
            result,
            Err(ExecuteError::DeviceError(DeviceError::V1 { rc: 6 }))
        ));
    }
}
