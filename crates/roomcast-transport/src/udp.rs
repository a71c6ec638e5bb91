//! UDP transport: one socket, one background receive task.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use roomcast_protocol::{Codec, Envelope, JsonCodec};

use crate::{Consumer, MAX_DATAGRAM, TransportError};

/// Owns the UDP socket for the lifetime of one room membership.
///
/// [`bind`](UdpTransport::bind) spawns the receive task; [`send`] is
/// fire-and-forget; [`stop`] is idempotent and is the only way the receive
/// task is meant to end. Dropping the transport stops it too.
///
/// [`send`]: UdpTransport::send
/// [`stop`]: UdpTransport::stop
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    consumer: Arc<dyn Consumer>,
    codec: JsonCodec,
    stopping: Arc<AtomicBool>,
    stop_bell: Arc<Notify>,
    recv_task: JoinHandle<()>,
}

impl UdpTransport {
    /// Binds `0.0.0.0:port` (port 0 for an OS-assigned ephemeral port) and
    /// starts the receive loop, delivering every decoded envelope to
    /// `consumer`.
    ///
    /// # Errors
    /// Returns [`TransportError::Bind`] if the port is unavailable. This is
    /// the one transport error that reaches the caller directly; the room
    /// layer aborts create/join on it.
    pub async fn bind(
        port: u16,
        consumer: Arc<dyn Consumer>,
    ) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map_err(|source| TransportError::Bind { port, source })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| TransportError::Bind { port, source })?;

        let socket = Arc::new(socket);
        let stopping = Arc::new(AtomicBool::new(false));
        let stop_bell = Arc::new(Notify::new());

        let recv_task = tokio::spawn(receive_loop(
            Arc::clone(&socket),
            Arc::clone(&consumer),
            Arc::clone(&stopping),
            Arc::clone(&stop_bell),
        ));

        info!(%local_addr, "udp transport listening");

        Ok(Self {
            socket,
            local_addr,
            consumer,
            codec: JsonCodec,
            stopping,
            stop_bell,
            recv_task,
        })
    }

    /// The bound local address. With port 0 this is where the OS-assigned
    /// port can be read back.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serializes `envelope` and issues exactly one datagram to `addr`.
    ///
    /// Fire-and-forget: never blocks and never returns an error. Encode
    /// failures, oversized envelopes, and socket errors are reported
    /// through [`Consumer::fault`] and the caller carries on.
    pub fn send(&self, envelope: &Envelope, addr: SocketAddr) {
        let bytes = match self.codec.encode(envelope) {
            Ok(bytes) => bytes,
            Err(source) => {
                warn!(error = %source, "failed to encode outgoing envelope");
                self.consumer.fault(TransportError::Encode(source));
                return;
            }
        };

        if bytes.len() > MAX_DATAGRAM {
            warn!(len = bytes.len(), "envelope exceeds datagram limit");
            self.consumer.fault(TransportError::Oversized { len: bytes.len() });
            return;
        }

        match self.socket.try_send_to(&bytes, addr) {
            Ok(_) => {
                trace!(%addr, kind = %envelope.kind, "sent datagram");
            }
            Err(source) => {
                warn!(%addr, error = %source, "udp send failed");
                self.consumer.fault(TransportError::Send { addr, source });
            }
        }
    }

    /// Requests the receive loop to terminate. Idempotent; safe to call
    /// from any thread, any number of times, including while a receive is
    /// in flight.
    pub fn stop(&self) {
        if !self.stopping.swap(true, Ordering::SeqCst) {
            debug!(local_addr = %self.local_addr, "transport stop requested");
            self.stop_bell.notify_one();
        }
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.stop();
        // The loop exits on the stop bell; abort covers a task that never
        // got polled again (runtime shutting down).
        self.recv_task.abort();
    }
}

/// One iteration: suspend on `recv_from`, decode, stamp the source
/// address, hand the envelope to the consumer. The loop never touches
/// room state; that is the dispatcher's job downstream of `deliver`.
async fn receive_loop(
    socket: Arc<UdpSocket>,
    consumer: Arc<dyn Consumer>,
    stopping: Arc<AtomicBool>,
    stop_bell: Arc<Notify>,
) {
    let codec = JsonCodec;
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        let (len, addr) = tokio::select! {
            _ = stop_bell.notified() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok(pair) => pair,
                Err(source) => {
                    if stopping.load(Ordering::SeqCst) {
                        // Requested shutdown; the failure is the closure
                        // we asked for, not an error.
                        break;
                    }
                    warn!(error = %source, "receive failed without a stop request");
                    consumer.fault(TransportError::ClosedUnexpectedly(source));
                    break;
                }
            },
        };

        if stopping.load(Ordering::SeqCst) {
            break;
        }

        match codec.decode::<Envelope>(&buf[..len]) {
            Ok(mut envelope) => {
                // The sender-supplied from_ip is never trusted; the actual
                // packet source is authoritative.
                envelope.from_ip = addr.ip().to_string();
                trace!(%addr, kind = %envelope.kind, from = %envelope.from_name, "received envelope");
                consumer.deliver(envelope);
            }
            Err(source) => {
                warn!(%addr, error = %source, "dropping malformed datagram");
                consumer.fault(TransportError::Decode { addr, source });
            }
        }
    }

    debug!("receive loop stopped");
}
