//! Error types for the transport layer.

use std::net::SocketAddr;

use roomcast_protocol::ProtocolError;

/// Errors that can occur in the transport layer.
///
/// Only [`Bind`](TransportError::Bind) is fatal to the caller; everything
/// else is reported through the consumer's fault channel while the
/// transport keeps running.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding the local UDP port failed (in use, unavailable, denied).
    #[error("bind failed on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// A single outgoing datagram could not be sent.
    #[error("send to {addr} failed: {source}")]
    Send {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// An envelope could not be serialized.
    #[error("encode failed: {0}")]
    Encode(#[source] ProtocolError),

    /// An incoming datagram was not a valid envelope and was dropped.
    #[error("malformed datagram from {addr}: {source}")]
    Decode {
        addr: SocketAddr,
        #[source]
        source: ProtocolError,
    },

    /// The encoded envelope exceeds what fits in one UDP datagram
    /// ([`MAX_DATAGRAM`](crate::MAX_DATAGRAM) bytes). There is no
    /// fragmentation layer; an envelope this large simply cannot be sent.
    #[error("envelope too large for one datagram ({len} bytes)")]
    Oversized { len: usize },

    /// The socket stopped receiving without a matching `stop` request.
    /// Treated by callers as connectivity loss, not as a departure.
    #[error("socket closed unexpectedly: {0}")]
    ClosedUnexpectedly(#[source] std::io::Error),
}
