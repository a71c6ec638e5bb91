//! UDP transport layer for Roomcast.
//!
//! Owns the one socket per process, runs the single background receive
//! loop, and exposes a fire-and-forget [`send`](UdpTransport::send)
//! addressed by `SocketAddr`. Decoded envelopes are pushed, one at a time,
//! to the single [`Consumer`] registered at bind time; the loop itself
//! never looks inside them.

mod error;
mod udp;

pub use error::TransportError;
pub use udp::UdpTransport;

use std::net::{IpAddr, Ipv4Addr};

use roomcast_protocol::Envelope;

/// The largest payload that fits in one UDP datagram (IPv4, maximal
/// headers). An envelope must fit in a single datagram; there is no
/// fragmentation or reassembly layer.
pub const MAX_DATAGRAM: usize = 65_507;

/// The single designated receiver of everything the transport produces.
///
/// Both callbacks are invoked from the background receive task (and
/// `fault` also from `send` callers), so implementations must not touch
/// room state directly; the expected implementation enqueues onto the
/// dispatcher and returns.
pub trait Consumer: Send + Sync + 'static {
    /// One decoded envelope, `from_ip` already stamped with the datagram's
    /// source address.
    fn deliver(&self, envelope: Envelope);

    /// A non-fatal transport fault: send failure, dropped malformed
    /// datagram, or unexpected socket closure.
    fn fault(&self, error: TransportError);
}

/// Best-effort guess at this machine's outward-facing IP address.
///
/// Opens an unbound UDP socket and "connects" it to a public address,
/// which selects a local interface without sending any packet, then reads
/// the chosen source address back. Falls back to loopback when the
/// machine has no route at all.
pub fn local_ip() -> IpAddr {
    fn probe() -> std::io::Result<IpAddr> {
        let socket = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
        Ok(socket.local_addr()?.ip())
    }
    probe().unwrap_or_else(|error| {
        tracing::debug!(%error, "local address probe failed, using loopback");
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    })
}
