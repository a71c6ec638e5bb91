//! Codec trait and the JSON implementation.
//!
//! The codec converts envelopes to and from datagram payloads. Everything
//! above the transport only talks to the [`Codec`] trait, so the wire
//! representation can change (say, to a compact binary format) without
//! touching protocol handlers.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes values to bytes and decodes bytes back.
///
/// `Send + Sync + 'static` because the transport's receive task holds a
/// codec across await points.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a datagram payload.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if the value cannot be represented
    /// in this format.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes a datagram payload.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] for malformed, truncated, or
    /// foreign payloads.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`.
///
/// Human-readable on the wire, which makes packet captures of a chat
/// session trivially debuggable. Enabled by the default `json` feature.
///
/// ```rust
/// use std::net::{IpAddr, Ipv4Addr};
/// use roomcast_protocol::{Codec, Envelope, JsonCodec, MessageKind};
///
/// let codec = JsonCodec;
/// let env = Envelope::new(
///     MessageKind::Chat,
///     "alice",
///     IpAddr::V4(Ipv4Addr::LOCALHOST),
///     9100,
/// )
/// .content("hello");
///
/// let bytes = codec.encode(&env).unwrap();
/// let decoded: Envelope = codec.decode(&bytes).unwrap();
/// assert_eq!(env, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
