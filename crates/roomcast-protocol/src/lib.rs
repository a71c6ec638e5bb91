//! Wire protocol for Roomcast.
//!
//! This crate defines what travels inside a UDP datagram:
//!
//! - **Types** ([`Envelope`], [`MessageKind`]) plus the [`HOST_ACK`]
//!   sentinel and the `UserList` payload helpers.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) converting envelopes to
//!   and from bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! The protocol layer knows nothing about sockets, rooms, or membership.
//! It sits between the transport (raw datagrams) and the room core
//! (membership state):
//!
//! ```text
//! Transport (datagram) -> Protocol (Envelope) -> Room (membership)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{HOST_ACK, Envelope, MessageKind, decode_user_list, encode_user_list};
