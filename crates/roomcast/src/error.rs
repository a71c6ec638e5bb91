//! Unified error type for the Roomcast meta-crate.

use roomcast_protocol::ProtocolError;
use roomcast_room::RoomError;
use roomcast_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// Callers of the `roomcast` facade deal with this single type; the
/// `#[from]` attributes let `?` lift sub-crate errors automatically.
/// Nothing here crosses the boundary to UI code as a panic: errors either
/// return from the create/join entry points or become error events.
#[derive(Debug, thiserror::Error)]
pub enum RoomcastError {
    /// A transport-level error (bind, send, receive, decode).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A room-state error (empty name, already in a room).
    #[error(transparent)]
    Room(#[from] RoomError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::Oversized { len: 100_000 };
        let wrapped: RoomcastError = err.into();
        assert!(matches!(wrapped, RoomcastError::Transport(_)));
        assert!(wrapped.to_string().contains("100000"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let wrapped: RoomcastError = err.into();
        assert!(matches!(wrapped, RoomcastError::Protocol(_)));
    }

    #[test]
    fn test_from_room_error() {
        let err = RoomError::EmptyName;
        let wrapped: RoomcastError = err.into();
        assert!(matches!(wrapped, RoomcastError::Room(_)));
        assert!(wrapped.to_string().contains("empty"));
    }
}
