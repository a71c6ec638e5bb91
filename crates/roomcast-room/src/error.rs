//! Error types for the room layer.

use crate::RoomPhase;

/// Errors that can occur during room state operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// A user name was empty or blank.
    #[error("user name must not be empty")]
    EmptyName,

    /// Create/join attempted while already in (or entering) a room. One
    /// room per process instance; leave first.
    #[error("already in a room (phase {0})")]
    AlreadyInRoom(RoomPhase),
}
