//! Room membership lifecycle.

/// Where this process stands in its room membership.
///
/// ```text
/// Idle ──create──▶ Hosting ──────────────leave──▶ Idle
/// Idle ──join───▶ AwaitingHostAck ──ack/list──▶ Joined ──leave──▶ Idle
/// ```
///
/// The role is part of the phase: `Hosting` is the only host state, and a
/// process never changes role while in a room. Leaving (or a host
/// departure, for clients) always lands back on `Idle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoomPhase {
    /// Not in any room.
    #[default]
    Idle,
    /// Join request sent; waiting for the host's acknowledgment or a first
    /// user list.
    AwaitingHostAck,
    /// In a room as its host.
    Hosting,
    /// In a room as a client.
    Joined,
}

impl RoomPhase {
    /// `true` once membership is established (either role).
    pub fn is_in_room(&self) -> bool {
        matches!(self, Self::Hosting | Self::Joined)
    }

    /// `true` if this process is the room's host.
    pub fn is_host(&self) -> bool {
        matches!(self, Self::Hosting)
    }

    /// `true` if a create or join may start from this phase.
    pub fn can_begin(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl std::fmt::Display for RoomPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::AwaitingHostAck => write!(f, "AwaitingHostAck"),
            Self::Hosting => write!(f, "Hosting"),
            Self::Joined => write!(f, "Joined"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_in_room() {
        assert!(!RoomPhase::Idle.is_in_room());
        assert!(!RoomPhase::AwaitingHostAck.is_in_room());
        assert!(RoomPhase::Hosting.is_in_room());
        assert!(RoomPhase::Joined.is_in_room());
    }

    #[test]
    fn test_only_hosting_is_host() {
        assert!(RoomPhase::Hosting.is_host());
        assert!(!RoomPhase::Joined.is_host());
        assert!(!RoomPhase::AwaitingHostAck.is_host());
        assert!(!RoomPhase::Idle.is_host());
    }

    #[test]
    fn test_can_begin_only_from_idle() {
        assert!(RoomPhase::Idle.can_begin());
        assert!(!RoomPhase::AwaitingHostAck.can_begin());
        assert!(!RoomPhase::Hosting.can_begin());
        assert!(!RoomPhase::Joined.can_begin());
    }

    #[test]
    fn test_display() {
        assert_eq!(RoomPhase::AwaitingHostAck.to_string(), "AwaitingHostAck");
        assert_eq!(RoomPhase::Hosting.to_string(), "Hosting");
    }
}
