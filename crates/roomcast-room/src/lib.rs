//! Room membership state for Roomcast.
//!
//! The types here hold everything a process knows about the room it is in:
//!
//! - [`Roster`] - the membership directory plus identity, role, and host
//!   bookkeeping. The only component allowed to mutate any of it.
//! - [`RoomPhase`] - the membership lifecycle state machine.
//! - [`Member`] / [`Identity`] - directory entries and the local user.
//! - [`EventBus`] / [`RoomEvent`] - the outbound notification fan-out.
//! - [`RoomError`].
//!
//! Nothing in this crate does I/O. Sockets live in `roomcast-transport`;
//! the protocol handlers that drive these types live in `roomcast`.

mod error;
mod events;
mod member;
mod phase;
mod roster;

pub use error::RoomError;
pub use events::{EventBus, RoomEvent, SubscriptionId};
pub use member::{Identity, Member};
pub use phase::RoomPhase;
pub use roster::Roster;
