//! # Roomcast
//!
//! A peer-to-peer UDP chat room core. One process creates a room and acts
//! as its host; others join as clients. Members discover each other,
//! exchange public chat (relayed through the host) and private messages
//! (sent directly), and learn about departures, all over plain best-effort
//! UDP datagrams.
//!
//! The embedding application talks to a single [`RoomNode`]:
//!
//! ```rust,no_run
//! use roomcast::prelude::*;
//!
//! # async fn demo() -> Result<(), RoomcastError> {
//! let node = RoomNode::new();
//! node.subscribe(|event| {
//!     if let RoomEvent::Message(envelope) = event {
//!         println!("{}: {}", envelope.from_name, envelope.content);
//!     }
//! });
//!
//! node.create_room("alice", 9000).await?;
//! node.send_chat_message("hello, empty room", None);
//! node.leave_room();
//! # Ok(())
//! # }
//! ```
//!
//! Everything stateful runs on one dispatcher context fed by the socket's
//! receive loop, so no caller ever needs a lock around room state. See
//! `roomcast-transport`, `roomcast-dispatch`, `roomcast-room`, and
//! `roomcast-protocol` for the individual layers.
//!
//! Out of scope, deliberately: peer authentication, NAT traversal,
//! delivery guarantees beyond UDP's, persistence, and liveness detection.
//! A peer that vanishes without sending a leave notice is never noticed.

mod error;
mod handler;
mod node;

pub use error::RoomcastError;
pub use node::RoomNode;

pub mod prelude {
    //! Everything an embedding application typically needs.

    pub use crate::{RoomNode, RoomcastError};
    pub use roomcast_protocol::{Envelope, HOST_ACK, MessageKind};
    pub use roomcast_room::{Member, RoomError, RoomEvent, RoomPhase, SubscriptionId};
    pub use roomcast_transport::TransportError;
}
