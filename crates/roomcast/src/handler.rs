//! Message routing: one handler per envelope kind.
//!
//! Every decoded envelope ends up here, on the dispatcher context, and is
//! routed by its type tag to exactly one handler. Handlers are the only
//! code that encodes protocol behavior: they mutate the roster, reply or
//! relay through the transport, and publish events. A failing handler is
//! converted to a single error event; it never takes the router or later
//! messages down with it.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use tracing::{debug, info, warn};

use roomcast_protocol::{
    Envelope, HOST_ACK, MessageKind, ProtocolError, decode_user_list, encode_user_list,
};
use roomcast_room::{Member, RoomPhase};

use crate::RoomcastError;
use crate::node::Shared;

/// Protocol behavior for one [`MessageKind`].
pub(crate) trait Handler: Send + Sync {
    /// The single kind this handler owns.
    fn kind(&self) -> MessageKind;

    /// Processes one envelope. Runs on the dispatcher context, so roster
    /// access is uncontended; implementations still release the roster
    /// guard before publishing or sending.
    fn handle(&self, shared: &Shared, envelope: Envelope) -> Result<(), RoomcastError>;
}

/// Maps an envelope's kind to its handler.
#[derive(Default)]
pub(crate) struct Router {
    handlers: HashMap<MessageKind, Box<dyn Handler>>,
}

impl Router {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A router with the full protocol handler set registered.
    pub(crate) fn with_default_handlers() -> Self {
        let mut router = Self::new();
        router.register(Box::new(ChatHandler));
        router.register(Box::new(JoinHandler));
        router.register(Box::new(LeaveHandler));
        router.register(Box::new(UserListHandler));
        router.register(Box::new(PrivateHandler));
        router.register(Box::new(SystemHandler));
        router
    }

    /// Registers a handler for its kind. A later registration for the same
    /// kind replaces the earlier one.
    pub(crate) fn register(&mut self, handler: Box<dyn Handler>) {
        let kind = handler.kind();
        if self.handlers.insert(kind, handler).is_some() {
            debug!(%kind, "message handler replaced");
        }
    }

    /// Routes one envelope. An unregistered kind or a handler failure
    /// publishes exactly one error event and is otherwise a no-op.
    pub(crate) fn dispatch(&self, shared: &Shared, envelope: Envelope) {
        let kind = envelope.kind;
        let Some(handler) = self.handlers.get(&kind) else {
            warn!(%kind, "no handler for message kind");
            shared
                .events
                .publish_error(format!("no handler for message kind {kind}"));
            return;
        };

        if let Err(error) = handler.handle(shared, envelope) {
            warn!(%kind, %error, "message handler failed");
            shared.events.publish_error(error.to_string());
        }
    }
}

/// The transport-stamped source address of an envelope.
///
/// Transport always rewrites `from_ip` from the datagram source, so a
/// parse failure means the envelope did not come through the transport at
/// all and is rejected.
fn source_ip(envelope: &Envelope) -> Result<IpAddr, RoomcastError> {
    envelope.from_ip.parse().map_err(|_| {
        ProtocolError::InvalidMessage(format!(
            "unparseable source address {:?} on {} from {:?}",
            envelope.from_ip, envelope.kind, envelope.from_name
        ))
        .into()
    })
}

/// The sender as a directory entry: self-reported name and port, observed
/// source address.
fn sender_member(envelope: &Envelope) -> Result<Member, RoomcastError> {
    Ok(Member::new(
        envelope.from_name.clone(),
        source_ip(envelope)?,
        envelope.from_port,
    ))
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Public chat. The host is a hub: a chat received from a client is
/// published locally and re-sent once to every other member except the
/// original sender and the host itself.
struct ChatHandler;

impl Handler for ChatHandler {
    fn kind(&self) -> MessageKind {
        MessageKind::Chat
    }

    fn handle(&self, shared: &Shared, envelope: Envelope) -> Result<(), RoomcastError> {
        shared.events.publish_message(envelope.clone());

        let relay_targets: Vec<SocketAddr> = {
            let roster = shared.roster();
            let from_self = roster.user_name() == Some(envelope.from_name.as_str());
            if roster.phase().is_host() && !from_self {
                roster
                    .members_except(&envelope.from_name)
                    .iter()
                    .filter(|m| Some(m.name.as_str()) != roster.user_name())
                    .map(Member::addr)
                    .collect()
            } else {
                Vec::new()
            }
        };

        if !relay_targets.is_empty() {
            debug!(from = %envelope.from_name, fanout = relay_targets.len(), "relaying chat");
        }
        for addr in relay_targets {
            shared.send(&envelope, addr);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Join
// ---------------------------------------------------------------------------

/// Join requests (host side) and join acknowledgments (client side).
struct JoinHandler;

impl Handler for JoinHandler {
    fn kind(&self) -> MessageKind {
        MessageKind::Join
    }

    fn handle(&self, shared: &Shared, envelope: Envelope) -> Result<(), RoomcastError> {
        let phase = shared.roster().phase();
        if phase.is_host() {
            handle_join_request(shared, envelope)
        } else if envelope.is_host_ack() {
            handle_host_ack(shared, envelope)
        } else {
            debug!(phase = %phase, from = %envelope.from_name, "join envelope ignored");
            Ok(())
        }
    }
}

fn handle_join_request(shared: &Shared, envelope: Envelope) -> Result<(), RoomcastError> {
    let joiner = sender_member(&envelope)?;
    let joiner_addr = joiner.addr();
    let joiner_name = joiner.name.clone();

    let state = {
        let mut roster = shared.roster();
        match roster.identity().cloned() {
            // A join under the host's own name would evict our own
            // directory entry; refuse it.
            Some(identity) if joiner_name == identity.user_name => {
                warn!(name = %joiner_name, "join request reusing the host name, ignored");
                None
            }
            Some(identity) => {
                roster.insert(joiner);
                let others = roster.members_except(&identity.user_name);
                Some((identity, roster.member_names(), others))
            }
            None => None,
        }
    };
    let Some((identity, names, others)) = state else {
        return Ok(());
    };

    info!(joiner = %joiner_name, addr = %joiner_addr, members = names.len(), "member joined");

    // 1. Direct host acknowledgment so the joiner learns who the host is.
    let ack = Envelope::new(
        MessageKind::Join,
        identity.user_name.as_str(),
        identity.local_ip,
        identity.local_port,
    )
    .to(joiner_name.as_str())
    .content(HOST_ACK);
    shared.send(&ack, joiner_addr);

    // 2. Refreshed directory for local observers.
    shared.events.publish_user_list(names.clone());

    // 3. Welcome notice to every member, the host included (local publish).
    let welcome = Envelope::new(
        MessageKind::System,
        identity.user_name.as_str(),
        identity.local_ip,
        identity.local_port,
    )
    .content(format!("{joiner_name} joined the room"));
    shared.events.publish_message(welcome.clone());
    for member in &others {
        shared.send(&welcome, member.addr());
    }

    // 4. Authoritative member list to every other member.
    let user_list = Envelope::new(
        MessageKind::UserList,
        identity.user_name.as_str(),
        identity.local_ip,
        identity.local_port,
    )
    .content(encode_user_list(&names));
    for member in &others {
        shared.send(&user_list, member.addr());
    }

    Ok(())
}

fn handle_host_ack(shared: &Shared, envelope: Envelope) -> Result<(), RoomcastError> {
    let host = sender_member(&envelope)?;

    let joined_now = {
        let mut roster = shared.roster();
        let was_awaiting = roster.phase() == RoomPhase::AwaitingHostAck;
        roster.adopt_host(host);
        was_awaiting && roster.phase() == RoomPhase::Joined
    };

    if joined_now {
        info!(host = %envelope.from_name, "join acknowledged");
        shared.events.publish_room_state(true);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// UserList
// ---------------------------------------------------------------------------

/// Directory refresh broadcast by the host. Clients only; the host owns
/// the authoritative list and ignores echoes of its own broadcasts.
///
/// The payload carries names without addresses, so newly discovered names
/// are filed under the broadcasting packet's source address. That holds
/// only because the host is the sole broadcaster; direct traffic to such
/// a member goes through the host's address until a better one is learned.
struct UserListHandler;

impl Handler for UserListHandler {
    fn kind(&self) -> MessageKind {
        MessageKind::UserList
    }

    fn handle(&self, shared: &Shared, envelope: Envelope) -> Result<(), RoomcastError> {
        let source = source_ip(&envelope)?;
        let names = decode_user_list(&envelope.content);

        let (joined_now, list) = {
            let mut roster = shared.roster();
            match roster.phase() {
                RoomPhase::Hosting => return Ok(()),
                RoomPhase::Idle => {
                    debug!(from = %envelope.from_name, "user list outside a room, ignored");
                    return Ok(());
                }
                RoomPhase::AwaitingHostAck | RoomPhase::Joined => {}
            }

            // A list that arrives before (or instead of) the explicit host
            // acknowledgment still proves the host accepted us.
            let joined_now = roster.phase() == RoomPhase::AwaitingHostAck;
            if joined_now {
                roster.adopt_host(Member::new(
                    envelope.from_name.clone(),
                    source,
                    envelope.from_port,
                ));
            }

            let me = roster.user_name().unwrap_or_default().to_string();
            for name in names {
                if name != me && !roster.contains(&name) {
                    roster.insert(Member::new(name, source, envelope.from_port));
                }
            }
            roster.ensure_self();
            (joined_now, roster.member_names())
        };

        if joined_now {
            info!(host = %envelope.from_name, "joined via first user list");
            shared.events.publish_room_state(true);
        }
        shared.events.publish_user_list(list);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Leave
// ---------------------------------------------------------------------------

/// Departure notices. An ordinary member's leave shrinks the directory; a
/// host's leave ends the session for every client.
struct LeaveHandler;

enum Departure {
    Ignored,
    HostLeft,
    MemberLeft {
        names: Vec<String>,
        notice: Option<(Envelope, Vec<SocketAddr>)>,
    },
}

impl Handler for LeaveHandler {
    fn kind(&self) -> MessageKind {
        MessageKind::Leave
    }

    fn handle(&self, shared: &Shared, envelope: Envelope) -> Result<(), RoomcastError> {
        let departure = {
            let mut roster = shared.roster();
            if roster.phase() == RoomPhase::Idle {
                Departure::Ignored
            } else {
                let host_left = !roster.phase().is_host()
                    && roster.host_name() == Some(envelope.from_name.as_str());
                roster.remove(&envelope.from_name);

                if host_left {
                    roster.reset();
                    Departure::HostLeft
                } else {
                    let names = roster.member_names();
                    let notice = if roster.phase().is_host() {
                        roster.identity().cloned().map(|id| {
                            let notice = Envelope::new(
                                MessageKind::System,
                                id.user_name.as_str(),
                                id.local_ip,
                                id.local_port,
                            )
                            .content(format!("{} left the room", envelope.from_name));
                            let targets = roster
                                .members_except(&id.user_name)
                                .iter()
                                .map(Member::addr)
                                .collect();
                            (notice, targets)
                        })
                    } else {
                        None
                    };
                    Departure::MemberLeft { names, notice }
                }
            }
        };

        match departure {
            Departure::Ignored => {
                debug!(from = %envelope.from_name, "leave outside a room, ignored");
            }
            Departure::HostLeft => {
                // Host departure ends the session unconditionally.
                info!(host = %envelope.from_name, "host closed the room");
                if let Some(transport) = shared.take_transport() {
                    transport.stop();
                }
                shared.events.publish_room_state(false);
                shared.events.publish_user_list(Vec::new());
            }
            Departure::MemberLeft { names, notice } => {
                info!(member = %envelope.from_name, remaining = names.len(), "member left");
                shared.events.publish_user_list(names);
                if let Some((notice, targets)) = notice {
                    shared.events.publish_message(notice.clone());
                    for addr in targets {
                        shared.send(&notice, addr);
                    }
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Private
// ---------------------------------------------------------------------------

/// Direct messages. Published only when this process is a party to the
/// conversation; anything misrouted is dropped.
struct PrivateHandler;

impl Handler for PrivateHandler {
    fn kind(&self) -> MessageKind {
        MessageKind::Private
    }

    fn handle(&self, shared: &Shared, envelope: Envelope) -> Result<(), RoomcastError> {
        let involved = {
            let roster = shared.roster();
            let me = roster.user_name();
            me.is_some()
                && (me == Some(envelope.to_name.as_str())
                    || me == Some(envelope.from_name.as_str()))
        };

        if involved {
            shared.events.publish_message(envelope);
        } else {
            debug!(
                from = %envelope.from_name,
                to = %envelope.to_name,
                "private message not addressed to us, dropped"
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

/// Host notices (welcomes, departures). Display only.
struct SystemHandler;

impl Handler for SystemHandler {
    fn kind(&self) -> MessageKind {
        MessageKind::System
    }

    fn handle(&self, shared: &Shared, envelope: Envelope) -> Result<(), RoomcastError> {
        shared.events.publish_message(envelope);
        Ok(())
    }
}

// =========================================================================
// Tests
// =========================================================================
