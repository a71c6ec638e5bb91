//! `RoomNode`: the public face of the chat room core.
//!
//! A node ties the layers together: one [`UdpTransport`] (bound per room
//! membership), one [`Dispatcher`] owning all state mutation, the message
//! [`Router`](crate::handler::Router), the [`Roster`], and the
//! [`EventBus`] collaborators subscribe to.
//!
//! Every state-changing operation is marshaled onto the dispatcher, so
//! calls are safe from any task or thread. `create_room`/`join_room` are
//! async only because binding the socket is; everything after the bind
//! runs on the dispatcher like the rest of the protocol.

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use roomcast_dispatch::Dispatcher;
use roomcast_protocol::{Envelope, MessageKind};
use roomcast_room::{
    EventBus, Identity, Member, RoomError, RoomEvent, RoomPhase, Roster, SubscriptionId,
};
use roomcast_transport::{Consumer, TransportError, UdpTransport, local_ip};

use crate::RoomcastError;
use crate::handler::Router;

/// State shared between the facade, the dispatcher tasks, and the
/// transport consumer.
///
/// The roster mutex is never contended in practice: it is only locked
/// from dispatched tasks (serialized by design) and from the read-only
/// accessors. It exists so the accessors stay safe, not as a concurrency
/// mechanism.
pub(crate) struct Shared {
    pub(crate) roster: Mutex<Roster>,
    pub(crate) transport: Mutex<Option<Arc<UdpTransport>>>,
    pub(crate) events: EventBus,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) router: Router,
}

impl Shared {
    pub(crate) fn new(router: Router) -> Self {
        Self {
            roster: Mutex::new(Roster::new()),
            transport: Mutex::new(None),
            events: EventBus::new(),
            dispatcher: Arc::new(Dispatcher::new()),
            router,
        }
    }

    pub(crate) fn roster(&self) -> MutexGuard<'_, Roster> {
        self.roster.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_transport(&self) -> Option<Arc<UdpTransport>> {
        self.transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn install_transport(&self, transport: Arc<UdpTransport>) {
        let previous = self
            .transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(transport);
        if let Some(previous) = previous {
            // Can only happen if a stale transport survived a teardown.
            warn!("replacing a transport that was never stopped");
            previous.stop();
        }
    }

    pub(crate) fn take_transport(&self) -> Option<Arc<UdpTransport>> {
        self.transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Sends through the current transport, if one is bound. Between a
    /// teardown and the next create/join there is none; envelopes are
    /// dropped silently then, matching the fire-and-forget contract.
    pub(crate) fn send(&self, envelope: &Envelope, addr: SocketAddr) {
        match self.current_transport() {
            Some(transport) => transport.send(envelope, addr),
            None => debug!(%addr, kind = %envelope.kind, "send with no transport bound, dropped"),
        }
    }
}

/// Funnel from the transport's receive task into the dispatcher. Holds a
/// weak reference so a dropped node does not keep itself alive through
/// its own socket.
struct NodeConsumer {
    shared: Weak<Shared>,
}

impl Consumer for NodeConsumer {
    fn deliver(&self, envelope: Envelope) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let captured = Arc::clone(&shared);
        shared.dispatcher.enqueue(move || {
            captured.router.dispatch(&captured, envelope);
        });
    }

    fn fault(&self, error: TransportError) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let captured = Arc::clone(&shared);
        shared.dispatcher.enqueue(move || {
            captured.events.publish_error(error.to_string());
        });
    }
}

/// One process's handle on (at most) one chat room.
///
/// Construct once, subscribe to events, then `create_room` or `join_room`.
/// All four event channels fire on the dispatcher context, in the order
/// the protocol handlers publish them.
pub struct RoomNode {
    shared: Arc<Shared>,
    pump: JoinHandle<()>,
}

impl RoomNode {
    /// Creates an idle node. Must be called within a Tokio runtime; the
    /// dispatcher pump starts immediately.
    pub fn new() -> Self {
        let shared = Arc::new(Shared::new(Router::with_default_handlers()));

        let pump = tokio::spawn({
            let shared = Arc::clone(&shared);
            async move {
                loop {
                    shared.dispatcher.wait().await;
                    shared.dispatcher.drain();
                }
            }
        });

        Self { shared, pump }
    }

    // -- event subscriptions ------------------------------------------------

    /// Registers an observer for all four notification channels.
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(RoomEvent) + Send + Sync + 'static,
    {
        self.shared.events.subscribe(observer)
    }

    /// Removes a previously registered observer.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.shared.events.unsubscribe(id);
    }

    // -- room lifecycle ------------------------------------------------------

    /// Creates a room, binding `port` and acting as its host.
    ///
    /// On success the node publishes room-joined followed by the (trivial)
    /// directory. A bind failure aborts the creation with no identity or
    /// role state left behind.
    ///
    /// # Errors
    /// [`RoomError::EmptyName`], [`RoomError::AlreadyInRoom`], or
    /// [`TransportError::Bind`] wrapped in [`RoomcastError`].
    pub async fn create_room(&self, user_name: &str, port: u16) -> Result<(), RoomcastError> {
        let user_name = validated_name(user_name)?;
        self.ensure_idle()?;

        let transport = self.bind_transport(port).await?;
        let identity = Identity {
            user_name,
            local_ip: local_ip(),
            local_port: transport.local_addr().port(),
        };

        let shared = Arc::clone(&self.shared);
        self.shared.dispatcher.enqueue(move || {
            let outcome = {
                let mut roster = shared.roster();
                roster.begin_hosting(identity.clone())
            };
            match outcome {
                Ok(()) => {
                    shared.install_transport(transport);
                    info!(user = %identity.user_name, port = identity.local_port, "room created");
                    shared.events.publish_room_state(true);
                    let names = shared.roster().member_names();
                    shared.events.publish_user_list(names);
                }
                Err(error) => {
                    // Lost a race with a concurrent create/join.
                    transport.stop();
                    warn!(%error, "create_room aborted");
                    shared.events.publish_error(error.to_string());
                }
            }
        });
        Ok(())
    }

    /// Joins the room hosted at `host_ip:host_port`, binding `local_port`
    /// locally (0 for an ephemeral port) and sending one join request.
    ///
    /// Success is not claimed here: the node transitions to in-room only
    /// when the host acknowledges (or its first user list arrives), which
    /// is published as a room-state event.
    ///
    /// # Errors
    /// Same taxonomy as [`create_room`](Self::create_room).
    pub async fn join_room(
        &self,
        user_name: &str,
        local_port: u16,
        host_ip: IpAddr,
        host_port: u16,
    ) -> Result<(), RoomcastError> {
        let user_name = validated_name(user_name)?;
        self.ensure_idle()?;

        let transport = self.bind_transport(local_port).await?;
        let identity = Identity {
            user_name,
            local_ip: local_ip(),
            local_port: transport.local_addr().port(),
        };
        let host_addr = SocketAddr::new(host_ip, host_port);

        let shared = Arc::clone(&self.shared);
        self.shared.dispatcher.enqueue(move || {
            let outcome = {
                let mut roster = shared.roster();
                roster.begin_joining(identity.clone(), host_addr)
            };
            match outcome {
                Ok(()) => {
                    let request = Envelope::new(
                        MessageKind::Join,
                        identity.user_name.as_str(),
                        identity.local_ip,
                        identity.local_port,
                    )
                    .content("Request to join");
                    transport.send(&request, host_addr);
                    shared.install_transport(transport);
                    info!(user = %identity.user_name, %host_addr, "join request sent");
                }
                Err(error) => {
                    transport.stop();
                    warn!(%error, "join_room aborted");
                    shared.events.publish_error(error.to_string());
                }
            }
        });
        Ok(())
    }

    /// Leaves the room. Idempotent and safe from any state: outside a room
    /// this is a no-op, and the departure side effects (leave envelopes,
    /// directory clear, room-closed event) happen at most once.
    ///
    /// A client notifies only the host; a host notifies every other
    /// member, which ends the session on each of them.
    pub fn leave_room(&self) {
        let shared = Arc::clone(&self.shared);
        self.shared.dispatcher.enqueue(move || {
            let departure = {
                let mut roster = shared.roster();
                if roster.phase() == RoomPhase::Idle {
                    None
                } else {
                    let is_host = roster.phase().is_host();
                    let identity = roster.identity().cloned();
                    let targets: Vec<SocketAddr> = match (&identity, is_host) {
                        (Some(id), true) => roster
                            .members_except(&id.user_name)
                            .iter()
                            .map(Member::addr)
                            .collect(),
                        _ => roster.host_addr().into_iter().collect(),
                    };
                    roster.reset();
                    identity.map(|identity| (identity, is_host, targets))
                }
            };

            let Some((identity, is_host, targets)) = departure else {
                debug!("leave_room outside a room is a no-op");
                return;
            };

            let content = if is_host {
                "host closed the room"
            } else {
                "left the room"
            };
            let leave = Envelope::new(
                MessageKind::Leave,
                identity.user_name.as_str(),
                identity.local_ip,
                identity.local_port,
            )
            .content(content);

            if let Some(transport) = shared.take_transport() {
                for addr in &targets {
                    transport.send(&leave, *addr);
                }
                transport.stop();
            }

            info!(user = %identity.user_name, host = is_host, "left the room");
            shared.events.publish_room_state(false);
            shared.events.publish_user_list(Vec::new());
        });
    }

    // -- messaging -----------------------------------------------------------

    /// Sends chat. With no `target`, public chat: published locally first
    /// (the sender never gets a network echo of its own message), then one
    /// envelope to the host for relaying, or directly to every member when
    /// this node is the host.
    ///
    /// With a `target`, a private message: resolved against the directory
    /// and sent as a single direct datagram, bypassing the host. An absent
    /// target is a logged no-op: no send, no event. Outside a room the
    /// whole call is a logged no-op.
    pub fn send_chat_message(&self, content: &str, target: Option<&str>) {
        let content = content.to_string();
        let target = target.map(str::to_string);
        let shared = Arc::clone(&self.shared);

        self.shared.dispatcher.enqueue(move || {
            let plan = {
                let roster = shared.roster();
                if !roster.phase().is_in_room() {
                    warn!("send_chat_message while not in a room, dropped");
                    return;
                }
                let Some(identity) = roster.identity().cloned() else {
                    return;
                };
                match target {
                    Some(to) => plan_private(&roster, &identity, to, content),
                    None => Some(plan_public(&roster, &identity, content)),
                }
            };

            let Some((envelope, targets)) = plan else {
                return;
            };

            // Local publish happens through the same handlers as received
            // traffic, so the sender's own log entry and the host's
            // relay-on-behalf-of-clients share one code path.
            shared.router.dispatch(&shared, envelope.clone());
            for addr in targets {
                shared.send(&envelope, addr);
            }
        });
    }

    // -- read-only accessors ---------------------------------------------------

    /// `true` once membership is established (host or client).
    pub fn is_in_room(&self) -> bool {
        self.shared.roster().phase().is_in_room()
    }

    /// `true` if this node hosts its room.
    pub fn is_host(&self) -> bool {
        self.shared.roster().phase().is_host()
    }

    /// The local user's name, while identified.
    pub fn user_name(&self) -> Option<String> {
        self.shared.roster().user_name().map(str::to_string)
    }

    /// The recorded host's name. For a client this is populated only after
    /// the host acknowledged the join.
    pub fn host_name(&self) -> Option<String> {
        self.shared.roster().host_name().map(str::to_string)
    }

    /// Sorted names of everyone in the directory.
    pub fn user_list(&self) -> Vec<String> {
        self.shared.roster().member_names()
    }

    /// The bound local address, while a transport is up. Useful with
    /// port 0 to learn the OS-assigned port.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.current_transport().map(|t| t.local_addr())
    }

    // -- internals -------------------------------------------------------------

    fn ensure_idle(&self) -> Result<(), RoomcastError> {
        let phase = self.shared.roster().phase();
        if phase.can_begin() {
            Ok(())
        } else {
            Err(RoomError::AlreadyInRoom(phase).into())
        }
    }

    async fn bind_transport(&self, port: u16) -> Result<Arc<UdpTransport>, RoomcastError> {
        let consumer = Arc::new(NodeConsumer {
            shared: Arc::downgrade(&self.shared),
        });
        let transport = UdpTransport::bind(port, consumer).await?;
        Ok(Arc::new(transport))
    }
}

impl Default for RoomNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RoomNode {
    fn drop(&mut self) {
        self.pump.abort();
        if let Some(transport) = self.shared.take_transport() {
            transport.stop();
        }
    }
}

fn validated_name(user_name: &str) -> Result<String, RoomcastError> {
    let trimmed = user_name.trim();
    if trimmed.is_empty() {
        return Err(RoomError::EmptyName.into());
    }
    Ok(trimmed.to_string())
}

fn plan_public(
    roster: &Roster,
    identity: &Identity,
    content: String,
) -> (Envelope, Vec<SocketAddr>) {
    let envelope = Envelope::new(
        MessageKind::Chat,
        identity.user_name.as_str(),
        identity.local_ip,
        identity.local_port,
    )
    .content(content);

    let targets = if roster.phase().is_host() {
        // The host's own chat goes out directly, once per member.
        roster
            .members_except(&identity.user_name)
            .iter()
            .map(Member::addr)
            .collect()
    } else {
        // A client sends exactly one envelope, to the host, which relays.
        roster.host_addr().into_iter().collect()
    };
    (envelope, targets)
}

fn plan_private(
    roster: &Roster,
    identity: &Identity,
    to: String,
    content: String,
) -> Option<(Envelope, Vec<SocketAddr>)> {
    let envelope = Envelope::new(
        MessageKind::Private,
        identity.user_name.as_str(),
        identity.local_ip,
        identity.local_port,
    )
    .to(to.as_str())
    .content(content);

    if to == identity.user_name {
        // Talking to ourselves still shows up in the log, but there is no
        // point crossing the network for it.
        return Some((envelope, Vec::new()));
    }
    match roster.member(&to) {
        Some(member) => Some((envelope, vec![member.addr()])),
        None => {
            warn!(to = %to, "private target not in the directory, dropped");
            None
        }
    }
}
