//! Integration tests for the room node: full join/chat/leave flows over
//! real loopback sockets, plus raw-socket peers that exercise the wire
//! protocol directly.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::timeout;

use roomcast::prelude::*;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

// =========================================================================
// Helpers
// =========================================================================

/// A node plus a channel collecting every event it publishes.
struct TestPeer {
    node: RoomNode,
    events: mpsc::UnboundedReceiver<RoomEvent>,
}

fn peer() -> TestPeer {
    let node = RoomNode::new();
    let (tx, rx) = mpsc::unbounded_channel();
    node.subscribe(move |event| {
        let _ = tx.send(event);
    });
    TestPeer { node, events: rx }
}

impl TestPeer {
    async fn next_event(&mut self) -> RoomEvent {
        timeout(Duration::from_secs(2), self.events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed")
    }

    async fn wait_for(&mut self, mut matches: impl FnMut(&RoomEvent) -> bool) -> RoomEvent {
        loop {
            let event = self.next_event().await;
            if matches(&event) {
                return event;
            }
        }
    }

    async fn wait_until_in_room(&mut self) {
        self.wait_for(|e| matches!(e, RoomEvent::RoomState(true)))
            .await;
    }

    /// Discards everything already queued, so later assertions see only
    /// what the test itself provokes.
    fn drain_events(&mut self) {
        while self.events.try_recv().is_ok() {}
    }

    /// Counts queued chat messages from `from` after letting traffic settle.
    async fn settled_chat_count(&mut self, from: &str) -> usize {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let mut count = 0;
        while let Ok(event) = self.events.try_recv() {
            if let RoomEvent::Message(env) = &event {
                if env.kind == MessageKind::Chat && env.from_name == from {
                    count += 1;
                }
            }
        }
        count
    }
}

async fn start_host(name: &str) -> (TestPeer, u16) {
    let mut host = peer();
    host.node.create_room(name, 0).await.expect("create_room");
    host.wait_until_in_room().await;
    let port = host.node.local_addr().expect("bound").port();
    (host, port)
}

async fn join(name: &str, host_port: u16) -> TestPeer {
    let mut client = peer();
    client
        .node
        .join_room(name, 0, LOCALHOST, host_port)
        .await
        .expect("join_room");
    client.wait_until_in_room().await;
    client
}

async fn recv_raw(socket: &UdpSocket) -> Envelope {
    let mut buf = [0u8; 2048];
    let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .expect("timed out waiting for a datagram")
        .expect("recv_from failed");
    serde_json::from_slice(&buf[..len]).expect("datagram should decode as an envelope")
}

// =========================================================================
// Room creation
// =========================================================================

#[tokio::test]
async fn test_create_room_establishes_host_role() {
    let (host, _port) = start_host("harriet").await;

    assert!(host.node.is_in_room());
    assert!(host.node.is_host());
    assert_eq!(host.node.user_name().as_deref(), Some("harriet"));
    assert_eq!(host.node.host_name().as_deref(), Some("harriet"));
    assert_eq!(host.node.user_list(), vec!["harriet"]);
}

#[tokio::test]
async fn test_create_room_publishes_joined_then_directory() {
    let mut host = peer();
    host.node.create_room("harriet", 0).await.unwrap();

    assert!(matches!(host.next_event().await, RoomEvent::RoomState(true)));
    match host.next_event().await {
        RoomEvent::UserList(names) => assert_eq!(names, vec!["harriet"]),
        other => panic!("expected UserList, got {other:?}"),
    }
}

#[tokio::test]
async fn test_create_room_rejects_blank_name() {
    let host = peer();
    let err = host.node.create_room("   ", 0).await;
    assert!(matches!(
        err,
        Err(RoomcastError::Room(RoomError::EmptyName))
    ));
    assert!(!host.node.is_in_room());
}

#[tokio::test]
async fn test_bind_failure_aborts_creation_with_no_partial_state() {
    let (_host, port) = start_host("harriet").await;

    let second = peer();
    let err = second.node.create_room("impostor", port).await;
    assert!(matches!(
        err,
        Err(RoomcastError::Transport(TransportError::Bind { .. }))
    ));
    assert!(!second.node.is_in_room());
    assert!(second.node.user_name().is_none());
    assert!(second.node.user_list().is_empty());
}

#[tokio::test]
async fn test_second_create_while_in_room_is_rejected() {
    let (host, _port) = start_host("harriet").await;
    let err = host.node.create_room("harriet", 0).await;
    assert!(matches!(
        err,
        Err(RoomcastError::Room(RoomError::AlreadyInRoom(_)))
    ));
}

// =========================================================================
// Join protocol
// =========================================================================

#[tokio::test]
async fn test_join_yields_symmetric_directories() {
    let (mut host, port) = start_host("harriet").await;
    let alice = join("alice", port).await;

    // The host publishes its refreshed directory when the join lands.
    host.wait_for(|e| matches!(e, RoomEvent::UserList(names) if names.len() == 2))
        .await;

    assert_eq!(host.node.user_list(), vec!["alice", "harriet"]);
    assert_eq!(alice.node.user_list(), vec!["alice", "harriet"]);
    assert_eq!(alice.node.host_name().as_deref(), Some("harriet"));
    assert!(alice.node.is_in_room());
    assert!(!alice.node.is_host());
    assert!(host.node.is_host());
}

#[tokio::test]
async fn test_join_with_explicit_ports() {
    // The common deployment shape: a well-known host port, a chosen
    // client port.
    let mut host = peer();
    host.node.create_room("harriet", 19742).await.unwrap();
    host.wait_until_in_room().await;

    let mut alice = peer();
    alice
        .node
        .join_room("alice", 19743, LOCALHOST, 19742)
        .await
        .unwrap();
    alice.wait_until_in_room().await;

    assert_eq!(alice.node.local_addr().unwrap().port(), 19743);
    assert_eq!(alice.node.user_list(), vec!["alice", "harriet"]);
}

#[tokio::test]
async fn test_client_receives_welcome_and_user_list() {
    let (_host, port) = start_host("harriet").await;
    let mut alice = join("alice", port).await;

    let welcome = alice
        .wait_for(|e| matches!(e, RoomEvent::Message(env) if env.kind == MessageKind::System))
        .await;
    match welcome {
        RoomEvent::Message(env) => {
            assert!(env.content.contains("alice"));
            assert_eq!(env.from_name, "harriet");
        }
        _ => unreachable!(),
    }

    alice
        .wait_for(|e| matches!(e, RoomEvent::UserList(names) if names.len() == 2))
        .await;
}

#[tokio::test]
async fn test_host_answers_join_with_ack_welcome_and_user_list() {
    // A raw socket plays the client to pin the host's wire behavior.
    let (host, port) = start_host("harriet").await;

    let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let raw_port = raw.local_addr().unwrap().port();
    let request = Envelope::new(MessageKind::Join, "alice", LOCALHOST, raw_port)
        .content("Request to join");
    raw.send_to(&serde_json::to_vec(&request).unwrap(), ("127.0.0.1", port))
        .await
        .unwrap();

    // Loopback keeps these in order: ack, welcome, user list.
    let ack = recv_raw(&raw).await;
    assert_eq!(ack.kind, MessageKind::Join);
    assert_eq!(ack.content, HOST_ACK);
    assert_eq!(ack.from_name, "harriet");
    assert_eq!(ack.to_name, "alice");

    let welcome = recv_raw(&raw).await;
    assert_eq!(welcome.kind, MessageKind::System);
    assert!(welcome.content.contains("alice"));

    let list = recv_raw(&raw).await;
    assert_eq!(list.kind, MessageKind::UserList);
    assert_eq!(list.content, "alice,harriet");

    assert_eq!(host.node.user_list(), vec!["alice", "harriet"]);
}

#[tokio::test]
async fn test_first_user_list_completes_the_join_without_an_ack() {
    // A fake host that never sends the acknowledgment, only a user list.
    // The first list while still awaiting must count as join success.
    let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let fake_port = raw.local_addr().unwrap().port();

    let mut alice = peer();
    alice
        .node
        .join_room("alice", 0, LOCALHOST, fake_port)
        .await
        .unwrap();

    let mut buf = [0u8; 2048];
    let (len, client_addr) = timeout(Duration::from_secs(2), raw.recv_from(&mut buf))
        .await
        .expect("fake host should receive the join request")
        .unwrap();
    let request: Envelope = serde_json::from_slice(&buf[..len]).unwrap();
    assert_eq!(request.kind, MessageKind::Join);

    let list = Envelope::new(MessageKind::UserList, "harriet", LOCALHOST, fake_port)
        .content("harriet,alice");
    raw.send_to(&serde_json::to_vec(&list).unwrap(), client_addr)
        .await
        .unwrap();

    alice.wait_until_in_room().await;
    assert!(alice.node.is_in_room());
    assert!(!alice.node.is_host());
    assert_eq!(alice.node.host_name().as_deref(), Some("harriet"));
    assert_eq!(alice.node.user_list(), vec!["alice", "harriet"]);
}

// =========================================================================
// Chat relay
// =========================================================================

#[tokio::test]
async fn test_client_chat_is_relayed_to_other_clients_exactly_once() {
    let (mut host, port) = start_host("harriet").await;
    let mut alice = join("alice", port).await;
    let mut bob = join("bob", port).await;

    // Let the join chatter settle before counting chat traffic.
    tokio::time::sleep(Duration::from_millis(200)).await;
    host.drain_events();
    alice.drain_events();
    bob.drain_events();

    alice.node.send_chat_message("hi", None);

    // The host sees it and relays; bob gets exactly one copy.
    let received = bob
        .wait_for(|e| matches!(e, RoomEvent::Message(env) if env.kind == MessageKind::Chat))
        .await;
    match received {
        RoomEvent::Message(env) => {
            assert_eq!(env.from_name, "alice");
            assert_eq!(env.content, "hi");
        }
        _ => unreachable!(),
    }
    assert_eq!(bob.settled_chat_count("alice").await, 0);

    host.wait_for(|e| matches!(e, RoomEvent::Message(env) if env.kind == MessageKind::Chat))
        .await;

    // Alice saw her own message once, from the local publish; the host
    // must not echo it back to her.
    assert_eq!(alice.settled_chat_count("alice").await, 1);
}

#[tokio::test]
async fn test_host_chat_reaches_every_client() {
    let (mut host, port) = start_host("harriet").await;
    let mut alice = join("alice", port).await;
    let mut bob = join("bob", port).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    host.drain_events();
    alice.drain_events();
    bob.drain_events();

    host.node.send_chat_message("welcome all", None);

    for client in [&mut alice, &mut bob] {
        let received = client
            .wait_for(|e| matches!(e, RoomEvent::Message(env) if env.kind == MessageKind::Chat))
            .await;
        match received {
            RoomEvent::Message(env) => {
                assert_eq!(env.from_name, "harriet");
                assert_eq!(env.content, "welcome all");
            }
            _ => unreachable!(),
        }
    }
    // The host's own copy came from the local publish only.
    assert_eq!(host.settled_chat_count("harriet").await, 1);
}

#[tokio::test]
async fn test_chat_outside_a_room_is_a_no_op() {
    let mut lonely = peer();
    lonely.node.send_chat_message("anyone?", None);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(lonely.events.try_recv().is_err());
}

// =========================================================================
// Private messages
// =========================================================================

#[tokio::test]
async fn test_private_message_goes_directly_to_the_target() {
    let (mut host, port) = start_host("harriet").await;
    let mut alice = join("alice", port).await;
    let mut bob = join("bob", port).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    host.drain_events();
    alice.drain_events();
    bob.drain_events();

    host.node.send_chat_message("between us", Some("alice"));

    let received = alice
        .wait_for(|e| matches!(e, RoomEvent::Message(env) if env.kind == MessageKind::Private))
        .await;
    match received {
        RoomEvent::Message(env) => {
            assert_eq!(env.from_name, "harriet");
            assert_eq!(env.to_name, "alice");
            assert_eq!(env.content, "between us");
        }
        _ => unreachable!(),
    }

    // Not a party to the conversation: bob hears nothing.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(bob.events.try_recv().is_err());
}

#[tokio::test]
async fn test_private_to_unknown_target_sends_nothing_and_publishes_nothing() {
    let (mut host, _port) = start_host("harriet").await;
    host.drain_events();

    host.node.send_chat_message("hello?", Some("ghost"));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(host.events.try_recv().is_err());
}

// =========================================================================
// Leaving
// =========================================================================

#[tokio::test]
async fn test_client_leave_updates_host_and_notifies_others() {
    let (mut host, port) = start_host("harriet").await;
    let alice = join("alice", port).await;
    let mut bob = join("bob", port).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    host.drain_events();
    bob.drain_events();

    alice.node.leave_room();

    host.wait_for(|e| matches!(e, RoomEvent::UserList(names) if names.len() == 2))
        .await;
    assert_eq!(host.node.user_list(), vec!["bob", "harriet"]);

    // The host turns the departure into a system notice for the others.
    let notice = bob
        .wait_for(|e| matches!(e, RoomEvent::Message(env) if env.kind == MessageKind::System))
        .await;
    match notice {
        RoomEvent::Message(env) => assert!(env.content.contains("alice")),
        _ => unreachable!(),
    }

    assert!(!alice.node.is_in_room());
    assert!(alice.node.user_list().is_empty());
}

#[tokio::test]
async fn test_host_departure_ends_the_session_for_all_clients() {
    let (host, port) = start_host("harriet").await;
    let mut alice = join("alice", port).await;
    let mut bob = join("bob", port).await;

    host.node.leave_room();

    for client in [&mut alice, &mut bob] {
        client
            .wait_for(|e| matches!(e, RoomEvent::RoomState(false)))
            .await;
        assert!(!client.node.is_in_room());
        assert!(client.node.user_list().is_empty());
        assert!(client.node.host_name().is_none());
    }
    assert!(!host.node.is_in_room());
}

#[tokio::test]
async fn test_leave_room_is_idempotent() {
    let (_host, port) = start_host("harriet").await;
    let mut alice = join("alice", port).await;
    alice.drain_events();

    alice.node.leave_room();
    alice.node.leave_room();

    tokio::time::sleep(Duration::from_millis(200)).await;
    let mut closed_events = 0;
    while let Ok(event) = alice.events.try_recv() {
        if matches!(event, RoomEvent::RoomState(false)) {
            closed_events += 1;
        }
    }
    assert_eq!(closed_events, 1);
}

#[tokio::test]
async fn test_leave_before_joining_is_a_no_op() {
    let mut idle = peer();
    idle.node.leave_room();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(idle.events.try_recv().is_err());
    assert!(!idle.node.is_in_room());
}

#[tokio::test]
async fn test_room_can_be_rejoined_after_leaving() {
    let (_host, port) = start_host("harriet").await;
    let mut alice = join("alice", port).await;

    alice.node.leave_room();
    alice
        .wait_for(|e| matches!(e, RoomEvent::RoomState(false)))
        .await;

    // Same node object, fresh membership.
    alice
        .node
        .join_room("alice", 0, LOCALHOST, port)
        .await
        .expect("rejoin");
    alice.wait_until_in_room().await;
    assert!(alice.node.is_in_room());
    assert_eq!(alice.node.user_list(), vec!["alice", "harriet"]);
}

// =========================================================================
// Malformed traffic
// =========================================================================

#[tokio::test]
async fn test_garbage_datagram_surfaces_one_error_and_leaves_the_room_intact() {
    let (mut host, port) = start_host("harriet").await;
    host.drain_events();

    let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    raw.send_to(b"not an envelope at all", ("127.0.0.1", port))
        .await
        .unwrap();

    host.wait_for(|e| matches!(e, RoomEvent::Error(_))).await;
    assert!(host.node.is_in_room());
    assert_eq!(host.node.user_list(), vec!["harriet"]);
}
