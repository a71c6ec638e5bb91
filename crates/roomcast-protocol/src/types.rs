//! Core wire types for the Roomcast protocol.
//!
//! Every UDP datagram carries exactly one serialized [`Envelope`]. There is
//! no length prefix and no multi-packet reassembly: an envelope either fits
//! in a single datagram or it cannot be sent at all.

use std::fmt;
use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Reserved [`Envelope::content`] value that marks a `Join` envelope as the
/// host's acknowledgment of a join request, rather than the request itself.
///
/// A joining client sends `Join` with arbitrary content; the host answers
/// with `Join` whose content is exactly this sentinel.
pub const HOST_ACK: &str = "HostResponse";

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// The protocol-level type tag of an envelope.
///
/// Each kind is routed to exactly one handler on the receiving side.
/// Serialized as the plain variant name (`"Chat"`, `"Join"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Public chat, relayed through the host.
    Chat,
    /// A join request (client to host) or, with [`HOST_ACK`] content,
    /// the host's acknowledgment (host to client).
    Join,
    /// A departure notice. Clients send it to the host only; a host sends
    /// it to every other member.
    Leave,
    /// A comma-delimited list of member names, broadcast by the host.
    UserList,
    /// A direct message between two members, bypassing the host.
    Private,
    /// A host-originated notice (welcome, departure announcements).
    System,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Chat => "Chat",
            Self::Join => "Join",
            Self::Leave => "Leave",
            Self::UserList => "UserList",
            Self::Private => "Private",
            Self::System => "System",
        };
        write!(f, "{name}")
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The single wire message. Immutable once constructed and sent.
///
/// `from_ip` deserves a warning: the value a sender puts on the wire is
/// *advisory only*. The receiving transport overwrites it with the UDP
/// source address of the datagram before anything else sees the envelope,
/// so protocol handlers can trust it as the sender's return address.
///
/// Unknown fields are rejected at decode time. Datagrams from foreign
/// protocols that happen to be valid JSON must not sneak through as
/// half-filled envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    /// Name of the sending member.
    pub from_name: String,

    /// Name of the addressed member. Empty means broadcast/undirected.
    #[serde(default)]
    pub to_name: String,

    /// Payload. Chat/Private text, a member-name list for `UserList`,
    /// or the [`HOST_ACK`] sentinel for a host acknowledgment.
    #[serde(default)]
    pub content: String,

    /// The type tag this envelope is routed by.
    pub kind: MessageKind,

    /// Unix milliseconds at construction. Informational only; never used
    /// for ordering.
    pub timestamp: i64,

    /// The sender's listening port, self-reported.
    pub from_port: u16,

    /// The sender's address as observed by the receiving transport.
    /// Whatever the sender wrote here is replaced on receipt.
    #[serde(default)]
    pub from_ip: String,
}

impl Envelope {
    /// Creates an envelope of the given kind with the sender's identity
    /// filled in and the timestamp stamped from the wall clock.
    pub fn new(
        kind: MessageKind,
        from_name: impl Into<String>,
        from_ip: IpAddr,
        from_port: u16,
    ) -> Self {
        Self {
            from_name: from_name.into(),
            to_name: String::new(),
            content: String::new(),
            kind,
            timestamp: unix_millis(),
            from_port,
            from_ip: from_ip.to_string(),
        }
    }

    /// Sets the addressed member name.
    pub fn to(mut self, to_name: impl Into<String>) -> Self {
        self.to_name = to_name.into();
        self
    }

    /// Sets the payload.
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// `true` if this is a `Join` envelope carrying the host-acknowledgment
    /// sentinel.
    pub fn is_host_ack(&self) -> bool {
        self.kind == MessageKind::Join && self.content == HOST_ACK
    }
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

// ---------------------------------------------------------------------------
// UserList payload helpers
// ---------------------------------------------------------------------------

/// Joins member names into the `UserList` wire payload.
///
/// Names are comma-delimited; the list carries names only, not addresses.
/// Receivers backfill addresses from the broadcasting packet's source,
/// which is only correct for host-originated broadcasts. A richer payload
/// carrying (name, ip, port) triples would fix that; the current format is
/// kept for parity with the rest of the protocol.
pub fn encode_user_list<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|n| n.as_ref())
        .collect::<Vec<_>>()
        .join(",")
}

/// Splits a `UserList` payload back into member names.
///
/// Empty segments (stray commas, empty payload) are dropped.
pub fn decode_user_list(content: &str) -> Vec<String> {
    content
        .split(',')
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;

    fn sample(kind: MessageKind) -> Envelope {
        Envelope::new(kind, "alice", IpAddr::V4(Ipv4Addr::LOCALHOST), 9100)
    }

    #[test]
    fn test_kind_serializes_as_variant_name() {
        let json = serde_json::to_string(&MessageKind::UserList).unwrap();
        assert_eq!(json, "\"UserList\"");
        let json = serde_json::to_string(&MessageKind::Chat).unwrap();
        assert_eq!(json, "\"Chat\"");
    }

    #[test]
    fn test_kind_display_matches_wire_name() {
        assert_eq!(MessageKind::Private.to_string(), "Private");
        assert_eq!(MessageKind::Join.to_string(), "Join");
    }

    #[test]
    fn test_envelope_json_shape() {
        let env = sample(MessageKind::Chat).to("bob").content("hi");
        let json: serde_json::Value = serde_json::to_value(&env).unwrap();

        assert_eq!(json["from_name"], "alice");
        assert_eq!(json["to_name"], "bob");
        assert_eq!(json["content"], "hi");
        assert_eq!(json["kind"], "Chat");
        assert_eq!(json["from_port"], 9100);
        assert_eq!(json["from_ip"], "127.0.0.1");
        assert!(json["timestamp"].is_i64());
    }

    #[test]
    fn test_envelope_round_trip() {
        let env = sample(MessageKind::Private).to("bob").content("psst");
        let bytes = serde_json::to_vec(&env).unwrap();
        let decoded: Envelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(env, decoded);
    }

    #[test]
    fn test_optional_fields_default_to_empty() {
        // A minimal join request carries no to_name and no from_ip.
        let json = r#"{
            "from_name": "alice",
            "content": "Request to join",
            "kind": "Join",
            "timestamp": 1700000000000,
            "from_port": 9100
        }"#;
        let env: Envelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.to_name, "");
        assert_eq!(env.from_ip, "");
        assert_eq!(env.kind, MessageKind::Join);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result: Result<Envelope, _> = serde_json::from_slice(b"\x00\x01hello");
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        let json = r#"{
            "from_name": "alice",
            "kind": "Teleport",
            "timestamp": 0,
            "from_port": 1
        }"#;
        let result: Result<Envelope, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_rejects_foreign_schema() {
        // Valid JSON from some other protocol must not half-decode.
        let json = r#"{
            "from_name": "alice",
            "kind": "Chat",
            "timestamp": 0,
            "from_port": 1,
            "hop_count": 3
        }"#;
        let result: Result<Envelope, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_host_ack_detection() {
        let ack = sample(MessageKind::Join).content(HOST_ACK);
        assert!(ack.is_host_ack());

        let request = sample(MessageKind::Join).content("Request to join");
        assert!(!request.is_host_ack());

        // The sentinel only counts on Join envelopes.
        let chat = sample(MessageKind::Chat).content(HOST_ACK);
        assert!(!chat.is_host_ack());
    }

    #[test]
    fn test_user_list_round_trip() {
        let names = vec!["alice".to_string(), "bob".to_string(), "carol".to_string()];
        let content = encode_user_list(&names);
        assert_eq!(content, "alice,bob,carol");
        assert_eq!(decode_user_list(&content), names);
    }

    #[test]
    fn test_user_list_single_name() {
        assert_eq!(encode_user_list(&["alice"]), "alice");
        assert_eq!(decode_user_list("alice"), vec!["alice".to_string()]);
    }

    #[test]
    fn test_user_list_drops_empty_segments() {
        assert_eq!(
            decode_user_list("alice,,bob,"),
            vec!["alice".to_string(), "bob".to_string()]
        );
        assert!(decode_user_list("").is_empty());
    }
}
