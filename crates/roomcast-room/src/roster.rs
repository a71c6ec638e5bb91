//! The membership directory and role/identity state.
//!
//! `Roster` is plain data with no locking of its own. It is owned by the
//! node and only ever mutated from dispatched tasks, so the single-writer
//! rule lives one layer up; keeping this type synchronous makes it
//! trivially testable.

use std::collections::HashMap;
use std::net::SocketAddr;

use tracing::{debug, warn};

use crate::{Identity, Member, RoomError, RoomPhase};

/// Membership directory plus the local role and host bookkeeping for one
/// room. Invariant: while in a room, the directory contains the local
/// identity.
#[derive(Debug, Default)]
pub struct Roster {
    identity: Option<Identity>,
    phase: RoomPhase,
    host_name: Option<String>,
    host_addr: Option<SocketAddr>,
    directory: HashMap<String, Member>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    // -- read access ------------------------------------------------------

    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn user_name(&self) -> Option<&str> {
        self.identity.as_ref().map(|id| id.user_name.as_str())
    }

    pub fn host_name(&self) -> Option<&str> {
        self.host_name.as_deref()
    }

    pub fn host_addr(&self) -> Option<SocketAddr> {
        self.host_addr
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.directory.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.directory.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.directory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directory.is_empty()
    }

    /// All member names, sorted for stable display and test output.
    pub fn member_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.directory.keys().cloned().collect();
        names.sort();
        names
    }

    /// Every member except `name`, in arbitrary order. The usual send
    /// fan-out: everyone but the local user or the original sender.
    pub fn members_except(&self, name: &str) -> Vec<Member> {
        self.directory
            .values()
            .filter(|m| m.name != name)
            .cloned()
            .collect()
    }

    // -- lifecycle ---------------------------------------------------------

    /// Starts a room as its host: `Idle -> Hosting`, with the local user
    /// as the sole member and recorded host.
    pub fn begin_hosting(&mut self, identity: Identity) -> Result<(), RoomError> {
        if !self.phase.can_begin() {
            return Err(RoomError::AlreadyInRoom(self.phase));
        }
        let me = identity.as_member();
        self.host_name = Some(identity.user_name.clone());
        self.host_addr = Some(me.addr());
        self.identity = Some(identity);
        self.phase = RoomPhase::Hosting;
        self.directory.clear();
        self.directory.insert(me.name.clone(), me);
        Ok(())
    }

    /// Starts joining a room: `Idle -> AwaitingHostAck`. The host's
    /// address is known (we were told where to send the join request);
    /// its name is not, until it acknowledges.
    pub fn begin_joining(
        &mut self,
        identity: Identity,
        host_addr: SocketAddr,
    ) -> Result<(), RoomError> {
        if !self.phase.can_begin() {
            return Err(RoomError::AlreadyInRoom(self.phase));
        }
        let me = identity.as_member();
        self.identity = Some(identity);
        self.phase = RoomPhase::AwaitingHostAck;
        self.host_name = None;
        self.host_addr = Some(host_addr);
        self.directory.clear();
        self.directory.insert(me.name.clone(), me);
        Ok(())
    }

    /// Accepts a host identity while awaiting one: records the name,
    /// replaces the assumed host address with the observed one, inserts
    /// the host into the directory, and completes the join.
    ///
    /// Once joined, a *different* host identity is ignored (the first one
    /// won); a repeat of the same identity refreshes its address.
    pub fn adopt_host(&mut self, host: Member) {
        match self.phase {
            RoomPhase::AwaitingHostAck => {
                debug!(host = %host.name, addr = %host.addr(), "host adopted");
                self.host_name = Some(host.name.clone());
                self.host_addr = Some(host.addr());
                self.directory.insert(host.name.clone(), host);
                self.phase = RoomPhase::Joined;
            }
            RoomPhase::Joined => {
                if self.host_name.as_deref() == Some(host.name.as_str()) {
                    self.host_addr = Some(host.addr());
                    self.directory.insert(host.name.clone(), host);
                } else {
                    warn!(
                        offered = %host.name,
                        recorded = self.host_name.as_deref().unwrap_or(""),
                        "conflicting host identity ignored"
                    );
                }
            }
            RoomPhase::Idle | RoomPhase::Hosting => {
                warn!(phase = %self.phase, "adopt_host outside a client join, ignored");
            }
        }
    }

    /// Inserts or replaces a directory entry (last writer wins).
    pub fn insert(&mut self, member: Member) {
        self.directory.insert(member.name.clone(), member);
    }

    /// Removes a member by name.
    pub fn remove(&mut self, name: &str) -> Option<Member> {
        self.directory.remove(name)
    }

    /// Re-inserts the local identity if something removed it. Upholds the
    /// "self is always present while in a room" invariant after applying
    /// an externally supplied user list.
    pub fn ensure_self(&mut self) {
        if let Some(identity) = &self.identity {
            if !self.directory.contains_key(&identity.user_name) {
                let me = identity.as_member();
                self.directory.insert(me.name.clone(), me);
            }
        }
    }

    /// Back to `Idle`: clears the directory, the identity, and all host
    /// bookkeeping.
    pub fn reset(&mut self) {
        self.identity = None;
        self.phase = RoomPhase::Idle;
        self.host_name = None;
        self.host_addr = None;
        self.directory.clear();
    }
}
