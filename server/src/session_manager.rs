//! Session management for connected clients
//!
//! This module handles the server-side bookkeeping of live connections:
//! - Session lifecycle (connect, disconnect, timeout)
//! - The session's world/player binding, set on join and cleared on leave
//! - Lobby subscriptions for world-listing notifications
//! - Connection health monitoring and automatic cleanup
//!
//! A session is ephemeral: it exists only while its connection is live and
//! carries no state worth persisting. The binding is a tagged variant so a
//! session cannot be half-joined.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// How long a session may stay silent before it is treated as disconnected.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(10);

/// The session's association with a world, set exactly once per join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionBinding {
    /// Connected but not in any world.
    Unjoined,
    /// Occupying `player_id` in `world_id`.
    Joined { world_id: String, player_id: String },
}

/// One live connection and its server-side state
///
/// Each session tracks:
/// - Connection metadata (ID, address, last activity)
/// - Its current world/player binding
/// - Whether it subscribed to lobby listing notifications
#[derive(Debug)]
pub struct Session {
    /// Unique session identifier assigned by the server
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this session
    pub last_seen: Instant,
    /// World/player association, cleared on leave and disconnect
    pub binding: SessionBinding,
    /// Whether this session wants world-listing change notifications
    pub in_lobby: bool,
}

impl Session {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            binding: SessionBinding::Unjoined,
            in_lobby: false,
        }
    }

    /// Refreshes the activity timestamp. Called for every inbound packet.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Returns true if no packets have arrived within the timeout window,
    /// indicating a likely disconnect.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all live sessions
///
/// The SessionManager provides centralized control over connections,
/// enforces the server capacity limit, and answers the two fan-out
/// questions the broadcast path needs: who occupies a given world, and
/// who subscribed to the lobby listing. Session IDs come from a monotonic
/// counter and are never reused.
pub struct SessionManager {
    /// Live sessions indexed by their unique ID
    sessions: HashMap<u32, Session>,
    /// Next available session ID for new connections
    next_session_id: u32,
    /// Maximum number of concurrent sessions allowed
    max_sessions: usize,
}

impl SessionManager {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            next_session_id: 1,
            max_sessions,
        }
    }

    /// Attempts to register a new session
    ///
    /// Returns Some(session_id) if successful, None if the server is at
    /// capacity. New sessions start unjoined and outside the lobby.
    pub fn add_session(&mut self, addr: SocketAddr) -> Option<u32> {
        if self.sessions.len() >= self.max_sessions {
            return None;
        }

        let session_id = self.next_session_id;
        self.next_session_id += 1;

        info!("Session {} connected from {}", session_id, addr);
        self.sessions.insert(session_id, Session::new(session_id, addr));

        Some(session_id)
    }

    /// Removes a session, returning it so the caller can clean up its
    /// world binding. Returns None if the session was already gone.
    pub fn remove_session(&mut self, session_id: u32) -> Option<Session> {
        let session = self.sessions.remove(&session_id);
        if let Some(session) = &session {
            info!("Session {} disconnected", session.id);
        }
        session
    }

    /// Finds a session ID by network address
    ///
    /// Used to associate incoming packets with existing sessions. Returns
    /// None if no session is connected from the given address.
    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.sessions
            .iter()
            .find(|(_, session)| session.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Refreshes the activity timestamp of a session.
    pub fn touch(&mut self, session_id: u32) {
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.touch();
        }
    }

    /// Binds a session to a world/player pair. Returns false if the session
    /// is gone or already joined; a join must be preceded by a leave.
    pub fn bind(&mut self, session_id: u32, world_id: String, player_id: String) -> bool {
        match self.sessions.get_mut(&session_id) {
            Some(session) if session.binding == SessionBinding::Unjoined => {
                info!(
                    "Session {} joined {} as {}",
                    session_id, world_id, player_id
                );
                session.binding = SessionBinding::Joined {
                    world_id,
                    player_id,
                };
                true
            }
            _ => false,
        }
    }

    /// Clears and returns a session's binding, leaving it unjoined.
    pub fn take_binding(&mut self, session_id: u32) -> SessionBinding {
        match self.sessions.get_mut(&session_id) {
            Some(session) => {
                std::mem::replace(&mut session.binding, SessionBinding::Unjoined)
            }
            None => SessionBinding::Unjoined,
        }
    }

    /// Returns the world/player pair a session is joined to, if any.
    pub fn binding_of(&self, session_id: u32) -> Option<(String, String)> {
        match self.sessions.get(&session_id).map(|s| &s.binding) {
            Some(SessionBinding::Joined {
                world_id,
                player_id,
            }) => Some((world_id.clone(), player_id.clone())),
            _ => None,
        }
    }

    /// Marks whether a session subscribes to lobby notifications.
    pub fn set_lobby(&mut self, session_id: u32, in_lobby: bool) {
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.in_lobby = in_lobby;
        }
    }

    /// Addresses of every session joined to the given world
    ///
    /// This is the fan-out set for `WorldUpdate` broadcasts.
    pub fn sessions_in_world(&self, world_id: &str) -> Vec<SocketAddr> {
        self.sessions
            .values()
            .filter(|session| {
                matches!(&session.binding, SessionBinding::Joined { world_id: w, .. } if w == world_id)
            })
            .map(|session| session.addr)
            .collect()
    }

    /// Addresses of every lobby subscriber, the fan-out set for
    /// `WorldListUpdate` notifications.
    pub fn lobby_addrs(&self) -> Vec<SocketAddr> {
        self.sessions
            .values()
            .filter(|session| session.in_lobby)
            .map(|session| session.addr)
            .collect()
    }

    pub fn addr_of(&self, session_id: u32) -> Option<SocketAddr> {
        self.sessions.get(&session_id).map(|session| session.addr)
    }

    /// Removes and returns all timed-out sessions
    ///
    /// The caller is responsible for cleaning up the returned sessions'
    /// world bindings, exactly as it would for an explicit disconnect.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<Session> {
        let timed_out: Vec<u32> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        timed_out
            .into_iter()
            .filter_map(|id| {
                info!("Session {} timed out", id);
                self.sessions.remove(&id)
            })
            .collect()
    }

    /// Returns the number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if no sessions are live
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
