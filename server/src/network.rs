//! Server network layer handling UDP communications and the event loop
//! that owns all world state.

use crate::registry::{Removal, WorldRegistry};
use crate::session_manager::{SessionBinding, SessionManager, SESSION_TIMEOUT};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Direction, ErrorKind, Packet, Position};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    SessionExpired {
        session_id: u32,
        binding: SessionBinding,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from the main loop to the network sender task
#[derive(Debug)]
pub enum OutboundMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    Broadcast {
        packet: Packet,
        addrs: Vec<SocketAddr>,
    },
}

/// Main server coordinating networking and world state
///
/// The registry is owned by this struct and only ever touched from the
/// main loop, so joins, moves, leaves and bot ticks against any world are
/// serialized by construction. The session manager sits behind a lock
/// because the timeout sweeper reads it from its own task. Broadcasts are
/// queued on a channel after the mutation is done; the sender task does
/// the socket I/O.
pub struct Server {
    socket: Arc<UdpSocket>,
    sessions: Arc<RwLock<SessionManager>>,
    registry: WorldRegistry,
    bot_tick: Duration,
    rng: StdRng,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    out_tx: mpsc::UnboundedSender<OutboundMessage>,
    out_rx: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        bot_tick: Duration,
        max_sessions: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            sessions: Arc::new(RwLock::new(SessionManager::new(max_sessions))),
            registry: WorldRegistry::new(),
            bot_tick,
            rng: StdRng::from_entropy(),
            server_tx,
            server_rx,
            out_tx,
            out_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Seeds the starter world a fresh server comes up with: size 12,
    /// populated by two bots so the lobby listing is never empty.
    pub fn seed_starter_world(&mut self) {
        match self.registry.create_world(Some(12), &mut self.rng) {
            Ok(world_id) => {
                let _ = self
                    .registry
                    .spawn_player_at(&world_id, true, Position::new(2, 2));
                let _ = self
                    .registry
                    .spawn_player_at(&world_id, true, Position::new(8, 8));
                info!("Seeded starter world {}", world_id);
            }
            Err(e) => error!("Failed to seed starter world: {}", e),
        }
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes the outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut out_rx = std::mem::replace(&mut self.out_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                match message {
                    OutboundMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    OutboundMessage::Broadcast { packet, addrs } => {
                        // Best effort: a session that vanished mid-broadcast
                        // simply does not receive it.
                        for addr in addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to {}: {}", addr, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors session timeouts
    async fn spawn_timeout_checker(&self) {
        let sessions = Arc::clone(&self.sessions);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let expired = {
                    let mut sessions_guard = sessions.write().await;
                    sessions_guard.check_timeouts(SESSION_TIMEOUT)
                };

                for session in expired {
                    if let Err(e) = server_tx.send(ServerMessage::SessionExpired {
                        session_id: session.id,
                        binding: session.binding,
                    }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    async fn send_packet(&self, packet: &Packet, addr: SocketAddr) {
        if let Err(e) = self.out_tx.send(OutboundMessage::SendPacket {
            packet: packet.clone(),
            addr,
        }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Queues the current snapshot of a world for every session joined to
    /// it. Called after the mutation has been committed; no-op if the
    /// world is gone or has no occupants.
    async fn broadcast_world(&self, world_id: &str) {
        let Some(world) = self.registry.snapshot(world_id) else {
            return;
        };

        let addrs = {
            let sessions = self.sessions.read().await;
            sessions.sessions_in_world(world_id)
        };
        if addrs.is_empty() {
            return;
        }

        if let Err(e) = self.out_tx.send(OutboundMessage::Broadcast {
            packet: Packet::WorldUpdate { world },
            addrs,
        }) {
            error!("Failed to queue world broadcast: {}", e);
        }
    }

    /// Notifies lobby subscribers that the world listing may have changed.
    /// Carries no payload; consumers re-fetch the listing.
    async fn broadcast_lobby(&self) {
        let addrs = {
            let sessions = self.sessions.read().await;
            sessions.lobby_addrs()
        };
        if addrs.is_empty() {
            return;
        }

        if let Err(e) = self.out_tx.send(OutboundMessage::Broadcast {
            packet: Packet::WorldListUpdate,
            addrs,
        }) {
            error!("Failed to queue lobby broadcast: {}", e);
        }
    }

    /// Clears a session's binding and removes its player from the world.
    async fn leave_world(&mut self, session_id: u32) {
        let binding = {
            let mut sessions = self.sessions.write().await;
            sessions.take_binding(session_id)
        };
        self.cleanup_binding(binding).await;
    }

    /// Removes the bound player from its world. Deleting the world (when
    /// the departure empties it) happens inside the same registry call,
    /// so a join can never observe an empty world.
    async fn cleanup_binding(&mut self, binding: SessionBinding) {
        let SessionBinding::Joined {
            world_id,
            player_id,
        } = binding
        else {
            return;
        };

        match self.registry.remove_player(&world_id, &player_id) {
            Removal::WorldDeleted => self.broadcast_lobby().await,
            Removal::Removed => self.broadcast_world(&world_id).await,
            Removal::NotFound => {}
        }
    }

    /// Processes incoming packets and updates world state
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                // Remove existing connection if present
                let existing_session_id = {
                    let sessions = self.sessions.read().await;
                    sessions.find_by_addr(addr)
                };

                if let Some(existing_id) = existing_session_id {
                    info!("Removing existing session {} from {}", existing_id, addr);
                    let removed = {
                        let mut sessions = self.sessions.write().await;
                        sessions.remove_session(existing_id)
                    };
                    if let Some(session) = removed {
                        self.cleanup_binding(session.binding).await;
                    }
                }

                let session_id = {
                    let mut sessions = self.sessions.write().await;
                    sessions.add_session(addr)
                };

                if let Some(session_id) = session_id {
                    let response = Packet::Connected { session_id };
                    self.send_packet(&response, addr).await;
                } else {
                    let response = Packet::Disconnected {
                        reason: "Server full".to_string(),
                    };
                    self.send_packet(&response, addr).await;
                }
            }

            Packet::Heartbeat { timestamp: _ } => {
                self.touch_session(addr).await;
            }

            Packet::CreateWorld { size } => {
                if self.touch_session(addr).await.is_none() {
                    return;
                }

                match self.registry.create_world(size, &mut self.rng) {
                    Ok(world_id) => {
                        self.send_packet(&Packet::WorldCreated { world_id }, addr)
                            .await;
                        self.broadcast_lobby().await;
                    }
                    Err(e) => {
                        warn!("World creation for {} failed: {}", addr, e);
                        self.send_packet(
                            &Packet::RequestFailed {
                                error: ErrorKind::WorldExists,
                            },
                            addr,
                        )
                        .await;
                    }
                }
            }

            Packet::ListWorlds => {
                let Some(session_id) = self.touch_session(addr).await else {
                    return;
                };

                // Listing the lobby subscribes the session to change
                // notifications until it joins a world.
                {
                    let mut sessions = self.sessions.write().await;
                    sessions.set_lobby(session_id, true);
                }

                let worlds = self.registry.list();
                self.send_packet(&Packet::WorldList { worlds }, addr).await;
            }

            Packet::JoinWorld { world_id } => {
                let Some(session_id) = self.touch_session(addr).await else {
                    return;
                };

                if !self.registry.contains(&world_id) {
                    self.send_packet(
                        &Packet::RequestFailed {
                            error: ErrorKind::WorldNotFound,
                        },
                        addr,
                    )
                    .await;
                    return;
                }

                // A session holds one binding at a time; joining while
                // joined leaves the old world first.
                self.leave_world(session_id).await;

                let Ok(player_id) = self.registry.spawn_player(&world_id, false, &mut self.rng)
                else {
                    self.send_packet(
                        &Packet::RequestFailed {
                            error: ErrorKind::WorldNotFound,
                        },
                        addr,
                    )
                    .await;
                    return;
                };

                {
                    let mut sessions = self.sessions.write().await;
                    sessions.bind(session_id, world_id.clone(), player_id.clone());
                    sessions.set_lobby(session_id, false);
                }

                if let Some(world) = self.registry.snapshot(&world_id) {
                    self.send_packet(
                        &Packet::Joined {
                            world_id: world_id.clone(),
                            player_id,
                            world,
                        },
                        addr,
                    )
                    .await;
                }

                self.broadcast_world(&world_id).await;
                self.broadcast_lobby().await;
            }

            Packet::Move { direction } => {
                let Some(session_id) = self.touch_session(addr).await else {
                    return;
                };

                // Silent no-op for unjoined sessions and stale state; a
                // late move against a deleted world is dropped, not raised.
                let binding = {
                    let sessions = self.sessions.read().await;
                    sessions.binding_of(session_id)
                };
                let Some((world_id, player_id)) = binding else {
                    return;
                };

                let (dx, dy) = direction.delta();
                if self.registry.move_player(&world_id, &player_id, dx, dy) {
                    debug!("Player {} moved {:?} in {}", player_id, direction, world_id);
                    self.broadcast_world(&world_id).await;
                }
            }

            Packet::SpawnBot => {
                let Some(session_id) = self.touch_session(addr).await else {
                    return;
                };

                let binding = {
                    let sessions = self.sessions.read().await;
                    sessions.binding_of(session_id)
                };
                let Some((world_id, _)) = binding else {
                    return;
                };

                if self
                    .registry
                    .spawn_player(&world_id, true, &mut self.rng)
                    .is_ok()
                {
                    self.broadcast_world(&world_id).await;
                    self.broadcast_lobby().await;
                }
            }

            Packet::Disconnect => {
                let removed = {
                    let mut sessions = self.sessions.write().await;
                    sessions
                        .find_by_addr(addr)
                        .and_then(|id| sessions.remove_session(id))
                };
                if let Some(session) = removed {
                    self.cleanup_binding(session.binding).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Looks up the session for an address and refreshes its activity
    /// timestamp. Packets from unknown addresses are dropped.
    async fn touch_session(&self, addr: SocketAddr) -> Option<u32> {
        let mut sessions = self.sessions.write().await;
        let session_id = sessions.find_by_addr(addr)?;
        sessions.touch(session_id);
        Some(session_id)
    }

    /// Advances every bot in every world by one tick. Each bot moves with
    /// independent 50% probability, one axis, one unit, through the same
    /// move path as client-driven input.
    async fn step_bots(&mut self) {
        let mut touched = Vec::new();

        for world_id in self.registry.world_ids() {
            let mut world_touched = false;

            for bot_id in self.registry.bot_ids(&world_id) {
                if !self.rng.gen_bool(0.5) {
                    continue;
                }

                let direction = match self.rng.gen_range(0..4) {
                    0 => Direction::Up,
                    1 => Direction::Down,
                    2 => Direction::Left,
                    _ => Direction::Right,
                };

                let (dx, dy) = direction.delta();
                if self.registry.move_player(&world_id, &bot_id, dx, dy) {
                    world_touched = true;
                }
            }

            if world_touched {
                touched.push(world_id);
            }
        }

        for world_id in touched {
            self.broadcast_world(&world_id).await;
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut bot_interval = interval(self.bot_tick);
        let mut ticks: u64 = 0;

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::SessionExpired { session_id, binding }) => {
                            info!("Cleaning up expired session {}", session_id);
                            self.cleanup_binding(binding).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Advance autonomous bots
                _ = bot_interval.tick() => {
                    self.step_bots().await;

                    ticks += 1;
                    if ticks % 60 == 0 {
                        let session_count = {
                            let sessions = self.sessions.read().await;
                            sessions.len()
                        };
                        debug!(
                            "Tick {}: {} worlds, {} sessions",
                            ticks,
                            self.registry.world_count(),
                            session_count
                        );
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{MAX_WORLD_SIZE, MIN_WORLD_SIZE};

    async fn test_server() -> Server {
        Server::new("127.0.0.1:0", Duration::from_secs(1), 8)
            .await
            .unwrap()
    }

    fn test_addr() -> SocketAddr {
        "127.0.0.1:9001".parse().unwrap()
    }

    #[test]
    fn test_server_message_creation() {
        let packet = Packet::Connect { client_version: 1 };
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();

        let msg = ServerMessage::PacketReceived {
            packet: packet.clone(),
            addr,
        };

        match msg {
            ServerMessage::PacketReceived { packet: p, addr: a } => {
                assert_eq!(a, addr);
                match p {
                    Packet::Connect { client_version } => {
                        assert_eq!(client_version, 1);
                    }
                    _ => panic!("Unexpected packet type"),
                }
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_session_expired_message() {
        let msg = ServerMessage::SessionExpired {
            session_id: 42,
            binding: SessionBinding::Unjoined,
        };

        match msg {
            ServerMessage::SessionExpired {
                session_id,
                binding,
            } => {
                assert_eq!(session_id, 42);
                assert_eq!(binding, SessionBinding::Unjoined);
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[tokio::test]
    async fn test_connect_creates_session() {
        let mut server = test_server().await;
        let addr = test_addr();

        server
            .handle_packet(Packet::Connect { client_version: 1 }, addr)
            .await;

        let sessions = server.sessions.read().await;
        assert_eq!(sessions.len(), 1);
        assert!(sessions.find_by_addr(addr).is_some());
    }

    #[tokio::test]
    async fn test_join_spawns_player_and_binds_session() {
        let mut server = test_server().await;
        let addr = test_addr();

        server
            .handle_packet(Packet::Connect { client_version: 1 }, addr)
            .await;
        server
            .handle_packet(Packet::CreateWorld { size: Some(12) }, addr)
            .await;
        server
            .handle_packet(
                Packet::JoinWorld {
                    world_id: "w0".to_string(),
                },
                addr,
            )
            .await;

        let binding = {
            let sessions = server.sessions.read().await;
            let id = sessions.find_by_addr(addr).unwrap();
            sessions.binding_of(id)
        };
        let (world_id, player_id) = binding.expect("session should be joined");
        assert_eq!(world_id, "w0");

        let world = server.registry.get("w0").unwrap();
        assert_eq!(world.player_count(), 1);
        let pos = world.position_of(&player_id).unwrap();
        assert!(pos.x >= 1 && pos.x <= 10);
        assert!(pos.y >= 1 && pos.y <= 10);
    }

    #[tokio::test]
    async fn test_join_missing_world_leaves_no_state() {
        let mut server = test_server().await;
        let addr = test_addr();

        server
            .handle_packet(Packet::Connect { client_version: 1 }, addr)
            .await;
        server
            .handle_packet(
                Packet::JoinWorld {
                    world_id: "w42".to_string(),
                },
                addr,
            )
            .await;

        let sessions = server.sessions.read().await;
        let id = sessions.find_by_addr(addr).unwrap();
        assert_eq!(sessions.binding_of(id), None);
        assert_eq!(server.registry.world_count(), 0);
    }

    #[tokio::test]
    async fn test_move_without_join_is_a_no_op() {
        let mut server = test_server().await;
        let addr = test_addr();

        server
            .handle_packet(Packet::Connect { client_version: 1 }, addr)
            .await;
        server
            .handle_packet(
                Packet::Move {
                    direction: Direction::Up,
                },
                addr,
            )
            .await;

        assert_eq!(server.registry.world_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_deletes_emptied_world() {
        let mut server = test_server().await;
        let addr = test_addr();

        server
            .handle_packet(Packet::Connect { client_version: 1 }, addr)
            .await;
        server
            .handle_packet(Packet::CreateWorld { size: Some(12) }, addr)
            .await;
        server
            .handle_packet(
                Packet::JoinWorld {
                    world_id: "w0".to_string(),
                },
                addr,
            )
            .await;
        assert!(server.registry.contains("w0"));

        server.handle_packet(Packet::Disconnect, addr).await;

        assert!(!server.registry.contains("w0"));
        let sessions = server.sessions.read().await;
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_bot_in_current_world() {
        let mut server = test_server().await;
        let addr = test_addr();

        server
            .handle_packet(Packet::Connect { client_version: 1 }, addr)
            .await;
        server
            .handle_packet(Packet::CreateWorld { size: Some(12) }, addr)
            .await;
        server
            .handle_packet(
                Packet::JoinWorld {
                    world_id: "w0".to_string(),
                },
                addr,
            )
            .await;
        server.handle_packet(Packet::SpawnBot, addr).await;

        let world = server.registry.get("w0").unwrap();
        assert_eq!(world.player_count(), 2);
        assert_eq!(world.bot_ids().len(), 1);
    }

    #[tokio::test]
    async fn test_seeded_world_survives_bot_ticks() {
        let mut server = test_server().await;
        server.seed_starter_world();

        assert!(server.registry.contains("w0"));
        assert_eq!(server.registry.bot_ids("w0").len(), 2);

        for _ in 0..20 {
            server.step_bots().await;
        }

        // Bots never leave, so the seeded world persists and its players
        // stay inside the interior.
        let world = server.registry.get("w0").unwrap();
        assert_eq!(world.player_count(), 2);
        for (_, state) in world.snapshot().players {
            assert!(state.position.x >= 1 && state.position.x <= 10);
            assert!(state.position.y >= 1 && state.position.y <= 10);
        }
    }

    #[tokio::test]
    async fn test_create_world_random_size_in_range() {
        let mut server = test_server().await;
        let addr = test_addr();

        server
            .handle_packet(Packet::Connect { client_version: 1 }, addr)
            .await;
        server
            .handle_packet(Packet::CreateWorld { size: None }, addr)
            .await;

        let world = server.registry.get("w0").unwrap();
        assert!(world.size >= MIN_WORLD_SIZE && world.size <= MAX_WORLD_SIZE);
    }
}
