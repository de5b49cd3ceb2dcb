//! # World Coordinator Server Library
//!
//! This library provides the authoritative server for a small realtime
//! multiplayer world game. Clients join named rooms ("worlds"), each world
//! tracks player positions on a bounded 2D grid, and every mutation is
//! broadcast to the room's occupants so all connected clients agree with
//! server state.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative World State
//! The server owns the definitive set of worlds and players. All movement
//! validation (interior clamping, per-cell collision) happens here; clients
//! render whatever the latest broadcast snapshot says.
//!
//! ### Session Lifecycle
//! Handles the complete lifecycle of client connections:
//! - Connection establishment and session assignment
//! - Join/leave binding between a session and a world/player pair
//! - Disconnect and timeout cleanup, including deletion of emptied worlds
//!
//! ### State Broadcasting
//! After any mutation the affected world's full snapshot is pushed to its
//! occupants, and lobby subscribers are notified when the world listing
//! changes. Broadcasts are fire and forget, best effort, in order.
//!
//! ## Architecture Design
//!
//! All registry mutation happens on a single event loop, so operations
//! against any world are serialized by construction: client packets, bot
//! ticks and timeout cleanup all flow through the same `select!` loop.
//! Stale requests against since-deleted state are dropped silently; the
//! fire-and-forget channel gives the counterpart client no way to observe
//! a synchronous failure, so there is nothing useful to raise.
//!
//! ## Module Organization
//!
//! ### World Module (`world`)
//! A single room: grid size, the players on it, spawn placement and the
//! movement rules (interior clamp, collision refusal).
//!
//! ### Registry Module (`registry`)
//! The authoritative world mapping: create/lookup/list/delete, monotonic
//! id generation, and atomic remove-and-delete-if-empty.
//!
//! ### Session Manager Module (`session_manager`)
//! Live connections and their world/player bindings, lobby subscriptions,
//! and timeout detection.
//!
//! ### Network Module (`network`)
//! UDP socket management, packet serialization, the main event loop, the
//! broadcast fan-out and the bot scheduler.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         Duration::from_secs(1), // bot movement tick
//!         32,                     // session capacity
//!     ).await?;
//!
//!     server.seed_starter_world();
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod network;
pub mod registry;
pub mod session_manager;
pub mod world;
