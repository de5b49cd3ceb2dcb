use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const MIN_WORLD_SIZE: i32 = 5;
pub const MAX_WORLD_SIZE: i32 = 14;
pub const INTERIOR_MIN: i32 = 1;

/// Largest playable coordinate for a world of the given size. The outer
/// one-cell ring is a non-playable border, so the interior is
/// `[1, size - 2]` on both axes. Degenerate sizes (`size <= 3`) collapse
/// to a single-cell interior instead of an inverted range.
pub fn interior_max(size: i32) -> i32 {
    (size - 2).max(INTERIOR_MIN)
}

/// Clamps a coordinate to the playable interior of a world.
pub fn clamp_to_interior(value: i32, size: i32) -> i32 {
    value.clamp(INTERIOR_MIN, interior_max(size))
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Still,
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn delta(&self) -> (i32, i32) {
        match self {
            Direction::Still => (0, 0),
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    /// Parses the string form used by browser clients ("" means still).
    pub fn from_name(name: &str) -> Option<Direction> {
        match name {
            "" => Some(Direction::Still),
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            "left" => Some(Direction::Left),
            "right" => Some(Direction::Right),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerState {
    pub position: Position,
    pub bot: bool,
}

/// Full state of one world as broadcast to its occupants.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorldSnapshot {
    pub size: i32,
    pub players: HashMap<String, PlayerState>,
}

/// One row of the lobby's world listing.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct WorldSummary {
    pub id: String,
    pub size: i32,
    pub player_count: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    WorldNotFound,
    WorldExists,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    // Client -> server
    Connect {
        client_version: u32,
    },
    Heartbeat {
        timestamp: u64,
    },
    CreateWorld {
        size: Option<i32>,
    },
    ListWorlds,
    JoinWorld {
        world_id: String,
    },
    Move {
        direction: Direction,
    },
    SpawnBot,
    Disconnect,

    // Server -> client
    Connected {
        session_id: u32,
    },
    WorldCreated {
        world_id: String,
    },
    WorldList {
        worlds: Vec<WorldSummary>,
    },
    Joined {
        world_id: String,
        player_id: String,
        world: WorldSnapshot,
    },
    WorldUpdate {
        world: WorldSnapshot,
    },
    WorldListUpdate,
    RequestFailed {
        error: ErrorKind,
    },
    Disconnected {
        reason: String,
    },
}
