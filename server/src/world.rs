use log::info;
use rand::Rng;
use shared::{
    clamp_to_interior, interior_max, PlayerState, Position, WorldSnapshot, WorldSummary,
    INTERIOR_MIN,
};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub position: Position,
    pub bot: bool,
}

/// A single room: a bounded grid and the players on it. Player ids are
/// scoped to the world and come from a monotonic counter, so an id is
/// never handed out twice even after its player leaves.
#[derive(Debug, Clone, PartialEq)]
pub struct World {
    pub id: String,
    pub size: i32,
    players: HashMap<String, Player>,
    next_player_seq: u64,
}

impl World {
    pub fn new(id: String, size: i32) -> Self {
        Self {
            id,
            size,
            players: HashMap::new(),
            next_player_seq: 0,
        }
    }

    /// Spawns a player at a uniformly random interior cell. Spawn placement
    /// does not check for overlap with existing players; only movement does.
    pub fn spawn_player<R: Rng>(&mut self, bot: bool, rng: &mut R) -> String {
        let position = Position::new(
            rng.gen_range(INTERIOR_MIN..=interior_max(self.size)),
            rng.gen_range(INTERIOR_MIN..=interior_max(self.size)),
        );
        self.spawn_player_at(bot, position)
    }

    /// Spawns a player at a fixed cell, clamped to the interior. Used for
    /// seeded worlds and tooling.
    pub fn spawn_player_at(&mut self, bot: bool, position: Position) -> String {
        let player_id = format!("p{}", self.next_player_seq);
        self.next_player_seq += 1;

        let position = Position::new(
            clamp_to_interior(position.x, self.size),
            clamp_to_interior(position.y, self.size),
        );
        info!(
            "Player {} spawned in {} at ({}, {}){}",
            player_id,
            self.id,
            position.x,
            position.y,
            if bot { " [bot]" } else { "" }
        );
        self.players.insert(player_id.clone(), Player { position, bot });
        player_id
    }

    /// Applies a single-axis move. Returns true when the world was touched
    /// and occupants should receive a fresh snapshot. A move refused due to
    /// collision still returns true: occupants reconcile against the
    /// snapshot, there is no per-move acknowledgment.
    pub fn move_player(&mut self, player_id: &str, dx: i32, dy: i32) -> bool {
        let Some(player) = self.players.get(player_id) else {
            return false;
        };
        if dx == 0 && dy == 0 {
            return false;
        }

        let candidate = Position::new(
            clamp_to_interior(player.position.x + dx, self.size),
            clamp_to_interior(player.position.y + dy, self.size),
        );

        // Two players never share a cell; a blocked move is simply refused.
        let blocked = self
            .players
            .iter()
            .any(|(id, other)| id != player_id && other.position == candidate);

        if !blocked {
            if let Some(player) = self.players.get_mut(player_id) {
                player.position = candidate;
            }
        }

        true
    }

    pub fn remove_player(&mut self, player_id: &str) -> bool {
        if self.players.remove(player_id).is_some() {
            info!("Player {} left {}", player_id, self.id);
            true
        } else {
            false
        }
    }

    pub fn position_of(&self, player_id: &str) -> Option<Position> {
        self.players.get(player_id).map(|p| p.position)
    }

    pub fn bot_ids(&self) -> Vec<String> {
        self.players
            .iter()
            .filter(|(_, player)| player.bot)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            size: self.size,
            players: self
                .players
                .iter()
                .map(|(id, player)| {
                    (
                        id.clone(),
                        PlayerState {
                            position: player.position,
                            bot: player.bot,
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn summary(&self) -> WorldSummary {
        WorldSummary {
            id: self.id.clone(),
            size: self.size,
            player_count: self.players.len(),
        }
    }
}
