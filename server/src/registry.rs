//! Authoritative world registry: creation, lookup, listing and deletion of
//! worlds, plus the registry-level wrappers around per-world operations.
//!
//! The registry is an owned value threaded through the server's single
//! event loop; nothing else mutates it. World ids come from a monotonic
//! counter, never from the current entry count, so deleting a world can
//! never cause a later creation to reuse its id.

use crate::world::World;
use log::info;
use rand::Rng;
use shared::{WorldSnapshot, WorldSummary, MAX_WORLD_SIZE, MIN_WORLD_SIZE};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("world not found: {0}")]
    WorldNotFound(String),
    #[error("world already exists: {0}")]
    WorldExists(String),
}

/// Outcome of removing a player from a world.
#[derive(Debug, PartialEq, Eq)]
pub enum Removal {
    /// World or player was already gone; nothing changed.
    NotFound,
    /// Player removed, world still has occupants.
    Removed,
    /// Player removed and the world, now empty, was deleted with it.
    WorldDeleted,
}

pub struct WorldRegistry {
    worlds: HashMap<String, World>,
    creation_order: Vec<String>,
    next_world_seq: u64,
    min_size: i32,
    max_size: i32,
}

impl WorldRegistry {
    pub fn new() -> Self {
        Self::with_size_range(MIN_WORLD_SIZE, MAX_WORLD_SIZE)
    }

    pub fn with_size_range(min_size: i32, max_size: i32) -> Self {
        Self {
            worlds: HashMap::new(),
            creation_order: Vec::new(),
            next_world_seq: 0,
            min_size,
            max_size,
        }
    }

    /// Creates a new empty world. When no size is requested one is drawn
    /// uniformly from the configured range. An id collision fails with
    /// `WorldExists` rather than silently overwriting the existing world.
    pub fn create_world<R: Rng>(
        &mut self,
        requested_size: Option<i32>,
        rng: &mut R,
    ) -> Result<String, RegistryError> {
        let world_id = format!("w{}", self.next_world_seq);
        if self.worlds.contains_key(&world_id) {
            return Err(RegistryError::WorldExists(world_id));
        }
        self.next_world_seq += 1;

        let size = requested_size.unwrap_or_else(|| rng.gen_range(self.min_size..=self.max_size));
        self.worlds
            .insert(world_id.clone(), World::new(world_id.clone(), size));
        self.creation_order.push(world_id.clone());
        info!("World {} created (size {})", world_id, size);

        Ok(world_id)
    }

    pub fn get(&self, world_id: &str) -> Result<&World, RegistryError> {
        self.worlds
            .get(world_id)
            .ok_or_else(|| RegistryError::WorldNotFound(world_id.to_string()))
    }

    pub fn contains(&self, world_id: &str) -> bool {
        self.worlds.contains_key(world_id)
    }

    /// Lists all live worlds in creation order.
    pub fn list(&self) -> Vec<WorldSummary> {
        self.creation_order
            .iter()
            .filter_map(|id| self.worlds.get(id))
            .map(|world| world.summary())
            .collect()
    }

    pub fn world_ids(&self) -> Vec<String> {
        self.creation_order
            .iter()
            .filter(|id| self.worlds.contains_key(*id))
            .cloned()
            .collect()
    }

    /// Idempotent: deleting an absent world is a no-op.
    pub fn delete_world(&mut self, world_id: &str) {
        if self.worlds.remove(world_id).is_some() {
            self.creation_order.retain(|id| id != world_id);
            info!("World {} deleted", world_id);
        }
    }

    pub fn spawn_player<R: Rng>(
        &mut self,
        world_id: &str,
        bot: bool,
        rng: &mut R,
    ) -> Result<String, RegistryError> {
        let world = self
            .worlds
            .get_mut(world_id)
            .ok_or_else(|| RegistryError::WorldNotFound(world_id.to_string()))?;
        Ok(world.spawn_player(bot, rng))
    }

    /// Spawns a player at a fixed cell, for seeded worlds and tooling.
    pub fn spawn_player_at(
        &mut self,
        world_id: &str,
        bot: bool,
        position: shared::Position,
    ) -> Result<String, RegistryError> {
        let world = self
            .worlds
            .get_mut(world_id)
            .ok_or_else(|| RegistryError::WorldNotFound(world_id.to_string()))?;
        Ok(world.spawn_player_at(bot, position))
    }

    /// Registry-level move: silent no-op when the world is gone. Returns
    /// true when the world should be re-broadcast.
    pub fn move_player(&mut self, world_id: &str, player_id: &str, dx: i32, dy: i32) -> bool {
        match self.worlds.get_mut(world_id) {
            Some(world) => world.move_player(player_id, dx, dy),
            None => false,
        }
    }

    /// Removes a player and, in the same call, deletes the world if that
    /// removal emptied it. An empty world is never left behind.
    pub fn remove_player(&mut self, world_id: &str, player_id: &str) -> Removal {
        let Some(world) = self.worlds.get_mut(world_id) else {
            return Removal::NotFound;
        };
        if !world.remove_player(player_id) {
            return Removal::NotFound;
        }
        if world.is_empty() {
            self.delete_world(world_id);
            Removal::WorldDeleted
        } else {
            Removal::Removed
        }
    }

    pub fn snapshot(&self, world_id: &str) -> Option<WorldSnapshot> {
        self.worlds.get(world_id).map(|world| world.snapshot())
    }

    pub fn bot_ids(&self, world_id: &str) -> Vec<String> {
        self.worlds
            .get(world_id)
            .map(|world| world.bot_ids())
            .unwrap_or_default()
    }

    pub fn world_count(&self) -> usize {
        self.worlds.len()
    }
}

impl Default for WorldRegistry {
    fn default() -> Self {
        Self::new()
    }
}
