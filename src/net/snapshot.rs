//! Versioned world snapshots for polling clients

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::game::state::{Block, Item, PlayerId, PlayerInfo, Stage, World};
use crate::util::coord::Coordinate;

/// Immutable view of the world at one state version
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameSnapshot {
    pub version: u64,
    pub stage: Stage,
    pub size: Coordinate,
    pub players: Vec<PlayerSnapshot>,
    /// Static blocks by ascending id, then updating blocks in processing order
    pub blocks: Vec<Block>,
    /// Players killed since the previous snapshot was built
    pub killed: Vec<PlayerId>,
}

impl GameSnapshot {
    pub fn from_world(world: &World, killed: Vec<PlayerId>) -> Self {
        let mut blocks: Vec<Block> = world.static_blocks.values().cloned().collect();
        blocks.sort_unstable_by_key(|b| b.id);
        blocks.extend(world.updating.iter().cloned());

        Self {
            version: world.version(),
            stage: world.stage,
            size: world.size,
            players: world.players.values().map(PlayerSnapshot::from_player).collect(),
            blocks,
            killed,
        }
    }
}

/// Public player record (no secret, no buffered input)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub name: String,
    pub alive: bool,
    pub score: u32,
    pub inventory: Vec<Item>,
}

impl PlayerSnapshot {
    pub fn from_player(player: &PlayerInfo) -> Self {
        Self {
            id: player.id,
            name: player.name.clone(),
            alive: player.alive,
            score: player.score,
            inventory: player.inventory.clone(),
        }
    }
}

/// Answer to a state poll
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum GameStateResponse {
    /// The caller already has the current version
    Unchanged,
    Snapshot(Arc<GameSnapshot>),
}

/// Builds at most one snapshot per state version
#[derive(Debug, Default)]
pub struct SnapshotCache {
    current: Option<Arc<GameSnapshot>>,
    builds: u64,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current version, building it if needed
    ///
    /// Building drains the world's killed list, so each death is reported
    /// in exactly one snapshot.
    pub fn get(&mut self, world: &mut World) -> Arc<GameSnapshot> {
        if let Some(snapshot) = &self.current {
            if snapshot.version == world.version() {
                return Arc::clone(snapshot);
            }
        }
        let killed = world.take_killed();
        let snapshot = Arc::new(GameSnapshot::from_world(world, killed));
        self.current = Some(Arc::clone(&snapshot));
        self.builds += 1;
        snapshot
    }

    /// Reply to a poll from a client holding `since_version`
    pub fn respond(&mut self, world: &mut World, since_version: u64) -> GameStateResponse {
        if since_version == world.version() {
            GameStateResponse::Unchanged
        } else {
            GameStateResponse::Snapshot(self.get(world))
        }
    }

    /// Number of snapshots built so far
    pub fn builds(&self) -> u64 {
        self.builds
    }
}
