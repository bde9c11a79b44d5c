//! Game state definitions and structures
//!
//! Contains every block kind that can occupy a cell, player records, and the
//! world that ties them together.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;

use crate::game::constants::spawn::INITIAL_DIRECTION;
use crate::util::coord::{Coordinate, Direction};

/// Sequential player identifier (never reused within a process)
pub type PlayerId = u32;

/// Block instance identifier (monotonic, never reused)
pub type BlockId = u64;

/// Every kind of object that can sit on the grid
///
/// Collision rules and renderers match on this exhaustively.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Wall,
    Ammo,
    Mine,
    Rocket,
    PlayerHead,
    PlayerTail,
}

impl BlockKind {
    /// Kinds that change cell on their own
    pub fn is_mobile(&self) -> bool {
        match self {
            BlockKind::Rocket | BlockKind::PlayerHead => true,
            BlockKind::Wall | BlockKind::Ammo | BlockKind::Mine | BlockKind::PlayerTail => false,
        }
    }
}

/// A single placed object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub id: BlockId,
    pub kind: BlockKind,
    pub position: Coordinate,
    /// Zero for immobile blocks
    pub direction: Direction,
    /// Walls and arena-generated pickups have no owner
    pub owner: Option<PlayerId>,
    pub created_tick: u64,
}

impl Block {
    /// Ticks elapsed since creation
    #[inline]
    pub fn age(&self, tick: u64) -> u64 {
        tick.saturating_sub(self.created_tick)
    }

    #[inline]
    pub fn is_owned_by(&self, player_id: PlayerId) -> bool {
        self.owner == Some(player_id)
    }
}

/// Something a player carries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Item {
    Rocket,
}

/// Player record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub name: String,
    pub alive: bool,
    pub score: u32,
    /// Oldest first; the most recently acquired item is used first
    pub inventory: Vec<Item>,
    /// Direction requested by the last Move call, applied on the next head advance
    #[serde(skip)]
    pub pending_direction: Option<Direction>,
}

impl PlayerInfo {
    pub fn new(id: PlayerId, name: String) -> Self {
        Self {
            id,
            name,
            alive: false,
            score: 0,
            inventory: Vec::new(),
            pending_direction: None,
        }
    }

    pub fn rocket_count(&self) -> usize {
        self.inventory.iter().filter(|item| **item == Item::Rocket).count()
    }

    pub fn add_rockets(&mut self, count: usize) {
        self.inventory.extend(std::iter::repeat(Item::Rocket).take(count));
    }

    /// Remove the most recently acquired rocket
    pub fn take_rocket(&mut self) -> Option<Item> {
        let index = self.inventory.iter().rposition(|item| *item == Item::Rocket)?;
        Some(self.inventory.remove(index))
    }
}

/// Match stage
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Stage {
    /// Lobby: waiting for someone to start the round
    #[default]
    CollectPlayers,
    /// Fixed pause before the round, nothing moves
    RoundStart,
    /// Live simulation
    Round,
    /// Fixed pause after the round
    RoundEnd,
}

impl Stage {
    pub fn as_index(&self) -> u64 {
        match self {
            Stage::CollectPlayers => 0,
            Stage::RoundStart => 1,
            Stage::Round => 2,
            Stage::RoundEnd => 3,
        }
    }
}

/// Complete world state
///
/// Static blocks (walls, ammo, mines, wreckage) are keyed by cell, at most one
/// per cell. Updating blocks (heads, live tails, rockets) are re-evaluated
/// every tick and kept in ascending id order, which is also the collision
/// processing order.
#[derive(Debug, Clone)]
pub struct World {
    pub size: Coordinate,
    pub static_blocks: FxHashMap<Coordinate, Block>,
    pub updating: Vec<Block>,
    pub players: BTreeMap<PlayerId, PlayerInfo>,
    /// Ticks simulated since the world was created
    pub tick: u64,
    /// Ticks simulated in the current round (drives head moves and tail growth)
    pub round_tick: u64,
    pub stage: Stage,
    version: u64,
    killed_since_snapshot: Vec<PlayerId>,
    dirty: bool,
    next_block_id: BlockId,
    next_player_id: PlayerId,
}

impl World {
    pub fn new(size: Coordinate) -> Self {
        Self {
            size,
            static_blocks: FxHashMap::default(),
            updating: Vec::new(),
            players: BTreeMap::new(),
            tick: 0,
            round_tick: 0,
            stage: Stage::CollectPlayers,
            version: 1,
            killed_since_snapshot: Vec::new(),
            dirty: false,
            next_block_id: 0,
            next_player_id: 0,
        }
    }

    // ------------------------------------------------------------------
    // Versioning
    // ------------------------------------------------------------------

    /// Current state version
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Flag an externally observable change
    #[inline]
    pub fn mark_changed(&mut self) {
        self.dirty = true;
    }

    /// Bump the version once if anything changed since the last commit
    pub fn commit_version(&mut self) -> bool {
        if !self.dirty {
            return false;
        }
        self.dirty = false;
        self.version += 1;
        true
    }

    /// Drain the ids killed since the last materialised snapshot
    pub fn take_killed(&mut self) -> Vec<PlayerId> {
        std::mem::take(&mut self.killed_since_snapshot)
    }

    pub fn killed_since_snapshot(&self) -> &[PlayerId] {
        &self.killed_since_snapshot
    }

    // ------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------

    /// Create a block stamped with the current tick (not yet placed)
    pub fn spawn_block(
        &mut self,
        kind: BlockKind,
        position: Coordinate,
        direction: Direction,
        owner: Option<PlayerId>,
    ) -> Block {
        let id = self.next_block_id;
        self.next_block_id += 1;
        Block {
            id,
            kind,
            position: position.wrap(self.size),
            direction,
            owner,
            created_tick: self.tick,
        }
    }

    /// Insert into the static map, refusing occupied cells
    pub fn place_static(&mut self, block: Block) -> bool {
        debug_assert!(!block.kind.is_mobile(), "{:?} cannot be static", block.kind);
        if self.static_blocks.contains_key(&block.position) {
            return false;
        }
        self.static_blocks.insert(block.position, block);
        self.mark_changed();
        true
    }

    /// Append to the updating set
    pub fn push_updating(&mut self, block: Block) {
        debug_assert!(self.updating.last().map_or(true, |last| last.id < block.id));
        self.updating.push(block);
        self.mark_changed();
    }

    pub fn static_at(&self, position: Coordinate) -> Option<&Block> {
        self.static_blocks.get(&position)
    }

    pub fn updating_at(&self, position: Coordinate) -> Option<&Block> {
        self.updating.iter().find(|b| b.position == position)
    }

    /// Whatever occupies a cell, static blocks first
    pub fn occupant_at(&self, position: Coordinate) -> Option<&Block> {
        self.static_at(position).or_else(|| self.updating_at(position))
    }

    pub fn is_free(&self, position: Coordinate) -> bool {
        self.occupant_at(position).is_none()
    }

    /// Free cells away from the border, in row-major order
    pub fn free_interior_cells(&self) -> Vec<Coordinate> {
        let occupied: rustc_hash::FxHashSet<Coordinate> = self
            .static_blocks
            .keys()
            .copied()
            .chain(self.updating.iter().map(|b| b.position))
            .collect();

        let mut cells = Vec::new();
        for y in 1..self.size.y - 1 {
            for x in 1..self.size.x - 1 {
                let cell = Coordinate::new(x, y);
                if !occupied.contains(&cell) {
                    cells.push(cell);
                }
            }
        }
        cells
    }

    /// The live head of a player, if any
    pub fn head_of(&self, player_id: PlayerId) -> Option<&Block> {
        self.updating
            .iter()
            .find(|b| b.kind == BlockKind::PlayerHead && b.is_owned_by(player_id))
    }

    pub fn rocket_count(&self) -> usize {
        self.updating.iter().filter(|b| b.kind == BlockKind::Rocket).count()
    }

    /// Empty both block stores
    pub fn clear_board(&mut self) {
        if !self.static_blocks.is_empty() || !self.updating.is_empty() {
            self.mark_changed();
        }
        self.static_blocks.clear();
        self.updating.clear();
    }

    // ------------------------------------------------------------------
    // Players
    // ------------------------------------------------------------------

    /// Add a player record (not alive until a head is spawned)
    pub fn add_player(&mut self, name: String) -> PlayerId {
        let id = self.next_player_id;
        self.next_player_id += 1;
        self.players.insert(id, PlayerInfo::new(id, name));
        self.mark_changed();
        id
    }

    pub fn get_player(&self, id: PlayerId) -> Option<&PlayerInfo> {
        self.players.get(&id)
    }

    pub fn get_player_mut(&mut self, id: PlayerId) -> Option<&mut PlayerInfo> {
        self.players.get_mut(&id)
    }

    pub fn alive_count(&self) -> usize {
        self.players.values().filter(|p| p.alive).count()
    }

    pub fn alive_players(&self) -> impl Iterator<Item = &PlayerInfo> {
        self.players.values().filter(|p| p.alive)
    }

    /// Put a fresh head for `player_id` at `position` and mark it alive
    pub fn spawn_head(&mut self, player_id: PlayerId, position: Coordinate) -> Option<BlockId> {
        if !self.players.contains_key(&player_id) || self.head_of(player_id).is_some() {
            return None;
        }
        let head = self.spawn_block(
            BlockKind::PlayerHead,
            position,
            INITIAL_DIRECTION,
            Some(player_id),
        );
        let id = head.id;
        self.push_updating(head);
        if let Some(player) = self.players.get_mut(&player_id) {
            player.alive = true;
            player.pending_direction = None;
        }
        Some(id)
    }

    /// Kill a batch of players that died in the same instant
    ///
    /// Unknown or already dead ids are skipped. All victims are marked dead
    /// before scores are awarded, so victims of the same batch never score off
    /// each other; every survivor gets one point per victim. Heads are removed
    /// and each victim's tails stay behind as static wreckage.
    pub fn kill_players(&mut self, ids: &[PlayerId]) -> SmallVec<[PlayerId; 4]> {
        let mut victims: SmallVec<[PlayerId; 4]> = SmallVec::new();
        for &id in ids {
            if victims.contains(&id) {
                continue;
            }
            if let Some(player) = self.players.get_mut(&id) {
                if player.alive {
                    player.alive = false;
                    victims.push(id);
                }
            }
        }
        if victims.is_empty() {
            return victims;
        }

        let is_victim = |block: &Block| block.owner.is_some_and(|owner| victims.contains(&owner));
        let mut wreckage = Vec::new();
        let mut kept = Vec::with_capacity(self.updating.len());
        for block in self.updating.drain(..) {
            match block.kind {
                BlockKind::PlayerHead if is_victim(&block) => {}
                BlockKind::PlayerTail if is_victim(&block) => wreckage.push(block),
                _ => kept.push(block),
            }
        }
        self.updating = kept;
        for tail in wreckage {
            self.static_blocks.entry(tail.position).or_insert(tail);
        }

        let points = victims.len() as u32;
        for player in self.players.values_mut().filter(|p| p.alive) {
            player.score += points;
        }

        self.killed_since_snapshot.extend(victims.iter().copied());
        self.mark_changed();
        victims
    }

    /// Kill (if alive) and forget a player
    pub fn remove_player(&mut self, id: PlayerId) -> Option<PlayerInfo> {
        self.kill_players(&[id]);
        let removed = self.players.remove(&id);
        if removed.is_some() {
            self.mark_changed();
        }
        removed
    }
}
