//! Same-cell collision resolution
//!
//! One deterministic pass per tick over the updating blocks in ascending id
//! order. Each block, already at its new cell, probes the cells claimed by
//! blocks processed earlier this tick, then the static map:
//!
//! - empty cell: the block claims it
//! - occupied cell: the block and every occupant are destroyed, except a head
//!   arriving first on untouched ammo, which eats it and claims the cell
//!
//! Removals are collected during the pass and applied afterwards. Destroyed
//! heads kill their owners, destroyed mines detonate into 8 outward rockets.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::collections::VecDeque;

use crate::game::rules::Rules;
use crate::game::state::{Block, BlockKind, PlayerId, World};
use crate::util::coord::{Coordinate, Direction};

/// What a resolution pass changed
#[derive(Debug, Clone, Default)]
pub struct CollisionReport {
    /// Players killed by this pass
    pub killed: SmallVec<[PlayerId; 4]>,
    /// Cells of mines that went off (including chained ones)
    pub detonated: Vec<Coordinate>,
    /// Ammo eaten by heads
    pub ammo_collected: Vec<(PlayerId, Coordinate)>,
    /// Blocks destroyed by collisions (not by expiry)
    pub destroyed_blocks: usize,
}

impl CollisionReport {
    pub fn is_empty(&self) -> bool {
        self.killed.is_empty()
            && self.detonated.is_empty()
            && self.ammo_collected.is_empty()
            && self.destroyed_blocks == 0
    }
}

/// Resolve every same-cell collision for the current tick
pub fn resolve(world: &mut World, rules: &Rules) -> CollisionReport {
    let mut report = CollisionReport::default();
    let count = world.updating.len();
    let mut destroyed = vec![false; count];
    let mut claimed: FxHashMap<Coordinate, usize> = FxHashMap::default();
    let mut struck: FxHashSet<Coordinate> = FxHashSet::default();
    let mut struck_order: Vec<Coordinate> = Vec::new();

    for i in 0..count {
        let (kind, position, owner) = {
            let block = &world.updating[i];
            (block.kind, block.position, block.owner)
        };

        if let Some(&j) = claimed.get(&position) {
            destroyed[i] = true;
            destroyed[j] = true;
            continue;
        }

        match world.static_blocks.get(&position).map(|b| b.kind) {
            Some(BlockKind::Ammo) if kind == BlockKind::PlayerHead && !struck.contains(&position) => {
                struck.insert(position);
                struck_order.push(position);
                if let Some(player_id) = owner {
                    if let Some(player) = world.players.get_mut(&player_id) {
                        player.add_rockets(rules.rocket_batch);
                    }
                    report.ammo_collected.push((player_id, position));
                }
                claimed.insert(position, i);
            }
            Some(_) => {
                destroyed[i] = true;
                if struck.insert(position) {
                    struck_order.push(position);
                }
            }
            None => {
                claimed.insert(position, i);
            }
        }
    }

    let mut victims: SmallVec<[PlayerId; 4]> = SmallVec::new();
    for (block, _) in world.updating.iter().zip(&destroyed).filter(|(_, gone)| **gone) {
        report.destroyed_blocks += 1;
        if block.kind == BlockKind::PlayerHead {
            if let Some(owner) = block.owner {
                victims.push(owner);
            }
        }
    }

    let mut mines = Vec::new();
    for position in struck_order {
        if let Some(block) = world.static_blocks.remove(&position) {
            match block.kind {
                BlockKind::Mine => {
                    report.destroyed_blocks += 1;
                    mines.push(block);
                }
                BlockKind::Ammo => {
                    // eaten ammo is already counted in ammo_collected
                    if !report.ammo_collected.iter().any(|(_, p)| *p == position) {
                        report.destroyed_blocks += 1;
                    }
                }
                BlockKind::Wall | BlockKind::PlayerTail | BlockKind::Rocket | BlockKind::PlayerHead => {
                    report.destroyed_blocks += 1;
                }
            }
        }
    }

    let mut index = 0;
    world.updating.retain(|_| {
        let keep = !destroyed[index];
        index += 1;
        keep
    });

    let mut rockets = Vec::with_capacity(mines.len() * Direction::ALL.len());
    for mine in &mines {
        report.detonated.push(mine.position);
        rockets.extend(detonation_rockets(world, mine));
    }
    launch(world, rockets, &mut report, &mut victims);

    report.killed = world.kill_players(&victims);
    if !report.is_empty() {
        world.mark_changed();
    }
    report
}

/// Put a rocket fired by a player onto the board
///
/// The rocket first moves on the next tick. If its spawn cell is already
/// occupied it strikes the occupant straight away.
pub fn fire_rocket(world: &mut World, rocket: Block) -> CollisionReport {
    let mut report = CollisionReport::default();
    let mut victims: SmallVec<[PlayerId; 4]> = SmallVec::new();
    launch(world, [rocket], &mut report, &mut victims);
    report.killed = world.kill_players(&victims);
    report
}

/// The 8 rockets of a detonating mine, one cell outward in every direction
fn detonation_rockets(world: &mut World, mine: &Block) -> SmallVec<[Block; 8]> {
    let size = world.size;
    Direction::ALL
        .iter()
        .map(|&direction| {
            world.spawn_block(
                BlockKind::Rocket,
                mine.position.offset(direction, size),
                direction,
                mine.owner,
            )
        })
        .collect()
}

/// Place new rockets, resolving occupied spawn cells immediately
///
/// A rocket spawning on an occupied cell is destroyed with the occupant.
/// Struck mines detonate in turn, so mine fields chain.
fn launch(
    world: &mut World,
    rockets: impl IntoIterator<Item = Block>,
    report: &mut CollisionReport,
    victims: &mut SmallVec<[PlayerId; 4]>,
) {
    let mut pending: VecDeque<Block> = rockets.into_iter().collect();

    while let Some(rocket) = pending.pop_front() {
        let position = rocket.position;

        if let Some(hit) = world.static_blocks.remove(&position) {
            report.destroyed_blocks += 2;
            world.mark_changed();
            if hit.kind == BlockKind::Mine {
                report.detonated.push(position);
                pending.extend(detonation_rockets(world, &hit));
            }
            continue;
        }

        if let Some(index) = world.updating.iter().position(|b| b.position == position) {
            let hit = world.updating.remove(index);
            report.destroyed_blocks += 2;
            world.mark_changed();
            if hit.kind == BlockKind::PlayerHead {
                if let Some(owner) = hit.owner {
                    victims.push(owner);
                }
            }
            continue;
        }

        world.push_updating(rocket);
    }
}
