//! Static world generation and spawn placement

use rand::seq::SliceRandom;
use rand::Rng;

use crate::game::rules::Rules;
use crate::game::state::{BlockKind, World};
use crate::util::coord::{Coordinate, Direction};

/// What a rebuild placed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaStats {
    pub walls: usize,
    pub ammo: usize,
    pub mines: usize,
}

/// Rebuild the static map from empty
///
/// Walls form a one-cell border when enabled. Ammo (limited ammo only) and
/// mines are scattered over the remaining cells with one roll per cell, so
/// each kind follows its own configured density on average and a cell never
/// gets both. Cells held by updating blocks are skipped.
pub fn rebuild(world: &mut World, rules: &Rules, rng: &mut impl Rng) -> ArenaStats {
    let mut stats = ArenaStats::default();
    if !world.static_blocks.is_empty() {
        world.static_blocks.clear();
        world.mark_changed();
    }

    let size = world.size;
    if rules.walls {
        for y in 0..size.y {
            for x in 0..size.x {
                let cell = Coordinate::new(x, y);
                if !cell.is_interior(size) && place(world, BlockKind::Wall, cell) {
                    stats.walls += 1;
                }
            }
        }
    }

    let ammo_density = if rules.scatters_ammo() { rules.ammo_density } else { 0.0 };
    let mine_density = if rules.mines { rules.mine_density } else { 0.0 };
    if ammo_density <= 0.0 && mine_density <= 0.0 {
        return stats;
    }

    for y in 0..size.y {
        for x in 0..size.x {
            let cell = Coordinate::new(x, y);
            if !world.is_free(cell) {
                continue;
            }
            // One roll per cell: [0, ammo) is ammo, [ammo, ammo + mine) is a mine
            let roll: f64 = rng.gen();
            if roll < ammo_density {
                if place(world, BlockKind::Ammo, cell) {
                    stats.ammo += 1;
                }
            } else if roll < ammo_density + mine_density && place(world, BlockKind::Mine, cell) {
                stats.mines += 1;
            }
        }
    }

    stats
}

fn place(world: &mut World, kind: BlockKind, cell: Coordinate) -> bool {
    let block = world.spawn_block(kind, cell, Direction::ZERO, None);
    world.place_static(block)
}

/// A uniformly random free interior cell, or `None` when the board is full
pub fn spawn_point(world: &World, rng: &mut impl Rng) -> Option<Coordinate> {
    world.free_interior_cells().choose(rng).copied()
}
