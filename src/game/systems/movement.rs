//! Entity aging and movement
//!
//! Tails and rockets expire by age; heads advance every N-th round tick,
//! leaving a tail segment behind; rockets advance every tick.

use smallvec::SmallVec;

use crate::game::rules::Rules;
use crate::game::state::{BlockKind, World};
use crate::util::coord::{Coordinate, Direction};

/// Remove tails and rockets that have outlived their age limit
///
/// Wreckage tails in the static map age out with the same threshold as live
/// tails. Returns the number of blocks removed.
pub fn expire(world: &mut World, rules: &Rules) -> usize {
    let tick = world.tick;
    let tail_threshold = rules.tail_threshold(world.round_tick);

    let before = world.updating.len();
    world.updating.retain(|block| match block.kind {
        BlockKind::PlayerTail => block.age(tick) < tail_threshold,
        BlockKind::Rocket => block.age(tick) < rules.rocket_max_age,
        BlockKind::PlayerHead | BlockKind::Wall | BlockKind::Ammo | BlockKind::Mine => true,
    });
    let mut removed = before - world.updating.len();

    let expired_wreckage: Vec<Coordinate> = world
        .static_blocks
        .values()
        .filter(|b| b.kind == BlockKind::PlayerTail && b.age(tick) >= tail_threshold)
        .map(|b| b.position)
        .collect();
    for position in expired_wreckage {
        world.static_blocks.remove(&position);
        removed += 1;
    }

    if removed > 0 {
        world.mark_changed();
    }
    removed
}

/// Advance every mobile block by one step where due
///
/// On head-move ticks each head first takes its owner's buffered direction,
/// drops a tail at its current cell, then moves. Rockets move every tick.
/// New tails are appended after existing blocks so id order is preserved.
pub fn advance(world: &mut World, rules: &Rules) -> usize {
    let size = world.size;
    let mut moved = 0;

    if rules.is_head_move_tick(world.round_tick) {
        let heads: SmallVec<[usize; 16]> = world
            .updating
            .iter()
            .enumerate()
            .filter(|(_, b)| b.kind == BlockKind::PlayerHead)
            .map(|(i, _)| i)
            .collect();

        let mut new_tails = Vec::with_capacity(heads.len());
        for index in heads {
            let (owner, position) = {
                let head = &world.updating[index];
                (head.owner, head.position)
            };

            let buffered = owner
                .and_then(|id| world.players.get_mut(&id))
                .and_then(|player| player.pending_direction.take());
            if let Some(direction) = buffered {
                world.updating[index].direction = direction;
            }

            new_tails.push(world.spawn_block(BlockKind::PlayerTail, position, Direction::ZERO, owner));

            let head = &mut world.updating[index];
            head.position = head.position.offset(head.direction, size);
            moved += 1;
        }
        world.updating.extend(new_tails);
    }

    for rocket in world.updating.iter_mut().filter(|b| b.kind == BlockKind::Rocket) {
        rocket.position = rocket.position.offset(rocket.direction, size);
        moved += 1;
    }

    if moved > 0 {
        world.mark_changed();
    }
    moved
}
