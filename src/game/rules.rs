//! Tick-denominated rules derived from the configuration

use crate::config::GameConfig;
use crate::game::constants::{arena, rocket, tail};

/// Everything the per-tick systems need to know, in ticks rather than seconds
#[derive(Debug, Clone)]
pub struct Rules {
    pub head_move_interval: u64,
    pub tail_length: u64,
    /// Round ticks per extra tail segment
    pub tail_growth_period: u64,
    pub rocket_max_age: u64,
    pub rocket_batch: usize,
    pub pause_ticks: u32,
    pub walls: bool,
    pub mines: bool,
    pub ammo: bool,
    pub unlimited_ammo: bool,
    pub ammo_density: f64,
    pub mine_density: f64,
}

impl Rules {
    pub fn from_config(config: &GameConfig) -> Self {
        Self {
            head_move_interval: config.head_move_interval.max(1) as u64,
            tail_length: config.tail_length as u64,
            tail_growth_period: config.ticks_for(tail::GROWTH_PERIOD),
            rocket_max_age: rocket::MAX_AGE,
            rocket_batch: rocket::BATCH_SIZE,
            pause_ticks: config.stage_pause_ticks(),
            walls: config.walls,
            mines: config.mines,
            ammo: config.ammo,
            unlimited_ammo: config.unlimited_ammo,
            ammo_density: arena::AMMO_DENSITY,
            mine_density: arena::MINE_DENSITY,
        }
    }

    /// Age at which a tail segment disappears
    ///
    /// Starts at `tail_length` segments and gains one segment per growth
    /// period of round time.
    pub fn tail_threshold(&self, round_tick: u64) -> u64 {
        let segments = self.tail_length + round_tick / self.tail_growth_period.max(1);
        segments * self.head_move_interval
    }

    /// Heads advance on the N-th, 2N-th, ... tick of a round
    pub fn is_head_move_tick(&self, round_tick: u64) -> bool {
        round_tick > 0 && round_tick % self.head_move_interval == 0
    }

    /// Ammo pickups only exist when firing consumes inventory
    pub fn scatters_ammo(&self) -> bool {
        self.ammo && !self.unlimited_ammo
    }
}

impl Default for Rules {
    fn default() -> Self {
        Self::from_config(&GameConfig::default())
    }
}
