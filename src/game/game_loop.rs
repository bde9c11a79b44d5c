//! Match state machine and tick stepping
//!
//! `GameLoop` owns the world and is the only thing that mutates it. Each
//! `step()` runs exactly one tick for the current stage; player calls are
//! applied between steps.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{GameConfig, MIN_WORLD_SIDE};
use crate::game::constants::round::MIN_PLAYERS;
use crate::game::performance::PerformanceMonitor;
use crate::game::rules::Rules;
use crate::game::state::{BlockKind, PlayerId, Stage, World};
use crate::game::systems::collision::{self, CollisionReport};
use crate::game::systems::{arena, movement};
use crate::util::coord::{Coordinate, Direction};

/// Something the room should log or count
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameLoopEvent {
    StageChanged { from: Stage, to: Stage },
    PlayerKilled { player_id: PlayerId },
    MineDetonated { position: Coordinate },
    AmmoCollected { player_id: PlayerId, position: Coordinate },
    RocketFired { player_id: PlayerId, position: Coordinate },
}

/// No free interior cell is left for a new head
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Arena is full, no free cell to spawn in")]
pub struct ArenaFull;

pub struct GameLoop {
    world: World,
    rules: Rules,
    rng: StdRng,
    /// Ticks left in the current ROUND_START / ROUND_END pause
    pause_remaining: u32,
    rounds_started: u64,
    performance: PerformanceMonitor,
    events: Vec<GameLoopEvent>,
}

impl GameLoop {
    pub fn new(config: &GameConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        if config.width < MIN_WORLD_SIDE || config.height < MIN_WORLD_SIDE {
            warn!(
                "Arena {}x{} is below the {}x{} minimum, clamping",
                config.width, config.height, MIN_WORLD_SIDE, MIN_WORLD_SIDE
            );
        }
        let size = Coordinate::new(config.width.max(MIN_WORLD_SIDE), config.height.max(MIN_WORLD_SIDE));
        Self {
            world: World::new(size),
            rules: Rules::from_config(config),
            rng,
            pause_remaining: 0,
            rounds_started: 0,
            performance: PerformanceMonitor::new(config.tick_interval),
            events: Vec::new(),
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn stage(&self) -> Stage {
        self.world.stage
    }

    pub fn pause_remaining(&self) -> u32 {
        self.pause_remaining
    }

    pub fn rounds_started(&self) -> u64 {
        self.rounds_started
    }

    pub fn performance(&self) -> &PerformanceMonitor {
        &self.performance
    }

    /// Events produced since the last call
    pub fn take_events(&mut self) -> Vec<GameLoopEvent> {
        std::mem::take(&mut self.events)
    }

    // ------------------------------------------------------------------
    // Player calls
    // ------------------------------------------------------------------

    /// Add a player, spawning a head right away in the lobby or before a round
    ///
    /// Players joining a running round wait, dead, for the next round start.
    pub fn add_player(&mut self, name: String) -> Result<PlayerId, ArenaFull> {
        let spawn_now = matches!(self.world.stage, Stage::CollectPlayers | Stage::RoundStart);
        let position = if spawn_now {
            Some(arena::spawn_point(&self.world, &mut self.rng).ok_or(ArenaFull)?)
        } else {
            None
        };

        let player_id = self.world.add_player(name);
        if let Some(position) = position {
            self.world.spawn_head(player_id, position);
        }
        Ok(player_id)
    }

    /// Remove a player, killing its head first if it is alive
    pub fn remove_player(&mut self, player_id: PlayerId) -> bool {
        let was_alive = self.world.get_player(player_id).is_some_and(|p| p.alive);
        let removed = self.world.remove_player(player_id).is_some();
        if removed && was_alive {
            self.events.push(GameLoopEvent::PlayerKilled { player_id });
        }
        removed
    }

    /// Buffer a direction change for the player's next head advance
    pub fn steer(&mut self, player_id: PlayerId, direction: Direction) {
        if let Some(player) = self.world.get_player_mut(player_id) {
            player.pending_direction = Some(direction);
        }
    }

    /// The player's action button: start the round from the lobby, fire during a round
    pub fn action(&mut self, player_id: PlayerId) {
        if !self.world.players.contains_key(&player_id) {
            return;
        }
        match self.world.stage {
            Stage::CollectPlayers => {
                self.start_requested();
            }
            Stage::Round => self.fire(player_id),
            Stage::RoundStart | Stage::RoundEnd => {}
        }
    }

    /// Leave the lobby if enough players are registered
    pub fn start_requested(&mut self) -> bool {
        if self.world.stage != Stage::CollectPlayers {
            return false;
        }
        if self.world.players.len() < MIN_PLAYERS {
            debug!(
                "Start ignored, {} of {} players registered",
                self.world.players.len(),
                MIN_PLAYERS
            );
            return false;
        }
        self.enter_round_start();
        true
    }

    /// Launch a rocket one cell ahead of the player's head
    pub fn fire(&mut self, player_id: PlayerId) {
        if self.world.stage != Stage::Round {
            return;
        }
        let Some((position, direction)) = self
            .world
            .head_of(player_id)
            .map(|head| (head.position, head.direction))
        else {
            return;
        };

        if !self.rules.unlimited_ammo {
            let Some(player) = self.world.get_player_mut(player_id) else {
                return;
            };
            if player.take_rocket().is_none() {
                return;
            }
            self.world.mark_changed();
        }

        let spawn_at = position.offset(direction, self.world.size);
        let rocket = self
            .world
            .spawn_block(BlockKind::Rocket, spawn_at, direction, Some(player_id));
        self.events.push(GameLoopEvent::RocketFired {
            player_id,
            position: spawn_at,
        });
        let report = collision::fire_rocket(&mut self.world, rocket);
        self.record_collisions(&report);
    }

    // ------------------------------------------------------------------
    // Ticking
    // ------------------------------------------------------------------

    /// Run exactly one simulation tick
    pub fn step(&mut self) -> Vec<GameLoopEvent> {
        self.performance.tick_start();
        self.world.tick += 1;

        match self.world.stage {
            Stage::CollectPlayers => {}
            Stage::RoundStart => {
                self.pause_remaining = self.pause_remaining.saturating_sub(1);
                if self.pause_remaining == 0 {
                    self.set_stage(Stage::Round);
                }
            }
            Stage::Round => self.simulate(),
            Stage::RoundEnd => {
                self.pause_remaining = self.pause_remaining.saturating_sub(1);
                if self.pause_remaining == 0 {
                    if self.world.players.len() >= MIN_PLAYERS {
                        self.enter_round_start();
                    } else {
                        self.enter_collect_players();
                    }
                }
            }
        }

        self.performance.tick_end();
        if cfg!(feature = "profiling") {
            if let Some(lines) = self.performance.take_report(Instant::now()) {
                let status = self.performance.status_message();
                if self.performance.status().is_behind() {
                    warn!("Tick profile ({}):\n{}", status, lines.join("\n"));
                } else {
                    info!("Tick profile ({}):\n{}", status, lines.join("\n"));
                }
            }
        }
        self.take_events()
    }

    fn simulate(&mut self) {
        self.world.round_tick += 1;

        self.performance
            .time("expire", || movement::expire(&mut self.world, &self.rules));
        self.performance
            .time("advance", || movement::advance(&mut self.world, &self.rules));
        let report = self
            .performance
            .time("collision", || collision::resolve(&mut self.world, &self.rules));
        self.record_collisions(&report);

        if self.world.alive_count() <= 1 {
            if let Some(winner) = self.world.alive_players().next() {
                info!("Round {} won by {}", self.rounds_started, winner.name);
            } else {
                info!("Round {} ended with no survivors", self.rounds_started);
            }
            self.pause_remaining = self.rules.pause_ticks;
            self.set_stage(Stage::RoundEnd);
        }
    }

    fn record_collisions(&mut self, report: &CollisionReport) {
        for &player_id in &report.killed {
            self.events.push(GameLoopEvent::PlayerKilled { player_id });
        }
        for &position in &report.detonated {
            self.events.push(GameLoopEvent::MineDetonated { position });
        }
        for &(player_id, position) in &report.ammo_collected {
            self.events.push(GameLoopEvent::AmmoCollected { player_id, position });
        }
    }

    fn set_stage(&mut self, to: Stage) {
        let from = self.world.stage;
        if from == to {
            return;
        }
        self.world.stage = to;
        self.world.mark_changed();
        debug!("Stage {:?} -> {:?} at tick {}", from, to, self.world.tick);
        self.events.push(GameLoopEvent::StageChanged { from, to });
    }

    /// Fresh arena, every registered player respawned, pause before the round
    fn enter_round_start(&mut self) {
        self.rounds_started += 1;
        self.world.updating.clear();
        self.world.round_tick = 0;
        let stats = arena::rebuild(&mut self.world, &self.rules, &mut self.rng);

        for player in self.world.players.values_mut() {
            player.alive = false;
            player.pending_direction = None;
            player.inventory.clear();
        }
        let spawned = self.respawn_all();

        info!(
            "Round {} starting: {} players, {} walls, {} ammo, {} mines",
            self.rounds_started, spawned, stats.walls, stats.ammo, stats.mines
        );
        self.pause_remaining = self.rules.pause_ticks;
        self.set_stage(Stage::RoundStart);
    }

    /// Empty board with every registered player's head waiting in the lobby
    fn enter_collect_players(&mut self) {
        self.world.clear_board();
        self.world.round_tick = 0;
        for player in self.world.players.values_mut() {
            player.alive = false;
            player.pending_direction = None;
        }
        self.respawn_all();

        info!("Back to lobby with {} players", self.world.players.len());
        self.pause_remaining = 0;
        self.set_stage(Stage::CollectPlayers);
    }

    fn respawn_all(&mut self) -> usize {
        let ids: Vec<PlayerId> = self.world.players.keys().copied().collect();
        let mut spawned = 0;
        for player_id in ids {
            match arena::spawn_point(&self.world, &mut self.rng) {
                Some(position) => {
                    self.world.spawn_head(player_id, position);
                    spawned += 1;
                }
                None => warn!("No free cell to respawn player {}", player_id),
            }
        }
        self.world.mark_changed();
        spawned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GameConfig {
        GameConfig {
            width: 12,
            height: 12,
            mines: false,
            ammo: false,
            seed: Some(5),
            ..GameConfig::default()
        }
    }

    fn lobby(names: &[&str]) -> (GameLoop, Vec<PlayerId>) {
        let mut game = GameLoop::new(&config());
        let ids = names
            .iter()
            .map(|name| game.add_player(name.to_string()).unwrap())
            .collect();
        (game, ids)
    }

    fn run_pause(game: &mut GameLoop) -> Vec<GameLoopEvent> {
        let mut events = Vec::new();
        for _ in 0..game.rules().pause_ticks {
            events.extend(game.step());
        }
        events
    }

    /// Put a player's head at a fixed cell, facing `direction`
    fn place_head(game: &mut GameLoop, id: PlayerId, at: Coordinate, direction: Direction) {
        let head = game
            .world_mut()
            .updating
            .iter_mut()
            .find(|b| b.kind == BlockKind::PlayerHead && b.is_owned_by(id))
            .unwrap();
        head.position = at;
        head.direction = direction;
    }

    #[test]
    fn test_lobby_spawns_heads_immediately() {
        let (game, ids) = lobby(&["a", "b"]);
        assert_eq!(game.stage(), Stage::CollectPlayers);
        for id in ids {
            assert!(game.world().get_player(id).unwrap().alive);
            assert!(game.world().head_of(id).is_some());
        }
    }

    #[test]
    fn test_lobby_heads_do_not_move() {
        let (mut game, ids) = lobby(&["a", "b"]);
        let before = game.world().head_of(ids[0]).unwrap().position;
        for _ in 0..10 {
            game.step();
        }
        assert_eq!(game.world().head_of(ids[0]).unwrap().position, before);
    }

    #[test]
    fn test_start_requires_two_players() {
        let (mut game, ids) = lobby(&["solo"]);
        game.action(ids[0]);
        assert_eq!(game.stage(), Stage::CollectPlayers);

        game.add_player("second".into()).unwrap();
        game.action(ids[0]);
        assert_eq!(game.stage(), Stage::RoundStart);
        assert_eq!(game.rounds_started(), 1);
    }

    #[test]
    fn test_round_start_builds_arena_and_pauses() {
        let (mut game, ids) = lobby(&["a", "b"]);
        game.start_requested();

        let world = game.world();
        assert!(world.static_blocks.values().any(|b| b.kind == BlockKind::Wall));
        for &id in &ids {
            let head = world.head_of(id).unwrap();
            assert!(head.position.is_interior(world.size));
        }

        let before: Vec<_> = ids.iter().map(|&id| game.world().head_of(id).unwrap().position).collect();
        let events = run_pause(&mut game);
        assert_eq!(game.stage(), Stage::Round);
        assert!(events.contains(&GameLoopEvent::StageChanged {
            from: Stage::RoundStart,
            to: Stage::Round,
        }));
        let after: Vec<_> = ids.iter().map(|&id| game.world().head_of(id).unwrap().position).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_mid_round_join_waits_for_next_round() {
        let (mut game, _) = lobby(&["a", "b"]);
        game.start_requested();
        run_pause(&mut game);

        let late = game.add_player("late".into()).unwrap();
        let info = game.world().get_player(late).unwrap();
        assert!(!info.alive);
        assert!(game.world().head_of(late).is_none());
    }

    #[test]
    fn test_round_ends_when_one_player_left() {
        let (mut game, ids) = lobby(&["a", "b"]);
        game.start_requested();
        run_pause(&mut game);

        game.world_mut().kill_players(&[ids[0]]);
        game.step();
        assert_eq!(game.stage(), Stage::RoundEnd);
        assert_eq!(game.world().get_player(ids[1]).unwrap().score, 1);

        // Still two registered: loop straight into the next round
        run_pause(&mut game);
        assert_eq!(game.stage(), Stage::RoundStart);
        assert_eq!(game.rounds_started(), 2);
        assert!(game.world().get_player(ids[0]).unwrap().alive);
        assert_eq!(game.world().get_player(ids[1]).unwrap().score, 1);
    }

    #[test]
    fn test_round_end_returns_to_lobby_below_two_players() {
        let (mut game, ids) = lobby(&["a", "b"]);
        game.start_requested();
        run_pause(&mut game);

        assert!(game.remove_player(ids[0]));
        game.step();
        assert_eq!(game.stage(), Stage::RoundEnd);

        run_pause(&mut game);
        assert_eq!(game.stage(), Stage::CollectPlayers);
        assert!(game.world().static_blocks.is_empty());
        assert!(game.world().head_of(ids[1]).is_some());
        assert!(game.world().get_player(ids[1]).unwrap().alive);
    }

    #[test]
    fn test_fire_uses_inventory() {
        let (mut game, ids) = lobby(&["a", "b"]);
        game.start_requested();
        run_pause(&mut game);
        place_head(&mut game, ids[0], Coordinate::new(3, 3), Direction::RIGHT);
        place_head(&mut game, ids[1], Coordinate::new(3, 8), Direction::RIGHT);

        // No rockets yet
        game.action(ids[0]);
        assert_eq!(game.world().rocket_count(), 0);

        game.world_mut().get_player_mut(ids[0]).unwrap().add_rockets(2);
        game.action(ids[0]);
        assert_eq!(game.world().get_player(ids[0]).unwrap().rocket_count(), 1);

        let rocket = game
            .world()
            .updating
            .iter()
            .find(|b| b.kind == BlockKind::Rocket)
            .unwrap();
        assert_eq!(rocket.position, Coordinate::new(4, 3));
        assert_eq!(rocket.direction, Direction::RIGHT);
        assert_eq!(rocket.owner, Some(ids[0]));

        let events = game.take_events();
        assert!(events.contains(&GameLoopEvent::RocketFired {
            player_id: ids[0],
            position: Coordinate::new(4, 3),
        }));
    }

    #[test]
    fn test_unlimited_ammo_fires_without_inventory() {
        let mut game = GameLoop::new(&GameConfig {
            unlimited_ammo: true,
            ..config()
        });
        let a = game.add_player("a".into()).unwrap();
        let b = game.add_player("b".into()).unwrap();
        game.start_requested();
        run_pause(&mut game);
        place_head(&mut game, a, Coordinate::new(2, 3), Direction::RIGHT);
        place_head(&mut game, b, Coordinate::new(2, 8), Direction::RIGHT);

        game.action(a);
        game.step();
        game.action(a);
        assert_eq!(game.world().rocket_count(), 2);
        assert_eq!(game.world().get_player(a).unwrap().rocket_count(), 0);
    }

    #[test]
    fn test_action_ignored_during_pauses() {
        let mut game = GameLoop::new(&GameConfig {
            unlimited_ammo: true,
            ..config()
        });
        let a = game.add_player("a".into()).unwrap();
        let b = game.add_player("b".into()).unwrap();
        game.start_requested();
        game.world_mut().commit_version();
        game.take_events();

        let version = game.world().version();
        game.action(a);
        assert_eq!(game.stage(), Stage::RoundStart);
        assert_eq!(game.world().rocket_count(), 0);
        assert!(game.take_events().is_empty());
        assert!(!game.world_mut().commit_version());
        assert_eq!(game.world().version(), version);

        run_pause(&mut game);
        game.world_mut().kill_players(&[b]);
        game.step();
        assert_eq!(game.stage(), Stage::RoundEnd);
        game.world_mut().commit_version();
        game.take_events();

        let version = game.world().version();
        game.action(a);
        assert_eq!(game.world().rocket_count(), 0);
        assert!(game.take_events().is_empty());
        assert!(!game.world_mut().commit_version());
        assert_eq!(game.world().version(), version);
    }

    #[test]
    fn test_undersized_arena_is_clamped() {
        let mut game = GameLoop::new(&GameConfig {
            width: 0,
            height: -3,
            ..config()
        });
        assert_eq!(game.world().size, Coordinate::new(MIN_WORLD_SIDE, MIN_WORLD_SIDE));
        let id = game.add_player("a".into()).unwrap();
        assert!(game.world().head_of(id).unwrap().position.is_interior(game.world().size));
    }

    #[test]
    fn test_rocket_kills_opponent() {
        let (mut game, ids) = lobby(&["a", "b"]);
        game.start_requested();
        run_pause(&mut game);
        place_head(&mut game, ids[0], Coordinate::new(2, 5), Direction::RIGHT);
        place_head(&mut game, ids[1], Coordinate::new(4, 5), Direction::UP);
        game.world_mut().get_player_mut(ids[0]).unwrap().add_rockets(1);

        // Rocket spawns at (3,5) and flies into (4,5) on a tick heads stay put
        game.action(ids[0]);
        let events = game.step();

        assert!(events.contains(&GameLoopEvent::PlayerKilled { player_id: ids[1] }));
        assert_eq!(game.world().get_player(ids[0]).unwrap().score, 1);
        assert_eq!(game.stage(), Stage::RoundEnd);
    }

    #[test]
    fn test_seeded_arenas_repeat() {
        let config = GameConfig {
            width: 40,
            height: 20,
            seed: Some(99),
            ..GameConfig::default()
        };
        let build = || {
            let mut game = GameLoop::new(&config);
            game.add_player("a".into()).unwrap();
            game.add_player("b".into()).unwrap();
            game.start_requested();
            let mut cells: Vec<_> = game.world().static_blocks.keys().copied().collect();
            cells.sort();
            cells
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_arena_full_rejects_player() {
        let mut game = GameLoop::new(&GameConfig {
            width: 4,
            height: 4,
            ..config()
        });
        for i in 0..4 {
            game.add_player(format!("p{}", i)).unwrap();
        }
        assert_eq!(game.add_player("one too many".into()), Err(ArenaFull));
        assert_eq!(game.world().players.len(), 4);
    }
}
