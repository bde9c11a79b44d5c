use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::GameConfig;
use crate::game::game_loop::{ArenaFull, GameLoop, GameLoopEvent};
use crate::game::input_buffer::{Command, CommandBuffer, CommandSender};
use crate::game::scheduler::TickScheduler;
use crate::game::state::{PlayerId, Stage, World};
use crate::lobby::session::SessionTable;
use crate::metrics::Metrics;
use crate::net::snapshot::{GameStateResponse, SnapshotCache};
use crate::util::coord::Direction;

/// The room behind one lock, for hosts calling in from several threads
pub type SharedRoom = Arc<parking_lot::Mutex<GameRoom>>;

/// Successful registration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Registered {
    pub player_id: PlayerId,
    pub name: String,
}

/// The single authoritative arena
///
/// Every player call and every tick runs to completion before the next one
/// starts, and commits at most one state version bump.
pub struct GameRoom {
    game_loop: GameLoop,
    sessions: SessionTable,
    snapshots: SnapshotCache,
    scheduler: TickScheduler,
    commands: CommandBuffer,
    metrics: Arc<Metrics>,
}

impl GameRoom {
    pub fn new(config: &GameConfig) -> Self {
        Self::with_metrics(config, Arc::new(Metrics::new()))
    }

    pub fn with_metrics(config: &GameConfig, metrics: Arc<Metrics>) -> Self {
        let room = Self {
            game_loop: GameLoop::new(config),
            sessions: SessionTable::new(),
            snapshots: SnapshotCache::new(),
            scheduler: TickScheduler::new(config.tick_interval),
            commands: CommandBuffer::default(),
            metrics,
        };
        room.metrics.observe_world(room.world());
        room
    }

    /// Wrap in the shared lock
    pub fn shared(self) -> SharedRoom {
        Arc::new(parking_lot::Mutex::new(self))
    }

    pub fn world(&self) -> &World {
        self.game_loop.world()
    }

    pub fn game_loop(&self) -> &GameLoop {
        &self.game_loop
    }

    pub fn game_loop_mut(&mut self) -> &mut GameLoop {
        &mut self.game_loop
    }

    pub fn stage(&self) -> Stage {
        self.game_loop.stage()
    }

    pub fn version(&self) -> u64 {
        self.world().version()
    }

    pub fn player_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn player_id(&self, secret: &str) -> Option<PlayerId> {
        self.sessions.player_for(secret)
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Handle for queueing fire-and-forget calls without the room lock
    pub fn command_sender(&self) -> CommandSender {
        self.commands.sender()
    }

    // ------------------------------------------------------------------
    // Player calls
    // ------------------------------------------------------------------

    /// Register a new player under `secret`
    pub fn register(&mut self, secret: &str, name: &str) -> Result<Registered, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(self.reject(ValidationError::EmptyName));
        }
        if self.sessions.has_secret(secret) {
            return Err(self.reject(ValidationError::AlreadyRegistered));
        }
        if self.sessions.name_taken(name) {
            return Err(self.reject(ValidationError::NameTaken(name.to_string())));
        }

        let player_id = self
            .game_loop
            .add_player(name.to_string())
            .map_err(|e| self.reject(e.into()))?;
        self.sessions.insert(secret.to_string(), name.to_string(), player_id);
        info!("Player {} registered as {} ({:?})", name, player_id, self.stage());

        self.finish_call();
        Ok(Registered {
            player_id,
            name: name.to_string(),
        })
    }

    /// Remove the player registered under `secret`, if any
    pub fn unregister(&mut self, secret: &str) {
        let Some(player_id) = self.sessions.player_for(secret) else {
            return;
        };
        let name = self.sessions.name_of(player_id).unwrap_or_default().to_string();
        self.sessions.remove(secret);
        self.game_loop.remove_player(player_id);
        info!("Player {} ({}) unregistered", name, player_id);
        self.finish_call();
    }

    /// Buffer a direction change, applied at the player's next head advance
    ///
    /// The delta is validated even for unknown secrets.
    pub fn move_player(&mut self, secret: &str, dx: i32, dy: i32) -> Result<(), ValidationError> {
        let Some(direction) = Direction::new(dx, dy).filter(|d| !d.is_zero()) else {
            return Err(self.reject(ValidationError::IllegalMove { dx, dy }));
        };
        if let Some(player_id) = self.sessions.player_for(secret) {
            self.game_loop.steer(player_id, direction);
        }
        Ok(())
    }

    /// Start the round from the lobby, or fire during a round
    pub fn action(&mut self, secret: &str) {
        let Some(player_id) = self.sessions.player_for(secret) else {
            return;
        };
        self.game_loop.action(player_id);
        self.finish_call();
    }

    /// Poll for state; `Unchanged` when the caller already holds the current version
    pub fn game_state(&mut self, since_version: u64) -> GameStateResponse {
        let response = self
            .snapshots
            .respond(self.game_loop.world_mut(), since_version);
        self.metrics
            .snapshots_built
            .store(self.snapshots.builds(), Ordering::Relaxed);
        response
    }

    // ------------------------------------------------------------------
    // Driving
    // ------------------------------------------------------------------

    /// Apply queued commands and run every tick owed by wall-clock time
    pub fn update(&mut self) -> u32 {
        self.update_at(Instant::now())
    }

    /// `update` with an explicit clock, returns the number of ticks run
    pub fn update_at(&mut self, now: Instant) -> u32 {
        self.apply_commands();

        let due = self.scheduler.ticks_due(now);
        for _ in 0..due {
            self.tick();
        }
        self.metrics.record_catch_up(due);
        self.metrics.observe_performance(self.game_loop.performance());
        due
    }

    /// Run exactly one tick, ignoring the wall clock
    pub fn tick(&mut self) {
        let start = Instant::now();
        let events = self.game_loop.step();
        self.game_loop.world_mut().commit_version();
        self.metrics.record_tick_time(start.elapsed());
        self.handle_events(events);
        self.metrics.observe_world(self.game_loop.world());
    }

    /// Drain the command buffer, applying commands in submission order
    pub fn apply_commands(&mut self) -> usize {
        let commands = self.commands.drain();
        let count = commands.len();
        for command in commands {
            match command {
                Command::Move { secret, dx, dy } => {
                    // Rejections are counted and logged by move_player
                    let _ = self.move_player(&secret, dx, dy);
                }
                Command::Action { secret } => self.action(&secret),
                Command::Unregister { secret } => self.unregister(&secret),
            }
        }
        count
    }

    fn reject(&self, err: ValidationError) -> ValidationError {
        self.metrics.commands_rejected.fetch_add(1, Ordering::Relaxed);
        debug!("Call rejected: {}", err);
        err
    }

    /// Commit the version and publish whatever the call changed
    fn finish_call(&mut self) {
        let events = self.game_loop.take_events();
        self.game_loop.world_mut().commit_version();
        self.handle_events(events);
        self.metrics.observe_world(self.game_loop.world());
    }

    fn handle_events(&self, events: Vec<GameLoopEvent>) {
        for event in &events {
            self.metrics.record_event(event);
            match event {
                GameLoopEvent::StageChanged { from, to } => {
                    info!("Stage {:?} -> {:?}", from, to);
                    if *to == Stage::RoundStart {
                        self.metrics.rounds_started.store(
                            self.game_loop.rounds_started(),
                            Ordering::Relaxed,
                        );
                    }
                }
                GameLoopEvent::PlayerKilled { player_id } => {
                    match self.world().get_player(*player_id) {
                        Some(player) => info!("Player {} ({}) killed", player.name, player_id),
                        None => info!("Player {} killed on leaving", player_id),
                    }
                }
                GameLoopEvent::MineDetonated { position } => debug!("Mine detonated at {}", position),
                GameLoopEvent::AmmoCollected { player_id, position } => {
                    debug!("Player {} collected ammo at {}", player_id, position)
                }
                GameLoopEvent::RocketFired { player_id, position } => {
                    debug!("Player {} fired a rocket at {}", player_id, position)
                }
            }
        }
    }
}

/// Player-facing call errors
///
/// Returned synchronously to the caller; the world is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Player name must not be empty")]
    EmptyName,
    #[error("Player name {0} is already taken")]
    NameTaken(String),
    #[error("Player already registered")]
    AlreadyRegistered,
    #[error("Illegal move ({dx}, {dy}), each component must be -1, 0 or 1 and not both 0")]
    IllegalMove { dx: i32, dy: i32 },
    #[error(transparent)]
    ArenaFull(#[from] ArenaFull),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::BlockKind;
    use crate::util::coord::Coordinate;
    use std::time::Duration;

    fn config() -> GameConfig {
        GameConfig {
            width: 10,
            height: 10,
            mines: false,
            ammo: false,
            seed: Some(3),
            ..GameConfig::default()
        }
    }

    fn room_with(names: &[&str]) -> (GameRoom, Vec<PlayerId>) {
        let mut room = GameRoom::new(&config());
        let ids = names
            .iter()
            .map(|name| room.register(&format!("secret-{}", name), name).unwrap().player_id)
            .collect();
        (room, ids)
    }

    /// Start the round and sit through the ROUND_START pause
    fn start_round(room: &mut GameRoom, starter: &str) {
        room.action(&format!("secret-{}", starter));
        assert_eq!(room.stage(), Stage::RoundStart);
        for _ in 0..room.game_loop().rules().pause_ticks {
            room.tick();
        }
        assert_eq!(room.stage(), Stage::Round);
    }

    fn place_head(room: &mut GameRoom, id: PlayerId, at: Coordinate, direction: Direction) {
        let head = room
            .game_loop_mut()
            .world_mut()
            .updating
            .iter_mut()
            .find(|b| b.kind == BlockKind::PlayerHead && b.is_owned_by(id))
            .unwrap();
        head.position = at;
        head.direction = direction;
    }

    fn head_position(room: &GameRoom, id: PlayerId) -> Coordinate {
        room.world().head_of(id).unwrap().position
    }

    #[test]
    fn test_register_assigns_sequential_ids() {
        let (room, ids) = room_with(&["alice", "bob", "carol"]);
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(room.player_count(), 3);
        for id in ids {
            let head = room.world().head_of(id).unwrap();
            assert!(head.position.is_interior(room.world().size));
            assert_eq!(head.direction, Direction::RIGHT);
        }
    }

    #[test]
    fn test_register_duplicate_name_fails_without_change() {
        let (mut room, _) = room_with(&["alice"]);
        let version = room.version();

        let err = room.register("other-secret", "alice").unwrap_err();
        assert_eq!(err, ValidationError::NameTaken("alice".into()));
        assert_eq!(room.player_count(), 1);
        assert_eq!(room.world().players.len(), 1);
        assert_eq!(room.version(), version);
    }

    #[test]
    fn test_register_rejects_empty_name_and_reused_secret() {
        let (mut room, _) = room_with(&["alice"]);
        assert_eq!(room.register("x", "   "), Err(ValidationError::EmptyName));
        assert_eq!(
            room.register("secret-alice", "someone else"),
            Err(ValidationError::AlreadyRegistered)
        );
    }

    #[test]
    fn test_unregister_frees_name_and_kills() {
        let (mut room, ids) = room_with(&["alice", "bob"]);
        room.unregister("secret-alice");
        assert!(room.world().get_player(ids[0]).is_none());
        assert!(room.world().head_of(ids[0]).is_none());
        assert_eq!(room.world().get_player(ids[1]).unwrap().score, 1);

        let again = room.register("new-secret", "alice").unwrap();
        assert_eq!(again.player_id, 2);
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let (mut room, _) = room_with(&["alice"]);
        let version = room.version();
        room.unregister("nobody");
        assert_eq!(room.version(), version);
    }

    #[test]
    fn test_move_rejects_illegal_deltas() {
        let (mut room, _) = room_with(&["alice"]);
        for (dx, dy) in [(0, 0), (2, 0), (0, -2), (-3, 7)] {
            assert_eq!(
                room.move_player("secret-alice", dx, dy),
                Err(ValidationError::IllegalMove { dx, dy })
            );
        }
        // Unknown secret is silently ignored
        assert_eq!(room.move_player("nobody", 1, 0), Ok(()));
    }

    #[test]
    fn test_move_applies_on_next_head_advance_for_every_delta() {
        for direction in Direction::ALL {
            let (mut room, ids) = room_with(&["a", "b"]);
            start_round(&mut room, "a");
            place_head(&mut room, ids[0], Coordinate::new(5, 5), Direction::RIGHT);
            place_head(&mut room, ids[1], Coordinate::new(2, 1), Direction::RIGHT);

            let (dx, dy) = (direction.dx as i32, direction.dy as i32);
            room.move_player("secret-a", dx, dy).unwrap();

            room.tick();
            assert_eq!(head_position(&room, ids[0]), Coordinate::new(5, 5));
            room.tick();
            assert_eq!(head_position(&room, ids[0]), Coordinate::new(5 + dx, 5 + dy));
        }
    }

    #[test]
    fn test_last_move_before_advance_wins() {
        let (mut room, ids) = room_with(&["a", "b"]);
        start_round(&mut room, "a");
        place_head(&mut room, ids[0], Coordinate::new(5, 5), Direction::RIGHT);
        place_head(&mut room, ids[1], Coordinate::new(2, 1), Direction::RIGHT);

        room.move_player("secret-a", 0, 1).unwrap();
        room.move_player("secret-a", -1, 0).unwrap();
        room.tick();
        room.tick();
        assert_eq!(head_position(&room, ids[0]), Coordinate::new(4, 5));
    }

    #[test]
    fn test_head_into_wall_scores_everyone_else() {
        let (mut room, ids) = room_with(&["a", "b", "c"]);
        start_round(&mut room, "a");
        place_head(&mut room, ids[0], Coordinate::new(1, 5), Direction::LEFT);
        place_head(&mut room, ids[1], Coordinate::new(2, 2), Direction::RIGHT);
        place_head(&mut room, ids[2], Coordinate::new(2, 7), Direction::RIGHT);

        room.tick();
        room.tick();

        let world = room.world();
        assert!(!world.get_player(ids[0]).unwrap().alive);
        assert_eq!(world.get_player(ids[0]).unwrap().score, 0);
        assert_eq!(world.get_player(ids[1]).unwrap().score, 1);
        assert_eq!(world.get_player(ids[2]).unwrap().score, 1);
        assert_eq!(room.stage(), Stage::Round);
    }

    #[test]
    fn test_head_on_collision_kills_both() {
        let (mut room, ids) = room_with(&["a", "b", "c"]);
        start_round(&mut room, "a");
        // a and b meet at (5,4)
        place_head(&mut room, ids[0], Coordinate::new(4, 4), Direction::RIGHT);
        place_head(&mut room, ids[1], Coordinate::new(6, 4), Direction::LEFT);
        place_head(&mut room, ids[2], Coordinate::new(2, 7), Direction::RIGHT);

        room.tick();
        room.tick();

        let world = room.world();
        assert!(!world.get_player(ids[0]).unwrap().alive);
        assert!(!world.get_player(ids[1]).unwrap().alive);
        assert_eq!(world.get_player(ids[2]).unwrap().score, 2);
        // Their tails became wreckage
        assert_eq!(
            world.static_at(Coordinate::new(4, 4)).map(|b| b.kind),
            Some(BlockKind::PlayerTail)
        );
        assert_eq!(room.stage(), Stage::RoundEnd);
    }

    #[test]
    fn test_ammo_pickup_adds_rocket_batch() {
        let (mut room, ids) = room_with(&["a", "b"]);
        start_round(&mut room, "a");
        place_head(&mut room, ids[0], Coordinate::new(5, 5), Direction::RIGHT);
        place_head(&mut room, ids[1], Coordinate::new(2, 1), Direction::RIGHT);
        let world = room.game_loop_mut().world_mut();
        let ammo = world.spawn_block(BlockKind::Ammo, Coordinate::new(6, 5), Direction::ZERO, None);
        world.place_static(ammo);

        room.tick();
        room.tick();

        let batch = room.game_loop().rules().rocket_batch;
        let player = room.world().get_player(ids[0]).unwrap();
        assert!(player.alive);
        assert_eq!(player.inventory.len(), batch);
        assert!(room.world().static_at(Coordinate::new(6, 5)).is_none());
        assert_eq!(head_position(&room, ids[0]), Coordinate::new(6, 5));
    }

    #[test]
    fn test_game_state_unchanged_until_mutation() {
        let (mut room, _) = room_with(&["alice"]);
        let version = match room.game_state(0) {
            GameStateResponse::Snapshot(snapshot) => snapshot.version,
            GameStateResponse::Unchanged => panic!("expected snapshot"),
        };

        assert_eq!(room.game_state(version), GameStateResponse::Unchanged);
        assert_eq!(room.game_state(version), GameStateResponse::Unchanged);

        // Idle lobby ticks are not observable changes
        room.tick();
        assert_eq!(room.game_state(version), GameStateResponse::Unchanged);

        room.register("secret-bob", "bob").unwrap();
        match room.game_state(version) {
            GameStateResponse::Snapshot(snapshot) => {
                assert!(snapshot.version > version);
                assert_eq!(snapshot.players.len(), 2);
            }
            GameStateResponse::Unchanged => panic!("expected snapshot"),
        }
    }

    #[test]
    fn test_one_version_bump_per_call() {
        let (mut room, _) = room_with(&["alice", "bob"]);
        let before = room.version();
        room.action("secret-alice");
        assert_eq!(room.version(), before + 1);
    }

    #[test]
    fn test_walled_scenario_heads_advance_with_elapsed_ticks() {
        let config = config();
        let interval = config.tick_interval;
        let mut room = GameRoom::new(&config);
        let a = room.register("sa", "A").unwrap().player_id;
        let b = room.register("sb", "B").unwrap().player_id;

        let t0 = Instant::now();
        assert_eq!(room.update_at(t0), 0);
        room.action("sa");
        assert_eq!(room.stage(), Stage::RoundStart);

        let pause = room.game_loop().rules().pause_ticks;
        assert_eq!(room.update_at(t0 + interval * pause), pause);
        assert_eq!(room.stage(), Stage::Round);
        assert!(room.world().static_blocks.values().all(|b| b.kind == BlockKind::Wall));

        place_head(&mut room, a, Coordinate::new(2, 3), Direction::RIGHT);
        place_head(&mut room, b, Coordinate::new(2, 6), Direction::RIGHT);

        let elapsed: u32 = 5;
        let ran = room.update_at(t0 + interval * (pause + elapsed) + Duration::from_millis(1));
        assert_eq!(ran, elapsed);
        let advances = (elapsed / room.game_loop().rules().head_move_interval as u32) as i32;
        assert_eq!(head_position(&room, a), Coordinate::new(2 + advances, 3));
        assert_eq!(head_position(&room, b), Coordinate::new(2 + advances, 6));
    }

    #[test]
    fn test_back_to_lobby_when_too_few_players() {
        let (mut room, ids) = room_with(&["a", "b"]);
        start_round(&mut room, "a");

        room.unregister("secret-b");
        room.tick();
        assert_eq!(room.stage(), Stage::RoundEnd);

        for _ in 0..room.game_loop().rules().pause_ticks {
            room.tick();
        }
        assert_eq!(room.stage(), Stage::CollectPlayers);
        assert!(room.world().head_of(ids[0]).is_some());

        // A lone player cannot start a round
        room.action("secret-a");
        assert_eq!(room.stage(), Stage::CollectPlayers);
    }

    #[test]
    fn test_queued_commands_apply_on_update() {
        let (mut room, ids) = room_with(&["a", "b"]);
        let sender = room.command_sender();
        sender
            .try_send(Command::Action {
                secret: "secret-a".into(),
            })
            .unwrap();
        sender
            .try_send(Command::Unregister {
                secret: "secret-b".into(),
            })
            .unwrap();
        assert_eq!(room.stage(), Stage::CollectPlayers);

        room.update_at(Instant::now());
        assert_eq!(room.stage(), Stage::RoundStart);
        assert!(room.world().get_player(ids[1]).is_none());
    }

    #[test]
    fn test_queued_moves_are_validated() {
        let (mut room, ids) = room_with(&["a"]);
        let sender = room.command_sender();
        let pending = |room: &GameRoom| room.world().get_player(ids[0]).unwrap().pending_direction;

        for (dx, dy) in [(3, 0), (0, 0), (-2, 1)] {
            sender
                .try_send(Command::Move {
                    secret: "secret-a".into(),
                    dx,
                    dy,
                })
                .unwrap();
        }
        assert_eq!(room.apply_commands(), 3);
        assert_eq!(pending(&room), None);
        assert_eq!(room.metrics().commands_rejected.load(Ordering::Relaxed), 3);

        sender
            .try_send(Command::Move {
                secret: "secret-a".into(),
                dx: 1,
                dy: -1,
            })
            .unwrap();
        room.apply_commands();
        assert_eq!(pending(&room), Direction::new(1, -1));
        assert_eq!(room.metrics().commands_rejected.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_shared_room_across_threads() {
        let room = GameRoom::new(&config()).shared();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let room = Arc::clone(&room);
                std::thread::spawn(move || room.lock().register(&format!("s{}", i), &format!("p{}", i)))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(room.lock().player_count(), 4);
    }

    #[test]
    fn test_metrics_follow_room() {
        let (mut room, _) = room_with(&["a", "b"]);
        room.action("secret-a");
        room.tick();
        let metrics = room.metrics();
        assert_eq!(metrics.registered_players.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.rounds_started.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.stage.load(Ordering::Relaxed), Stage::RoundStart.as_index());
    }

    #[test]
    fn test_rejections_are_counted() {
        let (mut room, _) = room_with(&["a"]);
        assert!(room.register("secret-a", "other").is_err());
        assert!(room.move_player("secret-a", 0, 0).is_err());
        assert!(room.move_player("secret-a", 1, 0).is_ok());
        assert_eq!(room.metrics().commands_rejected.load(Ordering::Relaxed), 2);
    }
}
