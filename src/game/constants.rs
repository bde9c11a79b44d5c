/// Match flow timing
pub mod round {
    use std::time::Duration;

    /// Wall-clock length of the ROUND_START and ROUND_END pauses
    pub const STAGE_PAUSE: Duration = Duration::from_secs(2);
    /// Players needed to start (or restart) a round
    pub const MIN_PLAYERS: usize = 2;
    /// Heads advance once every this many ticks unless configured otherwise
    pub const DEFAULT_HEAD_MOVE_INTERVAL: u32 = 2;
}

/// Snake tail constants
pub mod tail {
    use std::time::Duration;

    /// Tail segments trailing a head at round start
    pub const DEFAULT_LENGTH: u32 = 4;
    /// Tails grow by one segment every period of round time
    /// Keeps the board filling up as a match drags on
    pub const GROWTH_PERIOD: Duration = Duration::from_secs(5);
}

/// Rocket constants
pub mod rocket {
    /// Rockets expire after this many ticks no matter what
    pub const MAX_AGE: u64 = 60;
    /// Rockets added to the inventory per ammo pickup
    pub const BATCH_SIZE: usize = 3;
}

/// Static world generation
pub mod arena {
    /// Fraction of cells seeded with ammo pickups (limited ammo mode)
    pub const AMMO_DENSITY: f64 = 0.01;
    /// Fraction of cells seeded with mines
    pub const MINE_DENSITY: f64 = 0.005;
}

/// Spawn constants
pub mod spawn {
    use crate::util::coord::Direction;

    /// Every head starts facing this way
    pub const INITIAL_DIRECTION: Direction = Direction::RIGHT;
}

/// Scheduling / catch-up
pub mod scheduler {
    /// Warn when one driver call owes more ticks than this
    pub const CATCH_UP_WARN_TICKS: u32 = 10;
}

/// Command buffer sizing
pub mod input {
    /// Pending fire-and-forget commands allowed between drains
    pub const BUFFER_CAPACITY: usize = 1024;
}

/// Tick section profiling
pub mod profiling {
    use std::time::Duration;

    /// How often the section timings are summarised
    pub const REPORT_INTERVAL: Duration = Duration::from_secs(10);
    /// The max is reported when it is this many times the average
    pub const OUTLIER_FACTOR: u32 = 10;
    /// Untimed tick time below this is not reported
    pub const MIN_REMAINDER: Duration = Duration::from_millis(1);
}
