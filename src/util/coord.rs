use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer cell coordinate on the toroidal grid
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coordinate {
    pub x: i32,
    pub y: i32,
}

impl Coordinate {
    pub const ORIGIN: Coordinate = Coordinate { x: 0, y: 0 };

    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Wrap into `[0, size.x) x [0, size.y)`
    ///
    /// Uses Euclidean remainder so negative components wrap to the far edge.
    #[inline]
    pub fn wrap(self, size: Coordinate) -> Self {
        Self {
            x: self.x.rem_euclid(size.x),
            y: self.y.rem_euclid(size.y),
        }
    }

    /// Step one cell in `direction`, wrapping around the world edges
    #[inline]
    pub fn offset(self, direction: Direction, size: Coordinate) -> Self {
        Self {
            x: self.x + direction.dx as i32,
            y: self.y + direction.dy as i32,
        }
        .wrap(size)
    }

    /// True if the cell is not on the one-cell border of the world
    #[inline]
    pub fn is_interior(self, size: Coordinate) -> bool {
        self.x > 0 && self.y > 0 && self.x < size.x - 1 && self.y < size.y - 1
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Unit step on the grid, each component in {-1, 0, 1}
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Direction {
    pub dx: i8,
    pub dy: i8,
}

impl Direction {
    /// Immobile blocks carry the zero direction
    pub const ZERO: Direction = Direction { dx: 0, dy: 0 };
    pub const UP: Direction = Direction { dx: 0, dy: -1 };
    pub const DOWN: Direction = Direction { dx: 0, dy: 1 };
    pub const LEFT: Direction = Direction { dx: -1, dy: 0 };
    pub const RIGHT: Direction = Direction { dx: 1, dy: 0 };

    /// The 8 non-zero directions, row-major over the 3x3 neighbourhood
    pub const ALL: [Direction; 8] = [
        Direction { dx: -1, dy: -1 },
        Direction { dx: 0, dy: -1 },
        Direction { dx: 1, dy: -1 },
        Direction { dx: -1, dy: 0 },
        Direction { dx: 1, dy: 0 },
        Direction { dx: -1, dy: 1 },
        Direction { dx: 0, dy: 1 },
        Direction { dx: 1, dy: 1 },
    ];

    /// Build a direction, rejecting components outside {-1, 0, 1}
    pub fn new(dx: i32, dy: i32) -> Option<Self> {
        if !(-1..=1).contains(&dx) || !(-1..=1).contains(&dy) {
            return None;
        }
        Some(Self {
            dx: dx as i8,
            dy: dy as i8,
        })
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.dx == 0 && self.dy == 0
    }
}
