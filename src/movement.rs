//! Directed moves on the grid (spec.md C2).

use serde::{Deserialize, Serialize};

/// A single step direction. `Wait` keeps the agent in place for one timestep.
///
/// The first five variants are always enabled; `NorthEast`..`SouthWest` are
/// only reachable when `Config::allowed_directions == 9`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    North,
    East,
    South,
    West,
    Wait,
    NorthEast,
    SouthEast,
    SouthWest,
    NorthWest,
}

/// Fixed direction table, stable for the lifetime of a run. Index order is
/// implementation-defined but never changes once chosen (spec.md §6).
pub const STRAIGHT_DIRECTIONS: [Direction; 5] = [
    Direction::North,
    Direction::East,
    Direction::South,
    Direction::West,
    Direction::Wait,
];

pub const DIAGONAL_DIRECTIONS: [Direction; 4] = [
    Direction::NorthEast,
    Direction::SouthEast,
    Direction::SouthWest,
    Direction::NorthWest,
];

impl Direction {
    /// `(dx, dy)` delta for this direction.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::South => (0, 1),
            Direction::East => (1, 0),
            Direction::West => (-1, 0),
            Direction::Wait => (0, 0),
            Direction::NorthEast => (1, -1),
            Direction::SouthEast => (1, 1),
            Direction::SouthWest => (-1, 1),
            Direction::NorthWest => (-1, -1),
        }
    }

    /// The reverse of a non-wait move; undefined (panics) for `Wait`.
    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
            Direction::NorthEast => Direction::SouthWest,
            Direction::SouthWest => Direction::NorthEast,
            Direction::NorthWest => Direction::SouthEast,
            Direction::SouthEast => Direction::NorthWest,
            Direction::Wait => panic!("Wait has no opposite"),
        }
    }

    /// All directions enabled for `allowed_directions` (must be 5 or 9).
    pub fn enabled(allowed_directions: usize) -> &'static [Direction] {
        match allowed_directions {
            5 => &STRAIGHT_DIRECTIONS,
            9 => &ALL_DIRECTIONS,
            other => panic!("unsupported allowed_directions: {other}"),
        }
    }
}

const ALL_DIRECTIONS: [Direction; 9] = [
    Direction::North,
    Direction::East,
    Direction::South,
    Direction::West,
    Direction::Wait,
    Direction::NorthEast,
    Direction::SouthEast,
    Direction::SouthWest,
    Direction::NorthWest,
];

/// An untimed move: a position plus the direction that reached it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Move {
    pub x: usize,
    pub y: usize,
    pub direction: Direction,
}

impl Move {
    pub fn new(x: usize, y: usize, direction: Direction) -> Self {
        Move { x, y, direction }
    }
}

/// A move tagged with the absolute timestep at which it occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimedMove {
    pub mv: Move,
    pub time: usize,
}

impl TimedMove {
    pub fn new(mv: Move, time: usize) -> Self {
        TimedMove { mv, time }
    }

    /// The 5 (or 9) successors of `self` at `self.time + 1`, applying each
    /// enabled direction's delta to the current position. Out-of-range
    /// results are left for the caller (typically the grid) to filter.
    pub fn next_moves(&self, allowed_directions: usize) -> Vec<(i32, i32, Direction)> {
        Direction::enabled(allowed_directions)
            .iter()
            .map(|&d| {
                let (dx, dy) = d.delta();
                (self.mv.x as i32 + dx, self.mv.y as i32 + dy, d)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_reverses_delta() {
        for d in STRAIGHT_DIRECTIONS.iter().filter(|d| **d != Direction::Wait) {
            let (dx, dy) = d.delta();
            let (odx, ody) = d.opposite().delta();
            assert_eq!((dx, dy), (-odx, -ody));
        }
    }

    #[test]
    fn next_moves_count_matches_direction_set() {
        let tm = TimedMove::new(Move::new(1, 1, Direction::Wait), 3);
        assert_eq!(tm.next_moves(5).len(), 5);
        assert_eq!(tm.next_moves(9).len(), 9);
        for (_, _, _) in tm.next_moves(5) {}
        assert!(tm.next_moves(5).iter().any(|&(x, y, d)| (x, y, d) == (1, 1, Direction::Wait)));
    }

    #[test]
    #[should_panic]
    fn wait_has_no_opposite() {
        Direction::Wait.opposite();
    }
}
