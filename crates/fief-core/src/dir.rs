//! Hex-grid directions.
//!
//! The six directions are enumerated in the order the transport search
//! visits neighbors.  This order is load-bearing: path-search tie breaks
//! and the per-direction arrays on relay nodes all index by it, so replays
//! only reproduce when the order never changes.

use std::fmt;

/// One of the six hex neighbor directions.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Direction {
    Right     = 0,
    DownRight = 1,
    Down      = 2,
    Left      = 3,
    UpLeft    = 4,
    Up        = 5,
}

impl Direction {
    /// All directions in enumeration order.
    pub const ALL: [Direction; 6] = [
        Direction::Right,
        Direction::DownRight,
        Direction::Down,
        Direction::Left,
        Direction::UpLeft,
        Direction::Up,
    ];

    /// Numeric index, 0..6.
    #[inline(always)]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Bit for use in a 6-bit path mask.
    #[inline(always)]
    pub fn bit(self) -> u8 {
        1 << self as u8
    }

    /// The opposite direction.
    #[inline]
    pub fn reverse(self) -> Direction {
        Direction::from_u8((self as u8 + 3) % 6)
    }

    /// Decode from a numeric index.  Values outside 0..6 wrap.
    #[inline]
    pub fn from_u8(v: u8) -> Direction {
        match v % 6 {
            0 => Direction::Right,
            1 => Direction::DownRight,
            2 => Direction::Down,
            3 => Direction::Left,
            4 => Direction::UpLeft,
            _ => Direction::Up,
        }
    }

    /// Ascending iteration (Right → Up).
    pub fn iter() -> impl Iterator<Item = Direction> {
        Self::ALL.into_iter()
    }

    /// Descending iteration (Up → Right) — the order used when seeding a
    /// transport search from a node's neighbors.
    pub fn iter_rev() -> impl Iterator<Item = Direction> {
        Self::ALL.into_iter().rev()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Right     => "Right",
            Direction::DownRight => "DownRight",
            Direction::Down      => "Down",
            Direction::Left      => "Left",
            Direction::UpLeft    => "UpLeft",
            Direction::Up        => "Up",
        };
        write!(f, "{name}")
    }
}
