//! Packed grid positions and the spiral offset table.
//!
//! A `MapPos` packs `(col, row)` into one `u32` as `(row << row_shift) | col`
//! where both dimensions are powers of two.  Wrapping addition under the
//! column/row masks makes the grid toroidal, so neighbor moves never need
//! bounds checks.

use fief_core::Direction;

/// A packed grid cell address.  Only meaningful together with the `Geometry`
/// (masks/shift) of the map it came from.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MapPos(pub u32);

/// Dimensions and bit layout of a toroidal grid.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Geometry {
    pub cols:      u32,
    pub rows:      u32,
    pub col_mask:  u32,
    pub row_mask:  u32,
    pub row_shift: u32,
}

impl Geometry {
    /// Build from power-of-two dimensions.
    ///
    /// Returns `None` when either dimension is not a power of two or is
    /// smaller than 8 (the spiral table reaches out 9 cells, and smaller
    /// grids alias their own neighborhoods in degenerate ways).
    pub fn new(cols: u32, rows: u32) -> Option<Geometry> {
        if !cols.is_power_of_two() || !rows.is_power_of_two() || cols < 8 || rows < 8 {
            return None;
        }
        Some(Geometry {
            cols,
            rows,
            col_mask:  cols - 1,
            row_mask:  rows - 1,
            row_shift: cols.trailing_zeros(),
        })
    }

    #[inline(always)]
    pub fn tile_count(&self) -> usize {
        (self.cols * self.rows) as usize
    }

    #[inline(always)]
    pub fn pos(&self, col: u32, row: u32) -> MapPos {
        MapPos(((row & self.row_mask) << self.row_shift) | (col & self.col_mask))
    }

    #[inline(always)]
    pub fn pos_col(&self, pos: MapPos) -> u32 {
        pos.0 & self.col_mask
    }

    #[inline(always)]
    pub fn pos_row(&self, pos: MapPos) -> u32 {
        (pos.0 >> self.row_shift) & self.row_mask
    }

    /// Component-wise wrapping addition of a signed offset.
    #[inline]
    pub fn pos_add(&self, pos: MapPos, dx: i32, dy: i32) -> MapPos {
        let col = (self.pos_col(pos) as i32 + dx) as u32 & self.col_mask;
        let row = (self.pos_row(pos) as i32 + dy) as u32 & self.row_mask;
        self.pos(col, row)
    }

    /// Offset `off` of the spiral pattern applied to `pos`.
    #[inline]
    pub fn pos_add_spirally(&self, pos: MapPos, off: usize) -> MapPos {
        let (dx, dy) = SPIRAL_PATTERN[off];
        self.pos_add(pos, dx, dy)
    }

    /// The neighbor of `pos` in direction `dir`.
    #[inline]
    pub fn moved(&self, pos: MapPos, dir: Direction) -> MapPos {
        let (dx, dy) = DIR_OFFSETS[dir.index()];
        self.pos_add(pos, dx, dy)
    }

    /// Iterate every position in row-major order.
    pub fn positions(&self) -> impl Iterator<Item = MapPos> + '_ {
        let g = *self;
        (0..g.rows).flat_map(move |r| (0..g.cols).map(move |c| g.pos(c, r)))
    }
}

/// `(dcol, drow)` per `Direction`, in enumeration order.
pub const DIR_OFFSETS: [(i32, i32); 6] = [
    (1, 0),   // Right
    (1, 1),   // DownRight
    (0, 1),   // Down
    (-1, 0),  // Left
    (-1, -1), // UpLeft
    (0, -1),  // Up
];

/// Number of entries in [`SPIRAL_PATTERN`].
pub const SPIRAL_LEN: usize = 295;

/// Ring-by-ring neighborhood offsets: the center, then each base offset in
/// six rotations.  Consumers index this table directly (work-site picks,
/// the Lost search, deposit checks), so entry order is part of replay
/// determinism.
pub const SPIRAL_PATTERN: [(i32, i32); SPIRAL_LEN] = build_spiral();

/// Base offsets covering rings 1..=9 plus a handful of far throws.  Rotated
/// by the six hex rotation matrices to produce the full pattern.
const SPIRAL_BASE: [(i32, i32); 49] = [
    (1, 0),
    (2, 1), (2, 0),
    (3, 1), (3, 2), (3, 0),
    (4, 2), (4, 1), (4, 3), (4, 0),
    (5, 2), (5, 3), (5, 1), (5, 4), (5, 0),
    (6, 3), (6, 2), (6, 4), (6, 1), (6, 5), (6, 0),
    (7, 3), (7, 4), (7, 2), (7, 5), (7, 1), (7, 6), (7, 0),
    (8, 4), (8, 3), (8, 5), (8, 2), (8, 6), (8, 1), (8, 7), (8, 0),
    (9, 4), (9, 5), (9, 3), (9, 6), (9, 2), (9, 7), (9, 1), (9, 0),
    (16, 0), (16, 8),
    (24, 0), (24, 8), (24, 16),
];

/// Hex rotation matrices, column-major pairs `(a, b, c, d)` applied as
/// `(x*a + y*c, x*b + y*d)`.
const SPIRAL_MATRIX: [(i32, i32, i32, i32); 6] = [
    (1, 0, 0, 1),
    (1, 1, -1, 0),
    (0, 1, -1, -1),
    (-1, 0, 0, -1),
    (-1, -1, 1, 0),
    (0, -1, 1, 1),
];

const fn build_spiral() -> [(i32, i32); SPIRAL_LEN] {
    let mut out = [(0i32, 0i32); SPIRAL_LEN];
    let mut i = 0;
    while i < SPIRAL_BASE.len() {
        let (x, y) = SPIRAL_BASE[i];
        let mut j = 0;
        while j < 6 {
            let (a, b, c, d) = SPIRAL_MATRIX[j];
            out[1 + i * 6 + j] = (x * a + y * c, x * b + y * d);
            j += 1;
        }
        i += 1;
    }
    out
}
