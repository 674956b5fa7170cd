//! `fief-grid` — the toroidal hex world grid.
//!
//! | Module   | Contents                                              |
//! |----------|-------------------------------------------------------|
//! | [`pos`]  | `MapPos`, `Geometry`, direction offsets, spiral table |
//! | [`cell`] | `Cell`, `Terrain`, `Object`, `Mineral`, `Space`       |
//! | [`map`]  | `Map` — cell storage, accessors, growth pass          |
//!
//! The grid exclusively owns cell contents.  Everything else in the engine
//! addresses cells by `MapPos` and reads or writes through `Map` accessors,
//! which keeps the occupancy invariant (at most one blocking agent per
//! cell) enforceable in one place.

pub mod cell;
pub mod map;
pub mod pos;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use cell::{Cell, Mineral, Object, SignKind, Space, Terrain};
pub use map::Map;
pub use pos::{DIR_OFFSETS, Geometry, MapPos, SPIRAL_LEN, SPIRAL_PATTERN};
