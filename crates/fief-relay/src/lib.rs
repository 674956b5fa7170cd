//! `fief-relay` — the relay-node transport network.
//!
//! | Module    | Contents                                                |
//! |-----------|---------------------------------------------------------|
//! | [`node`]  | `RelayNode`, `Slot`, `Link`, length classes             |
//! | [`store`] | `RelayStore` arena and the generation-stamped search    |
//!
//! The network is a graph overlay on the world grid: nodes sit on grid
//! cells, roads connect them along cell paths.  Resource scheduling (which
//! slot goes where, transporter call-up) lives in `fief-sim` because it
//! consults structures and player priority tables; this crate owns the
//! data model and the search primitive they are built on.

pub mod node;
pub mod store;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use node::{Link, MAX_SLOTS, MAX_TRANSPORTERS, RelayNode, Slot, road_length_class};
pub use store::{RelayStore, SEARCH_MAX_DEPTH, SearchOpts};
