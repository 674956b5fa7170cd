//! `fief-sim` — the simulation engine tying the fiefdom together.
//!
//! | Module         | Contents                                                 |
//! |----------------|----------------------------------------------------------|
//! | [`world`]      | `World` aggregate and the per-tick scheduler             |
//! | [`player`]     | `Player` settings, scores and notifications              |
//! | [`commands`]   | Player orders: building, demolition, dispatch, attack    |
//! | `agents`       | The agent state machine handlers                         |
//! | `transport`    | Resource scheduling and agent call-up over the network   |
//! | `structures`   | Construction progress, burning, worker/knight requests   |
//!
//! The lower crates own the data (`fief-grid` the terrain, `fief-relay` the
//! network, `fief-structure` the buildings, `fief-agent` the agents); this
//! crate owns the behavior.  `World::update` advances one tick
//! deterministically, `commands` is the only mutation surface a player
//! controller should reach for.

mod agents;
pub mod commands;
pub mod player;
mod structures;
mod transport;
pub mod world;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use commands::{CommandError, CommandResult};
pub use player::{DEFAULT_KNIGHT_OCCUPATION, Notification, Player};
pub use world::{World, workplace_for};
