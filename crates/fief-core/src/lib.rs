//! `fief-core` — foundational types for the fiefdom simulation engine.
//!
//! This crate is a dependency of every other `fief-*` crate.  It
//! intentionally has no `fief-*` dependencies and minimal external ones
//! (only `rand` and `thiserror`, plus optional `serde`).
//!
//! # What lives here
//!
//! | Module         | Contents                                             |
//! |----------------|------------------------------------------------------|
//! | [`ids`]        | `AgentId`, `NodeId`, `StructureId`, `PlayerId`       |
//! | [`dir`]        | `Direction` — the six hex neighbor directions        |
//! | [`resource`]   | `Resource` enum and the tool table                   |
//! | [`profession`] | `Profession` enum, ranks, tool requirements          |
//! | [`time`]       | `Tick`, `SimConfig`                                  |
//! | [`rng`]        | `GameRng` — serializable deterministic RNG           |
//! | [`error`]      | `SimError`, `SimResult`                              |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                    |
//! |---------|-----------------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to all public types.       |
//!           | Required by the snapshot contract in `fief-sim`.          |

pub mod dir;
pub mod error;
pub mod ids;
pub mod profession;
pub mod resource;
pub mod rng;
pub mod time;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use dir::Direction;
pub use error::{SimError, SimResult};
pub use ids::{AgentId, NodeId, PlayerId, StructureId};
pub use profession::Profession;
pub use resource::{Resource, TOOLS};
pub use rng::GameRng;
pub use time::{DEFAULT_GAME_SPEED, SimConfig, Tick};
