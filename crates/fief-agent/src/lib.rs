//! `fief-agent` — agents and their state machine data model.
//!
//! | Module    | Contents                                                 |
//! |-----------|----------------------------------------------------------|
//! | [`state`] | `AgentState` and the shared state payloads               |
//! | [`agent`] | `Agent`, animation timing, waiting/swap protocol         |
//! | [`store`] | `AgentStore` arena                                       |
//!
//! The state handlers that drive agents from state to state live in
//! `fief-sim`; everything here is the passive model they share.

pub mod agent;
pub mod state;
pub mod store;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use agent::{ANIMATION_COUNTER, Agent, Waiting, walking_animation};
pub use state::{AgentState, DefendFree, Fight, FreeWalk, OnPath};
pub use store::AgentStore;
