//! Engine error type.
//!
//! Sub-crates may define their own error enums and convert them into
//! `SimError` via `From` impls, or keep them separate and wrap `SimError`
//! as one variant.  Both patterns are acceptable; prefer whichever keeps
//! error sites clean.

use thiserror::Error;

use crate::{AgentId, NodeId, StructureId};

/// The top-level error type shared by every `fief-*` crate.
///
/// Per the recovery rules, almost nothing in the engine is fatal: missing
/// routes degrade to the Lost state and full stocks retry later.  These
/// variants cover the one class that is fatal (a dangling arena reference,
/// i.e. corrupted state) plus lookups the host can get wrong.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("agent {0} not found")]
    AgentNotFound(AgentId),

    #[error("relay node {0} not found")]
    NodeNotFound(NodeId),

    #[error("structure {0} not found")]
    StructureNotFound(StructureId),

    #[error("simulation state corrupt: {0}")]
    Corrupt(String),
}

/// Shorthand result type for all `fief-*` crates.
pub type SimResult<T> = Result<T, SimError>;
