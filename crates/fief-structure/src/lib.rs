//! `fief-structure` — structures, construction tables, inventories.
//!
//! | Module        | Contents                                              |
//! |---------------|-------------------------------------------------------|
//! | [`kind`]      | `StructureKind`, construction and material tables     |
//! | [`structure`] | `Structure`, `Stock`, garrison and burn-down state    |
//! | [`inventory`] | `Inventory` resource/agent pools and out queue        |
//! | [`store`]     | `StructureStore` arena                                |
//!
//! Structures are passive data here: the production handlers and the
//! transport scheduler that animate them live in `fief-sim`.

pub mod inventory;
pub mod kind;
pub mod store;
pub mod structure;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use inventory::{Inventory, OUT_QUEUE_LEN, OutSlot, StockMode};
pub use kind::{
    CONSTRUCTION_INFO, ConstructionInfo, Footprint, MATERIAL_ORDER, STRUCTURE_SCORE, StockItem,
    StructureKind,
};
pub use store::StructureStore;
pub use structure::{BURN_TICKS, CASTLE_BURN_TICKS, MAX_STOCKS, Stock, Structure};
