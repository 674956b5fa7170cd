//! The structure aggregate: construction state, stock slots, garrison.

use fief_core::{AgentId, NodeId, PlayerId, Resource};
use fief_grid::MapPos;

use crate::inventory::Inventory;
use crate::kind::{Footprint, StockItem, StructureKind};

/// Stock slots per structure.
pub const MAX_STOCKS: usize = 2;

/// Ticks a demolished structure keeps smouldering before its remains are
/// removed from the world.
pub const BURN_TICKS: u16 = 2047;

/// Longer smoulder for a castle, so escaping agents have time to scatter.
pub const CASTLE_BURN_TICKS: u16 = 8191;

/// One input slot of a structure: what it takes, how much is on hand, how
/// much is requested and en route, and the current request priority.
#[derive(Copy, Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Stock {
    pub item: Option<StockItem>,
    /// Request priority published to the transport scheduler, 0 = silent.
    pub prio: u8,
    pub available: u8,
    pub requested: u8,
    pub maximum: u8,
}

impl Stock {
    pub fn init(item: StockItem, maximum: u8) -> Stock {
        Stock { item: Some(item), prio: 0, available: 0, requested: 0, maximum }
    }

    /// Resources on hand plus already requested.
    #[inline]
    pub fn total(&self) -> u8 {
        self.available.saturating_add(self.requested)
    }

    pub fn clear(&mut self) {
        *self = Stock::default();
    }
}

/// A structure on the grid.  Its entrance cell is down-right of `pos` and
/// holds the relay node `node`.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Structure {
    pub pos:   MapPos,
    pub kind:  StructureKind,
    pub owner: PlayerId,
    /// Relay node at the entrance.
    pub node: NodeId,
    pub constructing: bool,
    /// Operational (worker present, inventory open, garrison moved in).
    pub active: bool,
    pub burning: bool,
    pub burning_counter: u16,
    /// A worker (or the first knight) holds the structure.
    pub holder: bool,
    pub agent_requested: bool,
    pub agent_request_fail: bool,
    /// Construction progress while building (bit 15 = frame finished),
    /// then a per-kind working register once operational.
    pub progress: u32,
    pub stocks: [Stock; MAX_STOCKS],
    /// The holding worker, or the head of the defender queue.
    pub main_agent: AgentId,
    /// Distance class to the nearest frontier, 0 (interior) ..= 3.
    pub threat_level: u8,
    pub inventory: Option<Box<Inventory>>,
}

impl Structure {
    /// Stake out a new construction site.  Large footprints start at
    /// progress 0 (site must be leveled first); small ones skip leveling.
    /// A castle is born finished and holding its own inventory slot open.
    pub fn new(kind: StructureKind, pos: MapPos, owner: PlayerId, node: NodeId) -> Structure {
        let info = kind.construction_info();
        let mut s = Structure {
            pos,
            kind,
            owner,
            node,
            constructing:       true,
            active:             false,
            burning:            false,
            burning_counter:    0,
            holder:             false,
            agent_requested:    false,
            agent_request_fail: false,
            progress:           if info.footprint == Footprint::Large { 0 } else { 1 },
            stocks:             [Stock::default(); MAX_STOCKS],
            main_agent:         AgentId::INVALID,
            threat_level:       0,
            inventory:          None,
        };

        if kind == StructureKind::Castle {
            s.active = true;
            s.holder = true;
            s.stocks[0].available = 0xff;
            s.stocks[0].requested = 0xff;
            s.stocks[1].available = 0xff;
            s.stocks[1].requested = 0xff;
        } else {
            s.stocks[0] = Stock::init(StockItem::One(Resource::Plank), 0);
            s.stocks[0].maximum = info.planks;
            s.stocks[1] = Stock::init(StockItem::One(Resource::Stone), 0);
            s.stocks[1].maximum = info.stones;
        }
        s
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        !self.constructing
    }

    /// Leveling finished; the digger leaves and a builder can be called.
    pub fn done_leveling(&mut self) {
        self.progress   = 1;
        self.holder     = false;
        self.main_agent = AgentId::INVALID;
    }

    /// Has the construction frame been raised (second build phase)?
    #[inline]
    pub fn frame_finished(&self) -> bool {
        self.progress & 0x8000 != 0
    }

    /// Whether construction step `step` consumes a stone (else a plank).
    #[inline]
    pub fn uses_stone_at(&self, step: u16) -> bool {
        self.kind.material_order() & (1 << (step & 0xf)) != 0
    }

    /// One builder blow.  Returns `true` when the structure is finished;
    /// the caller converts stocks, clears node flags and notifies the
    /// player.
    pub fn build_progress(&mut self) -> bool {
        let info = self.kind.construction_info();
        self.progress += if self.frame_finished() {
            u32::from(info.phase_two)
        } else {
            u32::from(info.phase_one)
        };

        if self.progress <= 0xffff {
            return false;
        }

        self.progress     = 0;
        self.constructing = false;
        self.main_agent   = AgentId::INVALID;

        if self.kind == StructureKind::Castle {
            return true;
        }

        self.holder = false;
        for stock in self.stocks.iter_mut() {
            stock.clear();
        }
        true
    }

    /// Install the input slots this kind works from.  Called when the
    /// finished structure gets its worker.  Slots the kind does not use
    /// are cleared, so leftover construction slots never accept input.
    pub fn setup_operating_stocks(&mut self) {
        for (stock, slot) in self.stocks.iter_mut().zip(self.kind.operating_stocks()) {
            *stock = match slot {
                Some((item, maximum)) => Stock::init(item, maximum),
                None => Stock::default(),
            };
        }
    }

    /// Construction materials on site.
    pub fn waiting_planks(&self) -> u8 {
        self.stocks[0].available
    }

    pub fn waiting_stones(&self) -> u8 {
        self.stocks[1].available
    }

    pub fn use_plank(&mut self) {
        self.stocks[0].available = self.stocks[0].available.saturating_sub(1);
    }

    pub fn use_stone(&mut self) {
        self.stocks[1].available = self.stocks[1].available.saturating_sub(1);
    }

    /// Book a requested resource as delivered.  Returns `false` when no
    /// slot expects it (the delivery crossed a demolition or mode change).
    pub fn resource_delivered(&mut self, res: Resource) -> bool {
        for stock in self.stocks.iter_mut() {
            if stock.requested > 0 && stock.item.is_some_and(|item| item.accepts(res)) {
                stock.requested -= 1;
                stock.available += 1;
                return true;
            }
        }
        false
    }

    /// Consume one unit from stock `i`.  Returns `false` if empty.
    pub fn use_resource_in_stock(&mut self, i: usize) -> bool {
        if self.stocks[i].available > 0 {
            self.stocks[i].available -= 1;
            true
        } else {
            false
        }
    }

    // ── Mining ────────────────────────────────────────────────────────────

    /// Shift the find/miss register after a dig.  The register going all
    /// zeroes is how a depleted mine shows up to its miner.
    pub fn increase_mining(&mut self, found: bool) {
        self.active = true;
        self.progress = (self.progress << 1) & 0xffff;
        if found {
            self.progress += 1;
        }
    }

    /// All recent digs came up empty.
    #[inline]
    pub fn mine_depleted(&self) -> bool {
        self.progress == 0x8000
    }

    // ── Garrison ──────────────────────────────────────────────────────────

    /// Knights present plus en route stay under the kind's capacity.
    pub fn has_knight_room(&self) -> bool {
        self.stocks[0].total() < self.kind.knight_capacity()
    }

    pub fn knight_requested(&mut self) {
        self.stocks[0].requested += 1;
    }

    pub fn requested_knight_arrived(&mut self) {
        self.stocks[0].requested = self.stocks[0].requested.saturating_sub(1);
        self.stocks[0].available += 1;
    }

    pub fn requested_knight_lost(&mut self) {
        self.stocks[0].requested = self.stocks[0].requested.saturating_sub(1);
    }

    /// First knight moves in: the garrison is live and gold deliveries
    /// start.
    pub fn knight_occupied(&mut self, first_knight: AgentId) {
        self.main_agent = first_knight;
        if !self.active {
            self.active = true;
            self.stocks[1] = Stock::init(StockItem::One(Resource::GoldBar), self.kind.max_gold());
        }
    }

    /// A defender steps out to fight.
    pub fn call_defender_out(&mut self) {
        self.stocks[0].available = self.stocks[0].available.saturating_sub(1);
        self.stocks[0].requested += 1;
    }

    pub fn defender_returned(&mut self) {
        self.stocks[0].requested = self.stocks[0].requested.saturating_sub(1);
        self.stocks[0].available += 1;
    }

    /// Knights currently inside.
    #[inline]
    pub fn knight_count(&self) -> u8 {
        self.stocks[0].available
    }

    pub fn gold_stored(&self) -> u8 {
        if self.kind.is_military() { self.stocks[1].available } else { 0 }
    }

    // ── Demolition ────────────────────────────────────────────────────────

    /// Set the structure on fire.  Stocks are wiped; the caller evicts
    /// agents, books the resource losses and updates land ownership.
    /// Returns the resources that burn with the site.
    pub fn burn(&mut self) -> Vec<(Resource, u8)> {
        if self.burning {
            return Vec::new();
        }
        self.burning = true;
        self.burning_counter = if !self.constructing && self.kind == StructureKind::Castle {
            CASTLE_BURN_TICKS
        } else {
            BURN_TICKS
        };

        // Inventory contents are booked by the caller from the inventory
        // itself; stock slots only count for everything else.
        let mut lost = Vec::new();
        if self.constructing || !self.kind.has_inventory() {
            for stock in self.stocks.iter() {
                if let (Some(StockItem::One(res)), n @ 1..) = (stock.item, stock.available) {
                    lost.push((res, n));
                }
            }
        }

        for stock in self.stocks.iter_mut() {
            stock.clear();
        }
        if self.kind != StructureKind::Castle && self.kind != StructureKind::Stock {
            self.active = false;
        }
        self.holder = false;
        lost
    }

    /// Tick down the fire.  Returns `true` when the remains should be
    /// removed from the world.
    pub fn burn_down(&mut self, delta: u16) -> bool {
        if self.burning_counter >= delta {
            self.burning_counter -= delta;
            false
        } else {
            true
        }
    }
}
