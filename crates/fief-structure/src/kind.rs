//! Structure kinds and the per-kind data tables.
//!
//! The numeric order of [`StructureKind`] is load-bearing: the construction
//! tables, the material schedule and the score table are all indexed by it.

use fief_core::{Profession, Resource};

/// Every buildable structure.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum StructureKind {
    Fisher       = 0,
    Lumberjack   = 1,
    Boatbuilder  = 2,
    Stonecutter  = 3,
    StoneMine    = 4,
    CoalMine     = 5,
    IronMine     = 6,
    GoldMine     = 7,
    Forester     = 8,
    Stock        = 9,
    Hut          = 10,
    Farm         = 11,
    Butcher      = 12,
    PigFarm      = 13,
    Mill         = 14,
    Baker        = 15,
    Sawmill      = 16,
    SteelSmelter = 17,
    Toolmaker    = 18,
    WeaponSmith  = 19,
    Tower        = 20,
    Fortress     = 21,
    GoldSmelter  = 22,
    Castle       = 23,
}

/// Ground plan of a structure, which decides the grid object placed for it
/// and whether the site needs leveling before construction starts.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Footprint {
    Small,
    Large,
    Castle,
}

/// What a stock slot is fed with.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StockItem {
    One(Resource),
    /// Any member of the food group (mines take fish, meat or bread).
    Food,
}

impl StockItem {
    /// Does a delivered `res` satisfy this slot?
    pub fn accepts(self, res: Resource) -> bool {
        match self {
            StockItem::One(wanted) => res == wanted,
            StockItem::Food        => res.is_food(),
        }
    }
}

/// Static construction data for one structure kind.
#[derive(Copy, Clone, Debug)]
pub struct ConstructionInfo {
    pub footprint: Footprint,
    pub planks: u8,
    pub stones: u8,
    /// Progress added per builder blow while the frame is unfinished.
    pub phase_one: u16,
    /// Progress added per builder blow once the frame is up.
    pub phase_two: u16,
}

const fn info(footprint: Footprint, planks: u8, stones: u8, p1: u16, p2: u16) -> ConstructionInfo {
    ConstructionInfo { footprint, planks, stones, phase_one: p1, phase_two: p2 }
}

/// Indexed by [`StructureKind`].
pub const CONSTRUCTION_INFO: [ConstructionInfo; StructureKind::COUNT] = [
    info(Footprint::Small,  2, 0, 4096, 4096), // Fisher
    info(Footprint::Small,  2, 0, 4096, 4096), // Lumberjack
    info(Footprint::Small,  3, 0, 4096, 2048), // Boatbuilder
    info(Footprint::Small,  2, 0, 4096, 4096), // Stonecutter
    info(Footprint::Small,  4, 1, 2048, 1366), // StoneMine
    info(Footprint::Small,  5, 0, 2048, 1366), // CoalMine
    info(Footprint::Small,  5, 0, 2048, 1366), // IronMine
    info(Footprint::Small,  5, 0, 2048, 1366), // GoldMine
    info(Footprint::Small,  2, 0, 4096, 4096), // Forester
    info(Footprint::Large,  4, 3, 1366, 1024), // Stock
    info(Footprint::Small,  1, 1, 4096, 4096), // Hut
    info(Footprint::Large,  4, 1, 2048, 1366), // Farm
    info(Footprint::Large,  2, 1, 4096, 2048), // Butcher
    info(Footprint::Large,  4, 1, 2048, 1366), // PigFarm
    info(Footprint::Small,  3, 1, 2048, 2048), // Mill
    info(Footprint::Large,  2, 1, 4096, 2048), // Baker
    info(Footprint::Large,  3, 2, 2048, 1366), // Sawmill
    info(Footprint::Large,  3, 2, 2048, 1366), // SteelSmelter
    info(Footprint::Large,  3, 3, 2048, 1024), // Toolmaker
    info(Footprint::Large,  2, 1, 4096, 2048), // WeaponSmith
    info(Footprint::Large,  2, 3, 2048, 1366), // Tower
    info(Footprint::Large,  5, 5, 1024,  683), // Fortress
    info(Footprint::Large,  4, 1, 2048, 1366), // GoldSmelter
    info(Footprint::Castle, 0, 0,  256,  256), // Castle
];

/// Bitmask deciding the material the builder fetches at each construction
/// step: bit `n` set means step `n` uses a stone, clear means a plank.
/// Indexed by [`StructureKind`].
pub const MATERIAL_ORDER: [u16; StructureKind::COUNT] = [
    0,     // Fisher
    0,     // Lumberjack
    0,     // Boatbuilder
    0,     // Stonecutter
    4,     // StoneMine
    0,     // CoalMine
    0,     // IronMine
    0,     // GoldMine
    0,     // Forester
    0x38,  // Stock
    2,     // Hut
    8,     // Farm
    2,     // Butcher
    8,     // PigFarm
    4,     // Mill
    4,     // Baker
    0xc,   // Sawmill
    0x14,  // SteelSmelter
    0x2c,  // Toolmaker
    2,     // WeaponSmith
    0x1c,  // Tower
    0x1f0, // Fortress
    4,     // GoldSmelter
    0,     // Castle
];

/// Census weight of each structure kind, indexed by [`StructureKind`].
pub const STRUCTURE_SCORE: [u32; StructureKind::COUNT] = [
    2, 2, 2, 2, 5, 5, 5, 5, 2, 10, 3, 6, 4, 6, 5, 4, 7, 7, 9, 4, 8, 15, 6, 20,
];

impl StructureKind {
    pub const COUNT: usize = 24;

    pub const ALL: [StructureKind; StructureKind::COUNT] = [
        StructureKind::Fisher,
        StructureKind::Lumberjack,
        StructureKind::Boatbuilder,
        StructureKind::Stonecutter,
        StructureKind::StoneMine,
        StructureKind::CoalMine,
        StructureKind::IronMine,
        StructureKind::GoldMine,
        StructureKind::Forester,
        StructureKind::Stock,
        StructureKind::Hut,
        StructureKind::Farm,
        StructureKind::Butcher,
        StructureKind::PigFarm,
        StructureKind::Mill,
        StructureKind::Baker,
        StructureKind::Sawmill,
        StructureKind::SteelSmelter,
        StructureKind::Toolmaker,
        StructureKind::WeaponSmith,
        StructureKind::Tower,
        StructureKind::Fortress,
        StructureKind::GoldSmelter,
        StructureKind::Castle,
    ];

    #[inline(always)]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_u8(v: u8) -> Option<StructureKind> {
        StructureKind::ALL.get(v as usize).copied()
    }

    #[inline]
    pub fn construction_info(self) -> &'static ConstructionInfo {
        &CONSTRUCTION_INFO[self.index()]
    }

    #[inline]
    pub fn material_order(self) -> u16 {
        MATERIAL_ORDER[self.index()]
    }

    #[inline]
    pub fn score(self) -> u32 {
        STRUCTURE_SCORE[self.index()]
    }

    #[inline]
    pub fn is_mine(self) -> bool {
        matches!(
            self,
            StructureKind::StoneMine
                | StructureKind::CoalMine
                | StructureKind::IronMine
                | StructureKind::GoldMine
        )
    }

    /// Garrisoned structures, castle excluded.
    #[inline]
    pub fn is_military(self) -> bool {
        matches!(self, StructureKind::Hut | StructureKind::Tower | StructureKind::Fortress)
    }

    /// Carries an inventory once operational.
    #[inline]
    pub fn has_inventory(self) -> bool {
        matches!(self, StructureKind::Stock | StructureKind::Castle)
    }

    /// Room for knights, counting both present and en route.
    pub fn knight_capacity(self) -> u8 {
        match self {
            StructureKind::Hut      => 3,
            StructureKind::Tower    => 6,
            StructureKind::Fortress => 12,
            _ => 0,
        }
    }

    /// Gold bars stored to raise the garrison's morale.
    pub fn max_gold(self) -> u8 {
        match self {
            StructureKind::Hut      => 2,
            StructureKind::Tower    => 4,
            StructureKind::Fortress => 8,
            _ => 0,
        }
    }

    /// Knights wanted in the garrison given the effective occupation level
    /// 0..=9 (5..=9 are the reduced-staffing levels).
    pub fn needed_occupants(self, level: usize) -> u8 {
        const HUT: [u8; 10]      = [1, 1, 2, 2, 3, 1, 1, 1, 1, 2];
        const TOWER: [u8; 10]    = [1, 2, 3, 4, 6, 1, 1, 2, 3, 4];
        const FORTRESS: [u8; 10] = [1, 3, 6, 9, 12, 1, 2, 4, 6, 8];

        let level = level.min(9);
        match self {
            StructureKind::Hut      => HUT[level],
            StructureKind::Tower    => TOWER[level],
            StructureKind::Fortress => FORTRESS[level],
            _ => 0,
        }
    }

    /// The profession that runs this structure, if it needs one.
    pub fn worker(self) -> Option<Profession> {
        match self {
            StructureKind::Fisher       => Some(Profession::Fisher),
            StructureKind::Lumberjack   => Some(Profession::Lumberjack),
            StructureKind::Boatbuilder  => Some(Profession::BoatBuilder),
            StructureKind::Stonecutter  => Some(Profession::Stonecutter),
            StructureKind::StoneMine
            | StructureKind::CoalMine
            | StructureKind::IronMine
            | StructureKind::GoldMine   => Some(Profession::Miner),
            StructureKind::Forester     => Some(Profession::Forester),
            StructureKind::Farm         => Some(Profession::Farmer),
            StructureKind::Butcher      => Some(Profession::Butcher),
            StructureKind::PigFarm      => Some(Profession::PigFarmer),
            StructureKind::Mill         => Some(Profession::Miller),
            StructureKind::Baker        => Some(Profession::Baker),
            StructureKind::Sawmill      => Some(Profession::Sawmiller),
            StructureKind::SteelSmelter
            | StructureKind::GoldSmelter => Some(Profession::Smelter),
            StructureKind::Toolmaker    => Some(Profession::Toolmaker),
            StructureKind::WeaponSmith  => Some(Profession::WeaponSmith),
            StructureKind::Stock
            | StructureKind::Hut
            | StructureKind::Tower
            | StructureKind::Fortress
            | StructureKind::Castle => None,
        }
    }

    /// Input stock slots once the structure is operational.  Military gold
    /// is not listed here; it is installed when the garrison moves in.
    pub fn operating_stocks(self) -> [Option<(StockItem, u8)>; 2] {
        match self {
            StructureKind::Boatbuilder => [Some((StockItem::One(Resource::Plank), 8)), None],
            StructureKind::StoneMine
            | StructureKind::CoalMine
            | StructureKind::IronMine
            | StructureKind::GoldMine => [Some((StockItem::Food, 8)), None],
            StructureKind::Butcher => [Some((StockItem::One(Resource::Pig), 8)), None],
            StructureKind::PigFarm
            | StructureKind::Mill => [Some((StockItem::One(Resource::Wheat), 8)), None],
            StructureKind::Baker => [Some((StockItem::One(Resource::Flour), 8)), None],
            StructureKind::Sawmill => [None, Some((StockItem::One(Resource::Lumber), 8))],
            StructureKind::SteelSmelter => [
                Some((StockItem::One(Resource::Coal), 8)),
                Some((StockItem::One(Resource::IronOre), 8)),
            ],
            StructureKind::Toolmaker => [
                Some((StockItem::One(Resource::Plank), 8)),
                Some((StockItem::One(Resource::Steel), 8)),
            ],
            StructureKind::WeaponSmith => [
                Some((StockItem::One(Resource::Coal), 8)),
                Some((StockItem::One(Resource::Steel), 8)),
            ],
            StructureKind::GoldSmelter => [
                Some((StockItem::One(Resource::Coal), 8)),
                Some((StockItem::One(Resource::GoldOre), 8)),
            ],
            _ => [None, None],
        }
    }
}
