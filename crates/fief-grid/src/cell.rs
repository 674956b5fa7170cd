//! Per-cell contents: terrain, surface objects, subsurface minerals.

use fief_core::{AgentId, PlayerId};

/// Terrain class of a cell.  Groups: water, grassland, desert, mountain
/// (tundra), snow.  Mines build on mountain, fields and forests on grass,
/// fishing needs adjacent water.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Terrain {
    Water0,
    Water1,
    Water2,
    Water3,
    #[default]
    Grass0,
    Grass1,
    Grass2,
    Grass3,
    Desert0,
    Desert1,
    Desert2,
    Tundra0,
    Tundra1,
    Tundra2,
    Snow0,
    Snow1,
}

impl Terrain {
    #[inline]
    pub fn is_water(self) -> bool {
        matches!(
            self,
            Terrain::Water0 | Terrain::Water1 | Terrain::Water2 | Terrain::Water3
        )
    }

    #[inline]
    pub fn is_grass(self) -> bool {
        matches!(
            self,
            Terrain::Grass0 | Terrain::Grass1 | Terrain::Grass2 | Terrain::Grass3
        )
    }

    /// Mountain terrain — the only ground mines stand on.
    #[inline]
    pub fn is_mountain(self) -> bool {
        matches!(self, Terrain::Tundra0 | Terrain::Tundra1 | Terrain::Tundra2)
    }

    #[inline]
    pub fn is_snow(self) -> bool {
        matches!(self, Terrain::Snow0 | Terrain::Snow1)
    }

    /// Buildable, walkable open country.
    #[inline]
    pub fn is_open_ground(self) -> bool {
        self.is_grass() || matches!(self, Terrain::Desert0 | Terrain::Desert1 | Terrain::Desert2)
    }
}

/// Subsurface mineral deposit class.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mineral {
    #[default]
    None,
    Gold,
    Iron,
    Coal,
    Stone,
}

/// Geologist sign kinds placed on mountain cells after sampling.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SignKind {
    LargeGold,
    SmallGold,
    LargeIron,
    SmallIron,
    LargeCoal,
    SmallCoal,
    LargeStone,
    SmallStone,
    Empty,
}

impl SignKind {
    /// The sign advertising `mineral`, large or small by remaining `amount`.
    pub fn for_deposit(mineral: Mineral, amount: u8) -> SignKind {
        let large = amount >= 12;
        match mineral {
            Mineral::Gold if large => SignKind::LargeGold,
            Mineral::Gold => SignKind::SmallGold,
            Mineral::Iron if large => SignKind::LargeIron,
            Mineral::Iron => SignKind::SmallIron,
            Mineral::Coal if large => SignKind::LargeCoal,
            Mineral::Coal => SignKind::SmallCoal,
            Mineral::Stone if large => SignKind::LargeStone,
            Mineral::Stone => SignKind::SmallStone,
            Mineral::None => SignKind::Empty,
        }
    }
}

/// Surface object occupying a cell.
///
/// Growth-staged objects carry their stage: trees and pines grow 0..=7
/// before a lumberjack will fell them, saplings grow 0..=7 then become
/// pines, seeds mature 0..=5 then become fields, fields are harvested then
/// decay through their stages.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Object {
    #[default]
    None,
    Flag,
    SmallStructure,
    LargeStructure,
    Castle,
    Tree(u8),
    Pine(u8),
    Sapling(u8),
    FelledTree(u8),
    FelledPine(u8),
    /// Remaining stone, 1..=8.
    Stone(u8),
    Seeds(u8),
    Field(u8),
    Sign(SignKind),
}

/// What can pass through / be built over a cell, derived from its object.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Space {
    /// Nothing here; walkable and buildable.
    Open,
    /// Decorative or harvestable filler; walkable off-road, not buildable.
    Semipassable,
    /// Blocks movement but a neighboring stonecutter can still work it.
    Impassable,
    /// A flag or structure; enter only via the road protocol.
    Occupied,
}

impl Object {
    pub fn space(self) -> Space {
        match self {
            Object::None | Object::Sign(_) => Space::Open,
            Object::Seeds(_) | Object::Field(_) | Object::Sapling(_) => Space::Semipassable,
            Object::Tree(_)
            | Object::Pine(_)
            | Object::FelledTree(_)
            | Object::FelledPine(_)
            | Object::Stone(_) => Space::Impassable,
            Object::Flag
            | Object::SmallStructure
            | Object::LargeStructure
            | Object::Castle => Space::Occupied,
        }
    }

    /// A tree or pine mature enough for felling.
    #[inline]
    pub fn is_mature_tree(self) -> bool {
        matches!(self, Object::Tree(7) | Object::Pine(7))
    }

    #[inline]
    pub fn is_structure(self) -> bool {
        matches!(
            self,
            Object::SmallStructure | Object::LargeStructure | Object::Castle
        )
    }
}

/// One grid cell.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cell {
    pub height:  u8,
    pub terrain: Terrain,
    /// 6-bit road mask, one bit per `Direction`.
    pub paths: u8,
    /// Owning player, `PlayerId::INVALID` for unclaimed land.
    pub owner: PlayerId,
    /// Agent physically in this cell, `AgentId::INVALID` when free.  The
    /// sole mutual-exclusion mechanism of the movement model.
    pub occupant: AgentId,
    /// `true` while the occupant is an idle transporter parked on a path
    /// middle; such agents do not block movement.
    pub idle_agent: bool,
    pub object: Object,
    /// Arena index of the flag or structure standing here (object-dependent).
    pub object_index: u32,
    pub mineral: Mineral,
    /// Remaining deposit, or fish count on water cells.
    pub mineral_amount: u8,
}

impl Cell {
    pub const NO_OBJECT_INDEX: u32 = u32::MAX;
}

impl Default for Cell {
    fn default() -> Self {
        Cell {
            height:         8,
            terrain:        Terrain::default(),
            paths:          0,
            owner:          PlayerId::INVALID,
            occupant:       AgentId::INVALID,
            idle_agent:     false,
            object:         Object::None,
            object_index:   Cell::NO_OBJECT_INDEX,
            mineral:        Mineral::None,
            mineral_amount: 0,
        }
    }
}
