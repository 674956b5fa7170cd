//! Resource kinds moved through the relay network.
//!
//! The numeric order is shared vocabulary for every priority table in the
//! simulation (pickup priority, storage priority, tool production weights),
//! so it must stay fixed.

use std::fmt;

/// A transportable resource.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Resource {
    Fish    = 0,
    Pig     = 1,
    Meat    = 2,
    Wheat   = 3,
    Flour   = 4,
    Bread   = 5,
    Lumber  = 6,
    Plank   = 7,
    Boat    = 8,
    Stone   = 9,
    IronOre = 10,
    Steel   = 11,
    Coal    = 12,
    GoldOre = 13,
    GoldBar = 14,
    Shovel  = 15,
    Hammer  = 16,
    Rod     = 17,
    Cleaver = 18,
    Scythe  = 19,
    Axe     = 20,
    Saw     = 21,
    Pick    = 22,
    Pincer  = 23,
    Sword   = 24,
    Shield  = 25,
}

impl Resource {
    pub const COUNT: usize = 26;

    /// All resources in numeric order.
    pub const ALL: [Resource; Resource::COUNT] = [
        Resource::Fish,
        Resource::Pig,
        Resource::Meat,
        Resource::Wheat,
        Resource::Flour,
        Resource::Bread,
        Resource::Lumber,
        Resource::Plank,
        Resource::Boat,
        Resource::Stone,
        Resource::IronOre,
        Resource::Steel,
        Resource::Coal,
        Resource::GoldOre,
        Resource::GoldBar,
        Resource::Shovel,
        Resource::Hammer,
        Resource::Rod,
        Resource::Cleaver,
        Resource::Scythe,
        Resource::Axe,
        Resource::Saw,
        Resource::Pick,
        Resource::Pincer,
        Resource::Sword,
        Resource::Shield,
    ];

    #[inline(always)]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Decode from a numeric index.
    pub fn from_u8(v: u8) -> Option<Resource> {
        Resource::ALL.get(v as usize).copied()
    }

    /// Members of the food group (interchangeable at mines).
    #[inline]
    pub fn is_food(self) -> bool {
        matches!(self, Resource::Fish | Resource::Meat | Resource::Bread)
    }

    /// Workshop tools, Shovel through Pincer.
    #[inline]
    pub fn is_tool(self) -> bool {
        (Resource::Shovel as u8..=Resource::Pincer as u8).contains(&(self as u8))
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The tools in production-priority order (shovel first).  Index in this
/// array is the index into a player's tool priority table.
pub const TOOLS: [Resource; 9] = [
    Resource::Shovel,
    Resource::Hammer,
    Resource::Rod,
    Resource::Cleaver,
    Resource::Scythe,
    Resource::Axe,
    Resource::Saw,
    Resource::Pick,
    Resource::Pincer,
];
