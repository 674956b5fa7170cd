//! Agent professions and military ranks.

use std::fmt;

use crate::Resource;

/// What an agent is trained as.  Generic agents are untrained and can be
/// specialized by an inventory that holds the required tools.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Profession {
    Transporter          = 0,
    Sailor               = 1,
    Digger               = 2,
    Builder              = 3,
    TransporterInventory = 4,
    Lumberjack           = 5,
    Sawmiller            = 6,
    Stonecutter          = 7,
    Forester             = 8,
    Miner                = 9,
    Smelter              = 10,
    Fisher               = 11,
    PigFarmer            = 12,
    Butcher              = 13,
    Farmer               = 14,
    Miller               = 15,
    Baker                = 16,
    BoatBuilder          = 17,
    Toolmaker            = 18,
    WeaponSmith          = 19,
    Geologist            = 20,
    Generic              = 21,
    Knight0              = 22,
    Knight1              = 23,
    Knight2              = 24,
    Knight3              = 25,
    Knight4              = 26,
}

impl Profession {
    pub const COUNT: usize = 27;

    #[inline(always)]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_u8(v: u8) -> Option<Profession> {
        if (v as usize) < Self::COUNT {
            // Discriminants are dense from 0, so the transmute-free decode
            // is a match over the raw value.
            Some(match v {
                0 => Profession::Transporter,
                1 => Profession::Sailor,
                2 => Profession::Digger,
                3 => Profession::Builder,
                4 => Profession::TransporterInventory,
                5 => Profession::Lumberjack,
                6 => Profession::Sawmiller,
                7 => Profession::Stonecutter,
                8 => Profession::Forester,
                9 => Profession::Miner,
                10 => Profession::Smelter,
                11 => Profession::Fisher,
                12 => Profession::PigFarmer,
                13 => Profession::Butcher,
                14 => Profession::Farmer,
                15 => Profession::Miller,
                16 => Profession::Baker,
                17 => Profession::BoatBuilder,
                18 => Profession::Toolmaker,
                19 => Profession::WeaponSmith,
                20 => Profession::Geologist,
                21 => Profession::Generic,
                22 => Profession::Knight0,
                23 => Profession::Knight1,
                24 => Profession::Knight2,
                25 => Profession::Knight3,
                _ => Profession::Knight4,
            })
        } else {
            None
        }
    }

    /// `true` for any military rank.
    #[inline]
    pub fn is_knight(self) -> bool {
        (Profession::Knight0 as u8..=Profession::Knight4 as u8).contains(&(self as u8))
    }

    /// Experience rank 0..5 for knights, `None` otherwise.
    #[inline]
    pub fn knight_rank(self) -> Option<u8> {
        if self.is_knight() {
            Some(self as u8 - Profession::Knight0 as u8)
        } else {
            None
        }
    }

    /// The knight one rank above, capped at the highest rank.
    pub fn promoted(self) -> Profession {
        match self {
            Profession::Knight0 => Profession::Knight1,
            Profession::Knight1 => Profession::Knight2,
            Profession::Knight2 => Profession::Knight3,
            Profession::Knight3 | Profession::Knight4 => Profession::Knight4,
            other => other,
        }
    }

    /// Tools an inventory must consume to specialize a generic agent into
    /// this profession.  Knights take a sword and shield.
    pub fn required_tools(self) -> (Option<Resource>, Option<Resource>) {
        match self {
            Profession::Digger      => (Some(Resource::Shovel), None),
            Profession::Builder     => (Some(Resource::Hammer), None),
            Profession::Lumberjack  => (Some(Resource::Axe), None),
            Profession::Sawmiller   => (Some(Resource::Saw), None),
            Profession::Stonecutter => (Some(Resource::Pick), None),
            Profession::Miner       => (Some(Resource::Pick), None),
            Profession::Fisher      => (Some(Resource::Rod), None),
            Profession::Butcher     => (Some(Resource::Cleaver), None),
            Profession::Farmer      => (Some(Resource::Scythe), None),
            Profession::BoatBuilder => (Some(Resource::Hammer), None),
            Profession::Geologist   => (Some(Resource::Hammer), None),
            Profession::Toolmaker   => (Some(Resource::Hammer), Some(Resource::Saw)),
            Profession::WeaponSmith => (Some(Resource::Hammer), Some(Resource::Pincer)),
            Profession::Sailor      => (Some(Resource::Boat), None),
            Profession::Knight0     => (Some(Resource::Sword), Some(Resource::Shield)),
            _ => (None, None),
        }
    }
}

impl fmt::Display for Profession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}
