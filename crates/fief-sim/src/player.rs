//! Per-player state: priority tables, distribution settings, demography.

use fief_core::{PlayerId, Resource};
use fief_grid::MapPos;
use fief_structure::StructureKind;

/// Default knight occupation setting per threat level: high nibble is the
/// staffing under full occupation, low nibble under minimum occupation.
pub const DEFAULT_KNIGHT_OCCUPATION: [u8; 4] = [0x10, 0x21, 0x32, 0x43];

/// Something the simulation wants to tell the player.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Notification {
    StructureFinished { pos: MapPos, kind: StructureKind },
    NewStock { pos: MapPos },
    GarrisonOccupied { pos: MapPos },
    UnderAttack { pos: MapPos, by: PlayerId },
    MineEmpty { pos: MapPos },
    StructureLost { pos: MapPos },
    StructureCaptured { pos: MapPos },
    DepositFound { pos: MapPos },
}

/// One player of the simulation.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Player {
    pub id: PlayerId,
    pub has_castle: bool,

    /// Pickup priority at relay nodes; higher wins.
    pub flag_prio: [u8; Resource::COUNT],
    /// Priority when pulling resources back out of inventories.
    pub inventory_prio: [u8; Resource::COUNT],
    /// Tool production weights, indexed like [`fief_core::TOOLS`].
    pub tool_prio: [u16; 9],

    // Distribution settings feeding the stock request priorities.
    pub food_stonemine:      u16,
    pub food_coalmine:       u16,
    pub food_ironmine:       u16,
    pub food_goldmine:       u16,
    pub planks_construction: u16,
    pub planks_boatbuilder:  u16,
    pub planks_toolmaker:    u16,
    pub steel_toolmaker:     u16,
    pub steel_weaponsmith:   u16,
    pub coal_steelsmelter:   u16,
    pub coal_goldsmelter:    u16,
    pub coal_weaponsmith:    u16,
    pub wheat_pigfarm:       u16,
    pub wheat_mill:          u16,

    // Demography.
    pub serf_to_knight_rate:    u16,
    pub serf_to_knight_counter: u16,
    pub knights_to_spawn:       u8,
    pub reproduction_counter:   i32,
    pub reproduction_reset:     i32,

    // Military.
    pub knight_occupation:     [u8; 4],
    pub reduced_knight_level:  bool,
    pub castle_knights:        u8,
    pub castle_knights_wanted: u8,
    pub knight_morale:         u32,
    pub gold_deposited:        u32,
    pub military_max_gold:     u32,
    pub castle_score:          i32,
    send_knight_delay:         i8,
    send_generic_delay:        i8,

    // Census.
    pub total_land_area:      u32,
    pub total_building_score: u32,
    pub total_military_score: u32,
    pub resource_count:       [u32; Resource::COUNT],

    pub last_tick: u16,
    pub notifications: Vec<Notification>,
}

impl Player {
    pub fn new(id: PlayerId) -> Player {
        Player {
            id,
            has_castle: false,

            flag_prio:      default_flag_prio(),
            inventory_prio: default_inventory_prio(),
            tool_prio:      [9825, 65500, 13100, 6550, 13100, 26200, 32750, 45850, 6550],

            food_stonemine:      13100,
            food_coalmine:       45850,
            food_ironmine:       45850,
            food_goldmine:       65500,
            planks_construction: 65500,
            planks_boatbuilder:  3275,
            planks_toolmaker:    19650,
            steel_toolmaker:     45850,
            steel_weaponsmith:   65500,
            coal_steelsmelter:   32750,
            coal_goldsmelter:    65500,
            coal_weaponsmith:    52400,
            wheat_pigfarm:       65500,
            wheat_mill:          32750,

            serf_to_knight_rate:    20000,
            serf_to_knight_counter: 0x8000,
            knights_to_spawn:       0,
            reproduction_counter:   (60 - 40) * 50,
            reproduction_reset:     (60 - 40) * 50,

            knight_occupation:     DEFAULT_KNIGHT_OCCUPATION,
            reduced_knight_level:  false,
            castle_knights:        0,
            castle_knights_wanted: 3,
            knight_morale:         0,
            gold_deposited:        0,
            military_max_gold:     0,
            castle_score:          0,
            send_knight_delay:     0,
            send_generic_delay:    0,

            total_land_area:      0,
            total_building_score: 0,
            total_military_score: 0,
            resource_count:       [0; Resource::COUNT],

            last_tick: 0,
            notifications: Vec::new(),
        }
    }

    /// Effective occupation level 0..=9 for a garrison under
    /// `threat_level`.
    pub fn occupation_level(&self, threat_level: u8) -> usize {
        let mut level = usize::from((self.knight_occupation[threat_level as usize] >> 4) & 0xf);
        if self.reduced_knight_level {
            level += 5;
        }
        level.min(9)
    }

    /// Adjust one nibble of the occupation setting, clamped to 0..=4 and
    /// keeping min <= max.
    pub fn change_knight_occupation(&mut self, threat_level: usize, adjust_max: bool, delta: i8) {
        let mut max = ((self.knight_occupation[threat_level] >> 4) & 0xf) as i8;
        let mut min = (self.knight_occupation[threat_level] & 0xf) as i8;

        if adjust_max {
            max = (max + delta).clamp(min, 4);
        } else {
            min = (min + delta).clamp(0, max);
        }
        self.knight_occupation[threat_level] = ((max as u8) << 4) | min as u8;
    }

    /// Gate on reinforcement calls so a starved garrison does not flood
    /// the search.
    pub fn tick_send_knight_delay(&mut self) -> bool {
        self.send_knight_delay -= 1;
        if self.send_knight_delay < 0 {
            self.send_knight_delay = 5;
            true
        } else {
            false
        }
    }

    pub fn tick_send_generic_delay(&mut self) -> bool {
        self.send_generic_delay -= 1;
        if self.send_generic_delay < 0 {
            self.send_generic_delay = 5;
            true
        } else {
            false
        }
    }

    /// Record a produced resource for the census.
    pub fn resource_produced(&mut self, res: Resource) {
        self.resource_count[res.index()] += 1;
    }

    pub fn notify(&mut self, n: Notification) {
        self.notifications.push(n);
    }

    /// Condensed military score from raw score and morale.
    pub fn military_score(&self) -> u64 {
        u64::from(2048 + (self.knight_morale >> 1)) * u64::from(self.total_military_score << 6)
    }

    /// Recompute knight morale from the player's share of all mined gold.
    /// `depot` is the player's stored gold, `total_gold` the world total,
    /// `morale_factor` the scenario's gold weighting.
    pub fn update_knight_morale(&mut self, depot: u32, total_gold: u32, morale_factor: u32) {
        self.gold_deposited = depot;

        let mut depot = depot;
        let mut total = total_gold;
        if total != 0 {
            while total > 0xffff {
                total >>= 1;
                depot >>= 1;
            }
            depot = depot.min(total - 1);
            self.knight_morale = 1024 + morale_factor * depot / total;
        } else {
            self.knight_morale = 4096;
        }

        if self.castle_score < 0 {
            self.knight_morale = self.knight_morale.saturating_sub(1023).max(1);
        } else if self.castle_score > 0 {
            self.knight_morale =
                (self.knight_morale + 1024 * self.castle_score as u32).min(0xffff);
        }
        self.military_max_gold = 0;
    }

    /// Run the reproduction clock.  Returns how many agents to spawn this
    /// update and whether each should be armed as a knight when possible.
    pub fn update_reproduction(&mut self, delta: u16) -> Vec<bool> {
        let mut spawns = Vec::new();
        if !self.has_castle {
            return spawns;
        }

        self.reproduction_counter -= i32::from(delta);
        while self.reproduction_counter < 0 {
            let before = self.serf_to_knight_counter;
            self.serf_to_knight_counter =
                self.serf_to_knight_counter.wrapping_add(self.serf_to_knight_rate);
            if self.serf_to_knight_counter < before {
                self.knights_to_spawn = (self.knights_to_spawn + 1).min(2);
            }

            spawns.push(self.knights_to_spawn > 0);
            self.reproduction_counter += self.reproduction_reset;
        }
        spawns
    }

    /// A knight spawn actually went through armed.
    pub fn knight_spawned(&mut self) {
        self.knights_to_spawn = self.knights_to_spawn.saturating_sub(1);
    }
}

fn default_flag_prio() -> [u8; Resource::COUNT] {
    let mut p = [0u8; Resource::COUNT];
    p[Resource::GoldOre.index()] = 1;
    p[Resource::GoldBar.index()] = 2;
    p[Resource::Wheat.index()]   = 3;
    p[Resource::Flour.index()]   = 4;
    p[Resource::Pig.index()]     = 5;
    p[Resource::Boat.index()]    = 6;
    p[Resource::Pincer.index()]  = 7;
    p[Resource::Scythe.index()]  = 8;
    p[Resource::Rod.index()]     = 9;
    p[Resource::Cleaver.index()] = 10;
    p[Resource::Saw.index()]     = 11;
    p[Resource::Axe.index()]     = 12;
    p[Resource::Pick.index()]    = 13;
    p[Resource::Shovel.index()]  = 14;
    p[Resource::Hammer.index()]  = 15;
    p[Resource::Shield.index()]  = 16;
    p[Resource::Sword.index()]   = 17;
    p[Resource::Bread.index()]   = 18;
    p[Resource::Meat.index()]    = 19;
    p[Resource::Fish.index()]    = 20;
    p[Resource::IronOre.index()] = 21;
    p[Resource::Lumber.index()]  = 22;
    p[Resource::Coal.index()]    = 23;
    p[Resource::Steel.index()]   = 24;
    p[Resource::Stone.index()]   = 25;
    p[Resource::Plank.index()]   = 26;
    p
}

fn default_inventory_prio() -> [u8; Resource::COUNT] {
    let mut p = [0u8; Resource::COUNT];
    p[Resource::Wheat.index()]   = 1;
    p[Resource::Flour.index()]   = 2;
    p[Resource::Pig.index()]     = 3;
    p[Resource::Bread.index()]   = 4;
    p[Resource::Fish.index()]    = 5;
    p[Resource::Meat.index()]    = 6;
    p[Resource::Lumber.index()]  = 7;
    p[Resource::Plank.index()]   = 8;
    p[Resource::Boat.index()]    = 9;
    p[Resource::Stone.index()]   = 10;
    p[Resource::Coal.index()]    = 11;
    p[Resource::IronOre.index()] = 12;
    p[Resource::Steel.index()]   = 13;
    p[Resource::Shovel.index()]  = 14;
    p[Resource::Hammer.index()]  = 15;
    p[Resource::Rod.index()]     = 16;
    p[Resource::Cleaver.index()] = 17;
    p[Resource::Scythe.index()]  = 18;
    p[Resource::Axe.index()]     = 19;
    p[Resource::Saw.index()]     = 20;
    p[Resource::Pick.index()]    = 21;
    p[Resource::Pincer.index()]  = 22;
    p[Resource::Shield.index()]  = 23;
    p[Resource::Sword.index()]   = 24;
    p[Resource::GoldOre.index()] = 25;
    p[Resource::GoldBar.index()] = 26;
    p
}
