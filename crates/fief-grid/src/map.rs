//! The world grid: a toroidal array of cells plus the growth pass.

use fief_core::{AgentId, Direction, GameRng, PlayerId};

use crate::cell::{Cell, Mineral, Object, Space, Terrain};
use crate::pos::{Geometry, MapPos};

/// Cells advanced by one growth pass per scheduler step.
const GROWTH_CELLS_PER_UPDATE: u32 = 48;

/// The world grid.  Exclusively owns all cell contents; relay nodes,
/// structures, and agents hold positions and are held back by index only.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Map {
    geom:  Geometry,
    cells: Vec<Cell>,
    /// Moving cursor of the incremental growth pass.
    update_cursor: u32,
}

impl Map {
    pub fn new(geom: Geometry) -> Map {
        Map {
            geom,
            cells: vec![Cell::default(); geom.tile_count()],
            update_cursor: 0,
        }
    }

    #[inline(always)]
    pub fn geometry(&self) -> &Geometry {
        &self.geom
    }

    // ── Position passthroughs ─────────────────────────────────────────────

    #[inline(always)]
    pub fn pos(&self, col: u32, row: u32) -> MapPos {
        self.geom.pos(col, row)
    }

    #[inline(always)]
    pub fn moved(&self, pos: MapPos, dir: Direction) -> MapPos {
        self.geom.moved(pos, dir)
    }

    #[inline(always)]
    pub fn pos_add(&self, pos: MapPos, dx: i32, dy: i32) -> MapPos {
        self.geom.pos_add(pos, dx, dy)
    }

    #[inline(always)]
    pub fn pos_add_spirally(&self, pos: MapPos, off: usize) -> MapPos {
        self.geom.pos_add_spirally(pos, off)
    }

    // ── Cell access ───────────────────────────────────────────────────────

    #[inline(always)]
    pub fn cell(&self, pos: MapPos) -> &Cell {
        &self.cells[pos.0 as usize]
    }

    #[inline(always)]
    pub fn cell_mut(&mut self, pos: MapPos) -> &mut Cell {
        &mut self.cells[pos.0 as usize]
    }

    // ── Roads ─────────────────────────────────────────────────────────────

    #[inline]
    pub fn paths(&self, pos: MapPos) -> u8 {
        self.cell(pos).paths & 0x3f
    }

    #[inline]
    pub fn has_path(&self, pos: MapPos, dir: Direction) -> bool {
        self.cell(pos).paths & dir.bit() != 0
    }

    pub fn add_path(&mut self, pos: MapPos, dir: Direction) {
        self.cell_mut(pos).paths |= dir.bit();
    }

    pub fn del_path(&mut self, pos: MapPos, dir: Direction) {
        self.cell_mut(pos).paths &= !dir.bit();
    }

    /// `true` if any road touches this cell.
    #[inline]
    pub fn has_any_path(&self, pos: MapPos) -> bool {
        self.paths(pos) != 0
    }

    // ── Terrain & height ──────────────────────────────────────────────────

    #[inline]
    pub fn height(&self, pos: MapPos) -> u8 {
        self.cell(pos).height
    }

    pub fn set_height(&mut self, pos: MapPos, h: u8) {
        self.cell_mut(pos).height = h;
    }

    #[inline]
    pub fn terrain(&self, pos: MapPos) -> Terrain {
        self.cell(pos).terrain
    }

    pub fn set_terrain(&mut self, pos: MapPos, t: Terrain) {
        self.cell_mut(pos).terrain = t;
    }

    #[inline]
    pub fn is_water(&self, pos: MapPos) -> bool {
        self.cell(pos).terrain.is_water()
    }

    /// `true` if any of the six neighbors is water (fishing spots).
    pub fn is_water_adjacent(&self, pos: MapPos) -> bool {
        Direction::iter().any(|d| self.is_water(self.moved(pos, d)))
    }

    // ── Ownership ─────────────────────────────────────────────────────────

    #[inline]
    pub fn owner(&self, pos: MapPos) -> Option<PlayerId> {
        let o = self.cell(pos).owner;
        o.is_valid().then_some(o)
    }

    pub fn set_owner(&mut self, pos: MapPos, owner: PlayerId) {
        self.cell_mut(pos).owner = owner;
    }

    #[inline]
    pub fn is_owned_by(&self, pos: MapPos, player: PlayerId) -> bool {
        self.cell(pos).owner == player
    }

    // ── Occupancy ─────────────────────────────────────────────────────────

    /// The agent blocking this cell, if any.  Idle parked transporters do
    /// not block.
    #[inline]
    pub fn blocking_agent(&self, pos: MapPos) -> Option<AgentId> {
        let c = self.cell(pos);
        (c.occupant.is_valid() && !c.idle_agent).then_some(c.occupant)
    }

    /// The agent recorded in this cell regardless of idle parking.
    #[inline]
    pub fn agent_at(&self, pos: MapPos) -> Option<AgentId> {
        let c = self.cell(pos);
        c.occupant.is_valid().then_some(c.occupant)
    }

    pub fn set_agent(&mut self, pos: MapPos, agent: AgentId) {
        let c = self.cell_mut(pos);
        c.occupant = agent;
        c.idle_agent = false;
    }

    /// Park an idle transporter here without blocking the cell.
    pub fn set_idle_agent(&mut self, pos: MapPos, agent: AgentId) {
        let c = self.cell_mut(pos);
        c.occupant = agent;
        c.idle_agent = true;
    }

    pub fn clear_agent(&mut self, pos: MapPos) {
        let c = self.cell_mut(pos);
        c.occupant = AgentId::INVALID;
        c.idle_agent = false;
    }

    #[inline]
    pub fn is_idle_agent(&self, pos: MapPos) -> bool {
        self.cell(pos).idle_agent
    }

    // ── Objects ───────────────────────────────────────────────────────────

    #[inline]
    pub fn object(&self, pos: MapPos) -> Object {
        self.cell(pos).object
    }

    pub fn set_object(&mut self, pos: MapPos, object: Object, index: u32) {
        let c = self.cell_mut(pos);
        c.object = object;
        c.object_index = index;
    }

    pub fn clear_object(&mut self, pos: MapPos) {
        self.set_object(pos, Object::None, Cell::NO_OBJECT_INDEX);
    }

    #[inline]
    pub fn object_index(&self, pos: MapPos) -> u32 {
        self.cell(pos).object_index
    }

    #[inline]
    pub fn has_flag(&self, pos: MapPos) -> bool {
        self.cell(pos).object == Object::Flag
    }

    #[inline]
    pub fn has_structure(&self, pos: MapPos) -> bool {
        self.cell(pos).object.is_structure()
    }

    #[inline]
    pub fn space(&self, pos: MapPos) -> Space {
        self.cell(pos).object.space()
    }

    /// Walkable off-road and free of any blocking agent.
    pub fn is_open(&self, pos: MapPos) -> bool {
        matches!(self.space(pos), Space::Open | Space::Semipassable)
            && self.blocking_agent(pos).is_none()
            && !self.is_water(pos)
    }

    // ── Minerals ──────────────────────────────────────────────────────────

    #[inline]
    pub fn mineral(&self, pos: MapPos) -> (Mineral, u8) {
        let c = self.cell(pos);
        (c.mineral, c.mineral_amount)
    }

    pub fn set_mineral(&mut self, pos: MapPos, mineral: Mineral, amount: u8) {
        let c = self.cell_mut(pos);
        c.mineral = mineral;
        c.mineral_amount = amount;
    }

    /// Take one unit from the deposit under `pos`.  Returns what was mined.
    pub fn extract_mineral(&mut self, pos: MapPos) -> Mineral {
        let c = self.cell_mut(pos);
        if c.mineral == Mineral::None || c.mineral_amount == 0 {
            return Mineral::None;
        }
        c.mineral_amount -= 1;
        let found = c.mineral;
        if c.mineral_amount == 0 {
            c.mineral = Mineral::None;
        }
        found
    }

    // ── Growth pass ───────────────────────────────────────────────────────

    /// Advance vegetation on a moving window of cells.  Called once per
    /// scheduler step; the cursor wraps so every cell is eventually visited.
    pub fn update_growth(&mut self, rng: &mut GameRng) {
        let total = self.geom.tile_count() as u32;
        for _ in 0..GROWTH_CELLS_PER_UPDATE {
            let pos = MapPos(self.update_cursor);
            self.update_cursor = (self.update_cursor + 1) % total;

            let next = match self.object(pos) {
                Object::Sapling(s) if rng.random() & 3 == 0 => {
                    if s < 7 {
                        Some(Object::Sapling(s + 1))
                    } else {
                        Some(Object::Pine(0))
                    }
                }
                Object::Pine(p) if p < 7 && rng.random() & 3 == 0 => Some(Object::Pine(p + 1)),
                Object::Tree(t) if t < 7 && rng.random() & 3 == 0 => Some(Object::Tree(t + 1)),
                Object::Seeds(s) if rng.random() & 3 == 0 => {
                    if s < 5 {
                        Some(Object::Seeds(s + 1))
                    } else {
                        Some(Object::Field(0))
                    }
                }
                Object::Field(f) if f < 5 && rng.random() & 7 == 0 => Some(Object::Field(f + 1)),
                _ => None,
            };
            if let Some(obj) = next {
                let index = self.object_index(pos);
                self.set_object(pos, obj, index);
            }
        }
    }
}
