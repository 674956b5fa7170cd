//! The world aggregate and the tick scheduler.

use fief_agent::{Agent, AgentState, AgentStore};
use fief_core::{
    AgentId, GameRng, NodeId, PlayerId, Profession, Resource, SimConfig, SimError, SimResult,
    StructureId,
};
use fief_grid::{Geometry, Map, MapPos};
use fief_relay::RelayStore;
use fief_structure::{StructureKind, StructureStore};

use crate::player::Player;
use crate::{agents, structures, transport};

/// Ticks between knight morale recomputations.
const MORALE_INTERVAL: i32 = 256;

/// Ticks between inventory out-scheduling passes.
const INVENTORY_INTERVAL: i32 = 64;

/// The complete simulation state.  Everything a replay needs is in here;
/// with the `serde` feature the whole aggregate (including the generator
/// state) round-trips through a snapshot.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct World {
    pub map: Map,
    pub relays: RelayStore,
    pub structures: StructureStore,
    pub agents: AgentStore,
    pub players: Vec<Player>,
    pub rng: GameRng,

    pub game_speed: u16,
    /// Wrapping game-time tick; all activity counters run on this.
    pub tick: u16,
    /// Monotonic update count, independent of game speed.
    pub const_tick: u32,
    pub last_tick: u16,
    /// Ticks covered by the current update.
    pub tick_diff: i32,

    /// Mined gold still in play; morale is a share of this.
    pub gold_total: u32,
    pub gold_morale_factor: u32,

    /// Resources destroyed with their holder, by kind.  The conservation
    /// ledger: stored + in transit + buffered + lost is constant between
    /// production events.
    pub lost_resources: [u32; Resource::COUNT],

    knight_morale_counter: i32,
    inventory_schedule_counter: i32,
}

impl World {
    /// A world over `geometry` with `player_count` players and the
    /// configured seed and speed.
    pub fn new(geometry: Geometry, player_count: u8, config: SimConfig) -> World {
        let players = (0..player_count).map(|i| Player::new(PlayerId(i))).collect();
        World {
            map: Map::new(geometry),
            relays: RelayStore::new(),
            structures: StructureStore::new(),
            agents: AgentStore::new(),
            players,
            rng: GameRng::from_seed(config.seed),

            game_speed: config.game_speed as u16,
            tick:       0,
            const_tick: 0,
            last_tick:  0,
            tick_diff:  0,

            gold_total: 0,
            gold_morale_factor: 10 * 1024 * u32::from(player_count),

            lost_resources: [0; Resource::COUNT],

            knight_morale_counter: 0,
            inventory_schedule_counter: 0,
        }
    }

    pub fn player(&self, id: PlayerId) -> SimResult<&Player> {
        self.players
            .get(id.index())
            .ok_or(SimError::Corrupt(format!("no player {id}")))
    }

    pub fn player_mut(&mut self, id: PlayerId) -> SimResult<&mut Player> {
        self.players
            .get_mut(id.index())
            .ok_or(SimError::Corrupt(format!("no player {id}")))
    }

    // ── Resource accounting ───────────────────────────────────────────────

    /// A resource left the game for good.
    pub fn lose_resource(&mut self, res: Resource) {
        self.lost_resources[res.index()] += 1;
        if res == Resource::GoldOre || res == Resource::GoldBar {
            self.gold_total = self.gold_total.saturating_sub(1);
        }
    }

    /// Un-book a resource that was requested by the structure behind
    /// `dest` but will never arrive.
    pub fn cancel_transported_resource(&mut self, res: Resource, dest: NodeId) {
        if !dest.is_valid() {
            return;
        }
        let Some(structure) = self
            .relays
            .get(dest)
            .and_then(|n| n.structure)
            .and_then(|id| self.structures.get_mut(id))
        else {
            return;
        };
        for stock in structure.stocks.iter_mut() {
            if stock.requested > 0 && stock.item.is_some_and(|item| item.accepts(res)) {
                stock.requested -= 1;
                return;
            }
        }
    }

    /// Total units of `res` anywhere in the world, for conservation
    /// checks: inventories, node slots, carried by agents, and lost.
    pub fn resource_census(&self, res: Resource) -> u32 {
        let mut total = self.lost_resources[res.index()];
        for id in self.structures.ids() {
            if let Some(s) = self.structures.get(id) {
                if let Some(inv) = &s.inventory {
                    total += inv.count_of(res);
                }
            }
        }
        for id in self.relays.ids() {
            if let Some(node) = self.relays.get(id) {
                total += node
                    .slots
                    .iter()
                    .filter(|s| s.resource == Some(res))
                    .count() as u32;
            }
        }
        for id in self.agents.ids() {
            if let Some(agent) = self.agents.get(id) {
                let carried = match &agent.state {
                    AgentState::Transporting { resource, .. }
                    | AgentState::Delivering { resource, .. } => *resource,
                    AgentState::MoveResourceOut { resource, .. }
                    | AgentState::DropResourceOut { resource, .. } => Some(*resource),
                    _ => None,
                };
                if carried == Some(res) {
                    total += 1;
                }
            }
        }
        total
    }

    // ── Agents ────────────────────────────────────────────────────────────

    /// Create a fresh generic agent parked in `inventory`.
    pub fn spawn_agent(&mut self, inventory: StructureId) -> SimResult<AgentId> {
        let s = self.structures.try_get(inventory)?;
        let (player, pos) = (s.owner, s.pos);
        let id = self.agents.add(Agent::new(
            Profession::Generic,
            player,
            pos,
            AgentState::IdleInStock { inventory },
        ));
        let s = self.structures.try_get_mut(inventory)?;
        if let Some(inv) = s.inventory.as_mut() {
            inv.agent_in(Profession::Generic);
        }
        Ok(id)
    }

    /// The inventory structures of `player`, ascending by ID.
    pub fn player_inventories(&self, player: PlayerId) -> Vec<StructureId> {
        self.structures
            .ids()
            .filter(|&id| {
                self.structures
                    .get(id)
                    .is_some_and(|s| s.owner == player && s.inventory.is_some())
            })
            .collect()
    }

    /// The structure standing behind node `node`, if any.
    pub fn structure_at_node(&self, node: NodeId) -> Option<StructureId> {
        self.relays.get(node)?.structure
    }

    // ── Scheduler ─────────────────────────────────────────────────────────

    /// One deterministic update step.  Sub-system order is fixed: players,
    /// morale, inventory scheduling, nodes, structures, agents; each pass
    /// walks its arena in ascending index order.
    pub fn update(&mut self) -> SimResult<()> {
        self.const_tick += 1;
        self.last_tick = self.tick;
        self.tick = self.tick.wrapping_add(self.game_speed);
        self.tick_diff = i32::from(self.tick.wrapping_sub(self.last_tick));

        self.clear_request_failures();
        self.map.update_growth(&mut self.rng);

        self.update_players()?;

        self.knight_morale_counter -= self.tick_diff;
        if self.knight_morale_counter < 0 {
            self.update_knight_morale();
            self.knight_morale_counter += MORALE_INTERVAL;
        }

        self.inventory_schedule_counter -= self.tick_diff;
        if self.inventory_schedule_counter < 0 {
            transport::update_inventories(self)?;
            self.inventory_schedule_counter += INVENTORY_INTERVAL;
        }

        transport::update_nodes(self)?;
        structures::update_structures(self)?;
        agents::update_agents(self)?;
        Ok(())
    }

    /// Failed call-ups are retried once per update.
    fn clear_request_failures(&mut self) {
        for id in self.structures.ids().collect::<Vec<_>>() {
            if let Some(s) = self.structures.get_mut(id) {
                s.agent_request_fail = false;
            }
        }
        for id in self.relays.ids().collect::<Vec<_>>() {
            if let Some(n) = self.relays.get_mut(id) {
                n.agent_request_fail = false;
            }
        }
    }

    fn update_players(&mut self) -> SimResult<()> {
        let delta = self.tick_diff as u16;
        for pi in 0..self.players.len() {
            let spawns = self.players[pi].update_reproduction(delta);
            for want_knight in spawns {
                self.reproduce_agent(PlayerId(pi as u8), want_knight)?;
            }
            self.players[pi].last_tick = self.tick;
        }
        Ok(())
    }

    /// Spawn a new agent in the player's least-crowded open inventory,
    /// arming it as a knight when asked and possible.
    fn reproduce_agent(&mut self, player: PlayerId, want_knight: bool) -> SimResult<()> {
        let mut best: Option<(StructureId, u16)> = None;
        for id in self.player_inventories(player) {
            let s = self.structures.try_get(id)?;
            let Some(inv) = &s.inventory else { continue };
            if inv.agent_mode != fief_structure::StockMode::In {
                continue;
            }
            if want_knight
                && (inv.count_of(Resource::Sword) == 0 || inv.count_of(Resource::Shield) == 0)
            {
                continue;
            }
            let free = inv.free_agent_count();
            if free == 0 {
                best = Some((id, free));
                break;
            }
            if best.is_none_or(|(_, f)| free < f) {
                best = Some((id, free));
            }
        }

        let Some((inv_id, _)) = best else {
            if want_knight {
                // Fall back to an unarmed spawn.
                return self.reproduce_agent(player, false);
            }
            return Ok(());
        };

        let agent = self.spawn_agent(inv_id)?;
        if want_knight {
            let s = self.structures.try_get_mut(inv_id)?;
            if let Some(inv) = s.inventory.as_mut() {
                if inv.specialize_agent(Profession::Knight0) {
                    self.agents.try_get_mut(agent)?.profession = Profession::Knight0;
                    self.player_mut(player)?.knight_spawned();
                }
            }
        }
        Ok(())
    }

    /// Recompute each player's morale from its share of the world's gold.
    fn update_knight_morale(&mut self) {
        for pi in 0..self.players.len() {
            let player_id = PlayerId(pi as u8);
            let mut depot = 0u32;
            for id in self.structures.ids() {
                let Some(s) = self.structures.get(id) else { continue };
                if s.owner != player_id {
                    continue;
                }
                if let Some(inv) = &s.inventory {
                    depot += inv.count_of(Resource::GoldBar);
                }
                depot += u32::from(s.gold_stored());
            }
            let (total, factor) = (self.gold_total, self.gold_morale_factor);
            self.players[pi].update_knight_morale(depot, total, factor);
        }
    }

    // ── Census ────────────────────────────────────────────────────────────

    /// Recount a player's building score from the live structures.
    pub fn building_score(&self, player: PlayerId) -> u32 {
        self.structures
            .ids()
            .filter_map(|id| self.structures.get(id))
            .filter(|s| s.owner == player && s.is_done() && !s.burning)
            .map(|s| s.kind.score())
            .sum()
    }

    /// Military score: garrisoned knight ranks over all military
    /// structures.
    pub fn military_score(&self, player: PlayerId) -> u32 {
        let mut score = 0;
        for id in self.structures.ids() {
            let Some(s) = self.structures.get(id) else { continue };
            if s.owner != player || !s.kind.is_military() || !s.active {
                continue;
            }
            let mut knight = s.main_agent;
            while knight.is_valid() {
                let Some(agent) = self.agents.get(knight) else { break };
                score += 1 + u32::from(agent.profession.knight_rank().unwrap_or(0));
                knight = agent.state.next_knight().unwrap_or(AgentId::INVALID);
            }
        }
        score
    }
}

/// Which structure kind an agent profession works in, used when routing
/// a trained agent that lost its workplace.
pub fn workplace_for(profession: Profession) -> Option<StructureKind> {
    StructureKind::ALL
        .into_iter()
        .find(|k| k.worker() == Some(profession))
}
