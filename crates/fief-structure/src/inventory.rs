//! Inventories: the resource and agent pools behind a castle or stock.

use fief_core::{NodeId, PlayerId, Profession, Resource, StructureId};

/// Resources queued at the inventory's door, waiting for a carrier.
pub const OUT_QUEUE_LEN: usize = 2;

/// Flow mode of one side of an inventory (resources or agents).
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StockMode {
    /// Accept deliveries.
    #[default]
    In,
    /// Accept nothing, emit nothing.
    Stop,
    /// Push contents back out into the network.
    Out,
}

/// A resource on its way out of the inventory.
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutSlot {
    pub resource: Resource,
    pub dest: NodeId,
}

/// The stores of a castle or stock: a pool per resource kind and a pool of
/// idle agents per profession.  Agents parked here are in their idle state
/// and reappear when called out.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Inventory {
    pub owner: PlayerId,
    /// The castle or stock carrying this inventory.
    pub structure: StructureId,
    /// Relay node at the door.
    pub node: NodeId,
    resources: [u32; Resource::COUNT],
    out_queue: [Option<OutSlot>; OUT_QUEUE_LEN],
    agents: [u16; Profession::COUNT],
    pub resource_mode: StockMode,
    pub agent_mode: StockMode,
    /// Agents dispatched but not yet arrived anywhere, kept so the census
    /// stays conserved.
    pub agents_out: u32,
}

impl Inventory {
    pub fn new(owner: PlayerId, structure: StructureId, node: NodeId) -> Inventory {
        Inventory {
            owner,
            structure,
            node,
            resources:     [0; Resource::COUNT],
            out_queue:     [None; OUT_QUEUE_LEN],
            agents:        [0; Profession::COUNT],
            resource_mode: StockMode::In,
            agent_mode:    StockMode::In,
            agents_out:    0,
        }
    }

    // ── Resources ─────────────────────────────────────────────────────────

    #[inline]
    pub fn count_of(&self, res: Resource) -> u32 {
        self.resources[res.index()]
    }

    pub fn push_resource(&mut self, res: Resource) {
        self.resources[res.index()] += 1;
    }

    /// Take one unit out of the pool.  Returns `false` if none is stored.
    pub fn pop_resource(&mut self, res: Resource) -> bool {
        if self.resources[res.index()] > 0 {
            self.resources[res.index()] -= 1;
            true
        } else {
            false
        }
    }

    /// One unit of any food group member, cheapest kind first.
    pub fn pop_food(&mut self) -> Option<Resource> {
        for res in [Resource::Fish, Resource::Meat, Resource::Bread] {
            if self.pop_resource(res) {
                return Some(res);
            }
        }
        None
    }

    /// Total stored units, for the census.
    pub fn total_resources(&self) -> u32 {
        self.resources.iter().sum()
    }

    /// Drain every pool (inventory destroyed).  Returns the losses.
    pub fn drain(&mut self) -> Vec<(Resource, u32)> {
        let mut lost = Vec::new();
        for res in Resource::ALL {
            let n = std::mem::take(&mut self.resources[res.index()]);
            if n > 0 {
                lost.push((res, n));
            }
        }
        for slot in self.out_queue.iter_mut() {
            if let Some(out) = slot.take() {
                lost.push((out.resource, 1));
            }
        }
        lost
    }

    // ── Out queue ─────────────────────────────────────────────────────────

    pub fn out_queue_full(&self) -> bool {
        self.out_queue.iter().all(|s| s.is_some())
    }

    pub fn has_out_queue(&self) -> bool {
        self.out_queue[0].is_some()
    }

    /// Move one unit from the pool to the door queue, addressed to `dest`.
    pub fn add_to_out_queue(&mut self, res: Resource, dest: NodeId) -> bool {
        if !self.pop_resource(res) {
            return false;
        }
        for slot in self.out_queue.iter_mut() {
            if slot.is_none() {
                *slot = Some(OutSlot { resource: res, dest });
                return true;
            }
        }
        self.push_resource(res);
        false
    }

    /// A carrier picks up the head of the door queue.
    pub fn take_from_out_queue(&mut self) -> Option<OutSlot> {
        let head = self.out_queue[0].take();
        for i in 1..OUT_QUEUE_LEN {
            self.out_queue[i - 1] = self.out_queue[i].take();
        }
        head
    }

    /// The node behind `dest` is gone; queued resources addressed to it go
    /// back into the pool.
    pub fn reset_queue_for_dest(&mut self, dest: NodeId) {
        for slot in self.out_queue.iter_mut() {
            if slot.is_some_and(|s| s.dest == dest) {
                if let Some(out) = slot.take() {
                    self.resources[out.resource.index()] += 1;
                }
            }
        }
        // Keep the head of the queue at index 0.
        let mut packed = [None; OUT_QUEUE_LEN];
        let mut n = 0;
        for slot in self.out_queue.iter_mut() {
            if let Some(out) = slot.take() {
                packed[n] = Some(out);
                n += 1;
            }
        }
        self.out_queue = packed;
    }

    /// Empty the door queue with its destinations intact, so a demolition
    /// can un-book each slot before writing it off.
    pub fn drop_queue(&mut self) -> Vec<OutSlot> {
        self.out_queue.iter_mut().filter_map(|s| s.take()).collect()
    }

    // ── Agents ────────────────────────────────────────────────────────────

    #[inline]
    pub fn agent_count(&self, prof: Profession) -> u16 {
        self.agents[prof.index()]
    }

    pub fn have_agent(&self, prof: Profession) -> bool {
        self.agents[prof.index()] > 0
    }

    /// Untrained agents available for specialization.
    pub fn free_agent_count(&self) -> u16 {
        self.agents[Profession::Generic.index()]
    }

    pub fn total_agents(&self) -> u32 {
        self.agents.iter().map(|&n| u32::from(n)).sum()
    }

    /// An agent walks in and parks here.
    pub fn agent_in(&mut self, prof: Profession) {
        self.agents[prof.index()] += 1;
    }

    /// Call an idle agent of `prof` out of the pool.  Returns `false`
    /// when none is parked here.
    pub fn call_agent_out(&mut self, prof: Profession) -> bool {
        if self.agents[prof.index()] > 0 {
            self.agents[prof.index()] -= 1;
            self.agents_out += 1;
            true
        } else {
            false
        }
    }

    /// Take an agent out of the pool without it leaving the structure
    /// (castle garrison duty).
    pub fn call_agent_internal(&mut self, prof: Profession) -> bool {
        if self.agents[prof.index()] > 0 {
            self.agents[prof.index()] -= 1;
            true
        } else {
            false
        }
    }

    /// The dispatched agent arrived (or was lost) somewhere accountable.
    pub fn agent_out_settled(&mut self) {
        self.agents_out = self.agents_out.saturating_sub(1);
    }

    /// Can a generic agent be trained as `prof` from the tools on hand?
    pub fn can_specialize(&self, prof: Profession) -> bool {
        if self.free_agent_count() == 0 {
            return false;
        }
        let (t1, t2) = prof.required_tools();
        t1.is_none_or(|t| self.count_of(t) > 0) && t2.is_none_or(|t| self.count_of(t) > 0)
    }

    /// Train a generic agent, consuming the profession's tools.  The
    /// trained agent stays parked; call it out separately.
    pub fn specialize_agent(&mut self, prof: Profession) -> bool {
        if !self.can_specialize(prof) {
            return false;
        }
        let (t1, t2) = prof.required_tools();
        if let Some(t) = t1 {
            self.pop_resource(t);
        }
        if let Some(t) = t2 {
            self.pop_resource(t);
        }
        self.agents[Profession::Generic.index()] -= 1;
        self.agents[prof.index()] += 1;
        true
    }

    /// The best knight rank parked here, strongest first.
    pub fn best_knight(&self) -> Option<Profession> {
        [
            Profession::Knight4,
            Profession::Knight3,
            Profession::Knight2,
            Profession::Knight1,
            Profession::Knight0,
        ]
        .into_iter()
        .find(|&k| self.have_agent(k))
    }

    /// Whether either side of the inventory is pushing contents out.
    pub fn have_any_out_mode(&self) -> bool {
        self.resource_mode == StockMode::Out || self.agent_mode == StockMode::Out
    }
}
