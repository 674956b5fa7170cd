//! Relay nodes: resource slots, directional links, pickup bookkeeping.

use fief_core::{Direction, NodeId, PlayerId, Resource, StructureId};
use fief_grid::MapPos;

/// Resource slots per relay node.  A hard cap of the transport protocol.
pub const MAX_SLOTS: usize = 8;

/// Transporters allowed per road length class.
pub const MAX_TRANSPORTERS: [u8; 8] = [1, 2, 3, 4, 6, 8, 11, 15];

/// Length class 0..=7 for a road of `len` segments.  Determines how many
/// transporters may serve the road.
pub fn road_length_class(len: usize) -> u8 {
    if len >= 24 {
        7
    } else if len >= 18 {
        6
    } else if len >= 13 {
        5
    } else if len >= 10 {
        4
    } else if len >= 7 {
        3
    } else if len >= 6 {
        2
    } else if len >= 4 {
        1
    } else {
        0
    }
}

/// One buffered resource awaiting transport.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Slot {
    pub resource: Option<Resource>,
    /// Destination relay node; `INVALID` while the destination is unknown.
    pub dest: NodeId,
    /// Direction the resource is scheduled to leave through, if scheduled.
    pub pickup_dir: Option<Direction>,
}

/// A road attached to a node, described from this end.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Link {
    /// The relay node at the other end of the road.
    pub other_node: NodeId,
    /// The direction this road occupies at the other end.
    pub other_end_dir: Direction,
    pub water: bool,
    /// Length class 0..=7, see [`road_length_class`].
    pub length_class: u8,
    /// Transporters currently assigned to this road.
    pub transporter_count: u8,
    /// A transporter is present and serving this road.
    pub has_transporter: bool,
    /// A transporter has been requested from an inventory and is en route.
    pub agent_requested: bool,
    /// Slot index scheduled to be picked up by the transporter on this road.
    pub scheduled_slot: Option<u8>,
}

impl Link {
    pub fn new(other_node: NodeId, other_end_dir: Direction, water: bool) -> Link {
        Link {
            other_node,
            other_end_dir,
            water,
            length_class:      0,
            transporter_count: 0,
            has_transporter:   false,
            agent_requested:   false,
            scheduled_slot:    None,
        }
    }

    #[inline]
    pub fn free_transporter_count(&self) -> u8 {
        self.transporter_count
    }

    #[inline]
    pub fn max_transporters(&self) -> u8 {
        MAX_TRANSPORTERS[self.length_class as usize]
    }
}

/// A relay node ("flag"): junction of up to six roads, buffer of up to
/// eight resources, optional front yard of a structure.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RelayNode {
    pub pos:   MapPos,
    pub owner: PlayerId,
    pub slots: [Slot; MAX_SLOTS],
    pub links: [Option<Link>; 6],
    /// Structure whose entrance is this node (always reached via UpLeft).
    pub structure: Option<StructureId>,
    /// The attached structure is a storehouse accepting resources.
    pub accepts_resources: bool,
    /// The attached structure is a storehouse accepting returning agents.
    pub accepts_agents: bool,
    /// The attached structure holds an inventory (castle or stock).
    pub has_inventory: bool,
    /// Slots present that still need scheduling.
    pub schedule_dirty: bool,
    /// A transporter call-up failed; retried by the periodic inventory pass.
    pub agent_request_fail: bool,
    /// Directions with a transporter ready to take a pickup, as decided by
    /// the previous scheduling pass.
    pub transporter_mask: u8,
    /// Search generation stamp.
    pub search_num: u32,
    /// Direction tag propagated through a search from this source.
    pub search_dir: Option<Direction>,
}

impl RelayNode {
    pub fn new(pos: MapPos, owner: PlayerId) -> RelayNode {
        RelayNode {
            pos,
            owner,
            slots:              [Slot::default(); MAX_SLOTS],
            links:              [None; 6],
            structure:          None,
            accepts_resources:  false,
            accepts_agents:     false,
            has_inventory:      false,
            schedule_dirty:     false,
            agent_request_fail: false,
            transporter_mask:   0,
            search_num:         0,
            search_dir:         None,
        }
    }

    // ── Links ─────────────────────────────────────────────────────────────

    #[inline]
    pub fn link(&self, dir: Direction) -> Option<&Link> {
        self.links[dir.index()].as_ref()
    }

    #[inline]
    pub fn link_mut(&mut self, dir: Direction) -> Option<&mut Link> {
        self.links[dir.index()].as_mut()
    }

    #[inline]
    pub fn has_path(&self, dir: Direction) -> bool {
        self.links[dir.index()].is_some()
    }

    pub fn is_water_path(&self, dir: Direction) -> bool {
        self.link(dir).is_some_and(|l| l.water)
    }

    pub fn has_transporter(&self, dir: Direction) -> bool {
        self.link(dir).is_some_and(|l| l.has_transporter)
    }

    pub fn agent_requested(&self, dir: Direction) -> bool {
        self.link(dir).is_some_and(|l| l.agent_requested)
    }

    /// Number of connected roads.
    pub fn connected_count(&self) -> usize {
        self.links.iter().flatten().count()
    }

    /// Total transporters over all roads.
    pub fn transporters(&self) -> u32 {
        self.links
            .iter()
            .flatten()
            .map(|l| l.transporter_count as u32)
            .sum()
    }

    /// Detach the road in `dir`.  Slot scheduling that depended on the road
    /// is invalidated; the caller handles agents that were serving it.
    pub fn del_path(&mut self, dir: Direction) {
        self.links[dir.index()] = None;
        self.invalidate_resource_path(dir);
    }

    // ── Slots ─────────────────────────────────────────────────────────────

    pub fn slot_count(&self) -> usize {
        self.slots.iter().filter(|s| s.resource.is_some()).count()
    }

    pub fn has_empty_slot(&self) -> bool {
        self.slot_count() != MAX_SLOTS
    }

    pub fn has_resources(&self) -> bool {
        self.slot_count() != 0
    }

    /// Buffer a resource here.  Fails (resource stays with the caller) when
    /// all eight slots are filled.
    pub fn drop_resource(&mut self, resource: Resource, dest: NodeId) -> bool {
        for slot in self.slots.iter_mut() {
            if slot.resource.is_none() {
                slot.resource   = Some(resource);
                slot.dest       = dest;
                slot.pickup_dir = None;
                self.schedule_dirty = true;
                return true;
            }
        }
        false
    }

    /// Take the resource out of `slot`, if any, and re-point per-direction
    /// pickup schedules that referenced it.
    pub fn pick_up_resource(&mut self, slot: usize) -> Option<(Resource, NodeId)> {
        let res  = self.slots[slot].resource.take()?;
        let dest = self.slots[slot].dest;
        self.slots[slot].dest       = NodeId::INVALID;
        self.slots[slot].pickup_dir = None;
        self.fix_scheduled();
        Some((res, dest))
    }

    /// Drain every slot (node being demolished or captured).  Returns the
    /// lost `(resource, dest)` pairs for the caller's ledger.
    pub fn remove_all_resources(&mut self) -> Vec<(Resource, NodeId)> {
        let mut lost = Vec::new();
        for slot in self.slots.iter_mut() {
            if let Some(res) = slot.resource.take() {
                lost.push((res, slot.dest));
            }
            slot.dest       = NodeId::INVALID;
            slot.pickup_dir = None;
        }
        for link in self.links.iter_mut().flatten() {
            link.scheduled_slot = None;
        }
        self.schedule_dirty = false;
        lost
    }

    /// Recompute `schedule_dirty` after a slot changed.
    pub fn fix_scheduled(&mut self) {
        self.schedule_dirty = self.has_resources();
    }

    /// Forget the scheduled exit direction of every slot that would have
    /// left through `dir` (road removed or rerouted).
    pub fn invalidate_resource_path(&mut self, dir: Direction) {
        for slot in self.slots.iter_mut() {
            if slot.resource.is_some() && slot.pickup_dir == Some(dir) {
                slot.pickup_dir = None;
                self.schedule_dirty = true;
            }
        }
        if let Some(link) = self.link_mut(dir) {
            link.scheduled_slot = None;
        }
    }

    /// Re-select which slot the transporter on `dir` fetches next, by the
    /// owning player's pickup priority table.  Called whenever the queue
    /// for that direction changes.
    pub fn prioritize_pickup(&mut self, dir: Direction, flag_prio: &[u8; Resource::COUNT]) {
        let mut next: Option<u8> = None;
        let mut best = -1i32;
        for (i, slot) in self.slots.iter().enumerate() {
            if let Some(res) = slot.resource {
                if slot.pickup_dir == Some(dir) && i32::from(flag_prio[res.index()]) > best {
                    next = Some(i as u8);
                    best = i32::from(flag_prio[res.index()]);
                }
            }
        }
        if let Some(link) = self.link_mut(dir) {
            link.scheduled_slot = next;
        }
    }

    /// The slot scheduled for pickup on `dir`, set by the scheduler when a
    /// destination search resolves through that road.
    pub fn scheduled_slot(&self, dir: Direction) -> Option<u8> {
        self.link(dir).and_then(|l| l.scheduled_slot)
    }

    /// Per-direction histogram of waiting slots: `res_waiting[k]` has the
    /// bit for `dir` set when strictly more than `k` slots wait on `dir`.
    pub fn res_waiting_mask(&self) -> [u8; 4] {
        let mut waiting = [0u8; 4];
        for slot in &self.slots {
            if slot.resource.is_some() {
                if let Some(dir) = slot.pickup_dir {
                    for mask in waiting.iter_mut() {
                        if *mask & dir.bit() == 0 {
                            *mask |= dir.bit();
                            break;
                        }
                    }
                }
            }
        }
        waiting
    }

    /// A node can be removed only when exactly two land roads pass through
    /// it and they lead to different nodes (they will be merged).
    pub fn can_demolish(&self) -> bool {
        let mut connected = 0;
        let mut other_end: Option<NodeId> = None;
        for dir in Direction::iter() {
            if let Some(link) = self.link(dir) {
                if link.water {
                    return false;
                }
                connected += 1;
                match other_end {
                    Some(seen) if seen == link.other_node => return false,
                    Some(_) => {}
                    None => other_end = Some(link.other_node),
                }
            }
        }
        connected == 2
    }
}
