//! Transport scheduling: routing buffered resources to consumers, calling
//! transporters onto roads, and the periodic inventory redistribution pass.
//!
//! Everything here runs over the relay graph with the generation-stamped
//! search from `fief-relay`.  Resource searches follow only roads with a
//! serving transporter; agent searches follow any land road.

use std::collections::{HashSet, VecDeque};

use fief_agent::AgentState;
use fief_core::{AgentId, Direction, NodeId, PlayerId, Profession, Resource, SimResult, StructureId};
use fief_relay::{MAX_SLOTS, SearchOpts};
use fief_structure::{Inventory, StockItem, StockMode, Structure};

use crate::World;

/// What a call-up to the nearest inventory is asking for.
#[derive(Copy, Clone, Debug)]
pub enum CallUp {
    /// A trained worker; a generic agent holding both tools is the
    /// fallback when no trained one is parked anywhere reachable.
    Worker { prof: Profession },
    /// A knight of at least `min_rank`.  With a floor of zero a generic
    /// agent can be armed on the spot.
    Knight { min_rank: u8 },
}

/// Resources the scheduler may route to a producing structure without a
/// destination being known up front.  Tools, weapons and boats only move
/// on explicit requests.
fn routable(res: Resource) -> bool {
    matches!(
        res,
        Resource::Fish
            | Resource::Pig
            | Resource::Meat
            | Resource::Wheat
            | Resource::Flour
            | Resource::Bread
            | Resource::Lumber
            | Resource::Plank
            | Resource::Stone
            | Resource::IronOre
            | Resource::Steel
            | Resource::Coal
            | Resource::GoldOre
            | Resource::GoldBar
    )
}

/// The stock item a resource satisfies; the food kinds collapse into one
/// group so any of them can feed a mine.
fn requested_item(res: Resource) -> StockItem {
    if res.is_food() { StockItem::Food } else { StockItem::One(res) }
}

/// Highest request priority any stock of `s` publishes for `item`, or -1.
fn max_stock_priority(s: &Structure, item: StockItem, minimum: u8) -> i32 {
    let mut max = -1i32;
    for stock in s.stocks.iter() {
        if stock.item == Some(item) && stock.prio >= minimum && i32::from(stock.prio) > max {
            max = i32::from(stock.prio);
        }
    }
    max
}

/// Book one incoming unit on the matching stock of `s`.  A granted
/// request mutes the stock's priority: fully when the destination was
/// picked by the inventory pass, halved when it was picked by a node
/// scheduling pass.
pub(crate) fn add_requested_item(s: &mut Structure, item: StockItem, fix_priority: bool) -> bool {
    for stock in s.stocks.iter_mut() {
        if stock.item == Some(item) {
            if fix_priority {
                let prio = if stock.prio & 1 == 0 { 0 } else { stock.prio };
                stock.prio = prio >> 1;
            } else {
                stock.prio = 0;
            }
            stock.requested += 1;
            return true;
        }
    }
    false
}

/// The food kind an inventory gives up first: whichever it holds most of.
fn pick_food_kind(inv: &Inventory) -> Resource {
    let meat = inv.count_of(Resource::Meat);
    let bread = inv.count_of(Resource::Bread);
    let fish = inv.count_of(Resource::Fish);
    if meat > bread {
        if meat > fish { Resource::Meat } else { Resource::Fish }
    } else if bread > fish {
        Resource::Bread
    } else {
        Resource::Fish
    }
}

/// Pull a parked agent of `prof` out of `inventory`, retraining the
/// lowest-numbered generic agent when no trained one is parked there.
/// Pool bookkeeping and the agent entity stay in step.
pub(crate) fn checkout_parked_agent(
    world: &mut World,
    inventory: StructureId,
    prof: Profession,
) -> Option<AgentId> {
    {
        let s = world.structures.get_mut(inventory)?;
        let inv = s.inventory.as_mut()?;
        if !inv.have_agent(prof) && !inv.specialize_agent(prof) {
            return None;
        }
        if !inv.call_agent_out(prof) {
            return None;
        }
    }
    select_parked_entity(world, inventory, prof)
}

/// The agent entity matching a pool withdrawal: the lowest-numbered agent
/// of `prof` parked in `inventory`, else the lowest-numbered generic one,
/// retrained on the spot.  Keeps entities and pool counts in step.
pub(crate) fn select_parked_entity(
    world: &mut World,
    inventory: StructureId,
    prof: Profession,
) -> Option<AgentId> {
    let parked_here = |world: &World, id: AgentId, want: Profession| {
        world.agents.get(id).is_some_and(|a| {
            a.profession == want
                && matches!(a.state, AgentState::IdleInStock { inventory: inv } if inv == inventory)
        })
    };

    let ids: Vec<AgentId> = world.agents.ids().collect();
    if let Some(&id) = ids.iter().find(|&&id| parked_here(world, id, prof)) {
        return Some(id);
    }
    let id = ids
        .iter()
        .copied()
        .find(|&id| parked_here(world, id, Profession::Generic))?;
    if let Some(a) = world.agents.get_mut(id) {
        a.profession = prof;
    }
    Some(id)
}

// ── Node scheduling ───────────────────────────────────────────────────────────

/// Run the scheduling pass over every relay node, ascending by ID.
pub(crate) fn update_nodes(world: &mut World) -> SimResult<()> {
    let ids: Vec<NodeId> = world.relays.ids().collect();
    for id in ids {
        update_node(world, id)?;
    }
    Ok(())
}

/// One node's pass: route unscheduled slots, then rebalance which roads
/// have a transporter ready and call new transporters where roads starve.
fn update_node(world: &mut World, id: NodeId) -> SimResult<()> {
    let Some(node) = world.relays.get(id) else {
        return Ok(());
    };
    let res_waiting = node.res_waiting_mask();

    let mut waiting_count = 0u32;
    if node.has_resources() {
        for slot in 0..MAX_SLOTS {
            let s = world.relays.try_get(id)?.slots[slot];
            if s.resource.is_none() {
                continue;
            }
            waiting_count += 1;
            if s.pickup_dir.is_some() {
                continue;
            }
            if s.dest.is_valid() {
                schedule_slot_to_known_dest(world, id, slot, res_waiting)?;
            } else {
                schedule_slot_to_unknown_dest(world, id, slot)?;
            }
        }
    }

    for dir in Direction::iter_rev() {
        let Some(node) = world.relays.get(id) else {
            break;
        };
        let Some(link) = node.link(dir) else {
            continue;
        };
        let requested = link.agent_requested;
        let free = link.free_transporter_count();
        let max_tr = link.max_transporters();
        let water = link.water;
        let request_fail = node.agent_request_fail;
        let crowded = res_waiting[2] & dir.bit() != 0;

        if requested {
            if crowded {
                // A relief transporter is already on its way; with a full
                // backlog every other road yields to this one.
                if waiting_count >= 7 {
                    world.relays.try_get_mut(id)?.transporter_mask &= dir.bit();
                }
            } else if free != 0 {
                world.relays.try_get_mut(id)?.transporter_mask |= dir.bit();
            }
        } else if free == 0 || crowded {
            if free < max_tr && !request_fail && !call_transporter(world, id, dir, water)? {
                world.relays.try_get_mut(id)?.agent_request_fail = true;
            }
            if waiting_count >= 7 {
                world.relays.try_get_mut(id)?.transporter_mask &= dir.bit();
            }
        } else {
            world.relays.try_get_mut(id)?.transporter_mask |= dir.bit();
        }
    }

    world.relays.try_get_mut(id)?.fix_scheduled();
    Ok(())
}

/// Find a destination for a slot whose resource has nowhere to go yet:
/// the hungriest reachable consumer, else the nearest open inventory.
fn schedule_slot_to_unknown_dest(world: &mut World, id: NodeId, slot: usize) -> SimResult<()> {
    let Some(res) = world.relays.try_get(id)?.slots[slot].resource else {
        return Ok(());
    };

    if routable(res) {
        let want = requested_item(res);
        let mut best_prio = 0i32;
        let mut best: Option<NodeId> = None;

        let mut relays = std::mem::take(&mut world.relays);
        relays.search_single(
            id,
            SearchOpts { land_only: false, with_transporter: true },
            |rs, nid| {
                let Some(sid) = rs.get(nid).and_then(|n| n.structure) else {
                    return false;
                };
                let Some(s) = world.structures.get(sid) else {
                    return false;
                };
                let prio = max_stock_priority(s, want, 0);
                if prio > best_prio {
                    best_prio = prio;
                    best = Some(nid);
                }
                best_prio > 204
            },
        );
        world.relays = relays;

        if let Some(dest) = best {
            if let Some(sid) = world.relays.try_get(dest)?.structure {
                add_requested_item(world.structures.try_get_mut(sid)?, want, true);
            }
            let node = world.relays.try_get_mut(id)?;
            node.slots[slot].dest = dest;
            node.schedule_dirty = true;
            return Ok(());
        }
    }

    match find_nearest_inventory_for_resource(world, id) {
        Some(dest) if dest != id => {
            let node = world.relays.try_get_mut(id)?;
            node.slots[slot].dest = dest;
            node.schedule_dirty = true;
        }
        _ => {
            // No route, or the resource already sits at its only possible
            // destination; it has to move forth and back once before it
            // can be delivered.
            let node = world.relays.try_get_mut(id)?;
            if node.transporter_mask == 0 {
                node.schedule_dirty = true;
            } else if let Some(dir) =
                Direction::iter_rev().find(|d| node.transporter_mask & d.bit() != 0)
            {
                if node.scheduled_slot(dir).is_none() {
                    if let Some(link) = node.link_mut(dir) {
                        link.scheduled_slot = Some(slot as u8);
                    }
                }
                node.slots[slot].pickup_dir = Some(dir);
            }
        }
    }
    Ok(())
}

/// Route a slot whose destination is known: seed a search from the other
/// ends of the roads best placed to fetch it, and schedule the pickup on
/// whichever of them reaches the destination first.
fn schedule_slot_to_known_dest(
    world: &mut World,
    id: NodeId,
    slot: usize,
    res_waiting: [u8; 4],
) -> SimResult<()> {
    let (mask, other_ends, dest, res) = {
        let node = world.relays.try_get(id)?;
        let mut other_ends = [None; 6];
        for dir in Direction::iter() {
            other_ends[dir.index()] = node.link(dir).map(|l| l.other_node);
        }
        (
            node.transporter_mask & 0x3f,
            other_ends,
            node.slots[slot].dest,
            node.slots[slot].resource,
        )
    };
    let Some(res) = res else {
        return Ok(());
    };

    let mut tr = mask;
    let mut sources: Vec<(NodeId, Direction)> = Vec::new();
    let mut seed = |bits: u8, tr: &mut u8, sources: &mut Vec<(NodeId, Direction)>| {
        for k in Direction::iter_rev() {
            if bits & k.bit() != 0 {
                *tr &= !k.bit();
                if let Some(other) = other_ends[k.index()] {
                    if other != id {
                        sources.push((other, k));
                    }
                }
            }
        }
    };

    // Roads whose transporter stands idle first, then roads by how short
    // their pickup queue is.
    let idle = (res_waiting[0] ^ 0x3f) & mask;
    if idle != 0 {
        seed(idle, &mut tr, &mut sources);
    }
    if tr != 0 {
        for j in 0..3 {
            seed(res_waiting[j] ^ res_waiting[j + 1], &mut tr, &mut sources);
            if tr == 0 {
                break;
            }
        }
        if tr != 0 {
            let bits = res_waiting[3];
            seed(bits, &mut tr, &mut sources);
            if bits == 0 {
                world.relays.try_get_mut(id)?.schedule_dirty = true;
                return Ok(());
            }
        }
    }

    if sources.is_empty() {
        world.relays.try_get_mut(id)?.schedule_dirty = true;
        return Ok(());
    }

    // Breadth-first over transporter-served roads.  The scheduling node
    // itself is off limits; a route may not double back through it.
    let mut visited: HashSet<NodeId> = HashSet::new();
    visited.insert(id);
    let mut queue: VecDeque<(NodeId, Direction)> = VecDeque::new();
    for &(n, k) in &sources {
        if visited.insert(n) {
            queue.push_back((n, k));
        }
    }

    let mut found = false;
    while let Some((current, tag)) = queue.pop_front() {
        if current == dest {
            found = true;
            let owner = world.relays.try_get(dest)?.owner;
            let flag_prio = world.player(owner)?.flag_prio;
            let src = world.relays.try_get_mut(id)?;
            match src.scheduled_slot(tag) {
                None => {
                    if let Some(link) = src.link_mut(tag) {
                        link.scheduled_slot = Some(slot as u8);
                    }
                }
                Some(old) => {
                    let old_prio = src.slots[old as usize]
                        .resource
                        .map_or(0, |r| flag_prio[r.index()]);
                    if flag_prio[res.index()] > old_prio {
                        if let Some(link) = src.link_mut(tag) {
                            link.scheduled_slot = Some(slot as u8);
                        }
                    }
                    src.slots[slot].pickup_dir = Some(tag);
                }
            }
            break;
        }

        let mut next: Vec<NodeId> = Vec::new();
        if let Some(node) = world.relays.get(current) {
            for dir in Direction::iter_rev() {
                if let Some(link) = node.link(dir) {
                    if link.has_transporter {
                        next.push(link.other_node);
                    }
                }
            }
        }
        for other in next {
            if visited.insert(other) {
                queue.push_back((other, tag));
            }
        }
    }

    if !found || dest == id {
        world.cancel_transported_resource(res, dest);
        let node = world.relays.try_get_mut(id)?;
        node.slots[slot].dest = NodeId::INVALID;
        node.schedule_dirty = true;
    }
    Ok(())
}

/// Nearest storehouse accepting resources, over transporter-served roads.
pub(crate) fn find_nearest_inventory_for_resource(world: &mut World, id: NodeId) -> Option<NodeId> {
    let mut found = None;
    world.relays.search_single(
        id,
        SearchOpts { land_only: false, with_transporter: true },
        |rs, nid| {
            if rs.get(nid).is_some_and(|n| n.accepts_resources) {
                found = Some(nid);
                true
            } else {
                false
            }
        },
    );
    found
}

/// Nearest storehouse accepting returning agents, over land roads.
pub(crate) fn find_nearest_inventory_for_agent(world: &mut World, id: NodeId) -> Option<NodeId> {
    let mut found = None;
    world.relays.search_single(
        id,
        SearchOpts { land_only: true, with_transporter: false },
        |rs, nid| {
            if rs.get(nid).is_some_and(|n| n.accepts_agents) {
                found = Some(nid);
                true
            } else {
                false
            }
        },
    );
    found
}

// ── Transporter call-up ───────────────────────────────────────────────────────

/// Call a transporter (a sailor for water roads) onto the road leaving
/// `id` in `dir`.  Both road ends search for the nearest inventory with
/// one parked; the agent leaves from whichever end the winning inventory
/// was reached from.
fn call_transporter(
    world: &mut World,
    id: NodeId,
    dir: Direction,
    water: bool,
) -> SimResult<bool> {
    let Some(link) = world.relays.try_get(id)?.link(dir).copied() else {
        return Ok(false);
    };
    let other = link.other_node;
    let other_dir = link.other_end_dir;
    let prof = if water { Profession::Sailor } else { Profession::Transporter };

    let sources = [
        (id, Some(Direction::Right)),
        (other, Some(Direction::DownRight)),
    ];
    let mut main: Option<(StructureId, NodeId)> = None;
    let mut fallback: Option<(StructureId, NodeId)> = None;

    let mut relays = std::mem::take(&mut world.relays);
    relays.search(
        &sources,
        SearchOpts { land_only: true, with_transporter: false },
        |rs, nid| {
            let Some(node) = rs.get(nid) else {
                return false;
            };
            if !node.has_inventory {
                return false;
            }
            let Some(sid) = node.structure else {
                return false;
            };
            let Some(inv) = world.structures.get(sid).and_then(|s| s.inventory.as_deref())
            else {
                return false;
            };
            if inv.have_agent(prof) {
                main = Some((sid, nid));
                return true;
            }
            if fallback.is_none()
                && inv.have_agent(Profession::Generic)
                && (!water || inv.count_of(Resource::Boat) > 0)
            {
                fallback = Some((sid, nid));
            }
            false
        },
    );
    world.relays = relays;

    let Some((sid, inv_node)) = main.or(fallback) else {
        return Ok(false);
    };
    let Some(agent) = checkout_parked_agent(world, sid, prof) else {
        return Ok(false);
    };

    if let Some(link) = world.relays.try_get_mut(id)?.link_mut(dir) {
        link.agent_requested = true;
    }
    if let Some(link) = world.relays.try_get_mut(other)?.link_mut(other_dir) {
        link.agent_requested = true;
    }

    // Leave from the road end the winning inventory was tagged with.
    let from_far_end = world.relays.try_get(inv_node)?.search_dir == Some(Direction::DownRight);
    let (leave_node, leave_dir) = if from_far_end { (other, other_dir) } else { (id, dir) };

    let a = world.agents.try_get_mut(agent)?;
    a.state = AgentState::ReadyToLeaveInventory {
        mode: leave_dir.index() as i32,
        dest: leave_node,
        inventory: sid,
    };
    Ok(true)
}

// ── Agent call-up ─────────────────────────────────────────────────────────────

/// Call an agent out of the nearest inventory that can supply `request`,
/// searching over land roads from `dest`.  Knights and workers walk to
/// the structure behind `dest`; geologists work the node itself; generic
/// agents report to the inventory behind it.
pub(crate) fn send_agent_to_node(
    world: &mut World,
    dest: NodeId,
    request: CallUp,
) -> SimResult<bool> {
    let dest_structure = world.structure_at_node(dest);
    let mut fallback: Option<StructureId> = None;
    let mut done = false;

    let mut relays = std::mem::take(&mut world.relays);
    let found = relays.search_single(
        dest,
        SearchOpts { land_only: true, with_transporter: false },
        |rs, nid| {
            let Some(node) = rs.get(nid) else {
                return false;
            };
            if !node.has_inventory {
                return false;
            }
            let Some(sid) = node.structure else {
                return false;
            };
            let Some(inv) = world.structures.get(sid).and_then(|s| s.inventory.as_deref())
            else {
                return false;
            };

            match request {
                CallUp::Knight { min_rank } => {
                    let ranks = [
                        Profession::Knight4,
                        Profession::Knight3,
                        Profession::Knight2,
                        Profession::Knight1,
                        Profession::Knight0,
                    ];
                    let pick = ranks.into_iter().find(|&k| {
                        k.knight_rank().is_some_and(|r| r >= min_rank) && inv.have_agent(k)
                    });
                    if let Some(rank) = pick {
                        if let Some(agent) = checkout_parked_agent(world, sid, rank) {
                            if let Some(bid) = dest_structure {
                                if let Some(b) = world.structures.get_mut(bid) {
                                    b.knight_requested();
                                }
                            }
                            if let Some(a) = world.agents.get_mut(agent) {
                                a.state = AgentState::ReadyToLeaveInventory {
                                    mode: -1,
                                    dest,
                                    inventory: sid,
                                };
                            }
                            done = true;
                            return true;
                        }
                        return false;
                    }
                    if min_rank == 0
                        && fallback.is_none()
                        && inv.have_agent(Profession::Generic)
                        && inv.count_of(Resource::Sword) > 0
                        && inv.count_of(Resource::Shield) > 0
                    {
                        fallback = Some(sid);
                        return true;
                    }
                    false
                }
                CallUp::Worker { prof } => {
                    if inv.have_agent(prof) {
                        if prof == Profession::Generic && inv.free_agent_count() <= 4 {
                            return false;
                        }
                        if let Some(agent) = checkout_parked_agent(world, sid, prof) {
                            let mode = match prof {
                                Profession::Generic => -2,
                                Profession::Geologist => 6,
                                _ => {
                                    if let Some(bid) = dest_structure {
                                        if let Some(b) = world.structures.get_mut(bid) {
                                            b.agent_requested = true;
                                        }
                                    }
                                    -1
                                }
                            };
                            if let Some(a) = world.agents.get_mut(agent) {
                                a.state = AgentState::ReadyToLeaveInventory {
                                    mode,
                                    dest,
                                    inventory: sid,
                                };
                            }
                            done = true;
                            return true;
                        }
                        return false;
                    }
                    if fallback.is_none() && inv.can_specialize(prof) {
                        fallback = Some(sid);
                        return true;
                    }
                    false
                }
            }
        },
    );
    world.relays = relays;

    if !found {
        return Ok(false);
    }
    if done {
        return Ok(true);
    }

    // Train a generic agent on the spot.
    let Some(sid) = fallback else {
        return Ok(true);
    };
    match request {
        CallUp::Knight { .. } => {
            let Some(agent) = checkout_parked_agent(world, sid, Profession::Knight0) else {
                return Ok(false);
            };
            if let Some(bid) = dest_structure {
                if let Some(b) = world.structures.get_mut(bid) {
                    b.knight_requested();
                }
            }
            if let Some(a) = world.agents.get_mut(agent) {
                a.state = AgentState::ReadyToLeaveInventory { mode: -1, dest, inventory: sid };
            }
        }
        CallUp::Worker { prof } => {
            let Some(agent) = checkout_parked_agent(world, sid, prof) else {
                return Ok(false);
            };
            let mode = if prof == Profession::Geologist {
                6
            } else {
                let Some(bid) = dest_structure else {
                    return Ok(false);
                };
                if let Some(b) = world.structures.get_mut(bid) {
                    b.agent_requested = true;
                }
                -1
            };
            if let Some(a) = world.agents.get_mut(agent) {
                a.state = AgentState::ReadyToLeaveInventory { mode, dest, inventory: sid };
            }
        }
    }
    Ok(true)
}

/// Dispatch a geologist to survey around `dest`.
pub fn send_geologist(world: &mut World, dest: NodeId) -> SimResult<bool> {
    send_agent_to_node(world, dest, CallUp::Worker { prof: Profession::Geologist })
}

// ── Inventory pass ────────────────────────────────────────────────────────────

/// The three redistribution orders.  Which one a pass uses is rolled per
/// pass, weighted towards the balanced order.
const ORDER_BALANCED: [StockItem; 12] = [
    StockItem::One(Resource::Plank),
    StockItem::One(Resource::Stone),
    StockItem::One(Resource::Steel),
    StockItem::One(Resource::Coal),
    StockItem::One(Resource::Lumber),
    StockItem::One(Resource::IronOre),
    StockItem::Food,
    StockItem::One(Resource::Pig),
    StockItem::One(Resource::Flour),
    StockItem::One(Resource::Wheat),
    StockItem::One(Resource::GoldBar),
    StockItem::One(Resource::GoldOre),
];

const ORDER_RAW_FIRST: [StockItem; 12] = [
    StockItem::One(Resource::Stone),
    StockItem::One(Resource::IronOre),
    StockItem::One(Resource::GoldOre),
    StockItem::One(Resource::Coal),
    StockItem::One(Resource::Steel),
    StockItem::One(Resource::GoldBar),
    StockItem::Food,
    StockItem::One(Resource::Pig),
    StockItem::One(Resource::Flour),
    StockItem::One(Resource::Wheat),
    StockItem::One(Resource::Lumber),
    StockItem::One(Resource::Plank),
];

const ORDER_FOOD_FIRST: [StockItem; 12] = [
    StockItem::Food,
    StockItem::One(Resource::Wheat),
    StockItem::One(Resource::Pig),
    StockItem::One(Resource::Flour),
    StockItem::One(Resource::GoldBar),
    StockItem::One(Resource::Stone),
    StockItem::One(Resource::Plank),
    StockItem::One(Resource::Steel),
    StockItem::One(Resource::Coal),
    StockItem::One(Resource::Lumber),
    StockItem::One(Resource::GoldOre),
    StockItem::One(Resource::IronOre),
];

/// The periodic redistribution pass: for each item of the rolled order
/// and each player, every stocked inventory searches for the hungriest
/// reachable consumer and queues one unit for it; inventories in out mode
/// instead queue their most expendable resource with no destination.
pub(crate) fn update_inventories(world: &mut World) -> SimResult<()> {
    let order = match world.rng.random() & 7 {
        0 => &ORDER_RAW_FIRST,
        1 => &ORDER_FOOD_FIRST,
        _ => &ORDER_BALANCED,
    };

    for &item in order.iter() {
        for pi in 0..world.players.len() {
            let player = PlayerId(pi as u8);
            let inv_prio = world.players[pi].inventory_prio;

            let mut sources: Vec<(StructureId, NodeId)> = Vec::new();
            for sid in world.player_inventories(player) {
                let s = world.structures.try_get_mut(sid)?;
                let node = s.node;
                let Some(inv) = s.inventory.as_mut() else {
                    continue;
                };
                if inv.out_queue_full() {
                    continue;
                }
                match inv.resource_mode {
                    StockMode::In | StockMode::Stop => {
                        let stocked = match item {
                            StockItem::Food => {
                                inv.count_of(Resource::Fish) != 0
                                    || inv.count_of(Resource::Meat) != 0
                                    || inv.count_of(Resource::Bread) != 0
                            }
                            StockItem::One(res) => inv.count_of(res) != 0,
                        };
                        if stocked {
                            sources.push((sid, node));
                        }
                    }
                    StockMode::Out => {
                        let mut best: Option<Resource> = None;
                        let mut prio = 0u8;
                        for res in Resource::ALL {
                            if inv.count_of(res) != 0 && inv_prio[res.index()] >= prio {
                                prio = inv_prio[res.index()];
                                best = Some(res);
                            }
                        }
                        if let Some(res) = best {
                            inv.add_to_out_queue(res, NodeId::INVALID);
                        }
                    }
                }
            }
            if sources.is_empty() {
                continue;
            }

            let nodes: Vec<NodeId> = sources.iter().map(|&(_, n)| n).collect();
            let mut max_prio = vec![0i32; sources.len()];
            let mut best_node: Vec<Option<NodeId>> = vec![None; sources.len()];

            let mut relays = std::mem::take(&mut world.relays);
            relays.search_tagged(
                &nodes,
                SearchOpts { land_only: false, with_transporter: true },
                |rs, nid, tag| {
                    if max_prio[tag] >= 255 {
                        return false;
                    }
                    let Some(sid) = rs.get(nid).and_then(|n| n.structure) else {
                        return false;
                    };
                    let Some(s) = world.structures.get(sid) else {
                        return false;
                    };
                    let prio = max_stock_priority(s, item, 16);
                    if prio > max_prio[tag] {
                        max_prio[tag] = prio;
                        best_node[tag] = Some(nid);
                    }
                    false
                },
            );
            world.relays = relays;

            for (i, &(sid, _)) in sources.iter().enumerate() {
                if max_prio[i] <= 0 {
                    continue;
                }
                let Some(dest) = best_node[i] else {
                    continue;
                };
                if let Some(consumer) = world.relays.try_get(dest)?.structure {
                    add_requested_item(world.structures.try_get_mut(consumer)?, item, false);
                }
                let s = world.structures.try_get_mut(sid)?;
                if let Some(inv) = s.inventory.as_mut() {
                    let res = match item {
                        StockItem::Food => pick_food_kind(inv),
                        StockItem::One(res) => res,
                    };
                    inv.add_to_out_queue(res, dest);
                }
            }
        }
    }
    Ok(())
}
