//! Handlers for the storage and road-transport families: parked agents,
//! walkers on the road network, carriers serving roads, and the
//! enter/leave bracketing around structure doors.

use fief_agent::{ANIMATION_COUNTER, AgentState, OnPath};
use fief_core::{AgentId, Direction, NodeId, Profession, SimResult};
use fief_grid::Mineral;
use fief_relay::SearchOpts;
use fief_structure::{StockMode, StructureKind};

use crate::World;
use crate::player::Notification;
use crate::transport::find_nearest_inventory_for_agent;

use super::{
    change_direction, consume_ticks, enter_building, enter_inventory, leave_building, node_at,
    structure_id_at,
};

// ── Storage ───────────────────────────────────────────────────────────────────

/// Knight promotion odds while parked, by rank.
const STOCK_TRAINING: [u16; 4] = [4000, 2000, 1000, 500];

pub(super) fn idle_in_stock(world: &mut World, id: AgentId) -> SimResult<()> {
    let AgentState::IdleInStock { inventory } = world.agents.try_get(id)?.state else {
        return Ok(());
    };
    let pushing_out = world
        .structures
        .get(inventory)
        .and_then(|s| s.inventory.as_deref())
        .is_some_and(|inv| inv.agent_mode == StockMode::Out);

    if !pushing_out {
        let prof = world.agents.try_get(id)?.profession;
        if let Some(rank) = prof.knight_rank() {
            if rank < 4 {
                let tick = world.tick;
                let promoted = {
                    let mut rng = world.rng.clone();
                    let r = world
                        .agents
                        .try_get_mut(id)?
                        .train_knight(tick, STOCK_TRAINING[rank as usize], &mut rng);
                    world.rng = rng;
                    r
                };
                if promoted {
                    // Keep the pool counts in step with the promotion.
                    if let Some(inv) = world
                        .structures
                        .get_mut(inventory)
                        .and_then(|s| s.inventory.as_mut())
                    {
                        inv.call_agent_internal(prof);
                        inv.agent_in(prof.promoted());
                    }
                }
            }
        }
        return Ok(());
    }

    // The inventory is evicting its agents.
    let prof = world.agents.try_get(id)?.profession;
    if let Some(inv) = world
        .structures
        .get_mut(inventory)
        .and_then(|s| s.inventory.as_mut())
    {
        if !inv.call_agent_out(prof) {
            return Ok(());
        }
    }
    world.agents.try_get_mut(id)?.state = AgentState::ReadyToLeaveInventory {
        mode: -3,
        dest: NodeId::INVALID,
        inventory,
    };
    Ok(())
}

pub(super) fn ready_to_leave_inventory(world: &mut World, id: AgentId) -> SimResult<()> {
    let tick = world.tick;
    {
        let a = world.agents.try_get_mut(id)?;
        a.tick = tick;
        a.counter = 0;
    }
    let AgentState::ReadyToLeaveInventory { mode, dest, .. } =
        world.agents.try_get(id)?.state
    else {
        return Ok(());
    };
    let pos = world.agents.try_get(id)?.pos;

    let door_blocked = world.map.agent_at(pos).is_some_and(|o| o != id)
        || world
            .map
            .agent_at(world.map.moved(pos, Direction::DownRight))
            .is_some();
    if door_blocked {
        world.agents.try_get_mut(id)?.animation = 82;
        return Ok(());
    }

    if mode == -1 {
        // A worker headed for a structure holds back while its door cell
        // is occupied.
        let busy = world
            .relays
            .get(dest)
            .and_then(|n| n.structure)
            .and_then(|sid| world.structures.get(sid))
            .is_some_and(|s| world.map.agent_at(s.pos).is_some());
        if busy {
            world.agents.try_get_mut(id)?.animation = 82;
            return Ok(());
        }
    }

    let next = if mode == -3 {
        AgentState::Scatter
    } else {
        AgentState::Walking { dir1: mode, dest, dir: 0, wait_counter: 0 }
    };
    leave_building(world, id, next, false)
}

pub(super) fn move_resource_out(world: &mut World, id: AgentId) -> SimResult<()> {
    let tick = world.tick;
    {
        let a = world.agents.try_get_mut(id)?;
        a.tick = tick;
        a.counter = 0;
    }
    let AgentState::MoveResourceOut { resource, dest } = world.agents.try_get(id)?.state
    else {
        return Ok(());
    };
    let pos = world.agents.try_get(id)?.pos;
    let door = world.map.moved(pos, Direction::DownRight);

    let blocked = world.map.agent_at(pos).is_some_and(|o| o != id)
        || world.map.agent_at(door).is_some();
    let node_full = !world
        .relays
        .get(node_at(world, door))
        .is_some_and(|n| n.has_empty_slot());
    if blocked || node_full {
        world.agents.try_get_mut(id)?.animation = 82;
        return Ok(());
    }

    leave_building(world, id, AgentState::DropResourceOut { resource, dest }, false)
}

pub(super) fn wait_for_resource_out(world: &mut World, id: AgentId) -> SimResult<()> {
    if world.agents.try_get(id)?.counter != 0 {
        if consume_ticks(world, id)? >= 0 {
            return Ok(());
        }
        world.agents.try_get_mut(id)?.counter = 0;
    }

    let pos = world.agents.try_get(id)?.pos;
    let sid = structure_id_at(world, pos);
    let out = world
        .structures
        .get_mut(sid)
        .and_then(|s| s.inventory.as_mut())
        .and_then(|inv| inv.take_from_out_queue());
    if let Some(slot) = out {
        world.agents.try_get_mut(id)?.state = AgentState::MoveResourceOut {
            resource: slot.resource,
            dest: slot.dest,
        };
    }
    Ok(())
}

pub(super) fn drop_resource_out(world: &mut World, id: AgentId) -> SimResult<()> {
    let AgentState::DropResourceOut { resource, dest } = world.agents.try_get(id)?.state
    else {
        return Ok(());
    };
    let pos = world.agents.try_get(id)?.pos;
    let node = node_at(world, pos);
    let dropped = world
        .relays
        .get_mut(node)
        .is_some_and(|n| n.drop_resource(resource, dest));
    if !dropped {
        world.cancel_transported_resource(resource, dest);
        world.lose_resource(resource);
    }
    world.agents.try_get_mut(id)?.state = AgentState::ReadyToEnter { mode: 0 };
    Ok(())
}

pub(super) fn finished_building(world: &mut World, id: AgentId) -> SimResult<()> {
    let pos = world.agents.try_get(id)?.pos;
    if world
        .map
        .agent_at(world.map.moved(pos, Direction::DownRight))
        .is_some()
    {
        return Ok(());
    }
    let a = world.agents.try_get_mut(id)?;
    a.state = AgentState::ReadyToLeave {
        next: Box::new(AgentState::Walking {
            dir1: -2,
            dest: NodeId::INVALID,
            dir: 0,
            wait_counter: 0,
        }),
    };
    if world.map.agent_at(pos).is_some_and(|o| o != id) {
        world.agents.try_get_mut(id)?.animation = 82;
    }
    Ok(())
}

// ── Road walking ──────────────────────────────────────────────────────────────

fn complete_transporter_request(world: &mut World, node: NodeId, dir: Direction) {
    let other = world
        .relays
        .get(node)
        .and_then(|n| n.link(dir))
        .map(|l| (l.other_node, l.other_end_dir));
    if let Some(link) = world.relays.get_mut(node).and_then(|n| n.link_mut(dir)) {
        link.agent_requested = false;
        link.transporter_count += 1;
        link.has_transporter = true;
    }
    if let Some((other_node, other_dir)) = other {
        if let Some(link) = world
            .relays
            .get_mut(other_node)
            .and_then(|n| n.link_mut(other_dir))
        {
            link.agent_requested = false;
            link.transporter_count += 1;
            link.has_transporter = true;
        }
    }
}

/// One surplus carrier stops serving this road.
fn release_transporter(world: &mut World, node: NodeId, dir: Direction) {
    let other = world
        .relays
        .get(node)
        .and_then(|n| n.link(dir))
        .map(|l| (l.other_node, l.other_end_dir));
    if let Some(link) = world.relays.get_mut(node).and_then(|n| n.link_mut(dir)) {
        link.transporter_count = link.transporter_count.saturating_sub(1);
    }
    if let Some((other_node, other_dir)) = other {
        if let Some(link) = world
            .relays
            .get_mut(other_node)
            .and_then(|n| n.link_mut(other_dir))
        {
            link.transporter_count = link.transporter_count.saturating_sub(1);
        }
    }
}

pub(super) fn walking(world: &mut World, id: AgentId) -> SimResult<()> {
    consume_ticks(world, id)?;

    while world.agents.try_get(id)?.counter < 0 {
        let AgentState::Walking { dir1, dest, dir, .. } = world.agents.try_get(id)?.state
        else {
            return Ok(());
        };

        if dir < 0 {
            walking_waiting(world, id)?;
            continue;
        }

        let pos = world.agents.try_get(id)?.pos;
        let mut routed = false;

        if world.map.has_flag(pos) {
            let node = node_at(world, pos);
            let mut dest = dest;

            if !dest.is_valid() {
                match find_nearest_inventory_for_agent(world, node) {
                    Some(found) => {
                        dest = found;
                        if let AgentState::Walking { dest: d, .. } =
                            &mut world.agents.try_get_mut(id)?.state
                        {
                            *d = found;
                        }
                    }
                    None => {
                        let a = world.agents.try_get_mut(id)?;
                        a.state = AgentState::Lost { mode: 1 };
                        a.counter = 0;
                        return Ok(());
                    }
                }
            }

            if dest == node {
                walking_dest_reached(world, id)?;
                return Ok(());
            }

            // Route towards the destination over land roads.
            let mut sources: Vec<(NodeId, Option<Direction>)> = Vec::new();
            {
                let n = world.relays.try_get(node)?;
                for d in Direction::iter_rev() {
                    if let Some(link) = n.link(d) {
                        if !link.water {
                            sources.push((link.other_node, Some(d)));
                        }
                    }
                }
            }
            let found = world.relays.search(
                &sources,
                SearchOpts { land_only: true, with_transporter: false },
                |_, nid| nid == dest,
            );
            if found {
                if let Some(d) = world.relays.try_get(dest)?.search_dir {
                    change_direction(world, id, d, false)?;
                    continue;
                }
            }
        } else {
            // Mid-road: follow the only continuation.
            let paths = world.map.paths(pos) & !(1 << dir as u8);
            let next = Direction::ALL.into_iter().find(|d| paths == d.bit());
            if let Some(d) = next {
                change_direction(world, id, d, false)?;
                continue;
            }
            routed = false;
            let _ = routed;
            world.agents.try_get_mut(id)?.counter = 0;
        }

        // Dead end, or no route to the destination.
        let _ = routed;
        if dir1 < 0 {
            if dir1 < -1 {
                let a = world.agents.try_get_mut(id)?;
                a.state = AgentState::Lost { mode: 1 };
                a.counter = 0;
                return Ok(());
            }
            super::worker_call_failed(world, dest);
        } else if dir1 != 6 {
            super::cancel_transporter_request(world, dest, Direction::from_u8(dir1 as u8));
        }

        let a = world.agents.try_get_mut(id)?;
        if let AgentState::Walking { dir1, dest, .. } = &mut a.state {
            *dir1 = -2;
            *dest = NodeId::INVALID;
        }
        a.counter = 0;
    }
    Ok(())
}

/// Blocked walker: follow the chain of agents waiting on each other and
/// reverse out of a deadlock loop.
fn walking_waiting(world: &mut World, id: AgentId) -> SimResult<()> {
    let AgentState::Walking { dir, wait_counter, .. } = world.agents.try_get(id)?.state
    else {
        return Ok(());
    };
    let heading = Direction::from_u8((dir + 6) as u8);
    let pos = world.agents.try_get(id)?.pos;

    let wait_counter = wait_counter + 1;
    if let AgentState::Walking { wait_counter: wc, .. } =
        &mut world.agents.try_get_mut(id)?.state
    {
        *wc = wait_counter;
    }

    let check_loop =
        (!world.map.has_flag(pos) && wait_counter >= 10) || wait_counter >= 50;
    if check_loop {
        let mut follow = heading;
        let mut probe = pos;
        for _ in 0..100 {
            probe = world.map.moved(probe, follow);
            let Some(other_id) = world.map.agent_at(probe) else { break };
            if other_id == id {
                // Deadlock loop; back out.
                return change_direction(world, id, heading.reverse(), false);
            }
            let other = world.agents.try_get(other_id)?;
            let other_dir = match other.state {
                AgentState::Walking { dir, .. }
                | AgentState::Transporting { dir, .. } => dir,
                _ => break,
            };
            if other_dir >= 0 || (other_dir + 6) as u8 == follow.reverse().index() as u8 {
                break;
            }
            follow = Direction::from_u8((other_dir + 6) as u8);
        }
    }

    if let AgentState::Walking { wait_counter: wc, .. } =
        &mut world.agents.try_get_mut(id)?.state
    {
        *wc = 0;
    }
    change_direction(world, id, heading, false)
}

fn walking_dest_reached(world: &mut World, id: AgentId) -> SimResult<()> {
    let AgentState::Walking { dir1, dest, .. } = world.agents.try_get(id)?.state else {
        return Ok(());
    };
    let pos = world.agents.try_get(id)?.pos;

    if dir1 < 0 {
        // Report to the structure behind this node.
        let door = world.map.moved(pos, Direction::UpLeft);
        let sid = structure_id_at(world, door);
        if let Some(s) = world.structures.get_mut(sid) {
            s.holder = true;
            if s.agent_requested {
                s.main_agent = id;
            }
            s.agent_requested = false;
        }
        if world.map.agent_at(door).is_some() {
            let a = world.agents.try_get_mut(id)?;
            a.animation = 85;
            a.counter = 0;
            a.state = AgentState::ReadyToEnter { mode: dir1 };
        } else {
            enter_building(world, id, dir1, false)?;
        }
    } else if dir1 == 6 {
        let a = world.agents.try_get_mut(id)?;
        a.state = AgentState::LookingForGeoSpot;
        a.counter = 0;
    } else {
        // Take over the road leaving this node in `dir1`.
        let node = node_at(world, pos);
        let road_dir = Direction::from_u8(dir1 as u8);
        complete_transporter_request(world, node, road_dir);

        world.agents.try_get_mut(id)?.state = AgentState::Transporting {
            resource: None,
            dest: NodeId::INVALID,
            dir: road_dir.index() as i32,
            wait_counter: 0,
        };
        transporter_move_to_flag(world, id, road_dir)?;
        let _ = dest;
    }
    Ok(())
}

// ── Transporting ──────────────────────────────────────────────────────────────

/// At a node: service the scheduled pickup for the road in `dir`, swap or
/// drop the carried resource, then head back down the road.
fn transporter_move_to_flag(world: &mut World, id: AgentId, dir: Direction) -> SimResult<()> {
    let pos = world.agents.try_get(id)?.pos;
    let node = node_at(world, pos);
    let player = world.agents.try_get(id)?.player;

    let scheduled = world
        .relays
        .get(node)
        .and_then(|n| n.scheduled_slot(dir));
    if let Some(slot) = scheduled {
        let carried = match world.agents.try_get(id)?.state {
            AgentState::Transporting { resource: Some(res), dest, .. } => Some((res, dest)),
            _ => None,
        };
        let picked = world
            .relays
            .get_mut(node)
            .and_then(|n| n.pick_up_resource(slot as usize));
        if let Some((res, res_dest)) = picked {
            if let AgentState::Transporting { resource, dest, wait_counter, .. } =
                &mut world.agents.try_get_mut(id)?.state
            {
                *resource = Some(res);
                *dest = res_dest;
                *wait_counter = 0;
            }
            if let Some((old_res, old_dest)) = carried {
                if let Some(n) = world.relays.get_mut(node) {
                    if !n.drop_resource(old_res, old_dest) {
                        world.cancel_transported_resource(old_res, old_dest);
                        world.lose_resource(old_res);
                    }
                }
            }
            let flag_prio = world.player(player)?.flag_prio;
            if let Some(n) = world.relays.get_mut(node) {
                n.prioritize_pickup(dir, &flag_prio);
            }
        }
    } else if let AgentState::Transporting { resource: Some(res), dest, .. } =
        world.agents.try_get(id)?.state
    {
        if world
            .relays
            .get_mut(node)
            .is_some_and(|n| n.drop_resource(res, dest))
        {
            if let AgentState::Transporting { resource, dest, .. } =
                &mut world.agents.try_get_mut(id)?.state
            {
                *resource = None;
                *dest = NodeId::INVALID;
            }
        }
    }

    change_direction(world, id, dir, true)
}

pub(super) fn transporting(world: &mut World, id: AgentId) -> SimResult<()> {
    if consume_ticks(world, id)? >= 0 {
        return Ok(());
    }

    let AgentState::Transporting { resource, dest, dir, wait_counter } =
        world.agents.try_get(id)?.state
    else {
        return Ok(());
    };

    if dir < 0 {
        return change_direction(world, id, Direction::from_u8((dir + 6) as u8), true);
    }

    let pos = world.agents.try_get(id)?.pos;
    if world.map.has_flag(pos) {
        if wait_counter < 0 {
            // Released from road duty; report back to an inventory.
            let a = world.agents.try_get_mut(id)?;
            a.state = AgentState::Walking {
                dir1: -2,
                dest: NodeId::INVALID,
                dir: 0,
                wait_counter: 0,
            };
            a.counter = 0;
            return Ok(());
        }

        if resource.is_some() && node_at(world, pos) == dest {
            // Hand the resource into the structure behind the node.
            let door = world.map.moved(pos, Direction::UpLeft);
            let h_diff =
                i32::from(world.map.height(door)) - i32::from(world.map.height(pos));
            let a = world.agents.try_get_mut(id)?;
            a.state = AgentState::Delivering { resource, dest, dir, wait_counter: 0 };
            a.animation = 3 + h_diff + (Direction::UpLeft.index() as i32 + 6) * 9;
            a.counter = ANIMATION_COUNTER[a.animation as usize];
            return Ok(());
        }

        let road_dir = Direction::from_u8(dir as u8);
        return transporter_move_to_flag(world, id, road_dir);
    }

    // Mid-road: follow the only continuation.
    let paths = world.map.paths(pos) & !(1 << dir as u8);
    let Some(next_dir) = Direction::ALL.into_iter().find(|d| paths == d.bit()) else {
        let a = world.agents.try_get_mut(id)?;
        a.state = AgentState::Lost { mode: 0 };
        a.counter = 0;
        return Ok(());
    };

    let next_pos = world.map.moved(pos, next_dir);
    if !world.map.has_flag(next_pos) || resource.is_some() || wait_counter < 0 {
        return change_direction(world, id, next_dir, true);
    }

    // Empty-handed and approaching a node: maybe park or stand down.
    let node = node_at(world, next_pos);
    let rev = next_dir.reverse();
    let other = world
        .relays
        .try_get(node)?
        .link(rev)
        .map(|l| (l.other_node, l.other_end_dir));
    let Some((other_node, other_dir)) = other else {
        return change_direction(world, id, next_dir, true);
    };

    if world.relays.try_get(node)?.scheduled_slot(rev).is_some() {
        return change_direction(world, id, next_dir, true);
    }

    {
        let a = world.agents.try_get_mut(id)?;
        a.animation = 110 + dir;
        a.counter = ANIMATION_COUNTER[a.animation as usize];
        if let AgentState::Transporting { dir: d, .. } = &mut a.state {
            *d = dir - 6;
        }
    }

    let crowded = world
        .relays
        .try_get(node)?
        .link(rev)
        .is_some_and(|l| l.free_transporter_count() > 1);
    if crowded {
        let wc = wait_counter + 1;
        if let AgentState::Transporting { wait_counter: w, .. } =
            &mut world.agents.try_get_mut(id)?.state
        {
            *w = wc;
        }
        if wc > 3 {
            release_transporter(world, node, rev);
            if let AgentState::Transporting { wait_counter: w, .. } =
                &mut world.agents.try_get_mut(id)?.state
            {
                *w = -1;
            }
        }
    } else if world
        .relays
        .try_get(other_node)?
        .scheduled_slot(other_dir)
        .is_none()
    {
        // Nothing scheduled at either end; park on the road middle.
        let a = world.agents.try_get_mut(id)?;
        a.state = AgentState::IdleOnPath(OnPath { rev_dir: rev, node, misc: dir });
        world.map.set_idle_agent(pos, id);
    }
    Ok(())
}

pub(super) fn delivering(world: &mut World, id: AgentId) -> SimResult<()> {
    consume_ticks(world, id)?;

    while world.agents.try_get(id)?.counter < 0 {
        let AgentState::Delivering { resource, dest, dir, wait_counter } =
            world.agents.try_get(id)?.state
        else {
            return Ok(());
        };

        if wait_counter != 0 {
            let a = world.agents.try_get_mut(id)?;
            a.state = AgentState::Transporting { resource, dest, dir, wait_counter: 0 };
            let road_dir = Direction::from_u8(dir as u8);
            return transporter_move_to_flag(world, id, road_dir);
        }

        if let Some(res) = resource {
            if let AgentState::Delivering { resource, dest, .. } =
                &mut world.agents.try_get_mut(id)?.state
            {
                *resource = None;
                *dest = NodeId::INVALID;
            }
            let pos = world.agents.try_get(id)?.pos;
            let door = world.map.moved(pos, Direction::UpLeft);
            let sid = structure_id_at(world, door);
            let accepted = match world.structures.get_mut(sid) {
                Some(s) if !s.burning => {
                    if let Some(inv) = s.inventory.as_mut() {
                        inv.push_resource(res);
                        true
                    } else {
                        s.resource_delivered(res)
                    }
                }
                _ => false,
            };
            if !accepted {
                world.lose_resource(res);
            }
        }

        let a = world.agents.try_get_mut(id)?;
        a.animation = 4 + 9 - (a.animation - (3 + 10 * 9));
        if let AgentState::Delivering { wait_counter, .. } = &mut a.state {
            *wait_counter = -*wait_counter - 1;
        }
        a.counter += ANIMATION_COUNTER[a.animation as usize] >> 1;
    }
    Ok(())
}

// ── Idle transporters ─────────────────────────────────────────────────────────

pub(super) fn idle_on_path(world: &mut World, id: AgentId) -> SimResult<()> {
    let AgentState::IdleOnPath(on_path) = world.agents.try_get(id)?.state else {
        return Ok(());
    };
    let OnPath { rev_dir, node, misc } = on_path;

    let resume_dir = if world
        .relays
        .get(node)
        .is_some_and(|n| n.scheduled_slot(rev_dir).is_some())
    {
        misc
    } else {
        let other = world
            .relays
            .get(node)
            .and_then(|n| n.link(rev_dir))
            .map(|l| (l.other_node, l.other_end_dir));
        let other_scheduled = other.is_some_and(|(other_node, other_dir)| {
            world
                .relays
                .get(other_node)
                .is_some_and(|n| n.scheduled_slot(other_dir).is_some())
        });
        if !other_scheduled {
            return Ok(());
        }
        rev_dir.reverse().index() as i32
    };

    let pos = world.agents.try_get(id)?.pos;
    if world.map.blocking_agent(pos).is_none() {
        world.map.set_agent(pos, id);
        let tick = world.tick;
        let a = world.agents.try_get_mut(id)?;
        a.state = AgentState::Transporting {
            resource: None,
            dest: NodeId::INVALID,
            dir: resume_dir,
            wait_counter: 0,
        };
        a.tick = tick;
        a.counter = 0;
    } else {
        world.agents.try_get_mut(id)?.state =
            AgentState::WaitIdleOnPath(OnPath { rev_dir, node, misc: resume_dir });
    }
    Ok(())
}

pub(super) fn wait_idle_on_path(world: &mut World, id: AgentId) -> SimResult<()> {
    let AgentState::WaitIdleOnPath(on_path) = world.agents.try_get(id)?.state else {
        return Ok(());
    };
    let pos = world.agents.try_get(id)?.pos;
    if world.map.blocking_agent(pos).is_some() {
        return Ok(());
    }
    world.map.set_agent(pos, id);
    let tick = world.tick;
    let a = world.agents.try_get_mut(id)?;
    a.state = AgentState::Transporting {
        resource: None,
        dest: NodeId::INVALID,
        dir: on_path.misc,
        wait_counter: 0,
    };
    a.tick = tick;
    a.counter = 0;
    Ok(())
}

pub(super) fn wake_at_flag(world: &mut World, id: AgentId) -> SimResult<()> {
    let pos = world.agents.try_get(id)?.pos;
    if world.map.blocking_agent(pos).is_some() {
        return Ok(());
    }
    world.map.set_agent(pos, id);
    let tick = world.tick;
    let a = world.agents.try_get_mut(id)?;
    a.tick = tick;
    a.counter = 0;
    a.state = if a.profession == Profession::Sailor {
        AgentState::LostSailor
    } else {
        AgentState::Lost { mode: 0 }
    };
    Ok(())
}

pub(super) fn wake_on_path(world: &mut World, id: AgentId) -> SimResult<()> {
    let AgentState::WakeOnPath(on_path) = world.agents.try_get(id)?.state else {
        return Ok(());
    };
    let pos = world.agents.try_get(id)?.pos;
    let resume = Direction::iter_rev()
        .find(|d| world.map.has_path(pos, *d))
        .map(|d| d.index() as i32)
        .unwrap_or(0);
    world.agents.try_get_mut(id)?.state = AgentState::WaitIdleOnPath(OnPath {
        rev_dir: on_path.rev_dir,
        node: on_path.node,
        misc: resume,
    });
    Ok(())
}

// ── Structure bracketing ──────────────────────────────────────────────────────

pub(super) fn ready_to_enter(world: &mut World, id: AgentId) -> SimResult<()> {
    let AgentState::ReadyToEnter { mode } = world.agents.try_get(id)?.state else {
        return Ok(());
    };
    let pos = world.agents.try_get(id)?.pos;
    if world
        .map
        .agent_at(world.map.moved(pos, Direction::UpLeft))
        .is_some()
    {
        let a = world.agents.try_get_mut(id)?;
        a.animation = 85;
        a.counter = 0;
        return Ok(());
    }
    enter_building(world, id, mode, false)
}

pub(super) fn ready_to_leave(world: &mut World, id: AgentId) -> SimResult<()> {
    let tick = world.tick;
    {
        let a = world.agents.try_get_mut(id)?;
        a.tick = tick;
        a.counter = 0;
    }
    let pos = world.agents.try_get(id)?.pos;
    let door = world.map.moved(pos, Direction::DownRight);
    if world.map.agent_at(pos).is_some_and(|o| o != id) || world.map.agent_at(door).is_some()
    {
        world.agents.try_get_mut(id)?.animation = 82;
        return Ok(());
    }
    let AgentState::ReadyToLeave { next } = world.agents.try_get(id)?.state.clone() else {
        return Ok(());
    };
    leave_building(world, id, *next, false)
}

pub(super) fn leaving_building(world: &mut World, id: AgentId) -> SimResult<()> {
    if consume_ticks(world, id)? >= 0 {
        return Ok(());
    }
    let AgentState::LeavingBuilding { next } = world.agents.try_get(id)?.state.clone()
    else {
        return Ok(());
    };
    let a = world.agents.try_get_mut(id)?;
    a.counter = 0;
    a.state = *next;
    Ok(())
}

pub(super) fn entering_building(world: &mut World, id: AgentId) -> SimResult<()> {
    let counter = consume_ticks(world, id)?;
    let AgentState::EnteringBuilding { mode, slope_len } = world.agents.try_get(id)?.state
    else {
        return Ok(());
    };
    if counter >= 0 && counter > slope_len {
        return Ok(());
    }

    let pos = world.agents.try_get(id)?.pos;
    let sid = structure_id_at(world, pos);
    let burning = match world.structures.get(sid) {
        Some(s) => s.burning,
        None => true,
    };
    if !world.map.has_structure(pos) || burning {
        let a = world.agents.try_get_mut(id)?;
        a.state = AgentState::Lost { mode: 0 };
        a.counter = 0;
        return Ok(());
    }

    world.agents.try_get_mut(id)?.counter = slope_len;
    let prof = world.agents.try_get(id)?.profession;

    if mode == -2 && prof != Profession::TransporterInventory && prof != Profession::Generic
    {
        return enter_inventory(world, id);
    }

    match prof {
        Profession::Transporter => {
            // Becomes the resident carrier of a stock, opening its node
            // to the network.
            world.map.clear_agent(pos);
            let door = world.map.moved(pos, Direction::DownRight);
            let node = node_at(world, door);
            if let Some(n) = world.relays.get_mut(node) {
                n.has_inventory     = true;
                n.accepts_resources = true;
                n.accepts_agents    = true;
            }
            let a = world.agents.try_get_mut(id)?;
            a.profession = Profession::TransporterInventory;
            a.state = AgentState::WaitForResourceOut;
            a.counter = 63;
        }
        Profession::TransporterInventory => {
            world.map.clear_agent(pos);
            let a = world.agents.try_get_mut(id)?;
            a.state = AgentState::WaitForResourceOut;
            a.counter = 63;
        }
        Profession::Sailor => return enter_inventory(world, id),
        Profession::Generic => return enter_inventory(world, id),
        Profession::Digger => {
            let target = world.map.height(pos);
            world.agents.try_get_mut(id)?.state = AgentState::Digging {
                h_index: 15,
                target_height: target,
                dig_pos: 6,
                substate: 1,
            };
        }
        Profession::Builder => {
            let kind = world.structures.try_get(sid)?.kind;
            let fancy_scaffold = matches!(
                kind,
                StructureKind::Stock
                    | StructureKind::Sawmill
                    | StructureKind::Toolmaker
                    | StructureKind::Fortress
            );
            let a = world.agents.try_get_mut(id)?;
            a.animation = if fancy_scaffold { 100 } else { 98 };
            a.counter = 127;
            a.state = AgentState::Building {
                mode: 1,
                structure: sid,
                material_step: if fancy_scaffold { 1 << 7 } else { 0 },
                counter: 0,
            };
        }
        Profession::Lumberjack => {
            world.map.clear_agent(pos);
            world.agents.try_get_mut(id)?.state = AgentState::PlanningLogging;
        }
        Profession::Stonecutter => {
            world.map.clear_agent(pos);
            world.agents.try_get_mut(id)?.state = AgentState::PlanningStoneCutting;
        }
        Profession::Forester => {
            world.map.clear_agent(pos);
            world.agents.try_get_mut(id)?.state = AgentState::PlanningPlanting;
        }
        Profession::Fisher => {
            world.map.clear_agent(pos);
            world.agents.try_get_mut(id)?.state = AgentState::PlanningFishing;
        }
        Profession::Farmer => {
            world.map.clear_agent(pos);
            world.agents.try_get_mut(id)?.state = AgentState::PlanningFarming;
        }
        Profession::Sawmiller => {
            world.map.clear_agent(pos);
            if mode != 0 {
                world.structures.try_get_mut(sid)?.setup_operating_stocks();
            }
            world.agents.try_get_mut(id)?.state = AgentState::Sawing { mode: 0 };
        }
        Profession::Miner => {
            world.map.clear_agent(pos);
            let kind = world.structures.try_get(sid)?.kind;
            if mode != 0 {
                let s = world.structures.try_get_mut(sid)?;
                s.active = true;
                s.setup_operating_stocks();
            }
            let deposit = match kind {
                StructureKind::StoneMine => Mineral::Stone,
                StructureKind::CoalMine  => Mineral::Coal,
                StructureKind::IronMine  => Mineral::Iron,
                _                        => Mineral::Gold,
            };
            world.agents.try_get_mut(id)?.state =
                AgentState::Mining { substate: 0, res: None, deposit };
        }
        Profession::Smelter => {
            world.map.clear_agent(pos);
            let kind = world.structures.try_get(sid)?.kind;
            if mode != 0 {
                world.structures.try_get_mut(sid)?.setup_operating_stocks();
            }
            world.agents.try_get_mut(id)?.state = AgentState::Smelting {
                mode: 0,
                counter: 0,
                gold: kind == StructureKind::GoldSmelter,
            };
        }
        Profession::PigFarmer => {
            world.map.clear_agent(pos);
            if mode != 0 {
                let s = world.structures.try_get_mut(sid)?;
                s.setup_operating_stocks();
                s.stocks[1].available = 1;
                world.agents.try_get_mut(id)?.state = AgentState::PigFarming { mode: 0 };
            } else {
                let a = world.agents.try_get_mut(id)?;
                a.state = AgentState::PigFarming { mode: 6 };
                a.counter = 0;
            }
        }
        Profession::Butcher => {
            world.map.clear_agent(pos);
            if mode != 0 {
                world.structures.try_get_mut(sid)?.setup_operating_stocks();
            }
            world.agents.try_get_mut(id)?.state = AgentState::Butchering { mode: 0 };
        }
        Profession::Miller => {
            world.map.clear_agent(pos);
            if mode != 0 {
                world.structures.try_get_mut(sid)?.setup_operating_stocks();
            }
            world.agents.try_get_mut(id)?.state = AgentState::Milling { mode: 0 };
        }
        Profession::Baker => {
            world.map.clear_agent(pos);
            if mode != 0 {
                world.structures.try_get_mut(sid)?.setup_operating_stocks();
            }
            world.agents.try_get_mut(id)?.state = AgentState::Baking { mode: 0 };
        }
        Profession::BoatBuilder => {
            world.map.clear_agent(pos);
            if mode != 0 {
                world.structures.try_get_mut(sid)?.setup_operating_stocks();
            }
            world.agents.try_get_mut(id)?.state = AgentState::BuildingBoat { mode: 0 };
        }
        Profession::Toolmaker => {
            world.map.clear_agent(pos);
            if mode != 0 {
                world.structures.try_get_mut(sid)?.setup_operating_stocks();
            }
            world.agents.try_get_mut(id)?.state = AgentState::MakingTool { mode: 0 };
        }
        Profession::WeaponSmith => {
            world.map.clear_agent(pos);
            if mode != 0 {
                world.structures.try_get_mut(sid)?.setup_operating_stocks();
            }
            world.agents.try_get_mut(id)?.state = AgentState::MakingWeapon { mode: 0 };
        }
        Profession::Geologist => {
            let a = world.agents.try_get_mut(id)?;
            a.state = AgentState::LookingForGeoSpot;
            a.counter = 0;
        }
        knight if knight.is_knight() => {
            knight_arrived(world, id, sid)?;
        }
        _ => {}
    }
    Ok(())
}

/// A knight walks in through the door of a garrison or the castle.
fn knight_arrived(world: &mut World, id: AgentId, sid: fief_core::StructureId) -> SimResult<()> {
    let s = world.structures.try_get(sid)?;
    if s.burning {
        let a = world.agents.try_get_mut(id)?;
        a.state = AgentState::Lost { mode: 0 };
        a.counter = 0;
        return Ok(());
    }
    let pos = world.agents.try_get(id)?.pos;
    world.map.clear_agent(pos);

    let (owner, has_inventory, kind, s_pos) = {
        let s = world.structures.try_get(sid)?;
        (s.owner, s.kind.has_inventory(), s.kind, s.pos)
    };

    if has_inventory {
        let old_head = world.structures.try_get(sid)?.main_agent;
        world.structures.try_get_mut(sid)?.main_agent = id;
        let a = world.agents.try_get_mut(id)?;
        a.state = AgentState::DefendingCastle { next_knight: old_head };
        a.counter = 6000;
        world.player_mut(owner)?.castle_knights += 1;
        return Ok(());
    }

    {
        let s = world.structures.try_get_mut(sid)?;
        s.requested_knight_arrived();
    }

    let old_head = world.structures.try_get(sid)?.main_agent;
    world.structures.try_get_mut(sid)?.main_agent = id;
    {
        let a = world.agents.try_get_mut(id)?;
        a.state = match kind {
            StructureKind::Hut   => AgentState::DefendingHut { next_knight: old_head },
            StructureKind::Tower => AgentState::DefendingTower { next_knight: old_head },
            _                    => AgentState::DefendingFortress { next_knight: old_head },
        };
        a.counter = 6000;
    }

    if !world.structures.try_get(sid)?.active {
        world.structures.try_get_mut(sid)?.knight_occupied(id);
        world
            .player_mut(owner)?
            .notify(Notification::GarrisonOccupied { pos: s_pos });
    }
    Ok(())
}
