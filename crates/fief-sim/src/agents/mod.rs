//! The agent state handlers.
//!
//! One handler per [`AgentState`], grouped into the road-transport family
//! ([`transport`]), free walking and recovery ([`freewalk`]), production
//! ([`production`]) and combat ([`combat`]).  This module holds the
//! dispatcher and the walking machinery every family shares: stepping
//! onto a neighbor cell, the head-on swap protocol, and the slope timing
//! for entering and leaving structures.

mod combat;
mod freewalk;
mod production;
mod transport;

use fief_agent::{ANIMATION_COUNTER, AgentState, Waiting, walking_animation};
use fief_core::{AgentId, Direction, NodeId, Profession, Resource, SimResult, StructureId};
use fief_grid::MapPos;

use crate::World;

/// Slope timing for the climb between a structure door and its node,
/// indexed by [`fief_structure::StructureKind`].  Higher is steeper.
const ENTRY_SLOPE: [i32; 24] = [
    18, 18, 15, 18, 22, 22, 22, 22, 18, 16, 18, 1,
    10, 1, 15, 15, 16, 15, 15, 10, 15, 20, 15, 18,
];

/// Advance every agent one step, ascending by ID.
pub(crate) fn update_agents(world: &mut World) -> SimResult<()> {
    let ids: Vec<AgentId> = world.agents.ids().collect();
    for id in ids {
        if world.agents.get(id).is_some() {
            update_agent(world, id)?;
        }
    }
    Ok(())
}

fn update_agent(world: &mut World, id: AgentId) -> SimResult<()> {
    let state = world.agents.try_get(id)?.state.clone();
    match state {
        // Storage.
        AgentState::IdleInStock { .. } => transport::idle_in_stock(world, id),
        AgentState::ReadyToLeaveInventory { .. } => {
            transport::ready_to_leave_inventory(world, id)
        }
        AgentState::MoveResourceOut { .. } => transport::move_resource_out(world, id),
        AgentState::WaitForResourceOut => transport::wait_for_resource_out(world, id),
        AgentState::DropResourceOut { .. } => transport::drop_resource_out(world, id),

        // Road network.
        AgentState::Walking { .. } => transport::walking(world, id),
        AgentState::Transporting { .. } => transport::transporting(world, id),
        AgentState::Delivering { .. } => transport::delivering(world, id),
        AgentState::IdleOnPath(_) => transport::idle_on_path(world, id),
        AgentState::WaitIdleOnPath(_) => transport::wait_idle_on_path(world, id),
        AgentState::WakeAtFlag(_) => transport::wake_at_flag(world, id),
        AgentState::WakeOnPath(_) => transport::wake_on_path(world, id),

        // Structure bracketing.
        AgentState::EnteringBuilding { .. } => transport::entering_building(world, id),
        AgentState::LeavingBuilding { .. } => transport::leaving_building(world, id),
        AgentState::ReadyToEnter { .. } => transport::ready_to_enter(world, id),
        AgentState::ReadyToLeave { .. } => transport::ready_to_leave(world, id),

        // Construction.
        AgentState::Digging { .. } => production::digging(world, id),
        AgentState::Building { .. } => production::building(world, id),
        AgentState::BuildingCastle { .. } => production::building_castle(world, id),
        AgentState::FinishedBuilding => transport::finished_building(world, id),

        // Free walking and outdoor work.
        AgentState::FreeWalking(_) => freewalk::free_walking(world, id),
        AgentState::Logging(_) => production::logging(world, id),
        AgentState::PlanningLogging => production::planning_logging(world, id),
        AgentState::PlanningPlanting => production::planning_planting(world, id),
        AgentState::Planting(_) => production::planting(world, id),
        AgentState::PlanningStoneCutting => production::planning_stonecutting(world, id),
        AgentState::StoneCutterFreeWalking(_) => {
            production::stonecutter_free_walking(world, id)
        }
        AgentState::StoneCutting(_) => production::stonecutting(world, id),
        AgentState::PlanningFishing => production::planning_fishing(world, id),
        AgentState::Fishing(_) => production::fishing(world, id),
        AgentState::PlanningFarming => production::planning_farming(world, id),
        AgentState::Farming(_) => production::farming(world, id),
        AgentState::FreeSailing(_) => freewalk::free_sailing(world, id),

        // Indoor production.
        AgentState::Sawing { .. } => production::sawing(world, id),
        AgentState::Mining { .. } => production::mining(world, id),
        AgentState::Smelting { .. } => production::smelting(world, id),
        AgentState::Milling { .. } => production::milling(world, id),
        AgentState::Baking { .. } => production::baking(world, id),
        AgentState::PigFarming { .. } => production::pigfarming(world, id),
        AgentState::Butchering { .. } => production::butchering(world, id),
        AgentState::MakingWeapon { .. } => production::making_weapon(world, id),
        AgentState::MakingTool { .. } => production::making_tool(world, id),
        AgentState::BuildingBoat { .. } => production::building_boat(world, id),

        // Geology.
        AgentState::LookingForGeoSpot => production::looking_for_geo_spot(world, id),
        AgentState::SamplingGeoSpot(_) => production::sampling_geo_spot(world, id),

        // Lost and eviction.
        AgentState::Lost { .. } => freewalk::lost(world, id),
        AgentState::LostSailor => freewalk::lost_sailor(world, id),
        AgentState::EscapeBuilding => freewalk::escape_building(world, id),
        AgentState::Scatter => freewalk::scatter(world, id),

        // Combat.
        AgentState::KnightEngagingBuilding(_) => combat::engaging_building(world, id),
        AgentState::KnightPrepareAttacking(_) => combat::prepare_attacking(world, id),
        AgentState::KnightLeaveForFight { .. } => combat::leave_for_fight(world, id),
        AgentState::KnightPrepareDefending => combat::prepare_defending(world, id),
        AgentState::KnightAttacking(_) | AgentState::KnightAttackingFree(_) => {
            combat::attacking(world, id)
        }
        AgentState::KnightDefending | AgentState::KnightDefendingFree(_) => Ok(()),
        AgentState::KnightAttackingVictory(_) => combat::attacking_victory(world, id),
        AgentState::KnightAttackingDefeat(_) => combat::attacking_defeat(world, id),
        AgentState::KnightOccupyEnemyBuilding => combat::occupy_enemy_building(world, id),
        AgentState::KnightFreeWalking(_) => combat::knight_free_walking(world, id),
        AgentState::KnightEngageDefendingFree(_) => combat::engage_defending_free(world, id),
        AgentState::KnightEngageAttackingFree(_) => combat::engage_attacking_free(world, id),
        AgentState::KnightEngageAttackingFreeJoin(_) => {
            combat::engage_attacking_free_join(world, id)
        }
        AgentState::KnightPrepareAttackingFree(_) => {
            combat::prepare_attacking_free(world, id)
        }
        AgentState::KnightPrepareDefendingFree(_) => {
            combat::prepare_defending_free(world, id)
        }
        AgentState::KnightPrepareDefendingFreeWait(_) => Ok(()),
        AgentState::KnightAttackingVictoryFree { .. } => {
            combat::attacking_victory_free(world, id)
        }
        AgentState::KnightDefendingVictoryFree(_) => combat::defending_victory_free(world, id),
        AgentState::KnightAttackingFreeWait(_) => combat::attacking_free_wait(world, id),
        AgentState::KnightAttackingDefeatFree(_) => combat::attacking_defeat_free(world, id),
        AgentState::KnightLeaveForWalkToFight { .. } => {
            combat::leave_for_walk_to_fight(world, id)
        }

        // Garrison duty.
        AgentState::DefendingHut { .. } => combat::defending(world, id, [250, 125, 62, 31]),
        AgentState::DefendingTower { .. } => {
            combat::defending(world, id, [1000, 500, 250, 125])
        }
        AgentState::DefendingFortress { .. } => {
            combat::defending(world, id, [2000, 1000, 500, 250])
        }
        AgentState::DefendingCastle { .. } => {
            combat::defending(world, id, [4000, 2000, 1000, 500])
        }
    }
}

// ── Shared stepping machinery ─────────────────────────────────────────────────

/// Absorb the ticks since the agent's last update into its counter and
/// return the new counter value.
pub(super) fn consume_ticks(world: &mut World, id: AgentId) -> SimResult<i32> {
    let tick = world.tick;
    let a = world.agents.try_get_mut(id)?;
    let delta = tick.wrapping_sub(a.tick);
    a.tick = tick;
    a.counter -= i32::from(delta);
    Ok(a.counter)
}

/// The node standing on `pos`.
pub(super) fn node_at(world: &World, pos: MapPos) -> NodeId {
    if world.map.has_flag(pos) {
        NodeId(world.map.object_index(pos))
    } else {
        NodeId::INVALID
    }
}

/// Write the road-walking direction register of the three road states.
fn set_road_dir(state: &mut AgentState, v: i32) {
    match state {
        AgentState::Walking { dir, .. }
        | AgentState::Transporting { dir, .. }
        | AgentState::Delivering { dir, .. } => *dir = v,
        _ => {}
    }
}

fn set_road_wait_counter(state: &mut AgentState, v: i32) {
    match state {
        AgentState::Walking { wait_counter, .. }
        | AgentState::Transporting { wait_counter, .. }
        | AgentState::Delivering { wait_counter, .. } => *wait_counter = v,
        _ => {}
    }
}

/// Step onto the neighbor cell in `dir`, swapping with a waiting agent
/// when the cell is blocked by one willing to trade places, else parking
/// this agent in the waiting encoding (`dir - 6`).
///
/// With `alt_end` the wait counter survives the step and a negative
/// counter on arrival at a flag is clamped, which is what lets a
/// transporter service both road ends in one update.
pub(super) fn change_direction(
    world: &mut World,
    id: AgentId,
    dir: Direction,
    alt_end: bool,
) -> SimResult<()> {
    let pos = world.agents.try_get(id)?.pos;
    let new_pos = world.map.moved(pos, dir);
    let h_diff = i32::from(world.map.height(new_pos)) - i32::from(world.map.height(pos));
    let rev = dir.reverse();

    match world.map.blocking_agent(new_pos) {
        None => {
            world.map.clear_agent(pos);
            let a = world.agents.try_get_mut(id)?;
            a.animation = walking_animation(h_diff, dir, false);
            set_road_dir(&mut a.state, rev.index() as i32);
        }
        Some(other_id) => {
            let willing = match world.agents.try_get(other_id)?.waiting_dir() {
                Waiting::Toward(d) => d == rev,
                Waiting::Any => true,
                Waiting::No => false,
            };
            if willing && world.agents.try_get_mut(other_id)?.switch_waiting(rev) {
                let other = world.agents.try_get_mut(other_id)?;
                other.pos = pos;
                other.animation = walking_animation(-h_diff, rev, true);
                other.counter_from_animation();
                world.map.set_agent(pos, other_id);

                let a = world.agents.try_get_mut(id)?;
                a.animation = walking_animation(h_diff, dir, true);
                set_road_dir(&mut a.state, rev.index() as i32);
            } else {
                let a = world.agents.try_get_mut(id)?;
                a.animation = 81 + dir.index() as i32;
                a.counter = ANIMATION_COUNTER[a.animation as usize];
                set_road_dir(&mut a.state, dir.index() as i32 - 6);
                return Ok(());
            }
        }
    }

    let a = world.agents.try_get_mut(id)?;
    if !alt_end {
        set_road_wait_counter(&mut a.state, 0);
    }
    a.pos = new_pos;
    a.counter += ANIMATION_COUNTER[a.animation as usize];
    let clamp = alt_end && a.counter < 0;
    world.map.set_agent(new_pos, id);
    if clamp && world.map.has_flag(new_pos) {
        world.agents.try_get_mut(id)?.counter = 0;
    }
    Ok(())
}

/// Step onto the neighbor cell without any occupancy negotiation, scaled
/// by `slope` (32 = full walking speed charge).
pub(super) fn start_walking(
    world: &mut World,
    id: AgentId,
    dir: Direction,
    slope: i32,
    change_pos: bool,
) -> SimResult<()> {
    let pos = world.agents.try_get(id)?.pos;
    let new_pos = world.map.moved(pos, dir);
    let h_diff = i32::from(world.map.height(new_pos)) - i32::from(world.map.height(pos));

    if change_pos {
        world.map.clear_agent(pos);
        world.map.set_agent(new_pos, id);
    }

    let a = world.agents.try_get_mut(id)?;
    a.animation = walking_animation(h_diff, dir, false);
    a.counter += (slope * ANIMATION_COUNTER[a.animation as usize]) >> 5;
    a.pos = new_pos;
    Ok(())
}

/// Begin the climb from a node into the structure up-left of it.  `mode`
/// is handed to the arrival dispatch.  With `join_pos` the agent shares
/// the departure cell and only claims the door cell.
pub(super) fn enter_building(
    world: &mut World,
    id: AgentId,
    mode: i32,
    join_pos: bool,
) -> SimResult<()> {
    world.agents.try_get_mut(id)?.state =
        AgentState::EnteringBuilding { mode, slope_len: 0 };
    start_walking(world, id, Direction::UpLeft, 32, !join_pos)?;
    let pos = world.agents.try_get(id)?.pos;
    if join_pos {
        world.map.set_agent(pos, id);
    }

    let slope = match world
        .map
        .has_structure(pos)
        .then(|| world.structures.get(structure_id_at(world, pos)))
        .flatten()
    {
        Some(s) if s.is_done() => ENTRY_SLOPE[s.kind.index()],
        _ => 1,
    };
    let a = world.agents.try_get_mut(id)?;
    let slope_len = (slope * a.counter) >> 5;
    if let AgentState::EnteringBuilding { slope_len: len, .. } = &mut a.state {
        *len = slope_len;
    }
    Ok(())
}

/// The structure occupying `pos`, by the object index stamped on the cell.
pub(super) fn structure_id_at(world: &World, pos: MapPos) -> StructureId {
    StructureId(world.map.object_index(pos))
}

/// Begin the descent from a structure door to its node, installing `next`
/// for when the node is reached.
pub(super) fn leave_building(
    world: &mut World,
    id: AgentId,
    next: AgentState,
    join_pos: bool,
) -> SimResult<()> {
    let pos = world.agents.try_get(id)?.pos;
    let slope = match world
        .map
        .has_structure(pos)
        .then(|| world.structures.get(structure_id_at(world, pos)))
        .flatten()
    {
        Some(s) if s.is_done() => 31 - ENTRY_SLOPE[s.kind.index()],
        _ => 30,
    };

    if join_pos {
        world.map.clear_agent(pos);
    }
    start_walking(world, id, Direction::DownRight, slope, !join_pos)?;

    world.agents.try_get_mut(id)?.state = AgentState::LeavingBuilding { next: Box::new(next) };
    Ok(())
}

/// Walk into the inventory behind the current door cell and park there.
pub(super) fn enter_inventory(world: &mut World, id: AgentId) -> SimResult<()> {
    let (pos, prof) = {
        let a = world.agents.try_get(id)?;
        (a.pos, a.profession)
    };
    world.map.clear_agent(pos);
    let sid = structure_id_at(world, pos);
    if let Some(inv) = world
        .structures
        .get_mut(sid)
        .and_then(|s| s.inventory.as_mut())
    {
        inv.agent_in(prof);
        inv.agent_out_settled();
    }
    world.agents.try_get_mut(id)?.state = AgentState::IdleInStock { inventory: sid };
    Ok(())
}

/// Put the agent into the lost state, unwinding whatever bookkeeping its
/// current state holds: pending transporter requests are cancelled,
/// carried resources written off through the conservation ledger.
pub(super) fn set_lost(world: &mut World, id: AgentId) -> SimResult<()> {
    let state = world.agents.try_get(id)?.state.clone();
    match state {
        AgentState::Walking { dir1, dest, .. } => {
            if dir1 >= 0 {
                if dir1 != 6 {
                    cancel_transporter_request(world, dest, Direction::from_u8(dir1 as u8));
                }
            } else if dir1 == -1 {
                worker_call_failed(world, dest);
            }
            world.agents.try_get_mut(id)?.state = AgentState::Lost { mode: 0 };
        }
        AgentState::Transporting { resource, dest, .. }
        | AgentState::Delivering { resource, dest, .. } => {
            if let Some(res) = resource {
                world.cancel_transported_resource(res, dest);
                world.lose_resource(res);
            }
            let a = world.agents.try_get_mut(id)?;
            a.state = if a.profession == Profession::Sailor {
                AgentState::LostSailor
            } else {
                AgentState::Lost { mode: 0 }
            };
        }
        _ => {
            world.agents.try_get_mut(id)?.state = AgentState::Lost { mode: 0 };
        }
    }
    Ok(())
}

/// Withdraw a pending transporter request on both ends of the road
/// leaving `node` in `dir`.
pub(super) fn cancel_transporter_request(world: &mut World, node: NodeId, dir: Direction) {
    let other = world
        .relays
        .get(node)
        .and_then(|n| n.link(dir))
        .map(|l| (l.other_node, l.other_end_dir));
    if let Some(link) = world.relays.get_mut(node).and_then(|n| n.link_mut(dir)) {
        link.agent_requested = false;
    }
    if let Some((other_node, other_dir)) = other {
        if let Some(link) = world
            .relays
            .get_mut(other_node)
            .and_then(|n| n.link_mut(other_dir))
        {
            link.agent_requested = false;
        }
    }
}

/// A worker dispatched to the structure behind `dest` never made it.
pub(super) fn worker_call_failed(world: &mut World, dest: NodeId) {
    let Some(sid) = world.relays.get(dest).and_then(|n| n.structure) else {
        return;
    };
    let Some(s) = world.structures.get_mut(sid) else {
        return;
    };
    if s.agent_requested {
        s.agent_requested = false;
        s.agent_request_fail = true;
    } else if !s.kind.has_inventory() {
        s.stocks[0].requested = s.stocks[0].requested.saturating_sub(1);
    }
}

/// Head for the closest inventory, by road when standing on a connected
/// node of our own, else by going lost.
pub(super) fn find_inventory(world: &mut World, id: AgentId) -> SimResult<()> {
    let (pos, player) = {
        let a = world.agents.try_get(id)?;
        (a.pos, a.player)
    };
    if world.map.has_flag(pos) && world.map.is_owned_by(pos, player) {
        let node = node_at(world, pos);
        let routable = world.relays.get(node).is_some_and(|n| {
            n.connected_count() > 0 || (n.has_inventory && n.accepts_agents)
        });
        if routable {
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
    }
    let a = world.agents.try_get_mut(id)?;
    a.state = AgentState::Lost { mode: 0 };
    a.counter = 0;
    Ok(())
}

/// Drop a carried resource on the node under the agent, unaddressed.  It
/// is written off when every slot is taken.
pub(super) fn drop_at_node(world: &mut World, id: AgentId, res: Resource) -> SimResult<()> {
    let pos = world.agents.try_get(id)?.pos;
    let node = node_at(world, pos);
    let dropped = world
        .relays
        .get_mut(node)
        .is_some_and(|n| n.drop_resource(res, NodeId::INVALID));
    if dropped {
        let player = world.agents.try_get(id)?.player;
        world.player_mut(player)?.resource_produced(res);
    } else {
        world.lose_resource(res);
    }
    Ok(())
}
