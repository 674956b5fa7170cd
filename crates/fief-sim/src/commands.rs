//! Player commands: everything a player can order done to the world.
//!
//! Every command validates first and mutates only once the whole order is
//! known to be legal; a rejected command leaves the world untouched and
//! reports a typed [`CommandError`].  The mutation paths keep the network
//! invariants intact by hand: splitting a road re-distributes its
//! transporters over the halves, merging re-links the far ends, and every
//! demolition walks the agents that referenced the removed piece.

use fief_agent::{AgentState, FreeWalk};
use fief_core::{
    AgentId, Direction, NodeId, PlayerId, Profession, Resource, SimError, SimResult, StructureId,
};
use fief_grid::{MapPos, Object, Space, Terrain};
use fief_relay::{Link, MAX_TRANSPORTERS, RelayNode, road_length_class};
use fief_structure::{Footprint, Inventory, StockMode, Structure, StructureKind};
use thiserror::Error;

use crate::World;
use crate::agents::{cancel_transporter_request, node_at, set_lost};
use crate::player::Notification;
use crate::transport;

/// Why a command was refused.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("cell is not owned by the acting player")]
    NotOwned,
    #[error("cell is not clear")]
    Occupied,
    #[error("terrain does not support this construction")]
    BadTerrain,
    #[error("another node is directly adjacent")]
    AdjacentNode,
    #[error("no node where one is required")]
    MissingNode,
    #[error("road course is blocked or crosses itself")]
    BadRoad,
    #[error("road mixes land and water segments")]
    MixedRoad,
    #[error("not demolishable")]
    NotDemolishable,
    #[error("structure is already burning")]
    Burning,
    #[error("player already has a castle")]
    CastleExists,
    #[error("invalid target")]
    BadTarget,
    #[error("no knights available to send")]
    NoKnights,
    #[error(transparent)]
    Sim(#[from] SimError),
}

pub type CommandResult<T> = Result<T, CommandError>;

// ── Terrain legality ──────────────────────────────────────────────────────────

/// The cells whose terrain class meets in the corner at `pos`: the cell
/// itself and its left, up-left and up neighbors.
fn corner_cells(world: &World, pos: MapPos) -> [MapPos; 4] {
    [
        pos,
        world.map.moved(pos, Direction::Left),
        world.map.moved(pos, Direction::UpLeft),
        world.map.moved(pos, Direction::Up),
    ]
}

fn corner_all(world: &World, pos: MapPos, f: impl Fn(Terrain) -> bool) -> bool {
    corner_cells(world, pos)
        .into_iter()
        .all(|p| f(world.map.terrain(p)))
}

/// A node can stand here: own land, clear ground, not out on the water,
/// and no node on any neighbor cell.
pub fn can_build_flag(world: &World, pos: MapPos, player: PlayerId) -> CommandResult<()> {
    if !world.map.is_owned_by(pos, player) {
        return Err(CommandError::NotOwned);
    }
    if !world.map.is_open(pos) {
        return Err(CommandError::Occupied);
    }
    if corner_all(world, pos, |t| t.is_water()) {
        return Err(CommandError::BadTerrain);
    }
    for dir in Direction::iter() {
        if world.map.has_flag(world.map.moved(pos, dir)) {
            return Err(CommandError::AdjacentNode);
        }
    }
    Ok(())
}

/// Common gate for any construction: an established player on his own
/// land, on dry, road-free ground.
fn can_player_build(world: &World, pos: MapPos, player: PlayerId) -> CommandResult<()> {
    if !world.player(player)?.has_castle {
        return Err(CommandError::BadTarget);
    }
    for i in 0..7 {
        let p = world.map.pos_add_spirally(pos, i);
        if !world.map.is_owned_by(p, player) {
            return Err(CommandError::NotOwned);
        }
    }
    if corner_all(world, pos, |t| t.is_water()) {
        return Err(CommandError::BadTerrain);
    }
    if world.map.paths(pos) != 0 {
        return Err(CommandError::Occupied);
    }
    Ok(())
}

fn can_build_small(world: &World, pos: MapPos) -> bool {
    corner_all(world, pos, |t| t.is_grass())
}

/// Mines go on mountain edges: at least one mountain corner, the rest
/// mountain or grass.
fn can_build_mine(world: &World, pos: MapPos) -> bool {
    let mut mountain = false;
    for p in corner_cells(world, pos) {
        let t = world.map.terrain(p);
        if t.is_mountain() || t == Terrain::Snow0 {
            mountain = true;
        } else if !t.is_grass() {
            return false;
        }
    }
    mountain
}

fn can_build_large(world: &World, pos: MapPos) -> CommandResult<()> {
    // The surrounding ring must be clear, the shell beyond free of other
    // large footprints.
    for i in 1..7 {
        if !world.map.is_open(world.map.pos_add_spirally(pos, i)) {
            return Err(CommandError::Occupied);
        }
    }
    for i in 7..19 {
        let obj = world.map.object(world.map.pos_add_spirally(pos, i));
        if obj == Object::LargeStructure || obj == Object::Castle {
            return Err(CommandError::Occupied);
        }
    }
    if !corner_all(world, pos, |t| t.is_grass()) {
        return Err(CommandError::BadTerrain);
    }
    if leveling_height(world, pos).is_none() {
        return Err(CommandError::BadTerrain);
    }
    Ok(())
}

/// Height the ground around a large site is leveled to, or `None` when
/// the terrain is too steep to level at all.
fn leveling_height(world: &World, pos: MapPos) -> Option<u8> {
    let mut h_min = i32::MAX;
    let mut h_max = 0;
    for i in 7..19 {
        let h = i32::from(world.map.height(world.map.pos_add_spirally(pos, i)));
        h_min = h_min.min(h);
        h_max = h_max.max(h);
    }
    // Neighboring sites still leveling pull the band toward their target.
    for i in 19..37 {
        let p = world.map.pos_add_spirally(pos, i);
        if world.map.object(p) == Object::LargeStructure {
            let sid = StructureId(world.map.object_index(p));
            let leveling = world
                .structures
                .get(sid)
                .is_some_and(|s| s.constructing && s.progress == 0);
            if leveling {
                let h = i32::from(world.map.height(p));
                h_min = h_min.min(h);
                h_max = h_max.max(h);
            }
        }
    }
    if h_max - h_min >= 9 {
        return None;
    }

    let mut h_mean = i32::from(world.map.height(pos));
    for i in 0..7 {
        h_mean += i32::from(world.map.height(world.map.pos_add_spirally(pos, i)));
    }
    h_mean >>= 3;

    let h = h_mean.clamp((h_max - 4).max(1), h_min + 4);
    Some(h as u8)
}

/// Military structures keep their distance from each other.
fn military_clearance(world: &World, pos: MapPos) -> bool {
    for i in 0..19 {
        let p = world.map.pos_add_spirally(pos, i);
        if world.map.has_structure(p) {
            let sid = StructureId(world.map.object_index(p));
            let military = world
                .structures
                .get(sid)
                .is_some_and(|s| s.kind.is_military() || s.kind == StructureKind::Castle);
            if military {
                return false;
            }
        }
    }
    true
}

pub fn can_build_structure(
    world: &World,
    pos: MapPos,
    kind: StructureKind,
    player: PlayerId,
) -> CommandResult<()> {
    can_player_build(world, pos, player)?;
    if !world.map.is_open(pos) {
        return Err(CommandError::Occupied);
    }
    let door = world.map.moved(pos, Direction::DownRight);
    if !world.map.has_flag(door) {
        can_build_flag(world, door, player)?;
    }

    if kind.is_mine() {
        if !can_build_mine(world, pos) {
            return Err(CommandError::BadTerrain);
        }
    } else if kind.construction_info().footprint == Footprint::Small {
        if !can_build_small(world, pos) {
            return Err(CommandError::BadTerrain);
        }
    } else {
        can_build_large(world, pos)?;
    }

    if kind.is_military() && !military_clearance(world, pos) {
        return Err(CommandError::Occupied);
    }
    Ok(())
}

pub fn can_build_castle(world: &World, pos: MapPos, player: PlayerId) -> CommandResult<()> {
    if world.player(player)?.has_castle {
        return Err(CommandError::CastleExists);
    }
    for i in 0..7 {
        if world.map.owner(world.map.pos_add_spirally(pos, i)).is_some() {
            return Err(CommandError::Occupied);
        }
    }
    if !world.map.is_open(pos) || world.map.paths(pos) != 0 {
        return Err(CommandError::Occupied);
    }
    let door = world.map.moved(pos, Direction::DownRight);
    if !world.map.is_open(door) || world.map.paths(door) != 0 {
        return Err(CommandError::Occupied);
    }
    can_build_large(world, pos)
}

// ── Nodes ─────────────────────────────────────────────────────────────────────

/// Stake a relay node on `pos`.  A node dropped onto an existing road
/// splits it in two, redistributing its transporters.
pub fn build_flag(world: &mut World, pos: MapPos, player: PlayerId) -> CommandResult<NodeId> {
    can_build_flag(world, pos, player)?;

    let node = world.relays.add(RelayNode::new(pos, player));
    world.map.set_object(pos, Object::Flag, node.0);
    if world.map.paths(pos) != 0 {
        split_road_at(world, pos)?;
    }
    Ok(node)
}

/// What a walk along a road found: its length, the transporters serving
/// it in walk order, and the node at the far end.
struct PathInfo {
    length: usize,
    agents: Vec<AgentId>,
    node: NodeId,
    node_dir: Direction,
}

/// Wake an off-grid transporter parked at `pos`.  `at_flag` picks which
/// wake state it resumes in.
fn wake_transporter(world: &mut World, pos: MapPos, at_flag: bool) -> Option<AgentId> {
    let id = world.map.agent_at(pos)?;
    let a = world.agents.get_mut(id)?;
    let payload = match a.state {
        AgentState::IdleOnPath(p)
        | AgentState::WaitIdleOnPath(p)
        | AgentState::WakeAtFlag(p)
        | AgentState::WakeOnPath(p) => p,
        _ => return None,
    };
    a.state = if at_flag {
        AgentState::WakeAtFlag(payload)
    } else {
        AgentState::WakeOnPath(payload)
    };
    Some(id)
}

/// The road-walking direction register, normalized to 0..=5, if the
/// agent is in a road state.
fn road_walking_dir(world: &World, id: AgentId) -> Option<i32> {
    match world.agents.get(id)?.state {
        AgentState::Walking { dir, .. }
        | AgentState::Transporting { dir, .. }
        | AgentState::Delivering { dir, .. } => Some(if dir < 0 { dir + 6 } else { dir }),
        _ => None,
    }
}

/// Walk the road leaving `pos` in `dir` up to the node at its far end,
/// waking parked transporters along the way and collecting the ones that
/// serve this road.
fn trace_road(world: &mut World, pos: MapPos, dir: Direction) -> PathInfo {
    let mut agents = Vec::new();

    if world.map.is_idle_agent(pos) {
        wake_transporter(world, pos, true);
    }
    // A transporter standing on the start node counts for the half it is
    // currently walking into.
    if let Some(id) = world.map.agent_at(pos) {
        let serving = matches!(
            world.agents.get(id).map(|a| &a.state),
            Some(AgentState::Transporting { wait_counter, .. }) if *wait_counter != -1
        ) && road_walking_dir(world, id) == Some(dir.index() as i32);
        if serving {
            if let Some(a) = world.agents.get_mut(id) {
                if let AgentState::Transporting { wait_counter, .. } = &mut a.state {
                    *wait_counter = 0;
                }
            }
            agents.push(id);
        }
    }

    let mut pos = pos;
    let mut dir = dir;
    let mut length = 0;
    loop {
        length += 1;
        pos = world.map.moved(pos, dir);
        let paths = world.map.paths(pos) & !dir.reverse().bit();
        if world.map.has_flag(pos) {
            break;
        }
        let Some(next_dir) = Direction::iter().find(|d| paths & d.bit() != 0) else {
            break;
        };
        dir = next_dir;

        if world.map.is_idle_agent(pos) {
            if let Some(id) = wake_transporter(world, pos, false) {
                agents.push(id);
            }
        } else if let Some(id) = world.map.agent_at(pos) {
            let serving = matches!(
                world.agents.get(id).map(|a| &a.state),
                Some(AgentState::Transporting { wait_counter, .. }) if *wait_counter != -1
            );
            if serving {
                if let Some(a) = world.agents.get_mut(id) {
                    if let AgentState::Transporting { wait_counter, .. } = &mut a.state {
                        *wait_counter = 0;
                    }
                }
                agents.push(id);
            }
        }
    }

    // A transporter on the far node that walked out of this road belongs
    // to it as well.
    if let Some(id) = world.map.agent_at(pos) {
        let serving = matches!(
            world.agents.get(id).map(|a| &a.state),
            Some(
                AgentState::Transporting { wait_counter, .. }
                    | AgentState::Delivering { wait_counter, .. }
            ) if *wait_counter != -1
        ) && road_walking_dir(world, id) == Some(dir.reverse().index() as i32);
        if serving {
            if let Some(a) = world.agents.get_mut(id) {
                match &mut a.state {
                    AgentState::Transporting { wait_counter, .. }
                    | AgentState::Delivering { wait_counter, .. } => *wait_counter = 0,
                    _ => {}
                }
            }
            agents.push(id);
        }
    }

    PathInfo { length, agents, node: node_at(world, pos), node_dir: dir.reverse() }
}

/// Too many transporters for a shortened road: the surplus ones drop what
/// they carry and stand down.
fn release_road_agent(world: &mut World, id: AgentId) -> SimResult<()> {
    let state = world.agents.try_get(id)?.state.clone();
    match state {
        AgentState::WakeOnPath(p) => {
            world.agents.try_get_mut(id)?.state = AgentState::WakeAtFlag(p);
        }
        AgentState::Transporting { resource, dest, dir, .. } => {
            if let Some(res) = resource {
                world.cancel_transported_resource(res, dest);
                world.lose_resource(res);
            }
            world.agents.try_get_mut(id)?.state = AgentState::Transporting {
                resource: None,
                dest: NodeId::INVALID,
                dir,
                wait_counter: -1,
            };
        }
        AgentState::Delivering { resource, dest, dir, .. } => {
            if let Some(res) = resource {
                world.cancel_transported_resource(res, dest);
                world.lose_resource(res);
            }
            world.agents.try_get_mut(id)?.state = AgentState::Delivering {
                resource: None,
                dest: NodeId::INVALID,
                dir,
                wait_counter: -1,
            };
        }
        _ => {}
    }
    Ok(())
}

/// Attach one half of a split road to the node `node` in `dir`, re-linking
/// the far end in place and assigning the walked-up transporters.
fn restore_half(world: &mut World, node: NodeId, dir: Direction, info: &PathInfo) -> SimResult<()> {
    let (water, other_requested) = {
        let other = world.relays.try_get(info.node)?;
        let link = other.link(info.node_dir);
        (
            link.is_some_and(|l| l.water),
            link.is_some_and(|l| l.agent_requested),
        )
    };
    let class = road_length_class(info.length);

    // The far link is mutated in place so its pickup schedule survives.
    {
        let other = world.relays.try_get_mut(info.node)?;
        if let Some(link) = other.link_mut(info.node_dir) {
            link.other_node = node;
            link.other_end_dir = dir;
            link.length_class = class;
            link.has_transporter = false;
            link.transporter_count = 0;
        }
    }

    let mut max = usize::from(MAX_TRANSPORTERS[class as usize]);
    if other_requested {
        // One slot is spoken for by the transporter already called up.
        max = max.saturating_sub(1);
    }
    if info.agents.len() > max {
        for &id in &info.agents[..info.agents.len() - max] {
            release_road_agent(world, id)?;
        }
    }
    let serving = info.agents.len().min(max) as u8;

    let mut link = Link::new(info.node, info.node_dir, water);
    link.length_class = class;
    link.agent_requested = other_requested;
    link.transporter_count = serving;
    link.has_transporter = serving > 0;
    world.relays.try_get_mut(node)?.links[dir.index()] = Some(link);

    if serving > 0 {
        let other = world.relays.try_get_mut(info.node)?;
        if let Some(link) = other.link_mut(info.node_dir) {
            link.transporter_count = serving;
            link.has_transporter = true;
        }
    }
    Ok(())
}

/// Which half of a split road a dispatched agent was heading for: 0 for
/// the first, 1 for the second, `None` if it is not bound to either.
fn road_half_of(world: &World, id: AgentId, a: &PathInfo, b: &PathInfo) -> Option<usize> {
    let check = |dest: NodeId, dir: i32| {
        if dest == a.node && dir == a.node_dir.index() as i32 {
            Some(0)
        } else if dest == b.node && dir == b.node_dir.index() as i32 {
            Some(1)
        } else {
            None
        }
    };
    match &world.agents.get(id)?.state {
        AgentState::Walking { dir1, dest, .. } => check(*dest, *dir1),
        AgentState::ReadyToLeaveInventory { mode, dest, .. } => check(*dest, *mode),
        AgentState::ReadyToLeave { next } | AgentState::LeavingBuilding { next } => {
            if let AgentState::Walking { dir1, dest, .. } = next.as_ref() {
                check(*dest, *dir1)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// A node was dropped onto a road: split it into two roads around `pos`.
fn split_road_at(world: &mut World, pos: MapPos) -> SimResult<()> {
    let mut it = Direction::iter().filter(|d| world.map.has_path(pos, *d));
    let Some(dir_1) = it.next() else { return Ok(()) };
    let Some(mut dir_2) = it.next() else { return Ok(()) };
    drop(it);
    // An up-left path next to an up path is a structure connection, not
    // the road.
    if dir_2 == Direction::UpLeft && world.map.has_path(pos, Direction::Up) {
        dir_2 = Direction::Up;
    }

    let info_1 = trace_road(world, pos, dir_1);
    let info_2 = trace_road(world, pos, dir_2);
    let node = node_at(world, pos);

    // If a transporter was called up for the whole road it keeps serving
    // the half it was sent to; the other half's request is withdrawn.
    let requested = world.relays.try_get(info_2.node)?.agent_requested(info_2.node_dir);
    if requested {
        let mut select = None;
        for id in world.agents.ids().collect::<Vec<_>>() {
            if let Some(half) = road_half_of(world, id, &info_1, &info_2) {
                select = Some(half);
                break;
            }
        }
        let cancel = if select == Some(0) { &info_2 } else { &info_1 };
        let other = world.relays.try_get_mut(cancel.node)?;
        if let Some(link) = other.link_mut(cancel.node_dir) {
            link.agent_requested = false;
        }
    }

    restore_half(world, node, dir_1, &info_1)?;
    restore_half(world, node, dir_2, &info_2)?;
    Ok(())
}

/// Whether `pos` holds a node the player may remove: his own, not the
/// door of a structure, and not a junction the network cannot spare.
pub fn can_demolish_flag(world: &World, pos: MapPos, player: PlayerId) -> CommandResult<()> {
    if !world.map.has_flag(pos) {
        return Err(CommandError::MissingNode);
    }
    if world.map.has_path(pos, Direction::UpLeft)
        && world.map.has_structure(world.map.moved(pos, Direction::UpLeft))
    {
        return Err(CommandError::NotDemolishable);
    }
    let node = world.relays.try_get(node_at(world, pos))?;
    if node.owner != player {
        return Err(CommandError::NotOwned);
    }
    if world.map.paths(pos) != 0 && !node.can_demolish() {
        return Err(CommandError::NotDemolishable);
    }
    Ok(())
}

/// Remove a node, merging its two roads back into one.
pub fn demolish_flag(world: &mut World, pos: MapPos, player: PlayerId) -> CommandResult<()> {
    can_demolish_flag(world, pos, player)?;
    demolish_flag_at(world, pos)?;
    Ok(())
}

fn demolish_flag_at(world: &mut World, pos: MapPos) -> SimResult<()> {
    let node = node_at(world, pos);

    // An agent standing on the node loses its footing.
    if let Some(id) = world.map.agent_at(pos) {
        let roadless = world.map.paths(pos) == 0;
        if let Some(a) = world.agents.get_mut(id) {
            match &mut a.state {
                AgentState::ReadyToLeave { next } | AgentState::LeavingBuilding { next } => {
                    **next = AgentState::Lost { mode: 0 };
                }
                AgentState::FinishedBuilding | AgentState::Walking { .. } if roadless => {
                    a.state = AgentState::Lost { mode: 0 };
                }
                _ => {}
            }
        }
    }

    merge_roads_at(world, pos)?;

    // Agents bound for this node re-route at the next node they reach.
    for id in world.agents.ids().collect::<Vec<_>>() {
        if let Some(a) = world.agents.get_mut(id) {
            retarget_from_removed_node(&mut a.state, node);
        }
    }

    world.map.clear_object(pos);
    if let Some(n) = world.relays.get_mut(node) {
        for (res, dest) in n.remove_all_resources() {
            world.cancel_transported_resource(res, dest);
            world.lose_resource(res);
        }
    }
    world.relays.remove(node);
    Ok(())
}

/// Walking/dispatch states bound for a node that no longer exists fall
/// back to find-an-inventory mode.
fn retarget_from_removed_node(state: &mut AgentState, node: NodeId) {
    match state {
        AgentState::Walking { dir1, dest, .. } if *dest == node => {
            *dir1 = -2;
            *dest = NodeId::INVALID;
        }
        AgentState::ReadyToLeaveInventory { mode, dest, .. } if *dest == node => {
            *mode = -2;
            *dest = NodeId::INVALID;
        }
        AgentState::ReadyToLeave { next } | AgentState::LeavingBuilding { next } => {
            if let AgentState::Walking { dir1, dest, .. } = next.as_mut() {
                if *dest == node {
                    *dir1 = -2;
                    *dest = NodeId::INVALID;
                }
            }
        }
        _ => {}
    }
}

/// Join the two roads meeting at `pos` into one, pooling their
/// transporters.  `pos` must still hold its node object.
fn merge_roads_at(world: &mut World, pos: MapPos) -> SimResult<()> {
    if world.map.paths(pos) == 0 {
        return Ok(());
    }
    let Some(dir_1) = Direction::iter().find(|d| world.map.has_path(pos, *d)) else {
        return Ok(());
    };
    let Some(dir_2) = Direction::iter_rev().find(|d| world.map.has_path(pos, *d)) else {
        return Ok(());
    };
    if dir_1 == dir_2 {
        // A dangling stub; tear it out entirely.
        return remove_road_from_node(world, pos, dir_1);
    }

    let info_1 = trace_road(world, pos, dir_1);
    let info_2 = trace_road(world, pos, dir_2);

    let class = road_length_class(info_1.length + info_2.length);
    let pooled = info_1.agents.len() + info_2.agents.len();
    let serving = pooled.min(usize::from(MAX_TRANSPORTERS[class as usize])) as u8;

    for (this, other) in [(&info_1, &info_2), (&info_2, &info_1)] {
        let n = world.relays.try_get_mut(this.node)?;
        if let Some(link) = n.link_mut(this.node_dir) {
            link.other_node = other.node;
            link.other_end_dir = other.node_dir;
            link.length_class = class;
            link.transporter_count = serving;
            link.has_transporter = serving > 0;
        }
    }

    // Agents dispatched to either end of the removed node re-route.
    for id in world.agents.ids().collect::<Vec<_>>() {
        if let Some(a) = world.agents.get_mut(id) {
            retarget_from_merged_road(&mut a.state, &info_1, &info_2);
        }
    }
    Ok(())
}

fn retarget_from_merged_road(state: &mut AgentState, a: &PathInfo, b: &PathInfo) {
    let bound = |dest: NodeId, dir: i32| {
        (dest == a.node && dir == a.node_dir.index() as i32)
            || (dest == b.node && dir == b.node_dir.index() as i32)
    };
    match state {
        AgentState::Walking { dir1, dest, .. } if bound(*dest, *dir1) => {
            *dir1 = -2;
            *dest = NodeId::INVALID;
        }
        AgentState::ReadyToLeaveInventory { mode, dest, .. } if bound(*dest, *mode) => {
            *mode = -2;
            *dest = NodeId::INVALID;
        }
        AgentState::ReadyToLeave { next } | AgentState::LeavingBuilding { next } => {
            if let AgentState::Walking { dir1, dest, .. } = next.as_mut() {
                if bound(*dest, *dir1) {
                    *dir1 = -2;
                    *dest = NodeId::INVALID;
                }
            }
        }
        _ => {}
    }
}

// ── Roads ─────────────────────────────────────────────────────────────────────

/// Both endpoint cells of a segment in water make it a water segment.
fn segment_in_water(world: &World, a: MapPos, b: MapPos) -> bool {
    world.map.is_water(a) && world.map.is_water(b)
}

/// Check a road course without building it.  Returns the destination cell
/// and whether the road runs on water.
pub fn can_build_road(
    world: &World,
    source: MapPos,
    dirs: &[Direction],
    player: PlayerId,
) -> CommandResult<(MapPos, bool)> {
    if dirs.is_empty() {
        return Err(CommandError::BadRoad);
    }
    if !world.map.is_owned_by(source, player) {
        return Err(CommandError::NotOwned);
    }
    if !world.map.has_flag(source) {
        return Err(CommandError::MissingNode);
    }
    if world.map.has_path(source, dirs[0]) {
        return Err(CommandError::BadRoad);
    }

    let mut pos = source;
    let mut visited = vec![source];
    let mut land = false;
    let mut water = false;
    for (i, &dir) in dirs.iter().enumerate() {
        let next = world.map.moved(pos, dir);
        let last = i + 1 == dirs.len();

        if !world.map.is_owned_by(next, player) {
            return Err(CommandError::NotOwned);
        }
        if visited.contains(&next) {
            return Err(CommandError::BadRoad);
        }
        if world.map.has_flag(next) {
            // A node terminates the road; it may only be the destination.
            if !last {
                return Err(CommandError::BadRoad);
            }
        } else {
            // Water cells stay traversable here so the course can be
            // classified; mixing is rejected below.
            let clear = matches!(world.map.space(next), Space::Open | Space::Semipassable)
                && world.map.blocking_agent(next).is_none();
            if world.map.paths(next) != 0 || !clear {
                return Err(CommandError::BadRoad);
            }
        }

        if segment_in_water(world, pos, next) {
            water = true;
        } else {
            land = true;
        }
        pos = next;
        visited.push(next);
    }
    if land && water {
        return Err(CommandError::MixedRoad);
    }
    Ok((pos, water))
}

/// Lay a road from the node at `source` along `dirs`.  The destination
/// cell must already hold a node.
pub fn build_road(
    world: &mut World,
    source: MapPos,
    dirs: &[Direction],
    player: PlayerId,
) -> CommandResult<()> {
    let (dest, water) = can_build_road(world, source, dirs, player)?;
    if !world.map.has_flag(dest) {
        return Err(CommandError::MissingNode);
    }
    let src_node = node_at(world, source);
    let dest_node = node_at(world, dest);
    let out_dir = dirs[0];
    let in_dir = dirs[dirs.len() - 1].reverse();
    if world.relays.try_get(dest_node)?.has_path(in_dir) {
        return Err(CommandError::BadRoad);
    }

    let mut pos = source;
    for &dir in dirs {
        world.map.add_path(pos, dir);
        let next = world.map.moved(pos, dir);
        world.map.add_path(next, dir.reverse());
        pos = next;
    }

    let class = road_length_class(dirs.len());
    let mut link = Link::new(dest_node, in_dir, water);
    link.length_class = class;
    world.relays.try_get_mut(src_node)?.links[out_dir.index()] = Some(link);
    let mut link = Link::new(src_node, out_dir, water);
    link.length_class = class;
    world.relays.try_get_mut(dest_node)?.links[in_dir.index()] = Some(link);
    Ok(())
}

/// Withdraw the transporter request on the road leaving `node` in `dir`
/// and strand the agents dispatched for it, then drop the link.
fn detach_road_end(world: &mut World, node: NodeId, dir: Direction) -> SimResult<()> {
    let requested = world
        .relays
        .get(node)
        .is_some_and(|n| n.agent_requested(dir));
    if requested {
        cancel_transporter_request(world, node, dir);
        for id in world.agents.ids().collect::<Vec<_>>() {
            if let Some(a) = world.agents.get_mut(id) {
                retarget_from_removed_road(&mut a.state, node, dir);
            }
        }
    }
    world.relays.try_get_mut(node)?.del_path(dir);
    Ok(())
}

/// Agents dispatched to take over the removed road re-route.
fn retarget_from_removed_road(state: &mut AgentState, node: NodeId, dir: Direction) {
    let dir = dir.index() as i32;
    match state {
        AgentState::Walking { dir1, dest, .. } if *dest == node && *dir1 == dir => {
            *dir1 = -2;
            *dest = NodeId::INVALID;
        }
        AgentState::ReadyToLeaveInventory { mode, dest, .. } if *dest == node && *mode == dir => {
            *mode = -2;
            *dest = NodeId::INVALID;
        }
        AgentState::ReadyToLeave { next } | AgentState::LeavingBuilding { next } => {
            if let AgentState::Walking { dir1, dest, .. } = next.as_mut() {
                if *dest == node && *dir1 == dir {
                    *dir1 = -2;
                    *dest = NodeId::INVALID;
                }
            }
        }
        _ => {}
    }
}

/// Clear road segments from the mid-road cell `pos` along `dir` until a
/// node is reached, waking parked transporters and stranding agents left
/// without a road.
fn remove_road_forwards(world: &mut World, pos: MapPos, dir: Direction) -> SimResult<()> {
    let mut pos = pos;
    let mut dir = dir;
    let mut in_dir: Option<Direction> = None;
    loop {
        if world.map.is_idle_agent(pos) {
            wake_transporter(world, pos, true);
        }
        if let Some(id) = world.map.blocking_agent(pos) {
            let stranded = if !world.map.has_flag(pos) {
                true
            } else {
                road_walking_dir(world, id) == Some(dir.reverse().index() as i32)
            };
            if stranded {
                set_lost(world, id)?;
            }
        }

        if world.map.has_flag(pos) {
            if let Some(ind) = in_dir {
                detach_road_end(world, node_at(world, pos), ind.reverse())?;
            }
            return Ok(());
        }

        in_dir = Some(dir);
        world.map.del_path(pos, dir);
        let next = world.map.moved(pos, dir);
        world.map.del_path(next, dir.reverse());
        pos = next;
        if !world.map.has_flag(pos) {
            let Some(next_dir) = Direction::iter().find(|d| world.map.has_path(pos, *d)) else {
                return Ok(());
            };
            dir = next_dir;
        }
    }
}

/// Tear out the whole road leaving the node cell `pos` in `dir`.
fn remove_road_from_node(world: &mut World, pos: MapPos, dir: Direction) -> SimResult<()> {
    detach_road_end(world, node_at(world, pos), dir)?;
    world.map.del_path(pos, dir);
    let next = world.map.moved(pos, dir);
    world.map.del_path(next, dir.reverse());

    if world.map.has_flag(next) {
        // Single-segment road; the far end is a node too.
        detach_road_end(world, node_at(world, next), dir.reverse())?;
        return Ok(());
    }
    let Some(next_dir) = Direction::iter().find(|d| world.map.has_path(next, *d)) else {
        return Ok(());
    };
    remove_road_forwards(world, next, next_dir)
}

pub fn can_demolish_road(world: &World, pos: MapPos, player: PlayerId) -> CommandResult<()> {
    if !world.map.is_owned_by(pos, player) {
        return Err(CommandError::NotOwned);
    }
    if world.map.paths(pos) == 0 || world.map.has_flag(pos) || world.map.has_structure(pos) {
        return Err(CommandError::NotDemolishable);
    }
    Ok(())
}

/// Remove the road running through the mid-road cell `pos`, both
/// directions out to their end nodes.
pub fn demolish_road(world: &mut World, pos: MapPos, player: PlayerId) -> CommandResult<()> {
    can_demolish_road(world, pos, player)?;
    demolish_road_at(world, pos)?;
    Ok(())
}

fn demolish_road_at(world: &mut World, pos: MapPos) -> SimResult<()> {
    let mut it = Direction::iter().filter(|d| world.map.has_path(pos, *d));
    let Some(dir_1) = it.next() else { return Ok(()) };
    let Some(mut dir_2) = it.next() else { return Ok(()) };
    drop(it);
    if dir_2 == Direction::UpLeft && world.map.has_path(pos, Direction::Up) {
        dir_2 = Direction::Up;
    }
    remove_road_forwards(world, pos, dir_1)?;
    remove_road_forwards(world, pos, dir_2)?;
    Ok(())
}

// ── Structures ────────────────────────────────────────────────────────────────

/// Stake out a construction site, linking it to the node at its door
/// (staking a fresh node there if need be).
pub fn build_structure(
    world: &mut World,
    pos: MapPos,
    kind: StructureKind,
    player: PlayerId,
) -> CommandResult<StructureId> {
    if kind == StructureKind::Castle {
        return Err(CommandError::BadTarget);
    }
    can_build_structure(world, pos, kind, player)?;

    let door = world.map.moved(pos, Direction::DownRight);
    let node = match world.relays.at_pos(door) {
        Some(node) => node,
        None => {
            let node = world.relays.add(RelayNode::new(door, player));
            world.map.set_object(door, Object::Flag, node.0);
            if world.map.paths(door) != 0 {
                split_road_at(world, door)?;
            }
            node
        }
    };

    let sid = world.structures.add(Structure::new(kind, pos, player, node));
    let obj = match kind.construction_info().footprint {
        Footprint::Small => Object::SmallStructure,
        _ => Object::LargeStructure,
    };
    world.map.set_object(pos, obj, sid.0);
    world.map.add_path(pos, Direction::DownRight);
    world.map.add_path(door, Direction::UpLeft);
    world.relays.try_get_mut(node)?.structure = Some(sid);
    Ok(sid)
}

/// Contiguous spiral prefix covering rings 0..=8, the territory a new
/// castle claims.
const CASTLE_CLAIM_CELLS: usize = 217;

/// Starting stores of a fresh castle.
const CASTLE_SUPPLIES: [u32; Resource::COUNT] = [
    3,  // Fish
    2,  // Pig
    2,  // Meat
    10, // Wheat
    3,  // Flour
    1,  // Bread
    0,  // Lumber
    40, // Plank
    2,  // Boat
    20, // Stone
    12, // IronOre
    8,  // Steel
    20, // Coal
    4,  // GoldOre
    2,  // GoldBar
    5,  // Shovel
    20, // Hammer
    3,  // Rod
    1,  // Cleaver
    2,  // Scythe
    3,  // Axe
    4,  // Saw
    6,  // Pick
    2,  // Pincer
    60, // Sword
    60, // Shield
];

///// Found the castle: the player's first inventory and the seed of his
/// territory.
pub fn build_castle(world: &mut World, pos: MapPos, player: PlayerId) -> CommandResult<StructureId> {
    can_build_castle(world, pos, player)?;
    let Some(level) = leveling_height(world, pos) else {
        return Err(CommandError::BadTerrain);
    };
    let door = world.map.moved(pos, Direction::DownRight);

    let node = world.relays.add(RelayNode::new(door, player));
    {
        let n = world.relays.try_get_mut(node)?;
        n.accepts_resources = true;
        n.accepts_agents = true;
        n.has_inventory = true;
    }

    let sid = world
        .structures
        .add(Structure::new(StructureKind::Castle, pos, player, node));
    let mut inventory = Box::new(Inventory::new(player, sid, node));
    for res in Resource::ALL {
        for _ in 0..CASTLE_SUPPLIES[res.index()] {
            inventory.push_resource(res);
        }
    }
    world.gold_total += inventory.count_of(Resource::GoldOre) + inventory.count_of(Resource::GoldBar);
    {
        let s = world.structures.try_get_mut(sid)?;
        s.constructing = false;
        s.inventory = Some(inventory);
    }
    world.relays.try_get_mut(node)?.structure = Some(sid);

    world.map.set_object(pos, Object::Castle, sid.0);
    world.map.set_object(door, Object::Flag, node.0);
    world.map.add_path(pos, Direction::DownRight);
    world.map.add_path(door, Direction::UpLeft);

    world.map.set_height(pos, level);
    for dir in Direction::iter() {
        let p = world.map.moved(pos, dir);
        world.map.set_height(p, level);
    }

    // The castle claims the land around it.
    for i in 0..CASTLE_CLAIM_CELLS {
        let p = world.map.pos_add_spirally(pos, i);
        world.map.set_owner(p, player);
    }

    let p = world.player_mut(player)?;
    p.has_castle = true;
    p.castle_score = 1;
    Ok(sid)
}

/// Every agent and node slot bound for `node` forgets about it; queued
/// inventory resources addressed to it go back into their pools.
fn clear_node_destinations(world: &mut World, node: NodeId) -> SimResult<()> {
    for id in world.agents.ids().collect::<Vec<_>>() {
        if let Some(a) = world.agents.get_mut(id) {
            reset_transport_state(&mut a.state, node);
        }
    }

    let prios: Vec<[u8; Resource::COUNT]> =
        world.players.iter().map(|p| p.flag_prio).collect();
    for nid in world.relays.ids().collect::<Vec<_>>() {
        let Some(n) = world.relays.get_mut(nid) else { continue };
        let owner = n.owner.index();
        let mut dirty = false;
        let mut redo: Vec<Direction> = Vec::new();
        for slot in n.slots.iter_mut() {
            if slot.resource.is_some() && slot.dest == node {
                slot.dest = NodeId::INVALID;
                dirty = true;
                if let Some(d) = slot.pickup_dir {
                    if !redo.contains(&d) {
                        redo.push(d);
                    }
                }
            }
        }
        if dirty {
            n.schedule_dirty = true;
        }
        if let Some(prio) = prios.get(owner) {
            for d in redo {
                n.prioritize_pickup(d, prio);
            }
        }
    }

    for sid in world.structures.ids().collect::<Vec<_>>() {
        if let Some(inv) = world
            .structures
            .get_mut(sid)
            .and_then(|s| s.inventory.as_mut())
        {
            inv.reset_queue_for_dest(node);
        }
    }
    Ok(())
}

/// Forget `node` in every carrying or dispatched state that references it.
fn reset_transport_state(state: &mut AgentState, node: NodeId) {
    match state {
        AgentState::Walking { dir1, dest, .. } if *dest == node && *dir1 < 0 => {
            *dir1 = -2;
            *dest = NodeId::INVALID;
        }
        AgentState::ReadyToLeaveInventory { mode, dest, .. } if *dest == node && *mode < 0 => {
            *mode = -2;
            *dest = NodeId::INVALID;
        }
        AgentState::ReadyToLeave { next } | AgentState::LeavingBuilding { next } => {
            match next.as_mut() {
                AgentState::Walking { dir1, dest, .. } if *dest == node && *dir1 < 0 => {
                    *dir1 = -2;
                    *dest = NodeId::INVALID;
                }
                AgentState::DropResourceOut { dest, .. } if *dest == node => {
                    *dest = NodeId::INVALID;
                }
                _ => {}
            }
        }
        AgentState::Transporting { dest, .. } if *dest == node => {
            *dest = NodeId::INVALID;
        }
        AgentState::MoveResourceOut { dest, .. } | AgentState::DropResourceOut { dest, .. }
            if *dest == node =>
        {
            *dest = NodeId::INVALID;
        }
        _ => {}
    }
}

/// Throw the holder (or one garrison knight) out of a burning structure.
/// With `inventory_crew` only inventory transporters at the structure cell
/// are affected, demoted back to plain transporters on the way out.
fn evict_holder(
    world: &mut World,
    id: AgentId,
    pos: MapPos,
    inventory_crew: bool,
) -> SimResult<()> {
    let Some(a) = world.agents.get(id) else { return Ok(()) };
    if a.pos != pos {
        return Ok(());
    }
    if inventory_crew {
        if a.profession != Profession::TransporterInventory {
            return Ok(());
        }
        world.agents.try_get_mut(id)?.profession = Profession::Transporter;
    }
    // Whoever the grid says is standing outside walks off lost; everyone
    // else escapes through the door.
    let state = if world.map.agent_at(pos) == Some(id) {
        AgentState::Lost { mode: 0 }
    } else {
        AgentState::EscapeBuilding
    };
    let a = world.agents.try_get_mut(id)?;
    a.state = state;
    a.counter = 0;
    Ok(())
}

pub fn demolish_structure(world: &mut World, pos: MapPos, player: PlayerId) -> CommandResult<()> {
    if !world.map.has_structure(pos) {
        return Err(CommandError::BadTarget);
    }
    let sid = StructureId(world.map.object_index(pos));
    let s = world.structures.try_get(sid)?;
    if s.owner != player {
        return Err(CommandError::NotOwned);
    }
    if s.burning {
        return Err(CommandError::Burning);
    }
    demolish_structure_at(world, sid)?;
    Ok(())
}

/// Burn a structure down: evict its crew, write off its stock and cut it
/// from the network.  The remains smolder until the scheduler clears them.
pub(crate) fn demolish_structure_at(world: &mut World, sid: StructureId) -> SimResult<()> {
    let (pos, kind, owner, node, was_done, was_active, had_holder, main_agent) = {
        let s = world.structures.try_get(sid)?;
        (
            s.pos,
            s.kind,
            s.owner,
            s.node,
            s.is_done(),
            s.active,
            s.holder,
            s.main_agent,
        )
    };
    let door = world.map.moved(pos, Direction::DownRight);

    for (res, count) in world.structures.try_get_mut(sid)?.burn() {
        for _ in 0..count {
            world.lose_resource(res);
        }
    }

    world.map.del_path(pos, Direction::DownRight);
    world.map.del_path(door, Direction::UpLeft);
    {
        let n = world.relays.try_get_mut(node)?;
        n.structure = None;
        n.accepts_resources = false;
        n.accepts_agents = false;
        n.has_inventory = false;
    }
    clear_node_destinations(world, node)?;

    if was_done && kind.has_inventory() && was_active {
        // Settle the door queue, then write off the stores.
        let (queued, stored) = {
            let s = world.structures.try_get_mut(sid)?;
            match s.inventory.as_mut() {
                Some(inv) => (inv.drop_queue(), inv.drain()),
                None => (Vec::new(), Vec::new()),
            }
        };
        for slot in queued {
            world.cancel_transported_resource(slot.resource, slot.dest);
            world.lose_resource(slot.resource);
        }
        for (res, count) in stored {
            for _ in 0..count {
                world.lose_resource(res);
            }
        }
        world.structures.try_get_mut(sid)?.inventory = None;

        // A few agents squeeze out of the burning stock; the rest perish.
        let mut escaped = 0;
        for id in world.agents.ids().collect::<Vec<_>>() {
            let Some(a) = world.agents.get(id) else { continue };
            if a.pos != pos {
                continue;
            }
            let inside = matches!(
                a.state,
                AgentState::IdleInStock { .. } | AgentState::ReadyToLeaveInventory { .. }
            );
            if !inside {
                continue;
            }
            if escaped < 12 {
                let a = world.agents.try_get_mut(id)?;
                a.state = AgentState::EscapeBuilding;
                a.counter = 0;
                escaped += 1;
            } else {
                world.agents.remove(id);
            }
        }
    }

    if had_holder {
        if was_done && kind == StructureKind::Castle {
            // The castle's inventory transporters flee first.
            for id in world.agents.ids().collect::<Vec<_>>() {
                evict_holder(world, id, pos, true)?;
            }
        }
        if was_done && (kind.is_military() || kind == StructureKind::Castle) {
            let mut knight = main_agent;
            while knight.is_valid() {
                let next = world
                    .agents
                    .try_get(knight)?
                    .state
                    .next_knight()
                    .unwrap_or(AgentId::INVALID);
                evict_holder(world, knight, pos, false)?;
                knight = next;
            }
        } else if main_agent.is_valid() {
            if world.agents.try_get(main_agent)?.profession == Profession::TransporterInventory {
                world.agents.try_get_mut(main_agent)?.profession = Profession::Transporter;
            }
            evict_holder(world, main_agent, pos, false)?;
        }
        world.structures.try_get_mut(sid)?.main_agent = AgentId::INVALID;
    }

    if kind == StructureKind::Castle && was_done {
        let p = world.player_mut(owner)?;
        p.has_castle = false;
        p.castle_score = -1;
        p.castle_knights = 0;
    }

    // An orphaned door node goes with the structure.
    if world.map.paths(door) == 0 && world.map.has_flag(door) {
        demolish_flag_at(world, door)?;
    }
    Ok(())
}

// ── Capture ───────────────────────────────────────────────────────────────────

/// A node or road on a freshly captured cell is torn down.
fn demolish_flag_and_roads(world: &mut World, pos: MapPos) -> SimResult<()> {
    if world.map.has_flag(pos) {
        for dir in Direction::iter() {
            if world.map.has_path(pos, dir) {
                remove_road_from_node(world, pos, dir)?;
            }
        }
        demolish_flag_at(world, pos)?;
    } else if world.map.paths(pos) != 0 {
        demolish_road_at(world, pos)?;
    }
    Ok(())
}

/// The garrison is gone and an enemy knight stands at the door: the
/// structure changes hands.  Castles burn instead of changing owner.
pub(crate) fn capture_structure(
    world: &mut World,
    sid: StructureId,
    by: PlayerId,
) -> SimResult<()> {
    let (pos, kind, old_owner, node) = {
        let s = world.structures.try_get(sid)?;
        (s.pos, s.kind, s.owner, s.node)
    };

    world.player_mut(old_owner)?.notify(Notification::StructureLost { pos });
    world.player_mut(by)?.notify(Notification::StructureCaptured { pos });

    if kind == StructureKind::Castle {
        return demolish_structure_at(world, sid);
    }

    clear_node_destinations(world, node)?;

    // Enemy buildings in the immediate shell fall with the garrison.
    for i in 7..19 {
        let p = world.map.pos_add_spirally(pos, i);
        if world.map.has_structure(p) {
            demolish_structure_at(world, StructureId(world.map.object_index(p)))?;
        }
    }

    let door = world.map.moved(pos, Direction::DownRight);
    world.map.set_owner(pos, by);
    for dir in Direction::iter() {
        let p = world.map.moved(pos, dir);
        world.map.set_owner(p, by);
        if p != door {
            demolish_flag_and_roads(world, p)?;
        }
    }
    world.relays.try_get_mut(node)?.owner = by;

    // Stolen buffered resources lose their bookings.
    let stolen: Vec<(Resource, NodeId)> = {
        let n = world.relays.try_get_mut(node)?;
        let mut out = Vec::new();
        for slot in n.slots.iter_mut() {
            if let Some(res) = slot.resource {
                if slot.dest.is_valid() {
                    out.push((res, slot.dest));
                    slot.dest = NodeId::INVALID;
                }
            }
        }
        n.schedule_dirty = true;
        out
    };
    for (res, dest) in stolen {
        world.cancel_transported_resource(res, dest);
    }

    // The captured door node keeps no roads into enemy land.
    for dir in Direction::iter() {
        if world.relays.try_get(node)?.has_path(dir) {
            remove_road_from_node(world, door, dir)?;
        }
    }

    world.structures.try_get_mut(sid)?.owner = by;
    Ok(())
}

// ── Stock control ─────────────────────────────────────────────────────────────

/// Pickup priority of `res` at this player's nodes; higher wins.
pub fn set_transport_priority(
    world: &mut World,
    player: PlayerId,
    res: Resource,
    priority: u8,
) -> CommandResult<()> {
    world.player_mut(player)?.flag_prio[res.index()] = priority;
    Ok(())
}

/// Dispatched agents bound into `node` give up when it stops accepting.
fn clear_agent_destinations(world: &mut World, node: NodeId) {
    for id in world.agents.ids().collect::<Vec<_>>() {
        if let Some(a) = world.agents.get_mut(id) {
            retarget_from_removed_node(&mut a.state, node);
        }
    }
}

/// Carried resources bound into `node` become unaddressed when it stops
/// accepting.
fn clear_resource_destinations(world: &mut World, node: NodeId) {
    for id in world.agents.ids().collect::<Vec<_>>() {
        let Some(a) = world.agents.get_mut(id) else { continue };
        match &mut a.state {
            AgentState::Transporting { dest, .. } if *dest == node => {
                *dest = NodeId::INVALID;
            }
            AgentState::MoveResourceOut { dest, .. } | AgentState::DropResourceOut { dest, .. }
                if *dest == node =>
            {
                *dest = NodeId::INVALID;
            }
            AgentState::LeavingBuilding { next } => {
                if let AgentState::DropResourceOut { dest, .. } = next.as_mut() {
                    if *dest == node {
                        *dest = NodeId::INVALID;
                    }
                }
            }
            _ => {}
        }
    }
}

pub fn set_inventory_resource_mode(
    world: &mut World,
    inventory: StructureId,
    player: PlayerId,
    mode: StockMode,
) -> CommandResult<()> {
    let s = world.structures.try_get(inventory)?;
    if s.owner != player {
        return Err(CommandError::NotOwned);
    }
    let node = s.node;
    let Some(inv) = world
        .structures
        .try_get_mut(inventory)?
        .inventory
        .as_mut()
    else {
        return Err(CommandError::BadTarget);
    };
    inv.resource_mode = mode;

    if mode == StockMode::In {
        world.relays.try_get_mut(node)?.accepts_resources = true;
    } else {
        world.relays.try_get_mut(node)?.accepts_resources = false;
        clear_resource_destinations(world, node);
    }
    Ok(())
}

pub fn set_inventory_agent_mode(
    world: &mut World,
    inventory: StructureId,
    player: PlayerId,
    mode: StockMode,
) -> CommandResult<()> {
    let s = world.structures.try_get(inventory)?;
    if s.owner != player {
        return Err(CommandError::NotOwned);
    }
    let node = s.node;
    let Some(inv) = world
        .structures
        .try_get_mut(inventory)?
        .inventory
        .as_mut()
    else {
        return Err(CommandError::BadTarget);
    };
    inv.agent_mode = mode;

    if mode == StockMode::In {
        world.relays.try_get_mut(node)?.accepts_agents = true;
    } else {
        world.relays.try_get_mut(node)?.accepts_agents = false;
        clear_agent_destinations(world, node);
    }
    Ok(())
}

// ── Agents ────────────────────────────────────────────────────────────────────

/// Create a fresh generic agent inside one of the player's inventories.
pub fn spawn_agent(
    world: &mut World,
    inventory: StructureId,
    player: PlayerId,
) -> CommandResult<AgentId> {
    let s = world.structures.try_get(inventory)?;
    if s.owner != player {
        return Err(CommandError::NotOwned);
    }
    if s.inventory.is_none() {
        return Err(CommandError::BadTarget);
    }
    Ok(world.spawn_agent(inventory)?)
}

/// Send a geologist out to survey around the node `dest`.
pub fn send_geologist(world: &mut World, dest: NodeId, player: PlayerId) -> CommandResult<bool> {
    if world.relays.try_get(dest)?.owner != player {
        return Err(CommandError::NotOwned);
    }
    Ok(transport::send_geologist(world, dest)?)
}

// ── Attack ────────────────────────────────────────────────────────────────────

/// Knights a garrison must keep at home per occupation setting 0..=4.
fn min_garrison(kind: StructureKind, setting: usize) -> i32 {
    let table: [i32; 5] = match kind {
        StructureKind::Hut => [1, 1, 2, 2, 3],
        StructureKind::Tower => [1, 2, 3, 4, 6],
        _ => [1, 3, 6, 9, 12],
    };
    table[setting.min(4)]
}

fn set_next_knight(state: &mut AgentState, next: AgentId) {
    match state {
        AgentState::DefendingHut { next_knight }
        | AgentState::DefendingTower { next_knight }
        | AgentState::DefendingFortress { next_knight }
        | AgentState::DefendingCastle { next_knight } => *next_knight = next,
        _ => {}
    }
}

/// Unlink the strongest garrisoned knight of `sid` from its defender
/// queue and book it out of the stock.
fn extract_strongest_knight(world: &mut World, sid: StructureId) -> SimResult<Option<AgentId>> {
    let mut best: Option<(AgentId, u8)> = None;
    let mut cursor = world.structures.try_get(sid)?.main_agent;
    while cursor.is_valid() {
        let a = world.agents.try_get(cursor)?;
        let rank = a.profession.knight_rank().unwrap_or(0);
        if best.is_none_or(|(_, r)| rank > r) {
            best = Some((cursor, rank));
        }
        cursor = a.state.next_knight().unwrap_or(AgentId::INVALID);
    }
    let Some((knight, _)) = best else { return Ok(None) };

    let after = world
        .agents
        .try_get(knight)?
        .state
        .next_knight()
        .unwrap_or(AgentId::INVALID);
    let head = world.structures.try_get(sid)?.main_agent;
    if head == knight {
        world.structures.try_get_mut(sid)?.main_agent = after;
    } else {
        let mut prev = head;
        loop {
            let next = world
                .agents
                .try_get(prev)?
                .state
                .next_knight()
                .unwrap_or(AgentId::INVALID);
            if next == knight {
                set_next_knight(&mut world.agents.try_get_mut(prev)?.state, after);
                break;
            }
            if !next.is_valid() {
                break;
            }
            prev = next;
        }
    }
    let s = world.structures.try_get_mut(sid)?;
    s.stocks[0].available = s.stocks[0].available.saturating_sub(1);
    Ok(Some(knight))
}

/// Send up to `max_knights` knights from the player's garrisons against
/// an enemy military structure on the frontier.  Returns how many left.
pub fn attack_structure(
    world: &mut World,
    target: StructureId,
    player: PlayerId,
    max_knights: u32,
) -> CommandResult<u32> {
    let (target_pos, target_owner) = {
        let t = world.structures.try_get(target)?;
        let military = t.kind.is_military() || t.kind == StructureKind::Castle;
        if t.owner == player || !t.is_done() || !military || !t.active || t.threat_level != 3 {
            return Err(CommandError::BadTarget);
        }
        (t.pos, t.owner)
    };
    world
        .player_mut(target_owner)?
        .notify(Notification::UnderAttack { pos: target_pos, by: player });

    let geom = *world.map.geometry();
    let mut sent = 0u32;
    'sources: for sid in world.structures.ids().collect::<Vec<_>>() {
        let (source_pos, kind, threat) = {
            let Some(s) = world.structures.get(sid) else { continue };
            if s.owner != player
                || !s.kind.is_military()
                || !s.is_done()
                || !s.active
                || s.burning
            {
                continue;
            }
            (s.pos, s.kind, s.threat_level)
        };
        // A foreign agent at the door means a fight is already brewing.
        let source_door = world.map.moved(source_pos, Direction::DownRight);
        if let Some(id) = world.map.agent_at(source_door) {
            if world.agents.try_get(id)?.player != player {
                continue;
            }
        }

        let setting = usize::from(world.player(player)?.knight_occupation[usize::from(threat)] & 0xf);
        let spare = i32::from(world.structures.try_get(sid)?.knight_count())
            - min_garrison(kind, setting);

        for _ in 0..spare.max(0) {
            if sent >= max_knights {
                break 'sources;
            }
            let Some(knight) = extract_strongest_knight(world, sid)? else { break };

            let knight_pos = world.agents.try_get(knight)?.pos;
            let mut dist_col =
                (geom.pos_col(target_pos).wrapping_sub(geom.pos_col(knight_pos))) & geom.col_mask;
            if dist_col >= geom.cols / 2 {
                dist_col = dist_col.wrapping_sub(geom.cols);
            }
            let mut dist_row =
                (geom.pos_row(target_pos).wrapping_sub(geom.pos_row(knight_pos))) & geom.row_mask;
            if dist_row >= geom.rows / 2 {
                dist_row = dist_row.wrapping_sub(geom.rows);
            }

            let a = world.agents.try_get_mut(knight)?;
            a.state = AgentState::KnightLeaveForWalkToFight {
                next: Box::new(AgentState::KnightFreeWalking(FreeWalk {
                    dist_col: dist_col as i32,
                    dist_row: dist_row as i32,
                    neg_dist1: 0,
                    neg_dist2: 0,
                    flags: 0,
                })),
            };
            a.counter = 0;
            sent += 1;
        }
    }

    if sent == 0 {
        return Err(CommandError::NoKnights);
    }
    Ok(sent)
}
