//! Handlers for cross-country movement: free walking towards a signed
//! column/row offset, edge following around obstacles, free sailing, and
//! the recovery states of agents with no road home.
//!
//! The shared machinery ([`free_walking_common`] and its helpers) is also
//! driven by the stonecutter's approach walk and the knight's march, which
//! carry the same [`FreeWalk`] payload under their own state names.

use fief_agent::{ANIMATION_COUNTER, AgentState, FreeWalk, Waiting, walking_animation};
use fief_core::{AgentId, Direction, SimResult};
use fief_grid::{MapPos, Object, SPIRAL_PATTERN, Space};

use crate::World;

use super::{consume_ticks, find_inventory, node_at, set_lost, start_walking};

/// Direction covering a one-step offset `(dx, dy)`, indexed by
/// `(dx + 1) + 3 * (dy + 1)`.  The two diagonals the hex grid lacks map
/// to `None`.
const DIR_FROM_OFFSET: [Option<Direction>; 9] = [
    Some(Direction::UpLeft), Some(Direction::Up),   None,
    Some(Direction::Left),   None,                  Some(Direction::Right),
    None,                    Some(Direction::Down), Some(Direction::DownRight),
];

/// Local direction preference per general octant.  Rows are the twelve
/// general directions counted counter-clockwise from north-north-east;
/// each row lists all six step directions, best first.
const DIR_FORWARD: [Direction; 72] = {
    use Direction::*;
    [
        Up, UpLeft, Right, Left, DownRight, Down,
        UpLeft, Up, Left, Right, Down, DownRight,
        UpLeft, Left, Up, Down, Right, DownRight,
        Left, UpLeft, Down, Up, DownRight, Right,
        Left, Down, UpLeft, DownRight, Up, Right,
        Down, Left, DownRight, UpLeft, Right, Up,
        Down, DownRight, Left, Right, UpLeft, Up,
        DownRight, Down, Right, Left, Up, UpLeft,
        DownRight, Right, Down, Up, Left, UpLeft,
        Right, DownRight, Up, Down, UpLeft, Left,
        Right, Up, DownRight, UpLeft, Down, Left,
        Up, Right, UpLeft, DownRight, Left, Down,
    ]
};

/// Step preference while tracing an obstacle with the right hand on it,
/// one row per direction of travel.
const DIR_RIGHT_EDGE: [Direction; 36] = {
    use Direction::*;
    [
        Down, DownRight, Right, Up, UpLeft, Left,
        Left, Down, DownRight, Right, Up, UpLeft,
        UpLeft, Left, Down, DownRight, Right, Up,
        Up, UpLeft, Left, Down, DownRight, Right,
        Right, Up, UpLeft, Left, Down, DownRight,
        DownRight, Right, Up, UpLeft, Left, Down,
    ]
};

/// Step preference while tracing with the left hand on the obstacle.
const DIR_LEFT_EDGE: [Direction; 36] = {
    use Direction::*;
    [
        UpLeft, Up, Right, DownRight, Down, Left,
        Up, Right, DownRight, Down, Left, UpLeft,
        Right, DownRight, Down, Left, UpLeft, Up,
        DownRight, Down, Left, UpLeft, Up, Right,
        Down, Left, UpLeft, Up, Right, DownRight,
        Left, UpLeft, Up, Right, DownRight, Down,
    ]
};

/// The cell's object lets walkers through (off-road).
pub(super) fn can_pass(world: &World, pos: MapPos) -> bool {
    matches!(world.map.space(pos), Space::Open | Space::Semipassable)
}

/// Column/row delta of one step in `dir`.
pub(super) fn dir_delta(dir: Direction) -> (i32, i32) {
    let di = dir.index() as i32;
    let sign = if di < 3 { 1 } else { -1 };
    (sign * i32::from(di % 3 < 2), sign * i32::from(di % 3 > 0))
}

/// The free-walk payload of whichever family state the agent is in.
pub(super) fn free_walk(state: &AgentState) -> Option<FreeWalk> {
    match state {
        AgentState::FreeWalking(fw)
        | AgentState::StoneCutterFreeWalking(fw)
        | AgentState::KnightFreeWalking(fw)
        | AgentState::FreeSailing(fw) => Some(*fw),
        _ => None,
    }
}

pub(super) fn free_walk_mut(state: &mut AgentState) -> Option<&mut FreeWalk> {
    match state {
        AgentState::FreeWalking(fw)
        | AgentState::StoneCutterFreeWalking(fw)
        | AgentState::KnightFreeWalking(fw)
        | AgentState::FreeSailing(fw) => Some(fw),
        _ => None,
    }
}

/// A cell the free walker can step onto: water walkers need an empty
/// water surface, land walkers dry passable ground, and nobody may be
/// standing there.
fn step_ok(world: &World, pos: MapPos, water: bool) -> bool {
    let ground = if water {
        world.map.object(pos) == Object::None
    } else {
        !world.map.is_water(pos) && can_pass(world, pos)
    };
    ground && world.map.blocking_agent(pos).is_none()
}

/// Commit to a step in `dir`: book the covered column/row off the
/// distance, walk, and raise the arrival bit when both hit zero.
pub(super) fn switch_on_dir(world: &mut World, id: AgentId, dir: Direction) -> SimResult<()> {
    let (dx, dy) = dir_delta(dir);
    if let Some(fw) = free_walk_mut(&mut world.agents.try_get_mut(id)?.state) {
        fw.dist_col -= dx;
        fw.dist_row -= dy;
    }
    start_walking(world, id, dir, 32, true)?;
    if let Some(fw) = free_walk_mut(&mut world.agents.try_get_mut(id)?.state) {
        if fw.dist_col == 0 && fw.dist_row == 0 {
            fw.flags = 8;
        }
    }
    Ok(())
}

/// Boxed in on all sides: trade places with any neighbor waiting to step
/// into our cell, else stand and wait.
fn switch_with_other(world: &mut World, id: AgentId) -> SimResult<()> {
    let pos = world.agents.try_get(id)?.pos;

    let mut swap: Option<(Direction, AgentId)> = None;
    for d in Direction::ALL {
        let new_pos = world.map.moved(pos, d);
        let Some(other) = world.map.blocking_agent(new_pos) else {
            continue;
        };
        let willing = matches!(
            world.agents.try_get(other)?.waiting_dir(),
            Waiting::Toward(w) if w == d.reverse()
        );
        if willing && world.agents.try_get_mut(other)?.switch_waiting(d.reverse()) {
            swap = Some((d, other));
            break;
        }
    }

    let Some((dir, other)) = swap else {
        let a = world.agents.try_get_mut(id)?;
        a.animation = 82;
        a.counter = ANIMATION_COUNTER[82];
        return Ok(());
    };

    let (dx, dy) = dir_delta(dir);
    let new_pos = world.map.moved(pos, dir);
    let h_diff = i32::from(world.map.height(new_pos)) - i32::from(world.map.height(pos));

    if let Some(fw) = free_walk_mut(&mut world.agents.try_get_mut(id)?.state) {
        fw.dist_col -= dx;
        fw.dist_row -= dy;
        if fw.dist_col == 0 && fw.dist_row == 0 {
            fw.flags = 8;
        }
    }

    world.map.set_agent(pos, other);
    world.map.set_agent(new_pos, id);

    let o = world.agents.try_get_mut(other)?;
    o.animation = walking_animation(-h_diff, dir.reverse(), true);
    o.counter_from_animation();
    o.pos = pos;

    let a = world.agents.try_get_mut(id)?;
    a.animation = walking_animation(h_diff, dir, true);
    a.counter_from_animation();
    a.pos = new_pos;
    Ok(())
}

/// A target cell one step away turned out blocked.  Workers with a
/// memorized way back retreat towards it; everyone else is lost.
fn blocked_near_dest(world: &mut World, id: AgentId, wait_anim: bool) -> SimResult<()> {
    let a = world.agents.try_get_mut(id)?;
    let knight = matches!(a.state, AgentState::KnightFreeWalking(_));
    let Some(fw) = free_walk_mut(&mut a.state) else {
        return Ok(());
    };
    if !knight && fw.neg_dist1 != -128 {
        fw.dist_col += fw.neg_dist1;
        fw.dist_row += fw.neg_dist2;
        fw.neg_dist1 = 0;
        fw.neg_dist2 = 0;
        fw.flags = 0;
        if wait_anim {
            a.animation = 82;
            a.counter = ANIMATION_COUNTER[82];
        }
    } else {
        a.state = AgentState::Lost { mode: 0 };
        a.counter = 0;
    }
    Ok(())
}

/// Trace along the obstacle edge recorded in the flags register.
/// Returns `true` when the step (or the wait) was handled here.
fn follow_edge(world: &mut World, id: AgentId) -> SimResult<bool> {
    let a = world.agents.try_get(id)?;
    let pos = a.pos;
    let water = matches!(a.state, AgentState::FreeSailing(_));
    let knight = matches!(a.state, AgentState::KnightFreeWalking(_));
    let Some(fw) = free_walk(&a.state) else {
        return Ok(true);
    };

    let left_hand = fw.flags & 8 != 0;
    let dir_index = (fw.flags & 7) as usize - 1;
    let row = if left_hand {
        &DIR_LEFT_EDGE[6 * dir_index..6 * dir_index + 6]
    } else {
        &DIR_RIGHT_EDGE[6 * dir_index..6 * dir_index + 6]
    };

    // The destination may be one step away already.
    if !water && fw.dist_col.abs() <= 1 && fw.dist_row.abs() <= 1 {
        let off = ((fw.dist_col + 1) + 3 * (fw.dist_row + 1)) as usize;
        if let Some(d) = DIR_FROM_OFFSET[off] {
            let new_pos = world.map.moved(pos, d);
            if !can_pass(world, new_pos) {
                blocked_near_dest(world, id, true)?;
                return Ok(true);
            }
            if knight
                && fw.neg_dist1 != -128
                && world.map.blocking_agent(new_pos).is_some()
            {
                let a = world.agents.try_get_mut(id)?;
                if let Some(fw) = free_walk_mut(&mut a.state) {
                    fw.flags = 0;
                }
                a.animation = 82;
                a.counter = ANIMATION_COUNTER[82];
                return Ok(true);
            }
        }
    }

    let mut found: Option<(usize, Direction)> = None;
    for (i, &d) in row.iter().enumerate() {
        let new_pos = world.map.moved(pos, d);
        if step_ok(world, new_pos, water) {
            found = Some((i, d));
            break;
        }
    }

    match found {
        Some((i0, dir)) => {
            let upper = ((fw.flags >> 4) & 0xf) + i0 as i32 - 2;
            if i0 < 2 && upper < 0 {
                if let Some(fw) = free_walk_mut(&mut world.agents.try_get_mut(id)?.state) {
                    fw.flags = 0;
                }
                switch_on_dir(world, id, dir)?;
                Ok(true)
            } else if i0 > 2 && upper > 15 {
                // Edge followed far enough; resume direct pursuit.
                if let Some(fw) = free_walk_mut(&mut world.agents.try_get_mut(id)?.state) {
                    fw.flags = 0;
                }
                Ok(false)
            } else {
                if let Some(fw) = free_walk_mut(&mut world.agents.try_get_mut(id)?.state) {
                    fw.flags = (upper << 4) | (fw.flags & 0x8) | (dir.index() as i32 + 1);
                }
                switch_on_dir(world, id, dir)?;
                Ok(true)
            }
        }
        None => {
            if let Some(fw) = free_walk_mut(&mut world.agents.try_get_mut(id)?.state) {
                fw.flags &= !0xf;
            }
            switch_with_other(world, id)?;
            Ok(true)
        }
    }
}

/// The general octant the remaining distance points into, 0..12 counted
/// counter-clockwise from north-north-east.
fn octant(d1: i32, d2: i32) -> usize {
    if d1 < 0 {
        if d2 < 0 {
            if -d2 < -d1 {
                if -2 * d2 < -d1 { 3 } else { 2 }
            } else if -d2 < -2 * d1 {
                1
            } else {
                0
            }
        } else if d2 >= -d1 {
            5
        } else {
            4
        }
    } else if d2 < 0 {
        if -d2 >= d1 { 11 } else { 10 }
    } else if d2 < d1 {
        if 2 * d2 < d1 { 9 } else { 8 }
    } else if d2 < 2 * d1 {
        7
    } else {
        6
    }
}

/// One free-walking decision: arrival dispatch, edge following, direct
/// pursuit, or starting a new edge trace.
pub(super) fn free_walking_common(world: &mut World, id: AgentId) -> SimResult<()> {
    let a = world.agents.try_get(id)?;
    let pos = a.pos;
    let water = matches!(a.state, AgentState::FreeSailing(_));
    let knight = matches!(a.state, AgentState::KnightFreeWalking(_));
    let Some(fw) = free_walk(&a.state) else {
        return Ok(());
    };

    if fw.flags & 8 != 0 && fw.flags & 7 == 0 {
        return dest_reached(world, id);
    }

    if fw.flags & 7 != 0 {
        if follow_edge(world, id)? {
            return Ok(());
        }
    }

    let (d1, d2) = (fw.dist_col, fw.dist_row);
    let row = &DIR_FORWARD[6 * octant(d1, d2)..];

    // Try to move directly in the preferred direction.
    let dir = row[0];
    if step_ok(world, world.map.moved(pos, dir), water) {
        return switch_on_dir(world, id, dir);
    }

    // The destination may be one step away but blocked.
    if !water && d1.abs() <= 1 && d2.abs() <= 1 {
        if let Some(d) = DIR_FROM_OFFSET[((d1 + 1) + 3 * (d2 + 1)) as usize] {
            let new_pos = world.map.moved(pos, d);
            if !can_pass(world, new_pos) {
                return blocked_near_dest(world, id, false);
            }
            if knight && fw.neg_dist1 != -128 {
                if let Some(other) = world.map.blocking_agent(new_pos) {
                    return knight_blocked_by_agent(world, id, other, d);
                }
            }
        }
    }

    // Look for another direction to go in.
    let mut found: Option<(usize, Direction)> = None;
    for (i, &d) in row[1..6].iter().enumerate() {
        if step_ok(world, world.map.moved(pos, d), water) {
            found = Some((i, d));
            break;
        }
    }
    let Some((i0, dir)) = found else {
        return switch_with_other(world, id);
    };

    let edge = ((octant(d1, d2) ^ i0) & 1) as i32;
    let upper = (i0 / 2) as i32 + 1;
    if let Some(fw) = free_walk_mut(&mut world.agents.try_get_mut(id)?.state) {
        fw.flags = (upper << 4) | (edge << 3) | (dir.index() as i32 + 1);
    }
    switch_on_dir(world, id, dir)
}

/// A marching knight found its target cell held by another agent: swap
/// with a willing waiter, or after enough stand-offs declare the blocker
/// lost.
fn knight_blocked_by_agent(
    world: &mut World,
    id: AgentId,
    other: AgentId,
    d: Direction,
) -> SimResult<()> {
    let pos = world.agents.try_get(id)?.pos;
    let new_pos = world.map.moved(pos, d);

    let willing = matches!(
        world.agents.try_get(other)?.waiting_dir(),
        Waiting::Toward(w) if w == d.reverse()
    ) || matches!(world.agents.try_get(other)?.waiting_dir(), Waiting::Any);
    if willing && world.agents.try_get_mut(other)?.switch_waiting(d.reverse()) {
        let h_diff = i32::from(world.map.height(new_pos)) - i32::from(world.map.height(pos));
        let o = world.agents.try_get_mut(other)?;
        o.pos = pos;
        o.animation = walking_animation(-h_diff, d.reverse(), true);
        o.counter_from_animation();
        world.map.set_agent(pos, other);

        let a = world.agents.try_get_mut(id)?;
        a.animation = walking_animation(h_diff, d, true);
        a.counter_from_animation();
        a.pos = new_pos;
        world.map.set_agent(new_pos, id);
        return Ok(());
    }

    let other_state = world.agents.try_get(other)?.state.clone();
    if other_state.is_road_walking() && !matches!(other_state, AgentState::Delivering { .. }) {
        let mut evict = false;
        if let Some(fw) = free_walk_mut(&mut world.agents.try_get_mut(id)?.state) {
            fw.neg_dist2 += 1;
            if fw.neg_dist2 >= 10 {
                fw.neg_dist2 = 0;
                evict = true;
            }
        }
        if evict {
            let transporting = matches!(other_state, AgentState::Transporting { .. });
            if !transporting || world.map.has_flag(new_pos) {
                set_lost(world, other)?;
            }
        }
    }

    let a = world.agents.try_get_mut(id)?;
    a.animation = 82;
    a.counter = ANIMATION_COUNTER[82];
    Ok(())
}

/// Arrival dispatch: what the agent came all this way for, by profession.
fn dest_reached(world: &mut World, id: AgentId) -> SimResult<()> {
    use fief_core::Profession::*;

    let a = world.agents.try_get(id)?;
    let pos = a.pos;
    let player = a.player;
    let prof = a.profession;
    let Some(fw) = free_walk(&a.state) else {
        return Ok(());
    };

    if fw.neg_dist1 == -128 && fw.neg_dist2 < 0 {
        return find_inventory(world, id);
    }

    match prof {
        Lumberjack => {
            if fw.neg_dist1 == -128 {
                if fw.neg_dist2 > 0 {
                    super::drop_at_node(world, id, fief_core::Resource::Lumber)?;
                }
                let a = world.agents.try_get_mut(id)?;
                a.state = AgentState::ReadyToEnter { mode: 0 };
                a.counter = 0;
            } else {
                let obj = world.map.object(pos);
                let a = world.agents.try_get_mut(id)?;
                match obj {
                    Object::Tree(_) | Object::Pine(_) => {
                        a.state = AgentState::Logging(FreeWalk {
                            dist_col: fw.neg_dist1,
                            dist_row: fw.neg_dist2,
                            neg_dist1: if matches!(obj, Object::Tree(_)) { -1 } else { 0 },
                            neg_dist2: 0,
                            flags: 0,
                        });
                        a.animation = 116;
                        a.counter_from_animation();
                    }
                    _ => {
                        // The expected tree is gone.
                        retreat_home(a);
                    }
                }
            }
        }
        Stonecutter => {
            if fw.neg_dist1 == -128 {
                if fw.neg_dist2 > 0 {
                    super::drop_at_node(world, id, fief_core::Resource::Stone)?;
                }
                let a = world.agents.try_get_mut(id)?;
                a.state = AgentState::ReadyToEnter { mode: 0 };
                a.counter = 0;
            } else {
                let rock = world.map.moved(pos, Direction::UpLeft);
                let workable = world.map.blocking_agent(rock).is_none()
                    && matches!(world.map.object(rock), Object::Stone(_));
                if workable {
                    world.agents.try_get_mut(id)?.counter = 0;
                    start_walking(world, id, Direction::UpLeft, 32, true)?;
                    let a = world.agents.try_get_mut(id)?;
                    let counter = a.counter;
                    a.state = AgentState::StoneCutting(FreeWalk {
                        dist_col: fw.neg_dist1,
                        dist_row: fw.neg_dist2,
                        neg_dist1: 0,
                        neg_dist2: counter >> 2,
                        flags: 0,
                    });
                } else {
                    // The expected stone is gone or unavailable.
                    retreat_home(world.agents.try_get_mut(id)?);
                }
            }
        }
        Forester => {
            let a = world.agents.try_get_mut(id)?;
            if fw.neg_dist1 == -128 {
                a.state = AgentState::ReadyToEnter { mode: 0 };
                a.counter = 0;
            } else if world.map.object(pos) == Object::None {
                a.state = AgentState::Planting(FreeWalk {
                    dist_col: fw.neg_dist1,
                    dist_row: fw.neg_dist2,
                    neg_dist1: fw.neg_dist1,
                    neg_dist2: 0,
                    flags: 0,
                });
                a.animation = 121;
                a.counter_from_animation();
            } else {
                retreat_home(a);
            }
        }
        Fisher => {
            if fw.neg_dist1 == -128 {
                if fw.neg_dist2 > 0 {
                    super::drop_at_node(world, id, fief_core::Resource::Fish)?;
                }
                let a = world.agents.try_get_mut(id)?;
                a.state = AgentState::ReadyToEnter { mode: 0 };
                a.counter = 0;
            } else {
                let anim = fishing_spot_animation(world, pos);
                let a = world.agents.try_get_mut(id)?;
                match anim {
                    Some(anim) => {
                        a.state = AgentState::Fishing(FreeWalk {
                            dist_col: fw.neg_dist1,
                            dist_row: fw.neg_dist2,
                            neg_dist1: 0,
                            neg_dist2: 0,
                            flags: 0,
                        });
                        a.animation = anim;
                        a.counter_from_animation();
                    }
                    None => retreat_home(a),
                }
            }
        }
        Farmer => {
            if fw.neg_dist1 == -128 {
                if fw.neg_dist2 > 0 {
                    super::drop_at_node(world, id, fief_core::Resource::Wheat)?;
                }
                let a = world.agents.try_get_mut(id)?;
                a.state = AgentState::ReadyToEnter { mode: 0 };
                a.counter = 0;
            } else {
                let obj = world.map.object(pos);
                let paths = world.map.paths(pos);
                let a = world.agents.try_get_mut(id)?;
                let harvest = matches!(obj, Object::Seeds(5) | Object::Field(_));
                if harvest || (obj == Object::None && paths == 0) {
                    a.state = AgentState::Farming(FreeWalk {
                        dist_col: fw.neg_dist1,
                        dist_row: fw.neg_dist2,
                        neg_dist1: i32::from(harvest),
                        neg_dist2: 0,
                        flags: 0,
                    });
                    a.animation = if harvest { 136 } else { 135 };
                    a.counter_from_animation();
                } else {
                    retreat_home(a);
                }
            }
        }
        Geologist => {
            if fw.neg_dist1 == -128 {
                let at_own_flag =
                    world.map.has_flag(pos) && world.map.is_owned_by(pos, player);
                let a = world.agents.try_get_mut(id)?;
                a.state = if at_own_flag {
                    AgentState::LookingForGeoSpot
                } else {
                    AgentState::Lost { mode: 0 }
                };
                a.counter = 0;
            } else {
                let open = world.map.object(pos) == Object::None;
                let a = world.agents.try_get_mut(id)?;
                if open {
                    a.state = AgentState::SamplingGeoSpot(FreeWalk {
                        dist_col: fw.neg_dist1,
                        dist_row: fw.neg_dist2,
                        neg_dist1: 0,
                        neg_dist2: fw.neg_dist2,
                        flags: 0,
                    });
                    a.animation = 141;
                    a.counter_from_animation();
                } else {
                    retreat_home(a);
                }
            }
        }
        Knight0 | Knight1 | Knight2 | Knight3 | Knight4 => {
            if fw.neg_dist1 == -128 {
                find_inventory(world, id)?;
            } else {
                let a = world.agents.try_get_mut(id)?;
                a.state = AgentState::KnightOccupyEnemyBuilding;
                a.counter = 0;
            }
        }
        _ => find_inventory(world, id)?,
    }
    Ok(())
}

/// Turn the payload around towards home after the work spot fell through.
fn retreat_home(a: &mut fief_agent::Agent) {
    if let Some(fw) = free_walk_mut(&mut a.state) {
        fw.neg_dist1 = -128;
        fw.neg_dist2 = 0;
        fw.flags = 0;
    }
    a.counter = 0;
}

/// The casting animation for a fishing spot, by which side the water is
/// on, or `None` when the spot is not fishable after all.
fn fishing_spot_animation(world: &World, pos: MapPos) -> Option<i32> {
    if world.map.paths(pos) != 0 {
        return None;
    }
    if world.map.is_water(world.map.moved(pos, Direction::Down))
        || world.map.is_water(world.map.moved(pos, Direction::DownRight))
    {
        Some(132)
    } else if world.map.is_water(world.map.moved(pos, Direction::Left)) {
        Some(131)
    } else {
        None
    }
}

// ── State handlers ────────────────────────────────────────────────────────────

pub(super) fn free_walking(world: &mut World, id: AgentId) -> SimResult<()> {
    consume_ticks(world, id)?;
    while world.agents.try_get(id)?.counter < 0 {
        if !matches!(world.agents.try_get(id)?.state, AgentState::FreeWalking(_)) {
            break;
        }
        free_walking_common(world, id)?;
    }
    Ok(())
}

pub(super) fn free_sailing(world: &mut World, id: AgentId) -> SimResult<()> {
    consume_ticks(world, id)?;
    while world.agents.try_get(id)?.counter < 0 {
        if !matches!(world.agents.try_get(id)?.state, AgentState::FreeSailing(_)) {
            break;
        }
        let pos = world.agents.try_get(id)?.pos;
        if !world.map.is_water(pos) {
            world.agents.try_get_mut(id)?.state = AgentState::Lost { mode: 0 };
            return Ok(());
        }
        free_walking_common(world, id)?;
    }
    Ok(())
}

/// Search radius in spiral entries for a lost agent's flag scan.
const LOST_SCAN: usize = 258;

pub(super) fn lost(world: &mut World, id: AgentId) -> SimResult<()> {
    consume_ticks(world, id)?;
    while world.agents.try_get(id)?.counter < 0 {
        let a = world.agents.try_get(id)?;
        let pos = a.pos;
        let player = a.player;
        let knight = a.profession.is_knight();
        let AgentState::Lost { mode } = a.state else {
            return Ok(());
        };

        // Scan the neighborhood for our own connected flag; a first
        // attempt that failed scans outside-in instead.
        for i in 0..LOST_SCAN {
            let index = if mode == 0 { 1 + i } else { LOST_SCAN - i };
            let dest = world.map.pos_add_spirally(pos, index);
            if !world.map.has_flag(dest) || !world.map.is_owned_by(dest, player) {
                continue;
            }
            let node = node_at(world, dest);
            let reachable = world.relays.get(node).is_some_and(|n| {
                Direction::iter().any(|d| n.has_path(d) && !n.is_water_path(d))
                    || (n.has_inventory && n.accepts_agents)
            });
            if !reachable {
                continue;
            }
            let (sx, sy) = SPIRAL_PATTERN[index];
            let fw = FreeWalk {
                dist_col: sx,
                dist_row: sy,
                neg_dist1: -128,
                neg_dist2: -1,
                flags: 0,
            };
            let a = world.agents.try_get_mut(id)?;
            a.state = if knight {
                AgentState::KnightFreeWalking(fw)
            } else {
                AgentState::FreeWalking(fw)
            };
            a.counter = 0;
            return Ok(());
        }

        // No flag in sight; roam towards a random open cell, widening the
        // throw each round of failed tries.
        let mut size = 16i32;
        let mut tries = 10i32;
        loop {
            tries -= 1;
            if tries < 0 {
                if size < 64 {
                    tries = 19;
                    size *= 2;
                } else {
                    tries = -1;
                    size = 16;
                }
            }
            let r = i32::from(world.rng.random());
            let col = (r & (size - 1)) - size / 2;
            let row = ((r >> 8) & (size - 1)) - size / 2;
            let dest = world.map.pos_add(pos, col, row);
            let open = world.map.object(dest) == Object::None && world.map.height(dest) > 0;
            if open || (world.map.has_flag(dest) && world.map.is_owned_by(dest, player)) {
                let fw = FreeWalk {
                    dist_col: col,
                    dist_row: row,
                    neg_dist1: -128,
                    neg_dist2: -1,
                    flags: 0,
                };
                let a = world.agents.try_get_mut(id)?;
                a.state = if knight {
                    AgentState::KnightFreeWalking(fw)
                } else {
                    AgentState::FreeWalking(fw)
                };
                a.counter = 0;
                return Ok(());
            }
        }
    }
    Ok(())
}

pub(super) fn lost_sailor(world: &mut World, id: AgentId) -> SimResult<()> {
    consume_ticks(world, id)?;
    while world.agents.try_get(id)?.counter < 0 {
        let a = world.agents.try_get(id)?;
        let pos = a.pos;
        let player = a.player;

        for i in 0..LOST_SCAN {
            let dest = world.map.pos_add_spirally(pos, i);
            if !world.map.has_flag(dest) || !world.map.is_owned_by(dest, player) {
                continue;
            }
            let node = node_at(world, dest);
            let reachable = world.relays.get(node).is_some_and(|n| {
                Direction::iter().any(|d| n.has_path(d) && !n.is_water_path(d))
            });
            if !reachable {
                continue;
            }
            let (sx, sy) = SPIRAL_PATTERN[i];
            let a = world.agents.try_get_mut(id)?;
            a.state = AgentState::FreeSailing(FreeWalk {
                dist_col: sx,
                dist_row: sy,
                neg_dist1: -128,
                neg_dist2: -1,
                flags: 0,
            });
            a.counter = 0;
            return Ok(());
        }

        loop {
            let r = i32::from(world.rng.random());
            let col = (r & 0x1f) - 16;
            let row = ((r >> 8) & 0x1f) - 16;
            let dest = world.map.pos_add(pos, col, row);
            if world.map.object(dest) == Object::None {
                let a = world.agents.try_get_mut(id)?;
                a.state = AgentState::FreeSailing(FreeWalk {
                    dist_col: col,
                    dist_row: row,
                    neg_dist1: -128,
                    neg_dist2: -1,
                    flags: 0,
                });
                a.counter = 0;
                return Ok(());
            }
        }
    }
    Ok(())
}

pub(super) fn escape_building(world: &mut World, id: AgentId) -> SimResult<()> {
    let pos = world.agents.try_get(id)?.pos;
    if world.map.blocking_agent(pos).is_none() {
        world.map.set_agent(pos, id);
        let tick = world.tick;
        let a = world.agents.try_get_mut(id)?;
        a.animation = 82;
        a.counter = 0;
        a.tick = tick;
        a.state = AgentState::Lost { mode: 0 };
    }
    Ok(())
}

pub(super) fn scatter(world: &mut World, id: AgentId) -> SimResult<()> {
    let a = world.agents.try_get(id)?;
    let pos = a.pos;
    let knight = a.profession.is_knight();
    loop {
        let r = i32::from(world.rng.random());
        let mut col = r & 0xf;
        if col < 8 {
            col -= 16;
        }
        let mut row = (r >> 8) & 0xf;
        if row < 8 {
            row -= 16;
        }
        let dest = world.map.pos_add(pos, col, row);
        if world.map.object(dest) == Object::None && world.map.height(dest) > 0 {
            let fw = FreeWalk {
                dist_col: col,
                dist_row: row,
                neg_dist1: -128,
                neg_dist2: -1,
                flags: 0,
            };
            let a = world.agents.try_get_mut(id)?;
            a.state = if knight {
                AgentState::KnightFreeWalking(fw)
            } else {
                AgentState::FreeWalking(fw)
            };
            a.counter = 0;
            return Ok(());
        }
    }
}
