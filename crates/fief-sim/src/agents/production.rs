//! Handlers for working agents: site leveling and construction, the
//! outdoor harvesting professions, the indoor crafts, and the geologist's
//! survey walk.
//!
//! Indoor handlers share a cadence: `mode` 0 waits for input stock, the
//! first consumption puts the worker on the floor (visible on the grid),
//! and the finished product leaves through [`AgentState::MoveResourceOut`].

use fief_agent::{ANIMATION_COUNTER, AgentState, FreeWalk, Waiting, walking_animation};
use fief_core::{AgentId, Direction, NodeId, Resource, SimResult, TOOLS};
use fief_grid::{Cell, Mineral, Object, SPIRAL_PATTERN, SignKind, Space};
use fief_structure::Structure;

use crate::World;
use crate::player::Notification;

use super::{consume_ticks, start_walking, structure_id_at};

/// Consume one unit from each of the structure's two input slots.
fn use_resources_in_stocks(s: &mut Structure) -> bool {
    if s.stocks[0].available > 0 && s.stocks[1].available > 0 {
        s.stocks[0].available -= 1;
        s.stocks[1].available -= 1;
        true
    } else {
        false
    }
}

/// The deposit a sign advertises.
fn sign_mineral(kind: SignKind) -> Mineral {
    match kind {
        SignKind::LargeGold | SignKind::SmallGold => Mineral::Gold,
        SignKind::LargeIron | SignKind::SmallIron => Mineral::Iron,
        SignKind::LargeCoal | SignKind::SmallCoal => Mineral::Coal,
        SignKind::LargeStone | SignKind::SmallStone => Mineral::Stone,
        SignKind::Empty => Mineral::None,
    }
}

/// Send the worker out of its structure towards spiral offset `index`.
/// The `-1`/`+1` adjustments account for the step from the door down to
/// the node the walk actually starts from.
fn leave_for_spot(
    world: &mut World,
    id: AgentId,
    index: usize,
    next: fn(FreeWalk) -> AgentState,
) -> SimResult<()> {
    let (sx, sy) = SPIRAL_PATTERN[index];
    let fw = FreeWalk {
        dist_col:  sx - 1,
        dist_row:  sy - 1,
        neg_dist1: -sx + 1,
        neg_dist2: -sy + 1,
        flags:     0,
    };
    world.agents.try_get_mut(id)?.state =
        AgentState::ReadyToLeave { next: Box::new(next(fw)) };
    Ok(())
}

/// Hand the finished product to the inventory out-queue and book it for
/// the census.
fn move_resource_out(world: &mut World, id: AgentId, res: Resource) -> SimResult<()> {
    let a = world.agents.try_get_mut(id)?;
    let player = a.player;
    a.state = AgentState::MoveResourceOut { resource: res, dest: NodeId::INVALID };
    world.player_mut(player)?.resource_produced(res);
    Ok(())
}

// ── Construction ──────────────────────────────────────────────────────────────

/// Height change per leveling pass, alternating cut and fill outward from
/// the target height.
const LEVELING_STEPS: [i32; 16] = [-1, 1, -2, 2, -3, 3, -4, 4, -5, 5, -6, 6, -7, 7, -8, 8];

pub(super) fn digging(world: &mut World, id: AgentId) -> SimResult<()> {
    consume_ticks(world, id)?;
    while world.agents.try_get(id)?.counter < 0 {
        let pos = world.agents.try_get(id)?.pos;
        let AgentState::Digging { mut h_index, target_height, mut dig_pos, mut substate } =
            world.agents.try_get(id)?.state
        else {
            return Ok(());
        };
        substate -= 1;

        if substate < 0 {
            // Walk to the chosen spot, negotiating with whoever stands
            // there.
            let dir = if dig_pos == 0 {
                Direction::Up
            } else {
                Direction::from_u8((6 - dig_pos) as u8)
            };
            let new_pos = world.map.moved(pos, dir);
            let h_diff =
                i32::from(world.map.height(new_pos)) - i32::from(world.map.height(pos));

            match world.map.blocking_agent(new_pos) {
                Some(other) => {
                    let willing = matches!(
                        world.agents.try_get(other)?.waiting_dir(),
                        Waiting::Toward(w) if w == dir.reverse()
                    );
                    if willing && world.agents.try_get_mut(other)?.switch_waiting(dir.reverse())
                    {
                        let o = world.agents.try_get_mut(other)?;
                        o.pos = pos;
                        o.animation = walking_animation(-h_diff, dir.reverse(), true);
                        o.counter_from_animation();
                        world.map.set_agent(pos, other);
                        world.agents.try_get_mut(id)?.animation =
                            walking_animation(h_diff, dir, true);
                    } else {
                        let a = world.agents.try_get_mut(id)?;
                        a.counter = 127;
                        a.state = AgentState::Digging {
                            h_index,
                            target_height,
                            dig_pos,
                            substate: 0,
                        };
                        return Ok(());
                    }
                }
                None => {
                    world.map.clear_agent(pos);
                    world.agents.try_get_mut(id)?.animation =
                        walking_animation(h_diff, dir, false);
                }
            }
            world.map.set_agent(new_pos, id);
            let a = world.agents.try_get_mut(id)?;
            a.pos = new_pos;
            a.counter += ANIMATION_COUNTER[a.animation as usize];
            substate = 3;
        } else if substate == 1 {
            // Adjust the cell one step towards the target, then head back
            // to the center.
            let h = world.map.height(pos);
            let h = if h_index & 1 != 0 { h - 1 } else { h + 1 };
            world.map.set_height(pos, h);
            if dig_pos != 0 {
                let dir = Direction::from_u8((6 - dig_pos) as u8).reverse();
                start_walking(world, id, dir, 32, true)?;
            }
        } else if substate > 1 {
            let a = world.agents.try_get_mut(id)?;
            a.animation = 88 - (h_index & 1);
            a.counter += 383;
        } else {
            // Look for the next cell still off the current pass height.
            let mut acted = false;
            while h_index >= 0 {
                let h = LEVELING_STEPS[h_index as usize] + i32::from(target_height);
                if dig_pos >= 0 && (0..32).contains(&h) {
                    if dig_pos == 0 {
                        if i32::from(world.map.height(pos)) != h {
                            dig_pos -= 1;
                            continue;
                        }
                        substate = 2;
                        let a = world.agents.try_get_mut(id)?;
                        a.animation = if h_index & 1 != 0 { 87 } else { 88 };
                        a.counter += 383;
                    } else {
                        let dir = Direction::from_u8((6 - dig_pos) as u8);
                        let new_pos = world.map.moved(pos, dir);
                        if i32::from(world.map.height(new_pos)) != h {
                            dig_pos -= 1;
                            continue;
                        }
                        if world.map.blocking_agent(new_pos).is_some() {
                            let a = world.agents.try_get_mut(id)?;
                            a.animation = 87 - dig_pos;
                            a.counter = ANIMATION_COUNTER[a.animation as usize];
                            a.state = AgentState::Digging {
                                h_index,
                                target_height,
                                dig_pos,
                                substate: 0,
                            };
                            return Ok(());
                        }
                        start_walking(world, id, dir, 32, true)?;
                        substate = 3;
                    }
                    acted = true;
                    break;
                }
                dig_pos = 6;
                h_index -= 1;
            }

            if !acted {
                // Every cell sits at the target height.
                let sid = structure_id_at(world, pos);
                if let Some(s) = world.structures.get_mut(sid) {
                    s.done_leveling();
                }
                world.agents.try_get_mut(id)?.state = AgentState::ReadyToLeave {
                    next: Box::new(AgentState::Walking {
                        dir1: -2,
                        dest: NodeId::INVALID,
                        dir: 0,
                        wait_counter: 0,
                    }),
                };
                return super::transport::ready_to_leave(world, id);
            }
        }

        world.agents.try_get_mut(id)?.state =
            AgentState::Digging { h_index, target_height, dig_pos, substate };
    }
    Ok(())
}

pub(super) fn building(world: &mut World, id: AgentId) -> SimResult<()> {
    consume_ticks(world, id)?;
    while world.agents.try_get(id)?.counter < 0 {
        let AgentState::Building { mut mode, structure, mut material_step, counter: mut left } =
            world.agents.try_get(id)?.state
        else {
            return Ok(());
        };

        if mode < 0 {
            if world.structures.try_get_mut(structure)?.build_progress() {
                let s = world.structures.try_get(structure)?;
                let (pos, kind, owner, node) = (s.pos, s.kind, s.owner, s.node);
                if let Some(n) = world.relays.get_mut(node) {
                    n.fix_scheduled();
                }
                world
                    .player_mut(owner)?
                    .notify(Notification::StructureFinished { pos, kind });
                let a = world.agents.try_get_mut(id)?;
                a.counter = 0;
                a.state = AgentState::FinishedBuilding;
                return Ok(());
            }

            left -= 1;
            if left == 0 {
                mode = 1;
                world.agents.try_get_mut(id)?.animation =
                    if material_step & 0x80 != 0 { 100 } else { 98 };
                if !consume_material(world, id, structure, material_step, mode, left)? {
                    return Ok(());
                }
                material_step += 1;
                left = 8;
                mode = -1;
            }
        } else {
            if mode == 0 {
                mode = 1;
                world.agents.try_get_mut(id)?.animation =
                    if material_step & 0x80 != 0 { 100 } else { 98 };
            }
            if !consume_material(world, id, structure, material_step, mode, left)? {
                return Ok(());
            }
            material_step += 1;
            left = 8;
            mode = -1;
        }

        let r = i32::from(world.rng.random());
        let mut anim = (r & 3) + 102;
        if material_step & 0x80 != 0 {
            anim += 4;
        }
        let a = world.agents.try_get_mut(id)?;
        a.animation = anim;
        a.counter += ANIMATION_COUNTER[anim as usize];
        a.state = AgentState::Building { mode, structure, material_step, counter: left };
    }
    Ok(())
}

/// Take the next plank or stone off the site, per the kind's material
/// order.  With the site starved the builder stands by and the state is
/// parked as-is; returns `false` in that case.
fn consume_material(
    world: &mut World,
    id: AgentId,
    structure: fief_core::StructureId,
    material_step: u16,
    mode: i32,
    left: u16,
) -> SimResult<bool> {
    let s = world.structures.try_get_mut(structure)?;
    let consumed = if s.uses_stone_at(material_step) {
        if s.waiting_stones() == 0 {
            false
        } else {
            s.use_stone();
            true
        }
    } else if s.waiting_planks() == 0 {
        false
    } else {
        s.use_plank();
        true
    };

    if !consumed {
        let a = world.agents.try_get_mut(id)?;
        a.counter += 256;
        if a.counter < 0 {
            a.counter = 255;
        }
        a.state = AgentState::Building { mode, structure, material_step, counter: left };
    }
    Ok(consumed)
}

pub(super) fn building_castle(world: &mut World, id: AgentId) -> SimResult<()> {
    let tick = world.tick;
    let a = world.agents.try_get_mut(id)?;
    let progress = u32::from(tick.wrapping_sub(a.tick)) << 7;
    a.tick = tick;
    let pos = a.pos;
    let AgentState::BuildingCastle { inventory } = a.state else {
        return Ok(());
    };

    let s = world.structures.try_get_mut(inventory)?;
    s.progress += progress;
    if s.progress < 0x10000 {
        return Ok(());
    }

    s.progress = 0;
    s.constructing = false;
    s.main_agent = AgentId::INVALID;
    world.agents.try_get_mut(id)?.state = AgentState::WaitForResourceOut;
    world.map.clear_agent(pos);
    Ok(())
}

// ── Outdoor harvesting ────────────────────────────────────────────────────────

pub(super) fn planning_logging(world: &mut World, id: AgentId) -> SimResult<()> {
    consume_ticks(world, id)?;
    while world.agents.try_get(id)?.counter < 0 {
        let pos = world.agents.try_get(id)?.pos;
        let index = usize::from(world.rng.random() & 0x7f) + 1;
        let dest = world.map.pos_add_spirally(pos, index);
        if matches!(world.map.object(dest), Object::Tree(_) | Object::Pine(_)) {
            return leave_for_spot(world, id, index, AgentState::FreeWalking);
        }
        world.agents.try_get_mut(id)?.counter += 400;
    }
    Ok(())
}

pub(super) fn logging(world: &mut World, id: AgentId) -> SimResult<()> {
    consume_ticks(world, id)?;
    while world.agents.try_get(id)?.counter < 0 {
        let pos = world.agents.try_get(id)?.pos;
        let AgentState::Logging(mut fw) = world.agents.try_get(id)?.state else {
            return Ok(());
        };
        fw.neg_dist2 += 1;

        // The tree falls over the five chopping stages.
        let stage = (fw.neg_dist2 - 1) as u8;
        let felled = if fw.neg_dist1 != 0 {
            Object::FelledTree(stage)
        } else {
            Object::FelledPine(stage)
        };
        world.map.set_object(pos, felled, Cell::NO_OBJECT_INDEX);

        let a = world.agents.try_get_mut(id)?;
        if fw.neg_dist2 < 5 {
            a.animation = 116 + fw.neg_dist2;
            a.counter += ANIMATION_COUNTER[a.animation as usize];
            a.state = AgentState::Logging(fw);
        } else {
            a.state = AgentState::FreeWalking(FreeWalk {
                dist_col:  fw.dist_col,
                dist_row:  fw.dist_row,
                neg_dist1: -128,
                neg_dist2: 1,
                flags:     0,
            });
            a.counter = 0;
            return Ok(());
        }
    }
    Ok(())
}

pub(super) fn planning_planting(world: &mut World, id: AgentId) -> SimResult<()> {
    consume_ticks(world, id)?;
    while world.agents.try_get(id)?.counter < 0 {
        let pos = world.agents.try_get(id)?.pos;
        let index = usize::from(world.rng.random() & 0x7f) + 1;
        let dest = world.map.pos_add_spirally(pos, index);
        let up_left = world.map.moved(dest, Direction::UpLeft);
        if world.map.paths(dest) == 0
            && world.map.object(dest) == Object::None
            && world.map.terrain(dest).is_grass()
            && world.map.terrain(up_left).is_grass()
        {
            return leave_for_spot(world, id, index, AgentState::FreeWalking);
        }
        world.agents.try_get_mut(id)?.counter += 700;
    }
    Ok(())
}

pub(super) fn planting(world: &mut World, id: AgentId) -> SimResult<()> {
    consume_ticks(world, id)?;
    while world.agents.try_get(id)?.counter < 0 {
        let pos = world.agents.try_get(id)?.pos;
        let AgentState::Planting(mut fw) = world.agents.try_get(id)?.state else {
            return Ok(());
        };

        if fw.neg_dist2 != 0 {
            let a = world.agents.try_get_mut(id)?;
            a.state = AgentState::FreeWalking(FreeWalk {
                dist_col:  fw.dist_col,
                dist_row:  fw.dist_row,
                neg_dist1: -128,
                neg_dist2: 0,
                flags:     0,
            });
            a.counter = 0;
            return Ok(());
        }

        let sapling = if world.rng.random() & 1 != 0 {
            Object::Tree(0)
        } else {
            Object::Sapling(0)
        };
        if world.map.paths(pos) == 0 && world.map.object(pos) == Object::None {
            world.map.set_object(pos, sapling, Cell::NO_OBJECT_INDEX);
        }

        let a = world.agents.try_get_mut(id)?;
        a.animation = 122;
        fw.neg_dist2 = -fw.neg_dist2 - 1;
        a.state = AgentState::Planting(fw);
        a.counter += 128;
    }
    Ok(())
}

pub(super) fn planning_stonecutting(world: &mut World, id: AgentId) -> SimResult<()> {
    consume_ticks(world, id)?;
    while world.agents.try_get(id)?.counter < 0 {
        let pos = world.agents.try_get(id)?.pos;
        let index = usize::from(world.rng.random() & 0x7f) + 1;
        let dest = world.map.pos_add_spirally(pos, index);
        let up_left = world.map.moved(dest, Direction::UpLeft);
        if matches!(world.map.object(up_left), Object::Stone(_))
            && super::freewalk::can_pass(world, dest)
        {
            return leave_for_spot(world, id, index, AgentState::StoneCutterFreeWalking);
        }
        world.agents.try_get_mut(id)?.counter += 100;
    }
    Ok(())
}

pub(super) fn stonecutter_free_walking(world: &mut World, id: AgentId) -> SimResult<()> {
    consume_ticks(world, id)?;
    while world.agents.try_get(id)?.counter < 0 {
        let AgentState::StoneCutterFreeWalking(fw) = world.agents.try_get(id)?.state else {
            break;
        };
        let pos = world.agents.try_get(id)?.pos;
        let up_left = world.map.moved(pos, Direction::UpLeft);

        // Any cell below workable stone is as good as the planned one.
        if matches!(world.map.object(up_left), Object::Stone(_)) && fw.flags & 8 == 0 {
            let a = world.agents.try_get_mut(id)?;
            if let AgentState::StoneCutterFreeWalking(fw) = &mut a.state {
                fw.neg_dist1 += fw.dist_col;
                fw.neg_dist2 += fw.dist_row;
                fw.dist_col = 0;
                fw.dist_row = 0;
                fw.flags = 8;
            }
        }

        super::freewalk::free_walking_common(world, id)?;
    }
    Ok(())
}

pub(super) fn stonecutting(world: &mut World, id: AgentId) -> SimResult<()> {
    consume_ticks(world, id)?;

    {
        let AgentState::StoneCutting(fw) = world.agents.try_get(id)?.state else {
            return Ok(());
        };
        if fw.neg_dist1 == 0 {
            // First pass: absorb the approach charge, then swing.
            let a = world.agents.try_get_mut(id)?;
            if a.counter > fw.neg_dist2 {
                return Ok(());
            }
            a.counter -= fw.neg_dist2 + 1;
            if let AgentState::StoneCutting(fw) = &mut a.state {
                fw.neg_dist1 = 1;
            }
            a.animation = 123;
            a.counter += 1536;
        }
    }

    while world.agents.try_get(id)?.counter < 0 {
        let pos = world.agents.try_get(id)?.pos;
        let AgentState::StoneCutting(fw) = world.agents.try_get(id)?.state else {
            return Ok(());
        };

        if fw.neg_dist1 != 1 {
            let a = world.agents.try_get_mut(id)?;
            a.state = AgentState::FreeWalking(FreeWalk {
                dist_col:  fw.dist_col,
                dist_row:  fw.dist_row,
                neg_dist1: -128,
                neg_dist2: 1,
                flags:     0,
            });
            a.counter = 0;
            return Ok(());
        }

        // The cell we back down onto must be free.
        if world
            .map
            .blocking_agent(world.map.moved(pos, Direction::DownRight))
            .is_some()
        {
            world.agents.try_get_mut(id)?.counter = 0;
            return Ok(());
        }

        // One slab off the rock; the last one removes it.
        let stone = world.map.moved(pos, Direction::UpLeft);
        match world.map.object(stone) {
            Object::Stone(n) if n > 1 => {
                world.map.set_object(stone, Object::Stone(n - 1), Cell::NO_OBJECT_INDEX);
            }
            Object::Stone(_) => world.map.clear_object(stone),
            _ => {}
        }

        world.agents.try_get_mut(id)?.counter = 0;
        start_walking(world, id, Direction::DownRight, 24, true)?;
        let tick = world.tick;
        let a = world.agents.try_get_mut(id)?;
        a.tick = tick;
        if let AgentState::StoneCutting(fw) = &mut a.state {
            fw.neg_dist1 = 2;
        }
    }
    Ok(())
}

pub(super) fn planning_fishing(world: &mut World, id: AgentId) -> SimResult<()> {
    consume_ticks(world, id)?;
    while world.agents.try_get(id)?.counter < 0 {
        let pos = world.agents.try_get(id)?.pos;
        let index = usize::from((world.rng.random() >> 2) & 0x3f) + 1;
        let dest = world.map.pos_add_spirally(pos, index);
        let shoreline = !world.map.is_water(dest)
            && (world.map.is_water(world.map.moved(dest, Direction::Down))
                || world.map.is_water(world.map.moved(dest, Direction::DownRight))
                || world.map.is_water(world.map.moved(dest, Direction::Left)));
        if world.map.object(dest) == Object::None && world.map.paths(dest) == 0 && shoreline {
            return leave_for_spot(world, id, index, AgentState::FreeWalking);
        }
        world.agents.try_get_mut(id)?.counter += 100;
    }
    Ok(())
}

pub(super) fn fishing(world: &mut World, id: AgentId) -> SimResult<()> {
    consume_ticks(world, id)?;
    while world.agents.try_get(id)?.counter < 0 {
        let pos = world.agents.try_get(id)?.pos;
        let AgentState::Fishing(mut fw) = world.agents.try_get(id)?.state else {
            return Ok(());
        };

        if fw.neg_dist2 != 0 || fw.flags == 10 {
            // Caught something, or out of patience.
            let a = world.agents.try_get_mut(id)?;
            a.state = AgentState::FreeWalking(FreeWalk {
                dist_col:  fw.dist_col,
                dist_row:  fw.dist_row,
                neg_dist1: -128,
                neg_dist2: fw.neg_dist2,
                flags:     0,
            });
            a.counter = 0;
            return Ok(());
        }

        fw.neg_dist1 += 1;
        if fw.neg_dist1 % 2 == 0 {
            let a = world.agents.try_get_mut(id)?;
            a.animation -= 2;
            a.counter += 768;
            a.state = AgentState::Fishing(fw);
            continue;
        }

        let animation = world.agents.try_get(id)?.animation;
        let dir = if animation == 131 {
            if world.map.is_water(world.map.moved(pos, Direction::Left)) {
                Direction::Left
            } else {
                Direction::Down
            }
        } else if world.map.is_water(world.map.moved(pos, Direction::Right)) {
            Direction::Right
        } else {
            Direction::DownRight
        };

        let spot = world.map.moved(pos, dir);
        let fish = world.map.cell(spot).mineral_amount;
        if fish > 0 && i32::from(world.rng.random() & 0x3f) + 4 < i32::from(fish) {
            world.map.cell_mut(spot).mineral_amount -= 1;
            fw.neg_dist2 = 1;
        }

        let a = world.agents.try_get_mut(id)?;
        fw.flags += 1;
        a.animation += 2;
        a.counter += 128;
        a.state = AgentState::Fishing(fw);
    }
    Ok(())
}

pub(super) fn planning_farming(world: &mut World, id: AgentId) -> SimResult<()> {
    consume_ticks(world, id)?;
    while world.agents.try_get(id)?.counter < 0 {
        let pos = world.agents.try_get(id)?.pos;
        let index = usize::from((world.rng.random() >> 2) & 0x1f) + 7;
        let dest = world.map.pos_add_spirally(pos, index);
        let obj = world.map.object(dest);

        let clear_of_buildings = Direction::iter().all(|d| {
            !matches!(
                world.map.object(world.map.moved(dest, d)),
                Object::LargeStructure | Object::Castle
            )
        });
        let sowable = obj == Object::None
            && world.map.paths(dest) == 0
            && world.map.terrain(dest).is_grass()
            && world.map.terrain(world.map.moved(dest, Direction::UpLeft)).is_grass()
            && clear_of_buildings;
        if sowable || matches!(obj, Object::Seeds(5) | Object::Field(_)) {
            return leave_for_spot(world, id, index, AgentState::FreeWalking);
        }
        world.agents.try_get_mut(id)?.counter += 500;
    }
    Ok(())
}

pub(super) fn farming(world: &mut World, id: AgentId) -> SimResult<()> {
    if consume_ticks(world, id)? >= 0 {
        return Ok(());
    }

    let pos = world.agents.try_get(id)?.pos;
    let AgentState::Farming(fw) = world.agents.try_get(id)?.state else {
        return Ok(());
    };

    let mut harvested = 0;
    if fw.neg_dist1 == 0 {
        // Sowing.
        if world.map.object(pos) == Object::None && world.map.paths(pos) == 0 {
            world.map.set_object(pos, Object::Seeds(0), Cell::NO_OBJECT_INDEX);
        }
    } else {
        // Harvesting.
        harvested = 1;
        match world.map.object(pos) {
            Object::Seeds(5) => {
                world.map.set_object(pos, Object::Field(0), Cell::NO_OBJECT_INDEX);
            }
            Object::Field(5) => world.map.clear_object(pos),
            Object::Field(f) => {
                world.map.set_object(pos, Object::Field(f + 1), Cell::NO_OBJECT_INDEX);
            }
            _ => {}
        }
    }

    let a = world.agents.try_get_mut(id)?;
    a.state = AgentState::FreeWalking(FreeWalk {
        dist_col:  fw.dist_col,
        dist_row:  fw.dist_row,
        neg_dist1: -128,
        neg_dist2: harvested,
        flags:     0,
    });
    a.counter = 0;
    Ok(())
}

// ── Indoor production ─────────────────────────────────────────────────────────

pub(super) fn sawing(world: &mut World, id: AgentId) -> SimResult<()> {
    let AgentState::Sawing { mode } = world.agents.try_get(id)?.state else {
        return Ok(());
    };
    let pos = world.agents.try_get(id)?.pos;
    let sid = structure_id_at(world, pos);

    if mode == 0 {
        if world.structures.try_get_mut(sid)?.use_resource_in_stock(1) {
            let tick = world.tick;
            let a = world.agents.try_get_mut(id)?;
            a.state = AgentState::Sawing { mode: 1 };
            a.animation = 124;
            a.counter_from_animation();
            a.tick = tick;
            world.map.set_agent(pos, id);
        }
    } else if consume_ticks(world, id)? < 0 {
        world.map.clear_agent(pos);
        move_resource_out(world, id, Resource::Plank)?;
    }
    Ok(())
}

pub(super) fn mining(world: &mut World, id: AgentId) -> SimResult<()> {
    consume_ticks(world, id)?;
    while world.agents.try_get(id)?.counter < 0 {
        let pos = world.agents.try_get(id)?.pos;
        let AgentState::Mining { mut substate, mut res, deposit } =
            world.agents.try_get(id)?.state
        else {
            return Ok(());
        };
        let sid = structure_id_at(world, pos);

        match substate {
            0 => {
                // A small chance the miner skips the meal.
                let r = i32::from(world.rng.random());
                substate = if r & 7 == 0 { 2 } else { 1 };
                world.agents.try_get_mut(id)?.counter += 100 + (r & 0x1ff);
            }
            1 => {
                if world.structures.try_get_mut(sid)?.use_resource_in_stock(0) {
                    substate = 3;
                    world.map.set_agent(pos, id);
                    let a = world.agents.try_get_mut(id)?;
                    a.animation = 125;
                    a.counter_from_animation();
                } else {
                    world.map.set_agent(pos, id);
                    let a = world.agents.try_get_mut(id)?;
                    a.animation = 98;
                    a.counter += 256;
                    if a.counter < 0 {
                        a.counter = 255;
                    }
                }
            }
            2 => {
                substate = 3;
                world.map.set_agent(pos, id);
                let a = world.agents.try_get_mut(id)?;
                a.animation = 125;
                a.counter_from_animation();
            }
            3 => {
                substate = 4;
                world.structures.try_get_mut(sid)?.active = false;
                let a = world.agents.try_get_mut(id)?;
                a.animation = 126;
                a.counter = 304;
            }
            4..=7 => {
                if substate == 4 {
                    world.map.clear_agent(pos);
                }
                substate += 1;

                // Probe the ground nearby for the deposit this mine works.
                let off = usize::from((world.rng.random() >> 2) & 0x1f);
                let probe = world.map.pos_add_spirally(pos, off);
                let (mineral, amount) = world.map.mineral(probe);
                if world.map.space(probe) != Space::Occupied
                    && mineral == deposit
                    && amount > 0
                {
                    world.map.extract_mineral(probe);
                    res = Some(match deposit {
                        Mineral::Gold => Resource::GoldOre,
                        Mineral::Iron => Resource::IronOre,
                        Mineral::Coal => Resource::Coal,
                        _ => Resource::Stone,
                    });
                    substate = 8;
                }
                world.agents.try_get_mut(id)?.counter += 1000;
            }
            8 => {
                substate = 9;
                world.map.set_agent(pos, id);
                let a = world.agents.try_get_mut(id)?;
                a.animation = 127;
                a.counter_from_animation();
            }
            9 => {
                substate = 10;
                let s = world.structures.try_get_mut(sid)?;
                let depleted = s.mine_depleted();
                let (owner, spos) = (s.owner, s.pos);
                s.increase_mining(res.is_some());
                if depleted {
                    world.player_mut(owner)?.notify(Notification::MineEmpty { pos: spos });
                }
                let a = world.agents.try_get_mut(id)?;
                a.animation = 128;
                a.counter = 384;
            }
            _ => {
                world.map.clear_agent(pos);
                match res {
                    None => {
                        substate = 0;
                        world.agents.try_get_mut(id)?.counter = 0;
                    }
                    Some(found) => return move_resource_out(world, id, found),
                }
            }
        }

        world.agents.try_get_mut(id)?.state = AgentState::Mining { substate, res, deposit };
    }
    Ok(())
}

pub(super) fn smelting(world: &mut World, id: AgentId) -> SimResult<()> {
    let AgentState::Smelting { mode, counter: mut melt, gold } =
        world.agents.try_get(id)?.state
    else {
        return Ok(());
    };
    let pos = world.agents.try_get(id)?.pos;
    let sid = structure_id_at(world, pos);

    if mode == 0 {
        let s = world.structures.try_get_mut(sid)?;
        if use_resources_in_stocks(s) {
            s.active = true;
            let tick = world.tick;
            let a = world.agents.try_get_mut(id)?;
            a.state = AgentState::Smelting { mode: 1, counter: 20, gold };
            a.animation = if gold { 129 } else { 130 };
            a.counter_from_animation();
            a.tick = tick;
            world.map.set_agent(pos, id);
        }
        return Ok(());
    }

    consume_ticks(world, id)?;
    while world.agents.try_get(id)?.counter < 0 {
        melt -= 1;
        if melt < 0 {
            world.structures.try_get_mut(sid)?.active = false;
            let res = if gold { Resource::GoldBar } else { Resource::Steel };
            return move_resource_out(world, id, res);
        } else if melt == 0 {
            world.map.clear_agent(pos);
        }
        let a = world.agents.try_get_mut(id)?;
        a.counter += 384;
        a.state = AgentState::Smelting { mode, counter: melt, gold };
    }
    Ok(())
}

pub(super) fn milling(world: &mut World, id: AgentId) -> SimResult<()> {
    let AgentState::Milling { mut mode } = world.agents.try_get(id)?.state else {
        return Ok(());
    };
    let pos = world.agents.try_get(id)?.pos;
    let sid = structure_id_at(world, pos);

    if mode == 0 {
        let s = world.structures.try_get_mut(sid)?;
        if s.use_resource_in_stock(0) {
            s.active = true;
            let tick = world.tick;
            let a = world.agents.try_get_mut(id)?;
            a.state = AgentState::Milling { mode: 1 };
            a.animation = 137;
            a.counter_from_animation();
            a.tick = tick;
            world.map.set_agent(pos, id);
        }
        return Ok(());
    }

    consume_ticks(world, id)?;
    while world.agents.try_get(id)?.counter < 0 {
        mode += 1;
        if mode == 5 {
            world.structures.try_get_mut(sid)?.active = false;
            return move_resource_out(world, id, Resource::Flour);
        } else if mode == 3 {
            world.map.set_agent(pos, id);
            let a = world.agents.try_get_mut(id)?;
            a.animation = 137;
            a.counter_from_animation();
        } else {
            world.map.clear_agent(pos);
            world.agents.try_get_mut(id)?.counter += 1500;
        }
        world.agents.try_get_mut(id)?.state = AgentState::Milling { mode };
    }
    Ok(())
}

pub(super) fn baking(world: &mut World, id: AgentId) -> SimResult<()> {
    let AgentState::Baking { mut mode } = world.agents.try_get(id)?.state else {
        return Ok(());
    };
    let pos = world.agents.try_get(id)?.pos;
    let sid = structure_id_at(world, pos);

    if mode == 0 {
        if world.structures.try_get_mut(sid)?.use_resource_in_stock(0) {
            let tick = world.tick;
            let a = world.agents.try_get_mut(id)?;
            a.state = AgentState::Baking { mode: 1 };
            a.animation = 138;
            a.counter_from_animation();
            a.tick = tick;
            world.map.set_agent(pos, id);
        }
        return Ok(());
    }

    consume_ticks(world, id)?;
    while world.agents.try_get(id)?.counter < 0 {
        mode += 1;
        if mode == 3 {
            world.structures.try_get_mut(sid)?.active = false;
            return move_resource_out(world, id, Resource::Bread);
        }
        world.structures.try_get_mut(sid)?.active = true;
        world.map.clear_agent(pos);
        let a = world.agents.try_get_mut(id)?;
        a.counter += 1500;
        a.state = AgentState::Baking { mode };
    }
    Ok(())
}

/// Litter growth odds per present herd size.
const BREEDING_PROB: [u16; 8] = [6000, 8000, 10000, 11000, 12000, 13000, 14000, 0];

pub(super) fn pigfarming(world: &mut World, id: AgentId) -> SimResult<()> {
    let AgentState::PigFarming { mut mode } = world.agents.try_get(id)?.state else {
        return Ok(());
    };
    let pos = world.agents.try_get(id)?.pos;
    let sid = structure_id_at(world, pos);

    if mode == 0 {
        if world.structures.try_get_mut(sid)?.use_resource_in_stock(0) {
            let tick = world.tick;
            let a = world.agents.try_get_mut(id)?;
            a.state = AgentState::PigFarming { mode: 1 };
            a.animation = 139;
            a.counter_from_animation();
            a.tick = tick;
            world.map.set_agent(pos, id);
        }
        return Ok(());
    }

    consume_ticks(world, id)?;
    while world.agents.try_get(id)?.counter < 0 {
        mode += 1;
        // The herd lives in the second stock slot.
        let pigs = world.structures.try_get(sid)?.stocks[1].available;
        if mode & 1 != 0 {
            if mode != 7 {
                world.map.set_agent(pos, id);
                let a = world.agents.try_get_mut(id)?;
                a.animation = 139;
                a.counter_from_animation();
            } else if pigs == 8
                || (pigs > 3
                    && ((20 * u32::from(world.rng.random())) >> 16) < u32::from(pigs))
            {
                world.structures.try_get_mut(sid)?.stocks[1].available -= 1;
                world.agents.try_get_mut(id)?.state = AgentState::PigFarming { mode };
                return move_resource_out(world, id, Resource::Pig);
            } else if world.rng.random() & 0xf != 0 {
                mode = 1;
                let tick = world.tick;
                let a = world.agents.try_get_mut(id)?;
                a.animation = 139;
                a.counter_from_animation();
                a.tick = tick;
                world.map.set_agent(pos, id);
            } else {
                mode = 0;
            }
            world.agents.try_get_mut(id)?.state = AgentState::PigFarming { mode };
            return Ok(());
        }

        world.map.clear_agent(pos);
        if pigs < 8
            && world.rng.random() < BREEDING_PROB[usize::from(pigs.saturating_sub(1))]
        {
            world.structures.try_get_mut(sid)?.stocks[1].available += 1;
        }
        let a = world.agents.try_get_mut(id)?;
        a.counter += 2048;
        a.state = AgentState::PigFarming { mode };
    }
    Ok(())
}

pub(super) fn butchering(world: &mut World, id: AgentId) -> SimResult<()> {
    let AgentState::Butchering { mode } = world.agents.try_get(id)?.state else {
        return Ok(());
    };
    let pos = world.agents.try_get(id)?.pos;
    let sid = structure_id_at(world, pos);

    if mode == 0 {
        if world.structures.try_get_mut(sid)?.use_resource_in_stock(0) {
            let tick = world.tick;
            let a = world.agents.try_get_mut(id)?;
            a.state = AgentState::Butchering { mode: 1 };
            a.animation = 140;
            a.counter_from_animation();
            a.tick = tick;
            world.map.set_agent(pos, id);
        }
    } else if consume_ticks(world, id)? < 0 {
        world.map.clear_agent(pos);
        move_resource_out(world, id, Resource::Meat)?;
    }
    Ok(())
}

pub(super) fn making_weapon(world: &mut World, id: AgentId) -> SimResult<()> {
    let AgentState::MakingWeapon { mut mode } = world.agents.try_get(id)?.state else {
        return Ok(());
    };
    let pos = world.agents.try_get(id)?.pos;
    let sid = structure_id_at(world, pos);

    if mode == 0 {
        // One load of coal and steel yields a sword and then a shield;
        // bit 0 of the working register marks the shield still owed.
        let s = world.structures.try_get_mut(sid)?;
        if s.progress & 1 == 0 && !use_resources_in_stocks(s) {
            return Ok(());
        }
        world.structures.try_get_mut(sid)?.active = true;
        let tick = world.tick;
        let a = world.agents.try_get_mut(id)?;
        a.state = AgentState::MakingWeapon { mode: 1 };
        a.animation = 143;
        a.counter_from_animation();
        a.tick = tick;
        world.map.set_agent(pos, id);
        return Ok(());
    }

    consume_ticks(world, id)?;
    while world.agents.try_get(id)?.counter < 0 {
        mode += 1;
        if mode == 7 {
            let s = world.structures.try_get_mut(sid)?;
            s.active = false;
            let res = if s.progress & 1 != 0 {
                Resource::Shield
            } else {
                Resource::Sword
            };
            s.progress ^= 1;
            world.map.clear_agent(pos);
            world.agents.try_get_mut(id)?.state = AgentState::MakingWeapon { mode };
            return move_resource_out(world, id, res);
        }
        let a = world.agents.try_get_mut(id)?;
        a.counter += 576;
        a.state = AgentState::MakingWeapon { mode };
    }
    Ok(())
}

pub(super) fn making_tool(world: &mut World, id: AgentId) -> SimResult<()> {
    let AgentState::MakingTool { mut mode } = world.agents.try_get(id)?.state else {
        return Ok(());
    };
    let pos = world.agents.try_get(id)?.pos;
    let player = world.agents.try_get(id)?.player;
    let sid = structure_id_at(world, pos);

    if mode == 0 {
        if use_resources_in_stocks(world.structures.try_get_mut(sid)?) {
            let tick = world.tick;
            let a = world.agents.try_get_mut(id)?;
            a.state = AgentState::MakingTool { mode: 1 };
            a.animation = 144;
            a.counter_from_animation();
            a.tick = tick;
            world.map.set_agent(pos, id);
        }
        return Ok(());
    }

    consume_ticks(world, id)?;
    while world.agents.try_get(id)?.counter < 0 {
        mode += 1;
        if mode == 4 {
            world.map.clear_agent(pos);

            // Draw the tool from the player's priority weights, or
            // uniformly when none are set.
            let prio = world.player(player)?.tool_prio;
            let total = prio.iter().map(|&v| u32::from(v) >> 4).sum::<u32>();
            let res = if total > 0 {
                let mut offset =
                    ((u64::from(total) * u64::from(world.rng.random())) >> 16) as i64;
                let mut pick = TOOLS[0];
                for (i, &w) in prio.iter().enumerate() {
                    offset -= i64::from(w >> 4);
                    if offset < 0 {
                        pick = TOOLS[i];
                        break;
                    }
                }
                pick
            } else {
                TOOLS[usize::from((9 * u32::from(world.rng.random()) >> 16) as u16)]
            };

            world.agents.try_get_mut(id)?.state = AgentState::MakingTool { mode };
            return move_resource_out(world, id, res);
        }
        let a = world.agents.try_get_mut(id)?;
        a.counter += 1536;
        a.state = AgentState::MakingTool { mode };
    }
    Ok(())
}

pub(super) fn building_boat(world: &mut World, id: AgentId) -> SimResult<()> {
    let AgentState::BuildingBoat { mut mode } = world.agents.try_get(id)?.state else {
        return Ok(());
    };
    let pos = world.agents.try_get(id)?.pos;
    let sid = structure_id_at(world, pos);

    if mode == 0 {
        let s = world.structures.try_get_mut(sid)?;
        if !s.use_resource_in_stock(0) {
            return Ok(());
        }
        s.progress = 0;
        let tick = world.tick;
        let a = world.agents.try_get_mut(id)?;
        a.state = AgentState::BuildingBoat { mode: 1 };
        a.animation = 146;
        a.counter_from_animation();
        a.tick = tick;
        world.map.set_agent(pos, id);
        return Ok(());
    }

    consume_ticks(world, id)?;
    while world.agents.try_get(id)?.counter < 0 {
        mode += 1;
        if mode == 9 {
            // The hull goes down to the node; wait for it to clear.
            let node_pos = world.map.moved(pos, Direction::DownRight);
            if world.map.agent_at(node_pos).is_some() {
                mode -= 1;
                let a = world.agents.try_get_mut(id)?;
                a.counter = 0;
                a.state = AgentState::BuildingBoat { mode };
            } else {
                world.structures.try_get_mut(sid)?.progress = 0;
                world.map.clear_agent(pos);
                world.agents.try_get_mut(id)?.state = AgentState::BuildingBoat { mode };
                return move_resource_out(world, id, Resource::Boat);
            }
        } else {
            world.structures.try_get_mut(sid)?.progress += 1;
            let a = world.agents.try_get_mut(id)?;
            a.animation = 145;
            a.counter += 1408;
            a.state = AgentState::BuildingBoat { mode };
        }
    }
    Ok(())
}

// ── Geology ───────────────────────────────────────────────────────────────────

pub(super) fn looking_for_geo_spot(world: &mut World, id: AgentId) -> SimResult<()> {
    let pos = world.agents.try_get(id)?.pos;
    let mut tries = 2;
    for _ in 0..8 {
        let index = usize::from((world.rng.random() >> 2) & 0x3f) + 1;
        let dest = world.map.pos_add_spirally(pos, index);
        match world.map.object(dest) {
            Object::None => {
                let mountain = world.map.terrain(dest).is_mountain()
                    || world
                        .map
                        .terrain(world.map.moved(dest, Direction::UpLeft))
                        .is_mountain();
                if mountain {
                    let (sx, sy) = SPIRAL_PATTERN[index];
                    let tick = world.tick;
                    let a = world.agents.try_get_mut(id)?;
                    a.state = AgentState::FreeWalking(FreeWalk {
                        dist_col:  sx,
                        dist_row:  sy,
                        neg_dist1: -sx,
                        neg_dist2: -sy,
                        flags:     0,
                    });
                    a.tick = tick;
                    return Ok(());
                }
            }
            Object::Sign(_) => {
                tries -= 1;
                if tries == 0 {
                    break;
                }
            }
            _ => {}
        }
    }

    // Surveyed out; go home.
    let a = world.agents.try_get_mut(id)?;
    a.state = AgentState::Walking {
        dir1: -2,
        dest: NodeId::INVALID,
        dir: 0,
        wait_counter: 0,
    };
    a.counter = 0;
    Ok(())
}

pub(super) fn sampling_geo_spot(world: &mut World, id: AgentId) -> SimResult<()> {
    consume_ticks(world, id)?;
    while world.agents.try_get(id)?.counter < 0 {
        let a = world.agents.try_get(id)?;
        let (pos, player) = (a.pos, a.player);
        let AgentState::SamplingGeoSpot(mut fw) = a.state else {
            return Ok(());
        };

        if fw.neg_dist1 == 0 && world.map.object(pos) == Object::None {
            let (mineral, amount) = world.map.mineral(pos);
            if mineral == Mineral::None || amount == 0 {
                world.map.set_object(
                    pos,
                    Object::Sign(SignKind::Empty),
                    Cell::NO_OBJECT_INDEX,
                );
            } else {
                fw.neg_dist1 = -1;
                let sign = SignKind::for_deposit(mineral, amount);
                world.map.set_object(pos, Object::Sign(sign), Cell::NO_OBJECT_INDEX);

                // Only the first sign in a cluster raises a notification.
                let mut fresh = true;
                for i in 0..60 {
                    let p = world.map.pos_add_spirally(pos, 1 + i);
                    if matches!(world.map.object(p), Object::Sign(k) if sign_mineral(k) == mineral)
                    {
                        fresh = false;
                        break;
                    }
                }
                if fresh {
                    world.player_mut(player)?.notify(Notification::DepositFound { pos });
                }

                let a = world.agents.try_get_mut(id)?;
                a.animation = 142;
                a.counter += 64;
                a.state = AgentState::SamplingGeoSpot(fw);
                continue;
            }
        }

        let a = world.agents.try_get_mut(id)?;
        a.state = AgentState::FreeWalking(FreeWalk {
            dist_col:  fw.dist_col,
            dist_row:  fw.dist_row,
            neg_dist1: -128,
            neg_dist2: 0,
            flags:     0,
        });
        a.counter = 0;
    }
    Ok(())
}
