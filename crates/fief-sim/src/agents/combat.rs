//! Knight combat: sieges on garrisons, the scripted duel, and the free
//! fights that break out between patrolling knights.
//!
//! A duel runs off a scripted move table: the attacker's state carries a
//! cursor into [`MOVES`], each entry picks a blow (or ends the fight at a
//! negative entry), and [`set_fight_outcome`] decides the winner up front
//! from rank and morale.  The defender's counter is slaved to the
//! attacker's so both sides animate in lockstep.

use fief_agent::{AgentState, DefendFree, Fight, FreeWalk};
use fief_core::{AgentId, Direction, SimResult, StructureId};
use fief_grid::Object;
use fief_structure::StructureKind;

use crate::World;
use crate::player::Notification;

use super::{consume_ticks, enter_building, leave_building, start_walking, structure_id_at};

/// Scripted duel sequences.  The starting cursor is drawn as `rng & 0x70`;
/// every run ends at a negative entry.
const MOVES: [i32; 125] = [
    1, 2, 4, 2, 0, 2, 4, 2, 1, 0, 2, 2, 3, 0, 0, -1,
    3, 2, 2, 3, 0, 4, 1, 3, 2, 4, 2, 2, 3, 0, 0, -1,
    2, 1, 4, 3, 2, 2, 2, 3, 0, 3, 1, 2, 0, 2, 0, -1,
    2, 1, 3, 2, 4, 2, 3, 0, 0, 4, 2, 0, 2, 1, 0, -1,
    3, 1, 0, 2, 2, 1, 0, 2, 4, 2, 2, 3, 0, 0, -1,
    0, 3, 1, 2, 3, 4, 2, 1, 2, 0, 2, 4, 0, 2, 0, -1,
    0, 2, 1, 2, 4, 2, 3, 0, 2, 4, 3, 2, 0, 0, -1,
    0, 0, 1, 4, 3, 2, 2, 1, 2, 0, 0, 4, 3, 0, -1,
];

/// Attacker/defender animation pairs per blow, packed as two nibbles.
const FIGHT_ANIM: [i32; 80] = [
    24, 35, 41, 56, 67, 72, 83, 89, 100, 121, 0, 0, 0, 0, 0, 0,
    26, 40, 42, 57, 73, 74, 88, 104, 106, 120, 122, 0, 0, 0, 0, 0,
    17, 18, 23, 33, 34, 38, 39, 98, 102, 103, 113, 114, 118, 119, 0, 0,
    130, 133, 134, 135, 147, 148, 161, 162, 164, 166, 167, 0, 0, 0, 0, 0,
    50, 52, 53, 70, 129, 131, 132, 146, 149, 151, 0, 0, 0, 0, 0, 0,
];

const FIGHT_ANIM_MAX: [i32; 5] = [10, 11, 14, 11, 10];

fn knight_rank(world: &World, id: AgentId) -> SimResult<i32> {
    Ok(i32::from(
        world.agents.try_get(id)?.profession.knight_rank().unwrap_or(0),
    ))
}

/// Decide the winner of a duel before it starts.  A knight's morale grows
/// with rank, and doubles on home ground; the loser's player pays the
/// rank's worth of military score.
fn set_fight_outcome(world: &mut World, attacker: AgentId, defender: AgentId) -> SimResult<()> {
    let morale_of = |world: &World, id: AgentId| -> SimResult<(u32, fief_core::PlayerId)> {
        let a = world.agents.try_get(id)?;
        let exp = 1u32 << a.profession.knight_rank().unwrap_or(0);
        let land = if world.map.is_owned_by(a.pos, a.player) {
            0x1000
        } else {
            world.player(a.player)?.knight_morale
        };
        Ok(((0x400 * exp * land) >> 16, a.player))
    };

    let (att_morale, att_player) = morale_of(world, attacker)?;
    let (def_morale, def_player) = morale_of(world, defender)?;

    let r = ((u64::from(att_morale + def_morale) * u64::from(world.rng.random())) >> 16) as u32;
    let attacker_won = r < att_morale;

    let (loser, loser_of) = if attacker_won {
        (def_player, defender)
    } else {
        (att_player, attacker)
    };
    let exp = 1u32 << knight_rank(world, loser_of)?;
    let p = world.player_mut(loser)?;
    p.total_military_score = p.total_military_score.saturating_sub(exp);

    let move_num = i32::from(world.rng.random() & 0x70);
    let a = world.agents.try_get_mut(attacker)?;
    match &mut a.state {
        AgentState::KnightAttacking(f) | AgentState::KnightAttackingFree(f) => {
            f.move_num = move_num;
            f.attacker_won = attacker_won;
        }
        _ => {}
    }
    Ok(())
}

/// The structure whose door cell the agent stands on, looking up-left.
fn besieged_structure(world: &World, pos: fief_grid::MapPos) -> Option<StructureId> {
    let up_left = world.map.moved(pos, Direction::UpLeft);
    match world.map.object(up_left) {
        Object::SmallStructure | Object::LargeStructure | Object::Castle => {
            Some(StructureId(world.map.object_index(up_left)))
        }
        _ => None,
    }
}

pub(super) fn engaging_building(world: &mut World, id: AgentId) -> SimResult<()> {
    if consume_ticks(world, id)? >= 0 {
        return Ok(());
    }
    let a = world.agents.try_get(id)?;
    let (pos, player) = (a.pos, a.player);

    if let Some(sid) = besieged_structure(world, pos) {
        if let Some(s) = world.structures.get(sid) {
            let defended = s.is_done()
                && (s.kind.is_military() || s.kind == StructureKind::Castle)
                && s.owner != player
                && s.main_agent != AgentId::INVALID;
            if defended {
                let (owner, s_pos, defender) = (s.owner, s.pos, s.main_agent);
                world
                    .player_mut(owner)?
                    .notify(Notification::UnderAttack { pos: s_pos, by: player });

                let a = world.agents.try_get_mut(id)?;
                a.counter = 0;
                a.animation = 168;
                a.state = AgentState::KnightPrepareAttacking(Fight {
                    move_num:     0,
                    attacker_won: false,
                    misc:         0,
                    opponent:     defender,
                });

                // Pop the garrison head and send it out the door.
                let next = world
                    .agents
                    .try_get(defender)?
                    .state
                    .next_knight()
                    .unwrap_or(AgentId::INVALID);
                let s = world.structures.try_get_mut(sid)?;
                s.main_agent = next;
                s.call_defender_out();

                let d = world.agents.try_get_mut(defender)?;
                d.state = AgentState::KnightLeaveForFight {
                    next: Box::new(AgentState::KnightPrepareDefending),
                };
                d.counter = 0;
                return Ok(());
            }
        }
    }

    // Nobody left to defend it.
    let tick = world.tick;
    let a = world.agents.try_get_mut(id)?;
    a.state = AgentState::KnightOccupyEnemyBuilding;
    a.animation = 179;
    a.counter_from_animation();
    a.tick = tick;
    Ok(())
}

pub(super) fn prepare_attacking(world: &mut World, id: AgentId) -> SimResult<()> {
    let AgentState::KnightPrepareAttacking(f) = world.agents.try_get(id)?.state else {
        return Ok(());
    };
    if !matches!(
        world.agents.try_get(f.opponent)?.state,
        AgentState::KnightPrepareDefending
    ) {
        return Ok(());
    }

    let tick = world.tick;
    let a = world.agents.try_get_mut(id)?;
    a.state = AgentState::KnightAttacking(f);
    a.counter = 0;
    a.tick = tick;

    let d = world.agents.try_get_mut(f.opponent)?;
    d.state = AgentState::KnightDefending;
    d.counter = 0;

    set_fight_outcome(world, id, f.opponent)
}

pub(super) fn leave_for_fight(world: &mut World, id: AgentId) -> SimResult<()> {
    let tick = world.tick;
    {
        let a = world.agents.try_get_mut(id)?;
        a.tick = tick;
        a.counter = 0;
    }
    let pos = world.agents.try_get(id)?.pos;
    let occupant = world.map.agent_at(pos);
    if occupant.is_none() || occupant == Some(id) {
        let AgentState::KnightLeaveForFight { next } = world.agents.try_get(id)?.state.clone()
        else {
            return Ok(());
        };
        leave_building(world, id, *next, true)?;
    }
    Ok(())
}

pub(super) fn prepare_defending(world: &mut World, id: AgentId) -> SimResult<()> {
    let a = world.agents.try_get_mut(id)?;
    a.counter = 0;
    a.animation = 84;
    Ok(())
}

pub(super) fn attacking(world: &mut World, id: AgentId) -> SimResult<()> {
    let (mut f, free) = match world.agents.try_get(id)?.state {
        AgentState::KnightAttacking(f) => (f, false),
        AgentState::KnightAttackingFree(f) => (f, true),
        _ => return Ok(()),
    };

    let tick = world.tick;
    let mut counter = {
        let a = world.agents.try_get_mut(id)?;
        let delta = tick.wrapping_sub(a.tick);
        a.tick = tick;
        a.counter -= i32::from(delta);
        a.counter
    };
    {
        let o = world.agents.try_get_mut(f.opponent)?;
        o.tick = tick;
        o.counter = counter;
    }

    while counter < 0 {
        let mv = MOVES[f.move_num as usize];
        if mv < 0 {
            let att_rank = knight_rank(world, id)?;
            if !f.attacker_won {
                // Defender won; the attacker falls.
                if free {
                    let df = match world.agents.try_get(f.opponent)?.state {
                        AgentState::KnightDefendingFree(df) => df,
                        _ => DefendFree::default(),
                    };
                    let o = world.agents.try_get_mut(f.opponent)?;
                    o.state = AgentState::KnightDefendingVictoryFree(df);
                    o.animation = 180;
                    o.counter = 0;

                    let a = world.agents.try_get_mut(id)?;
                    a.state = AgentState::KnightAttackingDefeatFree(f);
                    a.animation = 174 + att_rank;
                    a.counter = 255;
                } else {
                    enter_building(world, f.opponent, -1, true)?;

                    let a = world.agents.try_get_mut(id)?;
                    a.state = AgentState::KnightAttackingDefeat(f);
                    a.animation = 174 + att_rank;
                    a.counter = 255;
                }
            } else {
                // Attacker won; the defender falls.
                if free {
                    let df = match world.agents.try_get(f.opponent)?.state {
                        AgentState::KnightDefendingFree(df) => df,
                        _ => DefendFree::default(),
                    };
                    let a = world.agents.try_get_mut(id)?;
                    a.state = AgentState::KnightAttackingVictoryFree {
                        move_num: df.misc,
                        dist_col: df.other_dist_col,
                        dist_row: df.other_dist_row,
                        opponent: f.opponent,
                    };
                    a.animation = 168;
                    a.counter = 0;
                } else {
                    let def_pos = world.agents.try_get(f.opponent)?.pos;
                    if let Some(sid) = besieged_structure(world, def_pos) {
                        if let Some(s) = world.structures.get_mut(sid) {
                            s.requested_knight_lost();
                        }
                    }
                    let a = world.agents.try_get_mut(id)?;
                    a.state = AgentState::KnightAttackingVictory(f);
                    a.animation = 168;
                    a.counter = 0;
                }
                let o = world.agents.try_get_mut(f.opponent)?;
                o.tick = tick;
                o.animation = 169 + att_rank;
                o.counter = 255;
            }
            return Ok(());
        }

        // Next scripted blow.
        f.move_num += 1;
        let m = if f.attacker_won { mv } else { 4 - mv };
        f.misc = m;

        let off = (u32::from(world.rng.random()) * FIGHT_ANIM_MAX[m as usize] as u32) >> 16;
        let anim = FIGHT_ANIM[(m * 16 + off as i32) as usize];
        counter = 72 + i32::from(world.rng.random() & 0x18);

        let a = world.agents.try_get_mut(id)?;
        a.animation = 146 + ((anim >> 4) & 0xf);
        a.counter = counter;
        a.state = if free {
            AgentState::KnightAttackingFree(f)
        } else {
            AgentState::KnightAttacking(f)
        };

        let o = world.agents.try_get_mut(f.opponent)?;
        o.animation = 156 + (anim & 0xf);
        o.counter = counter;
    }
    Ok(())
}

pub(super) fn attacking_victory(world: &mut World, id: AgentId) -> SimResult<()> {
    let AgentState::KnightAttackingVictory(f) = world.agents.try_get(id)?.state else {
        return Ok(());
    };

    let tick = world.tick;
    let done = {
        let o = world.agents.try_get_mut(f.opponent)?;
        let delta = tick.wrapping_sub(o.tick);
        o.tick = tick;
        o.counter -= i32::from(delta);
        o.counter < 0
    };
    if done {
        world.agents.remove(f.opponent);

        let a = world.agents.try_get_mut(id)?;
        a.state = AgentState::KnightEngagingBuilding(Fight {
            move_num:     0,
            attacker_won: false,
            misc:         0,
            opponent:     AgentId::INVALID,
        });
        a.tick = tick;
        a.counter = 0;
    }
    Ok(())
}

pub(super) fn attacking_defeat(world: &mut World, id: AgentId) -> SimResult<()> {
    if consume_ticks(world, id)? < 0 {
        let pos = world.agents.try_get(id)?.pos;
        world.map.clear_agent(pos);
        world.agents.remove(id);
    }
    Ok(())
}

pub(super) fn occupy_enemy_building(world: &mut World, id: AgentId) -> SimResult<()> {
    consume_ticks(world, id)?;
    while world.agents.try_get(id)?.counter < 0 {
        let a = world.agents.try_get(id)?;
        let (pos, player) = (a.pos, a.player);

        if let Some(sid) = besieged_structure(world, pos) {
            if let Some(s) = world.structures.get(sid) {
                if !s.burning && (s.kind.is_military() || s.kind == StructureKind::Castle) {
                    if s.owner == player {
                        if s.kind == StructureKind::Castle {
                            return enter_building(world, id, -2, false);
                        }
                        if s.has_knight_room() {
                            return enter_building(world, id, -1, false);
                        }
                    } else if s.main_agent == AgentId::INVALID {
                        let was_castle = s.kind == StructureKind::Castle;
                        crate::commands::capture_structure(world, sid, player)?;
                        if was_castle {
                            // The keep falls; next pass decides where to go.
                            world.agents.try_get_mut(id)?.counter = 0;
                            return Ok(());
                        }
                        return enter_building(world, id, -1, false);
                    } else {
                        let a = world.agents.try_get_mut(id)?;
                        a.state = AgentState::KnightEngagingBuilding(Fight {
                            move_num:     0,
                            attacker_won: false,
                            misc:         0,
                            opponent:     AgentId::INVALID,
                        });
                        a.animation = 167;
                        a.counter = 191;
                        return Ok(());
                    }
                }
            }
        }

        let a = world.agents.try_get_mut(id)?;
        a.state = AgentState::Lost { mode: 0 };
        a.counter = 0;
    }
    Ok(())
}

pub(super) fn knight_free_walking(world: &mut World, id: AgentId) -> SimResult<()> {
    consume_ticks(world, id)?;
    while world.agents.try_get(id)?.counter < 0 {
        let a = world.agents.try_get(id)?;
        let (pos, player) = (a.pos, a.player);
        let AgentState::KnightFreeWalking(fw) = a.state else {
            return Ok(());
        };

        // An adjacent enemy knight means a fight on the spot.
        let mut engaged = false;
        for d in Direction::iter() {
            let other_pos = world.map.moved(pos, d);
            let Some(other) = world.map.agent_at(other_pos) else {
                continue;
            };
            if other == id {
                continue;
            }
            let o = world.agents.try_get(other)?;
            if o.player == player {
                continue;
            }
            let (o_prof, o_state) = (o.profession, o.state.clone());
            let spot = world.map.moved(other_pos, Direction::Left);

            match o_state {
                AgentState::KnightFreeWalking(ofw) if super::freewalk::can_pass(world, spot) => {
                    let a = world.agents.try_get_mut(id)?;
                    a.state = AgentState::KnightEngageDefendingFree(DefendFree {
                        dist_col:       fw.dist_col,
                        dist_row:       fw.dist_row,
                        misc:           1,
                        other_dist_col: ofw.dist_col,
                        other_dist_row: ofw.dist_row,
                    });
                    a.animation = 99;
                    a.counter = 255;

                    let o = world.agents.try_get_mut(other)?;
                    o.state = AgentState::KnightEngageAttackingFree(Fight {
                        move_num:     0,
                        attacker_won: false,
                        misc:         d.index() as i32,
                        opponent:     id,
                    });
                    engaged = true;
                }
                AgentState::Walking { dest, .. }
                    if o_prof.is_knight() && super::freewalk::can_pass(world, spot) =>
                {
                    let a = world.agents.try_get_mut(id)?;
                    a.state = AgentState::KnightEngageDefendingFree(DefendFree {
                        dist_col:       fw.dist_col,
                        dist_row:       fw.dist_row,
                        misc:           0,
                        other_dist_col: 0,
                        other_dist_row: 0,
                    });
                    a.animation = 99;
                    a.counter = 255;

                    // The garrison it was walking to loses its recruit.
                    if let Some(sid) = world.structure_at_node(dest) {
                        let s = world.structures.try_get_mut(sid)?;
                        if !s.kind.has_inventory() {
                            s.requested_knight_lost();
                        }
                    }

                    let o = world.agents.try_get_mut(other)?;
                    o.state = AgentState::KnightEngageAttackingFree(Fight {
                        move_num:     0,
                        attacker_won: false,
                        misc:         d.index() as i32,
                        opponent:     id,
                    });
                    engaged = true;
                }
                _ => {}
            }
            if engaged {
                return Ok(());
            }
        }

        super::freewalk::free_walking_common(world, id)?;
    }
    Ok(())
}

pub(super) fn engage_defending_free(world: &mut World, id: AgentId) -> SimResult<()> {
    consume_ticks(world, id)?;
    let a = world.agents.try_get_mut(id)?;
    while a.counter < 0 {
        a.counter += 256;
    }
    Ok(())
}

pub(super) fn engage_attacking_free(world: &mut World, id: AgentId) -> SimResult<()> {
    if consume_ticks(world, id)? >= 0 {
        return Ok(());
    }
    let AgentState::KnightEngageAttackingFree(f) = world.agents.try_get(id)?.state else {
        return Ok(());
    };
    let a = world.agents.try_get_mut(id)?;
    a.state = AgentState::KnightEngageAttackingFreeJoin(f);
    a.animation = 167;
    a.counter += 191;
    Ok(())
}

pub(super) fn engage_attacking_free_join(world: &mut World, id: AgentId) -> SimResult<()> {
    if consume_ticks(world, id)? >= 0 {
        return Ok(());
    }
    let AgentState::KnightEngageAttackingFreeJoin(f) = world.agents.try_get(id)?.state else {
        return Ok(());
    };

    {
        let a = world.agents.try_get_mut(id)?;
        a.state = AgentState::KnightPrepareAttackingFree(f);
        a.animation = 168;
        a.counter = 0;
    }

    let other_pos = world.agents.try_get(f.opponent)?.pos;
    let AgentState::KnightEngageDefendingFree(mut df) = world.agents.try_get(f.opponent)?.state
    else {
        return Ok(());
    };

    // The defender steps onto the fight spot; its memorized walk target
    // shifts by that step.
    let d = Direction::from_u8(f.misc as u8);
    match d {
        Direction::Right | Direction::DownRight => df.dist_col -= 1,
        Direction::Left | Direction::UpLeft => df.dist_col += 1,
        _ => {}
    }
    match d {
        Direction::DownRight | Direction::Down => df.dist_row -= 1,
        Direction::UpLeft | Direction::Up => df.dist_row += 1,
        _ => {}
    }
    {
        let o = world.agents.try_get_mut(f.opponent)?;
        o.state = AgentState::KnightPrepareDefendingFree(df);
        o.counter = 0;
    }
    start_walking(world, f.opponent, d, 32, false)?;
    world.map.clear_agent(other_pos);
    Ok(())
}

pub(super) fn prepare_attacking_free(world: &mut World, id: AgentId) -> SimResult<()> {
    let AgentState::KnightPrepareAttackingFree(f) = world.agents.try_get(id)?.state else {
        return Ok(());
    };
    let AgentState::KnightPrepareDefendingFreeWait(df) =
        world.agents.try_get(f.opponent)?.state
    else {
        return Ok(());
    };

    {
        let a = world.agents.try_get_mut(id)?;
        a.state = AgentState::KnightAttackingFree(f);
        a.counter = 0;
    }
    {
        let o = world.agents.try_get_mut(f.opponent)?;
        o.state = AgentState::KnightDefendingFree(df);
        o.counter = 0;
    }
    set_fight_outcome(world, id, f.opponent)
}

pub(super) fn prepare_defending_free(world: &mut World, id: AgentId) -> SimResult<()> {
    if consume_ticks(world, id)? >= 0 {
        return Ok(());
    }
    let AgentState::KnightPrepareDefendingFree(df) = world.agents.try_get(id)?.state else {
        return Ok(());
    };
    let a = world.agents.try_get_mut(id)?;
    a.state = AgentState::KnightPrepareDefendingFreeWait(df);
    a.counter = 0;
    Ok(())
}

pub(super) fn attacking_victory_free(world: &mut World, id: AgentId) -> SimResult<()> {
    let AgentState::KnightAttackingVictoryFree { move_num, dist_col, dist_row, opponent } =
        world.agents.try_get(id)?.state
    else {
        return Ok(());
    };

    let tick = world.tick;
    let done = {
        let o = world.agents.try_get_mut(opponent)?;
        let delta = tick.wrapping_sub(o.tick);
        o.tick = tick;
        o.counter -= i32::from(delta);
        o.counter < 0
    };
    if done {
        world.agents.remove(opponent);

        let a = world.agents.try_get_mut(id)?;
        a.state = AgentState::KnightAttackingFreeWait(FreeWalk {
            dist_col,
            dist_row,
            neg_dist1: 0,
            neg_dist2: 0,
            flags: i32::from(move_num != 0),
        });
        a.animation = 179;
        a.counter = 127;
        a.tick = tick;
    }
    Ok(())
}

pub(super) fn defending_victory_free(world: &mut World, id: AgentId) -> SimResult<()> {
    let a = world.agents.try_get_mut(id)?;
    a.animation = 180;
    a.counter = 0;
    Ok(())
}

pub(super) fn attacking_defeat_free(world: &mut World, id: AgentId) -> SimResult<()> {
    if consume_ticks(world, id)? >= 0 {
        return Ok(());
    }
    let AgentState::KnightAttackingDefeatFree(f) = world.agents.try_get(id)?.state else {
        return Ok(());
    };
    let pos = world.agents.try_get(id)?.pos;

    // The winner resumes its patrol from the body's cell.
    let df = match world.agents.try_get(f.opponent)?.state {
        AgentState::KnightDefendingVictoryFree(df) | AgentState::KnightDefendingFree(df) => df,
        _ => DefendFree::default(),
    };
    let tick = world.tick;
    let o = world.agents.try_get_mut(f.opponent)?;
    o.state = AgentState::KnightFreeWalking(FreeWalk {
        dist_col:  df.dist_col,
        dist_row:  df.dist_row,
        neg_dist1: 0,
        neg_dist2: 0,
        flags:     0,
    });
    o.animation = 179;
    o.counter = 0;
    o.tick = tick;

    world.map.set_agent(pos, f.opponent);
    world.agents.remove(id);
    Ok(())
}

pub(super) fn attacking_free_wait(world: &mut World, id: AgentId) -> SimResult<()> {
    if consume_ticks(world, id)? >= 0 {
        return Ok(());
    }
    let AgentState::KnightAttackingFreeWait(fw) = world.agents.try_get(id)?.state else {
        return Ok(());
    };
    let a = world.agents.try_get_mut(id)?;
    a.state = if fw.flags != 0 {
        AgentState::KnightFreeWalking(fw)
    } else {
        AgentState::Lost { mode: 0 }
    };
    a.counter = 0;
    Ok(())
}

pub(super) fn leave_for_walk_to_fight(world: &mut World, id: AgentId) -> SimResult<()> {
    let tick = world.tick;
    {
        let a = world.agents.try_get_mut(id)?;
        a.tick = tick;
        a.counter = 0;
    }
    let pos = world.agents.try_get(id)?.pos;

    if let Some(occupant) = world.map.agent_at(pos) {
        if occupant != id {
            let a = world.agents.try_get_mut(id)?;
            a.animation = 82;
            a.counter = 0;
            return Ok(());
        }
    }

    let door = world.map.moved(pos, Direction::DownRight);
    match world.map.agent_at(door) {
        None => {
            let AgentState::KnightLeaveForWalkToFight { next } =
                world.agents.try_get(id)?.state.clone()
            else {
                return Ok(());
            };
            leave_building(world, id, *next, false)
        }
        Some(other) => {
            let same_side =
                world.agents.try_get(other)?.player == world.agents.try_get(id)?.player;
            if same_side {
                let a = world.agents.try_get_mut(id)?;
                a.animation = 82;
                a.counter = 0;
                return Ok(());
            }

            // An enemy blocks the door; back onto guard duty instead.
            let sid = structure_id_at(world, pos);
            let s = world.structures.try_get_mut(sid)?;
            let old_head = s.main_agent;
            s.main_agent = id;
            s.defender_returned();
            let kind = s.kind;

            let a = world.agents.try_get_mut(id)?;
            a.state = match kind {
                StructureKind::Hut => AgentState::DefendingHut { next_knight: old_head },
                StructureKind::Tower => AgentState::DefendingTower { next_knight: old_head },
                StructureKind::Fortress => {
                    AgentState::DefendingFortress { next_knight: old_head }
                }
                _ => AgentState::DefendingCastle { next_knight: old_head },
            };
            a.counter = 6000;
            Ok(())
        }
    }
}

/// Garrisoned knights train towards the next rank; the odds per period
/// depend on the structure housing them.
pub(super) fn defending(world: &mut World, id: AgentId, params: [u16; 4]) -> SimResult<()> {
    let prof = world.agents.try_get(id)?.profession;
    let Some(rank) = prof.knight_rank() else {
        return Ok(());
    };
    if rank >= 4 {
        return Ok(());
    }
    let tick = world.tick;
    let mut rng = world.rng.clone();
    world
        .agents
        .try_get_mut(id)?
        .train_knight(tick, params[usize::from(rank)], &mut rng);
    world.rng = rng;
    Ok(())
}
