//! Per-structure progression: construction sites, stock request
//! priorities, worker call-ups, garrison staffing, burning remains.

use fief_agent::AgentState;
use fief_core::{AgentId, Direction, Profession, SimResult, StructureId};
use fief_structure::{Footprint, Inventory, StructureKind};

use crate::World;
use crate::player::Notification;
use crate::transport::{self, CallUp};

/// A distribution setting scaled down by how much is already on hand.
fn prio_shift(value: u16, shift: u32) -> u8 {
    u32::from(value).checked_shr(shift).unwrap_or(0) as u8
}

/// Advance every structure one step, ascending by ID.
pub(crate) fn update_structures(world: &mut World) -> SimResult<()> {
    let delta = world.tick_diff as u16;
    let ids: Vec<StructureId> = world.structures.ids().collect();
    for id in ids {
        let Some(s) = world.structures.get_mut(id) else {
            continue;
        };
        if s.burning {
            if s.burn_down(delta) {
                remove_remains(world, id)?;
            }
        } else if s.constructing {
            update_site(world, id)?;
        } else {
            update_operational(world, id)?;
        }
    }
    Ok(())
}

/// A burned-out structure's remains leave the world.
fn remove_remains(world: &mut World, id: StructureId) -> SimResult<()> {
    let Some(s) = world.structures.remove(id) else {
        return Ok(());
    };
    world.map.clear_object(s.pos);
    if let Some(node) = world.relays.get_mut(s.node) {
        if node.structure == Some(id) {
            node.structure         = None;
            node.accepts_resources = false;
            node.accepts_agents    = false;
            node.has_inventory     = false;
        }
    }
    Ok(())
}

// ── Construction sites ────────────────────────────────────────────────────────

fn update_site(world: &mut World, id: StructureId) -> SimResult<()> {
    let s = world.structures.try_get(id)?;
    let (kind, pos, node) = (s.kind, s.pos, s.node);
    let footprint = kind.construction_info().footprint;

    if footprint != Footprint::Small && s.progress == 0 {
        // The large site needs its ground leveled before a builder comes.
        if s.holder || s.agent_requested {
            return Ok(());
        }
        let target = world.map.height(pos);
        let need_leveling = (0..7).any(|i| {
            let p = world.map.pos_add_spirally(pos, i);
            world.map.height(p) != target
        });
        if need_leveling {
            if !world.structures.try_get(id)?.agent_request_fail
                && !transport::send_agent_to_node(
                    world,
                    node,
                    CallUp::Worker { prof: Profession::Digger },
                )?
            {
                world.structures.try_get_mut(id)?.agent_request_fail = true;
            }
            return Ok(());
        }
        world.structures.try_get_mut(id)?.progress = 1;
    }

    // Request a builder and keep construction material coming.
    let s = world.structures.try_get(id)?;
    if !s.agent_request_fail && !s.holder && !s.agent_requested {
        world.structures.try_get_mut(id)?.progress = 1;
        if !transport::send_agent_to_node(
            world,
            node,
            CallUp::Worker { prof: Profession::Builder },
        )? {
            world.structures.try_get_mut(id)?.agent_request_fail = true;
        }
    }

    let planks_construction = world.player(world.structures.try_get(id)?.owner)?.planks_construction;
    let s = world.structures.try_get_mut(id)?;
    let holder = s.holder;

    let total = s.stocks[0].total();
    s.stocks[0].prio = if total < s.stocks[0].maximum {
        let mut p = prio_shift(planks_construction, 8 + u32::from(total));
        if !holder {
            p >>= 2;
        }
        p & !1
    } else {
        0
    };

    let total = s.stocks[1].total();
    s.stocks[1].prio = if total < s.stocks[1].maximum {
        let mut p = prio_shift(0xff, u32::from(total));
        if !holder {
            p >>= 2;
        }
        p & !1
    } else {
        0
    };
    Ok(())
}

// ── Operational structures ────────────────────────────────────────────────────

fn update_operational(world: &mut World, id: StructureId) -> SimResult<()> {
    let s = world.structures.try_get(id)?;
    let (kind, node, owner) = (s.kind, s.node, s.owner);

    // Call the worker this kind needs to run.
    if let Some(prof) = kind.worker() {
        let s = world.structures.try_get(id)?;
        if !s.agent_request_fail
            && !s.holder
            && !s.agent_requested
            && !transport::send_agent_to_node(world, node, CallUp::Worker { prof })?
        {
            world.structures.try_get_mut(id)?.agent_request_fail = true;
        }
    }

    let p = world.player(owner)?;
    match kind {
        StructureKind::Boatbuilder => refresh_scaled(world, id, 0, p.planks_boatbuilder)?,
        StructureKind::StoneMine   => refresh_scaled(world, id, 0, p.food_stonemine)?,
        StructureKind::CoalMine    => refresh_scaled(world, id, 0, p.food_coalmine)?,
        StructureKind::IronMine    => refresh_scaled(world, id, 0, p.food_ironmine)?,
        StructureKind::GoldMine    => refresh_scaled(world, id, 0, p.food_goldmine)?,
        StructureKind::Butcher     => refresh_flat(world, id, 0)?,
        StructureKind::PigFarm     => refresh_scaled(world, id, 0, p.wheat_pigfarm)?,
        StructureKind::Mill        => refresh_scaled(world, id, 0, p.wheat_mill)?,
        StructureKind::Baker       => refresh_flat(world, id, 0)?,
        StructureKind::Sawmill     => refresh_flat(world, id, 1)?,
        StructureKind::SteelSmelter => {
            refresh_scaled(world, id, 0, p.coal_steelsmelter)?;
            refresh_flat(world, id, 1)?;
        }
        StructureKind::Toolmaker => {
            let (planks, steel) = (p.planks_toolmaker, p.steel_toolmaker);
            refresh_scaled(world, id, 0, planks)?;
            refresh_scaled(world, id, 1, steel)?;
        }
        StructureKind::WeaponSmith => {
            let (coal, steel) = (p.coal_weaponsmith, p.steel_weaponsmith);
            refresh_scaled(world, id, 0, coal)?;
            refresh_scaled(world, id, 1, steel)?;
        }
        StructureKind::GoldSmelter => {
            refresh_scaled(world, id, 0, p.coal_goldsmelter)?;
            refresh_flat(world, id, 1)?;
        }
        StructureKind::Stock  => update_stock(world, id)?,
        StructureKind::Castle => update_castle(world, id)?,
        StructureKind::Hut | StructureKind::Tower | StructureKind::Fortress => {
            update_military(world, id)?;
        }
        _ => {}
    }
    Ok(())
}

/// Stock request priority scaled by the player's distribution setting.
fn refresh_scaled(world: &mut World, id: StructureId, i: usize, base: u16) -> SimResult<()> {
    let s = world.structures.try_get_mut(id)?;
    if !s.holder {
        return Ok(());
    }
    let total = s.stocks[i].total();
    s.stocks[i].prio = if total < s.stocks[i].maximum {
        prio_shift(base, 8 + u32::from(total))
    } else {
        0
    };
    Ok(())
}

/// Full-strength stock request priority, damped only by what is already
/// on hand or en route.
fn refresh_flat(world: &mut World, id: StructureId, i: usize) -> SimResult<()> {
    let s = world.structures.try_get_mut(id)?;
    if !s.holder {
        return Ok(());
    }
    let total = s.stocks[i].total();
    s.stocks[i].prio = if total < s.stocks[i].maximum {
        prio_shift(0xff, u32::from(total))
    } else {
        0
    };
    Ok(())
}

// ── Stocks and the castle ─────────────────────────────────────────────────────

/// A completed stock opens its inventory once, then keeps itself staffed.
fn update_stock(world: &mut World, id: StructureId) -> SimResult<()> {
    let s = world.structures.try_get(id)?;
    let (node, owner, pos) = (s.node, s.owner, s.pos);

    if !s.active {
        let s = world.structures.try_get_mut(id)?;
        s.inventory = Some(Box::new(Inventory::new(owner, id, node)));
        s.stocks[0].available = 0xff;
        s.stocks[0].requested = 0xff;
        s.stocks[1].available = 0xff;
        s.stocks[1].requested = 0xff;
        s.active = true;

        let n = world.relays.try_get_mut(node)?;
        n.has_inventory     = true;
        n.accepts_resources = true;
        n.accepts_agents    = true;

        world.player_mut(owner)?.notify(Notification::NewStock { pos });
        return Ok(());
    }

    if !s.agent_request_fail && !s.holder && !s.agent_requested {
        transport::send_agent_to_node(
            world,
            node,
            CallUp::Worker { prof: Profession::Transporter },
        )?;
    }

    request_generic_topup(world, id)?;
    Ok(())
}

/// An inventory that is open, settled and out of untrained agents calls
/// one in from elsewhere, rate limited per player.
fn request_generic_topup(world: &mut World, id: StructureId) -> SimResult<()> {
    let s = world.structures.try_get(id)?;
    let (node, owner, holder) = (s.node, s.owner, s.holder);
    let starved = s
        .inventory
        .as_deref()
        .is_some_and(|inv| !inv.have_any_out_mode() && inv.free_agent_count() == 0);
    if holder && starved && world.player_mut(owner)?.tick_send_generic_delay() {
        transport::send_agent_to_node(world, node, CallUp::Worker { prof: Profession::Generic })?;
    }
    Ok(())
}

/// The castle garrison: keep the wanted headcount, rotate ranks through
/// the queue, and keep the inventory stocked with untrained agents.
fn update_castle(world: &mut World, id: StructureId) -> SimResult<()> {
    let s = world.structures.try_get(id)?;
    let owner = s.owner;
    let head = s.main_agent;
    let p = world.player(owner)?;
    let (knights, wanted) = (p.castle_knights, p.castle_knights_wanted);

    if knights == wanted {
        rotate_castle_garrison(world, head)?;
    } else if knights < wanted {
        enlist_castle_knight(world, id)?;
    } else {
        // Head of the queue goes back to the pool.
        world.player_mut(owner)?.castle_knights -= 1;
        if head.is_valid() {
            let next = world
                .agents
                .try_get(head)?
                .state
                .next_knight()
                .unwrap_or(AgentId::INVALID);
            world.structures.try_get_mut(id)?.main_agent = next;
            let prof = world.agents.try_get(head)?.profession;
            world.agents.try_get_mut(head)?.state = AgentState::IdleInStock { inventory: id };
            if let Some(inv) = world.structures.try_get_mut(id)?.inventory.as_mut() {
                inv.agent_in(prof);
            }
        }
    }

    request_generic_topup(world, id)?;
    Ok(())
}

/// Swap the weakest guard's rank with the rear of the queue so training
/// time spreads over the garrison.
fn rotate_castle_garrison(world: &mut World, head: AgentId) -> SimResult<()> {
    let mut weakest: Option<AgentId> = None;
    let mut last: Option<AgentId> = None;
    let mut cursor = head;
    while cursor.is_valid() {
        let agent = world.agents.try_get(cursor)?;
        if weakest.is_none_or(|w| {
            world.agents.get(w).is_some_and(|b| agent.profession < b.profession)
        }) {
            weakest = Some(cursor);
        }
        last = Some(cursor);
        cursor = agent.state.next_knight().unwrap_or(AgentId::INVALID);
    }

    if let (Some(a), Some(b)) = (weakest, last) {
        if a != b {
            if let Some((wa, wb)) = world.agents.get_pair_mut(a, b) {
                std::mem::swap(&mut wa.profession, &mut wb.profession);
            }
        }
    }
    Ok(())
}

/// Move one more knight onto castle duty, arming a generic agent when no
/// trained one is parked, else calling one in from another inventory.
fn enlist_castle_knight(world: &mut World, id: StructureId) -> SimResult<()> {
    let s = world.structures.try_get(id)?;
    let (node, owner) = (s.node, s.owner);
    let head = s.main_agent;

    let ranks = [
        Profession::Knight4,
        Profession::Knight3,
        Profession::Knight2,
        Profession::Knight1,
        Profession::Knight0,
    ];
    let (pick, can_arm) = {
        let Some(inv) = s.inventory.as_deref() else {
            return Ok(());
        };
        (
            ranks.into_iter().find(|&k| inv.have_agent(k)),
            inv.can_specialize(Profession::Knight0),
        )
    };

    let (prof, pause) = match pick {
        Some(k) => (k, true),
        None if can_arm => (Profession::Knight0, false),
        None => {
            if world.player_mut(owner)?.tick_send_knight_delay() {
                transport::send_agent_to_node(world, node, CallUp::Knight { min_rank: 0 })?;
            }
            return Ok(());
        }
    };

    {
        let s = world.structures.try_get_mut(id)?;
        let Some(inv) = s.inventory.as_mut() else {
            return Ok(());
        };
        if !inv.have_agent(prof) && !inv.specialize_agent(prof) {
            return Ok(());
        }
        if !inv.call_agent_internal(prof) {
            return Ok(());
        }
    }
    let Some(agent) = transport::select_parked_entity(world, id, prof) else {
        return Ok(());
    };
    let a = world.agents.try_get_mut(agent)?;
    a.state = AgentState::DefendingCastle { next_knight: head };
    if pause {
        a.counter = 6000;
    }
    world.structures.try_get_mut(id)?.main_agent = agent;
    world.player_mut(owner)?.castle_knights += 1;
    Ok(())
}

// ── Garrisons ─────────────────────────────────────────────────────────────────

/// Keep a hut, tower or fortress staffed to the player's occupation
/// setting and its gold coming.
fn update_military(world: &mut World, id: StructureId) -> SimResult<()> {
    let s = world.structures.try_get(id)?;
    let (kind, pos, node, owner, threat) = (s.kind, s.pos, s.node, s.owner, s.threat_level);
    let level = world.player(owner)?.occupation_level(threat);
    let needed = kind.needed_occupants(level);
    let max_gold = kind.max_gold();

    let total = s.stocks[0].total();
    let present = s.knight_count();

    if total < needed {
        if !s.agent_request_fail
            && !transport::send_agent_to_node(world, node, CallUp::Knight { min_rank: 0 })?
        {
            world.structures.try_get_mut(id)?.agent_request_fail = true;
        }
    } else if needed < present {
        let door = world.map.moved(pos, Direction::DownRight);
        if world.map.agent_at(door).is_none() {
            evict_weakest_knight(world, id)?;
        }
    }

    let s = world.structures.try_get_mut(id)?;
    if s.holder {
        let total_gold = s.stocks[1].total();
        s.stocks[1].prio = if total_gold < max_gold {
            ((prio_shift(0xfe, u32::from(total_gold)) as u16 + 1) & 0xfe) as u8
        } else {
            0
        };
        world.player_mut(owner)?.military_max_gold += u32::from(max_gold);
    }
    Ok(())
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

/// The least trained guard leaves for the nearest inventory.
fn evict_weakest_knight(world: &mut World, id: StructureId) -> SimResult<()> {
    let s = world.structures.try_get(id)?;
    let (head, node) = (s.main_agent, s.node);

    let mut weakest: Option<AgentId> = None;
    let mut cursor = head;
    while cursor.is_valid() {
        let agent = world.agents.try_get(cursor)?;
        if weakest.is_none_or(|w| {
            world.agents.get(w).is_some_and(|b| agent.profession < b.profession)
        }) {
            weakest = Some(cursor);
        }
        cursor = agent.state.next_knight().unwrap_or(AgentId::INVALID);
    }
    let Some(leaving) = weakest else {
        return Ok(());
    };

    // Unlink from the garrison queue.
    let leaving_next = world
        .agents
        .try_get(leaving)?
        .state
        .next_knight()
        .unwrap_or(AgentId::INVALID);
    if leaving == head {
        world.structures.try_get_mut(id)?.main_agent = leaving_next;
    } else {
        let mut cursor = head;
        while cursor.is_valid() {
            let next = world
                .agents
                .try_get(cursor)?
                .state
                .next_knight()
                .unwrap_or(AgentId::INVALID);
            if next == leaving {
                set_next_knight(&mut world.agents.try_get_mut(cursor)?.state, leaving_next);
                break;
            }
            cursor = next;
        }
    }

    world.structures.try_get_mut(id)?.stocks[0].available -= 1;

    let home = transport::find_nearest_inventory_for_agent(world, node);
    let next = match home {
        Some(dest) => AgentState::Walking { dir1: -2, dest, dir: 0, wait_counter: 0 },
        None => AgentState::Lost { mode: 0 },
    };
    world.agents.try_get_mut(leaving)?.state =
        AgentState::ReadyToLeave { next: Box::new(next) };
    Ok(())
}
