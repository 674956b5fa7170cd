use fief_agent::{Agent, AgentState, DefendFree, Fight, FreeWalk};
use fief_core::{AgentId, Direction, NodeId, PlayerId, Profession, Resource, SimConfig, StructureId};
use fief_grid::{Geometry, MapPos, Object, Terrain};
use fief_relay::road_length_class;
use fief_structure::{StockMode, StructureKind};

use crate::World;
use crate::commands::{self, CommandError};
use crate::player::Notification;

mod helpers {
    use super::*;

    pub const P0: PlayerId = PlayerId(0);
    pub const P1: PlayerId = PlayerId(1);

    pub fn world() -> World {
        let geom = Geometry::new(64, 64).unwrap();
        World::new(geom, 2, SimConfig { game_speed: 2, seed: 0x5eed })
    }

    /// A world with player 0's castle at (16, 16).
    pub fn founded() -> (World, StructureId, MapPos) {
        let mut w = world();
        let pos = w.map.pos(16, 16);
        let sid = commands::build_castle(&mut w, pos, P0).unwrap();
        (w, sid, pos)
    }

    pub fn door_of(w: &World, pos: MapPos) -> MapPos {
        w.map.moved(pos, Direction::DownRight)
    }

    /// Stake a flag `cols` cells right of the castle door and lay the
    /// road to it.  Returns the flag's node.
    pub fn flag_right_of_door(w: &mut World, door: MapPos, cols: usize) -> NodeId {
        let pos = w.map.pos_add(door, cols as i32, 0);
        let node = commands::build_flag(w, pos, P0).unwrap();
        let dirs = vec![Direction::Right; cols];
        commands::build_road(w, door, &dirs, P0).unwrap();
        node
    }
}

mod founding {
    use super::helpers::*;
    use super::*;

    #[test]
    fn castle_opens_the_fief() {
        let (w, sid, pos) = founded();
        let door = door_of(&w, pos);

        assert!(w.player(P0).unwrap().has_castle);
        assert_eq!(w.map.object(pos), Object::Castle);
        assert!(w.map.has_flag(door));
        assert!(w.map.has_path(pos, Direction::DownRight));
        assert!(w.map.has_path(door, Direction::UpLeft));

        let s = w.structures.get(sid).unwrap();
        assert!(s.is_done());
        assert!(s.active);
        let inv = s.inventory.as_deref().unwrap();
        assert_eq!(inv.count_of(Resource::Plank), 40);
        assert_eq!(inv.count_of(Resource::Sword), 60);
        // Starting gold (4 ore + 2 bars) is counted into the world total.
        assert_eq!(w.gold_total, 6);

        let node = w.relays.at_pos(door).unwrap();
        let n = w.relays.get(node).unwrap();
        assert!(n.has_inventory && n.accepts_resources && n.accepts_agents);
        assert_eq!(n.structure, Some(sid));
    }

    #[test]
    fn castle_claims_the_surrounding_land() {
        let (w, _, pos) = founded();
        assert_eq!(w.map.owner(pos), Some(P0));
        assert_eq!(w.map.owner(w.map.pos_add(pos, 5, 0)), Some(P0));
        assert_eq!(w.map.owner(w.map.pos_add(pos, 12, 0)), None);
    }

    #[test]
    fn one_castle_per_player() {
        let (mut w, _, pos) = founded();
        let second = w.map.pos(40, 16);
        assert!(matches!(
            commands::build_castle(&mut w, second, P0),
            Err(CommandError::CastleExists)
        ));
        // The founded one still stands.
        assert_eq!(w.map.object(pos), Object::Castle);
    }

    #[test]
    fn claimed_land_refuses_a_rival_castle() {
        let (mut w, _, pos) = founded();
        let inside = w.map.pos_add(pos, 6, 0);
        assert!(matches!(
            commands::build_castle(&mut w, inside, P1),
            Err(CommandError::Occupied)
        ));
    }
}

mod nodes {
    use super::helpers::*;
    use super::*;

    #[test]
    fn flag_needs_own_land() {
        let (mut w, _, _) = founded();
        let far = w.map.pos(40, 40);
        assert!(matches!(
            commands::build_flag(&mut w, far, P0),
            Err(CommandError::NotOwned)
        ));
    }

    #[test]
    fn flags_keep_their_distance() {
        let (mut w, _, pos) = founded();
        let next_to_door = w.map.pos_add(door_of(&w, pos), 1, 0);
        assert!(matches!(
            commands::build_flag(&mut w, next_to_door, P0),
            Err(CommandError::AdjacentNode)
        ));
    }

    #[test]
    fn flag_is_staked_and_registered() {
        let (mut w, _, pos) = founded();
        let p = w.map.pos_add(pos, 4, 0);
        let node = commands::build_flag(&mut w, p, P0).unwrap();
        assert!(w.map.has_flag(p));
        assert_eq!(w.relays.at_pos(p), Some(node));
        assert_eq!(w.relays.get(node).unwrap().owner, P0);
    }

    #[test]
    fn demolished_flag_books_stranded_resources_as_lost() {
        let (mut w, _, pos) = founded();
        let p = w.map.pos_add(pos, 4, 0);
        commands::build_flag(&mut w, p, P0).unwrap();
        {
            let node = w.relays.at_pos(p).unwrap();
            let n = w.relays.get_mut(node).unwrap();
            n.drop_resource(Resource::Coal, NodeId::INVALID);
            n.drop_resource(Resource::Coal, NodeId::INVALID);
        }
        assert_eq!(w.resource_census(Resource::Coal), 22);

        commands::demolish_flag(&mut w, p, P0).unwrap();
        assert!(!w.map.has_flag(p));
        assert!(w.relays.at_pos(p).is_none());
        assert_eq!(w.lost_resources[Resource::Coal.index()], 2);
        // The units moved to the ledger; nothing vanished.
        assert_eq!(w.resource_census(Resource::Coal), 22);
    }
}

mod roads {
    use super::helpers::*;
    use super::*;

    #[test]
    fn road_links_both_ends() {
        let (mut w, _, pos) = founded();
        let door = door_of(&w, pos);
        let node = flag_right_of_door(&mut w, door, 3);
        let door_node = w.relays.at_pos(door).unwrap();

        for i in 0..3 {
            assert!(w.map.has_path(w.map.pos_add(door, i, 0), Direction::Right));
        }
        let out = w.relays.get(door_node).unwrap().link(Direction::Right).unwrap();
        assert_eq!(out.other_node, node);
        assert_eq!(out.other_end_dir, Direction::Left);
        assert_eq!(out.length_class, road_length_class(3));
        let back = w.relays.get(node).unwrap().link(Direction::Left).unwrap();
        assert_eq!(back.other_node, door_node);
        assert_eq!(back.other_end_dir, Direction::Right);
    }

    #[test]
    fn road_must_end_at_a_node() {
        let (mut w, _, pos) = founded();
        let door = door_of(&w, pos);
        assert!(matches!(
            commands::build_road(&mut w, door, &[Direction::Right; 3], P0),
            Err(CommandError::MissingNode)
        ));
    }

    #[test]
    fn road_cannot_cross_a_road() {
        let (mut w, _, pos) = founded();
        let door = door_of(&w, pos);
        flag_right_of_door(&mut w, door, 4);

        // A second course through the middle of the first.
        let p = w.map.pos_add(door, 2, -2);
        commands::build_flag(&mut w, p, P0).unwrap();
        assert!(matches!(
            commands::build_road(&mut w, p, &[Direction::Down; 4], P0),
            Err(CommandError::BadRoad)
        ));
    }

    #[test]
    fn land_and_water_do_not_mix() {
        let (mut w, _, pos) = founded();
        let door = door_of(&w, pos);
        for i in 2..=4 {
            let p = w.map.pos_add(door, i, 0);
            w.map.set_terrain(p, Terrain::Water0);
        }
        assert!(matches!(
            commands::can_build_road(&w, door, &[Direction::Right; 4], P0),
            Err(CommandError::MixedRoad)
        ));
    }

    #[test]
    fn splitting_redistributes_the_links() {
        let (mut w, _, pos) = founded();
        let door = door_of(&w, pos);
        let far = flag_right_of_door(&mut w, door, 7);
        let door_node = w.relays.at_pos(door).unwrap();

        let mid_pos = w.map.pos_add(door, 4, 0);
        let mid = commands::build_flag(&mut w, mid_pos, P0).unwrap();

        let a = w.relays.get(door_node).unwrap().link(Direction::Right).unwrap();
        assert_eq!(a.other_node, mid);
        assert_eq!(a.length_class, road_length_class(4));
        let b = w.relays.get(mid).unwrap().link(Direction::Left).unwrap();
        assert_eq!(b.other_node, door_node);
        let c = w.relays.get(mid).unwrap().link(Direction::Right).unwrap();
        assert_eq!(c.other_node, far);
        assert_eq!(c.length_class, road_length_class(3));
        let d = w.relays.get(far).unwrap().link(Direction::Left).unwrap();
        assert_eq!(d.other_node, mid);
        assert_eq!(d.other_end_dir, Direction::Right);
    }

    #[test]
    fn removing_the_middle_node_merges_back() {
        let (mut w, _, pos) = founded();
        let door = door_of(&w, pos);
        let far = flag_right_of_door(&mut w, door, 7);
        let door_node = w.relays.at_pos(door).unwrap();
        let mid_pos = w.map.pos_add(door, 4, 0);
        commands::build_flag(&mut w, mid_pos, P0).unwrap();

        commands::demolish_flag(&mut w, mid_pos, P0).unwrap();
        assert!(!w.map.has_flag(mid_pos));
        assert!(w.relays.at_pos(mid_pos).is_none());
        // The cell is a plain road cell again.
        assert!(w.map.has_path(mid_pos, Direction::Right));
        assert!(w.map.has_path(mid_pos, Direction::Left));

        let a = w.relays.get(door_node).unwrap().link(Direction::Right).unwrap();
        assert_eq!(a.other_node, far);
        assert_eq!(a.other_end_dir, Direction::Left);
        assert_eq!(a.length_class, road_length_class(7));
        let b = w.relays.get(far).unwrap().link(Direction::Left).unwrap();
        assert_eq!(b.other_node, door_node);
    }

    #[test]
    fn demolishing_a_road_detaches_both_ends() {
        let (mut w, _, pos) = founded();
        let door = door_of(&w, pos);
        let far = flag_right_of_door(&mut w, door, 3);
        let door_node = w.relays.at_pos(door).unwrap();

        let mid = w.map.pos_add(door, 1, 0);
        commands::demolish_road(&mut w, mid, P0).unwrap();

        for i in 0..3 {
            assert!(!w.map.has_path(w.map.pos_add(door, i, 0), Direction::Right));
        }
        assert!(w.relays.get(door_node).unwrap().link(Direction::Right).is_none());
        assert!(w.relays.get(far).unwrap().link(Direction::Left).is_none());
    }

    #[test]
    fn junction_node_is_not_demolishable() {
        let (mut w, _, pos) = founded();
        let door = door_of(&w, pos);
        flag_right_of_door(&mut w, door, 3);
        let hub = w.map.pos_add(door, 3, 0);

        let below = w.map.pos_add(hub, 0, 3);
        commands::build_flag(&mut w, below, P0).unwrap();
        commands::build_road(&mut w, hub, &[Direction::Down; 3], P0).unwrap();
        let right = w.map.pos_add(hub, 3, 0);
        commands::build_flag(&mut w, right, P0).unwrap();
        commands::build_road(&mut w, hub, &[Direction::Right; 3], P0).unwrap();

        assert!(matches!(
            commands::demolish_flag(&mut w, hub, P0),
            Err(CommandError::NotDemolishable)
        ));
    }

    #[test]
    fn door_node_is_protected() {
        let (mut w, _, pos) = founded();
        let door = door_of(&w, pos);
        assert!(matches!(
            commands::demolish_flag(&mut w, door, P0),
            Err(CommandError::NotDemolishable)
        ));
    }
}

mod construction {
    use super::helpers::*;
    use super::*;

    #[test]
    fn site_is_staked_with_its_door_node() {
        let (mut w, _, castle) = founded();
        let p = w.map.pos_add(castle, 0, 4);
        let sid = commands::build_structure(&mut w, p, StructureKind::Hut, P0).unwrap();

        assert_eq!(w.map.object(p), Object::SmallStructure);
        let door = door_of(&w, p);
        assert!(w.map.has_flag(door));
        assert!(w.map.has_path(p, Direction::DownRight));
        assert!(w.map.has_path(door, Direction::UpLeft));

        let s = w.structures.get(sid).unwrap();
        assert!(s.constructing);
        let node = w.relays.at_pos(door).unwrap();
        assert_eq!(s.node, node);
        assert_eq!(w.relays.get(node).unwrap().structure, Some(sid));
    }

    #[test]
    fn military_structures_keep_their_distance() {
        let (mut w, _, castle) = founded();
        let first = w.map.pos_add(castle, 0, 4);
        commands::build_structure(&mut w, first, StructureKind::Hut, P0).unwrap();
        let close = w.map.pos_add(castle, 2, 4);
        assert!(matches!(
            commands::build_structure(&mut w, close, StructureKind::Hut, P0),
            Err(CommandError::Occupied)
        ));
    }

    #[test]
    fn mines_want_mountainside() {
        let (mut w, _, castle) = founded();
        let p = w.map.pos_add(castle, -4, 0);
        assert!(matches!(
            commands::build_structure(&mut w, p, StructureKind::CoalMine, P0),
            Err(CommandError::BadTerrain)
        ));

        for q in [
            p,
            w.map.moved(p, Direction::Left),
            w.map.moved(p, Direction::UpLeft),
            w.map.moved(p, Direction::Up),
        ] {
            w.map.set_terrain(q, Terrain::Tundra0);
        }
        commands::build_structure(&mut w, p, StructureKind::CoalMine, P0).unwrap();
        assert_eq!(w.map.object(p), Object::SmallStructure);
    }

    #[test]
    fn no_building_on_foreign_land() {
        let (mut w, _, castle) = founded();
        let rival = w.map.pos(48, 48);
        commands::build_castle(&mut w, rival, P1).unwrap();
        let inside_p0 = w.map.pos_add(castle, 0, 4);
        assert!(matches!(
            commands::build_structure(&mut w, inside_p0, StructureKind::Hut, P1),
            Err(CommandError::NotOwned)
        ));
    }

    #[test]
    fn castle_goes_through_its_own_command() {
        let (mut w, _, castle) = founded();
        let p = w.map.pos_add(castle, 0, 4);
        assert!(matches!(
            commands::build_structure(&mut w, p, StructureKind::Castle, P0),
            Err(CommandError::BadTarget)
        ));
    }
}

mod demolition {
    use super::helpers::*;
    use super::*;

    #[test]
    fn site_demolition_cuts_it_from_the_network() {
        let (mut w, _, castle) = founded();
        let p = w.map.pos_add(castle, 0, 4);
        let sid = commands::build_structure(&mut w, p, StructureKind::Hut, P0).unwrap();
        let door = door_of(&w, p);

        commands::demolish_structure(&mut w, p, P0).unwrap();
        let s = w.structures.get(sid).unwrap();
        assert!(s.burning);
        assert!(!w.map.has_path(p, Direction::DownRight));
        // The roadless door flag went with it.
        assert!(!w.map.has_flag(door));
        assert!(w.relays.at_pos(door).is_none());
    }

    #[test]
    fn burning_remains_cannot_burn_again() {
        let (mut w, _, castle) = founded();
        let p = w.map.pos_add(castle, 0, 4);
        commands::build_structure(&mut w, p, StructureKind::Hut, P0).unwrap();
        commands::demolish_structure(&mut w, p, P0).unwrap();
        assert!(matches!(
            commands::demolish_structure(&mut w, p, P0),
            Err(CommandError::Burning)
        ));
    }

    #[test]
    fn castle_demolition_moves_the_stores_to_the_ledger() {
        let (mut w, _, castle) = founded();
        assert_eq!(w.resource_census(Resource::Plank), 40);

        commands::demolish_structure(&mut w, castle, P0).unwrap();
        assert_eq!(w.lost_resources[Resource::Plank.index()], 40);
        assert_eq!(w.resource_census(Resource::Plank), 40);
        assert_eq!(w.gold_total, 0);
        let p = w.player(P0).unwrap();
        assert!(!p.has_castle);
        assert_eq!(p.castle_score, -1);
    }

    #[test]
    fn only_the_owner_may_demolish() {
        let (mut w, _, castle) = founded();
        assert!(matches!(
            commands::demolish_structure(&mut w, castle, P1),
            Err(CommandError::NotOwned)
        ));
    }
}

mod stock_control {
    use super::helpers::*;
    use super::*;

    #[test]
    fn transport_priority_is_written_through() {
        let (mut w, _, _) = founded();
        commands::set_transport_priority(&mut w, P0, Resource::Coal, 26).unwrap();
        assert_eq!(w.player(P0).unwrap().flag_prio[Resource::Coal.index()], 26);
    }

    #[test]
    fn stopping_an_inventory_unbinds_inbound_resources() {
        let (mut w, sid, castle) = founded();
        let door = door_of(&w, castle);
        let node = w.relays.at_pos(door).unwrap();
        let carrier = w.agents.add(Agent::new(
            Profession::Transporter,
            P0,
            w.map.pos(20, 20),
            AgentState::Transporting {
                resource: Some(Resource::Coal),
                dest: node,
                dir: 0,
                wait_counter: 0,
            },
        ));

        commands::set_inventory_resource_mode(&mut w, sid, P0, StockMode::Stop).unwrap();
        assert!(!w.relays.get(node).unwrap().accepts_resources);
        let state = &w.agents.get(carrier).unwrap().state;
        assert!(matches!(
            state,
            AgentState::Transporting { dest, .. } if !dest.is_valid()
        ));
    }

    #[test]
    fn reopening_accepts_again() {
        let (mut w, sid, castle) = founded();
        let door = door_of(&w, castle);
        let node = w.relays.at_pos(door).unwrap();
        commands::set_inventory_agent_mode(&mut w, sid, P0, StockMode::Stop).unwrap();
        assert!(!w.relays.get(node).unwrap().accepts_agents);
        commands::set_inventory_agent_mode(&mut w, sid, P0, StockMode::In).unwrap();
        assert!(w.relays.get(node).unwrap().accepts_agents);
    }
}

mod dispatch {
    use super::helpers::*;
    use super::*;

    #[test]
    fn spawned_agents_park_in_the_inventory() {
        let (mut w, sid, _) = founded();
        let id = commands::spawn_agent(&mut w, sid, P0).unwrap();
        let a = w.agents.get(id).unwrap();
        assert_eq!(a.profession, Profession::Generic);
        assert!(matches!(a.state, AgentState::IdleInStock { inventory } if inventory == sid));
        let inv = w.structures.get(sid).unwrap().inventory.as_deref().unwrap();
        assert_eq!(inv.free_agent_count(), 1);
    }

    #[test]
    fn geologist_is_trained_and_sent_to_the_flag() {
        let (mut w, sid, castle) = founded();
        let id = commands::spawn_agent(&mut w, sid, P0).unwrap();
        let door = door_of(&w, castle);
        let node = flag_right_of_door(&mut w, door, 3);

        assert!(commands::send_geologist(&mut w, node, P0).unwrap());
        let a = w.agents.get(id).unwrap();
        assert_eq!(a.profession, Profession::Geologist);
        assert!(matches!(
            a.state,
            AgentState::ReadyToLeaveInventory { mode: 6, dest, .. } if dest == node
        ));
        // Training consumed the hammer.
        let inv = w.structures.get(sid).unwrap().inventory.as_deref().unwrap();
        assert_eq!(inv.count_of(Resource::Hammer), 19);
    }

    #[test]
    fn geologists_only_survey_own_nodes() {
        let (mut w, sid, castle) = founded();
        commands::spawn_agent(&mut w, sid, P0).unwrap();
        let door = door_of(&w, castle);
        let node = flag_right_of_door(&mut w, door, 3);
        assert!(matches!(
            commands::send_geologist(&mut w, node, P1),
            Err(CommandError::NotOwned)
        ));
    }
}

mod warfare {
    use super::helpers::*;
    use super::*;

    /// A finished, occupied hut with a hand-built garrison chain.
    fn garrisoned_hut(
        w: &mut World,
        pos: MapPos,
        owner: PlayerId,
        ranks: &[Profession],
    ) -> StructureId {
        let sid = commands::build_structure(w, pos, StructureKind::Hut, owner).unwrap();
        let mut head = AgentId::INVALID;
        for &rank in ranks.iter().rev() {
            head = w.agents.add(Agent::new(
                rank,
                owner,
                pos,
                AgentState::DefendingHut { next_knight: head },
            ));
        }
        let s = w.structures.get_mut(sid).unwrap();
        s.constructing = false;
        s.active = true;
        s.holder = true;
        s.main_agent = head;
        s.stocks[0].available = ranks.len() as u8;
        s.stocks[0].requested = 0;
        sid
    }

    #[test]
    fn only_frontier_garrisons_are_valid_targets() {
        let (mut w, _, castle) = founded();
        let rival = w.map.pos(48, 48);
        commands::build_castle(&mut w, rival, P1).unwrap();
        let own_pos = w.map.pos_add(castle, 0, 4);
        let own = garrisoned_hut(&mut w, own_pos, P0, &[Profession::Knight0]);
        assert!(matches!(
            commands::attack_structure(&mut w, own, P0, 5),
            Err(CommandError::BadTarget)
        ));
    }

    #[test]
    fn knights_march_out_strongest_first() {
        let (mut w, _, castle) = founded();
        let enemy_castle = w.map.pos(48, 48);
        commands::build_castle(&mut w, enemy_castle, P1).unwrap();

        let source_pos = w.map.pos_add(castle, 0, 4);
        let source = garrisoned_hut(
            &mut w,
            source_pos,
            P0,
            &[Profession::Knight2, Profession::Knight1, Profession::Knight0],
        );
        let target_pos = w.map.pos_add(enemy_castle, 0, 4);
        let target = garrisoned_hut(&mut w, target_pos, P1, &[Profession::Knight0]);
        w.structures.get_mut(target).unwrap().threat_level = 3;

        let sent = commands::attack_structure(&mut w, target, P0, 10).unwrap();
        // Three garrisoned minus the one the occupation setting pins home.
        assert_eq!(sent, 2);
        let s = w.structures.get(source).unwrap();
        assert_eq!(s.knight_count(), 1);
        let stay = w.agents.get(s.main_agent).unwrap();
        assert_eq!(stay.profession, Profession::Knight0);

        let marching = w
            .agents
            .ids()
            .filter(|&id| {
                matches!(
                    w.agents.get(id).unwrap().state,
                    AgentState::KnightLeaveForWalkToFight { .. }
                )
            })
            .count();
        assert_eq!(marching, 2);
        assert!(
            w.player(P1)
                .unwrap()
                .notifications
                .contains(&Notification::UnderAttack { pos: target_pos, by: P0 })
        );
    }

    #[test]
    fn free_walking_knights_engage_on_contact() {
        let (mut w, _, _) = founded();
        let pa = w.map.pos(30, 30);
        let pb = w.map.pos(30, 31);
        let a = w.agents.add(Agent::new(
            Profession::Knight0,
            P0,
            pa,
            AgentState::KnightFreeWalking(FreeWalk {
                dist_col:  5,
                dist_row:  0,
                neg_dist1: 0,
                neg_dist2: 0,
                flags:     0,
            }),
        ));
        let b = w.agents.add(Agent::new(
            Profession::Knight1,
            P1,
            pb,
            AgentState::KnightFreeWalking(FreeWalk {
                dist_col:  -5,
                dist_row:  0,
                neg_dist1: 0,
                neg_dist2: 0,
                flags:     0,
            }),
        ));
        w.map.set_agent(pa, a);
        w.map.set_agent(pb, b);
        // Keep the enemy's own turn far off so only the meeting matters.
        w.agents.get_mut(b).unwrap().counter = 1000;

        w.update().unwrap();

        let defender = w.agents.get(a).unwrap();
        assert!(matches!(
            defender.state,
            AgentState::KnightEngageDefendingFree(DefendFree { misc: 1, .. })
        ));
        // The challenge records which way the defender was found.
        let attacker = w.agents.get(b).unwrap();
        let down = Direction::Down.index() as i32;
        assert!(matches!(
            attacker.state,
            AgentState::KnightEngageAttackingFree(Fight { misc, opponent, .. })
                if misc == down && opponent == a
        ));
    }

    #[test]
    fn an_empty_garrison_cannot_attack() {
        let (mut w, _, castle) = founded();
        let enemy_castle = w.map.pos(48, 48);
        commands::build_castle(&mut w, enemy_castle, P1).unwrap();
        let target_pos = w.map.pos_add(enemy_castle, 0, 4);
        let target = garrisoned_hut(&mut w, target_pos, P1, &[Profession::Knight0]);
        w.structures.get_mut(target).unwrap().threat_level = 3;

        assert!(matches!(
            commands::attack_structure(&mut w, target, P0, 10),
            Err(CommandError::NoKnights)
        ));
    }
}

mod scheduler {
    use super::helpers::*;
    use super::*;

    /// A small live fief: castle, staff, a road and a construction site.
    fn scenario() -> World {
        let (mut w, sid, castle) = founded();
        for _ in 0..4 {
            commands::spawn_agent(&mut w, sid, P0).unwrap();
        }
        let door = door_of(&w, castle);
        flag_right_of_door(&mut w, door, 4);
        let site = w.map.pos_add(castle, 0, 4);
        commands::build_structure(&mut w, site, StructureKind::Hut, P0).unwrap();
        w
    }

    fn probe(w: &World) -> (u16, u32, Vec<(u32, MapPos)>, Vec<u32>) {
        let agents = w
            .agents
            .ids()
            .filter_map(|id| w.agents.get(id).map(|a| (id.0, a.pos)))
            .collect();
        let census = Resource::ALL.iter().map(|&r| w.resource_census(r)).collect();
        (w.tick, w.const_tick, agents, census)
    }

    #[test]
    fn same_seed_same_history() {
        let mut a = scenario();
        let mut b = scenario();
        for _ in 0..300 {
            a.update().unwrap();
            b.update().unwrap();
        }
        assert_eq!(probe(&a), probe(&b));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn snapshot_round_trips_bit_identically() {
        let mut w = scenario();
        for _ in 0..50 {
            w.update().unwrap();
        }
        let first = serde_json::to_string(&w).unwrap();
        let mut restored: World = serde_json::from_str(&first).unwrap();
        assert_eq!(serde_json::to_string(&restored).unwrap(), first);

        // The restored world continues exactly like the original.
        for _ in 0..50 {
            w.update().unwrap();
            restored.update().unwrap();
        }
        assert_eq!(probe(&w), probe(&restored));
    }
}
