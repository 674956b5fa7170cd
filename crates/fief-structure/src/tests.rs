use fief_core::{NodeId, PlayerId, Profession, Resource, StructureId};
use fief_grid::MapPos;

use crate::inventory::Inventory;
use crate::kind::{StockItem, StructureKind};
use crate::store::StructureStore;
use crate::structure::Structure;

mod helpers {
    use super::*;

    pub fn site(kind: StructureKind) -> Structure {
        Structure::new(kind, MapPos(42), PlayerId(0), NodeId(7))
    }

    /// Builder blows until the structure reports completion.
    pub fn build_to_completion(s: &mut Structure) -> u32 {
        let mut blows = 0;
        while !s.build_progress() {
            blows += 1;
            assert!(blows < 1000, "construction never finished");
        }
        blows + 1
    }
}

mod construction {
    use super::helpers::*;
    use super::*;

    #[test]
    fn small_site_skips_leveling() {
        let s = site(StructureKind::Fisher);
        assert_eq!(s.progress, 1);
        assert!(s.constructing);
    }

    #[test]
    fn large_site_starts_at_zero() {
        let s = site(StructureKind::Fortress);
        assert_eq!(s.progress, 0);
    }

    #[test]
    fn fisher_finishes_in_sixteen_blows() {
        let mut s = site(StructureKind::Fisher);
        assert_eq!(build_to_completion(&mut s), 16);
        assert!(s.is_done());
        assert_eq!(s.progress, 0);
    }

    #[test]
    fn fortress_slows_after_frame() {
        let mut s = site(StructureKind::Fortress);
        // 32 blows of 1024 raise the frame, then 48 blows of 683.
        assert_eq!(build_to_completion(&mut s), 80);
    }

    #[test]
    fn frame_bit_flips_halfway() {
        let mut s = site(StructureKind::Fisher);
        assert!(!s.frame_finished());
        for _ in 0..8 {
            s.build_progress();
        }
        assert!(s.frame_finished());
    }

    #[test]
    fn completion_clears_construction_stocks() {
        let mut s = site(StructureKind::Fisher);
        s.stocks[0].available = 1;
        build_to_completion(&mut s);
        assert_eq!(s.stocks[0].item, None);
        assert_eq!(s.stocks[0].available, 0);
    }

    #[test]
    fn material_schedule_interleaves_stone() {
        // A hut is one plank then one stone.
        let hut = site(StructureKind::Hut);
        assert!(!hut.uses_stone_at(0));
        assert!(hut.uses_stone_at(1));

        // A stock is three planks then three stones.
        let stock = site(StructureKind::Stock);
        assert!(!stock.uses_stone_at(2));
        assert!(stock.uses_stone_at(3));
        assert!(stock.uses_stone_at(5));
        assert!(!stock.uses_stone_at(6));
    }

    #[test]
    fn construction_stocks_sized_from_costs() {
        let s = site(StructureKind::Fortress);
        assert_eq!(s.stocks[0].item, Some(StockItem::One(Resource::Plank)));
        assert_eq!(s.stocks[0].maximum, 5);
        assert_eq!(s.stocks[1].item, Some(StockItem::One(Resource::Stone)));
        assert_eq!(s.stocks[1].maximum, 5);
    }

    #[test]
    fn castle_is_born_held() {
        let s = site(StructureKind::Castle);
        assert!(s.active);
        assert!(s.holder);
        assert_eq!(s.stocks[0].available, 0xff);
    }
}

mod stocks {
    use super::helpers::*;
    use super::*;

    #[test]
    fn sawmill_takes_lumber_in_second_slot() {
        let mut s = site(StructureKind::Sawmill);
        s.constructing = false;
        s.setup_operating_stocks();

        assert_eq!(s.stocks[0].item, None);
        assert_eq!(s.stocks[1].item, Some(StockItem::One(Resource::Lumber)));

        s.stocks[1].requested = 1;
        assert!(s.resource_delivered(Resource::Lumber));
        assert_eq!(s.stocks[1].available, 1);
        assert_eq!(s.stocks[1].requested, 0);
    }

    #[test]
    fn leftover_construction_slot_is_wiped() {
        let mut s = site(StructureKind::Sawmill);
        s.stocks[0].available = 2;
        s.constructing = false;
        s.setup_operating_stocks();

        assert_eq!(s.stocks[0].item, None);
        assert_eq!(s.stocks[0].available, 0);
        assert_eq!(s.stocks[0].maximum, 0);
        assert!(!s.resource_delivered(Resource::Plank));
    }

    #[test]
    fn unexpected_delivery_is_refused() {
        let mut s = site(StructureKind::Sawmill);
        s.constructing = false;
        s.setup_operating_stocks();
        s.stocks[1].requested = 1;
        assert!(!s.resource_delivered(Resource::Plank));
    }

    #[test]
    fn mines_accept_the_whole_food_group() {
        let mut s = site(StructureKind::CoalMine);
        s.constructing = false;
        s.setup_operating_stocks();
        s.stocks[0].requested = 3;

        assert!(s.resource_delivered(Resource::Fish));
        assert!(s.resource_delivered(Resource::Bread));
        assert!(s.resource_delivered(Resource::Meat));
        assert_eq!(s.stocks[0].available, 3);
    }

    #[test]
    fn consuming_an_empty_stock_fails() {
        let mut s = site(StructureKind::Baker);
        s.constructing = false;
        s.setup_operating_stocks();
        assert!(!s.use_resource_in_stock(0));
        s.stocks[0].available = 1;
        assert!(s.use_resource_in_stock(0));
        assert!(!s.use_resource_in_stock(0));
    }
}

mod mining {
    use super::helpers::*;
    use super::*;

    #[test]
    fn depletion_after_a_run_of_misses() {
        let mut s = site(StructureKind::GoldMine);
        s.constructing = false;
        s.progress = 0;
        s.increase_mining(true);
        for _ in 0..14 {
            s.increase_mining(false);
            assert!(!s.mine_depleted());
        }
        s.increase_mining(false);
        assert!(s.mine_depleted());
    }

    #[test]
    fn a_find_resets_the_streak() {
        let mut s = site(StructureKind::GoldMine);
        s.constructing = false;
        s.progress = 0;
        s.increase_mining(true);
        for _ in 0..10 {
            s.increase_mining(false);
        }
        s.increase_mining(true);
        for _ in 0..10 {
            s.increase_mining(false);
            assert!(!s.mine_depleted());
        }
    }
}

mod garrison {
    use super::helpers::*;
    use super::*;
    use fief_core::AgentId;

    #[test]
    fn hut_caps_at_three_knights() {
        let mut s = site(StructureKind::Hut);
        s.constructing = false;
        for _ in 0..3 {
            assert!(s.has_knight_room());
            s.knight_requested();
        }
        assert!(!s.has_knight_room());
    }

    #[test]
    fn occupation_opens_the_gold_slot() {
        let mut s = site(StructureKind::Tower);
        s.constructing = false;
        s.knight_requested();
        s.requested_knight_arrived();
        s.knight_occupied(AgentId(3));

        assert!(s.active);
        assert_eq!(s.stocks[1].item, Some(StockItem::One(Resource::GoldBar)));
        assert_eq!(s.stocks[1].maximum, 4);
        assert_eq!(s.knight_count(), 1);
    }

    #[test]
    fn defender_bookkeeping_round_trips() {
        let mut s = site(StructureKind::Hut);
        s.constructing = false;
        s.knight_requested();
        s.requested_knight_arrived();

        s.call_defender_out();
        assert_eq!(s.knight_count(), 0);
        s.defender_returned();
        assert_eq!(s.knight_count(), 1);
    }
}

mod demolition {
    use super::helpers::*;
    use super::*;

    #[test]
    fn burning_reports_the_lost_stock() {
        let mut s = site(StructureKind::Sawmill);
        s.constructing = false;
        s.setup_operating_stocks();
        s.stocks[1].available = 3;

        let lost = s.burn();
        assert_eq!(lost, vec![(Resource::Lumber, 3)]);
        assert!(s.burning);
        assert_eq!(s.stocks[1].item, None);
    }

    #[test]
    fn second_burn_is_a_no_op() {
        let mut s = site(StructureKind::Hut);
        s.burn();
        assert!(s.burn().is_empty());
    }

    #[test]
    fn remains_linger_then_expire() {
        let mut s = site(StructureKind::Hut);
        s.burn();
        assert!(!s.burn_down(1000));
        assert!(!s.burn_down(1000));
        assert!(s.burn_down(1000));
    }
}

mod inventories {
    use super::*;

    fn inv() -> Inventory {
        Inventory::new(PlayerId(0), StructureId(0), NodeId(0))
    }

    #[test]
    fn pool_round_trip() {
        let mut i = inv();
        i.push_resource(Resource::Plank);
        i.push_resource(Resource::Plank);
        assert_eq!(i.count_of(Resource::Plank), 2);
        assert!(i.pop_resource(Resource::Plank));
        assert!(i.pop_resource(Resource::Plank));
        assert!(!i.pop_resource(Resource::Plank));
    }

    #[test]
    fn food_is_taken_fish_first() {
        let mut i = inv();
        i.push_resource(Resource::Bread);
        i.push_resource(Resource::Fish);
        assert_eq!(i.pop_food(), Some(Resource::Fish));
        assert_eq!(i.pop_food(), Some(Resource::Bread));
        assert_eq!(i.pop_food(), None);
    }

    #[test]
    fn out_queue_holds_two_and_shifts() {
        let mut i = inv();
        i.push_resource(Resource::Coal);
        i.push_resource(Resource::Stone);
        i.push_resource(Resource::Fish);

        assert!(i.add_to_out_queue(Resource::Coal, NodeId(1)));
        assert!(i.add_to_out_queue(Resource::Stone, NodeId(2)));
        assert!(i.out_queue_full());
        assert!(!i.add_to_out_queue(Resource::Fish, NodeId(3)));
        // The refused unit went back into the pool.
        assert_eq!(i.count_of(Resource::Fish), 1);

        let head = i.take_from_out_queue().map(|o| (o.resource, o.dest));
        assert_eq!(head, Some((Resource::Coal, NodeId(1))));
        let head = i.take_from_out_queue().map(|o| (o.resource, o.dest));
        assert_eq!(head, Some((Resource::Stone, NodeId(2))));
        assert!(i.take_from_out_queue().is_none());
    }

    #[test]
    fn specialization_consumes_tools() {
        let mut i = inv();
        i.agent_in(Profession::Generic);
        assert!(!i.can_specialize(Profession::Toolmaker));

        i.push_resource(Resource::Hammer);
        i.push_resource(Resource::Saw);
        assert!(i.specialize_agent(Profession::Toolmaker));
        assert_eq!(i.count_of(Resource::Hammer), 0);
        assert_eq!(i.count_of(Resource::Saw), 0);
        assert_eq!(i.agent_count(Profession::Toolmaker), 1);
        assert_eq!(i.free_agent_count(), 0);
    }

    #[test]
    fn knights_take_arms() {
        let mut i = inv();
        i.agent_in(Profession::Generic);
        i.push_resource(Resource::Sword);
        i.push_resource(Resource::Shield);
        assert!(i.specialize_agent(Profession::Knight0));
        assert_eq!(i.best_knight(), Some(Profession::Knight0));
    }

    #[test]
    fn call_out_tracks_agents_in_flight() {
        let mut i = inv();
        i.agent_in(Profession::Transporter);
        assert!(i.call_agent_out(Profession::Transporter));
        assert_eq!(i.agents_out, 1);
        assert!(!i.call_agent_out(Profession::Transporter));
        i.agent_out_settled();
        assert_eq!(i.agents_out, 0);
    }

    #[test]
    fn drain_reports_everything() {
        let mut i = inv();
        i.push_resource(Resource::Plank);
        i.push_resource(Resource::Plank);
        i.push_resource(Resource::Coal);
        i.add_to_out_queue(Resource::Coal, NodeId(4));

        let mut lost = i.drain();
        lost.sort();
        assert_eq!(lost, vec![(Resource::Plank, 2), (Resource::Coal, 1)]);
        assert_eq!(i.total_resources(), 0);
    }
}

mod arena {
    use super::helpers::*;
    use super::*;

    #[test]
    fn removed_indices_are_reused() {
        let mut store = StructureStore::new();
        let a = store.add(site(StructureKind::Hut));
        let b = store.add(site(StructureKind::Mill));
        store.remove(a);
        let c = store.add(site(StructureKind::Farm));
        assert_eq!(c, a);
        assert_ne!(c, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn lookup_by_position() {
        let mut store = StructureStore::new();
        let id = store.add(site(StructureKind::Hut));
        assert_eq!(store.at_pos(MapPos(42)), Some(id));
        assert_eq!(store.at_pos(MapPos(43)), None);
    }

    #[test]
    fn dangling_id_is_corruption() {
        let store = StructureStore::new();
        assert!(store.try_get(StructureId(9)).is_err());
    }
}
