//! Unit tests for fief-relay.

#[cfg(test)]
mod helpers {
    use fief_core::{Direction, NodeId, PlayerId};
    use fief_grid::MapPos;

    use crate::{Link, RelayNode, RelayStore};

    pub fn node(pos: u32) -> RelayNode {
        RelayNode::new(MapPos(pos), PlayerId(0))
    }

    /// Connect `a --dir--> b` with symmetric links of `len` segments.
    pub fn link(store: &mut RelayStore, a: NodeId, b: NodeId, dir: Direction, len: usize) {
        let class = crate::road_length_class(len);
        let (na, nb) = store.get_pair_mut(a, b).unwrap();
        let mut fwd = Link::new(b, dir.reverse(), false);
        let mut rev = Link::new(a, dir, false);
        fwd.length_class = class;
        rev.length_class = class;
        na.links[dir.index()] = Some(fwd);
        nb.links[dir.reverse().index()] = Some(rev);
    }

    /// Mark the road between `a` and `b` as served by a transporter.
    pub fn serve(store: &mut RelayStore, a: NodeId, dir: Direction) {
        let b = store.get(a).unwrap().link(dir).unwrap().other_node;
        let rev = store.get(a).unwrap().link(dir).unwrap().other_end_dir;
        store.get_mut(a).unwrap().link_mut(dir).unwrap().has_transporter = true;
        store.get_mut(a).unwrap().link_mut(dir).unwrap().transporter_count = 1;
        store.get_mut(b).unwrap().link_mut(rev).unwrap().has_transporter = true;
        store.get_mut(b).unwrap().link_mut(rev).unwrap().transporter_count = 1;
    }

    /// A line of `n` nodes linked Right-ward, all roads served.
    pub fn line(n: usize) -> (RelayStore, Vec<NodeId>) {
        let mut store = RelayStore::new();
        let ids: Vec<NodeId> = (0..n).map(|i| store.add(node(i as u32))).collect();
        for w in ids.windows(2) {
            link(&mut store, w[0], w[1], Direction::Right, 4);
            serve(&mut store, w[0], Direction::Right);
        }
        (store, ids)
    }
}

// ── Node slots ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod slots {
    use fief_core::{Direction, NodeId, Resource};

    use crate::MAX_SLOTS;

    use super::helpers::node;

    #[test]
    fn slot_bound_is_eight() {
        let mut n = node(0);
        for i in 0..MAX_SLOTS {
            assert!(n.drop_resource(Resource::Plank, NodeId(i as u32)));
        }
        assert_eq!(n.slot_count(), 8);
        assert!(!n.has_empty_slot());
        assert!(!n.drop_resource(Resource::Stone, NodeId::INVALID));
        assert_eq!(n.slot_count(), 8);
    }

    #[test]
    fn pick_up_clears_slot_and_schedule() {
        let mut n = node(0);
        assert!(n.drop_resource(Resource::Fish, NodeId(3)));
        let (res, dest) = n.pick_up_resource(0).unwrap();
        assert_eq!(res, Resource::Fish);
        assert_eq!(dest, NodeId(3));
        assert!(n.pick_up_resource(0).is_none());
        assert!(!n.schedule_dirty);
    }

    #[test]
    fn remove_all_reports_losses() {
        let mut n = node(0);
        n.drop_resource(Resource::Coal, NodeId(1));
        n.drop_resource(Resource::Bread, NodeId(2));
        let lost = n.remove_all_resources();
        assert_eq!(
            lost,
            vec![(Resource::Coal, NodeId(1)), (Resource::Bread, NodeId(2))]
        );
        assert_eq!(n.slot_count(), 0);
    }

    #[test]
    fn prioritize_pickup_prefers_high_priority() {
        let mut n = node(0);
        n.links[Direction::Right.index()] =
            Some(crate::Link::new(NodeId(1), Direction::Left, false));

        n.drop_resource(Resource::GoldOre, NodeId::INVALID);
        n.drop_resource(Resource::Plank, NodeId::INVALID);
        n.slots[0].pickup_dir = Some(Direction::Right);
        n.slots[1].pickup_dir = Some(Direction::Right);

        // Default-style table: plank outranks gold ore.
        let mut prio = [0u8; Resource::COUNT];
        prio[Resource::GoldOre.index()] = 1;
        prio[Resource::Plank.index()] = 26;
        n.prioritize_pickup(Direction::Right, &prio);
        assert_eq!(n.scheduled_slot(Direction::Right), Some(1));
    }

    #[test]
    fn res_waiting_mask_counts_depth() {
        let mut n = node(0);
        for _ in 0..3 {
            n.drop_resource(Resource::Stone, NodeId::INVALID);
        }
        n.slots[0].pickup_dir = Some(Direction::Down);
        n.slots[1].pickup_dir = Some(Direction::Down);
        n.slots[2].pickup_dir = Some(Direction::Up);

        let waiting = n.res_waiting_mask();
        assert_ne!(waiting[0] & Direction::Down.bit(), 0);
        assert_ne!(waiting[1] & Direction::Down.bit(), 0);
        assert_eq!(waiting[2] & Direction::Down.bit(), 0);
        assert_ne!(waiting[0] & Direction::Up.bit(), 0);
        assert_eq!(waiting[1] & Direction::Up.bit(), 0);
    }

    #[test]
    fn invalidate_resource_path_unschedules() {
        let mut n = node(0);
        n.links[Direction::Left.index()] =
            Some(crate::Link::new(NodeId(1), Direction::Right, false));
        n.drop_resource(Resource::Pig, NodeId(5));
        n.slots[0].pickup_dir = Some(Direction::Left);
        n.schedule_dirty = false;

        n.invalidate_resource_path(Direction::Left);
        assert_eq!(n.slots[0].pickup_dir, None);
        assert!(n.schedule_dirty);
    }
}

// ── Roads ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod roads {
    use fief_core::Direction;

    use crate::{MAX_TRANSPORTERS, RelayStore, road_length_class};

    use super::helpers::{link, node};

    #[test]
    fn length_classes() {
        assert_eq!(road_length_class(1), 0);
        assert_eq!(road_length_class(3), 0);
        assert_eq!(road_length_class(4), 1);
        assert_eq!(road_length_class(6), 2);
        assert_eq!(road_length_class(7), 3);
        assert_eq!(road_length_class(10), 4);
        assert_eq!(road_length_class(13), 5);
        assert_eq!(road_length_class(18), 6);
        assert_eq!(road_length_class(24), 7);
        assert_eq!(road_length_class(100), 7);
    }

    #[test]
    fn transporter_caps_follow_class() {
        assert_eq!(MAX_TRANSPORTERS, [1, 2, 3, 4, 6, 8, 11, 15]);
    }

    #[test]
    fn demolish_requires_exactly_two_distinct_roads() {
        let mut store = RelayStore::new();
        let a = store.add(node(0));
        let b = store.add(node(1));
        let c = store.add(node(2));

        // One road: not removable.
        link(&mut store, a, b, Direction::Right, 4);
        assert!(!store.get(b).unwrap().can_demolish());

        // Two roads to distinct neighbors: removable.
        link(&mut store, b, c, Direction::Down, 4);
        assert!(store.get(b).unwrap().can_demolish());

        // Third road: not removable.
        link(&mut store, b, a, Direction::Up, 4);
        assert!(!store.get(b).unwrap().can_demolish());
    }
}

// ── Arena ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod arena {
    use fief_core::NodeId;
    use fief_grid::MapPos;

    use crate::RelayStore;

    use super::helpers::node;

    #[test]
    fn indices_are_reused() {
        let mut store = RelayStore::new();
        let a = store.add(node(0));
        let b = store.add(node(1));
        store.remove(a);
        let c = store.add(node(2));
        assert_eq!(c, a);
        assert_ne!(c, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn at_pos_lookup() {
        let mut store = RelayStore::new();
        let a = store.add(node(17));
        assert_eq!(store.at_pos(MapPos(17)), Some(a));
        assert_eq!(store.at_pos(MapPos(99)), None);
    }

    #[test]
    fn dangling_id_is_an_error() {
        let store = RelayStore::new();
        assert!(store.try_get(NodeId(5)).is_err());
    }
}

// ── Search ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod search {
    use fief_core::{Direction, NodeId};

    use crate::{RelayStore, SearchOpts};

    use super::helpers::{line, link, node, serve};

    #[test]
    fn finds_target_on_line() {
        let (mut store, ids) = line(5);
        let target = ids[4];
        let mut visited = Vec::new();
        let found = store.search_single(ids[0], SearchOpts::default(), |_, id| {
            visited.push(id);
            id == target
        });
        assert!(found);
        assert_eq!(visited, ids);
    }

    #[test]
    fn transporter_filter_blocks_unserved_roads() {
        let mut store = RelayStore::new();
        let a = store.add(node(0));
        let b = store.add(node(1));
        link(&mut store, a, b, Direction::Right, 4);
        // Road exists but nobody serves it.
        let opts = SearchOpts { land_only: false, with_transporter: true };
        let found = store.search_single(a, opts, |_, id| id == b);
        assert!(!found);

        serve(&mut store, a, Direction::Right);
        let found = store.search_single(a, opts, |_, id| id == b);
        assert!(found);
    }

    #[test]
    fn land_filter_blocks_water_roads() {
        let mut store = RelayStore::new();
        let a = store.add(node(0));
        let b = store.add(node(1));
        link(&mut store, a, b, Direction::Right, 4);
        store.get_mut(a).unwrap().link_mut(Direction::Right).unwrap().water = true;
        store.get_mut(b).unwrap().link_mut(Direction::Left).unwrap().water = true;

        let opts = SearchOpts { land_only: true, with_transporter: false };
        assert!(!store.search_single(a, opts, |_, id| id == b));
        assert!(store.search_single(a, SearchOpts::default(), |_, id| id == b));
    }

    #[test]
    fn search_dir_tags_identify_the_winning_source() {
        // a -- m -- b ; seed from both ends with distinct tags, accept m.
        let mut store = RelayStore::new();
        let a = store.add(node(0));
        let m = store.add(node(1));
        let b = store.add(node(2));
        link(&mut store, a, m, Direction::Right, 4);
        link(&mut store, m, b, Direction::Right, 4);

        let sources = [
            (a, Some(Direction::Down)),
            (b, Some(Direction::Up)),
        ];
        let mut tag = None;
        let found = store.search(&sources, SearchOpts::default(), |s, id| {
            if id == m {
                tag = s.get(id).unwrap().search_dir;
                true
            } else {
                false
            }
        });
        assert!(found);
        // `a` was queued first, so m inherits a's tag.
        assert_eq!(tag, Some(Direction::Down));
    }

    #[test]
    fn each_node_visited_once() {
        // Triangle: a-b, b-c, c-a.
        let mut store = RelayStore::new();
        let a = store.add(node(0));
        let b = store.add(node(1));
        let c = store.add(node(2));
        link(&mut store, a, b, Direction::Right, 4);
        link(&mut store, b, c, Direction::Down, 4);
        link(&mut store, c, a, Direction::UpLeft, 4);

        let mut visits = 0;
        store.search_single(a, SearchOpts::default(), |_, _| {
            visits += 1;
            false
        });
        assert_eq!(visits, 3);
    }

    #[test]
    fn unreachable_returns_false() {
        let mut store = RelayStore::new();
        let a = store.add(node(0));
        let b = store.add(node(1));
        assert!(!store.search_single(a, SearchOpts::default(), |_, id| id == b));
    }

    #[test]
    fn neighbor_expansion_order_is_descending() {
        // Hub with neighbors on Right and Up; Up must be queued first.
        let mut store = RelayStore::new();
        let hub = store.add(node(0));
        let right = store.add(node(1));
        let up = store.add(node(2));
        link(&mut store, hub, right, Direction::Right, 4);
        link(&mut store, hub, up, Direction::Up, 4);

        let mut order: Vec<NodeId> = Vec::new();
        store.search_single(hub, SearchOpts::default(), |_, id| {
            order.push(id);
            false
        });
        assert_eq!(order, vec![hub, up, right]);
    }
}
