//! Unit tests for fief-grid.

#[cfg(test)]
mod helpers {
    use crate::{Geometry, Map};

    /// 16x16 flat grass map.
    pub fn small_map() -> Map {
        Map::new(Geometry::new(16, 16).unwrap())
    }
}

// ── Geometry ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod geometry {
    use fief_core::Direction;

    use crate::{Geometry, SPIRAL_LEN, SPIRAL_PATTERN};

    #[test]
    fn rejects_non_power_of_two() {
        assert!(Geometry::new(17, 16).is_none());
        assert!(Geometry::new(16, 12).is_none());
        assert!(Geometry::new(4, 16).is_none());
        assert!(Geometry::new(16, 16).is_some());
    }

    #[test]
    fn pack_round_trip() {
        let g = Geometry::new(32, 16).unwrap();
        for (col, row) in [(0, 0), (31, 15), (7, 9)] {
            let p = g.pos(col, row);
            assert_eq!(g.pos_col(p), col);
            assert_eq!(g.pos_row(p), row);
        }
    }

    #[test]
    fn moves_wrap_toroidally() {
        let g = Geometry::new(16, 16).unwrap();
        let origin = g.pos(0, 0);
        assert_eq!(g.moved(origin, Direction::Left), g.pos(15, 0));
        assert_eq!(g.moved(origin, Direction::Up), g.pos(0, 15));
        assert_eq!(g.moved(origin, Direction::UpLeft), g.pos(15, 15));
        assert_eq!(g.moved(origin, Direction::Right), g.pos(1, 0));
        assert_eq!(g.moved(origin, Direction::DownRight), g.pos(1, 1));
    }

    #[test]
    fn move_then_reverse_returns() {
        let g = Geometry::new(16, 16).unwrap();
        let p = g.pos(5, 11);
        for d in Direction::iter() {
            assert_eq!(g.moved(g.moved(p, d), d.reverse()), p);
        }
    }

    #[test]
    fn spiral_center_and_first_ring() {
        assert_eq!(SPIRAL_PATTERN[0], (0, 0));
        // First base offset (1,0) under the six rotations.
        assert_eq!(SPIRAL_PATTERN[1], (1, 0));
        assert_eq!(SPIRAL_PATTERN[2], (1, 1));
        assert_eq!(SPIRAL_PATTERN[3], (0, 1));
        assert_eq!(SPIRAL_PATTERN[4], (-1, 0));
        assert_eq!(SPIRAL_PATTERN[5], (-1, -1));
        assert_eq!(SPIRAL_PATTERN[6], (0, -1));
    }

    #[test]
    fn spiral_first_ring_matches_neighbors() {
        let g = Geometry::new(16, 16).unwrap();
        let p = g.pos(8, 8);
        // Offsets 1..=6 are exactly the six direction moves in order.
        for (i, d) in Direction::iter().enumerate() {
            assert_eq!(g.pos_add_spirally(p, 1 + i), g.moved(p, d));
        }
        assert_eq!(SPIRAL_LEN, 295);
    }

    #[test]
    fn spiral_entries_unique_within_search_radius() {
        // The Lost search walks indices 1..=258; they must not alias on a
        // map large enough to hold ring 9.
        let g = Geometry::new(32, 32).unwrap();
        let p = g.pos(16, 16);
        let mut seen = std::collections::BTreeSet::new();
        for off in 0..=258 {
            assert!(seen.insert(g.pos_add_spirally(p, off)), "alias at {off}");
        }
    }
}

// ── Cells & objects ───────────────────────────────────────────────────────────

#[cfg(test)]
mod cells {
    use fief_core::{AgentId, Direction, PlayerId};

    use crate::cell::Space;
    use crate::{Object, SignKind, Terrain};

    use super::helpers::small_map;

    #[test]
    fn paths_are_per_direction() {
        let mut m = small_map();
        let p = m.pos(3, 3);
        m.add_path(p, Direction::Down);
        m.add_path(p, Direction::Left);
        assert!(m.has_path(p, Direction::Down));
        assert!(!m.has_path(p, Direction::Right));
        assert_eq!(m.paths(p), Direction::Down.bit() | Direction::Left.bit());
        m.del_path(p, Direction::Down);
        assert!(!m.has_path(p, Direction::Down));
        assert!(m.has_any_path(p));
    }

    #[test]
    fn occupancy_and_idle_parking() {
        let mut m = small_map();
        let p = m.pos(2, 2);
        assert!(m.blocking_agent(p).is_none());

        m.set_agent(p, AgentId(7));
        assert_eq!(m.blocking_agent(p), Some(AgentId(7)));
        assert!(!m.is_open(p));

        m.set_idle_agent(p, AgentId(7));
        assert!(m.blocking_agent(p).is_none());
        assert_eq!(m.agent_at(p), Some(AgentId(7)));
        assert!(m.is_idle_agent(p));

        m.clear_agent(p);
        assert!(m.agent_at(p).is_none());
    }

    #[test]
    fn object_space_classes() {
        assert_eq!(Object::None.space(), Space::Open);
        assert_eq!(Object::Seeds(2).space(), Space::Semipassable);
        assert_eq!(Object::Tree(5).space(), Space::Impassable);
        assert_eq!(Object::Flag.space(), Space::Occupied);
        assert_eq!(Object::Castle.space(), Space::Occupied);
    }

    #[test]
    fn ownership_defaults_unclaimed() {
        let mut m = small_map();
        let p = m.pos(1, 1);
        assert_eq!(m.owner(p), None);
        m.set_owner(p, PlayerId(0));
        assert_eq!(m.owner(p), Some(PlayerId(0)));
        assert!(m.is_owned_by(p, PlayerId(0)));
        assert!(!m.is_owned_by(p, PlayerId(1)));
    }

    #[test]
    fn mineral_extraction_depletes() {
        let mut m = small_map();
        let p = m.pos(4, 4);
        m.set_terrain(p, Terrain::Tundra1);
        m.set_mineral(p, crate::Mineral::Coal, 2);
        assert_eq!(m.extract_mineral(p), crate::Mineral::Coal);
        assert_eq!(m.extract_mineral(p), crate::Mineral::Coal);
        assert_eq!(m.extract_mineral(p), crate::Mineral::None);
        assert_eq!(m.mineral(p), (crate::Mineral::None, 0));
    }

    #[test]
    fn deposit_signs() {
        assert_eq!(
            SignKind::for_deposit(crate::Mineral::Gold, 15),
            SignKind::LargeGold
        );
        assert_eq!(
            SignKind::for_deposit(crate::Mineral::Iron, 3),
            SignKind::SmallIron
        );
        assert_eq!(
            SignKind::for_deposit(crate::Mineral::None, 0),
            SignKind::Empty
        );
    }
}

// ── Growth pass ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod growth {
    use fief_core::GameRng;

    use crate::Object;

    use super::helpers::small_map;

    #[test]
    fn seeds_mature_into_fields() {
        let mut m = small_map();
        let p = m.pos(0, 0);
        m.set_object(p, Object::Seeds(0), crate::Cell::NO_OBJECT_INDEX);

        let mut rng = GameRng::from_seed(11);
        // 16x16 map, 48 cells per pass: every cell is visited frequently.
        for _ in 0..4000 {
            m.update_growth(&mut rng);
            if matches!(m.object(p), Object::Field(_)) {
                return;
            }
        }
        panic!("seeds never matured");
    }

    #[test]
    fn growth_is_deterministic() {
        let build = || {
            let mut m = small_map();
            for i in 0..8 {
                let p = m.pos(i, i);
                m.set_object(p, Object::Sapling(0), crate::Cell::NO_OBJECT_INDEX);
            }
            m
        };
        let mut a = build();
        let mut b = build();
        let mut rng_a = GameRng::from_seed(77);
        let mut rng_b = GameRng::from_seed(77);
        for _ in 0..500 {
            a.update_growth(&mut rng_a);
            b.update_growth(&mut rng_b);
        }
        for i in 0..8 {
            let p = a.pos(i, i);
            assert_eq!(a.object(p), b.object(p));
        }
    }
}
