use fief_core::{AgentId, Direction, GameRng, NodeId, PlayerId, Profession};
use fief_grid::MapPos;

use crate::agent::{ANIMATION_COUNTER, Agent, Waiting, walking_animation};
use crate::state::{AgentState, FreeWalk};
use crate::store::AgentStore;

mod helpers {
    use super::*;

    pub fn walker(dir: i32) -> Agent {
        Agent::new(
            Profession::Transporter,
            PlayerId(0),
            MapPos(10),
            AgentState::Walking { dir1: -1, dest: NodeId(0), dir, wait_counter: 0 },
        )
    }

    pub fn free_walker(dist_col: i32, dist_row: i32) -> Agent {
        let mut a = Agent::new(
            Profession::Lumberjack,
            PlayerId(0),
            MapPos(10),
            AgentState::FreeWalking(FreeWalk { dist_col, dist_row, ..FreeWalk::default() }),
        );
        a.animation = 82;
        a
    }
}

mod animation {
    use super::*;

    #[test]
    fn walking_rows_are_direction_indexed() {
        // Flat step: animation 4 in the first row, +9 per direction.
        assert_eq!(walking_animation(0, Direction::Right, false), 4);
        assert_eq!(walking_animation(0, Direction::Up, false), 49);
        // Climbing shifts within the row.
        assert_eq!(walking_animation(4, Direction::Right, false), 8);
        assert_eq!(walking_animation(-4, Direction::Right, false), 0);
    }

    #[test]
    fn swap_variant_only_for_the_first_three_directions() {
        assert_eq!(walking_animation(0, Direction::Right, true), 58);
        assert_eq!(walking_animation(0, Direction::Left, true), 31);
    }

    #[test]
    fn every_walking_animation_has_a_counter() {
        for dir in Direction::iter() {
            for h in -4..=4 {
                for sw in [false, true] {
                    let a = walking_animation(h, dir, sw) as usize;
                    assert!(a < ANIMATION_COUNTER.len());
                    assert!(ANIMATION_COUNTER[a] > 0);
                }
            }
        }
    }

    #[test]
    fn counter_reload_uses_the_table() {
        let mut a = helpers::walker(0);
        a.animation = 82;
        a.counter_from_animation();
        assert_eq!(a.counter, 127);
    }
}

mod waiting {
    use super::helpers::*;
    use super::*;

    #[test]
    fn moving_walker_is_not_waiting() {
        assert_eq!(walker(2).waiting_dir(), Waiting::No);
    }

    #[test]
    fn blocked_walker_reports_its_heading() {
        // dir = heading - 6 while blocked.
        let blocked = walker(Direction::Down.index() as i32 - 6);
        assert_eq!(blocked.waiting_dir(), Waiting::Toward(Direction::Down));
    }

    #[test]
    fn blocked_walker_accepts_a_swap() {
        let mut blocked = walker(Direction::Down.index() as i32 - 6);
        assert!(blocked.switch_waiting(Direction::Up));
        match blocked.state {
            AgentState::Walking { dir, .. } => {
                assert_eq!(dir, Direction::Up.reverse().index() as i32);
            }
            ref other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn free_walker_reports_the_step_toward_its_target() {
        let a = free_walker(1, 0);
        assert_eq!(a.waiting_dir(), Waiting::Toward(Direction::Right));
        let a = free_walker(-1, -1);
        assert_eq!(a.waiting_dir(), Waiting::Toward(Direction::UpLeft));
    }

    #[test]
    fn distant_free_walker_waits_without_direction() {
        let a = free_walker(3, 0);
        assert_eq!(a.waiting_dir(), Waiting::Any);
    }

    #[test]
    fn swapping_a_free_walker_onto_its_target_arrives() {
        let mut a = free_walker(1, 0);
        assert!(a.switch_waiting(Direction::Right));
        match a.state {
            AgentState::FreeWalking(fw) => {
                assert_eq!(fw.dist_col, 0);
                assert_eq!(fw.flags, 8);
            }
            ref other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn non_waiting_states_refuse_swaps() {
        let mut a = walker(2);
        assert!(!a.switch_waiting(Direction::Right));
    }
}

mod training {
    use super::*;

    #[test]
    fn impossible_roll_never_promotes() {
        let mut rng = GameRng::from_seed(1);
        let mut a = Agent::new(
            Profession::Knight0,
            PlayerId(0),
            MapPos(0),
            AgentState::DefendingHut { next_knight: AgentId::INVALID },
        );
        assert!(!a.train_knight(60000, 0, &mut rng));
        assert_eq!(a.profession, Profession::Knight0);
    }

    #[test]
    fn certain_roll_promotes_once_per_call() {
        let mut rng = GameRng::from_seed(1);
        let mut a = Agent::new(
            Profession::Knight0,
            PlayerId(0),
            MapPos(0),
            AgentState::DefendingHut { next_knight: AgentId::INVALID },
        );
        // The roll passes for any generator value but 0xffff, so a couple
        // of periods are enough.
        let mut tick = 100u16;
        let mut promoted = false;
        for _ in 0..4 {
            if a.train_knight(tick, u16::MAX, &mut rng) {
                promoted = true;
                break;
            }
            tick = tick.wrapping_add(6000);
        }
        assert!(promoted);
        assert_eq!(a.profession, Profession::Knight1);
        assert_eq!(a.counter, 6000);
    }
}

mod arena {
    use super::helpers::*;
    use super::*;

    #[test]
    fn removed_indices_are_reused() {
        let mut store = AgentStore::new();
        let a = store.add(walker(0));
        let b = store.add(walker(1));
        store.remove(a);
        let c = store.add(walker(2));
        assert_eq!(c, a);
        assert_ne!(c, b);
    }

    #[test]
    fn pair_access_requires_two_live_agents() {
        let mut store = AgentStore::new();
        let a = store.add(walker(0));
        let b = store.add(walker(1));
        assert!(store.get_pair_mut(a, b).is_some());
        assert!(store.get_pair_mut(a, a).is_none());
        store.remove(b);
        assert!(store.get_pair_mut(a, b).is_none());
    }

    #[test]
    fn census_counts_by_player() {
        let mut store = AgentStore::new();
        store.add(walker(0));
        let mut other = walker(0);
        other.player = PlayerId(1);
        store.add(other);
        assert_eq!(store.count_for(PlayerId(0)), 1);
        assert_eq!(store.count_for(PlayerId(1)), 1);
    }
}
