//! The agent aggregate and the animation timing shared by all handlers.

use fief_core::{Direction, GameRng, PlayerId, Profession};
use fief_grid::MapPos;

use crate::state::AgentState;

/// Counter value an animation runs for, indexed by animation number.
/// Walking animations (0..=80) are 9 rows of 9, one row per direction
/// crossed with the height difference of the step.
pub const ANIMATION_COUNTER: [i32; 181] = [
    // Walking (0-80)
    511, 447, 383, 319, 255, 319, 511, 767, 1023,
    511, 447, 383, 319, 255, 319, 511, 767, 1023,
    511, 447, 383, 319, 255, 319, 511, 767, 1023,
    511, 447, 383, 319, 255, 319, 511, 767, 1023,
    511, 447, 383, 319, 255, 319, 511, 767, 1023,
    511, 447, 383, 319, 255, 319, 511, 767, 1023,
    511, 447, 383, 319, 255, 319, 511, 767, 1023,
    511, 447, 383, 319, 255, 319, 511, 767, 1023,
    511, 447, 383, 319, 255, 319, 511, 767, 1023,
    // Waiting (81-86)
    127, 127, 127, 127, 127, 127,
    // Digging (87-88)
    383, 383,
    // Digging steps (89-97)
    255, 223, 191, 159, 127, 159, 255, 383, 511,
    // Building (98)
    255,
    // Engage defending free (99)
    255,
    // Building large building (100)
    255,
    0,
    // Building (102-105)
    767, 511, 511, 767,
    1023, 639, 639, 1023,
    // Transporting (110-115)
    63, 63, 63, 63, 63, 63,
    // Logging (116-120)
    1023, 31, 767, 767, 255,
    // Planting (121-122)
    191, 127,
    // Stonecutting (123)
    1535,
    // Sawing (124)
    2367,
    // Mining (125-128)
    383, 303, 303, 383,
    // Smelting (129-130)
    383, 383,
    // Fishing (131-134)
    767, 767, 127, 127,
    // Farming (135-136)
    1471, 1983,
    // Milling (137)
    383,
    // Baking (138)
    767,
    // Pig farming (139)
    383,
    // Butchering (140)
    1535,
    // Sampling geology (141-142)
    783, 63,
    // Making weapon (143)
    575,
    // Making tool (144)
    1535,
    // Building boat (145-146)
    1407, 159,
    // Attacking (147-156)
    127, 127, 127, 127, 127, 127, 127, 127, 127, 127,
    // Defending (157-166)
    127, 127, 127, 127, 127, 127, 127, 127, 127, 127,
    // Engage attacking (167)
    191,
    // Victory attacking (168)
    7,
    // Dying attacking (169-173)
    255, 255, 255, 255, 255,
    // Dying defending (174-178)
    255, 255, 255, 255, 255,
    // Occupy attacking (179)
    127,
    // Victory defending (180)
    7,
];

/// Whether and which way an agent is waiting for a blocked cell.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Waiting {
    No,
    /// Waiting, but the handler could not pin a single direction.
    Any,
    Toward(Direction),
}

/// The walking animation for a step of height difference `h_diff` in
/// `dir`.  `switch_pos` picks the swap variant for the three directions
/// where two swapping agents would otherwise overlap.
pub fn walking_animation(h_diff: i32, dir: Direction, switch_pos: bool) -> i32 {
    let mut d = dir.index() as i32;
    if switch_pos && d < 3 {
        d += 6;
    }
    4 + h_diff + 9 * d
}

/// One simulated person.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Agent {
    pub profession: Profession,
    pub player: PlayerId,
    pub pos: MapPos,
    /// Wrapping tick of the last update; deltas are taken mod 2^16.
    pub tick: u16,
    pub animation: i32,
    /// Time credit of the current activity; the handler acts when it
    /// drops below zero.
    pub counter: i32,
    pub state: AgentState,
}

impl Agent {
    pub fn new(profession: Profession, player: PlayerId, pos: MapPos, state: AgentState) -> Agent {
        Agent { profession, player, pos, tick: 0, animation: 0, counter: 0, state }
    }

    /// Reload the counter from the current animation.
    pub fn counter_from_animation(&mut self) {
        self.counter = ANIMATION_COUNTER[self.animation as usize];
    }

    /// Is this agent waiting for a blocked cell, and in which direction
    /// does it want to move?  Drives the head-on swap protocol.
    pub fn waiting_dir(&self) -> Waiting {
        const DIR_FROM_OFFSET: [Option<Direction>; 9] = [
            Some(Direction::UpLeft), Some(Direction::Up),        None,
            Some(Direction::Left),   None,                       Some(Direction::Right),
            None,                    Some(Direction::Down),      Some(Direction::DownRight),
        ];

        match &self.state {
            AgentState::Walking { dir, .. }
            | AgentState::Transporting { dir, .. }
            | AgentState::Delivering { dir, .. }
                if *dir < 0 =>
            {
                Waiting::Toward(Direction::from_u8((*dir + 6) as u8))
            }
            AgentState::FreeWalking(fw)
            | AgentState::KnightFreeWalking(fw)
            | AgentState::StoneCutterFreeWalking(fw)
                if self.animation == 82 =>
            {
                let dx = fw.dist_col;
                let dy = fw.dist_row;
                if dx.abs() <= 1 && dy.abs() <= 1 {
                    match DIR_FROM_OFFSET[((dx + 1) + 3 * (dy + 1)) as usize] {
                        Some(d) => Waiting::Toward(d),
                        None => Waiting::Any,
                    }
                } else {
                    Waiting::Any
                }
            }
            AgentState::Digging { substate, dig_pos, .. } if *substate < 0 => {
                let d = *dig_pos;
                let dir = if d == 0 { Direction::Up } else { Direction::from_u8((6 - d) as u8) };
                Waiting::Toward(dir)
            }
            _ => Waiting::No,
        }
    }

    /// Accept a swap with an agent stepping into our cell from `dir`.
    /// Returns `false` when this agent cannot move right now.
    pub fn switch_waiting(&mut self, dir: Direction) -> bool {
        match &mut self.state {
            AgentState::Walking { dir: d, .. }
            | AgentState::Transporting { dir: d, .. }
            | AgentState::Delivering { dir: d, .. }
                if *d < 0 =>
            {
                *d = dir.reverse().index() as i32;
                true
            }
            AgentState::FreeWalking(fw)
            | AgentState::KnightFreeWalking(fw)
            | AgentState::StoneCutterFreeWalking(fw)
                if self.animation == 82 =>
            {
                let di = dir.index() as i32;
                let sign = if di < 3 { 1 } else { -1 };
                let dx = sign * i32::from(di % 3 < 2);
                let dy = sign * i32::from(di % 3 > 0);
                fw.dist_col -= dx;
                fw.dist_row -= dy;
                if fw.dist_col == 0 && fw.dist_row == 0 {
                    // Arrived by being swapped onto the target.
                    fw.flags = 8;
                }
                true
            }
            _ => false,
        }
    }

    /// Run the training clock of a garrisoned knight.  Each expired period
    /// rolls `p` against the generator for a promotion.  Returns `true`
    /// when a level was gained.
    pub fn train_knight(&mut self, tick: u16, p: u16, rng: &mut GameRng) -> bool {
        let delta = tick.wrapping_sub(self.tick);
        self.tick = tick;
        self.counter -= i32::from(delta);

        while self.counter < 0 {
            if rng.random() < p {
                self.profession = self.profession.promoted();
                self.counter = 6000;
                return true;
            }
            self.counter += 6000;
        }
        false
    }
}
