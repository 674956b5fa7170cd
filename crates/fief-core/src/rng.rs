//! Deterministic simulation RNG.
//!
//! # Determinism strategy
//!
//! All randomness in a run flows from one `GameRng` owned by the world, so
//! replaying the same snapshot and command sequence reproduces every draw.
//! The generator is a 48-bit add/xor/rotate feedback register over three
//! 16-bit words.  It is intentionally tiny: the state serializes into any
//! snapshot, and the 16-bit output is exactly what the behavior tables
//! (spiral picks, combat rolls, breeding odds) mask bits out of.

use crate::ids::AgentId;

/// 64-bit fractional golden-ratio constant for seed mixing.
const MIXING_CONSTANT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Deterministic 16-bit-output RNG with fully serializable state.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GameRng {
    state: [u16; 3],
}

impl GameRng {
    /// Seed deterministically from a 64-bit value.
    pub fn from_seed(seed: u64) -> Self {
        let mixed = seed.wrapping_mul(MIXING_CONSTANT) | 1;
        GameRng {
            state: [mixed as u16, (mixed >> 16) as u16, (mixed >> 32) as u16],
        }
    }

    /// Seed from OS entropy — for interactive runs that are not replayed.
    pub fn from_entropy() -> Self {
        Self::from_seed(rand::random::<u64>())
    }

    /// Construct from raw words (snapshot restore, tests).
    pub fn from_state(state: [u16; 3]) -> Self {
        GameRng { state }
    }

    /// The raw state words.
    pub fn state(&self) -> [u16; 3] {
        self.state
    }

    /// Next 16-bit draw.
    pub fn random(&mut self) -> u16 {
        let s = &mut self.state;
        let r = s[0].wrapping_add(s[1]) ^ s[2];
        s[2] = s[2].wrapping_add(s[1]);
        s[1] ^= s[2];
        s[1] = s[1].rotate_right(1);
        s[2] = s[2].rotate_right(1);
        s[0] = r;
        r
    }

    /// Derive an independent stream for one agent, e.g. for scattering a
    /// garrison without perturbing the main stream.
    pub fn child(&mut self, agent: AgentId) -> GameRng {
        let base = self.random() as u64 ^ (agent.0 as u64).wrapping_mul(MIXING_CONSTANT);
        GameRng::from_seed(base)
    }
}

impl Default for GameRng {
    fn default() -> Self {
        GameRng::from_seed(0x5eed)
    }
}
