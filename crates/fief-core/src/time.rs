//! Simulation time model.
//!
//! Time is a monotonically increasing `Tick` counter.  One scheduler pass
//! advances the counter by the configured game speed (not by 1), and each
//! agent records the tick at which it was last updated; the difference is
//! the elapsed delta its state handler consumes.  Agent-internal countdowns
//! are signed and may overshoot below zero — the overrun carries into the
//! next handler step, which keeps long-period behaviors exact regardless of
//! game speed.

use std::fmt;

// ── Tick ─────────────────────────────────────────────────────────────────────

/// An absolute simulation tick counter.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tick(pub u32);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    /// The tick `n` steps after `self`.
    #[inline]
    pub fn offset(self, n: u32) -> Tick {
        Tick(self.0.wrapping_add(n))
    }

    /// Ticks elapsed from `earlier` to `self`, wrapping-safe.
    #[inline]
    pub fn since(self, earlier: Tick) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }
}

impl std::ops::Add<u32> for Tick {
    type Output = Tick;
    #[inline]
    fn add(self, rhs: u32) -> Tick {
        Tick(self.0.wrapping_add(rhs))
    }
}

impl std::ops::Sub for Tick {
    type Output = u32;
    #[inline]
    fn sub(self, rhs: Tick) -> u32 {
        self.0.wrapping_sub(rhs.0)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

// ── SimConfig ─────────────────────────────────────────────────────────────────

/// Ticks added per scheduler pass at normal speed.
pub const DEFAULT_GAME_SPEED: u32 = 2;

/// Top-level simulation configuration.
///
/// Typically loaded from a TOML/JSON file by the host application and passed
/// to `World::new`.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimConfig {
    /// Ticks the world clock advances per scheduler pass.  Raising this
    /// fast-forwards the simulation without changing any outcome ordering.
    pub game_speed: u32,

    /// Master RNG seed.  The same seed always produces identical results.
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            game_speed: DEFAULT_GAME_SPEED,
            seed:       0,
        }
    }
}
