//! Local input sampling for the lockstep session
//!
//! The session asks its input source for exactly one movement vector per
//! tick. Device capture lives behind the trait; the implementations here
//! cover headless operation.

use shared::Vec3;

pub trait InputSource {
    /// Samples the movement vector for `tick`.
    fn sample(&mut self, tick: u32) -> Vec3;
}

/// Produces no movement. Useful as a placeholder and in tests.
#[derive(Debug, Default)]
pub struct IdleInput;

impl InputSource for IdleInput {
    fn sample(&mut self, _tick: u32) -> Vec3 {
        Vec3::ZERO
    }
}

/// Cycles through a fixed movement pattern, holding each entry for a number
/// of ticks. Deterministic, which keeps bot traffic reproducible.
#[derive(Debug)]
pub struct ScriptedInput {
    pattern: Vec<Vec3>,
    ticks_per_entry: u32,
}

impl ScriptedInput {
    pub fn new(pattern: Vec<Vec3>, ticks_per_entry: u32) -> Self {
        Self {
            pattern,
            ticks_per_entry: ticks_per_entry.max(1),
        }
    }

    /// Walks a square: one leg per compass direction, 30 ticks each.
    pub fn square_walk() -> Self {
        Self::new(
            vec![
                Vec3::new(0.0, 0.0, 1.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, -1.0),
                Vec3::new(-1.0, 0.0, 0.0),
            ],
            30,
        )
    }
}

impl InputSource for ScriptedInput {
    fn sample(&mut self, tick: u32) -> Vec3 {
        if self.pattern.is_empty() {
            return Vec3::ZERO;
        }

        let index = (tick / self.ticks_per_entry) as usize % self.pattern.len();
        self.pattern[index]
    }
}
