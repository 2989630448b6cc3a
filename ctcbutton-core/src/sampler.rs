//! State samplers: where the next round's "future" state comes from.
//!
//! The orchestrator only sees the [`StateSampler`] trait, so tests can script
//! the sequence exactly.

use crate::state::DeviceState;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

pub trait StateSampler {
    /// Draw the state shown at the start of the next round.
    fn sample(&mut self) -> DeviceState;
}

/// Uniform over `{0, 1}`, independent of history.
pub struct UniformSampler {
    rng: StdRng,
}

impl UniformSampler {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Reproducible sequence for a given seed
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for UniformSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl StateSampler for UniformSampler {
    fn sample(&mut self) -> DeviceState {
        if self.rng.random_bool(0.5) {
            DeviceState::On
        } else {
            DeviceState::Off
        }
    }
}

/// Replays a fixed script, then repeats its last value.
#[derive(Debug, Clone)]
pub struct ScriptedSampler {
    script: VecDeque<DeviceState>,
    last: DeviceState,
}

impl ScriptedSampler {
    /// An empty script behaves like `FixedSampler(Off)`.
    pub fn new(script: impl IntoIterator<Item = DeviceState>) -> Self {
        Self {
            script: script.into_iter().collect(),
            last: DeviceState::Off,
        }
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl StateSampler for ScriptedSampler {
    fn sample(&mut self) -> DeviceState {
        if let Some(next) = self.script.pop_front() {
            self.last = next;
        }
        self.last
    }
}

/// Always the same state.
#[derive(Debug, Clone, Copy)]
pub struct FixedSampler(pub DeviceState);

impl StateSampler for FixedSampler {
    fn sample(&mut self) -> DeviceState {
        self.0
    }
}

impl<S: StateSampler + ?Sized> StateSampler for Box<S> {
    fn sample(&mut self) -> DeviceState {
        (**self).sample()
    }
}
