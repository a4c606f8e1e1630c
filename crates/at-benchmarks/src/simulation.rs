//! Simulated training curves.
//!
//! A simulated run starts at the benchmark value `f(x, y)` and must reach
//! `f(x, y) - descent` at the horizon. At each step a gamma-distributed
//! "aggressiveness" decides whether the loss holds, bites into the remaining
//! debt, or spikes up. The gamma mode is always `k`, and its variance shrinks
//! as the horizon approaches, so late steps are calmer.

use at_types::EvaluationError;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Gamma};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Step at which the trajectory reaches its target.
    pub horizon: usize,
    /// Total drop from the starting value to the target.
    pub descent: f64,
    /// Gamma mode; aggressiveness equal to `k` is neutral.
    pub k: f64,
    /// Share of the remaining debt an aggressive step takes.
    pub h1: f64,
    /// Exponent of the time pull toward the target.
    pub h2: f64,
    /// Size of upward spikes.
    pub h3: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            horizon: 81,
            descent: 200.0,
            k: 2.0,
            h1: 0.6,
            h2: 2.0,
            h3: 0.15,
        }
    }
}

impl SimulationConfig {
    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }
}

/// One resumable simulated training run.
#[derive(Debug, Clone)]
pub struct TrainingSimulator {
    config: SimulationConfig,
    target: f64,
    /// `trajectory[t]` is the loss after `t` steps.
    trajectory: Vec<f64>,
    rng: StdRng,
}

impl TrainingSimulator {
    pub fn new(start: f64, config: SimulationConfig, rng: StdRng) -> Self {
        Self {
            target: start - config.descent,
            config,
            trajectory: vec![start],
            rng,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn start(&self) -> f64 {
        self.trajectory[0]
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    /// Steps simulated so far.
    pub fn steps(&self) -> usize {
        self.trajectory.len() - 1
    }

    pub fn value_at(&self, step: usize) -> Option<f64> {
        self.trajectory.get(step).copied()
    }

    /// Loss after `step` steps, simulating whatever is missing. Steps already
    /// simulated are never redrawn.
    pub fn advance_to(&mut self, step: usize) -> Result<f64, EvaluationError> {
        while self.trajectory.len() <= step {
            let t = self.trajectory.len() - 1;
            let next = self.next_value(t)?;
            self.trajectory.push(next);
        }
        Ok(self.trajectory[step])
    }

    fn next_value(&mut self, t: usize) -> Result<f64, EvaluationError> {
        let n = self.config.horizon;
        let current = self.trajectory[t];
        // The last step before the horizon always lands on the target.
        if t + 1 >= n {
            return Ok(self.target);
        }

        let aggressiveness = self.aggressiveness(t)?;
        let k = self.config.k;
        let next = if aggressiveness > k {
            let debt = self.target - current;
            let bitten = current + (aggressiveness - k) * self.config.h1 * debt / 100.0;
            let progress = t as f64 / (n - 1) as f64;
            bitten + (self.target - bitten) * progress.powf(self.config.h2)
        } else if aggressiveness < k {
            current + self.config.h3 * (n - t) as f64
        } else {
            current
        };
        Ok(next)
    }

    fn aggressiveness(&mut self, t: usize) -> Result<f64, EvaluationError> {
        let k = self.config.k;
        let remaining = (self.config.horizon + 1 - t) as f64;
        let beta = (k + (k * k + 4.0 * remaining).sqrt()) / (2.0 * remaining);
        let shape = k * beta + 1.0;
        let gamma = Gamma::new(shape, 1.0 / beta).map_err(|e| EvaluationError::Failed {
            message: format!("invalid aggressiveness distribution at step {t}: {e}"),
        })?;
        Ok(gamma.sample(&mut self.rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;

    fn simulator(seed: u64) -> TrainingSimulator {
        TrainingSimulator::new(50.0, SimulationConfig::default(), StdRng::seed_from_u64(seed))
    }

    #[test]
    fn step_zero_is_the_starting_value() {
        let mut sim = simulator(1);
        assert_eq!(sim.advance_to(0).unwrap(), 50.0);
        assert_eq!(sim.steps(), 0);
        assert_eq!(sim.target(), -150.0);
    }

    #[test]
    fn reaches_target_at_horizon_and_holds() {
        for seed in 0..20 {
            let mut sim = simulator(seed);
            assert_eq!(sim.advance_to(81).unwrap(), -150.0);
            assert_eq!(sim.advance_to(100).unwrap(), -150.0);
        }
    }

    #[test]
    fn resuming_keeps_the_trajectory() {
        let mut resumed = simulator(7);
        let at_9 = resumed.advance_to(9).unwrap();
        let at_27 = resumed.advance_to(27).unwrap();

        let mut straight = simulator(7);
        assert_eq!(straight.advance_to(27).unwrap(), at_27);
        assert_eq!(straight.value_at(9), Some(at_9));
        assert_eq!(resumed.advance_to(9).unwrap(), at_9);
        assert_eq!(resumed.steps(), 27);
    }

    #[test]
    fn short_horizon_is_valid() {
        let config = SimulationConfig::default().with_horizon(1);
        let mut sim = TrainingSimulator::new(3.0, config, StdRng::seed_from_u64(3));
        assert_eq!(sim.advance_to(1).unwrap(), 3.0 - 200.0);
    }

    proptest! {
        #[test]
        fn any_trajectory_lands_on_its_target(
            seed in any::<u64>(),
            start in -100.0f64..500.0,
            horizon in 1usize..120,
            checkpoint in 0usize..120,
        ) {
            let config = SimulationConfig::default().with_horizon(horizon);
            let mut resumed = TrainingSimulator::new(start, config, StdRng::seed_from_u64(seed));
            let midway = resumed.advance_to(checkpoint.min(horizon)).unwrap();
            prop_assert!(midway.is_finite());
            prop_assert_eq!(resumed.advance_to(horizon).unwrap(), start - 200.0);

            let mut straight = TrainingSimulator::new(start, config, StdRng::seed_from_u64(seed));
            prop_assert_eq!(straight.advance_to(horizon).unwrap(), start - 200.0);
            prop_assert_eq!(straight.value_at(checkpoint.min(horizon)), Some(midway));
        }
    }
}
