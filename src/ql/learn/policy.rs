use rand::prelude::ThreadRng;
use rand::Rng;

/// Epsilon-greedy exploration schedule with linear decay.
///
/// Epsilon starts at `epsilon_max` and moves linearly towards `epsilon_min`,
/// which it reaches exactly after `epsilon_decay_steps` steps and keeps from
/// then on. The clamp is required - the bare interpolation would keep walking
/// past `epsilon_min` on longer runs.
pub struct EpsilonGreedyPolicy {
    /// Maximum epsilon greedy parameter
    epsilon_max: f64,
    /// Minimum epsilon greedy parameter
    epsilon_min: f64,
    /// Number of steps until epsilon reaches `epsilon_min`
    epsilon_decay_steps: f64,
}

impl EpsilonGreedyPolicy {
    pub fn new(
        epsilon_max: f64,
        epsilon_min: f64,
        epsilon_decay_steps: f64,
    ) -> Self {
        Self {
            epsilon_max,
            epsilon_min,
            epsilon_decay_steps,
        }
    }

    /// Exploration probability after `step_count` environment steps
    pub fn epsilon(
        &self,
        step_count: usize,
    ) -> f64 {
        let progress = f64::min(step_count as f64 / self.epsilon_decay_steps, 1.0);
        self.epsilon_max - self.epsilon_interval() * progress
    }

    /// Draws once from `rng` and decides whether the next action shall be an
    /// exploration step (random action) instead of an exploitation step
    /// (model-predicted action)
    pub fn explore(
        &self,
        step_count: usize,
        rng: &mut ThreadRng,
    ) -> bool {
        self.epsilon(step_count) > rng.gen_range(0_f64..1_f64)
    }

    fn epsilon_interval(&self) -> f64 {
        self.epsilon_max - self.epsilon_min
    }
}
