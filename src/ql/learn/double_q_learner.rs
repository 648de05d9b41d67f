use std::rc::Rc;

use anyhow::Result;
use itertools::Itertools;
use num_format::ToFormattedString;
use rand::prelude::ThreadRng;
use rand::Rng;
use rustc_hash::FxHashMap;

use crate::ql::learn::policy::EpsilonGreedyPolicy;
use crate::ql::learn::replay_buffer::{ReplayBuffer, Transition};
use crate::ql::ml_model::model::{argmax, DeepQLearningModel};
use crate::ql::prelude::{Action, Environment};
use crate::util::format;
use crate::util::immutable::Immutable;

/// Number of most recent episode rewards feeding the periodic stats line
const EPISODE_REWARD_STATS_LEN: usize = 100;

pub struct Parameter {
    /// Discount rate; (0 <= 𝛾 <= 1) represents the value of future rewards. The bigger, the more farsighted the agent becomes
    pub gamma: f32,
    /// Maximum epsilon greedy parameter
    pub epsilon_max: f64,
    /// Minimum epsilon greedy parameter
    pub epsilon_min: f64,
    // Number of steps over which epsilon anneals from max to min
    pub epsilon_decay_steps: f64,
    // Maximum replay length
    pub replay_buffer_len: usize,
    // After how many steps we want to update the stabilized network
    pub update_target_network_after_num_steps: usize,
    /// Total step budget across all episodes
    pub max_steps: usize,
    /// Episode budget
    pub max_episodes: usize,
    pub stats_after_steps: usize,
}

impl Default for Parameter {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            epsilon_max: 1.0,
            epsilon_min: 0.1,
            epsilon_decay_steps: 1_000_000.0,
            replay_buffer_len: 10_000_000,
            update_target_network_after_num_steps: 10_000,
            max_steps: 50_000_000,
            max_episodes: 10_000,
            stats_after_steps: 25_000,
        }
    }
}

/// Double deep Q-learning trainer driving a single agent through its environment.
pub struct DoubleQLearner<E, M, const BATCH_SIZE: usize>
where
    E: Environment,
    M: DeepQLearningModel<BATCH_SIZE, E = E>,
{
    environment: E,
    param: Immutable<Parameter>,
    rng: ThreadRng,
    policy: EpsilonGreedyPolicy,
    model: M,
    // "target network"
    stabilized_model: M,
    replay_buffer: ReplayBuffer<E::S, E::A>,
    step_count: usize,
    episode_count: usize,
    episode_rewards: Vec<f32>,
}

impl<E, M, const BATCH_SIZE: usize> DoubleQLearner<E, M, BATCH_SIZE>
where
    E: Environment,
    M: DeepQLearningModel<BATCH_SIZE, E = E>,
{
    pub fn new(
        environment: E,
        param: Parameter,
        model_init: fn() -> Result<M>,
    ) -> Result<Self> {
        let policy = EpsilonGreedyPolicy::new(param.epsilon_max, param.epsilon_min, param.epsilon_decay_steps);
        let replay_buffer = ReplayBuffer::new(param.replay_buffer_len);
        let model = model_init()?;
        let mut stabilized_model = model_init()?;
        stabilized_model.load_parameters(&model.parameters()?)?;
        stabilized_model.set_training_mode(false);

        Ok(Self {
            environment,
            param: Immutable::new(param),
            rng: rand::thread_rng(),
            policy,
            model,
            stabilized_model,
            replay_buffer,
            step_count: 0,
            episode_count: 0,
            episode_rewards: Vec::new(),
        })
    }

    /// Runs learning episodes until either the total step budget or the
    /// episode budget is exhausted
    pub fn learn(&mut self) -> Result<()> {
        while self.step_count < self.param.max_steps && self.episode_count < self.param.max_episodes {
            self.learn_episode()?;
        }
        Ok(())
    }

    /// Plays a single episode on a freshly reset environment and trains on a
    /// sampled batch when the episode finishes.
    pub fn learn_episode(&mut self) -> Result<()> {
        self.environment.reset();

        let mut state = self.environment.state_as_rc();
        log::trace!("started learning episode {}", self.episode_count);

        let mut episode_reward: f32 = 0.0;

        loop {
            self.step_count += 1;

            // Use epsilon-greedy for exploration
            let action: E::A = if self.policy.explore(self.step_count, &mut self.rng) {
                // Take random action
                let a = self.rng.gen_range(0..E::A::ACTION_SPACE);
                Action::try_from_numeric(a)?
            } else {
                // Predict best action from environment state
                self.model.predict_action(&state)?
            };

            // Apply the sampled action in our environment
            let (reward, done) = self.environment.step(action);
            log::trace!("step with action {} resulted in reward: {:.2}, done: {}", action, reward, done);

            episode_reward += reward;

            if !done {
                // Save action and states in replay buffer; a terminal step is
                // not stored, its reward only counts towards the episode reward
                let next_state = self.environment.state_as_rc();
                self.replay_buffer.add(Transition {
                    state,
                    action,
                    reward,
                    next_state: Rc::clone(&next_state),
                    terminal: false,
                });
                state = next_state;
            } else {
                self.batch_train()?;
                self.episode_rewards.push(episode_reward);
                break;
            }

            // Refresh the stabilized network with the current weights every n steps
            if self.step_count % self.param.update_target_network_after_num_steps == 0 {
                self.sync_target_network()?;
            }

            if self.step_count % self.param.stats_after_steps == 0 {
                self.learning_update_log();
            }

            if self.step_count >= self.param.max_steps {
                break;
            }
        }

        self.episode_count += 1;

        Ok(())
    }

    /// Copies the current model weights into the stabilized model
    pub fn sync_target_network(&mut self) -> Result<()> {
        self.stabilized_model.load_parameters(&self.model.parameters()?)?;
        self.stabilized_model.set_training_mode(false);
        log::debug!("stabilized model refreshed at step {}", self.step_count);
        Ok(())
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn episode_count(&self) -> usize {
        self.episode_count
    }

    /// Total rewards of all finished episodes in chronological order
    pub fn episode_rewards(&self) -> &[f32] {
        &self.episode_rewards
    }

    pub fn replay_buffer(&self) -> &ReplayBuffer<E::S, E::A> {
        &self.replay_buffer
    }

    /// Trains the model on one randomly sampled batch of transitions.
    /// Does nothing while the replay buffer holds fewer than `BATCH_SIZE` entries.
    fn batch_train(&mut self) -> Result<()> {
        if self.replay_buffer.len() < BATCH_SIZE {
            return Ok(());
        }

        let samples = self.replay_buffer.sample(&mut self.rng)?;

        // Double Q: the current model picks the best next action, the
        // stabilized model values it
        let next_q_values = self.model.batch_predict_q_values(samples.next_state)?;
        let next_q_values_stabilized = self.stabilized_model.batch_predict_q_values(samples.next_state)?;
        let updated_q_values = double_q_targets(&next_q_values, &next_q_values_stabilized, &samples.reward, self.param.gamma);

        let loss = self.model.train(&self.stabilized_model, samples.state, samples.action, updated_q_values)?;
        log::debug!("step {}: trained on a batch with loss {:.5}", self.step_count, loss);

        Ok(())
    }

    fn learning_update_log(&self) {
        let number_format = format::number_format();

        let recent_rewards = &self.episode_rewards[self.episode_rewards.len().saturating_sub(EPISODE_REWARD_STATS_LEN)..];
        let (reward_mean, reward_low) = match recent_rewards {
            [] => (0.0, 0.0),
            _ => (
                recent_rewards.iter().sum::<f32>() / recent_rewards.len() as f32,
                recent_rewards.iter().copied().fold(f32::INFINITY, f32::min),
            ),
        };

        let mut action_counts = FxHashMap::<E::A, usize>::default();
        for transition in self.replay_buffer.iter() {
            action_counts.entry(transition.action).and_modify(|e| *e += 1).or_insert(1);
        }

        let total_actions = self.replay_buffer.len();
        let action_distribution_line = action_counts
            .iter()
            .map(|(&action, &count)| {
                let ratio = 100.0 * count as f32 / total_actions as f32;
                format!("{} {:.1}%", action, ratio)
            })
            .join(", ");

        log::info!(
            "\n\
    episode: {}, steps: {}, 𝛾={:.2}, 𝜀={:.2}, recent_episode_rewards: {{mean: {:.1}, low: {:.1}}}\n\
    action_distribution (of last {}): {}",
            self.episode_count.to_formatted_string(&number_format),
            self.step_count.to_formatted_string(&number_format),
            self.param.gamma,
            self.policy.epsilon(self.step_count),
            reward_mean,
            reward_low,
            total_actions.to_formatted_string(&number_format),
            action_distribution_line
        );
    }
}

/// Learning target per sample: `reward + 𝛾 * Q_stabilized[best_next_action]`,
/// with `best_next_action` chosen by the current model's Q-values.
fn double_q_targets<const N: usize>(
    next_q_values: &[Vec<f32>; N],
    next_q_values_stabilized: &[Vec<f32>; N],
    rewards: &[f32; N],
    gamma: f32,
) -> [f32; N] {
    let mut result = [0_f32; N];
    for i in 0..N {
        let best_next_action = argmax(&next_q_values[i]);
        result[i] = rewards[i] + gamma * next_q_values_stabilized[i][best_next_action];
    }
    result
}
