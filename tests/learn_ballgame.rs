use anyhow::Result;
use candle_core::Device;
use dql::ql::learn::double_q_learner::{DoubleQLearner, Parameter};
use dql::ql::ml_model::candle::optimizer::OptimizerConfig;
use dql::ql::ml_model::candle::q_learning_model::QLearningCandleModel;
use dql::test::ballgame_test_environment::BallGameTestEnvironment;
use dql::util::log::init_logging;

const BATCH_SIZE: usize = 32;

#[test]
fn test_learn_ballgame_within_budgets() -> Result<()> {
    init_logging();

    let mut param = Parameter::default();
    param.max_steps = 5_000;
    param.max_episodes = 1_000;
    param.replay_buffer_len = 2_000;
    param.update_target_network_after_num_steps = 500;
    param.epsilon_decay_steps = 2_000.0;
    param.stats_after_steps = 1_000;

    let model_init = || {
        QLearningCandleModel::<BallGameTestEnvironment, BATCH_SIZE>::new(
            3 * 3 * 4,
            &[64, 64],
            OptimizerConfig::default(),
            Device::Cpu,
        )
    };

    let environment = BallGameTestEnvironment::default();
    let mut learner = DoubleQLearner::new(environment, param, model_init)?;

    learner.learn()?;

    // one of the two budgets ended the run
    assert!(learner.step_count() >= 5_000 || learner.episode_count() >= 1_000);
    assert!(!learner.episode_rewards().is_empty());
    assert!(learner.episode_rewards().iter().all(|r| r.is_finite()));
    assert!(learner.replay_buffer().len() >= BATCH_SIZE);

    Ok(())
}
