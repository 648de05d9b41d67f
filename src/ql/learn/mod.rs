pub mod double_q_learner;
pub mod policy;
pub mod replay_buffer;
