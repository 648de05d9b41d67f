pub mod optimizer;
pub mod q_learning_model;
