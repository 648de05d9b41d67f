use std::fmt::{Display, Formatter};
use std::hash::Hash;
use std::rc::Rc;

use anyhow::Result;

/// Data type we use to encode an `Action` to feed the model.
/// This one should fit for all usage szenarios (for now).
pub type ModelActionType = u8;

pub trait Action: Display + Sized + Clone + Copy + Hash + PartialEq + Eq {
    /// Number of possible actions
    const ACTION_SPACE: ModelActionType;
    /// Identifying the Action as a unique value in range (0..Self::action_space)
    fn numeric(&self) -> ModelActionType;
    fn try_from_numeric(value: ModelActionType) -> Result<Self>;
}

/// Learning environment, modeling the world of a learning agent
pub trait Environment {
    /// State representation - covering all needs
    type S: Clone;
    type A: Action;

    /// Resets the environment to a defined starting point
    fn reset(&mut self);

    /// Current state observation
    fn state(&self) -> &Self::S;

    /// Convenience wrapper around [Self::state], taking a snapshot of the
    /// current state, which stays independent of the environment's live state.
    fn state_as_rc(&self) -> Rc<Self::S> {
        Rc::new(self.state().clone())
    }

    /// Performs one time/action-step.
    ///
    /// Applies the given `action` to the environment and returns:
    ///   - immediate reward earned during performing that step
    ///   - done flag (e.g. game ended)
    ///
    /// The follow-up state is obtained via [Self::state] / [Self::state_as_rc].
    fn step(
        &mut self,
        action: Self::A,
    ) -> (f32, bool);
}

#[derive(Debug)]
pub enum DqlError {
    /// A numeric action value outside the environment's action space
    InvalidAction(String),
    /// Tensor or batch dimensions not lining up with the expected shape
    ShapeMismatch(String),
    /// More samples requested from a replay buffer than it currently holds
    InsufficientData(String),
    /// Any other fault inside a model backend
    Model(String),
}

impl DqlError {
    pub fn from(msg: &str) -> Self {
        DqlError::Model(msg.to_string())
    }
}

impl Display for DqlError {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            DqlError::InvalidAction(msg) => write!(f, "invalid action: {}", msg),
            DqlError::ShapeMismatch(msg) => write!(f, "shape mismatch: {}", msg),
            DqlError::InsufficientData(msg) => write!(f, "insufficient data: {}", msg),
            DqlError::Model(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for DqlError {}
