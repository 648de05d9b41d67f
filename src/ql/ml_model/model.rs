use std::rc::Rc;

use anyhow::Result;
use candle_core::{Device, Tensor};

use crate::ql::prelude::Environment;

pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Generic capability to produce a tensor out of an object or a batch of objects.
pub trait ToTensor {
    /// Dimensions of the produced tensor (for a single object).
    ///
    /// # Examples
    /// E.g we would use dimensions `[600,600,4]` for an environment state, which is represented
    /// by a series of four grayscale frames with a frame size of 600x600.
    fn dims(&self) -> &[usize];

    /// Produces a tensor with the dimensions returned by [Self::dims] on `device`
    fn to_tensor(
        &self,
        device: &Device,
    ) -> Result<Tensor>;

    /// Produces a tensor from a batch of objects.
    /// The returned tensor has one axis (with len = `N`) more than the one
    /// for a single object (as returned by [Self::to_tensor]).
    fn batch_to_tensor<const N: usize>(
        batch: &[&Rc<Self>; N],
        device: &Device,
    ) -> Result<Tensor>;
}

/// 'Physical' AI model abstraction.
///
/// Both networks of a double deep Q-learning setup (primary and target) are
/// instances of one implementation of this trait. Parameters travel between
/// instances as named-tensor snapshots via [Self::parameters] and
/// [Self::load_parameters].
pub trait DeepQLearningModel<const BATCH_SIZE: usize = DEFAULT_BATCH_SIZE> {
    type E: Environment;

    /// Predicts the best action for the given state - the action with the
    /// highest Q-value. Among equally valued actions, the one with the lowest
    /// numeric value wins.
    fn predict_action(
        &self,
        state: &<Self::E as Environment>::S,
    ) -> Result<<Self::E as Environment>::A>;

    /// Per-action Q-values for a batch of states.
    /// Each returned row holds `ACTION_SPACE` values for one state.
    fn batch_predict_q_values(
        &self,
        states: [&Rc<<Self::E as Environment>::S>; BATCH_SIZE],
    ) -> Result<[Vec<f32>; BATCH_SIZE]>;

    /// Performs a single training step using a batch of data.
    ///
    /// The current Q-values entering the loss are produced by `q_value_model`
    /// and gathered at the taken `actions`, while the gradient step is applied
    /// to this model's trainable variables.
    ///
    /// # Arguments
    /// * `q_value_model` - model evaluating the current Q-values for `states`
    /// * `states` - batch of states
    /// * `actions` - batch of actions taken in `states`
    /// * `updated_q_values` - learning targets, one per sample
    ///
    /// # Returns
    ///   calculated loss
    fn train(
        &mut self,
        q_value_model: &Self,
        states: [&Rc<<Self::E as Environment>::S>; BATCH_SIZE],
        actions: [<Self::E as Environment>::A; BATCH_SIZE],
        updated_q_values: [f32; BATCH_SIZE],
    ) -> Result<f32>;

    /// Snapshot of all trainable variables by name.
    /// The returned tensors are independent copies - later training steps or
    /// [Self::load_parameters] calls on any model leave them untouched.
    fn parameters(&self) -> Result<Vec<(String, Tensor)>>;

    /// Overwrites this model's trainable variables with `parameters`
    /// (typically a [Self::parameters] snapshot of a sibling model)
    fn load_parameters(
        &mut self,
        parameters: &[(String, Tensor)],
    ) -> Result<()>;

    /// Switches between trainable and inference-only mode
    fn set_training_mode(
        &mut self,
        training: bool,
    );

    fn training_mode(&self) -> bool;
}

/// Index of the highest value; the lowest index wins on ties
pub fn argmax(values: &[f32]) -> usize {
    debug_assert!(!values.is_empty());
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}
