use std::marker::PhantomData;
use std::rc::Rc;

use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{Linear, Module, VarBuilder, VarMap};
use itertools::Itertools;

use crate::ql::ml_model::candle::optimizer::{Optimizer, OptimizerConfig};
use crate::ql::ml_model::model::{argmax, DeepQLearningModel, ToTensor, DEFAULT_BATCH_SIZE};
use crate::ql::prelude::{Action, DqlError, Environment, ModelActionType};

/// Fully connected Q-network: hidden ReLU layers followed by a linear output
/// with one Q-value per action.
struct Mlp {
    layers: Vec<Linear>,
}

impl Mlp {
    fn new(
        vb: VarBuilder,
        state_len: usize,
        hidden_layer_units: &[usize],
        out_len: usize,
    ) -> Result<Self> {
        let mut layers = Vec::with_capacity(hidden_layer_units.len() + 1);
        let mut in_len = state_len;
        for (i, &units) in hidden_layer_units.iter().enumerate() {
            layers.push(candle_nn::linear(in_len, units, vb.pp(format!("ln{}", i + 1)))?);
            in_len = units;
        }
        layers.push(candle_nn::linear(in_len, out_len, vb.pp("out"))?);
        Ok(Mlp { layers })
    }
}

impl Module for Mlp {
    fn forward(
        &self,
        xs: &Tensor,
    ) -> candle_core::Result<Tensor> {
        let (out, hidden) = self.layers.split_last().expect("should have at least the output layer");
        let mut xs = xs.clone();
        for layer in hidden {
            xs = layer.forward(&xs)?.relu()?;
        }
        out.forward(&xs)
    }
}

/// Q-network on the candle backend together with its gradient optimizer.
///
/// All trainable variables live in a [VarMap]. Named snapshots of those travel
/// between sibling instances via [DeepQLearningModel::parameters] and
/// [DeepQLearningModel::load_parameters].
pub struct QLearningCandleModel<E, const BATCH_SIZE: usize = DEFAULT_BATCH_SIZE> {
    device: Device,
    varmap: VarMap,
    network: Mlp,
    optimizer: Optimizer,
    training: bool,
    _phantom: PhantomData<E>,
}

impl<E, const BATCH_SIZE: usize> QLearningCandleModel<E, BATCH_SIZE>
where
    E: Environment,
    <E as Environment>::S: ToTensor,
{
    /// Creates a model with freshly initialized weights.
    ///
    /// # Arguments
    /// * `state_len` number of elements of a flattened state tensor; e.g. `3 * 3 * 4` for a state with dimensions `[3,3,4]`
    /// * `hidden_layer_units` output width of each hidden layer
    /// * `optimizer_config` gradient optimizer setup applied to this model's variables
    /// * `device` compute device holding the variables
    pub fn new(
        state_len: usize,
        hidden_layer_units: &[usize],
        optimizer_config: OptimizerConfig,
        device: Device,
    ) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let network = Mlp::new(vb, state_len, hidden_layer_units, E::A::ACTION_SPACE as usize)?;
        let optimizer = optimizer_config.build(varmap.all_vars())?;

        log::debug!(
            "initialized Q-network {} -> [{}] -> {}",
            state_len,
            hidden_layer_units.iter().join(","),
            E::A::ACTION_SPACE
        );

        Ok(QLearningCandleModel {
            device,
            varmap,
            network,
            optimizer,
            training: true,
            _phantom: PhantomData,
        })
    }

    fn check_state_batch_dims(
        state_batch: &[&Rc<E::S>; BATCH_SIZE],
        tensor: &Tensor,
    ) -> Result<()> {
        let mut expected = vec![BATCH_SIZE];
        expected.extend_from_slice(state_batch[0].dims());
        if tensor.dims() != expected.as_slice() {
            return Err(DqlError::ShapeMismatch(format!(
                "state batch tensor has shape {:?}, expected {:?}",
                tensor.dims(),
                expected
            ))
            .into());
        }
        Ok(())
    }
}

impl<E, const BATCH_SIZE: usize> DeepQLearningModel<BATCH_SIZE> for QLearningCandleModel<E, BATCH_SIZE>
where
    E: Environment,
    <E as Environment>::S: ToTensor,
{
    type E = E;

    /// Predicts the next action based on the current state.
    ///
    /// Runs a single forward pass and picks the action with the highest
    /// Q-value; among equally valued actions the lowest numeric one wins.
    fn predict_action(
        &self,
        state: &E::S,
    ) -> Result<E::A> {
        let state_tensor = state.to_tensor(&self.device)?;
        if state_tensor.dims() != state.dims() {
            return Err(DqlError::ShapeMismatch(format!(
                "state tensor has shape {:?}, expected {:?}",
                state_tensor.dims(),
                state.dims()
            ))
            .into());
        }

        let input = state_tensor.flatten_all()?.unsqueeze(0)?;
        let q_values = self.network.forward(&input)?.squeeze(0)?.to_vec1::<f32>()?;
        log::trace!("predict_action q_values: {:?}", q_values);

        E::A::try_from_numeric(argmax(&q_values) as ModelActionType)
    }

    fn batch_predict_q_values(
        &self,
        states: [&Rc<E::S>; BATCH_SIZE],
    ) -> Result<[Vec<f32>; BATCH_SIZE]> {
        let state_batch_tensor = E::S::batch_to_tensor(&states, &self.device)?;
        Self::check_state_batch_dims(&states, &state_batch_tensor)?;

        let q_values = self.network.forward(&state_batch_tensor.flatten_from(1)?)?;
        if q_values.dims() != [BATCH_SIZE, E::A::ACTION_SPACE as usize] {
            return Err(DqlError::ShapeMismatch(format!(
                "Q-value batch has shape {:?}, expected {:?}",
                q_values.dims(),
                [BATCH_SIZE, E::A::ACTION_SPACE as usize]
            ))
            .into());
        }
        log::trace!("batch_predict_q_values result: {:?}", q_values);

        let rows = q_values.to_vec2::<f32>()?;
        rows.try_into()
            .map_err(|rows: Vec<Vec<f32>>| {
                DqlError::ShapeMismatch(format!("got {} Q-value rows, expected {}", rows.len(), BATCH_SIZE)).into()
            })
    }

    /// Performs a single training step using a batch of data.
    ///
    /// The current Q-values entering the MSE loss are produced by
    /// `q_value_model` and gathered at the taken actions; the resulting
    /// gradients are applied to this model's variables.
    ///
    /// # Arguments
    /// * `q_value_model` model evaluating the current Q-values for `states`
    /// * `states` batch of states
    /// * `actions` batch of actions taken in `states`
    /// * `updated_q_values` learning target per sample
    ///
    /// # Returns
    ///   calculated loss
    fn train(
        &mut self,
        q_value_model: &Self,
        states: [&Rc<E::S>; BATCH_SIZE],
        actions: [E::A; BATCH_SIZE],
        updated_q_values: [f32; BATCH_SIZE],
    ) -> Result<f32> {
        let state_batch_tensor = E::S::batch_to_tensor(&states, &self.device)?;
        Self::check_state_batch_dims(&states, &state_batch_tensor)?;

        let action_ids = actions.iter().map(|a| a.numeric() as u32).collect_vec();
        let action_batch_tensor = Tensor::from_vec(action_ids, (BATCH_SIZE, 1), &self.device)?;
        let target_tensor = Tensor::from_vec(updated_q_values.to_vec(), BATCH_SIZE, &self.device)?;

        let q_values = q_value_model.network.forward(&state_batch_tensor.flatten_from(1)?)?;
        let q_action_values = q_values.gather(&action_batch_tensor, 1)?.squeeze(1)?;

        let loss = candle_nn::loss::mse(&q_action_values, &target_tensor)?;
        let loss_value = loss.to_scalar::<f32>()?;
        self.optimizer.backward_step(&loss)?;

        Ok(loss_value)
    }

    fn parameters(&self) -> Result<Vec<(String, Tensor)>> {
        let vars = self
            .varmap
            .data()
            .lock()
            .map_err(|_| DqlError::from("variable store mutex poisoned"))?;
        let mut parameters = Vec::with_capacity(vars.len());
        for (name, var) in vars.iter() {
            parameters.push((name.clone(), var.as_tensor().detach().copy()?));
        }
        parameters.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(parameters)
    }

    fn load_parameters(
        &mut self,
        parameters: &[(String, Tensor)],
    ) -> Result<()> {
        let vars = self
            .varmap
            .data()
            .lock()
            .map_err(|_| DqlError::from("variable store mutex poisoned"))?;
        if parameters.len() != vars.len() {
            return Err(DqlError::Model(format!(
                "parameter snapshot has {} entries, model has {} variables",
                parameters.len(),
                vars.len()
            ))
            .into());
        }
        for (name, tensor) in parameters {
            let var = vars
                .get(name)
                .ok_or_else(|| DqlError::Model(format!("model has no variable '{}'", name)))?;
            var.set(tensor)?;
        }
        Ok(())
    }

    fn set_training_mode(
        &mut self,
        training: bool,
    ) {
        self.training = training;
    }

    fn training_mode(&self) -> bool {
        self.training
    }
}
