use anyhow::Result;
use candle_core::{Tensor, Var};
use candle_nn::Optimizer as _;
use candle_optimisers::adam::{Adam, ParamsAdam};
use candle_optimisers::rmsprop::{ParamsRMSprop, RMSprop};

/// Optimizer configuration, resolved into a concrete [Optimizer] via [Self::build]
#[derive(Clone, Debug, PartialEq)]
pub enum OptimizerConfig {
    RMSprop {
        lr: f64,
        alpha: f64,
        eps: f64,
        momentum: f64,
    },
    Adam {
        lr: f64,
    },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::RMSprop {
            lr: 0.000_25,
            alpha: 0.99,
            eps: 1e-8,
            momentum: 0.95,
        }
    }
}

impl OptimizerConfig {
    pub fn build(
        &self,
        vars: Vec<Var>,
    ) -> Result<Optimizer> {
        match self {
            OptimizerConfig::RMSprop {
                lr,
                alpha,
                eps,
                momentum,
            } => {
                let params = ParamsRMSprop {
                    lr: *lr,
                    alpha: *alpha,
                    eps: *eps,
                    momentum: Some(*momentum),
                    ..ParamsRMSprop::default()
                };
                Ok(Optimizer::RMSprop(RMSprop::new(vars, params)?))
            }
            OptimizerConfig::Adam { lr } => {
                let params = ParamsAdam {
                    lr: *lr,
                    ..ParamsAdam::default()
                };
                Ok(Optimizer::Adam(Adam::new(vars, params)?))
            }
        }
    }
}

/// Thin wrapper around the concrete candle optimizers.
///
/// A step resets the accumulated gradients, computes fresh ones from `loss`
/// and applies them to the variables handed over at construction time.
/// Variables without a gradient in the backprop result are left untouched.
pub enum Optimizer {
    RMSprop(RMSprop),
    Adam(Adam),
}

impl Optimizer {
    pub fn backward_step(
        &mut self,
        loss: &Tensor,
    ) -> Result<()> {
        match self {
            Optimizer::RMSprop(o) => o.backward_step(loss)?,
            Optimizer::Adam(o) => o.backward_step(loss)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use candle_core::{DType, Device};

    use super::*;

    #[test]
    fn test_build_default_config() -> Result<()> {
        let var = Var::zeros(4, DType::F32, &Device::Cpu)?;
        let optimizer = OptimizerConfig::default().build(vec![var])?;
        assert!(matches!(optimizer, Optimizer::RMSprop(_)));
        Ok(())
    }

    #[test]
    fn test_backward_step_updates_variables_with_gradients() -> Result<()> {
        let var = Var::zeros(4, DType::F32, &Device::Cpu)?;
        let mut optimizer = OptimizerConfig::default().build(vec![var.clone()])?;

        let target = Tensor::ones(4, DType::F32, &Device::Cpu)?;
        let loss = candle_nn::loss::mse(var.as_tensor(), &target)?;
        let loss_value = loss.to_scalar::<f32>()?;
        optimizer.backward_step(&loss)?;

        assert!(loss_value.is_finite());
        // RMSprop with momentum moved the variable towards the target
        assert!(var.as_tensor().to_vec1::<f32>()?.iter().all(|&v| v > 0.0));
        Ok(())
    }
}
