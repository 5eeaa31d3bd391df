//! Optimizers.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tch::{
    nn::{Adam, AdamW, Optimizer as Optimizer_, OptimizerConfig as OptimizerConfig_, VarStore},
    Tensor,
};

/// Configures an optimizer of the trainable variables of a [`VarStore`].
///
/// [`VarStore`]: https://docs.rs/tch/0.16.0/tch/nn/struct.VarStore.html
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum OptimizerConfig {
    /// Adam optimizer.
    Adam {
        /// Learning rate.
        lr: f64,
    },

    /// Adam with decoupled weight decay.
    AdamW {
        /// Learning rate.
        lr: f64,

        /// Weight decay.
        wd: f64,
    },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::Adam { lr: 1e-4 }
    }
}

impl OptimizerConfig {
    /// Sets the learning rate.
    pub fn learning_rate(self, lr: f64) -> Self {
        match self {
            Self::Adam { .. } => Self::Adam { lr },
            Self::AdamW { wd, .. } => Self::AdamW { lr, wd },
        }
    }

    /// Constructs an optimizer.
    ///
    /// If `max_grad_norm` is given, gradients are rescaled so that their global norm does
    /// not exceed it.
    pub fn build(&self, vs: &VarStore, max_grad_norm: Option<f64>) -> Result<Optimizer> {
        let opt = match &self {
            OptimizerConfig::Adam { lr } => Adam::default().build(vs, *lr)?,
            OptimizerConfig::AdamW { lr, wd } => AdamW {
                wd: *wd,
                ..Default::default()
            }
            .build(vs, *lr)?,
        };
        Ok(Optimizer { opt, max_grad_norm })
    }
}

/// A thin wrapper of [tch::nn::Optimizer] with optional gradient norm clipping.
///
/// [tch::nn::Optimizer]: https://docs.rs/tch/0.16.0/tch/nn/struct.Optimizer.html
pub struct Optimizer {
    opt: Optimizer_,
    max_grad_norm: Option<f64>,
}

impl Optimizer {
    /// Applies a backward step pass.
    pub fn backward_step(&mut self, loss: &Tensor) {
        match self.max_grad_norm {
            Some(max) => self.opt.backward_step_clip_norm(loss, max),
            None => self.opt.backward_step(loss),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tch::{Device, Kind};

    #[test]
    fn test_backward_step_decreases_loss() -> Result<()> {
        let vs = VarStore::new(Device::Cpu);
        let w = vs.root().zeros("w", &[2]);
        let target = Tensor::from_slice(&[1.0f32, -1.0]);
        let mut opt = OptimizerConfig::default()
            .learning_rate(0.1)
            .build(&vs, Some(1.0))?;

        let loss = |w: &Tensor| (w - &target).pow_tensor_scalar(2).sum(Kind::Float);
        let before = loss(&w).double_value(&[]);
        for _ in 0..10 {
            opt.backward_step(&loss(&w));
        }
        assert!(loss(&w).double_value(&[]) < before);
        Ok(())
    }
}
