//! Layer adding a trainable bias.
use crate::model::SubModel;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tch::{nn, nn::Init, Tensor};
use trellis_core::error::TrellisError;

/// Configuration of [`BiasLayer`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct BiasLayerConfig {
    /// Size of the last dimension of inputs.
    pub dim: i64,

    /// Initial value of the bias.
    pub bias_init: f64,
}

impl BiasLayerConfig {
    /// A bias of size `dim` initialized to zeros.
    pub fn new(dim: i64) -> Self {
        Self { dim, bias_init: 0.0 }
    }

    /// Sets the initial value.
    pub fn bias_init(mut self, v: f64) -> Self {
        self.bias_init = v;
        self
    }
}

/// Adds a trainable bias to the last dimension of its input.
///
/// Normal heads feed zeros into this layer to get a state-independent parameter of the
/// standard deviation.
pub struct BiasLayer {
    dim: i64,
    bias: Tensor,
}

impl SubModel for BiasLayer {
    type Config = BiasLayerConfig;
    type Input = Tensor;
    type Output = Result<Tensor>;

    fn build(p: &nn::Path, config: Self::Config) -> Result<Self> {
        let bias = p.var("bias", &[config.dim], Init::Const(config.bias_init));
        Ok(Self {
            dim: config.dim,
            bias,
        })
    }

    /// Returns `x + bias`.
    ///
    /// Fails if `x` has rank less than 2 or its last dimension is not the size of the bias.
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let size = x.size();
        if size.len() < 2 {
            return Err(TrellisError::ShapeMismatch(format!(
                "BiasLayer expects an input of rank >= 2, got shape {:?}",
                size
            ))
            .into());
        }
        if size[size.len() - 1] != self.dim {
            return Err(TrellisError::ShapeMismatch(format!(
                "Last dimension of shape {:?} does not match bias of size {}",
                size, self.dim
            ))
            .into());
        }
        Ok(x + &self.bias)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tch::{nn::VarStore, Device, Kind};

    #[test]
    fn test_zero_init_and_trainable() -> Result<()> {
        let vs = VarStore::new(Device::Cpu);
        let layer = BiasLayer::build(&vs.root(), BiasLayerConfig::new(3))?;
        assert_eq!(vs.trainable_variables().len(), 1);

        let x = Tensor::ones(&[2, 3], (Kind::Float, Device::Cpu));
        let y = layer.forward(&x)?;
        assert_eq!(y.size(), vec![2, 3]);
        assert_eq!(y.sum(Kind::Float).double_value(&[]), 6.0);
        Ok(())
    }

    #[test]
    fn test_invalid_input() -> Result<()> {
        let vs = VarStore::new(Device::Cpu);
        let layer = BiasLayer::build(&vs.root(), BiasLayerConfig::new(3).bias_init(0.5))?;
        let rank1 = Tensor::ones(&[3], (Kind::Float, Device::Cpu));
        assert!(layer.forward(&rank1).is_err());
        let wrong = Tensor::ones(&[2, 4], (Kind::Float, Device::Cpu));
        assert!(layer.forward(&wrong).is_err());

        let y = layer.forward(&Tensor::zeros(&[1, 3], (Kind::Float, Device::Cpu)))?;
        assert_eq!(y.mean(Kind::Float).double_value(&[]), 0.5);
        Ok(())
    }
}
