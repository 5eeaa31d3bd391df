use crate::{
    mlp::{Mlp, MlpConfig},
    model::SubModel,
    util::observation_dim,
};
use anyhow::Result;
use tch::{nn, Tensor};
use trellis_core::{ArraySpec, Nest};

/// Estimates the value of flattened observations `[N, D]`, returning `[N]`.
pub struct ValueNetwork {
    mlp: Mlp,
}

impl ValueNetwork {
    /// Builds the network with hidden layers `fc_layers` and a scalar output.
    pub fn build(
        p: &nn::Path,
        fc_layers: Vec<i64>,
        observation_spec: &Nest<ArraySpec>,
    ) -> Result<Self> {
        let config = MlpConfig::new(observation_dim(observation_spec), fc_layers, Some(1));
        Ok(Self {
            mlp: Mlp::build(p, config)?,
        })
    }

    /// Applies the network.
    pub fn forward(&self, observation: &Tensor) -> Tensor {
        self.mlp.forward(observation).squeeze_dim(-1)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tch::{nn::VarStore, Device, Kind};
    use trellis_core::array::DType;

    #[test]
    fn test_value_shape() -> Result<()> {
        let vs = VarStore::new(Device::Cpu);
        let spec = Nest::tuple_of(vec![
            ArraySpec::new(&[3], DType::F32),
            ArraySpec::new(&[2, 2], DType::F32),
        ]);
        let net = ValueNetwork::build(&vs.root(), vec![16, 16], &spec)?;
        let v = net.forward(&Tensor::zeros(&[6, 7], (Kind::Float, Device::Cpu)));
        assert_eq!(v.size(), vec![6]);
        Ok(())
    }
}
