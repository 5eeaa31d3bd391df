use super::MlpConfig;
use crate::model::SubModel;
use anyhow::Result;
use tch::{nn, nn::Module, Device, Tensor};

/// Multilayer perceptron with ReLU activation function.
pub struct Mlp {
    config: MlpConfig,
    device: Device,
    seq: nn::Sequential,
}

impl Mlp {
    fn create_net(p: &nn::Path, config: &MlpConfig) -> nn::Sequential {
        let mut seq = nn::seq();
        let mut in_dim = config.in_dim;

        for (i, &out_dim) in config.units.iter().enumerate() {
            seq = seq.add(nn::linear(
                p / format!("ln{}", i),
                in_dim,
                out_dim,
                Default::default(),
            ));
            seq = seq.add_fn(|x| x.relu());
            in_dim = out_dim;
        }

        if let Some(out_dim) = config.out_dim {
            seq = seq.add(nn::linear(
                p / format!("ln{}", config.units.len()),
                in_dim,
                out_dim,
                Default::default(),
            ));
            if config.activation_out {
                seq = seq.add_fn(|x| x.relu());
            }
        }

        seq
    }

    /// Dimension of the output.
    pub fn out_dim(&self) -> i64 {
        self.config.output_dim()
    }
}

impl SubModel for Mlp {
    type Config = MlpConfig;
    type Input = Tensor;
    type Output = Tensor;

    fn forward(&self, x: &Self::Input) -> Tensor {
        self.seq.forward(&x.to(self.device))
    }

    fn build(p: &nn::Path, config: Self::Config) -> Result<Self> {
        let seq = Self::create_net(p, &config);
        Ok(Self {
            config,
            device: p.device(),
            seq,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tch::{nn::VarStore, Kind};

    #[test]
    fn test_output_shape() -> Result<()> {
        let vs = VarStore::new(Device::Cpu);
        let trunk = Mlp::build(&(vs.root() / "trunk"), MlpConfig::new(3, vec![8, 4], None))?;
        let head = Mlp::build(&(vs.root() / "head"), MlpConfig::new(3, vec![8], Some(1)))?;
        let x = Tensor::zeros(&[5, 3], (Kind::Float, Device::Cpu));
        assert_eq!(trunk.forward(&x).size(), vec![5, 4]);
        assert_eq!(trunk.out_dim(), 4);
        assert_eq!(head.forward(&x).size(), vec![5, 1]);
        // Two layers of the trunk and two of the head, each with weight and bias.
        assert_eq!(vs.variables().len(), 8);
        Ok(())
    }
}
