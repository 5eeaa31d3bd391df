use crate::{
    bias_layer::{BiasLayer, BiasLayerConfig},
    distribution::Distribution,
    mlp::{Mlp, MlpConfig},
    model::SubModel,
    util::{dims, observation_dim},
};
use anyhow::Result;
use log::info;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};
use tch::{nn, nn::Module, Device, Kind, Tensor};
use trellis_core::{error::TrellisError, ArraySpec, Nest};

/// Output of an actor network for an action leaf.
#[derive(Debug)]
pub enum ActorOutput {
    /// A distribution over actions.
    Distribution(Distribution),

    /// An action.
    Action(Tensor),
}

impl ActorOutput {
    /// Converts into a distribution, wrapping an action into a point mass.
    pub fn into_distribution(self) -> Distribution {
        match self {
            Self::Distribution(d) => d,
            Self::Action(a) => Distribution::deterministic(a),
        }
    }
}

/// Maps a batch of flattened observations `[N, D]` to an output per action leaf.
///
/// The outer dimension `N` is kept in every output.
pub trait ActorNetwork {
    /// Applies the network.
    fn forward(&self, observation: &Tensor) -> Result<Nest<ActorOutput>>;
}

/// Configuration of [`ActorDistributionNetwork`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ActorDistributionNetworkConfig {
    /// Units of the hidden layers.
    pub fc_layers: Vec<i64>,

    /// Initial value of the parameter of standard deviations, before softplus.
    pub std_bias_init: f64,
}

impl Default for ActorDistributionNetworkConfig {
    fn default() -> Self {
        Self {
            fc_layers: vec![200, 100],
            std_bias_init: 0.0,
        }
    }
}

impl ActorDistributionNetworkConfig {
    /// Sets the hidden layers.
    pub fn fc_layers(mut self, v: Vec<i64>) -> Self {
        self.fc_layers = v;
        self
    }

    /// Sets the initial parameter of standard deviations.
    pub fn std_bias_init(mut self, v: f64) -> Self {
        self.std_bias_init = v;
        self
    }

    /// Loads from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

enum Head {
    Categorical {
        logits: nn::Linear,
        shape: Vec<i64>,
        n: i64,
    },
    Normal {
        mean: nn::Linear,
        std: BiasLayer,
        shape: Vec<i64>,
        // Center and half width of the bounds, if finite.
        squash: Option<(Tensor, Tensor)>,
    },
}

fn bound_tensor(bound: &ArrayD<f64>, device: Device) -> Tensor {
    Tensor::from_slice(&bound.iter().cloned().collect::<Vec<_>>())
        .reshape(&dims(bound.shape()))
        .to_kind(Kind::Float)
        .to(device)
}

fn categorical_classes(spec: &ArraySpec) -> Result<i64> {
    let (min, max) = match (&spec.minimum, &spec.maximum) {
        (Some(min), Some(max)) => (min, max),
        _ => {
            return Err(TrellisError::ShapeMismatch(
                "Discrete action specs must be bounded".into(),
            )
            .into())
        }
    };
    let max = max.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if min.iter().any(|&v| v != 0.0) || max < 0.0 {
        return Err(TrellisError::ShapeMismatch(
            "Discrete action specs must have the minimum 0".into(),
        )
        .into());
    }
    Ok(max as i64 + 1)
}

impl Head {
    fn build(
        p: &nn::Path,
        in_dim: i64,
        spec: &ArraySpec,
        config: &ActorDistributionNetworkConfig,
    ) -> Result<Self> {
        let shape = dims(&spec.shape);
        let k = spec.num_elements() as i64;
        if spec.is_discrete() {
            let n = categorical_classes(spec)?;
            Ok(Head::Categorical {
                logits: nn::linear(p / "logits", in_dim, k * n, Default::default()),
                shape,
                n,
            })
        } else {
            let squash = match (&spec.minimum, &spec.maximum) {
                (Some(min), Some(max))
                    if min.iter().chain(max.iter()).all(|v| v.is_finite()) =>
                {
                    let device = p.device();
                    let min = bound_tensor(min, device);
                    let max = bound_tensor(max, device);
                    Some(((&max + &min) / 2.0, (max - min) / 2.0))
                }
                _ => None,
            };
            Ok(Head::Normal {
                mean: nn::linear(p / "mean", in_dim, k, Default::default()),
                std: BiasLayer::build(
                    &(p / "std"),
                    BiasLayerConfig::new(k).bias_init(config.std_bias_init),
                )?,
                shape,
                squash,
            })
        }
    }

    fn forward(&self, h: &Tensor) -> Result<Distribution> {
        let n = h.size()[0];
        let outer = |shape: &[i64], extra: &[i64]| {
            let mut s = vec![n];
            s.extend_from_slice(shape);
            s.extend_from_slice(extra);
            s
        };
        match self {
            Head::Categorical { logits, shape, n: classes } => {
                let logits = logits.forward(h).reshape(&outer(shape, &[*classes]));
                Ok(Distribution::categorical(logits))
            }
            Head::Normal {
                mean,
                std,
                shape,
                squash,
            } => {
                let raw = mean.forward(h);
                let scale = std.forward(&raw.zeros_like())?.softplus();
                let loc = raw.reshape(&outer(shape, &[]));
                let loc = match squash {
                    Some((center, half)) => center + half * loc.tanh(),
                    None => loc,
                };
                Ok(Distribution::normal(loc, scale.reshape(&outer(shape, &[]))))
            }
        }
    }
}

/// Actor network emitting a distribution per action leaf.
///
/// The flattened observation goes through fully connected layers with ReLU, followed by a
/// head for each action leaf:
///
/// * integer leaves with bounds `0..=n-1` get categorical logits;
/// * float leaves get a Normal distribution. Its mean comes from a linear layer, squashed
///   into the bounds of the spec with `tanh` when they are finite. Its standard deviation is
///   a state-independent [`BiasLayer`] parameter passed through softplus.
pub struct ActorDistributionNetwork {
    trunk: Mlp,
    heads: Vec<Head>,
    action_spec: Nest<ArraySpec>,
}

impl ActorDistributionNetwork {
    /// Builds the network with its variables under `p`.
    pub fn build(
        p: &nn::Path,
        config: &ActorDistributionNetworkConfig,
        observation_spec: &Nest<ArraySpec>,
        action_spec: &Nest<ArraySpec>,
    ) -> Result<Self> {
        let mlp_config = MlpConfig::new(
            observation_dim(observation_spec),
            config.fc_layers.clone(),
            None,
        );
        let in_dim = mlp_config.output_dim();
        let trunk = Mlp::build(&(p / "trunk"), mlp_config)?;
        let heads = action_spec
            .flatten()
            .into_iter()
            .enumerate()
            .map(|(i, spec)| Head::build(&(p / format!("head{}", i)), in_dim, spec, config))
            .collect::<Result<Vec<_>>>()?;
        info!(
            "Built actor network with layers {:?} and {} heads",
            config.fc_layers,
            heads.len()
        );
        Ok(Self {
            trunk,
            heads,
            action_spec: action_spec.clone(),
        })
    }
}

impl ActorNetwork for ActorDistributionNetwork {
    fn forward(&self, observation: &Tensor) -> Result<Nest<ActorOutput>> {
        let h = self.trunk.forward(observation);
        let outputs = self
            .heads
            .iter()
            .map(|head| head.forward(&h).map(ActorOutput::Distribution))
            .collect::<Result<Vec<_>>>()?;
        Nest::pack_sequence_as(&self.action_spec, outputs)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tch::nn::VarStore;
    use trellis_core::array::DType;

    fn obs(n: i64) -> Tensor {
        Tensor::ones(&[n, 4], (Kind::Float, Device::Cpu))
    }

    #[test]
    fn test_heads() -> Result<()> {
        let vs = VarStore::new(Device::Cpu);
        let action_spec = Nest::tuple_of(vec![
            ArraySpec::bounded_scalar(&[1], DType::I64, 0.0, 2.0),
            ArraySpec::bounded_scalar(&[2], DType::F32, -2.0, 2.0),
        ]);
        let obs_spec = Nest::Leaf(ArraySpec::new(&[4], DType::F32));
        let config = ActorDistributionNetworkConfig::default().fc_layers(vec![8]);
        let net = ActorDistributionNetwork::build(&vs.root(), &config, &obs_spec, &action_spec)?;

        let outputs = net.forward(&obs(5))?.into_flat();
        assert_eq!(outputs.len(), 2);
        let mut it = outputs.into_iter().map(ActorOutput::into_distribution);
        match it.next() {
            Some(Distribution::Categorical { logits }) => {
                assert_eq!(logits.size(), vec![5, 1, 3])
            }
            x => panic!("Unexpected output {:?}", x),
        }
        match it.next() {
            Some(Distribution::Normal { loc, scale }) => {
                assert_eq!(loc.size(), vec![5, 2]);
                // softplus(0)
                assert!((scale.double_value(&[0, 0]) - 2f64.ln()).abs() < 1e-5);
                assert!(loc.abs().max().double_value(&[]) <= 2.0);
            }
            x => panic!("Unexpected output {:?}", x),
        }
        Ok(())
    }

    #[test]
    fn test_discrete_spec_must_start_from_zero() {
        let vs = VarStore::new(Device::Cpu);
        let obs_spec = Nest::Leaf(ArraySpec::new(&[4], DType::F32));
        let action_spec = Nest::Leaf(ArraySpec::bounded_scalar(&[], DType::I64, 1.0, 3.0));
        let config = ActorDistributionNetworkConfig::default();
        let net = ActorDistributionNetwork::build(&vs.root(), &config, &obs_spec, &action_spec);
        assert!(net.is_err());
    }

    #[test]
    fn test_action_output_is_deterministic() {
        let a = ActorOutput::Action(Tensor::from_slice(&[0.5f32]));
        match a.into_distribution() {
            Distribution::Deterministic { loc } => assert_eq!(loc.double_value(&[0]), 0.5),
            d => panic!("Unexpected distribution {:?}", d),
        }
    }
}
