//! Action distributions.
use anyhow::Result;
use std::{collections::BTreeMap, f64::consts::PI};
use tch::{Kind, Tensor};
use trellis_core::error::TrellisError;

/// A distribution over the elements of an action leaf.
///
/// Tensors have the outer (batch) dimensions of the action followed by the shape of the
/// action leaf. Categorical logits have an extra trailing dimension of classes.
/// [`log_prob`](Distribution::log_prob), [`entropy`](Distribution::entropy) and
/// [`kl_divergence`](Distribution::kl_divergence) are computed per element; callers sum
/// them over the shape of the leaf.
#[derive(Debug)]
pub enum Distribution {
    /// Categorical distribution over `0..n`.
    Categorical {
        /// Unnormalized log-probabilities, `-inf` for impossible classes.
        logits: Tensor,
    },

    /// Normal distribution.
    Normal {
        /// Mean.
        loc: Tensor,

        /// Standard deviation.
        scale: Tensor,
    },

    /// Point mass at `loc`.
    Deterministic {
        /// The only value of the distribution.
        loc: Tensor,
    },
}

fn sum_last(t: &Tensor) -> Tensor {
    t.sum_dim_intlist(Some(&[-1i64][..]), false, Kind::Float)
}

impl Clone for Distribution {
    fn clone(&self) -> Self {
        match self {
            Self::Categorical { logits } => Self::Categorical {
                logits: logits.shallow_clone(),
            },
            Self::Normal { loc, scale } => Self::Normal {
                loc: loc.shallow_clone(),
                scale: scale.shallow_clone(),
            },
            Self::Deterministic { loc } => Self::Deterministic {
                loc: loc.shallow_clone(),
            },
        }
    }
}

impl Distribution {
    /// Categorical distribution with the given logits.
    pub fn categorical(logits: Tensor) -> Self {
        Self::Categorical { logits }
    }

    /// Categorical distribution restricted to the classes where `mask` is nonzero.
    ///
    /// Masked classes get the logit `-inf`, so they are never sampled and their
    /// log-probability is `-inf`. At least one class of each row must be allowed.
    pub fn masked_categorical(logits: &Tensor, mask: &Tensor) -> Self {
        let allowed = mask.to_kind(Kind::Bool);
        Self::Categorical {
            logits: logits.masked_fill(&allowed.logical_not(), f64::NEG_INFINITY),
        }
    }

    /// Normal distribution.
    pub fn normal(loc: Tensor, scale: Tensor) -> Self {
        Self::Normal { loc, scale }
    }

    /// Point mass.
    pub fn deterministic(loc: Tensor) -> Self {
        Self::Deterministic { loc }
    }

    /// Draws a sample. Categorical samples are `Kind::Int64` class indices.
    pub fn sample(&self) -> Tensor {
        match self {
            Self::Categorical { logits } => {
                let size = logits.size();
                let n = size[size.len() - 1];
                logits
                    .softmax(-1, Kind::Float)
                    .reshape(&[-1, n])
                    .multinomial(1, true)
                    .reshape(&size[..size.len() - 1])
            }
            Self::Normal { loc, scale } => loc + scale * loc.randn_like(),
            Self::Deterministic { loc } => loc.shallow_clone(),
        }
    }

    /// The most likely value.
    pub fn mode(&self) -> Tensor {
        match self {
            Self::Categorical { logits } => logits.argmax(-1, false),
            Self::Normal { loc, .. } | Self::Deterministic { loc } => loc.shallow_clone(),
        }
    }

    /// Log-probability (density) of `x` per element.
    pub fn log_prob(&self, x: &Tensor) -> Tensor {
        match self {
            Self::Categorical { logits } => logits
                .log_softmax(-1, Kind::Float)
                .gather(-1, &x.to_kind(Kind::Int64).unsqueeze(-1), false)
                .squeeze_dim(-1),
            Self::Normal { loc, scale } => {
                let z = (x.to_kind(Kind::Float) - loc) / scale;
                -z.pow_tensor_scalar(2) * 0.5 - scale.log() - 0.5 * (2.0 * PI).ln()
            }
            Self::Deterministic { loc } => x
                .to_kind(Kind::Float)
                .eq_tensor(&loc.to_kind(Kind::Float))
                .to_kind(Kind::Float)
                .log(),
        }
    }

    /// Entropy per element. Finite for masked categoricals.
    pub fn entropy(&self) -> Tensor {
        match self {
            Self::Categorical { logits } => {
                let logp = logits.log_softmax(-1, Kind::Float);
                let p = logp.exp();
                // 0 * log(0) is taken as 0.
                let logp = logp.masked_fill(&p.eq(0.0), 0.0);
                -sum_last(&(p * logp))
            }
            Self::Normal { scale, .. } => scale.log() + 0.5 + 0.5 * (2.0 * PI).ln(),
            Self::Deterministic { loc } => loc.zeros_like().to_kind(Kind::Float),
        }
    }

    /// `KL(self || other)` per element.
    pub fn kl_divergence(&self, other: &Distribution) -> Result<Tensor> {
        match (self, other) {
            (Self::Categorical { logits: l1 }, Self::Categorical { logits: l2 }) => {
                let logp1 = l1.log_softmax(-1, Kind::Float);
                let logp2 = l2.log_softmax(-1, Kind::Float);
                let p1 = logp1.exp();
                let diff = (&logp1 - &logp2).masked_fill(&p1.eq(0.0), 0.0);
                Ok(sum_last(&(p1 * diff)))
            }
            (
                Self::Normal {
                    loc: m1,
                    scale: s1,
                },
                Self::Normal {
                    loc: m2,
                    scale: s2,
                },
            ) => {
                let var1 = s1.pow_tensor_scalar(2);
                let var2 = s2.pow_tensor_scalar(2);
                Ok((s2 / s1).log() + (var1 + (m1 - m2).pow_tensor_scalar(2)) / (var2 * 2.0)
                    - 0.5)
            }
            (Self::Deterministic { loc }, Self::Deterministic { .. }) => {
                Ok(loc.zeros_like().to_kind(Kind::Float))
            }
            _ => Err(TrellisError::StructureMismatch(format!(
                "KL divergence between {} and {} distributions",
                self.kind_name(),
                other.kind_name()
            ))
            .into()),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Self::Categorical { .. } => "categorical",
            Self::Normal { .. } => "normal",
            Self::Deterministic { .. } => "deterministic",
        }
    }

    /// Parameters by name: `logits` of categoricals, `loc` and `scale` of normals and
    /// `loc` of deterministic distributions.
    pub fn params(&self) -> Vec<(&'static str, Tensor)> {
        match self {
            Self::Categorical { logits } => vec![("logits", logits.shallow_clone())],
            Self::Normal { loc, scale } => vec![
                ("loc", loc.shallow_clone()),
                ("scale", scale.shallow_clone()),
            ],
            Self::Deterministic { loc } => vec![("loc", loc.shallow_clone())],
        }
    }

    /// Rebuilds a distribution from the output of [`Distribution::params`].
    pub fn from_params(params: &BTreeMap<String, Tensor>) -> Result<Self> {
        let get = |k: &str| {
            params.get(k).map(|t| t.shallow_clone()).ok_or_else(|| {
                TrellisError::StructureMismatch(format!("Distribution parameter {} is missing", k))
            })
        };
        if params.contains_key("logits") {
            Ok(Self::categorical(get("logits")?))
        } else if params.contains_key("scale") {
            Ok(Self::normal(get("loc")?, get("scale")?))
        } else {
            Ok(Self::deterministic(get("loc")?))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tch::Device;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_categorical() {
        let logits = Tensor::from_slice(&[0.0f32, 1.0, 2.0]).reshape(&[1, 3]);
        let d = Distribution::categorical(logits);
        assert_eq!(d.mode().int64_value(&[0]), 2);
        let lp = d.log_prob(&Tensor::from_slice(&[2i64]));
        let p2 = (2f64).exp() / (1.0 + 1f64.exp() + 2f64.exp());
        assert!(approx(lp.double_value(&[0]), p2.ln()));
        assert_eq!(d.sample().size(), vec![1]);
    }

    #[test]
    fn test_masked_categorical() {
        let logits = Tensor::zeros(&[100, 3], (Kind::Float, Device::Cpu));
        let mask = Tensor::from_slice(&[1i64, 0, 1]).reshape(&[1, 3]).expand(&[100, 3], false);
        let d = Distribution::masked_categorical(&logits, &mask);

        let samples = d.sample();
        assert_eq!(samples.eq(1).sum(Kind::Int64).int64_value(&[]), 0);

        let lp = d.log_prob(&Tensor::ones(&[100], (Kind::Int64, Device::Cpu)));
        assert_eq!(lp.double_value(&[0]), f64::NEG_INFINITY);

        let entropy = d.entropy();
        assert!(approx(entropy.double_value(&[0]), 2f64.ln()));
        assert!(approx(d.kl_divergence(&d).unwrap().double_value(&[0]), 0.0));
    }

    #[test]
    fn test_normal() -> Result<()> {
        let d = Distribution::normal(
            Tensor::from_slice(&[0.0f32]),
            Tensor::from_slice(&[1.0f32]),
        );
        let half_log_2pi = 0.5 * (2.0 * PI).ln();
        assert!(approx(
            d.log_prob(&Tensor::from_slice(&[0.0f32])).double_value(&[0]),
            -half_log_2pi
        ));
        assert!(approx(d.entropy().double_value(&[0]), 0.5 + half_log_2pi));

        let other = Distribution::normal(
            Tensor::from_slice(&[1.0f32]),
            Tensor::from_slice(&[1.0f32]),
        );
        assert!(approx(d.kl_divergence(&other)?.double_value(&[0]), 0.5));
        assert!(d.kl_divergence(&Distribution::deterministic(Tensor::from_slice(&[0.0f32]))).is_err());
        Ok(())
    }

    #[test]
    fn test_deterministic() {
        let d = Distribution::deterministic(Tensor::from_slice(&[0.5f32, 1.0]));
        let lp = d.log_prob(&Tensor::from_slice(&[0.5f32, 0.0]));
        assert_eq!(lp.double_value(&[0]), 0.0);
        assert_eq!(lp.double_value(&[1]), f64::NEG_INFINITY);
        assert_eq!(d.sample().double_value(&[1]), 1.0);
        assert_eq!(d.entropy().double_value(&[0]), 0.0);
    }

    #[test]
    fn test_params_round_trip() -> Result<()> {
        let d = Distribution::normal(
            Tensor::from_slice(&[0.5f32]),
            Tensor::from_slice(&[2.0f32]),
        );
        let params = d
            .params()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<BTreeMap<_, _>>();
        match Distribution::from_params(&params)? {
            Distribution::Normal { loc, scale } => {
                assert_eq!(loc.double_value(&[0]), 0.5);
                assert_eq!(scale.double_value(&[0]), 2.0);
            }
            _ => panic!("Expected a normal distribution"),
        }
        assert!(Distribution::from_params(&BTreeMap::new()).is_err());
        Ok(())
    }
}
