//! Policy wrapper adding Ornstein-Uhlenbeck noise to continuous actions.
use super::check_float_actions;
use crate::{
    array::Array,
    base::{Policy, PolicyStep, TimeStep},
    nest::Nest,
    spec::ArraySpec,
};
use anyhow::Result;
use ndarray::{ArrayD, IxDyn};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Configuration of [`OuNoisePolicy`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct OuNoiseConfig {
    /// Standard deviation of the Gaussian increments.
    pub ou_stddev: f64,

    /// Rate at which the process returns to zero.
    pub ou_damping: f64,

    /// If `true`, noisy actions are clipped to the bounds of the action spec.
    pub clip: bool,

    /// Random seed.
    pub seed: u64,
}

impl Default for OuNoiseConfig {
    fn default() -> Self {
        Self {
            ou_stddev: 1.0,
            ou_damping: 1.0,
            clip: true,
            seed: 42,
        }
    }
}

impl OuNoiseConfig {
    /// Sets the standard deviation.
    pub fn ou_stddev(mut self, v: f64) -> Self {
        self.ou_stddev = v;
        self
    }

    /// Sets the damping.
    pub fn ou_damping(mut self, v: f64) -> Self {
        self.ou_damping = v;
        self
    }

    /// Sets whether actions are clipped.
    pub fn clip(mut self, v: bool) -> Self {
        self.clip = v;
        self
    }

    /// Sets the random seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }
}

/// Ornstein-Uhlenbeck process, one value per action element.
struct OuProcess {
    x: ArrayD<f64>,
}

impl OuProcess {
    fn new(shape: &[usize]) -> Self {
        Self {
            x: ArrayD::zeros(IxDyn(shape)),
        }
    }

    /// `x <- x - damping * x + stddev * N(0, 1)`
    fn sample(&mut self, rng: &mut StdRng, damping: f64, stddev: f64) -> &ArrayD<f64> {
        self.x.mapv_inplace(|x| {
            let n: f64 = rng.sample(StandardNormal);
            x - damping * x + stddev * n
        });
        &self.x
    }
}

/// Adds Ornstein-Uhlenbeck noise to the actions of a policy.
///
/// The wrapped policy must emit float actions. One process is kept per action leaf, shaped
/// like the action including outer dimensions; it restarts from zero when the shape changes.
/// The specs are those of the wrapped policy.
pub struct OuNoisePolicy<P: Policy> {
    policy: P,
    config: OuNoiseConfig,
    processes: Vec<OuProcess>,
    rng: StdRng,
}

impl<P: Policy> OuNoisePolicy<P> {
    /// Wraps `policy`.
    pub fn new(policy: P, config: OuNoiseConfig) -> Result<Self> {
        check_float_actions(policy.action_spec(), "OuNoisePolicy")?;
        let processes = policy
            .action_spec()
            .flatten()
            .iter()
            .map(|_| OuProcess::new(&[]))
            .collect();
        Ok(Self {
            policy,
            rng: StdRng::seed_from_u64(config.seed),
            config,
            processes,
        })
    }

    /// The wrapped policy.
    pub fn inner(&self) -> &P {
        &self.policy
    }

    fn add_noise(&mut self, action: &Array, i: usize) -> Result<Array> {
        let shape = action.shape();
        if self.processes[i].x.shape() != shape {
            self.processes[i] = OuProcess::new(shape);
        }
        let (damping, stddev) = (self.config.ou_damping, self.config.ou_stddev);
        let noise = self.processes[i].sample(&mut self.rng, damping, stddev);
        let values = action
            .to_f64_vec()
            .into_iter()
            .zip(noise.iter())
            .map(|(a, n)| a + n)
            .collect();
        Array::from_f64_vec(action.dtype(), shape, values)
    }
}

impl<P: Policy> Policy for OuNoisePolicy<P> {
    fn time_step_spec(&self) -> &TimeStep<ArraySpec> {
        self.policy.time_step_spec()
    }

    fn action_spec(&self) -> &Nest<ArraySpec> {
        self.policy.action_spec()
    }

    fn policy_state_spec(&self) -> Nest<ArraySpec> {
        self.policy.policy_state_spec()
    }

    fn info_spec(&self) -> Nest<ArraySpec> {
        self.policy.info_spec()
    }

    fn action(&mut self, time_step: &TimeStep, policy_state: &Nest<Array>) -> Result<PolicyStep> {
        let mut step = self.policy.action(time_step, policy_state)?;
        let noisy = step
            .action
            .flatten()
            .into_iter()
            .enumerate()
            .map(|(i, a)| self.add_noise(a, i))
            .collect::<Result<Vec<_>>>()?;
        let noisy = Nest::pack_sequence_as(&step.action, noisy)?;
        step.action = if self.config.clip {
            self.policy.action_spec().clip(&noisy)?
        } else {
            noisy
        };
        Ok(step)
    }
}

#[cfg(test)]
pub(super) mod test {
    use super::*;
    use crate::{array::DType, base::time_step_spec};

    /// Always emits zeros.
    pub struct ZeroPolicy {
        time_step_spec: TimeStep<ArraySpec>,
        action_spec: Nest<ArraySpec>,
    }

    impl ZeroPolicy {
        pub fn new(action_spec: Nest<ArraySpec>) -> Self {
            let obs_spec = Nest::Leaf(ArraySpec::new(&[1], DType::F32));
            Self {
                time_step_spec: time_step_spec(obs_spec),
                action_spec,
            }
        }
    }

    impl Policy for ZeroPolicy {
        fn time_step_spec(&self) -> &TimeStep<ArraySpec> {
            &self.time_step_spec
        }

        fn action_spec(&self) -> &Nest<ArraySpec> {
            &self.action_spec
        }

        fn action(&mut self, time_step: &TimeStep, _: &Nest<Array>) -> Result<PolicyStep> {
            Ok(PolicyStep::new(self.action_spec.zeros(&time_step.outer_dims())))
        }
    }

    pub fn batched_time_step(batch_size: usize) -> TimeStep {
        let obs = Nest::Leaf(Array::zeros(DType::F32, &[batch_size, 1]));
        TimeStep::restart_batch(obs, batch_size)
    }

    #[test]
    fn test_batched_action() -> Result<()> {
        let spec = ArraySpec::bounded_scalar(&[1], DType::F32, 2.0, 3.0);
        let wrapped = ZeroPolicy::new(Nest::Leaf(spec.clone()));
        let mut policy = OuNoisePolicy::new(wrapped, OuNoiseConfig::default())?;
        assert_eq!(policy.action_spec(), &Nest::Leaf(spec));
        assert!(policy.policy_state_spec().is_empty());

        let step = policy.action(&batched_time_step(2), &Nest::empty())?;
        let action = step.action.as_leaf().unwrap();
        assert_eq!(action.shape(), &[2, 1]);
        assert!(action.to_f64_vec().iter().all(|v| (2.0..=3.0).contains(v)));
        Ok(())
    }

    #[test]
    fn test_action_list() -> Result<()> {
        let spec = Nest::tuple_of(vec![
            ArraySpec::bounded_scalar(&[1], DType::F32, 2.0, 3.0),
            ArraySpec::bounded_scalar(&[2], DType::F32, -5.0, -4.0),
        ]);
        let mut policy = OuNoisePolicy::new(ZeroPolicy::new(spec), OuNoiseConfig::default())?;
        let ts = TimeStep::restart(Nest::Leaf(Array::vec_f32(vec![0.0])));
        let step = policy.action(&ts, &Nest::empty())?;
        let leaves = step.action.flatten();
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].shape(), &[1]);
        assert!(leaves[0].to_f64_vec().iter().all(|v| (2.0..=3.0).contains(v)));
        assert_eq!(leaves[1].shape(), &[2]);
        assert!(leaves[1].to_f64_vec().iter().all(|v| (-5.0..=-4.0).contains(v)));
        Ok(())
    }

    #[test]
    fn test_unclipped_noise_is_random() -> Result<()> {
        let spec = Nest::Leaf(ArraySpec::bounded_scalar(&[1], DType::F32, -1.0, 1.0));
        let config = OuNoiseConfig::default().clip(false).ou_stddev(0.5);
        let mut policy = OuNoisePolicy::new(ZeroPolicy::new(spec), config)?;
        let ts = batched_time_step(16);
        let a = policy.action(&ts, &Nest::empty())?.action;
        let b = policy.action(&ts, &Nest::empty())?.action;
        assert_ne!(a, b);
        assert!(a.as_leaf().unwrap().to_f64_vec().iter().any(|v| *v != 0.0));
        Ok(())
    }

    #[test]
    fn test_rejects_integer_actions() {
        let spec = Nest::Leaf(ArraySpec::bounded_scalar(&[], DType::I64, 0.0, 1.0));
        assert!(OuNoisePolicy::new(ZeroPolicy::new(spec), OuNoiseConfig::default()).is_err());
    }
}
