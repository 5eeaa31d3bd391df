//! Policy wrapper adding clipped Gaussian noise to continuous actions.
use super::check_float_actions;
use crate::{
    array::Array,
    base::{Policy, PolicyStep, TimeStep},
    nest::Nest,
    spec::ArraySpec,
};
use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Configuration of [`GaussianNoisePolicy`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct GaussianNoiseConfig {
    /// Standard deviation of the noise.
    pub scale: f64,

    /// If `true`, noisy actions are clipped to the bounds of the action spec.
    pub clip: bool,

    /// Random seed.
    pub seed: u64,
}

impl Default for GaussianNoiseConfig {
    fn default() -> Self {
        Self {
            scale: 1.0,
            clip: true,
            seed: 42,
        }
    }
}

impl GaussianNoiseConfig {
    /// Sets the standard deviation.
    pub fn scale(mut self, v: f64) -> Self {
        self.scale = v;
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

/// Adds independent Gaussian noise to the float actions of a policy.
pub struct GaussianNoisePolicy<P: Policy> {
    policy: P,
    config: GaussianNoiseConfig,
    rng: StdRng,
}

impl<P: Policy> GaussianNoisePolicy<P> {
    /// Wraps `policy`.
    pub fn new(policy: P, config: GaussianNoiseConfig) -> Result<Self> {
        check_float_actions(policy.action_spec(), "GaussianNoisePolicy")?;
        Ok(Self {
            policy,
            rng: StdRng::seed_from_u64(config.seed),
            config,
        })
    }
}

impl<P: Policy> Policy for GaussianNoisePolicy<P> {
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
        let (rng, scale) = (&mut self.rng, self.config.scale);
        let noisy = step.action.try_map(|a| {
            let values = a
                .to_f64_vec()
                .into_iter()
                .map(|v| v + scale * rng.sample::<f64, _>(StandardNormal))
                .collect();
            Array::from_f64_vec(a.dtype(), a.shape(), values)
        })?;
        step.action = if self.config.clip {
            self.policy.action_spec().clip(&noisy)?
        } else {
            noisy
        };
        Ok(step)
    }
}
