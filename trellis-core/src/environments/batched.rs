//! Sequentially stepped batch of environments.
use crate::{
    array::{Array, Stack},
    base::{Env, TimeStep},
    error::TrellisError,
    nest::Nest,
    spec::ArraySpec,
};
use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};

/// Configuration of [`BatchedEnv`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchedEnvConfig<C> {
    /// Configuration of each environment.
    pub env_config: C,

    /// Number of environments.
    pub n_envs: usize,
}

impl<C> BatchedEnvConfig<C> {
    /// Creates a configuration.
    pub fn new(env_config: C, n_envs: usize) -> Self {
        Self { env_config, n_envs }
    }
}

/// Presents a number of non-batched environments as a single batched environment.
///
/// Actions are split along their leading dimension and the environments are stepped one
/// after another. The environment `i` built by [`Env::build`] gets the seed `seed + i`.
pub struct BatchedEnv<E: Env> {
    envs: Vec<E>,
    observation_spec: Nest<ArraySpec>,
    action_spec: Nest<ArraySpec>,
}

impl<E: Env> BatchedEnv<E> {
    /// Batches environments with identical specs.
    pub fn new(envs: Vec<E>) -> Result<Self> {
        let first = envs
            .first()
            .ok_or_else(|| TrellisError::ShapeMismatch("No environment to batch".into()))?;
        let observation_spec = first.observation_spec();
        let action_spec = first.action_spec();
        for env in envs.iter() {
            if env.batched() {
                return Err(TrellisError::StructureMismatch(
                    "Batched environments cannot be batched again".into(),
                )
                .into());
            }
            if env.observation_spec() != observation_spec || env.action_spec() != action_spec {
                return Err(TrellisError::StructureMismatch(
                    "Batched environments must have the same specs".into(),
                )
                .into());
            }
        }
        Ok(Self {
            envs,
            observation_spec,
            action_spec,
        })
    }

    /// The environments.
    pub fn envs(&self) -> &[E] {
        &self.envs
    }

    fn collect(&mut self, f: impl FnMut(&mut E) -> Result<TimeStep>) -> Result<TimeStep> {
        let time_steps = self.envs.iter_mut().map(f).collect::<Result<Vec<_>>>()?;
        TimeStep::stack(&time_steps)
    }
}

/// Splits a batched action into per-environment actions.
pub(crate) fn unstack_action(action: &Nest<Array>, batch_size: usize) -> Result<Vec<Nest<Array>>> {
    for a in action.flatten() {
        if a.ndim() == 0 || a.shape()[0] != batch_size {
            return Err(TrellisError::BatchDimMismatch {
                batch_size,
                shape: a.shape().to_vec(),
            }
            .into());
        }
    }
    action.unstack_to(batch_size)
}

impl<E: Env> Env for BatchedEnv<E> {
    type Config = BatchedEnvConfig<E::Config>;
    type Info = ();

    fn build(config: &Self::Config, seed: i64) -> Result<Self> {
        let envs = (0..config.n_envs)
            .map(|i| E::build(&config.env_config, seed + i as i64))
            .collect::<Result<Vec<_>>>()?;
        info!("Built batched environment of {} environments", config.n_envs);
        Self::new(envs)
    }

    fn observation_spec(&self) -> Nest<ArraySpec> {
        self.observation_spec.clone()
    }

    fn action_spec(&self) -> Nest<ArraySpec> {
        self.action_spec.clone()
    }

    fn batched(&self) -> bool {
        true
    }

    fn batch_size(&self) -> Option<usize> {
        Some(self.envs.len())
    }

    fn current_time_step(&mut self) -> Result<TimeStep> {
        self.collect(|env| env.current_time_step())
    }

    fn reset(&mut self) -> Result<TimeStep> {
        self.collect(|env| env.reset())
    }

    fn step(&mut self, action: &Nest<Array>) -> Result<TimeStep> {
        let mut actions = unstack_action(action, self.envs.len())?.into_iter();
        self.collect(|env| match actions.next() {
            Some(a) => env.step(&a),
            None => Err(TrellisError::ShapeMismatch("Missing action".into()).into()),
        })
    }

    fn reset_with_index(&mut self, ix: usize) -> Result<TimeStep> {
        let n = self.envs.len();
        let mut i = 0;
        self.collect(|env| {
            i += 1;
            env.reset_with_index(ix * n + i - 1)
        })
    }

    fn render(&mut self) -> Result<()> {
        self.envs.iter_mut().try_for_each(|env| env.render())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        array::DType,
        base::StepType,
        environments::{CountingEnv, CountingEnvConfig},
    };

    fn build(n_envs: usize) -> Result<BatchedEnv<CountingEnv>> {
        let config = BatchedEnvConfig::new(CountingEnvConfig::default().episode_length(2), n_envs);
        BatchedEnv::build(&config, 0)
    }

    #[test]
    fn test_batched_step() -> Result<()> {
        let mut env = build(3)?;
        assert_eq!(env.batch_size(), Some(3));
        let ts = env.reset()?;
        assert!(ts.is_first());
        assert_eq!(ts.observation.as_leaf().unwrap().shape(), &[3, 1]);
        // Seeds offset the counters.
        assert_eq!(ts.observation.as_leaf().unwrap().to_f32_vec(), vec![0.0, 1.0, 2.0]);

        let action = Nest::Leaf(Array::vec_i64(vec![1, 0, 1]));
        let ts = env.step(&action)?;
        assert_eq!(ts.rewards(), vec![1.0, 0.0, 1.0]);
        assert_eq!(ts.step_types()?, vec![StepType::Mid; 3]);
        Ok(())
    }

    #[test]
    fn test_action_batch_dim_mismatch() -> Result<()> {
        let mut env = build(2)?;
        env.reset()?;
        let action = Nest::Leaf(Array::zeros(DType::I64, &[3]));
        let err = env.step(&action).unwrap_err();
        assert_eq!(
            err.downcast_ref::<TrellisError>(),
            Some(&TrellisError::BatchDimMismatch {
                batch_size: 2,
                shape: vec![3]
            })
        );
        Ok(())
    }

    #[test]
    fn test_nested_batching_is_rejected() -> Result<()> {
        let inner = vec![build(2)?];
        assert!(BatchedEnv::new(inner).is_err());
        Ok(())
    }
}
