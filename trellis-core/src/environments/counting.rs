//! An environment counting steps.
use crate::{
    array::{Array, DType},
    base::{Env, TimeStep},
    error::TrellisError,
    nest::Nest,
    spec::ArraySpec,
};
use anyhow::Result;
use log::trace;
use serde::{Deserialize, Serialize};

/// Configuration of [`CountingEnv`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountingEnvConfig {
    /// Number of steps until an episode terminates.
    pub episode_length: usize,
}

impl Default for CountingEnvConfig {
    fn default() -> Self {
        Self { episode_length: 5 }
    }
}

impl CountingEnvConfig {
    /// Sets the episode length.
    pub fn episode_length(mut self, v: usize) -> Self {
        self.episode_length = v;
        self
    }
}

/// Observes a `float32` counter of shape `[1]` starting from the seed and increased by one
/// every step.
///
/// The action is an `int64` scalar in `[0, 1]` and the reward equals the action. Episodes
/// terminate after `episode_length` steps.
pub struct CountingEnv {
    config: CountingEnvConfig,
    start: f32,
    counter: f32,
    steps: usize,
    current: Option<TimeStep>,
}

impl CountingEnv {
    fn observation(&self) -> Nest<Array> {
        Nest::Leaf(Array::vec_f32(vec![self.counter]))
    }
}

impl Env for CountingEnv {
    type Config = CountingEnvConfig;
    type Info = ();

    fn build(config: &Self::Config, seed: i64) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            start: seed as f32,
            counter: seed as f32,
            steps: 0,
            current: None,
        })
    }

    fn observation_spec(&self) -> Nest<ArraySpec> {
        Nest::Leaf(ArraySpec::new(&[1], DType::F32).with_name("counter"))
    }

    fn action_spec(&self) -> Nest<ArraySpec> {
        Nest::Leaf(ArraySpec::bounded_scalar(&[], DType::I64, 0.0, 1.0).with_name("action"))
    }

    fn current_time_step(&mut self) -> Result<TimeStep> {
        match &self.current {
            Some(ts) => Ok(ts.clone()),
            None => self.reset(),
        }
    }

    fn reset(&mut self) -> Result<TimeStep> {
        trace!("CountingEnv::reset()");
        self.counter = self.start;
        self.steps = 0;
        let ts = TimeStep::restart(self.observation());
        self.current = Some(ts.clone());
        Ok(ts)
    }

    fn step(&mut self, action: &Nest<Array>) -> Result<TimeStep> {
        if self.current.as_ref().map_or(true, |ts| ts.is_last()) {
            return self.reset();
        }
        let reward = action
            .as_leaf()
            .and_then(|a| a.to_f32_vec().first().cloned())
            .ok_or_else(|| TrellisError::StructureMismatch("Expected a scalar action".into()))?;
        self.counter += 1.0;
        self.steps += 1;
        let ts = if self.steps >= self.config.episode_length {
            TimeStep::termination(self.observation(), reward)
        } else {
            TimeStep::transition(self.observation(), reward, 1.0)
        };
        self.current = Some(ts.clone());
        Ok(ts)
    }

    fn reset_with_index(&mut self, ix: usize) -> Result<TimeStep> {
        self.start = ix as f32;
        self.reset()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::StepType;

    fn action(a: i64) -> Nest<Array> {
        Nest::Leaf(Array::scalar_i64(a))
    }

    #[test]
    fn test_episode() -> Result<()> {
        let config = CountingEnvConfig::default().episode_length(2);
        let mut env = CountingEnv::build(&config, 10)?;

        // The first step resets.
        let ts = env.step(&action(1))?;
        assert!(ts.is_first());
        assert_eq!(ts.observation, Nest::Leaf(Array::vec_f32(vec![10.0])));

        let ts = env.step(&action(1))?;
        assert_eq!(ts.step_types()?, vec![StepType::Mid]);
        assert_eq!(ts.rewards(), vec![1.0]);

        let ts = env.step(&action(0))?;
        assert!(ts.is_last());
        assert_eq!(ts.rewards(), vec![0.0]);
        assert_eq!(ts.discounts(), vec![0.0]);
        assert_eq!(ts.observation, Nest::Leaf(Array::vec_f32(vec![12.0])));

        // The step after the last one resets.
        assert!(env.step(&action(1))?.is_first());
        Ok(())
    }

    #[test]
    fn test_current_time_step_resets_lazily() -> Result<()> {
        let mut env = CountingEnv::build(&CountingEnvConfig::default(), 0)?;
        assert!(env.current_time_step()?.is_first());
        env.step(&action(1))?;
        assert!(env.current_time_step()?.is_mid());
        Ok(())
    }
}
