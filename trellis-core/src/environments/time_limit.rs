//! Limits the length of episodes.
use crate::{
    array::Array,
    base::{Env, StepType, TimeStep},
    nest::Nest,
    spec::ArraySpec,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Configuration of [`TimeLimit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeLimitConfig<C> {
    /// Configuration of the wrapped environment.
    pub env_config: C,

    /// Maximum number of steps per episode.
    pub duration: usize,
}

/// Ends an episode after `duration` steps by marking the time step as the last one.
///
/// The discount of the relabelled time step is kept, so the episode is truncated rather
/// than terminated. The wrapped environment must not be batched.
pub struct TimeLimit<E: Env> {
    env: E,
    duration: usize,
    num_steps: Option<usize>,
    current: Option<TimeStep>,
}

impl<E: Env> TimeLimit<E> {
    /// Wraps an environment.
    pub fn new(env: E, duration: usize) -> Self {
        Self {
            env,
            duration,
            num_steps: None,
            current: None,
        }
    }

    /// The wrapped environment.
    pub fn inner(&self) -> &E {
        &self.env
    }
}

impl<E: Env> Env for TimeLimit<E> {
    type Config = TimeLimitConfig<E::Config>;
    type Info = E::Info;

    fn build(config: &Self::Config, seed: i64) -> Result<Self> {
        Ok(Self::new(E::build(&config.env_config, seed)?, config.duration))
    }

    fn observation_spec(&self) -> Nest<ArraySpec> {
        self.env.observation_spec()
    }

    fn action_spec(&self) -> Nest<ArraySpec> {
        self.env.action_spec()
    }

    fn current_time_step(&mut self) -> Result<TimeStep> {
        match &self.current {
            Some(ts) => Ok(ts.clone()),
            None => self.reset(),
        }
    }

    fn reset(&mut self) -> Result<TimeStep> {
        let ts = self.env.reset()?;
        self.num_steps = Some(0);
        self.current = Some(ts.clone());
        Ok(ts)
    }

    fn step(&mut self, action: &Nest<Array>) -> Result<TimeStep> {
        let num_steps = match self.num_steps {
            Some(n) => n + 1,
            None => return self.reset(),
        };
        let mut ts = self.env.step(action)?;
        if num_steps >= self.duration {
            ts = ts.with_step_type(StepType::Last);
        }
        self.num_steps = if ts.is_last() { None } else { Some(num_steps) };
        self.current = Some(ts.clone());
        Ok(ts)
    }

    fn reset_with_index(&mut self, ix: usize) -> Result<TimeStep> {
        let ts = self.env.reset_with_index(ix)?;
        self.num_steps = Some(0);
        self.current = Some(ts.clone());
        Ok(ts)
    }

    fn get_info(&self) -> Option<&Self::Info> {
        self.env.get_info()
    }

    fn render(&mut self) -> Result<()> {
        self.env.render()
    }
}
