//! Shareable environment handle detecting concurrent execution.
use super::BatchedEnv;
use crate::{
    array::{Array, DType},
    base::{Env, TimeStep},
    error::TrellisError,
    nest::Nest,
    spec::ArraySpec,
};
use anyhow::Result;
use log::trace;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

enum Inner<E: Env> {
    Batched(E),
    Single(BatchedEnv<E>),
}

impl<E: Env> Inner<E> {
    fn reset(&mut self) -> Result<TimeStep> {
        match self {
            Inner::Batched(env) => env.reset(),
            Inner::Single(env) => env.reset(),
        }
    }

    fn step(&mut self, action: &Nest<Array>) -> Result<TimeStep> {
        match self {
            Inner::Batched(env) => env.step(action),
            Inner::Single(env) => env.step(action),
        }
    }

    fn reset_with_index(&mut self, ix: usize) -> Result<TimeStep> {
        match self {
            Inner::Batched(env) => env.reset_with_index(ix),
            Inner::Single(env) => env.reset_with_index(ix),
        }
    }

    fn render(&mut self) -> Result<()> {
        match self {
            Inner::Batched(env) => env.render(),
            Inner::Single(env) => env.render(),
        }
    }
}

struct State<E: Env> {
    inner: Inner<E>,
    time_step: Option<TimeStep>,
}

/// A cloneable handle to an environment with a request/response interface.
///
/// Every call returns the time step together with a `step_state`, which the caller passes
/// to the next call to chain calls in order. The state defaults to `int64` zeros of shape
/// `[batch_size]` and is passed through unchanged.
///
/// Calls must not overlap. Each call takes the lock of the environment without blocking,
/// and fails with [`TrellisError::ConcurrentExecution`] if another call holds it.
///
/// A non-batched environment is presented as a batch of size one, so time steps and
/// actions always have a leading batch dimension.
pub struct GuardedEnv<E: Env> {
    state: Arc<Mutex<State<E>>>,
    batch_size: usize,
    observation_spec: Nest<ArraySpec>,
    action_spec: Nest<ArraySpec>,
}

impl<E: Env> Clone for GuardedEnv<E> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            batch_size: self.batch_size,
            observation_spec: self.observation_spec.clone(),
            action_spec: self.action_spec.clone(),
        }
    }
}

impl<E: Env> GuardedEnv<E> {
    /// Wraps an environment.
    pub fn new(env: E) -> Result<Self> {
        let observation_spec = env.observation_spec();
        let action_spec = env.action_spec();
        let (inner, batch_size) = if env.batched() {
            let batch_size = env.batch_size().unwrap_or(1);
            (Inner::Batched(env), batch_size)
        } else {
            (Inner::Single(BatchedEnv::new(vec![env])?), 1)
        };
        Ok(Self {
            state: Arc::new(Mutex::new(State {
                inner,
                time_step: None,
            })),
            batch_size,
            observation_spec,
            action_spec,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, State<E>>> {
        match self.state.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(TrellisError::ConcurrentExecution.into()),
            // A panic in another call does not leave the environment half-updated in a way
            // this handle could detect, so the state is used as is.
            Err(TryLockError::Poisoned(e)) => Ok(e.into_inner()),
        }
    }

    fn step_state(&self, step_state: Option<Nest<Array>>) -> Nest<Array> {
        step_state.unwrap_or_else(|| Nest::Leaf(Array::zeros(DType::I64, &[self.batch_size])))
    }

    /// Returns the current time step, resetting the environment if there is none.
    pub fn current_time_step(
        &self,
        step_state: Option<Nest<Array>>,
    ) -> Result<(TimeStep, Nest<Array>)> {
        let mut state = self.lock()?;
        let time_step = match &state.time_step {
            Some(ts) => ts.clone(),
            None => {
                let ts = state.inner.reset()?;
                state.time_step = Some(ts.clone());
                ts
            }
        };
        Ok((time_step, self.step_state(step_state)))
    }

    /// Resets the environment.
    pub fn reset(&self, step_state: Option<Nest<Array>>) -> Result<(TimeStep, Nest<Array>)> {
        trace!("GuardedEnv::reset()");
        let mut state = self.lock()?;
        let ts = state.inner.reset()?;
        state.time_step = Some(ts.clone());
        Ok((ts, self.step_state(step_state)))
    }

    /// Applies a batch of actions.
    ///
    /// Every leaf of `action` must have the leading dimension `batch_size`. The action is
    /// repacked into the structure of the action spec.
    pub fn step(
        &self,
        action: &Nest<Array>,
        step_state: Option<Nest<Array>>,
    ) -> Result<(TimeStep, Nest<Array>)> {
        trace!("GuardedEnv::step()");
        for a in action.flatten() {
            if a.ndim() == 0 || a.shape()[0] != self.batch_size {
                return Err(TrellisError::BatchDimMismatch {
                    batch_size: self.batch_size,
                    shape: a.shape().to_vec(),
                }
                .into());
            }
        }
        let action = Nest::pack_sequence_as(
            &self.action_spec,
            action.flatten().into_iter().cloned().collect(),
        )?;
        let mut state = self.lock()?;
        let ts = state.inner.step(&action)?;
        state.time_step = Some(ts.clone());
        Ok((ts, self.step_state(step_state)))
    }

    /// Resets the environment using `ix` in an arbitrary way.
    pub fn reset_with_index(&self, ix: usize) -> Result<TimeStep> {
        let mut state = self.lock()?;
        let ts = state.inner.reset_with_index(ix)?;
        state.time_step = Some(ts.clone());
        Ok(ts)
    }
}

impl<E: Env> Env for GuardedEnv<E> {
    type Config = E::Config;
    type Info = ();

    fn build(config: &Self::Config, seed: i64) -> Result<Self> {
        Self::new(E::build(config, seed)?)
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
        Some(self.batch_size)
    }

    fn current_time_step(&mut self) -> Result<TimeStep> {
        GuardedEnv::current_time_step(self, None).map(|(ts, _)| ts)
    }

    fn reset(&mut self) -> Result<TimeStep> {
        GuardedEnv::reset(self, None).map(|(ts, _)| ts)
    }

    fn step(&mut self, action: &Nest<Array>) -> Result<TimeStep> {
        GuardedEnv::step(self, action, None).map(|(ts, _)| ts)
    }

    fn reset_with_index(&mut self, ix: usize) -> Result<TimeStep> {
        GuardedEnv::reset_with_index(self, ix)
    }

    fn render(&mut self) -> Result<()> {
        self.lock()?.inner.render()
    }
}
