//! Wrapper of gym environments implemented in Python.
use crate::{
    spec_from_gym_space,
    util::{action_to_py, info_from_py, observation_from_py},
    GymEnvConfig, GymSpace,
};
use anyhow::Result;
use log::{info, trace};
use pyo3::{
    types::{IntoPyDict, PyTuple},
    PyObject, Python,
};
use std::collections::BTreeMap;
use trellis_core::{array::Array, ArraySpec, Env, Info, Nest, TimeStep};

/// Scalar values of the info dict returned by the last step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GymInfo {
    /// Values keyed by name.
    pub values: BTreeMap<String, f64>,
}

impl Info for GymInfo {}

/// An environment of [Gymnasium](https://gymnasium.farama.org) running in the embedded
/// Python interpreter.
///
/// Specs are converted from the spaces of the environment with [`spec_from_gym_space`].
/// A terminated step is `LAST` with discount `0`. A truncated step, including one cut by
/// [`GymEnvConfig::max_steps`], is `LAST` with discount `1`.
pub struct GymEnv {
    env: PyObject,
    observation_space: GymSpace,
    action_space: GymSpace,
    observation_spec: Nest<ArraySpec>,
    action_spec: Nest<ArraySpec>,
    max_steps: Option<usize>,
    count_steps: usize,
    current: Option<TimeStep>,
    info: Option<GymInfo>,

    /// Seed given to the next reset.
    seed: Option<i64>,
}

impl GymEnv {
    /// Space of observations.
    pub fn observation_space(&self) -> &GymSpace {
        &self.observation_space
    }

    /// Space of actions.
    pub fn action_space(&self) -> &GymSpace {
        &self.action_space
    }

    fn apply(&mut self, action: &Nest<Array>) -> Result<TimeStep> {
        let (observation, reward, terminated, truncated, info) = Python::with_gil(|py| {
            let a = action_to_py(py, action, &self.action_space)?;
            let ret = self.env.call_method1(py, "step", (a,))?;
            let ret: &PyTuple = ret.extract(py)?;
            let observation = observation_from_py(py, ret.get_item(0), &self.observation_spec)?;
            let reward: f64 = ret.get_item(1).extract()?;
            let terminated: bool = ret.get_item(2).extract()?;
            let truncated: bool = ret.get_item(3).extract()?;
            let info = info_from_py(ret.get_item(4))?;
            Ok::<_, anyhow::Error>((observation, reward as f32, terminated, truncated, info))
        })?;

        self.count_steps += 1;
        let truncated = truncated
            || self
                .max_steps
                .map_or(false, |max_steps| self.count_steps >= max_steps);
        self.info = Some(GymInfo {
            values: info.into_iter().collect(),
        });

        let time_step = if terminated {
            TimeStep::termination(observation, reward)
        } else if truncated {
            TimeStep::truncation(observation, reward, 1.0)
        } else {
            TimeStep::transition(observation, reward, 1.0)
        };
        Ok(time_step)
    }
}

impl Env for GymEnv {
    type Config = GymEnvConfig;
    type Info = GymInfo;

    /// Creates the environment with `make` of the configured module.
    ///
    /// `seed` is given to the first reset.
    fn build(config: &Self::Config, seed: i64) -> Result<Self> {
        Python::with_gil(|py| -> Result<Self> {
            // pyglet reads sys.argv, which can be empty in an embedded interpreter.
            let locals = [("sys", py.import("sys")?)].into_py_dict(py);
            py.eval("sys.argv.insert(0, 'GymEnv')", None, Some(locals))?;
            let ver = py.eval("sys.version", None, Some(locals))?;
            info!("Initialize GymEnv {}", config.name);
            info!("Python version = {}", ver);

            let gym = py.import(config.module.as_str())?;
            let kwargs = config
                .render_mode
                .as_ref()
                .map(|mode| vec![("render_mode", mode.as_str())].into_py_dict(py));
            let env = gym.getattr("make")?.call((config.name.as_str(),), kwargs)?;

            let observation_space = GymSpace::from_py(env.getattr("observation_space")?)?;
            let action_space = GymSpace::from_py(env.getattr("action_space")?)?;
            info!("Observation space = {:?}", observation_space);
            info!("Action space = {:?}", action_space);

            Ok(Self {
                observation_spec: spec_from_gym_space(&observation_space, &config.dtype_map)?,
                action_spec: spec_from_gym_space(&action_space, &config.dtype_map)?,
                env: env.into(),
                observation_space,
                action_space,
                max_steps: config.max_steps,
                count_steps: 0,
                current: None,
                info: None,
                seed: Some(seed),
            })
        })
    }

    fn observation_spec(&self) -> Nest<ArraySpec> {
        self.observation_spec.clone()
    }

    fn action_spec(&self) -> Nest<ArraySpec> {
        self.action_spec.clone()
    }

    fn current_time_step(&mut self) -> Result<TimeStep> {
        match &self.current {
            Some(ts) => Ok(ts.clone()),
            None => self.reset(),
        }
    }

    fn reset(&mut self) -> Result<TimeStep> {
        trace!("GymEnv::reset()");
        let seed = self.seed.take();
        let observation = Python::with_gil(|py| -> Result<Nest<Array>> {
            let kwargs = seed.map(|seed| vec![("seed", seed)].into_py_dict(py));
            let ret = self.env.call_method(py, "reset", (), kwargs)?;
            let ret: &PyTuple = ret.extract(py)?;
            observation_from_py(py, ret.get_item(0), &self.observation_spec)
        })?;
        self.count_steps = 0;
        let time_step = TimeStep::restart(observation);
        self.current = Some(time_step.clone());
        Ok(time_step)
    }

    /// Resets the environment with `seed=ix`.
    fn reset_with_index(&mut self, ix: usize) -> Result<TimeStep> {
        self.seed = Some(ix as i64);
        self.reset()
    }

    fn step(&mut self, action: &Nest<Array>) -> Result<TimeStep> {
        trace!("GymEnv::step()");
        match &self.current {
            None => return self.reset(),
            Some(ts) if ts.is_last() => return self.reset(),
            _ => {}
        }
        let time_step = self.apply(action)?;
        self.current = Some(time_step.clone());
        Ok(time_step)
    }

    fn get_info(&self) -> Option<&Self::Info> {
        self.info.as_ref()
    }

    fn render(&mut self) -> Result<()> {
        Python::with_gil(|py| self.env.call_method0(py, "render"))?;
        Ok(())
    }
}
