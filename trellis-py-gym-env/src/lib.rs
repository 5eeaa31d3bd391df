//! A wrapper of [Gymnasium](https://gymnasium.farama.org) environments on Python.
//!
//! [`GymEnv`] drives a Python environment through [`PyO3`](https://github.com/PyO3/pyo3)
//! and implements [`Env`](trellis_core::Env). Its specs are derived from the gym spaces of
//! the environment: [`GymSpace`] mirrors the spaces in Rust and [`spec_from_gym_space`]
//! converts them into nests of [`ArraySpec`](trellis_core::ArraySpec)s, with dtypes
//! overridable per kind of space through [`DTypeMap`].
//!
//! Observations are read as numpy arrays and cast to the dtypes of the observation spec.
//! `Discrete` actions are given to Python as integers and `Box` actions as `float32`
//! arrays.
//!
//! ```no_run
//! use trellis_core::Env;
//! use trellis_py_gym_env::{GymEnv, GymEnvConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = GymEnvConfig::default().name("CartPole-v1");
//! let mut env = GymEnv::build(&config, 42)?;
//! let time_step = env.current_time_step()?;
//! assert!(time_step.is_first());
//! # Ok(())
//! # }
//! ```
mod base;
mod config;
mod error;
mod space;
pub mod util;
pub use base::{GymEnv, GymInfo};
pub use config::GymEnvConfig;
pub use error::GymEnvError;
pub use space::{spec_from_gym_space, DTypeMap, GymSpace};
