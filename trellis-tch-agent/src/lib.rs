#![warn(missing_docs)]
//! Networks, action distributions and the PPO agent of trellis, built on
//! [tch](https://crates.io/crates/tch).
//!
//! [`PpoAgent`](ppo::PpoAgent) implements [`Agent`](trellis_core::Agent). Its policy,
//! [`PpoPolicy`](ppo::PpoPolicy), applies an [`ActorNetwork`](network::ActorNetwork) to
//! flattened observations and samples actions from the resulting
//! [`Distribution`](distribution::Distribution)s.
//!
//! ```no_run
//! use anyhow::Result;
//! use tch::Device;
//! use trellis_core::{
//!     environments::{CountingEnv, CountingEnvConfig},
//!     time_step_spec, Env,
//! };
//! use trellis_tch_agent::ppo::{PpoAgent, PpoConfig};
//!
//! fn build() -> Result<PpoAgent> {
//!     let env = CountingEnv::build(&CountingEnvConfig::default(), 0)?;
//!     let config = PpoConfig::default().num_epochs(10).use_gae(true);
//!     PpoAgent::build(
//!         config,
//!         time_step_spec(env.observation_spec()),
//!         env.action_spec(),
//!         Device::cuda_if_available(),
//!     )
//! }
//! ```
pub mod bias_layer;
pub mod distribution;
pub mod mlp;
pub mod model;
pub mod network;
pub mod normalizer;
pub mod opt;
pub mod ppo;
pub mod util;
