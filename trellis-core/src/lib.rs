#![warn(missing_docs)]
//! Core components of trellis, a library for reinforcement learning.
//!
//! # Data model
//!
//! Values exchanged between environments, policies and agents are [`Nest`]s of
//! [`Array`](array::Array)s, described by nests of [`ArraySpec`]s. An environment emits
//! [`TimeStep`]s, a policy emits [`PolicyStep`]s, and a pair of consecutive time steps with
//! the policy step taken in between forms a [`Trajectory`](trajectory::Trajectory), the unit
//! of experience.
//!
//! # Traits
//!
//! * [`Env`] is an environment, possibly batched.
//! * [`Policy`] maps time steps to actions.
//! * [`Agent`] owns policies and trains them on experience.
//! * [`ReplayBufferBase`] stores experience; [`Observer`]s receive every collected
//!   trajectory.
//!
//! # Training
//!
//! [`Trainer`] runs the on-policy training loop: it collects episodes with
//! [`DynamicEpisodeDriver`](drivers::DynamicEpisodeDriver), trains the agent on the
//! gathered experience, evaluates with an [`Evaluator`](evaluator::Evaluator), records
//! [`metrics`] and saves checkpoints.
pub mod array;
pub mod checkpoint;
pub mod drivers;
pub mod environments;
pub mod error;
pub mod evaluator;
pub mod metrics;
pub mod nest;
pub mod policies;
pub mod record;
pub mod replay_buffer;
pub mod spec;
pub mod trajectory;

mod base;
pub use base::{
    time_step_spec, Agent, Checkpointable, Env, Info, LossInfo, Observer, Policy, PolicyStep,
    ReplayBufferBase, StepType, TimeStep,
};
pub use nest::Nest;
pub use spec::ArraySpec;

mod trainer;
pub use trainer::{Trainer, TrainerConfig, TrainerState};
