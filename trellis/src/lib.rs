//! A reinforcement learning library in Rust.
//!
//! Trellis consists of the following crates:
//!
//! * Core
//!   * [trellis-core](https://crates.io/crates/trellis-core) provides nests of arrays and
//!     their specs, the traits of environments, policies and agents, batched and parallel
//!     environments, replay buffers, drivers, metrics and the on-policy [`Trainer`].
//!   * [trellis-tensorboard](https://crates.io/crates/trellis-tensorboard) has
//!     `TensorboardRecorder` to write records which can be shown in TensorBoard.
//!     It is based on [tensorboard-rs](https://crates.io/crates/tensorboard-rs).
//! * Environment
//!   * [trellis-py-gym-env](https://crates.io/crates/trellis-py-gym-env) is a wrapper of the
//!     [Gymnasium](https://gymnasium.farama.org) environments written in Python.
//! * Agent
//!   * [trellis-tch-agent](https://crates.io/crates/trellis-tch-agent) includes networks,
//!     action distributions and proximal policy optimization (PPO) based on
//!     [tch](https://crates.io/crates/tch).
//!
//! This crate re-exports [trellis-core](trellis_core) and holds examples. `ppo_gym` trains
//! a PPO agent on a Gymnasium environment:
//!
//! ```bash
//! cargo run --release --example ppo_gym -- --env-name CartPole-v1 --num-parallel-environments 8
//! ```
//!
//! [`Trainer`]: trellis_core::Trainer
pub use trellis_core as core;
