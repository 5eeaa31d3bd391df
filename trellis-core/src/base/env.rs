//! Environment.
use super::{time_step_spec, Info, TimeStep};
use crate::{array::Array, nest::Nest, spec::ArraySpec};
use anyhow::Result;

/// Represents an environment, typically an MDP.
///
/// An environment emits [`TimeStep`]s. A freshly built environment has no current time
/// step; the first call to [`Env::current_time_step`] or [`Env::step`] resets it. After a
/// time step whose type is `LAST`, the next call to [`Env::step`] ignores the action and
/// resets the environment, returning a `FIRST` time step.
///
/// A batched environment returns time steps with a leading batch dimension and takes
/// actions with the same leading dimension.
pub trait Env {
    /// Configurations.
    type Config: Clone;

    /// Information in addition to time steps.
    type Info: Info;

    /// Builds an environment with a given random seed.
    fn build(config: &Self::Config, seed: i64) -> Result<Self>
    where
        Self: Sized;

    /// Spec of observations, without the batch dimension.
    fn observation_spec(&self) -> Nest<ArraySpec>;

    /// Spec of actions, without the batch dimension.
    fn action_spec(&self) -> Nest<ArraySpec>;

    /// Spec of time steps, without the batch dimension.
    fn time_step_spec(&self) -> TimeStep<ArraySpec> {
        time_step_spec(self.observation_spec())
    }

    /// Returns `true` if time steps and actions have a leading batch dimension.
    fn batched(&self) -> bool {
        false
    }

    /// Batch size of a batched environment.
    fn batch_size(&self) -> Option<usize> {
        None
    }

    /// Returns the current time step, resetting the environment if there is none.
    fn current_time_step(&mut self) -> Result<TimeStep>;

    /// Starts a new episode.
    fn reset(&mut self) -> Result<TimeStep>;

    /// Applies an action and returns the next time step.
    fn step(&mut self, action: &Nest<Array>) -> Result<TimeStep>;

    /// Starts a new episode, using `ix` in an arbitrary way, e.g. as a random seed.
    ///
    /// This is useful for reproducible evaluation.
    #[allow(unused_variables)]
    fn reset_with_index(&mut self, ix: usize) -> Result<TimeStep> {
        self.reset()
    }

    /// Information of the last step, if any.
    fn get_info(&self) -> Option<&Self::Info> {
        None
    }

    /// Renders the environment.
    fn render(&mut self) -> Result<()> {
        Ok(())
    }
}
