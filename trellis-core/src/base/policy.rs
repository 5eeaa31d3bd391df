//! Policy.
use super::{PolicyStep, TimeStep};
use crate::{
    array::Array,
    nest::Nest,
    spec::ArraySpec,
    trajectory::{trajectory_spec, Trajectory},
};
use anyhow::Result;

/// A policy on an environment.
///
/// Policy is a mapping from a time step to an action, optionally carrying a state between
/// calls. The mapping can be either of deterministic or stochastic. Outer dimensions of the
/// time step, e.g. the batch dimension, are preserved in the action.
pub trait Policy {
    /// Spec of time steps the policy accepts.
    fn time_step_spec(&self) -> &TimeStep<ArraySpec>;

    /// Spec of actions the policy emits.
    fn action_spec(&self) -> &Nest<ArraySpec>;

    /// Spec of the policy state. Empty for stateless policies.
    fn policy_state_spec(&self) -> Nest<ArraySpec> {
        Nest::empty()
    }

    /// Spec of the info in policy steps.
    fn info_spec(&self) -> Nest<ArraySpec> {
        Nest::empty()
    }

    /// Initial policy state, with a leading batch dimension if `batch_size` is given.
    fn get_initial_state(&self, batch_size: Option<usize>) -> Nest<Array> {
        let outer = batch_size.map_or_else(Vec::new, |b| vec![b]);
        self.policy_state_spec().zeros(&outer)
    }

    /// Computes an action for a time step.
    fn action(&mut self, time_step: &TimeStep, policy_state: &Nest<Array>) -> Result<PolicyStep>;

    /// Spec of trajectories generated by this policy.
    fn trajectory_spec(&self) -> Trajectory<ArraySpec> {
        trajectory_spec(self.time_step_spec(), self.action_spec(), &self.info_spec())
    }
}
