//! Agent.
use super::{Policy, TimeStep};
use crate::{
    error::TrellisError, nest::Nest, record::Record, spec::outer_dims, spec::ArraySpec,
    trajectory::Trajectory,
};
use anyhow::Result;
use std::path::Path;

/// Loss of a training step.
#[derive(Debug, Clone, PartialEq)]
pub struct LossInfo {
    /// Total loss.
    pub loss: f32,

    /// Components of the loss and other values to be logged.
    pub extra: Record,
}

/// Represents a trainable policy.
///
/// An agent owns a policy used for evaluation and a policy used for collecting experience.
/// Both may share parameters, in which case [`Agent::policy`] and [`Agent::collect_policy`]
/// switch the mode of the same object, like switching between evaluation and training mode.
pub trait Agent {
    /// Policy of the agent.
    type Policy: Policy;

    /// Prepares the agent before training, e.g. synchronizing target networks.
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    /// The policy for evaluation and deployment.
    fn policy(&mut self) -> &mut Self::Policy;

    /// The policy for collecting experience.
    fn collect_policy(&mut self) -> &mut Self::Policy;

    /// Spec of time steps.
    fn time_step_spec(&self) -> &TimeStep<ArraySpec>;

    /// Spec of actions.
    fn action_spec(&self) -> &Nest<ArraySpec>;

    /// Spec of experience consumed by [`Agent::train`].
    fn collect_data_spec(&self) -> Trajectory<ArraySpec>;

    /// Required length of the time axis of experience, if fixed.
    fn train_sequence_length(&self) -> Option<usize> {
        None
    }

    /// Trains the agent with a batch of experience of shape `[B, T, ...]`.
    ///
    /// The experience is validated against [`Agent::collect_data_spec`] before calling
    /// [`Agent::update`].
    fn train(&mut self, experience: &Trajectory) -> Result<LossInfo> {
        check_experience(
            experience,
            &self.collect_data_spec(),
            self.train_sequence_length(),
        )?;
        self.update(experience)
    }

    /// Performs the optimization on validated experience.
    fn update(&mut self, experience: &Trajectory) -> Result<LossInfo>;

    /// Saves the parameters of the agent in the given directory.
    fn save_params(&self, path: &Path) -> Result<()>;

    /// Loads the parameters of the agent from the given directory.
    fn load_params(&mut self, path: &Path) -> Result<()>;
}

/// Checks that every leaf of `experience` has outer dims `[B, T]`.
pub fn check_experience(
    experience: &Trajectory,
    spec: &Trajectory<ArraySpec>,
    train_sequence_length: Option<usize>,
) -> Result<()> {
    let dims = outer_dims(&experience.to_nest(), &spec.to_nest())
        .map_err(|e| TrellisError::InvalidExperience(e.to_string()))?;
    if dims.len() != 2 {
        return Err(TrellisError::InvalidExperience(format!(
            "Expected outer dims [B, T], got {:?}",
            dims
        ))
        .into());
    }
    if let Some(n) = train_sequence_length {
        if dims[1] != n {
            return Err(TrellisError::InvalidExperience(format!(
                "Expected sequence length {}, got {}",
                n, dims[1]
            ))
            .into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        array::{Array, DType},
        base::{time_step_spec, PolicyStep},
        trajectory::trajectory_spec,
    };

    fn spec() -> Trajectory<ArraySpec> {
        let ts_spec = time_step_spec(Nest::Leaf(ArraySpec::new(&[2], DType::F32)));
        let action_spec = Nest::Leaf(ArraySpec::bounded_scalar(&[], DType::I64, 0.0, 1.0));
        trajectory_spec(&ts_spec, &action_spec, &Nest::empty())
    }

    fn experience(outer: &[usize]) -> Trajectory {
        let spec = spec();
        let z = |s: &ArraySpec| s.zeros(outer);
        let ts = TimeStep {
            step_type: z(&spec.step_type),
            reward: z(&spec.reward),
            discount: z(&spec.discount),
            observation: spec.observation.zeros(outer),
        };
        let ps = PolicyStep::new(spec.action.zeros(outer));
        Trajectory::from_transition(&ts, &ps, &ts)
    }

    #[test]
    fn test_check_experience() -> Result<()> {
        check_experience(&experience(&[4, 3]), &spec(), None)?;
        check_experience(&experience(&[4, 3]), &spec(), Some(3))?;

        for (outer, len) in [(vec![4], None), (vec![4, 3], Some(2))].iter() {
            let err = check_experience(&experience(outer), &spec(), *len).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<TrellisError>(),
                Some(TrellisError::InvalidExperience(_))
            ));
        }

        let mut bad = experience(&[4, 3]);
        bad.reward = Array::zeros(DType::F32, &[4, 2]);
        assert!(check_experience(&bad, &spec(), None).is_err());
        Ok(())
    }
}
