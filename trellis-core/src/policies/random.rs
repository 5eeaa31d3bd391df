use crate::{
    array::Array,
    base::{Policy, PolicyStep, TimeStep},
    nest::Nest,
    spec::ArraySpec,
};
use anyhow::Result;
use log::trace;
use rand::{rngs::StdRng, SeedableRng};

/// Samples actions uniformly within the bounds of the action spec.
///
/// Integer leaves are drawn from the inclusive range of the bounds. The outer dimensions of
/// the time step are kept in the action.
pub struct RandomPolicy {
    time_step_spec: TimeStep<ArraySpec>,
    action_spec: Nest<ArraySpec>,
    rng: StdRng,
}

impl RandomPolicy {
    /// Creates a random policy.
    pub fn new(
        time_step_spec: TimeStep<ArraySpec>,
        action_spec: Nest<ArraySpec>,
        seed: u64,
    ) -> Self {
        Self {
            time_step_spec,
            action_spec,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Policy for RandomPolicy {
    fn time_step_spec(&self) -> &TimeStep<ArraySpec> {
        &self.time_step_spec
    }

    fn action_spec(&self) -> &Nest<ArraySpec> {
        &self.action_spec
    }

    fn action(&mut self, time_step: &TimeStep, policy_state: &Nest<Array>) -> Result<PolicyStep> {
        let outer_dims = time_step.outer_dims();
        trace!("RandomPolicy::action(outer_dims = {:?})", outer_dims);
        let action = self.action_spec.sample_uniform(&mut self.rng, &outer_dims)?;
        Ok(PolicyStep::new(action).with_state(policy_state.clone()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{array::DType, base::time_step_spec};

    fn policy() -> RandomPolicy {
        let obs_spec = Nest::Leaf(ArraySpec::new(&[2], DType::F32));
        let action_spec = Nest::tuple_of(vec![
            ArraySpec::bounded_scalar(&[], DType::I64, 0.0, 2.0),
            ArraySpec::bounded_scalar(&[3], DType::F32, -2.0, -1.0),
        ]);
        RandomPolicy::new(time_step_spec(obs_spec), action_spec, 42)
    }

    #[test]
    fn test_actions_within_spec() -> Result<()> {
        let mut policy = policy();
        let ts = TimeStep::restart(Nest::Leaf(Array::vec_f32(vec![0.0, 0.0])));
        let step = policy.action(&ts, &Nest::empty())?;
        let leaves = step.action.flatten();
        assert_eq!(leaves[0].shape(), &[] as &[usize]);
        assert_eq!(leaves[0].dtype(), DType::I64);
        assert_eq!(leaves[1].shape(), &[3]);
        Ok(())
    }

    #[test]
    fn test_batched_actions() -> Result<()> {
        let mut policy = policy();
        let obs = Nest::Leaf(Array::zeros(DType::F32, &[50, 2]));
        let ts = TimeStep::restart_batch(obs, 50);
        let mut seen = [false; 3];
        for _ in 0..4 {
            let step = policy.action(&ts, &Nest::empty())?;
            let leaves = step.action.flatten();
            assert_eq!(leaves[0].shape(), &[50]);
            assert_eq!(leaves[1].shape(), &[50, 3]);
            for v in leaves[0].to_f64_vec() {
                seen[v as usize] = true;
            }
            assert!(leaves[1]
                .to_f64_vec()
                .iter()
                .all(|v| (-2.0..=-1.0).contains(v)));
        }
        assert_eq!(seen, [true; 3]);
        Ok(())
    }
}
