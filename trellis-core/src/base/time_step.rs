//! Time steps emitted by environments and steps emitted by policies.
use crate::{
    array::{Array, DType, Stack},
    error::TrellisError,
    nest::{stack_by, stack_nest_by, Nest},
    spec::ArraySpec,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Additional information of an environment, not part of the observation.
pub trait Info {}

impl Info for () {}

/// Position of a time step in an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepType {
    /// The first step of an episode, emitted by a reset.
    First = 0,

    /// Any step between the first and the last.
    Mid = 1,

    /// The last step of an episode.
    Last = 2,
}

impl StepType {
    /// Converts the integer representation.
    pub fn from_value(v: i64) -> Result<Self> {
        match v {
            0 => Ok(StepType::First),
            1 => Ok(StepType::Mid),
            2 => Ok(StepType::Last),
            _ => Err(TrellisError::ShapeMismatch(format!("Invalid step type {}", v)).into()),
        }
    }

    /// The integer representation.
    pub fn value(&self) -> i32 {
        *self as i32
    }
}

/// Parses every element of an integer array as a step type.
pub(crate) fn step_types_of(array: &Array) -> Result<Vec<StepType>> {
    array
        .to_f64_vec()
        .into_iter()
        .map(|v| StepType::from_value(v as i64))
        .collect()
}

/// Output of an environment at a step.
///
/// With `T = Array` this holds values, either for a single environment (scalar `step_type`,
/// `reward` and `discount`) or for a batch (vectors of length `B`). With `T = ArraySpec` it
/// is the spec of those values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeStep<T = Array> {
    /// [`StepType`] values as `int32`.
    pub step_type: T,

    /// Reward, `float32`.
    pub reward: T,

    /// Discount, `float32`.
    pub discount: T,

    /// Observation.
    pub observation: Nest<T>,
}

/// Spec of time steps with the given observation spec.
pub fn time_step_spec(observation_spec: Nest<ArraySpec>) -> TimeStep<ArraySpec> {
    TimeStep {
        step_type: ArraySpec::new(&[], DType::I32).with_name("step_type"),
        reward: ArraySpec::new(&[], DType::F32).with_name("reward"),
        discount: ArraySpec::bounded_scalar(&[], DType::F32, 0.0, 1.0).with_name("discount"),
        observation: observation_spec,
    }
}

impl TimeStep {
    fn single(observation: Nest<Array>, step_type: StepType, reward: f32, discount: f32) -> Self {
        Self {
            step_type: Array::scalar_i32(step_type.value()),
            reward: Array::scalar_f32(reward),
            discount: Array::scalar_f32(discount),
            observation,
        }
    }

    /// The first step of an episode, with reward 0 and discount 1.
    pub fn restart(observation: Nest<Array>) -> Self {
        Self::single(observation, StepType::First, 0.0, 1.0)
    }

    /// A step in the middle of an episode.
    pub fn transition(observation: Nest<Array>, reward: f32, discount: f32) -> Self {
        Self::single(observation, StepType::Mid, reward, discount)
    }

    /// The last step of an episode reaching a terminal state, with discount 0.
    pub fn termination(observation: Nest<Array>, reward: f32) -> Self {
        Self::single(observation, StepType::Last, reward, 0.0)
    }

    /// The last step of an episode cut short, keeping the discount.
    pub fn truncation(observation: Nest<Array>, reward: f32, discount: f32) -> Self {
        Self::single(observation, StepType::Last, reward, discount)
    }

    /// A batch of first steps. `observation` must have the leading batch dimension.
    pub fn restart_batch(observation: Nest<Array>, batch_size: usize) -> Self {
        Self {
            step_type: Array::zeros(DType::I32, &[batch_size]),
            reward: Array::zeros(DType::F32, &[batch_size]),
            discount: Array::full(DType::F32, &[batch_size], 1.0),
            observation,
        }
    }

    /// Step types of every element.
    pub fn step_types(&self) -> Result<Vec<StepType>> {
        step_types_of(&self.step_type)
    }

    /// Rewards of every element.
    pub fn rewards(&self) -> Vec<f32> {
        self.reward.to_f32_vec()
    }

    /// Discounts of every element.
    pub fn discounts(&self) -> Vec<f32> {
        self.discount.to_f32_vec()
    }

    fn all(&self, t: StepType) -> bool {
        match self.step_types() {
            Ok(xs) => !xs.is_empty() && xs.iter().all(|x| *x == t),
            Err(_) => false,
        }
    }

    /// Returns `true` if every element is a first step.
    pub fn is_first(&self) -> bool {
        self.all(StepType::First)
    }

    /// Returns `true` if every element is a mid step.
    pub fn is_mid(&self) -> bool {
        self.all(StepType::Mid)
    }

    /// Returns `true` if every element is a last step.
    pub fn is_last(&self) -> bool {
        self.all(StepType::Last)
    }

    /// Batch size, or `None` if the time step is not batched.
    pub fn batch_size(&self) -> Option<usize> {
        match self.step_type.shape() {
            [b] => Some(*b),
            _ => None,
        }
    }

    /// Outer dimensions, `[]` for a single time step and `[B]` for a batch.
    pub fn outer_dims(&self) -> Vec<usize> {
        self.step_type.shape().to_vec()
    }

    /// Replaces the step type of every element.
    pub fn with_step_type(mut self, step_type: StepType) -> Self {
        self.step_type = Array::full(DType::I32, self.step_type.shape(), step_type.value() as f64);
        self
    }
}

impl Stack for TimeStep {
    fn stack(items: &[Self]) -> Result<Self> {
        Ok(Self {
            step_type: stack_by(items, |x| &x.step_type)?,
            reward: stack_by(items, |x| &x.reward)?,
            discount: stack_by(items, |x| &x.discount)?,
            observation: stack_nest_by(items, |x| &x.observation)?,
        })
    }

    fn unstack(&self) -> Result<Vec<Self>> {
        let step_type = self.step_type.unstack()?;
        let n = step_type.len();
        let reward = self.reward.unstack()?;
        let discount = self.discount.unstack()?;
        let observation = self.observation.unstack_to(n)?;
        if reward.len() != n || discount.len() != n {
            return Err(TrellisError::ShapeMismatch(
                "Fields of the time step have different batch sizes".into(),
            )
            .into());
        }
        Ok(step_type
            .into_iter()
            .zip(reward)
            .zip(discount)
            .zip(observation)
            .map(|(((step_type, reward), discount), observation)| Self {
                step_type,
                reward,
                discount,
                observation,
            })
            .collect())
    }
}

/// Output of a policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyStep<T = Array> {
    /// Action.
    pub action: Nest<T>,

    /// Policy state passed to the next call.
    pub state: Nest<T>,

    /// Auxiliary information, e.g. parameters of the action distribution.
    pub info: Nest<T>,
}

impl<T> PolicyStep<T> {
    /// A policy step without state and info.
    pub fn new(action: Nest<T>) -> Self {
        Self {
            action,
            state: Nest::empty(),
            info: Nest::empty(),
        }
    }

    /// Sets the policy state.
    pub fn with_state(mut self, state: Nest<T>) -> Self {
        self.state = state;
        self
    }

    /// Sets the info.
    pub fn with_info(mut self, info: Nest<T>) -> Self {
        self.info = info;
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn obs(v: f32) -> Nest<Array> {
        Nest::Leaf(Array::vec_f32(vec![v]))
    }

    #[test]
    fn test_constructors() -> Result<()> {
        let ts = TimeStep::restart(obs(0.0));
        assert!(ts.is_first());
        assert_eq!(ts.rewards(), vec![0.0]);
        assert_eq!(ts.discounts(), vec![1.0]);
        assert!(TimeStep::termination(obs(1.0), 2.0).is_last());
        assert_eq!(TimeStep::termination(obs(1.0), 2.0).discounts(), vec![0.0]);
        assert_eq!(TimeStep::truncation(obs(1.0), 2.0, 0.9).discounts(), vec![0.9]);
        assert!(TimeStep::transition(obs(1.0), 1.0, 1.0).is_mid());
        Ok(())
    }

    #[test]
    fn test_stack_mixed_step_types() -> Result<()> {
        let steps = vec![TimeStep::restart(obs(0.0)), TimeStep::termination(obs(1.0), 1.0)];
        let batch = TimeStep::stack(&steps)?;
        assert_eq!(batch.batch_size(), Some(2));
        assert_eq!(batch.step_types()?, vec![StepType::First, StepType::Last]);
        assert!(!batch.is_first() && !batch.is_last());
        assert_eq!(batch.unstack()?, steps);
        Ok(())
    }
}
