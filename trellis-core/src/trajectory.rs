//! Trajectories, the unit of experience stored in replay buffers and consumed by agents.
use crate::{
    array::{Array, Stack},
    base::{step_types_of, PolicyStep, StepType, TimeStep},
    error::TrellisError,
    nest::{stack_by, stack_nest_by, Nest},
    spec::ArraySpec,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A transition `(s_t, a_t, r_t, s_{t+1})` without the next observation.
///
/// The next observation is the observation of the following trajectory item, so a sequence
/// of trajectories sampled along time carries every observation once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory<T = Array> {
    /// Step type of the time step the action was taken at.
    pub step_type: T,

    /// Observation the action was taken at.
    pub observation: Nest<T>,

    /// Action.
    pub action: Nest<T>,

    /// Auxiliary information of the policy.
    pub policy_info: Nest<T>,

    /// Step type of the next time step.
    pub next_step_type: T,

    /// Reward of the next time step.
    pub reward: T,

    /// Discount of the next time step.
    pub discount: T,
}

impl<T: Clone> Trajectory<T> {
    /// Builds a trajectory from a time step, the policy step taken at it and the next time step.
    ///
    /// This works for values as well as for specs.
    pub fn from_transition(
        time_step: &TimeStep<T>,
        policy_step: &PolicyStep<T>,
        next_time_step: &TimeStep<T>,
    ) -> Self {
        Self {
            step_type: time_step.step_type.clone(),
            observation: time_step.observation.clone(),
            action: policy_step.action.clone(),
            policy_info: policy_step.info.clone(),
            next_step_type: next_time_step.step_type.clone(),
            reward: next_time_step.reward.clone(),
            discount: next_time_step.discount.clone(),
        }
    }

    /// Converts into a dictionary nest.
    pub fn to_nest(&self) -> Nest<T> {
        Nest::dict(vec![
            ("action", self.action.clone()),
            ("discount", Nest::Leaf(self.discount.clone())),
            ("next_step_type", Nest::Leaf(self.next_step_type.clone())),
            ("observation", self.observation.clone()),
            ("policy_info", self.policy_info.clone()),
            ("reward", Nest::Leaf(self.reward.clone())),
            ("step_type", Nest::Leaf(self.step_type.clone())),
        ])
    }

    /// Converts back from a nest built by [`Trajectory::to_nest`].
    pub fn from_nest(nest: Nest<T>) -> Result<Self> {
        let mut dict = match nest {
            Nest::Dict(dict) => dict,
            _ => {
                return Err(TrellisError::StructureMismatch(
                    "A trajectory nest must be a dictionary".into(),
                )
                .into())
            }
        };
        let step_type = take_leaf(&mut dict, "step_type")?;
        let next_step_type = take_leaf(&mut dict, "next_step_type")?;
        let reward = take_leaf(&mut dict, "reward")?;
        let discount = take_leaf(&mut dict, "discount")?;
        Ok(Self {
            step_type,
            observation: take(&mut dict, "observation")?,
            action: take(&mut dict, "action")?,
            policy_info: take(&mut dict, "policy_info")?,
            next_step_type,
            reward,
            discount,
        })
    }
}

fn take<T>(dict: &mut BTreeMap<String, Nest<T>>, key: &str) -> Result<Nest<T>> {
    dict.remove(key).ok_or_else(|| {
        TrellisError::StructureMismatch(format!("Key {} is missing in the trajectory", key)).into()
    })
}

fn take_leaf<T>(dict: &mut BTreeMap<String, Nest<T>>, key: &str) -> Result<T> {
    match take(dict, key)? {
        Nest::Leaf(x) => Ok(x),
        _ => Err(TrellisError::StructureMismatch(format!("{} must be a leaf", key)).into()),
    }
}

/// Spec of trajectories generated with the given specs.
pub fn trajectory_spec(
    time_step_spec: &TimeStep<ArraySpec>,
    action_spec: &Nest<ArraySpec>,
    info_spec: &Nest<ArraySpec>,
) -> Trajectory<ArraySpec> {
    let policy_step = PolicyStep::new(action_spec.clone()).with_info(info_spec.clone());
    Trajectory::from_transition(time_step_spec, &policy_step, time_step_spec)
}

impl Trajectory {
    /// Step types of every element.
    pub fn step_types(&self) -> Result<Vec<StepType>> {
        step_types_of(&self.step_type)
    }

    /// Next step types of every element.
    pub fn next_step_types(&self) -> Result<Vec<StepType>> {
        step_types_of(&self.next_step_type)
    }

    /// Rewards of every element.
    pub fn rewards(&self) -> Vec<f32> {
        self.reward.to_f32_vec()
    }

    /// Discounts of every element.
    pub fn discounts(&self) -> Vec<f32> {
        self.discount.to_f32_vec()
    }

    fn all(types: Result<Vec<StepType>>, f: impl Fn(StepType) -> bool) -> bool {
        match types {
            Ok(xs) => !xs.is_empty() && xs.into_iter().all(f),
            Err(_) => false,
        }
    }

    /// The action was taken at the first step of an episode.
    pub fn is_first(&self) -> bool {
        Self::all(self.step_types(), |t| t == StepType::First)
    }

    /// The action was taken at a mid step and led to another mid step.
    pub fn is_mid(&self) -> bool {
        match (self.step_types(), self.next_step_types()) {
            (Ok(xs), Ok(ys)) => {
                !xs.is_empty()
                    && xs
                        .into_iter()
                        .zip(ys)
                        .all(|(x, y)| x == StepType::Mid && y == StepType::Mid)
            }
            _ => false,
        }
    }

    /// The transition ends an episode.
    pub fn is_last(&self) -> bool {
        Self::all(self.next_step_types(), |t| t == StepType::Last)
    }

    /// The transition connects the last step of an episode to the first of the next one.
    pub fn is_boundary(&self) -> bool {
        Self::all(self.step_types(), |t| t == StepType::Last)
    }
}

impl Stack for Trajectory {
    fn stack(items: &[Self]) -> Result<Self> {
        Ok(Self {
            step_type: stack_by(items, |x| &x.step_type)?,
            observation: stack_nest_by(items, |x| &x.observation)?,
            action: stack_nest_by(items, |x| &x.action)?,
            policy_info: stack_nest_by(items, |x| &x.policy_info)?,
            next_step_type: stack_by(items, |x| &x.next_step_type)?,
            reward: stack_by(items, |x| &x.reward)?,
            discount: stack_by(items, |x| &x.discount)?,
        })
    }

    fn unstack(&self) -> Result<Vec<Self>> {
        let step_type = self.step_type.unstack()?;
        let n = step_type.len();
        let mut observation = self.observation.unstack_to(n)?.into_iter();
        let mut action = self.action.unstack_to(n)?.into_iter();
        let mut policy_info = self.policy_info.unstack_to(n)?.into_iter();
        let mut next_step_type = self.next_step_type.unstack()?.into_iter();
        let mut reward = self.reward.unstack()?.into_iter();
        let mut discount = self.discount.unstack()?.into_iter();
        let mut items = Vec::with_capacity(n);
        for step_type in step_type {
            let mismatch =
                || TrellisError::ShapeMismatch("Fields have different leading dims".into());
            items.push(Self {
                step_type,
                observation: observation.next().ok_or_else(mismatch)?,
                action: action.next().ok_or_else(mismatch)?,
                policy_info: policy_info.next().ok_or_else(mismatch)?,
                next_step_type: next_step_type.next().ok_or_else(mismatch)?,
                reward: reward.next().ok_or_else(mismatch)?,
                discount: discount.next().ok_or_else(mismatch)?,
            });
        }
        Ok(items)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::array::DType;

    fn obs(v: f32) -> Nest<Array> {
        Nest::Leaf(Array::vec_f32(vec![v]))
    }

    #[test]
    fn test_from_transition() -> Result<()> {
        let ts = TimeStep::restart(obs(0.0));
        let ps = PolicyStep::new(Nest::Leaf(Array::scalar_i64(1)));
        let next = TimeStep::termination(obs(1.0), 3.0);
        let traj = Trajectory::from_transition(&ts, &ps, &next);
        assert!(traj.is_first());
        assert!(traj.is_last());
        assert!(!traj.is_boundary());
        assert_eq!(traj.observation, obs(0.0));
        assert_eq!(traj.rewards(), vec![3.0]);
        assert_eq!(traj.discounts(), vec![0.0]);

        let boundary = Trajectory::from_transition(&next, &ps, &TimeStep::restart(obs(0.0)));
        assert!(boundary.is_boundary());
        Ok(())
    }

    #[test]
    fn test_nest_conversion() -> Result<()> {
        let ts = TimeStep::transition(obs(0.0), 1.0, 1.0);
        let ps = PolicyStep::new(Nest::Leaf(Array::scalar_i64(0)))
            .with_info(Nest::dict(vec![("logits", Nest::Leaf(Array::zeros(DType::F32, &[2])))]));
        let traj = Trajectory::from_transition(&ts, &ps, &ts);
        let nest = traj.to_nest();
        match &nest {
            Nest::Dict(d) => assert_eq!(
                d.keys().map(|k| k.as_str()).collect::<Vec<_>>(),
                vec![
                    "action",
                    "discount",
                    "next_step_type",
                    "observation",
                    "policy_info",
                    "reward",
                    "step_type"
                ]
            ),
            _ => panic!("expected a dictionary"),
        }
        assert_eq!(Trajectory::from_nest(nest)?, traj);
        Ok(())
    }

    #[test]
    fn test_stack_unstack_with_empty_info() -> Result<()> {
        let ts = TimeStep::transition(obs(0.0), 1.0, 1.0);
        let ps = PolicyStep::new(Nest::Leaf(Array::scalar_i64(0)));
        let items = vec![Trajectory::from_transition(&ts, &ps, &ts); 3];
        let stacked = Trajectory::stack(&items)?;
        assert_eq!(stacked.step_type.shape(), &[3]);
        assert!(stacked.is_mid());
        assert_eq!(stacked.unstack()?, items);
        Ok(())
    }
}
