//! Metrics computed from the trajectories observed during collection and evaluation.
use crate::{
    base::{Observer, StepType},
    record::{Record, RecordValue},
    trajectory::Trajectory,
};
use anyhow::Result;
use std::collections::VecDeque;

/// Default number of episodes averaged by [`AverageReturnMetric`] and
/// [`AverageEpisodeLengthMetric`].
pub const DEFAULT_BUFFER_SIZE: usize = 10;

/// A scalar summary of observed trajectories.
pub trait Metric: Observer {
    /// Name of the metric, used as the key in records.
    fn name(&self) -> &str;

    /// Current value.
    fn result(&self) -> f32;

    /// Resets to the initial state.
    fn reset(&mut self);
}

/// Builds a record with the result of each metric.
pub fn metrics_to_record(metrics: &[&dyn Metric]) -> Record {
    let mut record = Record::empty();
    for m in metrics {
        record.insert(m.name(), RecordValue::Scalar(m.result()));
    }
    record
}

/// Counts the episodes ended in observed trajectories.
#[derive(Debug, Default, Clone)]
pub struct NumberOfEpisodes {
    count: usize,
}

impl NumberOfEpisodes {
    /// Creates a metric with zero count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of episodes.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Overwrites the count, e.g. when restoring a checkpoint.
    pub fn set_count(&mut self, count: usize) {
        self.count = count;
    }
}

impl Observer for NumberOfEpisodes {
    fn observe(&mut self, trajectory: &Trajectory) -> Result<()> {
        self.count += trajectory
            .next_step_types()?
            .into_iter()
            .filter(|t| *t == StepType::Last)
            .count();
        Ok(())
    }
}

impl Metric for NumberOfEpisodes {
    fn name(&self) -> &str {
        "NumberOfEpisodes"
    }

    fn result(&self) -> f32 {
        self.count as f32
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

/// Counts environment steps, excluding transitions between episodes.
#[derive(Debug, Default, Clone)]
pub struct EnvironmentSteps {
    count: usize,
}

impl EnvironmentSteps {
    /// Creates a metric with zero count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of steps.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Overwrites the count, e.g. when restoring a checkpoint.
    pub fn set_count(&mut self, count: usize) {
        self.count = count;
    }
}

impl Observer for EnvironmentSteps {
    fn observe(&mut self, trajectory: &Trajectory) -> Result<()> {
        self.count += trajectory
            .step_types()?
            .into_iter()
            .filter(|t| *t != StepType::Last)
            .count();
        Ok(())
    }
}

impl Metric for EnvironmentSteps {
    fn name(&self) -> &str {
        "EnvironmentSteps"
    }

    fn result(&self) -> f32 {
        self.count as f32
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

/// Per-environment accumulation of a quantity over episodes, averaged over the most recent
/// completed episodes.
#[derive(Debug, Clone)]
struct EpisodeAverage {
    accumulators: Vec<f32>,
    buffer: VecDeque<f32>,
    buffer_size: usize,
}

impl EpisodeAverage {
    fn new(buffer_size: usize) -> Self {
        Self {
            accumulators: vec![],
            buffer: VecDeque::with_capacity(buffer_size),
            buffer_size: buffer_size.max(1),
        }
    }

    /// `value(i)` is added to the accumulator of environment `i`.
    fn observe(&mut self, trajectory: &Trajectory, value: impl Fn(usize) -> f32) -> Result<()> {
        let step_types = trajectory.step_types()?;
        let next_step_types = trajectory.next_step_types()?;
        if self.accumulators.len() != step_types.len() {
            self.accumulators = vec![0.0; step_types.len()];
        }
        for (i, (t, next)) in step_types.into_iter().zip(next_step_types).enumerate() {
            if t == StepType::First {
                self.accumulators[i] = 0.0;
            }
            self.accumulators[i] += value(i);
            if next == StepType::Last {
                if self.buffer.len() == self.buffer_size {
                    self.buffer.pop_front();
                }
                self.buffer.push_back(self.accumulators[i]);
            }
        }
        Ok(())
    }

    fn result(&self) -> f32 {
        if self.buffer.is_empty() {
            0.0
        } else {
            self.buffer.iter().sum::<f32>() / self.buffer.len() as f32
        }
    }

    fn reset(&mut self) {
        self.accumulators.clear();
        self.buffer.clear();
    }
}

/// Average of the returns of the last completed episodes.
#[derive(Debug, Clone)]
pub struct AverageReturnMetric(EpisodeAverage);

impl AverageReturnMetric {
    /// Averages the last `buffer_size` episodes.
    pub fn new(buffer_size: usize) -> Self {
        Self(EpisodeAverage::new(buffer_size))
    }
}

impl Default for AverageReturnMetric {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

impl Observer for AverageReturnMetric {
    fn observe(&mut self, trajectory: &Trajectory) -> Result<()> {
        let rewards = trajectory.rewards();
        self.0.observe(trajectory, |i| rewards[i])
    }
}

impl Metric for AverageReturnMetric {
    fn name(&self) -> &str {
        "AverageReturn"
    }

    fn result(&self) -> f32 {
        self.0.result()
    }

    fn reset(&mut self) {
        self.0.reset()
    }
}

/// Average of the lengths of the last completed episodes.
///
/// Transitions from the last step of an episode to the first of the next do not count.
#[derive(Debug, Clone)]
pub struct AverageEpisodeLengthMetric(EpisodeAverage);

impl AverageEpisodeLengthMetric {
    /// Averages the last `buffer_size` episodes.
    pub fn new(buffer_size: usize) -> Self {
        Self(EpisodeAverage::new(buffer_size))
    }
}

impl Default for AverageEpisodeLengthMetric {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

impl Observer for AverageEpisodeLengthMetric {
    fn observe(&mut self, trajectory: &Trajectory) -> Result<()> {
        let step_types = trajectory.step_types()?;
        self.0.observe(trajectory, |i| {
            if step_types[i] == StepType::Last {
                0.0
            } else {
                1.0
            }
        })
    }
}

impl Metric for AverageEpisodeLengthMetric {
    fn name(&self) -> &str {
        "AverageEpisodeLength"
    }

    fn result(&self) -> f32 {
        self.0.result()
    }

    fn reset(&mut self) {
        self.0.reset()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        array::{Array, Stack},
        base::{PolicyStep, TimeStep},
        nest::Nest,
    };

    fn obs() -> Nest<Array> {
        Nest::Leaf(Array::vec_f32(vec![0.0]))
    }

    fn traj(ts: &TimeStep, next: &TimeStep) -> Trajectory {
        let ps = PolicyStep::new(Nest::Leaf(Array::scalar_i64(0)));
        Trajectory::from_transition(ts, &ps, next)
    }

    /// An episode with the given rewards, followed by the boundary transition.
    fn episode(rewards: &[f32]) -> Vec<Trajectory> {
        let mut ts = TimeStep::restart(obs());
        let mut items = vec![];
        for (k, r) in rewards.iter().enumerate() {
            let next = if k + 1 == rewards.len() {
                TimeStep::termination(obs(), *r)
            } else {
                TimeStep::transition(obs(), *r, 1.0)
            };
            items.push(traj(&ts, &next));
            ts = next;
        }
        items.push(traj(&ts, &TimeStep::restart(obs())));
        items
    }

    #[test]
    fn test_average_return_and_length() -> Result<()> {
        let mut returns = AverageReturnMetric::new(2);
        let mut lengths = AverageEpisodeLengthMetric::default();
        let mut episodes = NumberOfEpisodes::new();
        let mut steps = EnvironmentSteps::new();
        assert_eq!(returns.result(), 0.0);

        for rewards in [vec![1.0, 2.0], vec![3.0, 0.0, 1.0, 4.0], vec![1.0]].iter() {
            for t in episode(rewards) {
                returns.observe(&t)?;
                lengths.observe(&t)?;
                episodes.observe(&t)?;
                steps.observe(&t)?;
            }
        }
        // The buffer keeps the last two returns, 8 and 1.
        assert_eq!(returns.result(), 4.5);
        assert!((lengths.result() - 7.0 / 3.0).abs() < 1e-6);
        assert_eq!(episodes.count(), 3);
        assert_eq!(steps.count(), 7);

        let record = metrics_to_record(&[&returns, &lengths, &episodes, &steps]);
        assert_eq!(record.get_scalar("AverageReturn")?, 4.5);
        assert_eq!(record.get_scalar("NumberOfEpisodes")?, 3.0);
        assert_eq!(record.get_scalar("EnvironmentSteps")?, 7.0);

        returns.reset();
        assert_eq!(returns.result(), 0.0);
        Ok(())
    }

    #[test]
    fn test_batched_accumulators() -> Result<()> {
        // Environment 0 ends an episode of length 2, environment 1 is still running.
        let e0 = episode(&[1.0, 1.0]);
        let e1 = episode(&[5.0, 5.0, 5.0]);
        let mut returns = AverageReturnMetric::default();
        for k in 0..2 {
            returns.observe(&Trajectory::stack(&[e0[k].clone(), e1[k].clone()])?)?;
        }
        assert_eq!(returns.result(), 2.0);
        Ok(())
    }
}
