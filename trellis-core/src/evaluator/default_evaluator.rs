//! Default implementation of the [`Evaluator`] trait.
use super::Evaluator;
use crate::{
    base::{Env, Observer, Policy},
    drivers::DynamicEpisodeDriver,
    metrics::{metrics_to_record, AverageEpisodeLengthMetric, AverageReturnMetric, Metric},
    record::Record,
};
use anyhow::Result;
use log::info;

/// Runs a fixed number of episodes and reports the average return and episode length.
///
/// The environment is reset at the beginning of every evaluation, and the metrics are
/// computed over all evaluated episodes. With a batched environment, episodes ending at
/// the same step in different environments are all counted, so a few more episodes than
/// requested may be averaged.
///
/// The record has the keys `AverageReturn` and `AverageEpisodeLength`.
pub struct DefaultEvaluator<E: Env> {
    num_episodes: usize,
    env: E,
}

impl<E: Env> DefaultEvaluator<E> {
    /// Constructs a new [`DefaultEvaluator`] with an environment built from `config`.
    pub fn new(config: &E::Config, seed: i64, num_episodes: usize) -> Result<Self> {
        Ok(Self::from_env(E::build(config, seed)?, num_episodes))
    }

    /// Constructs a new [`DefaultEvaluator`] on an existing environment.
    pub fn from_env(env: E, num_episodes: usize) -> Self {
        Self { num_episodes, env }
    }
}

impl<E: Env> Evaluator for DefaultEvaluator<E> {
    fn evaluate<P: Policy>(&mut self, policy: &mut P) -> Result<Record> {
        let buffer_size = self.num_episodes + self.env.batch_size().unwrap_or(1);
        let mut returns = AverageReturnMetric::new(buffer_size);
        let mut lengths = AverageEpisodeLengthMetric::new(buffer_size);
        let time_step = self.env.reset()?;
        {
            let observers = vec![&mut returns as &mut dyn Observer, &mut lengths];
            let mut driver =
                DynamicEpisodeDriver::new(&mut self.env, policy, observers, self.num_episodes);
            driver.run(None, Some(time_step), None)?;
        }
        info!(
            "Evaluated {} episodes: average return {}",
            self.num_episodes,
            returns.result()
        );
        Ok(metrics_to_record(&[&returns, &lengths]))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        environments::{BatchedEnv, BatchedEnvConfig, CountingEnv, CountingEnvConfig},
        policies::RandomPolicy,
    };

    #[test]
    fn test_evaluate_counting_env() -> Result<()> {
        let env_config = CountingEnvConfig::default().episode_length(3);
        let config = BatchedEnvConfig::new(env_config, 2);
        let mut evaluator = DefaultEvaluator::<BatchedEnv<CountingEnv>>::new(&config, 0, 4)?;
        let env = BatchedEnv::<CountingEnv>::build(&config, 0)?;
        let mut policy = RandomPolicy::new(env.time_step_spec(), env.action_spec(), 0);

        let record = evaluator.evaluate(&mut policy)?;
        assert_eq!(record.get_scalar("AverageEpisodeLength")?, 3.0);
        let ret = record.get_scalar("AverageReturn")?;
        // Rewards are the actions, 0 or 1.
        assert!((0.0..=3.0).contains(&ret));
        Ok(())
    }
}
