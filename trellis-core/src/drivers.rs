//! Drivers run a policy in an environment and feed the generated trajectories to observers.
use crate::{
    array::Array,
    base::{Env, Observer, Policy, StepType, TimeStep},
    nest::Nest,
    trajectory::Trajectory,
};
use anyhow::Result;
use log::trace;

/// Takes one step with the policy and feeds the trajectory to the observers.
fn step<E: Env, P: Policy>(
    env: &mut E,
    policy: &mut P,
    observers: &mut [&mut dyn Observer],
    time_step: &TimeStep,
    policy_state: &Nest<Array>,
) -> Result<(Trajectory, TimeStep, Nest<Array>)> {
    let policy_step = policy.action(time_step, policy_state)?;
    let next_time_step = env.step(&policy_step.action)?;
    let traj = Trajectory::from_transition(time_step, &policy_step, &next_time_step);
    for observer in observers.iter_mut() {
        observer.observe(&traj)?;
    }
    Ok((traj, next_time_step, policy_step.state))
}

fn start<E: Env, P: Policy>(
    env: &mut E,
    policy: &P,
    time_step: Option<TimeStep>,
    policy_state: Option<Nest<Array>>,
) -> Result<(TimeStep, Nest<Array>)> {
    let time_step = match time_step {
        Some(ts) => ts,
        None => env.current_time_step()?,
    };
    let policy_state = policy_state.unwrap_or_else(|| policy.get_initial_state(env.batch_size()));
    Ok((time_step, policy_state))
}

/// Runs a policy until a number of episodes end.
///
/// With a batched environment, episodes ending in any of the environments are counted, so
/// a run can end more episodes than requested.
pub struct DynamicEpisodeDriver<'a, E: Env, P: Policy> {
    env: &'a mut E,
    policy: &'a mut P,
    observers: Vec<&'a mut dyn Observer>,
    num_episodes: usize,
}

impl<'a, E: Env, P: Policy> DynamicEpisodeDriver<'a, E, P> {
    /// Creates a driver running `num_episodes` episodes per call of `run`.
    pub fn new(
        env: &'a mut E,
        policy: &'a mut P,
        observers: Vec<&'a mut dyn Observer>,
        num_episodes: usize,
    ) -> Self {
        Self {
            env,
            policy,
            observers,
            num_episodes,
        }
    }

    /// Runs the policy.
    ///
    /// Starts from `time_step` and `policy_state` if given, otherwise from the current time
    /// step of the environment and the initial state of the policy. `num_episodes` overrides
    /// the number given at construction. Returns the final time step and policy state.
    pub fn run(
        &mut self,
        num_episodes: Option<usize>,
        time_step: Option<TimeStep>,
        policy_state: Option<Nest<Array>>,
    ) -> Result<(TimeStep, Nest<Array>)> {
        let num_episodes = num_episodes.unwrap_or(self.num_episodes);
        let (mut time_step, mut policy_state) =
            start(self.env, self.policy, time_step, policy_state)?;
        let mut episodes = 0;
        while episodes < num_episodes {
            let (traj, ts, state) = step(
                self.env,
                self.policy,
                &mut self.observers,
                &time_step,
                &policy_state,
            )?;
            episodes += traj
                .next_step_types()?
                .into_iter()
                .filter(|t| *t == StepType::Last)
                .count();
            time_step = ts;
            policy_state = state;
        }
        trace!("DynamicEpisodeDriver finished {} episodes", episodes);
        Ok((time_step, policy_state))
    }
}

/// Runs a policy for a number of steps.
///
/// Transitions from the last step of an episode to the first of the next are not counted.
pub struct DynamicStepDriver<'a, E: Env, P: Policy> {
    env: &'a mut E,
    policy: &'a mut P,
    observers: Vec<&'a mut dyn Observer>,
    num_steps: usize,
}

impl<'a, E: Env, P: Policy> DynamicStepDriver<'a, E, P> {
    /// Creates a driver running `num_steps` steps per call of `run`.
    pub fn new(
        env: &'a mut E,
        policy: &'a mut P,
        observers: Vec<&'a mut dyn Observer>,
        num_steps: usize,
    ) -> Self {
        Self {
            env,
            policy,
            observers,
            num_steps,
        }
    }

    /// Runs the policy. See [`DynamicEpisodeDriver::run`].
    pub fn run(
        &mut self,
        time_step: Option<TimeStep>,
        policy_state: Option<Nest<Array>>,
    ) -> Result<(TimeStep, Nest<Array>)> {
        let (mut time_step, mut policy_state) =
            start(self.env, self.policy, time_step, policy_state)?;
        let mut steps = 0;
        while steps < self.num_steps {
            let (traj, ts, state) = step(
                self.env,
                self.policy,
                &mut self.observers,
                &time_step,
                &policy_state,
            )?;
            steps += traj
                .step_types()?
                .into_iter()
                .filter(|t| *t != StepType::Last)
                .count();
            time_step = ts;
            policy_state = state;
        }
        Ok((time_step, policy_state))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        environments::{BatchedEnv, BatchedEnvConfig, CountingEnv, CountingEnvConfig},
        metrics::{EnvironmentSteps, NumberOfEpisodes},
        policies::RandomPolicy,
        replay_buffer::{UniformReplayBuffer, UniformReplayBufferConfig},
    };

    fn random_policy<E: Env>(env: &E) -> RandomPolicy {
        RandomPolicy::new(env.time_step_spec(), env.action_spec(), 0)
    }

    #[test]
    fn test_episode_driver() -> Result<()> {
        let config = CountingEnvConfig::default().episode_length(4);
        let mut env = CountingEnv::build(&config, 0)?;
        let mut policy = random_policy(&env);
        let mut episodes = NumberOfEpisodes::new();
        let mut steps = EnvironmentSteps::new();
        let mut rb = UniformReplayBuffer::<Trajectory>::build(&UniformReplayBufferConfig::default());
        let (ts, state) = {
            let mut driver = DynamicEpisodeDriver::new(
                &mut env,
                &mut policy,
                vec![&mut episodes as &mut dyn Observer, &mut steps, &mut rb],
                2,
            );
            driver.run(None, None, None)?
        };
        assert!(ts.is_last());
        assert!(state.is_empty());
        assert_eq!(episodes.count(), 2);
        // 4 steps per episode and one boundary transition between the episodes.
        assert_eq!(steps.count(), 8);
        assert_eq!(rb.size(), 9);
        Ok(())
    }

    #[test]
    fn test_episode_driver_resumes() -> Result<()> {
        let config = CountingEnvConfig::default().episode_length(3);
        let mut env = CountingEnv::build(&config, 0)?;
        let mut policy = random_policy(&env);
        let mut episodes = NumberOfEpisodes::new();
        let observers = vec![&mut episodes as &mut dyn Observer];
        let mut driver = DynamicEpisodeDriver::new(&mut env, &mut policy, observers, 1);
        let (ts, state) = driver.run(None, None, None)?;
        driver.run(None, Some(ts), Some(state))?;
        drop(driver);
        assert_eq!(episodes.count(), 2);
        Ok(())
    }

    #[test]
    fn test_step_driver_batched() -> Result<()> {
        let config = BatchedEnvConfig::new(CountingEnvConfig::default().episode_length(2), 3);
        let mut env = BatchedEnv::<CountingEnv>::build(&config, 0)?;
        let mut policy = random_policy(&env);
        let mut steps = EnvironmentSteps::new();
        let observers = vec![&mut steps as &mut dyn Observer];
        let mut driver = DynamicStepDriver::new(&mut env, &mut policy, observers, 5);
        let (ts, _) = driver.run(None, None)?;
        drop(driver);
        assert_eq!(ts.batch_size(), Some(3));
        // Two batched steps of three environments.
        assert_eq!(steps.count(), 6);
        Ok(())
    }
}
