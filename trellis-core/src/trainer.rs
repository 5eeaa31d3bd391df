//! Train [`Agent`].
mod config;
use crate::{
    base::{Agent, Checkpointable, Env, Observer, ReplayBufferBase},
    checkpoint::Checkpointer,
    drivers::DynamicEpisodeDriver,
    evaluator::Evaluator,
    metrics::{
        metrics_to_record, AverageEpisodeLengthMetric, AverageReturnMetric, EnvironmentSteps,
        Metric, NumberOfEpisodes,
    },
    record::{AggregateRecorder, Record, RecordValue::Scalar},
    trajectory::Trajectory,
};
use anyhow::{bail, Result};
pub use config::TrainerConfig;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
    time::SystemTime,
};

const TRAINER_STATE_FILE: &str = "trainer_state.yaml";
const REPLAY_BUFFER_FILE: &str = "replay_buffer.bin";

/// Counters saved in train checkpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainerState {
    /// Number of training iterations.
    pub global_step: usize,

    /// Number of environment steps collected for training.
    pub environment_steps: usize,

    /// Number of episodes collected for training.
    pub num_episodes: usize,
}

impl TrainerState {
    fn load(path: &Path) -> Result<Self> {
        let rdr = BufReader::new(File::open(path)?);
        Ok(serde_yaml::from_reader(rdr)?)
    }

    fn save(&self, path: &Path) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Checkpointers of the trainer, under `model_dir`.
struct Checkpointers {
    train: Checkpointer,
    policy: Checkpointer,
    replay_buffer: Checkpointer,
}

impl Checkpointers {
    fn new(model_dir: &str, max_to_keep: usize) -> Self {
        let dir = PathBuf::from(model_dir);
        Self {
            train: Checkpointer::new(dir.join("train"), max_to_keep),
            policy: Checkpointer::new(dir.join("policy"), max_to_keep),
            replay_buffer: Checkpointer::new(dir.join("replay_buffer"), 1),
        }
    }
}

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Manages the on-policy training loop.
///
/// # Training loop
///
/// 0. Given an agent implementing [`Agent`], a batched environment for collection, a replay
///    buffer, an [`Evaluator`] and a recorder implementing [`AggregateRecorder`].
/// 1. Initialize the agent with [`Agent::initialize`]. If `model_dir` holds checkpoints,
///    restore the agent parameters and the counters from the latest train checkpoint, and
///    the replay buffer from the latest replay buffer checkpoint.
/// 2. While the number of environment steps is less than `num_environment_steps`:
///     1. If `global_step % eval_interval == 0`, evaluate the policy of the agent.
///     2. Collect `collect_episodes_per_iteration` episodes with the collect policy,
///        feeding the replay buffer and the training metrics.
///     3. Train the agent on all items of the replay buffer, then clear it.
///     4. `global_step += 1`
///     5. If `global_step % log_interval == 0`, log the loss and environment steps per sec.
///     6. If `global_step % summary_interval == 0`, flush the records.
///     7. Save train, policy and replay buffer checkpoints at their intervals.
/// 3. Evaluate the policy of the agent once more.
///
/// # Interaction of objects
///
/// ```mermaid
/// graph LR
///     A[Agent]-->|collect_policy|B[DynamicEpisodeDriver]
///     C[Env]-->|TimeStep|B
///     B-->|action|C
///     B-->|Trajectory|D[ReplayBufferBase]
///     B-->|Trajectory|E[Metric]
///     D-->|gather_all|A
/// ```
pub struct Trainer {
    config: TrainerConfig,
    global_step: usize,
    num_episodes: NumberOfEpisodes,
    environment_steps: EnvironmentSteps,
    average_return: AverageReturnMetric,
    average_episode_length: AverageEpisodeLengthMetric,
}

impl Trainer {
    /// Constructs a trainer.
    pub fn build(config: TrainerConfig) -> Self {
        Self {
            config,
            global_step: 0,
            num_episodes: NumberOfEpisodes::new(),
            environment_steps: EnvironmentSteps::new(),
            average_return: AverageReturnMetric::default(),
            average_episode_length: AverageEpisodeLengthMetric::default(),
        }
    }

    /// Counters of the trainer.
    pub fn state(&self) -> TrainerState {
        TrainerState {
            global_step: self.global_step,
            environment_steps: self.environment_steps.count(),
            num_episodes: self.num_episodes.count(),
        }
    }

    fn set_state(&mut self, state: &TrainerState) {
        self.global_step = state.global_step;
        self.environment_steps.set_count(state.environment_steps);
        self.num_episodes.set_count(state.num_episodes);
    }

    fn train_metrics(&self) -> Record {
        metrics_to_record(&[
            &self.num_episodes as &dyn Metric,
            &self.environment_steps,
            &self.average_return,
            &self.average_episode_length,
        ])
    }

    fn is_at(&self, interval: usize) -> bool {
        interval > 0 && self.global_step % interval == 0
    }

    fn restore<A, R>(&mut self, ckpts: &Checkpointers, agent: &mut A, buffer: &mut R) -> Result<()>
    where
        A: Agent,
        R: Checkpointable,
    {
        if let Some((_, path)) = ckpts.train.latest()? {
            agent.load_params(&path)?;
            self.set_state(&TrainerState::load(&path.join(TRAINER_STATE_FILE))?);
            info!(
                "Restored the agent from {:?} at global step {}",
                path, self.global_step
            );
        }
        if let Some((_, path)) = ckpts.replay_buffer.latest()? {
            buffer.load(&path.join(REPLAY_BUFFER_FILE))?;
        }
        Ok(())
    }

    fn save_checkpoints<A, R>(&self, ckpts: &Checkpointers, agent: &A, buffer: &R) -> Result<()>
    where
        A: Agent,
        R: Checkpointable,
    {
        let step = self.global_step;
        if self.is_at(self.config.train_checkpoint_interval) {
            let state = self.state();
            ckpts.train.save(step, |path| {
                agent.save_params(path)?;
                state.save(&path.join(TRAINER_STATE_FILE))
            })?;
        }
        if self.is_at(self.config.policy_checkpoint_interval) {
            ckpts.policy.save(step, |path| agent.save_params(path))?;
        }
        if self.is_at(self.config.rb_checkpoint_interval) {
            ckpts
                .replay_buffer
                .save(step, |path| buffer.save(&path.join(REPLAY_BUFFER_FILE)))?;
        }
        Ok(())
    }

    fn evaluate<A, D>(
        &self,
        agent: &mut A,
        evaluator: &mut D,
        recorder: &mut dyn AggregateRecorder,
    ) -> Result<()>
    where
        A: Agent,
        D: Evaluator,
    {
        info!("Starts evaluation at global step {}", self.global_step);
        let record = evaluator.evaluate(agent.policy())?;
        recorder.store(record);
        recorder.flush(self.global_step as _);
        Ok(())
    }

    /// Train the agent.
    ///
    /// `env` must be batched, so that collected experience has the layout `[B, T, ...]`
    /// expected by [`Agent::train`].
    pub fn train<A, E, R, D>(
        &mut self,
        agent: &mut A,
        env: &mut E,
        buffer: &mut R,
        evaluator: &mut D,
        recorder: &mut dyn AggregateRecorder,
    ) -> Result<()>
    where
        A: Agent,
        E: Env,
        R: ReplayBufferBase<Item = Trajectory> + Observer + Checkpointable,
        D: Evaluator,
    {
        if !env.batched() {
            bail!("The collect environment must be batched");
        }
        let ckpts = self
            .config
            .model_dir
            .as_ref()
            .map(|dir| Checkpointers::new(dir, self.config.max_to_keep));

        agent.initialize()?;
        if let Some(ckpts) = &ckpts {
            self.restore(ckpts, agent, buffer)?;
        }

        let mut timer = SystemTime::now();
        let mut env_steps_at_log = self.environment_steps.count();

        while self.environment_steps.count() < self.config.num_environment_steps {
            if self.is_at(self.config.eval_interval) {
                self.evaluate(agent, evaluator, recorder)?;
            }

            {
                let observers = vec![
                    &mut *buffer as &mut dyn Observer,
                    &mut self.num_episodes,
                    &mut self.environment_steps,
                    &mut self.average_return,
                    &mut self.average_episode_length,
                ];
                let mut driver = DynamicEpisodeDriver::new(
                    env,
                    agent.collect_policy(),
                    observers,
                    self.config.collect_episodes_per_iteration,
                );
                driver.run(None, None, None)?;
            }

            let experience = buffer.gather_all()?;
            let loss_info = agent.train(&experience)?;
            buffer.clear();
            self.global_step += 1;

            if self.is_at(self.config.log_interval) {
                let env_steps = self.environment_steps.count();
                let secs = timer.elapsed()?.as_secs_f32();
                let steps_per_sec = (env_steps - env_steps_at_log) as f32 / secs.max(1e-6);
                info!(
                    "step = {}, loss = {}, env_steps/sec = {}",
                    self.global_step, loss_info.loss, steps_per_sec
                );
                timer = SystemTime::now();
                env_steps_at_log = env_steps;
            }

            let mut record = self.train_metrics().merge(loss_info.extra);
            record.insert("loss", Scalar(loss_info.loss));
            recorder.store(record);
            if self.is_at(self.config.summary_interval) {
                recorder.flush(self.global_step as _);
            }

            if let Some(ckpts) = &ckpts {
                self.save_checkpoints(ckpts, agent, buffer)?;
            }
        }

        self.evaluate(agent, evaluator, recorder)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        base::{LossInfo, Policy, TimeStep},
        environments::{BatchedEnv, BatchedEnvConfig, CountingEnv, CountingEnvConfig},
        evaluator::DefaultEvaluator,
        nest::Nest,
        policies::RandomPolicy,
        record::BufferedRecorder,
        replay_buffer::{BatchedReplayBuffer, BatchedReplayBufferConfig},
        spec::ArraySpec,
    };
    use std::fs;
    use tempdir::TempDir;
    use test_log::test;

    type CollectEnv = BatchedEnv<CountingEnv>;

    /// Counts training calls; its parameter is that count.
    struct CountingAgent {
        policy: RandomPolicy,
        num_updates: usize,
        batch_shapes: Vec<Vec<usize>>,
    }

    impl CountingAgent {
        fn new(env: &CollectEnv) -> Self {
            Self {
                policy: RandomPolicy::new(env.time_step_spec(), env.action_spec(), 0),
                num_updates: 0,
                batch_shapes: vec![],
            }
        }
    }

    impl Agent for CountingAgent {
        type Policy = RandomPolicy;

        fn policy(&mut self) -> &mut RandomPolicy {
            &mut self.policy
        }

        fn collect_policy(&mut self) -> &mut RandomPolicy {
            &mut self.policy
        }

        fn time_step_spec(&self) -> &TimeStep<ArraySpec> {
            self.policy.time_step_spec()
        }

        fn action_spec(&self) -> &Nest<ArraySpec> {
            self.policy.action_spec()
        }

        fn collect_data_spec(&self) -> Trajectory<ArraySpec> {
            self.policy.trajectory_spec()
        }

        fn update(&mut self, experience: &Trajectory) -> Result<LossInfo> {
            self.num_updates += 1;
            self.batch_shapes.push(experience.step_type.shape().to_vec());
            Ok(LossInfo {
                loss: self.num_updates as f32,
                extra: Record::from_scalar("num_updates", self.num_updates as f32),
            })
        }

        fn save_params(&self, path: &Path) -> Result<()> {
            fs::write(path.join("num_updates"), self.num_updates.to_string())?;
            Ok(())
        }

        fn load_params(&mut self, path: &Path) -> Result<()> {
            self.num_updates = fs::read_to_string(path.join("num_updates"))?.parse()?;
            Ok(())
        }
    }

    fn setup() -> Result<(CollectEnv, BatchedReplayBuffer, DefaultEvaluator<CollectEnv>)> {
        let env_config = CountingEnvConfig::default().episode_length(4);
        let env_config = BatchedEnvConfig::new(env_config, 2);
        let env = CollectEnv::build(&env_config, 0)?;
        let rb_config = BatchedReplayBufferConfig::default()
            .batch_size(2)
            .max_length(100);
        let buffer = BatchedReplayBuffer::build(&rb_config);
        let evaluator = DefaultEvaluator::new(&env_config, 1, 2)?;
        Ok((env, buffer, evaluator))
    }

    #[test]
    fn test_train() -> Result<()> {
        let (mut env, mut buffer, mut evaluator) = setup()?;
        let mut agent = CountingAgent::new(&env);
        let mut recorder = BufferedRecorder::new();
        let config = TrainerConfig::default()
            .num_environment_steps(40)
            .collect_episodes_per_iteration(2)
            .eval_interval(2)
            .summary_interval(1);
        let mut trainer = Trainer::build(config);
        trainer.train(&mut agent, &mut env, &mut buffer, &mut evaluator, &mut recorder)?;

        // Each iteration collects one episode of 4 steps in both environments.
        let state = trainer.state();
        assert!(state.environment_steps >= 40);
        assert_eq!(agent.num_updates, state.global_step);
        assert!(agent.batch_shapes.iter().all(|s| s[0] == 2));
        assert!(buffer.is_empty());

        let losses = recorder
            .iter()
            .filter_map(|r| r.get_scalar("loss").ok())
            .collect::<Vec<_>>();
        assert_eq!(losses.len(), state.global_step);
        let evals = recorder
            .iter()
            .filter(|r| r.get("AverageReturn").is_some() && r.get("loss").is_none())
            .count();
        assert!(evals >= 2);
        Ok(())
    }

    #[test]
    fn test_resume_from_checkpoint() -> Result<()> {
        let dir = TempDir::new("trainer")?;
        let model_dir = dir.path().to_str().unwrap().to_string();
        let config = TrainerConfig::default()
            .num_environment_steps(24)
            .collect_episodes_per_iteration(2)
            .eval_interval(0)
            .train_checkpoint_interval(1)
            .policy_checkpoint_interval(2)
            .rb_checkpoint_interval(1)
            .model_dir(&model_dir);

        let (mut env, mut buffer, mut evaluator) = setup()?;
        let mut agent = CountingAgent::new(&env);
        let mut trainer = Trainer::build(config.clone());
        let mut recorder = BufferedRecorder::new();
        trainer.train(&mut agent, &mut env, &mut buffer, &mut evaluator, &mut recorder)?;
        let state = trainer.state();
        let latest = format!("ckpt-{}", state.global_step);
        assert!(dir.path().join("train").join(latest).is_dir());
        assert!(dir.path().join("replay_buffer").is_dir());

        // A new trainer continues from the checkpoint, up to the larger step budget.
        let (mut env, mut buffer, mut evaluator) = setup()?;
        let mut agent = CountingAgent::new(&env);
        let mut trainer = Trainer::build(config.num_environment_steps(48));
        let mut recorder = BufferedRecorder::new();
        trainer.train(&mut agent, &mut env, &mut buffer, &mut evaluator, &mut recorder)?;
        let resumed = trainer.state();
        assert!(resumed.global_step > state.global_step);
        assert_eq!(agent.num_updates, resumed.global_step);
        assert!(resumed.environment_steps >= 48);
        Ok(())
    }
}
