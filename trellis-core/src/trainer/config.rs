//! Configuration of [`Trainer`](super::Trainer).
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Trainer`](super::Trainer).
///
/// Intervals are counted in training iterations. An interval of zero disables the
/// corresponding action.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct TrainerConfig {
    /// Training ends when the number of environment steps reaches this value.
    pub num_environment_steps: usize,

    /// Number of episodes collected in each iteration.
    pub collect_episodes_per_iteration: usize,

    /// Number of episodes run in each evaluation.
    pub num_eval_episodes: usize,

    /// Interval of evaluation.
    pub eval_interval: usize,

    /// Interval of logging training progress.
    pub log_interval: usize,

    /// Interval of flushing records.
    pub summary_interval: usize,

    /// Interval of saving the agent and the state of the trainer.
    pub train_checkpoint_interval: usize,

    /// Interval of saving the parameters of the policy.
    pub policy_checkpoint_interval: usize,

    /// Interval of saving the replay buffer.
    pub rb_checkpoint_interval: usize,

    /// Number of train and policy checkpoints kept on disk.
    pub max_to_keep: usize,

    /// Directory where checkpoints are saved. Nothing is saved if `None`.
    pub model_dir: Option<String>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            num_environment_steps: 25_000_000,
            collect_episodes_per_iteration: 30,
            num_eval_episodes: 30,
            eval_interval: 500,
            log_interval: 50,
            summary_interval: 50,
            train_checkpoint_interval: 100,
            policy_checkpoint_interval: 50,
            rb_checkpoint_interval: 200,
            max_to_keep: 20,
            model_dir: None,
        }
    }
}

impl TrainerConfig {
    /// Sets the number of environment steps.
    pub fn num_environment_steps(mut self, v: usize) -> Self {
        self.num_environment_steps = v;
        self
    }

    /// Sets the number of episodes collected in each iteration.
    pub fn collect_episodes_per_iteration(mut self, v: usize) -> Self {
        self.collect_episodes_per_iteration = v;
        self
    }

    /// Sets the number of evaluation episodes.
    pub fn num_eval_episodes(mut self, v: usize) -> Self {
        self.num_eval_episodes = v;
        self
    }

    /// Sets the interval of evaluation.
    pub fn eval_interval(mut self, v: usize) -> Self {
        self.eval_interval = v;
        self
    }

    /// Sets the interval of logging.
    pub fn log_interval(mut self, v: usize) -> Self {
        self.log_interval = v;
        self
    }

    /// Sets the interval of flushing records.
    pub fn summary_interval(mut self, v: usize) -> Self {
        self.summary_interval = v;
        self
    }

    /// Sets the interval of train checkpoints.
    pub fn train_checkpoint_interval(mut self, v: usize) -> Self {
        self.train_checkpoint_interval = v;
        self
    }

    /// Sets the interval of policy checkpoints.
    pub fn policy_checkpoint_interval(mut self, v: usize) -> Self {
        self.policy_checkpoint_interval = v;
        self
    }

    /// Sets the interval of replay buffer checkpoints.
    pub fn rb_checkpoint_interval(mut self, v: usize) -> Self {
        self.rb_checkpoint_interval = v;
        self
    }

    /// Sets the number of checkpoints kept on disk.
    pub fn max_to_keep(mut self, v: usize) -> Self {
        self.max_to_keep = v;
        self
    }

    /// Sets the directory where checkpoints are saved.
    pub fn model_dir<T: Into<String>>(mut self, model_dir: T) -> Self {
        self.model_dir = Some(model_dir.into());
        self
    }

    /// Constructs [`TrainerConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`TrainerConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_serde_trainer_config() -> Result<()> {
        let config = TrainerConfig::default()
            .num_environment_steps(1000)
            .eval_interval(10)
            .model_dir("some/directory");

        let dir = TempDir::new("trainer_config")?;
        let path = dir.path().join("trainer_config.yaml");
        println!("{:?}", path);

        config.save(&path)?;
        let config_ = TrainerConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }
}
