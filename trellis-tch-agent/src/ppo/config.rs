//! Configuration of [`PpoAgent`](super::PpoAgent).
use crate::{network::ActorDistributionNetworkConfig, opt::OptimizerConfig};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`PpoAgent`](super::PpoAgent).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct PpoConfig {
    /// Actor network.
    pub actor_net: ActorDistributionNetworkConfig,

    /// Hidden layers of the value network.
    pub value_fc_layers: Vec<i64>,

    /// Optimizer of both networks.
    pub optimizer: OptimizerConfig,

    /// Maximum global norm of gradients.
    pub gradient_clipping: Option<f64>,

    /// Epsilon of the clipped surrogate objective. Zero disables clipping.
    pub importance_ratio_clipping: f64,

    /// Clips log importance ratios to `[-c, c]`. Zero disables clipping.
    pub log_prob_clipping: f64,

    /// Discount factor of returns.
    pub discount_factor: f64,

    /// Lambda of generalized advantage estimation.
    pub lambda: f64,

    /// Estimates advantages with GAE instead of returns minus values.
    pub use_gae: bool,

    /// Uses advantages plus values as returns. Only applies with GAE.
    pub use_td_lambda_return: bool,

    /// Normalizes advantages over the batch.
    pub normalize_advantages: bool,

    /// Normalizes observations with running estimates.
    pub normalize_observations: bool,

    /// Clips normalized observations.
    pub observation_norm_clipping: Option<f64>,

    /// Scales rewards with running estimates.
    pub normalize_rewards: bool,

    /// Clips normalized rewards.
    pub reward_norm_clipping: Option<f64>,

    /// Coefficient of the value loss.
    pub value_pred_loss_coef: f64,

    /// Coefficient of the entropy bonus.
    pub entropy_regularization: f64,

    /// Number of optimization passes over each batch of experience.
    pub num_epochs: usize,

    /// Initial coefficient of the KL penalty.
    pub initial_adaptive_kl_beta: f64,

    /// KL divergence the penalty coefficient adapts towards.
    pub adaptive_kl_target: f64,

    /// Relative tolerance around the target before the coefficient changes.
    pub adaptive_kl_tolerance: f64,

    /// KL divergences above `kl_cutoff_factor * adaptive_kl_target` are penalized
    /// quadratically.
    pub kl_cutoff_factor: f64,

    /// Coefficient of the quadratic penalty.
    pub kl_cutoff_coef: f64,
}

impl Default for PpoConfig {
    fn default() -> Self {
        Self {
            actor_net: ActorDistributionNetworkConfig::default(),
            value_fc_layers: vec![200, 100],
            optimizer: OptimizerConfig::default(),
            gradient_clipping: None,
            importance_ratio_clipping: 0.2,
            log_prob_clipping: 0.0,
            discount_factor: 0.99,
            lambda: 0.95,
            use_gae: false,
            use_td_lambda_return: false,
            normalize_advantages: true,
            normalize_observations: true,
            observation_norm_clipping: Some(10.0),
            normalize_rewards: true,
            reward_norm_clipping: Some(10.0),
            value_pred_loss_coef: 0.5,
            entropy_regularization: 0.0,
            num_epochs: 25,
            initial_adaptive_kl_beta: 1.0,
            adaptive_kl_target: 0.01,
            adaptive_kl_tolerance: 0.3,
            kl_cutoff_factor: 2.0,
            kl_cutoff_coef: 1000.0,
        }
    }
}

impl PpoConfig {
    /// Sets the actor network.
    pub fn actor_net(mut self, v: ActorDistributionNetworkConfig) -> Self {
        self.actor_net = v;
        self
    }

    /// Sets the hidden layers of the value network.
    pub fn value_fc_layers(mut self, v: Vec<i64>) -> Self {
        self.value_fc_layers = v;
        self
    }

    /// Sets the optimizer.
    pub fn optimizer(mut self, v: OptimizerConfig) -> Self {
        self.optimizer = v;
        self
    }

    /// Sets the learning rate of the optimizer.
    pub fn learning_rate(mut self, v: f64) -> Self {
        self.optimizer = self.optimizer.learning_rate(v);
        self
    }

    /// Sets the maximum gradient norm.
    pub fn gradient_clipping(mut self, v: Option<f64>) -> Self {
        self.gradient_clipping = v;
        self
    }

    /// Sets the epsilon of the clipped objective.
    pub fn importance_ratio_clipping(mut self, v: f64) -> Self {
        self.importance_ratio_clipping = v;
        self
    }

    /// Sets the discount factor.
    pub fn discount_factor(mut self, v: f64) -> Self {
        self.discount_factor = v;
        self
    }

    /// Sets lambda of GAE.
    pub fn lambda(mut self, v: f64) -> Self {
        self.lambda = v;
        self
    }

    /// Enables GAE.
    pub fn use_gae(mut self, v: bool) -> Self {
        self.use_gae = v;
        self
    }

    /// Enables normalization of advantages.
    pub fn normalize_advantages(mut self, v: bool) -> Self {
        self.normalize_advantages = v;
        self
    }

    /// Enables normalization of observations.
    pub fn normalize_observations(mut self, v: bool) -> Self {
        self.normalize_observations = v;
        self
    }

    /// Enables normalization of rewards.
    pub fn normalize_rewards(mut self, v: bool) -> Self {
        self.normalize_rewards = v;
        self
    }

    /// Sets the coefficient of the value loss.
    pub fn value_pred_loss_coef(mut self, v: f64) -> Self {
        self.value_pred_loss_coef = v;
        self
    }

    /// Sets the coefficient of the entropy bonus.
    pub fn entropy_regularization(mut self, v: f64) -> Self {
        self.entropy_regularization = v;
        self
    }

    /// Sets the number of epochs.
    pub fn num_epochs(mut self, v: usize) -> Self {
        self.num_epochs = v;
        self
    }

    /// Sets the target of the adaptive KL penalty.
    pub fn adaptive_kl_target(mut self, v: f64) -> Self {
        self.adaptive_kl_target = v;
        self
    }

    /// Loads from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves as a YAML file.
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
    fn test_serde_ppo_config() -> Result<()> {
        let config = PpoConfig::default()
            .num_epochs(3)
            .use_gae(true)
            .learning_rate(3e-4)
            .value_fc_layers(vec![32]);
        let dir = TempDir::new("ppo_config")?;
        let path = dir.path().join("ppo.yaml");
        config.save(&path)?;
        let config_ = PpoConfig::load(&path)?;
        assert_eq!(config, config_);
        assert_eq!(config_.optimizer, OptimizerConfig::Adam { lr: 3e-4 });
        Ok(())
    }
}
