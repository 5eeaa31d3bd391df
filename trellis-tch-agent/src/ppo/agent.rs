//! PPO agent.
use super::{PpoConfig, PpoPolicy};
use crate::{
    distribution::Distribution,
    network::{ActorDistributionNetwork, ValueNetwork},
    normalizer::Normalizer,
    opt::Optimizer,
    util::{array_to_tensor, flatten_observation, masked_mean, observation_dim},
};
use anyhow::Result;
use log::{debug, info};
use std::{collections::BTreeMap, fs, path::Path};
use tch::{nn::VarStore, Device, Kind, Tensor};
use trellis_core::{
    array::Array,
    error::TrellisError,
    record::{Record, RecordValue},
    trajectory::{trajectory_spec, Trajectory},
    Agent, ArraySpec, LossInfo, Nest, Policy, StepType, TimeStep,
};

const PARAMS_FILE: &str = "ppo.pt";

/// Discounted returns of rewards `[B, T]`.
///
/// `values` has shape `[B, T + 1]`. `discounts[:, t]` multiplies the value following step
/// `t`, so a zero discount terminates an episode. Where `episode_mask[:, t]` is zero the
/// episode ends after step `t` and its return is bootstrapped with `values[:, t + 1]`, the
/// value of its final observation, instead of the return of the next episode. The last
/// column of `values` bootstraps the end of the batch.
pub fn discounted_return(
    rewards: &Tensor,
    discounts: &Tensor,
    episode_mask: &Tensor,
    values: &Tensor,
) -> Tensor {
    let t_max = rewards.size()[1];
    let returns = rewards.zeros_like();
    let mut acc = values.select(1, t_max);
    for t in (0..t_max).rev() {
        let m = episode_mask.select(1, t);
        let next = &m * &acc + (1.0 - &m) * values.select(1, t + 1);
        acc = rewards.select(1, t) + discounts.select(1, t) * next;
        returns.select(1, t).copy_(&acc);
    }
    returns
}

/// Generalized advantage estimation.
///
/// `values` has shape `[B, T + 1]`, the last column being the bootstrap value, and
/// `rewards`, `discounts` and `episode_mask` have shape `[B, T]`. The one-step TD error
/// always bootstraps with the discounted next value, while advantages are carried
/// backwards only where `episode_mask` is one.
pub fn generalized_advantage_estimation(
    values: &Tensor,
    rewards: &Tensor,
    discounts: &Tensor,
    episode_mask: &Tensor,
    lambda: f64,
) -> Tensor {
    let t_max = rewards.size()[1];
    let advantages = rewards.zeros_like();
    let mut last_gae = rewards.select(1, 0).zeros_like();
    for t in (0..t_max).rev() {
        let d = discounts.select(1, t);
        let delta = rewards.select(1, t) + &d * values.select(1, t + 1) - values.select(1, t);
        last_gae = delta + d * episode_mask.select(1, t) * lambda * &last_gae;
        advantages.select(1, t).copy_(&last_gae);
    }
    advantages
}

fn normalize(x: &Tensor) -> Tensor {
    (x - x.mean(Kind::Float)) / (x.std(false) + 1e-8)
}

/// Sums a per-element quantity of shape `[N, ...]` into `[N]`.
fn sum_event(x: &Tensor) -> Tensor {
    let n = x.size()[0];
    x.reshape(&[n, -1])
        .sum_dim_intlist(Some(&[1i64][..]), false, Kind::Float)
}

/// Selects the first `t` steps of a leaf `[B, T, ...]` and merges the outer dims.
fn train_steps(x: &Tensor, t: i64) -> Tensor {
    let size = x.size();
    let mut shape = vec![size[0] * t];
    shape.extend_from_slice(&size[2..]);
    x.narrow(1, 0, t).reshape(&shape)
}

/// Experience prepared for the optimization passes.
struct Batch {
    observation: Tensor,
    actions: Vec<Tensor>,
    old_distributions: Vec<Distribution>,
    old_log_prob: Tensor,
    returns: Tensor,
    advantages: Tensor,
    mask: Tensor,
}

struct Losses {
    total: Tensor,
    policy_gradient: Tensor,
    value_estimation: Tensor,
    entropy_regularization: Tensor,
    kl_penalty: Tensor,
    kl_divergence: Tensor,
}

/// Proximal policy optimization agent with an adaptive KL penalty.
///
/// Experience is a batch of trajectories of shape `[B, T]` collected with the collect
/// policy. The last step of each row only provides the bootstrap value; the agent trains
/// on the first `T - 1` steps. Steps at episode boundaries, whose next step belongs to a new
/// episode, are masked out of the losses.
///
/// The parameters of the networks, the normalizers and the KL coefficient live in a single
/// [`VarStore`] and are saved together.
///
/// [`VarStore`]: https://docs.rs/tch/0.16.0/tch/nn/struct.VarStore.html
pub struct PpoAgent {
    config: PpoConfig,
    var_store: VarStore,
    opt: Optimizer,
    policy: PpoPolicy,
    reward_normalizer: Option<Normalizer>,
    adaptive_kl_beta: Tensor,
}

impl PpoAgent {
    /// Builds the agent.
    pub fn build(
        config: PpoConfig,
        time_step_spec: TimeStep<ArraySpec>,
        action_spec: Nest<ArraySpec>,
        device: Device,
    ) -> Result<Self> {
        let var_store = VarStore::new(device);
        let root = var_store.root();
        let observation_spec = &time_step_spec.observation;

        let actor = ActorDistributionNetwork::build(
            &(&root / "actor"),
            &config.actor_net,
            observation_spec,
            &action_spec,
        )?;
        let value = ValueNetwork::build(
            &(&root / "value"),
            config.value_fc_layers.clone(),
            observation_spec,
        )?;
        let normalizer = if config.normalize_observations {
            Some(Normalizer::build(
                &(&root / "observation_normalizer"),
                observation_dim(observation_spec),
            ))
        } else {
            None
        };
        let reward_normalizer = if config.normalize_rewards {
            Some(Normalizer::build(&(&root / "reward_normalizer"), 1))
        } else {
            None
        };
        let mut adaptive_kl_beta = root.ones_no_train("adaptive_kl_beta", &[1]);
        tch::no_grad(|| {
            let _ = adaptive_kl_beta.fill_(config.initial_adaptive_kl_beta);
        });

        let policy = PpoPolicy::new(
            time_step_spec,
            action_spec,
            Box::new(actor),
            value,
            normalizer,
            config.observation_norm_clipping,
            device,
        )?;
        let opt = config
            .optimizer
            .build(&var_store, config.gradient_clipping)?;
        info!("Built PPO agent on {:?}", device);

        Ok(Self {
            config,
            var_store,
            opt,
            policy,
            reward_normalizer,
            adaptive_kl_beta,
        })
    }

    /// Current coefficient of the KL penalty.
    pub fn adaptive_kl_beta(&self) -> f64 {
        self.adaptive_kl_beta.double_value(&[0])
    }

    /// Moves the KL coefficient towards the target: it is multiplied by 1.5 if `kl` exceeds
    /// the target by more than the tolerance and divided by 1.5 if `kl` falls below it.
    fn update_adaptive_kl_beta(&mut self, kl: f64) {
        let target = self.config.adaptive_kl_target;
        let tolerance = self.config.adaptive_kl_tolerance;
        let beta = self.adaptive_kl_beta();
        let new_beta = if kl < target * (1.0 - tolerance) {
            beta / 1.5
        } else if kl > target * (1.0 + tolerance) {
            beta * 1.5
        } else {
            beta
        }
        .max(1e-16);
        let adaptive_kl_beta = &mut self.adaptive_kl_beta;
        tch::no_grad(|| {
            let _ = adaptive_kl_beta.fill_(new_beta);
        });
    }

    fn prepare(&self, experience: &Trajectory) -> Result<(Batch, Tensor, Tensor)> {
        let device = self.var_store.device();
        let spec = self.collect_data_spec();
        let (obs, outer) =
            flatten_observation(&experience.observation, &spec.observation, device)?;
        let (b, t) = match outer.as_slice() {
            [b, t] if *t >= 2 => (*b as i64, *t as i64),
            _ => {
                return Err(TrellisError::InvalidExperience(format!(
                    "PPO needs experience [B, T] with T >= 2, got outer dims {:?}",
                    outer
                ))
                .into())
            }
        };
        let tt = t - 1;
        let d = obs.size()[1];
        let scalar = |a: &Array| {
            array_to_tensor(a, device)
                .to_kind(Kind::Float)
                .narrow(1, 0, tt)
        };

        let values = tch::no_grad(|| self.policy.values(&obs).reshape(&[b, t]));
        let raw_rewards = scalar(&experience.reward);
        let rewards = match &self.reward_normalizer {
            Some(n) => n
                .normalize(
                    &raw_rewards.reshape(&[-1, 1]),
                    false,
                    self.config.reward_norm_clipping,
                )
                .reshape(&[b, tt]),
            None => raw_rewards.shallow_clone(),
        };
        // Returns do not flow across the end of an episode. Truncated episodes keep a
        // nonzero discount and bootstrap with the value of their final observation.
        let last = StepType::Last.value() as i64;
        let episode_mask = scalar(&experience.next_step_type).ne(last).to_kind(Kind::Float);
        let discounts = scalar(&experience.discount) * self.config.discount_factor;

        let mut returns = discounted_return(&rewards, &discounts, &episode_mask, &values);
        let advantages = if self.config.use_gae {
            let lambda = self.config.lambda;
            let advantages = generalized_advantage_estimation(
                &values,
                &rewards,
                &discounts,
                &episode_mask,
                lambda,
            );
            if self.config.use_td_lambda_return {
                returns = &advantages + values.narrow(1, 0, tt);
            }
            advantages
        } else {
            &returns - values.narrow(1, 0, tt)
        };
        let advantages = if self.config.normalize_advantages {
            normalize(&advantages)
        } else {
            advantages
        };

        let mask = scalar(&experience.step_type)
            .ne(last)
            .to_kind(Kind::Float)
            .reshape(&[-1]);
        let observation = obs.reshape(&[b, t, d]).narrow(1, 0, tt).reshape(&[b * tt, d]);
        let actions = experience
            .action
            .flatten()
            .into_iter()
            .map(|a| train_steps(&array_to_tensor(a, device), tt))
            .collect::<Vec<_>>();
        let old_distributions = experience
            .policy_info
            .flatten_params()?
            .into_iter()
            .map(|params| {
                let params = params
                    .into_iter()
                    .map(|(k, a)| (k, train_steps(&array_to_tensor(a, device), tt)))
                    .collect::<BTreeMap<_, _>>();
                Distribution::from_params(&params)
            })
            .collect::<Result<Vec<_>>>()?;
        if old_distributions.len() != actions.len() {
            return Err(TrellisError::InvalidExperience(
                "Policy info does not hold a distribution for every action".into(),
            )
            .into());
        }
        let old_log_prob = tch::no_grad(|| {
            old_distributions
                .iter()
                .zip(actions.iter())
                .map(|(d, a)| sum_event(&d.log_prob(a)))
                .fold(Tensor::zeros(&[b * tt], (Kind::Float, device)), |acc, x| acc + x)
        });

        let batch = Batch {
            observation,
            actions,
            old_distributions,
            old_log_prob,
            returns: returns.reshape(&[-1]),
            advantages: advantages.reshape(&[-1]),
            mask,
        };
        Ok((batch, obs, raw_rewards))
    }

    fn kl_divergence(&self, batch: &Batch, distributions: &[Distribution]) -> Result<Tensor> {
        let kl = batch
            .old_distributions
            .iter()
            .zip(distributions.iter())
            .map(|(old, new)| old.kl_divergence(new).map(|kl| sum_event(&kl)))
            .collect::<Result<Vec<_>>>()?;
        let kl = kl
            .into_iter()
            .fold(batch.mask.zeros_like(), |acc, x| acc + x);
        Ok(masked_mean(&kl, &batch.mask))
    }

    fn losses(&self, batch: &Batch) -> Result<Losses> {
        let config = &self.config;
        let distributions = self.policy.distributions(&batch.observation)?;
        let mask = &batch.mask;

        let log_prob = distributions
            .iter()
            .zip(batch.actions.iter())
            .map(|(d, a)| sum_event(&d.log_prob(a)))
            .fold(mask.zeros_like(), |acc, x| acc + x);
        let mut log_ratio = log_prob - &batch.old_log_prob;
        if config.log_prob_clipping > 0.0 {
            log_ratio = log_ratio.clamp(-config.log_prob_clipping, config.log_prob_clipping);
        }
        let ratio = log_ratio.exp();
        let surrogate = &ratio * &batch.advantages;
        let objective = if config.importance_ratio_clipping > 0.0 {
            let eps = config.importance_ratio_clipping;
            let clipped = ratio.clamp(1.0 - eps, 1.0 + eps) * &batch.advantages;
            surrogate.min_other(&clipped)
        } else {
            surrogate
        };
        let policy_gradient = -masked_mean(&objective, mask);

        let value_preds = self.policy.values(&batch.observation);
        let value_estimation = masked_mean(
            &(&batch.returns - value_preds).pow_tensor_scalar(2),
            mask,
        ) * config.value_pred_loss_coef;

        let entropy = distributions
            .iter()
            .map(|d| sum_event(&d.entropy()))
            .fold(mask.zeros_like(), |acc, x| acc + x);
        let entropy_regularization = -masked_mean(&entropy, mask) * config.entropy_regularization;

        let kl_divergence = self.kl_divergence(batch, &distributions)?;
        let kl_cutoff = config.kl_cutoff_factor * config.adaptive_kl_target;
        let kl_cutoff_loss =
            (&kl_divergence - kl_cutoff).relu().pow_tensor_scalar(2) * config.kl_cutoff_coef;
        let adaptive_kl_loss = self.adaptive_kl_beta.squeeze() * &kl_divergence;
        let kl_penalty = kl_cutoff_loss + adaptive_kl_loss;

        let total = &policy_gradient + &value_estimation + &entropy_regularization + &kl_penalty;
        Ok(Losses {
            total,
            policy_gradient,
            value_estimation,
            entropy_regularization,
            kl_penalty,
            kl_divergence,
        })
    }
}

/// Access to the distribution parameters of a collect policy info.
trait FlattenParams {
    fn flatten_params(&self) -> Result<Vec<Vec<(String, &Array)>>>;
}

impl FlattenParams for Nest<Array> {
    fn flatten_params(&self) -> Result<Vec<Vec<(String, &Array)>>> {
        match self {
            Nest::Tuple(xs) => xs
                .iter()
                .map(|x| match x {
                    Nest::Dict(params) => params
                        .iter()
                        .map(|(k, v)| match v {
                            Nest::Leaf(a) => Ok((k.clone(), a)),
                            _ => Err(TrellisError::InvalidExperience(format!(
                                "Distribution parameter {} must be a leaf",
                                k
                            ))
                            .into()),
                        })
                        .collect::<Result<Vec<_>>>(),
                    _ => Err(TrellisError::InvalidExperience(
                        "Policy info must hold a dictionary of parameters per action".into(),
                    )
                    .into()),
                })
                .collect(),
            _ => Err(TrellisError::InvalidExperience(
                "Policy info must be a tuple of distribution parameters".into(),
            )
            .into()),
        }
    }
}

impl Agent for PpoAgent {
    type Policy = PpoPolicy;

    fn policy(&mut self) -> &mut PpoPolicy {
        self.policy.set_collect(false);
        self.policy.set_clip(true);
        &mut self.policy
    }

    fn collect_policy(&mut self) -> &mut PpoPolicy {
        self.policy.set_collect(true);
        self.policy.set_clip(false);
        &mut self.policy
    }

    fn time_step_spec(&self) -> &TimeStep<ArraySpec> {
        self.policy.time_step_spec()
    }

    fn action_spec(&self) -> &Nest<ArraySpec> {
        self.policy.action_spec()
    }

    fn collect_data_spec(&self) -> Trajectory<ArraySpec> {
        trajectory_spec(
            self.policy.time_step_spec(),
            self.policy.action_spec(),
            self.policy.collect_info_spec(),
        )
    }

    fn update(&mut self, experience: &Trajectory) -> Result<LossInfo> {
        let (batch, observation, raw_rewards) = self.prepare(experience)?;

        let mut last = None;
        for epoch in 0..self.config.num_epochs {
            let losses = self.losses(&batch)?;
            self.opt.backward_step(&losses.total);
            debug!(
                "Epoch {}: loss = {:.6}, kl = {:.6}",
                epoch,
                losses.total.double_value(&[]),
                losses.kl_divergence.double_value(&[])
            );
            last = Some(losses);
        }

        let kl = tch::no_grad(|| -> Result<f64> {
            let distributions = self.policy.distributions(&batch.observation)?;
            Ok(self.kl_divergence(&batch, &distributions)?.double_value(&[]))
        })?;
        self.update_adaptive_kl_beta(kl);

        if let Some(n) = self.reward_normalizer.as_mut() {
            n.update(&raw_rewards.reshape(&[-1, 1]));
        }
        if let Some(n) = self.policy.normalizer_mut() {
            n.update(&observation);
        }

        let mut extra = Record::empty();
        let scalar = |t: &Tensor| RecordValue::Scalar(t.double_value(&[]) as f32);
        let loss = match &last {
            Some(l) => {
                extra.insert("policy_gradient_loss", scalar(&l.policy_gradient));
                extra.insert("value_estimation_loss", scalar(&l.value_estimation));
                extra.insert("entropy_regularization_loss", scalar(&l.entropy_regularization));
                extra.insert("kl_penalty_loss", scalar(&l.kl_penalty));
                l.total.double_value(&[]) as f32
            }
            None => 0.0,
        };
        extra.insert("kl_divergence", RecordValue::Scalar(kl as f32));
        extra.insert(
            "adaptive_kl_beta",
            RecordValue::Scalar(self.adaptive_kl_beta() as f32),
        );
        Ok(LossInfo { loss, extra })
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        let path = path.join(PARAMS_FILE);
        self.var_store.save(&path)?;
        info!("Save PPO agent to {:?}", path);
        Ok(())
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        let path = path.join(PARAMS_FILE);
        self.var_store.load(&path)?;
        info!("Load PPO agent from {:?}", path);
        Ok(())
    }
}
