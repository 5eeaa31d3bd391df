//! Policy of [`PpoAgent`](super::PpoAgent).
use crate::{
    distribution::Distribution,
    network::{ActorNetwork, ActorOutput, ValueNetwork},
    normalizer::Normalizer,
    util::{dims, flatten_observation, observation_dim, tensor_to_array},
};
use anyhow::Result;
use log::trace;
use std::collections::BTreeMap;
use tch::{Device, Kind, Tensor};
use trellis_core::{
    array::{Array, DType},
    ArraySpec, Nest, Policy, PolicyStep, TimeStep,
};

/// Output of [`PpoPolicy::distribution`].
#[derive(Debug)]
pub struct DistributionStep {
    /// A distribution per action leaf, with the outer dims of the time step.
    pub distributions: Nest<Distribution>,

    /// Policy state.
    pub state: Nest<Array>,

    /// Parameters of the distributions in collect mode, empty otherwise.
    pub info: Nest<Array>,
}

fn reshape_params(d: Distribution, outer: &[i64]) -> Result<Distribution> {
    let params = d
        .params()
        .into_iter()
        .map(|(k, t)| {
            let size = t.size();
            let shape = outer.iter().chain(size[1..].iter()).cloned().collect::<Vec<_>>();
            (k.to_string(), t.reshape(&shape))
        })
        .collect::<BTreeMap<_, _>>();
    Distribution::from_params(&params)
}

fn param_spec((name, t): (&'static str, Tensor)) -> (&'static str, Nest<ArraySpec>) {
    let shape = t.size()[1..].iter().map(|&d| d as usize).collect::<Vec<_>>();
    (name, Nest::Leaf(ArraySpec::new(&shape, DType::F32).with_name(name)))
}

fn params_to_info(d: &Distribution) -> Result<Nest<Array>> {
    let params = d
        .params()
        .into_iter()
        .map(|(k, t)| Ok((k, Nest::Leaf(tensor_to_array(&t, DType::F32)?))))
        .collect::<Result<Vec<_>>>()?;
    Ok(Nest::dict(params))
}

/// Policy with an actor network, a value network and an optional observation normalizer.
///
/// The policy works in one of two modes, switched by the owning agent:
///
/// * the eval mode (`collect == false`, `clip == true`) returns actions clipped to the action
///   spec and no info;
/// * the collect mode (`collect == true`, `clip == false`) returns unclipped actions and the
///   parameters of the action distributions as info, which the agent needs to compute
///   importance ratios. The info is a tuple with a dictionary of parameters for each action
///   leaf, in the order of the flattened action spec.
pub struct PpoPolicy {
    time_step_spec: TimeStep<ArraySpec>,
    action_spec: Nest<ArraySpec>,
    actor: Box<dyn ActorNetwork>,
    value: ValueNetwork,
    normalizer: Option<Normalizer>,
    observation_norm_clipping: Option<f64>,
    collect_info_spec: Nest<ArraySpec>,
    collect: bool,
    clip: bool,
    device: Device,
}

impl PpoPolicy {
    /// Creates a policy in the eval mode.
    pub fn new(
        time_step_spec: TimeStep<ArraySpec>,
        action_spec: Nest<ArraySpec>,
        actor: Box<dyn ActorNetwork>,
        value: ValueNetwork,
        normalizer: Option<Normalizer>,
        observation_norm_clipping: Option<f64>,
        device: Device,
    ) -> Result<Self> {
        // Shapes of the parameters are found by applying the actor to a dummy observation.
        let dummy = Tensor::zeros(
            &[1, observation_dim(&time_step_spec.observation)],
            (Kind::Float, device),
        );
        let outputs = tch::no_grad(|| actor.forward(&dummy))?;
        let collect_info_spec = Nest::Tuple(
            outputs
                .into_flat()
                .into_iter()
                .map(|o| Nest::dict(o.into_distribution().params().into_iter().map(param_spec)))
                .collect(),
        );
        Ok(Self {
            time_step_spec,
            action_spec,
            actor,
            value,
            normalizer,
            observation_norm_clipping,
            collect_info_spec,
            collect: false,
            clip: true,
            device,
        })
    }

    /// Switches between the collect and the eval mode.
    pub fn set_collect(&mut self, collect: bool) {
        self.collect = collect;
    }

    /// Enables clipping actions to the action spec.
    pub fn set_clip(&mut self, clip: bool) {
        self.clip = clip;
    }

    /// Returns `true` in the collect mode.
    pub fn is_collect(&self) -> bool {
        self.collect
    }

    /// Spec of the info in the collect mode.
    pub fn collect_info_spec(&self) -> &Nest<ArraySpec> {
        &self.collect_info_spec
    }

    /// The observation normalizer.
    pub fn normalizer_mut(&mut self) -> Option<&mut Normalizer> {
        self.normalizer.as_mut()
    }

    /// Device of the networks.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Normalizes flattened observations `[N, D]` if the policy has a normalizer.
    pub fn normalize_observation(&self, observation: &Tensor) -> Tensor {
        match &self.normalizer {
            Some(n) => n.normalize(observation, true, self.observation_norm_clipping),
            None => observation.shallow_clone(),
        }
    }

    /// Distributions of actions for flattened observations `[N, D]`, one per action leaf.
    ///
    /// Raw actions emitted by the actor are wrapped into deterministic distributions.
    pub fn distributions(&self, observation: &Tensor) -> Result<Vec<Distribution>> {
        let observation = self.normalize_observation(observation);
        Ok(self
            .actor
            .forward(&observation)?
            .into_flat()
            .into_iter()
            .map(ActorOutput::into_distribution)
            .collect())
    }

    /// Values of flattened observations `[N, D]`.
    pub fn values(&self, observation: &Tensor) -> Tensor {
        self.value.forward(&self.normalize_observation(observation))
    }

    /// Applies the value network to observations with outer dims such as `[B]` or `[B, T]`,
    /// returning values of shape of the outer dims.
    pub fn apply_value_network(&self, observation: &Nest<Array>) -> Result<Tensor> {
        let (obs, outer) =
            flatten_observation(observation, &self.time_step_spec.observation, self.device)?;
        Ok(self.values(&obs).reshape(&dims(&outer)))
    }

    /// Distributions of actions at a time step.
    pub fn distribution(
        &self,
        time_step: &TimeStep,
        policy_state: &Nest<Array>,
    ) -> Result<DistributionStep> {
        let (obs, outer) = flatten_observation(
            &time_step.observation,
            &self.time_step_spec.observation,
            self.device,
        )?;
        let outer = dims(&outer);
        let distributions = self
            .distributions(&obs)?
            .into_iter()
            .map(|d| reshape_params(d, &outer))
            .collect::<Result<Vec<_>>>()?;
        let info = if self.collect {
            Nest::Tuple(
                distributions
                    .iter()
                    .map(params_to_info)
                    .collect::<Result<Vec<_>>>()?,
            )
        } else {
            Nest::empty()
        };
        Ok(DistributionStep {
            distributions: Nest::pack_sequence_as(&self.action_spec, distributions)?,
            state: policy_state.clone(),
            info,
        })
    }
}

impl Policy for PpoPolicy {
    fn time_step_spec(&self) -> &TimeStep<ArraySpec> {
        &self.time_step_spec
    }

    fn action_spec(&self) -> &Nest<ArraySpec> {
        &self.action_spec
    }

    fn info_spec(&self) -> Nest<ArraySpec> {
        if self.collect {
            self.collect_info_spec.clone()
        } else {
            Nest::empty()
        }
    }

    fn action(&mut self, time_step: &TimeStep, policy_state: &Nest<Array>) -> Result<PolicyStep> {
        trace!("PpoPolicy::action(), collect = {}", self.collect);
        let step = tch::no_grad(|| self.distribution(time_step, policy_state))?;
        let actions = step
            .distributions
            .flatten()
            .into_iter()
            .zip(self.action_spec.flatten())
            .map(|(d, spec)| {
                let a = tensor_to_array(&tch::no_grad(|| d.sample()), spec.dtype)?;
                if self.clip {
                    spec.clip(&a)
                } else {
                    Ok(a)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(PolicyStep {
            action: Nest::pack_sequence_as(&self.action_spec, actions)?,
            state: step.state,
            info: step.info,
        })
    }
}
