//! Policies independent of any deep learning backend.
//!
//! [`RandomPolicy`] samples actions uniformly within the action spec. [`OuNoisePolicy`] and
//! [`GaussianNoisePolicy`] wrap a policy with float actions and add exploration noise.
mod gaussian_noise;
mod ou_noise;
mod random;
pub use gaussian_noise::{GaussianNoiseConfig, GaussianNoisePolicy};
pub use ou_noise::{OuNoiseConfig, OuNoisePolicy};
pub use random::RandomPolicy;

use crate::{error::TrellisError, nest::Nest, spec::ArraySpec};
use anyhow::Result;

/// Fails unless every leaf of the action spec is a float.
fn check_float_actions(action_spec: &Nest<ArraySpec>, name: &str) -> Result<()> {
    match action_spec.flatten().into_iter().find(|s| !s.dtype.is_float()) {
        Some(s) => Err(TrellisError::DTypeMismatch {
            expected: format!("a float action for {}", name),
            got: s.dtype.to_string(),
        }
        .into()),
        None => Ok(()),
    }
}
