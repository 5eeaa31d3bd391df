//! Evaluate [`Policy`].
use crate::{base::Policy, record::Record};
use anyhow::Result;
mod default_evaluator;
pub use default_evaluator::DefaultEvaluator;

/// Evaluate [`Policy`].
pub trait Evaluator {
    /// Evaluate [`Policy`].
    ///
    /// The returned record holds one scalar per computed metric.
    fn evaluate<P: Policy>(&mut self, policy: &mut P) -> Result<Record>;
}
