//! Errors of gym environments.
use thiserror::Error;

/// Errors raised while wrapping gym environments.
#[derive(Debug, Error)]
pub enum GymEnvError {
    /// The space has no counterpart in [`GymSpace`](crate::GymSpace).
    #[error("Unsupported gym space: {0}")]
    UnsupportedSpace(String),

    /// The value returned by Python does not fit the spec.
    #[error("Unexpected value from gym: {0}")]
    UnexpectedValue(String),
}
