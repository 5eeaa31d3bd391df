//! Proximal policy optimization.
mod agent;
mod config;
mod policy;
pub use agent::{discounted_return, generalized_advantage_estimation, PpoAgent};
pub use config::PpoConfig;
pub use policy::{DistributionStep, PpoPolicy};
