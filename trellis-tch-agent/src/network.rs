//! Actor and value networks.
mod actor;
mod value;
pub use actor::{
    ActorDistributionNetwork, ActorDistributionNetworkConfig, ActorNetwork, ActorOutput,
};
pub use value::ValueNetwork;
