//! Core functionalities.
mod agent;
mod env;
mod observer;
mod policy;
mod replay_buffer;
mod time_step;
pub use agent::{Agent, LossInfo};
pub use env::Env;
pub use observer::Observer;
pub use policy::Policy;
pub use replay_buffer::{Checkpointable, ReplayBufferBase};
pub(crate) use time_step::step_types_of;
pub use time_step::{time_step_spec, Info, PolicyStep, StepType, TimeStep};
