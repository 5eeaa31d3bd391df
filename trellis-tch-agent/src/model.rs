//! Interface of neural network modules.
mod base;
pub use base::SubModel;
