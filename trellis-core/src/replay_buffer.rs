//! Replay buffers.
//!
//! [`UniformReplayBuffer`] is a fixed-capacity circular buffer sampling consecutive items
//! uniformly. Items pass through an [`ItemEncoder`] before being stored; the
//! [`FrameHashEncoder`] stores stacked-frame observations once per frame in a
//! [`FrameBuffer`]. [`BatchedReplayBuffer`] keeps one row of steps per environment of a
//! batched environment and is used for on-policy training.
mod batched;
mod config;
mod encoder;
mod frame_buffer;
mod hashed;
mod uniform;
pub use batched::BatchedReplayBuffer;
pub use config::{BatchedReplayBufferConfig, UniformReplayBufferConfig};
pub use encoder::{Identity, ItemEncoder};
pub use frame_buffer::FrameBuffer;
pub use hashed::{FrameHashEncoder, HashedTrajectory, HashedUniformReplayBuffer};
pub use uniform::{Dataset, UniformReplayBuffer};
