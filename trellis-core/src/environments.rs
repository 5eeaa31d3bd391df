//! Environment wrappers and a simple environment for tests and demos.
//!
//! * [`BatchedEnv`] steps a number of environments sequentially as a single batched one.
//! * [`ParallelEnv`] does the same with each environment in its own thread.
//! * [`GuardedEnv`] is a shareable handle to an environment which detects overlapping calls.
//! * [`TimeLimit`] ends episodes after a fixed number of steps.
//! * [`CountingEnv`] is a deterministic environment counting steps.
mod batched;
mod counting;
mod guarded;
mod parallel;
mod time_limit;
pub use batched::{BatchedEnv, BatchedEnvConfig};
pub use counting::{CountingEnv, CountingEnvConfig};
pub use guarded::GuardedEnv;
pub use parallel::{ParallelEnv, ParallelEnvConfig};
pub use time_limit::{TimeLimit, TimeLimitConfig};
