//! Observer of trajectories.
use crate::trajectory::Trajectory;
use anyhow::Result;

/// Receives every trajectory generated by a driver.
///
/// Replay buffers and metrics are observers.
pub trait Observer {
    /// Processes a (possibly batched) trajectory.
    fn observe(&mut self, trajectory: &Trajectory) -> Result<()>;
}
