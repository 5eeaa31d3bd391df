//! Replay buffer interface.
use anyhow::Result;
use std::path::Path;

/// Interface of replay buffers used by the trainer.
///
/// Items are added and gathered with a leading batch dimension.
pub trait ReplayBufferBase {
    /// The type of items stored in the buffer.
    type Item;

    /// Adds a batch of items.
    fn add_batch(&mut self, item: Self::Item) -> Result<()>;

    /// Returns every stored item, stacked.
    fn gather_all(&self) -> Result<Self::Item>;

    /// Removes every item.
    fn clear(&mut self);

    /// Number of stored items.
    fn len(&self) -> usize;

    /// Returns `true` if no item is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of stored items.
    fn capacity(&self) -> usize;
}

/// Objects whose state can be saved to and restored from files.
pub trait Checkpointable {
    /// Saves the state in a file.
    fn save(&self, path: &Path) -> Result<()>;

    /// Restores the state from a file written by [`Checkpointable::save`].
    fn load(&mut self, path: &Path) -> Result<()>;
}
