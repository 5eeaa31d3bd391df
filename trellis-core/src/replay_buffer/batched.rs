//! Replay buffer with one row per environment.
use super::BatchedReplayBufferConfig;
use crate::{
    array::Stack,
    base::{Checkpointable, Observer, ReplayBufferBase},
    error::TrellisError,
    trajectory::Trajectory,
};
use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    collections::VecDeque,
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

/// Keeps the trajectories of each environment of a batched environment in time order.
///
/// Items are added with a leading batch dimension and gathered as `[B, T, ...]`, the layout
/// on-policy agents train on. Each row keeps at most `max_length` steps, dropping the oldest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchedReplayBuffer {
    batch_size: usize,
    max_length: usize,
    rows: Vec<VecDeque<Trajectory>>,
}

impl BatchedReplayBuffer {
    /// Builds a replay buffer.
    pub fn build(config: &BatchedReplayBufferConfig) -> Self {
        let max_length = config.max_length.max(1);
        Self {
            batch_size: config.batch_size,
            max_length,
            rows: (0..config.batch_size)
                .map(|_| VecDeque::with_capacity(max_length))
                .collect(),
        }
    }

    /// Number of rows.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of steps in each row.
    pub fn num_steps(&self) -> usize {
        self.rows.first().map_or(0, |row| row.len())
    }

    /// Saves the contents.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        bincode::serialize_into(BufWriter::new(File::create(path)?), self)?;
        info!("Saved replay buffer with {} items in {:?}", self.len(), path);
        Ok(())
    }

    /// Restores the contents saved with [`BatchedReplayBuffer::save`].
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        *self = bincode::deserialize_from(BufReader::new(File::open(path)?))?;
        info!("Loaded replay buffer with {} items from {:?}", self.len(), path);
        Ok(())
    }
}

impl ReplayBufferBase for BatchedReplayBuffer {
    type Item = Trajectory;

    fn add_batch(&mut self, item: Trajectory) -> Result<()> {
        let items = item.unstack()?;
        if items.len() != self.batch_size {
            return Err(TrellisError::BatchDimMismatch {
                batch_size: self.batch_size,
                shape: item.step_type.shape().to_vec(),
            }
            .into());
        }
        for (row, x) in self.rows.iter_mut().zip(items) {
            if row.len() == self.max_length {
                row.pop_front();
            }
            row.push_back(x);
        }
        Ok(())
    }

    fn gather_all(&self) -> Result<Trajectory> {
        if self.is_empty() {
            return Err(TrellisError::NotEnoughItems {
                requested: 1,
                size: 0,
            }
            .into());
        }
        let rows = self
            .rows
            .iter()
            .map(|row| Trajectory::stack(&row.iter().cloned().collect::<Vec<_>>()))
            .collect::<Result<Vec<_>>>()?;
        Trajectory::stack(&rows)
    }

    fn clear(&mut self) {
        self.rows.iter_mut().for_each(|row| row.clear());
    }

    fn len(&self) -> usize {
        self.rows.iter().map(|row| row.len()).sum()
    }

    fn capacity(&self) -> usize {
        self.batch_size * self.max_length
    }
}

impl Checkpointable for BatchedReplayBuffer {
    fn save(&self, path: &Path) -> Result<()> {
        BatchedReplayBuffer::save(self, path)
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        BatchedReplayBuffer::load(self, path)
    }
}

impl Observer for BatchedReplayBuffer {
    fn observe(&mut self, trajectory: &Trajectory) -> Result<()> {
        self.add_batch(trajectory.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        array::Array,
        base::{PolicyStep, TimeStep},
        nest::Nest,
    };
    use tempdir::TempDir;

    /// A batch of trajectories whose observations are `t * 10 + env`.
    fn batch(t: usize, batch_size: usize) -> Result<Trajectory> {
        let items = (0..batch_size)
            .map(|b| {
                let obs = Nest::Leaf(Array::vec_f32(vec![(t * 10 + b) as f32]));
                let ts = TimeStep::transition(obs, 1.0, 1.0);
                let ps = PolicyStep::new(Nest::Leaf(Array::scalar_i64(b as i64)));
                Trajectory::from_transition(&ts, &ps, &ts)
            })
            .collect::<Vec<_>>();
        Trajectory::stack(&items)
    }

    #[test]
    fn test_gather_all_is_batch_major() -> Result<()> {
        let config = BatchedReplayBufferConfig::default()
            .batch_size(2)
            .max_length(3);
        let mut rb = BatchedReplayBuffer::build(&config);
        for t in 0..4 {
            rb.add_batch(batch(t, 2)?)?;
        }
        assert_eq!(rb.len(), 6);
        let all = rb.gather_all()?;
        let obs = all.observation.as_leaf().unwrap();
        assert_eq!(obs.shape(), &[2, 3, 1]);
        // The oldest step (t = 0) was dropped.
        assert_eq!(obs.to_f32_vec(), vec![10.0, 20.0, 30.0, 11.0, 21.0, 31.0]);

        rb.clear();
        assert!(rb.is_empty());
        assert!(rb.gather_all().is_err());
        Ok(())
    }

    #[test]
    fn test_batch_size_mismatch() -> Result<()> {
        let config = BatchedReplayBufferConfig::default().batch_size(2);
        let mut rb = BatchedReplayBuffer::build(&config);
        assert!(rb.add_batch(batch(0, 3)?).is_err());
        Ok(())
    }

    #[test]
    fn test_checkpoint() -> Result<()> {
        let config = BatchedReplayBufferConfig::default().batch_size(2);
        let mut rb = BatchedReplayBuffer::build(&config);
        rb.add_batch(batch(0, 2)?)?;
        let dir = TempDir::new("batched_replay_buffer")?;
        let path = dir.path().join("rb.bin");
        rb.save(&path)?;

        let mut restored = BatchedReplayBuffer::build(&BatchedReplayBufferConfig::default());
        restored.load(&path)?;
        assert_eq!(restored, rb);
        Ok(())
    }
}
