//! Configurations of replay buffers.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`UniformReplayBuffer`](super::UniformReplayBuffer).
///
/// ```rust
/// use trellis_core::replay_buffer::UniformReplayBufferConfig;
///
/// let config = UniformReplayBufferConfig::default().capacity(32).seed(1);
/// assert_eq!(config.capacity, 32);
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct UniformReplayBufferConfig {
    /// Maximum number of items. The oldest items are overwritten when the buffer is full.
    pub capacity: usize,

    /// Random seed used for sampling.
    pub seed: u64,
}

impl Default for UniformReplayBufferConfig {
    fn default() -> Self {
        Self {
            capacity: 10000,
            seed: 42,
        }
    }
}

impl UniformReplayBufferConfig {
    /// Sets the capacity of the replay buffer.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the random seed for sampling.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Configuration of [`BatchedReplayBuffer`](super::BatchedReplayBuffer).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct BatchedReplayBufferConfig {
    /// Number of environments, i.e. the leading dimension of added items.
    pub batch_size: usize,

    /// Maximum number of steps kept per environment.
    pub max_length: usize,
}

impl Default for BatchedReplayBufferConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            max_length: 1000,
        }
    }
}

impl BatchedReplayBufferConfig {
    /// Sets the number of environments.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the maximum number of steps per environment.
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_serde_config() -> Result<()> {
        let config = UniformReplayBufferConfig::default().capacity(100).seed(7);
        let dir = TempDir::new("replay_buffer_config")?;
        let path = dir.path().join("replay_buffer_config.yaml");
        config.save(&path)?;
        assert_eq!(UniformReplayBufferConfig::load(&path)?, config);
        Ok(())
    }
}
