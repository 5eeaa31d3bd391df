//! Configuration of [`GymEnv`](crate::GymEnv).
use crate::DTypeMap;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`GymEnv`](crate::GymEnv).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GymEnvConfig {
    /// Python module providing `make`.
    pub module: String,

    /// Name of the environment, e.g. `CartPole-v1`.
    pub name: String,

    /// Episodes are truncated after this number of steps.
    pub max_steps: Option<usize>,

    /// Render mode given to `make`.
    pub render_mode: Option<String>,

    /// Dtypes of specs.
    pub dtype_map: DTypeMap,
}

impl Default for GymEnvConfig {
    fn default() -> Self {
        Self {
            module: "gymnasium".to_string(),
            name: "".to_string(),
            max_steps: None,
            render_mode: None,
            dtype_map: DTypeMap::default(),
        }
    }
}

impl GymEnvConfig {
    /// Sets the Python module.
    pub fn module(mut self, v: impl Into<String>) -> Self {
        self.module = v.into();
        self
    }

    /// Sets the name of the environment.
    pub fn name(mut self, v: impl Into<String>) -> Self {
        self.name = v.into();
        self
    }

    /// Sets the maximum number of steps of an episode.
    pub fn max_steps(mut self, v: Option<usize>) -> Self {
        self.max_steps = v;
        self
    }

    /// Sets the render mode.
    pub fn render_mode(mut self, v: Option<String>) -> Self {
        self.render_mode = v;
        self
    }

    /// Sets the dtypes of specs.
    pub fn dtype_map(mut self, v: DTypeMap) -> Self {
        self.dtype_map = v;
        self
    }

    /// Loads from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves as a YAML file.
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
    use trellis_core::array::DType;

    #[test]
    fn test_serde_gym_env_config() -> Result<()> {
        let config = GymEnvConfig::default()
            .name("CartPole-v1")
            .max_steps(Some(200))
            .dtype_map(DTypeMap::default().discrete(DType::I32));
        let dir = TempDir::new("gym_env_config")?;
        let path = dir.path().join("gym.yaml");
        config.save(&path)?;
        assert_eq!(GymEnvConfig::load(&path)?, config);
        Ok(())
    }
}
