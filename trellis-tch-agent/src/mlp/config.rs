use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Mlp`](super::Mlp).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct MlpConfig {
    /// Input dimension.
    pub in_dim: i64,

    /// Units of the hidden layers, each followed by ReLU.
    pub units: Vec<i64>,

    /// Dimension of an optional linear output layer.
    pub out_dim: Option<i64>,

    /// Applies ReLU to the output layer.
    #[serde(default)]
    pub activation_out: bool,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            in_dim: 1,
            units: vec![64, 64],
            out_dim: None,
            activation_out: false,
        }
    }
}

impl MlpConfig {
    /// Creates a configuration.
    pub fn new(in_dim: i64, units: Vec<i64>, out_dim: Option<i64>) -> Self {
        Self {
            in_dim,
            units,
            out_dim,
            activation_out: false,
        }
    }

    /// Sets the input dimension.
    pub fn in_dim(mut self, v: i64) -> Self {
        self.in_dim = v;
        self
    }

    /// Sets the hidden units.
    pub fn units(mut self, v: Vec<i64>) -> Self {
        self.units = v;
        self
    }

    /// Sets the output dimension.
    pub fn out_dim(mut self, v: Option<i64>) -> Self {
        self.out_dim = v;
        self
    }

    /// Dimension of the output of the network.
    pub fn output_dim(&self) -> i64 {
        self.out_dim
            .or_else(|| self.units.last().cloned())
            .unwrap_or(self.in_dim)
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
