//! JSON experiment configuration.
//!
//! Every section falls back to its defaults, so `{}` is a valid file.
//!
//! ```json
//! {
//!   "seed": 7,
//!   "grid": { "cols": 5, "rows": 5, "num_edge": 1, "num_mid": 3, "num_cloud": 1 },
//!   "sda": { "num_states": 3 },
//!   "evolver": { "pop_size": 10, "tournament_size": 3, "num_generations": 50 }
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::EvolverConfig;
use crate::error::Result;
use crate::layout::GridConfig;
use crate::sda::SdaConfig;
use crate::topology::TrafficConfig;

/// Everything needed to reproduce a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Master seed for layout, traffic and engine randomness.
    pub seed: u64,
    /// Synthetic layout; ignored when a layout file is supplied.
    pub grid: GridConfig,
    /// Edge stream sizing and energy constants.
    pub traffic: TrafficConfig,
    /// `output_len` is replaced by the topology's pair count at run time.
    pub sda: SdaConfig,
    /// Engine selection and hyperparameters.
    pub evolver: EvolverConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            grid: GridConfig::default(),
            traffic: TrafficConfig::default(),
            sda: SdaConfig::default(),
            evolver: EvolverConfig::default(),
        }
    }
}

impl ExperimentConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Render as indented JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        self.traffic.validate()?;
        self.sda.validate()?;
        self.evolver.validate()
    }
}
