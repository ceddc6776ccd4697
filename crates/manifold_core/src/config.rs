use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::costs::covariation::CovariationSettings;
use crate::costs::noise::NoiseSettings;
use crate::costs::tolerance::ToleranceSettings;
use crate::error::Result;

/// How to start the external evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSettings {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    /// Parent directory for per-session working directories.
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
}

fn default_working_dir() -> PathBuf {
    std::env::temp_dir().join("manifold_core")
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ComputeSolution"),
            args: Vec::new(),
            working_dir: default_working_dir(),
        }
    }
}

/// Everything a cost analysis run can be tuned with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    pub tolerance: ToleranceSettings,
    pub noise: NoiseSettings,
    pub covariation: CovariationSettings,
    pub evaluator: ProcessSettings,
}

impl CostConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
