use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Fields that must be numeric whenever they are present.
const NUMERIC_FIELDS: &[&str] = &[
    "PitchMinimum",
    "PitchMaximum",
    "PitchSpan",
    "SemitoneSpan",
    "VolumeMinimum",
    "VolumeMaximum",
    "VolumeSpan",
    "AngleMinimum",
    "AngleMaximum",
    "StretchMinimum",
    "StretchMaximum",
    "Gravity",
    "TargetValidDiameter",
    "FieldWidth",
];

/// Range pairs that must satisfy `min <= max` when both are present.
const RANGE_FIELDS: &[(&str, &str)] = &[
    ("PitchMinimum", "PitchMaximum"),
    ("VolumeMinimum", "VolumeMaximum"),
    ("AngleMinimum", "AngleMaximum"),
    ("StretchMinimum", "StretchMaximum"),
];

/// The experiment settings object. It fully determines the performance
/// landscape and is handed verbatim to the external evaluator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(Map<String, Value>);

impl Settings {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::try_from(value)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn require(&self, key: &str) -> Result<&Value> {
        self.0
            .get(key)
            .ok_or_else(|| Error::MissingSetting(key.to_string()))
    }

    pub fn number(&self, key: &str) -> Result<f64> {
        let value = self.require(key)?;
        value
            .as_f64()
            .ok_or_else(|| Error::InvalidSettings(format!("\"{key}\" must be a number, got {value}")))
    }

    pub fn flag(&self, key: &str) -> Result<bool> {
        let value = self.require(key)?;
        value
            .as_bool()
            .ok_or_else(|| Error::InvalidSettings(format!("\"{key}\" must be a boolean, got {value}")))
    }

    /// Checks the structural sanity of the settings before they are handed to
    /// an evaluator.
    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(Error::InvalidSettings("settings object is empty".into()));
        }
        for &key in NUMERIC_FIELDS {
            if self.0.contains_key(key) {
                let value = self.number(key)?;
                if !value.is_finite() {
                    return Err(Error::InvalidSettings(format!("\"{key}\" must be finite")));
                }
            }
        }
        if let Some(value) = self.0.get("UseSemitones") {
            if !value.is_boolean() {
                return Err(Error::InvalidSettings(format!(
                    "\"UseSemitones\" must be a boolean, got {value}"
                )));
            }
        }
        for &(lo, hi) in RANGE_FIELDS {
            if self.0.contains_key(lo) && self.0.contains_key(hi) {
                let (min, max) = (self.number(lo)?, self.number(hi)?);
                if min > max {
                    return Err(Error::InvalidSettings(format!(
                        "\"{lo}\" ({min}) exceeds \"{hi}\" ({max})"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl TryFrom<Value> for Settings {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Settings(map)),
            other => Err(Error::InvalidSettings(format!(
                "settings must be a JSON object, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::Settings;
    use serde_json::json;

    /// A complete settings object of the kind written by the experiment software.
    pub fn sample_settings() -> Settings {
        Settings::try_from(json!({
            "PitchMinimum": 100.0,
            "PitchMaximum": 400.0,
            "PitchSpan": 150.0,
            "UseSemitones": false,
            "SemitoneSpan": 12,
            "VolumeMinimum": 40.0,
            "VolumeMaximum": 90.0,
            "VolumeSpan": 50.0,
            "AngleMinimum": 10.0,
            "AngleMaximum": 80.0,
            "StretchMinimum": 0.5,
            "StretchMaximum": 3.0,
            "Gravity": 9.81,
            "TargetValidDiameter": 20,
            "FieldWidth": 1000,
            "Target": { "y": 25.0, "x": 600.0 },
            "Obstacle": { "x": 300.0, "y": 0.0, "Height": 120.0, "Width": 20.0 },
            "SubjectName": "S01",
            "TrialCount": 40
        }))
        .expect("fixture is an object")
    }
}
