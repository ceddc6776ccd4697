use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::fingerprint::{fingerprint, ManifoldFingerprint};
use crate::error::{Error, Result};
use crate::geometry::Point;
use crate::settings::Settings;
use crate::traits::{Oracle, TrialStore};

/// One trial's release parameters and the settings it was recorded under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub release_angle: f64,
    pub release_stretch: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub settings: Settings,
}

impl TrialRecord {
    pub fn new(release_angle: f64, release_stretch: f64, settings: Settings) -> Self {
        Self {
            release_angle,
            release_stretch,
            score: None,
            settings,
        }
    }

    pub fn release_point(&self) -> Point {
        Point::new(self.release_angle, self.release_stretch)
    }

    /// The landscape score of this release, computed on first use.
    pub fn score_with<O: Oracle + ?Sized>(&mut self, oracle: &mut O) -> Result<f64> {
        if let Some(score) = self.score {
            return Ok(score);
        }
        let score = oracle.evaluate(self.release_angle, self.release_stretch)?;
        self.score = Some(score);
        Ok(score)
    }

    /// Reads a trial result file. Unknown fields are ignored.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Where a set of trials comes from.
pub enum TrialSource<'a> {
    FileList(Vec<PathBuf>),
    LoadedRecords(Vec<TrialRecord>),
    FilteredGroup(&'a dyn TrialStore),
    /// Bare settings objects; these can be validated but carry no releases.
    RawSettings(Vec<Settings>),
}

impl TrialSource<'_> {
    /// Loads every trial record of the source.
    pub fn records(&self) -> Result<Vec<TrialRecord>> {
        match self {
            TrialSource::FileList(paths) => paths.iter().map(|p| TrialRecord::load(p)).collect(),
            TrialSource::LoadedRecords(records) => Ok(records.clone()),
            TrialSource::FilteredGroup(store) => store.data_list(),
            TrialSource::RawSettings(_) => Err(Error::InvalidParameter(
                "raw settings carry no trial releases".into(),
            )),
        }
    }

    /// The settings object of every element, in source order.
    pub fn settings(&self) -> Result<Vec<Settings>> {
        match self {
            TrialSource::RawSettings(list) => Ok(list.clone()),
            _ => Ok(self.records()?.into_iter().map(|r| r.settings).collect()),
        }
    }

    /// The distinct fingerprints found in the source.
    pub fn fingerprints(&self) -> Result<BTreeSet<ManifoldFingerprint>> {
        self.settings()?.iter().map(fingerprint).collect()
    }
}

/// True iff every element of `source` resolves to the same fingerprint.
/// An empty source is not a valid manifold set.
pub fn validate_same_manifold(source: &TrialSource<'_>) -> Result<bool> {
    Ok(source.fingerprints()?.len() == 1)
}

/// Returns the shared fingerprint, or fails with `ManifoldMismatch`.
pub fn require_same_manifold(source: &TrialSource<'_>) -> Result<ManifoldFingerprint> {
    shared_fingerprint(source.fingerprints()?)
}

/// [`require_same_manifold`] over records that are already loaded.
pub fn require_same_manifold_records(records: &[TrialRecord]) -> Result<ManifoldFingerprint> {
    let tokens = records
        .iter()
        .map(|r| fingerprint(&r.settings))
        .collect::<Result<BTreeSet<_>>>()?;
    shared_fingerprint(tokens)
}

fn shared_fingerprint(mut tokens: BTreeSet<ManifoldFingerprint>) -> Result<ManifoldFingerprint> {
    match tokens.len() {
        0 => Err(Error::EmptyInput("trial source has no elements")),
        1 => tokens
            .pop_first()
            .ok_or(Error::EmptyInput("trial source has no elements")),
        n => Err(Error::ManifoldMismatch { fingerprints: n }),
    }
}

pub fn release_points(records: &[TrialRecord]) -> Vec<Point> {
    records.iter().map(TrialRecord::release_point).collect()
}
