//! Fully enumerated landscapes and their on-disk cache.
//!
//! A landscape is a dense grid of `{angle, stretch, cpa, outcome}` cells stored
//! as comma separated text with the header `angle,stretch,cpa,outcome`. The
//! cache keeps one file per manifold fingerprint, named `<hex>.mfld`.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{bail, Context};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use super::fingerprint::{fingerprint, ManifoldFingerprint};
use crate::error::{Error, Result};
use crate::settings::Settings;
use crate::traits::{LandscapeGenerator, Oracle, OracleFactory};

pub const LANDSCAPE_HEADER: &str = "angle,stretch,cpa,outcome";
pub const CACHE_EXTENSION: &str = "mfld";

/// Simulated result of a release.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Outcome {
    Hit,
    Miss,
    Obstacle,
    Other(String),
}

impl From<String> for Outcome {
    fn from(value: String) -> Self {
        match value.as_str() {
            "hit" => Outcome::Hit,
            "miss" => Outcome::Miss,
            "obstacle" => Outcome::Obstacle,
            _ => Outcome::Other(value),
        }
    }
}

impl From<Outcome> for String {
    fn from(value: Outcome) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Hit => f.write_str("hit"),
            Outcome::Miss => f.write_str("miss"),
            Outcome::Obstacle => f.write_str("obstacle"),
            Outcome::Other(label) => f.write_str(label),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandscapeCell {
    pub angle: f64,
    pub stretch: f64,
    pub cpa: f64,
    pub outcome: Outcome,
}

/// Closest-approach values laid out for reporting: one row per stretch, one
/// column per angle, both axes ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandscapeMatrix {
    pub angles: Vec<f64>,
    pub stretches: Vec<f64>,
    pub cpa: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedLandscape {
    pub cells: Vec<LandscapeCell>,
}

impl CachedLandscape {
    pub fn new(cells: Vec<LandscapeCell>) -> Self {
        Self { cells }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Parses landscape text. The first non-blank line is the header.
    pub fn parse(text: &str) -> Result<Self> {
        let mut cells = Vec::new();
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty());
        let Some((number, header)) = lines.next() else {
            return Ok(Self::default());
        };
        let header_fields: Vec<&str> = header.split(',').map(str::trim).collect();
        if header_fields.join(",") != LANDSCAPE_HEADER {
            return Err(Error::MalformedLandscape {
                line: number,
                reason: format!("expected header {LANDSCAPE_HEADER:?}, found {header:?}"),
            });
        }
        for (number, line) in lines {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != 4 {
                return Err(Error::MalformedLandscape {
                    line: number,
                    reason: format!("expected 4 fields, found {}", fields.len()),
                });
            }
            let parse = |idx: usize, name: &str| -> Result<f64> {
                fields[idx].parse::<f64>().map_err(|_| Error::MalformedLandscape {
                    line: number,
                    reason: format!("{name} {:?} is not a number", fields[idx]),
                })
            };
            cells.push(LandscapeCell {
                angle: parse(0, "angle")?,
                stretch: parse(1, "stretch")?,
                cpa: parse(2, "cpa")?,
                outcome: Outcome::from(fields[3].to_string()),
            });
        }
        Ok(Self { cells })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn to_text(&self) -> String {
        let mut out = String::from(LANDSCAPE_HEADER);
        for cell in &self.cells {
            out.push('\n');
            out.push_str(&format!(
                "{},{},{},{}",
                cell.angle, cell.stretch, cell.cpa, cell.outcome
            ));
        }
        out
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.to_text())
    }

    /// Arranges the grid as a matrix. Fails when the cells do not cover every
    /// (angle, stretch) combination; duplicate cells keep the last value.
    pub fn matrix(&self) -> Result<LandscapeMatrix> {
        if self.cells.is_empty() {
            return Err(Error::EmptyInput("landscape has no cells"));
        }
        let mut lookup: HashMap<(u64, u64), f64> = HashMap::with_capacity(self.cells.len());
        let mut angles = BTreeSet::new();
        let mut stretches = BTreeSet::new();
        for cell in &self.cells {
            let key = (cell.angle.to_bits(), cell.stretch.to_bits());
            lookup.insert(key, cell.cpa);
            angles.insert(OrderedFloat(cell.angle));
            stretches.insert(OrderedFloat(cell.stretch));
        }
        let angles: Vec<f64> = angles.into_iter().map(|k| k.0).collect();
        let stretches: Vec<f64> = stretches.into_iter().map(|k| k.0).collect();

        let mut cpa = Vec::with_capacity(stretches.len());
        for &stretch in &stretches {
            let mut row = Vec::with_capacity(angles.len());
            for &angle in &angles {
                let value = lookup
                    .get(&(angle.to_bits(), stretch.to_bits()))
                    .copied()
                    .ok_or_else(|| {
                        Error::InvalidParameter(format!(
                            "landscape grid has no cell at angle {angle}, stretch {stretch}"
                        ))
                    })?;
                row.push(value);
            }
            cpa.push(row);
        }
        Ok(LandscapeMatrix {
            angles,
            stretches,
            cpa,
        })
    }

    pub fn interpolator(&self) -> Result<GridInterpolator> {
        GridInterpolator::new(self.matrix()?)
    }
}

/// Bilinear interpolation over a cached grid, usable as an [`Oracle`].
#[derive(Debug, Clone)]
pub struct GridInterpolator {
    matrix: LandscapeMatrix,
}

impl GridInterpolator {
    pub fn new(matrix: LandscapeMatrix) -> Result<Self> {
        if matrix.angles.len() < 2 || matrix.stretches.len() < 2 {
            return Err(Error::InvalidParameter(
                "interpolation needs at least two angles and two stretches".into(),
            ));
        }
        Ok(Self { matrix })
    }

    pub fn matrix(&self) -> &LandscapeMatrix {
        &self.matrix
    }

    fn bracket(axis: &[f64], value: f64, name: &str) -> Result<(usize, f64)> {
        let (first, last) = (axis[0], axis[axis.len() - 1]);
        if !(first..=last).contains(&value) {
            return Err(Error::InvalidParameter(format!(
                "{name} {value} lies outside the landscape [{first}, {last}]"
            )));
        }
        let upper = axis.partition_point(|&v| v <= value).clamp(1, axis.len() - 1);
        let lower = upper - 1;
        let t = (value - axis[lower]) / (axis[upper] - axis[lower]);
        Ok((lower, t))
    }

    pub fn interpolate(&self, angle: f64, stretch: f64) -> Result<f64> {
        let (i, tx) = Self::bracket(&self.matrix.angles, angle, "angle")?;
        let (j, ty) = Self::bracket(&self.matrix.stretches, stretch, "stretch")?;
        let q = &self.matrix.cpa;
        let lower = q[j][i] * (1.0 - tx) + q[j][i + 1] * tx;
        let upper = q[j + 1][i] * (1.0 - tx) + q[j + 1][i + 1] * tx;
        Ok(lower * (1.0 - ty) + upper * ty)
    }
}

/// Points off the grid evaluate to NaN, which the cost searches rank as no
/// improvement. Use [`GridInterpolator::interpolate`] for a strict lookup.
impl Oracle for GridInterpolator {
    fn evaluate(&mut self, angle: f64, stretch: f64) -> Result<f64> {
        match self.interpolate(angle, stretch) {
            Err(Error::InvalidParameter(reason)) => {
                trace!(angle, stretch, %reason, "query outside the landscape");
                Ok(f64::NAN)
            }
            other => other,
        }
    }
}

/// Directory of cached landscapes keyed by fingerprint.
#[derive(Debug, Clone)]
pub struct LandscapeCache {
    dir: PathBuf,
}

impl LandscapeCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, token: &ManifoldFingerprint) -> PathBuf {
        self.dir
            .join(format!("{}.{}", token.as_hex(), CACHE_EXTENSION))
    }

    pub fn load(&self, token: &ManifoldFingerprint) -> Result<Option<CachedLandscape>> {
        let path = self.path_for(token);
        if !path.exists() {
            return Ok(None);
        }
        CachedLandscape::read(&path).map(Some)
    }

    pub fn store(&self, token: &ManifoldFingerprint, landscape: &CachedLandscape) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        landscape.write(&self.path_for(token))
    }
}

/// Returns the cached landscape for `settings`, generating and caching it on
/// a miss. The generator runs at most once per fingerprint.
pub fn load_or_build_landscape<G: LandscapeGenerator + ?Sized>(
    cache: &LandscapeCache,
    generator: &G,
    settings: &Settings,
) -> Result<CachedLandscape> {
    let token = fingerprint(settings)?;
    if let Some(landscape) = cache.load(&token)? {
        debug!(%token, cells = landscape.len(), "landscape cache hit");
        return Ok(landscape);
    }
    info!(%token, "landscape cache miss; generating");
    settings.validate()?;
    let landscape = generator.generate(settings)?;
    cache.store(&token, &landscape)?;
    info!(%token, cells = landscape.len(), path = %cache.path_for(&token).display(), "cached landscape");
    Ok(landscape)
}

/// Opens interpolating sessions over cached landscapes, generating a
/// landscape the first time its fingerprint is seen.
#[derive(Debug, Clone)]
pub struct LandscapeOracleFactory<G> {
    pub cache: LandscapeCache,
    pub generator: G,
}

impl<G: LandscapeGenerator> LandscapeOracleFactory<G> {
    pub fn new(cache: LandscapeCache, generator: G) -> Self {
        Self { cache, generator }
    }
}

impl<G: LandscapeGenerator> OracleFactory for LandscapeOracleFactory<G> {
    type Session = GridInterpolator;

    fn open(&self, settings: &Settings) -> Result<GridInterpolator> {
        load_or_build_landscape(&self.cache, &self.generator, settings)?.interpolator()
    }
}

static MAPPER_RUNS: AtomicUsize = AtomicUsize::new(0);

/// Runs an external mapper program that enumerates the whole landscape.
///
/// The program is started in a private directory holding `settings.json` and
/// is expected to leave its grid in `output_name` there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapperCommand {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    #[serde(default = "default_output_name")]
    pub output_name: String,
}

fn default_output_name() -> String {
    "solution_manifold.txt".to_string()
}

impl MapperCommand {
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            output_name: default_output_name(),
        }
    }

    fn run(&self, settings: &Settings) -> anyhow::Result<CachedLandscape> {
        let run = MAPPER_RUNS.fetch_add(1, Ordering::Relaxed);
        let dir = self
            .working_dir
            .join(format!("mapper-{}-{}", std::process::id(), run));
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating mapper directory {}", dir.display()))?;

        let result = self.run_in(&dir, settings);
        if let Err(err) = fs::remove_dir_all(&dir) {
            debug!(error = %err, dir = %dir.display(), "could not remove mapper directory");
        }
        result
    }

    fn run_in(&self, dir: &Path, settings: &Settings) -> anyhow::Result<CachedLandscape> {
        fs::write(dir.join("settings.json"), serde_json::to_string(settings)?)
            .context("writing mapper settings")?;

        let status = Command::new(&self.program)
            .args(&self.args)
            .current_dir(dir)
            .status()
            .with_context(|| format!("running mapper {}", self.program.display()))?;
        if !status.success() {
            bail!("mapper {} exited with {}", self.program.display(), status);
        }

        let output = dir.join(&self.output_name);
        let text = fs::read_to_string(&output)
            .with_context(|| format!("reading mapper output {}", output.display()))?;
        CachedLandscape::parse(&text).context("parsing mapper output")
    }
}

impl LandscapeGenerator for MapperCommand {
    fn generate(&self, settings: &Settings) -> Result<CachedLandscape> {
        Ok(self.run(settings)?)
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
