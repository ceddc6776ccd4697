//! Adaptive search-point generation.
//!
//! A coarse grid over the shift space is scored once, everything within
//! `threshold` of the best cell is kept, and the survivors are refined by
//! repeatedly halving a local offset and probing six hexagonal neighbours
//! around each retained point. The result seeds local descent without a
//! dense scan of the whole plane.

use std::collections::HashSet;
use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::geometry::Point;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Grid samples per axis.
    pub resolution: usize,
    /// Shifts span `[-angle_extent, angle_extent]` on the angle axis.
    pub angle_extent: f64,
    /// Shifts span `[-stretch_extent, stretch_extent]` on the stretch axis.
    pub stretch_extent: f64,
    /// Keep points scoring at most this far above the best score.
    pub threshold: f64,
    pub refinement_rounds: usize,
    /// Positions closer than this on both axes count as the same point.
    pub quantum: f64,
    pub max_points: usize,
    /// How many of the best points seed local descent.
    pub max_seeds: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            resolution: 50,
            angle_extent: 45.0,
            stretch_extent: 1.5,
            threshold: 30.0,
            refinement_rounds: 4,
            quantum: 1e-5,
            max_points: 64,
            max_seeds: 16,
        }
    }
}

impl SearchSettings {
    fn validate(&self) -> Result<()> {
        if self.resolution < 2 {
            return Err(Error::InvalidParameter(
                "search grid needs at least two samples per axis".into(),
            ));
        }
        for (name, extent) in [
            ("angle_extent", self.angle_extent),
            ("stretch_extent", self.stretch_extent),
        ] {
            if !(extent >= 0.0) || !extent.is_finite() {
                return Err(Error::InvalidParameter(format!(
                    "{name} must be finite and non-negative"
                )));
            }
        }
        if !(self.threshold >= 0.0) {
            return Err(Error::InvalidParameter(
                "search threshold must be non-negative".into(),
            ));
        }
        if !(self.quantum > 0.0) || !self.quantum.is_finite() {
            return Err(Error::InvalidParameter(
                "search quantum must be positive".into(),
            ));
        }
        if self.max_points == 0 || self.max_seeds == 0 {
            return Err(Error::InvalidParameter(
                "search must retain at least one point".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub point: Point,
    pub score: f64,
}

fn quantize(point: Point, quantum: f64) -> (i64, i64) {
    (
        (point.x / quantum).round() as i64,
        (point.y / quantum).round() as i64,
    )
}

/// Sorts ascending (stable, so earlier discoveries win ties), drops
/// everything above `best + threshold` and caps the set size.
fn prune(points: &mut Vec<ScoredPoint>, threshold: f64, cap: usize) {
    points.sort_by(|a, b| a.score.total_cmp(&b.score));
    if let Some(best) = points.first().map(|p| p.score) {
        points.retain(|p| p.score <= best + threshold);
    }
    points.truncate(cap);
}

/// Generates scored search points over the shift plane, best first.
///
/// Non-finite scores are discarded; if no grid cell scores finitely the
/// result is empty.
pub fn search_points<F>(objective: &mut F, settings: &SearchSettings) -> Result<Vec<ScoredPoint>>
where
    F: FnMut(Point) -> Result<f64>,
{
    settings.validate()?;

    let cells = (settings.resolution - 1) as f64;
    let step = Point::new(
        2.0 * settings.angle_extent / cells,
        2.0 * settings.stretch_extent / cells,
    );
    let mut seen = HashSet::new();
    let mut retained = Vec::new();

    for i in 0..settings.resolution {
        for j in 0..settings.resolution {
            let point = Point::new(
                -settings.angle_extent + i as f64 * step.x,
                -settings.stretch_extent + j as f64 * step.y,
            );
            if !seen.insert(quantize(point, settings.quantum)) {
                continue;
            }
            let score = objective(point)?;
            if score.is_finite() {
                retained.push(ScoredPoint { point, score });
            }
        }
    }
    prune(&mut retained, settings.threshold, settings.max_points);
    debug!(retained = retained.len(), "search grid scored");

    let mut offset = step;
    for round in 0..settings.refinement_rounds {
        offset = offset * 0.5;
        let mut candidates = Vec::new();
        for parent in &retained {
            for k in 0..6 {
                let theta = k as f64 * PI / 3.0;
                let point =
                    parent.point + Point::new(offset.x * theta.cos(), offset.y * theta.sin());
                if !seen.insert(quantize(point, settings.quantum)) {
                    continue;
                }
                let score = objective(point)?;
                if score.is_finite() {
                    candidates.push(ScoredPoint { point, score });
                }
            }
        }
        let probed = candidates.len();
        retained.extend(candidates);
        prune(&mut retained, settings.threshold, settings.max_points);
        debug!(
            round,
            probed,
            retained = retained.len(),
            best = retained.first().map(|p| p.score),
            "search refinement"
        );
    }

    Ok(retained)
}
