use serde::{Deserialize, Serialize};
use tracing::info;

use super::{mean_abs_score, rank, CostResult, Transform};
use crate::error::{Error, Result};
use crate::geometry::{centroid, scale_about, Point};
use crate::traits::Oracle;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseSettings {
    /// Evenly spaced dispersion factors sampled in `[0, 1]`, endpoints included.
    pub steps: usize,
}

impl Default for NoiseSettings {
    fn default() -> Self {
        Self { steps: 100 }
    }
}

/// The dispersion factors sampled for `steps`, ascending.
pub fn noise_scales(steps: usize) -> impl Iterator<Item = f64> {
    let last = steps.saturating_sub(1).max(1) as f64;
    (0..steps).map(move |k| k as f64 / last)
}

/// Shrinks the distribution toward its centroid and reports the best mean
/// score over the sampled dispersion factors.
///
/// `initial_score` is the unscaled distribution (factor 1), which is also
/// sampled, so the result never regresses. Ties go to the smallest factor.
pub fn noise_cost<O: Oracle + ?Sized>(
    points: &[Point],
    oracle: &mut O,
    settings: &NoiseSettings,
) -> Result<CostResult> {
    if settings.steps < 2 {
        return Err(Error::InvalidParameter(
            "noise cost needs at least two scale steps".into(),
        ));
    }
    let center = centroid(points)?;

    let mut initial_score = f64::NAN;
    let mut best: Option<(f64, f64, Vec<Point>)> = None;
    for (k, scale) in noise_scales(settings.steps).enumerate() {
        let scaled = if k + 1 == settings.steps {
            points.to_vec()
        } else {
            scale_about(points, center, scale)
        };
        let score = mean_abs_score(oracle, &scaled)?;
        if k + 1 == settings.steps {
            initial_score = score;
        }
        let improves = match &best {
            Some((_, best_score, _)) => rank(score) < rank(*best_score),
            None => true,
        };
        if improves {
            best = Some((scale, score, scaled));
        }
    }

    let (scale, final_score, shifted_points) =
        best.ok_or(Error::EmptyInput("no noise scales were sampled"))?;

    let result = CostResult::new(
        initial_score,
        final_score,
        Transform::Scale(scale),
        shifted_points,
        format!("noise cost over {} scales", settings.steps),
    );
    info!(
        initial = result.initial_score,
        final_score = result.final_score,
        cost = result.cost,
        scale,
        "noise cost"
    );
    Ok(result)
}
