//! Tolerance, noise and covariation costs.
//!
//! Each algorithm scores a distribution of release points against an
//! [`Oracle`](crate::traits::Oracle), searches its own transformation space
//! and reports a [`CostResult`]. `cost` is always `initial_score -
//! final_score`: the improvement the transformation makes available.

pub mod covariation;
pub mod noise;
pub mod tolerance;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::Point;
use crate::traits::Oracle;

pub use covariation::{covariation_cost, CovariationSettings};
pub use noise::{noise_cost, NoiseSettings};
pub use tolerance::{tolerance_cost, IntelligentSettings, ToleranceSettings, ToleranceStrategy};

/// The transformation that produced `final_score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Transform {
    /// Uniform (angle, stretch) translation.
    Shift(Point),
    /// Dispersion factor about the centroid.
    Scale(f64),
    /// `pairing[i]` is the input index whose stretch now pairs with angle `i`.
    Pairing(Vec<usize>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostResult {
    pub cost: f64,
    pub initial_score: f64,
    pub final_score: f64,
    pub transform: Transform,
    pub shifted_points: Vec<Point>,
    pub description: String,
}

impl CostResult {
    pub fn new(
        initial_score: f64,
        final_score: f64,
        transform: Transform,
        shifted_points: Vec<Point>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            cost: initial_score - final_score,
            initial_score,
            final_score,
            transform,
            shifted_points,
            description: description.into(),
        }
    }
}

/// Mean absolute oracle score of `points`.
pub fn mean_abs_score<O: Oracle + ?Sized>(oracle: &mut O, points: &[Point]) -> Result<f64> {
    if points.is_empty() {
        return Err(Error::EmptyInput("no points to score"));
    }
    let mut total = 0.0;
    for point in points {
        total += oracle.evaluate(point.x, point.y)?.abs();
    }
    Ok(total / points.len() as f64)
}

/// NaN compares as "no better than anything".
pub(crate) fn rank(score: f64) -> f64 {
    if score.is_nan() {
        f64::INFINITY
    } else {
        score
    }
}
