use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{mean_abs_score, rank, CostResult, Transform};
use crate::error::{Error, Result};
use crate::geometry::{translate, Point};
use crate::optimize::{basin_hopping, nelder_mead, BasinHoppingSettings, NelderMeadSettings};
use crate::search::{search_points, SearchSettings};
use crate::traits::Oracle;

/// Grid-seeded local descent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntelligentSettings {
    pub search: SearchSettings,
    pub local: NelderMeadSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ToleranceStrategy {
    BasinHopping(BasinHoppingSettings),
    Intelligent(IntelligentSettings),
}

impl Default for ToleranceStrategy {
    fn default() -> Self {
        ToleranceStrategy::BasinHopping(BasinHoppingSettings::default())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToleranceSettings {
    pub strategy: ToleranceStrategy,
}

fn to_point(x: &DVector<f64>) -> Point {
    Point::new(x[0], x[1])
}

fn to_vector(p: Point) -> DVector<f64> {
    DVector::from_vec(vec![p.x, p.y])
}

/// Finds the uniform translation of `points` that minimizes the mean
/// absolute oracle score.
///
/// The zero shift is always a candidate, so `final_score <= initial_score`
/// whenever the baseline is a number.
pub fn tolerance_cost<O: Oracle + ?Sized>(
    points: &[Point],
    oracle: &mut O,
    settings: &ToleranceSettings,
) -> Result<CostResult> {
    if points.is_empty() {
        return Err(Error::EmptyInput("tolerance cost needs at least one point"));
    }
    let initial_score = mean_abs_score(oracle, points)?;
    let mut shifted_score = |shift: Point| mean_abs_score(oracle, &translate(points, shift));

    let mut best = (Point::default(), rank(initial_score));
    let mut consider = |shift: Point, value: f64| {
        if rank(value) < best.1 {
            best = (shift, rank(value));
        }
    };

    let description = match &settings.strategy {
        ToleranceStrategy::BasinHopping(hopping) => {
            let mut objective = |x: &DVector<f64>| shifted_score(to_point(x));
            let result = basin_hopping(&mut objective, &DVector::zeros(2), hopping)?;
            consider(to_point(&result.best.x), result.best.value);
            format!(
                "basin hopping: {} local searches, {} accepted",
                result.local_searches, result.accepted
            )
        }
        ToleranceStrategy::Intelligent(intelligent) => {
            let seeds = search_points(&mut shifted_score, &intelligent.search)?;
            let seed_count = seeds.len().min(intelligent.search.max_seeds);
            for seed in seeds.iter().take(seed_count) {
                consider(seed.point, seed.score);
                let mut objective = |x: &DVector<f64>| shifted_score(to_point(x));
                let local = nelder_mead(&mut objective, &to_vector(seed.point), &intelligent.local)?;
                consider(to_point(&local.x), local.value);
            }
            format!("intelligent search: {seed_count} seeds")
        }
    };

    let (shift, final_score) = if best.1 < rank(initial_score) {
        best
    } else {
        (Point::default(), initial_score)
    };
    let result = CostResult::new(
        initial_score,
        final_score,
        Transform::Shift(shift),
        translate(points, shift),
        format!("tolerance cost ({description})"),
    );
    info!(
        initial = result.initial_score,
        final_score = result.final_score,
        cost = result.cost,
        shift_angle = shift.x,
        shift_stretch = shift.y,
        "tolerance cost"
    );
    Ok(result)
}
