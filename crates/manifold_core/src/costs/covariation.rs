use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{rank, CostResult, Transform};
use crate::error::{Error, Result};
use crate::geometry::Point;
use crate::traits::Oracle;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CovariationSettings {
    /// Upper bound on swap passes; the search normally stops well before.
    pub max_passes: usize,
}

impl Default for CovariationSettings {
    fn default() -> Self {
        Self { max_passes: 10_000 }
    }
}

#[derive(Debug, Clone, Copy)]
struct Pairing {
    slot: usize,
    angle: f64,
    stretch: f64,
    stretch_from: usize,
    score: f64,
}

fn abs_score<O: Oracle + ?Sized>(oracle: &mut O, angle: f64, stretch: f64) -> Result<f64> {
    Ok(oracle.evaluate(angle, stretch)?.abs())
}

fn mean(pairings: &[Pairing]) -> f64 {
    pairings.iter().map(|p| p.score).sum::<f64>() / pairings.len() as f64
}

/// Re-pairs angles with stretches by greedy pairwise swaps until no swap
/// lowers the summed score of the two points involved.
///
/// Angles keep their input order; only stretches move, so both value
/// multisets are preserved. Every pass rescans all pairs, so the result is a
/// local optimum under single swaps.
pub fn covariation_cost<O: Oracle + ?Sized>(
    points: &[Point],
    oracle: &mut O,
    settings: &CovariationSettings,
) -> Result<CostResult> {
    if points.is_empty() {
        return Err(Error::EmptyInput("covariation cost needs at least one point"));
    }
    if settings.max_passes == 0 {
        return Err(Error::InvalidParameter(
            "covariation cost needs at least one pass".into(),
        ));
    }

    let mut pairings = Vec::with_capacity(points.len());
    for (slot, point) in points.iter().enumerate() {
        pairings.push(Pairing {
            slot,
            angle: point.x,
            stretch: point.y,
            stretch_from: slot,
            score: abs_score(oracle, point.x, point.y)?,
        });
    }
    let initial_score = mean(&pairings);

    let mut converged = false;
    let mut passes = 0usize;
    while passes < settings.max_passes {
        passes += 1;
        // Worst last; the outer walk starts there and moves toward the best.
        pairings.sort_by(|a, b| rank(a.score).total_cmp(&rank(b.score)));
        let mut profitable = 0usize;
        for i in (1..pairings.len()).rev() {
            for j in 0..i {
                let (a, b) = (pairings[i], pairings[j]);
                let a_swapped = abs_score(oracle, a.angle, b.stretch)?;
                let b_swapped = abs_score(oracle, b.angle, a.stretch)?;
                if rank(a_swapped) + rank(b_swapped) < rank(a.score) + rank(b.score) {
                    pairings[i].stretch = b.stretch;
                    pairings[i].stretch_from = b.stretch_from;
                    pairings[i].score = a_swapped;
                    pairings[j].stretch = a.stretch;
                    pairings[j].stretch_from = a.stretch_from;
                    pairings[j].score = b_swapped;
                    profitable += 1;
                }
            }
        }
        debug!(pass = passes, profitable, "covariation pass");
        if profitable == 0 {
            converged = true;
            break;
        }
    }
    if !converged {
        warn!(
            max_passes = settings.max_passes,
            "covariation search stopped before reaching a fixed point"
        );
    }

    pairings.sort_by_key(|p| p.slot);
    let final_score = mean(&pairings);
    let result = CostResult::new(
        initial_score,
        final_score,
        Transform::Pairing(pairings.iter().map(|p| p.stretch_from).collect()),
        pairings
            .iter()
            .map(|p| Point::new(p.angle, p.stretch))
            .collect(),
        format!("covariation cost after {passes} passes"),
    );
    info!(
        initial = result.initial_score,
        final_score = result.final_score,
        cost = result.cost,
        passes,
        "covariation cost"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::session::FnOracle;

    fn sorted(mut values: Vec<f64>) -> Vec<f64> {
        values.sort_by(f64::total_cmp);
        values
    }

    #[test]
    fn swaps_a_mismatched_pair() {
        let points = [Point::new(1.0, 10.0), Point::new(10.0, 1.0)];
        let mut oracle = FnOracle::new(|a, s| a - s);
        let result = covariation_cost(&points, &mut oracle, &CovariationSettings::default())
            .expect("covariation");
        assert_eq!(result.initial_score, 9.0);
        assert_eq!(result.final_score, 0.0);
        assert!(result.cost > 0.0);
        assert_eq!(
            result.shifted_points,
            vec![Point::new(1.0, 1.0), Point::new(10.0, 10.0)]
        );
        assert_eq!(result.transform, Transform::Pairing(vec![1, 0]));
    }

    #[test]
    fn optimal_pairing_is_left_alone() {
        let points = [Point::new(1.0, 1.0), Point::new(10.0, 10.0)];
        let mut oracle = FnOracle::new(|a, s| a - s);
        let result = covariation_cost(&points, &mut oracle, &CovariationSettings::default())
            .expect("covariation");
        assert_eq!(result.cost, 0.0);
        assert_eq!(result.shifted_points, points.to_vec());
        assert_eq!(result.transform, Transform::Pairing(vec![0, 1]));
    }

    fn scattered() -> Vec<Point> {
        (0..9)
            .map(|k| {
                let k = k as f64;
                Point::new(20.0 + 7.3 * k % 23.0, 0.5 + (3.1 * k) % 2.2)
            })
            .collect()
    }

    fn bumpy(a: f64, s: f64) -> f64 {
        (a / 4.0).sin() * 10.0 + (s * 2.0).cos() * 6.0 - s * 2.0
    }

    #[test]
    fn preserves_value_multisets() {
        let points = scattered();
        let mut oracle = FnOracle::new(bumpy);
        let result = covariation_cost(&points, &mut oracle, &CovariationSettings::default())
            .expect("covariation");
        let angles = |ps: &[Point]| sorted(ps.iter().map(|p| p.x).collect());
        let stretches = |ps: &[Point]| sorted(ps.iter().map(|p| p.y).collect());
        assert_eq!(angles(&result.shifted_points), angles(&points));
        assert_eq!(stretches(&result.shifted_points), stretches(&points));
        // Angles stay where they were; only the pairing changes.
        for (before, after) in points.iter().zip(&result.shifted_points) {
            assert_eq!(before.x, after.x);
        }
        let Transform::Pairing(pairing) = &result.transform else {
            panic!("expected a pairing");
        };
        for (slot, from) in pairing.iter().enumerate() {
            assert_eq!(result.shifted_points[slot].y, points[*from].y);
        }
        assert!(result.final_score <= result.initial_score);
    }

    #[test]
    fn output_is_a_fixed_point() {
        let points = scattered();
        let mut oracle = FnOracle::new(bumpy);
        let first = covariation_cost(&points, &mut oracle, &CovariationSettings::default())
            .expect("first");
        let second = covariation_cost(
            &first.shifted_points,
            &mut oracle,
            &CovariationSettings::default(),
        )
        .expect("second");
        assert_eq!(second.cost, 0.0);
        assert_eq!(second.shifted_points, first.shifted_points);
        assert_eq!(second.initial_score, first.final_score);
    }

    #[test]
    fn rejects_bad_input() {
        let mut oracle = FnOracle::new(bumpy);
        assert!(matches!(
            covariation_cost(&[], &mut oracle, &CovariationSettings::default()),
            Err(Error::EmptyInput(_))
        ));
        assert!(matches!(
            covariation_cost(
                &[Point::new(1.0, 1.0)],
                &mut oracle,
                &CovariationSettings { max_passes: 0 }
            ),
            Err(Error::InvalidParameter(_))
        ));
    }
}
