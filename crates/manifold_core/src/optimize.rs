//! Derivative-free minimization for black-box objectives.
//!
//! [`nelder_mead`] is the downhill simplex method; [`basin_hopping`] wraps it in
//! a perturb-then-descend global search with Metropolis acceptance that keeps
//! the best local minimum seen.

use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NelderMeadSettings {
    pub max_iterations: usize,
    pub max_evaluations: usize,
    /// Convergence threshold on the simplex diameter.
    pub xatol: f64,
    /// Convergence threshold on the spread of objective values.
    pub fatol: f64,
    /// Relative offset of the initial simplex vertices from a non-zero start.
    pub initial_step: f64,
    /// Absolute offset used for start coordinates that are exactly zero.
    pub zero_step: f64,
}

impl Default for NelderMeadSettings {
    fn default() -> Self {
        Self {
            max_iterations: 400,
            max_evaluations: 400,
            xatol: 1e-4,
            fatol: 1e-4,
            initial_step: 0.05,
            zero_step: 0.00025,
        }
    }
}

impl NelderMeadSettings {
    fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 || self.max_evaluations == 0 {
            return Err(Error::InvalidParameter(
                "Nelder-Mead iteration and evaluation limits must be positive".into(),
            ));
        }
        if !(self.xatol > 0.0 && self.fatol > 0.0) {
            return Err(Error::InvalidParameter(
                "Nelder-Mead tolerances must be positive".into(),
            ));
        }
        if !(self.initial_step > 0.0 && self.zero_step > 0.0) {
            return Err(Error::InvalidParameter(
                "Nelder-Mead initial steps must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub x: DVector<f64>,
    pub value: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub converged: bool,
}

/// NaN means "no improvement", never "better".
fn sanitize(value: f64) -> f64 {
    if value.is_nan() {
        f64::INFINITY
    } else {
        value
    }
}

struct Counted<'a, F> {
    objective: &'a mut F,
    evaluations: usize,
}

impl<F> Counted<'_, F>
where
    F: FnMut(&DVector<f64>) -> Result<f64>,
{
    fn eval(&mut self, x: &DVector<f64>) -> Result<f64> {
        self.evaluations += 1;
        Ok(sanitize((self.objective)(x)?))
    }
}

pub fn nelder_mead<F>(
    objective: &mut F,
    x0: &DVector<f64>,
    settings: &NelderMeadSettings,
) -> Result<Minimum>
where
    F: FnMut(&DVector<f64>) -> Result<f64>,
{
    settings.validate()?;
    let n = x0.len();
    if n == 0 {
        return Err(Error::InvalidParameter(
            "cannot minimize over zero dimensions".into(),
        ));
    }

    let mut f = Counted {
        objective,
        evaluations: 0,
    };
    let mut simplex: Vec<(DVector<f64>, f64)> = Vec::with_capacity(n + 1);
    simplex.push((x0.clone(), f.eval(x0)?));
    for k in 0..n {
        let mut vertex = x0.clone();
        if vertex[k] != 0.0 {
            vertex[k] *= 1.0 + settings.initial_step;
        } else {
            vertex[k] = settings.zero_step;
        }
        let value = f.eval(&vertex)?;
        simplex.push((vertex, value));
    }

    let mut iterations = 0usize;
    let mut converged = false;
    loop {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));

        let best = &simplex[0];
        let x_spread = simplex[1..]
            .iter()
            .map(|(x, _)| (x - &best.0).amax())
            .fold(0.0, f64::max);
        let f_spread = simplex[1..]
            .iter()
            .map(|(_, v)| sanitize((v - best.1).abs()))
            .fold(0.0, f64::max);
        // an infinite best vertex never counts as converged
        if best.1.is_finite() && x_spread <= settings.xatol && f_spread <= settings.fatol {
            converged = true;
            break;
        }
        if iterations >= settings.max_iterations || f.evaluations >= settings.max_evaluations {
            break;
        }
        iterations += 1;

        let mut centroid = DVector::zeros(n);
        for (x, _) in &simplex[..n] {
            centroid += x;
        }
        centroid /= n as f64;

        let worst_value = simplex[n].1;
        let direction = &centroid - &simplex[n].0;
        let reflected = &centroid + &direction * REFLECTION;
        let f_reflected = f.eval(&reflected)?;

        if f_reflected < simplex[0].1 {
            let expanded = &centroid + &direction * (REFLECTION * EXPANSION);
            let f_expanded = f.eval(&expanded)?;
            simplex[n] = if f_expanded < f_reflected {
                (expanded, f_expanded)
            } else {
                (reflected, f_reflected)
            };
            continue;
        }
        if f_reflected < simplex[n - 1].1 {
            simplex[n] = (reflected, f_reflected);
            continue;
        }

        let shrink = if f_reflected < worst_value {
            let outside = &centroid + &direction * (CONTRACTION * REFLECTION);
            let f_outside = f.eval(&outside)?;
            if f_outside <= f_reflected {
                simplex[n] = (outside, f_outside);
                false
            } else {
                true
            }
        } else {
            let inside = &centroid - &direction * CONTRACTION;
            let f_inside = f.eval(&inside)?;
            if f_inside < worst_value {
                simplex[n] = (inside, f_inside);
                false
            } else {
                true
            }
        };

        if shrink {
            let anchor = simplex[0].0.clone();
            for vertex in simplex.iter_mut().skip(1) {
                let x = &anchor + (&vertex.0 - &anchor) * SHRINK;
                let value = f.eval(&x)?;
                *vertex = (x, value);
            }
        }
    }

    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
    let (x, value) = simplex.swap_remove(0);
    Ok(Minimum {
        x,
        value,
        iterations,
        evaluations: f.evaluations,
        converged,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasinHoppingSettings {
    /// Perturb-and-descend rounds after the initial descent.
    pub iterations: usize,
    /// Half-width of the uniform random displacement per coordinate.
    pub step_size: f64,
    /// Metropolis temperature; zero accepts only improvements.
    pub temperature: f64,
    pub seed: u64,
    pub local: NelderMeadSettings,
}

impl Default for BasinHoppingSettings {
    fn default() -> Self {
        Self {
            iterations: 50,
            step_size: 0.5,
            temperature: 1.0,
            seed: 0,
            local: NelderMeadSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasinHoppingResult {
    pub best: Minimum,
    pub accepted: usize,
    pub local_searches: usize,
    pub evaluations: usize,
}

pub fn basin_hopping<F>(
    objective: &mut F,
    x0: &DVector<f64>,
    settings: &BasinHoppingSettings,
) -> Result<BasinHoppingResult>
where
    F: FnMut(&DVector<f64>) -> Result<f64>,
{
    if !(settings.step_size > 0.0) || !settings.step_size.is_finite() {
        return Err(Error::InvalidParameter(
            "basin hopping step size must be positive".into(),
        ));
    }
    if !(settings.temperature >= 0.0) {
        return Err(Error::InvalidParameter(
            "basin hopping temperature must be non-negative".into(),
        ));
    }

    let mut rng = StdRng::seed_from_u64(settings.seed);
    let mut current = nelder_mead(objective, x0, &settings.local)?;
    let mut evaluations = current.evaluations;
    let mut best = current.clone();
    let mut accepted = 0usize;

    for round in 0..settings.iterations {
        let mut start = current.x.clone();
        for coord in start.iter_mut() {
            *coord += rng.gen_range(-settings.step_size..=settings.step_size);
        }
        let candidate = nelder_mead(objective, &start, &settings.local)?;
        evaluations += candidate.evaluations;

        let accept = if candidate.value < current.value {
            true
        } else if settings.temperature > 0.0 {
            let p = (-(candidate.value - current.value) / settings.temperature).exp();
            rng.gen::<f64>() < p
        } else {
            false
        };
        if candidate.value < best.value {
            best = candidate.clone();
        }
        debug!(
            round,
            value = candidate.value,
            best = best.value,
            accept,
            "basin hopping step"
        );
        if accept {
            accepted += 1;
            current = candidate;
        }
    }

    Ok(BasinHoppingResult {
        best,
        accepted,
        local_searches: settings.iterations + 1,
        evaluations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quadratic(center: (f64, f64)) -> impl FnMut(&DVector<f64>) -> Result<f64> {
        move |x| Ok((x[0] - center.0).powi(2) + 3.0 * (x[1] - center.1).powi(2))
    }

    #[test]
    fn nelder_mead_finds_quadratic_minimum() {
        let mut f = quadratic((1.5, -2.0));
        let settings = NelderMeadSettings {
            max_iterations: 2000,
            max_evaluations: 4000,
            xatol: 1e-8,
            fatol: 1e-10,
            ..NelderMeadSettings::default()
        };
        let min = nelder_mead(&mut f, &DVector::from_vec(vec![0.0, 0.0]), &settings)
            .expect("minimize");
        assert!(min.converged);
        assert!((min.x[0] - 1.5).abs() < 1e-4);
        assert!((min.x[1] + 2.0).abs() < 1e-4);
        assert!(min.value < 1e-8);
    }

    #[test]
    fn nelder_mead_never_worse_than_start() {
        let mut f = |x: &DVector<f64>| Ok((x[0] * 3.0).sin() + (x[1] * 2.0).cos());
        let x0 = DVector::from_vec(vec![0.3, -0.7]);
        let start = (0.9f64).sin() + (-1.4f64).cos();
        let min = nelder_mead(&mut f, &x0, &NelderMeadSettings::default()).expect("minimize");
        assert!(min.value <= start);
    }

    #[test]
    fn nelder_mead_treats_nan_as_no_improvement() {
        let mut f = |x: &DVector<f64>| {
            if x[0] > 0.5 {
                Ok(f64::NAN)
            } else {
                Ok((x[0] - 0.2).powi(2) + x[1].powi(2))
            }
        };
        let min = nelder_mead(
            &mut f,
            &DVector::from_vec(vec![0.0, 0.1]),
            &NelderMeadSettings::default(),
        )
        .expect("minimize");
        assert!(min.value.is_finite());
        assert!(min.x[0] <= 0.5);
    }

    #[test]
    fn nelder_mead_propagates_objective_errors() {
        let mut f = |_: &DVector<f64>| -> Result<f64> { Err(Error::SessionClosed) };
        assert!(matches!(
            nelder_mead(&mut f, &DVector::from_vec(vec![0.0]), &NelderMeadSettings::default()),
            Err(Error::SessionClosed)
        ));
    }

    #[test]
    fn nelder_mead_rejects_invalid_settings() {
        let mut f = quadratic((0.0, 0.0));
        let x0 = DVector::from_vec(vec![0.0, 0.0]);
        let bad = NelderMeadSettings {
            xatol: 0.0,
            ..NelderMeadSettings::default()
        };
        assert!(matches!(
            nelder_mead(&mut f, &x0, &bad),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            nelder_mead(&mut f, &DVector::zeros(0), &NelderMeadSettings::default()),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn basin_hopping_escapes_local_minimum() {
        // Shallow well at 0, deep well at 3 along the first axis.
        let mut f = |x: &DVector<f64>| {
            let shallow = -0.5 * (-(x[0].powi(2) + x[1].powi(2)) * 4.0).exp();
            let deep = -2.0 * (-((x[0] - 3.0).powi(2) + x[1].powi(2))).exp();
            Ok(shallow + deep)
        };
        let settings = BasinHoppingSettings {
            iterations: 80,
            step_size: 2.0,
            seed: 7,
            ..BasinHoppingSettings::default()
        };
        let result = basin_hopping(&mut f, &DVector::from_vec(vec![0.0, 0.0]), &settings)
            .expect("basin hopping");
        assert!((result.best.x[0] - 3.0).abs() < 0.05);
        assert!(result.best.value < -1.9);
        assert_eq!(result.local_searches, 81);
    }

    #[test]
    fn basin_hopping_is_deterministic_for_a_seed() {
        let run = || {
            let mut f = quadratic((0.4, 0.1));
            basin_hopping(
                &mut f,
                &DVector::from_vec(vec![2.0, 2.0]),
                &BasinHoppingSettings {
                    iterations: 5,
                    ..BasinHoppingSettings::default()
                },
            )
            .expect("basin hopping")
        };
        let a = run();
        let b = run();
        assert_eq!(a.best.x, b.best.x);
        assert_eq!(a.evaluations, b.evaluations);
    }
}
