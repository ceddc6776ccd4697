//! Point and vector arithmetic used by the cost algorithms.
//!
//! Release points live in the (angle, stretch) plane and are represented as
//! [`Point`], which implements [`Vector`] for length, distance, unit vectors
//! and the centroid of a point set.

use std::ops::{Add, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Common arithmetic for fixed-dimension Euclidean vectors.
pub trait Vector:
    Copy + Add<Output = Self> + Sub<Output = Self> + Mul<f64, Output = Self>
{
    fn zero() -> Self;

    fn dot(&self, other: &Self) -> f64;

    fn length(&self) -> f64 {
        self.dot(self).sqrt()
    }

    fn distance_to(&self, other: &Self) -> f64 {
        (*self - *other).length()
    }

    fn scale(&self, factor: f64) -> Self {
        *self * factor
    }

    /// Returns the vector of length one pointing the same way.
    fn unit(&self) -> Result<Self> {
        let length = self.length();
        if length == 0.0 || !length.is_finite() {
            return Err(Error::DegenerateVector);
        }
        Ok(*self * (1.0 / length))
    }
}

/// A point in the (angle, stretch) release plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn angle(&self) -> f64 {
        self.x
    }

    pub fn stretch(&self) -> f64 {
        self.y
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;
    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Point {
    type Output = Point;
    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

impl Vector for Point {
    fn zero() -> Self {
        Point::new(0.0, 0.0)
    }

    fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    // hypot avoids overflow for large magnitudes
    fn length(&self) -> f64 {
        self.x.hypot(self.y)
    }
}

/// Mean position of a point set.
///
/// Accumulates in a compensated (Kahan) sum so the result does not depend
/// noticeably on input order.
pub fn centroid<V: Vector>(points: &[V]) -> Result<V> {
    if points.is_empty() {
        return Err(Error::EmptyInput("centroid of zero points"));
    }
    let mut sum = V::zero();
    let mut compensation = V::zero();
    for &p in points {
        let y = p - compensation;
        let t = sum + y;
        compensation = (t - sum) - y;
        sum = t;
    }
    Ok(sum * (1.0 / points.len() as f64))
}

/// Translates every point by `offset`.
pub fn translate(points: &[Point], offset: Point) -> Vec<Point> {
    points.iter().map(|&p| p + offset).collect()
}

/// Moves every point radially toward `center`, keeping `factor` of its offset.
pub fn scale_about(points: &[Point], center: Point, factor: f64) -> Vec<Point> {
    points
        .iter()
        .map(|&p| center + (p - center) * factor)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn unit_has_length_one() {
        for p in [
            Point::new(3.0, 4.0),
            Point::new(-1e-3, 2e-4),
            Point::new(359.0, 1250.0),
        ] {
            let u = p.unit().expect("non-zero vector");
            assert!(close(u.length(), 1.0));
        }
    }

    #[test]
    fn unit_rejects_zero_vector() {
        assert!(matches!(Point::zero().unit(), Err(Error::DegenerateVector)));
    }

    #[test]
    fn distance_and_arithmetic() {
        let a = Point::new(1.0, 2.0);
        let b = Point::new(4.0, 6.0);
        assert!(close(a.distance_to(&b), 5.0));
        assert_eq!(a + b, Point::new(5.0, 8.0));
        assert_eq!(b - a, Point::new(3.0, 4.0));
        assert_eq!(a.scale(2.0), Point::new(2.0, 4.0));
        assert_eq!(-a, Point::new(-1.0, -2.0));
    }

    #[test]
    fn centroid_of_single_point_is_that_point() {
        let p = Point::new(12.5, -3.25);
        assert_eq!(centroid(&[p]).expect("one point"), p);
    }

    #[test]
    fn centroid_is_order_independent() {
        let points = vec![
            Point::new(0.1, 300.0),
            Point::new(45.7, 12.0),
            Point::new(359.9, 0.003),
            Point::new(-12.0, 77.7),
        ];
        let forward = centroid(&points).expect("centroid");
        let mut reversed = points.clone();
        reversed.reverse();
        let backward = centroid(&reversed).expect("centroid");
        assert!((forward.x - backward.x).abs() < 1e-12);
        assert!((forward.y - backward.y).abs() < 1e-12);
    }

    #[test]
    fn centroid_rejects_empty_input() {
        assert!(matches!(
            centroid::<Point>(&[]),
            Err(Error::EmptyInput(_))
        ));
    }

    #[test]
    fn scale_about_keeps_center() {
        let points = vec![Point::new(0.0, 0.0), Point::new(2.0, 2.0)];
        let center = Point::new(1.0, 1.0);
        assert_eq!(scale_about(&points, center, 0.0), vec![center, center]);
        assert_eq!(scale_about(&points, center, 1.0), points);
        assert_eq!(
            translate(&points, Point::new(-1.0, 0.5)),
            vec![Point::new(-1.0, 0.5), Point::new(1.0, 2.5)]
        );
    }
}
