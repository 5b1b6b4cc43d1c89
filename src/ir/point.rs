//! Time points with an optional vagueness radius.

use std::cmp::Ordering;
use std::fmt;

use crate::error::PantierError;

/// A point in time, in seconds, with an optional radius of uncertainty.
///
/// Comparisons are radius-aware: two points are equal when their midpoints
/// lie within the sum of their radii. An absent radius counts as zero.
/// Radius-aware equality is not transitive; do not use points as map keys.
#[derive(Clone, Copy, Debug)]
pub struct Point {
    midpoint: f64,
    radius: Option<f64>,
}

impl Point {
    /// Creates a point, rejecting non-finite values and negative radii.
    pub fn new(midpoint: f64, radius: Option<f64>) -> Result<Self, PantierError> {
        if !midpoint.is_finite() {
            return Err(PantierError::InvalidPoint(format!(
                "midpoint {midpoint} is not finite"
            )));
        }
        if let Some(r) = radius {
            if !r.is_finite() || r < 0.0 {
                return Err(PantierError::InvalidPoint(format!(
                    "radius {r} must be a finite, non-negative number"
                )));
            }
        }
        Ok(Self { midpoint, radius })
    }

    /// Creates an exact point (no radius).
    ///
    /// Non-finite midpoints are clamped to zero; use [`Point::new`] to
    /// validate untrusted input.
    pub fn exact(midpoint: f64) -> Self {
        Self {
            midpoint: if midpoint.is_finite() { midpoint } else { 0.0 },
            radius: None,
        }
    }

    pub fn midpoint(&self) -> f64 {
        self.midpoint
    }

    pub fn radius(&self) -> Option<f64> {
        self.radius
    }

    /// Radius with the absent case folded to zero.
    pub fn margin(&self) -> f64 {
        self.radius.unwrap_or(0.0)
    }

    /// Width of the uncertainty window.
    pub fn duration(&self) -> f64 {
        2.0 * self.margin()
    }

    /// Lowest instant covered by this point's uncertainty window.
    pub fn lowest(&self) -> f64 {
        self.midpoint - self.margin()
    }

    /// Highest instant covered by this point's uncertainty window.
    pub fn highest(&self) -> f64 {
        self.midpoint + self.margin()
    }

    /// Returns a copy with a different radius.
    pub fn with_radius(self, radius: Option<f64>) -> Result<Self, PantierError> {
        Point::new(self.midpoint, radius)
    }
}

impl PartialEq for Point {
    fn eq(&self, other: &Self) -> bool {
        (self.midpoint - other.midpoint).abs() <= self.margin() + other.margin()
    }
}

impl PartialOrd for Point {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            Some(Ordering::Equal)
        } else {
            self.midpoint.partial_cmp(&other.midpoint)
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.radius {
            Some(r) => write!(f, "{}±{}", self.midpoint, r),
            None => write!(f, "{}", self.midpoint),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_aware_equality() {
        let a = Point::new(1.0, Some(0.02)).unwrap();
        let b = Point::new(1.025, Some(0.01)).unwrap();
        let c = Point::new(1.04, Some(0.01)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(Point::exact(2.0), Point::exact(2.0));
        assert_ne!(Point::exact(2.0), Point::exact(2.0001));
    }

    #[test]
    fn ordering_treats_vague_points_as_equal() {
        let a = Point::new(1.0, Some(0.1)).unwrap();
        let b = Point::new(1.05, None).unwrap();
        assert_eq!(a.partial_cmp(&b), Some(Ordering::Equal));
        assert!(Point::exact(1.0) < Point::exact(1.5));
    }

    #[test]
    fn rejects_negative_radius_and_nan() {
        assert!(Point::new(1.0, Some(-0.1)).is_err());
        assert!(Point::new(f64::NAN, None).is_err());
    }

    #[test]
    fn duration_is_twice_the_radius() {
        assert_eq!(Point::new(3.0, Some(0.25)).unwrap().duration(), 0.5);
        assert_eq!(Point::exact(3.0).duration(), 0.0);
    }
}
