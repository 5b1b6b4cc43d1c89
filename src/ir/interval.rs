//! Interval and disjoint-interval localizations.

use std::fmt;

use super::point::Point;
use crate::error::PantierError;

/// A duration together with its uncertainty margin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Duration {
    pub value: f64,
    pub margin: f64,
}

impl Duration {
    pub fn new(value: f64, margin: f64) -> Self {
        Self { value, margin }
    }
}

/// An ordered pair of points, `begin <= end` under radius-aware comparison.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Interval {
    begin: Point,
    end: Point,
}

impl Interval {
    /// Creates an interval, failing if `end` comes before `begin`.
    ///
    /// Zero-width intervals are accepted.
    pub fn new(begin: Point, end: Point) -> Result<Self, PantierError> {
        if end < begin {
            return Err(PantierError::InvalidRange {
                begin: begin.midpoint(),
                end: end.midpoint(),
            });
        }
        Ok(Self { begin, end })
    }

    /// Convenience constructor from exact times in seconds.
    pub fn from_secs(begin: f64, end: f64) -> Result<Self, PantierError> {
        Interval::new(Point::new(begin, None)?, Point::new(end, None)?)
    }

    pub fn begin(&self) -> Point {
        self.begin
    }

    pub fn end(&self) -> Point {
        self.end
    }

    pub fn duration(&self) -> Duration {
        Duration::new(
            self.end.midpoint() - self.begin.midpoint(),
            self.begin.margin() + self.end.margin(),
        )
    }

    /// True if `point` lies between begin and end (bounds included).
    pub fn contains_point(&self, point: &Point) -> bool {
        self.begin <= *point && *point <= self.end
    }

    /// True if `other` lies entirely within this interval.
    pub fn contains(&self, other: &Interval) -> bool {
        self.begin <= other.begin && other.end <= self.end
    }

    /// True if the two intervals share more than a boundary.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.begin < other.end && other.begin < self.end
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.begin, self.end)
    }
}

/// A non-empty set of intervals, kept in the order they were given.
#[derive(Clone, Debug, PartialEq)]
pub struct Disjoint {
    intervals: Vec<Interval>,
}

impl Disjoint {
    pub fn new(intervals: Vec<Interval>) -> Result<Self, PantierError> {
        if intervals.is_empty() {
            return Err(PantierError::EmptyLocation(
                "a disjoint localization needs at least one interval".to_string(),
            ));
        }
        Ok(Self { intervals })
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    /// The earliest begin over all member intervals.
    pub fn begin(&self) -> Point {
        self.intervals
            .iter()
            .map(Interval::begin)
            .fold(self.intervals[0].begin(), |acc, p| {
                if p.midpoint() < acc.midpoint() {
                    p
                } else {
                    acc
                }
            })
    }

    /// The latest end over all member intervals.
    pub fn end(&self) -> Point {
        self.intervals
            .iter()
            .map(Interval::end)
            .fold(self.intervals[0].end(), |acc, p| {
                if p.midpoint() > acc.midpoint() {
                    p
                } else {
                    acc
                }
            })
    }

    pub fn duration(&self) -> Duration {
        self.intervals
            .iter()
            .map(Interval::duration)
            .fold(Duration::new(0.0, 0.0), |acc, d| {
                Duration::new(acc.value + d.value, acc.margin + d.margin)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_reversed_bounds() {
        let err = Interval::from_secs(2.0, 1.0).unwrap_err();
        assert!(matches!(err, PantierError::InvalidRange { .. }));
    }

    #[test]
    fn accepts_reversed_bounds_within_radius() {
        let begin = Point::new(1.0, Some(0.05)).unwrap();
        let end = Point::new(0.98, Some(0.0)).unwrap();
        assert!(Interval::new(begin, end).is_ok());
    }

    #[test]
    fn duration_propagates_radius() {
        let iv = Interval::new(
            Point::new(1.0, Some(0.01)).unwrap(),
            Point::new(3.0, Some(0.02)).unwrap(),
        )
        .unwrap();
        let d = iv.duration();
        assert_eq!(d.value, 2.0);
        assert!((d.margin - 0.03).abs() < 1e-12);
    }

    #[test]
    fn overlap_excludes_shared_boundary() {
        let a = Interval::from_secs(0.0, 1.0).unwrap();
        let b = Interval::from_secs(1.0, 2.0).unwrap();
        let c = Interval::from_secs(0.5, 1.5).unwrap();
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(Interval::from_secs(0.0, 2.0).unwrap().contains(&c));
    }

    #[test]
    fn disjoint_bounds_and_duration() {
        let d = Disjoint::new(vec![
            Interval::from_secs(3.0, 4.0).unwrap(),
            Interval::from_secs(1.0, 1.5).unwrap(),
        ])
        .unwrap();
        assert_eq!(d.begin().midpoint(), 1.0);
        assert_eq!(d.end().midpoint(), 4.0);
        assert_eq!(d.duration().value, 1.5);
        assert!(Disjoint::new(vec![]).is_err());
    }
}
