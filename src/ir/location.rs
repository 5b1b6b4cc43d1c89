//! Localizations and scored alternative locations.

use std::fmt;

use super::interval::{Disjoint, Interval};
use super::point::Point;
use crate::error::PantierError;

/// The three localization variants an annotation may use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LocalizationKind {
    Point,
    Interval,
    Disjoint,
}

impl LocalizationKind {
    pub fn name(&self) -> &'static str {
        match self {
            LocalizationKind::Point => "point",
            LocalizationKind::Interval => "interval",
            LocalizationKind::Disjoint => "disjoint",
        }
    }
}

impl fmt::Display for LocalizationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Temporal placement of an annotation.
#[derive(Clone, Debug, PartialEq)]
pub enum Localization {
    Point(Point),
    Interval(Interval),
    Disjoint(Disjoint),
}

impl Localization {
    pub fn kind(&self) -> LocalizationKind {
        match self {
            Localization::Point(_) => LocalizationKind::Point,
            Localization::Interval(_) => LocalizationKind::Interval,
            Localization::Disjoint(_) => LocalizationKind::Disjoint,
        }
    }

    /// The earliest point of this localization.
    pub fn lowest(&self) -> Point {
        match self {
            Localization::Point(p) => *p,
            Localization::Interval(iv) => iv.begin(),
            Localization::Disjoint(d) => d.begin(),
        }
    }

    /// The latest point of this localization.
    pub fn highest(&self) -> Point {
        match self {
            Localization::Point(p) => *p,
            Localization::Interval(iv) => iv.end(),
            Localization::Disjoint(d) => d.end(),
        }
    }

    /// Duration value of the localization (radius window for points).
    pub fn duration(&self) -> f64 {
        match self {
            Localization::Point(p) => p.duration(),
            Localization::Interval(iv) => iv.duration().value,
            Localization::Disjoint(d) => d.duration().value,
        }
    }

    pub fn as_point(&self) -> Option<&Point> {
        match self {
            Localization::Point(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_interval(&self) -> Option<&Interval> {
        match self {
            Localization::Interval(iv) => Some(iv),
            _ => None,
        }
    }

    pub fn as_disjoint(&self) -> Option<&Disjoint> {
        match self {
            Localization::Disjoint(d) => Some(d),
            _ => None,
        }
    }
}

impl From<Point> for Localization {
    fn from(p: Point) -> Self {
        Localization::Point(p)
    }
}

impl From<Interval> for Localization {
    fn from(iv: Interval) -> Self {
        Localization::Interval(iv)
    }
}

impl From<Disjoint> for Localization {
    fn from(d: Disjoint) -> Self {
        Localization::Disjoint(d)
    }
}

/// One primary localization plus scored alternatives, all of the same kind.
#[derive(Clone, Debug, PartialEq)]
pub struct Location {
    alternatives: Vec<(Localization, Option<f64>)>,
}

impl Location {
    /// Creates a location holding a single, unscored localization.
    pub fn new(localization: impl Into<Localization>) -> Self {
        Self {
            alternatives: vec![(localization.into(), None)],
        }
    }

    /// Creates a location from scored alternatives (first = primary).
    pub fn with_alternatives(
        alternatives: Vec<(Localization, Option<f64>)>,
    ) -> Result<Self, PantierError> {
        let Some((first, _)) = alternatives.first() else {
            return Err(PantierError::EmptyLocation(
                "no localization given".to_string(),
            ));
        };
        let kind = first.kind();
        if let Some((other, _)) = alternatives.iter().find(|(l, _)| l.kind() != kind) {
            return Err(PantierError::EmptyLocation(format!(
                "mixed {} and {} alternatives",
                kind,
                other.kind()
            )));
        }
        Ok(Self { alternatives })
    }

    /// Adds an alternative localization; it must share the primary's kind.
    pub fn add_alternative(
        &mut self,
        localization: impl Into<Localization>,
        score: Option<f64>,
    ) -> Result<(), PantierError> {
        let localization = localization.into();
        if localization.kind() != self.kind() {
            return Err(PantierError::EmptyLocation(format!(
                "cannot mix {} and {} alternatives",
                self.kind(),
                localization.kind()
            )));
        }
        self.alternatives.push((localization, score));
        Ok(())
    }

    pub fn kind(&self) -> LocalizationKind {
        self.alternatives[0].0.kind()
    }

    pub fn alternatives(&self) -> &[(Localization, Option<f64>)] {
        &self.alternatives
    }

    pub fn len(&self) -> usize {
        self.alternatives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alternatives.is_empty()
    }

    /// The primary localization (first declared).
    pub fn primary(&self) -> &Localization {
        &self.alternatives[0].0
    }

    /// The highest-scored localization, or the primary when none is scored.
    ///
    /// Ties keep declaration order.
    pub fn best(&self) -> &Localization {
        let mut best: Option<(&Localization, f64)> = None;
        for (loc, score) in &self.alternatives {
            if let Some(s) = score {
                match best {
                    Some((_, b)) if *s <= b => {}
                    _ => best = Some((loc, *s)),
                }
            }
        }
        best.map(|(loc, _)| loc).unwrap_or_else(|| self.primary())
    }

    /// Lowest point over all alternatives.
    pub fn lowest(&self) -> Point {
        self.alternatives
            .iter()
            .map(|(l, _)| l.lowest())
            .fold(self.primary().lowest(), |acc, p| {
                if p.midpoint() < acc.midpoint() {
                    p
                } else {
                    acc
                }
            })
    }

    /// Highest point over all alternatives.
    pub fn highest(&self) -> Point {
        self.alternatives
            .iter()
            .map(|(l, _)| l.highest())
            .fold(self.primary().highest(), |acc, p| {
                if p.midpoint() > acc.midpoint() {
                    p
                } else {
                    acc
                }
            })
    }
}

impl From<Localization> for Location {
    fn from(localization: Localization) -> Self {
        Location::new(localization)
    }
}

impl From<Point> for Location {
    fn from(p: Point) -> Self {
        Location::new(p)
    }
}

impl From<Interval> for Location {
    fn from(iv: Interval) -> Self {
        Location::new(iv)
    }
}
