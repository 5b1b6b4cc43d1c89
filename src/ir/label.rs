//! Labels: scored alternative tags.

use super::tag::Tag;

/// An ordered, never-empty set of alternative tags with optional scores.
///
/// Scores are alternative-hypothesis confidences; they need not sum to 1.
#[derive(Clone, Debug, PartialEq)]
pub struct Label {
    alternatives: Vec<(Tag, Option<f64>)>,
}

impl Label {
    /// Creates a label holding a single, unscored tag.
    pub fn new(tag: impl Into<Tag>) -> Self {
        Self {
            alternatives: vec![(tag.into(), None)],
        }
    }

    /// Creates a label holding a single scored tag.
    pub fn scored(tag: impl Into<Tag>, score: f64) -> Self {
        Self {
            alternatives: vec![(tag.into(), Some(score))],
        }
    }

    /// Builds a label from alternatives; duplicates are dropped.
    ///
    /// Returns `None` when no alternative is given.
    pub fn from_alternatives(
        alternatives: impl IntoIterator<Item = (Tag, Option<f64>)>,
    ) -> Option<Self> {
        let mut iter = alternatives.into_iter();
        let (first, score) = iter.next()?;
        let mut label = Label {
            alternatives: vec![(first, score)],
        };
        for (tag, score) in iter {
            label.add_alternative(tag, score);
        }
        Some(label)
    }

    /// Adds an alternative. Returns false if an equal tag is already present.
    pub fn add_alternative(&mut self, tag: Tag, score: Option<f64>) -> bool {
        if self.contains(&tag) {
            return false;
        }
        self.alternatives.push((tag, score));
        true
    }

    /// Removes a tag. The last remaining alternative cannot be removed.
    pub fn remove(&mut self, tag: &Tag) -> bool {
        if self.alternatives.len() < 2 {
            return false;
        }
        let before = self.alternatives.len();
        self.alternatives.retain(|(t, _)| t != tag);
        before != self.alternatives.len()
    }

    pub fn contains(&self, tag: &Tag) -> bool {
        self.alternatives.iter().any(|(t, _)| t == tag)
    }

    pub fn alternatives(&self) -> &[(Tag, Option<f64>)] {
        &self.alternatives
    }

    pub fn tags(&self) -> impl Iterator<Item = &Tag> {
        self.alternatives.iter().map(|(t, _)| t)
    }

    pub fn len(&self) -> usize {
        self.alternatives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alternatives.is_empty()
    }

    /// True when there is more than one alternative tag.
    pub fn has_alternatives(&self) -> bool {
        self.alternatives.len() > 1
    }

    /// Highest-scored tag; ties keep declaration order, unscored labels
    /// return their first tag.
    pub fn best(&self) -> &Tag {
        let mut best: Option<(&Tag, f64)> = None;
        for (tag, score) in &self.alternatives {
            if let Some(s) = score {
                match best {
                    Some((_, b)) if *s <= b => {}
                    _ => best = Some((tag, *s)),
                }
            }
        }
        best.map(|(tag, _)| tag).unwrap_or(&self.alternatives[0].0)
    }

    /// Score of the best tag, if any.
    pub fn best_score(&self) -> Option<f64> {
        let best = self.best();
        self.alternatives
            .iter()
            .find(|(t, _)| std::ptr::eq(t, best))
            .and_then(|(_, s)| *s)
    }

    /// True if every alternative is an empty string tag.
    pub fn is_blank(&self) -> bool {
        self.alternatives.iter().all(|(t, _)| t.is_empty())
    }
}

impl From<Tag> for Label {
    fn from(tag: Tag) -> Self {
        Label::new(tag)
    }
}

impl From<&str> for Label {
    fn from(content: &str) -> Self {
        Label::new(Tag::text(content))
    }
}
