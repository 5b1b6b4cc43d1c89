//! Annotations: a location, an optional label and free-form metadata.

use std::collections::BTreeMap;

use super::ids::AnnotationId;
use super::label::Label;
use super::location::Location;
use super::point::Point;

/// An annotation stored in a [`Tier`](super::Tier).
///
/// Annotations are mutated through their tier (see `Tier::set_label` and
/// `Tier::set_location`) so that the tier's constraints are re-checked.
/// Equality compares content and ignores the tier-local id.
#[derive(Clone, Debug)]
pub struct Annotation {
    pub(crate) id: AnnotationId,
    location: Location,
    label: Option<Label>,
    /// Free-form key/value metadata.
    pub metadata: BTreeMap<String, String>,
}

impl Annotation {
    /// Creates a detached annotation; its id is assigned when added to a tier.
    pub fn new(location: impl Into<Location>, label: Option<Label>) -> Self {
        Self {
            id: AnnotationId::new(0),
            location: location.into(),
            label,
            metadata: BTreeMap::new(),
        }
    }

    /// Adds a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> AnnotationId {
        self.id
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn label(&self) -> Option<&Label> {
        self.label.as_ref()
    }

    /// Content of the best tag, or an empty string without label.
    pub fn best_text(&self) -> String {
        self.label
            .as_ref()
            .map(|l| l.best().content())
            .unwrap_or_default()
    }

    pub fn lowest(&self) -> Point {
        self.location.lowest()
    }

    pub fn highest(&self) -> Point {
        self.location.highest()
    }

    pub(crate) fn replace_label(&mut self, label: Option<Label>) -> Option<Label> {
        std::mem::replace(&mut self.label, label)
    }

    pub(crate) fn replace_location(&mut self, location: Location) -> Location {
        std::mem::replace(&mut self.location, location)
    }
}

impl PartialEq for Annotation {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location
            && self.label == other.label
            && self.metadata == other.metadata
    }
}
