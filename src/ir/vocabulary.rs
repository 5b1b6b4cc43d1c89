//! Controlled vocabularies: closed sets of permitted tags.

use super::tag::Tag;

/// A named, ordered set of permitted tags with descriptions.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlledVocabulary {
    name: String,
    pub description: String,
    entries: Vec<(Tag, String)>,
}

impl ControlledVocabulary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            entries: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder-style variant of [`add`](Self::add).
    pub fn with_entry(mut self, tag: impl Into<Tag>, description: impl Into<String>) -> Self {
        self.add(tag.into(), description);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds an entry. Returns false if an equal tag is already present.
    pub fn add(&mut self, tag: Tag, description: impl Into<String>) -> bool {
        if self.entries.iter().any(|(t, _)| t.matches(&tag, true)) {
            return false;
        }
        self.entries.push((tag, description.into()));
        true
    }

    /// Removes an entry. Returns false if it was not present.
    pub fn remove(&mut self, tag: &Tag) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(t, _)| !t.matches(tag, true));
        before != self.entries.len()
    }

    pub fn contains(&self, tag: &Tag, case_sensitive: bool) -> bool {
        self.entries.iter().any(|(t, _)| t.matches(tag, case_sensitive))
    }

    /// Position of the entry matching `tag`, if any.
    pub fn position(&self, tag: &Tag, case_sensitive: bool) -> Option<usize> {
        self.entries
            .iter()
            .position(|(t, _)| t.matches(tag, case_sensitive))
    }

    pub fn entries(&self) -> &[(Tag, String)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_a_set() {
        let mut cv = ControlledVocabulary::new("pos")
            .with_entry("noun", "a noun")
            .with_entry("verb", "");
        assert!(!cv.add(Tag::text("noun"), "again"));
        assert!(cv.add(Tag::text("Noun"), "case differs"));
        assert_eq!(cv.len(), 3);
        assert!(cv.contains(&Tag::text("VERB"), false));
        assert!(!cv.contains(&Tag::text("VERB"), true));
        assert!(cv.remove(&Tag::text("verb")));
        assert_eq!(cv.position(&Tag::text("Noun"), true), Some(1));
    }
}
