//! The root document: tiers, media, controlled vocabularies and hierarchy.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::hierarchy::{self, Hierarchy, HierarchyLink, LinkKind};
use super::ids::TierId;
use super::media::Media;
use super::point::Point;
use super::tier::Tier;
use super::vocabulary::ControlledVocabulary;
use crate::error::PantierError;

/// A complete annotated document.
///
/// Tiers keep their insertion order, which is the order formats write them
/// in. Tier names are unique. Media and controlled vocabularies are shared
/// between the document and the tiers that reference them.
#[derive(Clone, Debug, Default)]
pub struct Transcription {
    name: String,
    tiers: Vec<Tier>,
    media: Vec<Arc<Media>>,
    ctrl_vocabs: Vec<Arc<ControlledVocabulary>>,
    hierarchy: Hierarchy,
    /// Free-form key/value metadata.
    pub metadata: BTreeMap<String, String>,
}

impl Transcription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn tier(&self, index: usize) -> Option<&Tier> {
        self.tiers.get(index)
    }

    pub fn tier_mut(&mut self, index: usize) -> Option<&mut Tier> {
        self.tiers.get_mut(index)
    }

    pub fn media(&self) -> &[Arc<Media>] {
        &self.media
    }

    pub fn ctrl_vocabs(&self) -> &[Arc<ControlledVocabulary>] {
        &self.ctrl_vocabs
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    /// Finds a tier by name.
    pub fn find(&self, name: &str, case_sensitive: bool) -> Option<&Tier> {
        self.find_index(name, case_sensitive).map(|i| &self.tiers[i])
    }

    pub fn find_mut(&mut self, name: &str, case_sensitive: bool) -> Option<&mut Tier> {
        self.find_index(name, case_sensitive)
            .map(move |i| &mut self.tiers[i])
    }

    pub fn find_index(&self, name: &str, case_sensitive: bool) -> Option<usize> {
        let name = name.trim();
        self.tiers.iter().position(|t| {
            if case_sensitive {
                t.name().trim() == name
            } else {
                t.name().trim().to_lowercase() == name.to_lowercase()
            }
        })
    }

    pub fn tier_by_id(&self, id: &TierId) -> Option<&Tier> {
        self.tiers.iter().find(|t| t.id() == id)
    }

    pub fn tier_by_id_mut(&mut self, id: &TierId) -> Option<&mut Tier> {
        self.tiers.iter_mut().find(|t| t.id() == id)
    }

    /// Appends a tier; its media and vocabulary are registered too.
    ///
    /// Fails with `DuplicateTier` if a tier with the same name or id exists.
    pub fn append(&mut self, tier: Tier) -> Result<usize, PantierError> {
        if self.find_index(tier.name(), true).is_some() || self.tier_by_id(tier.id()).is_some() {
            return Err(PantierError::DuplicateTier(tier.name().to_string()));
        }
        if let Some(media) = tier.media() {
            self.register_media(media.clone());
        }
        if let Some(cv) = tier.ctrl_vocab() {
            self.register_ctrl_vocab(cv.clone());
        }
        self.tiers.push(tier);
        Ok(self.tiers.len() - 1)
    }

    /// Creates an empty tier at the end and returns it.
    pub fn create_tier(&mut self, name: impl Into<String>) -> Result<&mut Tier, PantierError> {
        let idx = self.append(Tier::new(name))?;
        Ok(&mut self.tiers[idx])
    }

    /// Removes a tier and every hierarchy link that mentions it.
    pub fn remove_tier(&mut self, index: usize) -> Option<Tier> {
        if index >= self.tiers.len() {
            return None;
        }
        let tier = self.tiers.remove(index);
        self.hierarchy.remove_tier(tier.id());
        Some(tier)
    }

    /// Registers a media; an already known id returns the existing one.
    pub fn add_media(&mut self, media: Media) -> Arc<Media> {
        self.register_media(Arc::new(media))
    }

    /// Registers a vocabulary; an already known name returns the existing one.
    pub fn add_ctrl_vocab(&mut self, cv: ControlledVocabulary) -> Arc<ControlledVocabulary> {
        self.register_ctrl_vocab(Arc::new(cv))
    }

    pub fn media_by_id(&self, id: &str) -> Option<&Arc<Media>> {
        self.media.iter().find(|m| m.id == id)
    }

    pub fn ctrl_vocab_by_name(&self, name: &str) -> Option<&Arc<ControlledVocabulary>> {
        self.ctrl_vocabs.iter().find(|cv| cv.name() == name)
    }

    /// Attaches a registered media to a tier.
    pub fn set_tier_media(&mut self, index: usize, media_id: &str) -> Result<(), PantierError> {
        let media = self
            .media_by_id(media_id)
            .cloned()
            .ok_or_else(|| PantierError::UnknownReference {
                kind: "media",
                name: media_id.to_string(),
            })?;
        let tier = self
            .tiers
            .get_mut(index)
            .ok_or_else(|| PantierError::TierNotFound(format!("#{index}")))?;
        tier.set_media(Some(media));
        Ok(())
    }

    /// Binds a registered vocabulary to a tier (strictly).
    pub fn set_tier_ctrl_vocab(&mut self, index: usize, cv_name: &str) -> Result<(), PantierError> {
        let cv = self
            .ctrl_vocab_by_name(cv_name)
            .cloned()
            .ok_or_else(|| PantierError::UnknownReference {
                kind: "controlled vocabulary",
                name: cv_name.to_string(),
            })?;
        let tier = self
            .tiers
            .get_mut(index)
            .ok_or_else(|| PantierError::TierNotFound(format!("#{index}")))?;
        tier.set_ctrl_vocab(Some(cv))
    }

    /// Links `child` to `parent`.
    ///
    /// Checked, in order: both tiers exist, the link creates no cycle, the
    /// child has no parent yet, the tiers' kinds suit `kind`, and every child
    /// annotation resolves to exactly one parent annotation. Nothing is
    /// stored when a check fails.
    pub fn add_hierarchy_link(
        &mut self,
        kind: LinkKind,
        parent: &TierId,
        child: &TierId,
    ) -> Result<(), PantierError> {
        let parent_tier = self
            .tier_by_id(parent)
            .ok_or_else(|| PantierError::TierNotFound(parent.to_string()))?;
        let child_tier = self
            .tier_by_id(child)
            .ok_or_else(|| PantierError::TierNotFound(child.to_string()))?;

        if parent == child || self.hierarchy.is_ancestor(child, parent) {
            return Err(PantierError::HierarchyCycle {
                parent: parent_tier.name().to_string(),
                child: child_tier.name().to_string(),
            });
        }
        if let Some(existing) = self.hierarchy.parent_of(child) {
            let current = self
                .tier_by_id(&existing.parent)
                .map(|t| t.name().to_string())
                .unwrap_or_else(|| existing.parent.to_string());
            return Err(PantierError::HierarchyConsistency {
                parent: parent_tier.name().to_string(),
                child: child_tier.name().to_string(),
                message: format!("child already has parent '{current}'"),
            });
        }
        hierarchy::check_kinds(kind, parent_tier, child_tier).map_err(|message| {
            PantierError::HierarchyTypeMismatch {
                kind: kind.to_string(),
                parent: parent_tier.name().to_string(),
                child: child_tier.name().to_string(),
                message,
            }
        })?;
        hierarchy::check_consistency(kind, parent_tier, child_tier).map_err(|message| {
            PantierError::HierarchyConsistency {
                parent: parent_tier.name().to_string(),
                child: child_tier.name().to_string(),
                message,
            }
        })?;

        self.hierarchy.push(HierarchyLink {
            kind,
            parent: parent.clone(),
            child: child.clone(),
        });
        Ok(())
    }

    /// Re-checks every link against the current tier contents.
    ///
    /// Tiers can be edited after linking, so a link that held when it was
    /// added may no longer hold.
    pub fn validate_hierarchy(&self) -> Vec<PantierError> {
        let mut errors = Vec::new();
        for link in self.hierarchy.links() {
            let (Some(parent), Some(child)) =
                (self.tier_by_id(&link.parent), self.tier_by_id(&link.child))
            else {
                errors.push(PantierError::TierNotFound(format!(
                    "{} -> {}",
                    link.parent, link.child
                )));
                continue;
            };
            let result = hierarchy::check_kinds(link.kind, parent, child)
                .and_then(|_| hierarchy::check_consistency(link.kind, parent, child));
            if let Err(message) = result {
                errors.push(PantierError::HierarchyConsistency {
                    parent: parent.name().to_string(),
                    child: child.name().to_string(),
                    message,
                });
            }
        }
        errors
    }

    /// Earliest point over all tiers.
    pub fn min_point(&self) -> Option<Point> {
        self.tiers
            .iter()
            .filter_map(Tier::first_point)
            .reduce(|a, b| if b.midpoint() < a.midpoint() { b } else { a })
    }

    /// Latest point over all tiers.
    pub fn max_point(&self) -> Option<Point> {
        self.tiers
            .iter()
            .filter_map(Tier::last_point)
            .reduce(|a, b| if b.midpoint() > a.midpoint() { b } else { a })
    }

    fn register_media(&mut self, media: Arc<Media>) -> Arc<Media> {
        if let Some(existing) = self.media_by_id(&media.id) {
            return existing.clone();
        }
        self.media.push(media.clone());
        media
    }

    fn register_ctrl_vocab(&mut self, cv: Arc<ControlledVocabulary>) -> Arc<ControlledVocabulary> {
        if let Some(existing) = self.ctrl_vocab_by_name(cv.name()) {
            return existing.clone();
        }
        self.ctrl_vocabs.push(cv.clone());
        cv
    }
}

impl PartialEq for Transcription {
    fn eq(&self, other: &Self) -> bool {
        let media_eq = self.media.len() == other.media.len()
            && self.media.iter().zip(&other.media).all(|(a, b)| **a == **b);
        let cv_eq = self.ctrl_vocabs.len() == other.ctrl_vocabs.len()
            && self
                .ctrl_vocabs
                .iter()
                .zip(&other.ctrl_vocabs)
                .all(|(a, b)| **a == **b);
        self.name == other.name
            && self.tiers == other.tiers
            && media_eq
            && cv_eq
            && self.hierarchy == other.hierarchy
            && self.metadata == other.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Interval, Label};

    fn tier(name: &str, spans: &[(f64, f64, &str)]) -> Tier {
        let mut tier = Tier::new(name);
        for (b, e, text) in spans {
            tier.create_annotation(Interval::from_secs(*b, *e).unwrap(), Some(Label::from(*text)))
                .unwrap();
        }
        tier
    }

    fn phonetic_document() -> Transcription {
        let mut trs = Transcription::new("doc");
        trs.append(tier("words", &[(0.0, 1.0, "hello"), (1.0, 2.0, "world")]))
            .unwrap();
        trs.append(tier(
            "phones",
            &[(0.0, 0.5, "h"), (0.5, 1.0, "lo"), (1.0, 2.0, "w")],
        ))
        .unwrap();
        trs.append(tier("tokens", &[(0.0, 1.0, "HELLO"), (1.0, 2.0, "WORLD")]))
            .unwrap();
        trs
    }

    fn id_of(trs: &Transcription, name: &str) -> TierId {
        trs.find(name, true).unwrap().id().clone()
    }

    #[test]
    fn tier_names_are_unique() {
        let mut trs = phonetic_document();
        let err = trs.append(Tier::new("words")).unwrap_err();
        assert!(matches!(err, PantierError::DuplicateTier(_)));
        assert!(trs.find("WORDS", false).is_some());
        assert!(trs.find("WORDS", true).is_none());
    }

    #[test]
    fn alignment_and_association_links() {
        let mut trs = phonetic_document();
        let (words, phones, tokens) = (
            id_of(&trs, "words"),
            id_of(&trs, "phones"),
            id_of(&trs, "tokens"),
        );
        trs.add_hierarchy_link(LinkKind::TimeAlignment, &words, &phones)
            .unwrap();
        trs.add_hierarchy_link(LinkKind::TimeAssociation, &words, &tokens)
            .unwrap();
        assert_eq!(trs.hierarchy().links().len(), 2);
        assert!(trs.validate_hierarchy().is_empty());
    }

    #[test]
    fn cycles_are_rejected_and_leave_no_trace() {
        let mut trs = phonetic_document();
        let (words, tokens) = (id_of(&trs, "words"), id_of(&trs, "tokens"));
        trs.add_hierarchy_link(LinkKind::TimeAssociation, &words, &tokens)
            .unwrap();

        let err = trs
            .add_hierarchy_link(LinkKind::TimeAssociation, &tokens, &words)
            .unwrap_err();
        assert!(matches!(err, PantierError::HierarchyCycle { .. }));
        let err = trs
            .add_hierarchy_link(LinkKind::TimeAssociation, &words, &words)
            .unwrap_err();
        assert!(matches!(err, PantierError::HierarchyCycle { .. }));
        assert_eq!(trs.hierarchy().links().len(), 1);
    }

    #[test]
    fn unaligned_child_is_inconsistent() {
        let mut trs = phonetic_document();
        trs.append(tier("bad", &[(0.5, 1.5, "x")])).unwrap();
        let (words, bad) = (id_of(&trs, "words"), id_of(&trs, "bad"));
        let err = trs
            .add_hierarchy_link(LinkKind::TimeAlignment, &words, &bad)
            .unwrap_err();
        assert!(matches!(err, PantierError::HierarchyConsistency { .. }));
        assert!(trs.hierarchy().is_empty());
    }

    #[test]
    fn removing_a_tier_drops_its_links() {
        let mut trs = phonetic_document();
        let (words, phones) = (id_of(&trs, "words"), id_of(&trs, "phones"));
        trs.add_hierarchy_link(LinkKind::TimeAlignment, &words, &phones)
            .unwrap();
        let idx = trs.find_index("phones", true).unwrap();
        trs.remove_tier(idx).unwrap();
        assert!(trs.hierarchy().is_empty());
    }

    #[test]
    fn shared_media_is_registered_once() {
        let mut trs = Transcription::new("doc");
        let media = trs.add_media(Media::new("a.wav").with_id("m1"));
        let again = trs.add_media(Media::new("b.wav").with_id("m1"));
        assert!(Arc::ptr_eq(&media, &again));

        let idx = trs.append(Tier::new("t")).unwrap();
        trs.set_tier_media(idx, "m1").unwrap();
        assert_eq!(trs.tier(idx).unwrap().media().unwrap().url, "a.wav");
        assert!(trs.set_tier_media(idx, "missing").is_err());
    }

    #[test]
    fn bounds_cover_all_tiers() {
        let trs = phonetic_document();
        assert_eq!(trs.min_point().unwrap().midpoint(), 0.0);
        assert_eq!(trs.max_point().unwrap().midpoint(), 2.0);
    }
}
