//! Tiers: named, time-ordered tracks of annotations.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::annotation::Annotation;
use super::ids::{AnnotationId, TierId};
use super::interval::Interval;
use super::label::Label;
use super::location::{Localization, LocalizationKind, Location};
use super::media::Media;
use super::point::Point;
use super::tag::Tag;
use super::vocabulary::ControlledVocabulary;
use crate::error::PantierError;

/// A named sequence of annotations sharing one localization kind.
///
/// Annotations are kept sorted by their lowest point; ties keep insertion
/// order. The localization kind is fixed by the first insertion. Overlaps
/// and gaps are allowed here: each file format enforces its own stricter
/// rules when writing.
#[derive(Clone, Debug)]
pub struct Tier {
    id: TierId,
    name: String,
    annotations: Vec<Annotation>,
    kind: Option<LocalizationKind>,
    ctrl_vocab: Option<Arc<ControlledVocabulary>>,
    media: Option<Arc<Media>>,
    case_sensitive: bool,
    next_id: u64,
    /// Upper bound on how far any annotation reaches past its lowest
    /// midpoint, in seconds.
    max_reach: f64,
    /// Free-form key/value metadata.
    pub metadata: BTreeMap<String, String>,
}

impl Tier {
    /// Creates an empty tier with a fresh id.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(TierId::generate(), name)
    }

    /// Creates an empty tier with a known id.
    pub fn with_id(id: TierId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            annotations: Vec::new(),
            kind: None,
            ctrl_vocab: None,
            media: None,
            case_sensitive: false,
            next_id: 1,
            max_reach: 0.0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &TierId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Annotation> {
        self.annotations.iter()
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Localization kind, fixed once the first annotation was inserted.
    pub fn kind(&self) -> Option<LocalizationKind> {
        self.kind
    }

    pub fn is_point(&self) -> bool {
        self.kind == Some(LocalizationKind::Point)
    }

    pub fn is_interval(&self) -> bool {
        self.kind == Some(LocalizationKind::Interval)
    }

    pub fn is_disjoint(&self) -> bool {
        self.kind == Some(LocalizationKind::Disjoint)
    }

    pub fn ctrl_vocab(&self) -> Option<&Arc<ControlledVocabulary>> {
        self.ctrl_vocab.as_ref()
    }

    pub fn media(&self) -> Option<&Arc<Media>> {
        self.media.as_ref()
    }

    pub fn set_media(&mut self, media: Option<Arc<Media>>) {
        self.media = media;
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn set_case_sensitive(&mut self, case_sensitive: bool) {
        self.case_sensitive = case_sensitive;
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.position(id).map(|idx| &self.annotations[idx])
    }

    /// Index of the annotation with handle `id` in time order.
    pub fn position(&self, id: AnnotationId) -> Option<usize> {
        self.annotations.iter().position(|a| a.id == id)
    }

    /// Mutable access to an annotation's metadata.
    pub fn metadata_mut(&mut self, id: AnnotationId) -> Option<&mut BTreeMap<String, String>> {
        let idx = self.position(id)?;
        Some(&mut self.annotations[idx].metadata)
    }

    pub fn first_point(&self) -> Option<Point> {
        self.annotations.first().map(Annotation::lowest)
    }

    pub fn last_point(&self) -> Option<Point> {
        self.annotations
            .iter()
            .map(Annotation::highest)
            .reduce(|acc, p| if p.midpoint() > acc.midpoint() { p } else { acc })
    }

    /// Creates and inserts an annotation.
    ///
    /// Fails with `LocalizationKindMismatch` if the location's kind differs
    /// from the tier's, or `VocabularyViolation` if a tag falls outside the
    /// bound controlled vocabulary.
    pub fn create_annotation(
        &mut self,
        location: impl Into<Location>,
        label: Option<Label>,
    ) -> Result<AnnotationId, PantierError> {
        self.add_annotation(Annotation::new(location, label))
    }

    /// Inserts a prepared annotation (keeping its metadata).
    pub fn add_annotation(&mut self, mut annotation: Annotation) -> Result<AnnotationId, PantierError> {
        self.check_location(annotation.location())?;
        self.check_label(annotation.label())?;

        if self.kind.is_none() {
            self.kind = Some(annotation.location().kind());
        }
        annotation.id = AnnotationId::new(self.next_id);
        self.next_id += 1;
        let id = annotation.id;
        self.insert_sorted(annotation);
        Ok(id)
    }

    /// Replaces the label of an annotation; the tier is unchanged on error.
    pub fn set_label(&mut self, id: AnnotationId, label: Option<Label>) -> Result<(), PantierError> {
        let idx = self.require(id)?;
        self.check_label(label.as_ref())?;
        self.annotations[idx].replace_label(label);
        Ok(())
    }

    /// Replaces the location of an annotation and restores time order.
    ///
    /// The tier is unchanged on error.
    pub fn set_location(&mut self, id: AnnotationId, location: Location) -> Result<(), PantierError> {
        let idx = self.require(id)?;
        self.check_location(&location)?;
        let mut annotation = self.annotations.remove(idx);
        annotation.replace_location(location);
        self.insert_sorted(annotation);
        self.refresh_reach();
        Ok(())
    }

    /// Removes and returns an annotation.
    pub fn remove(&mut self, id: AnnotationId) -> Option<Annotation> {
        let idx = self.position(id)?;
        let removed = self.annotations.remove(idx);
        self.refresh_reach();
        Some(removed)
    }

    /// Binds (or unbinds with `None`) a controlled vocabulary.
    ///
    /// Fails with `CtrlVocabContains` if an existing annotation carries a
    /// tag outside the new vocabulary; the previous binding is kept then.
    pub fn set_ctrl_vocab(
        &mut self,
        ctrl_vocab: Option<Arc<ControlledVocabulary>>,
    ) -> Result<(), PantierError> {
        if let Some(cv) = &ctrl_vocab {
            if let Some((_, tag)) = self.vocabulary_violations(cv).into_iter().next() {
                return Err(PantierError::CtrlVocabContains {
                    tier: self.name.clone(),
                    vocabulary: cv.name().to_string(),
                    tag: tag.content(),
                });
            }
        }
        self.ctrl_vocab = ctrl_vocab;
        Ok(())
    }

    /// Binds a controlled vocabulary even if existing tags violate it.
    ///
    /// Returns the offending annotations. Only readers of formats whose
    /// tools are known to export such files should use this; later label
    /// changes are validated strictly again.
    pub fn bind_ctrl_vocab_lenient(
        &mut self,
        ctrl_vocab: Arc<ControlledVocabulary>,
    ) -> Vec<(AnnotationId, Tag)> {
        let violations = self.vocabulary_violations(&ctrl_vocab);
        self.ctrl_vocab = Some(ctrl_vocab);
        violations
    }

    /// Annotations whose tags start before `end`, filtered to the window.
    ///
    /// With `overlaps == false` only annotations fully inside
    /// `[begin, end]` are yielded; with `overlaps == true` annotations that
    /// merely intersect the window are yielded too. Results are lazy and in
    /// time order.
    pub fn find(
        &self,
        begin: f64,
        end: f64,
        overlaps: bool,
    ) -> impl Iterator<Item = &Annotation> + '_ {
        let qb = Point::exact(begin);
        let qe = Point::exact(end);
        // Anything starting before `begin - max_reach` ends before `begin`.
        let start = if overlaps {
            self.annotations
                .partition_point(|a| a.lowest().midpoint() < begin - self.max_reach)
        } else {
            self.lower_bound(qb)
        };

        self.annotations[start..]
            .iter()
            .take_while(move |a| a.lowest() <= qe)
            .filter(move |a| {
                let contained = qb <= a.lowest() && a.highest() <= qe;
                contained
                    || (overlaps
                        && a.location()
                            .alternatives()
                            .iter()
                            .any(|(l, _)| intersects(l, qb, qe)))
            })
    }

    /// Groups consecutive annotations into intervals split on separators.
    ///
    /// An annotation is a separator when its best tag content is one of
    /// `separators` or when it carries no (or a blank) label. Each group
    /// becomes one interval from its first lowest point to its last highest
    /// point; for point tiers the interval runs up to the following
    /// annotation when there is one. The new label joins the members' best
    /// tags with spaces. The source tier is untouched.
    pub fn export_to_intervals(&self, separators: &[&str]) -> Result<Tier, PantierError> {
        let mut out = Tier::new(self.name.clone());
        out.media = self.media.clone();
        out.case_sensitive = self.case_sensitive;

        let is_separator = |a: &Annotation| match a.label() {
            None => true,
            Some(label) if label.is_blank() => true,
            Some(label) => {
                let content = label.best().content();
                separators.iter().any(|s| s.trim() == content.trim())
            }
        };

        let mut group: Vec<&Annotation> = Vec::new();
        for (idx, annotation) in self.annotations.iter().enumerate() {
            if is_separator(annotation) {
                self.flush_group(&mut out, &group, Some(idx))?;
                group.clear();
            } else {
                group.push(annotation);
            }
        }
        self.flush_group(&mut out, &group, None)?;
        Ok(out)
    }

    fn flush_group(
        &self,
        out: &mut Tier,
        group: &[&Annotation],
        next_idx: Option<usize>,
    ) -> Result<(), PantierError> {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            return Ok(());
        };
        let begin = first.lowest();
        let mut end = last.highest();
        if self.is_point() {
            if let Some(next) = next_idx.and_then(|i| self.annotations.get(i)) {
                end = next.lowest();
            }
        }
        let text = group
            .iter()
            .map(|a| a.best_text())
            .filter(|t| !t.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        out.create_annotation(Interval::new(begin, end)?, Some(Label::new(text.as_str())))?;
        Ok(())
    }

    /// True if two annotations share more than a boundary.
    pub fn has_overlaps(&self) -> bool {
        let mut max_end: Option<f64> = None;
        for a in &self.annotations {
            let b = a.lowest().midpoint();
            if let Some(end) = max_end {
                if b < end {
                    return true;
                }
            }
            let e = a.highest().midpoint();
            max_end = Some(max_end.map_or(e, |m| m.max(e)));
        }
        false
    }

    /// True if some annotation starts after the previous ones ended.
    pub fn has_gaps(&self) -> bool {
        let mut max_end: Option<f64> = None;
        for a in &self.annotations {
            let b = a.lowest().midpoint();
            if let Some(end) = max_end {
                if b > end {
                    return true;
                }
            }
            let e = a.highest().midpoint();
            max_end = Some(max_end.map_or(e, |m| m.max(e)));
        }
        false
    }

    fn require(&self, id: AnnotationId) -> Result<usize, PantierError> {
        self.position(id).ok_or_else(|| PantierError::AnnotationNotFound {
            tier: self.name.clone(),
            id: id.as_u64(),
        })
    }

    fn insert_sorted(&mut self, annotation: Annotation) {
        self.max_reach = self.max_reach.max(reach(&annotation));
        let key = annotation.lowest().midpoint();
        let idx = self
            .annotations
            .partition_point(|a| a.lowest().midpoint() <= key);
        self.annotations.insert(idx, annotation);
    }

    fn refresh_reach(&mut self) {
        self.max_reach = self.annotations.iter().map(reach).fold(0.0, f64::max);
    }

    /// Index of the first annotation not starting before `begin`.
    fn lower_bound(&self, begin: Point) -> usize {
        let mut idx = self
            .annotations
            .partition_point(|a| a.lowest().midpoint() < begin.midpoint());
        while idx > 0 && self.annotations[idx - 1].lowest() == begin {
            idx -= 1;
        }
        idx
    }

    fn check_location(&self, location: &Location) -> Result<(), PantierError> {
        match self.kind {
            Some(kind) if kind != location.kind() => Err(PantierError::LocalizationKindMismatch {
                tier: self.name.clone(),
                expected: kind.to_string(),
                found: location.kind().to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn check_label(&self, label: Option<&Label>) -> Result<(), PantierError> {
        let (Some(cv), Some(label)) = (&self.ctrl_vocab, label) else {
            return Ok(());
        };
        for tag in label.tags() {
            if !tag.is_empty() && !cv.contains(tag, self.case_sensitive) {
                return Err(PantierError::VocabularyViolation {
                    tier: self.name.clone(),
                    vocabulary: cv.name().to_string(),
                    tag: tag.content(),
                });
            }
        }
        Ok(())
    }

    /// Tags outside the bound vocabulary, as left by lenient binding.
    pub fn ctrl_vocab_violations(&self) -> Vec<(AnnotationId, Tag)> {
        match &self.ctrl_vocab {
            Some(cv) => self.vocabulary_violations(cv),
            None => Vec::new(),
        }
    }

    fn vocabulary_violations(&self, cv: &ControlledVocabulary) -> Vec<(AnnotationId, Tag)> {
        let mut out = Vec::new();
        for a in &self.annotations {
            if let Some(label) = a.label() {
                for tag in label.tags() {
                    if !tag.is_empty() && !cv.contains(tag, self.case_sensitive) {
                        out.push((a.id, tag.clone()));
                    }
                }
            }
        }
        out
    }
}

/// Distance from the lowest midpoint to the furthest covered instant.
fn reach(annotation: &Annotation) -> f64 {
    let start = annotation.lowest().midpoint();
    annotation
        .location()
        .alternatives()
        .iter()
        .map(|(l, _)| l.highest().highest() - start)
        .fold(0.0, f64::max)
}

fn intersects(localization: &Localization, qb: Point, qe: Point) -> bool {
    match localization {
        Localization::Point(p) => qb <= *p && *p <= qe,
        Localization::Interval(iv) => iv.begin() < qe && qb < iv.end(),
        Localization::Disjoint(d) => d
            .intervals()
            .iter()
            .any(|iv| iv.begin() < qe && qb < iv.end()),
    }
}

impl PartialEq for Tier {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.annotations == other.annotations
            && self.ctrl_vocab.as_deref() == other.ctrl_vocab.as_deref()
            && self.media.as_deref() == other.media.as_deref()
            && self.case_sensitive == other.case_sensitive
            && self.metadata == other.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval_tier(spans: &[(f64, f64, &str)]) -> Tier {
        let mut tier = Tier::new("words");
        for (b, e, text) in spans {
            tier.create_annotation(Interval::from_secs(*b, *e).unwrap(), Some(Label::from(*text)))
                .unwrap();
        }
        tier
    }

    #[test]
    fn keeps_annotations_sorted() {
        let tier = interval_tier(&[(2.0, 3.0, "c"), (0.0, 1.0, "a"), (1.0, 2.0, "b")]);
        let texts: Vec<String> = tier.iter().map(Annotation::best_text).collect();
        assert_eq!(texts, ["a", "b", "c"]);
        assert_eq!(tier.first_point().unwrap().midpoint(), 0.0);
        assert_eq!(tier.last_point().unwrap().midpoint(), 3.0);
    }

    #[test]
    fn kind_is_fixed_by_first_insert() {
        let mut tier = interval_tier(&[(0.0, 1.0, "a")]);
        let err = tier
            .create_annotation(Point::exact(2.0), Some(Label::from("p")))
            .unwrap_err();
        assert!(matches!(err, PantierError::LocalizationKindMismatch { .. }));
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn vocabulary_is_enforced_and_set_label_rolls_back() {
        let cv = Arc::new(
            ControlledVocabulary::new("yn")
                .with_entry("yes", "")
                .with_entry("no", ""),
        );
        let mut tier = interval_tier(&[(0.0, 1.0, "yes")]);
        tier.set_ctrl_vocab(Some(cv)).unwrap();

        let err = tier
            .create_annotation(Interval::from_secs(1.0, 2.0).unwrap(), Some(Label::from("maybe")))
            .unwrap_err();
        assert!(matches!(err, PantierError::VocabularyViolation { .. }));

        let id = tier.annotations()[0].id();
        assert!(tier.set_label(id, Some(Label::from("maybe"))).is_err());
        assert_eq!(tier.get(id).unwrap().best_text(), "yes");
        tier.set_label(id, Some(Label::from("NO"))).unwrap();
    }

    #[test]
    fn set_ctrl_vocab_rejects_existing_violations() {
        let mut tier = interval_tier(&[(0.0, 1.0, "maybe")]);
        let cv = Arc::new(ControlledVocabulary::new("yn").with_entry("yes", ""));
        let err = tier.set_ctrl_vocab(Some(cv.clone())).unwrap_err();
        assert!(matches!(err, PantierError::CtrlVocabContains { .. }));
        assert!(tier.ctrl_vocab().is_none());

        let violations = tier.bind_ctrl_vocab_lenient(cv);
        assert_eq!(violations.len(), 1);
        assert!(tier.ctrl_vocab().is_some());
    }

    #[test]
    fn set_location_resorts_and_keeps_handle() {
        let mut tier = interval_tier(&[(0.0, 1.0, "a"), (1.0, 2.0, "b")]);
        let id = tier.annotations()[0].id();
        tier.set_location(id, Interval::from_secs(5.0, 6.0).unwrap().into())
            .unwrap();
        assert_eq!(tier.position(id), Some(1));
        assert!(tier
            .set_location(id, Point::exact(1.0).into())
            .is_err());
        assert_eq!(tier.position(id), Some(1));
    }

    #[test]
    fn find_contained_and_overlapping() {
        let tier = interval_tier(&[
            (0.0, 1.0, "a"),
            (1.0, 2.0, "b"),
            (2.0, 3.0, "c"),
            (3.0, 4.0, "d"),
        ]);
        let inside: Vec<String> = tier.find(1.0, 3.0, false).map(Annotation::best_text).collect();
        assert_eq!(inside, ["b", "c"]);

        let touching: Vec<String> = tier.find(1.5, 2.5, true).map(Annotation::best_text).collect();
        assert_eq!(touching, ["b", "c"]);

        assert_eq!(tier.find(1.5, 2.5, false).count(), 0);
        assert_eq!(tier.find(10.0, 12.0, true).count(), 0);
    }

    #[test]
    fn overlapping_find_skips_the_unreachable_prefix() {
        let mut spans: Vec<(f64, f64, String)> = (0..1000)
            .map(|n| (f64::from(n) * 0.1, f64::from(n) * 0.1 + 0.1, format!("w{n}")))
            .collect();
        spans.push((2.0, 60.0, "long".to_string()));
        let refs: Vec<(f64, f64, &str)> = spans.iter().map(|(b, e, t)| (*b, *e, t.as_str())).collect();
        let mut tier = interval_tier(&refs);
        assert!((tier.max_reach - 58.0).abs() < 1e-9);

        let found: Vec<String> = tier.find(50.05, 50.15, true).map(Annotation::best_text).collect();
        assert_eq!(found, ["long", "w500", "w501"]);
        let start = tier
            .annotations
            .partition_point(|a| a.lowest().midpoint() < 50.05 - tier.max_reach);
        assert!(start > 0);

        let long = tier.iter().find(|a| a.best_text() == "long").unwrap().id();
        tier.remove(long);
        assert!((tier.max_reach - 0.1).abs() < 1e-9);
        let found: Vec<String> = tier.find(50.05, 50.15, true).map(Annotation::best_text).collect();
        assert_eq!(found, ["w500", "w501"]);
    }

    #[test]
    fn export_to_intervals_splits_on_separators() {
        let tier = interval_tier(&[
            (0.0, 0.1, "a"),
            (0.1, 0.2, "b"),
            (0.2, 0.3, "#"),
            (0.3, 0.4, "c"),
            (0.4, 0.5, "d"),
        ]);
        let words = tier.export_to_intervals(&["#", "+"]).unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(words.annotations()[0].best_text(), "a b");
        assert_eq!(words.annotations()[1].best_text(), "c d");
        let first = words.annotations()[0].location().best().as_interval().copied().unwrap();
        assert_eq!(first.begin().midpoint(), 0.0);
        assert_eq!(first.end().midpoint(), 0.2);
        // source untouched, repeatable
        assert_eq!(tier.len(), 5);
        let again = tier.export_to_intervals(&["#", "+"]).unwrap();
        assert_eq!(again.annotations(), words.annotations());
    }

    #[test]
    fn export_point_tier_extends_to_next_point() {
        let mut tier = Tier::new("phones");
        for (t, text) in [(0.0, "a"), (1.0, "b"), (2.0, "+"), (3.0, "c")] {
            tier.create_annotation(Point::exact(t), Some(Label::from(text)))
                .unwrap();
        }
        let out = tier.export_to_intervals(&["+"]).unwrap();
        assert_eq!(out.len(), 2);
        let iv = out.annotations()[0].location().best().as_interval().copied().unwrap();
        assert_eq!((iv.begin().midpoint(), iv.end().midpoint()), (0.0, 2.0));
    }

    #[test]
    fn detects_gaps_and_overlaps() {
        let contiguous = interval_tier(&[(0.0, 1.0, "a"), (1.0, 2.0, "b")]);
        assert!(!contiguous.has_gaps());
        assert!(!contiguous.has_overlaps());

        let gapped = interval_tier(&[(0.0, 1.0, "a"), (1.5, 2.0, "b")]);
        assert!(gapped.has_gaps());

        let overlapping = interval_tier(&[(0.0, 1.0, "a"), (0.5, 2.0, "b")]);
        assert!(overlapping.has_overlaps());
    }
}
