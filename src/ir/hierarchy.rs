//! Typed parent/child links between tiers.

use std::fmt;

use super::annotation::Annotation;
use super::ids::TierId;
use super::tier::Tier;

/// The two kinds of hierarchy link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LinkKind {
    /// Child annotations sit on exactly the same instants as a parent one.
    TimeAssociation,
    /// Child annotations are contained in exactly one parent annotation.
    TimeAlignment,
}

impl LinkKind {
    pub fn name(&self) -> &'static str {
        match self {
            LinkKind::TimeAssociation => "TimeAssociation",
            LinkKind::TimeAlignment => "TimeAlignment",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "TimeAssociation" => Some(LinkKind::TimeAssociation),
            "TimeAlignment" => Some(LinkKind::TimeAlignment),
            _ => None,
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One link: `child` depends on `parent` under `kind`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HierarchyLink {
    pub kind: LinkKind,
    pub parent: TierId,
    pub child: TierId,
}

/// The set of links of a transcription. Acyclic, one parent per child.
///
/// Links are added through `Transcription::add_hierarchy_link`, which checks
/// referential integrity before anything is stored.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Hierarchy {
    links: Vec<HierarchyLink>,
}

impl Hierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn links(&self) -> &[HierarchyLink] {
        &self.links
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn parent_of(&self, child: &TierId) -> Option<&HierarchyLink> {
        self.links.iter().find(|l| &l.child == child)
    }

    pub fn children_of<'a>(
        &'a self,
        parent: &'a TierId,
    ) -> impl Iterator<Item = &'a HierarchyLink> + 'a {
        self.links.iter().filter(move |l| &l.parent == parent)
    }

    /// True if `ancestor` is reachable from `tier` by following parents.
    pub fn is_ancestor(&self, ancestor: &TierId, tier: &TierId) -> bool {
        let mut current = tier;
        // Bounded by the link count so a corrupted table cannot loop forever.
        for _ in 0..=self.links.len() {
            match self.parent_of(current) {
                Some(link) if &link.parent == ancestor => return true,
                Some(link) => current = &link.parent,
                None => return false,
            }
        }
        false
    }

    pub(crate) fn push(&mut self, link: HierarchyLink) {
        self.links.push(link);
    }

    pub(crate) fn remove_tier(&mut self, tier: &TierId) {
        self.links.retain(|l| &l.parent != tier && &l.child != tier);
    }
}

/// Checks that `kind` makes sense between the two tiers' localization kinds.
pub(crate) fn check_kinds(kind: LinkKind, parent: &Tier, child: &Tier) -> Result<(), String> {
    match kind {
        LinkKind::TimeAlignment => {
            for tier in [parent, child] {
                if tier.is_point() {
                    return Err(format!(
                        "tier '{}' holds points, which cannot contain or be contained",
                        tier.name()
                    ));
                }
            }
            Ok(())
        }
        LinkKind::TimeAssociation => match (parent.kind(), child.kind()) {
            (Some(p), Some(c)) if p != c => Err(format!(
                "parent holds {p} localizations but child holds {c}"
            )),
            _ => Ok(()),
        },
    }
}

/// Checks every child annotation resolves to exactly one parent annotation.
///
/// Each lookup is a binary search plus a short scan, so the cost grows with
/// the child's size.
pub(crate) fn check_consistency(kind: LinkKind, parent: &Tier, child: &Tier) -> Result<(), String> {
    let parents = parent.annotations();
    let tolerance = parents
        .iter()
        .map(|a| a.lowest().margin().max(a.highest().margin()))
        .fold(0.0_f64, f64::max);
    let parent_overlaps = parent.has_overlaps();

    for ann in child.iter() {
        let count = match kind {
            LinkKind::TimeAssociation => count_associated(parents, ann, tolerance),
            LinkKind::TimeAlignment => count_containing(parents, ann, tolerance, parent_overlaps),
        };
        if count != 1 {
            let relation = match kind {
                LinkKind::TimeAssociation => "located at the same instants as",
                LinkKind::TimeAlignment => "containing",
            };
            return Err(format!(
                "annotation at [{}, {}] of '{}' has {} parent annotation(s) {} it in '{}'",
                ann.lowest().midpoint(),
                ann.highest().midpoint(),
                child.name(),
                count,
                relation,
                parent.name()
            ));
        }
    }
    Ok(())
}

fn count_associated(parents: &[Annotation], child: &Annotation, tolerance: f64) -> usize {
    let loc = child.location().best();
    let low = child.lowest();
    let window = tolerance + low.margin();
    let start = parents.partition_point(|p| p.lowest().midpoint() < low.midpoint() - window);

    parents[start..]
        .iter()
        .take_while(|p| p.lowest().midpoint() <= low.midpoint() + window)
        .filter(|p| p.location().best() == loc)
        .count()
}

fn count_containing(
    parents: &[Annotation],
    child: &Annotation,
    tolerance: f64,
    parent_overlaps: bool,
) -> usize {
    let low = child.lowest();
    let high = child.highest();
    let reach = low.midpoint() + tolerance + low.margin();
    let end = parents.partition_point(|p| p.lowest().midpoint() <= reach);

    let mut count = 0;
    for p in parents[..end].iter().rev() {
        let ends_after = p.highest() >= high;
        if p.lowest() <= low && ends_after {
            count += 1;
        } else if !ends_after && !parent_overlaps {
            // Without overlaps, ends only decrease going backwards.
            break;
        }
    }
    count
}
