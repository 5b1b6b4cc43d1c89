//! ELAN EAF reader and writer.
//!
//! EAF stores times in a table of time slots referenced by alignable
//! annotations, and lets reference annotations point at a parent annotation
//! instead of at time slots. Slots may carry no time value when the
//! exporting tool could not align an annotation.
//!
//! Reading:
//! - Alignable annotations whose slots have no value ("orphans") are merged
//!   into the next aligned annotation of the same tier, whose begin is moved
//!   back to the earliest known begin of the chain. Trailing orphans are
//!   appended to the last aligned annotation. Both are logged.
//! - Reference tiers are resolved after every alignable tier, in parent
//!   dependency order. A reference to an orphan is appended to the last
//!   annotation created so far in the child tier; this assumes orphan chains
//!   are in time order and is logged each time it applies. Such a
//!   reference becomes an orphan itself, so deeper tiers pointing at it
//!   follow it into the same annotation.
//! - Several reference annotations on one parent annotation (symbolic
//!   subdivision) are merged into one child annotation.
//! - Reference tiers get a TimeAssociation link to their parent, alignable
//!   tiers with a `PARENT_REF` a TimeAlignment link. A link that does not
//!   hold is logged and skipped.
//! - Controlled vocabularies are bound leniently: ELAN is known to save
//!   values outside a tier's vocabulary, so violations are logged only.
//!
//! Writing targets EAF 3.0. Disjoint tiers are rejected, point tiers are
//! widened to short intervals, only the best localization is kept and label
//! alternatives are written as `{a|b}`, best first. Characters XML cannot
//! carry fail the write with `InvalidXmlChar`. Time slots are allocated per
//! distinct (time, tier) pair in sorted order.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use roxmltree::{Document, Node};

use super::annotation::Annotation;
use super::hierarchy::LinkKind;
use super::ids::{AnnotationId, TierId};
use super::interval::Interval;
use super::io_common::{
    best_interval, points_to_intervals, read_text, reject_disjoint, reject_non_xml_chars,
    reject_overlaps, sniff, write_atomic, xml_escape, DEFAULT_POINT_EPSILON,
};
use super::location::Location;
use super::media::Media;
use super::tag::Tag;
use super::text_label::{label_to_text, text_to_label};
use super::tier::Tier;
use super::transcription::Transcription;
use super::vocabulary::ControlledVocabulary;
use crate::error::PantierError;

const FORMAT: &str = "eaf";
const EAF_VERSION: &str = "3.0";
const UNDETERMINED_LANGUAGE: &str = "und";

/// Options for writing EAF.
#[derive(Clone, Copy, Debug)]
pub struct EafWriteOptions {
    /// Width in seconds of the interval a point is widened to.
    pub point_epsilon: f64,
}

impl Default for EafWriteOptions {
    fn default() -> Self {
        Self {
            point_epsilon: DEFAULT_POINT_EPSILON,
        }
    }
}

/// Read an EAF file.
pub fn read_eaf(path: &Path) -> Result<Transcription, PantierError> {
    let xml = read_text(path)?;
    parse_eaf_str(&xml, path)
}

/// Write a transcription as EAF.
pub fn write_eaf(
    path: &Path,
    trs: &Transcription,
    options: &EafWriteOptions,
) -> Result<(), PantierError> {
    let xml = to_eaf_string(trs, options)?;
    write_atomic(path, xml.as_bytes())
}

/// Parse EAF from a string.
pub fn from_eaf_str(xml: &str) -> Result<Transcription, PantierError> {
    parse_eaf_str(xml, Path::new("<string>"))
}

/// Parse EAF from bytes (must be valid UTF-8).
pub fn from_eaf_slice(bytes: &[u8]) -> Result<Transcription, PantierError> {
    let xml = std::str::from_utf8(bytes).map_err(|source| PantierError::Encoding {
        path: PathBuf::from("<bytes>"),
        message: format!("input is not valid UTF-8: {source}"),
    })?;
    parse_eaf_str(xml, Path::new("<bytes>"))
}

/// True if the file looks like an ELAN document.
pub fn detect_eaf(path: &Path) -> bool {
    sniff(path).is_some_and(|head| head.contains("<ANNOTATION_DOCUMENT"))
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct LinguisticType {
    vocabulary: Option<String>,
}

/// Tier being rebuilt, in DOM position.
struct PendingTier<'a, 'input> {
    node: Node<'a, 'input>,
    name: String,
    parent: Option<String>,
    has_refs: bool,
}

/// Per-document resolution tables.
#[derive(Default)]
struct Resolver {
    /// EAF annotation id -> location of the model annotation it became.
    anchors: HashMap<String, Location>,
    /// Orphan annotation id -> EAF id of the annotation it was merged into.
    orphans: HashMap<String, String>,
}

fn parse_eaf_str(xml: &str, path: &Path) -> Result<Transcription, PantierError> {
    let document = Document::parse(xml).map_err(|source| PantierError::XmlParse {
        format: FORMAT,
        path: path.to_path_buf(),
        source,
    })?;
    let root = document.root_element();
    if root.tag_name().name() != "ANNOTATION_DOCUMENT" {
        return Err(format_error(path, "missing <ANNOTATION_DOCUMENT> root element"));
    }

    let mut trs = Transcription::new(super::io_common::file_stem(path));
    parse_document_metadata(root, &mut trs);
    let media = parse_media(root, &mut trs);
    let time_slots = parse_time_slots(root, path)?;
    let cve_values = parse_vocabularies(root, &mut trs);
    let linguistic_types: HashMap<String, LinguisticType> = child_elements(root, "LINGUISTIC_TYPE")
        .filter_map(|node| {
            node.attribute("LINGUISTIC_TYPE_ID").map(|id| {
                (
                    id.to_string(),
                    LinguisticType {
                        vocabulary: node
                            .attribute("CONTROLLED_VOCABULARY_REF")
                            .map(str::to_string),
                    },
                )
            })
        })
        .collect();

    let pending: Vec<PendingTier> = child_elements(root, "TIER")
        .map(|node| {
            let name = required_attribute(node, "TIER_ID", path)?;
            let has_refs = annotation_elements(node).any(|n| n.tag_name().name() == "REF_ANNOTATION");
            Ok(PendingTier {
                node,
                name,
                parent: node
                    .attribute("PARENT_REF")
                    .filter(|p| !p.trim().is_empty())
                    .map(str::to_string),
                has_refs,
            })
        })
        .collect::<Result<_, PantierError>>()?;

    let mut built: Vec<Option<Tier>> = (0..pending.len()).map(|_| None).collect();
    let mut resolver = Resolver::default();

    for (idx, info) in pending.iter().enumerate() {
        if !info.has_refs {
            let tier = parse_alignable_tier(info, path, &time_slots, &cve_values, &mut resolver)?;
            built[idx] = Some(tier);
        }
    }

    // Reference tiers, parents first.
    let mut remaining: Vec<usize> = (0..pending.len()).filter(|&i| pending[i].has_refs).collect();
    while !remaining.is_empty() {
        let ready = remaining.iter().position(|&i| {
            pending[i].parent.as_ref().is_some_and(|parent| {
                pending
                    .iter()
                    .position(|p| &p.name == parent)
                    .is_some_and(|p| built[p].is_some())
            })
        });
        let Some(pos) = ready else {
            let names: Vec<&str> = remaining.iter().map(|&i| pending[i].name.as_str()).collect();
            return Err(format_error(
                path,
                &format!("unresolvable PARENT_REF for tier(s) {}", names.join(", ")),
            ));
        };
        let idx = remaining.remove(pos);
        let tier = parse_ref_tier(&pending[idx], path, &cve_values, &mut resolver)?;
        built[idx] = Some(tier);
    }

    for (info, tier) in pending.iter().zip(built) {
        let Some(mut tier) = tier else { continue };
        tier.set_media(media.clone());
        let vocabulary = info
            .node
            .attribute("LINGUISTIC_TYPE_REF")
            .and_then(|lt| linguistic_types.get(lt))
            .and_then(|lt| lt.vocabulary.as_deref())
            .and_then(|cv| trs.ctrl_vocab_by_name(cv).cloned());
        if let Some(cv) = vocabulary {
            for (id, tag) in tier.bind_ctrl_vocab_lenient(cv.clone()) {
                tracing::warn!(
                    path = %path.display(),
                    tier = tier.name(),
                    annotation = id.as_u64(),
                    "value '{}' is outside controlled vocabulary '{}'",
                    tag.content(),
                    cv.name()
                );
            }
        }
        trs.append(tier)?;
    }

    for info in &pending {
        let Some(parent) = &info.parent else { continue };
        let kind = if info.has_refs {
            LinkKind::TimeAssociation
        } else {
            LinkKind::TimeAlignment
        };
        let result = trs.add_hierarchy_link(kind, &TierId::new(parent.as_str()), &TierId::new(info.name.as_str()));
        if let Err(err) = result {
            tracing::warn!(path = %path.display(), "hierarchy link ignored: {err}");
        }
    }

    Ok(trs)
}

fn parse_alignable_tier(
    info: &PendingTier<'_, '_>,
    path: &Path,
    time_slots: &HashMap<String, Option<f64>>,
    cve_values: &HashMap<String, String>,
    resolver: &mut Resolver,
) -> Result<Tier, PantierError> {
    let mut tier = new_tier(info);
    // (eaf id, text, known begin)
    let mut chain: Vec<(String, String, Option<f64>)> = Vec::new();
    let mut last: Option<(String, AnnotationId)> = None;

    for node in annotation_elements(info.node) {
        if node.tag_name().name() != "ALIGNABLE_ANNOTATION" {
            continue;
        }
        let eaf_id = required_attribute(node, "ANNOTATION_ID", path)?;
        let begin = slot_value(node, "TIME_SLOT_REF1", time_slots, path)?;
        let end = slot_value(node, "TIME_SLOT_REF2", time_slots, path)?;
        let text = annotation_text(node, cve_values);

        let (Some(begin), Some(end)) = (begin, end) else {
            chain.push((eaf_id, text, begin));
            continue;
        };

        let begin = chain.iter().filter_map(|(_, _, b)| *b).fold(begin, f64::min);
        let merged = join_texts(chain.iter().map(|(_, t, _)| t.as_str()).chain([text.as_str()]));
        if !chain.is_empty() {
            tracing::warn!(
                tier = tier.name(),
                annotation = %eaf_id,
                "{} unaligned annotation(s) merged into the next aligned one",
                chain.len()
            );
        }
        for (orphan, _, _) in chain.drain(..) {
            resolver.orphans.insert(orphan, eaf_id.clone());
        }

        let location = Location::new(Interval::from_secs(begin, end)?);
        let annotation = Annotation::new(location.clone(), Some(text_to_label(&merged)))
            .with_metadata("id", eaf_id.as_str());
        let id = tier.add_annotation(annotation)?;
        resolver.anchors.insert(eaf_id.clone(), location);
        last = Some((eaf_id, id));
    }

    if !chain.is_empty() {
        match &last {
            Some((eaf_id, id)) => {
                tracing::warn!(
                    tier = tier.name(),
                    "{} trailing unaligned annotation(s) appended to the last aligned one",
                    chain.len()
                );
                let extra = join_texts(chain.iter().map(|(_, t, _)| t.as_str()));
                append_text(&mut tier, *id, &extra)?;
                for (orphan, _, _) in chain.drain(..) {
                    resolver.orphans.insert(orphan, eaf_id.clone());
                }
            }
            None => {
                tracing::warn!(
                    tier = tier.name(),
                    "{} unaligned annotation(s) dropped: the tier has no aligned annotation",
                    chain.len()
                );
            }
        }
    }
    Ok(tier)
}

fn parse_ref_tier(
    info: &PendingTier<'_, '_>,
    path: &Path,
    cve_values: &HashMap<String, String>,
    resolver: &mut Resolver,
) -> Result<Tier, PantierError> {
    let mut tier = new_tier(info);
    // parent eaf id -> child annotation
    let mut by_parent: HashMap<String, AnnotationId> = HashMap::new();
    // eaf id anchored on the annotation, and the annotation
    let mut last: Option<(String, AnnotationId)> = None;
    let mut new_anchors: Vec<(String, Location)> = Vec::new();
    let mut new_orphans: Vec<(String, String)> = Vec::new();

    for node in annotation_elements(info.node) {
        if node.tag_name().name() != "REF_ANNOTATION" {
            continue;
        }
        let eaf_id = required_attribute(node, "ANNOTATION_ID", path)?;
        let target = required_attribute(node, "ANNOTATION_REF", path)?;
        let text = annotation_text(node, cve_values);

        let parent_id = if resolver.anchors.contains_key(&target) {
            target
        } else if let Some(real) = resolver.orphans.get(&target) {
            if let Some((anchor, id)) = &last {
                tracing::warn!(
                    tier = tier.name(),
                    annotation = %eaf_id,
                    "reference to unaligned annotation appended to the previous annotation"
                );
                append_text(&mut tier, *id, &text)?;
                // references to this one follow it into the same annotation
                new_orphans.push((eaf_id, anchor.clone()));
                continue;
            }
            real.clone()
        } else {
            tracing::warn!(
                tier = tier.name(),
                annotation = %eaf_id,
                "reference to unknown annotation '{target}' skipped"
            );
            continue;
        };

        let Some(location) = resolver.anchors.get(&parent_id).cloned() else {
            tracing::warn!(
                tier = tier.name(),
                annotation = %eaf_id,
                "reference to unplaced annotation '{parent_id}' skipped"
            );
            continue;
        };
        if let Some(&id) = by_parent.get(&parent_id) {
            append_text(&mut tier, id, &text)?;
            last = Some((eaf_id.clone(), id));
        } else {
            let annotation = Annotation::new(location.clone(), Some(text_to_label(&text)))
                .with_metadata("id", eaf_id.as_str());
            let id = tier.add_annotation(annotation)?;
            by_parent.insert(parent_id, id);
            last = Some((eaf_id.clone(), id));
        }
        new_anchors.push((eaf_id, location));
    }

    resolver.anchors.extend(new_anchors);
    resolver.orphans.extend(new_orphans);
    Ok(tier)
}

fn new_tier(info: &PendingTier<'_, '_>) -> Tier {
    let mut tier = Tier::with_id(TierId::new(info.name.as_str()), info.name.as_str());
    for (attribute, key) in TIER_ATTRIBUTES {
        if let Some(value) = info.node.attribute(*attribute).filter(|v| !v.is_empty()) {
            tier.metadata.insert(key.to_string(), value.to_string());
        }
    }
    tier
}

const TIER_ATTRIBUTES: &[(&str, &str)] = &[
    ("PARTICIPANT", "speaker_name"),
    ("ANNOTATOR", "annotator_name"),
    ("DEFAULT_LOCALE", "language"),
    ("LINGUISTIC_TYPE_REF", "eaf_linguistic_type"),
];

const MEDIA_ATTRIBUTES: &[(&str, &str)] = &[
    ("RELATIVE_MEDIA_URL", "relative_url"),
    ("TIME_ORIGIN", "time_origin"),
    ("EXTRACTED_FROM", "extracted_from"),
];

fn append_text(tier: &mut Tier, id: AnnotationId, extra: &str) -> Result<(), PantierError> {
    if extra.trim().is_empty() {
        return Ok(());
    }
    let current = tier.get(id).map(Annotation::best_text).unwrap_or_default();
    let joined = join_texts([current.as_str(), extra]);
    tier.set_label(id, Some(text_to_label(&joined)))
}

fn join_texts<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn annotation_text(node: Node<'_, '_>, cve_values: &HashMap<String, String>) -> String {
    let text = child_element(node, "ANNOTATION_VALUE")
        .map(node_text)
        .unwrap_or_default();
    if text.trim().is_empty() {
        if let Some(value) = node.attribute("CVE_REF").and_then(|r| cve_values.get(r)) {
            return value.clone();
        }
    }
    text
}

/// `ALIGNABLE_ANNOTATION` / `REF_ANNOTATION` elements of a tier, in order.
fn annotation_elements<'a, 'input: 'a>(
    tier: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    child_elements(tier, "ANNOTATION").flat_map(|ann| ann.children().filter(Node::is_element))
}

fn slot_value(
    node: Node<'_, '_>,
    attribute: &str,
    time_slots: &HashMap<String, Option<f64>>,
    path: &Path,
) -> Result<Option<f64>, PantierError> {
    let slot = required_attribute(node, attribute, path)?;
    time_slots
        .get(&slot)
        .copied()
        .ok_or_else(|| format_error(path, &format!("unknown time slot '{slot}'")))
}

fn parse_time_slots(
    root: Node<'_, '_>,
    path: &Path,
) -> Result<HashMap<String, Option<f64>>, PantierError> {
    let mut slots = HashMap::new();
    let Some(order) = child_element(root, "TIME_ORDER") else {
        return Ok(slots);
    };
    for slot in child_elements(order, "TIME_SLOT") {
        let id = required_attribute(slot, "TIME_SLOT_ID", path)?;
        let value = match slot.attribute("TIME_VALUE") {
            Some(raw) => {
                let ms: f64 = raw.trim().parse().map_err(|_| {
                    format_error(path, &format!("invalid TIME_VALUE '{raw}' in slot '{id}'"))
                })?;
                Some(ms / 1000.0)
            }
            None => None,
        };
        slots.insert(id, value);
    }
    Ok(slots)
}

fn parse_document_metadata(root: Node<'_, '_>, trs: &mut Transcription) {
    let metadata = &mut trs.metadata;
    for (attribute, key) in [("AUTHOR", "author"), ("DATE", "eaf_date")] {
        if let Some(value) = root.attribute(attribute).filter(|v| !v.is_empty()) {
            metadata.insert(key.to_string(), value.to_string());
        }
    }
    if let Some(header) = child_element(root, "HEADER") {
        for property in child_elements(header, "PROPERTY") {
            if let Some(name) = property.attribute("NAME") {
                metadata.insert(name.to_string(), node_text(property));
            }
        }
    }
    if let Some(locale) = child_element(root, "LOCALE") {
        for (attribute, key) in [
            ("LANGUAGE_CODE", "locale_language_code"),
            ("COUNTRY_CODE", "locale_country_code"),
            ("VARIANT", "locale_variant"),
        ] {
            if let Some(value) = locale.attribute(attribute).filter(|v| !v.is_empty()) {
                metadata.insert(key.to_string(), value.to_string());
            }
        }
    }
    for (n, language) in child_elements(root, "LANGUAGE").enumerate() {
        for (attribute, key) in [
            ("LANG_ID", "language_code"),
            ("LANG_LABEL", "language_name"),
            ("LANG_DEF", "language_url"),
        ] {
            if let Some(value) = language.attribute(attribute) {
                metadata.insert(format!("{key}_{}", n + 1), value.to_string());
            }
        }
    }
    for (n, license) in child_elements(root, "LICENSE").enumerate() {
        metadata.insert(format!("license_text_{}", n + 1), node_text(license));
        if let Some(url) = license.attribute("LICENSE_URL") {
            metadata.insert(format!("license_url_{}", n + 1), url.to_string());
        }
    }
}

/// Registers the header media; the first one is attached to every tier.
fn parse_media(root: Node<'_, '_>, trs: &mut Transcription) -> Option<Arc<Media>> {
    let header = child_element(root, "HEADER")?;
    let mut first = None;
    for descriptor in child_elements(header, "MEDIA_DESCRIPTOR") {
        let Some(url) = descriptor.attribute("MEDIA_URL") else {
            continue;
        };
        let mut media = Media::new(url);
        if let Some(mime) = descriptor.attribute("MIME_TYPE").filter(|m| !m.is_empty()) {
            media.mime_type = mime.to_string();
        }
        for (attribute, key) in MEDIA_ATTRIBUTES {
            if let Some(value) = descriptor.attribute(*attribute).filter(|v| !v.is_empty()) {
                media.metadata.insert(key.to_string(), value.to_string());
            }
        }
        let media = trs.add_media(media);
        first.get_or_insert(media);
    }
    first
}

/// Registers the vocabularies and returns CVE id -> value.
fn parse_vocabularies(root: Node<'_, '_>, trs: &mut Transcription) -> HashMap<String, String> {
    let mut cve_values = HashMap::new();
    for node in child_elements(root, "CONTROLLED_VOCABULARY") {
        let Some(name) = node.attribute("CV_ID") else {
            continue;
        };
        let description = node
            .attribute("DESCRIPTION")
            .map(str::to_string)
            .or_else(|| child_element(node, "DESCRIPTION").map(node_text))
            .unwrap_or_default();
        let mut cv = ControlledVocabulary::new(name).with_description(description);

        // Before EAF 2.8
        for entry in child_elements(node, "CV_ENTRY") {
            cv.add(
                Tag::text(node_text(entry)),
                entry.attribute("DESCRIPTION").unwrap_or_default(),
            );
        }
        // EAF 2.8 and later
        for entry in child_elements(node, "CV_ENTRY_ML") {
            let Some(value) = child_element(entry, "CVE_VALUE") else {
                continue;
            };
            let text = node_text(value);
            if let Some(id) = entry.attribute("CVE_ID") {
                cve_values.insert(id.to_string(), text.clone());
            }
            cv.add(
                Tag::text(text),
                value.attribute("DESCRIPTION").unwrap_or_default(),
            );
        }
        trs.add_ctrl_vocab(cv);
    }
    cve_values
}

fn node_text(node: Node<'_, '_>) -> String {
    node.children()
        .filter(Node::is_text)
        .filter_map(|n| n.text())
        .collect()
}

fn child_element<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|child| child.is_element() && child.tag_name().name() == tag)
}

fn child_elements<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    tag: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |child| child.is_element() && child.tag_name().name() == tag)
}

fn required_attribute(node: Node<'_, '_>, name: &str, path: &Path) -> Result<String, PantierError> {
    node.attribute(name).map(str::to_string).ok_or_else(|| {
        format_error(
            path,
            &format!("missing {name} in <{}>", node.tag_name().name()),
        )
    })
}

fn format_error(path: &Path, message: &str) -> PantierError {
    PantierError::FormatParse {
        format: FORMAT,
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// How a tier is laid out in the output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum TierLayout {
    TopLevel,
    IncludedIn,
    SymbolicAssociation,
}

impl TierLayout {
    fn type_prefix(self) -> &'static str {
        match self {
            TierLayout::TopLevel => "default-lt",
            TierLayout::IncludedIn => "included-in-lt",
            TierLayout::SymbolicAssociation => "symbolic-association-lt",
        }
    }

    fn constraint(self) -> Option<&'static str> {
        match self {
            TierLayout::TopLevel => None,
            TierLayout::IncludedIn => Some("Included_In"),
            TierLayout::SymbolicAssociation => Some("Symbolic_Association"),
        }
    }
}

struct OutTier<'t> {
    tier: Tier,
    source: &'t Tier,
    layout: TierLayout,
    parent: Option<usize>,
    linguistic_type: String,
    /// EAF id of each annotation, in tier order.
    ids: Vec<String>,
}

/// Keys the writer derives from dedicated EAF fields.
fn is_mapped_key(key: &str) -> bool {
    const PREFIXES: &[&str] = &[
        "language_code_",
        "language_name_",
        "language_url_",
        "license_text_",
        "license_url_",
        "locale_",
        "file_",
    ];
    matches!(key, "author" | "eaf_date" | "lastUsedAnnotationId")
        || PREFIXES.iter().any(|p| key.starts_with(p))
}

/// Serialize a transcription to an EAF string.
pub fn to_eaf_string(
    trs: &Transcription,
    options: &EafWriteOptions,
) -> Result<String, PantierError> {
    reject_disjoint(trs, FORMAT)?;
    reject_non_xml_chars(trs, FORMAT)?;

    let mut tiers: Vec<OutTier> = Vec::with_capacity(trs.len());
    for tier in trs.tiers() {
        let coerced = points_to_intervals(tier, options.point_epsilon)?;
        reject_overlaps(&coerced, FORMAT)?;
        tiers.push(OutTier {
            tier: coerced,
            source: tier,
            layout: TierLayout::TopLevel,
            parent: None,
            linguistic_type: String::new(),
            ids: Vec::new(),
        });
    }

    for link in trs.hierarchy().links() {
        let parent = trs.tiers().iter().position(|t| t.id() == &link.parent);
        let child = trs.tiers().iter().position(|t| t.id() == &link.child);
        if let (Some(parent), Some(child)) = (parent, child) {
            tiers[child].parent = Some(parent);
            tiers[child].layout = match link.kind {
                LinkKind::TimeAssociation => TierLayout::SymbolicAssociation,
                LinkKind::TimeAlignment => TierLayout::IncludedIn,
            };
        }
    }

    let mut next_annotation = 1usize;
    for out in &mut tiers {
        out.ids = (0..out.tier.len())
            .map(|_| {
                let id = format!("a{next_annotation}");
                next_annotation += 1;
                id
            })
            .collect();
    }

    // Reference tiers must find each annotation in their parent; otherwise
    // they are written as independent alignable tiers.
    let mut ref_targets: HashMap<usize, Vec<String>> = HashMap::new();
    for idx in 0..tiers.len() {
        if tiers[idx].layout != TierLayout::SymbolicAssociation {
            continue;
        }
        let Some(parent) = tiers[idx].parent else { continue };
        match resolve_references(&tiers[parent], &tiers[idx]) {
            Some(targets) => {
                ref_targets.insert(idx, targets);
            }
            None => {
                tracing::warn!(
                    tier = tiers[idx].tier.name(),
                    "annotations do not match their parent; written as an independent tier"
                );
                tiers[idx].layout = TierLayout::TopLevel;
                tiers[idx].parent = None;
            }
        }
    }

    let mut linguistic_types: BTreeMap<String, (TierLayout, Option<String>)> = BTreeMap::new();
    for out in &mut tiers {
        let vocabulary = out.source.ctrl_vocab().map(|cv| cv.name().to_string());
        let id = match &vocabulary {
            Some(cv) => format!("{}-{}", out.layout.type_prefix(), cv),
            None => out.layout.type_prefix().to_string(),
        };
        linguistic_types.insert(id.clone(), (out.layout, vocabulary));
        out.linguistic_type = id;
    }

    // Phase one: distinct (time, tier) pairs; phase two: sorted slot ids.
    let mut used: BTreeSet<(i64, usize)> = BTreeSet::new();
    for (idx, out) in tiers.iter().enumerate() {
        if out.layout == TierLayout::SymbolicAssociation {
            continue;
        }
        for annotation in out.tier.iter() {
            let iv = best_interval(annotation)?;
            used.insert((to_ms(iv.begin().midpoint()), idx));
            used.insert((to_ms(iv.end().midpoint()), idx));
        }
    }
    let slots: HashMap<(i64, usize), String> = used
        .iter()
        .enumerate()
        .map(|(n, key)| (*key, format!("ts{}", n + 1)))
        .collect();

    let language = trs
        .metadata
        .get("language_code_1")
        .cloned()
        .unwrap_or_else(|| UNDETERMINED_LANGUAGE.to_string());

    let mut xml = String::new();
    writeln!(xml, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>").expect("write to string");
    writeln!(
        xml,
        "<ANNOTATION_DOCUMENT AUTHOR=\"{}\" DATE=\"{}\" FORMAT=\"{v}\" VERSION=\"{v}\" xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" xsi:noNamespaceSchemaLocation=\"http://www.mpi.nl/tools/elan/EAFv{v}.xsd\">",
        xml_escape(trs.metadata.get("author").map(String::as_str).unwrap_or_default()),
        xml_escape(&document_date(trs)),
        v = EAF_VERSION
    )
    .expect("write to string");

    write_licenses(&mut xml, trs);
    write_header(&mut xml, trs, next_annotation - 1);

    writeln!(xml, "    <TIME_ORDER>").expect("write to string");
    for (ms, idx) in &used {
        writeln!(
            xml,
            "        <TIME_SLOT TIME_SLOT_ID=\"{}\" TIME_VALUE=\"{}\"/>",
            slots[&(*ms, *idx)],
            ms
        )
        .expect("write to string");
    }
    writeln!(xml, "    </TIME_ORDER>").expect("write to string");

    for (idx, out) in tiers.iter().enumerate() {
        write_tier(&mut xml, idx, out, &tiers, &slots, ref_targets.get(&idx))?;
    }

    for (id, (layout, vocabulary)) in &linguistic_types {
        write!(
            xml,
            "    <LINGUISTIC_TYPE LINGUISTIC_TYPE_ID=\"{}\" TIME_ALIGNABLE=\"{}\" GRAPHIC_REFERENCES=\"false\"",
            xml_escape(id),
            *layout != TierLayout::SymbolicAssociation
        )
        .expect("write to string");
        if let Some(constraint) = layout.constraint() {
            write!(xml, " CONSTRAINTS=\"{constraint}\"").expect("write to string");
        }
        if let Some(cv) = vocabulary {
            write!(xml, " CONTROLLED_VOCABULARY_REF=\"{}\"", xml_escape(cv))
                .expect("write to string");
        }
        xml.push_str("/>\n");
    }

    write_locale_and_languages(&mut xml, trs, &language);

    let constraints: BTreeSet<&str> = linguistic_types
        .values()
        .filter_map(|(layout, _)| layout.constraint())
        .collect();
    for constraint in constraints {
        let description = match constraint {
            "Included_In" => "Time alignable annotations within the parent annotation's time interval, gaps are allowed",
            _ => "1-1 association with a parent annotation",
        };
        writeln!(
            xml,
            "    <CONSTRAINT DESCRIPTION=\"{description}\" STEREOTYPE=\"{constraint}\"/>"
        )
        .expect("write to string");
    }

    for cv in trs.ctrl_vocabs() {
        write_vocabulary(&mut xml, cv, &language);
    }

    writeln!(xml, "</ANNOTATION_DOCUMENT>").expect("write to string");
    Ok(xml)
}

/// For each child annotation, the EAF id of the parent annotation at the
/// same place.
fn resolve_references(parent: &OutTier<'_>, child: &OutTier<'_>) -> Option<Vec<String>> {
    let mut targets = Vec::with_capacity(child.tier.len());
    for annotation in child.tier.iter() {
        let iv = best_interval(annotation).ok()?;
        let idx = parent.tier.annotations().iter().position(|p| {
            best_interval(p).is_ok_and(|piv| piv == iv)
        })?;
        targets.push(parent.ids[idx].clone());
    }
    Some(targets)
}

fn write_tier(
    xml: &mut String,
    idx: usize,
    out: &OutTier<'_>,
    tiers: &[OutTier<'_>],
    slots: &HashMap<(i64, usize), String>,
    ref_targets: Option<&Vec<String>>,
) -> Result<(), PantierError> {
    let metadata = &out.source.metadata;
    write!(
        xml,
        "    <TIER LINGUISTIC_TYPE_REF=\"{}\" TIER_ID=\"{}\"",
        xml_escape(&out.linguistic_type),
        xml_escape(out.tier.name())
    )
    .expect("write to string");
    for (attribute, key) in [
        ("PARTICIPANT", "speaker_name"),
        ("ANNOTATOR", "annotator_name"),
        ("DEFAULT_LOCALE", "language"),
    ] {
        if let Some(value) = metadata.get(key) {
            write!(xml, " {attribute}=\"{}\"", xml_escape(value)).expect("write to string");
        }
    }
    if let Some(parent) = out.parent {
        write!(xml, " PARENT_REF=\"{}\"", xml_escape(tiers[parent].tier.name()))
            .expect("write to string");
    }
    if out.tier.is_empty() {
        xml.push_str("/>\n");
        return Ok(());
    }
    xml.push_str(">\n");

    let cv = out.source.ctrl_vocab().map(|cv| &**cv);
    let mut previous: Option<&str> = None;
    for (n, annotation) in out.tier.iter().enumerate() {
        let id = &out.ids[n];
        let text = label_to_text(annotation.label());
        let cve_ref = cve_reference(cv, annotation, out.tier.is_case_sensitive());
        writeln!(xml, "        <ANNOTATION>").expect("write to string");
        match ref_targets {
            Some(targets) => {
                write!(
                    xml,
                    "            <REF_ANNOTATION ANNOTATION_ID=\"{id}\" ANNOTATION_REF=\"{}\"",
                    targets[n]
                )
                .expect("write to string");
                if let Some(prev) = previous.filter(|_| n > 0 && targets[n - 1] == targets[n]) {
                    write!(xml, " PREVIOUS_ANNOTATION=\"{prev}\"").expect("write to string");
                }
                write_annotation_tail(xml, cve_ref, &text, "REF_ANNOTATION");
            }
            None => {
                let iv = best_interval(annotation)?;
                write!(
                    xml,
                    "            <ALIGNABLE_ANNOTATION ANNOTATION_ID=\"{id}\" TIME_SLOT_REF1=\"{}\" TIME_SLOT_REF2=\"{}\"",
                    slots[&(to_ms(iv.begin().midpoint()), idx)],
                    slots[&(to_ms(iv.end().midpoint()), idx)]
                )
                .expect("write to string");
                write_annotation_tail(xml, cve_ref, &text, "ALIGNABLE_ANNOTATION");
            }
        }
        writeln!(xml, "        </ANNOTATION>").expect("write to string");
        previous = Some(id.as_str());
    }
    writeln!(xml, "    </TIER>").expect("write to string");
    Ok(())
}

fn write_annotation_tail(xml: &mut String, cve_ref: Option<String>, text: &str, element: &str) {
    if let Some(cve) = cve_ref {
        write!(xml, " CVE_REF=\"{cve}\"").expect("write to string");
    }
    xml.push_str(">\n");
    writeln!(
        xml,
        "                <ANNOTATION_VALUE>{}</ANNOTATION_VALUE>",
        xml_escape(text)
    )
    .expect("write to string");
    writeln!(xml, "            </{element}>").expect("write to string");
}

fn cve_reference(
    cv: Option<&ControlledVocabulary>,
    annotation: &Annotation,
    case_sensitive: bool,
) -> Option<String> {
    let cv = cv?;
    let label = annotation.label()?;
    if label.has_alternatives() {
        return None;
    }
    cv.position(label.best(), case_sensitive)
        .map(|n| cve_id(cv, n))
}

fn cve_id(cv: &ControlledVocabulary, n: usize) -> String {
    format!("cveid_{}_{}", cv.name().replace(char::is_whitespace, "_"), n)
}

fn write_licenses(xml: &mut String, trs: &Transcription) {
    for n in 1.. {
        let Some(text) = trs.metadata.get(&format!("license_text_{n}")) else {
            break;
        };
        let url = trs
            .metadata
            .get(&format!("license_url_{n}"))
            .map(String::as_str)
            .unwrap_or_default();
        writeln!(
            xml,
            "    <LICENSE LICENSE_URL=\"{}\">{}</LICENSE>",
            xml_escape(url),
            xml_escape(text)
        )
        .expect("write to string");
    }
}

fn write_header(xml: &mut String, trs: &Transcription, last_annotation: usize) {
    writeln!(xml, "    <HEADER MEDIA_FILE=\"\" TIME_UNITS=\"milliseconds\">")
        .expect("write to string");
    for media in trs.media() {
        write!(
            xml,
            "        <MEDIA_DESCRIPTOR MEDIA_URL=\"{}\" MIME_TYPE=\"{}\"",
            xml_escape(&media.url),
            xml_escape(&media.mime_type)
        )
        .expect("write to string");
        for (attribute, key) in MEDIA_ATTRIBUTES {
            if let Some(value) = media.metadata.get(*key) {
                write!(xml, " {attribute}=\"{}\"", xml_escape(value)).expect("write to string");
            }
        }
        xml.push_str("/>\n");
    }
    for (key, value) in trs.metadata.iter().filter(|(k, _)| !is_mapped_key(k)) {
        writeln!(
            xml,
            "        <PROPERTY NAME=\"{}\">{}</PROPERTY>",
            xml_escape(key),
            xml_escape(value)
        )
        .expect("write to string");
    }
    writeln!(
        xml,
        "        <PROPERTY NAME=\"lastUsedAnnotationId\">{last_annotation}</PROPERTY>"
    )
    .expect("write to string");
    writeln!(xml, "    </HEADER>").expect("write to string");
}

fn write_locale_and_languages(xml: &mut String, trs: &Transcription, language: &str) {
    if let Some(code) = trs.metadata.get("locale_language_code") {
        write!(xml, "    <LOCALE LANGUAGE_CODE=\"{}\"", xml_escape(code)).expect("write to string");
        for (attribute, key) in [
            ("COUNTRY_CODE", "locale_country_code"),
            ("VARIANT", "locale_variant"),
        ] {
            if let Some(value) = trs.metadata.get(key) {
                write!(xml, " {attribute}=\"{}\"", xml_escape(value)).expect("write to string");
            }
        }
        xml.push_str("/>\n");
    }

    let mut written = HashSet::new();
    for n in 1.. {
        let Some(code) = trs.metadata.get(&format!("language_code_{n}")) else {
            break;
        };
        write!(xml, "    <LANGUAGE LANG_ID=\"{}\"", xml_escape(code)).expect("write to string");
        for (attribute, key) in [("LANG_DEF", "language_url"), ("LANG_LABEL", "language_name")] {
            if let Some(value) = trs.metadata.get(&format!("{key}_{n}")) {
                write!(xml, " {attribute}=\"{}\"", xml_escape(value)).expect("write to string");
            }
        }
        xml.push_str("/>\n");
        written.insert(code.clone());
    }
    if !trs.ctrl_vocabs().is_empty() && !written.contains(language) {
        writeln!(
            xml,
            "    <LANGUAGE LANG_ID=\"{}\" LANG_LABEL=\"undetermined ({})\"/>",
            xml_escape(language),
            xml_escape(language)
        )
        .expect("write to string");
    }
}

fn write_vocabulary(xml: &mut String, cv: &ControlledVocabulary, language: &str) {
    writeln!(xml, "    <CONTROLLED_VOCABULARY CV_ID=\"{}\">", xml_escape(cv.name()))
        .expect("write to string");
    writeln!(
        xml,
        "        <DESCRIPTION LANG_REF=\"{}\">{}</DESCRIPTION>",
        xml_escape(language),
        xml_escape(&cv.description)
    )
    .expect("write to string");
    for (n, (tag, description)) in cv.entries().iter().enumerate() {
        writeln!(xml, "        <CV_ENTRY_ML CVE_ID=\"{}\">", xml_escape(&cve_id(cv, n)))
            .expect("write to string");
        writeln!(
            xml,
            "            <CVE_VALUE DESCRIPTION=\"{}\" LANG_REF=\"{}\">{}</CVE_VALUE>",
            xml_escape(description),
            xml_escape(language),
            xml_escape(&tag.content())
        )
        .expect("write to string");
        writeln!(xml, "        </CV_ENTRY_ML>").expect("write to string");
    }
    writeln!(xml, "    </CONTROLLED_VOCABULARY>").expect("write to string");
}

fn document_date(trs: &Transcription) -> String {
    trs.metadata
        .get("eaf_date")
        .or_else(|| trs.metadata.get("file_write_date"))
        .cloned()
        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339())
}

fn to_ms(seconds: f64) -> i64 {
    (seconds * 1000.0).round() as i64
}
