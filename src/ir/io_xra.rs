//! XRA reader and writer: the native, lossless XML format.
//!
//! Every feature of the model is represented: scored alternative
//! localizations (points with radius, intervals, disjoint sets), scored
//! alternative typed tags, metadata at every level, media, controlled
//! vocabularies and hierarchy links.
//!
//! Layout:
//!
//! ```text
//! <Document format="1.5" name="...">
//!   <Metadata><Entry key="k">v</Entry></Metadata>
//!   <Tier id="..." tiername="..." casesensitive="true">
//!     <Metadata>...</Metadata>
//!     <Annotation>
//!       <Metadata>...</Metadata>
//!       <Location>
//!         <Interval score="0.8"><Begin midpoint="0.1" radius="0.005"/><End midpoint="0.5"/></Interval>
//!       </Location>
//!       <Label><Tag score="0.9" type="str">text</Tag></Label>
//!     </Annotation>
//!   </Tier>
//!   <Media id="..." url="..." mimetype="..."><Metadata/><Tier id="..."/></Media>
//!   <Hierarchy><Link hierarchyType="TimeAlignment" from="parent-id" to="child-id"/></Hierarchy>
//!   <Vocabulary id="name" description="..."><Entry type="str" description="...">tag</Entry><Tier id="..."/></Vocabulary>
//! </Document>
//! ```
//!
//! Floats are written with Rust's shortest round-trip formatting, so times
//! and scores read back bit-identical.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use roxmltree::{Document, Node};

use super::annotation::Annotation;
use super::hierarchy::LinkKind;
use super::ids::TierId;
use super::interval::{Disjoint, Interval};
use super::io_common::{read_text, reject_non_xml_chars, sniff, write_atomic, xml_escape};
use super::label::Label;
use super::location::{Localization, Location};
use super::media::Media;
use super::point::Point;
use super::tag::{Tag, ValueType};
use super::tier::Tier;
use super::transcription::Transcription;
use super::vocabulary::ControlledVocabulary;
use crate::error::PantierError;

const FORMAT: &str = "xra";
const XRA_VERSION: &str = "1.5";

/// Read an XRA file.
pub fn read_xra(path: &Path) -> Result<Transcription, PantierError> {
    let xml = read_text(path)?;
    parse_xra_str(&xml, path)
}

/// Write a transcription as XRA.
pub fn write_xra(path: &Path, trs: &Transcription) -> Result<(), PantierError> {
    let xml = to_xra_string(trs)?;
    write_atomic(path, xml.as_bytes())
}

/// Parse XRA from a string.
pub fn from_xra_str(xml: &str) -> Result<Transcription, PantierError> {
    parse_xra_str(xml, Path::new("<string>"))
}

/// Parse XRA from bytes (must be valid UTF-8).
pub fn from_xra_slice(bytes: &[u8]) -> Result<Transcription, PantierError> {
    let xml = std::str::from_utf8(bytes).map_err(|source| PantierError::Encoding {
        path: PathBuf::from("<bytes>"),
        message: format!("input is not valid UTF-8: {source}"),
    })?;
    parse_xra_str(xml, Path::new("<bytes>"))
}

/// True if the file looks like an XRA document.
pub fn detect_xra(path: &Path) -> bool {
    sniff(path).is_some_and(|head| head.contains("<Document") && head.contains("<Tier"))
}

fn parse_xra_str(xml: &str, path: &Path) -> Result<Transcription, PantierError> {
    let document = Document::parse(xml).map_err(|source| PantierError::XmlParse {
        format: FORMAT,
        path: path.to_path_buf(),
        source,
    })?;
    let root = document.root_element();
    if root.tag_name().name() != "Document" {
        return Err(format_error(path, "missing <Document> root element"));
    }

    let mut trs = Transcription::new(root.attribute("name").unwrap_or_default());
    if let Some(meta) = child_element(root, "Metadata") {
        trs.metadata = parse_metadata(meta);
    }

    // Media and vocabularies are registered first so that the document
    // lists keep their file order; tiers then pick their shared copies.
    let mut tier_media: HashMap<String, Arc<Media>> = HashMap::new();
    for node in child_elements(root, "Media") {
        let id = required_attribute(node, "id", path)?;
        let mut media = Media::new(node.attribute("url").unwrap_or_default()).with_id(id);
        if let Some(mime) = node.attribute("mimetype") {
            media.mime_type = mime.to_string();
        }
        if let Some(meta) = child_element(node, "Metadata") {
            media.metadata = parse_metadata(meta);
        }
        let media = trs.add_media(media);
        for tier_ref in child_elements(node, "Tier") {
            tier_media.insert(required_attribute(tier_ref, "id", path)?, media.clone());
        }
    }

    let mut tier_vocab: HashMap<String, Arc<ControlledVocabulary>> = HashMap::new();
    for node in child_elements(root, "Vocabulary") {
        let name = required_attribute(node, "id", path)?;
        let mut cv = ControlledVocabulary::new(name)
            .with_description(node.attribute("description").unwrap_or_default());
        for entry in child_elements(node, "Entry") {
            let tag = parse_tag(entry, path)?;
            cv.add(tag, entry.attribute("description").unwrap_or_default());
        }
        let cv = trs.add_ctrl_vocab(cv);
        for tier_ref in child_elements(node, "Tier") {
            tier_vocab.insert(required_attribute(tier_ref, "id", path)?, cv.clone());
        }
    }

    for node in child_elements(root, "Tier") {
        let tier = parse_tier(node, path, &tier_media, &tier_vocab)?;
        trs.append(tier)?;
    }

    if let Some(hierarchy) = child_element(root, "Hierarchy") {
        for link in child_elements(hierarchy, "Link") {
            let kind_name = required_attribute(link, "hierarchyType", path)?;
            let kind = LinkKind::from_name(&kind_name).ok_or_else(|| {
                format_error(path, &format!("unknown hierarchy type '{kind_name}'"))
            })?;
            let parent = TierId::new(required_attribute(link, "from", path)?);
            let child = TierId::new(required_attribute(link, "to", path)?);
            if let Err(err) = trs.add_hierarchy_link(kind, &parent, &child) {
                tracing::warn!(path = %path.display(), "hierarchy link ignored: {err}");
            }
        }
    }

    Ok(trs)
}

fn parse_tier(
    node: Node<'_, '_>,
    path: &Path,
    media: &HashMap<String, Arc<Media>>,
    vocabs: &HashMap<String, Arc<ControlledVocabulary>>,
) -> Result<Tier, PantierError> {
    let name = required_attribute(node, "tiername", path)?;
    let mut tier = match node.attribute("id") {
        Some(id) => Tier::with_id(TierId::new(id), name),
        None => Tier::new(name),
    };
    tier.set_case_sensitive(node.attribute("casesensitive") == Some("true"));
    if let Some(meta) = child_element(node, "Metadata") {
        tier.metadata = parse_metadata(meta);
    }
    tier.set_media(media.get(tier.id().as_str()).cloned());

    for ann_node in child_elements(node, "Annotation") {
        let location_node = child_element(ann_node, "Location")
            .ok_or_else(|| format_error(path, "missing <Location> in <Annotation>"))?;
        let location = parse_location(location_node, path)?;
        let label = match child_element(ann_node, "Label") {
            Some(label_node) => parse_label(label_node, path)?,
            None => None,
        };
        let mut annotation = Annotation::new(location, label);
        if let Some(meta) = child_element(ann_node, "Metadata") {
            annotation.metadata = parse_metadata(meta);
        }
        tier.add_annotation(annotation)?;
    }

    if let Some(cv) = vocabs.get(tier.id().as_str()) {
        tier.set_ctrl_vocab(Some(cv.clone()))?;
    }
    Ok(tier)
}

fn parse_location(node: Node<'_, '_>, path: &Path) -> Result<Location, PantierError> {
    let mut alternatives = Vec::new();
    for child in node.children().filter(Node::is_element) {
        let localization = match child.tag_name().name() {
            "Point" => Localization::Point(parse_point(child, path)?),
            "Interval" => Localization::Interval(parse_interval(child, path)?),
            "Disjoint" => {
                let intervals = child_elements(child, "Interval")
                    .map(|iv| parse_interval(iv, path))
                    .collect::<Result<Vec<_>, _>>()?;
                Localization::Disjoint(Disjoint::new(intervals)?)
            }
            other => {
                return Err(format_error(
                    path,
                    &format!("unexpected <{other}> in <Location>"),
                ))
            }
        };
        alternatives.push((localization, optional_f64(child, "score", path)?));
    }
    Location::with_alternatives(alternatives)
}

fn parse_interval(node: Node<'_, '_>, path: &Path) -> Result<Interval, PantierError> {
    let begin = child_element(node, "Begin")
        .ok_or_else(|| format_error(path, "missing <Begin> in <Interval>"))?;
    let end = child_element(node, "End")
        .ok_or_else(|| format_error(path, "missing <End> in <Interval>"))?;
    Interval::new(parse_point(begin, path)?, parse_point(end, path)?)
}

fn parse_point(node: Node<'_, '_>, path: &Path) -> Result<Point, PantierError> {
    let midpoint = optional_f64(node, "midpoint", path)?.ok_or_else(|| {
        format_error(
            path,
            &format!("missing midpoint in <{}>", node.tag_name().name()),
        )
    })?;
    Point::new(midpoint, optional_f64(node, "radius", path)?)
}

fn parse_label(node: Node<'_, '_>, path: &Path) -> Result<Option<Label>, PantierError> {
    let mut alternatives = Vec::new();
    for tag_node in child_elements(node, "Tag") {
        alternatives.push((parse_tag(tag_node, path)?, optional_f64(tag_node, "score", path)?));
    }
    Ok(Label::from_alternatives(alternatives))
}

fn parse_tag(node: Node<'_, '_>, path: &Path) -> Result<Tag, PantierError> {
    let value_type = match node.attribute("type") {
        Some(name) => ValueType::from_name(name)
            .ok_or_else(|| format_error(path, &format!("unknown tag type '{name}'")))?,
        None => ValueType::Str,
    };
    Tag::new(&node_text(node), value_type)
}

fn parse_metadata(node: Node<'_, '_>) -> BTreeMap<String, String> {
    child_elements(node, "Entry")
        .filter_map(|entry| {
            entry
                .attribute("key")
                .map(|key| (key.to_string(), node_text(entry)))
        })
        .collect()
}

/// Concatenated text content, keeping whitespace.
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
            &format!("missing '{name}' attribute in <{}>", node.tag_name().name()),
        )
    })
}

fn optional_f64(node: Node<'_, '_>, name: &str, path: &Path) -> Result<Option<f64>, PantierError> {
    match node.attribute(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<f64>().map(Some).map_err(|_| {
            format_error(
                path,
                &format!("invalid {name} '{raw}' in <{}>", node.tag_name().name()),
            )
        }),
    }
}

fn format_error(path: &Path, message: &str) -> PantierError {
    PantierError::FormatParse {
        format: FORMAT,
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

/// Serialize a transcription to an XRA string.
pub fn to_xra_string(trs: &Transcription) -> Result<String, PantierError> {
    reject_non_xml_chars(trs, FORMAT)?;

    let mut xml = String::new();
    writeln!(xml, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>").expect("write to string");
    writeln!(
        xml,
        "<Document format=\"{}\" name=\"{}\">",
        XRA_VERSION,
        xml_escape(trs.name())
    )
    .expect("write to string");
    write_metadata(&mut xml, &trs.metadata, 1);

    for tier in trs.tiers() {
        write!(
            xml,
            "  <Tier id=\"{}\" tiername=\"{}\"",
            xml_escape(tier.id().as_str()),
            xml_escape(tier.name())
        )
        .expect("write to string");
        if tier.is_case_sensitive() {
            xml.push_str(" casesensitive=\"true\"");
        }
        xml.push_str(">\n");
        write_metadata(&mut xml, &tier.metadata, 2);
        for annotation in tier.iter() {
            write_annotation(&mut xml, annotation);
        }
        writeln!(xml, "  </Tier>").expect("write to string");
    }

    for media in trs.media() {
        writeln!(
            xml,
            "  <Media id=\"{}\" url=\"{}\" mimetype=\"{}\">",
            xml_escape(&media.id),
            xml_escape(&media.url),
            xml_escape(&media.mime_type)
        )
        .expect("write to string");
        write_metadata(&mut xml, &media.metadata, 2);
        for tier in trs.tiers() {
            if tier.media().is_some_and(|m| m.id == media.id) {
                writeln!(xml, "    <Tier id=\"{}\"/>", xml_escape(tier.id().as_str()))
                    .expect("write to string");
            }
        }
        writeln!(xml, "  </Media>").expect("write to string");
    }

    if !trs.hierarchy().is_empty() {
        writeln!(xml, "  <Hierarchy>").expect("write to string");
        for link in trs.hierarchy().links() {
            writeln!(
                xml,
                "    <Link hierarchyType=\"{}\" from=\"{}\" to=\"{}\"/>",
                link.kind,
                xml_escape(link.parent.as_str()),
                xml_escape(link.child.as_str())
            )
            .expect("write to string");
        }
        writeln!(xml, "  </Hierarchy>").expect("write to string");
    }

    for cv in trs.ctrl_vocabs() {
        writeln!(
            xml,
            "  <Vocabulary id=\"{}\" description=\"{}\">",
            xml_escape(cv.name()),
            xml_escape(&cv.description)
        )
        .expect("write to string");
        for (tag, description) in cv.entries() {
            writeln!(
                xml,
                "    <Entry type=\"{}\" description=\"{}\">{}</Entry>",
                tag.value_type(),
                xml_escape(description),
                xml_escape(&tag.content())
            )
            .expect("write to string");
        }
        for tier in trs.tiers() {
            if tier.ctrl_vocab().is_some_and(|v| v.name() == cv.name()) {
                writeln!(xml, "    <Tier id=\"{}\"/>", xml_escape(tier.id().as_str()))
                    .expect("write to string");
            }
        }
        writeln!(xml, "  </Vocabulary>").expect("write to string");
    }

    writeln!(xml, "</Document>").expect("write to string");
    Ok(xml)
}

fn write_annotation(xml: &mut String, annotation: &Annotation) {
    writeln!(xml, "    <Annotation>").expect("write to string");
    write_metadata(xml, &annotation.metadata, 3);
    writeln!(xml, "      <Location>").expect("write to string");
    for (localization, score) in annotation.location().alternatives() {
        write_localization(xml, localization, *score);
    }
    writeln!(xml, "      </Location>").expect("write to string");
    if let Some(label) = annotation.label() {
        writeln!(xml, "      <Label>").expect("write to string");
        for (tag, score) in label.alternatives() {
            writeln!(
                xml,
                "        <Tag{} type=\"{}\">{}</Tag>",
                score_attribute(*score),
                tag.value_type(),
                xml_escape(&tag.content())
            )
            .expect("write to string");
        }
        writeln!(xml, "      </Label>").expect("write to string");
    }
    writeln!(xml, "    </Annotation>").expect("write to string");
}

fn write_localization(xml: &mut String, localization: &Localization, score: Option<f64>) {
    let score = score_attribute(score);
    match localization {
        Localization::Point(p) => {
            writeln!(xml, "        <Point{}{}/>", point_attributes(p), score)
                .expect("write to string");
        }
        Localization::Interval(iv) => {
            writeln!(xml, "        {}", interval_element(iv, &score)).expect("write to string");
        }
        Localization::Disjoint(d) => {
            writeln!(xml, "        <Disjoint{score}>").expect("write to string");
            for iv in d.intervals() {
                writeln!(xml, "          {}", interval_element(iv, "")).expect("write to string");
            }
            writeln!(xml, "        </Disjoint>").expect("write to string");
        }
    }
}

fn interval_element(iv: &Interval, score: &str) -> String {
    format!(
        "<Interval{score}><Begin{}/><End{}/></Interval>",
        point_attributes(&iv.begin()),
        point_attributes(&iv.end())
    )
}

fn point_attributes(p: &Point) -> String {
    match p.radius() {
        Some(r) => format!(" midpoint=\"{}\" radius=\"{}\"", p.midpoint(), r),
        None => format!(" midpoint=\"{}\"", p.midpoint()),
    }
}

fn score_attribute(score: Option<f64>) -> String {
    score.map(|s| format!(" score=\"{s}\"")).unwrap_or_default()
}

fn write_metadata(xml: &mut String, metadata: &BTreeMap<String, String>, depth: usize) {
    if metadata.is_empty() {
        return;
    }
    let indent = "  ".repeat(depth);
    writeln!(xml, "{indent}<Metadata>").expect("write to string");
    for (key, value) in metadata {
        writeln!(
            xml,
            "{indent}  <Entry key=\"{}\">{}</Entry>",
            xml_escape(key),
            xml_escape(value)
        )
        .expect("write to string");
    }
    writeln!(xml, "{indent}</Metadata>").expect("write to string");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rich_document() -> Transcription {
        let mut trs = Transcription::new("rich");
        trs.metadata.insert("author".into(), "A & B <team>".into());

        let media = trs.add_media(Media::new("talk.wav").with_id("m1"));
        let cv = trs.add_ctrl_vocab(
            ControlledVocabulary::new("yn")
                .with_description("yes or no")
                .with_entry("yes", "")
                .with_entry("no", "negative"),
        );

        let mut words = Tier::with_id(TierId::new("t-words"), "words");
        words.set_media(Some(media));
        let mut loc = Location::new(Interval::from_secs(0.0, 1.0).unwrap());
        loc.add_alternative(Interval::from_secs(0.05, 0.95).unwrap(), Some(0.7))
            .unwrap();
        let mut label = Label::scored("hello", 0.9);
        label.add_alternative(Tag::text("halo"), Some(0.1));
        words
            .add_annotation(Annotation::new(loc, Some(label)).with_metadata("id", "a1"))
            .unwrap();
        words
            .create_annotation(Interval::from_secs(1.0, 2.5).unwrap(), None)
            .unwrap();
        trs.append(words).unwrap();

        let mut answers = Tier::with_id(TierId::new("t-yn"), "answers");
        answers
            .create_annotation(Interval::from_secs(0.0, 1.0).unwrap(), Some(Label::from("yes")))
            .unwrap();
        answers.set_ctrl_vocab(Some(cv)).unwrap();
        trs.append(answers).unwrap();

        let mut marks = Tier::with_id(TierId::new("t-marks"), "marks");
        marks
            .create_annotation(
                Point::new(0.5, Some(0.01)).unwrap(),
                Some(Label::new(Tag::new("42", ValueType::Int).unwrap())),
            )
            .unwrap();
        trs.append(marks).unwrap();

        let mut spans = Tier::with_id(TierId::new("t-spans"), "spans");
        let disjoint = Disjoint::new(vec![
            Interval::from_secs(0.0, 0.5).unwrap(),
            Interval::from_secs(1.5, 2.0).unwrap(),
        ])
        .unwrap();
        spans
            .create_annotation(Location::new(disjoint), Some(Label::from("x")))
            .unwrap();
        trs.append(spans).unwrap();
        trs
    }

    #[test]
    fn round_trip_is_lossless() {
        let trs = rich_document();
        let xml = to_xra_string(&trs).unwrap();
        let back = from_xra_str(&xml).unwrap();
        assert_eq!(back, trs);
        assert!(xml.contains("A &amp; B &lt;team&gt;"));
    }

    #[test]
    fn hierarchy_survives_round_trip() {
        let mut trs = Transcription::new("h");
        for (id, name) in [("p", "parent"), ("c", "child")] {
            let mut tier = Tier::with_id(TierId::new(id), name);
            tier.create_annotation(Interval::from_secs(0.0, 1.0).unwrap(), Some(Label::from("a")))
                .unwrap();
            trs.append(tier).unwrap();
        }
        trs.add_hierarchy_link(LinkKind::TimeAlignment, &TierId::new("p"), &TierId::new("c"))
            .unwrap();
        let back = from_xra_str(&to_xra_string(&trs).unwrap()).unwrap();
        assert_eq!(back.hierarchy().links().len(), 1);
        assert_eq!(back, trs);
    }

    #[test]
    fn whitespace_controls_survive_round_trip() {
        let mut trs = Transcription::new("ws");
        trs.metadata.insert("note".into(), "l1\r\nl2".into());
        let tier = trs.create_tier("a\tb").unwrap();
        tier.metadata.insert("tabs".into(), "x\ty".into());
        tier.create_annotation(
            Interval::from_secs(0.0, 1.0).unwrap(),
            Some(Label::from("first\r\nsecond")),
        )
        .unwrap();

        let xml = to_xra_string(&trs).unwrap();
        assert!(xml.contains("tiername=\"a&#9;b\""));
        let back = from_xra_str(&xml).unwrap();
        assert_eq!(back.tiers()[0].name(), "a\tb");
        assert_eq!(back.metadata["note"], "l1\r\nl2");
        assert_eq!(back.tiers()[0].metadata["tabs"], "x\ty");
        assert_eq!(back, trs);
    }

    #[test]
    fn control_characters_are_a_write_error() {
        let mut trs = Transcription::new("ctl");
        trs.create_tier("words")
            .unwrap()
            .create_annotation(Interval::from_secs(0.0, 1.0).unwrap(), Some(Label::from("a\u{1}b")))
            .unwrap();
        let err = to_xra_string(&trs).unwrap_err();
        assert!(matches!(
            err,
            PantierError::InvalidXmlChar { format: "xra", character: '\u{1}', .. }
        ));
    }

    #[test]
    fn rejects_wrong_root_and_bad_numbers() {
        assert!(from_xra_str("<Other/>").is_err());
        let bad = r#"<Document><Tier id="t" tiername="t"><Annotation><Location><Point midpoint="abc"/></Location></Annotation></Tier></Document>"#;
        let err = from_xra_str(bad).unwrap_err();
        assert!(matches!(err, PantierError::FormatParse { .. }));
    }
}
