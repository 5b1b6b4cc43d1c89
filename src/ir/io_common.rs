//! Helpers shared by the format readers and writers.
//!
//! Decoding, atomic writes, time formatting and the write-side degradation
//! rules (point coercion, gap filling, capability checks) live here so that
//! every adapter applies them the same way.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read as _, Write as _};
use std::path::Path;

use tempfile::NamedTempFile;

use super::annotation::Annotation;
use super::interval::Interval;
use super::label::Label;
use super::location::Localization;
use super::point::Point;
use super::tier::Tier;
use super::transcription::Transcription;
use crate::error::PantierError;

/// Default width of the interval a point is widened to, in seconds.
pub const DEFAULT_POINT_EPSILON: f64 = 0.02;

const SNIFF_LEN: u64 = 4096;

/// Decoded head of a file, for content detection.
///
/// Invalid sequences are replaced rather than rejected since the head may
/// cut a character in half.
pub fn sniff(path: &Path) -> Option<String> {
    let mut buf = Vec::new();
    File::open(path)
        .ok()?
        .take(SNIFF_LEN)
        .read_to_end(&mut buf)
        .ok()?;
    let even = |b: &[u8]| b.len() - b.len() % 2;
    let text = if let Some(rest) = buf.strip_prefix(&[0xFF, 0xFE]) {
        let units: Vec<u16> = rest[..even(rest)]
            .chunks_exact(2)
            .map(|p| u16::from_le_bytes([p[0], p[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else if let Some(rest) = buf.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest[..even(rest)]
            .chunks_exact(2)
            .map(|p| u16::from_be_bytes([p[0], p[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        let rest = buf.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(&buf);
        String::from_utf8_lossy(rest).into_owned()
    };
    Some(text)
}

/// Reads a text file, honouring UTF-8 and UTF-16 byte order marks.
pub fn read_text(path: &Path) -> Result<String, PantierError> {
    let bytes = fs::read(path)?;
    decode_text(&bytes, path)
}

/// Decodes bytes as UTF-8 (optionally BOM-prefixed) or BOM-marked UTF-16.
pub fn decode_text(bytes: &[u8], path: &Path) -> Result<String, PantierError> {
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return utf8(rest, path);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        return utf16(rest, path, u16::from_le_bytes);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        return utf16(rest, path, u16::from_be_bytes);
    }
    utf8(bytes, path)
}

fn utf8(bytes: &[u8], path: &Path) -> Result<String, PantierError> {
    String::from_utf8(bytes.to_vec()).map_err(|source| PantierError::Encoding {
        path: path.to_path_buf(),
        message: format!("input is not valid UTF-8: {source}"),
    })
}

fn utf16(bytes: &[u8], path: &Path, unit: fn([u8; 2]) -> u16) -> Result<String, PantierError> {
    if bytes.len() % 2 != 0 {
        return Err(PantierError::Encoding {
            path: path.to_path_buf(),
            message: "odd number of bytes in UTF-16 input".to_string(),
        });
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|source| PantierError::Encoding {
        path: path.to_path_buf(),
        message: format!("input is not valid UTF-16: {source}"),
    })
}

/// Writes `contents` to `path` through a temporary file in the same
/// directory, so a failed write never leaves a partial file behind.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), PantierError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| PantierError::Io(e.error))?;
    Ok(())
}

/// Formats seconds with at most six decimals and no trailing zeros.
pub fn format_time(seconds: f64) -> String {
    let rounded = (seconds * 1_000_000.0).round() / 1_000_000.0;
    if rounded == 0.0 {
        // avoids "-0"
        return "0".to_string();
    }
    rounded.to_string()
}

/// Parses a time value, reporting the offending line on failure.
pub fn parse_time(
    raw: &str,
    format: &'static str,
    path: &Path,
    line: usize,
) -> Result<f64, PantierError> {
    let value: f64 = raw.trim().parse().map_err(|_| PantierError::LineParse {
        format,
        path: path.to_path_buf(),
        line,
        message: format!("invalid time value '{}'", raw.trim()),
    })?;
    if !value.is_finite() {
        return Err(PantierError::LineParse {
            format,
            path: path.to_path_buf(),
            line,
            message: format!("invalid time value '{}'", raw.trim()),
        });
    }
    Ok(value)
}

/// Escapes text for XML content and attribute values.
///
/// Tabs and line breaks become character references so that attribute
/// normalization and end-of-line handling leave them intact on read.
pub fn xml_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(c),
        }
    }
    out
}

/// True for characters allowed by the XML 1.0 `Char` production.
pub fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r')
        || ('\u{20}'..='\u{D7FF}').contains(&c)
        || ('\u{E000}'..='\u{FFFD}').contains(&c)
        || c >= '\u{10000}'
}

fn check_xml_text(format: &'static str, context: &str, text: &str) -> Result<(), PantierError> {
    match text.chars().find(|c| !is_xml_char(*c)) {
        Some(character) => Err(PantierError::InvalidXmlChar {
            format,
            context: context.to_string(),
            character,
        }),
        None => Ok(()),
    }
}

fn check_xml_map(
    format: &'static str,
    context: &str,
    map: &BTreeMap<String, String>,
) -> Result<(), PantierError> {
    for (key, value) in map {
        check_xml_text(format, context, key)?;
        check_xml_text(format, &format!("{context} metadata '{key}'"), value)?;
    }
    Ok(())
}

/// Fails with `InvalidXmlChar` if any string the XML writers emit holds a
/// character that XML 1.0 cannot carry, even as a character reference.
pub fn reject_non_xml_chars(trs: &Transcription, format: &'static str) -> Result<(), PantierError> {
    check_xml_text(format, "transcription name", trs.name())?;
    check_xml_map(format, "transcription", &trs.metadata)?;

    for media in trs.media() {
        let context = format!("media '{}'", media.url);
        check_xml_text(format, &context, &media.id)?;
        check_xml_text(format, &context, &media.url)?;
        check_xml_text(format, &context, &media.mime_type)?;
        check_xml_map(format, &context, &media.metadata)?;
    }

    for cv in trs.ctrl_vocabs() {
        let context = format!("vocabulary '{}'", cv.name());
        check_xml_text(format, &context, cv.name())?;
        check_xml_text(format, &context, &cv.description)?;
        for (tag, description) in cv.entries() {
            check_xml_text(format, &context, &tag.content())?;
            check_xml_text(format, &context, description)?;
        }
    }

    for tier in trs.tiers() {
        let context = format!("tier '{}'", tier.name());
        check_xml_text(format, &context, tier.id().as_str())?;
        check_xml_text(format, &context, tier.name())?;
        check_xml_map(format, &context, &tier.metadata)?;
        for annotation in tier.iter() {
            let context = format!("{context} annotation {}", annotation.id());
            check_xml_map(format, &context, &annotation.metadata)?;
            if let Some(label) = annotation.label() {
                for tag in label.tags() {
                    check_xml_text(format, &format!("{context} label"), &tag.content())?;
                }
            }
        }
    }
    Ok(())
}

/// Fails with `DisjointUnsupported` if any tier holds disjoint localizations.
pub fn reject_disjoint(trs: &Transcription, format: &'static str) -> Result<(), PantierError> {
    match trs.tiers().iter().find(|t| t.is_disjoint()) {
        Some(tier) => Err(PantierError::DisjointUnsupported {
            format,
            tier: tier.name().to_string(),
        }),
        None => Ok(()),
    }
}

/// Fails with `CapabilityMismatch` if more than one tier is present.
pub fn require_single_tier(trs: &Transcription, format: &'static str) -> Result<(), PantierError> {
    if trs.len() > 1 {
        return Err(PantierError::CapabilityMismatch {
            format,
            message: format!("only one tier can be written, got {}", trs.len()),
        });
    }
    Ok(())
}

/// Fails with `CapabilityMismatch` if the tier has overlapping annotations.
pub fn reject_overlaps(tier: &Tier, format: &'static str) -> Result<(), PantierError> {
    if tier.has_overlaps() {
        return Err(PantierError::CapabilityMismatch {
            format,
            message: format!("tier '{}' has overlapping annotations", tier.name()),
        });
    }
    Ok(())
}

/// Best localization of an annotation as an interval.
///
/// Points become zero-width intervals; callers coerce point tiers first with
/// [`points_to_intervals`] when width matters.
pub fn best_interval(annotation: &Annotation) -> Result<Interval, PantierError> {
    match annotation.location().best() {
        Localization::Point(p) => Interval::new(*p, *p),
        Localization::Interval(iv) => Ok(*iv),
        Localization::Disjoint(d) => Interval::new(d.begin(), d.end()),
    }
}

/// Copies a point tier into an interval tier.
///
/// Each point becomes an interval of width `epsilon` (or twice its radius)
/// centred on it, clamped at zero and cut at the middle between neighbours
/// so that no two intervals overlap. Non-point tiers are returned as-is.
/// Only the best localization of each annotation is kept.
pub fn points_to_intervals(tier: &Tier, epsilon: f64) -> Result<Tier, PantierError> {
    if !tier.is_point() {
        return Ok(tier.clone());
    }
    let mut out = copy_tier_header(tier);
    let points: Vec<Point> = tier
        .iter()
        .map(|a| a.location().best().lowest())
        .collect();

    for (idx, annotation) in tier.iter().enumerate() {
        let p = points[idx];
        let half = match p.radius() {
            Some(r) if r > 0.0 => r,
            _ => epsilon / 2.0,
        };
        let mut begin = (p.midpoint() - half).max(0.0);
        let mut end = p.midpoint() + half;
        if idx > 0 {
            begin = begin.max((points[idx - 1].midpoint() + p.midpoint()) / 2.0);
        }
        if let Some(next) = points.get(idx + 1) {
            end = end.min((p.midpoint() + next.midpoint()) / 2.0);
        }
        let end = end.max(begin);
        let mut copy = Annotation::new(
            Interval::from_secs(begin, end)?,
            annotation.label().cloned(),
        );
        copy.metadata = annotation.metadata.clone();
        out.add_annotation(copy)?;
    }
    Ok(out)
}

/// Copies an interval tier, inserting empty intervals in every gap.
///
/// With `span`, leading and trailing gaps up to the given bounds are filled
/// too. Only the best localization of each annotation is kept.
pub fn fill_gaps(tier: &Tier, span: Option<(f64, f64)>) -> Result<Tier, PantierError> {
    let mut out = copy_tier_header(tier);
    let mut cursor = span.map(|(begin, _)| begin);

    for annotation in tier.iter() {
        let iv = best_interval(annotation)?;
        let begin = iv.begin().midpoint();
        if let Some(c) = cursor {
            if begin > c {
                out.create_annotation(Interval::from_secs(c, begin)?, Some(Label::new("")))?;
            }
        }
        let mut copy = Annotation::new(iv, annotation.label().cloned());
        copy.metadata = annotation.metadata.clone();
        out.add_annotation(copy)?;
        let end = iv.end().midpoint();
        cursor = Some(cursor.map_or(end, |c| c.max(end)));
    }
    if let (Some(c), Some((_, end))) = (cursor, span) {
        if end > c {
            out.create_annotation(Interval::from_secs(c, end)?, Some(Label::new("")))?;
        }
    }
    Ok(out)
}

fn copy_tier_header(tier: &Tier) -> Tier {
    let mut out = Tier::with_id(tier.id().clone(), tier.name());
    out.metadata = tier.metadata.clone();
    out.set_media(tier.media().cloned());
    out.set_case_sensitive(tier.is_case_sensitive());
    out
}

/// File stem used as a default transcription name.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_whitespace_as_character_references() {
        assert_eq!(xml_escape("a\tb"), "a&#9;b");
        assert_eq!(xml_escape("l1\r\nl2"), "l1&#13;&#10;l2");
        assert_eq!(xml_escape("<\"&'>"), "&lt;&quot;&amp;&apos;&gt;");
    }

    #[test]
    fn rejects_characters_xml_cannot_carry() {
        let mut trs = Transcription::new("doc");
        trs.create_tier("words").unwrap();
        assert!(reject_non_xml_chars(&trs, "XRA").is_ok());

        trs.metadata.insert("note".into(), "bell\u{7}".into());
        let err = reject_non_xml_chars(&trs, "XRA").unwrap_err();
        assert!(matches!(
            err,
            PantierError::InvalidXmlChar { character: '\u{7}', .. }
        ));
        assert!(is_xml_char('\u{10000}'));
        assert!(!is_xml_char('\u{FFFE}'));
    }

    #[test]
    fn decodes_boms() {
        let path = Path::new("<bytes>");
        assert_eq!(decode_text(b"\xEF\xBB\xBFabc", path).unwrap(), "abc");
        assert_eq!(decode_text(&[0xFF, 0xFE, b'h', 0, b'i', 0], path).unwrap(), "hi");
        assert_eq!(decode_text(&[0xFE, 0xFF, 0, b'h', 0, b'i'], path).unwrap(), "hi");
        assert!(decode_text(&[0xC3, 0x28], path).is_err());
    }

    #[test]
    fn formats_times_compactly() {
        assert_eq!(format_time(0.5), "0.5");
        assert_eq!(format_time(0.22), "0.22");
        assert_eq!(format_time(3.0), "3");
        assert_eq!(format_time(1.23456789), "1.234568");
        assert_eq!(format_time(-0.0000001), "0");
    }

    #[test]
    fn points_widen_without_overlapping() {
        let mut tier = Tier::new("marks");
        for t in [0.0, 1.0, 1.01] {
            tier.create_annotation(Point::exact(t), Some(Label::from("x")))
                .unwrap();
        }
        let out = points_to_intervals(&tier, DEFAULT_POINT_EPSILON).unwrap();
        assert!(out.is_interval());
        assert_eq!(out.len(), 3);
        assert!(!out.has_overlaps());
        let first = best_interval(&out.annotations()[0]).unwrap();
        assert_eq!(first.begin().midpoint(), 0.0);
        assert!((first.end().midpoint() - 0.01).abs() < 1e-9);
        let second = best_interval(&out.annotations()[1]).unwrap();
        assert!((second.end().midpoint() - 1.005).abs() < 1e-9);
    }

    #[test]
    fn gaps_are_filled_with_empty_intervals() {
        let mut tier = Tier::new("words");
        tier.create_annotation(Interval::from_secs(1.0, 2.0).unwrap(), Some(Label::from("a")))
            .unwrap();
        tier.create_annotation(Interval::from_secs(3.0, 4.0).unwrap(), Some(Label::from("b")))
            .unwrap();
        let out = fill_gaps(&tier, Some((0.0, 5.0))).unwrap();
        let texts: Vec<String> = out.iter().map(Annotation::best_text).collect();
        assert_eq!(texts, ["", "a", "", "b", ""]);
        assert!(!out.has_gaps());
    }

    #[test]
    fn atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.txt");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
    }
}
