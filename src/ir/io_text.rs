//! Raw text and Audacity label track reader and writer.
//!
//! A file whose first line is `begin<TAB>end<TAB>label` (Audacity) or
//! `begin;end;label` is read as timed, one annotation per line, into a tier
//! named `Trans`. When every row has `begin == end` the tier holds points.
//! Audacity spectral-selection lines (starting with `\`) are skipped.
//!
//! Any other file is untimed: each non-empty line becomes the interval
//! `[n, n+1]` (n counted from 0) and the tier carries the metadata
//! `raw_text_untimed=true`, so that writing it back gives the plain lines.
//!
//! Writing accepts a single tier and produces the Audacity layout. Disjoint
//! tiers are rejected, label alternatives are written as `{a|b}` and line
//! breaks in labels become spaces.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::interval::Interval;
use super::io_common::{
    best_interval, file_stem, format_time, parse_time, read_text, reject_disjoint,
    require_single_tier, sniff, write_atomic,
};
use super::location::Location;
use super::point::Point;
use super::text_label::{label_to_text, text_to_label};
use super::tier::Tier;
use super::transcription::Transcription;
use crate::error::PantierError;

const FORMAT: &str = "text";
const TIER_NAME: &str = "Trans";
/// Tier metadata key marking line-numbered (untimed) annotations.
pub const UNTIMED_KEY: &str = "raw_text_untimed";

/// Read a text or Audacity label file.
pub fn read_text_file(path: &Path) -> Result<Transcription, PantierError> {
    let text = read_text(path)?;
    parse_text(&text, path)
}

/// Write the single tier of a transcription as text.
pub fn write_text_file(path: &Path, trs: &Transcription) -> Result<(), PantierError> {
    let text = to_text_string(trs)?;
    write_atomic(path, text.as_bytes())
}

/// Parse text from a string.
pub fn from_text_str(text: &str) -> Result<Transcription, PantierError> {
    parse_text(text, Path::new("<string>"))
}

/// Parse text from bytes (must be valid UTF-8).
pub fn from_text_slice(bytes: &[u8]) -> Result<Transcription, PantierError> {
    let text = std::str::from_utf8(bytes).map_err(|source| PantierError::Encoding {
        path: PathBuf::from("<bytes>"),
        message: format!("input is not valid UTF-8: {source}"),
    })?;
    from_text_str(text)
}

/// True if the first line is a timed label row.
pub fn detect_text(path: &Path) -> bool {
    sniff(path).is_some_and(|head| {
        head.lines()
            .find(|line| !line.trim().is_empty())
            .and_then(split_timed)
            .is_some_and(|(b, e, _)| b.parse::<f64>().is_ok() && e.parse::<f64>().is_ok())
    })
}

/// Splits `begin<TAB>end<TAB>label` or `begin;end;label`.
fn split_timed(line: &str) -> Option<(&str, &str, &str)> {
    for separator in ['\t', ';'] {
        let mut parts = line.splitn(3, separator);
        if let (Some(begin), Some(end)) = (parts.next(), parts.next()) {
            return Some((begin.trim(), end.trim(), parts.next().unwrap_or_default()));
        }
    }
    None
}

fn is_timed(line: &str) -> bool {
    split_timed(line).is_some_and(|(b, e, _)| {
        b.parse::<f64>().is_ok_and(f64::is_finite) && e.parse::<f64>().is_ok_and(f64::is_finite)
    })
}

fn parse_text(text: &str, path: &Path) -> Result<Transcription, PantierError> {
    let mut trs = Transcription::new(file_stem(path));
    let lines: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim_end_matches('\r')))
        .filter(|(_, line)| !line.trim().is_empty())
        .collect();
    let Some((_, first)) = lines.first() else {
        return Ok(trs);
    };

    let mut tier = Tier::new(TIER_NAME);
    if is_timed(first) {
        let mut rows = Vec::with_capacity(lines.len());
        for (line_no, line) in &lines {
            if line.starts_with('\\') {
                continue;
            }
            let Some((begin, end, label)) = split_timed(line) else {
                return Err(PantierError::LineParse {
                    format: FORMAT,
                    path: path.to_path_buf(),
                    line: *line_no,
                    message: "expected begin, end and label".to_string(),
                });
            };
            let begin = parse_time(begin, FORMAT, path, *line_no)?;
            let end = parse_time(end, FORMAT, path, *line_no)?;
            rows.push((begin, end, label));
        }
        let points = rows.iter().all(|(b, e, _)| b == e);
        for (begin, end, label) in rows {
            let location = if points {
                Location::from(Point::exact(begin))
            } else {
                Location::from(Interval::from_secs(begin, end)?)
            };
            tier.create_annotation(location, Some(text_to_label(label)))?;
        }
    } else {
        for (n, (_, line)) in lines.iter().enumerate() {
            let n = n as f64;
            tier.create_annotation(Interval::from_secs(n, n + 1.0)?, Some(text_to_label(line)))?;
        }
        tier.metadata.insert(UNTIMED_KEY.to_string(), "true".to_string());
    }
    trs.append(tier)?;
    Ok(trs)
}

/// Serialize the single tier of a transcription as text.
pub fn to_text_string(trs: &Transcription) -> Result<String, PantierError> {
    reject_disjoint(trs, FORMAT)?;
    require_single_tier(trs, FORMAT)?;
    let mut out = String::new();
    let Some(tier) = trs.tier(0) else {
        return Ok(out);
    };
    let untimed = tier.metadata.get(UNTIMED_KEY).is_some_and(|v| v == "true");

    for annotation in tier.iter() {
        let text = label_to_text(annotation.label()).replace(['\r', '\n'], " ");
        if untimed {
            writeln!(out, "{text}").expect("write to string");
            continue;
        }
        let iv = best_interval(annotation)?;
        writeln!(
            out,
            "{}\t{}\t{text}",
            format_time(iv.begin().midpoint()),
            format_time(iv.end().midpoint())
        )
        .expect("write to string");
    }
    Ok(out)
}
