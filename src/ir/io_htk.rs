//! HTK label file (`.lab`) reader and writer.
//!
//! Each line is `begin end label [score]` with times in units of 100 ns.
//! Lines with a label only are not supported. The file maps to a single
//! interval tier named after the file.
//!
//! Writing accepts a single tier without overlaps. Disjoint tiers are
//! rejected, point tiers are widened to short intervals, annotations with
//! an empty label are skipped (gaps are implicit), whitespace in labels is
//! replaced with `_` and label alternatives are written as `{a|b}`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::interval::Interval;
use super::io_common::{
    best_interval, file_stem, points_to_intervals, read_text, reject_disjoint, reject_overlaps,
    require_single_tier, sniff, write_atomic, DEFAULT_POINT_EPSILON,
};
use super::label::Label;
use super::text_label::{label_to_text, text_to_label};
use super::tier::Tier;
use super::transcription::Transcription;
use crate::error::PantierError;

const FORMAT: &str = "htk";
const UNITS_PER_SECOND: f64 = 10_000_000.0;

/// Read an HTK label file.
pub fn read_htk(path: &Path) -> Result<Transcription, PantierError> {
    let text = read_text(path)?;
    parse_htk(&text, path)
}

/// Write the single tier of a transcription as an HTK label file.
pub fn write_htk(path: &Path, trs: &Transcription) -> Result<(), PantierError> {
    let text = to_htk_string(trs)?;
    write_atomic(path, text.as_bytes())
}

/// Parse HTK labels from a string.
pub fn from_htk_str(text: &str) -> Result<Transcription, PantierError> {
    parse_htk(text, Path::new("<string>"))
}

/// Parse HTK labels from bytes (must be valid UTF-8).
pub fn from_htk_slice(bytes: &[u8]) -> Result<Transcription, PantierError> {
    let text = std::str::from_utf8(bytes).map_err(|source| PantierError::Encoding {
        path: PathBuf::from("<bytes>"),
        message: format!("input is not valid UTF-8: {source}"),
    })?;
    from_htk_str(text)
}

/// True if the first line holds two integer times and a label.
pub fn detect_htk(path: &Path) -> bool {
    sniff(path).is_some_and(|head| {
        head.lines()
            .find(|line| !line.trim().is_empty())
            .is_some_and(|line| {
                let columns: Vec<&str> = line.split_whitespace().collect();
                (3..=4).contains(&columns.len())
                    && columns[0].parse::<u64>().is_ok()
                    && columns[1].parse::<u64>().is_ok()
            })
    })
}

fn parse_htk(text: &str, path: &Path) -> Result<Transcription, PantierError> {
    let mut trs = Transcription::new(file_stem(path));
    let mut tier = Tier::new(trs.name().to_string());

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.is_empty() {
            continue;
        }
        let error = |message: String| PantierError::LineParse {
            format: FORMAT,
            path: path.to_path_buf(),
            line: line_no,
            message,
        };
        if !(3..=4).contains(&columns.len()) {
            return Err(error(format!(
                "expected 'begin end label [score]', got {} column(s)",
                columns.len()
            )));
        }
        let units = |raw: &str| {
            raw.parse::<i64>()
                .map_err(|_| error(format!("invalid time '{raw}'")))
        };
        let begin = units(columns[0])? as f64 / UNITS_PER_SECOND;
        let end = units(columns[1])? as f64 / UNITS_PER_SECOND;
        let mut label = text_to_label(columns[2]);
        if let Some(raw) = columns.get(3) {
            let score: f64 = raw
                .parse()
                .map_err(|_| error(format!("invalid score '{raw}'")))?;
            label = Label::scored(label.best().clone(), score);
        }
        tier.create_annotation(Interval::from_secs(begin, end)?, Some(label))?;
    }
    if !tier.is_empty() {
        trs.append(tier)?;
    }
    Ok(trs)
}

/// Serialize the single tier of a transcription as HTK labels.
pub fn to_htk_string(trs: &Transcription) -> Result<String, PantierError> {
    reject_disjoint(trs, FORMAT)?;
    require_single_tier(trs, FORMAT)?;
    if trs.is_empty() {
        return Err(PantierError::CapabilityMismatch {
            format: FORMAT,
            message: "a transcription without tiers cannot be written".to_string(),
        });
    }
    let mut out = String::new();
    let Some(tier) = trs.tier(0) else {
        return Ok(out);
    };
    let tier = points_to_intervals(tier, DEFAULT_POINT_EPSILON)?;
    reject_overlaps(&tier, FORMAT)?;

    for annotation in tier.iter() {
        let text = label_to_text(annotation.label());
        if text.trim().is_empty() {
            continue;
        }
        let iv = best_interval(annotation)?;
        write!(
            out,
            "{} {} {}",
            to_units(iv.begin().midpoint()),
            to_units(iv.end().midpoint()),
            text.split_whitespace().collect::<Vec<_>>().join("_")
        )
        .expect("write to string");
        let score = annotation
            .label()
            .filter(|l| !l.has_alternatives())
            .and_then(Label::best_score);
        if let Some(score) = score {
            write!(out, " {score}").expect("write to string");
        }
        out.push('\n');
    }
    Ok(out)
}

fn to_units(seconds: f64) -> i64 {
    (seconds * UNITS_PER_SECOND).round() as i64
}
