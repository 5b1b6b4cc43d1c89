//! Flat CSV reader and writer.
//!
//! One row per annotation, without header: `tier,begin,end,label`. An empty
//! `end` column makes the annotation a point. Rows are grouped into tiers by
//! name, in order of first appearance; a `tier,begin,end,label` header row is
//! accepted on read.
//!
//! Disjoint tiers are rejected on write, only the best localization is kept
//! and label alternatives are written as `{a|b}`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::interval::Interval;
use super::io_common::{
    best_interval, decode_text, file_stem, format_time, parse_time, reject_disjoint, sniff,
    write_atomic,
};
use super::location::Location;
use super::point::Point;
use super::text_label::{label_to_text, text_to_label};
use super::tier::Tier;
use super::transcription::Transcription;
use crate::error::PantierError;

const FORMAT: &str = "csv";

#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    tier: String,
    begin: String,
    end: String,
    label: String,
}

/// Read a CSV file.
pub fn read_csv(path: &Path) -> Result<Transcription, PantierError> {
    let bytes = std::fs::read(path)?;
    let text = decode_text(&bytes, path)?;
    parse_csv(&text, path)
}

/// Write a transcription as CSV.
pub fn write_csv(path: &Path, trs: &Transcription) -> Result<(), PantierError> {
    let text = to_csv_string_at(trs, path)?;
    write_atomic(path, text.as_bytes())
}

/// Parse CSV from a string.
pub fn from_csv_str(text: &str) -> Result<Transcription, PantierError> {
    parse_csv(text, Path::new("<string>"))
}

/// Parse CSV from bytes.
pub fn from_csv_slice(bytes: &[u8]) -> Result<Transcription, PantierError> {
    let path = Path::new("<bytes>");
    let text = decode_text(bytes, path)?;
    parse_csv(&text, path)
}

/// True if the first row has a tier name and a numeric begin time.
pub fn detect_csv(path: &Path) -> bool {
    let Some(head) = sniff(path) else {
        return false;
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(head.as_bytes());
    reader
        .records()
        .filter_map(Result::ok)
        .find(|record| !is_header(record))
        .is_some_and(|record| {
            record.len() == 4 && record.get(1).is_some_and(|b| b.trim().parse::<f64>().is_ok())
        })
}

fn is_header(record: &csv::StringRecord) -> bool {
    record.get(0) == Some("tier") && record.get(1) == Some("begin")
}

fn parse_csv(text: &str, path: &Path) -> Result<Transcription, PantierError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(text.as_bytes());
    let mut trs = Transcription::new(file_stem(path));

    for result in reader.records() {
        let record = result.map_err(|source| PantierError::CsvParse {
            path: path.to_path_buf(),
            source,
        })?;
        if is_header(&record) {
            continue;
        }
        let line = record.position().map_or(0, |p| p.line() as usize);
        let row: CsvRow = record
            .deserialize(None)
            .map_err(|source| PantierError::CsvParse {
                path: path.to_path_buf(),
                source,
            })?;

        let begin = parse_time(&row.begin, FORMAT, path, line)?;
        let location = if row.end.trim().is_empty() {
            Location::from(Point::exact(begin))
        } else {
            let end = parse_time(&row.end, FORMAT, path, line)?;
            Location::from(Interval::from_secs(begin, end)?)
        };

        let tier = match trs.find_index(&row.tier, true) {
            Some(idx) => idx,
            None => trs.append(Tier::new(row.tier.as_str()))?,
        };
        let tier = trs
            .tier_mut(tier)
            .ok_or_else(|| PantierError::TierNotFound(row.tier.clone()))?;
        tier.create_annotation(location, Some(text_to_label(&row.label)))?;
    }
    Ok(trs)
}

/// Serialize a transcription to a CSV string.
pub fn to_csv_string(trs: &Transcription) -> Result<String, PantierError> {
    to_csv_string_at(trs, Path::new("<string>"))
}

fn to_csv_string_at(trs: &Transcription, path: &Path) -> Result<String, PantierError> {
    reject_disjoint(trs, FORMAT)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    for tier in trs.tiers() {
        for annotation in tier.iter() {
            let (begin, end) = if tier.is_point() {
                let p = annotation.location().best().lowest();
                (format_time(p.midpoint()), String::new())
            } else {
                let iv = best_interval(annotation)?;
                (
                    format_time(iv.begin().midpoint()),
                    format_time(iv.end().midpoint()),
                )
            };
            let row = CsvRow {
                tier: tier.name().to_string(),
                begin,
                end,
                label: label_to_text(annotation.label()),
            };
            writer.serialize(&row).map_err(|source| PantierError::CsvWrite {
                path: path.to_path_buf(),
                source,
            })?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| PantierError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| PantierError::Encoding {
        path: PathBuf::from(path),
        message: e.to_string(),
    })
}
