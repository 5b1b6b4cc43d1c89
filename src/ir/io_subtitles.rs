//! SubRip, WebVTT and SubViewer subtitle readers and writers.
//!
//! Every subtitle file maps to a single interval tier named `Trans`, one
//! annotation per cue. Multi-line cue text is kept with `\n` separators.
//!
//! - WebVTT cue identifiers are kept in annotation metadata `id`; `NOTE`,
//!   `STYLE` and `REGION` blocks are skipped.
//! - SubViewer `[INFORMATION]` tags map to transcription metadata keys
//!   (`[CD TRACK]` becomes `cd_track`); `[br]` is a line break.
//!
//! Writing accepts a single tier. Disjoint tiers are rejected, point tiers
//! are widened to short intervals, cues with empty text are not written and
//! label alternatives are written as `{a|b}`. A transcription without tiers
//! gives a file without cues.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::annotation::Annotation;
use super::interval::Interval;
use super::io_common::{
    best_interval, file_stem, points_to_intervals, read_text, reject_disjoint,
    require_single_tier, sniff, write_atomic, DEFAULT_POINT_EPSILON,
};
use super::text_label::{label_to_text, text_to_label};
use super::tier::Tier;
use super::transcription::Transcription;
use crate::error::PantierError;

const TIER_NAME: &str = "Trans";
const ARROW: &str = "-->";

/// SubViewer information tags, in file order.
const SUBVIEWER_INFO: &[&str] = &[
    "TITLE", "AUTHOR", "SOURCE", "PRG", "FILEPATH", "DELAY", "CD TRACK", "COMMENT",
];

/// The three supported subtitle dialects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubtitleFormat {
    SubRip,
    WebVtt,
    SubViewer,
}

impl SubtitleFormat {
    pub fn name(self) -> &'static str {
        match self {
            SubtitleFormat::SubRip => "subrip",
            SubtitleFormat::WebVtt => "webvtt",
            SubtitleFormat::SubViewer => "subviewer",
        }
    }
}

/// Read a subtitle file of the given dialect.
pub fn read_subtitles(path: &Path, format: SubtitleFormat) -> Result<Transcription, PantierError> {
    let text = read_text(path)?;
    parse_subtitles(&text, format, path)
}

/// Write the single tier of a transcription as subtitles.
pub fn write_subtitles(
    path: &Path,
    trs: &Transcription,
    format: SubtitleFormat,
) -> Result<(), PantierError> {
    let text = to_subtitles_string(trs, format)?;
    write_atomic(path, text.as_bytes())
}

/// Parse subtitles from a string.
pub fn from_subtitles_str(text: &str, format: SubtitleFormat) -> Result<Transcription, PantierError> {
    parse_subtitles(text, format, Path::new("<string>"))
}

/// Parse subtitles from bytes (must be valid UTF-8).
pub fn from_subtitles_slice(
    bytes: &[u8],
    format: SubtitleFormat,
) -> Result<Transcription, PantierError> {
    let text = std::str::from_utf8(bytes).map_err(|source| PantierError::Encoding {
        path: PathBuf::from("<bytes>"),
        message: format!("input is not valid UTF-8: {source}"),
    })?;
    from_subtitles_str(text, format)
}

/// True if the head of the file looks like the given dialect.
pub fn detect_subtitles(path: &Path, format: SubtitleFormat) -> bool {
    let Some(head) = sniff(path) else {
        return false;
    };
    match format {
        SubtitleFormat::WebVtt => head.trim_start().starts_with("WEBVTT"),
        SubtitleFormat::SubViewer => {
            head.contains("[INFORMATION]") || head.contains("[SUBTITLE]")
        }
        SubtitleFormat::SubRip => {
            !head.trim_start().starts_with("WEBVTT")
                && head.lines().any(|line| {
                    line.split_once(ARROW)
                        .is_some_and(|(b, _)| b.trim().contains(','))
                })
        }
    }
}

fn parse_subtitles(
    text: &str,
    format: SubtitleFormat,
    path: &Path,
) -> Result<Transcription, PantierError> {
    let mut trs = Transcription::new(file_stem(path));
    let mut tier = Tier::new(TIER_NAME);
    match format {
        SubtitleFormat::SubRip => parse_subrip(text, path, &mut tier)?,
        SubtitleFormat::WebVtt => parse_webvtt(text, path, &mut tier)?,
        SubtitleFormat::SubViewer => parse_subviewer(text, path, &mut tier, &mut trs)?,
    }
    if !tier.is_empty() {
        trs.append(tier)?;
    }
    Ok(trs)
}

/// Blank-line separated blocks of (line number, line).
fn blocks(text: &str) -> Vec<Vec<(usize, &str)>> {
    let mut out = Vec::new();
    let mut current = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
        } else {
            current.push((idx + 1, line));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// `[h:]m:s[.,]frac` to seconds.
fn parse_clock(raw: &str) -> Option<f64> {
    let parts: Vec<&str> = raw.trim().split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, s] => (h.parse::<u64>().ok()?, m.parse::<u64>().ok()?, *s),
        [m, s] => (0, m.parse::<u64>().ok()?, *s),
        _ => return None,
    };
    let seconds: f64 = seconds.replace(',', ".").parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds)
}

fn parse_timing(
    line: &str,
    separator: &str,
    format: SubtitleFormat,
    path: &Path,
    line_no: usize,
) -> Result<(f64, f64), PantierError> {
    let error = || PantierError::LineParse {
        format: format.name(),
        path: path.to_path_buf(),
        line: line_no,
        message: format!("invalid cue timing '{line}'"),
    };
    let (begin, rest) = line.split_once(separator).ok_or_else(error)?;
    // Cue settings and SubRip coordinates follow the end time.
    let end = rest.split_whitespace().next().ok_or_else(error)?;
    let begin = parse_clock(begin).ok_or_else(error)?;
    let end = parse_clock(end).ok_or_else(error)?;
    Ok((begin, end))
}

/// Fuzz-only entrypoint for cue timing lines.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_timing(line: &str) -> Result<(), PantierError> {
    let _ = parse_timing(line, ARROW, SubtitleFormat::SubRip, Path::new("<fuzz>"), 1)?;
    Ok(())
}

fn add_cue(
    tier: &mut Tier,
    begin: f64,
    end: f64,
    text: &str,
    id: Option<&str>,
) -> Result<(), PantierError> {
    let mut annotation = Annotation::new(Interval::from_secs(begin, end)?, Some(text_to_label(text)));
    if let Some(id) = id {
        annotation = annotation.with_metadata("id", id);
    }
    tier.add_annotation(annotation)?;
    Ok(())
}

fn parse_subrip(text: &str, path: &Path, tier: &mut Tier) -> Result<(), PantierError> {
    for block in blocks(text) {
        let Some(timing) = block.iter().position(|(_, line)| line.contains(ARROW)) else {
            return Err(PantierError::LineParse {
                format: SubtitleFormat::SubRip.name(),
                path: path.to_path_buf(),
                line: block[0].0,
                message: "cue without timing line".to_string(),
            });
        };
        let (line_no, line) = block[timing];
        let (begin, end) = parse_timing(line, ARROW, SubtitleFormat::SubRip, path, line_no)?;
        let text = join_lines(&block[timing + 1..]);
        add_cue(tier, begin, end, &text, None)?;
    }
    Ok(())
}

fn parse_webvtt(text: &str, path: &Path, tier: &mut Tier) -> Result<(), PantierError> {
    let blocks = blocks(text);
    let Some(header) = blocks.first() else {
        return Err(PantierError::FormatParse {
            format: SubtitleFormat::WebVtt.name(),
            path: path.to_path_buf(),
            message: "empty file".to_string(),
        });
    };
    if !header[0].1.trim_start_matches('\u{FEFF}').starts_with("WEBVTT") {
        return Err(PantierError::FormatParse {
            format: SubtitleFormat::WebVtt.name(),
            path: path.to_path_buf(),
            message: "missing WEBVTT header".to_string(),
        });
    }

    for block in &blocks[1..] {
        let first = block[0].1;
        if ["NOTE", "STYLE", "REGION"]
            .iter()
            .any(|kw| first == *kw || first.starts_with(&format!("{kw} ")))
        {
            continue;
        }
        let Some(timing) = block.iter().position(|(_, line)| line.contains(ARROW)) else {
            tracing::warn!(
                path = %path.display(),
                line = block[0].0,
                "WebVTT block without cue timing skipped"
            );
            continue;
        };
        let id = (timing > 0).then(|| block[0].1.trim());
        let (line_no, line) = block[timing];
        let (begin, end) = parse_timing(line, ARROW, SubtitleFormat::WebVtt, path, line_no)?;
        add_cue(tier, begin, end, &join_lines(&block[timing + 1..]), id)?;
    }
    Ok(())
}

fn parse_subviewer(
    text: &str,
    path: &Path,
    tier: &mut Tier,
    trs: &mut Transcription,
) -> Result<(), PantierError> {
    let mut pending: Option<(f64, f64)> = None;
    let mut lines: Vec<&str> = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            flush_cue(&mut pending, &mut lines, tier)?;
            continue;
        }
        if pending.is_some() {
            lines.push(line);
            continue;
        }
        if let Some(rest) = line.strip_prefix('[') {
            let Some((tag, value)) = rest.split_once(']') else {
                continue;
            };
            if SUBVIEWER_INFO.contains(&tag) {
                let key = tag.to_lowercase().replace(' ', "_");
                if !value.trim().is_empty() {
                    trs.metadata.insert(key, value.trim().to_string());
                }
            }
            continue;
        }
        if line.contains(',') && line.starts_with(|c: char| c.is_ascii_digit()) {
            let (begin, end) = parse_timing(line, ",", SubtitleFormat::SubViewer, path, idx + 1)?;
            pending = Some((begin, end));
        }
    }
    flush_cue(&mut pending, &mut lines, tier)
}

fn flush_cue(
    pending: &mut Option<(f64, f64)>,
    lines: &mut Vec<&str>,
    tier: &mut Tier,
) -> Result<(), PantierError> {
    if let Some((begin, end)) = pending.take() {
        let text = lines.join("\n").replace("[br]", "\n");
        add_cue(tier, begin, end, &text, None)?;
    }
    lines.clear();
    Ok(())
}

fn join_lines(lines: &[(usize, &str)]) -> String {
    lines
        .iter()
        .map(|(_, line)| line.trim())
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Serialize the single tier of a transcription as subtitles.
pub fn to_subtitles_string(
    trs: &Transcription,
    format: SubtitleFormat,
) -> Result<String, PantierError> {
    reject_disjoint(trs, format.name())?;
    require_single_tier(trs, format.name())?;

    let mut out = String::new();
    match format {
        SubtitleFormat::WebVtt => out.push_str("WEBVTT\n\n"),
        SubtitleFormat::SubViewer => write_subviewer_header(&mut out, trs),
        SubtitleFormat::SubRip => {}
    }
    let Some(tier) = trs.tier(0) else {
        return Ok(out);
    };
    let tier = points_to_intervals(tier, DEFAULT_POINT_EPSILON)?;

    let mut number = 0;
    for annotation in tier.iter() {
        let text = label_to_text(annotation.label());
        if text.trim().is_empty() {
            continue;
        }
        number += 1;
        let iv = best_interval(annotation)?;
        let (begin, end) = (iv.begin().midpoint(), iv.end().midpoint());
        match format {
            SubtitleFormat::SubRip => {
                writeln!(out, "{number}").expect("write to string");
                writeln!(out, "{} --> {}", clock(begin, ',', 3), clock(end, ',', 3))
                    .expect("write to string");
                writeln!(out, "{text}\n").expect("write to string");
            }
            SubtitleFormat::WebVtt => {
                if let Some(id) = annotation.metadata.get("id") {
                    writeln!(out, "{id}").expect("write to string");
                }
                writeln!(out, "{} --> {}", clock(begin, '.', 3), clock(end, '.', 3))
                    .expect("write to string");
                writeln!(out, "{text}\n").expect("write to string");
            }
            SubtitleFormat::SubViewer => {
                writeln!(out, "{},{}", clock(begin, '.', 2), clock(end, '.', 2))
                    .expect("write to string");
                writeln!(out, "{}\n", text.replace('\n', "[br]")).expect("write to string");
            }
        }
    }
    Ok(out)
}

fn write_subviewer_header(out: &mut String, trs: &Transcription) {
    writeln!(out, "[INFORMATION]").expect("write to string");
    for tag in SUBVIEWER_INFO {
        let key = tag.to_lowercase().replace(' ', "_");
        let value = trs.metadata.get(&key).map(String::as_str).unwrap_or_default();
        writeln!(out, "[{tag}]{value}").expect("write to string");
    }
    writeln!(out, "[END INFORMATION]").expect("write to string");
    writeln!(out, "[SUBTITLE]").expect("write to string");
}

/// `HH:MM:SS<sep>fff` with `digits` fractional digits.
fn clock(seconds: f64, separator: char, digits: u32) -> String {
    let scale = 10u64.pow(digits);
    let units = (seconds.max(0.0) * scale as f64).round() as u64;
    let (whole, frac) = (units / scale, units % scale);
    format!(
        "{:02}:{:02}:{:02}{separator}{:0width$}",
        whole / 3600,
        (whole / 60) % 60,
        whole % 60,
        frac,
        width = digits as usize
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Label;

    #[test]
    fn reads_subrip() {
        let text = "1\n00:00:01,000 --> 00:00:02,500\nHello\nworld\n\n2\n00:00:03,000 --> 00:00:04,000 X1:10 X2:20\nBye\n";
        let trs = from_subtitles_str(text, SubtitleFormat::SubRip).unwrap();
        let tier = trs.find(TIER_NAME, true).unwrap();
        assert_eq!(tier.len(), 2);
        assert_eq!(tier.annotations()[0].best_text(), "Hello\nworld");
        let iv = best_interval(&tier.annotations()[0]).unwrap();
        assert_eq!(iv.end().midpoint(), 2.5);
    }

    #[test]
    fn reads_webvtt_with_ids_and_notes() {
        let text = "WEBVTT\n\nNOTE a comment\n\nintro\n00:01.000 --> 00:02.000 align:start\nHi\n\n01:00:00.000 --> 01:00:01.000\nLate\n";
        let trs = from_subtitles_str(text, SubtitleFormat::WebVtt).unwrap();
        let tier = &trs.tiers()[0];
        assert_eq!(tier.len(), 2);
        assert_eq!(tier.annotations()[0].metadata["id"], "intro");
        assert_eq!(tier.annotations()[1].lowest().midpoint(), 3600.0);
    }

    #[test]
    fn reads_subviewer_information() {
        let text = "[INFORMATION]\n[TITLE]Demo\n[CD TRACK]2\n[END INFORMATION]\n[SUBTITLE]\n00:00:01.50,00:00:02.00\nOne[br]Two\n";
        let trs = from_subtitles_str(text, SubtitleFormat::SubViewer).unwrap();
        assert_eq!(trs.metadata["title"], "Demo");
        assert_eq!(trs.metadata["cd_track"], "2");
        let annotation = &trs.tiers()[0].annotations()[0];
        assert_eq!(annotation.best_text(), "One\nTwo");
        assert_eq!(annotation.lowest().midpoint(), 1.5);
    }

    #[test]
    fn writer_skips_empty_cues() {
        let mut trs = Transcription::new("s");
        let mut tier = Tier::new("any");
        tier.create_annotation(Interval::from_secs(0.0, 1.0).unwrap(), Some(Label::from("a")))
            .unwrap();
        tier.create_annotation(Interval::from_secs(1.0, 2.0).unwrap(), Some(Label::from("")))
            .unwrap();
        tier.create_annotation(Interval::from_secs(3661.5, 3662.0).unwrap(), Some(Label::from("b")))
            .unwrap();
        trs.append(tier).unwrap();

        let srt = to_subtitles_string(&trs, SubtitleFormat::SubRip).unwrap();
        assert_eq!(
            srt,
            "1\n00:00:00,000 --> 00:00:01,000\na\n\n2\n01:01:01,500 --> 01:01:02,000\nb\n\n"
        );
        let back = from_subtitles_str(&srt, SubtitleFormat::SubRip).unwrap();
        assert_eq!(back.tiers()[0].len(), 2);

        let sub = to_subtitles_string(&trs, SubtitleFormat::SubViewer).unwrap();
        assert!(sub.contains("01:01:01.50,01:01:02.00\nb\n"));
    }

    #[test]
    fn more_than_one_tier_is_rejected() {
        let mut trs = Transcription::new("s");
        trs.create_tier("a").unwrap();
        trs.create_tier("b").unwrap();
        let err = to_subtitles_string(&trs, SubtitleFormat::WebVtt).unwrap_err();
        assert!(matches!(err, PantierError::CapabilityMismatch { .. }));
    }

    #[test]
    fn bad_timing_reports_line() {
        let err = from_subtitles_str("1\n00:00:xx --> 00:00:01,000\nA\n", SubtitleFormat::SubRip)
            .unwrap_err();
        assert!(matches!(err, PantierError::LineParse { line: 2, .. }));
    }
}
