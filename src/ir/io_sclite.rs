//! NIST Sclite CTM and STM readers and writers.
//!
//! Both formats are line oriented, whitespace separated, with `;;` comment
//! lines. Lines are grouped into one tier per `file-channel` pair, in order
//! of first appearance, and every tier refers to a media named after its
//! file.
//!
//! CTM (`file channel begin duration token [confidence]`):
//! - the `@` token stands for an empty label;
//! - `<ALT_BEGIN>` / `<ALT>` / `<ALT_END>` blocks become label alternatives,
//!   one per branch, keeping confidences as scores. A branch with several
//!   words becomes one tag with the words joined by spaces and the block
//!   spans all its words;
//! - on write, whitespace inside a tag is replaced with `_` so that it stays
//!   a single token.
//!
//! STM (`file channel speaker begin end [<labels>] transcript`):
//! - the speaker and the `<...>` field are kept in annotation metadata
//!   (`speaker`, `stm_labels`);
//! - a transcript `{ a / b }` becomes label alternatives (scores are not
//!   written back);
//! - `IGNORE_TIME_SEGMENT_IN_SCORING` stands for an empty label.
//!
//! On write, tier names are split at their last `-` into file and channel.
//! Point tiers are widened to short intervals, disjoint tiers are rejected,
//! only the best localization is kept, and an empty transcription is
//! rejected since neither format can express it.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::annotation::Annotation;
use super::interval::Interval;
use super::io_common::{
    best_interval, file_stem, format_time, parse_time, points_to_intervals, read_text,
    reject_disjoint, sniff, write_atomic, DEFAULT_POINT_EPSILON,
};
use super::label::Label;
use super::media::Media;
use super::tag::Tag;
use super::text_label::ranked_tags;
use super::tier::Tier;
use super::transcription::Transcription;
use crate::error::PantierError;

const CTM: &str = "ctm";
const STM: &str = "stm";
const EMPTY_CTM_TOKEN: &str = "@";
const IGNORE_SEGMENT: &str = "IGNORE_TIME_SEGMENT_IN_SCORING";
const ALT_BEGIN: &str = "<ALT_BEGIN>";
const ALT: &str = "<ALT>";
const ALT_END: &str = "<ALT_END>";

/// Read a CTM file.
pub fn read_ctm(path: &Path) -> Result<Transcription, PantierError> {
    let text = read_text(path)?;
    parse_ctm(&text, path)
}

/// Write a transcription as CTM.
pub fn write_ctm(path: &Path, trs: &Transcription) -> Result<(), PantierError> {
    let text = to_ctm_string(trs)?;
    write_atomic(path, text.as_bytes())
}

/// Parse CTM from a string.
pub fn from_ctm_str(text: &str) -> Result<Transcription, PantierError> {
    parse_ctm(text, Path::new("<string>"))
}

/// Parse CTM from bytes (must be valid UTF-8).
pub fn from_ctm_slice(bytes: &[u8]) -> Result<Transcription, PantierError> {
    from_ctm_str(&utf8(bytes)?)
}

/// Read an STM file.
pub fn read_stm(path: &Path) -> Result<Transcription, PantierError> {
    let text = read_text(path)?;
    parse_stm(&text, path)
}

/// Write a transcription as STM.
pub fn write_stm(path: &Path, trs: &Transcription) -> Result<(), PantierError> {
    let text = to_stm_string(trs)?;
    write_atomic(path, text.as_bytes())
}

/// Parse STM from a string.
pub fn from_stm_str(text: &str) -> Result<Transcription, PantierError> {
    parse_stm(text, Path::new("<string>"))
}

/// Parse STM from bytes (must be valid UTF-8).
pub fn from_stm_slice(bytes: &[u8]) -> Result<Transcription, PantierError> {
    from_stm_str(&utf8(bytes)?)
}

/// True if the first data line has CTM columns.
pub fn detect_ctm(path: &Path) -> bool {
    first_data_line(path).is_some_and(|columns| {
        columns.len() >= 5
            && (columns.iter().any(|c| c.as_str() == ALT_BEGIN)
                || (is_number(&columns[2]) && is_number(&columns[3]) && !is_number(&columns[4])))
    })
}

/// True if the first data line has STM columns.
pub fn detect_stm(path: &Path) -> bool {
    first_data_line(path).is_some_and(|columns| {
        columns.len() >= 5
            && !is_number(&columns[2])
            && is_number(&columns[3])
            && is_number(&columns[4])
    })
}

fn first_data_line(path: &Path) -> Option<Vec<String>> {
    let head = sniff(path)?;
    let line = head
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with(";;"))?;
    Some(line.split_whitespace().map(str::to_string).collect())
}

fn is_number(raw: &str) -> bool {
    raw.parse::<f64>().is_ok_and(f64::is_finite)
}

fn utf8(bytes: &[u8]) -> Result<String, PantierError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|source| PantierError::Encoding {
            path: PathBuf::from("<bytes>"),
            message: format!("input is not valid UTF-8: {source}"),
        })
}

/// Tiers keyed by `file-channel`, in order of first appearance.
struct TierGroups {
    trs: Transcription,
    keys: Vec<String>,
}

impl TierGroups {
    fn new(path: &Path) -> Self {
        Self {
            trs: Transcription::new(file_stem(path)),
            keys: Vec::new(),
        }
    }

    fn tier(&mut self, file: &str, channel: &str) -> Result<&mut Tier, PantierError> {
        let key = format!("{file}-{channel}");
        let idx = match self.keys.iter().position(|k| *k == key) {
            Some(idx) => idx,
            None => {
                let media = self.trs.add_media(Media::new(file).with_id(file));
                let mut tier = Tier::new(key.as_str());
                tier.set_media(Some(media));
                let idx = self.trs.append(tier)?;
                self.keys.push(key);
                idx
            }
        };
        self.trs
            .tier_mut(idx)
            .ok_or_else(|| PantierError::TierNotFound(self.keys[idx].clone()))
    }
}

// ---------------------------------------------------------------------------
// CTM
// ---------------------------------------------------------------------------

struct CtmWord {
    begin: f64,
    end: f64,
    token: String,
    score: Option<f64>,
}

/// An open `<ALT_BEGIN>` block.
struct AltBlock {
    file: String,
    channel: String,
    branches: Vec<Vec<CtmWord>>,
}

fn parse_ctm(text: &str, path: &Path) -> Result<Transcription, PantierError> {
    let mut groups = TierGroups::new(path);
    let mut block: Option<AltBlock> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with(";;") {
            continue;
        }
        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.len() < 3 {
            return Err(line_error(CTM, path, line_no, "expected at least 3 columns"));
        }
        let (file, channel) = (columns[0], columns[1]);

        match columns.last().copied() {
            Some(ALT_BEGIN) => {
                if block.is_some() {
                    return Err(line_error(CTM, path, line_no, "nested <ALT_BEGIN>"));
                }
                block = Some(AltBlock {
                    file: file.to_string(),
                    channel: channel.to_string(),
                    branches: vec![Vec::new()],
                });
            }
            Some(ALT) => match block.as_mut() {
                Some(open) => open.branches.push(Vec::new()),
                None => return Err(line_error(CTM, path, line_no, "<ALT> outside a block")),
            },
            Some(ALT_END) => {
                let Some(closed) = block.take() else {
                    return Err(line_error(CTM, path, line_no, "<ALT_END> without <ALT_BEGIN>"));
                };
                let tier = groups.tier(&closed.file, &closed.channel)?;
                add_alternation(tier, closed.branches)?;
            }
            _ => {
                let word = parse_ctm_word(&columns, path, line_no)?;
                match block.as_mut() {
                    Some(open) => {
                        if let Some(branch) = open.branches.last_mut() {
                            branch.push(word);
                        }
                    }
                    None => {
                        let label = ctm_label(Tag::text(word.token), word.score);
                        groups
                            .tier(file, channel)?
                            .create_annotation(Interval::from_secs(word.begin, word.end)?, Some(label))?;
                    }
                }
            }
        }
    }

    if block.is_some() {
        return Err(PantierError::FormatParse {
            format: CTM,
            path: path.to_path_buf(),
            message: "unterminated <ALT_BEGIN> block".to_string(),
        });
    }
    Ok(groups.trs)
}

fn parse_ctm_word(columns: &[&str], path: &Path, line: usize) -> Result<CtmWord, PantierError> {
    if !(5..=6).contains(&columns.len()) {
        return Err(line_error(
            CTM,
            path,
            line,
            &format!("expected 5 or 6 columns, got {}", columns.len()),
        ));
    }
    let begin = parse_time(columns[2], CTM, path, line)?;
    let duration = parse_time(columns[3], CTM, path, line)?;
    let score = match columns.get(5) {
        Some(raw) => Some(raw.parse::<f64>().map_err(|_| {
            line_error(CTM, path, line, &format!("invalid confidence '{raw}'"))
        })?),
        None => None,
    };
    let token = if columns[4] == EMPTY_CTM_TOKEN {
        String::new()
    } else {
        columns[4].to_string()
    };
    Ok(CtmWord {
        begin,
        end: begin + duration,
        token,
        score,
    })
}

fn ctm_label(tag: Tag, score: Option<f64>) -> Label {
    match score {
        Some(score) => Label::scored(tag, score),
        None => Label::new(tag),
    }
}

fn add_alternation(tier: &mut Tier, branches: Vec<Vec<CtmWord>>) -> Result<(), PantierError> {
    let words = || branches.iter().flatten();
    let Some(begin) = words().map(|w| w.begin).reduce(f64::min) else {
        tracing::warn!(tier = tier.name(), "empty alternation block skipped");
        return Ok(());
    };
    let end = words().map(|w| w.end).fold(begin, f64::max);

    let alternatives = branches.iter().filter(|b| !b.is_empty()).map(|branch| {
        let text = branch
            .iter()
            .map(|w| w.token.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (Tag::text(text), branch[0].score)
    });
    let label = Label::from_alternatives(alternatives);
    tier.create_annotation(Interval::from_secs(begin, end)?, label)?;
    Ok(())
}

/// One CTM line; an empty tag is written as `@`.
pub fn ctm_line(file: &str, channel: &str, begin: f64, duration: f64, tag: &Tag, score: Option<f64>) -> String {
    let content = tag.content();
    let token = if content.trim().is_empty() {
        EMPTY_CTM_TOKEN.to_string()
    } else {
        content.split_whitespace().collect::<Vec<_>>().join("_")
    };
    let mut line = format!(
        "{file} {channel} {} {} {token}",
        format_time(begin),
        format_time(duration)
    );
    if let Some(score) = score {
        write!(line, " {score}").expect("write to string");
    }
    line.push('\n');
    line
}

/// Serialize a transcription to a CTM string.
pub fn to_ctm_string(trs: &Transcription) -> Result<String, PantierError> {
    check_writable(trs, CTM)?;
    let mut out = String::new();
    writeln!(out, ";; CTM generated by pantier").expect("write to string");

    for tier in trs.tiers() {
        let tier = points_to_intervals(tier, DEFAULT_POINT_EPSILON)?;
        let (file, channel) = split_tier_name(tier.name());
        for annotation in tier.iter() {
            let iv = best_interval(annotation)?;
            let begin = iv.begin().midpoint();
            let duration = iv.end().midpoint() - begin;
            match annotation.label() {
                Some(label) if label.has_alternatives() => {
                    writeln!(out, "{file} {channel} * * {ALT_BEGIN}").expect("write to string");
                    for (n, (tag, score)) in label.alternatives().iter().enumerate() {
                        if n > 0 {
                            writeln!(out, "{file} {channel} * * {ALT}").expect("write to string");
                        }
                        out.push_str(&ctm_line(&file, &channel, begin, duration, tag, *score));
                    }
                    writeln!(out, "{file} {channel} * * {ALT_END}").expect("write to string");
                }
                Some(label) => {
                    out.push_str(&ctm_line(
                        &file,
                        &channel,
                        begin,
                        duration,
                        label.best(),
                        label.best_score(),
                    ));
                }
                None => {
                    out.push_str(&ctm_line(&file, &channel, begin, duration, &Tag::text(""), None));
                }
            }
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// STM
// ---------------------------------------------------------------------------

fn parse_stm(text: &str, path: &Path) -> Result<Transcription, PantierError> {
    let mut groups = TierGroups::new(path);

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with(";;") {
            continue;
        }
        let mut fields = line.split_whitespace();
        let mut next = |what: &str| {
            fields
                .next()
                .ok_or_else(|| line_error(STM, path, line_no, &format!("missing {what}")))
        };
        let file = next("file")?;
        let channel = next("channel")?;
        let speaker = next("speaker")?;
        let begin = parse_time(next("begin time")?, STM, path, line_no)?;
        let end = parse_time(next("end time")?, STM, path, line_no)?;

        let rest = stm_tail(line);

        let (labels, transcript) = match rest.strip_prefix('<') {
            Some(after) => match after.find('>') {
                Some(close) => (Some(&rest[..close + 2]), rest[close + 2..].trim()),
                None => return Err(line_error(STM, path, line_no, "unterminated <labels> field")),
            },
            None => (None, rest.trim()),
        };

        let mut annotation = Annotation::new(
            Interval::from_secs(begin, end)?,
            Some(stm_label(transcript)),
        )
        .with_metadata("speaker", speaker);
        if let Some(labels) = labels {
            annotation = annotation.with_metadata("stm_labels", labels);
        }
        groups.tier(file, channel)?.add_annotation(annotation)?;
    }
    Ok(groups.trs)
}

/// Text of an STM line after its five fixed columns.
fn stm_tail(line: &str) -> &str {
    let mut rest = line;
    for _ in 0..5 {
        rest = rest.trim_start();
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        rest = &rest[end..];
    }
    rest.trim()
}

fn stm_label(transcript: &str) -> Label {
    if transcript.is_empty() || transcript == IGNORE_SEGMENT {
        return Label::new("");
    }
    if let Some(inner) = transcript
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
    {
        if inner.contains('/') {
            let alternatives = inner.split('/').map(|part| (Tag::text(part.trim()), None));
            if let Some(label) = Label::from_alternatives(alternatives) {
                return label;
            }
        }
    }
    Label::new(Tag::text(transcript))
}

/// Serialize a transcription to an STM string.
pub fn to_stm_string(trs: &Transcription) -> Result<String, PantierError> {
    check_writable(trs, STM)?;
    let mut out = String::new();
    writeln!(out, ";; STM generated by pantier").expect("write to string");

    for tier in trs.tiers() {
        let tier = points_to_intervals(tier, DEFAULT_POINT_EPSILON)?;
        let (file, channel) = split_tier_name(tier.name());
        for annotation in tier.iter() {
            let iv = best_interval(annotation)?;
            let speaker = annotation
                .metadata
                .get("speaker")
                .map(|s| s.split_whitespace().collect::<Vec<_>>().join("_"))
                .unwrap_or_else(|| "unknown".to_string());
            write!(
                out,
                "{file} {channel} {speaker} {} {}",
                format_time(iv.begin().midpoint()),
                format_time(iv.end().midpoint())
            )
            .expect("write to string");
            if let Some(labels) = annotation.metadata.get("stm_labels") {
                write!(out, " {}", one_line(labels)).expect("write to string");
            }
            writeln!(out, " {}", stm_transcript(annotation.label())).expect("write to string");
        }
    }
    Ok(out)
}

fn stm_transcript(label: Option<&Label>) -> String {
    let Some(label) = label.filter(|l| !l.is_blank()) else {
        return IGNORE_SEGMENT.to_string();
    };
    if !label.has_alternatives() {
        return one_line(&label.best().content());
    }
    let parts: Vec<String> = ranked_tags(label)
        .into_iter()
        .map(|t| one_line(&t.content()))
        .collect();
    format!("{{ {} }}", parts.join(" / "))
}

/// An STM record ends at the line break.
fn one_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

fn check_writable(trs: &Transcription, format: &'static str) -> Result<(), PantierError> {
    reject_disjoint(trs, format)?;
    if trs.is_empty() {
        return Err(PantierError::CapabilityMismatch {
            format,
            message: "a transcription without tiers cannot be written".to_string(),
        });
    }
    Ok(())
}

/// `SHOW_1-A` gives (`SHOW_1`, `A`); names without `-` use channel `1`.
fn split_tier_name(name: &str) -> (String, String) {
    let clean = |s: &str| s.split_whitespace().collect::<Vec<_>>().join("_");
    match name.rsplit_once('-') {
        Some((file, channel)) if !file.is_empty() && !channel.is_empty() => {
            (clean(file), clean(channel))
        }
        _ => (clean(name), "1".to_string()),
    }
}

fn line_error(format: &'static str, path: &Path, line: usize, message: &str) -> PantierError {
    PantierError::LineParse {
        format,
        path: path.to_path_buf(),
        line,
        message: message.to_string(),
    }
}
