//! Praat TextGrid reader and writer.
//!
//! Reads the long and short text formats (UTF-8, or UTF-16 with a byte
//! order mark) and the `ooBinaryFile` binary format. Writes the long text
//! format in UTF-8.
//!
//! Both text formats carry the same sequence of values; the long format
//! only adds `name =` style comments. The reader therefore tokenizes the
//! file into strings, numbers and `<exists>` flags, and ignores everything
//! else, including `[n]` indices and `!` comments.
//!
//! Writing degrades as follows: disjoint tiers are rejected, interval gaps
//! are filled with empty intervals spanning the whole grid, overlapping
//! tiers are rejected, only the best localization is kept and label
//! alternatives are written as `{a|b}`.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use super::interval::Interval;
use super::io_common::{
    best_interval, decode_text, file_stem, fill_gaps, format_time, reject_disjoint,
    reject_overlaps, sniff, write_atomic,
};
use super::point::Point;
use super::text_label::{label_to_text, text_to_label};
use super::tier::Tier;
use super::transcription::Transcription;
use crate::error::PantierError;

const FORMAT: &str = "textgrid";
const BINARY_MAGIC: &[u8] = b"ooBinaryFile";

/// Read a TextGrid file in any of Praat's three encodings.
pub fn read_textgrid(path: &Path) -> Result<Transcription, PantierError> {
    let bytes = fs::read(path)?;
    parse_textgrid_bytes(&bytes, path)
}

/// Write a transcription as a long-format TextGrid.
pub fn write_textgrid(path: &Path, trs: &Transcription) -> Result<(), PantierError> {
    let text = to_textgrid_string(trs)?;
    write_atomic(path, text.as_bytes())
}

/// Parse a text TextGrid from a string.
pub fn from_textgrid_str(text: &str) -> Result<Transcription, PantierError> {
    parse_text(text, Path::new("<string>"))
}

/// Parse a TextGrid from bytes (text or binary).
pub fn from_textgrid_slice(bytes: &[u8]) -> Result<Transcription, PantierError> {
    parse_textgrid_bytes(bytes, Path::new("<bytes>"))
}

/// True if the file starts like a Praat TextGrid.
pub fn detect_textgrid(path: &Path) -> bool {
    sniff(path).is_some_and(|head| {
        head.starts_with("ooBinaryFile")
            || (head.contains("ooTextFile") && head.contains("TextGrid"))
    })
}

fn parse_textgrid_bytes(bytes: &[u8], path: &Path) -> Result<Transcription, PantierError> {
    if bytes.starts_with(BINARY_MAGIC) {
        return parse_binary(bytes, path);
    }
    let text = decode_text(bytes, path)?;
    parse_text(&text, path)
}

// ---------------------------------------------------------------------------
// Text formats
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Text(String),
    Number(f64),
    Flag(bool),
}

fn tokenize(text: &str, path: &Path) -> Result<Vec<(Token, usize)>, PantierError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    let mut line = 1;

    while let Some(c) = chars.next() {
        match c {
            '\n' => line += 1,
            '"' => {
                let start = line;
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('"') if chars.peek() == Some(&'"') => {
                            chars.next();
                            value.push('"');
                        }
                        Some('"') => break,
                        Some(ch) => {
                            if ch == '\n' {
                                line += 1;
                            }
                            value.push(ch);
                        }
                        None => return Err(line_error(path, start, "unterminated string")),
                    }
                }
                tokens.push((Token::Text(value), start));
            }
            '!' => {
                for ch in chars.by_ref() {
                    if ch == '\n' {
                        line += 1;
                        break;
                    }
                }
            }
            '[' => {
                for ch in chars.by_ref() {
                    if ch == ']' {
                        break;
                    }
                }
            }
            '<' => {
                let flag: String = chars.by_ref().take_while(|&ch| ch != '>').collect();
                let value = match flag.trim() {
                    "exists" => true,
                    "absent" => false,
                    other => {
                        return Err(line_error(path, line, &format!("unknown flag <{other}>")));
                    }
                };
                tokens.push((Token::Flag(value), line));
            }
            c if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => {
                let mut raw = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || matches!(next, '.' | '-' | '+') {
                        raw.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value: f64 = raw
                    .parse()
                    .map_err(|_| line_error(path, line, &format!("invalid number '{raw}'")))?;
                tokens.push((Token::Number(value), line));
            }
            c if c.is_alphabetic() || c == '_' => {
                while chars
                    .peek()
                    .is_some_and(|next| next.is_alphanumeric() || *next == '_')
                {
                    chars.next();
                }
            }
            _ => {}
        }
    }
    Ok(tokens)
}

struct TokenCursor<'t> {
    tokens: &'t [(Token, usize)],
    pos: usize,
    path: &'t Path,
}

impl<'t> TokenCursor<'t> {
    fn next(&mut self, what: &str) -> Result<&'t Token, PantierError> {
        match self.tokens.get(self.pos) {
            Some((token, _)) => {
                self.pos += 1;
                Ok(token)
            }
            None => Err(self.error(&format!("unexpected end of file, expected {what}"))),
        }
    }

    fn text(&mut self, what: &str) -> Result<String, PantierError> {
        match self.next(what)? {
            Token::Text(value) => Ok(value.clone()),
            other => Err(self.unexpected(what, other)),
        }
    }

    fn number(&mut self, what: &str) -> Result<f64, PantierError> {
        match self.next(what)? {
            Token::Number(value) => Ok(*value),
            other => Err(self.unexpected(what, other)),
        }
    }

    fn count(&mut self, what: &str) -> Result<usize, PantierError> {
        let value = self.number(what)?;
        if value < 0.0 || value.fract() != 0.0 {
            return Err(self.error(&format!("invalid {what} {value}")));
        }
        Ok(value as usize)
    }

    fn unexpected(&self, what: &str, found: &Token) -> PantierError {
        self.error(&format!("expected {what}, found {found:?}"))
    }

    fn error(&self, message: &str) -> PantierError {
        let line = self
            .tokens
            .get(self.pos.saturating_sub(1))
            .map_or(0, |(_, line)| *line);
        line_error(self.path, line, message)
    }
}

fn parse_text(text: &str, path: &Path) -> Result<Transcription, PantierError> {
    let tokens = tokenize(text, path)?;
    let mut cursor = TokenCursor {
        tokens: &tokens,
        pos: 0,
        path,
    };

    let file_type = cursor.text("file type")?;
    if !file_type.starts_with("ooTextFile") {
        return Err(cursor.error(&format!("not a Praat text file ('{file_type}')")));
    }
    let class = cursor.text("object class")?;
    if class != "TextGrid" {
        return Err(cursor.error(&format!("object class '{class}' is not a TextGrid")));
    }
    cursor.number("xmin")?;
    cursor.number("xmax")?;

    let mut trs = Transcription::new(file_stem(path));
    let exists = match cursor.next("tiers flag")? {
        Token::Flag(value) => *value,
        other => return Err(cursor.unexpected("tiers flag", other)),
    };
    if !exists {
        return Ok(trs);
    }

    let size = cursor.count("tier count")?;
    for _ in 0..size {
        let class = cursor.text("tier class")?;
        let name = cursor.text("tier name")?;
        cursor.number("tier xmin")?;
        cursor.number("tier xmax")?;
        let count = cursor.count("item count")?;
        let mut tier = Tier::new(name);
        match class.as_str() {
            "IntervalTier" => {
                for _ in 0..count {
                    let begin = cursor.number("interval xmin")?;
                    let end = cursor.number("interval xmax")?;
                    let text = cursor.text("interval text")?;
                    tier.create_annotation(
                        Interval::from_secs(begin, end)?,
                        Some(text_to_label(&text)),
                    )?;
                }
            }
            "TextTier" => {
                for _ in 0..count {
                    let time = cursor.number("point time")?;
                    let mark = cursor.text("point mark")?;
                    tier.create_annotation(Point::exact(time), Some(text_to_label(&mark)))?;
                }
            }
            other => return Err(cursor.error(&format!("unknown tier class '{other}'"))),
        }
        append_unique(&mut trs, tier, path)?;
    }
    Ok(trs)
}

/// Praat allows duplicate tier names; the model does not.
fn append_unique(trs: &mut Transcription, mut tier: Tier, path: &Path) -> Result<(), PantierError> {
    if trs.find(tier.name(), true).is_some() {
        let base = tier.name().to_string();
        let renamed = (2..)
            .map(|n| format!("{base}-{n}"))
            .find(|candidate| trs.find(candidate, true).is_none())
            .unwrap_or_default();
        tracing::warn!(path = %path.display(), "duplicate tier '{base}' renamed to '{renamed}'");
        tier.set_name(renamed);
    }
    trs.append(tier)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Binary format
// ---------------------------------------------------------------------------

struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
    path: &'a Path,
}

impl<'a> ByteCursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], PantierError> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.data.len());
        let Some(end) = end else {
            return Err(format_error(self.path, "unexpected end of binary data"));
        };
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, PantierError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, PantierError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn i32(&mut self) -> Result<i32, PantierError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f64(&mut self) -> Result<f64, PantierError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(f64::from_be_bytes(buf))
    }

    fn count(&mut self) -> Result<usize, PantierError> {
        let n = self.i32()?;
        usize::try_from(n).map_err(|_| format_error(self.path, &format!("negative count {n}")))
    }

    /// Class names: one length byte then ASCII.
    fn short_string(&mut self) -> Result<String, PantierError> {
        let len = self.u8()? as usize;
        Ok(String::from_utf8_lossy(self.take(len)?).into_owned())
    }

    /// Names and labels: a u16 length then Latin-1, or 0xFFFF, a u16
    /// length and UTF-16 BE.
    fn wide_string(&mut self) -> Result<String, PantierError> {
        let len = self.u16()?;
        if len != u16::MAX {
            return Ok(self.take(len as usize)?.iter().map(|&b| b as char).collect());
        }
        let len = self.u16()? as usize;
        let units: Vec<u16> = self
            .take(len * 2)?
            .chunks_exact(2)
            .map(|p| u16::from_be_bytes([p[0], p[1]]))
            .collect();
        Ok(String::from_utf16_lossy(&units))
    }
}

fn parse_binary(bytes: &[u8], path: &Path) -> Result<Transcription, PantierError> {
    let mut cursor = ByteCursor {
        data: bytes,
        pos: BINARY_MAGIC.len(),
        path,
    };
    let class = cursor.short_string()?;
    if class != "TextGrid" {
        return Err(format_error(path, &format!("object class '{class}' is not a TextGrid")));
    }
    cursor.f64()?;
    cursor.f64()?;

    let mut trs = Transcription::new(file_stem(path));
    if cursor.u8()? == 0 {
        return Ok(trs);
    }
    let size = cursor.count()?;
    for _ in 0..size {
        let class = cursor.short_string()?;
        let name = cursor.wide_string()?;
        cursor.f64()?;
        cursor.f64()?;
        let count = cursor.count()?;
        let mut tier = Tier::new(name);
        match class.as_str() {
            "IntervalTier" => {
                for _ in 0..count {
                    let begin = cursor.f64()?;
                    let end = cursor.f64()?;
                    let text = cursor.wide_string()?;
                    tier.create_annotation(
                        Interval::from_secs(begin, end)?,
                        Some(text_to_label(&text)),
                    )?;
                }
            }
            "TextTier" => {
                for _ in 0..count {
                    let time = cursor.f64()?;
                    let mark = cursor.wide_string()?;
                    tier.create_annotation(Point::exact(time), Some(text_to_label(&mark)))?;
                }
            }
            other => return Err(format_error(path, &format!("unknown tier class '{other}'"))),
        }
        append_unique(&mut trs, tier, path)?;
    }
    Ok(trs)
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Serialize a transcription to a long-format TextGrid string.
pub fn to_textgrid_string(trs: &Transcription) -> Result<String, PantierError> {
    reject_disjoint(trs, FORMAT)?;

    let xmin = trs.min_point().map_or(0.0, |p| p.midpoint().min(0.0));
    let xmax = trs.max_point().map_or(xmin, |p| p.midpoint().max(xmin));

    let mut out = String::new();
    writeln!(out, "File type = \"ooTextFile\"").expect("write to string");
    writeln!(out, "Object class = \"TextGrid\"").expect("write to string");
    writeln!(out).expect("write to string");
    writeln!(out, "xmin = {} ", format_time(xmin)).expect("write to string");
    writeln!(out, "xmax = {} ", format_time(xmax)).expect("write to string");
    if trs.is_empty() {
        writeln!(out, "tiers? <absent> ").expect("write to string");
        return Ok(out);
    }
    writeln!(out, "tiers? <exists> ").expect("write to string");
    writeln!(out, "size = {} ", trs.len()).expect("write to string");
    writeln!(out, "item []: ").expect("write to string");

    for (n, tier) in trs.tiers().iter().enumerate() {
        reject_overlaps(tier, FORMAT)?;
        writeln!(out, "    item [{}]:", n + 1).expect("write to string");
        if tier.is_point() {
            write_tier_header(&mut out, "TextTier", tier, xmin, xmax);
            writeln!(out, "        points: size = {} ", tier.len()).expect("write to string");
            for (i, annotation) in tier.iter().enumerate() {
                let time = annotation.location().best().lowest().midpoint();
                writeln!(out, "        points [{}]:", i + 1).expect("write to string");
                writeln!(out, "            number = {} ", format_time(time)).expect("write to string");
                writeln!(
                    out,
                    "            mark = \"{}\" ",
                    quote(&label_to_text(annotation.label()))
                )
                .expect("write to string");
            }
        } else {
            let filled = fill_gaps(tier, Some((xmin, xmax)))?;
            write_tier_header(&mut out, "IntervalTier", tier, xmin, xmax);
            writeln!(out, "        intervals: size = {} ", filled.len()).expect("write to string");
            for (i, annotation) in filled.iter().enumerate() {
                let iv = best_interval(annotation)?;
                writeln!(out, "        intervals [{}]:", i + 1).expect("write to string");
                writeln!(out, "            xmin = {} ", format_time(iv.begin().midpoint()))
                    .expect("write to string");
                writeln!(out, "            xmax = {} ", format_time(iv.end().midpoint()))
                    .expect("write to string");
                writeln!(
                    out,
                    "            text = \"{}\" ",
                    quote(&label_to_text(annotation.label()))
                )
                .expect("write to string");
            }
        }
    }
    Ok(out)
}

fn write_tier_header(out: &mut String, class: &str, tier: &Tier, xmin: f64, xmax: f64) {
    writeln!(out, "        class = \"{class}\" ").expect("write to string");
    writeln!(out, "        name = \"{}\" ", quote(tier.name())).expect("write to string");
    writeln!(out, "        xmin = {} ", format_time(xmin)).expect("write to string");
    writeln!(out, "        xmax = {} ", format_time(xmax)).expect("write to string");
}

fn quote(text: &str) -> String {
    text.replace('"', "\"\"")
}

fn line_error(path: &Path, line: usize, message: &str) -> PantierError {
    PantierError::LineParse {
        format: FORMAT,
        path: path.to_path_buf(),
        line,
        message: message.to_string(),
    }
}

fn format_error(path: &Path, message: &str) -> PantierError {
    PantierError::FormatParse {
        format: FORMAT,
        path: PathBuf::from(path),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Label;

    const LONG: &str = r#"File type = "ooTextFile"
Object class = "TextGrid"

xmin = 0
xmax = 2.5
tiers? <exists>
size = 2
item []:
    item [1]:
        class = "IntervalTier"
        name = "words"
        xmin = 0
        xmax = 2.5
        intervals: size = 3
        intervals [1]:
            xmin = 0
            xmax = 1
            text = "say ""hi"""
        intervals [2]:
            xmin = 1
            xmax = 2
            text = ""
        intervals [3]:
            xmin = 2
            xmax = 2.5
            text = "{a|b}"
    item [2]:
        class = "TextTier"
        name = "marks"
        xmin = 0
        xmax = 2.5
        points: size = 1
        points [1]:
            number = 0.75
            mark = "peak"
"#;

    const SHORT: &str = "File type = \"ooTextFile\"\nObject class = \"TextGrid\"\n\n0\n2\n<exists>\n1\n\"IntervalTier\"\n\"w\"\n0\n2\n2\n0\n1\n\"one\"\n1\n2\n\"two\"\n";

    #[test]
    fn reads_long_format() {
        let trs = from_textgrid_str(LONG).unwrap();
        assert_eq!(trs.len(), 2);
        let words = trs.find("words", true).unwrap();
        assert_eq!(words.len(), 3);
        assert_eq!(words.annotations()[0].best_text(), "say \"hi\"");
        assert_eq!(words.annotations()[2].label().unwrap().len(), 2);
        let marks = trs.find("marks", true).unwrap();
        assert!(marks.is_point());
        assert_eq!(marks.annotations()[0].lowest().midpoint(), 0.75);
    }

    #[test]
    fn reads_short_format() {
        let trs = from_textgrid_str(SHORT).unwrap();
        let tier = trs.find("w", true).unwrap();
        assert_eq!(tier.len(), 2);
        assert_eq!(tier.annotations()[1].best_text(), "two");
    }

    #[test]
    fn reads_binary_format() {
        let mut bytes = b"ooBinaryFile".to_vec();
        bytes.push(8);
        bytes.extend_from_slice(b"TextGrid");
        bytes.extend_from_slice(&0.0f64.to_be_bytes());
        bytes.extend_from_slice(&1.0f64.to_be_bytes());
        bytes.push(1);
        bytes.extend_from_slice(&1i32.to_be_bytes());
        bytes.push(12);
        bytes.extend_from_slice(b"IntervalTier");
        bytes.extend_from_slice(&2u16.to_be_bytes());
        bytes.extend_from_slice(b"ph");
        bytes.extend_from_slice(&0.0f64.to_be_bytes());
        bytes.extend_from_slice(&1.0f64.to_be_bytes());
        bytes.extend_from_slice(&1i32.to_be_bytes());
        bytes.extend_from_slice(&0.0f64.to_be_bytes());
        bytes.extend_from_slice(&1.0f64.to_be_bytes());
        // "é" as UTF-16
        bytes.extend_from_slice(&u16::MAX.to_be_bytes());
        bytes.extend_from_slice(&1u16.to_be_bytes());
        bytes.extend_from_slice(&0x00E9u16.to_be_bytes());

        let trs = from_textgrid_slice(&bytes).unwrap();
        let tier = trs.find("ph", true).unwrap();
        assert_eq!(tier.annotations()[0].best_text(), "é");
    }

    #[test]
    fn truncated_binary_is_an_error() {
        let err = from_textgrid_slice(b"ooBinaryFile\x08Text").unwrap_err();
        assert!(matches!(err, PantierError::FormatParse { .. }));
    }

    #[test]
    fn writer_fills_gaps_and_reads_back() {
        let mut trs = Transcription::new("t");
        let mut tier = Tier::new("words");
        tier.create_annotation(Interval::from_secs(0.5, 1.0).unwrap(), Some(Label::from("a")))
            .unwrap();
        tier.create_annotation(Interval::from_secs(2.0, 3.0).unwrap(), Some(Label::from("b")))
            .unwrap();
        trs.append(tier).unwrap();

        let text = to_textgrid_string(&trs).unwrap();
        let back = from_textgrid_str(&text).unwrap();
        let words = back.find("words", true).unwrap();
        let texts: Vec<String> = words.iter().map(|a| a.best_text()).collect();
        assert_eq!(texts, ["", "a", "", "b"]);
    }

    #[test]
    fn duplicate_names_are_renamed() {
        let text = SHORT.replace("\n1\n\"IntervalTier\"", "\n2\n\"IntervalTier\"")
            + "\"IntervalTier\"\n\"w\"\n0\n2\n1\n0\n2\n\"x\"\n";
        let trs = from_textgrid_str(&text).unwrap();
        assert!(trs.find("w-2", true).is_some());
    }

    #[test]
    fn overlapping_tiers_are_rejected() {
        let mut trs = Transcription::new("t");
        let mut tier = Tier::new("o");
        tier.create_annotation(Interval::from_secs(0.0, 2.0).unwrap(), None)
            .unwrap();
        tier.create_annotation(Interval::from_secs(1.0, 3.0).unwrap(), None)
            .unwrap();
        trs.append(tier).unwrap();
        let err = to_textgrid_string(&trs).unwrap_err();
        assert!(matches!(err, PantierError::CapabilityMismatch { .. }));
    }
}
