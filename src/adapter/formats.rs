//! The built-in adapters, thin wrappers over the `ir::io_*` modules.

use std::path::Path;

use super::{Capabilities, FormatAdapter};
use crate::error::PantierError;
use crate::ir::io_common::DEFAULT_POINT_EPSILON;
use crate::ir::io_subtitles::SubtitleFormat;
use crate::ir::{
    io_csv, io_eaf, io_htk, io_sclite, io_subtitles, io_text, io_textgrid, io_xra, Transcription,
};

/// Native XML format; lossless.
#[derive(Clone, Copy, Debug, Default)]
pub struct XraAdapter;

impl FormatAdapter for XraAdapter {
    fn name(&self) -> &'static str {
        "xra"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["xra"]
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    fn detect(&self, path: &Path) -> bool {
        io_xra::detect_xra(path)
    }

    fn read(&self, path: &Path) -> Result<Transcription, PantierError> {
        io_xra::read_xra(path)
    }

    fn write(&self, trs: &Transcription, path: &Path) -> Result<(), PantierError> {
        io_xra::write_xra(path, trs)
    }
}

/// ELAN annotation documents.
#[derive(Clone, Copy, Debug)]
pub struct EafAdapter {
    /// Width in seconds of the interval a point is widened to on write.
    pub point_epsilon: f64,
}

impl Default for EafAdapter {
    fn default() -> Self {
        Self {
            point_epsilon: DEFAULT_POINT_EPSILON,
        }
    }
}

impl FormatAdapter for EafAdapter {
    fn name(&self) -> &'static str {
        "eaf"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["eaf"]
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            multi_tier: true,
            no_tiers_ok: true,
            metadata: true,
            ctrl_vocab: true,
            media: true,
            hierarchy: true,
            interval: true,
            gaps: true,
            ..Default::default()
        }
    }

    fn detect(&self, path: &Path) -> bool {
        io_eaf::detect_eaf(path)
    }

    fn read(&self, path: &Path) -> Result<Transcription, PantierError> {
        io_eaf::read_eaf(path)
    }

    fn write(&self, trs: &Transcription, path: &Path) -> Result<(), PantierError> {
        let options = io_eaf::EafWriteOptions {
            point_epsilon: self.point_epsilon,
        };
        io_eaf::write_eaf(path, trs, &options)
    }
}

/// Praat TextGrid.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextGridAdapter;

impl FormatAdapter for TextGridAdapter {
    fn name(&self) -> &'static str {
        "textgrid"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["textgrid"]
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            multi_tier: true,
            no_tiers_ok: true,
            point: true,
            interval: true,
            ..Default::default()
        }
    }

    fn detect(&self, path: &Path) -> bool {
        io_textgrid::detect_textgrid(path)
    }

    fn read(&self, path: &Path) -> Result<Transcription, PantierError> {
        io_textgrid::read_textgrid(path)
    }

    fn write(&self, trs: &Transcription, path: &Path) -> Result<(), PantierError> {
        io_textgrid::write_textgrid(path, trs)
    }
}

/// SubRip, WebVTT or SubViewer subtitles.
#[derive(Clone, Copy, Debug)]
pub struct SubtitleAdapter {
    format: SubtitleFormat,
}

impl SubtitleAdapter {
    pub fn new(format: SubtitleFormat) -> Self {
        Self { format }
    }
}

impl FormatAdapter for SubtitleAdapter {
    fn name(&self) -> &'static str {
        self.format.name()
    }

    fn extensions(&self) -> &'static [&'static str] {
        match self.format {
            SubtitleFormat::SubRip => &["srt"],
            SubtitleFormat::WebVtt => &["vtt"],
            SubtitleFormat::SubViewer => &["sub"],
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            no_tiers_ok: true,
            metadata: self.format == SubtitleFormat::SubViewer,
            interval: true,
            gaps: true,
            overlaps: true,
            ..Default::default()
        }
    }

    fn detect(&self, path: &Path) -> bool {
        io_subtitles::detect_subtitles(path, self.format)
    }

    fn read(&self, path: &Path) -> Result<Transcription, PantierError> {
        io_subtitles::read_subtitles(path, self.format)
    }

    fn write(&self, trs: &Transcription, path: &Path) -> Result<(), PantierError> {
        io_subtitles::write_subtitles(path, trs, self.format)
    }
}

fn sclite_capabilities() -> Capabilities {
    Capabilities {
        multi_tier: true,
        media: true,
        interval: true,
        alt_tag: true,
        gaps: true,
        overlaps: true,
        ..Default::default()
    }
}

/// NIST time-marked conversation files.
#[derive(Clone, Copy, Debug, Default)]
pub struct CtmAdapter;

impl FormatAdapter for CtmAdapter {
    fn name(&self) -> &'static str {
        "ctm"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["ctm"]
    }

    fn capabilities(&self) -> Capabilities {
        sclite_capabilities()
    }

    fn detect(&self, path: &Path) -> bool {
        io_sclite::detect_ctm(path)
    }

    fn read(&self, path: &Path) -> Result<Transcription, PantierError> {
        io_sclite::read_ctm(path)
    }

    fn write(&self, trs: &Transcription, path: &Path) -> Result<(), PantierError> {
        io_sclite::write_ctm(path, trs)
    }
}

/// NIST segment time-marked files.
#[derive(Clone, Copy, Debug, Default)]
pub struct StmAdapter;

impl FormatAdapter for StmAdapter {
    fn name(&self) -> &'static str {
        "stm"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["stm"]
    }

    fn capabilities(&self) -> Capabilities {
        sclite_capabilities()
    }

    fn detect(&self, path: &Path) -> bool {
        io_sclite::detect_stm(path)
    }

    fn read(&self, path: &Path) -> Result<Transcription, PantierError> {
        io_sclite::read_stm(path)
    }

    fn write(&self, trs: &Transcription, path: &Path) -> Result<(), PantierError> {
        io_sclite::write_stm(path, trs)
    }
}

/// HTK label files.
#[derive(Clone, Copy, Debug, Default)]
pub struct HtkAdapter;

impl FormatAdapter for HtkAdapter {
    fn name(&self) -> &'static str {
        "htk"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["lab"]
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            interval: true,
            gaps: true,
            ..Default::default()
        }
    }

    fn detect(&self, path: &Path) -> bool {
        io_htk::detect_htk(path)
    }

    fn read(&self, path: &Path) -> Result<Transcription, PantierError> {
        io_htk::read_htk(path)
    }

    fn write(&self, trs: &Transcription, path: &Path) -> Result<(), PantierError> {
        io_htk::write_htk(path, trs)
    }
}

/// `tier,begin,end,label` rows.
#[derive(Clone, Copy, Debug, Default)]
pub struct CsvAdapter;

impl FormatAdapter for CsvAdapter {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["csv"]
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            multi_tier: true,
            no_tiers_ok: true,
            point: true,
            interval: true,
            gaps: true,
            overlaps: true,
            ..Default::default()
        }
    }

    fn detect(&self, path: &Path) -> bool {
        io_csv::detect_csv(path)
    }

    fn read(&self, path: &Path) -> Result<Transcription, PantierError> {
        io_csv::read_csv(path)
    }

    fn write(&self, trs: &Transcription, path: &Path) -> Result<(), PantierError> {
        io_csv::write_csv(path, trs)
    }
}

/// Raw text and Audacity labels; also the fallback for unknown files.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextAdapter;

impl FormatAdapter for TextAdapter {
    fn name(&self) -> &'static str {
        "text"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["txt"]
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            no_tiers_ok: true,
            point: true,
            interval: true,
            gaps: true,
            overlaps: true,
            ..Default::default()
        }
    }

    fn detect(&self, path: &Path) -> bool {
        io_text::detect_text(path)
    }

    fn read(&self, path: &Path) -> Result<Transcription, PantierError> {
        io_text::read_text_file(path)
    }

    fn write(&self, trs: &Transcription, path: &Path) -> Result<(), PantierError> {
        io_text::write_text_file(path, trs)
    }
}
