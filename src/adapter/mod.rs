//! Format adapters and the dispatcher that picks one per file.
//!
//! Each supported format is a [`FormatAdapter`]: it reads a file into a
//! [`Transcription`], writes one back, and describes what its format can
//! express through [`Capabilities`]. Adapters are collected in a
//! [`Registry`], owned by a [`Dispatcher`] that resolves the adapter for a
//! path and stamps provenance metadata.

mod capabilities;
mod dispatcher;
mod formats;
mod registry;

use std::path::Path;

use crate::error::PantierError;
use crate::ir::Transcription;

pub use capabilities::Capabilities;
pub use dispatcher::Dispatcher;
pub use formats::{
    CsvAdapter, CtmAdapter, EafAdapter, HtkAdapter, StmAdapter, SubtitleAdapter, TextAdapter,
    TextGridAdapter, XraAdapter,
};
pub use registry::Registry;

/// A reader/writer for one file format.
///
/// Adapters are shared between worker threads, so they hold only
/// configuration and no per-document state.
pub trait FormatAdapter: Send + Sync {
    /// Short unique name, e.g. `eaf`.
    fn name(&self) -> &'static str;

    /// File extensions handled, lowercase and without the dot.
    fn extensions(&self) -> &'static [&'static str];

    /// What the format can express.
    fn capabilities(&self) -> Capabilities;

    /// Content sniffing for files whose extension is unknown.
    fn detect(&self, path: &Path) -> bool;

    /// Reads a file.
    fn read(&self, path: &Path) -> Result<Transcription, PantierError>;

    /// Writes a transcription, degrading or rejecting what the format
    /// cannot express. No partial file is left behind on error.
    fn write(&self, trs: &Transcription, path: &Path) -> Result<(), PantierError>;
}
