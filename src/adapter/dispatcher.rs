use std::path::Path;

use super::{FormatAdapter, Registry};
use crate::error::PantierError;
use crate::ir::Transcription;

/// Resolves the adapter for a path and stamps provenance metadata.
pub struct Dispatcher {
    registry: Registry,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Registry::with_default_adapters())
    }
}

impl Dispatcher {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Adapter for the extension of `path`, if any.
    pub fn adapter_for(&self, path: &Path) -> Option<&dyn FormatAdapter> {
        self.registry.by_extension(&extension(path))
    }

    /// Reads a file with the adapter matching its extension.
    ///
    /// With `heuristic`, a file whose extension is unknown is probed by
    /// every adapter in registration order, falling back to raw text.
    pub fn read(&self, path: &Path, heuristic: bool) -> Result<Transcription, PantierError> {
        let ext = extension(path);
        let adapter = match self.registry.by_extension(&ext) {
            Some(adapter) => adapter,
            None if heuristic => self.detect(path)?,
            None => {
                return Err(PantierError::UnsupportedExtension {
                    path: path.to_path_buf(),
                    extension: ext,
                });
            }
        };
        tracing::debug!(path = %path.display(), adapter = adapter.name(), "reading");

        let mut trs = adapter.read(path)?;
        let meta = &mut trs.metadata;
        meta.insert("file_reader".into(), adapter.name().into());
        meta.insert(
            "file_name".into(),
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        meta.insert(
            "file_path".into(),
            path.parent()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        );
        meta.insert("file_ext".into(), ext);
        meta.insert("file_read_date".into(), now());
        Ok(trs)
    }

    /// Writes a transcription with the adapter matching the extension of
    /// `path`. Provenance is stamped first so native formats carry it; the
    /// previous metadata is restored when the adapter fails.
    pub fn write(&self, trs: &mut Transcription, path: &Path) -> Result<(), PantierError> {
        let ext = extension(path);
        let adapter =
            self.registry
                .by_extension(&ext)
                .ok_or_else(|| PantierError::UnsupportedExtension {
                    path: path.to_path_buf(),
                    extension: ext.clone(),
                })?;
        tracing::debug!(path = %path.display(), adapter = adapter.name(), "writing");

        let previous = trs.metadata.clone();
        let version = trs
            .metadata
            .get("file_version")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0);
        trs.metadata
            .insert("file_writer".into(), adapter.name().into());
        trs.metadata.insert("file_write_date".into(), now());
        trs.metadata
            .insert("file_version".into(), (version + 1).to_string());

        if let Err(err) = adapter.write(trs, path) {
            trs.metadata = previous;
            return Err(err);
        }
        Ok(())
    }

    fn detect(&self, path: &Path) -> Result<&dyn FormatAdapter, PantierError> {
        if let Some(adapter) = self.registry.adapters().find(|a| a.detect(path)) {
            return Ok(adapter);
        }
        self.registry
            .get("text")
            .ok_or_else(|| PantierError::UnsupportedFormat(path.display().to_string()))
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
