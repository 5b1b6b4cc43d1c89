use super::formats::{
    CsvAdapter, CtmAdapter, EafAdapter, HtkAdapter, StmAdapter, SubtitleAdapter, TextAdapter,
    TextGridAdapter, XraAdapter,
};
use super::FormatAdapter;
use crate::ir::io_subtitles::SubtitleFormat;

/// Ordered collection of adapters.
///
/// Registration order is the detection order used for files with an
/// unknown extension. When two adapters claim the same extension or name,
/// the first registered wins.
#[derive(Default)]
pub struct Registry {
    adapters: Vec<Box<dyn FormatAdapter>>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in adapter, native format first and raw text last.
    pub fn with_default_adapters() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(XraAdapter));
        registry.register(Box::new(EafAdapter::default()));
        registry.register(Box::new(TextGridAdapter));
        registry.register(Box::new(SubtitleAdapter::new(SubtitleFormat::SubRip)));
        registry.register(Box::new(SubtitleAdapter::new(SubtitleFormat::WebVtt)));
        registry.register(Box::new(SubtitleAdapter::new(SubtitleFormat::SubViewer)));
        registry.register(Box::new(CtmAdapter));
        registry.register(Box::new(StmAdapter));
        registry.register(Box::new(HtkAdapter));
        registry.register(Box::new(CsvAdapter));
        registry.register(Box::new(TextAdapter));
        registry
    }

    /// Appends an adapter.
    pub fn register(&mut self, adapter: Box<dyn FormatAdapter>) {
        self.adapters.push(adapter);
    }

    /// Adapters in registration order.
    pub fn adapters(&self) -> impl Iterator<Item = &dyn FormatAdapter> {
        self.adapters.iter().map(|a| a.as_ref())
    }

    /// Adapter by name.
    pub fn get(&self, name: &str) -> Option<&dyn FormatAdapter> {
        self.adapters().find(|a| a.name().eq_ignore_ascii_case(name))
    }

    /// Adapter handling an extension (case-insensitive, without the dot).
    pub fn by_extension(&self, extension: &str) -> Option<&dyn FormatAdapter> {
        let extension = extension.to_ascii_lowercase();
        self.adapters()
            .find(|a| a.extensions().contains(&extension.as_str()))
    }

    /// Every extension handled, in registration order.
    pub fn extensions(&self) -> Vec<&'static str> {
        self.adapters().flat_map(|a| a.extensions().iter().copied()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
