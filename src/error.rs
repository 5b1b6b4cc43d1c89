use std::path::PathBuf;
use thiserror::Error;

use crate::conversion::ConversionReport;
use crate::validation::ValidationReport;

/// The main error type for pantier operations.
#[derive(Debug, Error)]
pub enum PantierError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode {path}: {message}")]
    Encoding { path: PathBuf, message: String },

    #[error("Failed to parse {format} XML from {path}: {source}")]
    XmlParse {
        format: &'static str,
        path: PathBuf,
        #[source]
        source: roxmltree::Error,
    },

    #[error("Failed to parse CSV from {path}: {source}")]
    CsvParse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to write CSV to {path}: {source}")]
    CsvWrite {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Invalid {format} content in {path}: {message}")]
    FormatParse {
        format: &'static str,
        path: PathBuf,
        message: String,
    },

    #[error("Invalid {format} content in {path} at line {line}: {message}")]
    LineParse {
        format: &'static str,
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Unsupported file extension '{extension}' for {path}")]
    UnsupportedExtension { path: PathBuf, extension: String },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid point: {0}")]
    InvalidPoint(String),

    #[error("Invalid range: end {end} is before begin {begin}")]
    InvalidRange { begin: f64, end: f64 },

    #[error("Invalid {value_type} tag content '{content}'")]
    InvalidTagValue { content: String, value_type: String },

    #[error("A location needs at least one localization of a single kind: {0}")]
    EmptyLocation(String),

    #[error("Tier '{tier}' holds {expected} localizations, got {found}")]
    LocalizationKindMismatch {
        tier: String,
        expected: String,
        found: String,
    },

    #[error("Tag '{tag}' is not in controlled vocabulary '{vocabulary}' of tier '{tier}'")]
    VocabularyViolation {
        tier: String,
        vocabulary: String,
        tag: String,
    },

    #[error("Tier '{tier}' already contains tag '{tag}' outside controlled vocabulary '{vocabulary}'")]
    CtrlVocabContains {
        tier: String,
        vocabulary: String,
        tag: String,
    },

    #[error("Linking '{parent}' -> '{child}' would create a hierarchy cycle")]
    HierarchyCycle { parent: String, child: String },

    #[error("{kind} cannot link '{parent}' -> '{child}': {message}")]
    HierarchyTypeMismatch {
        kind: String,
        parent: String,
        child: String,
        message: String,
    },

    #[error("Inconsistent hierarchy '{parent}' -> '{child}': {message}")]
    HierarchyConsistency {
        parent: String,
        child: String,
        message: String,
    },

    #[error("Tier not found: {0}")]
    TierNotFound(String),

    #[error("Unknown {kind} '{name}'")]
    UnknownReference { kind: &'static str, name: String },

    #[error("A tier named '{0}' already exists")]
    DuplicateTier(String),

    #[error("Annotation {id} not found in tier '{tier}'")]
    AnnotationNotFound { tier: String, id: u64 },

    #[error("{format} cannot represent disjoint localizations (tier '{tier}')")]
    DisjointUnsupported { format: &'static str, tier: String },

    #[error("{format} cannot represent this transcription: {message}")]
    CapabilityMismatch {
        format: &'static str,
        message: String,
    },

    #[error("{format} cannot store character {character:?} found in {context}")]
    InvalidXmlChar {
        format: &'static str,
        context: String,
        character: char,
    },

    #[error("Failed to serialize report as JSON: {source}")]
    ReportJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("Batch conversion failed for {failed} file(s)")]
    BatchFailed { failed: usize },

    #[error("Conversion from {} to {} would lose information", report.from, report.to)]
    LossyConversion { report: ConversionReport },

    #[error("Validation failed with {error_count} error(s) and {warning_count} warning(s)")]
    ValidationFailed {
        error_count: usize,
        warning_count: usize,
        report: ValidationReport,
    },
}
