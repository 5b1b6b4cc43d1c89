//! Conversion report types for tracking lossiness and degradation policy.
//!
//! This module provides structured reporting for format conversions,
//! similar to how `validation::ValidationReport` tracks document issues.

use serde::Serialize;
use std::fmt;

/// A report generated before a format conversion.
///
/// Tracks input/output counts, lossiness warnings, and the degradation
/// policies the target writer will apply.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ConversionReport {
    /// Source format name.
    pub from: String,
    /// Target format name.
    pub to: String,
    /// Counts from the input transcription.
    pub input: ConversionCounts,
    /// Expected counts in the output.
    pub output: ConversionCounts,
    /// Issues discovered during conversion analysis.
    pub issues: Vec<ConversionIssue>,
}

impl ConversionReport {
    /// Create a new empty report for a conversion between formats.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            ..Default::default()
        }
    }

    /// Add an issue to the report.
    pub fn add(&mut self, issue: ConversionIssue) {
        self.issues.push(issue);
    }

    fn count(&self, severity: ConversionSeverity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    /// Count of error-level issues (the target writer will refuse).
    pub fn error_count(&self) -> usize {
        self.count(ConversionSeverity::Error)
    }

    /// Count of warning-level issues (true lossiness).
    pub fn warning_count(&self) -> usize {
        self.count(ConversionSeverity::Warning)
    }

    /// Count of info-level issues (policy decisions, notes).
    pub fn info_count(&self) -> usize {
        self.count(ConversionSeverity::Info)
    }

    /// Returns true if the target writer is known to reject the input.
    pub fn is_rejected(&self) -> bool {
        self.error_count() > 0
    }

    /// Returns true if this conversion would lose information.
    pub fn is_lossy(&self) -> bool {
        self.warning_count() > 0
    }

    /// Iterate over warning messages (for error display compatibility).
    pub fn lossy_messages(&self) -> impl Iterator<Item = &str> {
        self.issues
            .iter()
            .filter(|i| i.severity == ConversionSeverity::Warning)
            .map(|i| i.message.as_str())
    }
}

impl fmt::Display for ConversionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  {} tiers, {} annotations",
            self.input.tiers, self.input.annotations
        )?;

        if self.output != self.input {
            writeln!(
                f,
                "  output: {} tiers, {} annotations",
                self.output.tiers, self.output.annotations
            )?;
        }

        for (severity, title) in [
            (ConversionSeverity::Error, "Errors"),
            (ConversionSeverity::Warning, "Warnings"),
            (ConversionSeverity::Info, "Notes"),
        ] {
            let count = self.count(severity);
            if count == 0 {
                continue;
            }
            writeln!(f)?;
            writeln!(f, "{} ({}):", title, count)?;
            for issue in self.issues.iter().filter(|i| i.severity == severity) {
                writeln!(f, "  - {}", issue.message)?;
            }
        }

        Ok(())
    }
}

/// Counts of document elements.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConversionCounts {
    pub tiers: usize,
    pub annotations: usize,
}

/// A single issue discovered during conversion analysis.
#[derive(Clone, Debug, Serialize)]
pub struct ConversionIssue {
    pub severity: ConversionSeverity,
    pub code: ConversionIssueCode,
    pub message: String,
}

impl ConversionIssue {
    /// Create an error-level issue (the write will fail).
    pub fn error(code: ConversionIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: ConversionSeverity::Error,
            code,
            message: message.into(),
        }
    }

    /// Create a warning-level issue (indicates lossiness).
    pub fn warning(code: ConversionIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: ConversionSeverity::Warning,
            code,
            message: message.into(),
        }
    }

    /// Create an info-level issue (policy note, does not block).
    pub fn info(code: ConversionIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: ConversionSeverity::Info,
            code,
            message: message.into(),
        }
    }
}

/// Severity level for conversion issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionSeverity {
    /// The target writer rejects the input with a typed error.
    Error,
    /// Information loss; requires `--allow-lossy`.
    Warning,
    /// A deterministic policy decision; does not block conversion.
    Info,
}

/// Stable issue codes for programmatic consumption.
///
/// These codes are part of the JSON schema and should remain stable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionIssueCode {
    // Rejected by the target writer
    /// More tiers than a single-tier format can hold.
    TooManyTiers,
    /// Empty transcription for a format that needs at least one tier.
    NoTiers,
    /// Disjoint localizations.
    DisjointLocalizations,
    /// Overlapping annotations in a format without overlaps.
    OverlappingAnnotations,

    // Lossiness
    /// Transcription, tier, media or annotation metadata will be dropped.
    DropMetadata,
    /// Controlled vocabularies will be dropped.
    DropCtrlVocab,
    /// Media references will be dropped.
    DropMedia,
    /// Hierarchy links will be dropped.
    DropHierarchy,
    /// Only the best of several localizations will be written.
    DropAltLocalizations,
    /// Point radii will be dropped.
    DropRadius,
    /// Annotations without label text will not be written.
    DropEmptyLabels,
    /// Scores of alternative tags will be dropped.
    DropTagScores,
    /// Points will be widened to short intervals.
    CoercePoints,

    // Policy decisions (Info level)
    /// Alternative tags will be encoded as `{a|b}` text.
    EncodeAltTags,
    /// Gaps between intervals will be filled with empty intervals.
    FillGaps,
}
