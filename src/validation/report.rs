//! Findings of [`validate_transcription`](super::validate_transcription).
//!
//! Issues are grouped by severity when printed and serialize with a stable
//! `code` and a `scope`-tagged context for the JSON output of `validate`.

use serde::Serialize;
use std::fmt;

/// Issues found in one transcription, in discovery order.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn add(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    /// No errors; warnings allowed.
    pub fn is_ok(&self) -> bool {
        self.error_count() == 0
    }

    /// No issues of any severity.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Whether the transcription passes; `strict` also fails on warnings.
    pub fn passes(&self, strict: bool) -> bool {
        if strict {
            self.is_clean()
        } else {
            self.is_ok()
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.issues.is_empty() {
            return writeln!(f, "Validation passed: no issues found");
        }

        writeln!(
            f,
            "Validation found {} error(s) and {} warning(s):",
            self.error_count(),
            self.warning_count()
        )?;

        for (severity, title) in [(Severity::Error, "Errors"), (Severity::Warning, "Warnings")] {
            let count = self.count(severity);
            if count == 0 {
                continue;
            }
            writeln!(f)?;
            writeln!(f, "{title} ({count}):")?;
            for issue in self.issues.iter().filter(|i| i.severity == severity) {
                writeln!(f, "  - {issue}")?;
            }
        }
        Ok(())
    }
}

/// One finding, located by tier, annotation or hierarchy.
#[derive(Clone, Debug, Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub code: IssueCode,
    pub message: String,
    pub context: IssueContext,
}

impl ValidationIssue {
    pub fn error(code: IssueCode, message: impl Into<String>, context: IssueContext) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            context,
        }
    }

    pub fn warning(code: IssueCode, message: impl Into<String>, context: IssueContext) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            context,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.message)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Suspicious but writable; fails only under `--strict`.
    Warning,
    /// Inconsistent with the tier and hierarchy invariants.
    Error,
}

/// Issue codes; serialized names are stable across releases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    // Hierarchy issues
    /// A hierarchy link no longer holds for the current tier contents.
    HierarchyViolation,
    /// A hierarchy link names a tier that is not in the transcription.
    DanglingLink,

    // Shared resources
    /// A tier references media that the transcription does not list.
    UnlistedMedia,
    /// A tier references a vocabulary that the transcription does not list.
    UnlistedCtrlVocab,
    /// A tier holds tags outside its controlled vocabulary.
    VocabularyViolation,

    // Tier issues
    /// A tier has an empty name.
    EmptyTierName,
    /// Two tier names differ only by case.
    AmbiguousTierName,
    /// A tier holds no annotations.
    EmptyTier,
    /// A tier holds overlapping annotations.
    OverlappingAnnotations,

    // Annotation issues
    /// A localization starts before time zero.
    NegativeTime,
    /// An interval has zero duration.
    ZeroDuration,
    /// A label or localization score is NaN or infinite.
    ScoreNotFinite,
    /// An annotation has no label text (strict mode only).
    EmptyLabel,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum IssueContext {
    Hierarchy,
    Tier { name: String },
    /// Position of the annotation in its tier.
    Annotation { tier: String, index: usize },
}

impl fmt::Display for IssueContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueContext::Hierarchy => write!(f, "hierarchy"),
            IssueContext::Tier { name } => write!(f, "tier '{}'", name),
            IssueContext::Annotation { tier, index } => {
                write!(f, "annotation {} of tier '{}'", index, tier)
            }
        }
    }
}
