//! Transcription validation for pantier.
//!
//! This module checks a transcription for problems that its constructors
//! cannot rule out on their own:
//! - Hierarchy links invalidated by later tier edits
//! - Shared resources (media, vocabularies) missing from the transcription
//! - Vocabulary violations left behind by lenient readers
//! - Suspicious tiers and localizations (empty, overlapping, negative time)

mod report;

pub use report::{IssueCode, IssueContext, Severity, ValidationIssue, ValidationReport};

use std::collections::HashMap;

use crate::error::PantierError;
use crate::ir::{Annotation, Localization, Tier, Transcription};

/// Options for validation behavior.
#[derive(Clone, Debug, Default)]
pub struct ValidateOptions {
    /// If true, treat warnings as errors and report unlabeled annotations.
    pub strict: bool,
}

/// Validates a transcription and returns a report of all issues found.
///
/// This function performs:
/// - Re-checking every hierarchy link against the current tier contents
/// - Verifying tier media and vocabularies are listed by the transcription
/// - Checking labels against the tier's controlled vocabulary
/// - Checking tier names, emptiness and overlaps
/// - Checking localizations and scores
pub fn validate_transcription(trs: &Transcription, opts: &ValidateOptions) -> ValidationReport {
    let mut report = ValidationReport::default();

    validate_hierarchy(trs, &mut report);
    validate_tier_names(trs, &mut report);

    for tier in trs.tiers() {
        validate_shared_resources(trs, tier, &mut report);
        validate_tier(tier, opts, &mut report);
    }

    report
}

/// Returns `ValidationFailed` unless the report passes under `opts`.
pub fn ensure_valid(report: ValidationReport, opts: &ValidateOptions) -> Result<(), PantierError> {
    if !report.passes(opts.strict) {
        Err(PantierError::ValidationFailed {
            error_count: report.error_count(),
            warning_count: report.warning_count(),
            report,
        })
    } else {
        Ok(())
    }
}

fn validate_hierarchy(trs: &Transcription, report: &mut ValidationReport) {
    for err in trs.validate_hierarchy() {
        let code = match err {
            PantierError::TierNotFound(_) => IssueCode::DanglingLink,
            _ => IssueCode::HierarchyViolation,
        };
        report.add(ValidationIssue::error(
            code,
            err.to_string(),
            IssueContext::Hierarchy,
        ));
    }
}

fn validate_tier_names(trs: &Transcription, report: &mut ValidationReport) {
    let mut seen: HashMap<String, &str> = HashMap::new();

    for tier in trs.tiers() {
        let name = tier.name();
        if name.trim().is_empty() {
            report.add(ValidationIssue::warning(
                IssueCode::EmptyTierName,
                "Empty tier name",
                IssueContext::Tier {
                    name: name.to_string(),
                },
            ));
            continue;
        }

        if let Some(first) = seen.get(&name.to_lowercase()) {
            report.add(ValidationIssue::warning(
                IssueCode::AmbiguousTierName,
                format!("Tier name differs from '{}' only by case", first),
                IssueContext::Tier {
                    name: name.to_string(),
                },
            ));
        } else {
            seen.insert(name.to_lowercase(), name);
        }
    }
}

fn validate_shared_resources(trs: &Transcription, tier: &Tier, report: &mut ValidationReport) {
    let context = || IssueContext::Tier {
        name: tier.name().to_string(),
    };

    if let Some(media) = tier.media() {
        if trs.media_by_id(&media.id).is_none() {
            report.add(ValidationIssue::error(
                IssueCode::UnlistedMedia,
                format!("Media '{}' is not listed by the transcription", media.id),
                context(),
            ));
        }
    }

    if let Some(cv) = tier.ctrl_vocab() {
        if trs.ctrl_vocab_by_name(cv.name()).is_none() {
            report.add(ValidationIssue::error(
                IssueCode::UnlistedCtrlVocab,
                format!(
                    "Controlled vocabulary '{}' is not listed by the transcription",
                    cv.name()
                ),
                context(),
            ));
        }

        let violations = tier.ctrl_vocab_violations();
        if !violations.is_empty() {
            let mut tags: Vec<String> = violations.iter().map(|(_, tag)| tag.content()).collect();
            tags.sort();
            tags.dedup();
            report.add(ValidationIssue::warning(
                IssueCode::VocabularyViolation,
                format!(
                    "{} tag(s) outside vocabulary '{}': {}",
                    violations.len(),
                    cv.name(),
                    tags.join(", ")
                ),
                context(),
            ));
        }
    }
}

fn validate_tier(tier: &Tier, opts: &ValidateOptions, report: &mut ValidationReport) {
    let context = IssueContext::Tier {
        name: tier.name().to_string(),
    };

    if tier.is_empty() {
        report.add(ValidationIssue::warning(
            IssueCode::EmptyTier,
            "Tier holds no annotations",
            context,
        ));
        return;
    }

    if tier.has_overlaps() {
        report.add(ValidationIssue::warning(
            IssueCode::OverlappingAnnotations,
            "Tier holds overlapping annotations",
            context,
        ));
    }

    for (index, annotation) in tier.iter().enumerate() {
        validate_annotation(tier, index, annotation, opts, report);
    }
}

fn validate_annotation(
    tier: &Tier,
    index: usize,
    annotation: &Annotation,
    opts: &ValidateOptions,
    report: &mut ValidationReport,
) {
    let context = || IssueContext::Annotation {
        tier: tier.name().to_string(),
        index,
    };

    if annotation.lowest().midpoint() < 0.0 {
        report.add(ValidationIssue::warning(
            IssueCode::NegativeTime,
            format!("Starts at {} s", annotation.lowest().midpoint()),
            context(),
        ));
    }

    let location = annotation.location();
    if location
        .alternatives()
        .iter()
        .any(|(loc, _)| is_zero_duration(loc))
    {
        report.add(ValidationIssue::warning(
            IssueCode::ZeroDuration,
            "Interval has zero duration",
            context(),
        ));
    }

    let location_scores = location.alternatives().iter().filter_map(|(_, s)| *s);
    let label_scores = annotation
        .label()
        .into_iter()
        .flat_map(|l| l.alternatives().iter().filter_map(|(_, s)| *s));
    if location_scores.chain(label_scores).any(|s| !s.is_finite()) {
        report.add(ValidationIssue::error(
            IssueCode::ScoreNotFinite,
            "Score is NaN or infinite",
            context(),
        ));
    }

    if opts.strict && annotation.label().map_or(true, |l| l.is_blank()) {
        report.add(ValidationIssue::warning(
            IssueCode::EmptyLabel,
            "Annotation has no label text",
            context(),
        ));
    }
}

fn is_zero_duration(localization: &Localization) -> bool {
    let intervals = match localization {
        Localization::Point(_) => return false,
        Localization::Interval(i) => std::slice::from_ref(i),
        Localization::Disjoint(d) => d.intervals(),
    };
    intervals
        .iter()
        .any(|i| i.end().midpoint() - i.begin().midpoint() <= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ControlledVocabulary, Interval, Label, Media, Point, Tag};
    use std::sync::Arc;

    fn valid_transcription() -> Transcription {
        let mut trs = Transcription::new("valid");
        let tier = trs.create_tier("words").unwrap();
        tier.create_annotation(Interval::from_secs(0.0, 0.5).unwrap(), Some(Label::new("hi")))
            .unwrap();
        tier.create_annotation(Interval::from_secs(0.5, 1.0).unwrap(), Some(Label::new("you")))
            .unwrap();
        trs
    }

    fn has(report: &ValidationReport, code: IssueCode) -> bool {
        report.issues.iter().any(|i| i.code == code)
    }

    #[test]
    fn test_valid_transcription() {
        let trs = valid_transcription();
        let report = validate_transcription(&trs, &ValidateOptions { strict: true });
        assert!(
            report.is_clean(),
            "Expected no issues, got: {:?}",
            report.issues
        );
    }

    #[test]
    fn test_empty_tier_and_ambiguous_name() {
        let mut trs = valid_transcription();
        trs.create_tier("Words").unwrap();

        let report = validate_transcription(&trs, &ValidateOptions::default());
        assert_eq!(report.warning_count(), 2);
        assert!(has(&report, IssueCode::EmptyTier));
        assert!(has(&report, IssueCode::AmbiguousTierName));
        assert!(report.is_ok());
    }

    #[test]
    fn test_overlaps_and_zero_duration() {
        let mut trs = Transcription::new("t");
        let tier = trs.create_tier("words").unwrap();
        tier.create_annotation(Interval::from_secs(0.0, 1.0).unwrap(), Some(Label::new("a")))
            .unwrap();
        tier.create_annotation(Interval::from_secs(0.5, 0.5).unwrap(), Some(Label::new("b")))
            .unwrap();

        let report = validate_transcription(&trs, &ValidateOptions::default());
        assert!(has(&report, IssueCode::OverlappingAnnotations));
        assert!(has(&report, IssueCode::ZeroDuration));
    }

    #[test]
    fn test_vocabulary_violation_from_lenient_binding() {
        let mut trs = valid_transcription();
        let cv = trs.add_ctrl_vocab(ControlledVocabulary::new("greetings").with_entry("hi", ""));
        let tier = trs.tier_mut(0).unwrap();
        let violations = tier.bind_ctrl_vocab_lenient(Arc::clone(&cv));
        assert_eq!(violations.len(), 1);

        let report = validate_transcription(&trs, &ValidateOptions::default());
        let issue = report
            .issues
            .iter()
            .find(|i| i.code == IssueCode::VocabularyViolation)
            .unwrap();
        assert!(issue.message.contains("you"));
        assert_eq!(issue.severity, Severity::Warning);
    }

    #[test]
    fn test_unlisted_media() {
        let mut trs = valid_transcription();
        trs.tier_mut(0)
            .unwrap()
            .set_media(Some(Arc::new(Media::new("elsewhere.wav"))));

        let report = validate_transcription(&trs, &ValidateOptions::default());
        assert_eq!(report.error_count(), 1);
        assert!(has(&report, IssueCode::UnlistedMedia));
    }

    #[test]
    fn test_negative_time_and_bad_score() {
        let mut trs = Transcription::new("t");
        let tier = trs.create_tier("beats").unwrap();
        tier.create_annotation(
            Point::exact(-0.5),
            Some(Label::scored(Tag::text("x"), f64::NAN)),
        )
        .unwrap();

        let report = validate_transcription(&trs, &ValidateOptions::default());
        assert!(has(&report, IssueCode::NegativeTime));
        assert!(has(&report, IssueCode::ScoreNotFinite));
        assert!(!report.is_ok());
    }

    #[test]
    fn test_strict_reports_empty_labels() {
        let mut trs = valid_transcription();
        trs.tier_mut(0)
            .unwrap()
            .create_annotation(Interval::from_secs(2.0, 3.0).unwrap(), None)
            .unwrap();

        let lenient = validate_transcription(&trs, &ValidateOptions::default());
        assert!(!has(&lenient, IssueCode::EmptyLabel));

        let opts = ValidateOptions { strict: true };
        let strict = validate_transcription(&trs, &opts);
        assert!(has(&strict, IssueCode::EmptyLabel));
        let err = ensure_valid(strict, &opts).unwrap_err();
        assert!(matches!(
            err,
            PantierError::ValidationFailed {
                error_count: 0,
                warning_count: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_report_serializes_to_json() {
        let mut trs = valid_transcription();
        trs.create_tier("empty").unwrap();
        let report = validate_transcription(&trs, &ValidateOptions::default());
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"code\":\"empty_tier\""));
        assert!(json.contains("\"scope\":\"tier\""));
    }
}
