//! Conversion module for format transformation reporting.
//!
//! This module provides structured reporting for conversions between
//! annotation formats, tracking what information is preserved, lost,
//! or transformed according to each target's capabilities.

pub mod report;

pub use report::{
    ConversionCounts, ConversionIssue, ConversionIssueCode, ConversionReport, ConversionSeverity,
};

use crate::adapter::Capabilities;
use crate::ir::{Label, Localization, LocalizationKind, Point, Transcription};

/// Metadata keys stamped by the dispatcher; never counted as lost.
const PROVENANCE_PREFIX: &str = "file_";

/// Writers that skip annotations without label text.
const SKIPS_EMPTY_LABELS: &[&str] = &["subrip", "webvtt", "subviewer", "htk"];

/// Build a conversion report analyzing what will happen during conversion.
///
/// This function examines the transcription and the target's capabilities
/// to determine:
/// - Input/output counts
/// - What the target writer will refuse (errors)
/// - What information will be lost (warnings)
/// - What policy decisions apply (info notes)
pub fn build_conversion_report(
    trs: &Transcription,
    from: &str,
    to: &str,
    target: &Capabilities,
) -> ConversionReport {
    let mut report = ConversionReport::new(from, to);

    let annotations = trs.tiers().iter().map(|t| t.len()).sum();
    report.input = ConversionCounts {
        tiers: trs.len(),
        annotations,
    };
    report.output = report.input.clone();

    analyze_structure(trs, target, &mut report);
    analyze_side_data(trs, target, &mut report);
    analyze_localizations(trs, target, &mut report);
    analyze_labels(trs, target, &mut report);

    if SKIPS_EMPTY_LABELS.contains(&to) {
        add_empty_label_policy(trs, &mut report);
    }

    report
}

/// Tier count and per-tier shape checks the target writer enforces.
fn analyze_structure(trs: &Transcription, target: &Capabilities, report: &mut ConversionReport) {
    if !target.multi_tier && trs.len() > 1 {
        report.add(ConversionIssue::error(
            ConversionIssueCode::TooManyTiers,
            format!("{} tiers, but the target holds a single tier", trs.len()),
        ));
    }

    if !target.no_tiers_ok && trs.is_empty() {
        report.add(ConversionIssue::error(
            ConversionIssueCode::NoTiers,
            "the target cannot write a transcription without tiers",
        ));
    }

    for tier in trs.tiers() {
        if !target.disjoint && tier.is_disjoint() {
            report.add(ConversionIssue::error(
                ConversionIssueCode::DisjointLocalizations,
                format!("tier '{}' has disjoint localizations", tier.name()),
            ));
        }

        if !target.overlaps && tier.has_overlaps() {
            report.add(ConversionIssue::error(
                ConversionIssueCode::OverlappingAnnotations,
                format!("tier '{}' has overlapping annotations", tier.name()),
            ));
        }

        if !target.gaps && !tier.is_point() && tier.has_gaps() {
            report.add(ConversionIssue::info(
                ConversionIssueCode::FillGaps,
                format!(
                    "gaps in tier '{}' will be filled with empty intervals",
                    tier.name()
                ),
            ));
        }
    }
}

/// Metadata, vocabularies, media and hierarchy.
fn analyze_side_data(trs: &Transcription, target: &Capabilities, report: &mut ConversionReport) {
    if !target.metadata {
        let document = trs
            .metadata
            .keys()
            .filter(|k| !k.starts_with(PROVENANCE_PREFIX))
            .count();
        let tiers = trs.tiers().iter().filter(|t| !t.metadata.is_empty()).count();
        let annotations = trs
            .tiers()
            .iter()
            .flat_map(|t| t.iter())
            .filter(|a| !a.metadata.is_empty())
            .count();
        if document > 0 {
            report.add(ConversionIssue::warning(
                ConversionIssueCode::DropMetadata,
                format!("{document} transcription metadata key(s) will be dropped"),
            ));
        }
        if tiers > 0 {
            report.add(ConversionIssue::warning(
                ConversionIssueCode::DropMetadata,
                format!("{tiers} tier(s) have metadata that will be dropped"),
            ));
        }
        if annotations > 0 {
            report.add(ConversionIssue::warning(
                ConversionIssueCode::DropMetadata,
                format!("{annotations} annotation(s) have metadata that will be dropped"),
            ));
        }
    }

    if !target.ctrl_vocab && !trs.ctrl_vocabs().is_empty() {
        report.add(ConversionIssue::warning(
            ConversionIssueCode::DropCtrlVocab,
            format!(
                "{} controlled vocabular(ies) will be dropped",
                trs.ctrl_vocabs().len()
            ),
        ));
    }

    if !target.media && !trs.media().is_empty() {
        report.add(ConversionIssue::warning(
            ConversionIssueCode::DropMedia,
            format!("{} media reference(s) will be dropped", trs.media().len()),
        ));
    }

    let links = trs.hierarchy().links().len();
    if !target.hierarchy && links > 0 {
        report.add(ConversionIssue::warning(
            ConversionIssueCode::DropHierarchy,
            format!("{links} hierarchy link(s) will be dropped"),
        ));
    }
}

fn analyze_localizations(
    trs: &Transcription,
    target: &Capabilities,
    report: &mut ConversionReport,
) {
    for tier in trs.tiers() {
        if !target.point && tier.kind() == Some(LocalizationKind::Point) && !tier.is_empty() {
            report.add(ConversionIssue::warning(
                ConversionIssueCode::CoercePoints,
                format!(
                    "{} point(s) in tier '{}' will be widened to intervals",
                    tier.len(),
                    tier.name()
                ),
            ));
        }
    }

    let annotations = || trs.tiers().iter().flat_map(|t| t.iter());

    if !target.alt_localization {
        let count = annotations().filter(|a| a.location().len() > 1).count();
        if count > 0 {
            report.add(ConversionIssue::warning(
                ConversionIssueCode::DropAltLocalizations,
                format!(
                    "{count} annotation(s) have alternative localizations; only the best is kept"
                ),
            ));
        }
    }

    if !target.radius {
        let count = annotations()
            .filter(|a| {
                a.location()
                    .alternatives()
                    .iter()
                    .any(|(loc, _)| has_radius(loc))
            })
            .count();
        if count > 0 {
            report.add(ConversionIssue::warning(
                ConversionIssueCode::DropRadius,
                format!("{count} annotation(s) have point radii that will be dropped"),
            ));
        }
    }
}

fn analyze_labels(trs: &Transcription, target: &Capabilities, report: &mut ConversionReport) {
    if target.alt_tag {
        return;
    }
    let alternatives: Vec<&Label> = trs
        .tiers()
        .iter()
        .flat_map(|t| t.iter())
        .filter_map(|a| a.label())
        .filter(|l| l.has_alternatives())
        .collect();
    if alternatives.is_empty() {
        return;
    }
    report.add(ConversionIssue::info(
        ConversionIssueCode::EncodeAltTags,
        format!(
            "{} label(s) with alternatives will be written as {{a|b}} text, best tag first",
            alternatives.len()
        ),
    ));

    let scored = alternatives
        .iter()
        .filter(|l| l.alternatives().iter().any(|(_, score)| score.is_some()))
        .count();
    if scored > 0 {
        report.add(ConversionIssue::warning(
            ConversionIssueCode::DropTagScores,
            format!("{scored} label(s) will lose the scores of their alternative tags"),
        ));
    }
}

/// Add policy notes for writers that skip unlabeled annotations.
fn add_empty_label_policy(trs: &Transcription, report: &mut ConversionReport) {
    let empty = trs
        .tiers()
        .iter()
        .flat_map(|t| t.iter())
        .filter(|a| a.label().map_or(true, |l| l.is_blank()))
        .count();
    if empty > 0 {
        report.add(ConversionIssue::warning(
            ConversionIssueCode::DropEmptyLabels,
            format!("{empty} annotation(s) without label text will not be written"),
        ));
        report.output.annotations -= empty;
    }
}

fn has_radius(localization: &Localization) -> bool {
    let radius = |p: Point| p.radius().is_some_and(|r| r > 0.0);
    match localization {
        Localization::Point(p) => radius(*p),
        Localization::Interval(i) => radius(i.begin()) || radius(i.end()),
        Localization::Disjoint(d) => d
            .intervals()
            .iter()
            .any(|i| radius(i.begin()) || radius(i.end())),
    }
}
