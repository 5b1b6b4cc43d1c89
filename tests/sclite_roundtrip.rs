//! Integration tests for the NIST sclite formats (CTM and STM).
//!
//! These tests read the fixture files, check the tier grouping by
//! `file-channel`, and verify that a write/read cycle keeps the content.

use std::path::Path;

use pantier::ir::io_sclite::{
    ctm_line, from_ctm_str, from_stm_str, read_ctm, read_stm, to_ctm_string, to_stm_string,
    write_ctm,
};
use pantier::ir::{Disjoint, Interval, Label, Location, Tag, Tier, Transcription};
use pantier::PantierError;

fn tier_sizes(trs: &Transcription) -> Vec<usize> {
    trs.tiers().iter().map(Tier::len).collect()
}

#[test]
fn ctm_fixture_groups_by_media_and_channel() {
    let trs = read_ctm(Path::new("tests/fixtures/sample.ctm")).expect("read sample.ctm");

    assert_eq!(trs.len(), 4);
    assert_eq!(tier_sizes(&trs), [7, 3, 6, 6]);
    assert_eq!(trs.tiers()[0].name(), "SHOW_1-1");
    let names: Vec<&str> = trs.tiers().iter().map(Tier::name).collect();
    assert_eq!(names, ["SHOW_1-1", "SHOW_1-2", "SHOW_2-1", "SHOW_2-2"]);

    // one media per file, shared by its channels
    assert_eq!(trs.media().len(), 2);
    assert_eq!(trs.tiers()[1].media().unwrap().url, "SHOW_1");
}

#[test]
fn ctm_fixture_keeps_scores_alternatives_and_empty_tokens() {
    let trs = read_ctm(Path::new("tests/fixtures/sample.ctm")).expect("read sample.ctm");

    let first = &trs.tiers()[0].annotations()[0];
    assert_eq!(first.best_text(), "good");
    assert_eq!(first.label().unwrap().best_score(), Some(0.96));

    let show2 = trs.find("SHOW_2-1", true).unwrap();
    let alternation = show2
        .iter()
        .find(|a| a.label().is_some_and(Label::has_alternatives))
        .expect("alternation block");
    let tags: Vec<String> = alternation.label().unwrap().tags().map(Tag::content).collect();
    assert_eq!(tags, ["speak", "sneak"]);
    assert_eq!(alternation.best_text(), "speak");

    let silence = &trs.find("SHOW_2-2", true).unwrap().annotations()[0];
    assert!(silence.label().unwrap().is_blank());
}

#[test]
fn ctm_roundtrip_preserves_tiers_and_labels() {
    let original = read_ctm(Path::new("tests/fixtures/sample.ctm")).expect("read sample.ctm");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.ctm");
    write_ctm(&path, &original).expect("write ctm");
    let restored = read_ctm(&path).expect("read back ctm");

    assert_eq!(tier_sizes(&restored), tier_sizes(&original));
    for (a, b) in original.tiers().iter().zip(restored.tiers()) {
        assert_eq!(a.name(), b.name());
        assert_eq!(a.annotations(), b.annotations());
    }
}

#[test]
fn ctm_empty_tag_is_written_as_sentinel() {
    assert_eq!(
        ctm_line("WAV", "A", 0.5, 0.22, &Tag::text(""), Some(0.96)),
        "WAV A 0.5 0.22 @ 0.96\n"
    );

    let mut trs = Transcription::new("wav");
    let tier = trs.create_tier("WAV-A").unwrap();
    tier.create_annotation(
        Interval::from_secs(0.5, 0.72).unwrap(),
        Some(Label::scored(Tag::text(""), 0.96)),
    )
    .unwrap();
    let written = to_ctm_string(&trs).unwrap();
    assert!(written.contains("WAV A 0.5 0.22 @ 0.96\n"), "{written}");

    let back = from_ctm_str(&written).unwrap();
    assert!(back.tiers()[0].annotations()[0].label().unwrap().is_blank());
}

#[test]
fn ctm_rejects_disjoint_tiers() {
    let mut trs = Transcription::new("d");
    let tier = trs.create_tier("F-1").unwrap();
    let disjoint = Disjoint::new(vec![
        Interval::from_secs(0.0, 1.0).unwrap(),
        Interval::from_secs(2.0, 3.0).unwrap(),
    ])
    .unwrap();
    tier.create_annotation(Location::new(disjoint), Some(Label::new("split")))
        .unwrap();

    let err = to_ctm_string(&trs).unwrap_err();
    assert!(matches!(err, PantierError::DisjointUnsupported { .. }));
}

#[test]
fn stm_fixture_reads_speakers_and_alternations() {
    let trs = read_stm(Path::new("tests/fixtures/sample.stm")).expect("read sample.stm");

    assert_eq!(trs.len(), 2);
    assert_eq!(tier_sizes(&trs), [2, 2]);

    let anchor = trs.find("SHOW_1-1", true).unwrap();
    assert_eq!(anchor.annotations()[0].metadata["speaker"], "anchor");
    assert_eq!(anchor.annotations()[0].metadata["stm_labels"], "<o,f0,male>");
    assert_eq!(anchor.annotations()[1].label().unwrap().len(), 2);

    let guest = trs.find("SHOW_1-2", true).unwrap();
    assert!(guest.annotations()[1].label().unwrap().is_blank());
}

#[test]
fn stm_roundtrip_preserves_content() {
    let original = read_stm(Path::new("tests/fixtures/sample.stm")).expect("read sample.stm");
    let text = to_stm_string(&original).expect("write stm");
    let restored = from_stm_str(&text).expect("read back stm");

    assert_eq!(tier_sizes(&restored), tier_sizes(&original));
    for (a, b) in original.tiers().iter().zip(restored.tiers()) {
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.label(), y.label());
            assert_eq!(x.location(), y.location());
            assert_eq!(x.metadata.get("speaker"), y.metadata.get("speaker"));
        }
    }
}
