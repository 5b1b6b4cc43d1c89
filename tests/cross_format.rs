//! Cross-format conversion through the dispatcher.
//!
//! Every registered adapter either writes a transcription (degrading what
//! its format cannot hold, as documented) or fails with a typed error and
//! leaves no file behind. Label content is never dropped silently.

use std::path::{Path, PathBuf};

use pantier::ir::{Disjoint, Interval, Label, Location, Point, Tag, Transcription};
use pantier::{Dispatcher, FormatAdapter, PantierError, Registry};

fn out_path(dir: &Path, adapter: &dyn FormatAdapter) -> PathBuf {
    dir.join(format!("{}.{}", adapter.name(), adapter.extensions()[0]))
}

fn labels(trs: &Transcription) -> Vec<String> {
    let mut texts: Vec<String> = trs
        .tiers()
        .iter()
        .flat_map(|t| t.iter().map(|a| a.best_text()))
        .filter(|t| !t.is_empty())
        .collect();
    texts.sort();
    texts
}

fn single_tier(points: bool) -> Transcription {
    let mut trs = Transcription::new("single");
    let tier = trs.create_tier("words").unwrap();
    for (n, text) in ["alpha", "beta", "gamma"].into_iter().enumerate() {
        let t = n as f64 + 0.5;
        let location = if points {
            Location::from(Point::exact(t))
        } else {
            Location::from(Interval::from_secs(t, t + 0.5).unwrap())
        };
        tier.create_annotation(location, Some(Label::new(text)))
            .unwrap();
    }
    trs
}

#[test]
fn disjoint_tiers_are_rejected_by_every_adapter_but_xra() {
    let dispatcher = Dispatcher::default();
    let dir = tempfile::tempdir().unwrap();

    let mut trs = Transcription::new("disjoint");
    let tier = trs.create_tier("words").unwrap();
    let disjoint = Disjoint::new(vec![
        Interval::from_secs(0.0, 1.0).unwrap(),
        Interval::from_secs(2.0, 3.0).unwrap(),
    ])
    .unwrap();
    tier.create_annotation(Location::new(disjoint), Some(Label::new("split")))
        .unwrap();

    for adapter in dispatcher.registry().adapters() {
        let path = out_path(dir.path(), adapter);
        let result = dispatcher.write(&mut trs, &path);
        if adapter.capabilities().disjoint {
            result.unwrap_or_else(|e| panic!("{} failed: {e}", adapter.name()));
            let back = dispatcher.read(&path, false).unwrap();
            assert!(back.tiers()[0].is_disjoint());
        } else {
            let err = result.unwrap_err();
            assert!(
                matches!(err, PantierError::DisjointUnsupported { .. }),
                "{}: {err}",
                adapter.name()
            );
            assert!(!path.exists(), "{} left a file behind", adapter.name());
        }
    }
}

#[test]
fn multi_tier_documents_need_multi_tier_formats() {
    let dispatcher = Dispatcher::default();
    let dir = tempfile::tempdir().unwrap();

    let mut trs = single_tier(false);
    let tier = trs.create_tier("gloss").unwrap();
    tier.create_annotation(Interval::from_secs(0.5, 1.0).unwrap(), Some(Label::new("delta")))
        .unwrap();

    for adapter in dispatcher.registry().adapters() {
        let path = out_path(dir.path(), adapter);
        let result = dispatcher.write(&mut trs, &path);
        if adapter.capabilities().multi_tier {
            result.unwrap_or_else(|e| panic!("{} failed: {e}", adapter.name()));
            let back = dispatcher.read(&path, false).unwrap();
            assert_eq!(back.len(), 2, "{}", adapter.name());
            assert_eq!(labels(&back), labels(&trs), "{}", adapter.name());
        } else {
            let err = result.unwrap_err();
            assert!(
                matches!(err, PantierError::CapabilityMismatch { .. }),
                "{}: {err}",
                adapter.name()
            );
            assert!(!path.exists());
        }
    }
}

#[test]
fn point_tiers_are_coerced_without_losing_labels() {
    let dispatcher = Dispatcher::default();
    let dir = tempfile::tempdir().unwrap();
    let mut trs = single_tier(true);

    for adapter in dispatcher.registry().adapters() {
        let path = out_path(dir.path(), adapter);
        dispatcher
            .write(&mut trs, &path)
            .unwrap_or_else(|e| panic!("{} failed: {e}", adapter.name()));
        let back = dispatcher.read(&path, false).unwrap();
        assert_eq!(labels(&back), labels(&trs), "{}", adapter.name());
        if !adapter.capabilities().point {
            assert!(back.tiers()[0].is_interval(), "{}", adapter.name());
        }
    }
}

#[test]
fn overlapping_annotations_need_overlap_support() {
    let dispatcher = Dispatcher::default();
    let dir = tempfile::tempdir().unwrap();

    let mut trs = single_tier(false);
    let tier = trs.tier_mut(0).unwrap();
    tier.create_annotation(Interval::from_secs(0.6, 1.2).unwrap(), Some(Label::new("delta")))
        .unwrap();
    assert!(trs.tiers()[0].has_overlaps());

    for adapter in dispatcher.registry().adapters() {
        let path = out_path(dir.path(), adapter);
        let result = dispatcher.write(&mut trs, &path);
        if adapter.capabilities().overlaps {
            result.unwrap_or_else(|e| panic!("{} failed: {e}", adapter.name()));
            let back = dispatcher.read(&path, false).unwrap();
            assert_eq!(labels(&back), labels(&trs), "{}", adapter.name());
        } else {
            let err = result.unwrap_err();
            assert!(
                matches!(err, PantierError::CapabilityMismatch { .. }),
                "{}: {err}",
                adapter.name()
            );
        }
    }
}

#[test]
fn alternative_tags_are_encoded_in_text_formats() {
    let dispatcher = Dispatcher::default();
    let dir = tempfile::tempdir().unwrap();

    let mut trs = Transcription::new("alts");
    let tier = trs.create_tier("words").unwrap();
    let label = Label::from_alternatives([
        (Tag::text("today"), Some(0.7)),
        (Tag::text("toda"), Some(0.3)),
    ])
    .unwrap();
    tier.create_annotation(Interval::from_secs(0.0, 1.0).unwrap(), Some(label))
        .unwrap();

    for ext in ["textgrid", "eaf", "srt", "csv", "txt", "stm", "ctm", "xra"] {
        let path = dir.path().join(format!("alts.{ext}"));
        dispatcher.write(&mut trs, &path).unwrap();
        let back = dispatcher.read(&path, false).unwrap();
        let label = back.tiers()[0].annotations()[0].label().unwrap();
        let tags: Vec<String> = label.tags().map(Tag::content).collect();
        assert_eq!(tags, ["today", "toda"], "{ext}");
    }
}

#[test]
fn best_alternative_survives_text_formats_when_declared_last() {
    let dispatcher = Dispatcher::default();
    let dir = tempfile::tempdir().unwrap();

    let mut trs = Transcription::new("ranked");
    let tier = trs.create_tier("words").unwrap();
    let label = Label::from_alternatives([
        (Tag::text("a"), Some(0.2)),
        (Tag::text("b"), Some(0.8)),
    ])
    .unwrap();
    assert_eq!(label.best().content(), "b");
    tier.create_annotation(Interval::from_secs(0.0, 1.0).unwrap(), Some(label))
        .unwrap();

    for ext in ["textgrid", "eaf", "srt", "csv", "txt", "stm", "ctm", "xra"] {
        let path = dir.path().join(format!("ranked.{ext}"));
        dispatcher.write(&mut trs, &path).unwrap();
        let back = dispatcher.read(&path, false).unwrap();
        let label = back.tiers()[0].annotations()[0].label().unwrap();
        assert_eq!(label.best().content(), "b", "{ext}");
        assert_eq!(label.len(), 2, "{ext}");
    }
}

#[test]
fn textgrid_fills_gaps_with_empty_intervals() {
    let dispatcher = Dispatcher::default();
    let dir = tempfile::tempdir().unwrap();

    let mut trs = Transcription::new("gaps");
    let tier = trs.create_tier("words").unwrap();
    for (b, e, t) in [(0.0, 1.0, "a"), (2.0, 3.0, "b")] {
        tier.create_annotation(Interval::from_secs(b, e).unwrap(), Some(Label::new(t)))
            .unwrap();
    }

    let path = dir.path().join("gaps.TextGrid");
    dispatcher.write(&mut trs, &path).unwrap();
    let back = dispatcher.read(&path, false).unwrap();
    let words = &back.tiers()[0];
    assert_eq!(words.len(), 3);
    assert!(words.annotations()[1].label().unwrap().is_blank());
    assert!(!words.has_gaps());
    assert_eq!(labels(&back), ["a", "b"]);
}

#[test]
fn fixtures_read_through_the_dispatcher() {
    let dispatcher = Dispatcher::default();

    let grid = dispatcher
        .read(Path::new("tests/fixtures/sample.TextGrid"), false)
        .unwrap();
    assert_eq!(grid.metadata["file_reader"], "textgrid");
    assert_eq!(grid.metadata["file_name"], "sample.TextGrid");
    assert_eq!(grid.len(), 2);
    let words = grid.find("words", true).unwrap();
    assert_eq!(words.annotations()[2].best_text(), "she said \"hi\"");
    assert!(grid.find("tones", true).unwrap().is_point());

    let subtitles = dispatcher
        .read(Path::new("tests/fixtures/sample.srt"), false)
        .unwrap();
    assert_eq!(subtitles.metadata["file_reader"], "subrip");
    let cues = subtitles.find("Trans", true).unwrap();
    assert_eq!(cues.len(), 3);
    assert_eq!(cues.annotations()[1].best_text(), "and welcome\nto the news");
    assert!(cues.annotations()[2].label().unwrap().has_alternatives());
}

#[test]
fn heuristic_detection_reads_misnamed_files() {
    let dispatcher = Dispatcher::default();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("words.transcript");
    std::fs::copy("tests/fixtures/sample.eaf", &path).unwrap();

    let err = dispatcher.read(&path, false).unwrap_err();
    assert!(matches!(err, PantierError::UnsupportedExtension { .. }));

    let trs = dispatcher.read(&path, true).unwrap();
    assert_eq!(trs.metadata["file_reader"], "eaf");
    assert_eq!(trs.len(), 3);
}

#[test]
fn custom_registries_limit_the_formats() {
    let mut registry = Registry::new();
    registry.register(Box::new(pantier::adapter::CsvAdapter));
    let dispatcher = Dispatcher::new(registry);

    let dir = tempfile::tempdir().unwrap();
    let mut trs = single_tier(false);
    dispatcher.write(&mut trs, &dir.path().join("ok.csv")).unwrap();
    let err = dispatcher
        .write(&mut trs, &dir.path().join("nope.eaf"))
        .unwrap_err();
    assert!(matches!(err, PantierError::UnsupportedExtension { .. }));
}
