#![allow(dead_code)]

use pantier::ir::{
    ControlledVocabulary, Interval, Label, Location, Media, Point, Tag, TagValue, Transcription,
};
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// Words with markup characters, tabs, line breaks and non-ASCII letters.
pub fn arb_text() -> BoxedStrategy<String> {
    "[a-z]{1,8}([ \t\r\n][a-zé漢&<>\"']{1,6}){0,2}".boxed()
}

pub fn arb_tag() -> BoxedStrategy<Tag> {
    prop_oneof![
        4 => arb_text().prop_map(Tag::text),
        1 => any::<i64>().prop_map(|v| Tag::from_value(TagValue::Int(v))),
        1 => (-1.0e6f64..1.0e6).prop_map(|v| Tag::from_value(TagValue::Float(v))),
        1 => any::<bool>().prop_map(|v| Tag::from_value(TagValue::Bool(v))),
    ]
    .boxed()
}

pub fn arb_score() -> BoxedStrategy<Option<f64>> {
    proptest::option::of(0.0f64..=1.0).boxed()
}

pub fn arb_label() -> BoxedStrategy<Label> {
    prop::collection::vec((arb_tag(), arb_score()), 1..=3)
        .prop_filter_map("label needs a tag", Label::from_alternatives)
        .boxed()
}

/// Scored text alternatives whose best tag is never declared first.
pub fn arb_ranked_label() -> BoxedStrategy<Label> {
    (
        "[a-z]{1,6}",
        prop::collection::vec(("[a-z]{1,6}", 0.0f64..0.5), 1..=3),
        0.5f64..=1.0,
    )
        .prop_filter_map("distinct tags", |(first, rest, best)| {
            let mut alternatives = vec![(Tag::text(first), Some(0.0))];
            let (last, others) = rest.split_last()?;
            alternatives.extend(others.iter().map(|(t, s)| (Tag::text(t), Some(*s))));
            alternatives.push((Tag::text(last.0.as_str()), Some(best)));
            let label = Label::from_alternatives(alternatives)?;
            (label.len() == rest.len() + 1).then_some(label)
        })
        .boxed()
}

pub fn arb_point() -> BoxedStrategy<Point> {
    (0.0f64..1000.0, proptest::option::of(0.0f64..0.5))
        .prop_map(|(midpoint, radius)| Point::new(midpoint, radius).expect("finite point"))
        .boxed()
}

/// Intervals built from a begin time and a strictly positive duration.
pub fn arb_interval() -> BoxedStrategy<Interval> {
    (0.0f64..1000.0, 0.01f64..20.0)
        .prop_map(|(begin, duration)| {
            Interval::from_secs(begin, begin + duration).expect("ordered interval")
        })
        .boxed()
}

pub fn arb_interval_location() -> BoxedStrategy<Location> {
    (arb_interval(), proptest::option::of((arb_interval(), arb_score())))
        .prop_map(|(primary, alternative)| {
            let mut location = Location::new(primary);
            if let Some((iv, score)) = alternative {
                location
                    .add_alternative(iv, score)
                    .expect("same localization kind");
            }
            location
        })
        .boxed()
}

pub fn arb_metadata() -> BoxedStrategy<Vec<(String, String)>> {
    prop::collection::vec(("[a-z]{1,6}", "[A-Za-z0-9_.&<é \t\r\n]{0,10}"), 0..3).boxed()
}

/// Empty, or a separator and a short word appended to a generated tier name.
pub fn arb_name_suffix() -> BoxedStrategy<String> {
    "([ \t][a-zé&]{1,3})?".boxed()
}

#[derive(Clone, Debug)]
pub struct TierShape {
    pub name_suffix: String,
    pub points: bool,
    pub annotations: Vec<(Location, Label, Vec<(String, String)>)>,
    pub metadata: Vec<(String, String)>,
}

pub fn arb_tier_shape(max_annotations: usize) -> BoxedStrategy<TierShape> {
    let point_annotations = prop::collection::vec(
        (arb_point().prop_map(Location::new), arb_label(), arb_metadata()),
        0..=max_annotations,
    );
    let interval_annotations = prop::collection::vec(
        (arb_interval_location(), arb_label(), arb_metadata()),
        0..=max_annotations,
    );
    prop_oneof![
        (point_annotations, arb_metadata(), arb_name_suffix()).prop_map(
            |(annotations, metadata, name_suffix)| TierShape {
                name_suffix,
                points: true,
                annotations,
                metadata,
            }
        ),
        (interval_annotations, arb_metadata(), arb_name_suffix()).prop_map(
            |(annotations, metadata, name_suffix)| TierShape {
                name_suffix,
                points: false,
                annotations,
                metadata,
            }
        ),
    ]
    .boxed()
}

/// Transcriptions exercising tiers of both kinds, metadata at every level,
/// a shared media, and a vocabulary strictly bound to the first tier.
pub fn arb_transcription(max_tiers: usize, max_annotations: usize) -> BoxedStrategy<Transcription> {
    (
        "[a-z]{1,10}",
        prop::collection::vec(arb_tier_shape(max_annotations), 1..=max_tiers),
        arb_metadata(),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(name, shapes, metadata, with_media, with_vocab)| {
            build_transcription(&name, &shapes, &metadata, with_media, with_vocab)
        })
        .boxed()
}

pub fn build_transcription(
    name: &str,
    shapes: &[TierShape],
    metadata: &[(String, String)],
    with_media: bool,
    with_vocab: bool,
) -> Transcription {
    let mut trs = Transcription::new(name);
    trs.metadata.extend(metadata.iter().cloned());

    for (n, shape) in shapes.iter().enumerate() {
        let tier = trs
            .create_tier(format!("tier{n}{}", shape.name_suffix))
            .expect("unique tier names");
        tier.metadata.extend(shape.metadata.iter().cloned());
        for (location, label, meta) in &shape.annotations {
            let id = tier
                .create_annotation(location.clone(), Some(label.clone()))
                .expect("uniform tier kind");
            let slot = tier.metadata_mut(id).expect("annotation just created");
            slot.extend(meta.iter().cloned());
        }
    }

    if with_media {
        let media = trs.add_media(Media::new("recording.wav").with_id("m1"));
        for index in 0..trs.len() {
            trs.set_tier_media(index, &media.id).expect("media registered");
        }
    }

    if with_vocab {
        let mut cv = ControlledVocabulary::new("tags").with_description("used tags");
        for annotation in trs.tiers()[0].iter() {
            if let Some(label) = annotation.label() {
                for tag in label.tags() {
                    cv.add(tag.clone(), "");
                }
            }
        }
        if !cv.is_empty() {
            trs.add_ctrl_vocab(cv);
            trs.set_tier_ctrl_vocab(0, "tags").expect("labels are in the vocabulary");
        }
    }

    trs
}
