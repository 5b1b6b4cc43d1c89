use pantier::ir::io_xra::{from_xra_str, to_xra_string};
use pantier::ir::{Interval, Label, Point, Transcription};
use pantier::PantierError;
use proptest::prelude::*;

mod proptest_helpers;

proptest! {
    #![proptest_config(proptest_helpers::proptest_config())]

    #[test]
    fn xra_roundtrip_is_lossless(trs in proptest_helpers::arb_transcription(4, 12)) {
        let xml = to_xra_string(&trs).expect("serialize xra");
        let restored = from_xra_str(&xml).expect("parse xra");

        prop_assert_eq!(trs, restored);
    }

    #[test]
    fn xra_roundtrip_is_idempotent(trs in proptest_helpers::arb_transcription(3, 8)) {
        let first_xml = to_xra_string(&trs).expect("serialize first pass");
        let first = from_xra_str(&first_xml).expect("parse first pass");

        let second_xml = to_xra_string(&first).expect("serialize second pass");

        prop_assert_eq!(first_xml, second_xml);
    }

    #[test]
    fn characters_outside_xml_are_a_typed_write_error(
        word in "[a-z]{0,4}",
        control in prop::sample::select(vec!['\u{0}', '\u{1}', '\u{8}', '\u{b}', '\u{c}', '\u{1f}', '\u{fffe}', '\u{ffff}']),
    ) {
        let mut trs = Transcription::new("ctl");
        trs.create_tier("words")
            .expect("fresh document")
            .create_annotation(
                Interval::from_secs(0.0, 1.0).expect("ordered"),
                Some(Label::new(format!("{word}{control}").as_str())),
            )
            .expect("interval tier");

        let err = to_xra_string(&trs).expect_err("control character");
        let is_typed = matches!(err, PantierError::InvalidXmlChar { character, .. } if character == control);
        prop_assert!(is_typed, "{:?}", err);
    }

    #[test]
    fn tiers_stay_sorted_by_start(trs in proptest_helpers::arb_transcription(3, 16)) {
        for tier in trs.tiers() {
            let starts: Vec<f64> = tier.iter().map(|a| a.lowest().midpoint()).collect();
            prop_assert!(starts.windows(2).all(|w| w[0] <= w[1]), "{:?}", starts);
        }
    }

    #[test]
    fn points_compare_within_their_radii(a in proptest_helpers::arb_point(), b in proptest_helpers::arb_point()) {
        let distance = (a.midpoint() - b.midpoint()).abs();
        let within = distance <= a.margin() + b.margin();

        prop_assert_eq!(a == b, within);
        prop_assert_eq!(b == a, within);
        prop_assert_eq!(a == Point::exact(a.midpoint()), true);
    }
}
