//! `{a|b|c}` text encoding of alternative tags.
//!
//! Formats that store one plain string per annotation carry label
//! alternatives in this form so they survive a round trip.

use std::cmp::Ordering;

use super::label::Label;
use super::tag::Tag;

/// Renders a label as plain text.
///
/// No label gives the empty string, a single tag its content, and several
/// alternatives `{a|b|c}` ranked by score. Scores themselves are not
/// written, so the best tag leads and stays best after parsing back.
pub fn label_to_text(label: Option<&Label>) -> String {
    let Some(label) = label else {
        return String::new();
    };
    if !label.has_alternatives() {
        return label.best().content();
    }
    let parts: Vec<String> = ranked_tags(label).into_iter().map(Tag::content).collect();
    format!("{{{}}}", parts.join("|"))
}

/// Tags by descending score, unscored ones last, ties in declaration order.
pub(crate) fn ranked_tags(label: &Label) -> Vec<&Tag> {
    let best = label.best();
    let mut rest: Vec<&(Tag, Option<f64>)> = label
        .alternatives()
        .iter()
        .filter(|(tag, _)| !std::ptr::eq(tag, best))
        .collect();
    rest.sort_by(|(_, a), (_, b)| match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    std::iter::once(best)
        .chain(rest.into_iter().map(|(tag, _)| tag))
        .collect()
}

/// Parses text produced by [`label_to_text`].
///
/// Text that is not a brace-delimited alternation becomes a single tag, so
/// plain labels containing `|` elsewhere are kept verbatim.
pub fn text_to_label(text: &str) -> Label {
    let trimmed = text.trim();
    if let Some(inner) = trimmed
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
    {
        if inner.contains('|') {
            let alternatives = inner
                .split('|')
                .map(|part| (Tag::text(part.trim()), None))
                .collect::<Vec<_>>();
            if let Some(label) = Label::from_alternatives(alternatives) {
                return label;
            }
        }
    }
    Label::new(Tag::text(trimmed))
}
