use serde::Serialize;

/// Features a format can express, consulted by generic tooling such as the
/// conversion report. Adapters apply their own rules on write regardless.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// More than one tier per file.
    pub multi_tier: bool,
    /// A file without any tier.
    pub no_tiers_ok: bool,
    /// Transcription and tier metadata.
    pub metadata: bool,
    /// Controlled vocabularies.
    pub ctrl_vocab: bool,
    /// Media references.
    pub media: bool,
    /// Links between tiers.
    pub hierarchy: bool,
    /// Point localizations.
    pub point: bool,
    /// Interval localizations.
    pub interval: bool,
    /// Disjoint localizations.
    pub disjoint: bool,
    /// Several scored localizations per annotation.
    pub alt_localization: bool,
    /// Several scored tags per label.
    pub alt_tag: bool,
    /// Vagueness radius of points.
    pub radius: bool,
    /// Holes between consecutive intervals.
    pub gaps: bool,
    /// Overlapping annotations in one tier.
    pub overlaps: bool,
}

impl Capabilities {
    /// Every feature; only the native format has them all.
    pub const fn all() -> Self {
        Self {
            multi_tier: true,
            no_tiers_ok: true,
            metadata: true,
            ctrl_vocab: true,
            media: true,
            hierarchy: true,
            point: true,
            interval: true,
            disjoint: true,
            alt_localization: true,
            alt_tag: true,
            radius: true,
            gaps: true,
            overlaps: true,
        }
    }

    /// Flags as (name, value) pairs, in declaration order.
    pub fn flags(&self) -> [(&'static str, bool); 14] {
        [
            ("multi_tier", self.multi_tier),
            ("no_tiers_ok", self.no_tiers_ok),
            ("metadata", self.metadata),
            ("ctrl_vocab", self.ctrl_vocab),
            ("media", self.media),
            ("hierarchy", self.hierarchy),
            ("point", self.point),
            ("interval", self.interval),
            ("disjoint", self.disjoint),
            ("alt_localization", self.alt_localization),
            ("alt_tag", self.alt_tag),
            ("radius", self.radius),
            ("gaps", self.gaps),
            ("overlaps", self.overlaps),
        ]
    }
}
