//! Intermediate Representation (IR) for pantier.
//!
//! This module defines the format-agnostic model of time-aligned
//! annotations that every format conversion passes through: localizations
//! (points with an optional radius of vagueness, intervals and disjoint
//! sets of intervals), typed tags grouped into scored labels, annotations
//! ordered in tiers, and transcriptions holding tiers together with their
//! media, controlled vocabularies and hierarchy.
//!
//! # Design Principles
//!
//! 1. **Validated Construction**: points, intervals, tags and locations are
//!    checked when built, so a tier never holds an ill-formed value.
//!
//! 2. **Tier-owned Mutation**: annotations are changed only through their
//!    tier, which re-checks its invariants (single localization kind,
//!    controlled vocabulary, time order) and leaves itself unchanged on
//!    error.
//!
//! 3. **Superset Model**: the model can express everything any supported
//!    format can; each `io_*` module documents how it degrades what its
//!    format cannot express.
//!
//! # Example
//!
//! ```
//! use pantier::ir::{Interval, Label, Tier, Transcription};
//!
//! let mut trs = Transcription::new("demo");
//! let tier = trs.create_tier("words")?;
//! tier.create_annotation(Interval::from_secs(0.0, 0.5)?, Some(Label::new("hello")))?;
//! assert_eq!(trs.tiers()[0].len(), 1);
//! # Ok::<(), pantier::PantierError>(())
//! ```

mod annotation;
mod hierarchy;
mod ids;
mod interval;
mod label;
mod location;
mod media;
mod point;
mod tag;
pub mod text_label;
mod tier;
mod transcription;
mod vocabulary;

pub mod io_common;
pub mod io_csv;
pub mod io_eaf;
pub mod io_htk;
pub mod io_sclite;
pub mod io_subtitles;
pub mod io_text;
pub mod io_textgrid;
pub mod io_xra;

// Re-export core types for convenient access
pub use annotation::Annotation;
pub use hierarchy::{Hierarchy, HierarchyLink, LinkKind};
pub use ids::{AnnotationId, TierId};
pub use interval::{Disjoint, Duration, Interval};
pub use label::Label;
pub use location::{Localization, LocalizationKind, Location};
pub use media::Media;
pub use point::Point;
pub use tag::{Tag, TagValue, ValueType};
pub use tier::Tier;
pub use transcription::Transcription;
pub use vocabulary::ControlledVocabulary;
