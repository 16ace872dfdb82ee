//! fOS Shape Simulator - GSUB/GPOS rule simulation
//!
//! This crate runs a font's substitution and positioning rules over
//! symbolic glyph-name tokens:
//! - Rule & lookup model (features, lookups, flags, coverages)
//! - Glyph filtering by class, mark attachment class and filter set
//! - Substitution engine with recursive contextual dispatch
//! - Positioning engine (single adjustment, mark attachment, context)
//! - Simulator producing final tokens, offsets and a full rule trace

pub mod filter;
pub mod model;
pub mod shaping;
pub mod trace;

pub use filter::{GlyphFilter, InputPattern};
pub use model::gpos::{Anchor, MarkAttachPos, PosRule, ValueRecord};
pub use model::gsub::SubstRule;
pub use model::{
    Coverage, Feature, GlyphClass, GlyphDefs, LayoutModel, Lookup, LookupFlags, PosLookup,
    Referrer, Stage, SubstLookup, Tag,
};
pub use shaping::{
    AdvanceSource, GlyphPosition, Limit, Limits, PositionedGlyph, PositioningEngine, ShapedGlyph,
    ShapedRun, SimulationOutput, Simulator, SimulatorConfig, SubstitutionEngine,
};
pub use trace::{Trace, TraceEntry};

/// Simulation error types
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("{stage} lookup {lookup} referenced by {referrer} does not exist")]
    MissingLookup {
        stage: Stage,
        lookup: usize,
        referrer: Referrer,
    },

    #[error("{stage} lookup {lookup} uses undefined filter set {set}")]
    MissingFilterSet { stage: Stage, lookup: usize, set: u16 },

    #[error("Malformed rule {rule} in {stage} lookup {lookup}: {reason}")]
    MalformedRule {
        stage: Stage,
        lookup: usize,
        rule: usize,
        reason: String,
    },

    #[error(
        "Non-terminating rewrite in feature '{feature}', {stage} lookup {lookup} at position {position}: {limit} exceeded"
    )]
    NonTerminating {
        feature: Tag,
        stage: Stage,
        lookup: usize,
        position: usize,
        limit: Limit,
        trace: Box<Trace>,
    },

    #[error("Invalid feature tag: {0:?}")]
    InvalidTag(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
