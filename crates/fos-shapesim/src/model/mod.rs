//! Rule & lookup model
//!
//! Immutable description of a font's layout rules: glyph definitions
//! (classes, mark attachment classes, filter sets), substitution and
//! positioning lookups, and the features that activate them.
//!
//! The model is built once by whoever assembles the font and is only read
//! by the engines, so one model can back any number of simulators.

pub mod gpos;
pub mod gsub;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Result, SimError};
use gpos::PosRule;
use gsub::SubstRule;

/// OpenType feature tag
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tag([u8; 4]);

impl Tag {
    pub const ABVS: Tag = Tag(*b"abvs");
    pub const BLWS: Tag = Tag(*b"blws");
    pub const CCMP: Tag = Tag(*b"ccmp");
    pub const LIGA: Tag = Tag(*b"liga");
    pub const RLIG: Tag = Tag(*b"rlig");
    pub const MARK: Tag = Tag(*b"mark");
    pub const MKMK: Tag = Tag(*b"mkmk");
    pub const SS01: Tag = Tag(*b"ss01");
    pub const RTLM: Tag = Tag(*b"rtlm");

    /// Create a tag from four ASCII bytes
    pub const fn new(bytes: &[u8; 4]) -> Self {
        Tag(*bytes)
    }

    /// Raw tag bytes
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl FromStr for Tag {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| SimError::InvalidTag(s.to_string()))?;
        if !bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            return Err(SimError::InvalidTag(s.to_string()));
        }
        Ok(Tag(bytes))
    }
}

impl TryFrom<String> for Tag {
    type Error = SimError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.to_string()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({self})")
    }
}

/// Which rule table a lookup belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "GSUB")]
    Substitution,
    #[serde(rename = "GPOS")]
    Positioning,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Substitution => f.write_str("GSUB"),
            Stage::Positioning => f.write_str("GPOS"),
        }
    }
}

/// The feature or lookup holding a lookup reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Referrer {
    Feature(Tag),
    Lookup(usize),
}

impl fmt::Display for Referrer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Referrer::Feature(tag) => write!(f, "feature '{tag}'"),
            Referrer::Lookup(index) => write!(f, "lookup {index}"),
        }
    }
}

/// Glyph class (GDEF glyph class definition)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlyphClass {
    #[default]
    Base,
    Ligature,
    Mark,
    Component,
}

/// Per-glyph classification shared by every lookup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlyphDefs {
    #[serde(default)]
    classes: BTreeMap<String, GlyphClass>,
    #[serde(default)]
    mark_attach_classes: BTreeMap<String, u8>,
    #[serde(default)]
    filter_sets: Vec<BTreeSet<String>>,
}

impl GlyphDefs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_class(&mut self, glyph: impl Into<String>, class: GlyphClass) {
        self.classes.insert(glyph.into(), class);
    }

    /// Class of a glyph; unclassified glyphs are bases
    pub fn class(&self, glyph: &str) -> GlyphClass {
        self.classes.get(glyph).copied().unwrap_or_default()
    }

    pub fn set_mark_attach_class(&mut self, glyph: impl Into<String>, class: u8) {
        self.mark_attach_classes.insert(glyph.into(), class);
    }

    /// Mark attachment class of a glyph (0 when unassigned)
    pub fn mark_attach_class(&self, glyph: &str) -> u8 {
        self.mark_attach_classes.get(glyph).copied().unwrap_or(0)
    }

    /// Register a filter set and return its index
    pub fn add_filter_set<I, S>(&mut self, glyphs: I) -> u16
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter_sets.push(glyphs.into_iter().map(Into::into).collect());
        (self.filter_sets.len() - 1) as u16
    }

    pub fn filter_set(&self, index: u16) -> Option<&BTreeSet<String>> {
        self.filter_sets.get(index as usize)
    }

    pub fn filter_set_count(&self) -> usize {
        self.filter_sets.len()
    }

    /// Whether a glyph belongs to a filter set (false for unknown sets)
    pub fn in_filter_set(&self, index: u16, glyph: &str) -> bool {
        self.filter_set(index).is_some_and(|set| set.contains(glyph))
    }
}

/// Ordered set of acceptable glyph names at one context position
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coverage {
    glyphs: Vec<String>,
}

impl Coverage {
    /// Build a coverage, dropping duplicates but keeping first-seen order
    pub fn new<I, S>(glyphs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for glyph in glyphs {
            let glyph = glyph.into();
            if !out.contains(&glyph) {
                out.push(glyph);
            }
        }
        Self { glyphs: out }
    }

    pub fn single(glyph: impl Into<String>) -> Self {
        Self { glyphs: vec![glyph.into()] }
    }

    /// Build a coverage sequence, one coverage per position
    pub fn seq(positions: &[&[&str]]) -> Vec<Coverage> {
        positions.iter().map(|glyphs| Coverage::new(glyphs.iter().copied())).collect()
    }

    /// Coverage index of a glyph
    pub fn get(&self, glyph: &str) -> Option<usize> {
        self.glyphs.iter().position(|g| g == glyph)
    }

    pub fn contains(&self, glyph: &str) -> bool {
        self.get(glyph).is_some()
    }

    pub fn glyphs(&self) -> &[String] {
        &self.glyphs
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Coverage {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Coverage::new(iter)
    }
}

impl fmt::Display for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.glyphs.join("/"))
    }
}

/// Write a coverage sequence as `[a/b c]`
pub(crate) fn fmt_coverages(f: &mut fmt::Formatter<'_>, coverages: &[Coverage]) -> fmt::Result {
    f.write_str("[")?;
    for (i, coverage) in coverages.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{coverage}")?;
    }
    f.write_str("]")
}

/// Lookup flags controlling glyph visibility and scan direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupFlags {
    /// Scan right-to-left
    pub reverse: bool,
    pub ignore_base_glyphs: bool,
    pub ignore_ligatures: bool,
    pub ignore_marks: bool,
    /// Only marks of this attachment class are visible (0 = all marks)
    pub mark_attachment_class: u8,
    /// Only glyphs of this filter set are visible
    pub mark_filtering_set: Option<u16>,
}

impl LookupFlags {
    pub const REVERSE: u16 = 0x0001;
    pub const IGNORE_BASE_GLYPHS: u16 = 0x0002;
    pub const IGNORE_LIGATURES: u16 = 0x0004;
    pub const IGNORE_MARKS: u16 = 0x0008;
    pub const USE_MARK_FILTERING_SET: u16 = 0x0010;
    pub const MARK_ATTACHMENT_TYPE_MASK: u16 = 0xFF00;

    /// Encode as a lookup flag word
    pub fn to_bits(&self) -> u16 {
        let mut bits = 0;
        if self.reverse {
            bits |= Self::REVERSE;
        }
        if self.ignore_base_glyphs {
            bits |= Self::IGNORE_BASE_GLYPHS;
        }
        if self.ignore_ligatures {
            bits |= Self::IGNORE_LIGATURES;
        }
        if self.ignore_marks {
            bits |= Self::IGNORE_MARKS;
        }
        if self.mark_filtering_set.is_some() {
            bits |= Self::USE_MARK_FILTERING_SET;
        }
        bits | (u16::from(self.mark_attachment_class) << 8)
    }

    /// Decode a lookup flag word; the filter set index is only kept when
    /// the word says a filter set is in use.
    pub fn from_bits(bits: u16, mark_filtering_set: Option<u16>) -> Self {
        Self {
            reverse: bits & Self::REVERSE != 0,
            ignore_base_glyphs: bits & Self::IGNORE_BASE_GLYPHS != 0,
            ignore_ligatures: bits & Self::IGNORE_LIGATURES != 0,
            ignore_marks: bits & Self::IGNORE_MARKS != 0,
            mark_attachment_class: ((bits & Self::MARK_ATTACHMENT_TYPE_MASK) >> 8) as u8,
            mark_filtering_set: if bits & Self::USE_MARK_FILTERING_SET != 0 {
                mark_filtering_set
            } else {
                None
            },
        }
    }
}

/// Behaviour shared by substitution and positioning rules
pub trait Rule: fmt::Display {
    /// Lookup indices this rule dispatches to
    fn lookup_references(&self) -> Vec<usize>;

    /// Why the rule cannot be applied, if its shape is broken
    fn shape_error(&self) -> Option<String>;
}

/// Ordered rules of one table plus visibility flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lookup<R> {
    #[serde(default)]
    pub flags: LookupFlags,
    pub rules: Vec<R>,
}

/// Substitution lookup
pub type SubstLookup = Lookup<SubstRule>;
/// Positioning lookup
pub type PosLookup = Lookup<PosRule>;

impl<R> Lookup<R> {
    pub fn new() -> Self {
        Self {
            flags: LookupFlags::default(),
            rules: Vec::new(),
        }
    }

    /// Append a rule (rules are tried in declared order)
    pub fn with_rule(mut self, rule: R) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn add(&mut self, rule: R) {
        self.rules.push(rule);
    }

    pub fn with_flags(mut self, flags: LookupFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn reverse(mut self) -> Self {
        self.flags.reverse = true;
        self
    }

    pub fn ignore_base_glyphs(mut self) -> Self {
        self.flags.ignore_base_glyphs = true;
        self
    }

    pub fn ignore_ligatures(mut self) -> Self {
        self.flags.ignore_ligatures = true;
        self
    }

    pub fn ignore_marks(mut self) -> Self {
        self.flags.ignore_marks = true;
        self
    }

    pub fn mark_attachment_class(mut self, class: u8) -> Self {
        self.flags.mark_attachment_class = class;
        self
    }

    pub fn filter_set(mut self, index: u16) -> Self {
        self.flags.mark_filtering_set = Some(index);
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<R> Default for Lookup<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// A tagged group of lookups activated together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub tag: Tag,
    pub lookup_indices: Vec<usize>,
}

impl Feature {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            lookup_indices: Vec::new(),
        }
    }

    pub fn with_lookup(mut self, index: usize) -> Self {
        self.add_lookup(index);
        self
    }

    pub fn add_lookup(&mut self, index: usize) {
        if !self.lookup_indices.contains(&index) {
            self.lookup_indices.push(index);
        }
    }

    /// Lookup indices in application order (ascending)
    pub fn sorted_lookups(&self) -> Vec<usize> {
        let mut indices = self.lookup_indices.clone();
        indices.sort_unstable();
        indices
    }
}

/// Features and lookups of one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "R: Deserialize<'de>"))]
pub struct LookupTable<R> {
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub lookups: Vec<Lookup<R>>,
}

impl<R> LookupTable<R> {
    pub fn new() -> Self {
        Self {
            features: Vec::new(),
            lookups: Vec::new(),
        }
    }

    /// Append a lookup and return its global index
    pub fn add_lookup(&mut self, lookup: Lookup<R>) -> usize {
        self.lookups.push(lookup);
        self.lookups.len() - 1
    }

    /// Append a feature; features run in the order they are added
    pub fn add_feature(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn lookup(&self, index: usize) -> Option<&Lookup<R>> {
        self.lookups.get(index)
    }

    pub fn feature(&self, tag: Tag) -> Option<&Feature> {
        self.features.iter().find(|f| f.tag == tag)
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.len()
    }
}

impl<R> Default for LookupTable<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Complete rule set of a font
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutModel {
    #[serde(default)]
    pub glyphs: GlyphDefs,
    #[serde(default)]
    pub gsub: LookupTable<SubstRule>,
    #[serde(default)]
    pub gpos: LookupTable<PosRule>,
}

impl LayoutModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an already-built model from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check lookup references and rule shapes.
    ///
    /// Fails on the first feature or contextual rule that references a
    /// missing lookup, a lookup using an undefined filter set, or a rule
    /// whose shape cannot be applied.
    pub fn validate(&self) -> Result<()> {
        self.validate_table(&self.gsub, Stage::Substitution)?;
        self.validate_table(&self.gpos, Stage::Positioning)
    }

    fn validate_table<R: Rule>(&self, table: &LookupTable<R>, stage: Stage) -> Result<()> {
        let count = table.lookups.len();
        for feature in &table.features {
            if let Some(&lookup) = feature.lookup_indices.iter().find(|&&i| i >= count) {
                return Err(SimError::MissingLookup {
                    stage,
                    lookup,
                    referrer: Referrer::Feature(feature.tag),
                });
            }
        }

        for (index, lookup) in table.lookups.iter().enumerate() {
            if let Some(set) = lookup.flags.mark_filtering_set {
                if self.glyphs.filter_set(set).is_none() {
                    return Err(SimError::MissingFilterSet { stage, lookup: index, set });
                }
            }
            for (rule_index, rule) in lookup.rules.iter().enumerate() {
                if let Some(reason) = rule.shape_error() {
                    return Err(SimError::MalformedRule {
                        stage,
                        lookup: index,
                        rule: rule_index,
                        reason,
                    });
                }
                if let Some(missing) = rule.lookup_references().into_iter().find(|&i| i >= count) {
                    return Err(SimError::MissingLookup {
                        stage,
                        lookup: missing,
                        referrer: Referrer::Lookup(index),
                    });
                }
            }
        }
        Ok(())
    }

    /// Human-readable overview of features and lookups
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Classified glyphs: {}", self.glyphs.classes.len()),
            format!("Filter sets: {}", self.glyphs.filter_set_count()),
            String::new(),
            "GSUB Features:".to_string(),
        ];
        Self::summarize_table(&mut lines, &self.gsub, "GSUB");
        lines.push(String::new());
        lines.push("GPOS Features:".to_string());
        Self::summarize_table(&mut lines, &self.gpos, "GPOS");
        lines.join("\n")
    }

    fn summarize_table<R>(lines: &mut Vec<String>, table: &LookupTable<R>, name: &str) {
        for feature in &table.features {
            lines.push(format!("  {}: lookups {:?}", feature.tag, feature.lookup_indices));
        }
        lines.push(format!("{name} Lookups: {}", table.lookups.len()));
        for (index, lookup) in table.lookups.iter().enumerate() {
            lines.push(format!(
                "  Lookup {index}: flags 0x{:04X}, {} rules",
                lookup.flags.to_bits(),
                lookup.rules.len()
            ));
        }
    }
}
