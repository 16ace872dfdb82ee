//! Positioning rules
//!
//! Single adjustment, mark attachment (mark-to-base and mark-to-mark)
//! and chained context positioning.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Coverage, Rule, fmt_coverages};

/// A positioning rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PosRule {
    /// Type 1: single adjustment
    Single(SinglePos),
    /// Type 4: mark-to-base attachment
    MarkToBase(MarkAttachPos),
    /// Type 6: mark-to-mark attachment
    MarkToMark(MarkAttachPos),
    /// Type 8: chained contextual positioning
    ChainContext(ChainContextPos),
}

/// Value record for positioning adjustments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueRecord {
    /// Horizontal adjustment for placement
    pub x_placement: i16,
    /// Vertical adjustment for placement
    pub y_placement: i16,
    /// Horizontal adjustment for advance
    pub x_advance: i16,
    /// Vertical adjustment for advance
    pub y_advance: i16,
}

impl ValueRecord {
    /// Placement-only adjustment
    pub fn placement(x: i16, y: i16) -> Self {
        Self {
            x_placement: x,
            y_placement: y,
            ..Default::default()
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Anchor point for mark attachment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub x: i16,
    pub y: i16,
}

impl Anchor {
    pub fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinglePos {
    pub coverage: Coverage,
    /// Values aligned with `coverage`; a single value serves every covered glyph.
    pub values: Vec<ValueRecord>,
}

impl SinglePos {
    pub fn value_for(&self, glyph: &str) -> Option<ValueRecord> {
        let index = self.coverage.get(glyph)?;
        if self.values.len() == 1 {
            return self.values.first().copied();
        }
        self.values.get(index).copied()
    }
}

/// Mark glyph with its attachment class and anchor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkRecord {
    pub glyph: String,
    pub class: usize,
    pub anchor: Anchor,
}

/// Base (or preceding mark) glyph with one optional anchor per mark class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseRecord {
    pub glyph: String,
    pub anchors: Vec<Option<Anchor>>,
}

impl BaseRecord {
    pub fn anchor(&self, class: usize) -> Option<Anchor> {
        self.anchors.get(class).copied().flatten()
    }
}

/// Mark attachment subtable; shared by mark-to-base and mark-to-mark,
/// where `bases` holds the attaching marks in the latter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkAttachPos {
    pub marks: Vec<MarkRecord>,
    pub bases: Vec<BaseRecord>,
}

impl MarkAttachPos {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mark(mut self, glyph: impl Into<String>, class: usize, anchor: Anchor) -> Self {
        self.marks.push(MarkRecord {
            glyph: glyph.into(),
            class,
            anchor,
        });
        self
    }

    pub fn with_base(mut self, glyph: impl Into<String>, anchors: Vec<Option<Anchor>>) -> Self {
        self.bases.push(BaseRecord {
            glyph: glyph.into(),
            anchors,
        });
        self
    }

    pub fn mark(&self, glyph: &str) -> Option<&MarkRecord> {
        self.marks.iter().find(|m| m.glyph == glyph)
    }

    pub fn base(&self, glyph: &str) -> Option<&BaseRecord> {
        self.bases.iter().find(|b| b.glyph == glyph)
    }

    fn class_count(&self) -> usize {
        self.marks.iter().map(|m| m.class + 1).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainContextPos {
    #[serde(default)]
    pub backtrack: Vec<Coverage>,
    pub input: Vec<Coverage>,
    #[serde(default)]
    pub lookahead: Vec<Coverage>,
    /// Positioning lookup run at the first input position
    #[serde(default)]
    pub lookup_index: Option<usize>,
}

impl PosRule {
    pub fn single(coverage: Coverage, value: ValueRecord) -> Self {
        PosRule::Single(SinglePos {
            coverage,
            values: vec![value],
        })
    }

    pub fn chain(
        backtrack: Vec<Coverage>,
        input: Vec<Coverage>,
        lookahead: Vec<Coverage>,
        lookup_index: Option<usize>,
    ) -> Self {
        PosRule::ChainContext(ChainContextPos {
            backtrack,
            input,
            lookahead,
            lookup_index,
        })
    }
}

impl Rule for PosRule {
    fn lookup_references(&self) -> Vec<usize> {
        match self {
            PosRule::ChainContext(chain) => chain.lookup_index.into_iter().collect(),
            _ => Vec::new(),
        }
    }

    fn shape_error(&self) -> Option<String> {
        match self {
            PosRule::Single(s) if s.values.is_empty() => {
                Some("single adjustment has no value records".to_string())
            }
            PosRule::Single(s) if s.values.len() != 1 && s.values.len() != s.coverage.len() => {
                Some(format!(
                    "single adjustment has {} values for {} covered glyphs",
                    s.values.len(),
                    s.coverage.len()
                ))
            }
            PosRule::Single(_) => None,
            PosRule::MarkToBase(m) | PosRule::MarkToMark(m) => {
                let classes = m.class_count();
                m.bases
                    .iter()
                    .find(|b| b.anchors.len() < classes)
                    .map(|b| {
                        format!(
                            "{} has {} anchors for {} mark classes",
                            b.glyph,
                            b.anchors.len(),
                            classes
                        )
                    })
            }
            PosRule::ChainContext(c) if c.input.is_empty() => {
                Some("chained context rule has an empty input sequence".to_string())
            }
            PosRule::ChainContext(_) => None,
        }
    }
}

impl fmt::Display for PosRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PosRule::Single(s) => write!(f, "adjust {}", s.coverage),
            PosRule::MarkToBase(m) | PosRule::MarkToMark(m) => {
                let kind = if matches!(self, PosRule::MarkToBase(_)) {
                    "mark-to-base"
                } else {
                    "mark-to-mark"
                };
                let marks: Vec<&str> = m.marks.iter().map(|r| r.glyph.as_str()).collect();
                let bases: Vec<&str> = m.bases.iter().map(|r| r.glyph.as_str()).collect();
                write!(f, "{kind} {} on {}", marks.join("/"), bases.join("/"))
            }
            PosRule::ChainContext(c) => {
                fmt_coverages(f, &c.backtrack)?;
                f.write_str(" | ")?;
                fmt_coverages(f, &c.input)?;
                f.write_str(" | ")?;
                fmt_coverages(f, &c.lookahead)?;
                match c.lookup_index {
                    Some(index) => write!(f, " => L{index}"),
                    None => f.write_str(" => (none)"),
                }
            }
        }
    }
}
