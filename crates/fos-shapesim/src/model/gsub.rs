//! Substitution rules
//!
//! One concrete shape per GSUB lookup kind the simulator understands:
//! single, multiple, ligature, chained context and reverse chaining
//! single substitution.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Coverage, Rule, fmt_coverages};

/// A substitution rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubstRule {
    /// Type 1: one glyph to one glyph
    Single(SingleSubst),
    /// Type 2: one glyph to a sequence
    Multiple(MultipleSubst),
    /// Type 4: a sequence to one glyph
    Ligature(LigatureSubst),
    /// Type 6: context-gated dispatch to other lookups
    ChainContext(ChainContextSubst),
    /// Type 8: right-to-left contextual single substitution
    ReverseChainSingle(ReverseChainSingleSubst),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleSubst {
    pub input: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipleSubst {
    pub input: String,
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LigatureSubst {
    /// Component glyphs, matched left to right over visible glyphs
    pub components: Vec<String>,
    /// Resulting ligature glyph
    pub ligature: String,
}

/// Position in the matched input span plus the lookup to run there
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupRecord {
    pub sequence_index: usize,
    pub lookup_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainContextSubst {
    #[serde(default)]
    pub backtrack: Vec<Coverage>,
    pub input: Vec<Coverage>,
    #[serde(default)]
    pub lookahead: Vec<Coverage>,
    #[serde(default)]
    pub lookup_records: Vec<LookupRecord>,
}

impl ChainContextSubst {
    /// Lookup records in application order (ascending sequence index)
    pub fn sorted_records(&self) -> Vec<LookupRecord> {
        let mut records = self.lookup_records.clone();
        records.sort_by_key(|r| r.sequence_index);
        records
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseChainSingleSubst {
    #[serde(default)]
    pub backtrack: Vec<Coverage>,
    pub coverage: Coverage,
    #[serde(default)]
    pub lookahead: Vec<Coverage>,
    /// Substitutes aligned with `coverage`; a single substitute serves
    /// every covered glyph.
    pub substitutes: Vec<String>,
}

impl ReverseChainSingleSubst {
    /// Substitute for a covered glyph
    pub fn substitute_for(&self, glyph: &str) -> Option<&str> {
        let index = self.coverage.get(glyph)?;
        if self.substitutes.len() == 1 {
            return self.substitutes.first().map(String::as_str);
        }
        self.substitutes.get(index).map(String::as_str)
    }
}

impl SubstRule {
    pub fn single(input: impl Into<String>, output: impl Into<String>) -> Self {
        SubstRule::Single(SingleSubst {
            input: input.into(),
            output: output.into(),
        })
    }

    pub fn multiple<I, S>(input: impl Into<String>, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SubstRule::Multiple(MultipleSubst {
            input: input.into(),
            outputs: outputs.into_iter().map(Into::into).collect(),
        })
    }

    pub fn ligature<I, S>(components: I, ligature: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SubstRule::Ligature(LigatureSubst {
            components: components.into_iter().map(Into::into).collect(),
            ligature: ligature.into(),
        })
    }

    /// Chained context rule; `records` are `(sequence index, lookup index)` pairs
    pub fn chain(
        backtrack: Vec<Coverage>,
        input: Vec<Coverage>,
        lookahead: Vec<Coverage>,
        records: impl IntoIterator<Item = (usize, usize)>,
    ) -> Self {
        SubstRule::ChainContext(ChainContextSubst {
            backtrack,
            input,
            lookahead,
            lookup_records: records
                .into_iter()
                .map(|(sequence_index, lookup_index)| LookupRecord {
                    sequence_index,
                    lookup_index,
                })
                .collect(),
        })
    }

    pub fn reverse<I, S>(
        backtrack: Vec<Coverage>,
        coverage: Coverage,
        lookahead: Vec<Coverage>,
        substitutes: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SubstRule::ReverseChainSingle(ReverseChainSingleSubst {
            backtrack,
            coverage,
            lookahead,
            substitutes: substitutes.into_iter().map(Into::into).collect(),
        })
    }
}

impl Rule for SubstRule {
    fn lookup_references(&self) -> Vec<usize> {
        match self {
            SubstRule::ChainContext(chain) => {
                chain.lookup_records.iter().map(|r| r.lookup_index).collect()
            }
            _ => Vec::new(),
        }
    }

    fn shape_error(&self) -> Option<String> {
        match self {
            SubstRule::Single(_) => None,
            SubstRule::Multiple(m) if m.outputs.is_empty() => {
                Some(format!("multiple substitution of {} has no outputs", m.input))
            }
            SubstRule::Multiple(_) => None,
            SubstRule::Ligature(l) if l.components.len() < 2 => Some(format!(
                "ligature {} needs at least two components, has {}",
                l.ligature,
                l.components.len()
            )),
            SubstRule::Ligature(_) => None,
            SubstRule::ChainContext(c) if c.input.is_empty() => {
                Some("chained context rule has an empty input sequence".to_string())
            }
            SubstRule::ChainContext(c) => c
                .lookup_records
                .iter()
                .find(|r| r.sequence_index >= c.input.len())
                .map(|r| {
                    format!(
                        "sequence index {} outside input of length {}",
                        r.sequence_index,
                        c.input.len()
                    )
                }),
            SubstRule::ReverseChainSingle(r) if r.substitutes.is_empty() => {
                Some("reverse substitution has no substitutes".to_string())
            }
            SubstRule::ReverseChainSingle(r)
                if r.substitutes.len() != 1 && r.substitutes.len() != r.coverage.len() =>
            {
                Some(format!(
                    "reverse substitution has {} substitutes for {} covered glyphs",
                    r.substitutes.len(),
                    r.coverage.len()
                ))
            }
            SubstRule::ReverseChainSingle(_) => None,
        }
    }
}

impl fmt::Display for SubstRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubstRule::Single(s) => write!(f, "{} -> {}", s.input, s.output),
            SubstRule::Multiple(m) => write!(f, "{} -> {}", m.input, m.outputs.join(" ")),
            SubstRule::Ligature(l) => write!(f, "{} -> {}", l.components.join(" "), l.ligature),
            SubstRule::ChainContext(c) => {
                fmt_coverages(f, &c.backtrack)?;
                f.write_str(" | ")?;
                fmt_coverages(f, &c.input)?;
                f.write_str(" | ")?;
                fmt_coverages(f, &c.lookahead)?;
                f.write_str(" =>")?;
                if c.lookup_records.is_empty() {
                    return f.write_str(" (none)");
                }
                for record in &c.lookup_records {
                    write!(f, " {}:L{}", record.sequence_index, record.lookup_index)?;
                }
                Ok(())
            }
            SubstRule::ReverseChainSingle(r) => {
                fmt_coverages(f, &r.backtrack)?;
                write!(f, " | {} | ", r.coverage)?;
                fmt_coverages(f, &r.lookahead)?;
                write!(f, " -> {}", r.substitutes.join("/"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_descriptions() {
        assert_eq!(SubstRule::single("A", "B").to_string(), "A -> B");
        assert_eq!(SubstRule::multiple("A", ["X", "Y", "Z"]).to_string(), "A -> X Y Z");
        assert_eq!(SubstRule::ligature(["A", "B"], "C").to_string(), "A B -> C");

        let chain = SubstRule::chain(
            Coverage::seq(&[&["hj"]]),
            Coverage::seq(&[&["w0", "w1"]]),
            vec![],
            [(0, 3)],
        );
        assert_eq!(chain.to_string(), "[hj] | [w0/w1] | [] => 0:L3");
    }

    #[test]
    fn test_reverse_substitute_alignment() {
        let rule = ReverseChainSingleSubst {
            backtrack: vec![],
            coverage: Coverage::new(["A", "B", "C", "D"]),
            lookahead: vec![],
            substitutes: vec!["E".into(), "F".into(), "G".into(), "H".into()],
        };
        assert_eq!(rule.substitute_for("C"), Some("G"));
        assert_eq!(rule.substitute_for("X"), None);

        let shared = ReverseChainSingleSubst {
            substitutes: vec!["E".into()],
            ..rule
        };
        assert_eq!(shared.substitute_for("D"), Some("E"));
    }

    #[test]
    fn test_shape_errors() {
        assert!(SubstRule::multiple("A", Vec::<String>::new()).shape_error().is_some());
        assert!(SubstRule::ligature(["A"], "B").shape_error().is_some());
        assert!(SubstRule::chain(vec![], vec![], vec![], []).shape_error().is_some());
        assert!(
            SubstRule::chain(vec![], Coverage::seq(&[&["A"]]), vec![], [(1, 0)])
                .shape_error()
                .is_some()
        );
        assert!(SubstRule::ligature(["A", "B"], "C").shape_error().is_none());
    }

    #[test]
    fn test_sorted_records() {
        let SubstRule::ChainContext(chain) = SubstRule::chain(
            vec![],
            Coverage::seq(&[&["A"], &["B"]]),
            vec![],
            [(1, 5), (0, 2)],
        ) else {
            unreachable!()
        };
        let order: Vec<usize> = chain.sorted_records().iter().map(|r| r.sequence_index).collect();
        assert_eq!(order, vec![0, 1]);
    }

    #[test]
    fn test_serde_tagged_shape() {
        let json = serde_json::to_value(SubstRule::single("A", "B")).unwrap();
        assert_eq!(json["kind"], "single");
        assert_eq!(json["output"], "B");
        let back: SubstRule = serde_json::from_value(json).unwrap();
        assert_eq!(back, SubstRule::single("A", "B"));
    }
}
