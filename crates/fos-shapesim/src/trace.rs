//! Rule application trace
//!
//! Every rule that fires records one entry: the feature and lookup it ran
//! under, the positions it consumed, its description, and the sequence
//! right after the rewrite. The trace is the main debugging artifact.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::model::{Stage, Tag};

/// One recorded rule application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub feature: Tag,
    pub stage: Stage,
    pub lookup_index: usize,
    /// Textual description of the rule that fired
    pub rule: String,
    /// Token positions consumed, in the sequence as it was before the rewrite
    pub consumed: Vec<usize>,
    /// Token sequence immediately after the rewrite
    pub tokens: Vec<String>,
    /// Contextual dispatch depth (0 for rules reached by the scan itself)
    pub depth: usize,
}

impl TraceEntry {
    /// Resulting tokens with a `>` marker before the first consumed position
    pub fn marked_tokens(&self) -> String {
        let mut tokens: Vec<&str> = self.tokens.iter().map(String::as_str).collect();
        if let Some(&first) = self.consumed.iter().min() {
            if first <= tokens.len() {
                tokens.insert(first, ">");
            }
        }
        tokens.join(" ")
    }
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Feature: {}, {} Lookup: {}",
            self.feature, self.stage, self.lookup_index
        )?;
        if self.consumed.is_empty() {
            writeln!(f, "   Positions affected: None")?;
        } else {
            let positions: Vec<String> = self.consumed.iter().map(ToString::to_string).collect();
            writeln!(f, "   Positions affected: {}", positions.join(", "))?;
        }
        writeln!(f, "   Rule: {}", self.rule)?;
        write!(f, "   Result: {}", self.marked_tokens())
    }
}

/// Ordered trace of one simulation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trace {
    entries: Vec<TraceEntry>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: TraceEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TraceEntry> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> Vec<TraceEntry> {
        self.entries
    }

    /// Entries recorded for one lookup of one stage
    pub fn for_lookup(&self, stage: Stage, lookup_index: usize) -> impl Iterator<Item = &TraceEntry> {
        self.entries
            .iter()
            .filter(move |e| e.stage == stage && e.lookup_index == lookup_index)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl<'a> IntoIterator for &'a Trace {
    type Item = &'a TraceEntry;
    type IntoIter = std::slice::Iter<'a, TraceEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Rules Applied (in order):")?;
        writeln!(f, "{}", "=".repeat(50))?;
        if self.entries.is_empty() {
            return write!(f, "No rules were applied.");
        }
        for (i, entry) in self.entries.iter().enumerate() {
            write!(f, "\n{}. {entry}\n", i + 1)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(consumed: Vec<usize>, tokens: &[&str]) -> TraceEntry {
        TraceEntry {
            feature: Tag::LIGA,
            stage: Stage::Substitution,
            lookup_index: 2,
            rule: "A B -> C".to_string(),
            consumed,
            tokens: tokens.iter().map(|s| s.to_string()).collect(),
            depth: 0,
        }
    }

    #[test]
    fn test_marked_tokens() {
        assert_eq!(entry(vec![1, 2], &["X", "C"]).marked_tokens(), "X > C");
        assert_eq!(entry(vec![], &["X", "C"]).marked_tokens(), "X C");
    }

    #[test]
    fn test_trace_display() {
        let mut trace = Trace::new();
        assert!(trace.to_string().ends_with("No rules were applied."));

        trace.push(entry(vec![0, 1], &["C"]));
        let text = trace.to_string();
        assert!(text.contains("1. Feature: liga, GSUB Lookup: 2"));
        assert!(text.contains("Positions affected: 0, 1"));
        assert!(text.contains("Result: > C"));
    }

    #[test]
    fn test_trace_json() {
        let mut trace = Trace::new();
        trace.push(entry(vec![0, 1], &["C"]));
        let json = trace.to_json().unwrap();
        assert!(json.contains("\"feature\": \"liga\""));
        assert!(json.contains("\"stage\": \"GSUB\""));
        assert_eq!(Trace::from_json(&json).unwrap(), trace);
        assert_eq!(trace.for_lookup(Stage::Substitution, 2).count(), 1);
        assert_eq!(trace.for_lookup(Stage::Positioning, 2).count(), 0);
    }
}
