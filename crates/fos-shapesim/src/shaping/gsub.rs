//! Substitution engine
//!
//! Walks a token sequence and rewrites it with one lookup's rules. At each
//! visible position the first rule whose input and context match wins.
//! Chained context rules rewrite nothing themselves; they run other lookups
//! at single positions inside their matched span.

use std::slice;

use tracing::{debug, trace};

use super::budget::{Frame, Limits, RunState};
use crate::filter::{GlyphFilter, InputPattern};
use crate::model::gsub::{ChainContextSubst, SubstRule};
use crate::model::{LayoutModel, Referrer, Stage, SubstLookup, Tag};
use crate::trace::TraceEntry;
use crate::{Result, SimError};

/// One splice of the token sequence
#[derive(Debug, Clone, PartialEq, Eq)]
struct Edit {
    /// Positions removed, ascending; the output starts at the first one
    consumed: Vec<usize>,
    /// Number of glyphs inserted at the first consumed position
    inserted: usize,
}

impl Edit {
    fn first(&self) -> usize {
        self.consumed.first().copied().unwrap_or(0)
    }

    fn removed_before(&self, p: usize) -> usize {
        self.consumed.iter().filter(|&&c| c < p).count()
    }

    /// Where a surviving position moved; `None` once it was consumed
    fn remap(&self, p: usize) -> Option<usize> {
        let first = self.first();
        if p < first {
            Some(p)
        } else if p == first {
            (self.inserted > 0).then_some(first)
        } else if self.consumed.contains(&p) {
            None
        } else {
            Some(p - self.removed_before(p) + self.inserted)
        }
    }

    /// Remap an exclusive span end
    fn remap_end(&self, end: usize) -> usize {
        if end <= self.first() {
            end
        } else {
            end - self.removed_before(end) + self.inserted
        }
    }
}

/// Outcome of one rule application
#[derive(Debug, Default)]
struct Applied {
    edits: Vec<Edit>,
    /// Next scan position for a forward scan
    resume: usize,
}

/// Applies substitution lookups of a model
#[derive(Debug, Clone, Copy)]
pub struct SubstitutionEngine<'m> {
    model: &'m LayoutModel,
    limits: Limits,
}

impl<'m> SubstitutionEngine<'m> {
    pub fn new(model: &'m LayoutModel) -> Self {
        Self {
            model,
            limits: Limits::default(),
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Apply one lookup to a token sequence.
    ///
    /// Returns the rewritten sequence and one trace entry per rule that fired.
    pub fn apply_lookup(
        &self,
        tokens: &[String],
        lookup_index: usize,
        feature: Tag,
    ) -> Result<(Vec<String>, Vec<TraceEntry>)> {
        let mut state = RunState::new(self.limits);
        let mut tokens = tokens.to_vec();
        self.run_lookup(&mut tokens, lookup_index, feature, &mut state)?;
        Ok((tokens, state.into_trace().into_entries()))
    }

    pub(crate) fn run_lookup(
        &self,
        tokens: &mut Vec<String>,
        lookup_index: usize,
        feature: Tag,
        state: &mut RunState,
    ) -> Result<()> {
        let lookup = self.lookup(lookup_index, Referrer::Feature(feature))?;
        let filter = GlyphFilter::new(&self.model.glyphs, lookup.flags);
        let frame = Frame::top(feature);
        let before = state.trace.len();

        if lookup.flags.reverse {
            // Context is read from the sequence as it was when the scan started
            let mut snapshot = tokens.clone();
            let mut pos = tokens.len();
            while pos > 0 {
                pos -= 1;
                if !filter.visible(&tokens[pos]) {
                    trace!(lookup = lookup_index, pos, glyph = %tokens[pos], "skipped");
                    continue;
                }
                let applied = self.apply_at(tokens, lookup_index, pos, Some(snapshot.as_slice()), frame, state)?;
                if applied.is_some() && tokens.len() != snapshot.len() {
                    snapshot = tokens.clone();
                }
                pos = pos.min(tokens.len());
            }
        } else {
            let mut pos = 0;
            while pos < tokens.len() {
                if !filter.visible(&tokens[pos]) {
                    trace!(lookup = lookup_index, pos, glyph = %tokens[pos], "skipped");
                    pos += 1;
                    continue;
                }
                pos = match self.apply_at(tokens, lookup_index, pos, None, frame, state)? {
                    Some(applied) => applied.resume,
                    None => pos + 1,
                };
            }
        }

        debug!(
            %feature,
            lookup = lookup_index,
            applied = state.trace.len() - before,
            "substitution lookup done"
        );
        Ok(())
    }

    fn lookup(&self, index: usize, referrer: Referrer) -> Result<&'m SubstLookup> {
        self.model.gsub.lookup(index).ok_or(SimError::MissingLookup {
            stage: Stage::Substitution,
            lookup: index,
            referrer,
        })
    }

    /// Try the lookup's rules at `pos`; the first one that matches is applied
    fn apply_at(
        &self,
        tokens: &mut Vec<String>,
        lookup_index: usize,
        pos: usize,
        context: Option<&[String]>,
        frame: Frame,
        state: &mut RunState,
    ) -> Result<Option<Applied>> {
        let lookup = self.lookup(lookup_index, Referrer::Lookup(lookup_index))?;
        let filter = GlyphFilter::new(&self.model.glyphs, lookup.flags);

        for rule in &lookup.rules {
            let matched = {
                let context = context.unwrap_or(tokens.as_slice());
                match_rule(filter, rule, tokens, context, pos)
            };
            let Some(matched) = matched else {
                continue;
            };

            state
                .charge()
                .map_err(|limit| state.exceeded(frame, Stage::Substitution, lookup_index, pos, limit))?;

            let applied = match rule {
                SubstRule::Single(s) => replace(tokens, &matched, slice::from_ref(&s.output)),
                SubstRule::Multiple(m) => replace(tokens, &matched, &m.outputs),
                SubstRule::Ligature(l) => replace(tokens, &matched, slice::from_ref(&l.ligature)),
                SubstRule::ReverseChainSingle(r) => {
                    let Some(output) = r.substitute_for(&tokens[pos]).map(str::to_string) else {
                        continue;
                    };
                    replace(tokens, &matched, slice::from_ref(&output))
                }
                SubstRule::ChainContext(chain) => {
                    debug!(lookup = lookup_index, pos, rule = %rule, "context matched");
                    return self
                        .dispatch(tokens, lookup_index, chain, matched, frame, state)
                        .map(Some);
                }
            };

            debug!(lookup = lookup_index, pos, rule = %rule, depth = frame.depth, "substituted");
            state.record(TraceEntry {
                feature: frame.feature,
                stage: Stage::Substitution,
                lookup_index,
                rule: rule.to_string(),
                consumed: matched,
                tokens: tokens.clone(),
                depth: frame.depth,
            });
            return Ok(Some(applied));
        }
        Ok(None)
    }

    /// Run a chain rule's lookup records over its matched input span
    fn dispatch(
        &self,
        tokens: &mut Vec<String>,
        lookup_index: usize,
        chain: &ChainContextSubst,
        matched: Vec<usize>,
        frame: Frame,
        state: &mut RunState,
    ) -> Result<Applied> {
        let start = matched.first().copied().unwrap_or(0);
        let mut end = matched.last().map_or(start + 1, |last| last + 1);
        let mut input: Vec<Option<usize>> = matched.into_iter().map(Some).collect();
        let mut edits = Vec::new();
        let nested = frame.nested();

        for record in chain.sorted_records() {
            let Some(anchor) = input.get(record.sequence_index).copied().flatten() else {
                debug!(
                    lookup = lookup_index,
                    sequence_index = record.sequence_index,
                    "record position consumed"
                );
                continue;
            };
            state
                .enter(nested)
                .map_err(|limit| state.exceeded(frame, Stage::Substitution, lookup_index, anchor, limit))?;

            let target = self.lookup(record.lookup_index, Referrer::Lookup(lookup_index))?;
            let target_filter = GlyphFilter::new(&self.model.glyphs, target.flags);
            if anchor >= tokens.len() || !target_filter.visible(&tokens[anchor]) {
                continue;
            }

            let Some(applied) =
                self.apply_at(tokens, record.lookup_index, anchor, None, nested, state)?
            else {
                continue;
            };
            for edit in &applied.edits {
                for slot in input.iter_mut() {
                    *slot = slot.and_then(|p| edit.remap(p));
                }
                end = edit.remap_end(end);
            }
            edits.extend(applied.edits);
        }

        Ok(Applied {
            edits,
            resume: end.max(start + 1),
        })
    }
}

/// Match one rule at `pos`, returning the input positions it would consume
fn match_rule(
    filter: GlyphFilter<'_>,
    rule: &SubstRule,
    tokens: &[String],
    context: &[String],
    pos: usize,
) -> Option<Vec<usize>> {
    let glyph = tokens.get(pos)?;
    match rule {
        SubstRule::Single(s) => (*glyph == s.input).then(|| vec![pos]),
        SubstRule::Multiple(m) => (*glyph == m.input).then(|| vec![pos]),
        SubstRule::Ligature(l) => filter.match_at(
            tokens,
            context,
            pos,
            &[],
            InputPattern::Glyphs(&l.components),
            &[],
        ),
        SubstRule::ChainContext(c) => filter.match_at(
            tokens,
            context,
            pos,
            &c.backtrack,
            InputPattern::Coverages(&c.input),
            &c.lookahead,
        ),
        SubstRule::ReverseChainSingle(r) => filter.match_at(
            tokens,
            context,
            pos,
            &r.backtrack,
            InputPattern::Coverages(slice::from_ref(&r.coverage)),
            &r.lookahead,
        ),
    }
}

/// Remove the consumed positions and insert `output` at the first of them
fn replace(tokens: &mut Vec<String>, consumed: &[usize], output: &[String]) -> Applied {
    let first = consumed.first().copied().unwrap_or(0);
    for &p in consumed.iter().rev() {
        tokens.remove(p);
    }
    tokens.splice(first..first, output.iter().cloned());
    Applied {
        edits: vec![Edit {
            consumed: consumed.to_vec(),
            inserted: output.len(),
        }],
        resume: first + output.len(),
    }
}
