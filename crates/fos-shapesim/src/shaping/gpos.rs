//! Positioning engine
//!
//! Runs after substitution over the final token sequence and accumulates
//! per-glyph placement offsets. Mark attachment keeps the most recent
//! eligible base (or preceding mark) in a running variable per rule.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::budget::{Frame, Limits, RunState};
use crate::filter::{GlyphFilter, InputPattern};
use crate::model::gpos::{ChainContextPos, MarkAttachPos, PosRule, SinglePos};
use crate::model::{GlyphClass, LayoutModel, PosLookup, Referrer, Stage, Tag};
use crate::trace::TraceEntry;
use crate::{Result, SimError};

/// Accumulated placement of one glyph, in font units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlyphPosition {
    /// X offset from the glyph's own origin
    pub x_offset: i32,
    /// Y offset from the glyph's own origin
    pub y_offset: i32,
    /// Horizontal advance adjustment
    pub x_advance: i32,
    /// Vertical advance adjustment
    pub y_advance: i32,
    /// Index of the glyph this one is anchored to; offsets are then
    /// relative to that glyph's origin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_to: Option<usize>,
}

impl GlyphPosition {
    /// Placement offset as `(x, y)`
    pub fn offset(&self) -> (i32, i32) {
        (self.x_offset, self.y_offset)
    }
}

/// Applies positioning lookups of a model
#[derive(Debug, Clone, Copy)]
pub struct PositioningEngine<'m> {
    model: &'m LayoutModel,
    limits: Limits,
}

impl<'m> PositioningEngine<'m> {
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

    /// Apply one lookup and return the updated positions.
    ///
    /// `positions` is aligned with `tokens`; missing entries start at zero.
    pub fn apply_lookup(
        &self,
        tokens: &[String],
        positions: &[GlyphPosition],
        lookup_index: usize,
        feature: Tag,
    ) -> Result<Vec<GlyphPosition>> {
        let mut positions = positions.to_vec();
        positions.resize(tokens.len(), GlyphPosition::default());
        let mut state = RunState::new(self.limits);
        self.run_lookup(tokens, &mut positions, lookup_index, feature, &mut state)?;
        Ok(positions)
    }

    pub(crate) fn run_lookup(
        &self,
        tokens: &[String],
        positions: &mut [GlyphPosition],
        lookup_index: usize,
        feature: Tag,
        state: &mut RunState,
    ) -> Result<()> {
        let lookup = self.lookup(lookup_index, Referrer::Feature(feature))?;
        let before = state.trace.len();
        self.scan(tokens, positions, lookup_index, lookup, None, Frame::top(feature), state)?;
        debug!(
            %feature,
            lookup = lookup_index,
            applied = state.trace.len() - before,
            "positioning lookup done"
        );
        Ok(())
    }

    fn lookup(&self, index: usize, referrer: Referrer) -> Result<&'m PosLookup> {
        self.model.gpos.lookup(index).ok_or(SimError::MissingLookup {
            stage: Stage::Positioning,
            lookup: index,
            referrer,
        })
    }

    /// Left-to-right pass of one lookup. With an anchor, only that position
    /// may be adjusted but the running base state is built from the start.
    #[allow(clippy::too_many_arguments)]
    fn scan(
        &self,
        tokens: &[String],
        positions: &mut [GlyphPosition],
        lookup_index: usize,
        lookup: &PosLookup,
        anchor: Option<usize>,
        frame: Frame,
        state: &mut RunState,
    ) -> Result<()> {
        let filter = GlyphFilter::new(&self.model.glyphs, lookup.flags);
        let end = anchor.map_or(tokens.len(), |a| (a + 1).min(tokens.len()));
        let mut held: Vec<Option<usize>> = vec![None; lookup.rules.len()];

        for pos in 0..end {
            let glyph = tokens[pos].as_str();
            if !filter.visible(glyph) {
                trace!(lookup = lookup_index, pos, glyph, "skipped");
                continue;
            }

            let mut claimed = anchor.is_some_and(|a| a != pos);
            for (rule, held) in lookup.rules.iter().zip(held.iter_mut()) {
                if !claimed {
                    let step = Step {
                        tokens,
                        lookup_index,
                        rule,
                        pos,
                        frame,
                    };
                    claimed = match rule {
                        PosRule::Single(single) => self.adjust(single, &step, positions, state)?,
                        PosRule::MarkToBase(attach) | PosRule::MarkToMark(attach) => {
                            self.attach(attach, *held, &step, positions, state)?
                        }
                        PosRule::ChainContext(chain) => {
                            self.chain(chain, filter, &step, positions, state)?
                        }
                    };
                }
                self.update_held(rule, held, glyph, pos);
            }
        }
        Ok(())
    }

    fn update_held(&self, rule: &PosRule, held: &mut Option<usize>, glyph: &str, pos: usize) {
        match rule {
            PosRule::MarkToBase(attach) => {
                if attach.mark(glyph).is_some() {
                    return;
                }
                if attach.base(glyph).is_some() {
                    *held = Some(pos);
                } else if self.model.glyphs.class(glyph) != GlyphClass::Mark {
                    *held = None;
                }
            }
            // Only the immediately preceding visible glyph can carry a mark
            PosRule::MarkToMark(attach) => *held = attach.base(glyph).map(|_| pos),
            _ => {}
        }
    }

    fn adjust(
        &self,
        single: &SinglePos,
        step: &Step<'_>,
        positions: &mut [GlyphPosition],
        state: &mut RunState,
    ) -> Result<bool> {
        let Some(value) = single.value_for(&step.tokens[step.pos]) else {
            return Ok(false);
        };
        step.charge(state)?;
        let position = &mut positions[step.pos];
        position.x_offset += i32::from(value.x_placement);
        position.y_offset += i32::from(value.y_placement);
        position.x_advance += i32::from(value.x_advance);
        position.y_advance += i32::from(value.y_advance);
        step.record(state, vec![step.pos], step.rule.to_string());
        Ok(true)
    }

    fn attach(
        &self,
        attach: &MarkAttachPos,
        held: Option<usize>,
        step: &Step<'_>,
        positions: &mut [GlyphPosition],
        state: &mut RunState,
    ) -> Result<bool> {
        let glyph = step.tokens[step.pos].as_str();
        let Some(mark) = attach.mark(glyph) else {
            return Ok(false);
        };
        let Some(base_pos) = held else {
            warn!(lookup = step.lookup_index, pos = step.pos, glyph, "mark has no preceding base");
            return Ok(true);
        };
        let base_glyph = step.tokens[base_pos].as_str();
        let Some(base) = attach.base(base_glyph) else {
            return Ok(true);
        };

        step.charge(state)?;
        match base.anchor(mark.class) {
            Some(base_anchor) => {
                let base_position = positions[base_pos];
                let position = &mut positions[step.pos];
                position.x_offset =
                    base_position.x_offset + i32::from(base_anchor.x) - i32::from(mark.anchor.x);
                position.y_offset =
                    base_position.y_offset + i32::from(base_anchor.y) - i32::from(mark.anchor.y);
                position.attached_to = Some(base_pos);
                debug!(lookup = step.lookup_index, mark = glyph, base = base_glyph, "attached");
                step.record(state, vec![base_pos, step.pos], step.rule.to_string());
            }
            None => {
                warn!(
                    lookup = step.lookup_index,
                    mark = glyph,
                    base = base_glyph,
                    class = mark.class,
                    "base has no anchor for mark class"
                );
                step.record(
                    state,
                    vec![base_pos, step.pos],
                    format!("{} (no anchor for class {} on {base_glyph})", step.rule, mark.class),
                );
            }
        }
        Ok(true)
    }

    fn chain(
        &self,
        chain: &ChainContextPos,
        filter: GlyphFilter<'_>,
        step: &Step<'_>,
        positions: &mut [GlyphPosition],
        state: &mut RunState,
    ) -> Result<bool> {
        let matched = filter.match_at(
            step.tokens,
            step.tokens,
            step.pos,
            &chain.backtrack,
            InputPattern::Coverages(&chain.input),
            &chain.lookahead,
        );
        if matched.is_none() {
            return Ok(false);
        }
        step.charge(state)?;
        debug!(lookup = step.lookup_index, pos = step.pos, rule = %step.rule, "context matched");

        let Some(target_index) = chain.lookup_index else {
            return Ok(true);
        };
        let nested = step.frame.nested();
        state
            .enter(nested)
            .map_err(|limit| state.exceeded(step.frame, Stage::Positioning, step.lookup_index, step.pos, limit))?;
        let target = self.lookup(target_index, Referrer::Lookup(step.lookup_index))?;
        self.scan(
            step.tokens,
            positions,
            target_index,
            target,
            Some(step.pos),
            nested,
            state,
        )?;
        Ok(true)
    }
}

/// The rule being tried at one scan position
struct Step<'a> {
    tokens: &'a [String],
    lookup_index: usize,
    rule: &'a PosRule,
    pos: usize,
    frame: Frame,
}

impl Step<'_> {
    fn charge(&self, state: &mut RunState) -> Result<()> {
        state.charge().map_err(|limit| {
            state.exceeded(self.frame, Stage::Positioning, self.lookup_index, self.pos, limit)
        })
    }

    fn record(&self, state: &mut RunState, consumed: Vec<usize>, rule: String) {
        state.record(TraceEntry {
            feature: self.frame.feature,
            stage: Stage::Positioning,
            lookup_index: self.lookup_index,
            rule,
            consumed,
            tokens: self.tokens.to_vec(),
            depth: self.frame.depth,
        });
    }
}
