//! Simulation driver
//!
//! Feeds a token sequence through every active GSUB feature, then every
//! active GPOS feature, and keeps the resulting tokens, positions and trace.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::budget::{Limits, RunState};
use super::gpos::{GlyphPosition, PositioningEngine};
use super::gsub::SubstitutionEngine;
use crate::Result;
use crate::model::{LayoutModel, Tag};
use crate::trace::Trace;

/// Simulation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Features skipped entirely
    pub suppressed_features: BTreeSet<Tag>,
    /// Ceiling on rule applications per run
    pub max_rewrites: usize,
    /// Ceiling on contextual dispatch depth
    pub max_nesting_depth: usize,
    /// Whether GPOS features run
    pub positioning: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            suppressed_features: BTreeSet::new(),
            max_rewrites: Limits::DEFAULT_MAX_REWRITES,
            max_nesting_depth: Limits::DEFAULT_MAX_NESTING_DEPTH,
            positioning: true,
        }
    }
}

impl SimulatorConfig {
    /// Skip a feature
    pub fn suppress(mut self, tag: Tag) -> Self {
        self.suppressed_features.insert(tag);
        self
    }

    pub fn max_rewrites(mut self, max: usize) -> Self {
        self.max_rewrites = max;
        self
    }

    pub fn max_nesting_depth(mut self, max: usize) -> Self {
        self.max_nesting_depth = max;
        self
    }

    /// Enable/disable the positioning stage
    pub fn positioning(mut self, enabled: bool) -> Self {
        self.positioning = enabled;
        self
    }

    pub fn is_suppressed(&self, tag: Tag) -> bool {
        self.suppressed_features.contains(&tag)
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_rewrites: self.max_rewrites,
            max_nesting_depth: self.max_nesting_depth,
        }
    }
}

/// Result of one simulation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationOutput {
    pub tokens: Vec<String>,
    /// Positions aligned with `tokens`
    pub positions: Vec<GlyphPosition>,
    pub trace: Trace,
}

impl SimulationOutput {
    /// `(x, y)` offsets aligned with `tokens`
    pub fn offsets(&self) -> Vec<(i32, i32)> {
        self.positions.iter().map(GlyphPosition::offset).collect()
    }
}

/// Runs a layout model over token sequences
pub struct Simulator<'m> {
    model: &'m LayoutModel,
    config: SimulatorConfig,
    input: Vec<String>,
    tokens: Vec<String>,
    positions: Vec<GlyphPosition>,
    trace: Trace,
}

impl<'m> Simulator<'m> {
    pub fn new(model: &'m LayoutModel) -> Self {
        Self::with_config(model, SimulatorConfig::default())
    }

    pub fn with_config(model: &'m LayoutModel, config: SimulatorConfig) -> Self {
        Self {
            model,
            config,
            input: Vec::new(),
            tokens: Vec::new(),
            positions: Vec::new(),
            trace: Trace::new(),
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Skip a feature in subsequent runs
    pub fn suppress(&mut self, tag: Tag) {
        self.config.suppressed_features.insert(tag);
    }

    /// Set the input sequence, discarding everything derived from the last one
    pub fn set_tokens<I, S>(&mut self, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input = tokens.into_iter().map(Into::into).collect();
        self.tokens = self.input.clone();
        self.positions.clear();
        self.trace = Trace::new();
    }

    /// Run every active feature over the input sequence.
    ///
    /// On failure the trace recorded up to the error stays available
    /// through [`Simulator::trace`].
    pub fn run(&mut self) -> Result<SimulationOutput> {
        self.tokens = self.input.clone();
        self.positions.clear();
        self.trace = Trace::new();

        if self.input.is_empty() {
            debug!("empty input, nothing to shape");
            return Ok(self.output());
        }

        self.model.validate()?;
        info!(tokens = self.input.len(), "simulation started");

        let mut state = RunState::new(self.config.limits());
        let result = self.apply_features(&mut state);
        self.trace = state.into_trace();
        result?;

        info!(
            tokens = self.tokens.len(),
            applied = self.trace.len(),
            "simulation finished"
        );
        Ok(self.output())
    }

    fn apply_features(&mut self, state: &mut RunState) -> Result<()> {
        let model = self.model;
        let gsub = SubstitutionEngine::new(model);
        for feature in &model.gsub.features {
            if self.config.is_suppressed(feature.tag) {
                debug!(feature = %feature.tag, "GSUB feature suppressed");
                continue;
            }
            for index in feature.sorted_lookups() {
                gsub.run_lookup(&mut self.tokens, index, feature.tag, state)?;
            }
        }

        self.positions = vec![GlyphPosition::default(); self.tokens.len()];
        if !self.config.positioning {
            return Ok(());
        }

        let gpos = PositioningEngine::new(model);
        for feature in &model.gpos.features {
            if self.config.is_suppressed(feature.tag) {
                debug!(feature = %feature.tag, "GPOS feature suppressed");
                continue;
            }
            for index in feature.sorted_lookups() {
                gpos.run_lookup(&self.tokens, &mut self.positions, index, feature.tag, state)?;
            }
        }
        Ok(())
    }

    fn output(&self) -> SimulationOutput {
        SimulationOutput {
            tokens: self.tokens.clone(),
            positions: self.positions.clone(),
            trace: self.trace.clone(),
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn positions(&self) -> &[GlyphPosition] {
        &self.positions
    }

    pub fn offsets(&self) -> Vec<(i32, i32)> {
        self.positions.iter().map(GlyphPosition::offset).collect()
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn input_tokens(&self) -> &[String] {
        &self.input
    }

    /// Input sequence as a space-separated string
    pub fn input_tokens_str(&self) -> String {
        self.input.join(" ")
    }

    /// Current sequence as a space-separated string
    pub fn tokens_str(&self) -> String {
        self.tokens.join(" ")
    }

    /// Final glyphs with their offsets, one per line
    pub fn result_str(&self) -> String {
        self.tokens
            .iter()
            .zip(self.offsets())
            .map(|(token, (x, y))| format!("{token} ({x}, {y})"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
