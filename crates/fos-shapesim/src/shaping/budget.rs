//! Rewrite budget
//!
//! Contextual rules can dispatch into lookups that trigger the same rule
//! again. Every rule application is charged against a rewrite ceiling and
//! every dispatch against a nesting ceiling, so such rule sets fail with
//! an error instead of looping.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::SimError;
use crate::model::{Stage, Tag};
use crate::trace::{Trace, TraceEntry};

/// Ceilings for one simulation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub max_rewrites: usize,
    pub max_nesting_depth: usize,
}

impl Limits {
    pub const DEFAULT_MAX_REWRITES: usize = 65_536;
    pub const DEFAULT_MAX_NESTING_DEPTH: usize = 64;
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_rewrites: Self::DEFAULT_MAX_REWRITES,
            max_nesting_depth: Self::DEFAULT_MAX_NESTING_DEPTH,
        }
    }
}

/// The ceiling that was exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Rewrites(usize),
    NestingDepth(usize),
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Rewrites(max) => write!(f, "rewrite limit of {max}"),
            Limit::NestingDepth(max) => write!(f, "nesting depth limit of {max}"),
        }
    }
}

/// Feature and dispatch depth a rule is applied under
#[derive(Debug, Clone, Copy)]
pub(crate) struct Frame {
    pub feature: Tag,
    pub depth: usize,
}

impl Frame {
    pub fn top(feature: Tag) -> Self {
        Self { feature, depth: 0 }
    }

    pub fn nested(self) -> Self {
        Self {
            depth: self.depth + 1,
            ..self
        }
    }
}

/// Mutable state shared by every lookup of one run
#[derive(Debug)]
pub(crate) struct RunState {
    limits: Limits,
    rewrites: usize,
    pub trace: Trace,
}

impl RunState {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            rewrites: 0,
            trace: Trace::new(),
        }
    }

    /// Count one rule application
    pub fn charge(&mut self) -> Result<(), Limit> {
        if self.rewrites >= self.limits.max_rewrites {
            return Err(Limit::Rewrites(self.limits.max_rewrites));
        }
        self.rewrites += 1;
        Ok(())
    }

    /// Check that a dispatch into `frame` stays within the nesting ceiling
    pub fn enter(&self, frame: Frame) -> Result<(), Limit> {
        if frame.depth > self.limits.max_nesting_depth {
            return Err(Limit::NestingDepth(self.limits.max_nesting_depth));
        }
        Ok(())
    }

    pub fn record(&mut self, entry: TraceEntry) {
        self.trace.push(entry);
    }

    /// Error for an exceeded ceiling, carrying the trace so far
    pub fn exceeded(
        &self,
        frame: Frame,
        stage: Stage,
        lookup: usize,
        position: usize,
        limit: Limit,
    ) -> SimError {
        tracing::warn!(
            feature = %frame.feature,
            %stage,
            lookup,
            position,
            %limit,
            "rewrite ceiling exceeded"
        );
        SimError::NonTerminating {
            feature: frame.feature,
            stage,
            lookup,
            position,
            limit,
            trace: Box::new(self.trace.clone()),
        }
    }

    pub fn into_trace(self) -> Trace {
        self.trace
    }
}
