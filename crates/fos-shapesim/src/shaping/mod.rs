//! Rule application engines and simulation driver

mod budget;
mod gpos;
mod gsub;
mod run;
mod simulator;

pub use budget::{Limit, Limits};
pub use gpos::{GlyphPosition, PositioningEngine};
pub use gsub::SubstitutionEngine;
pub use run::{AdvanceSource, PositionedGlyph, ShapedGlyph, ShapedRun};
pub use simulator::{SimulationOutput, Simulator, SimulatorConfig};
