//! Shaped glyph run
//!
//! Turns simulated tokens and offsets into absolute pen coordinates using
//! per-glyph default advances supplied by the caller.

use std::collections::HashMap;

use super::gpos::GlyphPosition;

/// Default advance of a glyph, in font units
pub trait AdvanceSource {
    /// `(x_advance, y_advance)` of a glyph
    fn advance(&self, glyph: &str) -> (i32, i32);
}

impl AdvanceSource for HashMap<String, (i32, i32)> {
    fn advance(&self, glyph: &str) -> (i32, i32) {
        self.get(glyph).copied().unwrap_or((0, 0))
    }
}

impl<F> AdvanceSource for F
where
    F: Fn(&str) -> (i32, i32),
{
    fn advance(&self, glyph: &str) -> (i32, i32) {
        self(glyph)
    }
}

/// A shaped glyph with position
#[derive(Debug, Clone)]
pub struct ShapedGlyph {
    /// Glyph name
    pub name: String,
    /// X offset from current position (in font units)
    pub x_offset: i32,
    /// Y offset from current position (in font units)
    pub y_offset: i32,
    /// Horizontal advance (in font units)
    pub x_advance: i32,
    /// Vertical advance (in font units)
    pub y_advance: i32,
    /// Glyph whose origin the offsets are measured from, if attached
    pub attached_to: Option<usize>,
}

/// A run of shaped glyphs
#[derive(Debug, Clone)]
pub struct ShapedRun {
    /// The shaped glyphs
    pub glyphs: Vec<ShapedGlyph>,
    /// Font size used for shaping
    pub font_size: f32,
    /// Units per em from the font
    pub units_per_em: u16,
}

impl ShapedRun {
    pub fn new(glyphs: Vec<ShapedGlyph>, font_size: f32, units_per_em: u16) -> Self {
        Self {
            glyphs,
            font_size,
            units_per_em,
        }
    }

    /// Combine final tokens and positions with default advances.
    ///
    /// Positions missing at the tail count as zero.
    pub fn from_simulation(
        tokens: &[String],
        positions: &[GlyphPosition],
        advances: &impl AdvanceSource,
        font_size: f32,
        units_per_em: u16,
    ) -> Self {
        let glyphs = tokens
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let position = positions.get(i).copied().unwrap_or_default();
                let (x_advance, y_advance) = advances.advance(name);
                ShapedGlyph {
                    name: name.clone(),
                    x_offset: position.x_offset,
                    y_offset: position.y_offset,
                    x_advance: x_advance + position.x_advance,
                    y_advance: y_advance + position.y_advance,
                    attached_to: position.attached_to,
                }
            })
            .collect();
        Self::new(glyphs, font_size, units_per_em)
    }

    /// Scale factor to convert font units to pixels
    pub fn scale(&self) -> f32 {
        if self.units_per_em == 0 {
            return 0.0;
        }
        self.font_size / self.units_per_em as f32
    }

    /// Total width in pixels
    pub fn width(&self) -> f32 {
        self.glyphs
            .iter()
            .map(|g| g.x_advance as f32 * self.scale())
            .sum()
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// Iterate over glyphs with pixel positions.
    ///
    /// Attached glyphs are placed from the origin of the glyph they hang
    /// on (followed through stacked attachments), not from the pen.
    pub fn positioned_glyphs(&self) -> impl Iterator<Item = PositionedGlyph<'_>> + '_ {
        let scale = self.scale();
        let mut x = 0.0;
        let mut y = 0.0;
        let mut origins: Vec<(f32, f32)> = Vec::with_capacity(self.glyphs.len());

        self.glyphs.iter().map(move |g| {
            let origin = g
                .attached_to
                .and_then(|base| origins.get(base).copied())
                .unwrap_or((x, y));
            origins.push(origin);
            let pos = PositionedGlyph {
                name: &g.name,
                x: origin.0 + g.x_offset as f32 * scale,
                y: origin.1 + g.y_offset as f32 * scale,
            };
            x += g.x_advance as f32 * scale;
            y += g.y_advance as f32 * scale;
            pos
        })
    }
}

/// A glyph with pixel position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionedGlyph<'a> {
    pub name: &'a str,
    /// X position in pixels
    pub x: f32,
    /// Y position in pixels
    pub y: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pen_accumulation() {
        let tokens: Vec<String> = ["A1", "top", "B1"].iter().map(|s| s.to_string()).collect();
        let positions = vec![
            GlyphPosition::default(),
            GlyphPosition {
                x_offset: -500,
                y_offset: 700,
                ..Default::default()
            },
            GlyphPosition::default(),
        ];
        let advances: HashMap<String, (i32, i32)> =
            [("A1".to_string(), (1000, 0)), ("B1".to_string(), (800, 0))].into_iter().collect();

        let run = ShapedRun::from_simulation(&tokens, &positions, &advances, 2000.0, 1000);
        let placed: Vec<_> = run.positioned_glyphs().collect();
        assert_eq!(placed[1].x, 1000.0);
        assert_eq!(placed[1].y, 1400.0);
        assert_eq!(placed[2].x, 2000.0);
        assert_eq!(run.width(), 3600.0);
    }

    #[test]
    fn test_attached_marks_hang_on_base_origin() {
        let tokens: Vec<String> = ["B1", "top", "top", "C1"].iter().map(|s| s.to_string()).collect();
        let positions = vec![
            GlyphPosition::default(),
            GlyphPosition {
                x_offset: 200,
                y_offset: 700,
                attached_to: Some(0),
                ..Default::default()
            },
            GlyphPosition {
                x_offset: 200,
                y_offset: 900,
                attached_to: Some(1),
                ..Default::default()
            },
            GlyphPosition::default(),
        ];
        let advances: HashMap<String, (i32, i32)> = [
            ("B1".to_string(), (600, 0)),
            ("top".to_string(), (100, 0)),
            ("C1".to_string(), (500, 0)),
        ]
        .into_iter()
        .collect();

        let run = ShapedRun::from_simulation(&tokens, &positions, &advances, 1000.0, 1000);
        let placed: Vec<_> = run.positioned_glyphs().collect();
        assert_eq!((placed[1].x, placed[1].y), (200.0, 700.0));
        assert_eq!((placed[2].x, placed[2].y), (200.0, 900.0));
        // the pen still moves past the marks' own advances
        assert_eq!(placed[3].x, 800.0);
    }

    #[test]
    fn test_closure_advances() {
        let tokens = vec!["A".to_string(), "B".to_string()];
        let run = ShapedRun::from_simulation(&tokens, &[], &|_: &str| (500, 0), 1000.0, 1000);
        let placed: Vec<_> = run.positioned_glyphs().collect();
        assert_eq!(placed[1].x, 500.0);
        assert_eq!(placed[1].name, "B");
    }
}
