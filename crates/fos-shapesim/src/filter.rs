//! Glyph filtering and context matching
//!
//! A lookup sees the token sequence through its flags: glyphs hidden by
//! class, mark attachment class or filter set are skipped when matching
//! input and context, but stay in place in the live sequence.

use crate::model::{Coverage, GlyphClass, GlyphDefs, LookupFlags};

/// Visibility predicate for one lookup
#[derive(Debug, Clone, Copy)]
pub struct GlyphFilter<'a> {
    glyphs: &'a GlyphDefs,
    flags: LookupFlags,
}

impl<'a> GlyphFilter<'a> {
    pub fn new(glyphs: &'a GlyphDefs, flags: LookupFlags) -> Self {
        Self { glyphs, flags }
    }

    pub fn flags(&self) -> LookupFlags {
        self.flags
    }

    /// Whether a glyph passes every active flag of the lookup
    pub fn visible(&self, glyph: &str) -> bool {
        let class_visible = match self.glyphs.class(glyph) {
            GlyphClass::Base => !self.flags.ignore_base_glyphs,
            GlyphClass::Ligature => !self.flags.ignore_ligatures,
            GlyphClass::Mark => {
                !self.flags.ignore_marks
                    && (self.flags.mark_attachment_class == 0
                        || self.glyphs.mark_attach_class(glyph) == self.flags.mark_attachment_class)
            }
            GlyphClass::Component => true,
        };

        class_visible
            && self
                .flags
                .mark_filtering_set
                .is_none_or(|set| self.glyphs.in_filter_set(set, glyph))
    }

    /// Visible-only projection of a sequence, keeping original indices
    pub fn filtered<'t>(&self, tokens: &'t [String]) -> Vec<(usize, &'t str)> {
        self.forward(tokens, 0).collect()
    }

    /// Visible glyphs at or after `start`, in sequence order
    pub fn forward<'t>(
        &self,
        tokens: &'t [String],
        start: usize,
    ) -> impl Iterator<Item = (usize, &'t str)> + use<'a, 't> {
        let filter = *self;
        tokens
            .iter()
            .enumerate()
            .skip(start)
            .map(|(i, glyph)| (i, glyph.as_str()))
            .filter(move |(_, glyph)| filter.visible(glyph))
    }

    /// Visible glyphs before `end`, nearest first
    pub fn backward<'t>(
        &self,
        tokens: &'t [String],
        end: usize,
    ) -> impl Iterator<Item = (usize, &'t str)> + use<'a, 't> {
        let filter = *self;
        let end = end.min(tokens.len());
        tokens[..end]
            .iter()
            .enumerate()
            .rev()
            .map(|(i, glyph)| (i, glyph.as_str()))
            .filter(move |(_, glyph)| filter.visible(glyph))
    }

    /// Match a rule's input and context with its first input glyph at `pos`.
    ///
    /// Input glyphs are read from `tokens`; backtrack and lookahead are read
    /// from `context`, which is either the same sequence or a snapshot of
    /// equal length. Returns the original indices of the matched input.
    pub fn match_at(
        &self,
        tokens: &[String],
        context: &[String],
        pos: usize,
        backtrack: &[Coverage],
        input: InputPattern<'_>,
        lookahead: &[Coverage],
    ) -> Option<Vec<usize>> {
        let first = tokens.get(pos)?;
        if input.is_empty() || !input.accepts(0, first) {
            return None;
        }

        let mut matched = Vec::with_capacity(input.len());
        matched.push(pos);
        let mut rest = self.forward(tokens, pos + 1);
        for index in 1..input.len() {
            match rest.next() {
                Some((i, glyph)) if input.accepts(index, glyph) => matched.push(i),
                _ => return None,
            }
        }

        let after = matched.last().map_or(pos + 1, |last| last + 1);
        if !matches_suffix(backtrack, self.backward(context, pos)) {
            return None;
        }
        if !matches_prefix(lookahead, self.forward(context, after)) {
            return None;
        }
        Some(matched)
    }
}

/// Input side of a rule: literal glyph names or per-position coverages
#[derive(Debug, Clone, Copy)]
pub enum InputPattern<'r> {
    Glyphs(&'r [String]),
    Coverages(&'r [Coverage]),
}

impl InputPattern<'_> {
    pub fn len(&self) -> usize {
        match self {
            InputPattern::Glyphs(glyphs) => glyphs.len(),
            InputPattern::Coverages(coverages) => coverages.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn accepts(&self, index: usize, glyph: &str) -> bool {
        match self {
            InputPattern::Glyphs(glyphs) => glyphs.get(index).is_some_and(|g| g == glyph),
            InputPattern::Coverages(coverages) => {
                coverages.get(index).is_some_and(|c| c.contains(glyph))
            }
        }
    }
}

/// Match coverages position by position against filtered glyphs,
/// returning the indices matched.
pub fn match_coverages<'t, I>(coverages: &[Coverage], filtered: I) -> Option<Vec<usize>>
where
    I: IntoIterator<Item = (usize, &'t str)>,
{
    let mut glyphs = filtered.into_iter();
    coverages
        .iter()
        .map(|coverage| match glyphs.next() {
            Some((i, glyph)) if coverage.contains(glyph) => Some(i),
            _ => None,
        })
        .collect()
}

/// Whether the filtered glyphs starting at some position begin with the
/// coverage sequence. An empty sequence always matches.
pub fn matches_prefix<'t, I>(coverages: &[Coverage], filtered: I) -> bool
where
    I: IntoIterator<Item = (usize, &'t str)>,
{
    match_coverages(coverages, filtered).is_some()
}

/// Whether the filtered glyphs before some position end with the coverage
/// sequence. `filtered` yields the nearest glyph first, aligned with the
/// last coverage.
pub fn matches_suffix<'t, I>(coverages: &[Coverage], filtered: I) -> bool
where
    I: IntoIterator<Item = (usize, &'t str)>,
{
    let mut glyphs = filtered.into_iter();
    coverages
        .iter()
        .rev()
        .all(|coverage| glyphs.next().is_some_and(|(_, glyph)| coverage.contains(glyph)))
}
