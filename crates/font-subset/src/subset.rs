use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::{
    font::{Font, GlyphWithMetrics},
    ParseError,
};

/// Subset of a [`Font`] produced by removing some of its glyphs and related data.
#[derive(Debug)]
pub struct FontSubset<'a> {
    pub(crate) font: Font<'a>,
    /// Chars with their *new* glyph indices, ordered by char.
    pub(crate) char_map: Vec<(char, u16)>,
    pub(crate) old_to_new_glyph_idx: BTreeMap<u16, u16>,
    /// Glyphs in the new order.
    pub(crate) glyphs: Vec<GlyphWithMetrics<'a>>,
}

impl<'a> FontSubset<'a> {
    /// Creates a subset retaining the specified chars. Chars not covered by the font
    /// are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the glyph data of the font is malformed.
    pub fn new(font: Font<'a>, chars: &BTreeSet<char>) -> Result<Self, ParseError> {
        let mut mapped_chars = Vec::with_capacity(chars.len());
        for &ch in chars {
            let old_idx = font.map_char(ch)?;
            if old_idx != 0 {
                mapped_chars.push((ch, old_idx));
            }
        }

        // The 0th glyph must always be mapped to itself.
        let mut old_to_new_glyph_idx = BTreeMap::from([(0, 0)]);
        let mut glyphs = vec![font.glyph(0)?];
        let mut queue: VecDeque<u16> = mapped_chars.iter().map(|&(_, idx)| idx).collect();
        queue.extend(glyphs[0].inner.component_indices());

        while let Some(old_idx) = queue.pop_front() {
            if old_to_new_glyph_idx.contains_key(&old_idx) {
                continue;
            }
            let glyph = font.glyph(old_idx)?;
            queue.extend(glyph.inner.component_indices());

            let new_idx = u16::try_from(glyphs.len()).map_err(|_| ParseError::missing_glyph(old_idx))?;
            old_to_new_glyph_idx.insert(old_idx, new_idx);
            glyphs.push(glyph);
        }

        let char_map = mapped_chars
            .into_iter()
            .map(|(ch, old_idx)| (ch, old_to_new_glyph_idx[&old_idx]))
            .collect();
        Ok(Self {
            font,
            char_map,
            old_to_new_glyph_idx,
            glyphs,
        })
    }

    /// Returns the number of glyphs in this subset, including the default glyph.
    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    /// Returns the chars covered by this subset.
    pub fn chars(&self) -> impl Iterator<Item = char> + '_ {
        self.char_map.iter().map(|&(ch, _)| ch)
    }
}
