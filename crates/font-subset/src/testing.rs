//! Builder of small, valid TrueType fonts for tests.
//!
//! Glyph outlines are generated deterministically from the char codepoint; CJK ideographs
//! get more points than other chars, which mirrors the size profile of real CJK fonts.

use std::collections::BTreeMap;

use crate::{
    font::Font,
    write::{write_u16, write_u32},
    TableTag,
};

#[derive(Debug, Clone)]
enum Shape {
    Simple,
    Composite(Vec<char>),
}

/// Builder of synthetic TrueType fonts.
///
/// Glyphs are numbered in the order chars are added (glyph 0 is the default glyph).
/// Non-BMP chars make the font carry a format 12 `cmap` subtable next to the format 4 one.
#[derive(Debug, Clone, Default)]
pub struct SyntheticFont {
    glyphs: Vec<(char, Shape)>,
}

impl SyntheticFont {
    const UNITS_PER_EM: u16 = 1_000;

    /// Creates a builder without any chars.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds simple glyphs for the specified chars. Already added chars are skipped.
    #[must_use]
    pub fn chars(mut self, chars: impl IntoIterator<Item = char>) -> Self {
        for ch in chars {
            if !self.contains(ch) {
                self.glyphs.push((ch, Shape::Simple));
            }
        }
        self
    }

    /// Adds a composite glyph for `ch` referencing glyphs of `components`. The components
    /// must be added to the builder before [`Self::build()`] is called.
    #[must_use]
    pub fn composite(mut self, ch: char, components: &[char]) -> Self {
        if !self.contains(ch) {
            self.glyphs.push((ch, Shape::Composite(components.to_vec())));
        }
        self
    }

    fn contains(&self, ch: char) -> bool {
        self.glyphs.iter().any(|&(existing, _)| existing == ch)
    }

    fn is_wide(ch: char) -> bool {
        matches!(u32::from(ch), 0x2e80..=0x9fff | 0xf900..=0xfaff | 0x2_0000..=0x3_ffff)
    }

    /// Builds the font.
    ///
    /// # Panics
    ///
    /// Panics if a composite glyph references a char that was not added.
    pub fn build(&self) -> Vec<u8> {
        let glyph_ids: BTreeMap<char, u16> = self
            .glyphs
            .iter()
            .enumerate()
            .map(|(i, &(ch, _))| (ch, u16::try_from(i + 1).expect("too many glyphs")))
            .collect();

        let mut glyf = vec![];
        let mut locations = vec![0_u32];
        Self::write_simple_glyph(&mut glyf, 0, 4);
        locations.push(Self::location(&glyf));
        for (ch, shape) in &self.glyphs {
            match shape {
                Shape::Simple => {
                    let point_count = if Self::is_wide(*ch) {
                        24 + u32::from(*ch) % 16
                    } else {
                        4 + u32::from(*ch) % 8
                    };
                    Self::write_simple_glyph(&mut glyf, u32::from(*ch), point_count);
                }
                Shape::Composite(components) => {
                    let ids: Vec<_> = components
                        .iter()
                        .map(|component| {
                            *glyph_ids.get(component).unwrap_or_else(|| {
                                panic!("component {component:?} of {ch:?} is not in the font")
                            })
                        })
                        .collect();
                    Self::write_composite_glyph(&mut glyf, &ids);
                }
            }
            locations.push(Self::location(&glyf));
        }

        let glyph_count = u16::try_from(locations.len() - 1).expect("too many glyphs");
        let mut loca = vec![];
        for location in locations {
            write_u32(&mut loca, location);
        }
        let mut hmtx = vec![];
        write_u16(&mut hmtx, 500); // .notdef
        write_u16(&mut hmtx, 0);
        for (ch, _) in &self.glyphs {
            write_u16(&mut hmtx, if Self::is_wide(*ch) { 1_000 } else { 500 });
            write_u16(&mut hmtx, 0);
        }

        let tables = [
            (TableTag::CMAP, Self::cmap(&glyph_ids)),
            (TableTag::GLYF, glyf),
            (TableTag::HEAD, Self::head()),
            (TableTag::HHEA, Self::hhea(glyph_count)),
            (TableTag::HMTX, hmtx),
            (TableTag::LOCA, loca),
            (TableTag::MAXP, Self::maxp(glyph_count)),
            (TableTag::NAME, Self::name()),
            (TableTag::OS2, Self::os2()),
            (TableTag::POST, Self::post()),
        ];
        Self::assemble(&tables)
    }

    fn location(glyf: &[u8]) -> u32 {
        u32::try_from(glyf.len()).expect("glyf overflow")
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss
    )] // coordinates are small
    fn write_simple_glyph(buffer: &mut Vec<u8>, seed: u32, point_count: u32) {
        let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(12_345);
        let mut next_coord = || {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            ((state >> 16) % 700) as i16 + 50
        };
        let points: Vec<(i16, i16)> = (0..point_count)
            .map(|_| (next_coord(), next_coord()))
            .collect();

        write_u16(buffer, 1); // numberOfContours
        let x_min = points.iter().map(|&(x, _)| x).min().unwrap_or(0);
        let y_min = points.iter().map(|&(_, y)| y).min().unwrap_or(0);
        let x_max = points.iter().map(|&(x, _)| x).max().unwrap_or(0);
        let y_max = points.iter().map(|&(_, y)| y).max().unwrap_or(0);
        for coord in [x_min, y_min, x_max, y_max] {
            write_u16(buffer, coord as u16);
        }
        write_u16(buffer, (point_count - 1) as u16); // endPtsOfContours[0]
        write_u16(buffer, 0); // instructionLength
        buffer.extend((0..point_count).map(|_| 0x01_u8)); // on-curve, 16-bit deltas

        let (mut prev_x, mut prev_y) = (0_i16, 0_i16);
        for &(x, _) in &points {
            write_u16(buffer, (x - prev_x) as u16);
            prev_x = x;
        }
        for &(_, y) in &points {
            write_u16(buffer, (y - prev_y) as u16);
            prev_y = y;
        }
        if buffer.len() % 2 != 0 {
            buffer.push(0);
        }
    }

    fn write_composite_glyph(buffer: &mut Vec<u8>, component_ids: &[u16]) {
        const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
        const ARGS_ARE_XY_VALUES: u16 = 0x0002;
        const MORE_COMPONENTS: u16 = 0x0020;

        write_u16(buffer, u16::MAX); // numberOfContours = -1
        for coord in [0_u16, 0, 750, 750] {
            write_u16(buffer, coord);
        }
        for (i, &glyph_id) in component_ids.iter().enumerate() {
            let mut flags = ARG_1_AND_2_ARE_WORDS | ARGS_ARE_XY_VALUES;
            if i + 1 < component_ids.len() {
                flags |= MORE_COMPONENTS;
            }
            write_u16(buffer, flags);
            write_u16(buffer, glyph_id);
            write_u16(buffer, 0); // dx
            write_u16(buffer, u16::try_from(i * 100).unwrap_or(0)); // dy
        }
    }

    fn cmap(glyph_ids: &BTreeMap<char, u16>) -> Vec<u8> {
        let has_supplementary = glyph_ids.keys().any(|&ch| u32::from(ch) > 0xffff);
        let bmp: Vec<(u16, u16)> = glyph_ids
            .iter()
            .filter_map(|(&ch, &id)| Some((u16::try_from(u32::from(ch)).ok()?, id)))
            .filter(|&(code, _)| code != u16::MAX)
            .collect();

        let mut format4 = vec![];
        let segment_count = u16::try_from(bmp.len() + 1).expect("too many segments");
        write_u16(&mut format4, 4);
        write_u16(&mut format4, 16 + 8 * segment_count);
        write_u16(&mut format4, 0); // language
        write_u16(&mut format4, segment_count * 2);
        let entry_selector = segment_count.ilog2();
        let search_range = 2_u16 << entry_selector;
        write_u16(&mut format4, search_range);
        write_u16(&mut format4, u16::try_from(entry_selector).unwrap_or(0));
        write_u16(&mut format4, segment_count * 2 - search_range);
        // One segment per char keeps the builder simple; real fonts merge runs.
        let sentinel = (u16::MAX, 1); // maps 0xffff to the missing glyph
        let segments: Vec<(u16, u16)> = bmp
            .iter()
            .map(|&(code, id)| (code, id.wrapping_sub(code)))
            .chain([sentinel])
            .collect();
        for &(code, _) in &segments {
            write_u16(&mut format4, code); // end code
        }
        write_u16(&mut format4, 0); // reserved
        for &(code, _) in &segments {
            write_u16(&mut format4, code); // start code
        }
        for &(_, delta) in &segments {
            write_u16(&mut format4, delta);
        }
        for _ in &segments {
            write_u16(&mut format4, 0); // id range offset
        }

        let mut format12 = vec![];
        if has_supplementary {
            let group_count = u32::try_from(glyph_ids.len()).expect("too many groups");
            write_u16(&mut format12, 12);
            write_u16(&mut format12, 0);
            write_u32(&mut format12, 16 + 12 * group_count);
            write_u32(&mut format12, 0); // language
            write_u32(&mut format12, group_count);
            for (&ch, &id) in glyph_ids {
                write_u32(&mut format12, ch.into());
                write_u32(&mut format12, ch.into());
                write_u32(&mut format12, id.into());
            }
        }

        let record_count: u16 = if has_supplementary { 2 } else { 1 };
        let mut cmap = vec![];
        write_u16(&mut cmap, 0); // version
        write_u16(&mut cmap, record_count);
        let format4_offset = 4 + 8 * u32::from(record_count);
        write_u16(&mut cmap, 3);
        write_u16(&mut cmap, 1);
        write_u32(&mut cmap, format4_offset);
        if has_supplementary {
            write_u16(&mut cmap, 3);
            write_u16(&mut cmap, 10);
            write_u32(
                &mut cmap,
                format4_offset + u32::try_from(format4.len()).expect("cmap overflow"),
            );
        }
        cmap.extend(format4);
        cmap.extend(format12);
        cmap
    }

    fn head() -> Vec<u8> {
        let mut head = vec![];
        write_u32(&mut head, 0x_0001_0000); // version
        write_u32(&mut head, 0x_0001_0000); // fontRevision
        write_u32(&mut head, 0); // checksumAdjustment
        write_u32(&mut head, 0x_5f0f_3cf5); // magicNumber
        write_u16(&mut head, 0x000b); // flags
        write_u16(&mut head, Self::UNITS_PER_EM);
        head.extend([0_u8; 16]); // created, modified
        for coord in [0_u16, 0, 800, 800] {
            write_u16(&mut head, coord);
        }
        write_u16(&mut head, 0); // macStyle
        write_u16(&mut head, 8); // lowestRecPPEM
        write_u16(&mut head, 2); // fontDirectionHint
        write_u16(&mut head, 1); // indexToLocFormat: long
        write_u16(&mut head, 0); // glyphDataFormat
        head
    }

    fn hhea(glyph_count: u16) -> Vec<u8> {
        let mut hhea = vec![];
        write_u32(&mut hhea, 0x_0001_0000);
        write_u16(&mut hhea, 800); // ascender
        write_u16(&mut hhea, 0_u16.wrapping_sub(200)); // descender
        write_u16(&mut hhea, 0); // lineGap
        write_u16(&mut hhea, 1_000); // advanceWidthMax
        for _ in 0..3 {
            write_u16(&mut hhea, 0); // minLeftSideBearing, minRightSideBearing, xMaxExtent
        }
        write_u16(&mut hhea, 1); // caretSlopeRise
        for _ in 0..7 {
            write_u16(&mut hhea, 0); // caretSlopeRun, caretOffset, reserved, metricDataFormat
        }
        write_u16(&mut hhea, glyph_count);
        hhea
    }

    fn maxp(glyph_count: u16) -> Vec<u8> {
        let mut maxp = vec![];
        write_u32(&mut maxp, 0x_0001_0000);
        write_u16(&mut maxp, glyph_count);
        let maximums = [40_u16, 1, 40, 1, 2, 0, 0, 0, 0, 0, 0, 4, 1];
        for value in maximums {
            write_u16(&mut maxp, value);
        }
        maxp
    }

    fn name() -> Vec<u8> {
        let mut name = vec![];
        write_u16(&mut name, 0); // format
        write_u16(&mut name, 0); // count
        write_u16(&mut name, 6); // storage offset
        name
    }

    fn os2() -> Vec<u8> {
        let mut os2 = vec![];
        write_u16(&mut os2, 0); // version
        write_u16(&mut os2, 500); // xAvgCharWidth
        write_u16(&mut os2, 400); // usWeightClass
        write_u16(&mut os2, 5); // usWidthClass
        os2.resize(78, 0);
        os2
    }

    fn post() -> Vec<u8> {
        let mut post = vec![];
        write_u32(&mut post, 0x_0003_0000);
        post.resize(Font::POST_HEADER_LEN, 0);
        post
    }

    fn assemble(tables: &[(TableTag, Vec<u8>)]) -> Vec<u8> {
        let table_count = u16::try_from(tables.len()).expect("too many tables");
        let mut font = vec![];
        write_u32(&mut font, Font::SFNT_VERSION);
        write_u16(&mut font, table_count);
        let entry_selector = table_count.ilog2();
        let search_range = 16_u16 << entry_selector;
        write_u16(&mut font, search_range);
        write_u16(&mut font, u16::try_from(entry_selector).unwrap_or(0));
        write_u16(&mut font, table_count * 16 - search_range);

        let mut offset = 12 + 16 * tables.len();
        for (tag, data) in tables {
            font.extend_from_slice(tag.as_bytes());
            write_u32(&mut font, Font::checksum(data));
            write_u32(&mut font, u32::try_from(offset).expect("font overflow"));
            write_u32(&mut font, u32::try_from(data.len()).expect("font overflow"));
            offset += data.len().next_multiple_of(4);
        }
        for (_, data) in tables {
            font.extend_from_slice(data);
            font.resize(font.len().next_multiple_of(4), 0);
        }
        font
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_chars;

    #[test]
    fn synthetic_font_is_readable() {
        let raw = SyntheticFont::new().chars(' '..='~').chars(['中', '文']).build();
        let font = Font::new(&raw).unwrap();
        assert_eq!(font.glyph_count(), 98);
        assert_eq!(read_chars(&raw).unwrap().len(), 97);
        for (i, ch) in (' '..='~').enumerate() {
            assert_eq!(usize::from(font.map_char(ch).unwrap()), i + 1);
        }
    }
}
