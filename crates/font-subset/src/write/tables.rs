//! Serialization of individual tables for a `FontSubset`.

use core::mem;
use std::collections::BTreeMap;

use super::{write_u16, write_u32};
use crate::font::{
    CmapTable, Font, Glyph, GlyphWithMetrics, HheaTable, LocaFormat, SegmentDeltas,
    SegmentWithDelta, SegmentedCoverage, SequentialMapGroup,
};

impl CmapTable<'static> {
    /// Creates a table for the given map, which must be ordered by char.
    pub(super) fn from_map(map: &[(char, u16)]) -> Self {
        let coverage = Self::create_coverage(map);
        let fits_into_bmp = map
            .last()
            .is_none_or(|&(ch, _)| u32::from(ch) < u32::from(u16::MAX));
        if !fits_into_bmp {
            return Self::Coverage(coverage);
        }

        #[allow(clippy::cast_possible_truncation)] // checked by `fits_into_bmp`
        let segments = coverage.groups.iter().map(|group| {
            let start_code = group.start_char_code as u16;
            SegmentWithDelta {
                start_code,
                end_code: group.end_char_code as u16,
                id_delta: (group.start_glyph_id as u16).wrapping_sub(start_code),
                id_range_offset: 0,
            }
        });
        // The last segment must map 0xffff; `id_delta == 1` maps it to the missing glyph.
        let sentinel = SegmentWithDelta {
            start_code: u16::MAX,
            end_code: u16::MAX,
            id_delta: 1,
            id_range_offset: 0,
        };
        Self::Deltas(SegmentDeltas {
            segments: segments.chain([sentinel]).collect(),
            glyph_id_array: &[],
        })
    }

    fn create_coverage(map: &[(char, u16)]) -> SegmentedCoverage {
        let [(first_char, first_idx), rest @ ..] = map else {
            return SegmentedCoverage::default();
        };
        let mut groups = vec![];
        let mut current = SequentialMapGroup {
            start_char_code: (*first_char).into(),
            end_char_code: (*first_char).into(),
            start_glyph_id: (*first_idx).into(),
        };
        for &(ch, glyph_idx) in rest {
            let continues_group = u32::from(ch) == current.end_char_code + 1
                && current.glyph_id(ch.into()) == Some(glyph_idx.into());
            if continues_group {
                current.end_char_code += 1;
            } else {
                let next = SequentialMapGroup {
                    start_char_code: ch.into(),
                    end_char_code: ch.into(),
                    start_glyph_id: glyph_idx.into(),
                };
                groups.push(mem::replace(&mut current, next));
            }
        }
        groups.push(current);
        SegmentedCoverage { groups }
    }
}

impl CmapTable<'_> {
    pub(super) fn write(&self, buffer: &mut Vec<u8>) {
        const SUBTABLE_OFFSET: u32 = 12;

        write_u16(buffer, 0); // version
        write_u16(buffer, 1); // number of encoding records
        write_u16(buffer, Self::UNICODE_PLATFORM);
        write_u16(buffer, match self {
            Self::Deltas(_) => 3,   // Unicode BMP
            Self::Coverage(_) => 4, // Unicode full repertoire
        });
        write_u32(buffer, SUBTABLE_OFFSET);

        match self {
            Self::Deltas(deltas) => deltas.write(buffer),
            Self::Coverage(coverage) => coverage.write(buffer),
        }
    }
}

/// Computes `(searchRange, entrySelector, rangeShift)` for binary-searchable arrays.
pub(super) fn search_params(count: u16, item_size: u16) -> (u16, u16, u16) {
    let entry_selector = u16::try_from(count.max(1).ilog2()).unwrap_or(0);
    let search_range = item_size << entry_selector;
    let range_shift = (item_size * count).saturating_sub(search_range);
    (search_range, entry_selector, range_shift)
}

impl SegmentDeltas<'_> {
    fn write(&self, buffer: &mut Vec<u8>) {
        let segment_count = u16::try_from(self.segments.len()).expect("too many cmap segments");
        let subtable_len = 16 + 8 * self.segments.len() + self.glyph_id_array.len();

        write_u16(buffer, 4); // format
        write_u16(
            buffer,
            u16::try_from(subtable_len).expect("cmap subtable length overflow"),
        );
        write_u16(buffer, 0); // language
        write_u16(buffer, 2 * segment_count);
        let (search_range, entry_selector, range_shift) = search_params(segment_count, 2);
        write_u16(buffer, search_range);
        write_u16(buffer, entry_selector);
        write_u16(buffer, range_shift);

        let columns: [fn(&SegmentWithDelta) -> u16; 4] = [
            |segment| segment.end_code,
            |segment| segment.start_code,
            |segment| segment.id_delta,
            |segment| segment.id_range_offset,
        ];
        for (i, column) in columns.into_iter().enumerate() {
            if i == 1 {
                write_u16(buffer, 0); // reserved padding after end codes
            }
            for segment in &self.segments {
                write_u16(buffer, column(segment));
            }
        }
        buffer.extend_from_slice(self.glyph_id_array);
    }
}

impl SegmentedCoverage {
    fn write(&self, buffer: &mut Vec<u8>) {
        let subtable_len = 16 + 12 * self.groups.len();

        write_u16(buffer, 12); // format
        write_u16(buffer, 0); // reserved
        write_u32(
            buffer,
            u32::try_from(subtable_len).expect("cmap subtable length overflow"),
        );
        write_u32(buffer, 0); // language
        write_u32(
            buffer,
            u32::try_from(self.groups.len()).expect("too many cmap groups"),
        );
        for group in &self.groups {
            write_u32(buffer, group.start_char_code);
            write_u32(buffer, group.end_char_code);
            write_u32(buffer, group.start_glyph_id);
        }
    }
}

/// Writes `hmtx` data and returns `numberOfHMetrics`. Trailing glyphs sharing the same advance
/// only store their left side bearing.
pub(super) fn write_hmtx(glyphs: &[GlyphWithMetrics<'_>], buffer: &mut Vec<u8>) -> u16 {
    let mut metrics_count = glyphs.len();
    while metrics_count > 1 && glyphs[metrics_count - 2].advance == glyphs[metrics_count - 1].advance
    {
        metrics_count -= 1;
    }

    for (i, glyph) in glyphs.iter().enumerate() {
        if i < metrics_count {
            write_u16(buffer, glyph.advance);
        }
        write_u16(buffer, glyph.lsb);
    }
    // The number of glyphs in a subset never exceeds the number of glyphs in the original font.
    u16::try_from(metrics_count).expect("too many glyphs")
}

pub(super) fn write_hhea(hhea: &HheaTable<'_>, number_of_h_metrics: u16, buffer: &mut Vec<u8>) {
    buffer.extend_from_slice(&hhea.raw[..HheaTable::EXPECTED_LEN - 2]);
    write_u16(buffer, number_of_h_metrics);
}

pub(super) fn write_maxp(original: &[u8], glyph_count: u16, buffer: &mut Vec<u8>) {
    // Only `numGlyphs` (bytes 4..6) changes; the maximums stay valid for a subset.
    buffer.extend_from_slice(&original[..4]);
    write_u16(buffer, glyph_count);
    buffer.extend_from_slice(&original[6..]);
}

pub(super) fn write_post(original: &[u8], buffer: &mut Vec<u8>) {
    // Version 3.0 carries no glyph names, which would be invalidated by renumbering.
    write_u32(buffer, 0x_0003_0000);
    buffer.extend_from_slice(&original[4..Font::POST_HEADER_LEN]);
}

pub(super) fn write_head(original: &[u8], loca_format: LocaFormat, buffer: &mut Vec<u8>) {
    const LOCA_FORMAT_OFFSET: usize = 50;

    buffer.extend_from_slice(&original[..Font::HEAD_CHECKSUM_OFFSET]);
    write_u32(buffer, 0); // checksum adjustment is patched once the whole font is laid out
    buffer.extend_from_slice(&original[Font::HEAD_CHECKSUM_OFFSET + 4..LOCA_FORMAT_OFFSET]);
    write_u16(buffer, match loca_format {
        LocaFormat::Short => 0,
        LocaFormat::Long => 1,
    });
    buffer.extend_from_slice(&original[LOCA_FORMAT_OFFSET + 2..]);
}

/// Writes glyph data and returns glyph locations (one more than the number of glyphs).
pub(super) fn write_glyf(
    glyphs: &[GlyphWithMetrics<'_>],
    old_to_new_glyph_idx: &BTreeMap<u16, u16>,
    buffer: &mut Vec<u8>,
) -> Vec<usize> {
    let start = buffer.len();
    let mut locations = Vec::with_capacity(glyphs.len() + 1);
    locations.push(0);
    for glyph in glyphs {
        match &glyph.inner {
            Glyph::Empty => { /* no data */ }
            Glyph::Simple(raw) => buffer.extend_from_slice(raw),
            Glyph::Composite { raw, components } => {
                let glyph_start = buffer.len();
                buffer.extend_from_slice(raw);
                for component in components {
                    let new_idx = old_to_new_glyph_idx[&component.glyph_idx];
                    let pos = glyph_start + component.offset;
                    buffer[pos..pos + 2].copy_from_slice(&new_idx.to_be_bytes());
                }
            }
        }
        // Keep glyphs 2-byte aligned so that the short `loca` format stays available.
        if (buffer.len() - start) % 2 != 0 {
            buffer.push(0);
        }
        locations.push(buffer.len() - start);
    }
    locations
}

pub(super) fn write_loca(locations: &[usize], buffer: &mut Vec<u8>) -> LocaFormat {
    let fits_short = locations
        .last()
        .is_none_or(|&loc| loc <= usize::from(u16::MAX) * 2);
    if fits_short {
        for &loc in locations {
            write_u16(buffer, u16::try_from(loc / 2).expect("checked above"));
        }
        LocaFormat::Short
    } else {
        for &loc in locations {
            write_u32(buffer, u32::try_from(loc).expect("glyph location overflow"));
        }
        LocaFormat::Long
    }
}
