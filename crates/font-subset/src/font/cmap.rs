//! `cmap` table processing.

use std::collections::BTreeSet;

use super::Cursor;
use crate::{
    errors::{MapError, ParseErrorKind},
    ParseError,
};

const SURROGATES: core::ops::RangeInclusive<u32> = 0xd800..=0xdfff;

#[derive(Debug, Clone, Copy)]
pub(crate) struct SegmentWithDelta {
    pub(crate) start_code: u16,
    pub(crate) end_code: u16,
    pub(crate) id_delta: u16,
    pub(crate) id_range_offset: u16,
}

/// Segment mapping to delta values (format 4) subtable of the `cmap` table.
#[derive(Debug, Clone)]
pub(crate) struct SegmentDeltas<'a> {
    pub(crate) segments: Vec<SegmentWithDelta>,
    pub(crate) glyph_id_array: &'a [u8],
}

impl<'a> SegmentDeltas<'a> {
    const FORMAT: u16 = 4;

    fn parse(mut cursor: Cursor<'a>) -> Result<Self, ParseError> {
        cursor.read_u16_checked(|format| {
            if format == Self::FORMAT {
                Ok(())
            } else {
                Err(ParseErrorKind::UnexpectedTableFormat(format))
            }
        })?;
        let body_len = cursor.read_u16_checked(|subtable_len| {
            usize::from(subtable_len)
                .checked_sub(4)
                .ok_or(ParseErrorKind::UnexpectedEof)
        })?;
        // Some fonts declare a truncated length for large subtables; clamp to the actual data.
        let body_len = body_len.min(cursor.bytes.len());
        cursor = cursor.range(0..body_len)?;

        cursor.skip(2)?; // language
        let segment_count = usize::from(cursor.read_u16()? / 2);
        cursor.skip(6)?; // searchRange, entrySelector, rangeShift

        let mut end_codes = cursor.split_at(2 * segment_count)?;
        cursor.skip(2)?; // reserved padding
        let mut start_codes = cursor.split_at(2 * segment_count)?;
        let mut id_deltas = cursor.split_at(2 * segment_count)?;
        let mut id_range_offsets = cursor.split_at(2 * segment_count)?;

        let mut segments = Vec::with_capacity(segment_count);
        for _ in 0..segment_count {
            segments.push(SegmentWithDelta {
                start_code: start_codes.read_u16()?,
                end_code: end_codes.read_u16()?,
                id_delta: id_deltas.read_u16()?,
                id_range_offset: id_range_offsets.read_u16()?,
            });
        }
        Ok(Self {
            segments,
            glyph_id_array: cursor.bytes,
        })
    }

    fn map_code(&self, code: u16) -> Result<u16, MapError> {
        let segment_idx = self
            .segments
            .binary_search_by_key(&code, |segment| segment.end_code)
            .unwrap_or_else(|pos| pos);
        let Some(segment) = self.segments.get(segment_idx) else {
            return Ok(0);
        };
        if segment.start_code > code {
            return Ok(0); // missing glyph
        }
        self.map_in_segment(segment_idx, segment, code)
    }

    fn map_in_segment(
        &self,
        segment_idx: usize,
        segment: &SegmentWithDelta,
        code: u16,
    ) -> Result<u16, MapError> {
        if segment.id_range_offset == 0 {
            return Ok(segment.id_delta.wrapping_add(code));
        }

        // `id_range_offset` is counted from its own position in the `idRangeOffsets` array;
        // shift it to count from the start of `glyphIdArray`.
        let byte_offset = 2 * segment_idx
            + usize::from(segment.id_range_offset)
            + 2 * usize::from(code - segment.start_code);
        let byte_offset = byte_offset
            .checked_sub(2 * self.segments.len())
            .ok_or(MapError::InvalidOffset(byte_offset))?;
        let glyph_id = self
            .glyph_id_array
            .get(byte_offset..byte_offset + 2)
            .ok_or(MapError::InvalidOffset(byte_offset))?;
        let glyph_id = u16::from_be_bytes([glyph_id[0], glyph_id[1]]);
        if glyph_id == 0 {
            Ok(0)
        } else {
            Ok(segment.id_delta.wrapping_add(glyph_id))
        }
    }

    fn map_char(&self, ch: char) -> Result<u16, MapError> {
        let code = u16::try_from(u32::from(ch)).map_err(|_| MapError::CharTooLarge)?;
        self.map_code(code)
    }

    fn collect_chars(&self, chars: &mut BTreeSet<char>) -> Result<(), MapError> {
        for (idx, segment) in self.segments.iter().enumerate() {
            if segment.start_code > segment.end_code {
                continue;
            }
            for code in segment.start_code..=segment.end_code {
                if code == u16::MAX {
                    break; // sentinel
                }
                let Some(ch) = char::from_u32(code.into()) else {
                    continue; // surrogates
                };
                if self.map_in_segment(idx, segment, code)? != 0 {
                    chars.insert(ch);
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SequentialMapGroup {
    pub(crate) start_char_code: u32,
    pub(crate) end_char_code: u32,
    pub(crate) start_glyph_id: u32,
}

impl SequentialMapGroup {
    /// Returns `None` if `code` precedes the group or the glyph ID overflows.
    pub(crate) fn glyph_id(&self, code: u32) -> Option<u32> {
        code.checked_sub(self.start_char_code)?
            .checked_add(self.start_glyph_id)
    }
}

/// Segmented coverage (format 12) subtable of the `cmap` table.
#[derive(Debug, Default, Clone)]
pub(crate) struct SegmentedCoverage {
    pub(crate) groups: Vec<SequentialMapGroup>,
}

impl SegmentedCoverage {
    const FORMAT: u16 = 12;

    fn parse(mut cursor: Cursor<'_>) -> Result<Self, ParseError> {
        cursor.read_u16_checked(|format| {
            if format == Self::FORMAT {
                Ok(())
            } else {
                Err(ParseErrorKind::UnexpectedTableFormat(format))
            }
        })?;
        cursor.skip(2)?; // reserved

        let body_len = cursor.read_u32_checked(|subtable_len| {
            (subtable_len as usize)
                .checked_sub(8)
                .ok_or(ParseErrorKind::UnexpectedEof)
        })?;
        cursor = cursor.range(0..body_len)?;

        cursor.skip(4)?; // language
        let group_count = cursor.read_u32()? as usize;
        // Each group takes 12 bytes; bail out early on bogus counts.
        let mut groups = Vec::with_capacity(group_count.min(cursor.bytes.len() / 12));
        for _ in 0..group_count {
            groups.push(SequentialMapGroup {
                start_char_code: cursor.read_u32()?,
                end_char_code: cursor.read_u32()?,
                start_glyph_id: cursor.read_u32()?,
            });
        }
        Ok(Self { groups })
    }

    fn map_char(&self, ch: char) -> u16 {
        let code = u32::from(ch);
        let group_idx = self
            .groups
            .binary_search_by_key(&code, |group| group.end_char_code)
            .unwrap_or_else(|pos| pos);
        let Some(group) = self.groups.get(group_idx) else {
            return 0; // `code` exceeds `end_char_code` of the last group
        };
        if group.start_char_code > code {
            return 0; // missing glyph
        }
        group
            .glyph_id(code)
            .and_then(|glyph_id| u16::try_from(glyph_id).ok())
            .unwrap_or(0)
    }

    fn collect_chars(&self, chars: &mut BTreeSet<char>) {
        for group in &self.groups {
            let end = group.end_char_code.min(u32::from(char::MAX));
            for code in group.start_char_code..=end {
                if SURROGATES.contains(&code) {
                    continue;
                }
                let Some(glyph_id) = group.glyph_id(code) else {
                    continue;
                };
                if glyph_id == 0 || glyph_id > u32::from(u16::MAX) {
                    continue;
                }
                if let Some(ch) = char::from_u32(code) {
                    chars.insert(ch);
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum CmapTable<'a> {
    Deltas(SegmentDeltas<'a>),
    Coverage(SegmentedCoverage),
}

impl<'a> CmapTable<'a> {
    pub(crate) const UNICODE_PLATFORM: u16 = 0;
    const WINDOWS_PLATFORM: u16 = 3;

    /// Checks whether an encoding record points to a Unicode subtable.
    fn is_unicode_encoding(platform_id: u16, encoding_id: u16) -> bool {
        match platform_id {
            Self::UNICODE_PLATFORM => encoding_id <= 4,
            Self::WINDOWS_PLATFORM => matches!(encoding_id, 1 | 10),
            _ => false,
        }
    }

    /// Selects a Unicode subtable, preferring full-repertoire (format 12) subtables over
    /// BMP-only (format 4) ones.
    pub(super) fn parse(mut cursor: Cursor<'a>) -> Result<Self, ParseError> {
        let table = cursor;
        cursor.read_u16_checked(|version| {
            if version == 0 {
                Ok(())
            } else {
                Err(ParseErrorKind::UnexpectedTableVersion(version.into()))
            }
        })?;

        let record_count = cursor.read_u16()?;
        let mut best: Option<(u16, Cursor<'a>)> = None;
        for _ in 0..record_count {
            let platform_id = cursor.read_u16()?;
            let encoding_id = cursor.read_u16()?;
            let offset = cursor.read_u32()? as usize;
            if !Self::is_unicode_encoding(platform_id, encoding_id) {
                continue;
            }

            let mut subtable = table;
            subtable.skip(offset)?;
            let format = subtable.read_u16()?;
            let is_better = match format {
                SegmentedCoverage::FORMAT => {
                    best.is_none_or(|(prev, _)| prev != SegmentedCoverage::FORMAT)
                }
                SegmentDeltas::FORMAT => best.is_none(),
                _ => false,
            };
            if is_better {
                let mut subtable = table;
                subtable.skip(offset)?;
                best = Some((format, subtable));
            }
        }

        match best {
            Some((SegmentedCoverage::FORMAT, subtable)) => {
                Ok(Self::Coverage(SegmentedCoverage::parse(subtable)?))
            }
            Some((_, subtable)) => Ok(Self::Deltas(SegmentDeltas::parse(subtable)?)),
            None => Err(cursor.err(ParseErrorKind::NoSupportedCmap)),
        }
    }

    pub(super) fn map_char(&self, ch: char) -> Result<u16, MapError> {
        match self {
            Self::Deltas(deltas) => match deltas.map_char(ch) {
                // Chars outside the BMP are not covered by a format 4 subtable.
                Err(MapError::CharTooLarge) => Ok(0),
                other => other,
            },
            Self::Coverage(coverage) => Ok(coverage.map_char(ch)),
        }
    }

    pub(super) fn chars(&self) -> Result<BTreeSet<char>, ParseError> {
        let mut chars = BTreeSet::new();
        match self {
            Self::Deltas(deltas) => deltas.collect_chars(&mut chars)?,
            Self::Coverage(coverage) => coverage.collect_chars(&mut chars),
        }
        Ok(chars)
    }
}
