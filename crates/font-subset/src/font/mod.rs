//! OpenType parsing logic.

use core::{fmt, ops};
use std::collections::BTreeSet;

pub(crate) use self::{
    cmap::{CmapTable, SegmentDeltas, SegmentWithDelta, SegmentedCoverage, SequentialMapGroup},
    glyph::{ComponentRef, Glyph, GlyphWithMetrics},
};
use crate::{errors::ParseErrorKind, ParseError};

mod cmap;
mod glyph;

/// Four-byte tag of an OpenType table (e.g., `cmap`).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableTag(pub(crate) [u8; 4]);

impl fmt::Debug for TableTag {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "TableTag({self})")
    }
}

impl fmt::Display for TableTag {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &byte in &self.0 {
            let ch = if byte.is_ascii_graphic() || byte == b' ' {
                char::from(byte)
            } else {
                '?'
            };
            fmt::Write::write_char(formatter, ch)?;
        }
        Ok(())
    }
}

impl TableTag {
    pub(crate) const CFF: Self = Self(*b"CFF ");
    pub(crate) const CFF2: Self = Self(*b"CFF2");
    /// Character to glyph mapping.
    pub const CMAP: Self = Self(*b"cmap");
    /// Control value table.
    pub const CVT: Self = Self(*b"cvt ");
    /// Font program.
    pub const FPGM: Self = Self(*b"fpgm");
    /// Glyph data.
    pub const GLYF: Self = Self(*b"glyf");
    /// Font header.
    pub const HEAD: Self = Self(*b"head");
    /// Horizontal header.
    pub const HHEA: Self = Self(*b"hhea");
    /// Horizontal metrics.
    pub const HMTX: Self = Self(*b"hmtx");
    /// Index to location.
    pub const LOCA: Self = Self(*b"loca");
    /// Maximum profile.
    pub const MAXP: Self = Self(*b"maxp");
    /// Naming table.
    pub const NAME: Self = Self(*b"name");
    /// OS/2 and Windows-specific metrics.
    pub const OS2: Self = Self(*b"OS/2");
    /// PostScript information.
    pub const POST: Self = Self(*b"post");
    /// Control value program.
    pub const PREP: Self = Self(*b"prep");

    /// Returns the raw bytes of this tag.
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

/// Read-only view into font data that tracks the offset for error reporting.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Cursor<'a> {
    pub(crate) bytes: &'a [u8],
    offset: usize,
    table: Option<TableTag>,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            offset: 0,
            table: None,
        }
    }

    fn for_table(tag: TableTag, bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            offset: 0,
            table: Some(tag),
        }
    }

    pub(crate) fn err(&self, kind: ParseErrorKind) -> ParseError {
        ParseError {
            kind,
            offset: self.offset,
            table: self.table,
        }
    }

    fn check_len(&self, len: usize) -> Result<(), ParseError> {
        if self.bytes.len() < len {
            Err(self.err(ParseErrorKind::UnexpectedEof))
        } else {
            Ok(())
        }
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<(), ParseError> {
        self.check_len(len)?;
        self.bytes = &self.bytes[len..];
        self.offset += len;
        Ok(())
    }

    /// Splits off the first `len` bytes and advances this cursor past them.
    pub(crate) fn split_at(&mut self, len: usize) -> Result<Self, ParseError> {
        self.check_len(len)?;
        let (head, tail) = self.bytes.split_at(len);
        let head = Self {
            bytes: head,
            offset: self.offset,
            table: self.table,
        };
        self.bytes = tail;
        self.offset += len;
        Ok(head)
    }

    pub(crate) fn range(&self, range: ops::Range<usize>) -> Result<Self, ParseError> {
        let bytes = self.bytes.get(range.clone()).ok_or_else(|| {
            self.err(ParseErrorKind::RangeOutOfBounds {
                range: range.clone(),
                len: self.bytes.len(),
            })
        })?;
        Ok(Self {
            bytes,
            offset: self.offset + range.start,
            table: self.table,
        })
    }

    pub(crate) fn read_byte_array<const N: usize>(&mut self) -> Result<[u8; N], ParseError> {
        let head = self.split_at(N)?;
        let mut array = [0_u8; N];
        array.copy_from_slice(head.bytes);
        Ok(array)
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, ParseError> {
        self.read_byte_array().map(u16::from_be_bytes)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, ParseError> {
        self.read_byte_array().map(u32::from_be_bytes)
    }

    /// Reads a `u16` value and checks it. The error (if any) points to the start of the value.
    pub(crate) fn read_u16_checked<T>(
        &mut self,
        check: impl FnOnce(u16) -> Result<T, ParseErrorKind>,
    ) -> Result<T, ParseError> {
        let start = *self;
        let value = self.read_u16()?;
        check(value).map_err(|kind| start.err(kind))
    }

    /// Reads a `u32` value and checks it. The error (if any) points to the start of the value.
    pub(crate) fn read_u32_checked<T>(
        &mut self,
        check: impl FnOnce(u32) -> Result<T, ParseErrorKind>,
    ) -> Result<T, ParseError> {
        let start = *self;
        let value = self.read_u32()?;
        check(value).map_err(|kind| start.err(kind))
    }
}

/// Table directory of an sfnt font.
#[derive(Debug)]
struct TableDirectory<'a> {
    sfnt_version: u32,
    tables: Vec<(TableTag, &'a [u8])>,
}

impl<'a> TableDirectory<'a> {
    fn parse(raw: &'a [u8]) -> Result<Self, ParseError> {
        let mut cursor = Cursor::new(raw);
        let sfnt_version = cursor.read_u32_checked(|version| match version {
            Font::SFNT_VERSION | Font::APPLE_SFNT_VERSION | Font::CFF_SFNT_VERSION => Ok(version),
            _ => Err(ParseErrorKind::UnexpectedFontVersion(version)),
        })?;
        let table_count = cursor.read_u16()?;
        cursor.skip(6)?; // searchRange, entrySelector, rangeShift

        let file = Cursor::new(raw);
        let tables = (0..table_count).map(|_| {
            let tag = TableTag(cursor.read_byte_array()?);
            cursor.skip(4)?; // checksum
            let offset = cursor.read_u32()? as usize;
            let len = cursor.read_u32()? as usize;
            let bytes = file.range(offset..offset.saturating_add(len))?.bytes;
            Ok((tag, bytes))
        });
        Ok(Self {
            sfnt_version,
            tables: tables.collect::<Result<_, ParseError>>()?,
        })
    }

    fn get(&self, tag: TableTag) -> Option<&'a [u8]> {
        self.tables
            .iter()
            .find_map(|&(table_tag, bytes)| (table_tag == tag).then_some(bytes))
    }

    fn require(&self, tag: TableTag) -> Result<Cursor<'a>, ParseError> {
        let bytes = self.get(tag).ok_or_else(|| ParseError::missing_table(tag))?;
        Ok(Cursor::for_table(tag, bytes))
    }

    fn require_len(&self, tag: TableTag, min_len: usize) -> Result<&'a [u8], ParseError> {
        let cursor = self.require(tag)?;
        if cursor.bytes.len() < min_len {
            return Err(cursor.err(ParseErrorKind::UnexpectedTableLen {
                expected: min_len,
                actual: cursor.bytes.len(),
            }));
        }
        Ok(cursor.bytes)
    }

    fn has_cff_outlines(&self) -> bool {
        self.sfnt_version == Font::CFF_SFNT_VERSION
            || (self.get(TableTag::GLYF).is_none()
                && (self.get(TableTag::CFF).is_some() || self.get(TableTag::CFF2).is_some()))
    }
}

/// Reads all chars mapped to a non-default glyph by the font `cmap` table.
///
/// Unlike [`Font::new()`], this only requires the table directory and the `cmap` table
/// to be readable, so it works for CFF-flavored fonts as well.
///
/// # Errors
///
/// Returns an error if the table directory or the `cmap` table cannot be parsed,
/// or if the `cmap` table has no supported Unicode subtable.
pub fn read_chars(raw: &[u8]) -> Result<BTreeSet<char>, ParseError> {
    let directory = TableDirectory::parse(raw)?;
    let cmap = CmapTable::parse(directory.require(TableTag::CMAP)?)?;
    cmap.chars()
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct HheaTable<'a> {
    pub(crate) raw: &'a [u8],
    pub(crate) number_of_h_metrics: u16,
}

impl<'a> HheaTable<'a> {
    pub(crate) const EXPECTED_LEN: usize = 36;

    fn parse(cursor: Cursor<'a>) -> Result<Self, ParseError> {
        if cursor.bytes.len() != Self::EXPECTED_LEN {
            return Err(cursor.err(ParseErrorKind::UnexpectedTableLen {
                expected: Self::EXPECTED_LEN,
                actual: cursor.bytes.len(),
            }));
        }
        let mut tail = cursor;
        tail.skip(Self::EXPECTED_LEN - 2)?;
        Ok(Self {
            raw: cursor.bytes,
            number_of_h_metrics: tail.read_u16()?,
        })
    }
}

#[derive(Debug)]
pub(crate) struct HmtxTable<'a> {
    raw: Cursor<'a>,
    number_of_h_metrics: u16,
}

impl HmtxTable<'_> {
    fn advance_and_lsb(&self, glyph_idx: u16) -> Result<(u16, u16), ParseError> {
        if glyph_idx < self.number_of_h_metrics {
            let mut cursor = self.raw;
            cursor.skip(usize::from(glyph_idx) * 4)?;
            Ok((cursor.read_u16()?, cursor.read_u16()?))
        } else {
            // Glyphs past `number_of_h_metrics` share the last advance.
            let last_metric = usize::from(self.number_of_h_metrics.saturating_sub(1));
            let mut cursor = self.raw;
            cursor.skip(last_metric * 4)?;
            let advance = cursor.read_u16()?;

            let mut cursor = self.raw;
            cursor.skip(
                usize::from(self.number_of_h_metrics) * 4
                    + usize::from(glyph_idx - self.number_of_h_metrics) * 2,
            )?;
            Ok((advance, cursor.read_u16()?))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LocaFormat {
    Short,
    Long,
}

#[derive(Debug)]
pub(crate) struct LocaTable<'a> {
    format: LocaFormat,
    raw: Cursor<'a>,
}

impl<'a> LocaTable<'a> {
    fn new(format: LocaFormat, glyph_count: u16, raw: Cursor<'a>) -> Result<Self, ParseError> {
        let bytes_per_offset = match format {
            LocaFormat::Short => 2,
            LocaFormat::Long => 4,
        };
        let expected = bytes_per_offset * (usize::from(glyph_count) + 1);
        // Some fonts have trailing bytes in `loca`; only a shorter table is an error.
        if raw.bytes.len() < expected {
            return Err(raw.err(ParseErrorKind::UnexpectedTableLen {
                expected,
                actual: raw.bytes.len(),
            }));
        }
        Ok(Self { format, raw })
    }

    fn glyph_range(&self, glyph_idx: u16) -> Result<ops::Range<usize>, ParseError> {
        let idx = usize::from(glyph_idx);
        let mut cursor = self.raw;
        Ok(match self.format {
            LocaFormat::Short => {
                cursor.skip(idx * 2)?;
                let start = usize::from(cursor.read_u16()?) * 2;
                let end = usize::from(cursor.read_u16()?) * 2;
                start..end
            }
            LocaFormat::Long => {
                cursor.skip(idx * 4)?;
                let start = cursor.read_u32()? as usize;
                let end = cursor.read_u32()? as usize;
                start..end
            }
        })
    }
}

/// OpenType font with TrueType outlines.
#[derive(Debug)]
pub struct Font<'a> {
    pub(crate) cmap: CmapTable<'a>,
    pub(crate) head: &'a [u8],
    pub(crate) hhea: HheaTable<'a>,
    pub(crate) hmtx: HmtxTable<'a>,
    pub(crate) maxp: &'a [u8],
    pub(crate) name: &'a [u8],
    pub(crate) os2: &'a [u8],
    pub(crate) post: &'a [u8],
    pub(crate) loca: LocaTable<'a>,
    pub(crate) glyf: Cursor<'a>,
    pub(crate) cvt: Option<&'a [u8]>,
    pub(crate) fpgm: Option<&'a [u8]>,
    pub(crate) prep: Option<&'a [u8]>,
    glyph_count: u16,
}

impl<'a> Font<'a> {
    pub(crate) const SFNT_VERSION: u32 = 0x_0001_0000;
    const APPLE_SFNT_VERSION: u32 = u32::from_be_bytes(*b"true");
    const CFF_SFNT_VERSION: u32 = u32::from_be_bytes(*b"OTTO");
    pub(crate) const HEAD_CHECKSUM_OFFSET: usize = 8;
    pub(crate) const SFNT_CHECKSUM: u32 = 0x_b1b0_afba;
    const HEAD_LEN: usize = 54;
    const LOCA_FORMAT_OFFSET: usize = 50;
    pub(crate) const POST_HEADER_LEN: usize = 32;

    /// Parses a font from the provided bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the font is malformed, misses one of required tables,
    /// or uses CFF outlines.
    pub fn new(raw: &'a [u8]) -> Result<Self, ParseError> {
        let directory = TableDirectory::parse(raw)?;
        if directory.has_cff_outlines() {
            return Err(Cursor::new(raw).err(ParseErrorKind::UnsupportedOutlines));
        }

        let head = directory.require_len(TableTag::HEAD, Self::HEAD_LEN)?;
        let loca_format = Self::parse_loca_format(directory.require(TableTag::HEAD)?)?;
        let maxp = directory.require_len(TableTag::MAXP, 6)?;
        let glyph_count = Self::parse_glyph_count(directory.require(TableTag::MAXP)?)?;
        let loca = LocaTable::new(loca_format, glyph_count, directory.require(TableTag::LOCA)?)?;
        let hhea = HheaTable::parse(directory.require(TableTag::HHEA)?)?;
        let hmtx = HmtxTable {
            raw: directory.require(TableTag::HMTX)?,
            number_of_h_metrics: hhea.number_of_h_metrics,
        };

        Ok(Self {
            cmap: CmapTable::parse(directory.require(TableTag::CMAP)?)?,
            head,
            hhea,
            hmtx,
            maxp,
            name: directory.require(TableTag::NAME)?.bytes,
            os2: directory.require(TableTag::OS2)?.bytes,
            post: directory.require_len(TableTag::POST, Self::POST_HEADER_LEN)?,
            loca,
            glyf: directory.require(TableTag::GLYF)?,
            cvt: directory.get(TableTag::CVT),
            fpgm: directory.get(TableTag::FPGM),
            prep: directory.get(TableTag::PREP),
            glyph_count,
        })
    }

    fn parse_loca_format(mut head: Cursor<'_>) -> Result<LocaFormat, ParseError> {
        head.read_u32_checked(|version| {
            if version == 0x_0001_0000 {
                Ok(())
            } else {
                Err(ParseErrorKind::UnexpectedTableVersion(version))
            }
        })?;
        head.skip(Self::LOCA_FORMAT_OFFSET - 4)?;
        head.read_u16_checked(|format| match format {
            0 => Ok(LocaFormat::Short),
            1 => Ok(LocaFormat::Long),
            _ => Err(ParseErrorKind::UnexpectedLocaFormat(format)),
        })
    }

    fn parse_glyph_count(mut maxp: Cursor<'_>) -> Result<u16, ParseError> {
        maxp.read_u32_checked(|version| match version {
            0x_0000_5000 | 0x_0001_0000 => Ok(()),
            _ => Err(ParseErrorKind::UnexpectedTableVersion(version)),
        })?;
        maxp.read_u16()
    }

    /// Returns the number of glyphs in this font.
    pub fn glyph_count(&self) -> u16 {
        self.glyph_count
    }

    /// Maps a char to the glyph index. Chars not covered by the font map to glyph 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the `cmap` data is malformed.
    pub fn map_char(&self, ch: char) -> Result<u16, ParseError> {
        Ok(self.cmap.map_char(ch)?)
    }

    /// Returns all chars mapped to a non-default glyph in this font.
    ///
    /// # Errors
    ///
    /// Returns an error if the `cmap` data is malformed.
    pub fn chars(&self) -> Result<BTreeSet<char>, ParseError> {
        self.cmap.chars()
    }

    pub(crate) fn glyph(&self, glyph_idx: u16) -> Result<GlyphWithMetrics<'a>, ParseError> {
        if glyph_idx >= self.glyph_count {
            return Err(ParseError::missing_glyph(glyph_idx));
        }
        let range = self.loca.glyph_range(glyph_idx)?;
        let raw = self.glyf.range(range)?;
        let inner = Glyph::new(raw)?;
        let (advance, lsb) = self.hmtx.advance_and_lsb(glyph_idx)?;
        Ok(GlyphWithMetrics {
            inner,
            advance,
            lsb,
        })
    }

    /// Computes the OpenType checksum of `data`, zero-padding it to a 4-byte boundary.
    pub(crate) fn checksum(data: &[u8]) -> u32 {
        let mut chunks = data.chunks_exact(4);
        let mut sum = chunks.by_ref().fold(0_u32, |acc, chunk| {
            let mut word = [0_u8; 4];
            word.copy_from_slice(chunk);
            acc.wrapping_add(u32::from_be_bytes(word))
        });
        let remainder = chunks.remainder();
        if !remainder.is_empty() {
            let mut word = [0_u8; 4];
            word[..remainder.len()].copy_from_slice(remainder);
            sum = sum.wrapping_add(u32::from_be_bytes(word));
        }
        sum
    }
}
