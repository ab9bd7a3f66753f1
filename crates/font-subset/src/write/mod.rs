//! Logic for serializing `FontSubset`s in OpenType and WOFF2 formats.

use core::iter;

use crate::{
    font::{CmapTable, Font},
    FontSubset, TableTag,
};

mod brotli;
mod tables;

pub(crate) fn write_u16(buffer: &mut Vec<u8>, value: u16) {
    buffer.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn write_u32(buffer: &mut Vec<u8>, value: u32) {
    buffer.extend_from_slice(&value.to_be_bytes());
}

fn pad_to_4_bytes(buffer: &mut Vec<u8>) {
    let misalignment = buffer.len() % 4;
    if misalignment != 0 {
        buffer.extend(iter::repeat_n(0_u8, 4 - misalignment));
    }
}

fn uint_base128_len(value: u32) -> usize {
    if value == 0 {
        1
    } else {
        value.ilog2() as usize / 7 + 1
    }
}

#[allow(clippy::cast_possible_truncation)] // intentional
fn write_uint_base128(buffer: &mut Vec<u8>, value: u32) {
    let len = uint_base128_len(value);
    for i in (1..len).rev() {
        buffer.push(0x80 | (value >> (7 * i)) as u8);
    }
    buffer.push((value & 0x7f) as u8);
}

impl FontSubset<'_> {
    /// Serializes this subset to the OpenType format.
    pub fn to_truetype(&self) -> Vec<u8> {
        self.to_writer().into_opentype()
    }

    /// Serializes this subset to the WOFF2 format.
    pub fn to_woff2(&self) -> Vec<u8> {
        self.to_writer().into_woff2()
    }

    fn to_writer(&self) -> FontWriter {
        let font = &self.font;
        let mut writer = FontWriter::default();

        let cmap = CmapTable::from_map(&self.char_map);
        writer.push(TableTag::CMAP, |buffer| cmap.write(buffer));
        for (tag, raw) in [(TableTag::CVT, font.cvt), (TableTag::FPGM, font.fpgm)] {
            if let Some(raw) = raw {
                writer.push(tag, |buffer| buffer.extend_from_slice(raw));
            }
        }

        let number_of_h_metrics = writer.push(TableTag::HMTX, |buffer| {
            tables::write_hmtx(&self.glyphs, buffer)
        });
        writer.push(TableTag::HHEA, |buffer| {
            tables::write_hhea(&font.hhea, number_of_h_metrics, buffer);
        });
        // The subset never has more glyphs than the original font.
        let glyph_count = u16::try_from(self.glyphs.len()).expect("too many glyphs");
        writer.push(TableTag::MAXP, |buffer| {
            tables::write_maxp(font.maxp, glyph_count, buffer);
        });
        writer.push(TableTag::NAME, |buffer| buffer.extend_from_slice(font.name));
        writer.push(TableTag::OS2, |buffer| buffer.extend_from_slice(font.os2));
        writer.push(TableTag::POST, |buffer| tables::write_post(font.post, buffer));
        if let Some(prep) = font.prep {
            writer.push(TableTag::PREP, |buffer| buffer.extend_from_slice(prep));
        }

        // WOFF2 requires `loca` to immediately follow `glyf`.
        let locations = writer.push(TableTag::GLYF, |buffer| {
            tables::write_glyf(&self.glyphs, &self.old_to_new_glyph_idx, buffer)
        });
        let loca_format = writer.push(TableTag::LOCA, |buffer| {
            tables::write_loca(&locations, buffer)
        });
        writer.push(TableTag::HEAD, |buffer| {
            tables::write_head(font.head, loca_format, buffer);
        });

        writer.patch_checksum_adjustment();
        writer
    }
}

#[derive(Debug, Clone)]
struct EncodedTable {
    tag: TableTag,
    /// Unpadded table data.
    data: Vec<u8>,
}

impl EncodedTable {
    fn padded_len(&self) -> usize {
        self.data.len().next_multiple_of(4)
    }

    fn len_u32(&self) -> u32 {
        u32::try_from(self.data.len()).expect("table length overflow")
    }
}

/// Tables in the order they are encoded in the WOFF2 data stream.
#[derive(Debug, Clone, Default)]
struct FontWriter {
    tables: Vec<EncodedTable>,
}

impl FontWriter {
    const SFNT_HEADER_LEN: usize = 12;
    const TABLE_RECORD_LEN: usize = 16;
    const WOFF2_HEADER_LEN: usize = 48;
    const WOFF2_SIGNATURE: u32 = 0x_774f_4632;

    fn push<T>(&mut self, tag: TableTag, with: impl FnOnce(&mut Vec<u8>) -> T) -> T {
        let mut data = vec![];
        let output = with(&mut data);
        self.tables.push(EncodedTable { tag, data });
        output
    }

    /// Table indices ordered by tag, as required for the sfnt table directory.
    fn sfnt_order(&self) -> Vec<usize> {
        let mut order: Vec<_> = (0..self.tables.len()).collect();
        order.sort_unstable_by_key(|&idx| self.tables[idx].tag);
        order
    }

    fn table_count(&self) -> u16 {
        // A subset contains at most 13 tables.
        u16::try_from(self.tables.len()).expect("too many tables")
    }

    fn sfnt_header(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(Self::SFNT_HEADER_LEN);
        write_u32(&mut buffer, Font::SFNT_VERSION);
        let table_count = self.table_count();
        write_u16(&mut buffer, table_count);
        let (search_range, entry_selector, range_shift) = tables::search_params(table_count, 16);
        write_u16(&mut buffer, search_range);
        write_u16(&mut buffer, entry_selector);
        write_u16(&mut buffer, range_shift);
        buffer
    }

    /// Lays out the sfnt table directory: `(table index, offset)` pairs ordered by tag.
    fn sfnt_layout(&self) -> (Vec<(usize, u32)>, usize) {
        let mut offset = Self::SFNT_HEADER_LEN + self.tables.len() * Self::TABLE_RECORD_LEN;
        let layout = self
            .sfnt_order()
            .into_iter()
            .map(|idx| {
                let table_offset = u32::try_from(offset).expect("font size overflow");
                offset += self.tables[idx].padded_len();
                (idx, table_offset)
            })
            .collect();
        (layout, offset)
    }

    fn write_table_record(&self, idx: usize, offset: u32, buffer: &mut Vec<u8>) {
        let table = &self.tables[idx];
        let mut checksum = Font::checksum(&table.data);
        if table.tag == TableTag::HEAD {
            // The `head` checksum is computed as if `checkSumAdjustment` were zero.
            let mut adjustment = [0_u8; 4];
            let range = Font::HEAD_CHECKSUM_OFFSET..Font::HEAD_CHECKSUM_OFFSET + 4;
            adjustment.copy_from_slice(&table.data[range]);
            checksum = checksum.wrapping_sub(u32::from_be_bytes(adjustment));
        }

        buffer.extend_from_slice(table.tag.as_bytes());
        write_u32(buffer, checksum);
        write_u32(buffer, offset);
        write_u32(buffer, table.len_u32());
    }

    /// Sets `checkSumAdjustment` in the `head` table so that the whole sfnt file
    /// sums up to the magic constant.
    fn patch_checksum_adjustment(&mut self) {
        let (layout, _) = self.sfnt_layout();
        let mut directory = self.sfnt_header();
        for &(idx, offset) in &layout {
            self.write_table_record(idx, offset, &mut directory);
        }
        let file_checksum = self
            .tables
            .iter()
            .fold(Font::checksum(&directory), |acc, table| {
                acc.wrapping_add(Font::checksum(&table.data))
            });
        let adjustment = Font::SFNT_CHECKSUM.wrapping_sub(file_checksum);

        let head = self
            .tables
            .iter_mut()
            .find(|table| table.tag == TableTag::HEAD)
            .expect("`head` table is always written");
        let range = Font::HEAD_CHECKSUM_OFFSET..Font::HEAD_CHECKSUM_OFFSET + 4;
        head.data[range].copy_from_slice(&adjustment.to_be_bytes());
    }

    fn into_opentype(self) -> Vec<u8> {
        let (layout, file_len) = self.sfnt_layout();
        let mut buffer = Vec::with_capacity(file_len);
        buffer.extend(self.sfnt_header());
        for &(idx, offset) in &layout {
            self.write_table_record(idx, offset, &mut buffer);
        }
        for &(idx, _) in &layout {
            buffer.extend_from_slice(&self.tables[idx].data);
            pad_to_4_bytes(&mut buffer);
        }
        debug_assert_eq!(buffer.len(), file_len);
        buffer
    }

    fn woff2_table_flags(tag: TableTag) -> u8 {
        /// Transform version 3 means "null transform" for `glyf` and `loca`.
        const NULL_TRANSFORM: u8 = 0b_1100_0000;

        match tag {
            TableTag::CMAP => 0,
            TableTag::HEAD => 1,
            TableTag::HHEA => 2,
            TableTag::HMTX => 3,
            TableTag::MAXP => 4,
            TableTag::NAME => 5,
            TableTag::OS2 => 6,
            TableTag::POST => 7,
            TableTag::CVT => 8,
            TableTag::FPGM => 9,
            TableTag::GLYF => 10 | NULL_TRANSFORM,
            TableTag::LOCA => 11 | NULL_TRANSFORM,
            TableTag::PREP => 12,
            _ => unreachable!("subsetting only produces well-known tables"),
        }
    }

    fn into_woff2(self) -> Vec<u8> {
        let (_, sfnt_len) = self.sfnt_layout();
        let compressed = self.compress_data();

        let mut directory = vec![];
        for table in &self.tables {
            directory.push(Self::woff2_table_flags(table.tag));
            write_uint_base128(&mut directory, table.len_u32());
        }
        let file_len = (Self::WOFF2_HEADER_LEN + directory.len() + compressed.len())
            .next_multiple_of(4);

        let mut buffer = Vec::with_capacity(file_len);
        write_u32(&mut buffer, Self::WOFF2_SIGNATURE);
        write_u32(&mut buffer, Font::SFNT_VERSION);
        write_u32(&mut buffer, u32::try_from(file_len).expect("file length overflow"));
        write_u16(&mut buffer, self.table_count());
        write_u16(&mut buffer, 0); // reserved
        write_u32(&mut buffer, u32::try_from(sfnt_len).expect("file length overflow"));
        write_u32(
            &mut buffer,
            u32::try_from(compressed.len()).expect("file length overflow"),
        );
        // WOFF version, metadata (offset, length, original length), private block (offset, length)
        for _ in 0..7 {
            write_u32(&mut buffer, 0);
        }
        debug_assert_eq!(buffer.len(), Self::WOFF2_HEADER_LEN);

        buffer.extend(directory);
        buffer.extend(compressed);
        // The file must be 4-byte aligned even without metadata or private blocks.
        pad_to_4_bytes(&mut buffer);
        debug_assert_eq!(buffer.len(), file_len);
        buffer
    }
}

#[cfg(test)]
mod tests {
    use std::{borrow::Cow, collections::BTreeSet};

    use allsorts::{binary::read::ReadScope, font_data::FontData, tables::FontTableProvider};
    use test_casing::{test_casing, Product};

    use super::*;
    use crate::tests::{TestCharSubset, TestFont, FONTS, SUBSET_CHARS};

    #[test]
    fn leb128_encoding() {
        let samples = &[
            (0_u32, &[0_u8] as &[u8]),
            (1, &[1]),
            (127, &[127]),
            (128, &[0x81, 0]),
            (129, &[0x81, 1]),
            (16_383, &[0xff, 0x7f]),
            (16_384, &[0x81, 0x80, 0]),
        ];
        for &(value, expected) in samples {
            assert_eq!(uint_base128_len(value), expected.len());
            let mut buffer = vec![];
            write_uint_base128(&mut buffer, value);
            assert_eq!(buffer, expected);
        }
    }

    #[test]
    fn opentype_checksum_adjustment_is_valid() {
        let raw = TestFont::latin().build();
        let font = Font::new(&raw).unwrap();
        let chars: BTreeSet<char> = ('a'..='z').collect();
        let ttf = FontSubset::new(font, &chars).unwrap().to_truetype();
        assert_eq!(Font::checksum(&ttf), Font::SFNT_CHECKSUM);
    }

    #[test_casing(6, Product((FONTS, SUBSET_CHARS)))]
    fn woff2_tables_are_written_correctly(font: TestFont, chars: TestCharSubset) {
        let raw = font.build();
        let font = Font::new(&raw).unwrap();
        let writer = FontSubset::new(font, &chars.into_set())
            .unwrap()
            .to_writer();
        let tables = writer.tables.clone();
        let woff2 = writer.into_woff2();
        assert_eq!(woff2.len() % 4, 0);

        let font_file = ReadScope::new(&woff2).read::<FontData>().unwrap();
        let font_provider = font_file.table_provider(0).unwrap();
        for table in &tables {
            println!("Testing table: {:?}", table.tag);
            let mut contents = font_provider
                .read_table_data(u32::from_be_bytes(table.tag.0))
                .unwrap();
            if table.tag == TableTag::HEAD {
                // Decoders are free to recompute the checksum adjustment.
                let mut patched = contents.into_owned();
                let range = Font::HEAD_CHECKSUM_OFFSET..Font::HEAD_CHECKSUM_OFFSET + 4;
                patched[range.clone()].copy_from_slice(&table.data[range]);
                contents = Cow::Owned(patched);
            }
            assert_eq!(contents.as_ref(), table.data.as_slice());
        }
    }
}
