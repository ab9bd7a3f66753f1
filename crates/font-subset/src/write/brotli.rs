//! Brotli compression of the WOFF2 table data stream.

use std::io::Write;

use super::FontWriter;

impl FontWriter {
    const BROTLI_QUALITY: u32 = 11;
    const BROTLI_WINDOW_BITS: u32 = 22;
    const BROTLI_BUFFER_SIZE: usize = 4_096;

    /// Compresses table data concatenated in the stream order. Unlike in the sfnt layout,
    /// tables are not padded in the WOFF2 data stream.
    pub(super) fn compress_data(&self) -> Vec<u8> {
        let total_len = self.tables.iter().map(|table| table.data.len()).sum::<usize>();
        let mut compressor = brotli::CompressorWriter::new(
            Vec::with_capacity(total_len / 2),
            Self::BROTLI_BUFFER_SIZE,
            Self::BROTLI_QUALITY,
            Self::BROTLI_WINDOW_BITS,
        );
        for table in &self.tables {
            compressor
                .write_all(&table.data)
                .expect("writing to `Vec` never fails");
        }
        compressor.into_inner()
    }
}
