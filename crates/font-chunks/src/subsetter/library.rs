//! In-process subsetting with `font-subset`.

use std::collections::BTreeSet;

use font_subset::{Font, FontSubset};

use super::{OutputFormat, Subsetter};
use crate::errors::SubsetError;

/// In-process subsetter. Supports fonts with TrueType outlines only.
///
/// Layout tables (`GSUB`, `GPOS` etc.) are never retained, so the layout feature
/// exclusion list does not apply to this backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibrarySubsetter;

impl Subsetter for LibrarySubsetter {
    fn subset(
        &self,
        font: &[u8],
        chars: &BTreeSet<char>,
        format: OutputFormat,
    ) -> Result<Vec<u8>, SubsetError> {
        let font = Font::new(font)?;
        let subset = FontSubset::new(font, chars)?;
        Ok(match format {
            OutputFormat::Woff2 => subset.to_woff2(),
            OutputFormat::TrueType => subset.to_truetype(),
        })
    }
}
