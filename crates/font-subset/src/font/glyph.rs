//! `Glyph` and related types.

use super::Cursor;
use crate::ParseError;

/// Glyph data from the `glyf` table.
///
/// Composite glyphs are kept as raw bytes together with the positions of their component
/// glyph indices, so that the indices can be renumbered without re-encoding other fields.
#[derive(Debug)]
pub(crate) enum Glyph<'a> {
    Empty,
    Simple(&'a [u8]),
    Composite {
        raw: &'a [u8],
        components: Vec<ComponentRef>,
    },
}

/// Reference from a composite glyph to one of its components.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ComponentRef {
    /// Offset of the big-endian glyph index in the raw glyph data.
    pub(crate) offset: usize,
    pub(crate) glyph_idx: u16,
}

impl<'a> Glyph<'a> {
    /// `numberOfContours` + bounding box.
    const HEADER_LEN: usize = 10;

    pub(super) fn new(raw: Cursor<'a>) -> Result<Self, ParseError> {
        if raw.bytes.is_empty() {
            return Ok(Self::Empty);
        }

        let mut cursor = raw;
        let number_of_contours = cursor.read_u16()?;
        if number_of_contours <= i16::MAX as u16 {
            return Ok(Self::Simple(raw.bytes));
        }

        cursor.skip(Self::HEADER_LEN - 2)?;
        let mut components = vec![];
        loop {
            let (component, has_more) = Self::read_component(&mut cursor, raw.bytes.len())?;
            components.push(component);
            if !has_more {
                break;
            }
        }
        Ok(Self::Composite {
            raw: raw.bytes,
            components,
        })
    }

    fn read_component(
        cursor: &mut Cursor<'_>,
        glyph_len: usize,
    ) -> Result<(ComponentRef, bool), ParseError> {
        const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
        const WE_HAVE_A_SCALE: u16 = 0x0008;
        const MORE_COMPONENTS: u16 = 0x0020;
        const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 0x0040;
        const WE_HAVE_A_TWO_BY_TWO: u16 = 0x0080;

        let flags = cursor.read_u16()?;
        let offset = glyph_len - cursor.bytes.len();
        let glyph_idx = cursor.read_u16()?;

        let args_len = if flags & ARG_1_AND_2_ARE_WORDS != 0 { 4 } else { 2 };
        let transform_len = if flags & WE_HAVE_A_SCALE != 0 {
            2
        } else if flags & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
            4
        } else if flags & WE_HAVE_A_TWO_BY_TWO != 0 {
            8
        } else {
            0
        };
        cursor.skip(args_len + transform_len)?;

        let component = ComponentRef { offset, glyph_idx };
        Ok((component, flags & MORE_COMPONENTS != 0))
    }

    /// Iterates over glyph indices of components (empty for non-composite glyphs).
    pub(crate) fn component_indices(&self) -> impl Iterator<Item = u16> + '_ {
        let components = match self {
            Self::Composite { components, .. } => components.as_slice(),
            Self::Empty | Self::Simple(_) => &[],
        };
        components.iter().map(|component| component.glyph_idx)
    }
}

/// [`Glyph`] together with metrics read from the `hmtx` table.
#[derive(Debug)]
pub(crate) struct GlyphWithMetrics<'a> {
    pub(crate) inner: Glyph<'a>,
    pub(crate) advance: u16,
    pub(crate) lsb: u16,
}
