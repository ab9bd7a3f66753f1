use core::{fmt, ops};

use crate::TableTag;

/// Kind of a font [`ParseError`].
#[derive(Debug)]
#[non_exhaustive]
pub enum ParseErrorKind {
    /// Unexpected end of the font data.
    UnexpectedEof,
    /// Unexpected sfnt version.
    UnexpectedFontVersion(u32),
    /// The font uses CFF outlines, which cannot be subset in process.
    UnsupportedOutlines,
    /// Missing required font table (e.g., `head`).
    MissingTable,
    /// No supported subtable in the `cmap` table.
    NoSupportedCmap,
    /// Range inferred from the table data is out of bounds.
    RangeOutOfBounds {
        /// Inferred range.
        range: ops::Range<usize>,
        /// Length of the indexed data.
        len: usize,
    },
    /// Unexpected table version.
    UnexpectedTableVersion(u32),
    /// Unexpected table length.
    UnexpectedTableLen {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },
    /// Unexpected table format (e.g., for a `cmap` subtable).
    UnexpectedTableFormat(u16),
    /// Unexpected `indexToLocFormat` value in the `head` table.
    UnexpectedLocaFormat(u16),
    /// Glyph referenced by the `cmap` or a composite glyph is not present in the font.
    MissingGlyph(u16),
    /// Error mapping a char to a glyph.
    Map(MapError),
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => formatter.write_str("unexpected end of the font data"),
            Self::UnexpectedFontVersion(version) => {
                write!(formatter, "unexpected sfnt version (0x{version:08x})")
            }
            Self::UnsupportedOutlines => {
                formatter.write_str("font uses CFF outlines; only `glyf` outlines are supported")
            }
            Self::MissingTable => formatter.write_str("missing required font table"),
            Self::NoSupportedCmap => {
                formatter.write_str("no supported Unicode subtable in the `cmap` table")
            }
            Self::RangeOutOfBounds { range, len } => write!(
                formatter,
                "range ({range:?}) inferred from the table data is out of bounds (..{len})"
            ),
            Self::UnexpectedTableVersion(val) => {
                write!(formatter, "unexpected table version ({val})")
            }
            Self::UnexpectedTableLen { expected, actual } => write!(
                formatter,
                "unexpected table length: expected {expected}, got {actual}"
            ),
            Self::UnexpectedTableFormat(val) => {
                write!(formatter, "unexpected table format ({val})")
            }
            Self::UnexpectedLocaFormat(val) => {
                write!(formatter, "unexpected `loca` format ({val})")
            }
            Self::MissingGlyph(idx) => write!(formatter, "glyph #{idx} is missing"),
            Self::Map(err) => write!(formatter, "failed mapping char: {err}"),
        }
    }
}

impl std::error::Error for ParseErrorKind {}

/// Errors that can occur when parsing an OpenType [`Font`](crate::Font).
#[derive(Debug)]
pub struct ParseError {
    pub(crate) kind: ParseErrorKind,
    pub(crate) offset: usize,
    pub(crate) table: Option<TableTag>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(table) = self.table {
            write!(formatter, "[{table}] ")?;
        }
        if self.offset > 0 {
            write!(formatter, "{}: ", self.offset)?;
        }
        fmt::Display::fmt(&self.kind, formatter)
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<MapError> for ParseError {
    fn from(err: MapError) -> Self {
        Self {
            kind: ParseErrorKind::Map(err),
            offset: 0,
            table: Some(TableTag::CMAP),
        }
    }
}

impl ParseError {
    pub(crate) fn missing_table(tag: TableTag) -> Self {
        Self {
            kind: ParseErrorKind::MissingTable,
            offset: 0,
            table: Some(tag),
        }
    }

    pub(crate) fn missing_glyph(glyph_idx: u16) -> Self {
        Self {
            kind: ParseErrorKind::MissingGlyph(glyph_idx),
            offset: 0,
            table: Some(TableTag::GLYF),
        }
    }

    /// Gets the error kind.
    pub fn kind(&self) -> &ParseErrorKind {
        &self.kind
    }

    /// Gets the table this error relates to.
    pub fn table(&self) -> Option<TableTag> {
        self.table
    }

    /// Gets the offset in the font data.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// Errors mapping a char to a glyph using the `cmap` table.
#[derive(Debug)]
#[non_exhaustive]
pub enum MapError {
    /// The char cannot be represented in the `cmap` subtable (e.g., it's outside the BMP
    /// for a format 4 subtable).
    CharTooLarge,
    /// Glyph ID array offset computed for the char is out of bounds.
    InvalidOffset(usize),
}

impl fmt::Display for MapError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CharTooLarge => formatter.write_str("char is outside of the `cmap` subtable"),
            Self::InvalidOffset(offset) => {
                write!(formatter, "glyph ID array offset {offset} is out of bounds")
            }
        }
    }
}

impl std::error::Error for MapError {}
