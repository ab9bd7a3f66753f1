//! OpenType font subsetting.
//!
//! The crate reads fonts with TrueType outlines, retains glyphs needed for a set of chars
//! (including components of composite glyphs) and writes the result as an OpenType or WOFF2 font.
//! [`read_chars()`] lists the character repertoire of any sfnt font, including CFF-flavored ones.

mod errors;
mod font;
mod subset;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
#[cfg(test)]
pub(crate) mod tests;
mod write;

pub use crate::{
    errors::{MapError, ParseError, ParseErrorKind},
    font::{read_chars, Font, TableTag},
    subset::FontSubset,
};
