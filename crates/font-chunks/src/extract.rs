//! Character repertoire extraction.

use font_subset::read_chars;

use crate::errors::Error;

/// Returns every char mapped by the font, sorted by codepoint.
///
/// # Errors
///
/// Returns [`Error::Extraction`] if the character map cannot be read. There is no fallback
/// repertoire.
pub fn extract_chars(font: &[u8]) -> Result<Vec<char>, Error> {
    let chars = read_chars(font).map_err(Error::Extraction)?;
    Ok(chars.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use font_subset::testing::SyntheticFont;

    use super::*;

    #[test]
    fn extracting_chars() {
        let raw = SyntheticFont::new()
            .chars(['z', 'a', '\u{4e00}'])
            .chars(['\u{20000}', 'a'])
            .build();
        let chars = extract_chars(&raw).unwrap();
        assert_eq!(chars, ['a', 'z', '\u{4e00}', '\u{20000}']);
    }

    #[test]
    fn empty_font_has_no_chars() {
        let raw = SyntheticFont::new().build();
        assert!(extract_chars(&raw).unwrap().is_empty());
    }

    #[test]
    fn garbage_is_an_extraction_error() {
        let err = extract_chars(b"definitely not a font").unwrap_err();
        assert!(matches!(err, Error::Extraction(_)), "{err}");
    }
}
