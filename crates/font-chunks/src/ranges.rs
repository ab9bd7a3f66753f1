//! CSS `unicode-range` tokens.

use std::{collections::BTreeSet, error, fmt, str::FromStr};

/// Contiguous range of codepoints, displayed as a CSS `unicode-range` token
/// (`U+0041` or `U+0041-0043`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnicodeRange {
    start: u32,
    end: u32,
}

impl UnicodeRange {
    const MAX_CODEPOINT: u32 = 0x10_ffff;

    /// Creates a range with inclusive bounds.
    ///
    /// # Panics
    ///
    /// Panics if `start > end`.
    pub fn new(start: char, end: char) -> Self {
        assert!(start <= end, "invalid range: {start:?} > {end:?}");
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Returns the first codepoint in this range.
    pub fn start(&self) -> u32 {
        self.start
    }

    /// Returns the last codepoint in this range (inclusive).
    pub fn end(&self) -> u32 {
        self.end
    }

    /// Iterates over chars in this range. Surrogate codepoints are skipped.
    pub fn chars(&self) -> impl Iterator<Item = char> {
        (self.start..=self.end).filter_map(char::from_u32)
    }
}

impl fmt::Display for UnicodeRange {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "U+{:04X}", self.start)?;
        if self.end != self.start {
            write!(formatter, "-{:04X}", self.end)?;
        }
        Ok(())
    }
}

/// Error parsing a [`UnicodeRange`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RangeParseError {
    /// The token does not start with `U+`.
    MissingPrefix,
    /// A bound is not a valid hex number of 1 to 6 digits.
    InvalidBound,
    /// Wildcards (`?`) are mixed with an explicit range or followed by digits.
    InvalidWildcard,
    /// A bound exceeds the Unicode codepoint space.
    OutOfBounds(u32),
    /// The start of the range is greater than its end.
    Reversed,
}

impl fmt::Display for RangeParseError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPrefix => formatter.write_str("range must start with `U+`"),
            Self::InvalidBound => formatter.write_str("range bound is not a hex number"),
            Self::InvalidWildcard => formatter.write_str("invalid wildcard range"),
            Self::OutOfBounds(value) => {
                write!(formatter, "codepoint {value:#x} is out of Unicode bounds")
            }
            Self::Reversed => formatter.write_str("range start is greater than its end"),
        }
    }
}

impl error::Error for RangeParseError {}

impl FromStr for UnicodeRange {
    type Err = RangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let body = s
            .strip_prefix("U+")
            .or_else(|| s.strip_prefix("u+"))
            .ok_or(RangeParseError::MissingPrefix)?;

        let (start, end) = if body.contains('?') {
            let digits = body.trim_end_matches('?');
            if digits.contains(['?', '-']) {
                return Err(RangeParseError::InvalidWildcard);
            }
            let start = parse_bound(&body.replace('?', "0"))?;
            let end = parse_bound(&body.replace('?', "F"))?;
            (start, end)
        } else if let Some((start, end)) = body.split_once('-') {
            (parse_bound(start)?, parse_bound(end)?)
        } else {
            let value = parse_bound(body)?;
            (value, value)
        };

        if end > Self::MAX_CODEPOINT {
            return Err(RangeParseError::OutOfBounds(end));
        }
        if start > end {
            return Err(RangeParseError::Reversed);
        }
        Ok(Self { start, end })
    }
}

fn parse_bound(s: &str) -> Result<u32, RangeParseError> {
    if s.is_empty() || s.len() > 6 || !s.bytes().all(|byte| byte.is_ascii_hexdigit()) {
        return Err(RangeParseError::InvalidBound);
    }
    u32::from_str_radix(s, 16).map_err(|_| RangeParseError::InvalidBound)
}

/// Encodes chars as the minimal sorted list of contiguous ranges.
pub fn encode_ranges(chars: impl IntoIterator<Item = char>) -> Vec<UnicodeRange> {
    let codepoints: BTreeSet<u32> = chars.into_iter().map(u32::from).collect();
    let mut ranges = Vec::<UnicodeRange>::new();
    for codepoint in codepoints {
        match ranges.last_mut() {
            Some(range) if range.end + 1 == codepoint => range.end = codepoint,
            _ => ranges.push(UnicodeRange {
                start: codepoint,
                end: codepoint,
            }),
        }
    }
    ranges
}

/// Decodes range tokens back into a set of chars.
///
/// # Errors
///
/// Returns the first token that cannot be parsed together with the parsing error.
pub fn decode_ranges<'a>(
    tokens: impl IntoIterator<Item = &'a str>,
) -> Result<BTreeSet<char>, (String, RangeParseError)> {
    let mut chars = BTreeSet::new();
    for token in tokens {
        let range: UnicodeRange = token.parse().map_err(|err| (token.to_owned(), err))?;
        chars.extend(range.chars());
    }
    Ok(chars)
}

#[cfg(test)]
mod tests {
    use test_casing::test_casing;

    use super::*;

    #[test]
    fn encoding_ranges() {
        let ranges = encode_ranges(['A', 'B', 'C', 'F']);
        let tokens: Vec<_> = ranges.iter().map(ToString::to_string).collect();
        assert_eq!(tokens, ["U+0041-0043", "U+0046"]);

        let ranges = encode_ranges("zyx\u{4e00}\u{4e01}\u{20000}a".chars());
        let tokens: Vec<_> = ranges.iter().map(ToString::to_string).collect();
        assert_eq!(tokens, ["U+0061", "U+0078-007A", "U+4E00-4E01", "U+20000"]);

        assert!(encode_ranges(std::iter::empty()).is_empty());
    }

    #[test]
    fn ranges_round_trip() {
        let chars: BTreeSet<char> = (' '..='~')
            .chain('\u{3000}'..='\u{303f}')
            .chain(['\u{4e2d}', '\u{6587}', '\u{1f600}'])
            .filter(|ch| !matches!(ch, 'q' | '\u{3010}'))
            .collect();
        let tokens: Vec<_> = encode_ranges(chars.iter().copied())
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(tokens.len(), 7);
        let decoded = decode_ranges(tokens.iter().map(String::as_str)).unwrap();
        assert_eq!(decoded, chars);
    }

    #[test_casing(5, [
        ("U+41", (0x41, 0x41)),
        ("u+0041-005a", (0x41, 0x5a)),
        ("U+4??", (0x400, 0x4ff)),
        ("U+??", (0, 0xff)),
        ("U+10FFFF", (0x10_ffff, 0x10_ffff)),
    ])]
    fn parsing_range(token: &str, expected: (u32, u32)) {
        let range: UnicodeRange = token.parse().unwrap();
        assert_eq!((range.start(), range.end()), expected);
    }

    #[test_casing(7, [
        ("0041", RangeParseError::MissingPrefix),
        ("U+", RangeParseError::InvalidBound),
        ("U+XYZ", RangeParseError::InvalidBound),
        ("U+1234567", RangeParseError::InvalidBound),
        ("U+4?1", RangeParseError::InvalidWildcard),
        ("U+110000", RangeParseError::OutOfBounds(0x11_0000)),
        ("U+42-41", RangeParseError::Reversed),
    ])]
    fn parsing_invalid_range(token: &str, expected: RangeParseError) {
        let err = token.parse::<UnicodeRange>().unwrap_err();
        assert_eq!(err, expected);
    }

    #[test]
    fn decoding_skips_surrogates() {
        let chars = decode_ranges(["U+D7FF-E000"]).unwrap();
        assert_eq!(chars.len(), 2);
        let err = decode_ranges(["U+41", "bogus"]).unwrap_err();
        assert_eq!(err, ("bogus".to_owned(), RangeParseError::MissingPrefix));
    }
}
