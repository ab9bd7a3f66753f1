use std::{collections::BTreeSet, env, fmt, io::Write, ops, process::Command, sync::OnceLock};

use allsorts::{binary::read::ReadScope, font::MatchingPresentation, font_data::FontData};
use test_casing::{test_casing, Product};

use crate::{read_chars, testing::SyntheticFont, Font, FontSubset, ParseErrorKind};

#[derive(Clone, Copy)]
pub(crate) struct TestFont {
    pub(crate) name: &'static str,
    builder: fn() -> SyntheticFont,
}

impl fmt::Debug for TestFont {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.name, formatter)
    }
}

impl TestFont {
    pub(crate) fn latin() -> Self {
        LATIN_FONT
    }

    pub(crate) fn build(self) -> Vec<u8> {
        (self.builder)().build()
    }
}

const LATIN_FONT: TestFont = TestFont {
    name: "Latin",
    builder: || {
        SyntheticFont::new()
            .chars(' '..='~')
            .chars('À'..='ÿ')
            .composite('ǅ', &['D', 'ž'])
            .chars(['ž'])
    },
};
const CJK_FONT: TestFont = TestFont {
    name: "CJK",
    builder: || {
        SyntheticFont::new()
            .chars(' '..='~')
            .chars('\u{4e00}'..='\u{4eff}')
            .chars(['\u{20000}', '\u{20001}'])
    },
};

pub(crate) const FONTS: [TestFont; 2] = [LATIN_FONT, CJK_FONT];

#[derive(Debug, Clone)]
pub(crate) enum TestCharSubset {
    Range(ops::RangeInclusive<char>),
    Str(&'static str),
}

impl TestCharSubset {
    pub(crate) fn into_set(self) -> BTreeSet<char> {
        match self {
            Self::Range(range) => range.collect(),
            Self::Str(s) => s.chars().collect(),
        }
    }
}

pub(crate) const SUBSET_CHARS: [TestCharSubset; 3] = [
    TestCharSubset::Range(' '..='~'),
    TestCharSubset::Str("Hello world!"),
    TestCharSubset::Str("A"),
];

#[derive(Debug)]
struct OpenTypeSanitizer {
    path: Option<String>,
}

impl Default for OpenTypeSanitizer {
    fn default() -> Self {
        let Ok(path) = env::var("OTS_SANITIZER") else {
            return Self { path: None };
        };
        let output = Command::new(&path)
            .arg("--version")
            .output()
            .unwrap_or_else(|err| {
                panic!("failed getting version for ots-sanitize at {path}: {err}");
            });
        assert!(
            output.status.success(),
            "failed getting version for ots-sanitize at {path}: non-zero exit code"
        );
        println!(
            "ots-sanitize version: {}",
            String::from_utf8_lossy(&output.stdout)
        );
        Self { path: Some(path) }
    }
}

impl OpenTypeSanitizer {
    fn get() -> &'static Self {
        static SANITIZER: OnceLock<OpenTypeSanitizer> = OnceLock::new();
        SANITIZER.get_or_init(Self::default)
    }

    fn validate(&self, content: &[u8]) {
        let Some(path) = &self.path else {
            println!("OTS_SANITIZER env var is missing; skipping checks");
            return;
        };

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.as_file_mut().write_all(content).unwrap();
        file.as_file_mut().flush().unwrap();
        let file_path = file.into_temp_path();

        let output = Command::new(path)
            .arg(&file_path)
            .output()
            .expect("failed running ots-sanitize");
        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            panic!("ots-sanitize failed:\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}");
        }
    }
}

#[test]
fn reading_font_agrees_with_allsorts() {
    let raw = TestFont::latin().build();
    let font = Font::new(&raw).unwrap();

    let font_file = ReadScope::new(&raw).read::<FontData>().unwrap();
    let font_provider = font_file.table_provider(0).unwrap();
    let mut reference_font = allsorts::Font::new(font_provider).unwrap();

    for ch in "Hello, world! Ärger ÿ ǅ".chars() {
        let glyph_idx = font.map_char(ch).unwrap();
        let (expected_idx, _) =
            reference_font.lookup_glyph_index(ch, MatchingPresentation::NotRequired, None);
        assert_eq!(glyph_idx, expected_idx, "{ch:?}");
    }
}

#[test]
fn reading_chars_of_font() {
    let raw = TestFont::latin().build();
    let chars = read_chars(&raw).unwrap();
    assert_eq!(chars.len(), 95 + 64 + 2);
    assert_eq!(chars.first(), Some(&' '));
    assert_eq!(chars.last(), Some(&'ǅ'));

    let raw = CJK_FONT.build();
    let chars = read_chars(&raw).unwrap();
    assert_eq!(chars.len(), 95 + 256 + 2);
    assert!(chars.contains(&'\u{20001}'));
}

#[test]
fn cff_font_is_rejected_but_readable() {
    let mut raw = TestFont::latin().build();
    raw[..4].copy_from_slice(b"OTTO");
    let err = Font::new(&raw).unwrap_err();
    assert!(
        matches!(err.kind(), ParseErrorKind::UnsupportedOutlines),
        "{err}"
    );
    assert_eq!(read_chars(&raw).unwrap().len(), 95 + 64 + 2);
}

#[test]
fn truncated_font_is_an_error() {
    let raw = TestFont::latin().build();
    let err = read_chars(&raw[..100]).unwrap_err();
    assert!(
        matches!(err.kind(), ParseErrorKind::RangeOutOfBounds { .. }),
        "{err}"
    );
}

#[test_casing(6, Product((FONTS, SUBSET_CHARS)))]
fn subsetting_font(font: TestFont, chars: TestCharSubset) {
    let chars = chars.into_set();
    let raw = font.build();
    let font = Font::new(&raw).unwrap();
    let subset = FontSubset::new(font, &chars).unwrap();

    let ttf = subset.to_truetype();
    assert_valid_font(&ttf, true, &chars);
    let woff2 = subset.to_woff2();
    assert_valid_font(&woff2, false, &chars);
}

#[test]
fn subset_size_grows_with_chars() {
    let raw = CJK_FONT.build();
    let sizes: Vec<_> = [16, 64, 256]
        .into_iter()
        .map(|count| {
            let font = Font::new(&raw).unwrap();
            let chars = ('\u{4e00}'..='\u{4eff}').take(count).collect();
            FontSubset::new(font, &chars).unwrap().to_woff2().len()
        })
        .collect();
    assert!(sizes.windows(2).all(|pair| pair[0] < pair[1]), "{sizes:?}");
}

fn assert_valid_font(raw: &[u8], is_ttf: bool, expected_chars: &BTreeSet<char>) {
    if is_ttf {
        let font = Font::new(raw).unwrap();
        assert_eq!(&font.chars().unwrap(), expected_chars);
    }

    let font_file = ReadScope::new(raw).read::<FontData>().unwrap();
    let font_provider = font_file.table_provider(0).unwrap();
    let mut font = allsorts::Font::new(font_provider).unwrap();
    for &ch in expected_chars {
        let (glyph_id, _) = font.lookup_glyph_index(ch, MatchingPresentation::NotRequired, None);
        assert_ne!(glyph_id, 0, "{ch:?}");
    }

    OpenTypeSanitizer::get().validate(raw);
}
