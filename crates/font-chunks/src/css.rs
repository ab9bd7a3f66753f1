//! `@font-face` style rules.

use std::{fmt, path::Path};

use crate::{config::FontConfig, errors::CssError, metadata::ChunksMetadata};

/// Default template of the `src` descriptor.
pub const DEFAULT_SRC_TEMPLATE: &str = "url('{filename}') format('woff2')";
const DEFAULT_FONT_DISPLAY: &str = "swap";

/// Single `@font-face` rule referencing one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleRule {
    /// `font-family` value (unquoted).
    pub font_family: String,
    /// `src` value.
    pub src: String,
    /// `font-style` value.
    pub font_style: String,
    /// `font-weight` value.
    pub font_weight: String,
    /// `font-stretch` value.
    pub font_stretch: Option<String>,
    /// `font-display` value.
    pub font_display: String,
    /// `unicode-range` value.
    pub unicode_range: String,
}

impl fmt::Display for StyleRule {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let family = self.font_family.replace('\\', "\\\\").replace('\'', "\\'");
        writeln!(formatter, "@font-face {{")?;
        writeln!(formatter, "  font-family: '{family}';")?;
        writeln!(formatter, "  src: {};", self.src)?;
        writeln!(formatter, "  font-style: {};", self.font_style)?;
        writeln!(formatter, "  font-weight: {};", self.font_weight)?;
        if let Some(stretch) = &self.font_stretch {
            writeln!(formatter, "  font-stretch: {stretch};")?;
        }
        writeln!(formatter, "  font-display: {};", self.font_display)?;
        writeln!(formatter, "  unicode-range: {};", self.unicode_range)?;
        write!(formatter, "}}")
    }
}

fn style_rank(style: &str) -> u8 {
    match style.to_ascii_lowercase().as_str() {
        "roman" | "regular" | "normal" | "upright" => 0,
        "italic" | "oblique" => 1,
        _ => 2,
    }
}

/// Creates style rules for a font: one rule per chunk, roman styles before italic ones
/// before others, chunks in index order.
///
/// # Errors
///
/// Returns an error if a chunk file does not exist in `font_dir`, or if metadata is
/// inconsistent (chunk indices out of order, unicode ranges not matching chunk chars).
pub fn style_rules(
    font_id: &str,
    config: &FontConfig,
    metadata: &[ChunksMetadata],
    font_dir: &Path,
) -> Result<Vec<StyleRule>, CssError> {
    let mut ordered: Vec<_> = metadata.iter().collect();
    ordered.sort_by(|a, b| {
        (style_rank(&a.style), &a.style).cmp(&(style_rank(&b.style), &b.style))
    });

    let template = config
        .css
        .src_format_template
        .as_deref()
        .unwrap_or(DEFAULT_SRC_TEMPLATE);
    let font_display = config
        .css
        .font_display
        .as_deref()
        .unwrap_or(DEFAULT_FONT_DISPLAY);

    let mut rules = vec![];
    for style_meta in ordered {
        let style = &style_meta.style;
        let inconsistent = |message: String| CssError::Inconsistent {
            font_id: font_id.to_owned(),
            style: style.clone(),
            message,
        };
        if style_meta.total_chunks != style_meta.chunks.len() {
            return Err(inconsistent(format!(
                "metadata declares {} chunks, but lists {}",
                style_meta.total_chunks,
                style_meta.chunks.len()
            )));
        }

        for (expected_index, chunk) in style_meta.chunks.iter().enumerate() {
            if chunk.index != expected_index {
                return Err(inconsistent(format!(
                    "chunk #{} is listed at position {expected_index}",
                    chunk.index
                )));
            }
            if chunk.filename.is_empty() || !font_dir.join(&chunk.filename).is_file() {
                return Err(CssError::MissingFile {
                    font_id: font_id.to_owned(),
                    style: style.clone(),
                    index: chunk.index,
                    filename: chunk.filename.clone(),
                });
            }
            if !chunk.ranges_match_chars() {
                return Err(inconsistent(format!(
                    "unicode ranges of chunk #{} do not match its characters",
                    chunk.index
                )));
            }

            rules.push(StyleRule {
                font_family: style_meta.display_name.clone(),
                src: template
                    .replace("{filename}", &chunk.filename)
                    .replace("{fontId}", font_id),
                font_style: config.css_font_style(style).to_owned(),
                font_weight: config.css_font_weight(),
                font_stretch: config.css.font_stretch.clone(),
                font_display: font_display.to_owned(),
                unicode_range: chunk.unicode_ranges.join(", "),
            });
        }
    }
    Ok(rules)
}

/// Renders rules as a style sheet.
pub fn render_stylesheet(rules: &[StyleRule]) -> String {
    let mut css = String::new();
    for rule in rules {
        if !css.is_empty() {
            css.push('\n');
        }
        css.push_str(&rule.to_string());
        css.push('\n');
    }
    css
}

/// Loads metadata for all styles of a font from `font_dir` and renders the style sheet.
///
/// # Errors
///
/// Returns an error if metadata cannot be loaded or rules cannot be created.
pub fn font_stylesheet(
    font_id: &str,
    config: &FontConfig,
    font_dir: &Path,
) -> Result<String, CssError> {
    let metadata = config
        .styles()
        .into_iter()
        .map(|style| {
            let path = ChunksMetadata::path(font_dir, style);
            ChunksMetadata::load(&path).map_err(|err| CssError::Metadata {
                path,
                source: Box::new(err),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let rules = style_rules(font_id, config, &metadata, font_dir)?;
    Ok(render_stylesheet(&rules))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::{metadata::ChunkRecord, ranges::encode_ranges};

    fn metadata(style: &str, chunks: &[&str]) -> ChunksMetadata {
        let chunks: Vec<_> = chunks
            .iter()
            .enumerate()
            .map(|(index, chars)| ChunkRecord {
                index,
                characters: (*chars).to_owned(),
                unicode_ranges: encode_ranges(chars.chars())
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
                byte_size: 100,
                filename: format!("sample-{style}-{index}.woff2"),
            })
            .collect();
        ChunksMetadata {
            font_id: "sample".to_owned(),
            display_name: "Sample Sans".to_owned(),
            style: style.to_owned(),
            source_hash: "abc".to_owned(),
            chunking_hash: "def".to_owned(),
            total_chunks: chunks.len(),
            total_size: 100 * chunks.len() as u64,
            chunks,
            generated_at: chrono::Utc::now(),
        }
    }

    fn write_chunk_files(dir: &Path, metadata: &[ChunksMetadata]) {
        for chunk in metadata.iter().flat_map(|meta| &meta.chunks) {
            fs::write(dir.join(&chunk.filename), [0_u8; 100]).unwrap();
        }
    }

    fn sample_config() -> FontConfig {
        serde_json::from_value(serde_json::json!({
            "displayName": "Sample Sans",
            "weightRange": [100, 900],
            "styles": ["roman", "italic"],
            "sources": { "roman": "Sample-Roman.ttf", "italic": "Sample-Italic.ttf" },
            "maxChunkSizeKB": 80,
            "maxChunks": 5,
        }))
        .unwrap()
    }

    #[test]
    fn rules_are_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = [
            metadata("italic", &["ab", "cd"]),
            metadata("condensed", &["ab"]),
            metadata("roman", &["ABCF", "xyz"]),
        ];
        write_chunk_files(dir.path(), &metadata);

        let rules = style_rules("sample", &sample_config(), &metadata, dir.path()).unwrap();
        let summary: Vec<_> = rules
            .iter()
            .map(|rule| (rule.font_style.as_str(), rule.unicode_range.as_str()))
            .collect();
        assert_eq!(
            summary,
            [
                ("normal", "U+0041-0043, U+0046"),
                ("normal", "U+0078-007A"),
                ("italic", "U+0061-0062"),
                ("italic", "U+0063-0064"),
                ("normal", "U+0061-0062"),
            ]
        );
        assert!(rules.iter().all(|rule| rule.font_weight == "100 900"));
        assert_eq!(rules[0].src, "url('sample-roman-0.woff2') format('woff2')");
    }

    #[test]
    fn rendering_rule_with_custom_template() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = [metadata("roman", &["ABCF"])];
        write_chunk_files(dir.path(), &metadata);
        let mut config = sample_config();
        config.weight_range = None;
        config.weight = Some(700);
        config.css.src_format_template =
            Some("url('/fonts/{fontId}/{filename}') format('woff2')".to_owned());
        config.css.font_stretch = Some("75% 125%".to_owned());
        config.css.font_display = Some("optional".to_owned());

        let rules = style_rules("sample", &config, &metadata, dir.path()).unwrap();
        let css = render_stylesheet(&rules);
        assert_eq!(
            css,
            "@font-face {\n  \
             font-family: 'Sample Sans';\n  \
             src: url('/fonts/sample/sample-roman-0.woff2') format('woff2');\n  \
             font-style: normal;\n  \
             font-weight: 700;\n  \
             font-stretch: 75% 125%;\n  \
             font-display: optional;\n  \
             unicode-range: U+0041-0043, U+0046;\n\
             }\n"
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = [metadata("roman", &["ABCF", "xyz"])];
        write_chunk_files(dir.path(), &metadata);
        fs::remove_file(dir.path().join("sample-roman-1.woff2")).unwrap();

        let err = style_rules("sample", &sample_config(), &metadata, dir.path()).unwrap_err();
        assert!(
            matches!(&err, CssError::MissingFile { index: 1, filename, .. } if filename == "sample-roman-1.woff2"),
            "{err}"
        );
    }

    #[test]
    fn inconsistent_metadata_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut metadata = [metadata("roman", &["ABCF", "xyz"])];
        write_chunk_files(dir.path(), &metadata);
        metadata[0].chunks[1].unicode_ranges = vec!["U+0078".to_owned()];

        let err = style_rules("sample", &sample_config(), &metadata, dir.path()).unwrap_err();
        assert!(matches!(err, CssError::Inconsistent { .. }), "{err}");

        metadata[0].chunks.swap(0, 1);
        let err = style_rules("sample", &sample_config(), &metadata, dir.path()).unwrap_err();
        assert!(matches!(err, CssError::Inconsistent { .. }), "{err}");
    }

    #[test]
    fn stylesheet_from_metadata_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = sample_config();
        let err = font_stylesheet("sample", &config, dir.path()).unwrap_err();
        assert!(matches!(err, CssError::Metadata { .. }), "{err}");

        let metadata = [metadata("roman", &["ABCF"]), metadata("italic", &["ABCF"])];
        write_chunk_files(dir.path(), &metadata);
        for meta in &metadata {
            meta.write_atomically(&ChunksMetadata::path(dir.path(), &meta.style))
                .unwrap();
        }
        let css = font_stylesheet("sample", &config, dir.path()).unwrap();
        assert_eq!(css.matches("@font-face").count(), 2);
        let roman_pos = css.find("sample-roman-0").unwrap();
        let italic_pos = css.find("sample-italic-0").unwrap();
        assert!(roman_pos < italic_pos);
    }
}
