//! Pipeline configuration.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{errors::ConfigError, priority::PriorityStrategy};

/// Configuration of a whole pipeline run, usually loaded from a JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Per-font configuration keyed by the font identifier.
    pub fonts: BTreeMap<String, FontConfig>,
    /// Tunable constants of calibration and boundary search.
    #[serde(default)]
    pub tuning: Tuning,
    /// Subsetter backend.
    #[serde(default)]
    pub subsetter: SubsetterConfig,
    /// Maximum number of font styles processed concurrently.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    /// Directory that relative paths and patch commands are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl PipelineConfig {
    /// Loads configuration from a JSON file. Relative paths in the file are resolved
    /// against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if global settings are invalid.
    /// Per-font settings are checked separately by [`FontConfig::validate()`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let mut config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base_dir);
        config.tuning.validate()?;
        if config.max_concurrency == Some(0) {
            return Err(ConfigError::InvalidField {
                font_id: None,
                field: "maxConcurrency",
                message: "must be positive".to_owned(),
            });
        }
        Ok(config)
    }

    /// Makes relative paths in the configuration relative to `base_dir`.
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        self.base_dir = base_dir.to_owned();
        for font in self.fonts.values_mut() {
            for source in font.sources.values_mut() {
                *source = base_dir.join(&*source);
            }
            if let Some(data_ref) = &mut font.priority_data_ref {
                *data_ref = base_dir.join(&*data_ref);
            }
        }
    }

    /// Selects fonts by their identifiers; an empty selection means all fonts.
    ///
    /// # Errors
    ///
    /// Returns an error if a requested font is not configured.
    pub fn select<'a>(
        &'a self,
        font_ids: &[String],
    ) -> Result<Vec<(&'a str, &'a FontConfig)>, ConfigError> {
        if font_ids.is_empty() {
            return Ok(self
                .fonts
                .iter()
                .map(|(id, font)| (id.as_str(), font))
                .collect());
        }
        font_ids
            .iter()
            .map(|id| {
                let (id, font) = self
                    .fonts
                    .get_key_value(id)
                    .ok_or_else(|| ConfigError::UnknownFont(id.clone()))?;
                Ok((id.as_str(), font))
            })
            .collect()
    }
}

/// Per-font configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontConfig {
    /// Font family name used in style rules.
    #[serde(default)]
    pub display_name: String,
    /// Static font weight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u16>,
    /// Weight range of a variable font.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_range: Option<[u16; 2]>,
    /// CSS `font-style` for upright styles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Style tags to process (e.g., `roman` and `italic`). If empty, all `sources` are processed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub styles: Vec<String>,
    /// Paths to already downloaded font files keyed by the style tag.
    #[serde(default)]
    pub sources: BTreeMap<String, PathBuf>,
    /// Per-index chunk target sizes in KB; the last value applies to all later chunks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunk_target_sizes: Vec<f64>,
    /// Uniform chunk target size in KB. Ignored if `chunk_target_sizes` is set.
    #[serde(
        default,
        rename = "maxChunkSizeKB",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_chunk_size_kb: Option<f64>,
    /// Maximum number of chunks per style.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_chunks: Option<usize>,
    /// Priority strategy identifier.
    #[serde(default = "FontConfig::default_strategy")]
    pub priority_strategy: String,
    /// Path to the frequency table used by the priority strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_data_ref: Option<PathBuf>,
    /// Pattern for chunk file names with `{fontId}`, `{style}` and `{index}` placeholders.
    #[serde(default = "FontConfig::default_filename_pattern")]
    pub filename_pattern: String,
    /// Style-rule settings.
    #[serde(default)]
    pub css: CssConfig,
    /// Commands run on a copy of each source before it is split. The path to the copy
    /// is appended to the command arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patch_commands: Vec<Vec<String>>,
}

impl FontConfig {
    /// Default chunk file name pattern.
    pub const DEFAULT_FILENAME_PATTERN: &'static str = "{fontId}-{style}-{index}.woff2";

    fn default_strategy() -> String {
        "codepoint".to_owned()
    }

    fn default_filename_pattern() -> String {
        Self::DEFAULT_FILENAME_PATTERN.to_owned()
    }

    /// Returns style tags to process.
    pub fn styles(&self) -> Vec<&str> {
        if self.styles.is_empty() {
            self.sources.keys().map(String::as_str).collect()
        } else {
            self.styles.iter().map(String::as_str).collect()
        }
    }

    /// Returns chunk target sizes in bytes. The last size applies to all later chunks.
    pub fn target_sizes(&self) -> Vec<f64> {
        let sizes_kb = if self.chunk_target_sizes.is_empty() {
            self.max_chunk_size_kb.as_slice()
        } else {
            self.chunk_target_sizes.as_slice()
        };
        sizes_kb.iter().map(|kb| kb * 1_024.0).collect()
    }

    /// Returns the chunk count cap. Only meaningful after [`Self::validate()`] succeeds.
    pub fn chunk_cap(&self) -> usize {
        self.max_chunks.unwrap_or(1)
    }

    /// Returns the file name for a chunk.
    pub fn chunk_filename(&self, font_id: &str, style: &str, index: usize) -> String {
        self.filename_pattern
            .replace("{fontId}", font_id)
            .replace("{style}", style)
            .replace("{index}", &index.to_string())
    }

    /// Returns the CSS `font-style` for the specified style tag.
    pub fn css_font_style(&self, style: &str) -> &str {
        let lowercase = style.to_ascii_lowercase();
        if lowercase.contains("italic") {
            "italic"
        } else if lowercase.contains("oblique") {
            "oblique"
        } else {
            self.style.as_deref().unwrap_or("normal")
        }
    }

    /// Returns the CSS `font-weight` value.
    pub fn css_font_weight(&self) -> String {
        match (self.weight_range, self.weight) {
            (Some([low, high]), _) => format!("{low} {high}"),
            (None, Some(weight)) => weight.to_string(),
            (None, None) => "400".to_owned(),
        }
    }

    /// Checks this configuration.
    ///
    /// # Errors
    ///
    /// Returns the first found problem.
    pub fn validate(&self, font_id: &str) -> Result<(), ConfigError> {
        let missing = |field| ConfigError::MissingField {
            font_id: font_id.to_owned(),
            field,
        };

        if self.display_name.trim().is_empty() {
            return Err(missing("displayName"));
        }
        self.validate_weight(font_id)?;

        let styles = self.styles();
        if styles.is_empty() {
            return Err(missing("sources"));
        }
        for style in &styles {
            if !self.sources.contains_key(*style) {
                let message = format!("no source for style `{style}`");
                return Err(ConfigError::invalid(font_id, "sources", message));
            }
        }

        if self.chunk_target_sizes.is_empty() && self.max_chunk_size_kb.is_none() {
            return Err(missing("chunkTargetSizes"));
        }
        let mut sizes = self.chunk_target_sizes.iter().chain(&self.max_chunk_size_kb);
        if sizes.any(|&size| !(size.is_finite() && size > 0.0)) {
            return Err(ConfigError::invalid(
                font_id,
                "chunkTargetSizes",
                "target sizes must be positive",
            ));
        }
        match self.max_chunks {
            None => return Err(missing("maxChunks")),
            Some(0) => {
                return Err(ConfigError::invalid(font_id, "maxChunks", "must be positive"));
            }
            Some(_) => { /* OK */ }
        }

        let strategy = PriorityStrategy::from_id(&self.priority_strategy).ok_or_else(|| {
            ConfigError::UnknownStrategy {
                font_id: font_id.to_owned(),
                strategy: self.priority_strategy.clone(),
            }
        })?;
        if strategy.requires_data() && self.priority_data_ref.is_none() {
            return Err(missing("priorityDataRef"));
        }
        if let Some(path) = &self.priority_data_ref {
            if !path.is_file() {
                return Err(ConfigError::PriorityData {
                    path: path.clone(),
                    source: std::io::ErrorKind::NotFound.into(),
                });
            }
        }

        self.validate_filename_pattern(font_id, styles.len())?;
        if self.patch_commands.iter().any(Vec::is_empty) {
            return Err(ConfigError::invalid(
                font_id,
                "patchCommands",
                "commands must not be empty",
            ));
        }
        Ok(())
    }

    fn validate_weight(&self, font_id: &str) -> Result<(), ConfigError> {
        const WEIGHTS: std::ops::RangeInclusive<u16> = 1..=1_000;

        match (self.weight, self.weight_range) {
            (Some(_), Some(_)) => Err(ConfigError::invalid(
                font_id,
                "weightRange",
                "`weight` and `weightRange` are mutually exclusive",
            )),
            (Some(weight), None) if !WEIGHTS.contains(&weight) => Err(ConfigError::invalid(
                font_id,
                "weight",
                format!("{weight} is outside {WEIGHTS:?}"),
            )),
            (None, Some([low, high]))
                if low > high || !WEIGHTS.contains(&low) || !WEIGHTS.contains(&high) =>
            {
                Err(ConfigError::invalid(
                    font_id,
                    "weightRange",
                    format!("[{low}, {high}] is not a valid range within {WEIGHTS:?}"),
                ))
            }
            _ => Ok(()),
        }
    }

    fn validate_filename_pattern(
        &self,
        font_id: &str,
        style_count: usize,
    ) -> Result<(), ConfigError> {
        let pattern = &self.filename_pattern;
        if !pattern.contains("{index}") {
            return Err(ConfigError::invalid(
                font_id,
                "filenamePattern",
                "pattern must contain `{index}`",
            ));
        }
        if style_count > 1 && !pattern.contains("{style}") {
            return Err(ConfigError::invalid(
                font_id,
                "filenamePattern",
                "pattern must contain `{style}` for fonts with multiple styles",
            ));
        }
        if pattern.contains(['/', '\\']) {
            return Err(ConfigError::invalid(
                font_id,
                "filenamePattern",
                "pattern must not contain path separators",
            ));
        }
        Ok(())
    }
}

/// Style-rule settings of a font.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CssConfig {
    /// Template of the `src` descriptor with `{filename}` and `{fontId}` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_format_template: Option<String>,
    /// CSS `font-stretch` value (e.g., `75% 125%` for variable fonts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_stretch: Option<String>,
    /// CSS `font-display` value; `swap` if not specified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_display: Option<String>,
}

/// Tunable constants of calibration and boundary search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Tuning {
    /// Maximum number of chars in the calibration sample. Fonts with fewer chars
    /// are not calibrated.
    pub sample_size: usize,
    /// Fraction of the sample subset size attributed to fixed overhead.
    pub overhead_ratio: f64,
    /// Factor applied to an oversized chunk candidate.
    pub shrink_factor: f64,
    /// Factor applied to an underfilled chunk candidate.
    pub grow_factor: f64,
    /// Fraction of the target size below which a candidate is considered underfilled.
    pub underfill_ratio: f64,
    /// Minimum number of chars in an estimated chunk candidate.
    pub min_chunk_chars: usize,
    /// Minimum size of a chunk file in bytes for it to be considered valid on re-runs.
    pub min_file_size: u64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            sample_size: 100,
            overhead_ratio: 0.1,
            shrink_factor: 0.8,
            grow_factor: 1.3,
            underfill_ratio: 0.7,
            min_chunk_chars: 10,
            min_file_size: 64,
        }
    }
}

impl Tuning {
    /// Checks that the constants are within their domains.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid constant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, message: &str| ConfigError::InvalidField {
            font_id: None,
            field,
            message: message.to_owned(),
        };

        if self.sample_size == 0 {
            return Err(invalid("tuning.sampleSize", "must be positive"));
        }
        if !(0.0..1.0).contains(&self.overhead_ratio) {
            return Err(invalid("tuning.overheadRatio", "must be in [0, 1)"));
        }
        if !(self.shrink_factor > 0.0 && self.shrink_factor < 1.0) {
            return Err(invalid("tuning.shrinkFactor", "must be in (0, 1)"));
        }
        if !(self.grow_factor > 1.0 && self.grow_factor.is_finite()) {
            return Err(invalid("tuning.growFactor", "must be greater than 1"));
        }
        if !(self.underfill_ratio > 0.0 && self.underfill_ratio <= 1.0) {
            return Err(invalid("tuning.underfillRatio", "must be in (0, 1]"));
        }
        if self.min_chunk_chars == 0 {
            return Err(invalid("tuning.minChunkChars", "must be positive"));
        }
        Ok(())
    }
}

/// Subsetter backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process subsetting with the `font-subset` library.
    #[default]
    Library,
    /// Subsetting with an external program compatible with `pyftsubset`.
    Process,
}

/// Subsetter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubsetterConfig {
    /// Backend to use.
    pub backend: Backend,
    /// Program invoked by the process backend.
    pub program: String,
    /// Layout features removed by the process backend.
    pub layout_features_exclude: Vec<String>,
}

impl Default for SubsetterConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Library,
            program: "pyftsubset".to_owned(),
            layout_features_exclude: vec![],
        }
    }
}
