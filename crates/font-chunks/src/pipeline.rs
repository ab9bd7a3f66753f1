//! Processing of a single font style.

use std::{
    collections::BTreeSet,
    fmt, fs,
    path::{Path, PathBuf},
};

use chrono::Utc;

use crate::{
    config::{FontConfig, Tuning},
    errors::{ConfigError, Error},
    extract::extract_chars,
    metadata::{ChunkRecord, ChunksMetadata},
    metrics::{calibrate, chunking_hash, source_hash, FontKey, MetricsCache},
    patch::apply_patches,
    priority::PriorityRanker,
    ranges::encode_ranges,
    search::BoundarySearch,
    subsetter::Subsetter,
};

/// Outcome of a successfully processed font style.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// Chunks were generated.
    Generated(ChunksMetadata),
    /// Chunks generated by a previous run are still valid.
    Skipped(ChunksMetadata),
}

impl JobOutcome {
    /// Returns metadata of the chunks.
    pub fn metadata(&self) -> &ChunksMetadata {
        match self {
            Self::Generated(metadata) | Self::Skipped(metadata) => metadata,
        }
    }
}

/// Chunking pipeline: extracts, ranks and splits font styles, writing chunk files and metadata
/// to `<output_dir>/<font_id>/`.
pub struct Pipeline<'a> {
    subsetter: &'a dyn Subsetter,
    cache: &'a MetricsCache,
    tuning: Tuning,
    output_dir: PathBuf,
    working_dir: PathBuf,
}

impl fmt::Debug for Pipeline<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Pipeline")
            .field("cache", &self.cache)
            .field("tuning", &self.tuning)
            .field("output_dir", &self.output_dir)
            .field("working_dir", &self.working_dir)
            .finish_non_exhaustive()
    }
}

impl<'a> Pipeline<'a> {
    /// Creates a pipeline with default tuning. Patch commands run in the current directory.
    pub fn new(
        subsetter: &'a dyn Subsetter,
        cache: &'a MetricsCache,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            subsetter,
            cache,
            tuning: Tuning::default(),
            output_dir: output_dir.into(),
            working_dir: PathBuf::from("."),
        }
    }

    /// Sets tuning constants.
    #[must_use]
    pub fn with_tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Sets the directory patch commands run in.
    #[must_use]
    pub fn with_working_dir(mut self, working_dir: impl Into<PathBuf>) -> Self {
        self.working_dir = working_dir.into();
        self
    }

    /// Returns the output directory for a font.
    pub fn font_dir(&self, font_id: &str) -> PathBuf {
        self.output_dir.join(font_id)
    }

    /// Processes a single style of a font. The configuration is assumed to be validated.
    ///
    /// If metadata from a previous run is still valid for the source font and the chunking
    /// settings (target sizes, chunk cap, priority strategy and table, file name pattern
    /// and tuning), no chunks are generated. Otherwise, chunk files are written first and metadata last, so that
    /// a failed run never leaves metadata pointing to a partial chunk set.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. Errors are not retried.
    pub fn run(&self, font_id: &str, config: &FontConfig, style: &str) -> Result<JobOutcome, Error> {
        let source = config.sources.get(style).ok_or_else(|| {
            ConfigError::invalid(font_id, "sources", format!("no source for style `{style}`"))
        })?;
        let raw = fs::read(source).map_err(Error::io(source))?;
        let hash = source_hash(&raw, &config.patch_commands);
        let priority_data = config
            .priority_data_ref
            .as_deref()
            .map(|path| {
                fs::read(path).map_err(|source| ConfigError::PriorityData {
                    path: path.to_owned(),
                    source,
                })
            })
            .transpose()?;
        let chunking_hash = chunking_hash(config, priority_data.as_deref(), &self.tuning);

        let font_dir = self.font_dir(font_id);
        let metadata_path = ChunksMetadata::path(&font_dir, style);
        let existing = self.existing_metadata(&metadata_path, &font_dir, &hash, &chunking_hash);
        if let Some(metadata) = existing {
            log::info!(
                "{font_id} ({style}): {} chunks are up to date",
                metadata.total_chunks
            );
            return Ok(JobOutcome::Skipped(metadata));
        }

        let font = apply_patches(&raw, &config.patch_commands, &self.working_dir)?;
        let chars: BTreeSet<char> = extract_chars(&font)?.into_iter().collect();
        let ranker = PriorityRanker::from_config(font_id, config)?;
        let priority_list = ranker.rank(&chars);
        log::debug!(
            "{font_id} ({style}): ranked {} chars with strategy `{}`",
            priority_list.len(),
            ranker.strategy().id()
        );

        let metrics = if priority_list.len() > self.tuning.sample_size {
            let sample = &priority_list[..self.tuning.sample_size];
            let key = FontKey::new(&hash, style);
            let metrics = self
                .cache
                .get_or_calibrate(&key, || {
                    calibrate(self.subsetter, &font, sample, &self.tuning)
                })
                .map_err(Error::Calibration)?;
            Some(metrics)
        } else {
            None
        };

        let chunks = BoundarySearch::new(self.subsetter, &font, metrics, &self.tuning)
            .with_target_sizes(config.target_sizes())
            .with_max_chunks(config.chunk_cap())
            .run(&priority_list)?;

        fs::create_dir_all(&font_dir).map_err(Error::io(&font_dir))?;
        let mut records = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.into_iter().enumerate() {
            let filename = config.chunk_filename(font_id, style, index);
            let path = font_dir.join(&filename);
            fs::write(&path, &chunk.data).map_err(Error::io(&path))?;
            records.push(ChunkRecord {
                index,
                characters: chunk.chars.iter().collect(),
                unicode_ranges: encode_ranges(chunk.chars.iter().copied())
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
                byte_size: chunk.data.len() as u64,
                filename,
            });
        }

        let metadata = ChunksMetadata {
            font_id: font_id.to_owned(),
            display_name: config.display_name.clone(),
            style: style.to_owned(),
            source_hash: hash,
            chunking_hash,
            total_chunks: records.len(),
            total_size: records.iter().map(|chunk| chunk.byte_size).sum(),
            chunks: records,
            generated_at: Utc::now(),
        };
        metadata.write_atomically(&metadata_path)?;
        log::info!(
            "{font_id} ({style}): generated {} chunks, {} bytes in total",
            metadata.total_chunks,
            metadata.total_size
        );
        Ok(JobOutcome::Generated(metadata))
    }

    fn existing_metadata(
        &self,
        metadata_path: &Path,
        font_dir: &Path,
        hash: &str,
        chunking_hash: &str,
    ) -> Option<ChunksMetadata> {
        if !metadata_path.is_file() {
            return None;
        }
        match ChunksMetadata::load(metadata_path) {
            Ok(metadata)
                if metadata.is_satisfied(
                    font_dir,
                    hash,
                    chunking_hash,
                    self.tuning.min_file_size,
                ) =>
            {
                Some(metadata)
            }
            Ok(_) => {
                log::debug!("`{}` is outdated", metadata_path.display());
                None
            }
            Err(err) => {
                log::warn!("ignoring existing metadata: {err}");
                None
            }
        }
    }
}
