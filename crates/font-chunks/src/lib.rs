//! Splitting fonts into progressively loadable chunks.
//!
//! A font style is split into size-bounded subsets (*chunks*) that can be loaded on demand
//! by browsers via `unicode-range` descriptors of `@font-face` rules. The [`Pipeline`]
//!
//! 1. extracts the character repertoire of the font,
//! 2. orders chars by load priority according to a [`PriorityStrategy`],
//! 3. calibrates the size profile of the font on a small sample ([`FontMetrics`]),
//! 4. searches chunk boundaries hitting configured target sizes ([`BoundarySearch`]),
//! 5. writes chunk files together with [`ChunksMetadata`].
//!
//! Style rules are emitted from metadata only ([`style_rules()`]), so that chunk generation and
//! CSS emission can run separately. Subsetting itself is delegated to a [`Subsetter`]: either
//! the in-process [`LibrarySubsetter`] or an external `pyftsubset`-compatible program
//! ([`ProcessSubsetter`]).
//!
//! # Examples
//!
//! ```no_run
//! use font_chunks::{
//!     run_batch, LibrarySubsetter, MetricsCache, Pipeline, PipelineConfig,
//! };
//! use std::path::Path;
//!
//! let config = PipelineConfig::load(Path::new("fonts.json"))?;
//! let cache = MetricsCache::new();
//! let pipeline = Pipeline::new(&LibrarySubsetter, &cache, "public/fonts")
//!     .with_tuning(config.tuning)
//!     .with_working_dir(&config.base_dir);
//! let report = run_batch(&config, &[], &pipeline, 4)?;
//! for font_id in report.failed_fonts() {
//!     eprintln!("{font_id} failed");
//! }
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```

mod batch;
mod config;
mod css;
mod errors;
mod extract;
mod metadata;
mod metrics;
mod patch;
mod pipeline;
mod priority;
mod ranges;
mod search;
mod subsetter;
#[cfg(test)]
mod tests;

pub use crate::{
    batch::{default_concurrency, run_batch, BatchReport, FontReport},
    config::{Backend, CssConfig, FontConfig, PipelineConfig, SubsetterConfig, Tuning},
    css::{font_stylesheet, render_stylesheet, style_rules, StyleRule, DEFAULT_SRC_TEMPLATE},
    errors::{BatchError, ConfigError, CssError, Error, SubsetError},
    extract::extract_chars,
    metadata::{ChunkRecord, ChunksMetadata},
    metrics::{calibrate, chunking_hash, source_hash, FontKey, FontMetrics, MetricsCache},
    patch::apply_patches,
    pipeline::{JobOutcome, Pipeline},
    priority::{FrequencyTable, PriorityRanker, PriorityStrategy},
    ranges::{decode_ranges, encode_ranges, RangeParseError, UnicodeRange},
    search::{BoundarySearch, MeasuredChunk},
    subsetter::{
        from_config as subsetter_from_config, CountingSubsetter, LibrarySubsetter, OutputFormat,
        ProcessSubsetter, Subsetter,
    },
};
