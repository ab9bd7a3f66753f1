//! Batch processing of configured fonts.

use std::{collections::BTreeMap, num::NonZeroUsize, thread};

use rayon::{prelude::*, ThreadPoolBuilder};

use crate::{
    config::PipelineConfig,
    errors::{BatchError, ConfigError, Error},
    pipeline::{JobOutcome, Pipeline},
};

/// Upper bound of the default concurrency, so that external subsetting processes
/// do not overwhelm the host.
const MAX_DEFAULT_CONCURRENCY: usize = 4;

/// Returns the default number of concurrently processed font styles.
pub fn default_concurrency() -> usize {
    thread::available_parallelism()
        .map_or(1, NonZeroUsize::get)
        .min(MAX_DEFAULT_CONCURRENCY)
}

/// Results of processing a single font.
#[derive(Debug, Default)]
pub struct FontReport {
    /// Configuration error that prevented the font from being processed.
    pub config_error: Option<ConfigError>,
    /// Per-style outcomes.
    pub styles: BTreeMap<String, Result<JobOutcome, Error>>,
}

impl FontReport {
    /// Checks whether all styles of the font were processed successfully.
    pub fn is_success(&self) -> bool {
        self.config_error.is_none() && self.styles.values().all(Result::is_ok)
    }
}

/// Results of a batch run keyed by the font identifier.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Per-font reports.
    pub fonts: BTreeMap<String, FontReport>,
}

impl BatchReport {
    /// Checks whether all fonts were processed successfully.
    pub fn is_success(&self) -> bool {
        self.fonts.values().all(FontReport::is_success)
    }

    /// Returns identifiers of fonts that failed, so that they can be retried.
    pub fn failed_fonts(&self) -> impl Iterator<Item = &str> + '_ {
        self.fonts
            .iter()
            .filter(|(_, report)| !report.is_success())
            .map(|(font_id, _)| font_id.as_str())
    }
}

/// Runs `pipeline` for all styles of the selected fonts (all configured fonts if `font_ids`
/// is empty). Styles are processed concurrently on a dedicated pool of `concurrency` threads.
///
/// A failing font style never aborts other ones; its error is recorded in the returned report.
///
/// # Errors
///
/// Returns an error if a selected font is not configured, or if the worker pool cannot
/// be created.
pub fn run_batch(
    config: &PipelineConfig,
    font_ids: &[String],
    pipeline: &Pipeline<'_>,
    concurrency: usize,
) -> Result<BatchReport, BatchError> {
    let fonts = config.select(font_ids)?;
    let pool = ThreadPoolBuilder::new()
        .num_threads(concurrency.max(1))
        .thread_name(|index| format!("font-chunks-{index}"))
        .build()
        .map_err(BatchError::ThreadPool)?;

    let mut report = BatchReport::default();
    let mut jobs = vec![];
    for (font_id, font) in fonts {
        let font_report = report.fonts.entry(font_id.to_owned()).or_default();
        if let Err(err) = font.validate(font_id) {
            log::warn!("skipping font `{font_id}`: {err}");
            font_report.config_error = Some(err);
            continue;
        }
        jobs.extend(font.styles().into_iter().map(|style| (font_id, font, style)));
    }
    log::info!(
        "processing {} font styles on {} threads",
        jobs.len(),
        pool.current_num_threads()
    );

    let results: Vec<_> = pool.install(|| {
        jobs.par_iter()
            .map(|&(font_id, font, style)| {
                let result = pipeline.run(font_id, font, style);
                if let Err(err) = &result {
                    log::warn!("font `{font_id}` ({style}) failed: {err}");
                }
                (font_id, style, result)
            })
            .collect()
    });

    for (font_id, style, result) in results {
        if let Some(font_report) = report.fonts.get_mut(font_id) {
            font_report.styles.insert(style.to_owned(), result);
        }
    }
    Ok(report)
}
