//! Chunk boundary search.

use std::collections::BTreeSet;

use crate::{
    config::Tuning,
    errors::Error,
    metrics::FontMetrics,
    subsetter::{OutputFormat, Subsetter},
};

/// Chunk produced by [`BoundarySearch`] together with its measured subset.
#[derive(Debug, Clone)]
pub struct MeasuredChunk {
    /// Chunk chars in priority order.
    pub chars: Vec<char>,
    /// Encoded subset for the chunk chars.
    pub data: Vec<u8>,
}

/// Partitions a priority list into chunks fitting target sizes.
///
/// Each chunk is estimated from the metrics, measured with the subsetter and corrected
/// at most once: shrunk if it exceeds the target, or grown if it is underfilled and
/// the grown candidate still fits. Once the chunk cap is reached, remaining chars
/// are folded into the last chunk.
pub struct BoundarySearch<'a> {
    subsetter: &'a dyn Subsetter,
    font: &'a [u8],
    metrics: Option<FontMetrics>,
    tuning: &'a Tuning,
    target_sizes: Vec<f64>,
    max_chunks: usize,
}

impl std::fmt::Debug for BoundarySearch<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("BoundarySearch")
            .field("metrics", &self.metrics)
            .field("tuning", &self.tuning)
            .field("target_sizes", &self.target_sizes)
            .field("max_chunks", &self.max_chunks)
            .finish_non_exhaustive()
    }
}

impl<'a> BoundarySearch<'a> {
    /// Creates a search. Without `metrics`, each candidate initially spans all remaining chars.
    pub fn new(
        subsetter: &'a dyn Subsetter,
        font: &'a [u8],
        metrics: Option<FontMetrics>,
        tuning: &'a Tuning,
    ) -> Self {
        Self {
            subsetter,
            font,
            metrics,
            tuning,
            target_sizes: vec![],
            max_chunks: usize::MAX,
        }
    }

    /// Sets target sizes in bytes per chunk index. The last size applies to all later chunks.
    /// Without target sizes, chunks are unbounded.
    #[must_use]
    pub fn with_target_sizes(mut self, target_sizes: impl Into<Vec<f64>>) -> Self {
        self.target_sizes = target_sizes.into();
        self
    }

    /// Sets the chunk cap.
    #[must_use]
    pub fn with_max_chunks(mut self, max_chunks: usize) -> Self {
        self.max_chunks = max_chunks.max(1);
        self
    }

    fn target_size(&self, index: usize) -> f64 {
        match self.target_sizes.as_slice() {
            [] => f64::INFINITY,
            sizes => sizes[index.min(sizes.len() - 1)],
        }
    }

    fn measure(&self, index: usize, chars: &[char]) -> Result<Vec<u8>, Error> {
        let set: BTreeSet<char> = chars.iter().copied().collect();
        let data = self
            .subsetter
            .subset(self.font, &set, OutputFormat::Woff2)
            .map_err(|source| Error::SubsetInvocation {
                chunk: index,
                source,
            })?;
        log::debug!(
            "chunk #{index}: {} chars measured at {} bytes",
            chars.len(),
            data.len()
        );
        Ok(data)
    }

    fn estimate_count(&self, target_size: f64, remaining: usize) -> usize {
        let Some(metrics) = &self.metrics else {
            return remaining;
        };
        let estimate = metrics.estimate_count(target_size, remaining);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        // saturating conversion; the estimate is non-negative
        let estimate = if estimate >= remaining as f64 {
            remaining
        } else {
            estimate as usize
        };
        estimate.max(self.tuning.min_chunk_chars).min(remaining)
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )] // char counts are small
    fn scale(count: usize, factor: f64) -> usize {
        (count as f64 * factor).floor() as usize
    }

    /// Partitions `priority_list` into chunks.
    ///
    /// Each chunk takes one measurement plus at most one correction (shrink, or grow if
    /// the grown candidate still fits). When the chunk cap is reached, the remaining chars
    /// are folded into the last chunk, which is measured once more; so the last chunk
    /// may take up to 3 subsetter calls, and it may exceed its target size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SubsetInvocation`] if a measurement fails. No chunks are returned
    /// in this case.
    pub fn run(&self, priority_list: &[char]) -> Result<Vec<MeasuredChunk>, Error> {
        let mut chunks = Vec::<MeasuredChunk>::new();
        let mut start = 0;
        while start < priority_list.len() && chunks.len() < self.max_chunks {
            let index = chunks.len();
            let remaining = &priority_list[start..];
            let target_size = self.target_size(index);

            let mut count = self.estimate_count(target_size, remaining.len());
            let mut data = self.measure(index, &remaining[..count])?;
            #[allow(clippy::cast_precision_loss)]
            let size = data.len() as f64;

            if size > target_size && count > 1 {
                let shrunk = Self::scale(count, self.tuning.shrink_factor).clamp(1, count - 1);
                log::debug!("chunk #{index}: shrinking {count} -> {shrunk} chars");
                data = self.measure(index, &remaining[..shrunk])?;
                count = shrunk;
            } else if size < target_size * self.tuning.underfill_ratio && count < remaining.len() {
                let grown = Self::scale(count, self.tuning.grow_factor)
                    .max(count + 1)
                    .min(remaining.len());
                log::debug!("chunk #{index}: growing {count} -> {grown} chars");
                let grown_data = self.measure(index, &remaining[..grown])?;
                #[allow(clippy::cast_precision_loss)]
                let grown_size = grown_data.len() as f64;
                if grown_size <= target_size {
                    data = grown_data;
                    count = grown;
                }
            }

            log::info!(
                "chunk #{index}: {count} chars, {} bytes (target {target_size:.0})",
                data.len()
            );
            chunks.push(MeasuredChunk {
                chars: remaining[..count].to_vec(),
                data,
            });
            start += count;
        }

        if start < priority_list.len() {
            let index = chunks.len().saturating_sub(1);
            if let Some(last) = chunks.last_mut() {
                let tail = &priority_list[start..];
                log::warn!(
                    "chunk cap ({}) reached; folding {} remaining chars into chunk #{index}",
                    self.max_chunks,
                    tail.len()
                );
                last.chars.extend_from_slice(tail);
                last.data = self.measure(index, &last.chars)?;
            }
        }
        Ok(chunks)
    }
}
