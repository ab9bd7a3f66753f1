//! Size metrics calibration.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{PoisonError, RwLock},
};

use sha2::{Digest, Sha256};

use crate::{
    config::{FontConfig, Tuning},
    errors::SubsetError,
    subsetter::{OutputFormat, Subsetter},
};

/// Estimated size profile of a font subset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontMetrics {
    /// Average encoded size of a single char in bytes.
    pub avg_char_size: f64,
    /// Fixed size of a subset (shared tables, compression overhead) in bytes.
    pub base_overhead_size: f64,
}

impl FontMetrics {
    /// Estimates the number of chars fitting into `target_size` bytes, with the overhead
    /// amortized over `remaining` chars.
    pub fn estimate_count(&self, target_size: f64, remaining: usize) -> f64 {
        #[allow(clippy::cast_precision_loss)] // char counts are small
        let amortized_overhead = self.base_overhead_size / remaining.max(1) as f64;
        let per_char = self.avg_char_size + amortized_overhead;
        if per_char > 0.0 {
            (target_size / per_char).floor()
        } else {
            f64::INFINITY
        }
    }
}

/// Computes the identity hash of font data used in [`FontKey`]s and chunk metadata.
pub fn source_hash(font: &[u8], patch_commands: &[Vec<String>]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(font);
    for command in patch_commands {
        hasher.update([0_u8]);
        for arg in command {
            hasher.update(arg.as_bytes());
            hasher.update([0xff_u8]);
        }
    }
    hex::encode(hasher.finalize())
}

/// Computes the hash of inputs that determine the chunk partition of a font style:
/// target sizes, the chunk cap, the priority strategy together with its frequency table
/// (`priority_data` is the raw table file), the chunk file name pattern and `tuning`.
pub fn chunking_hash(
    config: &FontConfig,
    priority_data: Option<&[u8]>,
    tuning: &Tuning,
) -> String {
    let mut hasher = Sha256::new();
    for size in config.target_sizes() {
        hasher.update(size.to_bits().to_le_bytes());
    }
    hasher.update([0xff_u8]);
    hasher.update((config.chunk_cap() as u64).to_le_bytes());
    hasher.update(config.priority_strategy.as_bytes());
    hasher.update([0xff_u8]);
    match priority_data {
        Some(data) => {
            hasher.update([1_u8]);
            hasher.update((data.len() as u64).to_le_bytes());
            hasher.update(data);
        }
        None => hasher.update([0_u8]),
    }
    hasher.update(config.filename_pattern.as_bytes());
    hasher.update([0xff_u8]);

    let Tuning {
        sample_size,
        overhead_ratio,
        shrink_factor,
        grow_factor,
        underfill_ratio,
        min_chunk_chars,
        min_file_size,
    } = *tuning;
    hasher.update((sample_size as u64).to_le_bytes());
    for factor in [overhead_ratio, shrink_factor, grow_factor, underfill_ratio] {
        hasher.update(factor.to_bits().to_le_bytes());
    }
    hasher.update((min_chunk_chars as u64).to_le_bytes());
    hasher.update(min_file_size.to_le_bytes());
    hex::encode(hasher.finalize())
}

/// Key of [`MetricsCache`] entries: font identity + style tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FontKey {
    hash: String,
    style: String,
}

impl FontKey {
    /// Creates a key from a hash returned by [`source_hash()`].
    pub fn new(hash: &str, style: &str) -> Self {
        Self {
            hash: hash.to_owned(),
            style: style.to_owned(),
        }
    }
}

/// Cache of calibrated metrics shared by pipeline jobs.
#[derive(Debug, Default)]
pub struct MetricsCache {
    entries: RwLock<HashMap<FontKey, FontMetrics>>,
}

impl MetricsCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets cached metrics.
    pub fn get(&self, key: &FontKey) -> Option<FontMetrics> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).copied()
    }

    /// Returns the number of cached entries.
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.len()
    }

    /// Checks whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gets cached metrics or calibrates them with the provided closure. The closure runs
    /// without holding the cache lock; if several callers race for the same key, the first
    /// inserted value wins.
    ///
    /// # Errors
    ///
    /// Propagates calibration errors; nothing is cached in this case.
    pub fn get_or_calibrate<E>(
        &self,
        key: &FontKey,
        calibrate: impl FnOnce() -> Result<FontMetrics, E>,
    ) -> Result<FontMetrics, E> {
        if let Some(metrics) = self.get(key) {
            log::debug!("using cached metrics for {key:?}: {metrics:?}");
            return Ok(metrics);
        }
        let metrics = calibrate()?;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Ok(*entries.entry(key.clone()).or_insert(metrics))
    }
}

/// Calibrates metrics by subsetting the font to `sample`.
///
/// # Errors
///
/// Propagates subsetter errors.
pub fn calibrate(
    subsetter: &dyn Subsetter,
    font: &[u8],
    sample: &[char],
    tuning: &Tuning,
) -> Result<FontMetrics, SubsetError> {
    let chars: BTreeSet<char> = sample.iter().copied().collect();
    let output = subsetter.subset(font, &chars, OutputFormat::Woff2)?;

    #[allow(clippy::cast_precision_loss)] // sizes are small
    let output_len = output.len() as f64;
    #[allow(clippy::cast_precision_loss)]
    let char_count = chars.len().max(1) as f64;
    let metrics = FontMetrics {
        avg_char_size: output_len / char_count,
        base_overhead_size: output_len * tuning.overhead_ratio,
    };
    log::debug!(
        "calibrated on {} chars ({} bytes): {metrics:?}",
        chars.len(),
        output.len()
    );
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;
    use crate::tests::FakeSubsetter;

    #[test]
    fn calibrating_metrics() {
        let subsetter = FakeSubsetter;
        let sample: Vec<char> = ('a'..='z').collect();
        let metrics = calibrate(&subsetter, b"font", &sample, &Tuning::default()).unwrap();

        let expected_size = FakeSubsetter::OVERHEAD + 26 * FakeSubsetter::LATIN_CHAR_SIZE;
        assert!((metrics.avg_char_size - expected_size as f64 / 26.0).abs() < 1e-9);
        assert!((metrics.base_overhead_size - expected_size as f64 * 0.1).abs() < 1e-9);
    }

    #[test]
    fn estimating_char_count() {
        let metrics = FontMetrics {
            avg_char_size: 100.0,
            base_overhead_size: 1_000.0,
        };
        assert_eq!(metrics.estimate_count(10_000.0, 1_000), 99.0);
        assert_eq!(metrics.estimate_count(10_000.0, 10), 50.0);
        let zero = FontMetrics {
            avg_char_size: 0.0,
            base_overhead_size: 0.0,
        };
        assert!(zero.estimate_count(10.0, 10).is_infinite());
    }

    #[test]
    fn source_hash_depends_on_patches() {
        let plain = source_hash(b"font", &[]);
        assert_eq!(plain.len(), 64);
        assert_eq!(plain, source_hash(b"font", &[]));
        let patched = source_hash(b"font", &[vec!["halt-fix".to_owned()]]);
        assert_ne!(plain, patched);
        assert_ne!(plain, source_hash(b"font!", &[]));
    }

    #[test]
    fn chunking_hash_depends_on_chunking_inputs() {
        let config: FontConfig = serde_json::from_value(serde_json::json!({
            "displayName": "Sample Sans",
            "chunkTargetSizes": [80, 150],
            "maxChunks": 5,
        }))
        .unwrap();
        let tuning = Tuning::default();
        let hash = chunking_hash(&config, None, &tuning);
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, chunking_hash(&config.clone(), None, &tuning));

        let mut renamed = config.clone();
        renamed.display_name = "Other Sans".to_owned();
        assert_eq!(hash, chunking_hash(&renamed, None, &tuning));

        let mut capped = config.clone();
        capped.max_chunks = Some(1);
        assert_ne!(hash, chunking_hash(&capped, None, &tuning));
        let mut resized = config.clone();
        resized.chunk_target_sizes = vec![80.0];
        assert_ne!(hash, chunking_hash(&resized, None, &tuning));
        let mut ranked = config.clone();
        ranked.priority_strategy = "latin-basic".to_owned();
        assert_ne!(hash, chunking_hash(&ranked, None, &tuning));
        let mut renamed_files = config.clone();
        renamed_files.filename_pattern = "{fontId}-{index}.woff2".to_owned();
        assert_ne!(hash, chunking_hash(&renamed_files, None, &tuning));

        let with_table = chunking_hash(&config, Some("\u{4e00}\n".as_bytes()), &tuning);
        assert_ne!(hash, with_table);
        assert_ne!(
            with_table,
            chunking_hash(&config, Some("\u{4e8c}\n".as_bytes()), &tuning)
        );

        let tuned = Tuning {
            shrink_factor: 0.5,
            ..tuning
        };
        assert_ne!(hash, chunking_hash(&config, None, &tuned));
    }

    #[test]
    fn cache_calibrates_once_per_key() {
        let cache = MetricsCache::new();
        let key = FontKey::new(&source_hash(b"font", &[]), "regular");
        let metrics = FontMetrics {
            avg_char_size: 10.0,
            base_overhead_size: 5.0,
        };

        let mut calls = 0;
        for _ in 0..3 {
            let cached = cache
                .get_or_calibrate(&key, || {
                    calls += 1;
                    Ok::<_, Infallible>(metrics)
                })
                .unwrap();
            assert_eq!(cached, metrics);
        }
        assert_eq!(calls, 1);

        let other_style = FontKey::new(&source_hash(b"font", &[]), "italic");
        assert_eq!(cache.get(&other_style), None);
        let err = cache
            .get_or_calibrate(&other_style, || Err("calibration failed"))
            .unwrap_err();
        assert_eq!(err, "calibration failed");
        assert_eq!(cache.len(), 1);
    }
}
