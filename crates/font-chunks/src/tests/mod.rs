use std::{
    collections::{BTreeMap, BTreeSet},
    fs, io,
    path::{Path, PathBuf},
};

use font_subset::testing::SyntheticFont;
use tempfile::TempDir;
use test_casing::test_casing;

use crate::{
    batch::{run_batch, BatchReport},
    config::{FontConfig, PipelineConfig, Tuning},
    css::font_stylesheet,
    errors::{BatchError, ConfigError, Error, SubsetError},
    metadata::ChunksMetadata,
    metrics::MetricsCache,
    pipeline::{JobOutcome, Pipeline},
    ranges::decode_ranges,
    subsetter::{CountingSubsetter, LibrarySubsetter, OutputFormat, Subsetter},
};

/// Subsetter with a linear size model: fixed overhead plus a per-char cost,
/// CJK chars being 10x more expensive than other ones.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FakeSubsetter;

impl FakeSubsetter {
    pub(crate) const OVERHEAD: usize = 2_048;
    pub(crate) const LATIN_CHAR_SIZE: usize = 40;
    pub(crate) const CJK_CHAR_SIZE: usize = 400;

    fn is_wide(ch: char) -> bool {
        matches!(u32::from(ch), 0x2e80..=0x9fff | 0xf900..=0xfaff | 0x2_0000..=0x3_ffff)
    }

    pub(crate) fn expected_len(chars: impl IntoIterator<Item = char>) -> usize {
        let chars_size: usize = chars
            .into_iter()
            .map(|ch| {
                if Self::is_wide(ch) {
                    Self::CJK_CHAR_SIZE
                } else {
                    Self::LATIN_CHAR_SIZE
                }
            })
            .sum();
        Self::OVERHEAD + chars_size
    }
}

impl Subsetter for FakeSubsetter {
    fn subset(
        &self,
        _font: &[u8],
        chars: &BTreeSet<char>,
        _format: OutputFormat,
    ) -> Result<Vec<u8>, SubsetError> {
        Ok(vec![0; Self::expected_len(chars.iter().copied())])
    }
}

#[derive(Debug)]
pub(crate) struct FailingSubsetter;

impl Subsetter for FailingSubsetter {
    fn subset(
        &self,
        _font: &[u8],
        _chars: &BTreeSet<char>,
        _format: OutputFormat,
    ) -> Result<Vec<u8>, SubsetError> {
        Err(io::Error::other("subsetting failed").into())
    }
}

/// Printable ASCII followed by `cjk_count` consecutive CJK ideographs.
pub(crate) fn latin_and_cjk(cjk_count: usize) -> Vec<char> {
    (' '..='~')
        .chain(('\u{4e00}'..='\u{9fff}').take(cjk_count))
        .collect()
}

fn write_font(dir: &Path, name: &str, chars: impl IntoIterator<Item = char>) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, SyntheticFont::new().chars(chars).build()).unwrap();
    path
}

fn font_config(source: PathBuf, strategy: &str) -> FontConfig {
    let mut config: FontConfig = serde_json::from_value(serde_json::json!({
        "displayName": "Sample Sans",
        "weight": 400,
        "priorityStrategy": strategy,
        "chunkTargetSizes": [80, 150],
        "maxChunks": 5,
    }))
    .unwrap();
    config.sources.insert("regular".to_owned(), source);
    config
}

fn load_metadata(output: &Path, font_id: &str, style: &str) -> ChunksMetadata {
    ChunksMetadata::load(&ChunksMetadata::path(&output.join(font_id), style)).unwrap()
}

fn assert_complete(metadata: &ChunksMetadata, font_dir: &Path, expected: &BTreeSet<char>) {
    let mut covered = BTreeSet::new();
    for (index, chunk) in metadata.chunks.iter().enumerate() {
        assert_eq!(chunk.index, index);
        let chars = chunk.chars();
        assert!(!chars.is_empty());
        assert!(covered.is_disjoint(&chars), "chunk #{index} overlaps");

        let decoded = decode_ranges(chunk.unicode_ranges.iter().map(String::as_str)).unwrap();
        assert_eq!(decoded, chars);
        let file_len = fs::metadata(font_dir.join(&chunk.filename)).unwrap().len();
        assert_eq!(file_len, chunk.byte_size);
        covered.extend(chars);
    }
    assert_eq!(covered, *expected);
    assert_eq!(metadata.total_chunks, metadata.chunks.len());
    let total_size: u64 = metadata.chunks.iter().map(|chunk| chunk.byte_size).sum();
    assert_eq!(metadata.total_size, total_size);
}

#[test_casing(4, ["chinese-frequency", "latin-basic", "frequency", "codepoint"])]
fn pipeline_covers_all_chars(strategy: &str) {
    let dir = TempDir::new().unwrap();
    let chars = latin_and_cjk(1_500);
    let source = write_font(dir.path(), "Sample.ttf", chars.iter().copied());
    let mut config = font_config(source, strategy);
    config.chunk_target_sizes = vec![40.0, 100.0];
    let data_path = dir.path().join("frequencies.txt");
    fs::write(&data_path, "\u{4e8c}\n\u{4e00}\nz\n").unwrap();
    config.priority_data_ref = Some(data_path);
    config.validate("sample").unwrap();

    let output = dir.path().join("out");
    let cache = MetricsCache::new();
    let pipeline = Pipeline::new(&FakeSubsetter, &cache, &output);
    let outcome = pipeline.run("sample", &config, "regular").unwrap();
    assert!(matches!(outcome, JobOutcome::Generated(_)));
    assert_eq!(cache.len(), 1);

    let metadata = load_metadata(&output, "sample", "regular");
    assert_eq!(metadata, *outcome.metadata());
    assert!((2..=5).contains(&metadata.total_chunks), "{}", metadata.total_chunks);
    let expected: BTreeSet<char> = chars.into_iter().collect();
    assert_complete(&metadata, &output.join("sample"), &expected);
}

#[test]
fn latin_chars_go_first_with_chinese_frequency() {
    let dir = TempDir::new().unwrap();
    let chars = latin_and_cjk(300);
    let source = write_font(dir.path(), "Sample.ttf", chars.iter().copied());
    let config = font_config(source, "chinese-frequency");
    config.validate("sample").unwrap();

    let output = dir.path().join("out");
    let cache = MetricsCache::new();
    let pipeline = Pipeline::new(&FakeSubsetter, &cache, &output);
    pipeline.run("sample", &config, "regular").unwrap();

    let metadata = load_metadata(&output, "sample", "regular");
    assert_eq!(metadata.total_chunks, 2);
    let first_chunk = metadata.chunks[0].chars();
    assert!((' '..='~').all(|ch| first_chunk.contains(&ch)));
    // Common ideographs are loaded before rare ones.
    assert!(first_chunk.contains(&'\u{4e00}'));
    assert!(metadata.chunks[1].byte_size <= 150 * 1_024);
    let expected: BTreeSet<char> = chars.into_iter().collect();
    assert_complete(&metadata, &output.join("sample"), &expected);
}

#[test]
fn chunk_cap_is_respected() {
    let dir = TempDir::new().unwrap();
    let chars = latin_and_cjk(3_000);
    let source = write_font(dir.path(), "Sample.ttf", chars.iter().copied());
    let mut config = font_config(source, "codepoint");
    config.chunk_target_sizes = vec![20.0];
    config.max_chunks = Some(3);

    let output = dir.path().join("out");
    let cache = MetricsCache::new();
    let pipeline = Pipeline::new(&FakeSubsetter, &cache, &output);
    pipeline.run("sample", &config, "regular").unwrap();

    let metadata = load_metadata(&output, "sample", "regular");
    assert_eq!(metadata.total_chunks, 3);
    let expected: BTreeSet<char> = chars.into_iter().collect();
    assert_complete(&metadata, &output.join("sample"), &expected);
    let last = &metadata.chunks[2];
    let expected_len = FakeSubsetter::expected_len(last.chars());
    assert_eq!(last.byte_size, expected_len as u64);
}

#[test]
fn empty_font_produces_empty_metadata() {
    let dir = TempDir::new().unwrap();
    let source = write_font(dir.path(), "Empty.ttf", []);
    let config = font_config(source, "codepoint");

    let output = dir.path().join("out");
    let cache = MetricsCache::new();
    let subsetter = CountingSubsetter::new(FakeSubsetter);
    let pipeline = Pipeline::new(&subsetter, &cache, &output);
    pipeline.run("sample", &config, "regular").unwrap();

    let metadata = load_metadata(&output, "sample", "regular");
    assert!(metadata.chunks.is_empty());
    assert_eq!(metadata.total_size, 0);
    assert_eq!(subsetter.calls(), 0);
}

#[test]
fn rerunning_pipeline_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let source = write_font(dir.path(), "Sample.ttf", latin_and_cjk(500));
    let config = font_config(source.clone(), "chinese-frequency");
    let output = dir.path().join("out");
    let metadata_path = ChunksMetadata::path(&output.join("sample"), "regular");

    let subsetter = CountingSubsetter::new(FakeSubsetter);
    let cache = MetricsCache::new();
    let pipeline = Pipeline::new(&subsetter, &cache, &output);
    pipeline.run("sample", &config, "regular").unwrap();
    let calls = subsetter.calls();
    assert!(calls > 0);
    let metadata_bytes = fs::read(&metadata_path).unwrap();

    // Use a fresh cache to check that skipping does not rely on in-memory state.
    let cache = MetricsCache::new();
    let pipeline = Pipeline::new(&subsetter, &cache, &output);
    let outcome = pipeline.run("sample", &config, "regular").unwrap();
    assert!(matches!(outcome, JobOutcome::Skipped(_)));
    assert_eq!(subsetter.calls(), calls);
    assert_eq!(fs::read(&metadata_path).unwrap(), metadata_bytes);

    // A truncated chunk file invalidates the previous run.
    let first_chunk = output.join("sample").join("sample-regular-0.woff2");
    fs::write(&first_chunk, b"oops").unwrap();
    let outcome = pipeline.run("sample", &config, "regular").unwrap();
    assert!(matches!(outcome, JobOutcome::Generated(_)));
    assert!(subsetter.calls() > calls);

    // So does a change of the source font.
    let calls = subsetter.calls();
    write_font(dir.path(), "Sample.ttf", latin_and_cjk(501));
    let outcome = pipeline.run("sample", &config, "regular").unwrap();
    assert!(matches!(outcome, JobOutcome::Generated(_)));
    assert!(subsetter.calls() > calls);
    assert!(load_metadata(&output, "sample", "regular")
        .chars()
        .contains(&'\u{4ff4}'));
}

#[test]
fn changed_chunking_settings_invalidate_previous_run() {
    let dir = TempDir::new().unwrap();
    let chars = latin_and_cjk(300);
    let source = write_font(dir.path(), "Sample.ttf", chars.iter().copied());
    let mut config = font_config(source, "chinese-frequency");
    let output = dir.path().join("out");
    let cache = MetricsCache::new();
    let pipeline = Pipeline::new(&FakeSubsetter, &cache, &output);

    let outcome = pipeline.run("sample", &config, "regular").unwrap();
    assert!(matches!(outcome, JobOutcome::Generated(_)));
    assert!(outcome.metadata().total_chunks > 1);

    config.max_chunks = Some(1);
    config.chunk_target_sizes = vec![10.0];
    let outcome = pipeline.run("sample", &config, "regular").unwrap();
    assert!(matches!(outcome, JobOutcome::Generated(_)));
    let metadata = load_metadata(&output, "sample", "regular");
    assert_eq!(metadata.total_chunks, 1);
    let expected: BTreeSet<char> = chars.into_iter().collect();
    assert_complete(&metadata, &output.join("sample"), &expected);
    let outcome = pipeline.run("sample", &config, "regular").unwrap();
    assert!(matches!(outcome, JobOutcome::Skipped(_)));

    // Contents of the frequency table are taken into account as well.
    let data_path = dir.path().join("frequencies.txt");
    fs::write(&data_path, "\u{4e00}\n").unwrap();
    config.priority_strategy = "frequency".to_owned();
    config.priority_data_ref = Some(data_path.clone());
    let outcome = pipeline.run("sample", &config, "regular").unwrap();
    assert!(matches!(outcome, JobOutcome::Generated(_)));
    let outcome = pipeline.run("sample", &config, "regular").unwrap();
    assert!(matches!(outcome, JobOutcome::Skipped(_)));
    fs::write(&data_path, "\u{4e8c}\n").unwrap();
    let outcome = pipeline.run("sample", &config, "regular").unwrap();
    assert!(matches!(outcome, JobOutcome::Generated(_)));

    // ...and so is tuning.
    let tuning = Tuning {
        min_chunk_chars: 20,
        ..Tuning::default()
    };
    let pipeline = Pipeline::new(&FakeSubsetter, &cache, &output).with_tuning(tuning);
    let outcome = pipeline.run("sample", &config, "regular").unwrap();
    assert!(matches!(outcome, JobOutcome::Generated(_)));
}

#[test]
fn failed_measurement_leaves_no_metadata() {
    let dir = TempDir::new().unwrap();
    let source = write_font(dir.path(), "Sample.ttf", latin_and_cjk(0));
    let config = font_config(source, "codepoint");
    let output = dir.path().join("out");

    let cache = MetricsCache::new();
    let pipeline = Pipeline::new(&FailingSubsetter, &cache, &output);
    let err = pipeline.run("sample", &config, "regular").unwrap_err();
    assert!(matches!(err, Error::SubsetInvocation { chunk: 0, .. }), "{err}");
    assert!(!ChunksMetadata::path(&output.join("sample"), "regular").exists());

    // With more chars than the calibration sample, the calibration fails first.
    let source = write_font(dir.path(), "Large.ttf", latin_and_cjk(500));
    let config = font_config(source, "codepoint");
    let err = pipeline.run("sample", &config, "regular").unwrap_err();
    assert!(matches!(err, Error::Calibration(_)), "{err}");
    assert!(cache.is_empty());
}

#[test]
fn library_backend_end_to_end() {
    let dir = TempDir::new().unwrap();
    let chars = latin_and_cjk(400);
    let source = write_font(dir.path(), "Sample.ttf", chars.iter().copied());
    let mut config = font_config(source, "chinese-frequency");
    config.chunk_target_sizes = vec![8.0, 16.0];
    config.max_chunks = Some(4);

    let output = dir.path().join("out");
    let cache = MetricsCache::new();
    let pipeline = Pipeline::new(&LibrarySubsetter, &cache, &output);
    pipeline.run("sample", &config, "regular").unwrap();

    let font_dir = output.join("sample");
    let metadata = load_metadata(&output, "sample", "regular");
    assert!((1..=4).contains(&metadata.total_chunks));
    let expected: BTreeSet<char> = chars.into_iter().collect();
    assert_complete(&metadata, &font_dir, &expected);
    for chunk in &metadata.chunks {
        let data = fs::read(font_dir.join(&chunk.filename)).unwrap();
        assert_eq!(&data[..4], b"wOF2");
    }

    let css = font_stylesheet("sample", &config, &font_dir).unwrap();
    assert_eq!(css.matches("@font-face").count(), metadata.total_chunks);
    assert!(css.contains("font-family: 'Sample Sans';"));
    assert!(css.contains("font-weight: 400;"));
}

fn batch_config(dir: &Path) -> PipelineConfig {
    let good = write_font(dir, "Good.ttf", latin_and_cjk(200));
    let italic = write_font(dir, "Good-Italic.ttf", latin_and_cjk(100));
    let bad = dir.join("Bad.ttf");
    fs::write(&bad, b"definitely not a font").unwrap();

    let mut good_config = font_config(good, "chinese-frequency");
    good_config.sources.insert("italic".to_owned(), italic);
    let bad_config = font_config(bad.clone(), "codepoint");
    let mut invalid_config = font_config(bad, "codepoint");
    invalid_config.max_chunks = None;

    PipelineConfig {
        fonts: BTreeMap::from([
            ("good".to_owned(), good_config),
            ("bad".to_owned(), bad_config),
            ("invalid".to_owned(), invalid_config),
        ]),
        ..PipelineConfig::default()
    }
}

#[test_casing(2, [1_usize, 3])]
fn batch_isolates_failures(concurrency: usize) {
    let dir = TempDir::new().unwrap();
    let config = batch_config(dir.path());
    let output = dir.path().join("out");
    let cache = MetricsCache::new();
    let pipeline = Pipeline::new(&FakeSubsetter, &cache, &output);

    let report: BatchReport = run_batch(&config, &[], &pipeline, concurrency).unwrap();
    assert!(!report.is_success());
    let failed: Vec<_> = report.failed_fonts().collect();
    assert_eq!(failed, ["bad", "invalid"]);

    let good = &report.fonts["good"];
    assert!(good.is_success());
    assert_eq!(good.styles.len(), 2);
    assert!(ChunksMetadata::path(&output.join("good"), "italic").is_file());

    let bad_result = &report.fonts["bad"].styles["regular"];
    assert!(matches!(bad_result, Err(Error::Extraction(_))), "{bad_result:?}");
    assert!(!output.join("bad").exists());

    let invalid = &report.fonts["invalid"];
    assert!(invalid.styles.is_empty());
    assert!(matches!(
        invalid.config_error,
        Some(ConfigError::MissingField {
            field: "maxChunks",
            ..
        })
    ));
}

#[test]
fn batch_retries_selected_fonts() {
    let dir = TempDir::new().unwrap();
    let config = batch_config(dir.path());
    let output = dir.path().join("out");
    let cache = MetricsCache::new();
    let subsetter = CountingSubsetter::new(FakeSubsetter);
    let pipeline = Pipeline::new(&subsetter, &cache, &output);

    let report = run_batch(&config, &["good".to_owned()], &pipeline, 2).unwrap();
    assert!(report.is_success());
    assert_eq!(report.fonts.len(), 1);

    let calls = subsetter.calls();
    let report = run_batch(&config, &["good".to_owned()], &pipeline, 2).unwrap();
    assert!(report.is_success());
    let mut outcomes = report.fonts["good"].styles.values();
    assert!(outcomes.all(|outcome| matches!(outcome, Ok(JobOutcome::Skipped(_)))));
    assert_eq!(subsetter.calls(), calls);

    let err = run_batch(&config, &["missing".to_owned()], &pipeline, 2).unwrap_err();
    assert!(
        matches!(&err, BatchError::Configuration(ConfigError::UnknownFont(id)) if id == "missing"),
        "{err}"
    );
}
