//! Command-line interface for font chunking.

use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use font_chunks::{
    default_concurrency, encode_ranges, extract_chars, font_stylesheet, run_batch,
    subsetter_from_config, BatchReport, JobOutcome, MetricsCache, Pipeline, PipelineConfig,
};

#[derive(Debug, Parser)]
#[command(name = "font-chunks", version, about = "Split fonts into unicode-range chunks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate chunk files and metadata for configured fonts.
    Chunk {
        /// Path to the JSON configuration.
        #[arg(long, value_name = "FILE")]
        config: PathBuf,
        /// Output directory; each font gets a subdirectory named after its ID.
        #[arg(long, value_name = "DIR")]
        output: PathBuf,
        /// Fonts to process (repeatable). All configured fonts are processed by default.
        #[arg(long = "font", value_name = "ID")]
        fonts: Vec<String>,
        /// Number of font styles processed concurrently.
        #[arg(long)]
        jobs: Option<usize>,
    },
    /// Emit style sheets from previously generated metadata.
    Css {
        /// Path to the JSON configuration.
        #[arg(long, value_name = "FILE")]
        config: PathBuf,
        /// Output directory used when generating chunks.
        #[arg(long, value_name = "DIR")]
        output: PathBuf,
        /// Fonts to process (repeatable). All configured fonts are processed by default.
        #[arg(long = "font", value_name = "ID")]
        fonts: Vec<String>,
    },
    /// Print the character repertoire of a font as unicode-range tokens.
    Ranges {
        /// Path to the font file.
        font: PathBuf,
    },
}

fn load_config(path: &Path) -> anyhow::Result<PipelineConfig> {
    PipelineConfig::load(path)
        .with_context(|| format!("failed loading configuration from `{}`", path.display()))
}

fn chunk(
    config_path: &Path,
    output: &Path,
    fonts: &[String],
    jobs: Option<usize>,
) -> anyhow::Result<ExitCode> {
    let config = load_config(config_path)?;
    let subsetter = subsetter_from_config(&config.subsetter);
    let cache = MetricsCache::new();
    let pipeline = Pipeline::new(&*subsetter, &cache, output)
        .with_tuning(config.tuning)
        .with_working_dir(&config.base_dir);
    let concurrency = jobs
        .or(config.max_concurrency)
        .unwrap_or_else(default_concurrency);

    let report = run_batch(&config, fonts, &pipeline, concurrency).context("batch failed")?;
    print_report(&report);
    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_report(report: &BatchReport) {
    for (font_id, font_report) in &report.fonts {
        if let Some(err) = &font_report.config_error {
            println!("{font_id}: FAILED ({err})");
            continue;
        }
        for (style, result) in &font_report.styles {
            match result {
                Ok(JobOutcome::Generated(metadata)) => println!(
                    "{font_id} ({style}): generated {} chunks, {} bytes",
                    metadata.total_chunks, metadata.total_size
                ),
                Ok(JobOutcome::Skipped(metadata)) => println!(
                    "{font_id} ({style}): up to date ({} chunks)",
                    metadata.total_chunks
                ),
                Err(err) => println!("{font_id} ({style}): FAILED ({err})"),
            }
        }
    }

    let failed: Vec<_> = report.failed_fonts().collect();
    if !failed.is_empty() {
        println!("failed fonts: {}", failed.join(", "));
    }
}

fn css(config_path: &Path, output: &Path, fonts: &[String]) -> anyhow::Result<ExitCode> {
    let config = load_config(config_path)?;
    for (font_id, font) in config.select(fonts)? {
        let font_dir = output.join(font_id);
        let stylesheet = font_stylesheet(font_id, font, &font_dir)
            .with_context(|| format!("failed emitting style sheet for `{font_id}`"))?;
        let css_path = font_dir.join(format!("{font_id}.css"));
        fs::write(&css_path, stylesheet)
            .with_context(|| format!("failed writing `{}`", css_path.display()))?;
        log::info!("wrote `{}`", css_path.display());
    }
    Ok(ExitCode::SUCCESS)
}

fn ranges(font_path: &Path) -> anyhow::Result<ExitCode> {
    let font = fs::read(font_path)
        .with_context(|| format!("failed reading `{}`", font_path.display()))?;
    let chars = extract_chars(&font)?;
    let tokens: Vec<_> = encode_ranges(chars).iter().map(ToString::to_string).collect();
    println!("{}", tokens.join(", "));
    Ok(ExitCode::SUCCESS)
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Chunk {
            config,
            output,
            fonts,
            jobs,
        } => chunk(&config, &output, &fonts, jobs),
        Command::Css {
            config,
            output,
            fonts,
        } => css(&config, &output, &fonts),
        Command::Ranges { font } => ranges(&font),
    }
}
