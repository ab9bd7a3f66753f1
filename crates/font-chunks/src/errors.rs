//! Error types.

use std::{error, fmt, io, path::PathBuf, process::ExitStatus};

use font_subset::ParseError;

/// Error invoking a [`Subsetter`](crate::Subsetter).
#[derive(Debug)]
#[non_exhaustive]
pub enum SubsetError {
    /// The in-process backend could not parse or subset the font.
    Parse(ParseError),
    /// The subsetting program could not be started.
    Spawn {
        /// Program name or path.
        program: String,
        /// I/O error returned by the OS.
        source: io::Error,
    },
    /// The subsetting program exited with a non-zero status.
    Process {
        /// Program name or path.
        program: String,
        /// Exit status of the program.
        status: ExitStatus,
        /// Captured standard error output.
        stderr: String,
    },
    /// I/O error when exchanging data with the subsetting program.
    Io(io::Error),
}

impl fmt::Display for SubsetError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(err) => write!(formatter, "failed subsetting font: {err}"),
            Self::Spawn { program, source } => {
                write!(formatter, "failed starting `{program}`: {source}")
            }
            Self::Process {
                program,
                status,
                stderr,
            } => {
                write!(formatter, "`{program}` failed ({status})")?;
                let stderr = stderr.trim();
                if !stderr.is_empty() {
                    write!(formatter, ": {stderr}")?;
                }
                Ok(())
            }
            Self::Io(err) => write!(formatter, "I/O error during subsetting: {err}"),
        }
    }
}

impl error::Error for SubsetError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Spawn { source, .. } => Some(source),
            Self::Io(err) => Some(err),
            Self::Process { .. } => None,
        }
    }
}

impl From<ParseError> for SubsetError {
    fn from(err: ParseError) -> Self {
        Self::Parse(err)
    }
}

impl From<io::Error> for SubsetError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Error in the pipeline configuration.
#[derive(Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// The configuration file cannot be read.
    Read {
        /// Path to the file.
        path: PathBuf,
        /// I/O error.
        source: io::Error,
    },
    /// The configuration file is not a valid configuration document.
    Parse {
        /// Path to the file.
        path: PathBuf,
        /// Deserialization error.
        source: serde_json::Error,
    },
    /// A required per-font field is missing.
    MissingField {
        /// Font identifier.
        font_id: String,
        /// Field name as it appears in the configuration file.
        field: &'static str,
    },
    /// A field has an invalid value.
    InvalidField {
        /// Font identifier, or `None` for global fields.
        font_id: Option<String>,
        /// Field name as it appears in the configuration file.
        field: &'static str,
        /// Human-readable description of the problem.
        message: String,
    },
    /// Unknown priority strategy.
    UnknownStrategy {
        /// Font identifier.
        font_id: String,
        /// Strategy identifier.
        strategy: String,
    },
    /// Referenced priority data cannot be read.
    PriorityData {
        /// Path to the priority data.
        path: PathBuf,
        /// I/O error.
        source: io::Error,
    },
    /// A font requested by the caller is not present in the configuration.
    UnknownFont(String),
}

impl ConfigError {
    pub(crate) fn invalid(font_id: &str, field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            font_id: Some(font_id.to_owned()),
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(formatter, "cannot read config `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(formatter, "invalid config `{}`: {source}", path.display())
            }
            Self::MissingField { font_id, field } => {
                write!(formatter, "font `{font_id}`: missing required field `{field}`")
            }
            Self::InvalidField {
                font_id,
                field,
                message,
            } => {
                if let Some(font_id) = font_id {
                    write!(formatter, "font `{font_id}`: ")?;
                }
                write!(formatter, "invalid `{field}`: {message}")
            }
            Self::UnknownStrategy { font_id, strategy } => write!(
                formatter,
                "font `{font_id}`: unknown priority strategy `{strategy}`"
            ),
            Self::PriorityData { path, source } => write!(
                formatter,
                "cannot read priority data `{}`: {source}",
                path.display()
            ),
            Self::UnknownFont(font_id) => write!(formatter, "font `{font_id}` is not configured"),
        }
    }
}

impl error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Read { source, .. } | Self::PriorityData { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Error emitting style rules.
#[derive(Debug)]
#[non_exhaustive]
pub enum CssError {
    /// Chunk metadata for a style cannot be loaded.
    Metadata {
        /// Path to the metadata file.
        path: PathBuf,
        /// Underlying error.
        source: Box<Error>,
    },
    /// A chunk references a file that does not exist.
    MissingFile {
        /// Font identifier.
        font_id: String,
        /// Style tag.
        style: String,
        /// Chunk index.
        index: usize,
        /// Recorded file name.
        filename: String,
    },
    /// Chunk metadata is internally inconsistent.
    Inconsistent {
        /// Font identifier.
        font_id: String,
        /// Style tag.
        style: String,
        /// Human-readable description of the problem.
        message: String,
    },
}

impl fmt::Display for CssError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Metadata { path, source } => write!(
                formatter,
                "cannot load chunk metadata `{}`: {source}",
                path.display()
            ),
            Self::MissingFile {
                font_id,
                style,
                index,
                filename,
            } => write!(
                formatter,
                "font `{font_id}` ({style}): file `{filename}` for chunk #{index} does not exist"
            ),
            Self::Inconsistent {
                font_id,
                style,
                message,
            } => write!(formatter, "font `{font_id}` ({style}): {message}"),
        }
    }
}

impl error::Error for CssError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Metadata { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Error processing a single font style.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The font character map cannot be read.
    Extraction(ParseError),
    /// The subsetter failed on the calibration sample.
    Calibration(SubsetError),
    /// The subsetter failed when measuring a chunk candidate.
    SubsetInvocation {
        /// Index of the chunk being measured.
        chunk: usize,
        /// Subsetter error.
        source: SubsetError,
    },
    /// Invalid configuration.
    Configuration(ConfigError),
    /// A font pre-processing command failed.
    Patch {
        /// Command line.
        command: String,
        /// Human-readable description of the failure.
        message: String,
    },
    /// I/O error.
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// I/O error.
        source: io::Error,
    },
    /// Chunk metadata cannot be (de)serialized.
    Metadata(serde_json::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extraction(err) => write!(formatter, "cannot read character map: {err}"),
            Self::Calibration(err) => write!(formatter, "calibration failed: {err}"),
            Self::SubsetInvocation { chunk, source } => {
                write!(formatter, "measuring chunk #{chunk} failed: {source}")
            }
            Self::Configuration(err) => fmt::Display::fmt(err, formatter),
            Self::Patch { command, message } => {
                write!(formatter, "patch command `{command}` failed: {message}")
            }
            Self::Io { path, source } => write!(formatter, "`{}`: {source}", path.display()),
            Self::Metadata(err) => write!(formatter, "invalid chunk metadata: {err}"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Extraction(err) => Some(err),
            Self::Calibration(err) | Self::SubsetInvocation { source: err, .. } => Some(err),
            Self::Configuration(err) => Some(err),
            Self::Io { source, .. } => Some(source),
            Self::Metadata(err) => Some(err),
            Self::Patch { .. } => None,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err)
    }
}

/// Error that prevents a batch from starting.
#[derive(Debug)]
#[non_exhaustive]
pub enum BatchError {
    /// Invalid configuration of the batch as a whole.
    Configuration(ConfigError),
    /// The worker pool cannot be created.
    ThreadPool(rayon::ThreadPoolBuildError),
}

impl fmt::Display for BatchError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(err) => fmt::Display::fmt(err, formatter),
            Self::ThreadPool(err) => write!(formatter, "cannot create worker pool: {err}"),
        }
    }
}

impl error::Error for BatchError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Configuration(err) => Some(err),
            Self::ThreadPool(err) => Some(err),
        }
    }
}

impl From<ConfigError> for BatchError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err)
    }
}
