//! Subsetter port and its backends.

use std::{
    collections::BTreeSet,
    sync::atomic::{AtomicUsize, Ordering},
};

pub use self::{library::LibrarySubsetter, process::ProcessSubsetter};
use crate::{
    config::{Backend, SubsetterConfig},
    errors::SubsetError,
};

mod library;
mod process;

/// Output format of a subset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// WOFF2 font.
    #[default]
    Woff2,
    /// Uncompressed OpenType font.
    TrueType,
}

/// Capability of reducing a font to a set of chars.
///
/// Implementations must be deterministic: the same inputs must produce subsets of the same size.
pub trait Subsetter: Send + Sync {
    /// Subsets `font` to `chars` and returns the encoded subset.
    ///
    /// # Errors
    ///
    /// Returns an error if the font cannot be subset.
    fn subset(
        &self,
        font: &[u8],
        chars: &BTreeSet<char>,
        format: OutputFormat,
    ) -> Result<Vec<u8>, SubsetError>;
}

impl<T: Subsetter + ?Sized> Subsetter for &T {
    fn subset(
        &self,
        font: &[u8],
        chars: &BTreeSet<char>,
        format: OutputFormat,
    ) -> Result<Vec<u8>, SubsetError> {
        (**self).subset(font, chars, format)
    }
}

impl<T: Subsetter + ?Sized> Subsetter for Box<T> {
    fn subset(
        &self,
        font: &[u8],
        chars: &BTreeSet<char>,
        format: OutputFormat,
    ) -> Result<Vec<u8>, SubsetError> {
        (**self).subset(font, chars, format)
    }
}

/// Creates a subsetter according to the configuration.
pub fn from_config(config: &SubsetterConfig) -> Box<dyn Subsetter> {
    match config.backend {
        Backend::Library => Box::new(LibrarySubsetter),
        Backend::Process => Box::new(ProcessSubsetter::new(
            &config.program,
            config.layout_features_exclude.clone(),
        )),
    }
}

/// Subsetter wrapper counting invocations of the wrapped subsetter.
#[derive(Debug, Default)]
pub struct CountingSubsetter<S> {
    inner: S,
    calls: AtomicUsize,
}

impl<S: Subsetter> CountingSubsetter<S> {
    /// Wraps the provided subsetter.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the number of invocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl<S: Subsetter> Subsetter for CountingSubsetter<S> {
    fn subset(
        &self,
        font: &[u8],
        chars: &BTreeSet<char>,
        format: OutputFormat,
    ) -> Result<Vec<u8>, SubsetError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.inner.subset(font, chars, format)
    }
}
