//! Chunk metadata records.

use std::{
    collections::BTreeSet,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{errors::Error, ranges::decode_ranges};

/// Metadata of a single chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    /// Zero-based chunk index.
    pub index: usize,
    /// Chunk chars in priority order.
    pub characters: String,
    /// CSS `unicode-range` tokens covering exactly the chunk chars.
    pub unicode_ranges: Vec<String>,
    /// Size of the chunk file in bytes.
    pub byte_size: u64,
    /// Chunk file name relative to the font output directory.
    pub filename: String,
}

impl ChunkRecord {
    /// Returns the set of chunk chars.
    pub fn chars(&self) -> BTreeSet<char> {
        self.characters.chars().collect()
    }

    /// Checks that `unicode_ranges` decode exactly to the chunk chars.
    pub fn ranges_match_chars(&self) -> bool {
        decode_ranges(self.unicode_ranges.iter().map(String::as_str))
            .is_ok_and(|decoded| decoded == self.chars())
    }
}

/// Durable record of chunks generated for a font style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunksMetadata {
    /// Font identifier.
    pub font_id: String,
    /// Font family name.
    pub display_name: String,
    /// Style tag.
    pub style: String,
    /// Identity hash of the source font data (see [`source_hash()`](crate::source_hash)).
    pub source_hash: String,
    /// Hash of the inputs determining the chunk partition
    /// (see [`chunking_hash()`](crate::chunking_hash)). Empty for records that predate it.
    #[serde(default)]
    pub chunking_hash: String,
    /// Chunks in index order.
    pub chunks: Vec<ChunkRecord>,
    /// Number of chunks.
    pub total_chunks: usize,
    /// Total size of chunk files in bytes.
    pub total_size: u64,
    /// Generation timestamp.
    pub generated_at: DateTime<Utc>,
}

impl ChunksMetadata {
    /// Returns the path to the metadata file for a style within the font output directory.
    pub fn path(font_dir: &Path, style: &str) -> PathBuf {
        font_dir.join(format!("chunks-{style}.json"))
    }

    /// Loads metadata from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let raw = fs::read(path).map_err(Error::io(path))?;
        serde_json::from_slice(&raw).map_err(Error::Metadata)
    }

    /// Writes metadata to a file. The file is replaced atomically, so readers never observe
    /// a partially written record.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_atomically(&self, path: &Path) -> Result<(), Error> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(Error::io(dir))?;
        serde_json::to_writer_pretty(&mut file, self).map_err(Error::Metadata)?;
        file.write_all(b"\n").map_err(Error::io(file.path()))?;
        file.persist(path).map_err(|err| Error::Io {
            path: path.to_owned(),
            source: err.error,
        })?;
        Ok(())
    }

    /// Checks whether chunks recorded in this metadata are still valid for a font with
    /// the specified source and chunking hashes: both hashes must match, and every chunk file
    /// must exist, be at least `min_size` bytes long and have the recorded size.
    pub fn is_satisfied(
        &self,
        font_dir: &Path,
        source_hash: &str,
        chunking_hash: &str,
        min_size: u64,
    ) -> bool {
        if self.source_hash != source_hash
            || self.chunking_hash.is_empty()
            || self.chunking_hash != chunking_hash
            || self.chunks.len() != self.total_chunks
        {
            return false;
        }
        self.chunks.iter().all(|chunk| {
            let Ok(file_meta) = fs::metadata(font_dir.join(&chunk.filename)) else {
                return false;
            };
            file_meta.is_file() && file_meta.len() >= min_size && file_meta.len() == chunk.byte_size
        })
    }

    /// Returns all chars covered by the chunks.
    pub fn chars(&self) -> BTreeSet<char> {
        self.chunks.iter().flat_map(ChunkRecord::chars).collect()
    }
}
