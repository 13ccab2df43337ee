//! Archive sinks for route artifacts.
//!
//! Entries are addressed as `{folder}/{file}` and are write-once: writing
//! the same key twice is rejected.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Result type for archive operations
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Error types for archive operations
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Entry already written: {0}")]
    DuplicateEntry(String),

    #[error("Failed to write {key}: {message}")]
    Write { key: String, message: String },

    #[error("Archive already finished")]
    Finished,

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Payload of an archive entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveContent {
    Bytes(Vec<u8>),
    Text(String),
}

impl ArchiveContent {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ArchiveContent::Bytes(bytes) => bytes,
            ArchiveContent::Text(text) => text.as_bytes(),
        }
    }
}

/// One named blob under a folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub folder: String,
    pub file: String,
    pub content: ArchiveContent,
}

impl ArchiveEntry {
    pub fn bytes(folder: &str, file: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            folder: folder.to_string(),
            file: file.into(),
            content: ArchiveContent::Bytes(bytes),
        }
    }

    pub fn text(folder: &str, file: impl Into<String>, text: String) -> Self {
        Self {
            folder: folder.to_string(),
            file: file.into(),
            content: ArchiveContent::Text(text),
        }
    }

    /// Key inside the archive
    pub fn key(&self) -> String {
        format!("{}/{}", self.folder, self.file)
    }
}

/// Destination for archive entries.
///
/// Takes `&mut self`, so writes are serialized by whoever owns the sink.
pub trait ArchiveSink {
    fn write_entry(&mut self, entry: &ArchiveEntry) -> ArchiveResult<()>;

    /// Flush and close the archive
    fn finish(&mut self) -> ArchiveResult<()> {
        Ok(())
    }
}

/// Zip file on disk, created (or truncated) at construction
pub struct ZipArchiveSink {
    path: PathBuf,
    writer: Option<ZipWriter<File>>,
    written: HashSet<String>,
}

impl ZipArchiveSink {
    /// Create the archive, making the destination folder if needed
    pub fn create(path: impl Into<PathBuf>) -> ArchiveResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(&path)?;
        info!("Writing archive {}", path.display());
        Ok(Self {
            path,
            writer: Some(ZipWriter::new(file)),
            written: HashSet::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries written so far
    pub fn len(&self) -> usize {
        self.written.len()
    }

    pub fn is_empty(&self) -> bool {
        self.written.is_empty()
    }
}

impl ArchiveSink for ZipArchiveSink {
    fn write_entry(&mut self, entry: &ArchiveEntry) -> ArchiveResult<()> {
        let key = entry.key();
        let writer = self.writer.as_mut().ok_or(ArchiveError::Finished)?;
        if self.written.contains(&key) {
            return Err(ArchiveError::DuplicateEntry(key));
        }

        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        writer
            .start_file(key.as_str(), options)
            .map_err(|e| ArchiveError::Write {
                key: key.clone(),
                message: e.to_string(),
            })?;
        writer
            .write_all(entry.content.as_bytes())
            .map_err(|e| ArchiveError::Write {
                key: key.clone(),
                message: e.to_string(),
            })?;

        debug!("Archived {} ({} bytes)", key, entry.content.as_bytes().len());
        self.written.insert(key);
        Ok(())
    }

    fn finish(&mut self) -> ArchiveResult<()> {
        if let Some(writer) = self.writer.take() {
            writer.finish()?;
            info!("Archive {} closed with {} entries", self.path.display(), self.len());
        }
        Ok(())
    }
}

impl Drop for ZipArchiveSink {
    fn drop(&mut self) {
        if self.writer.is_some() {
            if let Err(e) = self.finish() {
                warn!("Failed to finalize {}: {}", self.path.display(), e);
            }
        }
    }
}

/// In-memory sink keeping entries in write order
#[derive(Debug, Default)]
pub struct MemoryArchive {
    entries: Vec<ArchiveEntry>,
    keys: HashSet<String>,
    reject_writes: bool,
    finished: bool,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every write, to exercise write-failure handling
    pub fn rejecting_writes() -> Self {
        Self {
            reject_writes: true,
            ..Self::default()
        }
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&ArchiveEntry> {
        self.entries.iter().find(|entry| entry.key() == key)
    }

    /// Entries under one folder
    pub fn folder(&self, folder: &str) -> Vec<&ArchiveEntry> {
        self.entries.iter().filter(|entry| entry.folder == folder).collect()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl ArchiveSink for MemoryArchive {
    fn write_entry(&mut self, entry: &ArchiveEntry) -> ArchiveResult<()> {
        let key = entry.key();
        if self.finished {
            return Err(ArchiveError::Finished);
        }
        if self.reject_writes {
            return Err(ArchiveError::Write {
                key,
                message: "sink is read-only".to_string(),
            });
        }
        if !self.keys.insert(key.clone()) {
            return Err(ArchiveError::DuplicateEntry(key));
        }
        self.entries.push(entry.clone());
        Ok(())
    }

    fn finish(&mut self) -> ArchiveResult<()> {
        self.finished = true;
        Ok(())
    }
}
