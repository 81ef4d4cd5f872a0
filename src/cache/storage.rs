//! Storage Backend Module
//!
//! Abstracts the named-blob operations the cache engine needs, with a
//! filesystem implementation and an in-memory fake.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tempfile::NamedTempFile;

// == Storage Trait ==
/// Named-blob storage used by the cache engine.
///
/// Names are plain file names without directory components; an
/// implementation resolves them inside its own namespace.
pub trait Storage: Send + Sync {
    /// Starts writing a blob. Nothing is visible under `name` until the
    /// returned writer is committed.
    fn create(&self, name: &str) -> io::Result<Box<dyn BlobWriter>>;

    /// Opens an existing blob for reading.
    fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send>>;

    /// Removes a blob.
    fn remove(&self, name: &str) -> io::Result<()>;

    /// Lists the names of all blobs starting with `prefix` and ending with `suffix`.
    fn list(&self, prefix: &str, suffix: &str) -> io::Result<Vec<String>>;

    /// Returns true if `err` means the blob does not exist.
    fn is_not_found(&self, err: &io::Error) -> bool {
        err.kind() == io::ErrorKind::NotFound
    }
}

/// A staged blob write.
///
/// Dropping the writer without calling [`BlobWriter::commit`] discards
/// everything written to it.
pub trait BlobWriter: Write + Send {
    /// Publishes the written bytes under the blob's name, replacing any
    /// previous blob atomically.
    fn commit(self: Box<Self>) -> io::Result<()>;
}

// == Filesystem Storage ==
/// Storage backed by one directory on the host filesystem.
#[derive(Debug, Clone)]
pub struct FsStorage {
    dir: PathBuf,
}

impl FsStorage {
    /// Creates a storage rooted at `dir`. The directory is not touched until
    /// the first operation.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the directory holding the blobs.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolves a blob name to its path.
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

/// Writes into a temp file in the target directory and renames it over the
/// destination on commit, so readers never see a partial blob.
struct FsBlobWriter {
    file: NamedTempFile,
    dest: PathBuf,
}

impl Write for FsBlobWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl BlobWriter for FsBlobWriter {
    fn commit(self: Box<Self>) -> io::Result<()> {
        let FsBlobWriter { mut file, dest } = *self;
        file.flush()?;
        file.as_file().sync_all()?;
        file.persist(&dest).map_err(|err| err.error)?;
        Ok(())
    }
}

impl Storage for FsStorage {
    fn create(&self, name: &str) -> io::Result<Box<dyn BlobWriter>> {
        // Same directory as the destination so the rename stays on one filesystem
        let file = NamedTempFile::new_in(&self.dir)?;
        Ok(Box::new(FsBlobWriter {
            file,
            dest: self.path_of(name),
        }))
    }

    fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        let file = File::open(self.path_of(name))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        fs::remove_file(self.path_of(name))
    }

    fn list(&self, prefix: &str, suffix: &str) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for dir_entry in fs::read_dir(&self.dir)? {
            let Ok(dir_entry) = dir_entry else {
                continue;
            };
            let Ok(name) = dir_entry.file_name().into_string() else {
                continue;
            };
            if name.len() >= prefix.len() + suffix.len()
                && name.starts_with(prefix)
                && name.ends_with(suffix)
            {
                names.push(name);
            }
        }
        Ok(names)
    }
}

// == Memory Storage ==
/// In-memory storage, mainly for tests.
///
/// Clones share the same blobs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw bytes under `name`, bypassing the staged write path.
    pub fn insert_raw(&self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.blobs().insert(name.into(), bytes.into());
    }

    /// Returns a copy of the bytes stored under `name`.
    pub fn get_raw(&self, name: &str) -> Option<Vec<u8>> {
        self.blobs().get(name).cloned()
    }

    /// Returns true if a blob named `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.blobs().contains_key(name)
    }

    /// Returns the number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs().len()
    }

    /// Returns true if no blobs are stored.
    pub fn is_empty(&self) -> bool {
        self.blobs().is_empty()
    }

    fn blobs(&self) -> MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct MemoryBlobWriter {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    name: String,
    buf: Vec<u8>,
}

impl Write for MemoryBlobWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BlobWriter for MemoryBlobWriter {
    fn commit(self: Box<Self>) -> io::Result<()> {
        let MemoryBlobWriter { blobs, name, buf } = *self;
        blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, buf);
        Ok(())
    }
}

impl Storage for MemoryStorage {
    fn create(&self, name: &str) -> io::Result<Box<dyn BlobWriter>> {
        Ok(Box::new(MemoryBlobWriter {
            blobs: Arc::clone(&self.blobs),
            name: name.to_string(),
            buf: Vec::new(),
        }))
    }

    fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        match self.get_raw(name) {
            Some(bytes) => Ok(Box::new(Cursor::new(bytes))),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no blob named {name}"),
            )),
        }
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        match self.blobs().remove(name) {
            Some(_) => Ok(()),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no blob named {name}"),
            )),
        }
    }

    fn list(&self, prefix: &str, suffix: &str) -> io::Result<Vec<String>> {
        Ok(self
            .blobs()
            .keys()
            .filter(|name| {
                name.len() >= prefix.len() + suffix.len()
                    && name.starts_with(prefix)
                    && name.ends_with(suffix)
            })
            .cloned()
            .collect())
    }
}
