//! Locked blob operations
//!
//! `BlobStore` ties the reader and writer to the path lock registry: reads
//! hold a shared lock for as long as the returned reader lives, writes and
//! deletes hold an exclusive lock for the whole operation.

use crate::format::BlobFormat;
use crate::lock::{LockManager, LockMode, PathGuard};
use crate::reader::BlobReader;
use crate::writer::write_blob;
use crate::Result;
use crydrv_crypto::ContentKey;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Encrypted blob store rooted at caller-supplied storage paths
#[derive(Clone)]
pub struct BlobStore {
    locks: Arc<LockManager>,
    format: BlobFormat,
}

impl BlobStore {
    /// Create a store with its own lock registry
    pub fn new(format: BlobFormat) -> Self {
        Self::with_lock_manager(Arc::new(LockManager::new()), format)
    }

    /// Create a store sharing an existing lock registry
    pub fn with_lock_manager(locks: Arc<LockManager>, format: BlobFormat) -> Self {
        Self { locks, format }
    }

    /// The path lock registry behind this store
    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    /// Hold a shared lock on `path` until the guard is dropped
    pub fn lock_shared(&self, path: &Path) -> PathGuard {
        self.locks.acquire(path, LockMode::Shared)
    }

    /// Hold an exclusive lock on `path` until the guard is dropped
    pub fn lock_exclusive(&self, path: &Path) -> PathGuard {
        self.locks.acquire(path, LockMode::Exclusive)
    }

    /// Open a blob for reading. The shared lock lives as long as the reader.
    pub fn open_for_read(&self, path: &Path, key: &ContentKey) -> Result<LockedBlobReader> {
        let guard = self.lock_shared(path);
        let reader = BlobReader::open(path, key, self.format)?;
        Ok(LockedBlobReader {
            reader,
            _guard: guard,
        })
    }

    /// Replace the blob at `path` with `source_len` bytes from `source`
    pub fn write_all<R: Read + ?Sized>(
        &self,
        path: &Path,
        source: &mut R,
        source_len: u64,
        key: &ContentKey,
    ) -> Result<u64> {
        let _guard = self.lock_exclusive(path);
        write_blob(path, source, source_len, key, &self.format)
    }

    /// Remove the blob at `path`
    pub fn delete(&self, path: &Path) -> Result<()> {
        let _guard = self.lock_exclusive(path);
        fs::remove_file(path)?;
        debug!("Deleted blob");
        Ok(())
    }
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("format", &self.format)
            .field("locked_paths", &self.locks.len())
            .finish()
    }
}

/// A [`BlobReader`] that keeps its path share-locked until dropped
#[derive(Debug)]
pub struct LockedBlobReader {
    // Declared first so the file closes before the lock is released
    reader: BlobReader,
    _guard: PathGuard,
}

impl Deref for LockedBlobReader {
    type Target = BlobReader;

    fn deref(&self) -> &BlobReader {
        &self.reader
    }
}

impl Read for LockedBlobReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Seek for LockedBlobReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.reader.seek(pos)
    }
}
