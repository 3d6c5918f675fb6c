//! Seekable decrypting reader
//!
//! Presents a stored blob as a plaintext `Read + Seek` stream. Only the block
//! under the current position is ever decrypted; the most recent one is kept
//! in a single-slot cache so sequential small reads cost one decryption per
//! block.

use crate::format::BlobFormat;
use crate::{Result, StoreError};
use crydrv_crypto::{decrypt_block, ContentKey};
use parking_lot::Mutex;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, trace};

struct CachedBlock {
    index: u64,
    data: Arc<[u8]>,
}

/// Single-slot cache of the most recently decrypted block
#[derive(Default)]
pub struct BlockCache {
    slot: Mutex<Option<CachedBlock>>,
}

impl BlockCache {
    /// The cached plaintext of block `index`, if that is the block held
    pub fn get(&self, index: u64) -> Option<Arc<[u8]>> {
        self.slot
            .lock()
            .as_ref()
            .filter(|cached| cached.index == index)
            .map(|cached| Arc::clone(&cached.data))
    }

    /// Replace the cached block
    pub fn put(&self, index: u64, data: Arc<[u8]>) {
        *self.slot.lock() = Some(CachedBlock { index, data });
    }

    /// Index of the cached block
    pub fn cached_index(&self) -> Option<u64> {
        self.slot.lock().as_ref().map(|cached| cached.index)
    }
}

/// Plaintext view over an encrypted blob
pub struct BlobReader<R = File> {
    resource: R,
    key: ContentKey,
    format: BlobFormat,
    block_count: u64,
    total_size: u64,
    position: u64,
    cache: BlockCache,
    modified: Option<SystemTime>,
}

impl BlobReader<File> {
    /// Open the blob at `path`.
    ///
    /// The last block is decrypted immediately to learn the plaintext size, so
    /// a wrong key fails here with [`StoreError::Integrity`].
    pub fn open(path: &Path, key: &ContentKey, format: BlobFormat) -> Result<Self> {
        let file = File::open(path)?;
        let metadata = file.metadata()?;
        let mut reader = Self::from_resource(file, metadata.len(), key, format)?;
        reader.modified = metadata.modified().ok();
        Ok(reader)
    }
}

impl<R: Read + Seek> BlobReader<R> {
    /// Wrap any seekable resource holding `physical_len` bytes of blob
    pub fn from_resource(
        resource: R,
        physical_len: u64,
        key: &ContentKey,
        format: BlobFormat,
    ) -> Result<Self> {
        let block_count = format.block_count(physical_len);
        let mut reader = Self {
            resource,
            key: key.clone(),
            format,
            block_count,
            total_size: 0,
            position: 0,
            cache: BlockCache::default(),
            modified: None,
        };

        if block_count > 0 {
            let last = block_count - 1;
            let data = reader.load_block(last)?;
            reader.total_size = format.plaintext_len(block_count, data.len());
            reader.cache.put(last, data);
        }

        debug!(
            block_count,
            physical_len,
            total_size = reader.total_size,
            "Opened blob"
        );
        Ok(reader)
    }

    /// Plaintext size in bytes
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Number of encrypted blocks
    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    /// Modification time of the underlying file, when known
    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    fn block(&mut self, index: u64) -> Result<Arc<[u8]>> {
        if let Some(data) = self.cache.get(index) {
            return Ok(data);
        }
        let data = self.load_block(index)?;
        self.cache.put(index, Arc::clone(&data));
        Ok(data)
    }

    fn load_block(&mut self, index: u64) -> Result<Arc<[u8]>> {
        let sealed_len = self.format.encrypted_block_size();
        self.resource
            .seek(SeekFrom::Start(self.format.block_offset(index)))?;

        let mut sealed = Vec::with_capacity(sealed_len);
        Read::by_ref(&mut self.resource)
            .take(sealed_len as u64)
            .read_to_end(&mut sealed)?;

        let plaintext = decrypt_block(&self.key, &sealed)?;
        trace!(index, len = plaintext.len(), "Decrypted block");
        Ok(plaintext.into())
    }
}

impl<R: Read + Seek> Read for BlobReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.position >= self.total_size {
            return Ok(0);
        }

        let block_size = self.format.block_size() as u64;
        let index = self.position / block_size;
        let offset = (self.position % block_size) as usize;
        let block = self.block(index)?;

        // Only the last block may be short; anything else is a damaged blob
        let available = match block.get(offset..) {
            Some(rest) if !rest.is_empty() => rest,
            _ => {
                return Err(StoreError::InvalidFormat(format!(
                    "block {index} shorter than expected"
                ))
                .into())
            }
        };

        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.position += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for BlobReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let total = i128::from(self.total_size);
        let target = match pos {
            SeekFrom::Start(n) => i128::from(n),
            SeekFrom::Current(delta) => i128::from(self.position) + i128::from(delta),
            SeekFrom::End(delta) => total + i128::from(delta),
        };
        self.position = target.clamp(0, total) as u64;
        Ok(self.position)
    }
}

impl<R> fmt::Debug for BlobReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobReader")
            .field("block_count", &self.block_count)
            .field("total_size", &self.total_size)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}
