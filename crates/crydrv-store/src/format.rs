//! Blob geometry
//!
//! A blob is a plain concatenation of encrypted blocks. All blocks but the last
//! seal exactly `block_size` plaintext bytes; the last one may be shorter. The
//! plaintext length therefore follows from the physical length and the last
//! block alone, without any header or footer.

use crate::{Result, StoreError, DEFAULT_BLOCK_SIZE};
use crydrv_crypto::BLOCK_OVERHEAD;

/// Block sizing shared by reader and writer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlobFormat {
    block_size: usize,
}

impl Default for BlobFormat {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl BlobFormat {
    /// Create with a custom plaintext block size
    pub fn with_block_size(block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(StoreError::InvalidFormat(
                "block size must be at least 1 byte".to_string(),
            ));
        }
        Ok(Self { block_size })
    }

    /// Plaintext bytes per full block
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// On-disk bytes per full block
    pub fn encrypted_block_size(&self) -> usize {
        self.block_size + BLOCK_OVERHEAD
    }

    /// Number of blocks in a blob of `physical_len` bytes
    pub fn block_count(&self, physical_len: u64) -> u64 {
        physical_len.div_ceil(self.encrypted_block_size() as u64)
    }

    /// Physical offset of block `index`
    pub fn block_offset(&self, index: u64) -> u64 {
        index * self.encrypted_block_size() as u64
    }

    /// Plaintext length given the block count and the last block's plaintext length
    pub fn plaintext_len(&self, block_count: u64, last_block_len: usize) -> u64 {
        match block_count {
            0 => 0,
            n => (n - 1) * self.block_size as u64 + last_block_len as u64,
        }
    }

    /// Physical length of a blob holding `plaintext_len` bytes
    pub fn physical_len(&self, plaintext_len: u64) -> u64 {
        let blocks = plaintext_len.div_ceil(self.block_size as u64);
        plaintext_len + blocks * BLOCK_OVERHEAD as u64
    }
}
