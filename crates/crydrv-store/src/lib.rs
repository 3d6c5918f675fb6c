//! # crydrv Store
//!
//! Encrypted blob storage engine for the crydrv file store.
//!
//! This crate provides:
//! - **Reader**: random access over a blob, decrypting one block at a time
//! - **Writer**: streaming encryption of a plaintext source into a blob
//! - **Locking**: per-path shared/exclusive locks with RAII guards
//! - **Layout**: mapping of storage names to sharded paths on disk
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │               BlobStore                 │
//! ├─────────────┬─────────────┬─────────────┤
//! │ BlobReader  │ write_blob  │ LockManager │
//! ├─────────────┴─────────────┴─────────────┤
//! │     crydrv-crypto block codec + fs      │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use crydrv_store::{layout, BlobFormat, BlobStore};
//!
//! let store = BlobStore::new(BlobFormat::default());
//! let path = layout::storage_path(&namespace, &name);
//! store.write_all(&path, &mut data.as_slice(), data.len() as u64, &key)?;
//! let mut reader = store.open_for_read(&path, &key)?;
//! ```

pub mod error;
pub mod format;
pub mod layout;
pub mod lock;
pub mod reader;
pub mod store;
mod writer;

pub use error::{Result, StoreError};
pub use format::BlobFormat;
pub use layout::{create_private_dir, storage_path};
pub use lock::{LockManager, LockMode, PathGuard};
pub use reader::{BlobReader, BlockCache};
pub use store::{BlobStore, LockedBlobReader};

/// Default plaintext block size (4 MiB)
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Characters of the storage name used as the shard directory
pub const SHARD_PREFIX_LEN: usize = 2;
