//! On-disk layout
//!
//! Blobs live at `<namespace>/<name[0..2]>/<name[2..]>`. The two-character
//! shard keeps directory fan-out bounded; there are no sidecar files.

use crate::{Result, StoreError, SHARD_PREFIX_LEN};
use crydrv_crypto::StorageName;
use std::fs::DirBuilder;
use std::path::{Path, PathBuf};

/// Where the blob named `name` lives inside `namespace`
pub fn storage_path(namespace: &Path, name: &StorageName) -> PathBuf {
    let (shard, rest) = name.as_str().split_at(SHARD_PREFIX_LEN);
    namespace.join(shard).join(rest)
}

/// Create `dir` and any missing parents, owner-only on Unix
pub fn create_private_dir(dir: &Path) -> Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir).map_err(StoreError::Io)
}
