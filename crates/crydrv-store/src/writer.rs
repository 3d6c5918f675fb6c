//! Streaming encrypting writer

use crate::format::BlobFormat;
use crate::layout::create_private_dir;
use crate::{Result, StoreError};
use crydrv_crypto::{encrypt_block, ContentKey};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Encrypt `source_len` bytes from `source` into a blob at `path`.
///
/// Missing parent directories are created. An existing blob is replaced. If
/// the source ends early or any step fails the partial blob is removed, so a
/// truncated blob is never left behind. Returns the number of bytes written
/// to disk.
pub(crate) fn write_blob<R: Read + ?Sized>(
    path: &Path,
    source: &mut R,
    source_len: u64,
    key: &ContentKey,
    format: &BlobFormat,
) -> Result<u64> {
    if let Some(parent) = path.parent() {
        create_private_dir(parent)?;
    }

    let result = write_blocks(path, source, source_len, key, format);
    if let Err(err) = &result {
        warn!(error = %err, "Blob write failed, removing partial blob");
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, "Could not remove partial blob"),
        }
    }
    result
}

fn write_blocks<R: Read + ?Sized>(
    path: &Path,
    source: &mut R,
    source_len: u64,
    key: &ContentKey,
    format: &BlobFormat,
) -> Result<u64> {
    let mut file = File::create(path)?;
    let mut chunk = vec![0u8; format.block_size()];
    let mut consumed = 0u64;
    let mut written = 0u64;
    let mut blocks = 0u64;

    while consumed < source_len {
        let want = (source_len - consumed).min(chunk.len() as u64) as usize;
        let got = fill(source, &mut chunk[..want])?;
        consumed += got as u64;
        if got < want {
            return Err(StoreError::SourceTooShort {
                expected: source_len,
                actual: consumed,
            });
        }

        let sealed = encrypt_block(key, &chunk[..want])?;
        file.write_all(&sealed)?;
        written += sealed.len() as u64;
        blocks += 1;
    }

    file.sync_all()?;
    debug!(blocks, plaintext_len = source_len, physical_len = written, "Wrote blob");
    Ok(written)
}

/// Read until `buf` is full or the source is exhausted
fn fill<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
