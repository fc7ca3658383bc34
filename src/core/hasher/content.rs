//! Full-content SHA-256.
//!
//! Large files are hashed through a memory map so the kernel pages them in
//! directly; everything else streams through a fixed-size buffer. Both
//! paths feed the same digest, so the result never depends on which one ran.

use crate::core::config::PerformanceConfig;
use crate::error::HashError;
use memmap2::Mmap;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

/// Hash `file` (already opened, `len` bytes long) according to `config`
pub(crate) fn sha256_file(
    path: &Path,
    file: &mut File,
    len: u64,
    config: &PerformanceConfig,
) -> Result<String, HashError> {
    if config.memory_mapped_hashing && len > config.mmap_threshold {
        sha256_mmap(path, file)
    } else {
        sha256_streaming(path, file, config.read_buffer_size)
    }
}

/// Hash through a read-only memory map
pub(crate) fn sha256_mmap(path: &Path, file: &File) -> Result<String, HashError> {
    // SAFETY: the map is read-only and dropped before the file handle.
    // Concurrent truncation by another process is outside what we guard.
    let mmap = unsafe { Mmap::map(file) }.map_err(|e| io_error(path, e))?;

    let mut hasher = Sha256::new();
    hasher.update(&mmap[..]);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash with buffered reads of `buffer_size` bytes
pub(crate) fn sha256_streaming(
    path: &Path,
    file: &mut File,
    buffer_size: usize,
) -> Result<String, HashError> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; buffer_size.max(1)];

    loop {
        let bytes_read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(io_error(path, e)),
        };
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

pub(crate) fn io_error(path: &Path, source: std::io::Error) -> HashError {
    HashError::Io {
        path: path.to_path_buf(),
        source,
    }
}
