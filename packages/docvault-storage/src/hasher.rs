//! Content Hasher
//!
//! Streams a source through SHA-256 with a fixed-size buffer so memory stays
//! bounded regardless of file size.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{ErrorKind as IoErrorKind, Read};
use std::path::Path;

use crate::error::{Result, StorageError};

#[derive(Debug, Clone, Copy)]
pub struct ContentHasher {
    buffer_bytes: usize,
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new(1024 * 1024)
    }
}

impl ContentHasher {
    pub fn new(buffer_bytes: usize) -> Self {
        Self {
            buffer_bytes: buffer_bytes.max(1),
        }
    }

    /// Lowercase hex digest of everything `reader` yields
    pub fn hash_reader<R: Read>(&self, mut reader: R) -> Result<String> {
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; self.buffer_bytes];
        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => hasher.update(&buffer[..n]),
                Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(format!("{:x}", hasher.finalize()))
    }

    pub fn hash_file(&self, path: &Path) -> Result<String> {
        let file = File::open(path).map_err(|e| {
            StorageError::io(format!("Cannot read {}: {}", path.display(), e)).with_source(e)
        })?;
        self.hash_reader(file)
    }

    pub fn hash_bytes(&self, bytes: &[u8]) -> String {
        format!("{:x}", Sha256::digest(bytes))
    }
}
