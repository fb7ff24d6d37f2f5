// src/watch/hash.rs

use std::fs;
use std::path::Path;

use blake3::Hasher;

/// Fixed-length (256-bit) content digest.
pub type Digest = blake3::Hash;

/// Digest of `contents` with leading and trailing ASCII whitespace removed.
///
/// Editors and formatters that only touch a trailing newline therefore do not
/// produce a new digest.
pub fn content_digest(contents: &[u8]) -> Digest {
    let mut hasher = Hasher::new();
    hasher.update(contents.trim_ascii());
    hasher.finalize()
}

/// Read a file and compute its [`content_digest`].
pub fn file_digest(path: &Path) -> std::io::Result<Digest> {
    let contents = fs::read(path)?;
    Ok(content_digest(&contents))
}
