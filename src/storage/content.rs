//! Content-addressed file reads.
//!
//! Hashes are SHA-256 over canonicalised content: UTF-8 BOM stripped and
//! CRLF/CR line endings folded to LF, so the same logical file hashes
//! identically on every platform. Binary files hash their raw bytes.
//! Recent reads are cached keyed by `(path, mtime)`; the cache lock is
//! held only for map operations, never across I/O.

use crate::error::{RetrievalError, RetrievalResult};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Hex-encoded SHA-256 digest.
pub type ContentDigest = String;

/// The outcome of reading one file.
#[derive(Debug, Clone)]
pub struct FileContent {
    pub hash: ContentDigest,
    pub bytes: Arc<[u8]>,
    /// False when the bytes are not valid UTF-8; such files are indexed
    /// as opaque blobs with language `binary`.
    pub is_text: bool,
    pub size: u64,
    pub mtime: SystemTime,
}

impl FileContent {
    pub fn text(&self) -> Option<&str> {
        if self.is_text {
            std::str::from_utf8(&self.bytes).ok()
        } else {
            None
        }
    }
}

/// Reads files, canonicalises and hashes their content.
pub struct ContentStore {
    cache: DashMap<(PathBuf, SystemTime), FileContent>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
        }
    }

    /// Read a file, returning its canonical hash and bytes. Unreadable
    /// files fail with `IoFailure`; binary files never panic and come
    /// back with `is_text = false`.
    pub fn read(&self, path: &Path) -> RetrievalResult<FileContent> {
        let metadata = std::fs::metadata(path).map_err(|e| RetrievalError::io_path(path, e))?;
        let mtime = metadata.modified().map_err(|e| RetrievalError::io_path(path, e))?;

        let key = (path.to_path_buf(), mtime);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.clone());
        }

        let raw = std::fs::read(path).map_err(|e| RetrievalError::io_path(path, e))?;
        let content = Self::ingest(raw, mtime);
        self.cache.insert(key, content.clone());
        Ok(content)
    }

    /// Hash arbitrary bytes with the same canonicalisation as `read`.
    pub fn digest(bytes: &[u8]) -> ContentDigest {
        match std::str::from_utf8(strip_bom(bytes)) {
            Ok(text) => digest_canonical_text(text),
            Err(_) => hex_digest(bytes),
        }
    }

    /// Hash a string after line-ending normalisation.
    pub fn digest_text(text: &str) -> ContentDigest {
        digest_canonical_text(text)
    }

    /// Drop cache entries for a path (all mtimes).
    pub fn evict(&self, path: &Path) {
        self.cache.retain(|(p, _), _| p != path);
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    fn ingest(raw: Vec<u8>, mtime: SystemTime) -> FileContent {
        let stripped = strip_bom(&raw);
        match std::str::from_utf8(stripped) {
            Ok(text) => {
                let canonical = normalise_line_endings(text);
                let hash = hex_digest(canonical.as_bytes());
                let bytes: Arc<[u8]> = canonical.into_bytes().into();
                let size = bytes.len() as u64;
                FileContent {
                    hash,
                    bytes,
                    is_text: true,
                    size,
                    mtime,
                }
            }
            Err(_) => {
                let hash = hex_digest(&raw);
                let size = raw.len() as u64;
                FileContent {
                    hash,
                    bytes: raw.into(),
                    is_text: false,
                    size,
                    mtime,
                }
            }
        }
    }
}

impl Default for ContentStore {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}

fn normalise_line_endings(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\r' {
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            out.push('\n');
        } else {
            out.push(c);
        }
    }
    out
}

fn digest_canonical_text(text: &str) -> ContentDigest {
    if text.contains('\r') {
        hex_digest(normalise_line_endings(text).as_bytes())
    } else {
        hex_digest(text.as_bytes())
    }
}

fn hex_digest(bytes: &[u8]) -> ContentDigest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn line_endings_do_not_change_the_hash() {
        let unix = ContentStore::digest(b"fn main() {}\nlet x = 1;\n");
        let windows = ContentStore::digest(b"fn main() {}\r\nlet x = 1;\r\n");
        let old_mac = ContentStore::digest(b"fn main() {}\rlet x = 1;\r");
        assert_eq!(unix, windows);
        assert_eq!(unix, old_mac);
    }

    #[test]
    fn bom_is_stripped_before_hashing() {
        let with_bom = ContentStore::digest(b"\xEF\xBB\xBFhello\n");
        let without = ContentStore::digest(b"hello\n");
        assert_eq!(with_bom, without);
    }

    #[test]
    fn binary_content_is_hashed_raw_without_panic() {
        let bytes: Vec<u8> = vec![0x00, 0xFF, 0xFE, 0x80, 0x81];
        let hash = ContentStore::digest(&bytes);
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn read_caches_by_path_and_mtime() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "const A: u8 = 1;").unwrap();
        file.flush().unwrap();

        let store = ContentStore::new();
        let first = store.read(file.path()).unwrap();
        let second = store.read(file.path()).unwrap();
        assert_eq!(first.hash, second.hash);
        assert_eq!(store.cached_entries(), 1);
    }

    #[test]
    fn read_reports_missing_file_as_io_failure() {
        let store = ContentStore::new();
        let err = store.read(Path::new("/nonexistent/definitely/gone.rs")).unwrap_err();
        assert_eq!(err.code(), "io_failure");
        assert!(err.to_string().contains("gone.rs"));
    }

    #[test]
    fn binary_file_reads_with_text_flag_off() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0u8, 159, 146, 150]).unwrap();
        file.flush().unwrap();

        let store = ContentStore::new();
        let content = store.read(file.path()).unwrap();
        assert!(!content.is_text);
        assert!(content.text().is_none());
    }
}
