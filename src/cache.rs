//! Incremental cache for skipping unchanged pipeline inputs.
//!
//! Each entry maps a `(namespace, path)` pair to a content fingerprint.
//! Namespaces partition unrelated asset kinds (styles, scripts, images) so a
//! fingerprint recorded for one kind can never satisfy a lookup for another.
//!
//! Entries are created on the first successful transform of a file and
//! updated on each subsequent one; they are never deleted, so staleness is
//! bounded only by process lifetime.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A single cache row: fingerprint plus last-updated marker.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Content fingerprint (FNV-1a, hex)
    pub fingerprint: String,
    /// When this entry was last written
    pub updated_at: SystemTime,
}

/// Per-namespace fingerprint cache.
///
/// Concurrent runs may race on the same `(namespace, path)`; last write wins.
/// A stale fingerprint only causes a redundant reprocess, never wrong output.
#[derive(Debug, Default)]
pub struct IncrementalCache {
    entries: HashMap<(String, PathBuf), CacheEntry>,
}

impl IncrementalCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether `path` must go through the pipeline again.
    ///
    /// Computes a fingerprint from `content` and compares it against the
    /// stored one for `(namespace, path)`. Unchanged content returns `false`
    /// and the caller excludes the file from the run. Nothing is stored here;
    /// the caller records the fingerprint once the transform succeeded, so a
    /// failed file stays eligible for retry.
    pub fn should_process(&self, namespace: &str, path: &Path, content: &[u8]) -> bool {
        let fingerprint = fingerprint(content);
        match self.entries.get(&(namespace.to_string(), path.to_path_buf())) {
            Some(entry) => entry.fingerprint != fingerprint,
            None => true,
        }
    }

    /// Record the fingerprint for a successfully transformed file.
    pub fn record(&mut self, namespace: &str, path: &Path, content: &[u8]) {
        self.entries.insert(
            (namespace.to_string(), path.to_path_buf()),
            CacheEntry { fingerprint: fingerprint(content), updated_at: SystemTime::now() },
        );
    }

    /// Look up the stored entry for `(namespace, path)`.
    pub fn get(&self, namespace: &str, path: &Path) -> Option<&CacheEntry> {
        self.entries.get(&(namespace.to_string(), path.to_path_buf()))
    }

    /// Number of cached entries across all namespaces.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compute a content fingerprint.
pub fn fingerprint(content: &[u8]) -> String {
    format!("{:016x}", fnv1a_hash(content))
}

/// FNV-1a hash algorithm.
fn fnv1a_hash(data: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET;
    for byte in data {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_call_processes() {
        let cache = IncrementalCache::new();
        assert!(cache.should_process("styles", Path::new("style.css"), b"body {}"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_recorded_identical_content_skips() {
        let mut cache = IncrementalCache::new();
        cache.record("styles", Path::new("style.css"), b"body {}");
        assert!(!cache.should_process("styles", Path::new("style.css"), b"body {}"));
    }

    #[test]
    fn test_unrecorded_file_stays_eligible() {
        // A file whose transform failed was never recorded and must be
        // processed again on the next run
        let cache = IncrementalCache::new();
        assert!(cache.should_process("images", Path::new("a.png"), b"abc"));
        assert!(cache.should_process("images", Path::new("a.png"), b"abc"));
    }

    #[test]
    fn test_changed_content_processes_again() {
        let mut cache = IncrementalCache::new();
        cache.record("styles", Path::new("style.css"), b"body {}");
        assert!(cache.should_process("styles", Path::new("style.css"), b"body { margin: 0; }"));
        // And the new fingerprint sticks
        cache.record("styles", Path::new("style.css"), b"body { margin: 0; }");
        assert!(!cache.should_process("styles", Path::new("style.css"), b"body { margin: 0; }"));
    }

    #[test]
    fn test_namespaces_are_partitioned() {
        let mut cache = IncrementalCache::new();
        cache.record("styles", Path::new("logo.svg"), b"<svg/>");
        // Same path and content under a different namespace is a fresh entry
        assert!(cache.should_process("images", Path::new("logo.svg"), b"<svg/>"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_entry_records_fingerprint() {
        let mut cache = IncrementalCache::new();
        cache.record("images", Path::new("a.png"), b"abc");
        let entry = cache.get("images", Path::new("a.png")).unwrap();
        assert_eq!(entry.fingerprint, fingerprint(b"abc"));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint(b"hello"), fingerprint(b"hello"));
        assert_ne!(fingerprint(b"hello"), fingerprint(b"hello!"));
    }
}
