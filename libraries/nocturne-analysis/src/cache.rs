//! Persistent analysis cache
//!
//! Maps a normalised file path to `{mtime, size, payload}`. An entry is
//! only served while the backing file is unchanged, the payload parses,
//! the schema version is current, and the analysed window matches the
//! request. Anything else is a miss; a miss is never an error.
//!
//! Path normalisation is OS-aware: on case-insensitive filesystems keys
//! are lowercased and both slash forms act as aliases, on case-sensitive
//! filesystems only the canonical absolute path is used.

use crate::error::Result;
use nocturne_core::analysis::AudioAnalysis;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// A stored cache record: file identity plus the opaque analysis payload
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    mtime_ms: u64,
    size: u64,
    payload: String,
}

/// On-disk analysis cache
///
/// One JSON entry file per key under the cache root; the file name is a
/// stable hash of the canonical key, so keys never leak filesystem-
/// unfriendly characters.
pub struct AnalysisCache {
    root: PathBuf,
    case_insensitive: bool,
}

impl AnalysisCache {
    /// Open (creating if needed) a cache rooted at `root`, with the
    /// platform's filesystem case behaviour.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_case_insensitive(
            root,
            cfg!(any(target_os = "windows", target_os = "macos")),
        )
    }

    /// Open a cache with explicit case behaviour (used by tests)
    pub fn with_case_insensitive(root: impl Into<PathBuf>, case_insensitive: bool) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            case_insensitive,
        })
    }

    /// Look up an analysis for `path`.
    ///
    /// Returns `Some` only when the backing file's `(mtime, size)` still
    /// match the stored entry, the payload parses to a current-version
    /// [`AudioAnalysis`], and its analysed window is within one second
    /// of `want_window`. Head and full analyses are stored under
    /// distinct keys.
    pub fn get(&self, path: &Path, want_window: f64, head: bool) -> Option<AudioAnalysis> {
        let (mtime_ms, size) = file_identity(path)?;

        let keys = self.keys(path, head);
        for (i, key) in keys.iter().enumerate() {
            let Some(entry) = self.read_entry(key) else {
                continue;
            };
            if entry.mtime_ms != mtime_ms || entry.size != size {
                continue;
            }
            let analysis: AudioAnalysis = match serde_json::from_str(&entry.payload) {
                Ok(a) => a,
                Err(e) => {
                    tracing::warn!("discarding unparseable cache entry for {}: {}", key, e);
                    continue;
                }
            };
            if !analysis.is_current_version() {
                continue;
            }
            if (analysis.analyze_window - want_window).abs() >= 1.0 {
                continue;
            }

            // Hit on a non-canonical alias: refresh the canonical entry
            // so the next lookup succeeds on the first probe.
            if i > 0 {
                self.write_entry(&keys[0], &entry);
            }

            return Some(analysis.sanitized());
        }
        None
    }

    /// Store an analysis for `path`, unconditionally (last writer wins).
    ///
    /// Storage failures are logged and swallowed; the next `get` simply
    /// misses.
    pub fn put(&self, path: &Path, analysis: &AudioAnalysis, head: bool) {
        let Some((mtime_ms, size)) = file_identity(path) else {
            tracing::warn!("not caching analysis for vanished file {}", path.display());
            return;
        };
        let payload = match serde_json::to_string(analysis) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("failed to serialize analysis for {}: {}", path.display(), e);
                return;
            }
        };
        let entry = CacheEntry {
            mtime_ms,
            size,
            payload,
        };
        let key = self.canonical_key(path, head);
        self.write_entry(&key, &entry);
    }

    /// Remove every entry. Mainly for tests and the settings "clear
    /// analysis data" action.
    pub fn clear(&self) -> Result<()> {
        for item in fs::read_dir(&self.root)? {
            let item = item?;
            if item.path().extension().is_some_and(|e| e == "json") {
                fs::remove_file(item.path())?;
            }
        }
        Ok(())
    }

    /// Canonical key plus any aliases, canonical first
    fn keys(&self, path: &Path, head: bool) -> Vec<String> {
        let mut keys = vec![self.canonical_key(path, head)];
        if self.case_insensitive {
            let alias = self.normalized(path).replace('/', "\\");
            let alias = Self::with_head_marker(alias, head);
            if alias != keys[0] {
                keys.push(alias);
            }
        }
        keys
    }

    fn canonical_key(&self, path: &Path, head: bool) -> String {
        Self::with_head_marker(self.normalized(path), head)
    }

    fn normalized(&self, path: &Path) -> String {
        let raw = path.to_string_lossy();
        if self.case_insensitive {
            raw.to_lowercase().replace('\\', "/")
        } else {
            raw.into_owned()
        }
    }

    fn with_head_marker(key: String, head: bool) -> String {
        if head {
            format!("{}|head", key)
        } else {
            key
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{:016x}.json", fnv1a64(key)))
    }

    fn read_entry(&self, key: &str) -> Option<CacheEntry> {
        let path = self.entry_path(key);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("cache read failed for {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("corrupt cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    fn write_entry(&self, key: &str, entry: &CacheEntry) {
        let path = self.entry_path(key);
        let bytes = match serde_json::to_vec(entry) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("failed to encode cache entry: {}", e);
                return;
            }
        };
        if let Err(e) = fs::write(&path, bytes) {
            tracing::warn!("cache write failed for {}: {}", path.display(), e);
        }
    }
}

/// `(mtime in ms, size)` of a file, or `None` if it is unreachable
fn file_identity(path: &Path) -> Option<(u64, u64)> {
    let meta = fs::metadata(path).ok()?;
    let mtime_ms = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    Some((mtime_ms, meta.len()))
}

/// FNV-1a, stable across processes (entry file names must survive
/// restarts, which rules out the randomized std hasher)
fn fnv1a64(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in s.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
