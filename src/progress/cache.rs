//! Device-local position cache
//!
//! One entry per (user, document). Writes are synchronous so a position is
//! on disk before the session that produced it goes away.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{CacheEntry, PositionKey};
use crate::error::{ReaderError, ReaderResult};

pub trait LocalCache: Send + Sync {
    fn load(&self, key: &PositionKey) -> ReaderResult<Option<CacheEntry>>;

    fn store(&self, key: &PositionKey, entry: &CacheEntry) -> ReaderResult<()>;
}

/// One JSON file per key under a directory
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &PositionKey) -> PathBuf {
        self.dir.join(format!(
            "{}__{}.json",
            urlencoding::encode(&key.user_id),
            urlencoding::encode(&key.document_id)
        ))
    }
}

fn cache_error(path: &Path, e: impl std::fmt::Display) -> ReaderError {
    ReaderError::LocalCache(format!("{}: {}", path.display(), e))
}

impl LocalCache for FileCache {
    fn load(&self, key: &PositionKey) -> ReaderResult<Option<CacheEntry>> {
        let path = self.path_for(key);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(cache_error(&path, e)),
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| cache_error(&path, e))
    }

    fn store(&self, key: &PositionKey, entry: &CacheEntry) -> ReaderResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| cache_error(&self.dir, e))?;
        let path = self.path_for(key);
        let data = serde_json::to_vec(entry).map_err(|e| cache_error(&path, e))?;

        // Write then rename so a crash never leaves a torn entry
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, data).map_err(|e| cache_error(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| cache_error(&path, e))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryEntries {
    entries: HashMap<PositionKey, CacheEntry>,
    writes: HashMap<PositionKey, usize>,
}

/// Process-memory cache; clones share entries
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    inner: Arc<Mutex<MemoryEntries>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &PositionKey) -> Option<CacheEntry> {
        self.inner.lock().entries.get(key).cloned()
    }

    /// Number of stores made under `key`
    pub fn writes(&self, key: &PositionKey) -> usize {
        self.inner.lock().writes.get(key).copied().unwrap_or(0)
    }
}

impl LocalCache for MemoryCache {
    fn load(&self, key: &PositionKey) -> ReaderResult<Option<CacheEntry>> {
        Ok(self.get(key))
    }

    fn store(&self, key: &PositionKey, entry: &CacheEntry) -> ReaderResult<()> {
        let mut inner = self.inner.lock();
        inner.entries.insert(key.clone(), entry.clone());
        *inner.writes.entry(key.clone()).or_default() += 1;
        Ok(())
    }
}
