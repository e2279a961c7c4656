//! Content readers: the boundary to archive and directory I/O.
//!
//! A [`ContentReader`] exposes files by `/`-separated paths relative to its
//! root. Two implementations ship here:
//!
//! - [`DirectoryReader`] reads a directory tree. File handles are pooled
//!   and tagged with a generation; [`ContentReader::release_locks`] bumps
//!   the generation, so handles checked out before the release are closed
//!   when returned instead of being reused.
//! - [`MemoryReader`] serves files from memory (tests, embedded packs).
//!
//! Paths may not contain `..` segments.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::error::ContentError;

/// A file found by [`ContentReader::enumerate_by_extension`].
#[derive(Clone)]
pub struct ContentEntry {
    /// Path relative to the enumerating reader.
    pub name: String,
    /// File contents.
    pub content: Vec<u8>,
    /// Reader rooted at the file's directory.
    pub reader: Arc<dyn ContentReader>,
}

impl fmt::Debug for ContentEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentEntry")
            .field("name", &self.name)
            .field("len", &self.content.len())
            .finish()
    }
}

/// Read access to the files of a pack.
#[async_trait]
pub trait ContentReader: Send + Sync + fmt::Debug {
    /// Whether `path` names an existing file.
    fn file_exists(&self, path: &str) -> bool;

    /// Read a whole file.
    fn read_bytes(&self, path: &str) -> Result<Vec<u8>, ContentError>;

    /// Read a whole file without blocking the async runtime.
    async fn read_bytes_async(&self, path: &str) -> Result<Vec<u8>, ContentError>;

    /// Every file whose extension matches `extension` (without the dot,
    /// case-insensitive), sorted by path.
    fn enumerate_by_extension(&self, extension: &str) -> Result<Vec<ContentEntry>, ContentError>;

    /// A reader rooted at `path` below this one.
    fn sub_reader(&self, path: &str) -> Arc<dyn ContentReader>;

    /// Human-readable location of `path`, for reports.
    fn path_representation(&self, path: &str) -> String;

    /// Drop pooled handles so the underlying files are no longer held.
    fn release_locks(&self);
}

fn normalize(path: &str) -> Result<String, ContentError> {
    let mut parts = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                return Err(ContentError::Escapes {
                    path: path.to_string(),
                })
            }
            other => parts.push(other),
        }
    }
    Ok(parts.join("/"))
}

fn join_paths(prefix: &str, path: &str) -> String {
    match (prefix.is_empty(), path.is_empty()) {
        (true, _) => path.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}/{path}"),
    }
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

fn has_extension(path: &str, extension: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

// ─── Handle Pool ─────────────────────────────────────────────────────

/// Pool of open file handles tagged with a generation.
#[derive(Debug, Default)]
pub struct HandlePool {
    generation: AtomicU64,
    idle: Mutex<HashMap<PathBuf, Vec<File>>>,
}

impl HandlePool {
    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Number of idle handles kept for reuse.
    pub fn idle_handles(&self) -> usize {
        self.idle.lock().values().map(Vec::len).sum()
    }

    fn checkout(self: &Arc<Self>, path: &Path) -> std::io::Result<PooledHandle> {
        let generation = self.generation();
        let reused = self.idle.lock().get_mut(path).and_then(Vec::pop);
        let file = match reused {
            Some(file) => file,
            None => File::open(path)?,
        };
        Ok(PooledHandle {
            pool: Arc::clone(self),
            path: path.to_path_buf(),
            generation,
            file: Some(file),
        })
    }

    /// Invalidate every outstanding handle and close idle ones.
    pub fn release(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.idle.lock().clear();
    }
}

struct PooledHandle {
    pool: Arc<HandlePool>,
    path: PathBuf,
    generation: u64,
    file: Option<File>,
}

impl PooledHandle {
    fn read_all(&mut self) -> std::io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        if let Some(file) = self.file.as_mut() {
            file.seek(SeekFrom::Start(0))?;
            file.read_to_end(&mut bytes)?;
        }
        Ok(bytes)
    }
}

impl Drop for PooledHandle {
    fn drop(&mut self) {
        if self.generation != self.pool.generation() {
            return;
        }
        if let Some(file) = self.file.take() {
            self.pool
                .idle
                .lock()
                .entry(std::mem::take(&mut self.path))
                .or_default()
                .push(file);
        }
    }
}

// ─── Directory Reader ────────────────────────────────────────────────

/// Reads a pack from a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectoryReader {
    root: PathBuf,
    prefix: String,
    pool: Arc<HandlePool>,
}

impl DirectoryReader {
    /// A reader over `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            prefix: String::new(),
            pool: Arc::new(HandlePool::default()),
        }
    }

    /// The shared handle pool.
    pub fn pool(&self) -> &Arc<HandlePool> {
        &self.pool
    }

    fn locate(&self, path: &str) -> Result<PathBuf, ContentError> {
        normalize(path)?;
        let relative = normalize(&join_paths(&self.prefix, path))?;
        Ok(self.root.join(relative))
    }

    fn read_located(pool: &Arc<HandlePool>, path: &str, full: &Path) -> Result<Vec<u8>, ContentError> {
        if !full.is_file() {
            return Err(ContentError::NotFound {
                path: path.to_string(),
            });
        }
        let io = |source| ContentError::Io {
            path: path.to_string(),
            source,
        };
        let mut handle = pool.checkout(full).map_err(io)?;
        handle.read_all().map_err(io)
    }

    fn collect(&self, dir: &Path, relative: &str, extension: &str, out: &mut Vec<String>) -> Result<(), ContentError> {
        let entries = std::fs::read_dir(dir).map_err(|source| ContentError::Io {
            path: relative.to_string(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| ContentError::Io {
                path: relative.to_string(),
                source,
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let child = join_paths(relative, &name);
            let file_type = entry.file_type().map_err(|source| ContentError::Io {
                path: child.clone(),
                source,
            })?;
            let path = entry.path();
            // Symlinked directories are not followed; they may form cycles.
            if file_type.is_dir() {
                self.collect(&path, &child, extension, out)?;
            } else if has_extension(&name, extension) && (file_type.is_file() || path.is_file()) {
                out.push(child);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ContentReader for DirectoryReader {
    fn file_exists(&self, path: &str) -> bool {
        self.locate(path).is_ok_and(|full| full.is_file())
    }

    fn read_bytes(&self, path: &str) -> Result<Vec<u8>, ContentError> {
        let full = self.locate(path)?;
        Self::read_located(&self.pool, path, &full)
    }

    async fn read_bytes_async(&self, path: &str) -> Result<Vec<u8>, ContentError> {
        let full = self.locate(path)?;
        let pool = Arc::clone(&self.pool);
        let owned = path.to_string();
        tokio::task::spawn_blocking(move || Self::read_located(&pool, &owned, &full))
            .await
            .map_err(|e| ContentError::Task {
                path: path.to_string(),
                reason: e.to_string(),
            })?
    }

    fn enumerate_by_extension(&self, extension: &str) -> Result<Vec<ContentEntry>, ContentError> {
        let base = self.locate("")?;
        let mut names = Vec::new();
        if base.is_dir() {
            self.collect(&base, "", extension, &mut names)?;
        }
        names.sort();
        names
            .into_iter()
            .map(|name| {
                let content = self.read_bytes(&name)?;
                let reader = self.sub_reader(parent_of(&name));
                Ok(ContentEntry {
                    name,
                    content,
                    reader,
                })
            })
            .collect()
    }

    fn sub_reader(&self, path: &str) -> Arc<dyn ContentReader> {
        // An escaping path yields a reader on which every lookup fails.
        let prefix = normalize(path)
            .map(|p| join_paths(&self.prefix, &p))
            .unwrap_or_else(|_| "..".to_string());
        Arc::new(Self {
            root: self.root.clone(),
            prefix,
            pool: Arc::clone(&self.pool),
        })
    }

    fn path_representation(&self, path: &str) -> String {
        self.root
            .join(join_paths(&self.prefix, path))
            .display()
            .to_string()
    }

    fn release_locks(&self) {
        self.pool.release();
    }
}

// ─── Memory Reader ───────────────────────────────────────────────────

/// Serves files from memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    files: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
    prefix: String,
    releases: Arc<AtomicU64>,
}

impl MemoryReader {
    /// An empty reader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_file(self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.insert(path, content);
        self
    }

    /// Add or replace a file (relative to this reader).
    pub fn insert(&self, path: &str, content: impl Into<Vec<u8>>) {
        if let Ok(key) = self.key(path) {
            self.files.write().insert(key, content.into());
        }
    }

    /// Remove a file. Returns whether it existed.
    pub fn remove(&self, path: &str) -> bool {
        self.key(path)
            .is_ok_and(|key| self.files.write().remove(&key).is_some())
    }

    /// How many times locks were released (shared with sub-readers).
    pub fn release_count(&self) -> u64 {
        self.releases.load(Ordering::Acquire)
    }

    fn key(&self, path: &str) -> Result<String, ContentError> {
        normalize(path)?;
        normalize(&join_paths(&self.prefix, path))
    }
}

#[async_trait]
impl ContentReader for MemoryReader {
    fn file_exists(&self, path: &str) -> bool {
        self.key(path)
            .is_ok_and(|key| self.files.read().contains_key(&key))
    }

    fn read_bytes(&self, path: &str) -> Result<Vec<u8>, ContentError> {
        let key = self.key(path)?;
        self.files
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| ContentError::NotFound {
                path: path.to_string(),
            })
    }

    async fn read_bytes_async(&self, path: &str) -> Result<Vec<u8>, ContentError> {
        self.read_bytes(path)
    }

    fn enumerate_by_extension(&self, extension: &str) -> Result<Vec<ContentEntry>, ContentError> {
        let matches: Vec<(String, Vec<u8>)> = {
            let files = self.files.read();
            files
                .iter()
                .filter_map(|(key, content)| {
                    let relative = if self.prefix.is_empty() {
                        key.as_str()
                    } else {
                        key.strip_prefix(&self.prefix)?.strip_prefix('/')?
                    };
                    has_extension(relative, extension).then(|| (relative.to_string(), content.clone()))
                })
                .collect()
        };
        Ok(matches
            .into_iter()
            .map(|(name, content)| {
                let reader = self.sub_reader(parent_of(&name));
                ContentEntry {
                    name,
                    content,
                    reader,
                }
            })
            .collect())
    }

    fn sub_reader(&self, path: &str) -> Arc<dyn ContentReader> {
        let prefix = normalize(path)
            .map(|p| join_paths(&self.prefix, &p))
            .unwrap_or_else(|_| "..".to_string());
        Arc::new(Self {
            files: Arc::clone(&self.files),
            prefix,
            releases: Arc::clone(&self.releases),
        })
    }

    fn path_representation(&self, path: &str) -> String {
        format!("memory:/{}", join_paths(&self.prefix, path))
    }

    fn release_locks(&self) {
        self.releases.fetch_add(1, Ordering::AcqRel);
    }
}
