//! Disk Mirror Module
//!
//! Best-effort, eventually consistent copy of the cache on disk: one JSON file
//! per key. The in-memory store stays the source of truth; every disk failure
//! is logged and swallowed.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::entry::current_timestamp_ms;
use crate::cache::{content_hash, CacheEntry};
use crate::error::{EngineError, Result};

const FILE_EXTENSION: &str = "json";
const HASHED_NAME_PREFIX: char = '=';
const MAX_PLAIN_NAME: usize = 128;

// == Disk Operations ==
#[derive(Debug)]
enum DiskOp {
    Write(Box<CacheEntry>),
    Remove(String),
    Clear,
}

// == Disk Mirror ==
/// Handle to the background writer that owns the cache directory.
///
/// Operations are queued on a channel and applied strictly in submission
/// order by a single task, so the last write for a key wins and no two writes
/// to the same file interleave.
#[derive(Debug)]
pub struct DiskMirror {
    dir: PathBuf,
    tx: mpsc::UnboundedSender<DiskOp>,
    writer: JoinHandle<()>,
}

impl DiskMirror {
    // == Open ==
    /// Creates the directory if needed, reloads every live entry found there
    /// and starts the writer task. Must be called inside a Tokio runtime.
    ///
    /// Returned entries are sorted by `last_accessed_at` ascending. Expired and
    /// unreadable files are deleted.
    pub async fn open(dir: impl AsRef<Path>) -> Result<(Self, Vec<CacheEntry>)> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await.map_err(|e| {
            EngineError::DiskIo(format!("cannot create {}: {}", dir.display(), e))
        })?;

        let entries = load_entries(&dir).await;
        info!(
            "Disk mirror opened at {} with {} live entries",
            dir.display(),
            entries.len()
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(run_writer(dir.clone(), rx));

        Ok((Self { dir, tx, writer }, entries))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Queues a write of the entry's current state.
    pub fn write(&self, entry: &CacheEntry) {
        self.submit(DiskOp::Write(Box::new(entry.clone())));
    }

    /// Queues deletion of a key's file.
    pub fn remove(&self, key: &str) {
        self.submit(DiskOp::Remove(key.to_string()));
    }

    /// Queues deletion of every cache file in the directory.
    pub fn clear(&self) {
        self.submit(DiskOp::Clear);
    }

    // == Flush ==
    /// Closes the queue and waits until every pending operation is applied.
    pub async fn flush(self) {
        let DiskMirror { dir, tx, writer } = self;
        drop(tx);
        if let Err(e) = writer.await {
            warn!("Disk mirror writer for {} ended abnormally: {}", dir.display(), e);
        }
    }

    fn submit(&self, op: DiskOp) {
        if self.tx.send(op).is_err() {
            warn!("Disk mirror writer for {} is gone, dropping operation", self.dir.display());
        }
    }
}

/// Maps a key to a file name safe on every platform.
///
/// Plain keys keep their name; any other key is stored under the SHA-256 of
/// its bytes, prefixed with a character plain names cannot contain, so two
/// distinct keys never share a file.
fn key_path(dir: &Path, key: &str) -> PathBuf {
    let plain = !key.is_empty()
        && key.len() <= MAX_PLAIN_NAME
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    let name = if plain {
        key.to_string()
    } else {
        format!("{}{}", HASHED_NAME_PREFIX, content_hash(key))
    };
    dir.join(format!("{}.{}", name, FILE_EXTENSION))
}

async fn run_writer(dir: PathBuf, mut rx: mpsc::UnboundedReceiver<DiskOp>) {
    while let Some(op) = rx.recv().await {
        if let Err(e) = apply(&dir, op).await {
            warn!("Disk mirror operation failed: {}", e);
        }
    }
    debug!("Disk mirror writer for {} drained", dir.display());
}

async fn apply(dir: &Path, op: DiskOp) -> Result<()> {
    match op {
        DiskOp::Write(entry) => {
            let path = key_path(dir, &entry.key);
            let tmp = path.with_extension("tmp");
            let body = serde_json::to_vec(&*entry)?;
            fs::write(&tmp, body).await?;
            fs::rename(&tmp, &path).await?;
        }
        DiskOp::Remove(key) => match fs::remove_file(key_path(dir, &key)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        },
        DiskOp::Clear => {
            let mut dir_entries = fs::read_dir(dir).await?;
            while let Some(item) = dir_entries.next_entry().await? {
                let path = item.path();
                if is_cache_file(&path) {
                    fs::remove_file(&path).await?;
                }
            }
        }
    }
    Ok(())
}

fn is_cache_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(FILE_EXTENSION)
}

async fn load_entries(dir: &Path) -> Vec<CacheEntry> {
    let mut loaded = Vec::new();
    let mut dir_entries = match fs::read_dir(dir).await {
        Ok(d) => d,
        Err(e) => {
            warn!("Cannot list cache directory {}: {}", dir.display(), e);
            return loaded;
        }
    };

    let now = current_timestamp_ms();
    loop {
        let path = match dir_entries.next_entry().await {
            Ok(Some(item)) => item.path(),
            Ok(None) => break,
            Err(e) => {
                warn!("Error while listing {}: {}", dir.display(), e);
                break;
            }
        };
        if !is_cache_file(&path) {
            continue;
        }

        match read_entry(&path).await {
            Ok(entry) if !entry.is_expired_at(now) => loaded.push(entry),
            Ok(entry) => {
                debug!("Discarding expired persisted entry {}", entry.key);
                discard(&path).await;
            }
            Err(e) => {
                warn!("Discarding unreadable cache file {}: {}", path.display(), e);
                discard(&path).await;
            }
        }
    }

    loaded.sort_by_key(|e| e.last_accessed_at);
    loaded
}

async fn read_entry(path: &Path) -> Result<CacheEntry> {
    let bytes = fs::read(path).await?;
    let mut entry: CacheEntry = serde_json::from_slice(&bytes)?;
    entry.size_bytes = entry.payload.len() as u64;
    Ok(entry)
}

async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        warn!("Cannot remove {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_then_reload() {
        let dir = TempDir::new().unwrap();
        let (mirror, loaded) = DiskMirror::open(dir.path()).await.unwrap();
        assert!(loaded.is_empty());

        mirror.write(&CacheEntry::new("a".to_string(), "alpha".to_string(), 60_000));
        mirror.write(&CacheEntry::new("b".to_string(), "beta".to_string(), 60_000));
        mirror.flush().await;

        let (mirror, loaded) = DiskMirror::open(dir.path()).await.unwrap();
        let keys: Vec<&str> = loaded.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(loaded.len(), 2);
        assert!(keys.contains(&"a"));
        assert!(keys.contains(&"b"));
        mirror.flush().await;
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let (mirror, _) = DiskMirror::open(dir.path()).await.unwrap();

        mirror.write(&CacheEntry::new("k".to_string(), "first".to_string(), 60_000));
        mirror.write(&CacheEntry::new("k".to_string(), "second".to_string(), 60_000));
        mirror.flush().await;

        let (mirror, loaded) = DiskMirror::open(dir.path()).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].payload, "second");
        mirror.flush().await;
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let dir = TempDir::new().unwrap();
        let (mirror, _) = DiskMirror::open(dir.path()).await.unwrap();

        mirror.write(&CacheEntry::new("a".to_string(), "1".to_string(), 60_000));
        mirror.write(&CacheEntry::new("b".to_string(), "2".to_string(), 60_000));
        mirror.write(&CacheEntry::new("c".to_string(), "3".to_string(), 60_000));
        mirror.remove("a");
        mirror.remove("never-written");
        mirror.flush().await;

        let (mirror, loaded) = DiskMirror::open(dir.path()).await.unwrap();
        assert_eq!(loaded.len(), 2);
        mirror.clear();
        mirror.flush().await;

        let (mirror, loaded) = DiskMirror::open(dir.path()).await.unwrap();
        assert!(loaded.is_empty());
        mirror.flush().await;
    }

    #[tokio::test]
    async fn test_reload_skips_expired_and_corrupt_files() {
        let dir = TempDir::new().unwrap();
        let (mirror, _) = DiskMirror::open(dir.path()).await.unwrap();
        mirror.write(&CacheEntry::new("dead".to_string(), "x".to_string(), 0));
        mirror.write(&CacheEntry::new("live".to_string(), "y".to_string(), 60_000));
        mirror.flush().await;
        std::fs::write(dir.path().join("garbage.json"), b"{not json").unwrap();

        let (mirror, loaded) = DiskMirror::open(dir.path()).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].key, "live");
        assert!(!dir.path().join("garbage.json").exists());
        assert!(!key_path(dir.path(), "dead").exists());
        mirror.flush().await;
    }

    #[test]
    fn test_plain_key_keeps_its_name() {
        let path = key_path(Path::new("/tmp/c"), "ctx_1-a");
        assert_eq!(path, PathBuf::from("/tmp/c/ctx_1-a.json"));
    }

    #[test]
    fn test_unsafe_key_stays_inside_dir() {
        let path = key_path(Path::new("/tmp/c"), "../a/b:c..d");
        assert_eq!(path.parent(), Some(Path::new("/tmp/c")));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(HASHED_NAME_PREFIX));
        assert!(!name.contains('/'));
    }

    #[test]
    fn test_keys_differing_only_in_unsafe_chars_get_distinct_files() {
        let dir = Path::new("/tmp/c");
        assert_ne!(key_path(dir, "a/b"), key_path(dir, "a_b"));
        assert_ne!(key_path(dir, "a/b"), key_path(dir, "a:b"));
        assert_ne!(key_path(dir, "a.b"), key_path(dir, "a_b"));
    }

    #[tokio::test]
    async fn test_keys_differing_only_in_unsafe_chars_both_reload() {
        let dir = TempDir::new().unwrap();
        let (mirror, _) = DiskMirror::open(dir.path()).await.unwrap();
        mirror.write(&CacheEntry::new("a/b".to_string(), "slash".to_string(), 60_000));
        mirror.write(&CacheEntry::new("a_b".to_string(), "underscore".to_string(), 60_000));
        mirror.flush().await;

        let (mirror, loaded) = DiskMirror::open(dir.path()).await.unwrap();
        assert_eq!(loaded.len(), 2);
        let slash = loaded.iter().find(|e| e.key == "a/b").unwrap();
        assert_eq!(slash.payload, "slash");
        mirror.flush().await;
    }
}
