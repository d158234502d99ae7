use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::models::TileCoordinate;
use crate::utils::format_age;

/// Tiles older than this are treated as misses and evicted.
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

/// Manifest file name in the store root
const MANIFEST_FILE: &str = "manifest.json";

/// Directory under the root holding `zoom/x/y.tile` entries
const TILES_DIR: &str = "tiles";

const ENTRY_EXTENSION: &str = "tile";
const TEMP_EXTENSION: &str = "tmp";

/// Bump when the on-disk entry layout changes.
const STORE_FORMAT_VERSION: u32 = 1;

/// Upper bound on an entry's JSON header line.
const MAX_HEADER_BYTES: u64 = 8 * 1024;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Tile store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tile store manifest is corrupt: {0}")]
    CorruptManifest(String),

    #[error("Unsupported tile store version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Corrupt tile entry {key}: {reason}")]
    CorruptEntry { key: String, reason: String },

    #[error("Failed to encode tile entry: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    created_at: DateTime<Utc>,
}

/// First line of every entry file. The raw blob follows the newline.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryHeader {
    key: String,
    cached_at: DateTime<Utc>,
    source_url: String,
    size: u64,
}

/// One cached tile as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedTileEntry {
    pub key: String,
    pub image_data: Vec<u8>,
    pub cached_at: DateTime<Utc>,
    pub source_url: String,
}

impl CachedTileEntry {
    pub fn age(&self) -> Duration {
        Utc::now() - self.cached_at
    }

    pub fn age_display(&self) -> String {
        format_age(self.age())
    }
}

/// Aggregate view over every live entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub count: usize,
    pub total_bytes: u64,
}

/// Durable tile store. One file per tile, written via temp file + rename so
/// the last completed write wins and readers never see a partial entry.
///
/// Safe to share behind an `Arc` and call concurrently; there is no global
/// lock, each tile is independent.
#[derive(Debug)]
pub struct TileStore {
    /// `None` when the store failed to open and runs as always-miss.
    root: Option<PathBuf>,
    retention: Duration,
}

impl TileStore {
    /// Open (or create) a store rooted at `dir` and sweep expired entries.
    pub async fn open(dir: impl Into<PathBuf>, retention: Duration) -> Result<Self, StoreError> {
        let root = dir.into();
        tokio::fs::create_dir_all(root.join(TILES_DIR)).await?;
        Self::check_manifest(&root).await?;

        let store = Self {
            root: Some(root),
            retention,
        };
        store.remove_temp_files().await;
        let removed = store.sweep_expired().await;
        info!(root = ?store.root, removed, "Tile store opened");
        Ok(store)
    }

    /// Open the store, or fall back to a disabled always-miss store when the
    /// directory or manifest is unusable.
    pub async fn open_or_disabled(dir: impl Into<PathBuf>, retention: Duration) -> Self {
        let dir = dir.into();
        match Self::open(&dir, retention).await {
            Ok(store) => store,
            Err(e) => {
                warn!(dir = ?dir, error = %e, "Tile store unavailable, continuing without cache");
                Self::disabled(retention)
            }
        }
    }

    /// A store that never holds anything.
    pub fn disabled(retention: Duration) -> Self {
        Self { root: None, retention }
    }

    pub fn is_enabled(&self) -> bool {
        self.root.is_some()
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    async fn check_manifest(root: &Path) -> Result<(), StoreError> {
        let path = root.join(MANIFEST_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let manifest: Manifest = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::CorruptManifest(e.to_string()))?;
                if manifest.version != STORE_FORMAT_VERSION {
                    return Err(StoreError::UnsupportedVersion {
                        found: manifest.version,
                        expected: STORE_FORMAT_VERSION,
                    });
                }
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let manifest = Manifest {
                    version: STORE_FORMAT_VERSION,
                    created_at: Utc::now(),
                };
                tokio::fs::write(&path, serde_json::to_vec_pretty(&manifest)?).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn entry_path(root: &Path, coord: &TileCoordinate) -> PathBuf {
        root.join(TILES_DIR)
            .join(coord.zoom.to_string())
            .join(coord.x.to_string())
            .join(format!("{}.{}", coord.y, ENTRY_EXTENSION))
    }

    fn is_expired(&self, cached_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - cached_at > self.retention
    }

    // ===== Writes =====

    /// Upsert a tile with `cached_at = now`. Failures are logged, never returned.
    pub async fn put(&self, coord: TileCoordinate, blob: &[u8], source_url: &str) {
        self.put_at(coord, blob, source_url, Utc::now()).await
    }

    /// Upsert a tile with an explicit timestamp.
    pub async fn put_at(&self, coord: TileCoordinate, blob: &[u8], source_url: &str, cached_at: DateTime<Utc>) {
        let Some(root) = self.root.as_deref() else {
            debug!(key = %coord, "Tile store disabled, dropping write");
            return;
        };
        if let Err(e) = Self::write_entry(root, &coord, blob, source_url, cached_at).await {
            warn!(key = %coord, error = %e, "Failed to cache tile");
        }
    }

    async fn write_entry(
        root: &Path,
        coord: &TileCoordinate,
        blob: &[u8],
        source_url: &str,
        cached_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let path = Self::entry_path(root, coord);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let header = EntryHeader {
            key: coord.key(),
            cached_at,
            source_url: source_url.to_string(),
            size: blob.len() as u64,
        };
        let mut contents = serde_json::to_vec(&header)?;
        contents.push(b'\n');
        contents.extend_from_slice(blob);

        // Unique temp name so concurrent writers of one tile never share a file
        let temp = path.with_extension(format!("{}.{:016x}.{}", ENTRY_EXTENSION, rand::random::<u64>(), TEMP_EXTENSION));
        if let Err(e) = tokio::fs::write(&temp, &contents).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        debug!(key = %coord, bytes = blob.len(), "Tile cached");
        Ok(())
    }

    /// Remove a tile if present. Idempotent.
    pub async fn delete(&self, coord: TileCoordinate) {
        let Some(root) = self.root.as_deref() else {
            return;
        };
        Self::remove_path(&Self::entry_path(root, &coord)).await;
    }

    /// Delete `coord` only if it is still the entry written at `cached_at`.
    /// A newer write that landed since the caller read it is kept.
    pub async fn delete_if_unchanged(&self, coord: TileCoordinate, cached_at: DateTime<Utc>) {
        let Some(root) = self.root.as_deref() else {
            return;
        };
        self.evict(root, &coord, Some(cached_at)).await;
    }

    async fn remove_path(path: &Path) -> bool {
        match tokio::fs::remove_file(path).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to remove tile entry");
                false
            }
        }
    }

    /// Remove an entry found stale or corrupt, unless it was replaced in the
    /// meantime by a fresh write.
    async fn evict(&self, root: &Path, coord: &TileCoordinate, observed: Option<DateTime<Utc>>) {
        let path = Self::entry_path(root, coord);
        let current = Self::read_header(&path).await.ok().map(|(h, _)| h.cached_at);
        if current == observed {
            Self::remove_path(&path).await;
        } else {
            debug!(key = %coord, "Entry replaced before eviction, keeping it");
        }
    }

    /// Drop every entry.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let Some(root) = self.root.as_deref() else {
            return Ok(());
        };
        let tiles = root.join(TILES_DIR);
        match tokio::fs::remove_dir_all(&tiles).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&tiles).await?;
        info!("Tile store cleared");
        Ok(())
    }

    // ===== Reads =====

    /// Cached blob for `coord`, or `None` if absent, corrupt, or expired.
    pub async fn get(&self, coord: TileCoordinate) -> Option<Vec<u8>> {
        self.get_entry(coord).await.map(|entry| entry.image_data)
    }

    /// Full cached entry for `coord`. Expired and corrupt entries are removed
    /// before this returns `None`.
    pub async fn get_entry(&self, coord: TileCoordinate) -> Option<CachedTileEntry> {
        let root = self.root.as_deref()?;
        let path = Self::entry_path(root, &coord);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(key = %coord, error = %e, "Failed to read cached tile");
                return None;
            }
        };

        let entry = match decode_entry(&coord.key(), &bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %coord, error = %e, "Discarding corrupt cache entry");
                self.evict(root, &coord, None).await;
                return None;
            }
        };

        if self.is_expired(entry.cached_at, Utc::now()) {
            debug!(key = %coord, age = %entry.age_display(), "Cached tile expired");
            self.evict(root, &coord, Some(entry.cached_at)).await;
            return None;
        }

        Some(entry)
    }

    async fn read_header(path: &Path) -> Result<(EntryHeader, u64), StoreError> {
        let file = tokio::fs::File::open(path).await?;
        let file_len = file.metadata().await?.len();
        let mut reader = BufReader::new(file).take(MAX_HEADER_BYTES);
        let mut line = Vec::new();
        reader.read_until(b'\n', &mut line).await?;

        let corrupt = |reason: &str| StoreError::CorruptEntry {
            key: path.display().to_string(),
            reason: reason.to_string(),
        };
        if line.last() != Some(&b'\n') {
            return Err(corrupt("missing header terminator"));
        }
        let header: EntryHeader =
            serde_json::from_slice(&line[..line.len() - 1]).map_err(|e| corrupt(&e.to_string()))?;
        if line.len() as u64 + header.size != file_len {
            return Err(corrupt("body length does not match header"));
        }
        Ok((header, file_len))
    }

    /// Every entry file under the store, without reading their contents.
    async fn entry_paths(&self) -> Vec<PathBuf> {
        let Some(root) = self.root.as_deref() else {
            return Vec::new();
        };
        let mut found = Vec::new();
        let mut pending = vec![root.join(TILES_DIR)];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    debug!(dir = ?dir, error = %e, "Skipping unreadable cache directory");
                    continue;
                }
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                match entry.file_type().await {
                    Ok(ft) if ft.is_dir() => pending.push(path),
                    Ok(ft) if ft.is_file() => found.push(path),
                    _ => {}
                }
            }
        }
        found
    }

    fn has_extension(path: &Path, ext: &str) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some(ext)
    }

    async fn remove_temp_files(&self) {
        for path in self.entry_paths().await {
            if Self::has_extension(&path, TEMP_EXTENSION) {
                debug!(path = ?path, "Removing leftover temp file");
                Self::remove_path(&path).await;
            }
        }
    }

    /// Delete every expired (or unreadable) entry, oldest first. Returns how
    /// many entries were removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut removed = 0;
        let mut dated = Vec::new();

        for path in self.entry_paths().await {
            if !Self::has_extension(&path, ENTRY_EXTENSION) {
                continue;
            }
            match Self::read_header(&path).await {
                Ok((header, _)) => dated.push((header.cached_at, path)),
                Err(e) => {
                    debug!(path = ?path, error = %e, "Sweeping unreadable entry");
                    if Self::remove_path(&path).await {
                        removed += 1;
                    }
                }
            }
        }

        dated.sort_by_key(|(cached_at, _)| *cached_at);
        for (cached_at, path) in dated {
            if !self.is_expired(cached_at, now) {
                break;
            }
            if Self::remove_path(&path).await {
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "Swept expired tiles");
        }
        removed
    }

    /// Count and total blob size of every live entry.
    pub async fn stats(&self) -> StoreStats {
        let now = Utc::now();
        let mut stats = StoreStats::default();
        for path in self.entry_paths().await {
            if !Self::has_extension(&path, ENTRY_EXTENSION) {
                continue;
            }
            if let Ok((header, _)) = Self::read_header(&path).await {
                if !self.is_expired(header.cached_at, now) {
                    stats.count += 1;
                    stats.total_bytes += header.size;
                }
            }
        }
        stats
    }
}

fn decode_entry(key: &str, bytes: &[u8]) -> Result<CachedTileEntry, StoreError> {
    let corrupt = |reason: String| StoreError::CorruptEntry {
        key: key.to_string(),
        reason,
    };
    let split = bytes
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| corrupt("missing header terminator".to_string()))?;
    let header: EntryHeader = serde_json::from_slice(&bytes[..split]).map_err(|e| corrupt(e.to_string()))?;
    let body = &bytes[split + 1..];

    if header.key != key {
        return Err(corrupt(format!("entry belongs to {}", header.key)));
    }
    if body.len() as u64 != header.size {
        return Err(corrupt(format!("expected {} bytes, found {}", header.size, body.len())));
    }

    Ok(CachedTileEntry {
        key: header.key,
        image_data: body.to_vec(),
        cached_at: header.cached_at,
        source_url: header.source_url,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const URL: &str = "https://tiles.example/3/1/2.png";

    async fn open_store(dir: &TempDir) -> TileStore {
        TileStore::open(dir.path(), Duration::days(DEFAULT_RETENTION_DAYS))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let coord = TileCoordinate::new(3, 1, 2);
        let blob: Vec<u8> = (0..=255u8).chain(b"\n\n".iter().copied()).collect();

        store.put(coord, &blob, URL).await;
        assert_eq!(store.get(coord).await, Some(blob.clone()));

        let entry = store.get_entry(coord).await.unwrap();
        assert_eq!(entry.key, "3/1/2");
        assert_eq!(entry.source_url, URL);
        assert_eq!(entry.age_display(), "just now");
    }

    #[tokio::test]
    async fn test_put_overwrites_previous_entry() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let coord = TileCoordinate::new(1, 0, 1);

        store.put(coord, b"first", URL).await;
        store.put(coord, b"second", URL).await;
        assert_eq!(store.get(coord).await, Some(b"second".to_vec()));
        assert_eq!(store.stats().await.count, 1);
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        assert_eq!(store.get(TileCoordinate::new(9, 9, 9)).await, None);
    }

    #[tokio::test]
    async fn test_expired_entry_is_miss_and_removed() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let coord = TileCoordinate::new(5, 10, 10);

        store.put_at(coord, b"old", URL, Utc::now() - Duration::days(8)).await;
        assert_eq!(store.get(coord).await, None);

        let path = TileStore::entry_path(dir.path(), &coord);
        assert!(!path.exists());
        assert_eq!(store.stats().await, StoreStats::default());
    }

    #[tokio::test]
    async fn test_recent_entry_is_hit() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let coord = TileCoordinate::new(5, 10, 10);

        store.put_at(coord, b"fresh", URL, Utc::now() - Duration::hours(2)).await;
        assert_eq!(store.get(coord).await, Some(b"fresh".to_vec()));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let coord = TileCoordinate::new(2, 1, 1);

        store.put(coord, b"tile", URL).await;
        store.delete(coord).await;
        store.delete(coord).await;
        assert_eq!(store.get(coord).await, None);
    }

    #[tokio::test]
    async fn test_guarded_delete_keeps_newer_write() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let coord = TileCoordinate::new(2, 1, 1);

        store.put_at(coord, b"old", URL, Utc::now() - Duration::hours(1)).await;
        let stale = store.get_entry(coord).await.unwrap().cached_at;
        store.put(coord, b"new", URL).await;

        store.delete_if_unchanged(coord, stale).await;
        let current = store.get_entry(coord).await.unwrap();
        assert_eq!(current.image_data, b"new".to_vec());

        store.delete_if_unchanged(coord, current.cached_at).await;
        assert_eq!(store.get(coord).await, None);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let now = Utc::now();

        store.put_at(TileCoordinate::new(1, 0, 0), b"a", URL, now - Duration::days(30)).await;
        store.put_at(TileCoordinate::new(1, 0, 1), b"bb", URL, now - Duration::days(8)).await;
        store.put_at(TileCoordinate::new(1, 1, 0), b"ccc", URL, now - Duration::days(6)).await;
        store.put(TileCoordinate::new(1, 1, 1), b"dddd", URL).await;

        assert_eq!(store.sweep_expired().await, 2);
        assert_eq!(
            store.stats().await,
            StoreStats {
                count: 2,
                total_bytes: 7
            }
        );
        assert_eq!(store.sweep_expired().await, 0);
    }

    #[tokio::test]
    async fn test_stats_ignores_expired_before_sweep() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store.put(TileCoordinate::new(4, 2, 2), b"12345", URL).await;
        store
            .put_at(TileCoordinate::new(4, 2, 3), b"xyz", URL, Utc::now() - Duration::days(10))
            .await;

        assert_eq!(
            store.stats().await,
            StoreStats {
                count: 1,
                total_bytes: 5
            }
        );
    }

    #[tokio::test]
    async fn test_open_sweeps_expired_entries() {
        let dir = TempDir::new().unwrap();
        let coord = TileCoordinate::new(6, 3, 3);
        {
            let store = open_store(&dir).await;
            store.put_at(coord, b"stale", URL, Utc::now() - Duration::days(9)).await;
        }
        let path = TileStore::entry_path(dir.path(), &coord);
        assert!(path.exists());

        let _store = open_store(&dir).await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_miss_and_removed() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let coord = TileCoordinate::new(7, 1, 1);
        let path = TileStore::entry_path(dir.path(), &coord);

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"not a header at all").unwrap();

        assert_eq!(store.get(coord).await, None);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_truncated_entry_is_miss() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let coord = TileCoordinate::new(7, 2, 2);

        store.put(coord, b"0123456789", URL).await;
        let path = TileStore::entry_path(dir.path(), &coord);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 3);
        std::fs::write(&path, bytes).unwrap();

        assert_eq!(store.get(coord).await, None);
        assert_eq!(store.stats().await.count, 0);
    }

    #[tokio::test]
    async fn test_corrupt_manifest_fails_open() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), b"{ broken").unwrap();

        let result = TileStore::open(dir.path(), Duration::days(7)).await;
        assert!(matches!(result, Err(StoreError::CorruptManifest(_))));
    }

    #[tokio::test]
    async fn test_unsupported_version_fails_open() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            br#"{"version": 99, "created_at": "2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        let result = TileStore::open(dir.path(), Duration::days(7)).await;
        assert!(matches!(result, Err(StoreError::UnsupportedVersion { found: 99, .. })));
    }

    #[tokio::test]
    async fn test_corrupt_store_degrades_to_always_miss() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), b"garbage").unwrap();

        let store = TileStore::open_or_disabled(dir.path(), Duration::days(7)).await;
        assert!(!store.is_enabled());

        let coord = TileCoordinate::new(1, 1, 1);
        store.put(coord, b"data", URL).await;
        assert_eq!(store.get(coord).await, None);
        assert_eq!(store.stats().await, StoreStats::default());
        assert_eq!(store.sweep_expired().await, 0);
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        store.put(TileCoordinate::new(2, 0, 0), b"a", URL).await;
        store.put(TileCoordinate::new(2, 0, 1), b"b", URL).await;

        store.clear().await.unwrap();
        assert_eq!(store.stats().await.count, 0);

        store.put(TileCoordinate::new(2, 0, 0), b"c", URL).await;
        assert_eq!(store.stats().await.count, 1);
    }

    #[tokio::test]
    async fn test_concurrent_puts_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let store = std::sync::Arc::new(open_store(&dir).await);
        let coord = TileCoordinate::new(8, 4, 4);

        let writers: Vec<_> = (0..8u8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.put(coord, &[i; 32], URL).await })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        let blob = store.get(coord).await.unwrap();
        assert_eq!(blob.len(), 32);
        assert!(blob.iter().all(|&b| b == blob[0]));
        assert_eq!(store.stats().await.count, 1);
    }

    #[test]
    fn test_decode_rejects_foreign_key() {
        let header = EntryHeader {
            key: "1/0/0".to_string(),
            cached_at: Utc::now(),
            source_url: URL.to_string(),
            size: 2,
        };
        let mut bytes = serde_json::to_vec(&header).unwrap();
        bytes.push(b'\n');
        bytes.extend_from_slice(b"ok");

        assert!(decode_entry("1/0/0", &bytes).is_ok());
        assert!(matches!(
            decode_entry("1/1/1", &bytes),
            Err(StoreError::CorruptEntry { .. })
        ));
    }
}
