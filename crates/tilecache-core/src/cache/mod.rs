//! Persistent tile storage for offline map access.
//!
//! This module provides the `TileStore`, a durable key → blob store keyed by
//! tile coordinate. Entries carry the time they were cached and are treated as
//! misses once they are older than the retention window (7 days by default).
//!
//! A store that cannot be opened (unreadable directory, corrupt manifest) is
//! never fatal: `TileStore::open_or_disabled` logs and hands back a disabled
//! store that misses on every read.

pub mod store;

pub use store::{CachedTileEntry, StoreError, StoreStats, TileStore, DEFAULT_RETENTION_DAYS};
