//! Read-only cache and network snapshot for status displays.
//!
//! Nothing here drives fetch or eviction decisions.

use std::fmt;

use serde::Serialize;

use crate::cache::TileStore;
use crate::models::NetworkStatus;
use crate::network::NetworkStatusMonitor;
use crate::utils::format_bytes;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticsSnapshot {
    pub cached_tile_count: usize,
    pub cached_bytes: u64,
}

impl DiagnosticsSnapshot {
    pub async fn capture(store: &TileStore) -> Self {
        let stats = store.stats().await;
        Self {
            cached_tile_count: stats.count,
            cached_bytes: stats.total_bytes,
        }
    }
}

/// One-line status: connectivity plus how much is cached for offline use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusIndicator {
    pub status: NetworkStatus,
    pub snapshot: DiagnosticsSnapshot,
}

impl StatusIndicator {
    pub async fn capture(monitor: &NetworkStatusMonitor, store: &TileStore) -> Self {
        Self {
            status: monitor.current(),
            snapshot: DiagnosticsSnapshot::capture(store).await,
        }
    }
}

impl fmt::Display for StatusIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tiles = self.snapshot.cached_tile_count;
        write!(
            f,
            "{} · {} tile{} cached ({})",
            self.status.label(),
            tiles,
            if tiles == 1 { "" } else { "s" },
            format_bytes(self.snapshot.cached_bytes)
        )
    }
}
