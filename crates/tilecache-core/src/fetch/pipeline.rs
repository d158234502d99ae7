use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::cache::TileStore;
use crate::models::{TileCoordinate, TileRequest};
use crate::network::NetworkStatusMonitor;

use super::{FetchError, ImageTracker, Placeholder, TileFetcher, TileImage, TileOrigin, TileSource};

/// Tracks detached cache writes so callers can wait for them to settle.
#[derive(Default)]
struct PendingWrites {
    count: AtomicUsize,
    idle: Notify,
}

struct WriteGuard(Arc<PendingWrites>);

impl WriteGuard {
    fn new(pending: &Arc<PendingWrites>) -> Self {
        pending.count.fetch_add(1, Ordering::SeqCst);
        Self(pending.clone())
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Outcome of a bulk prefetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchReport {
    pub fetched: usize,
    pub skipped_cached: usize,
    pub failed: usize,
    /// Set when the prefetch was skipped entirely because we are offline.
    pub offline: bool,
}

enum PrefetchOutcome {
    Fetched,
    Cached,
    Failed,
}

/// Resolves tile requests to images: network first when online, then the
/// cache, then the placeholder. `resolve` never fails.
///
/// Requests are independent; any number may be in flight at once.
pub struct TileFetchPipeline {
    store: Arc<TileStore>,
    monitor: NetworkStatusMonitor,
    fetcher: Arc<dyn TileFetcher>,
    source: TileSource,
    placeholder: Placeholder,
    tracker: ImageTracker,
    writes: Arc<PendingWrites>,
}

impl TileFetchPipeline {
    pub fn new(
        store: Arc<TileStore>,
        monitor: NetworkStatusMonitor,
        fetcher: Arc<dyn TileFetcher>,
        source: TileSource,
        placeholder: Placeholder,
    ) -> Self {
        Self {
            store,
            monitor,
            fetcher,
            source,
            placeholder,
            tracker: ImageTracker::default(),
            writes: Arc::new(PendingWrites::default()),
        }
    }

    pub fn store(&self) -> &Arc<TileStore> {
        &self.store
    }

    pub fn monitor(&self) -> &NetworkStatusMonitor {
        &self.monitor
    }

    pub fn source(&self) -> &TileSource {
        &self.source
    }

    /// Image resources handed out and not yet released.
    pub fn live_images(&self) -> usize {
        self.tracker.live()
    }

    /// Cache writes spawned and not yet finished.
    pub fn pending_writes(&self) -> usize {
        self.writes.count.load(Ordering::SeqCst)
    }

    /// Resolve a tile using the configured source and the current network status.
    pub async fn resolve_coordinate(&self, coord: TileCoordinate) -> TileImage {
        let request = TileRequest::new(coord, self.source.url_template(), self.monitor.current());
        self.resolve(&request).await
    }

    /// Produce an image for `request`. Always returns something displayable.
    pub async fn resolve(&self, request: &TileRequest) -> TileImage {
        let coord = request.coordinate;

        if request.status.is_online() {
            match self.from_network(request).await {
                Ok(image) => return image,
                Err(e) => debug!(key = %coord, error = %e, "Network fetch failed, falling back to cache"),
            }
        }

        if let Some(image) = self.from_cache(coord).await {
            return image;
        }

        debug!(key = %coord, "No cached tile, using placeholder");
        TileImage::placeholder(coord, self.placeholder.png(), &self.tracker)
    }

    async fn from_network(&self, request: &TileRequest) -> Result<TileImage, FetchError> {
        let coord = request.coordinate;
        self.source.check(&coord)?;

        let url = self.source.resolve(&request.url_template, &coord);
        let bytes: Arc<[u8]> = self.fetcher.fetch(&url).await?.into();
        let image = TileImage::decode(coord, bytes.clone(), TileOrigin::Network, &self.tracker)?;

        self.spawn_write(coord, bytes, url);
        Ok(image)
    }

    /// Persist a fetched tile without holding up the caller.
    fn spawn_write(&self, coord: TileCoordinate, bytes: Arc<[u8]>, url: String) {
        let guard = WriteGuard::new(&self.writes);
        let store = self.store.clone();
        tokio::spawn(async move {
            store.put(coord, &bytes, &url).await;
            drop(guard);
        });
    }

    async fn from_cache(&self, coord: TileCoordinate) -> Option<TileImage> {
        let entry = self.store.get_entry(coord).await?;
        let cached_at = entry.cached_at;
        match TileImage::decode(coord, entry.image_data, TileOrigin::Cache, &self.tracker) {
            Ok(image) => {
                debug!(key = %coord, "Serving tile from cache");
                Some(image)
            }
            Err(e) => {
                warn!(key = %coord, error = %e, "Cached tile is unusable, discarding");
                self.store.delete_if_unchanged(coord, cached_at).await;
                None
            }
        }
    }

    /// Wait until every cache write spawned so far has completed.
    pub async fn flush(&self) {
        loop {
            let idle = self.writes.idle.notified();
            if self.writes.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Download and store `coords` ahead of time so they are available
    /// offline. Tiles already cached are skipped.
    pub async fn prefetch(&self, coords: Vec<TileCoordinate>, concurrency: usize) -> PrefetchReport {
        let mut report = PrefetchReport::default();
        if !self.monitor.current().is_online() {
            warn!(tiles = coords.len(), "Offline, skipping prefetch");
            report.offline = true;
            return report;
        }

        let total = coords.len();
        let outcomes: Vec<PrefetchOutcome> = stream::iter(coords)
            .map(|coord| self.prefetch_one(coord))
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                PrefetchOutcome::Fetched => report.fetched += 1,
                PrefetchOutcome::Cached => report.skipped_cached += 1,
                PrefetchOutcome::Failed => report.failed += 1,
            }
        }

        info!(
            total,
            fetched = report.fetched,
            cached = report.skipped_cached,
            failed = report.failed,
            "Prefetch complete"
        );
        report
    }

    async fn prefetch_one(&self, coord: TileCoordinate) -> PrefetchOutcome {
        if self.store.get(coord).await.is_some() {
            return PrefetchOutcome::Cached;
        }

        let result = async {
            let url = self.source.url(&coord)?;
            let bytes = self.fetcher.fetch(&url).await?;
            image::guess_format(&bytes).map_err(|_| FetchError::NotAnImage)?;
            Ok::<_, FetchError>((url, bytes))
        }
        .await;

        match result {
            Ok((url, bytes)) => {
                self.store.put(coord, &bytes, &url).await;
                PrefetchOutcome::Fetched
            }
            Err(e) => {
                warn!(key = %coord, error = %e, "Prefetch failed");
                PrefetchOutcome::Failed
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
