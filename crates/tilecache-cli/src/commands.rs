//! Subcommand implementations.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use tilecache_core::diagnostics::{DiagnosticsSnapshot, StatusIndicator};
use tilecache_core::fetch::{HttpTileFetcher, Placeholder, TileSource};
use tilecache_core::models::LatLon;
use tilecache_core::network::{probe, Subscription};
use tilecache_core::utils::format_bytes;
use tilecache_core::widget::{HeadlessWidgetFactory, HostElement};
use tilecache_core::{
    Config, LifecycleManager, MapMountController, MountOptions, NetworkStatus, NetworkStatusMonitor,
    TileCoordinate, TileFetchPipeline, TileStore,
};

/// Host element id used for the headless render.
const RENDER_HOST_ID: &str = "tilecache-cli";

#[derive(Debug, Clone, Copy)]
pub struct Area {
    pub lat: f64,
    pub lon: f64,
    pub zoom: u8,
    pub radius: u32,
}

impl Area {
    fn center(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }

    fn tiles(&self) -> Vec<TileCoordinate> {
        TileCoordinate::from_lat_lon(self.lat, self.lon, self.zoom).neighborhood(self.radius)
    }
}

// ===== Shared setup =====

async fn open_store(config: &Config) -> Result<Arc<TileStore>> {
    let dir = config.cache_dir()?;
    debug!(dir = %dir.display(), "Opening tile store");
    Ok(Arc::new(TileStore::open_or_disabled(dir, config.cache.retention()).await))
}

async fn seed_monitor(config: &Config, offline: bool) -> NetworkStatusMonitor {
    let status = if offline {
        NetworkStatus::Offline
    } else {
        probe(&config.network.probe_url, config.network.request_timeout()).await
    };
    info!(status = %status, "Network status");
    NetworkStatusMonitor::new(status)
}

/// Log every connectivity transition seen by `monitor` and count them.
fn track_transitions(monitor: &NetworkStatusMonitor) -> (Subscription, Arc<AtomicUsize>) {
    let transitions = Arc::new(AtomicUsize::new(0));
    let seen = transitions.clone();
    let subscription = monitor.on_change(move |status| {
        seen.fetch_add(1, Ordering::SeqCst);
        info!(status = %status, "Connectivity changed, new tile requests follow it");
    });
    (subscription, transitions)
}

fn build_pipeline(config: &Config, store: Arc<TileStore>, monitor: NetworkStatusMonitor) -> Result<TileFetchPipeline> {
    let fetcher = HttpTileFetcher::from_config(&config.network).context("Failed to create HTTP client")?;
    let placeholder = Placeholder::new().context("Failed to render placeholder tile")?;
    Ok(TileFetchPipeline::new(
        store,
        monitor,
        Arc::new(fetcher),
        TileSource::new(config.source.clone()),
        placeholder,
    ))
}

// ===== Tiles =====

pub async fn fetch(config: &Config, zoom: u8, x: u32, y: u32, offline: bool, output: Option<&Path>) -> Result<()> {
    let coord = TileCoordinate::new(zoom, x, y);
    if !coord.is_valid() {
        bail!("Tile {} is outside the grid for zoom {}", coord, zoom);
    }

    let store = open_store(config).await?;
    let monitor = seed_monitor(config, offline).await;
    let pipeline = build_pipeline(config, store, monitor)?;

    let image = pipeline.resolve_coordinate(coord).await;
    println!(
        "{}  {}  {}  {}",
        coord,
        image.origin(),
        image.content_type(),
        format_bytes(image.len() as u64)
    );

    if let Some(path) = output {
        tokio::fs::write(path, image.bytes())
            .await
            .with_context(|| format!("Failed to write tile to {}", path.display()))?;
    }

    // Let the background cache write land before exiting
    pipeline.flush().await;
    Ok(())
}

pub async fn prefetch(config: &Config, area: Area, concurrency: usize) -> Result<()> {
    let store = open_store(config).await?;
    if !store.is_enabled() {
        bail!("Tile cache is unavailable; nothing to prefetch into");
    }
    let monitor = seed_monitor(config, false).await;
    let pipeline = build_pipeline(config, store, monitor)?;

    let tiles = area.tiles();
    println!("Prefetching {} tiles at zoom {}", tiles.len(), area.zoom);
    let report = pipeline.prefetch(tiles, concurrency).await;
    if report.offline {
        bail!("Network is offline, nothing was downloaded");
    }

    println!(
        "Fetched {}, already cached {}, failed {}",
        report.fetched, report.skipped_cached, report.failed
    );
    Ok(())
}

pub async fn render(config: &Config, area: Area, offline: bool) -> Result<()> {
    let store = open_store(config).await?;
    let monitor = seed_monitor(config, offline).await;
    let (subscription, transitions) = track_transitions(&monitor);
    let pipeline = Arc::new(build_pipeline(config, store.clone(), monitor.clone())?);

    let policy = config.mount.policy();
    let grace = policy.teardown_grace;
    let controller = MapMountController::new(
        Arc::new(LifecycleManager::new()),
        pipeline.clone(),
        Arc::new(HeadlessWidgetFactory),
        policy,
    );

    let host = HostElement::new(RENDER_HOST_ID);
    let handle = controller.mount(
        &host,
        MountOptions {
            center: area.center(),
            zoom: area.zoom,
            radius: area.radius,
            ..MountOptions::default()
        },
    );
    if let Err(e) = handle.ready().await {
        subscription.unsubscribe();
        return Err(e).context("Map failed to mount");
    }

    // Re-check connectivity once the viewport has loaded
    if !offline {
        monitor.set(probe(&config.network.probe_url, config.network.request_timeout()).await);
    }

    let tiles = handle.loaded_tiles();
    let mut by_origin: BTreeMap<String, usize> = BTreeMap::new();
    for (coord, origin) in &tiles {
        println!("{:<16} {}", coord.to_string(), origin);
        *by_origin.entry(origin.to_string()).or_default() += 1;
    }
    let summary: Vec<String> = by_origin.iter().map(|(origin, n)| format!("{} {}", n, origin)).collect();
    println!("{} tiles: {}", tiles.len(), summary.join(", "));

    handle.unmount();
    tokio::time::sleep(grace).await;
    pipeline.flush().await;

    subscription.unsubscribe();
    debug!(transitions = transitions.load(Ordering::SeqCst), "Render finished");
    println!("{}", StatusIndicator::capture(&monitor, &store).await);
    Ok(())
}

pub async fn status(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let monitor = seed_monitor(config, false).await;
    println!("{}", StatusIndicator::capture(&monitor, &store).await);
    Ok(())
}

// ===== Cache maintenance =====

pub async fn cache_stats(config: &Config, json: bool) -> Result<()> {
    let store = open_store(config).await?;
    let snapshot = DiagnosticsSnapshot::capture(&store).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    match store.root() {
        Some(root) => println!("Cache: {}", root.display()),
        None => println!("Cache: unavailable"),
    }
    println!(
        "{} tiles, {} (retention {} days)",
        snapshot.cached_tile_count,
        format_bytes(snapshot.cached_bytes),
        store.retention().num_days()
    );
    Ok(())
}

pub async fn cache_sweep(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let removed = store.sweep_expired().await;
    println!("Removed {} expired tiles", removed);
    Ok(())
}

pub async fn cache_clear(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    store.clear().await.context("Failed to clear tile cache")?;
    println!("Tile cache cleared");
    Ok(())
}

// ===== Config =====

pub fn config_show(config: &Config) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

pub fn config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    Config::default().save_to(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
