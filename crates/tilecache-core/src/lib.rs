//! tilecache-core - offline-capable tile caching for interactive maps.
//!
//! The crate is organised leaves first:
//!
//! - `models`: tile coordinates, requests and the inbound geographic context
//! - `cache`: the persistent, expiring tile store
//! - `network`: the online/offline signal
//! - `fetch`: the network → cache → placeholder pipeline
//! - `lifecycle`: map instance identities and host surface scrubbing
//! - `widget`: the host widget contract and a headless implementation
//! - `mount`: the controller that owns one widget instance end to end
//! - `diagnostics`: read-only cache/network snapshot for status displays
//! - `config`: on-disk configuration

pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod fetch;
pub mod lifecycle;
pub mod models;
pub mod mount;
pub mod network;
pub mod utils;
pub mod widget;

pub use cache::{StoreStats, TileStore};
pub use config::Config;
pub use fetch::{TileFetchPipeline, TileImage, TileOrigin};
pub use lifecycle::{LifecycleManager, MapInstanceId};
pub use models::{MapContext, NetworkStatus, TileCoordinate, TileRequest};
pub use mount::{MapMountController, MountHandle, MountOptions};
pub use network::NetworkStatusMonitor;
