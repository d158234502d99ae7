//! Per-tile acquisition: network, then cache, then placeholder.
//!
//! This module provides the `TileFetchPipeline`, which turns a `TileRequest`
//! into a displayable `TileImage` and never fails. Successful network fetches
//! are written back to the `TileStore` on a detached task.
//!
//! Supporting pieces:
//! - `TileSource`: URL template resolution with subdomain rotation
//! - `TileFetcher` / `HttpTileFetcher`: single-attempt HTTP download
//! - `placeholder`: the synthetic "no cached tile" image

pub mod client;
pub mod error;
pub mod pipeline;
pub mod placeholder;
pub mod resource;
pub mod source;

pub use client::{HttpTileFetcher, TileFetcher};
pub use error::FetchError;
pub use placeholder::Placeholder;
pub use pipeline::{PrefetchReport, TileFetchPipeline};
pub use resource::{ImageTracker, TileImage, TileOrigin};
pub use source::TileSource;
