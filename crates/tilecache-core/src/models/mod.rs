//! Data models shared across the pipeline.
//!
//! - `TileCoordinate`, `TileRequest`: tile addressing and per-tile requests
//! - `NetworkStatus`: the online/offline signal value
//! - `Location`, `MapContext`: geographic context supplied by the host application

pub mod location;
pub mod tile;

pub use location::{LatLon, Location, MapContext};
pub use tile::{NetworkStatus, ParseCoordinateError, TileCoordinate, TileRequest};
