use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Deepest zoom level we accept. 2^30 tiles per axis still fits in a `u32`.
pub const MAX_SUPPORTED_ZOOM: u8 = 30;

/// Web mercator cuts off at this latitude.
const MERCATOR_MAX_LAT: f64 = 85.051_128_78;

/// One tile in the standard quad-tree (slippy map) scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoordinate {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoordinate {
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Storage key, `"zoom/x/y"`.
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.zoom, self.x, self.y)
    }

    /// Number of tiles along one axis at this zoom.
    pub fn axis_len(zoom: u8) -> u64 {
        1u64 << zoom.min(MAX_SUPPORTED_ZOOM)
    }

    pub fn is_valid(&self) -> bool {
        let n = Self::axis_len(self.zoom);
        self.zoom <= MAX_SUPPORTED_ZOOM && (self.x as u64) < n && (self.y as u64) < n
    }

    /// Tile containing the given point, clamped to the mercator range.
    pub fn from_lat_lon(lat: f64, lon: f64, zoom: u8) -> Self {
        let zoom = zoom.min(MAX_SUPPORTED_ZOOM);
        let n = Self::axis_len(zoom) as f64;
        let lat = lat.clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT).to_radians();
        let lon = lon.clamp(-180.0, 180.0);

        let x = ((lon + 180.0) / 360.0 * n).floor();
        let y = ((1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / std::f64::consts::PI) / 2.0 * n).floor();

        let max = n - 1.0;
        Self {
            zoom,
            x: x.clamp(0.0, max) as u32,
            y: y.clamp(0.0, max) as u32,
        }
    }

    /// The `(2 * radius + 1)^2` block of tiles centred on this one, skipping
    /// anything off the edge of the world.
    pub fn neighborhood(&self, radius: u32) -> Vec<TileCoordinate> {
        let n = Self::axis_len(self.zoom) as i64;
        let r = radius as i64;
        let mut tiles = Vec::new();
        for dy in -r..=r {
            for dx in -r..=r {
                let x = self.x as i64 + dx;
                let y = self.y as i64 + dy;
                if (0..n).contains(&x) && (0..n).contains(&y) {
                    tiles.push(TileCoordinate::new(self.zoom, x as u32, y as u32));
                }
            }
        }
        tiles
    }
}

impl fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid tile key '{0}', expected zoom/x/y")]
pub struct ParseCoordinateError(pub String);

impl FromStr for TileCoordinate {
    type Err = ParseCoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseCoordinateError(s.to_string());
        let mut parts = s.split('/');
        let zoom = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        let x = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        let y = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(Self { zoom, x, y })
    }
}

/// Current connectivity as last reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkStatus {
    Online,
    Offline,
}

impl NetworkStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, NetworkStatus::Online)
    }

    pub fn label(&self) -> &'static str {
        match self {
            NetworkStatus::Online => "online",
            NetworkStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single tile the widget wants drawn. Transient, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRequest {
    pub coordinate: TileCoordinate,
    pub url_template: String,
    pub status: NetworkStatus,
}

impl TileRequest {
    pub fn new(coordinate: TileCoordinate, url_template: impl Into<String>, status: NetworkStatus) -> Self {
        Self {
            coordinate,
            url_template: url_template.into(),
            status,
        }
    }
}
