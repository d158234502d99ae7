use serde::{Deserialize, Serialize};

/// A plain latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A named place supplied by the host application. Coordinates are optional;
/// a location without them is simply not plotted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl Location {
    pub fn position(&self) -> Option<LatLon> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some(LatLon::new(lat, lon)),
            _ => None,
        }
    }
}

/// Geographic context pushed into the map: the places to show and which one
/// is currently selected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapContext {
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub selected: Option<String>,
}

impl MapContext {
    /// Locations that can be drawn, paired with their position.
    pub fn plotted(&self) -> Vec<(&Location, LatLon)> {
        self.locations
            .iter()
            .filter_map(|loc| loc.position().map(|pos| (loc, pos)))
            .collect()
    }

    /// Position of the selected location, if it exists and has coordinates.
    pub fn selected_position(&self) -> Option<LatLon> {
        let id = self.selected.as_deref()?;
        self.locations
            .iter()
            .find(|loc| loc.id == id)
            .and_then(Location::position)
    }
}
