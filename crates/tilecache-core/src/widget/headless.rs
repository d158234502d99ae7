//! A map widget with no pixels.
//!
//! Claims its host element, requests the block of tiles around the view
//! center through the resolver, keeps what arrives, and signals ready once
//! the first viewport is complete.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::fetch::{TileImage, TileOrigin};
use crate::lifecycle::MapInstanceId;
use crate::models::{LatLon, TileCoordinate};
use crate::mount::MountOptions;

use super::{HostElement, MapWidget, TileResolver, WidgetError, WidgetEvents, WidgetFactory};

const CONTAINER_CLASS: &str = "tilecache-container";
const INSTANCE_ATTRIBUTE: &str = "data-tilecache-instance";
const ZOOM_ATTRIBUTE: &str = "data-tilecache-zoom";

#[derive(Default)]
struct ViewState {
    visible: HashSet<TileCoordinate>,
    tiles: HashMap<TileCoordinate, TileImage>,
    ready_sent: bool,
    torn_down: bool,
}

pub struct HeadlessMapWidget {
    instance: MapInstanceId,
    host: HostElement,
    radius: u32,
    resolver: TileResolver,
    events: WidgetEvents,
    state: Arc<Mutex<ViewState>>,
}

impl HeadlessMapWidget {
    fn lock(&self) -> MutexGuard<'_, ViewState> {
        lock_state(&self.state)
    }

    fn deliver(state: &Mutex<ViewState>, events: &WidgetEvents, coord: TileCoordinate, image: TileImage) {
        let mut state = lock_state(state);
        if state.torn_down || !state.visible.contains(&coord) {
            // Scrolled out of view or widget gone; dropping releases it
            return;
        }
        state.tiles.insert(coord, image);

        if !state.ready_sent && state.visible.iter().all(|c| state.tiles.contains_key(c)) {
            state.ready_sent = true;
            events.ready();
        }
    }
}

fn lock_state(state: &Mutex<ViewState>) -> MutexGuard<'_, ViewState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MapWidget for HeadlessMapWidget {
    fn set_view(&self, center: LatLon, zoom: u8) {
        let center_tile = TileCoordinate::from_lat_lon(center.lat, center.lon, zoom);
        let wanted: HashSet<TileCoordinate> = center_tile.neighborhood(self.radius).into_iter().collect();

        let missing: Vec<TileCoordinate> = {
            let mut state = self.lock();
            if state.torn_down {
                return;
            }
            state.tiles.retain(|coord, _| wanted.contains(coord));
            let missing = wanted.iter().filter(|c| !state.tiles.contains_key(c)).copied().collect();
            state.visible = wanted;
            missing
        };

        self.host.set_attribute(ZOOM_ATTRIBUTE, &zoom.to_string());
        debug!(instance = %self.instance, center = %center_tile, requested = missing.len(), "View set");

        for coord in missing {
            let state = self.state.clone();
            let events = self.events.clone();
            self.resolver.request(coord, move |image| {
                HeadlessMapWidget::deliver(&state, &events, coord, image);
            });
        }
    }

    fn loaded_tiles(&self) -> Vec<(TileCoordinate, TileOrigin)> {
        let state = self.lock();
        let mut tiles: Vec<_> = state.tiles.iter().map(|(c, img)| (*c, img.origin())).collect();
        tiles.sort_by_key(|(c, _)| *c);
        tiles
    }

    fn teardown(&self) {
        {
            let mut state = self.lock();
            if state.torn_down {
                return;
            }
            state.torn_down = true;
            state.tiles.clear();
            state.visible.clear();
        }
        let released = self.host.release_claim(&self.instance);
        debug!(instance = %self.instance, released, "Headless widget torn down");
    }
}

/// Factory for [`HeadlessMapWidget`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessWidgetFactory;

impl WidgetFactory for HeadlessWidgetFactory {
    fn create(
        &self,
        host: &HostElement,
        instance: MapInstanceId,
        options: &MountOptions,
        resolver: TileResolver,
        events: WidgetEvents,
    ) -> Result<Arc<dyn MapWidget>, WidgetError> {
        host.claim(&instance)?;
        host.add_class(CONTAINER_CLASS);
        host.set_attribute(INSTANCE_ATTRIBUTE, &instance.to_string());

        let widget = HeadlessMapWidget {
            instance,
            host: host.clone(),
            radius: options.radius,
            resolver,
            events,
            state: Arc::new(Mutex::new(ViewState::default())),
        };
        widget.set_view(options.center, options.zoom);
        Ok(Arc::new(widget))
    }
}
