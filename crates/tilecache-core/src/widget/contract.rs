use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::fetch::{TileFetchPipeline, TileImage, TileOrigin};
use crate::lifecycle::{LifecycleManager, MapInstanceId};
use crate::models::{LatLon, TileCoordinate};
use crate::mount::MountOptions;

use super::HostElement;

/// Errors a widget can raise. The mount controller's retry policy matches on
/// the variant, never on the message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WidgetError {
    /// The host element still belongs to another instance (usually one whose
    /// teardown has not finished). Transient.
    #[error("Host element '{host}' is already claimed by {owner}")]
    ContainerConflict { host: String, owner: MapInstanceId },

    #[error("Map widget failed: {0}")]
    Fatal(String),
}

impl WidgetError {
    pub fn is_container_conflict(&self) -> bool {
        matches!(self, WidgetError::ContainerConflict { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetEvent {
    Ready,
    Error(WidgetError),
}

/// Where a widget reports readiness and runtime errors.
#[derive(Debug, Clone)]
pub struct WidgetEvents {
    tx: mpsc::UnboundedSender<WidgetEvent>,
}

impl WidgetEvents {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WidgetEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn ready(&self) {
        self.send(WidgetEvent::Ready);
    }

    pub fn error(&self, error: WidgetError) {
        self.send(WidgetEvent::Error(error));
    }

    fn send(&self, event: WidgetEvent) {
        // A closed channel means nobody is listening anymore
        if self.tx.send(event).is_err() {
            debug!("Widget event dropped, controller gone");
        }
    }
}

/// A tile-resolution strategy bound to one map instance. Results that arrive
/// after the instance has been released are dropped without being delivered.
#[derive(Clone)]
pub struct TileResolver {
    instance: MapInstanceId,
    pipeline: Arc<TileFetchPipeline>,
    lifecycle: Arc<LifecycleManager>,
}

impl TileResolver {
    pub fn new(instance: MapInstanceId, pipeline: Arc<TileFetchPipeline>, lifecycle: Arc<LifecycleManager>) -> Self {
        Self {
            instance,
            pipeline,
            lifecycle,
        }
    }

    pub fn instance(&self) -> MapInstanceId {
        self.instance
    }

    /// Resolve `coord` in the background and hand the image to `done`.
    pub fn request<F>(&self, coord: TileCoordinate, done: F)
    where
        F: FnOnce(TileImage) + Send + 'static,
    {
        let resolver = self.clone();
        tokio::spawn(async move {
            let image = resolver.pipeline.resolve_coordinate(coord).await;
            if resolver.lifecycle.is_active(&resolver.instance) {
                done(image);
            } else {
                debug!(instance = %resolver.instance, key = %coord, "Instance gone, dropping tile");
                image.release();
            }
        });
    }
}

/// A live map widget.
pub trait MapWidget: Send + Sync {
    /// Recenter and re-zoom.
    fn set_view(&self, center: LatLon, zoom: u8);

    /// Tiles currently held for display.
    fn loaded_tiles(&self) -> Vec<(TileCoordinate, TileOrigin)>;

    /// Release the host element and every held tile.
    fn teardown(&self);
}

/// Builds widgets against a host element.
pub trait WidgetFactory: Send + Sync {
    fn create(
        &self,
        host: &HostElement,
        instance: MapInstanceId,
        options: &MountOptions,
        resolver: TileResolver,
        events: WidgetEvents,
    ) -> Result<Arc<dyn MapWidget>, WidgetError>;
}
