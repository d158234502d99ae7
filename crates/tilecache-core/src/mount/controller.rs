use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::fetch::{TileFetchPipeline, TileOrigin};
use crate::lifecycle::{LifecycleError, LifecycleManager, MapInstanceId};
use crate::models::{LatLon, MapContext, TileCoordinate};
use crate::widget::{HostElement, MapWidget, TileResolver, WidgetError, WidgetEvent, WidgetEvents, WidgetFactory};

// ============================================================================
// Constants
// ============================================================================

/// Immediate retry, then one short backoff.
const DEFAULT_RETRY_DELAYS_MS: [u64; 2] = [0, 150];

/// How long an unmounted widget lingers before teardown.
const DEFAULT_TEARDOWN_GRACE_MS: u64 = 50;

// ============================================================================
// Public types
// ============================================================================

/// Retry and teardown timing for mounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPolicy {
    /// One extra attempt per entry after a container conflict, each preceded
    /// by its delay.
    pub retry_delays: Vec<Duration>,
    pub teardown_grace: Duration,
}

impl MountPolicy {
    pub fn max_attempts(&self) -> usize {
        self.retry_delays.len() + 1
    }
}

impl Default for MountPolicy {
    fn default() -> Self {
        Self {
            retry_delays: DEFAULT_RETRY_DELAYS_MS.iter().copied().map(Duration::from_millis).collect(),
            teardown_grace: Duration::from_millis(DEFAULT_TEARDOWN_GRACE_MS),
        }
    }
}

/// What to show when the widget comes up.
#[derive(Debug, Clone, PartialEq)]
pub struct MountOptions {
    pub center: LatLon,
    pub zoom: u8,
    /// Tiles loaded on each side of the center tile.
    pub radius: u32,
    /// Locations from the host application; the selected one is centered on
    /// once the map is ready.
    pub context: MapContext,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            center: LatLon::new(0.0, 0.0),
            zoom: 2,
            radius: 1,
            context: MapContext::default(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MountError {
    #[error("Host element was still claimed after {attempts} attempts")]
    TransientContainerConflict { attempts: usize },

    #[error("Map widget failed: {0}")]
    Fatal(String),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("Map was unmounted")]
    Unmounted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    Mounting,
    Ready,
    Failed,
    Unmounted,
}

impl MountState {
    fn is_settled(&self) -> bool {
        matches!(self, MountState::Failed | MountState::Unmounted)
    }
}

type ReadyCallback = Box<dyn FnOnce() + Send>;
type ErrorCallback = Box<dyn FnOnce(MountError) + Send>;

struct Shared {
    state: MountState,
    widget: Option<Arc<dyn MapWidget>>,
    error: Option<MountError>,
    on_ready: Vec<ReadyCallback>,
    on_error: Vec<ErrorCallback>,
}

struct MountInner {
    id: Option<MapInstanceId>,
    host: HostElement,
    lifecycle: Arc<LifecycleManager>,
    teardown_grace: Duration,
    shared: Mutex<Shared>,
    state_tx: watch::Sender<MountState>,
}

impl MountInner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state(&self) -> MountState {
        self.lock().state
    }

    /// Store a freshly built widget. Returns it back if the mount was
    /// abandoned meanwhile.
    fn attach(&self, widget: Arc<dyn MapWidget>) -> Option<Arc<dyn MapWidget>> {
        let mut shared = self.lock();
        if shared.state != MountState::Mounting {
            return Some(widget);
        }
        shared.widget = Some(widget);
        None
    }

    fn widget(&self) -> Option<Arc<dyn MapWidget>> {
        self.lock().widget.clone()
    }

    fn mark_ready(&self) -> bool {
        let callbacks = {
            let mut shared = self.lock();
            if shared.state != MountState::Mounting {
                return false;
            }
            shared.state = MountState::Ready;
            std::mem::take(&mut shared.on_ready)
        };
        self.state_tx.send_replace(MountState::Ready);
        if let Some(id) = self.id {
            info!(instance = %id, host = self.host.id(), "Map ready");
        }
        for callback in callbacks {
            callback();
        }
        true
    }

    /// Move to `Failed`, release the id, tear the widget down and report
    /// `err` once. Does nothing if already settled.
    fn fail(&self, err: MountError) {
        let (callbacks, widget) = {
            let mut shared = self.lock();
            if shared.state.is_settled() {
                return;
            }
            shared.state = MountState::Failed;
            shared.error = Some(err.clone());
            shared.on_ready.clear();
            (std::mem::take(&mut shared.on_error), shared.widget.take())
        };
        self.state_tx.send_replace(MountState::Failed);

        error!(host = self.host.id(), error = %err, "Map mount failed");
        if let Some(id) = self.id {
            self.lifecycle.release(&id);
        }
        if let Some(widget) = widget {
            widget.teardown();
        }
        for callback in callbacks {
            callback(err.clone());
        }
    }
}

// ============================================================================
// Handle
// ============================================================================

/// The caller's view of one mount.
#[derive(Clone)]
pub struct MountHandle {
    inner: Arc<MountInner>,
}

impl MountHandle {
    /// The instance id, or `None` if none could be minted.
    pub fn id(&self) -> Option<MapInstanceId> {
        self.inner.id
    }

    pub fn state(&self) -> MountState {
        self.inner.state()
    }

    /// The error that failed this mount, if it failed.
    pub fn error(&self) -> Option<MountError> {
        self.inner.lock().error.clone()
    }

    /// Run `callback` once the map is ready. Fires immediately if it already
    /// is. Every registered callback runs.
    pub fn on_ready<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut shared = self.inner.lock();
        let state = shared.state;
        match state {
            MountState::Mounting => shared.on_ready.push(Box::new(callback)),
            MountState::Ready => {
                drop(shared);
                callback();
            }
            MountState::Failed | MountState::Unmounted => {}
        }
    }

    /// Run `callback` if the mount fails. Fires immediately if it already has.
    /// Every registered callback runs.
    pub fn on_error<F>(&self, callback: F)
    where
        F: FnOnce(MountError) + Send + 'static,
    {
        let mut shared = self.inner.lock();
        let state = shared.state;
        match state {
            MountState::Mounting | MountState::Ready => shared.on_error.push(Box::new(callback)),
            MountState::Failed => {
                let err = shared.error.clone();
                drop(shared);
                if let Some(err) = err {
                    callback(err);
                }
            }
            MountState::Unmounted => {}
        }
    }

    /// Wait until the map is ready or the mount has failed.
    pub async fn ready(&self) -> Result<(), MountError> {
        let mut rx = self.inner.state_tx.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                MountState::Ready => return Ok(()),
                MountState::Failed => return Err(self.error().unwrap_or(MountError::Unmounted)),
                MountState::Unmounted => return Err(MountError::Unmounted),
                MountState::Mounting => {}
            }
            if rx.changed().await.is_err() {
                return Err(MountError::Unmounted);
            }
        }
    }

    pub fn set_view(&self, center: LatLon, zoom: u8) {
        if let Some(widget) = self.inner.widget() {
            widget.set_view(center, zoom);
        }
    }

    pub fn loaded_tiles(&self) -> Vec<(TileCoordinate, TileOrigin)> {
        self.inner.widget().map(|w| w.loaded_tiles()).unwrap_or_default()
    }

    /// Release the instance id, drop callbacks, and tear the widget down
    /// after the grace period. Safe to call more than once.
    pub fn unmount(&self) {
        let widget = {
            let mut shared = self.inner.lock();
            if shared.state == MountState::Unmounted {
                return;
            }
            shared.state = MountState::Unmounted;
            shared.on_ready.clear();
            shared.on_error.clear();
            shared.widget.take()
        };
        self.inner.state_tx.send_replace(MountState::Unmounted);

        if let Some(id) = self.inner.id {
            self.inner.lifecycle.release(&id);
            info!(instance = %id, host = self.inner.host.id(), "Map unmounted");
        }

        if let Some(widget) = widget {
            let grace = self.inner.teardown_grace;
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                widget.teardown();
            });
        }
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Mounts map widgets against host elements.
pub struct MapMountController {
    lifecycle: Arc<LifecycleManager>,
    pipeline: Arc<TileFetchPipeline>,
    factory: Arc<dyn WidgetFactory>,
    policy: MountPolicy,
}

impl MapMountController {
    pub fn new(
        lifecycle: Arc<LifecycleManager>,
        pipeline: Arc<TileFetchPipeline>,
        factory: Arc<dyn WidgetFactory>,
        policy: MountPolicy,
    ) -> Self {
        Self {
            lifecycle,
            pipeline,
            factory,
            policy,
        }
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    pub fn policy(&self) -> &MountPolicy {
        &self.policy
    }

    /// Start mounting a widget on `host`. Returns immediately; construction
    /// runs on a spawned task.
    pub fn mount(&self, host: &HostElement, options: MountOptions) -> MountHandle {
        let acquired = self.lifecycle.acquire();
        let (state_tx, _) = watch::channel(MountState::Mounting);
        let inner = Arc::new(MountInner {
            id: acquired.as_ref().ok().copied(),
            host: host.clone(),
            lifecycle: self.lifecycle.clone(),
            teardown_grace: self.policy.teardown_grace,
            shared: Mutex::new(Shared {
                state: MountState::Mounting,
                widget: None,
                error: None,
                on_ready: Vec::new(),
                on_error: Vec::new(),
            }),
            state_tx,
        });
        let handle = MountHandle { inner: inner.clone() };

        let id = match acquired {
            Ok(id) => id,
            Err(e) => {
                inner.fail(e.into());
                return handle;
            }
        };

        debug!(instance = %id, host = host.id(), "Mounting map");
        let task = MountTask {
            inner,
            id,
            options,
            factory: self.factory.clone(),
            policy: self.policy.clone(),
            resolver: TileResolver::new(id, self.pipeline.clone(), self.lifecycle.clone()),
        };
        tokio::spawn(task.run());
        handle
    }
}

struct MountTask {
    inner: Arc<MountInner>,
    id: MapInstanceId,
    options: MountOptions,
    factory: Arc<dyn WidgetFactory>,
    policy: MountPolicy,
    resolver: TileResolver,
}

impl MountTask {
    async fn run(self) {
        let (events, mut events_rx) = WidgetEvents::channel();

        let Some(widget) = self.construct(events).await else {
            return;
        };
        if let Some(widget) = self.inner.attach(widget) {
            // Unmounted while we were constructing
            debug!(instance = %self.id, "Mount abandoned, tearing down new widget");
            widget.teardown();
            return;
        }

        let mut state_rx = self.inner.state_tx.subscribe();
        let mut conflicts = 0;
        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event, &mut conflicts),
                        None => break,
                    }
                }
                _ = settled(&mut state_rx) => break,
            }
        }
    }

    /// Build the widget, retrying container conflicts per the policy.
    async fn construct(&self, events: WidgetEvents) -> Option<Arc<dyn MapWidget>> {
        let host = &self.inner.host;
        let mut delays = self.policy.retry_delays.iter();
        let mut attempt = 0;

        loop {
            attempt += 1;
            if self.inner.state() != MountState::Mounting {
                debug!(instance = %self.id, "Unmounted before construction");
                return None;
            }

            self.inner.lifecycle.reset(host);
            let result = self
                .factory
                .create(host, self.id, &self.options, self.resolver.clone(), events.clone());

            match result {
                Ok(widget) => return Some(widget),
                Err(WidgetError::Fatal(msg)) => {
                    self.inner.fail(MountError::Fatal(msg));
                    return None;
                }
                Err(e @ WidgetError::ContainerConflict { .. }) => match delays.next() {
                    Some(delay) => {
                        warn!(
                            instance = %self.id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Host element busy, retrying mount"
                        );
                        if delay.is_zero() {
                            tokio::task::yield_now().await;
                        } else {
                            tokio::time::sleep(*delay).await;
                        }
                    }
                    None => {
                        self.inner.fail(MountError::TransientContainerConflict { attempts: attempt });
                        return None;
                    }
                },
            }
        }
    }

    /// `conflicts` counts container conflicts the widget reported while still
    /// mounting; they share the construction retry budget.
    fn handle_event(&self, event: WidgetEvent, conflicts: &mut usize) {
        match event {
            WidgetEvent::Ready => {
                if self.inner.mark_ready() {
                    self.recenter();
                }
            }
            WidgetEvent::Error(e) if e.is_container_conflict() => {
                if self.inner.state() != MountState::Mounting {
                    debug!(instance = %self.id, error = %e, "Ignoring container conflict after ready");
                    return;
                }
                *conflicts += 1;
                if *conflicts >= self.policy.max_attempts() {
                    self.inner.fail(MountError::TransientContainerConflict { attempts: *conflicts });
                } else {
                    warn!(instance = %self.id, count = *conflicts, error = %e, "Suppressed container conflict from widget");
                }
            }
            WidgetEvent::Error(WidgetError::Fatal(msg)) => {
                self.inner.fail(MountError::Fatal(msg));
            }
            WidgetEvent::Error(_) => {}
        }
    }

    fn recenter(&self) {
        let Some(position) = self.options.context.selected_position() else {
            return;
        };
        if let Some(widget) = self.inner.widget() {
            debug!(instance = %self.id, lat = position.lat, lon = position.lon, "Centering on selected location");
            widget.set_view(position, self.options.zoom);
        }
    }
}

async fn settled(rx: &mut watch::Receiver<MountState>) {
    loop {
        if rx.borrow_and_update().is_settled() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
