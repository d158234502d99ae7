//! The host rendering widget, seen from the pipeline's side.
//!
//! The real map widget is a black box: it is handed a host element and a tile
//! resolver, asks for tiles, and reports readiness or errors. This module
//! defines that contract (`WidgetFactory`, `MapWidget`, `WidgetEvents`,
//! `TileResolver`), the `HostElement` a widget draws into, and a headless
//! widget used by the CLI and tests.

pub mod contract;
pub mod headless;
pub mod host;

pub use contract::{MapWidget, TileResolver, WidgetError, WidgetEvent, WidgetEvents, WidgetFactory};
pub use headless::{HeadlessMapWidget, HeadlessWidgetFactory};
pub use host::{HostElement, LIBRARY_ATTRIBUTE_PREFIX, LIBRARY_CLASS_PREFIX};
