//! Online/offline signal for the fetch pipeline and status displays.
//!
//! `NetworkStatusMonitor` holds the single current `NetworkStatus` and fans
//! transitions out to listeners. It does no smoothing: flapping
//! connectivity is absorbed per request by the fetch pipeline's fallback.

pub mod monitor;

pub use monitor::{probe, NetworkStatusMonitor, Subscription};
