//! Map instance identities.
//!
//! `LifecycleManager` mints a unique `MapInstanceId` per widget mount, tracks
//! which ids are live, and scrubs rendering state left on a host element by an
//! instance that is no longer live. An id moves `Unminted → Active → Released`
//! and never comes back; ids are a salted counter, so released ones need no
//! record of their own.

pub mod manager;

pub use manager::{InstanceState, LifecycleError, LifecycleManager, MapInstanceId, MAX_ID_ATTEMPTS};
