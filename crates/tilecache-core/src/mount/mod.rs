//! Owning one map widget from mount to teardown.
//!
//! `MapMountController::mount` mints an instance id, builds the widget against
//! a host element with the fetch pipeline as its tile resolver, retries the
//! transient "host still claimed" race a bounded number of times, and reports
//! ready/error through the returned `MountHandle`.

pub mod controller;

pub use controller::{MapMountController, MountError, MountHandle, MountOptions, MountPolicy, MountState};
